//! File-backed routing store.
//!
//! The routing table lives in a single YAML, TOML or JSON file; the
//! extension picks the format. Writes are serialized and land atomically
//! (temp file + rename), so a watcher never reads a half-written table.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};

use crate::routing::table::{EndpointConfig, RawRoutingTable};
use crate::store::{
    validate_name, validate_rule, validate_service, validate_version, RoutingStore, StoreError,
};

/// Quiet period that folds an editor's burst of events into one reload.
const DEBOUNCE: Duration = Duration::from_millis(50);

/// On-disk encoding of the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Yaml,
    Toml,
    Json,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yml" | "yaml" => Some(TableFormat::Yaml),
            "toml" => Some(TableFormat::Toml),
            "json" => Some(TableFormat::Json),
            _ => None,
        }
    }

    pub fn decode(&self, content: &str) -> Result<RawRoutingTable, String> {
        if content.trim().is_empty() {
            return Ok(RawRoutingTable::new());
        }
        match self {
            TableFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            TableFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            TableFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }

    pub fn encode(&self, table: &RawRoutingTable) -> Result<String, String> {
        match self {
            TableFormat::Yaml => serde_yaml::to_string(table).map_err(|e| e.to_string()),
            TableFormat::Toml => toml::to_string_pretty(table).map_err(|e| e.to_string()),
            TableFormat::Json => serde_json::to_string_pretty(table).map_err(|e| e.to_string()),
        }
    }
}

/// Routing store backed by one file.
pub struct FileStore {
    path: PathBuf,
    format: TableFormat,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let format =
            TableFormat::from_path(&path).ok_or_else(|| StoreError::UnsupportedFormat(path.clone()))?;
        Ok(Self {
            path,
            format,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> TableFormat {
        self.format
    }

    async fn read(&self) -> Result<RawRoutingTable, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Routing table file not found, using empty table");
                return Ok(RawRoutingTable::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        self.format.decode(&content).map_err(|reason| StoreError::Decode {
            what: self.path.display().to_string(),
            reason,
        })
    }

    async fn write(&self, table: &RawRoutingTable) -> Result<(), StoreError> {
        let content = self.format.encode(table).map_err(StoreError::Encode)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Read, edit and write back under the write lock.
    async fn mutate<F>(&self, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RawRoutingTable) -> Result<(), StoreError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut table = self.read().await?;
        edit(&mut table)?;
        self.write(&table).await?;
        tracing::debug!(path = %self.path.display(), "Routing table file updated");
        Ok(())
    }

    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[async_trait]
impl RoutingStore for FileStore {
    async fn load(&self) -> Result<RawRoutingTable, StoreError> {
        self.read().await
    }

    async fn watch(&self) -> Result<mpsc::UnboundedReceiver<RawRoutingTable>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(self.read().await?).ok();

        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = (event.kind.is_modify() || event.kind.is_create())
                    && event
                        .paths
                        .iter()
                        .any(|path| path.file_name().map(|n| n.to_os_string()) == file_name);
                if relevant {
                    let _ = signal_tx.send(());
                }
            }
            Err(e) => tracing::error!(error = %e, "Routing table watch error"),
        })?;
        watcher.watch(&self.watch_dir(), RecursiveMode::NonRecursive)?;

        let path = self.path.clone();
        let format = self.format;
        tracing::info!(path = %path.display(), "Routing table watcher started");

        tokio::spawn(async move {
            // The watcher lives as long as this task.
            let _watcher = watcher;
            while signal_rx.recv().await.is_some() {
                tokio::time::sleep(DEBOUNCE).await;
                while signal_rx.try_recv().is_ok() {}

                let content = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Routing table unreadable, skipping");
                        continue;
                    }
                };
                match format.decode(&content) {
                    Ok(table) => {
                        tracing::info!(path = %path.display(), "Routing table change detected");
                        if tx.send(table).is_err() {
                            break;
                        }
                    }
                    Err(reason) => {
                        tracing::error!(path = %path.display(), %reason, "Routing table unparseable, keeping current table");
                    }
                }
            }
            tracing::debug!(path = %path.display(), "Routing table watcher stopped");
        });

        Ok(rx)
    }

    async fn create_rewrite(&self, rule: &str) -> Result<(), StoreError> {
        validate_rule(rule)?;
        self.mutate(|table| {
            table.push_rewrite(rule);
            Ok(())
        })
        .await
    }

    async fn remove_rewrite(&self, index: usize, rule: &str) -> Result<(), StoreError> {
        self.mutate(|table| {
            table.remove_rewrite(index, rule)?;
            Ok(())
        })
        .await
    }

    async fn create_service(&self, service: &str) -> Result<(), StoreError> {
        validate_name(service)?;
        self.mutate(|table| {
            table.add_service(service);
            Ok(())
        })
        .await
    }

    async fn create_binding(
        &self,
        service: &str,
        version: &str,
        endpoint: &EndpointConfig,
    ) -> Result<(), StoreError> {
        validate_name(service)?;
        validate_version(version)?;
        if let Some(rule) = &endpoint.rewrite {
            validate_rule(rule)?;
        }
        self.mutate(|table| {
            table.set_binding(service, version, endpoint.clone());
            if let Some(versions) = table.services.get(service) {
                validate_service(service, versions)?;
            }
            Ok(())
        })
        .await
    }

    async fn add_service_to_topology(
        &self,
        topology: &str,
        service: &str,
        version: &str,
    ) -> Result<(), StoreError> {
        validate_name(topology)?;
        validate_name(service)?;
        validate_version(version)?;
        self.mutate(|table| {
            table.pin(topology, service, version);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::table::{RoutingTable, TableEditError};

    const YAML: &str = r#"
rewrites:
  - "^http://google\\.com;http://search.internal"
services:
  search:
    1.0.0:
      host: localhost:8081
topologies:
  blue:
    search: 1.0.0
"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TableFormat::from_path(Path::new("conf.yml")), Some(TableFormat::Yaml));
        assert_eq!(TableFormat::from_path(Path::new("conf.YAML")), Some(TableFormat::Yaml));
        assert_eq!(TableFormat::from_path(Path::new("conf.toml")), Some(TableFormat::Toml));
        assert_eq!(TableFormat::from_path(Path::new("conf.json")), Some(TableFormat::Json));
        assert_eq!(TableFormat::from_path(Path::new("conf.ini")), None);
        assert!(matches!(
            FileStore::new("routes"),
            Err(StoreError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.yml");
        std::fs::write(&path, YAML).unwrap();

        let table = FileStore::new(&path).unwrap().load().await.unwrap();
        assert_eq!(table.rewrites.len(), 1);
        assert_eq!(table.services["search"]["1.0.0"].host, "localhost:8081");
        assert_eq!(table.topologies["blue"]["search"], "1.0.0");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("conf.json")).unwrap();
        assert_eq!(store.load().await.unwrap(), RawRoutingTable::new());
    }

    #[tokio::test]
    async fn test_mutations_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("conf.toml")).unwrap();

        store.create_rewrite("^http://a;http://b").await.unwrap();
        store.create_service("echo").await.unwrap();
        store
            .create_binding("search", "2.0.0", &EndpointConfig::new("bing.com").with_scheme("https"))
            .await
            .unwrap();
        store.add_service_to_topology("blue", "search", "2.0.0").await.unwrap();

        let reopened = FileStore::new(store.path()).unwrap();
        let table = reopened.load().await.unwrap();
        assert_eq!(table.rewrites, vec!["^http://a;http://b".to_string()]);
        assert!(table.services["echo"].is_empty());
        assert_eq!(table.services["search"]["2.0.0"].scheme.as_deref(), Some("https"));
        assert_eq!(table.topologies["blue"]["search"], "2.0.0");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_mutations_leave_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.yml");
        std::fs::write(&path, YAML).unwrap();
        let store = FileStore::new(&path).unwrap();

        assert!(matches!(
            store.create_rewrite("no-separator").await,
            Err(StoreError::InvalidRewrite(_))
        ));
        assert!(matches!(
            store.create_binding("search", "newest", &EndpointConfig::new("x")).await,
            Err(StoreError::InvalidVersion { .. })
        ));
        assert!(matches!(
            store.remove_rewrite(0, "^http://other;x").await,
            Err(StoreError::Edit(TableEditError::RewriteMismatch { .. }))
        ));
        assert!(matches!(
            store.remove_rewrite(5, "x").await,
            Err(StoreError::Edit(TableEditError::RewriteIndexOutOfRange { index: 5, len: 1 }))
        ));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), YAML);
    }

    #[tokio::test]
    async fn test_uncompilable_bindings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.yml");
        std::fs::write(&path, YAML).unwrap();
        let store = FileStore::new(&path).unwrap();

        let rejected = [
            ("2.0.0", EndpointConfig::new("files.internal").with_scheme("ftp")),
            ("1-0-0", EndpointConfig::new("localhost:8082")),
            ("3.0.0", EndpointConfig::new("")),
        ];
        for (version, endpoint) in &rejected {
            assert!(
                matches!(
                    store.create_binding("search", version, endpoint).await,
                    Err(StoreError::InvalidBinding(_))
                ),
                "{version} should be rejected"
            );
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), YAML);

        store.add_service_to_topology("green", "search", "1.0.0").await.unwrap();
        assert!(RoutingTable::compile(&store.load().await.unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_remove_rewrite_with_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.yml");
        std::fs::write(&path, YAML).unwrap();
        let store = FileStore::new(&path).unwrap();

        store
            .remove_rewrite(0, "^http://google\\.com;http://search.internal")
            .await
            .unwrap();
        assert!(store.load().await.unwrap().rewrites.is_empty());
    }

    #[tokio::test]
    async fn test_watch_delivers_current_then_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.yml");
        std::fs::write(&path, YAML).unwrap();
        let store = FileStore::new(&path).unwrap();

        let mut updates = store.watch().await.unwrap();
        let first = updates.recv().await.unwrap();
        assert_eq!(first.services.len(), 1);

        store.create_service("echo").await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let table = updates.recv().await.unwrap();
                if table.services.contains_key("echo") {
                    return table;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(next.services.len(), 2);
    }
}
