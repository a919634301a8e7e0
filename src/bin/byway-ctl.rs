use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "byway-ctl")]
#[command(about = "Management CLI for the byway gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:1091")]
    url: String,

    /// API key; omit when the admin API runs without one.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active table summary
    Status,
    /// Print the stored routing table
    Table,
    /// Append a `<pattern>;<replacement>` rewrite rule
    AddRewrite { rule: String },
    /// Remove the rewrite at INDEX, which must equal RULE
    RemoveRewrite { index: usize, rule: String },
    /// Register a service with no versions
    AddService { name: String },
    /// Bind SERVICE@VERSION to an upstream
    Bind {
        service: String,
        version: String,
        /// Upstream authority, e.g. localhost:8081
        #[arg(long)]
        host: String,
        #[arg(long)]
        scheme: Option<String>,
        /// Path rewrite, `<pattern>;<replacement>`
        #[arg(long)]
        rewrite: Option<String>,
        /// Extra header as NAME=VALUE; `host=...` sets the outgoing Host
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
    /// Pin SERVICE to VERSION within TOPOLOGY
    Pin {
        topology: String,
        service: String,
        version: String,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/status")),
        Commands::Table => client.get(format!("{base}/table")),
        Commands::AddRewrite { rule } => client
            .post(format!("{base}/rewrites"))
            .json(&json!({ "rule": rule })),
        Commands::RemoveRewrite { index, rule } => client
            .delete(format!("{base}/rewrites/{index}"))
            .json(&json!({ "rule": rule })),
        Commands::AddService { name } => client
            .post(format!("{base}/services"))
            .json(&json!({ "name": name })),
        Commands::Bind {
            service,
            version,
            host,
            scheme,
            rewrite,
            headers,
        } => {
            let mut endpoint = Map::new();
            endpoint.insert("host".into(), Value::String(host));
            if let Some(scheme) = scheme {
                endpoint.insert("scheme".into(), Value::String(scheme));
            }
            if let Some(rewrite) = rewrite {
                endpoint.insert("rewrite".into(), Value::String(rewrite));
            }
            if !headers.is_empty() {
                let headers: Map<String, Value> = headers
                    .into_iter()
                    .map(|(name, value)| (name, Value::String(value)))
                    .collect();
                endpoint.insert("headers".into(), Value::Object(headers));
            }
            client
                .put(format!("{base}/services/{service}/versions/{version}"))
                .json(&Value::Object(endpoint))
        }
        Commands::Pin {
            topology,
            service,
            version,
        } => client
            .put(format!("{base}/topologies/{topology}/services/{service}"))
            .json(&json!({ "version": version })),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    if text.is_empty() {
        println!("{}", status);
    } else {
        match serde_json::from_str::<Value>(&text) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) => println!("{}", text),
        }
    }
    Ok(())
}
