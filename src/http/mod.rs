//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → director.rs (rewrite, resolve, point the request upstream)
//!     → transport.rs (hyper for http, reqwest for https)
//!     → Send response to client
//! ```

pub mod director;
pub mod server;
pub mod transport;

pub use director::{Directed, Director, DirectorError, X_FORWARDED_HOST};
pub use server::{serve, ProxyServer, X_REQUEST_ID};
pub use transport::{Transport, TransportError};
