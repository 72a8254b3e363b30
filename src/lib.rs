//! dirserve - a small local HTTP file server
//!
//! Serves one directory tree over HTTP/1.1: files are streamed with a content
//! type picked from their extension, directories get an HTML index page.
//!
//! Request flow:
//! - `resolve`: request target to a path confined to the root
//! - `handler`: stat and dispatch, error to status mapping
//! - `listing`: directory index pages
//! - `transmit`: MIME table and file streaming
//!
//! There is no shared mutable state. The `Config` is fixed at startup.

pub mod config;
pub mod error;
pub mod handler;
pub mod listing;
pub mod resolve;
pub mod server;
pub mod transmit;

pub use config::Config;
pub use error::{RequestError, RequestResult, StartupError};
pub use handler::{Handler, Reply};
pub use server::Server;
