//! Server configuration
//!
//! Built once at startup and shared read-only with every request.

use crate::error::StartupError;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 8080;

/// Immutable server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Canonical absolute directory being served
    root: PathBuf,
    pub host: IpAddr,
    pub port: u16,
}

impl Config {
    /// Create a config serving `root` on all interfaces.
    ///
    /// The root is canonicalized so that containment checks compare like with like.
    pub fn new(root: impl AsRef<Path>, port: u16) -> Result<Self, StartupError> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root).map_err(|e| StartupError::InvalidRoot {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !canonical.is_dir() {
            return Err(StartupError::InvalidRoot {
                path: root.to_path_buf(),
                reason: "not a directory".into(),
            });
        }

        Ok(Self {
            root: canonical,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
        })
    }

    /// Build from the process environment: `PORT` and the current directory,
    /// or `root` when given.
    pub fn from_env(root: Option<PathBuf>) -> Result<Self, StartupError> {
        let port = parse_port(std::env::var("PORT").ok().as_deref())?;
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        Self::new(root, port)
    }

    /// Bind to a specific interface instead of all of them
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Parse a `PORT` value, falling back to the default when unset
fn parse_port(value: Option<&str>) -> Result<u16, StartupError> {
    match value.map(str::trim) {
        None | Some("") => Ok(DEFAULT_PORT),
        Some(s) => s
            .parse()
            .map_err(|_| StartupError::InvalidPort(s.to_string())),
    }
}
