//! Listening socket and accept loop
//!
//! Every request runs as its own task; filesystem work is moved to the
//! blocking pool, so a large file or a slow client never holds up anyone else.
//! A body stream that fails makes hyper drop that connection.

use crate::config::Config;
use crate::error::StartupError;
use crate::handler::Handler;
use axum::Router;
use axum::extract::{Request, State};
use axum::response::Response;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use tokio::net::TcpListener;

pub struct Server {
    listener: TcpListener,
    handler: Handler,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the configured address
    pub async fn bind(config: Config) -> Result<Self, StartupError> {
        let addr = config.addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| bind_error(addr, e))?;
        let local_addr = listener.local_addr()?;
        log::debug!("bound {}", local_addr);

        Ok(Self {
            listener,
            handler: Handler::new(config),
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &Config {
        self.handler.config()
    }

    /// Serve requests until the listener fails
    pub async fn run(self) -> io::Result<()> {
        // Every path and method goes to the same handler.
        let app = Router::new().fallback(serve).with_state(self.handler);
        axum::serve(self.listener, app).await
    }

    /// Console lines describing where the server can be reached
    pub fn banner(&self) -> Vec<String> {
        let network = if self.local_addr.ip().is_unspecified() {
            network_ipv4s()
        } else {
            Vec::new()
        };
        banner_lines(self.config().root(), self.local_addr, &network)
    }
}

async fn serve(State(handler): State<Handler>, request: Request) -> Response {
    let method = request.method().clone();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    handler.respond(method, target).await
}

fn bind_error(addr: SocketAddr, e: io::Error) -> StartupError {
    match e.kind() {
        io::ErrorKind::AddrInUse => StartupError::PortInUse { port: addr.port() },
        _ => StartupError::Bind { addr, source: e },
    }
}

/// IPv4 addresses of every non-loopback interface
fn network_ipv4s() -> Vec<Ipv4Addr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .filter_map(|iface| match iface.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .collect(),
        Err(e) => {
            log::debug!("cannot list network interfaces: {}", e);
            Vec::new()
        }
    }
}

fn banner_lines(root: &Path, local_addr: SocketAddr, network: &[Ipv4Addr]) -> Vec<String> {
    let port = local_addr.port();
    let mut lines = vec![
        format!("Serving files from: {}", root.display()),
        String::new(),
        "Access your files at:".to_string(),
    ];

    if local_addr.ip().is_unspecified() {
        lines.push(format!("  Local:   http://localhost:{}", port));
        for ip in network {
            lines.push(format!("  Network: http://{}:{}", ip, port));
        }
    } else {
        lines.push(format!("  Local:   http://{}", local_addr));
    }
    lines
}
