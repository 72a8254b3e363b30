//! File server entry point
//!
//! Usage: serve [ROOT]
//!
//! Serves ROOT (default: the current directory) on the port named by `PORT`
//! (default 8080), on all interfaces.

use dirserve::{Config, Server, StartupError};
use std::path::PathBuf;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let root = std::env::args().nth(1).map(PathBuf::from);

    let config = match Config::from_env(root) {
        Ok(config) => config,
        Err(e) => fail(e),
    };
    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => fail(e),
    };

    println!("\nFile server started\n");
    for line in server.banner() {
        println!("{}", line);
    }
    println!("\nPress Ctrl+C to stop the server\n");

    if let Err(e) = server.run().await {
        log::error!("server stopped: {}", e);
        process::exit(1);
    }
}

fn fail(e: StartupError) -> ! {
    match &e {
        StartupError::PortInUse { port } => {
            eprintln!("Error: Port {} is already in use.", port);
            eprintln!("Try setting a different port: PORT=3000 serve");
        }
        _ => log::error!("{}", e),
    }
    process::exit(1);
}
