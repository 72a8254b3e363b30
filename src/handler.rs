//! Request dispatch
//!
//! One request moves through resolve -> stat -> (listing | file | error) and
//! always ends in exactly one response.

use crate::config::Config;
use crate::error::{RequestError, RequestResult};
use crate::listing;
use crate::resolve::resolve;
use crate::transmit::FileBody;
use axum::body::Body;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::fs;
use std::io;
use std::sync::Arc;

/// What a successful request produces
pub enum Reply {
    /// Rendered directory page
    Listing(String),
    /// File to stream
    File(FileBody),
}

/// Shared per-server request handler
#[derive(Debug, Clone)]
pub struct Handler {
    config: Arc<Config>,
}

impl Handler {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decide the reply for `method` and raw request `target`.
    ///
    /// Blocking: stats, reads directories and opens files.
    pub fn handle(&self, method: &Method, target: &str) -> RequestResult<Reply> {
        if method != Method::GET && method != Method::HEAD {
            return Err(RequestError::MethodNotAllowed(method.to_string()));
        }

        let root = self.config.root();
        let resolved = resolve(root, target)?;
        let meta = fs::metadata(&resolved.fs_path).map_err(RequestError::from_stat)?;

        // Lexical containment holds; make sure no symlink leads back out.
        let canonical = fs::canonicalize(&resolved.fs_path).map_err(RequestError::from_stat)?;
        if !canonical.starts_with(root) {
            log::debug!(
                "{} resolves through a link to outside the root",
                resolved.url_path
            );
            return Err(RequestError::Forbidden);
        }

        if meta.is_dir() {
            let html = listing::generate(&resolved.fs_path, &resolved.url_path)?;
            Ok(Reply::Listing(html))
        } else {
            let body = FileBody::open(&resolved.fs_path, &meta)?;
            Ok(Reply::File(body))
        }
    }

    /// Answer one request, logging the outcome.
    ///
    /// Filesystem work runs on the blocking pool so a large directory never
    /// stalls the runtime threads.
    pub async fn respond(&self, method: Method, target: String) -> Response {
        let handler = self.clone();
        let (m, t) = (method.clone(), target.clone());
        let result = match tokio::task::spawn_blocking(move || handler.handle(&m, &t)).await {
            Ok(result) => result,
            Err(e) => Err(RequestError::Io(io::Error::other(e))),
        };

        match &result {
            Ok(_) => log::info!("{} {} -> 200", method, target),
            Err(e @ RequestError::Io(_)) => {
                log::error!("{} {} -> {}: {}", method, target, e.status(), e)
            }
            Err(e @ RequestError::Forbidden) => {
                log::warn!("{} {} -> {}: {}", method, target, e.status(), e)
            }
            Err(e) => log::info!("{} {} -> {}: {}", method, target, e.status(), e),
        }

        into_response(result)
    }
}

/// Turn a handler outcome into a response
pub fn into_response(result: RequestResult<Reply>) -> Response {
    match result {
        Ok(Reply::Listing(html)) => {
            ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
        }
        Ok(Reply::File(body)) => {
            let content_type = HeaderValue::from_static(body.content_type);
            let len = HeaderValue::from(body.len);

            let mut response = Response::new(Body::from_stream(body.into_stream()));
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, content_type);
            headers.insert(header::CONTENT_LENGTH, len);
            response
        }
        Err(e) => error_response(&e),
    }
}

/// Plain-text status response. The body is the status line text only.
pub fn error_response(err: &RequestError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (
        status,
        [(header::CONTENT_TYPE, "text/plain")],
        err.status_text(),
    )
        .into_response();
    if let RequestError::MethodNotAllowed(_) = err {
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
    }
    response
}
