//! File transmission
//!
//! Files are never read into memory. The open handle becomes a stream of
//! chunks that the HTTP layer writes to the socket one at a time.

use crate::error::{RequestError, RequestResult};
use axum::body::Bytes;
use futures::Stream;
use std::fs::{File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncReadExt, Take};
use tokio_util::io::ReaderStream;

/// Fallback for unknown or missing extensions
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Content type for a lowercase extension (without the dot)
fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "xml" => "application/xml",
        _ => return None,
    };
    Some(mime)
}

/// Content type for a path, by case-insensitive extension
pub fn mime_type(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(|ext| mime_for_extension(&ext))
        .unwrap_or(DEFAULT_MIME)
}

/// An opened file ready to be streamed
pub struct FileBody {
    file: File,
    path: PathBuf,
    /// Size from the stat that preceded the open
    pub len: u64,
    pub content_type: &'static str,
}

impl FileBody {
    /// Open `path` for streaming. `meta` is the stat the dispatcher already did.
    pub fn open(path: &Path, meta: &Metadata) -> RequestResult<Self> {
        let file = File::open(path).map_err(RequestError::from_stat)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len: meta.len(),
            content_type: mime_type(path),
        })
    }

    /// Hand the file to the async runtime as a body stream of exactly `len` bytes
    pub fn into_stream(self) -> BodyStream<tokio::fs::File> {
        BodyStream::new(tokio::fs::File::from_std(self.file), self.len, self.path)
    }
}

/// Chunks of a file body, promised to be exactly `expected` bytes long.
///
/// Headers are already out when this runs, so a failure can only end the
/// body: a read error, or the file ending early, is yielded as an error and
/// the HTTP layer drops the connection. Bytes past `expected` are never read.
pub struct BodyStream<R> {
    inner: ReaderStream<Take<R>>,
    path: PathBuf,
    expected: u64,
    sent: u64,
    done: bool,
}

impl<R: AsyncRead + Unpin> BodyStream<R> {
    pub fn new(reader: R, expected: u64, path: PathBuf) -> Self {
        Self {
            inner: ReaderStream::new(reader.take(expected)),
            path,
            expected,
            sent: 0,
            done: false,
        }
    }

    fn fail(&mut self, e: io::Error) -> Poll<Option<io::Result<Bytes>>> {
        log::error!(
            "{}: body aborted after {} of {} bytes: {}",
            self.path.display(),
            self.sent,
            self.expected,
            e
        );
        self.done = true;
        Poll::Ready(Some(Err(e)))
    }
}

impl<R: AsyncRead + Unpin> Stream for BodyStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => this.fail(e),
            None if this.sent < this.expected => {
                let e = io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while sending");
                this.fail(e)
            }
            None => {
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<R> Drop for BodyStream<R> {
    fn drop(&mut self) {
        // Client went away or the body failed; the file handle closes here either way.
        if self.sent < self.expected {
            log::info!(
                "{}: transfer stopped at {} of {} bytes",
                self.path.display(),
                self.sent,
                self.expected
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::ReadBuf;

    async fn collect<R: AsyncRead + Unpin>(stream: &mut BodyStream<R>) -> (Vec<u8>, Option<io::Error>) {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[test]
    fn test_mime_known() {
        assert_eq!(mime_type(Path::new("index.html")), "text/html");
        assert_eq!(mime_type(Path::new("a/b/style.css")), "text/css");
        assert_eq!(mime_type(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("notes.txt")), "text/plain");
    }

    #[test]
    fn test_mime_case_insensitive() {
        assert_eq!(mime_type(Path::new("PHOTO.PNG")), "image/png");
        assert_eq!(mime_type(Path::new("Page.HtM")), "text/html");
    }

    #[test]
    fn test_mime_fallback() {
        assert_eq!(mime_type(Path::new("archive.tar.xz")), DEFAULT_MIME);
        assert_eq!(mime_type(Path::new("Makefile")), DEFAULT_MIME);
        assert_eq!(mime_type(Path::new(".bashrc")), DEFAULT_MIME);
    }

    #[test]
    fn test_open_uses_stat_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, b"{\"a\":1}").unwrap();
        let meta = fs::metadata(&path).unwrap();

        let body = FileBody::open(&path, &meta).unwrap();
        assert_eq!(body.len, 7);
        assert_eq!(body.content_type, "application/json");
    }

    #[test]
    fn test_open_missing() {
        let dir = TempDir::new().unwrap();
        let meta = fs::metadata(dir.path()).unwrap();
        let result = FileBody::open(&dir.path().join("gone.txt"), &meta);
        assert!(matches!(result, Err(RequestError::NotFound)));
    }

    #[tokio::test]
    async fn test_stream_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
        fs::write(&path, &data).unwrap();
        let meta = fs::metadata(&path).unwrap();

        let mut stream = FileBody::open(&path, &meta).unwrap().into_stream();
        let (out, err) = collect(&mut stream).await;
        assert!(err.is_none());
        assert_eq!(out, data);
        assert_eq!(stream.sent, 20_000);
    }

    #[tokio::test]
    async fn test_stream_caps_at_stat_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("growing.log");
        fs::write(&path, b"1234").unwrap();
        let meta = fs::metadata(&path).unwrap();
        fs::write(&path, b"12345678").unwrap();

        let mut stream = FileBody::open(&path, &meta).unwrap().into_stream();
        let (out, err) = collect(&mut stream).await;
        assert!(err.is_none());
        assert_eq!(out, b"1234");
    }

    #[tokio::test]
    async fn test_stream_shrunk_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shrinking.log");
        fs::write(&path, b"12345678").unwrap();
        let meta = fs::metadata(&path).unwrap();
        fs::write(&path, b"1234").unwrap();

        let mut stream = FileBody::open(&path, &meta).unwrap().into_stream();
        let (out, err) = collect(&mut stream).await;
        assert_eq!(out, b"1234");
        assert_eq!(err.unwrap().kind(), io::ErrorKind::UnexpectedEof);
        assert!(stream.next().await.is_none());
    }

    struct Failing {
        left: usize,
    }

    impl AsyncRead for Failing {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.left == 0 {
                return Poll::Ready(Err(io::Error::other("disk gone")));
            }
            let n = self.left.min(buf.remaining());
            buf.put_slice(&vec![b'x'; n]);
            self.left -= n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_stream_read_error_ends_body() {
        let mut stream = BodyStream::new(Failing { left: 10 }, 100, PathBuf::from("f"));
        let (out, err) = collect(&mut stream).await;
        assert_eq!(out.len(), 10);
        assert_eq!(err.unwrap().kind(), io::ErrorKind::Other);
        assert_eq!(stream.sent, 10);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_reading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        fs::write(&path, vec![1u8; 4 * 1024 * 1024]).unwrap();
        let meta = fs::metadata(&path).unwrap();

        let mut stream = FileBody::open(&path, &meta).unwrap().into_stream();
        for _ in 0..2 {
            stream.next().await.unwrap().unwrap();
        }
        assert!(stream.sent > 0);
        assert!(stream.sent < stream.expected / 8);
    }
}
