//! Directory listing pages
//!
//! Entries are read fresh for every request. Anything taken from the
//! filesystem or the URL is escaped before it lands in the markup.

use crate::error::RequestResult;
use chrono::{DateTime, Local};
use html_escape::{encode_double_quoted_attribute, encode_text};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::cmp::Ordering;
use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Bytes escaped when a name becomes one URL path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// One row of a listing
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    /// Absolute, percent-encoded link target
    pub href: String,
    /// Files only
    pub size: Option<u64>,
    /// `None` for the parent pseudo-entry
    pub modified: Option<SystemTime>,
}

impl Entry {
    fn parent(url_path: &str) -> Self {
        Self {
            name: "..".into(),
            is_dir: true,
            href: parent_url(url_path),
            size: None,
            modified: None,
        }
    }

    fn is_parent(&self) -> bool {
        self.name == ".." && self.modified.is_none()
    }
}

/// Listing order: `..` first, then directories, then files, each by name
fn listing_order(a: &Entry, b: &Entry) -> Ordering {
    b.is_parent()
        .cmp(&a.is_parent())
        .then_with(|| b.is_dir.cmp(&a.is_dir))
        .then_with(|| a.name.cmp(&b.name))
}

/// Read and sort the entries of `dir`, which is served at `url_path`.
///
/// A failed read of the directory or of any child is an error; a partial
/// listing is never returned.
pub fn read_entries(dir: &Path, url_path: &str) -> RequestResult<Vec<Entry>> {
    let base = dir_url(url_path);
    let mut entries = Vec::new();

    if url_path != "/" {
        entries.push(Entry::parent(url_path));
    }

    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        let meta = fs::metadata(dirent.path())?;
        let name = dirent.file_name().to_string_lossy().into_owned();
        let is_dir = meta.is_dir();

        let mut href = format!("{}{}", base, utf8_percent_encode(&name, SEGMENT));
        if is_dir {
            href.push('/');
        }

        entries.push(Entry {
            name,
            is_dir,
            href,
            size: (!is_dir).then(|| meta.len()),
            modified: Some(meta.modified()?),
        });
    }

    entries.sort_by(listing_order);
    Ok(entries)
}

/// Produce the full listing page for `dir`
pub fn generate(dir: &Path, url_path: &str) -> RequestResult<String> {
    let entries = read_entries(dir, url_path)?;
    Ok(render(url_path, &entries))
}

/// Render entries into an HTML document
pub fn render(url_path: &str, entries: &[Entry]) -> String {
    let title = encode_text(url_path);
    let mut html = String::with_capacity(4096 + entries.len() * 256);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"UTF-8\">\n  \
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n  \
         <title>Index of {title}</title>\n  <style>{STYLE}</style>\n</head>\n<body>\n  \
         <h1>Index of {title}</h1>\n  <div class=\"file-list\">\n"
    );

    for entry in entries {
        let icon = if entry.is_dir { "📁" } else { "📄" };
        let class = if entry.is_dir { "name directory" } else { "name" };
        let size = entry.size.map(format_size).unwrap_or_default();
        let modified = entry.modified.map(format_time).unwrap_or_default();

        let _ = write!(
            html,
            "    <a href=\"{href}\" class=\"file-item\">\n      \
             <span class=\"icon\">{icon}</span>\n      \
             <span class=\"{class}\">{name}</span>\n      \
             <span class=\"size\">{size}</span>\n      \
             <span class=\"modified\">{modified}</span>\n    </a>\n",
            href = encode_double_quoted_attribute(&entry.href),
            name = encode_text(&entry.name),
        );
    }

    html.push_str("  </div>\n</body>\n</html>\n");
    html
}

/// Human-readable size in binary units, at most two decimals.
///
/// 1536 -> "1.5 KB". Anything past gigabytes is still shown in GB.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".into();
    }

    let mut unit = 0;
    while unit + 1 < SIZE_UNITS.len() && bytes >= 1u64 << (10 * (unit + 1)) {
        unit += 1;
    }

    let scaled = bytes as f64 / (1u64 << (10 * unit)) as f64;
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[unit])
}

/// Local time, second precision
pub fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// The URL path with exactly one trailing slash, percent-encoded per segment
fn dir_url(url_path: &str) -> String {
    let mut url = String::from("/");
    for segment in url_path.split('/').filter(|s| !s.is_empty()) {
        let _ = write!(url, "{}/", utf8_percent_encode(segment, SEGMENT));
    }
    url
}

/// Link to the directory containing `url_path`
fn parent_url(url_path: &str) -> String {
    let trimmed = url_path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => dir_url(&trimmed[..idx]),
        None => "/".into(),
    }
}

const STYLE: &str = r#"
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
      max-width: 1200px;
      margin: 0 auto;
      padding: 20px;
      background-color: #f5f5f5;
    }
    h1 {
      color: #333;
      border-bottom: 2px solid #007bff;
      padding-bottom: 10px;
      word-break: break-all;
    }
    .file-list {
      background: white;
      border-radius: 8px;
      box-shadow: 0 2px 4px rgba(0,0,0,0.1);
      overflow: hidden;
    }
    .file-item {
      display: flex;
      align-items: center;
      padding: 12px 20px;
      border-bottom: 1px solid #eee;
      text-decoration: none;
      color: #333;
      transition: background-color 0.2s;
    }
    .file-item:hover { background-color: #f8f9fa; }
    .file-item:last-child { border-bottom: none; }
    .icon {
      margin-right: 12px;
      font-size: 20px;
      width: 24px;
      text-align: center;
    }
    .name { flex: 1; font-weight: 500; }
    .size {
      color: #666;
      margin-right: 20px;
      min-width: 100px;
      text-align: right;
    }
    .modified {
      color: #999;
      min-width: 180px;
      text-align: right;
      font-size: 14px;
    }
    .directory { color: #007bff; }
    @media (max-width: 768px) {
      .size, .modified { display: none; }
    }
  "#;
