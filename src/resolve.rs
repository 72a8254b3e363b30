//! Request target to filesystem path
//!
//! Resolution is purely lexical: decode, join onto the root, collapse `.` and
//! `..`, then require the result to stay under the root component-wise. The
//! handler repeats the containment check on the canonical path once the target
//! is known to exist, which is what catches symlinks.

use crate::error::{RequestError, RequestResult};
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};

/// A request target that passed the containment check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute filesystem path under the root
    pub fs_path: PathBuf,
    /// Normalized URL path, always starting with `/`
    pub url_path: String,
}

impl ResolvedPath {
    /// True when this is the server root itself
    pub fn is_root(&self) -> bool {
        self.url_path == "/"
    }
}

/// Resolve a raw request target against `root`.
///
/// `root` must be absolute and normalized.
pub fn resolve(root: &Path, target: &str) -> RequestResult<ResolvedPath> {
    let decoded = decode(path_part(target))?;
    let joined = root.join(decoded.trim_start_matches('/'));
    let fs_path = normalize(&joined);

    let relative = fs_path
        .strip_prefix(root)
        .map_err(|_| RequestError::Forbidden)?;
    log::debug!("resolved {:?} to {}", target, fs_path.display());

    let url_path = url_path_of(relative);
    Ok(ResolvedPath { fs_path, url_path })
}

/// Strip the query string and fragment
fn path_part(target: &str) -> &str {
    target
        .split(['?', '#'])
        .next()
        .unwrap_or("/")
}

/// Percent-decode a URL path
pub fn decode(path: &str) -> RequestResult<String> {
    if let Some(pos) = malformed_escape(path) {
        return Err(RequestError::Decode(format!("bad escape at byte {}", pos)));
    }
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map_err(|e| RequestError::Decode(e.to_string()))?;
    if decoded.contains('\0') {
        return Err(RequestError::Decode("NUL byte in path".into()));
    }
    Ok(decoded.into_owned())
}

/// Position of the first `%` not followed by two hex digits
fn malformed_escape(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    bytes.iter().enumerate().find_map(|(i, &b)| {
        if b != b'%' {
            return None;
        }
        match bytes.get(i + 1..i + 3) {
            Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => None,
            _ => Some(i),
        }
    })
}

/// Normalize a path (resolve . and ..) without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            c => result.push(c),
        }
    }
    result
}

fn url_path_of(relative: &Path) -> String {
    let mut url = String::from("/");
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    url.push_str(&segments.join("/"));
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/www")
    }

    #[test]
    fn test_resolve_root() {
        let r = resolve(&root(), "/").unwrap();
        assert_eq!(r.fs_path, root());
        assert_eq!(r.url_path, "/");
        assert!(r.is_root());
    }

    #[test]
    fn test_resolve_nested() {
        let r = resolve(&root(), "/docs/readme.txt").unwrap();
        assert_eq!(r.fs_path, PathBuf::from("/srv/www/docs/readme.txt"));
        assert_eq!(r.url_path, "/docs/readme.txt");
        assert!(!r.is_root());
    }

    #[test]
    fn test_resolve_collapses_dots() {
        let r = resolve(&root(), "/a/./b/../c/").unwrap();
        assert_eq!(r.fs_path, PathBuf::from("/srv/www/a/c"));
        assert_eq!(r.url_path, "/a/c");
    }

    #[test]
    fn test_resolve_decodes() {
        let r = resolve(&root(), "/my%20file%C3%A9.txt").unwrap();
        assert_eq!(r.fs_path, PathBuf::from("/srv/www/my fileé.txt"));
    }

    #[test]
    fn test_resolve_ignores_query() {
        let r = resolve(&root(), "/a.txt?download=1#top").unwrap();
        assert_eq!(r.fs_path, PathBuf::from("/srv/www/a.txt"));
    }

    #[test]
    fn test_traversal_forbidden() {
        for target in [
            "/../../etc/passwd",
            "/..",
            "/a/../../etc",
            "/%2e%2e/%2e%2e/etc/passwd",
            "/..%2f..%2fetc%2fpasswd",
        ] {
            assert!(
                matches!(resolve(&root(), target), Err(RequestError::Forbidden)),
                "{} should be forbidden",
                target
            );
        }
    }

    #[test]
    fn test_sibling_prefix_forbidden() {
        // "/srv/www-evil" shares a string prefix with the root
        let result = resolve(&root(), "/../www-evil/secret");
        assert!(matches!(result, Err(RequestError::Forbidden)));
    }

    #[test]
    fn test_climb_and_return_allowed() {
        let r = resolve(&root(), "/../www/index.html").unwrap();
        assert_eq!(r.fs_path, PathBuf::from("/srv/www/index.html"));
    }

    #[test]
    fn test_malformed_escape() {
        for target in ["/%", "/%2", "/%zz", "/a%g1"] {
            assert!(
                matches!(resolve(&root(), target), Err(RequestError::Decode(_))),
                "{} should fail to decode",
                target
            );
        }
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(decode("/%ff%fe"), Err(RequestError::Decode(_))));
    }

    #[test]
    fn test_nul_rejected() {
        assert!(matches!(decode("/a%00b"), Err(RequestError::Decode(_))));
    }

    #[test]
    fn test_malformed_escape_position() {
        assert_eq!(malformed_escape("/ok%20/fine"), None);
        assert_eq!(malformed_escape("/bad%2"), Some(4));
    }
}
