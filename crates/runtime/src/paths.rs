//! Translation between local filesystem paths and the server's path
//! space.
//!
//! Only a single base directory exists on either side, so translation
//! keeps the basename of a path and swaps the base; any other directory
//! information is discarded. The local base is bound lazily, from the
//! first path that passes through, and never rebound. Lookup keys are
//! lowercased absolute forward-slash paths because the filesystems on
//! either end may be case-insensitive.

use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, lexically normalized, forward-slash
/// string. Relative paths are resolved against the current directory.
pub fn resolve(path: &str) -> String {
    let path = path.replace('\\', "/");
    let joined = if Path::new(&path).is_absolute() {
        PathBuf::from(&path)
    } else {
        std::env::current_dir().unwrap_or_default().join(&path)
    };
    normalize_components(&joined)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Normalized lookup key for a path: absolute, forward slashes,
/// lowercased.
pub fn normalize_key(path: &str) -> String {
    resolve(path).to_lowercase()
}

/// Final component of a path, accepting either separator style.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "",
    }
}

fn join(base: &str, filename: &str) -> String {
    if base.is_empty() {
        return filename.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), filename)
}

fn normalize_components(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Maps between the local path space and the server's.
#[derive(Debug, Default)]
pub struct PathMap {
    local_base: String,
    server_base: String,
}

impl PathMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_server_base(&mut self, base: impl Into<String>) {
        self.server_base = base.into();
    }

    /// Translate a local path into the server's path space. Identity when
    /// no server base directory is configured.
    pub fn to_server_path(&mut self, pathname: &str) -> String {
        if self.server_base.is_empty() {
            return pathname.to_string();
        }
        self.bind_local_base(pathname);
        join(&self.server_base, basename(pathname)).replace('\\', "/")
    }

    /// Translate a server-side path into the local path space.
    pub fn to_local_path(&mut self, pathname: &str) -> String {
        if pathname.is_empty() {
            return String::new();
        }
        let pathname = pathname.replace('\\', "/");
        self.bind_local_base(&pathname);
        join(&self.local_base, basename(&pathname)).replace('\\', "/")
    }

    /// Bind the local base directory exactly once, from the first path
    /// that passes through; later paths never rebind it.
    fn bind_local_base(&mut self, pathname: &str) {
        if !self.local_base.is_empty() {
            return;
        }
        let resolved = resolve(pathname);
        self.local_base = dirname(&resolved).to_string();
    }
}
