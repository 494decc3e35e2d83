//! PathKey - reversible node identifiers for the explorer tree
//!
//! A key is the node's full path with every `/` replaced by [`KEY_SEPARATOR`].
//! Names can never contain the separator (see `sanitize`), so the mapping is
//! injective and a key decodes back to exactly one path.

use crate::{FsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Character substituted for `/` inside node keys
pub const KEY_SEPARATOR: char = '|';

/// Opaque identifier of a tree node, derived from its full path
///
/// The empty key is the root sentinel (the top-level list).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(String);

impl NodeKey {
    /// The root sentinel
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Encode a full path (`src/lib/index.js`) into a key
    pub fn encode(path: &str) -> Self {
        let trimmed = path.trim_matches('/');
        Self(trimmed.replace('/', &KEY_SEPARATOR.to_string()))
    }

    /// Wrap a raw key string received from a collaborator
    ///
    /// No validation happens here; [`NodeKey::decode`] rejects malformed keys.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the key back into its full path
    ///
    /// Fails with `InvalidKey` when the key contains a raw `/`, an empty
    /// segment, or a `.`/`..` segment.
    pub fn decode(&self) -> Result<String> {
        if self.is_root() {
            return Ok(String::new());
        }

        if self.0.contains('/') {
            return Err(FsError::InvalidKey(self.0.clone()));
        }

        let mut path = String::with_capacity(self.0.len());
        for (i, segment) in self.0.split(KEY_SEPARATOR).enumerate() {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(FsError::InvalidKey(self.0.clone()));
            }
            if i > 0 {
                path.push('/');
            }
            path.push_str(segment);
        }

        Ok(path)
    }

    /// Path of the containing directory (`""` for top-level nodes)
    pub fn parent_path(&self) -> Result<String> {
        let path = self.decode()?;
        Ok(parent_of(&path).to_string())
    }

    /// Key of the containing directory (root sentinel for top-level nodes)
    pub fn parent(&self) -> Result<NodeKey> {
        Ok(NodeKey::encode(&self.parent_path()?))
    }

    /// Final path segment
    pub fn name(&self) -> Result<String> {
        let path = self.decode()?;
        Ok(file_name_of(&path).to_string())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for NodeKey {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}

/// Join a directory path and a name (`""` is the root directory)
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Directory part of a path (`""` for top-level paths)
pub fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Final segment of a path
pub fn file_name_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let key = NodeKey::encode("src/components/App.tsx");
        assert_eq!(key.as_str(), "src|components|App.tsx");
        assert_eq!(key.decode().unwrap(), "src/components/App.tsx");
    }

    #[test]
    fn test_dashes_survive() {
        // Names with dashes must not be confused with separators
        let key = NodeKey::encode("my-app/file-a.js");
        assert_eq!(key.decode().unwrap(), "my-app/file-a.js");
        assert_ne!(key, NodeKey::encode("my/app/file/a.js"));
    }

    #[test]
    fn test_parent_path() {
        let key = NodeKey::encode("a/b/c.txt");
        assert_eq!(key.parent_path().unwrap(), "a/b");
        assert_eq!(key.parent().unwrap(), NodeKey::encode("a/b"));

        let top = NodeKey::encode("index.js");
        assert_eq!(top.parent_path().unwrap(), "");
        assert!(top.parent().unwrap().is_root());
    }

    #[test]
    fn test_root_sentinel() {
        let root = NodeKey::root();
        assert!(root.is_root());
        assert_eq!(root.decode().unwrap(), "");
        assert_eq!(NodeKey::encode(""), root);
    }

    #[test]
    fn test_malformed_keys_rejected() {
        for raw in ["a/b", "a||b", "|a", "a|", "a|..|b", "."] {
            let key = NodeKey::from_raw(raw);
            assert_eq!(key.decode(), Err(FsError::InvalidKey(raw.to_string())));
        }
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("lib", "a.txt"), "lib/a.txt");
        assert_eq!(parent_of("lib/src/a.txt"), "lib/src");
        assert_eq!(file_name_of("lib/src/a.txt"), "a.txt");
        assert_eq!(file_name_of("a.txt"), "a.txt");
    }
}
