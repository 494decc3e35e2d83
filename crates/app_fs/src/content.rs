//! Content map - path-keyed store of file bodies

use std::collections::BTreeMap;

/// Mapping from full file path to its text content
///
/// Kept separate from the tree structure; File nodes reference entries by
/// their `content_ref`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentMap {
    entries: BTreeMap<String, String>,
}

impl ContentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> Option<String> {
        self.entries.insert(path.into(), content.into())
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.entries.remove(path)
    }

    /// Move an entry to a new key; returns false if nothing was stored under `from`
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.entries.remove(from) {
            Some(content) => {
                self.entries.insert(to.to_string(), content);
                true
            }
            None => false,
        }
    }

    /// Remove every entry under the directory `dir` (`dir/...`)
    ///
    /// Entries that merely share a textual prefix (`dir2/...`) are kept.
    pub fn remove_under(&mut self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir);
        let doomed: Vec<String> = self
            .entries
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, _)| path.clone())
            .collect();

        for path in &doomed {
            self.entries.remove(path);
        }

        doomed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl FromIterator<(String, String)> for ContentMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_moves_entry() {
        let mut map = ContentMap::new();
        map.insert("a.txt", "x");
        assert!(map.rename("a.txt", "b.txt"));
        assert_eq!(map.get("b.txt"), Some("x"));
        assert!(!map.contains("a.txt"));
        assert!(!map.rename("missing", "other"));
    }

    #[test]
    fn test_remove_under_respects_segment_boundary() {
        let mut map = ContentMap::new();
        map.insert("src/a.js", "1");
        map.insert("src/lib/b.js", "2");
        map.insert("src2/c.js", "3");
        map.insert("src.js", "4");

        let mut removed = map.remove_under("src");
        removed.sort();
        assert_eq!(removed, vec!["src/a.js".to_string(), "src/lib/b.js".to_string()]);
        assert_eq!(map.len(), 2);
        assert!(map.contains("src2/c.js"));
        assert!(map.contains("src.js"));
    }
}
