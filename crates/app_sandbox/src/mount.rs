//! Mount format
//!
//! The sandbox expects a nested mapping where each key is one path segment
//! and each value is either `{ "directory": { ... } }` or
//! `{ "file": { "contents": "..." } }`.

use crate::Result;
use app_fs::{ContentMap, Node, VirtualTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::Xxh3;

/// Name of the project manifest at the sandbox root
pub const MANIFEST_FILE: &str = "package.json";

const DEFAULT_ENTRY_SOURCE: &str = "\
console.log('Welcome to the online code editor!');
console.log('Write and run Node.js code here.');
console.log('Edit index.js and run npm start to see the result.');";

const DEFAULT_README: &str = "\
# Code editor project

A project running inside the editor's sandbox.

## Getting started

1. Run `npm install` in the terminal to install dependencies
2. Run `npm start` to start the project
3. Or run `npm run dev` to restart automatically on changes

## Files

- `index.js`: program entry point
- `package.json`: project manifest
- `README.md`: this file
";

/// One entry of a [`MountTree`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountEntry {
    Directory(MountTree),
    File { contents: String },
}

/// Nested directory structure handed to [`Sandbox::mount`](crate::Sandbox::mount)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountTree {
    entries: BTreeMap<String, MountEntry>,
}

/// A file in the way of a directory is replaced by an empty one
fn as_directory_mut(entry: &mut MountEntry) -> &mut MountTree {
    match entry {
        MountEntry::Directory(tree) => tree,
        MountEntry::File { .. } => {
            *entry = MountEntry::Directory(MountTree::new());
            as_directory_mut(entry)
        }
    }
}

impl MountTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the explorer tree, reading bodies from its content map
    ///
    /// Files without a content entry mount as empty files.
    pub fn from_tree(tree: &VirtualTree) -> Self {
        fn fill(target: &mut MountTree, nodes: &[Node], contents: &ContentMap) {
            for node in nodes {
                let entry = match node {
                    Node::Directory(dir) => {
                        let mut sub = MountTree::new();
                        fill(&mut sub, dir.children(), contents);
                        MountEntry::Directory(sub)
                    }
                    Node::File(file) => MountEntry::File {
                        contents: contents.get(file.content_ref()).unwrap_or_default().to_string(),
                    },
                };
                target.entries.insert(node.name().to_string(), entry);
            }
        }

        let mut mount = MountTree::new();
        fill(&mut mount, tree.roots(), tree.contents());
        mount
    }

    /// Build from a flat `(path, contents)` list
    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut mount = MountTree::new();
        for (path, contents) in files {
            mount.insert_file(path.as_ref(), contents);
        }
        mount
    }

    /// The starter project: manifest, entry file and readme
    pub fn default_project(manifest: &ProjectManifest) -> Result<Self> {
        let mut mount = MountTree::new();
        mount.insert_file(MANIFEST_FILE, manifest.to_json()?);
        mount.insert_file(&manifest.main, DEFAULT_ENTRY_SOURCE);
        mount.insert_file("README.md", DEFAULT_README);
        Ok(mount)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MountEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Look up an entry by slash-separated path
    pub fn lookup(&self, path: &str) -> Option<&MountEntry> {
        let path = path.trim_matches('/');
        match path.split_once('/') {
            None => self.entries.get(path),
            Some((head, rest)) => match self.entries.get(head)? {
                MountEntry::Directory(sub) => sub.lookup(rest),
                MountEntry::File { .. } => None,
            },
        }
    }

    /// Insert a file, creating parent directories
    ///
    /// A file standing where a directory is needed is replaced.
    pub fn insert_file(&mut self, path: &str, contents: impl Into<String>) {
        let path = path.trim_matches('/');
        match path.split_once('/') {
            None => {
                self.entries.insert(
                    path.to_string(),
                    MountEntry::File {
                        contents: contents.into(),
                    },
                );
            }
            Some((head, rest)) => self.directory_mut(head).insert_file(rest, contents),
        }
    }

    /// Create a (possibly nested) directory
    pub fn insert_directory(&mut self, path: &str) -> &mut MountTree {
        let path = path.trim_matches('/');
        match path.split_once('/') {
            None => self.directory_mut(path),
            Some((head, rest)) => self.directory_mut(head).insert_directory(rest),
        }
    }

    fn directory_mut(&mut self, name: &str) -> &mut MountTree {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| MountEntry::Directory(MountTree::new()));
        as_directory_mut(entry)
    }

    pub fn has_manifest(&self) -> bool {
        matches!(self.entries.get(MANIFEST_FILE), Some(MountEntry::File { .. }))
    }

    /// Add the manifest when missing; returns true if it was added
    pub fn ensure_manifest(&mut self, manifest: &ProjectManifest) -> Result<bool> {
        if self.has_manifest() {
            return Ok(false);
        }
        self.insert_file(MANIFEST_FILE, manifest.to_json()?);
        Ok(true)
    }

    /// Lay `other` over this tree: directories merge, files replace
    pub fn overlay(&mut self, other: MountTree) {
        for (name, entry) in other.entries {
            match entry {
                MountEntry::Directory(sub) => self.directory_mut(&name).overlay(sub),
                file @ MountEntry::File { .. } => {
                    self.entries.insert(name, file);
                }
            }
        }
    }

    /// Pre-order listing of `(path, contents)`; directories carry `None`
    pub fn flatten(&self) -> Vec<(String, Option<&str>)> {
        fn walk<'a>(tree: &'a MountTree, prefix: &str, out: &mut Vec<(String, Option<&'a str>)>) {
            for (name, entry) in &tree.entries {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                match entry {
                    MountEntry::Directory(sub) => {
                        out.push((path.clone(), None));
                        walk(sub, &path, out);
                    }
                    MountEntry::File { contents } => out.push((path, Some(contents.as_str()))),
                }
            }
        }

        let mut out = Vec::new();
        walk(self, "", &mut out);
        out
    }

    pub fn file_count(&self) -> usize {
        self.flatten().iter().filter(|(_, body)| body.is_some()).count()
    }

    /// Digest of every path, entry kind and body
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for (path, body) in self.flatten() {
            hasher.update(path.as_bytes());
            match body {
                None => hasher.update(&[0]),
                Some(body) => {
                    hasher.update(&[1]);
                    hasher.update(body.as_bytes());
                    hasher.update(&[0]);
                }
            }
        }
        hasher.digest()
    }
}

/// `package.json` contents for a fresh project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectManifest {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub main: String,
    pub scripts: BTreeMap<String, String>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
}

impl Default for ProjectManifest {
    fn default() -> Self {
        Self {
            name: "code-editor-project".to_string(),
            version: "1.0.0".to_string(),
            description: Some("Online code editor project".to_string()),
            main: "index.js".to_string(),
            scripts: BTreeMap::from([
                ("start".to_string(), "node index.js".to_string()),
                ("dev".to_string(), "nodemon index.js".to_string()),
            ]),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::from([("nodemon".to_string(), "^2.0.22".to_string())]),
        }
    }
}

impl ProjectManifest {
    /// Pretty-printed JSON, two-space indented
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
