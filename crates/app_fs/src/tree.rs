//! Virtual tree store
//!
//! Owns the hierarchical namespace of directory/file nodes and the parallel
//! [`ContentMap`]. All mutations are synchronous and all-or-nothing: every
//! error is detected before the first change is made.

use crate::path_key::{file_name_of, join_path, parent_of};
use crate::{validate_name, ContentMap, FileType, FsError, NodeKey, Result};
use serde::{Deserialize, Serialize};

/// A node of the explorer tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directory(DirectoryNode),
    File(FileNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    key: NodeKey,
    path: String,
    name: String,
    children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    key: NodeKey,
    path: String,
    name: String,
    content_ref: String,
}

impl DirectoryNode {
    fn new(path: String) -> Self {
        Self {
            key: NodeKey::encode(&path),
            name: file_name_of(&path).to_string(),
            path,
            children: Vec::new(),
        }
    }

    /// Children, always sorted directories-first then by name
    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

impl FileNode {
    fn new(path: String) -> Self {
        Self {
            key: NodeKey::encode(&path),
            name: file_name_of(&path).to_string(),
            content_ref: path.clone(),
            path,
        }
    }

    /// Content map key holding this file's body
    pub fn content_ref(&self) -> &str {
        &self.content_ref
    }
}

impl Node {
    pub fn key(&self) -> &NodeKey {
        match self {
            Node::Directory(d) => &d.key,
            Node::File(f) => &f.key,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Directory(d) => &d.name,
            Node::File(f) => &f.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Node::Directory(d) => &d.path,
            Node::File(f) => &f.path,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    /// Move this node (and its subtree) to `new_path`, recording the
    /// content refs that changed as `(old, new)` pairs.
    fn relocate(&mut self, new_path: &str, moves: &mut Vec<(String, String)>) {
        match self {
            Node::File(f) => {
                let old_ref = std::mem::replace(&mut f.content_ref, new_path.to_string());
                moves.push((old_ref, new_path.to_string()));
                f.path = new_path.to_string();
                f.key = NodeKey::encode(new_path);
                f.name = file_name_of(new_path).to_string();
            }
            Node::Directory(d) => {
                d.path = new_path.to_string();
                d.key = NodeKey::encode(new_path);
                d.name = file_name_of(new_path).to_string();
                for child in &mut d.children {
                    let child_path = join_path(new_path, child.name());
                    child.relocate(&child_path, moves);
                }
            }
        }
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a FileNode>) {
        match self {
            Node::File(f) => out.push(f),
            Node::Directory(d) => {
                for child in &d.children {
                    child.collect_files(out);
                }
            }
        }
    }
}

/// Directories first, then case-sensitive lexicographic by name
pub(crate) fn sort_nodes(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name().cmp(b.name()))
    });
}

fn find_in<'a>(nodes: &'a [Node], path: &str) -> Option<&'a Node> {
    let (head, rest) = match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let node = nodes.iter().find(|n| n.name() == head)?;
    match (rest, node) {
        (None, _) => Some(node),
        (Some(rest), Node::Directory(d)) => find_in(&d.children, rest),
        (Some(_), Node::File(_)) => None,
    }
}

fn find_in_mut<'a>(nodes: &'a mut [Node], path: &str) -> Option<&'a mut Node> {
    let (head, rest) = match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let node = nodes.iter_mut().find(|n| n.name() == head)?;
    match rest {
        None => Some(node),
        Some(rest) => match node {
            Node::Directory(d) => find_in_mut(&mut d.children, rest),
            Node::File(_) => None,
        },
    }
}

/// Tree behaviour knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    /// Suffix inserted before the extension when a paste collides
    pub copy_suffix: String,
    /// Body reported for files whose content has not been loaded yet
    pub loading_placeholder: String,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            copy_suffix: " - copy".to_string(),
            loading_placeholder: "// Loading file content...".to_string(),
        }
    }
}

/// The single clipboard slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEntry {
    pub source: NodeKey,
    pub is_directory: bool,
    pub display_name: String,
    pub is_cut: bool,
}

/// Result of a successful paste
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteOutcome {
    /// Key of the node at its destination
    pub key: NodeKey,
    /// A collision suffix was applied
    pub renamed: bool,
    /// The source was moved rather than duplicated
    pub moved: bool,
}

/// Ticket for a file body that is still being loaded
///
/// Resolve it with [`VirtualTree::resolve_read`]; stale tickets are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRead {
    path: String,
}

impl PendingRead {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::encode(&self.path)
    }
}

/// What the editor needs to open a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub file_type: FileType,
    pub language: &'static str,
    pub content: String,
    /// False while the body is still pending and `content` is the placeholder
    pub loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    File,
    Directory,
}

/// In-memory explorer tree plus its content map and clipboard
#[derive(Debug, Clone, Default)]
pub struct VirtualTree {
    roots: Vec<Node>,
    contents: ContentMap,
    clipboard: Option<ClipboardEntry>,
    options: TreeOptions,
}

impl VirtualTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TreeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Build a tree from `(path, content)` pairs, creating directories as needed
    pub fn from_files<I, P, C>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut tree = Self::new();
        for (path, content) in files {
            tree.insert_file_at(path.as_ref(), Some(content.into()))?;
        }
        Ok(tree)
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// Top-level nodes
    pub fn roots(&self) -> &[Node] {
        &self.roots
    }

    pub fn contents(&self) -> &ContentMap {
        &self.contents
    }

    pub fn clipboard(&self) -> Option<&ClipboardEntry> {
        self.clipboard.as_ref()
    }

    /// Look up a node by key
    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        let path = key.decode().ok()?;
        self.find(&path)
    }

    /// Look up a node by full path
    pub fn find(&self, path: &str) -> Option<&Node> {
        if path.is_empty() {
            return None;
        }
        find_in(&self.roots, path)
    }

    /// Every file node, depth-first
    pub fn files(&self) -> Vec<&FileNode> {
        let mut out = Vec::new();
        for node in &self.roots {
            node.collect_files(&mut out);
        }
        out
    }

    pub(crate) fn find_mut(&mut self, path: &str) -> Option<&mut Node> {
        if path.is_empty() {
            return None;
        }
        find_in_mut(&mut self.roots, path)
    }

    pub(crate) fn children_of(&self, dir: &str) -> Option<&[Node]> {
        if dir.is_empty() {
            return Some(&self.roots);
        }
        match self.find(dir)? {
            Node::Directory(d) => Some(&d.children),
            Node::File(_) => None,
        }
    }

    pub(crate) fn children_of_mut(&mut self, dir: &str) -> Option<&mut Vec<Node>> {
        if dir.is_empty() {
            return Some(&mut self.roots);
        }
        match self.find_mut(dir)? {
            Node::Directory(d) => Some(&mut d.children),
            Node::File(_) => None,
        }
    }

    /// Path of an existing, non-root node
    fn existing_path(&self, key: &NodeKey) -> Result<String> {
        let path = key.decode()?;
        if self.find(&path).is_none() {
            return Err(FsError::NotFound(key.to_string()));
        }
        Ok(path)
    }

    /// Directory a new child of `key` lands in: the root, the directory
    /// itself, or a file's containing directory.
    pub(crate) fn container_dir(&self, key: &NodeKey) -> Result<String> {
        if key.is_root() {
            return Ok(String::new());
        }
        let path = key.decode()?;
        match self.find(&path) {
            Some(Node::Directory(_)) => Ok(path),
            Some(Node::File(_)) => Ok(parent_of(&path).to_string()),
            None => Err(FsError::NotFound(key.to_string())),
        }
    }

    pub fn create_file(&mut self, parent: &NodeKey, name: &str) -> Result<NodeKey> {
        self.create_node(parent, name, NodeKind::File)
    }

    pub fn create_directory(&mut self, parent: &NodeKey, name: &str) -> Result<NodeKey> {
        self.create_node(parent, name, NodeKind::Directory)
    }

    fn create_node(&mut self, parent: &NodeKey, name: &str, kind: NodeKind) -> Result<NodeKey> {
        validate_name(name)?;
        let dir = self.container_dir(parent)?;
        let path = join_path(&dir, name);

        let siblings = self
            .children_of_mut(&dir)
            .ok_or_else(|| FsError::NotFound(parent.to_string()))?;
        if siblings.iter().any(|n| n.name() == name) {
            return Err(FsError::DuplicateName(name.to_string()));
        }

        let node = match kind {
            NodeKind::File => Node::File(FileNode::new(path.clone())),
            NodeKind::Directory => Node::Directory(DirectoryNode::new(path.clone())),
        };
        siblings.push(node);
        sort_nodes(siblings);

        if kind == NodeKind::File {
            self.contents.insert(path.clone(), String::new());
        }

        tracing::debug!("Created {:?}: {}", kind, path);
        Ok(NodeKey::encode(&path))
    }

    /// Rename a node in place; returns its new key
    ///
    /// Files and every file below a renamed directory have their content
    /// entries migrated to the new paths.
    pub fn rename(&mut self, key: &NodeKey, new_name: &str) -> Result<NodeKey> {
        validate_name(new_name)?;
        let path = self.existing_path(key)?;
        if file_name_of(&path) == new_name {
            return Ok(key.clone());
        }

        let dir = parent_of(&path).to_string();
        let new_path = join_path(&dir, new_name);
        let siblings = self
            .children_of_mut(&dir)
            .ok_or_else(|| FsError::NotFound(key.to_string()))?;

        if siblings.iter().any(|n| n.name() == new_name) {
            return Err(FsError::DuplicateName(new_name.to_string()));
        }

        let old_name = file_name_of(&path);
        let node = siblings
            .iter_mut()
            .find(|n| n.name() == old_name)
            .ok_or_else(|| FsError::NotFound(key.to_string()))?;

        let mut moves = Vec::new();
        node.relocate(&new_path, &mut moves);
        sort_nodes(siblings);

        for (from, to) in &moves {
            self.contents.rename(from, to);
        }

        tracing::debug!("Renamed {} -> {} ({} content entries)", path, new_path, moves.len());
        Ok(NodeKey::encode(&new_path))
    }

    /// Remove a node (and its whole subtree), returning it
    pub fn delete(&mut self, key: &NodeKey) -> Result<Node> {
        let path = self.existing_path(key)?;
        let dir = parent_of(&path).to_string();
        let name = file_name_of(&path).to_string();

        let siblings = self
            .children_of_mut(&dir)
            .ok_or_else(|| FsError::NotFound(key.to_string()))?;
        let idx = siblings
            .iter()
            .position(|n| n.name() == name)
            .ok_or_else(|| FsError::NotFound(key.to_string()))?;
        let node = siblings.remove(idx);

        match &node {
            Node::File(f) => {
                self.contents.remove(&f.content_ref);
            }
            Node::Directory(_) => {
                let removed = self.contents.remove_under(&path);
                tracing::debug!("Dropped {} content entries under {}", removed.len(), path);
            }
        }

        tracing::debug!("Deleted {}", path);
        Ok(node)
    }

    pub fn copy_to_clipboard(&mut self, key: &NodeKey) -> Result<&ClipboardEntry> {
        self.set_clipboard(key, false)
    }

    /// Mark a node for moving; it stays in place until the paste commits
    pub fn cut_to_clipboard(&mut self, key: &NodeKey) -> Result<&ClipboardEntry> {
        self.set_clipboard(key, true)
    }

    fn set_clipboard(&mut self, key: &NodeKey, is_cut: bool) -> Result<&ClipboardEntry> {
        let path = self.existing_path(key)?;
        let is_directory = self.find(&path).is_some_and(Node::is_directory);

        tracing::debug!("Clipboard <- {} (cut: {})", path, is_cut);
        Ok(self.clipboard.insert(ClipboardEntry {
            source: key.clone(),
            is_directory,
            display_name: file_name_of(&path).to_string(),
            is_cut,
        }))
    }

    pub fn clear_clipboard(&mut self) {
        self.clipboard = None;
    }

    /// Whether `key` is currently marked by a pending cut
    pub fn is_cut_pending(&self, key: &NodeKey) -> bool {
        self.clipboard
            .as_ref()
            .is_some_and(|c| c.is_cut && &c.source == key)
    }

    /// Paste the clipboard entry relative to `target`
    ///
    /// A directory target receives the node; a file target places it next
    /// to the file; the root key places it at the top level.
    pub fn paste_from_clipboard(&mut self, target: &NodeKey) -> Result<PasteOutcome> {
        let entry = self.clipboard.clone().ok_or(FsError::EmptyClipboard)?;

        let source_path = entry.source.decode()?;
        if self.find(&source_path).is_none() {
            tracing::warn!("Clipboard source {} no longer exists", source_path);
            self.clipboard = None;
            return Err(FsError::NotFound(entry.source.to_string()));
        }

        let dest_dir = self.container_dir(target)?;
        if !target.is_root() {
            let target_path = target.decode()?;
            if target_path == source_path {
                return Err(FsError::SelfPaste);
            }
            if target_path.starts_with(&format!("{}/", source_path)) {
                return Err(FsError::PasteIntoDescendant);
            }
        }

        let name = file_name_of(&source_path).to_string();
        let is_directory = self.find(&source_path).is_some_and(Node::is_directory);
        let mut dest_path = join_path(&dest_dir, &name);

        if entry.is_cut && dest_path == source_path {
            self.clipboard = None;
            return Ok(PasteOutcome {
                key: entry.source,
                renamed: false,
                moved: true,
            });
        }

        let renamed = self.find(&dest_path).is_some();
        if renamed {
            let unique = self.unique_copy_name(&dest_dir, &name, is_directory);
            dest_path = join_path(&dest_dir, &unique);
        }

        if self.children_of(&dest_dir).is_none() {
            return Err(FsError::NotFound(target.to_string()));
        }

        // Nothing below this point can fail.
        let mut node = if entry.is_cut {
            self.detach(&source_path)
                .ok_or_else(|| FsError::NotFound(entry.source.to_string()))?
        } else {
            self.find(&source_path)
                .cloned()
                .ok_or_else(|| FsError::NotFound(entry.source.to_string()))?
        };

        let mut moves = Vec::new();
        node.relocate(&dest_path, &mut moves);

        for (from, to) in &moves {
            let body = if entry.is_cut {
                self.contents.remove(from)
            } else {
                self.contents.get(from).map(str::to_string)
            };
            self.contents.insert(to.clone(), body.unwrap_or_default());
        }

        if let Some(siblings) = self.children_of_mut(&dest_dir) {
            siblings.push(node);
            sort_nodes(siblings);
        }

        if entry.is_cut {
            self.clipboard = None;
        }

        tracing::debug!(
            "{} {} -> {} ({} files)",
            if entry.is_cut { "Moved" } else { "Copied" },
            source_path,
            dest_path,
            moves.len()
        );

        Ok(PasteOutcome {
            key: NodeKey::encode(&dest_path),
            renamed,
            moved: entry.is_cut,
        })
    }

    fn detach(&mut self, path: &str) -> Option<Node> {
        let name = file_name_of(path);
        let siblings = self.children_of_mut(parent_of(path))?;
        let idx = siblings.iter().position(|n| n.name() == name)?;
        Some(siblings.remove(idx))
    }

    /// First free name of the form `stem - copy.ext`, `stem - copy 2.ext`, ...
    fn unique_copy_name(&self, dir: &str, name: &str, is_directory: bool) -> String {
        let (stem, ext) = match name.rfind('.') {
            Some(idx) if idx > 0 && !is_directory => name.split_at(idx),
            _ => (name, ""),
        };

        let taken = |candidate: &str| {
            self.children_of(dir)
                .is_some_and(|siblings| siblings.iter().any(|n| n.name() == candidate))
        };

        let suffix = &self.options.copy_suffix;
        let mut n = 1usize;
        loop {
            let candidate = if n == 1 {
                format!("{}{}{}", stem, suffix, ext)
            } else {
                format!("{}{} {}{}", stem, suffix, n, ext)
            };
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Open a file for the editor
    pub fn file_info(&self, key: &NodeKey) -> Result<FileInfo> {
        let path = key.decode()?;
        let file = match self.find(&path) {
            Some(Node::File(f)) => f,
            Some(Node::Directory(_)) => {
                return Err(FsError::NotFound(format!("{} is not a file", key)))
            }
            None => return Err(FsError::NotFound(key.to_string())),
        };

        let (content, loaded) = match self.contents.get(&file.content_ref) {
            Some(body) => (body.to_string(), true),
            None => (self.options.loading_placeholder.clone(), false),
        };

        Ok(FileInfo {
            name: file.name.clone(),
            path: file.path.clone(),
            file_type: FileType::from_name(&file.name),
            language: crate::language_mode(&file.name),
            content,
            loaded,
        })
    }

    /// Replace a file's body
    pub fn write_content(&mut self, key: &NodeKey, content: impl Into<String>) -> Result<()> {
        let path = key.decode()?;
        let content_ref = match self.find(&path) {
            Some(Node::File(f)) => f.content_ref.clone(),
            Some(Node::Directory(_)) => {
                return Err(FsError::NotFound(format!("{} is not a file", key)))
            }
            None => return Err(FsError::NotFound(key.to_string())),
        };

        self.contents.insert(content_ref, content);
        Ok(())
    }

    /// Start loading a file body asynchronously
    ///
    /// Any stored body is dropped; the file reports the loading placeholder
    /// until the returned ticket is resolved.
    pub fn begin_read(&mut self, key: &NodeKey) -> Result<PendingRead> {
        let path = key.decode()?;
        match self.find(&path) {
            Some(Node::File(f)) => {
                let content_ref = f.content_ref.clone();
                self.contents.remove(&content_ref);
                Ok(PendingRead { path })
            }
            _ => Err(FsError::NotFound(key.to_string())),
        }
    }

    /// Back-fill a loaded body
    ///
    /// Returns false and discards the content when the file was deleted or
    /// moved, or its body was written, while the read was in flight.
    pub fn resolve_read(&mut self, read: PendingRead, content: String) -> bool {
        let content_ref = match self.find(&read.path) {
            Some(Node::File(f)) if !self.contents.contains(&f.content_ref) => f.content_ref.clone(),
            _ => {
                tracing::debug!("Discarding stale read for {}", read.path);
                return false;
            }
        };

        self.contents.insert(content_ref, content);
        true
    }

    /// Insert a file at `path`, creating missing parent directories
    ///
    /// An existing file keeps its node; `Some(content)` replaces its body and
    /// `None` leaves it pending.
    pub fn insert_file_at(&mut self, path: &str, content: Option<String>) -> Result<NodeKey> {
        let path = path.trim_matches('/');
        let (dir, name) = (parent_of(path).to_string(), file_name_of(path).to_string());
        validate_name(&name)?;

        if !dir.is_empty() {
            self.ensure_directory(&dir)?;
        }

        match self.find(path) {
            Some(Node::Directory(_)) => return Err(FsError::DuplicateName(name)),
            Some(Node::File(_)) => {}
            None => {
                let siblings = self
                    .children_of_mut(&dir)
                    .ok_or_else(|| FsError::NotFound(dir.clone()))?;
                siblings.push(Node::File(FileNode::new(path.to_string())));
                sort_nodes(siblings);
            }
        }

        match content {
            Some(body) => {
                self.contents.insert(path, body);
            }
            None => {
                self.contents.remove(path);
            }
        }

        Ok(NodeKey::encode(path))
    }

    /// Create every missing directory along `path`; existing ones are reused
    pub fn ensure_directory(&mut self, path: &str) -> Result<NodeKey> {
        let path = path.trim_matches('/');
        let mut current = String::new();

        for segment in path.split('/') {
            validate_name(segment)?;
            let next = join_path(&current, segment);

            match self.find(&next) {
                Some(Node::Directory(_)) => {}
                Some(Node::File(_)) => return Err(FsError::DuplicateName(segment.to_string())),
                None => {
                    let siblings = self
                        .children_of_mut(&current)
                        .ok_or_else(|| FsError::NotFound(current.clone()))?;
                    siblings.push(Node::Directory(DirectoryNode::new(next.clone())));
                    sort_nodes(siblings);
                }
            }

            current = next;
        }

        Ok(NodeKey::encode(&current))
    }
}
