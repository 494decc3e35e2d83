//! Upload import
//!
//! Uploaded files land in the tree immediately with a pending body; the
//! bytes are decoded off the UI path and back-filled through
//! [`VirtualTree::resolve_read`].

use crate::path_key::join_path;
use crate::{decode_bytes, sanitize_name, EncodingHint, NodeKey, PendingRead, Result, VirtualTree};

/// A file received from the host picker or drop zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Path relative to the upload root; `\` and `/` both separate segments
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(relative_path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            bytes: bytes.into(),
        }
    }
}

/// Upload staged in the tree, waiting for its body
#[derive(Debug)]
pub struct StagedUpload {
    pub read: PendingRead,
    pub bytes: Vec<u8>,
}

impl StagedUpload {
    /// Decode the raw bytes into editor text
    pub fn decode(&self, hint: EncodingHint) -> String {
        let (text, had_errors) = decode_bytes(&self.bytes, hint);
        if had_errors {
            tracing::warn!("Upload {} contained undecodable bytes", self.read.path());
        }
        text
    }
}

/// Split an upload path into sanitized node names
///
/// Empty and `.` segments are dropped.
pub fn split_upload_path(raw: &str) -> Vec<String> {
    raw.split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(sanitize_name)
        .collect()
}

impl VirtualTree {
    /// Insert uploads below `target` with pending bodies
    ///
    /// Intermediate directories are created as needed. An upload whose path
    /// collides with an existing node of the other kind is skipped.
    pub fn stage_uploads(
        &mut self,
        target: &NodeKey,
        files: Vec<UploadedFile>,
    ) -> Result<Vec<StagedUpload>> {
        let base = self.container_dir(target)?;
        let mut staged = Vec::with_capacity(files.len());

        for file in files {
            let segments = split_upload_path(&file.relative_path);
            if segments.is_empty() {
                tracing::warn!("Skipping upload with empty path: {:?}", file.relative_path);
                continue;
            }

            let path = join_path(&base, &segments.join("/"));
            match self.insert_file_at(&path, None) {
                Ok(_) => staged.push(StagedUpload {
                    read: PendingRead::new(path),
                    bytes: file.bytes,
                }),
                Err(e) => tracing::warn!("Skipping upload {}: {}", path, e),
            }
        }

        tracing::info!("Staged {} uploads under {}", staged.len(), target);
        Ok(staged)
    }

    /// Decode and back-fill staged uploads; returns how many landed
    pub fn complete_uploads(&mut self, staged: Vec<StagedUpload>, hint: EncodingHint) -> usize {
        staged
            .into_iter()
            .filter(|upload| {
                let text = upload.decode(hint);
                self.resolve_read(upload.read.clone(), text)
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Node;

    #[test]
    fn test_split_upload_path() {
        assert_eq!(split_upload_path("proj\\src/./a.js"), vec!["proj", "src", "a.js"]);
        assert_eq!(split_upload_path("/a|b.txt"), vec!["a｜b.txt"]);
        assert!(split_upload_path("//").is_empty());
    }

    #[test]
    fn test_stage_and_complete() {
        let mut tree = VirtualTree::new();
        tree.create_directory(&NodeKey::root(), "app").unwrap();

        let staged = tree
            .stage_uploads(
                &NodeKey::encode("app"),
                vec![
                    UploadedFile::new("src/index.js", "let a = 1;"),
                    UploadedFile::new("README.md", "# hi"),
                ],
            )
            .unwrap();
        assert_eq!(staged.len(), 2);

        let info = tree.file_info(&NodeKey::encode("app/src/index.js")).unwrap();
        assert!(!info.loaded);

        assert_eq!(tree.complete_uploads(staged, EncodingHint::None), 2);
        assert_eq!(tree.contents().get("app/src/index.js"), Some("let a = 1;"));
        assert!(matches!(tree.find("app/src"), Some(Node::Directory(_))));
    }

    #[test]
    fn test_upload_deleted_before_decode_is_dropped() {
        let mut tree = VirtualTree::new();
        let staged = tree
            .stage_uploads(&NodeKey::root(), vec![UploadedFile::new("a.txt", "x")])
            .unwrap();
        tree.delete(&NodeKey::encode("a.txt")).unwrap();

        assert_eq!(tree.complete_uploads(staged, EncodingHint::None), 0);
        assert!(tree.contents().is_empty());
    }

    #[test]
    fn test_reupload_replaces_body() {
        let mut tree = VirtualTree::from_files([("a.txt", "old")]).unwrap();
        let staged = tree
            .stage_uploads(&NodeKey::root(), vec![UploadedFile::new("a.txt", "new")])
            .unwrap();
        tree.complete_uploads(staged, EncodingHint::None);
        assert_eq!(tree.contents().get("a.txt"), Some("new"));
    }
}
