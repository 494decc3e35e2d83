//! Codebox Virtual File Tree
//!
//! Provides the in-memory project namespace the editor works on:
//! - PathKey: reversible node identifiers derived from full paths
//! - ContentMap: path-keyed store of file bodies
//! - VirtualTree: create/rename/delete/copy/cut/paste over directory and file nodes
//! - Upload import with name sanitization and text decoding
//! - File type classification for the editor

mod path_key;
mod content;
mod tree;
mod import;
mod sanitize;
mod encoding;
mod file_type;

pub use path_key::{NodeKey, KEY_SEPARATOR, join_path, parent_of, file_name_of};
pub use content::ContentMap;
pub use tree::{
    ClipboardEntry, DirectoryNode, FileInfo, FileNode, Node, PasteOutcome, PendingRead,
    TreeOptions, VirtualTree,
};
pub use import::{StagedUpload, UploadedFile, split_upload_path};
pub use sanitize::{sanitize_name, is_valid_name, validate_name};
pub use encoding::{detect_encoding, decode_bytes, EncodingHint, system_encoding_hint};
pub use file_type::{FileType, language_mode};

use thiserror::Error;

/// Virtual file tree errors
///
/// Every mutation either applies fully or leaves the tree untouched when
/// one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("A node named \"{0}\" already exists here")]
    DuplicateName(String),

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Clipboard is empty")]
    EmptyClipboard,

    #[error("Cannot paste a node onto itself")]
    SelfPaste,

    #[error("Cannot paste a directory into its own subtree")]
    PasteIntoDescendant,

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Invalid node key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, FsError>;
