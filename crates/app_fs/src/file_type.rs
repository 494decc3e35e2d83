//! File classification for the editor pane

use serde::{Deserialize, Serialize};

/// Coarse file category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Markdown,
    Text,
    Image,
    Pdf,
    Code,
    Unknown,
}

fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

impl FileType {
    /// Classify a file by its extension
    pub fn from_name(name: &str) -> Self {
        match extension_of(name).as_str() {
            "md" | "markdown" => FileType::Markdown,
            "txt" => FileType::Text,
            "jpg" | "jpeg" | "png" | "gif" | "svg" => FileType::Image,
            "pdf" => FileType::Pdf,
            "js" | "jsx" | "ts" | "tsx" | "html" | "css" | "less" | "json" => FileType::Code,
            _ => FileType::Unknown,
        }
    }

    /// Whether the editor can show the body as text
    pub fn is_textual(self) -> bool {
        matches!(self, FileType::Markdown | FileType::Text | FileType::Code | FileType::Unknown)
    }
}

/// Editor language mode used for syntax highlighting
pub fn language_mode(name: &str) -> &'static str {
    match extension_of(name).as_str() {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "html" => "html",
        "css" => "css",
        "less" => "less",
        "json" => "json",
        "md" | "markdown" => "markdown",
        _ => "plaintext",
    }
}
