//! Node name validation and sanitization

use crate::{FsError, Result, KEY_SEPARATOR};

/// Names that would break path resolution
const RESERVED_NAMES: &[&str] = &[".", ".."];

/// Characters that can never appear in a node name, with full-width look-alikes
const FORBIDDEN_CHARS: &[(char, char)] = &[
    ('/', '／'),           // U+FF0F
    ('\\', '＼'),          // U+FF3C
    (KEY_SEPARATOR, '｜'), // U+FF5C
];

/// Sanitize an externally supplied name (uploads) into a valid node name
pub fn sanitize_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());

    for c in name.trim().chars() {
        if let Some((_, fullwidth)) = FORBIDDEN_CHARS.iter().find(|(f, _)| *f == c) {
            result.push(*fullwidth);
        } else if c.is_control() {
            result.push('_');
        } else {
            result.push(c);
        }
    }

    if RESERVED_NAMES.contains(&result.as_str()) {
        result = format!("_{}", result);
    }

    if result.is_empty() {
        result = "_unnamed".to_string();
    }

    result
}

/// Check whether a name can be used as-is for a node
pub fn is_valid_name(name: &str) -> bool {
    validate_name(name).is_ok()
}

/// Validate a user-supplied node name
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FsError::EmptyName);
    }

    if RESERVED_NAMES.contains(&name) {
        return Err(FsError::InvalidName(name.to_string()));
    }

    let forbidden = name
        .chars()
        .any(|c| c.is_control() || FORBIDDEN_CHARS.iter().any(|(f, _)| *f == c));
    if forbidden {
        return Err(FsError::InvalidName(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_separator() {
        assert_eq!(sanitize_name("a|b.txt"), "a｜b.txt");
        assert_eq!(sanitize_name("a\\b.txt"), "a＼b.txt");
    }

    #[test]
    fn test_sanitize_reserved() {
        assert_eq!(sanitize_name(".."), "_..");
        assert_eq!(sanitize_name("   "), "_unnamed");
    }

    #[test]
    fn test_validate() {
        assert!(is_valid_name("index.js"));
        assert!(is_valid_name("my file - copy.txt"));
        assert_eq!(validate_name("  "), Err(FsError::EmptyName));
        assert_eq!(validate_name(""), Err(FsError::EmptyName));
        assert!(matches!(validate_name("a/b"), Err(FsError::InvalidName(_))));
        assert!(matches!(validate_name("a|b"), Err(FsError::InvalidName(_))));
        assert!(matches!(validate_name(".."), Err(FsError::InvalidName(_))));
    }
}
