//! Text decoding for uploaded file bodies
//!
//! Uploads arrive as raw bytes. Editor content is always UTF-8, so legacy
//! encodings are detected and converted on import.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Hint for encoding detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingHint {
    /// Prefer Japanese encodings (Shift_JIS)
    Japanese,
    /// Prefer Chinese Simplified (GBK/GB18030)
    ChineseSimplified,
    /// Prefer Chinese Traditional (Big5)
    ChineseTraditional,
    /// Prefer Korean (EUC-KR)
    Korean,
    /// No preference
    None,
}

impl EncodingHint {
    fn tld(self) -> Option<&'static [u8]> {
        match self {
            EncodingHint::Japanese => Some(&b"jp"[..]),
            EncodingHint::ChineseSimplified => Some(&b"cn"[..]),
            EncodingHint::ChineseTraditional => Some(&b"tw"[..]),
            EncodingHint::Korean => Some(&b"kr"[..]),
            EncodingHint::None => None,
        }
    }

    fn fallback(self) -> Option<&'static Encoding> {
        match self {
            EncodingHint::Japanese => Some(encoding_rs::SHIFT_JIS),
            EncodingHint::ChineseSimplified => Some(encoding_rs::GBK),
            EncodingHint::ChineseTraditional => Some(encoding_rs::BIG5),
            EncodingHint::Korean => Some(encoding_rs::EUC_KR),
            EncodingHint::None => None,
        }
    }
}

/// Detect the most likely encoding of a byte sequence
pub fn detect_encoding(bytes: &[u8], hint: EncodingHint) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    if std::str::from_utf8(bytes).is_ok() {
        return encoding_rs::UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let detected = detector.guess(hint.tld(), true);

    // chardetng answers windows-1252 when it has nothing better
    match hint.fallback() {
        Some(preferred) if detected == encoding_rs::WINDOWS_1252 => preferred,
        _ => detected,
    }
}

/// Decode bytes to a UTF-8 string
///
/// Returns the decoded text and a flag indicating replacement characters
/// were inserted.
pub fn decode_bytes(bytes: &[u8], hint: EncodingHint) -> (String, bool) {
    if Encoding::for_bom(bytes).is_none() {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return (s.to_string(), false);
        }
    }

    let encoding = detect_encoding(bytes, hint);
    let (result, used, had_errors) = encoding.decode(bytes);

    if had_errors {
        tracing::warn!("Decoding errors occurred with encoding {}", used.name());
    } else {
        tracing::debug!("Decoded upload as {}", used.name());
    }

    (result.into_owned(), had_errors)
}

/// Get the default encoding hint from the process locale
pub fn system_encoding_hint() -> EncodingHint {
    std::env::var("LANG")
        .map(|lang| {
            let lang = lang.to_lowercase();
            if lang.starts_with("ja") {
                EncodingHint::Japanese
            } else if lang.contains("zh_cn") || lang.contains("zh-cn") {
                EncodingHint::ChineseSimplified
            } else if lang.contains("zh_tw") || lang.contains("zh-tw") {
                EncodingHint::ChineseTraditional
            } else if lang.starts_with("ko") {
                EncodingHint::Korean
            } else {
                EncodingHint::None
            }
        })
        .unwrap_or(EncodingHint::None)
}
