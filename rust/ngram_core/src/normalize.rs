//! Query and record normalization: lowercase, then Unicode NFC.
//!
//! The engine treats strings as opaque codepoint sequences and never calls
//! this itself. Front ends apply it to both records and queries so that the
//! two sides agree.

use unicode_normalization::UnicodeNormalization;

/// Lowercase `text` and compose it to NFC.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().nfc().collect()
}
