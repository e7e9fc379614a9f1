//! Trigram extraction from (already normalized) strings.
//!
//! The string is padded with two sentinels on each side and a width-3 window
//! slides over the codepoints. Build time and query time must run exactly this
//! code, otherwise stored and queried multisets drift apart.

/// Three consecutive codepoints of a sentinel-padded string.
pub type Trigram = [char; 3];

/// Boundary marker used when a caller does not pick one.
///
/// A Unicode noncharacter, so it never collides with normalized text.
pub const DEFAULT_SENTINEL: char = '\u{FFFF}';

/// Extract the padded trigram sequence of `text` using [`DEFAULT_SENTINEL`].
pub fn extract(text: &str) -> Vec<Trigram> {
    extract_with(text, DEFAULT_SENTINEL)
}

/// Extract the padded trigram sequence of `text`, left to right.
///
/// Yields `chars + 2` trigrams, or a single all-sentinel trigram for `""`.
/// Repeated trigrams are kept; counting happens in
/// [`TrigramMultiset`](super::multiset::TrigramMultiset).
pub fn extract_with(text: &str, sentinel: char) -> Vec<Trigram> {
    let mut trigrams = Vec::with_capacity(trigram_len(text));
    for_each_trigram(text, sentinel, |t| trigrams.push(t));
    trigrams
}

/// Visit each trigram of `text` in order without allocating.
pub fn for_each_trigram<F: FnMut(Trigram)>(text: &str, sentinel: char, mut f: F) {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        f([sentinel; 3]);
        return;
    };

    let mut c1 = sentinel;
    let mut c2 = sentinel;
    for c3 in std::iter::once(first).chain(chars) {
        f([c1, c2, c3]);
        c1 = c2;
        c2 = c3;
    }
    f([c1, c2, sentinel]);
    f([c2, sentinel, sentinel]);
}

/// Number of trigrams [`extract_with`] yields for `text`.
pub fn trigram_len(text: &str) -> usize {
    match text.chars().count() {
        0 => 1,
        n => n + 2,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_length_law(text in "\\PC{0,40}") {
            let n = text.chars().count();
            let expected = if n == 0 { 1 } else { n + 2 };
            prop_assert_eq!(extract(&text).len(), expected);
        }

        #[test]
        fn prop_deterministic(text in "\\PC{0,40}") {
            prop_assert_eq!(extract(&text), extract(&text));
        }
    }
}
