//! Word-boundary excerpts.

const ELLIPSIS: &str = "...";

/// Take roughly the first `max_chars` characters of `text` without cutting a word.
///
/// The cut backs up to the last boundary before the limit. CJK characters
/// are words of their own, so text without spaces can still be cut between
/// them. When the very first word is longer than the limit it is kept whole.
/// `...` is appended only when something was dropped.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let Some((cut, next)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let prev = text[..cut].chars().next_back();
    let mid_word = prev.is_some_and(is_word_char) && is_word_char(next);

    let end = if mid_word {
        last_boundary(&text[..cut]).unwrap_or_else(|| {
            text[cut..]
                .char_indices()
                .find(|&(_, c)| !is_word_char(c))
                .map_or(text.len(), |(i, _)| cut + i)
        })
    } else {
        cut
    };

    let kept = text[..end].trim_end();
    if end >= text.len() || kept.is_empty() {
        return text[..end].to_string();
    }
    format!("{kept}{ELLIPSIS}")
}

/// Byte offset just past the last place a word may end.
fn last_boundary(head: &str) -> Option<usize> {
    head.char_indices().rev().find_map(|(i, c)| {
        if c.is_whitespace() {
            Some(i)
        } else if is_cjk_char(c) {
            Some(i + c.len_utf8())
        } else {
            None
        }
    })
    .filter(|&end| !head[..end].trim().is_empty())
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !is_cjk_char(c)
}

/// Check if a character is a CJK (Chinese, Japanese, Korean) character.
pub(crate) fn is_cjk_char(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |      // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |      // Extension A
        '\u{20000}'..='\u{2A6DF}' |    // Extension B
        '\u{2A700}'..='\u{2EBEF}' |    // Extensions C-F
        '\u{30000}'..='\u{3134F}' |    // Extension G
        '\u{F900}'..='\u{FAFF}' |      // Compatibility Ideographs
        '\u{2F800}'..='\u{2FA1F}' |    // Compatibility Supplement
        '\u{3040}'..='\u{309F}' |      // Hiragana
        '\u{30A0}'..='\u{30FF}' |      // Katakana
        '\u{AC00}'..='\u{D7AF}'        // Hangul Syllables
    )
}
