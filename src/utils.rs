/// Shared utility functions

/// Safely truncate a string at a UTF-8 boundary
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if max_bytes >= s.len() { return s; }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Collapse every whitespace run (including newlines) to a single space and trim
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Count whitespace-separated words
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_ascii() {
        assert_eq!(safe_truncate("hello", 3), "hel");
        assert_eq!(safe_truncate("hello", 10), "hello");
        assert_eq!(safe_truncate("hello", 5), "hello");
    }

    #[test]
    fn test_safe_truncate_utf8() {
        // 'é' is two bytes; cutting in the middle backs off to the boundary
        assert_eq!(safe_truncate("café", 4), "caf");
        assert_eq!(safe_truncate("café", 5), "café");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  deep \n\t learning  "), "deep learning");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two\nthree"), 3);
        assert_eq!(word_count("   "), 0);
    }
}
