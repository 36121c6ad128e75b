use unicode_normalization::UnicodeNormalization;

/// NFKC-normalize and lowercase, so "CAFÉ", "café" and "cafe\u{301}" compare equal.
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// True when the text is absent or only whitespace.
pub fn is_blank(text: Option<&str>) -> bool {
    text.map_or(true, |t| t.trim().is_empty())
}

/// Split an already-normalized query into words on Unicode whitespace.
pub fn query_words(normalized_query: &str) -> Vec<&str> {
    normalized_query.split_whitespace().collect()
}

/// Case-insensitive equality under the same normalization as [`normalize`].
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    normalize(a.trim()) == normalize(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_composition() {
        assert_eq!(normalize("Café"), normalize("CAFE\u{301}"));
        assert_eq!(normalize("Red CAR"), "red car");
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some("   \t")));
        assert!(!is_blank(Some(" x ")));
    }

    #[test]
    fn splits_on_any_whitespace() {
        assert_eq!(query_words("red \t car\nsale"), vec!["red", "car", "sale"]);
    }
}
