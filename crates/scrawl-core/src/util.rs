//! Small text and clock helpers shared by the store, clients, and config.

/// Trim optional text, mapping blank values to `None`.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Bound a response body before it lands in an error message.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Wall clock in Unix milliseconds, the unit of every note timestamp.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" owner-1 ".to_string())),
            Some("owner-1".to_string())
        );
    }

    #[test]
    fn only_http_schemes_count_as_urls() {
        assert!(is_http_url("http://127.0.0.1:8080"));
        assert!(is_http_url("https://notes.example.com"));
        assert!(!is_http_url("file:///tmp/scrawl.db"));
        assert!(!is_http_url("notes.example.com"));
    }

    #[test]
    fn compact_text_is_bounded() {
        assert_eq!(compact_text(&"e".repeat(400)).chars().count(), 180);
        assert_eq!(compact_text("\n upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn clock_is_in_milliseconds() {
        // 2020-01-01 in ms; seconds would be far smaller.
        assert!(unix_millis_now() > 1_577_836_800_000);
    }
}
