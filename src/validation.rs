use regex::Regex;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s\-()]+$").expect("phone regex is valid"));

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

pub fn is_valid_phone(value: &str) -> bool {
    PHONE_RE.is_match(value)
}

/// Trimmed value, or `None` when missing or blank.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada example@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_phone() {
        assert!(is_valid_phone("+234 (803) 555-0199"));
        assert!(is_valid_phone("08035550199"));
        assert!(!is_valid_phone("call me"));
        assert!(!is_valid_phone("++234"));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ".into())), Some("x".to_string()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
