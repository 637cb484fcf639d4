/// Helper utilities for the pgbulk CLI

/// Mask the middle of a sensitive value, keeping `visible` characters at
/// each end.
pub fn mask_sensitive(value: &str, visible: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= visible * 2 {
        return "****".to_string();
    }

    let head: String = chars[..visible].iter().collect();
    let tail: String = chars[chars.len() - visible..].iter().collect();
    format!("{}...{}", head, tail)
}

/// First line of a possibly multi-line diagnostic, for one-line summaries.
pub fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("").trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive() {
        assert_eq!(mask_sensitive("5e7f294e4c92a9aa661fae8d347d832d", 4), "5e7f...832d");
        assert_eq!(mask_sensitive("pw", 4), "****");
        assert_eq!(mask_sensitive("", 2), "****");
    }

    #[test]
    fn test_mask_sensitive_multibyte() {
        assert_eq!(mask_sensitive("pässwörd-länger", 2), "pä...er");
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("role does not exist\nHINT: check the user"), "role does not exist");
        assert_eq!(first_line("single"), "single");
        assert_eq!(first_line(""), "");
    }
}
