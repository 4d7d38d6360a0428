/// Normalizes a sender identity for whitelist comparison. Emails are
/// lowercased; anything that looks like a phone number has its punctuation
/// stripped down to an optional leading `+` and digits, so `+1 (555) 012-3456`
/// and `15550123456` compare equal once both paths run through this.
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    if looks_like_phone(trimmed) {
        normalize_phone(trimmed)
    } else {
        trimmed.to_lowercase()
    }
}

fn looks_like_phone(s: &str) -> bool {
    let body = s.strip_prefix('+').unwrap_or(s);
    !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-' || c == '(' || c == ')')
        && body.chars().any(|c| c.is_ascii_digit())
}

fn normalize_phone(s: &str) -> String {
    let has_plus = s.starts_with('+');
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if has_plus {
        format!("+{digits}")
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_lowercased() {
        assert_eq!(normalize_identity("Alice@Example.COM"), "alice@example.com");
    }

    #[test]
    fn phone_punctuation_is_stripped() {
        assert_eq!(normalize_identity("+1 (555) 012-3456"), "+15550123456");
    }

    #[test]
    fn bare_digit_phone_keeps_no_plus() {
        assert_eq!(normalize_identity("15550123456"), "15550123456");
    }

    #[test]
    fn equivalent_phone_forms_normalize_equal() {
        assert_eq!(normalize_identity("+1-555-012-3456"), normalize_identity("+15550123456"));
    }
}
