/// Reduce a raw transport chat id to its stable suffix form. The messaging
/// binary's ids sometimes carry a service prefix (`imessage;-;+15551234567`);
/// only the trailing segment after the last `;-;`-style separator is stable
/// across reconnects, so that's what the Route Store keys on.
pub fn normalize_chat_id(raw: &str) -> String {
    raw.rsplit(';').next().unwrap_or(raw).trim().to_string()
}

/// Normalize a sender identifier for whitelist comparison: emails are
/// lowercased, phone numbers are reduced to digits only (with a leading
/// `+` preserved when present).
pub fn normalize_sender_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('@') {
        return trimmed.to_lowercase();
    }
    let mut out = String::new();
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_prefixed_chat_id() {
        assert_eq!(normalize_chat_id("imessage;-;+15551234567"), "+15551234567");
    }

    #[test]
    fn leaves_bare_chat_id_unchanged() {
        assert_eq!(normalize_chat_id("chat-abc123"), "chat-abc123");
    }

    #[test]
    fn normalizes_email_to_lowercase() {
        assert_eq!(normalize_sender_identity("Alice@Example.COM"), "alice@example.com");
    }

    #[test]
    fn normalizes_phone_to_digits_with_plus() {
        assert_eq!(
            normalize_sender_identity("+1 (555) 123-4567"),
            "+15551234567"
        );
    }
}
