//! Consent/privacy constants and the PII helpers used by request logging.

/// Version stamp recorded with every consent checkbox.
pub const POLICY_VERSION: &str = "2026-02-v2";

/// Retention windows published in the privacy policy. Leads live only in the
/// delivery provider; events live only in the log pipeline. These constants
/// document the windows those downstream systems are configured with.
pub const LEAD_RETENTION_DAYS: u32 = 180;
pub const EVENT_RETENTION_DAYS: u32 = 90;

pub const PRIVACY_CONTACT_EMAIL: &str = "privacy@nitnot.com";
pub const SUPPORT_CONTACT_EMAIL: &str = "support@nitnot.com";

/// Canonical form for rate-limit keys and dedup: trimmed, lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Redact an email for log lines: keep the first two characters and the
/// domain (`jo***@example.com`). Anything that doesn't look like an email
/// collapses to `***`.
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((name, domain)) if !name.is_empty() && !domain.is_empty() => {
            let visible: String = name.chars().take(2).collect();
            format!("{visible}***@{domain}")
        }
        _ => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  Jo@Example.COM "), "jo@example.com");
    }

    #[test]
    fn redact_keeps_two_chars_and_domain() {
        assert_eq!(redact_email("jo@example.com"), "jo***@example.com");
        assert_eq!(redact_email("alexandra@example.com"), "al***@example.com");
        assert_eq!(redact_email("a@b.c"), "a***@b.c");
    }

    #[test]
    fn redact_collapses_malformed_addresses() {
        assert_eq!(redact_email("not-an-email"), "***");
        assert_eq!(redact_email("@example.com"), "***");
        assert_eq!(redact_email("jo@"), "***");
        assert_eq!(redact_email(""), "***");
    }
}
