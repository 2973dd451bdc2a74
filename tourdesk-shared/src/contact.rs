/// Loose e-mail shape check: one `@`, non-empty local part, a dot in the domain,
/// no whitespace. Deliverability is not our problem.
pub fn is_plausible_email(value: &str) -> bool {
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        assert!(is_plausible_email("ops@tourdesk.example"));
        assert!(is_plausible_email("  anna.k+tours@mail.gr "));
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "no-at.example", "@example.com", "a@b", "a@@b.com", "a b@c.com", "a@.com"] {
            assert!(!is_plausible_email(bad), "{bad} should be rejected");
        }
    }
}
