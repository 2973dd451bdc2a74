/// Ceiling on any single price or payment, in cents (100 million in major units).
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000_000;

/// Whether `cents` is a storable amount: not negative and not above the ceiling.
pub fn amount_in_range(cents: i64) -> bool {
    (0..=MAX_AMOUNT_CENTS).contains(&cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        assert!(amount_in_range(0));
        assert!(amount_in_range(MAX_AMOUNT_CENTS));
        assert!(!amount_in_range(-1));
        assert!(!amount_in_range(MAX_AMOUNT_CENTS + 1));
    }
}
