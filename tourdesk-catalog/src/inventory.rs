use crate::{CatalogError, CatalogResult};

/// Seats left on a departure. `booked` counts passengers on non-cancelled bookings.
pub fn seats_available(capacity: i32, booked: i32) -> i32 {
    (capacity - booked).max(0)
}

pub fn ensure_capacity(capacity: i32, booked: i32, requested: i32) -> CatalogResult<()> {
    let available = seats_available(capacity, booked);
    if requested > available {
        return Err(CatalogError::InsufficientCapacity { requested, available });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_never_goes_negative() {
        assert_eq!(seats_available(10, 4), 6);
        assert_eq!(seats_available(10, 12), 0);
    }

    #[test]
    fn exact_fit_is_allowed() {
        ensure_capacity(12, 10, 2).unwrap();
        assert_eq!(
            ensure_capacity(12, 10, 3),
            Err(CatalogError::InsufficientCapacity { requested: 3, available: 2 })
        );
    }
}
