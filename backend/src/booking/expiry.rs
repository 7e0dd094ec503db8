//! Departure-based expiry

use chrono::{DateTime, Utc};

/// A journey is expired from the instant of departure onward.
pub fn is_expired(now: DateTime<Utc>, departure_at: DateTime<Utc>) -> bool {
    now >= departure_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn boundary_is_expired() {
        let departure = Utc::now();
        assert!(!is_expired(departure - Duration::milliseconds(1), departure));
        assert!(is_expired(departure, departure));
        assert!(is_expired(departure + Duration::seconds(1), departure));
    }
}
