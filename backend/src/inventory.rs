//! Seat ledger arithmetic
//!
//! The stores apply these rules to a listing's `remaining_quantity`:
//! Postgres through a conditional `UPDATE`, the in-memory store under its
//! mutex. Keeping the arithmetic here lets both agree on edge cases.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("requested {requested} seats, {remaining} remaining")]
    Insufficient { requested: i32, remaining: i32 },

    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),

    #[error("total {total} is below the {held} seats already held")]
    BelowHeld { total: i32, held: i32 },
}

/// Seat counts of one listing. `0 <= remaining <= total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatLedger {
    total: i32,
    remaining: i32,
}

impl SeatLedger {
    pub fn new(total: i32, remaining: i32) -> Self {
        let total = total.max(0);
        Self {
            total,
            remaining: remaining.clamp(0, total),
        }
    }

    pub fn total(&self) -> i32 {
        self.total
    }

    pub fn remaining(&self) -> i32 {
        self.remaining
    }

    /// Seats currently held by bookings
    pub fn held(&self) -> i32 {
        self.total - self.remaining
    }

    pub fn try_reserve(&mut self, quantity: i32) -> Result<(), LedgerError> {
        if quantity < 1 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        if quantity > self.remaining {
            return Err(LedgerError::Insufficient {
                requested: quantity,
                remaining: self.remaining,
            });
        }
        self.remaining -= quantity;
        Ok(())
    }

    /// Return seats. Never raises `remaining` above `total`.
    pub fn release(&mut self, quantity: i32) {
        self.remaining = self
            .remaining
            .saturating_add(quantity.max(0))
            .min(self.total);
    }

    /// Change the total, shifting `remaining` by the same delta.
    pub fn resize(&mut self, new_total: i32) -> Result<(), LedgerError> {
        let held = self.held();
        if new_total < held || new_total < 1 {
            return Err(LedgerError::BelowHeld {
                total: new_total,
                held,
            });
        }
        self.remaining = new_total - held;
        self.total = new_total;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_until_exhausted() {
        let mut ledger = SeatLedger::new(3, 3);
        ledger.try_reserve(2).unwrap();
        assert_eq!(ledger.remaining(), 1);

        let err = ledger.try_reserve(2).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Insufficient {
                requested: 2,
                remaining: 1
            }
        );
        assert_eq!(ledger.remaining(), 1);

        ledger.try_reserve(1).unwrap();
        assert_eq!(ledger.remaining(), 0);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut ledger = SeatLedger::new(3, 3);
        assert_eq!(ledger.try_reserve(0), Err(LedgerError::InvalidQuantity(0)));
        assert_eq!(ledger.remaining(), 3);
    }

    #[test]
    fn release_is_clamped_to_total() {
        let mut ledger = SeatLedger::new(5, 2);
        ledger.release(2);
        assert_eq!(ledger.remaining(), 4);
        ledger.release(10);
        assert_eq!(ledger.remaining(), 5);
    }

    #[test]
    fn resize_keeps_held_seats() {
        let mut ledger = SeatLedger::new(10, 6);
        ledger.resize(8).unwrap();
        assert_eq!((ledger.total(), ledger.remaining()), (8, 4));

        ledger.resize(20).unwrap();
        assert_eq!((ledger.total(), ledger.remaining()), (20, 16));

        assert_eq!(
            ledger.resize(3),
            Err(LedgerError::BelowHeld { total: 3, held: 4 })
        );
    }

    #[test]
    fn new_clamps_out_of_range_input() {
        let ledger = SeatLedger::new(4, 9);
        assert_eq!(ledger.remaining(), 4);
        let ledger = SeatLedger::new(4, -1);
        assert_eq!(ledger.remaining(), 0);
    }
}
