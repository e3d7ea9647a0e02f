//! Shared utilities and data structures for QuizStake contracts.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{contracterror, contracttype};

/// Common error codes for the shared fee math.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Error {
    InvalidAmount = 1,
    Overflow = 2,
}

/// Lifecycle codes shared by both quiz variants.
///
/// Only `Open`, `Ongoing`, `Closed` and `Cancelled` are ever persisted.
/// `Submitting` is the time-derived submission window of the timed variant;
/// it lives in the same enumeration so stored states, derived phases and
/// event diagnostics use one stable code space.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QuizState {
    Open = 0,
    Ongoing = 1,
    Closed = 2,
    Submitting = 3,
    Cancelled = 4,
}

/// Constant for basis points divisor.
pub const BASIS_POINTS_DIVISOR: u32 = 10_000;

/// Protocol fee charged on every settlement, in basis points (5%).
pub const DEFAULT_ADMIN_FEE_BPS: u32 = 500;

/// Helper to calculate fee based on amount and basis points.
pub fn calculate_fee(amount: i128, fee_bps: u32) -> Result<i128, Error> {
    if amount < 0 {
        return Err(Error::InvalidAmount);
    }
    if fee_bps > BASIS_POINTS_DIVISOR {
        return Err(Error::InvalidAmount);
    }
    amount
        .checked_mul(fee_bps as i128)
        .and_then(|v| v.checked_div(BASIS_POINTS_DIVISOR as i128))
        .ok_or(Error::Overflow)
}

#[cfg(test)]
mod test {
    use super::*;

    const ONE: i128 = 1_000_000_000_000_000_000;

    #[test]
    fn fee_at_default_rate() {
        // 200e18 at 5% -> 10e18
        assert_eq!(
            calculate_fee(200 * ONE, DEFAULT_ADMIN_FEE_BPS),
            Ok(10 * ONE)
        );
        // 50e18 at 5% -> 2.5e18
        assert_eq!(
            calculate_fee(50 * ONE, DEFAULT_ADMIN_FEE_BPS),
            Ok(25 * ONE / 10)
        );
    }

    #[test]
    fn fee_rounds_down() {
        // 3 * 500 / 10000 = 0.15 -> 0
        assert_eq!(calculate_fee(3, DEFAULT_ADMIN_FEE_BPS), Ok(0));
        assert_eq!(calculate_fee(19, DEFAULT_ADMIN_FEE_BPS), Ok(0));
        assert_eq!(calculate_fee(20, DEFAULT_ADMIN_FEE_BPS), Ok(1));
    }

    #[test]
    fn fee_bounds() {
        assert_eq!(calculate_fee(1000, 0), Ok(0));
        assert_eq!(calculate_fee(1000, BASIS_POINTS_DIVISOR), Ok(1000));
        assert_eq!(
            calculate_fee(1000, BASIS_POINTS_DIVISOR + 1),
            Err(Error::InvalidAmount)
        );
    }

    #[test]
    fn negative_amount_rejected() {
        assert_eq!(calculate_fee(-1, 500), Err(Error::InvalidAmount));
    }

    #[test]
    fn state_codes_are_stable() {
        assert_eq!(QuizState::Open as u32, 0);
        assert_eq!(QuizState::Ongoing as u32, 1);
        assert_eq!(QuizState::Closed as u32, 2);
        assert_eq!(QuizState::Submitting as u32, 3);
        assert_eq!(QuizState::Cancelled as u32, 4);
    }
}
