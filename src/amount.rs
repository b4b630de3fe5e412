use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use thiserror::Error;

/// Fixed-point decimal with 18 decimal places, stored as a `uint256` of base
/// units (wei).
///
/// Used for both token quantities and native-asset values, since both the
/// token and the chain's native currency use 18 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(U256);

/// Error returned when a decimal string is not a valid [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid digit in amount '{0}'")]
    InvalidDigit(String),
    #[error("amount '{0}' has more than 18 decimal places")]
    TooPrecise(String),
    #[error("amount '{0}' is too large")]
    Overflow(String),
}

const WEI_PER_UNIT: u64 = 1_000_000_000_000_000_000;

const fn u256_from_u128(value: u128) -> U256 {
    U256::from_limbs([value as u64, (value >> 64) as u64, 0, 0])
}

impl Amount {
    pub const DECIMALS: u32 = 18;
    const SCALE: U256 = U256::from_limbs([WEI_PER_UNIT, 0, 0, 0]);

    pub const ZERO: Amount = Amount(U256::ZERO);

    pub const fn from_wei(value: U256) -> Self {
        Amount(value)
    }

    /// Whole units, e.g. `from_tokens(5)` is `5.0`.
    pub const fn from_tokens(value: u64) -> Self {
        Amount(u256_from_u128(value as u128 * WEI_PER_UNIT as u128))
    }

    /// Thousandths of a unit, e.g. `from_milli(1500)` is `1.5`.
    pub const fn from_milli(value: u64) -> Self {
        Amount(u256_from_u128(value as u128 * (WEI_PER_UNIT / 1_000) as u128))
    }

    pub const fn as_wei(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Transaction fee paid for a receipt: `gas_used * gas_price`, in wei.
    /// The product needs at most 192 bits, so it is always exact.
    pub fn fee(gas_used: u64, gas_price: u128) -> Self {
        Amount(U256::from(gas_used) * U256::from(gas_price))
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// `self * numerator / denominator`, rounded down.
    pub fn mul_ratio(self, numerator: u64, denominator: u64) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        let product = self.0.checked_mul(U256::from(numerator))?;
        Some(Amount(product / U256::from(denominator)))
    }

    /// `self / denominator` as a fixed-point ratio, rounded down.
    /// `None` for a zero denominator.
    pub fn ratio_to(self, denominator: Self) -> Option<Self> {
        self.0
            .checked_mul(Self::SCALE)?
            .checked_div(denominator.0)
            .map(Amount)
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Amount(value)
    }
}

impl From<Amount> for U256 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountParseError::InvalidDigit(s.to_string()));
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError::InvalidDigit(s.to_string()));
        }
        if frac.len() > Self::DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(s.to_string()));
        }

        let overflow = || AmountParseError::Overflow(s.to_string());
        let whole = if whole.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(whole, 10).map_err(|_| overflow())?
        };
        // At most 18 digits, which always fits a u64.
        let frac_scaled = if frac.is_empty() {
            0
        } else {
            let digits: u64 = frac.parse().map_err(|_| overflow())?;
            digits * 10u64.pow(Self::DECIMALS - frac.len() as u32)
        };

        whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(U256::from(frac_scaled)))
            .map(Amount)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        // Below 10^18, so the low limb holds the whole remainder.
        let frac = (self.0 % Self::SCALE).as_limbs()[0];
        if frac == 0 {
            return write!(f, "{whole}.0");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}
