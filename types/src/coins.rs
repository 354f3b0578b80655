use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Neg;

/// Hundredths per whole coin.
const SCALE: i64 = 100;

/// A coin quantity with two-decimal precision, stored as integer hundredths.
///
/// All ledger math happens on this type so that balances never accumulate
/// floating-point drift. Caller-supplied floats are converted exactly once,
/// at the edge, via [`Coins::parse`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coins(i64);

impl Coins {
    pub const ZERO: Coins = Coins(0);

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Coins(hundredths)
    }

    pub const fn from_whole(whole: i64) -> Self {
        Coins(whole.saturating_mul(SCALE))
    }

    /// Converts an unsigned whole-coin count, rejecting anything that does
    /// not fit. Wire-facing amounts must pass through here so an oversized
    /// value can never wrap into a negative quantity.
    pub fn from_whole_u64(whole: u64) -> Option<Self> {
        i64::try_from(whole).ok()?.checked_mul(SCALE).map(Coins)
    }

    /// Converts a caller-supplied floating amount, rejecting non-finite
    /// values and rounding half-away-from-zero to two decimals before any
    /// further math.
    pub fn parse(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = (value * SCALE as f64).round();
        // Anything near i64 range is garbage input, not a real balance.
        if scaled.abs() >= (i64::MAX / 2) as f64 {
            return None;
        }
        Some(Coins(scaled as i64))
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn abs(self) -> Coins {
        Coins(self.0.saturating_abs())
    }

    pub fn checked_add(self, other: Coins) -> Option<Coins> {
        self.0.checked_add(other.0).map(Coins)
    }

    pub fn checked_sub(self, other: Coins) -> Option<Coins> {
        self.0.checked_sub(other.0).map(Coins)
    }

    pub fn saturating_add(self, other: Coins) -> Coins {
        Coins(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Coins) -> Coins {
        Coins(self.0.saturating_sub(other.0))
    }

    /// Scales by basis points, rounding half-away-from-zero to the nearest
    /// hundredth. Used for the percentage award boost.
    pub fn scale_bps(self, bps: i64) -> Coins {
        let num = (self.0 as i128) * (bps as i128);
        let den = 10_000i128;
        let quot = num / den;
        let rem = num % den;
        let rounded = if rem.abs() * 2 >= den {
            quot + num.signum()
        } else {
            quot
        };
        Coins(rounded as i64)
    }
}

impl Neg for Coins {
    type Output = Coins;

    fn neg(self) -> Coins {
        Coins(self.0.saturating_neg())
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hundredths = self.0.saturating_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, hundredths / SCALE, hundredths % SCALE)
    }
}

impl Serialize for Coins {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Coins {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Coins::parse(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid coin amount: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rounds_to_two_decimals() {
        assert_eq!(Coins::parse(10.005).unwrap(), Coins::from_hundredths(1001));
        assert_eq!(Coins::parse(10.004).unwrap(), Coins::from_hundredths(1000));
        assert_eq!(Coins::parse(-0.5).unwrap(), Coins::from_hundredths(-50));
        assert_eq!(Coins::parse(100.0).unwrap(), Coins::from_whole(100));
    }

    #[test]
    fn from_whole_u64_rejects_unrepresentable_amounts() {
        assert_eq!(Coins::from_whole_u64(500), Some(Coins::from_whole(500)));
        assert_eq!(Coins::from_whole_u64(0), Some(Coins::ZERO));
        assert!(Coins::from_whole_u64(u64::MAX).is_none());
        assert!(Coins::from_whole_u64(i64::MAX as u64).is_none());
    }

    #[test]
    fn parse_rejects_non_finite() {
        assert!(Coins::parse(f64::NAN).is_none());
        assert!(Coins::parse(f64::INFINITY).is_none());
        assert!(Coins::parse(f64::NEG_INFINITY).is_none());
    }

    #[test]
    fn scale_bps_computes_five_percent() {
        // 5% of 100.00 is exactly 5.00.
        assert_eq!(Coins::from_whole(100).scale_bps(500), Coins::from_whole(5));
        // 5% of 0.30 is 0.015, rounded up to 0.02.
        assert_eq!(
            Coins::from_hundredths(30).scale_bps(500),
            Coins::from_hundredths(2)
        );
    }

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Coins::from_hundredths(10).to_string(), "0.10");
        assert_eq!(Coins::from_whole(2000).to_string(), "2000.00");
        assert_eq!(Coins::from_hundredths(-50).to_string(), "-0.50");
    }

    #[test]
    fn serde_round_trips_as_decimal_number() {
        let coins = Coins::from_hundredths(12345);
        let json = serde_json::to_string(&coins).unwrap();
        assert_eq!(json, "123.45");
        let back: Coins = serde_json::from_str(&json).unwrap();
        assert_eq!(back, coins);
    }
}
