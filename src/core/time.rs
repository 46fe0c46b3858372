//! Stream time representation.
//! Packet timestamps are integer ticks of a per-stream rational time base;
//! frame start times handed to callers are milliseconds (f64).

use std::fmt;

/// Timestamp in stream time-base ticks
pub type Timestamp = i64;

/// Time constants for conversions
pub mod constants {
    pub const MILLIS_PER_SECOND: f64 = 1000.0;
}

/// Rational time base: one tick lasts `num / den` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Value of one tick in seconds
    pub fn value(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Number of ticks spanning `seconds`, rounded down, at least 1
    pub fn ticks_for(&self, seconds: f64) -> Timestamp {
        let tick = self.value();
        if tick <= 0.0 {
            return 1;
        }
        ((seconds / tick).floor() as Timestamp).max(1)
    }
}

impl Default for Rational {
    fn default() -> Self {
        // Millisecond ticks
        Self::new(1, 1000)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Convert a tick count to milliseconds
#[inline]
pub fn ticks_to_millis(ticks: Timestamp, base: Rational) -> f64 {
    ticks as f64 * base.value() * constants::MILLIS_PER_SECOND
}

/// Format milliseconds as HH:MM:SS.mmm
pub fn format_millis(millis: f64) -> String {
    let total = millis.max(0.0).round() as i64;
    let hours = total / 3_600_000;
    let minutes = (total % 3_600_000) / 60_000;
    let seconds = (total % 60_000) / 1000;
    let ms = total % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_to_millis() {
        let base = Rational::new(1, 30);
        assert!((ticks_to_millis(30, base) - 1000.0).abs() < 1e-9);
        assert!((ticks_to_millis(3, base) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_tick_counts() {
        // A day of 90 kHz ticks
        let base = Rational::new(1, 90_000);
        assert!((ticks_to_millis(90_000 * 86_400, base) - 86_400_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_ticks_for_window() {
        assert_eq!(Rational::new(1, 30).ticks_for(1.0), 30);
        assert_eq!(Rational::new(1, 90_000).ticks_for(1.0), 90_000);
        // Degenerate time base still yields a usable window
        assert_eq!(Rational::new(1, 0).ticks_for(1.0), 1);
    }

    #[test]
    fn test_zero_denominator() {
        let base = Rational::new(1, 0);
        assert_eq!(base.value(), 0.0);
        assert_eq!(ticks_to_millis(100, base), 0.0);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(3_661_500.0), "01:01:01.500");
        assert_eq!(format_millis(0.0), "00:00:00.000");
        assert_eq!(format_millis(-5.0), "00:00:00.000");
    }
}
