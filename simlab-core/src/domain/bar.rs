//! OHLCV bars, the sole driver of simulated time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol at a single timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// Describe why this bar cannot be simulated, or `None` if it is well-formed.
    ///
    /// Checks finiteness, positive prices, non-negative volume and the OHLC
    /// envelope (`low <= open, close <= high`).
    pub fn defect(&self) -> Option<String> {
        if self.symbol.is_empty() {
            return Some("missing symbol".into());
        }
        if self.is_void() {
            return Some("non-finite OHLCV field".into());
        }
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Some("non-positive price".into());
        }
        if self.volume < 0.0 {
            return Some(format!("negative volume {}", self.volume));
        }
        if self.high < self.low {
            return Some(format!("high {} below low {}", self.high, self.low));
        }
        if self.open > self.high || self.open < self.low {
            return Some(format!("open {} outside [{}, {}]", self.open, self.low, self.high));
        }
        if self.close > self.high || self.close < self.low {
            return Some(format!("close {} outside [{}, {}]", self.close, self.low, self.high));
        }
        None
    }

    pub fn is_sane(&self) -> bool {
        self.defect().is_none()
    }

    /// Whether `price` lies inside this bar's traded range.
    pub fn range_contains(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar {
            symbol: "SPY".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0; // below low
        assert!(bar.defect().unwrap().contains("below low"));
    }

    #[test]
    fn bar_rejects_negative_volume() {
        let mut bar = sample_bar();
        bar.volume = -1.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn range_contains_is_inclusive() {
        let bar = sample_bar();
        assert!(bar.range_contains(98.0));
        assert!(bar.range_contains(105.0));
        assert!(!bar.range_contains(105.01));
    }
}
