//! Candlestick (kline) types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Candlestick interval, using Binance wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandlestickInterval {
    /// 1 second.
    Second,
    /// 1 minute.
    Minute,
    /// 3 minutes.
    Minutes3,
    /// 5 minutes.
    Minutes5,
    /// 15 minutes.
    Minutes15,
    /// 30 minutes.
    Minutes30,
    /// 1 hour.
    Hour,
    /// 2 hours.
    Hours2,
    /// 4 hours.
    Hours4,
    /// 6 hours.
    Hours6,
    /// 8 hours.
    Hours8,
    /// 12 hours.
    Hours12,
    /// 1 day.
    Day,
    /// 3 days.
    Days3,
    /// 1 week.
    Week,
    /// 1 month.
    Month,
}

impl CandlestickInterval {
    /// Get all intervals, shortest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Second,
            Self::Minute,
            Self::Minutes3,
            Self::Minutes5,
            Self::Minutes15,
            Self::Minutes30,
            Self::Hour,
            Self::Hours2,
            Self::Hours4,
            Self::Hours6,
            Self::Hours8,
            Self::Hours12,
            Self::Day,
            Self::Days3,
            Self::Week,
            Self::Month,
        ]
    }

    /// Wire name used in stream names and REST queries (e.g. `1m`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Second => "1s",
            Self::Minute => "1m",
            Self::Minutes3 => "3m",
            Self::Minutes5 => "5m",
            Self::Minutes15 => "15m",
            Self::Minutes30 => "30m",
            Self::Hour => "1h",
            Self::Hours2 => "2h",
            Self::Hours4 => "4h",
            Self::Hours6 => "6h",
            Self::Hours8 => "8h",
            Self::Hours12 => "12h",
            Self::Day => "1d",
            Self::Days3 => "3d",
            Self::Week => "1w",
            Self::Month => "1M",
        }
    }
}

impl fmt::Display for CandlestickInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an interval string is not a Binance interval.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown candlestick interval: {0}")]
pub struct IntervalParseError(pub String);

impl FromStr for CandlestickInterval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Case matters: `1m` is a minute, `1M` is a month.
        Self::all()
            .iter()
            .copied()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| IntervalParseError(s.to_string()))
    }
}

/// A single OHLCV candlestick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candlestick {
    /// Symbol (e.g. "BTCUSDT").
    pub symbol: String,
    /// Candlestick interval.
    pub interval: CandlestickInterval,
    /// Open time.
    pub open_time: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close (or latest) price.
    pub close: Decimal,
    /// Base asset volume.
    pub volume: Decimal,
    /// Close time.
    pub close_time: DateTime<Utc>,
    /// Quote asset volume.
    pub quote_volume: Decimal,
    /// Number of trades.
    pub trade_count: u64,
    /// Taker buy base asset volume.
    pub taker_buy_base_volume: Decimal,
    /// Taker buy quote asset volume.
    pub taker_buy_quote_volume: Decimal,
}

/// Candlestick stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandlestickEvent {
    /// Event time.
    pub event_time: DateTime<Utc>,
    /// The (possibly still forming) candlestick.
    pub candlestick: Candlestick,
    /// Whether this candlestick is closed.
    pub is_final: bool,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("1s", CandlestickInterval::Second)]
    #[test_case("1m", CandlestickInterval::Minute)]
    #[test_case("15m", CandlestickInterval::Minutes15)]
    #[test_case("4h", CandlestickInterval::Hours4)]
    #[test_case("1w", CandlestickInterval::Week)]
    #[test_case("1M", CandlestickInterval::Month)]
    fn interval_parses_wire_name(name: &str, expected: CandlestickInterval) {
        assert_eq!(name.parse::<CandlestickInterval>().unwrap(), expected);
        assert_eq!(expected.to_string(), name);
    }

    #[test_case("1y")]
    #[test_case("")]
    #[test_case("1H")]
    fn interval_rejects_unknown(name: &str) {
        assert_eq!(
            name.parse::<CandlestickInterval>(),
            Err(IntervalParseError(name.to_string()))
        );
    }

    #[test]
    fn all_intervals_round_trip_through_wire_name() {
        for interval in CandlestickInterval::all() {
            assert_eq!(interval.as_str().parse::<CandlestickInterval>(), Ok(*interval));
        }
        assert_eq!(CandlestickInterval::all().len(), 16);
    }
}
