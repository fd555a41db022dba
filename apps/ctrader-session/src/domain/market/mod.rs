//! Market Data Types
//!
//! Venue-agnostic representations of live ticks, historical bars and the
//! live price book. Raw venue prices are integers in units of
//! `10^-digits`; conversion to [`Decimal`] is exact.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

/// Venue-assigned numeric instrument identifier.
pub type SymbolId = i64;

/// Price digits for every light symbol on the venue (divisor `10^5`).
pub const DEFAULT_PRICE_DIGITS: u32 = 5;

/// Convert a raw integer venue price into a decimal price.
#[must_use]
pub fn price_from_raw(raw: u64, digits: u32) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(raw), digits).normalize()
}

// =============================================================================
// Live Ticks
// =============================================================================

/// Raw spot price push for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotTick {
    /// Instrument the tick is for.
    pub symbol_id: SymbolId,
    /// Raw bid, absent when only the ask changed.
    pub bid: Option<u64>,
    /// Raw ask, absent when only the bid changed.
    pub ask: Option<u64>,
    /// Venue timestamp in milliseconds, when supplied.
    pub timestamp_ms: Option<i64>,
}

impl SpotTick {
    /// Whether the tick carries any price at all.
    #[must_use]
    pub const fn has_price(&self) -> bool {
        self.bid.is_some() || self.ask.is_some()
    }
}

/// A tick converted to decimal prices for a named instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// Normalised instrument name.
    pub symbol: String,
    /// Bid price.
    pub bid: Option<Decimal>,
    /// Ask price.
    pub ask: Option<Decimal>,
    /// Time of the tick.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Build a quote from a raw tick using the instrument's price digits.
    #[must_use]
    pub fn from_tick(symbol: &str, tick: &SpotTick, digits: u32) -> Self {
        let timestamp = tick
            .timestamp_ms
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Self {
            symbol: symbol.to_string(),
            bid: tick.bid.map(|raw| price_from_raw(raw, digits)),
            ask: tick.ask.map(|raw| price_from_raw(raw, digits)),
            timestamp,
        }
    }
}

/// Last known prices for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivePrice {
    /// Best bid.
    pub bid: Option<Decimal>,
    /// Best ask.
    pub ask: Option<Decimal>,
    /// Mid price, when both sides are known.
    pub mid: Option<Decimal>,
    /// Time of the last update.
    pub updated_at: DateTime<Utc>,
}

/// Live price cache keyed by normalised instrument name.
///
/// Written from the session loop's tick handlers, read from anywhere.
#[derive(Debug, Default)]
pub struct PriceBook {
    prices: RwLock<HashMap<String, LivePrice>>,
}

/// Shared handle to a [`PriceBook`].
pub type SharedPriceBook = Arc<PriceBook>;

impl PriceBook {
    /// Create an empty price book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a quote. A missing side keeps its previous value.
    pub fn apply(&self, quote: &Quote) {
        let mut prices = self.prices.write();
        let previous = prices.get(&quote.symbol);
        let bid = quote.bid.or_else(|| previous.and_then(|p| p.bid));
        let ask = quote.ask.or_else(|| previous.and_then(|p| p.ask));
        let mid = match (bid, ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => None,
        };
        prices.insert(
            quote.symbol.clone(),
            LivePrice {
                bid,
                ask,
                mid,
                updated_at: quote.timestamp,
            },
        );
    }

    /// Latest prices for an instrument.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<LivePrice> {
        self.prices.read().get(symbol).cloned()
    }

    /// Number of instruments with a live price.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether no instrument has a live price yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}

// =============================================================================
// Historical Bars
// =============================================================================

/// Bar period supported by the venue's trendbar request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendbarPeriod {
    /// 1 minute.
    M1,
    /// 2 minutes.
    M2,
    /// 3 minutes.
    M3,
    /// 4 minutes.
    M4,
    /// 5 minutes.
    M5,
    /// 10 minutes.
    M10,
    /// 15 minutes.
    M15,
    /// 30 minutes.
    M30,
    /// 1 hour.
    H1,
    /// 4 hours.
    H4,
    /// 12 hours.
    H12,
    /// 1 day.
    D1,
    /// 1 week.
    W1,
    /// 1 month.
    Mn1,
}

impl TrendbarPeriod {
    /// Venue enum value.
    #[must_use]
    pub const fn wire_value(self) -> i32 {
        match self {
            Self::M1 => 1,
            Self::M2 => 2,
            Self::M3 => 3,
            Self::M4 => 4,
            Self::M5 => 5,
            Self::M10 => 6,
            Self::M15 => 7,
            Self::M30 => 8,
            Self::H1 => 9,
            Self::H4 => 10,
            Self::H12 => 11,
            Self::D1 => 12,
            Self::W1 => 13,
            Self::Mn1 => 14,
        }
    }

    /// Parse a venue enum value.
    #[must_use]
    pub const fn from_wire(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::M1,
            2 => Self::M2,
            3 => Self::M3,
            4 => Self::M4,
            5 => Self::M5,
            6 => Self::M10,
            7 => Self::M15,
            8 => Self::M30,
            9 => Self::H1,
            10 => Self::H4,
            11 => Self::H12,
            12 => Self::D1,
            13 => Self::W1,
            14 => Self::Mn1,
            _ => return None,
        })
    }

    /// Nominal period length in seconds (a month counts as 30 days).
    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::M1 => 60,
            Self::M2 => 120,
            Self::M3 => 180,
            Self::M4 => 240,
            Self::M5 => 300,
            Self::M10 => 600,
            Self::M15 => 900,
            Self::M30 => 1_800,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::H12 => 43_200,
            Self::D1 => 86_400,
            Self::W1 => 604_800,
            Self::Mn1 => 2_592_000,
        }
    }
}

/// Error returned for an unrecognised period label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported timeframe: {0}")]
pub struct UnsupportedPeriod(pub String);

impl FromStr for TrendbarPeriod {
    type Err = UnsupportedPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "1m" => Self::M1,
            "2m" => Self::M2,
            "3m" => Self::M3,
            "4m" => Self::M4,
            "5m" => Self::M5,
            "10m" => Self::M10,
            "15m" => Self::M15,
            "30m" => Self::M30,
            "1h" => Self::H1,
            "4h" => Self::H4,
            "12h" => Self::H12,
            "1d" => Self::D1,
            "1w" => Self::W1,
            "1mn" => Self::Mn1,
            _ => return Err(UnsupportedPeriod(s.to_string())),
        })
    }
}

/// Raw venue trendbar: low price plus unsigned deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTrendbar {
    /// Low price (raw units).
    pub low: i64,
    /// Open minus low.
    pub delta_open: u64,
    /// High minus low.
    pub delta_high: u64,
    /// Close minus low.
    pub delta_close: u64,
    /// Tick volume.
    pub volume: i64,
    /// Bar open time in minutes since the Unix epoch.
    pub utc_timestamp_minutes: u32,
}

/// OHLCV bar with decimal prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bar {
    /// Bar open time.
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Tick volume.
    pub volume: i64,
}

impl Bar {
    /// Decode a raw trendbar using the instrument's price digits.
    #[must_use]
    pub fn from_raw(raw: &RawTrendbar, digits: u32) -> Self {
        let low = Decimal::from_i128_with_scale(i128::from(raw.low), digits);
        let offset = |delta: u64| {
            (low + Decimal::from_i128_with_scale(i128::from(delta), digits)).normalize()
        };
        let timestamp = DateTime::from_timestamp(i64::from(raw.utc_timestamp_minutes) * 60, 0)
            .unwrap_or(DateTime::UNIX_EPOCH);
        Self {
            timestamp,
            open: offset(raw.delta_open),
            high: offset(raw.delta_high),
            low: low.normalize(),
            close: offset(raw.delta_close),
            volume: raw.volume,
        }
    }

    /// Decode and sort a batch of raw trendbars, oldest first.
    #[must_use]
    pub fn from_raw_sorted(raw: &[RawTrendbar], digits: u32) -> Vec<Self> {
        let mut bars: Vec<Self> = raw.iter().map(|b| Self::from_raw(b, digits)).collect();
        bars.sort_by_key(|b| b.timestamp);
        bars
    }
}
