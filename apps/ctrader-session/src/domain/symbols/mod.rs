//! Symbol Cache
//!
//! Immutable snapshot mapping human-readable instrument names to
//! venue-assigned ids, plus per-instrument price metadata.
//!
//! # Design
//!
//! A cache is built from one complete symbol-list response and never
//! patched. A later load produces a new cache that replaces the old one
//! wholesale; readers holding an `Arc` to the old snapshot keep a
//! consistent view.

use std::collections::HashMap;

use super::market::{DEFAULT_PRICE_DIGITS, SymbolId};

/// One entry of the venue's light symbol list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolListing {
    /// Venue-assigned id.
    pub symbol_id: SymbolId,
    /// Name as published by the venue (may contain `/`).
    pub name: String,
    /// Whether trading is enabled for the instrument.
    pub enabled: bool,
    /// Free-text description.
    pub description: Option<String>,
}

/// Metadata for one cached instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Venue-assigned id.
    pub symbol_id: SymbolId,
    /// Normalised name (`/` removed).
    pub name: String,
    /// Name as published by the venue.
    pub display_name: String,
    /// Number of decimal digits in raw prices.
    pub digits: u32,
    /// Whether trading is enabled for the instrument.
    pub enabled: bool,
}

impl SymbolInfo {
    /// Price scaling divisor (`10^digits`).
    #[must_use]
    pub const fn divisor(&self) -> u64 {
        10_u64.pow(self.digits)
    }
}

/// Normalise an instrument name for lookup (`EUR/USD` -> `EURUSD`).
#[must_use]
pub fn normalize_symbol(name: &str) -> String {
    name.trim().replace('/', "")
}

/// Bidirectional name/id index over one symbol-list snapshot.
#[derive(Debug, Clone, Default)]
pub struct SymbolCache {
    by_name: HashMap<String, SymbolInfo>,
    by_id: HashMap<SymbolId, String>,
}

impl SymbolCache {
    /// Empty cache, used before the first successful load.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a cache from a full symbol-list response.
    ///
    /// When the venue repeats a normalised name the first listing wins and
    /// the repeated id is left out of both indexes.
    #[must_use]
    pub fn from_listings(listings: &[SymbolListing]) -> Self {
        let mut by_name = HashMap::with_capacity(listings.len());
        let mut by_id = HashMap::with_capacity(listings.len());

        for listing in listings {
            let name = normalize_symbol(&listing.name);
            if name.is_empty() || by_name.contains_key(&name) || by_id.contains_key(&listing.symbol_id)
            {
                tracing::debug!(
                    symbol = %listing.name,
                    symbol_id = listing.symbol_id,
                    "Skipping duplicate symbol listing"
                );
                continue;
            }
            by_id.insert(listing.symbol_id, name.clone());
            by_name.insert(
                name.clone(),
                SymbolInfo {
                    symbol_id: listing.symbol_id,
                    name,
                    display_name: listing.name.clone(),
                    digits: DEFAULT_PRICE_DIGITS,
                    enabled: listing.enabled,
                },
            );
        }

        Self { by_name, by_id }
    }

    /// Look up an instrument by name; `/` separators are ignored.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SymbolInfo> {
        self.by_name.get(&normalize_symbol(name))
    }

    /// Look up an instrument by venue id.
    #[must_use]
    pub fn get_by_id(&self, symbol_id: SymbolId) -> Option<&SymbolInfo> {
        self.by_id
            .get(&symbol_id)
            .and_then(|name| self.by_name.get(name))
    }

    /// Normalised name for a venue id.
    #[must_use]
    pub fn name_of(&self, symbol_id: SymbolId) -> Option<&str> {
        self.by_id.get(&symbol_id).map(String::as_str)
    }

    /// Whether the id is part of this snapshot.
    #[must_use]
    pub fn contains_id(&self, symbol_id: SymbolId) -> bool {
        self.by_id.contains_key(&symbol_id)
    }

    /// Number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the cache holds no instruments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All normalised names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of id -> name entries (equal to `len()` by construction).
    #[must_use]
    pub fn id_count(&self) -> usize {
        self.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn listing(id: SymbolId, name: &str) -> SymbolListing {
        SymbolListing {
            symbol_id: id,
            name: name.to_string(),
            enabled: true,
            description: None,
        }
    }

    #[test]
    fn builds_both_indexes() {
        let cache = SymbolCache::from_listings(&[
            listing(1, "EUR/USD"),
            listing(2, "GBP/USD"),
            listing(41, "XAUUSD"),
        ]);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.id_count(), 3);
        assert_eq!(cache.get("EURUSD").unwrap().symbol_id, 1);
        assert_eq!(cache.get("EUR/USD").unwrap().symbol_id, 1);
        assert_eq!(cache.get("EURUSD").unwrap().display_name, "EUR/USD");
        assert_eq!(cache.name_of(41), Some("XAUUSD"));
        assert_eq!(cache.get_by_id(2).unwrap().name, "GBPUSD");
        assert!(cache.get("USDJPY").is_none());
    }

    #[test]
    fn repeated_name_keeps_first_listing() {
        let cache = SymbolCache::from_listings(&[
            listing(1, "EURUSD"),
            listing(2, "GBPUSD"),
            listing(3, "XAUUSD"),
            listing(99, "EUR/USD"),
        ]);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.id_count(), 3);
        assert_eq!(cache.get("EURUSD").unwrap().symbol_id, 1);
        assert!(!cache.contains_id(99));
    }

    #[test]
    fn default_divisor_is_five_digits() {
        let cache = SymbolCache::from_listings(&[listing(1, "EURUSD")]);
        assert_eq!(cache.get("EURUSD").unwrap().divisor(), 100_000);
    }

    #[test]
    fn names_sorted() {
        let cache = SymbolCache::from_listings(&[listing(2, "B"), listing(1, "A")]);
        assert_eq!(cache.names(), vec!["A", "B"]);
    }

    proptest! {
        #[test]
        fn indexes_are_consistent(entries in prop::collection::vec((0_i64..50, "[A-D]{1,2}(/[A-D])?"), 0..40)) {
            let listings: Vec<SymbolListing> = entries
                .iter()
                .map(|(id, name)| listing(*id, name))
                .collect();
            let cache = SymbolCache::from_listings(&listings);

            prop_assert_eq!(cache.len(), cache.id_count());
            for name in cache.names() {
                let info = cache.get(name).unwrap();
                prop_assert_eq!(cache.name_of(info.symbol_id), Some(name));
            }
        }
    }
}
