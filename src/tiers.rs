// 🏷️ Giving Tiers - Tier tables as data
// Ordered (label, inclusive lower bound) bands, scanned highest bound first

use serde::{Deserialize, Serialize};
use std::fmt;

pub const NO_GIFT: &str = "No Gift";

// ============================================================================
// TIER BAND
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBand {
    pub label: String,
    /// Inclusive lower bound
    pub min: f64,
}

impl TierBand {
    pub fn new(label: impl Into<String>, min: f64) -> Self {
        TierBand {
            label: label.into(),
            min,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierTableError {
    Empty,
    NonFiniteBound(String),
    DuplicateLabel(String),
    /// The lowest band must start at or below zero so every amount has a tier
    NoFloor(f64),
}

impl fmt::Display for TierTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierTableError::Empty => write!(f, "tier table has no bands"),
            TierTableError::NonFiniteBound(label) => {
                write!(f, "tier '{}' has a non-finite lower bound", label)
            }
            TierTableError::DuplicateLabel(label) => write!(f, "duplicate tier label '{}'", label),
            TierTableError::NoFloor(min) => {
                write!(f, "lowest tier starts at {} (must be <= 0)", min)
            }
        }
    }
}

impl std::error::Error for TierTableError {}

// ============================================================================
// TIER TABLE
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawTierTable {
    bands: Vec<TierBand>,
    #[serde(default = "default_no_gift")]
    no_gift_label: String,
}

fn default_no_gift() -> String {
    NO_GIFT.to_string()
}

/// Amount → tier label lookup.
///
/// Bands are kept sorted by descending bound; `tier_of` returns the first
/// band whose bound the amount meets, so a value sitting exactly on a
/// cutoff lands in the higher tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTierTable")]
pub struct TierTable {
    bands: Vec<TierBand>,
    no_gift_label: String,
}

impl TierTable {
    pub fn new(mut bands: Vec<TierBand>, no_gift_label: impl Into<String>) -> Result<Self, TierTableError> {
        if bands.is_empty() {
            return Err(TierTableError::Empty);
        }

        for (i, band) in bands.iter().enumerate() {
            if !band.min.is_finite() {
                return Err(TierTableError::NonFiniteBound(band.label.clone()));
            }
            if bands[..i].iter().any(|b| b.label == band.label) {
                return Err(TierTableError::DuplicateLabel(band.label.clone()));
            }
        }

        // Highest bound first
        bands.sort_by(|a, b| b.min.total_cmp(&a.min));

        let floor = bands[bands.len() - 1].min;
        if floor > 0.0 {
            return Err(TierTableError::NoFloor(floor));
        }

        Ok(TierTable {
            bands,
            no_gift_label: no_gift_label.into(),
        })
    }

    /// Donor-list tiers: $5K+, $1K-$4.9K, $500-$999, <$500
    pub fn giving_tiers() -> Self {
        TierTable {
            bands: vec![
                TierBand::new("$5K+", 5000.0),
                TierBand::new("$1K-$4.9K", 1000.0),
                TierBand::new("$500-$999", 500.0),
                TierBand::new("<$500", 0.0),
            ],
            no_gift_label: NO_GIFT.to_string(),
        }
    }

    /// Numbered ladder used for year-over-year tier movement
    pub fn ladder_tiers() -> Self {
        TierTable {
            bands: vec![
                TierBand::new("Tier 1", 10000.0),
                TierBand::new("Tier 2", 5000.0),
                TierBand::new("Tier 3", 1000.0),
                TierBand::new("Tier 4", 0.0),
            ],
            no_gift_label: NO_GIFT.to_string(),
        }
    }

    pub fn tier_of(&self, amount: Option<f64>) -> &str {
        let amount = match amount {
            Some(a) => a,
            None => return &self.no_gift_label,
        };

        self.bands
            .iter()
            .find(|band| amount >= band.min)
            .or_else(|| self.bands.last())
            .map(|band| band.label.as_str())
            .unwrap_or(&self.no_gift_label)
    }

    /// Band labels from the highest tier down
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|b| b.label.as_str())
    }

    pub fn no_gift_label(&self) -> &str {
        &self.no_gift_label
    }

    pub fn bands(&self) -> &[TierBand] {
        &self.bands
    }
}

impl TryFrom<RawTierTable> for TierTable {
    type Error = TierTableError;

    fn try_from(raw: RawTierTable) -> Result<Self, Self::Error> {
        TierTable::new(raw.bands, raw.no_gift_label)
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::giving_tiers()
    }
}

// ============================================================================
// TESTS
// ============================================================================
