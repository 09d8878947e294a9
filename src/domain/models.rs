use serde::{Deserialize, Serialize};

use crate::domain::numeric::{lenient_f64, lenient_opt_string, lenient_string};

// Per-asset row (per_asset). Numeric columns stay optional: a missing or
// malformed number is shown as missing and aggregated as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetRow {
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub group: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub barca: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_quantity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target_percent: Option<f64>,
    // As reported by the backend against the full portfolio. Not used for
    // deviation maths, which is always recomputed against the active total.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub deviation: Option<f64>,
}

impl AssetRow {
    pub fn value_or_zero(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

// Group rollup (per_group), computed upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRollup {
    #[serde(default, deserialize_with = "lenient_string")]
    pub group: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub deviation: Option<f64>,
}

impl GroupRollup {
    /// Dollar equivalent of the percent deviation, `value * deviation / 100`.
    pub fn value_deviation(&self) -> f64 {
        self.value.unwrap_or(0.0) * (self.deviation.unwrap_or(0.0) / 100.0)
    }
}

// BARCA target row (per_barca). Older backends omit `value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarcaTarget {
    #[serde(default, deserialize_with = "lenient_string")]
    pub barca: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub deviation: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
}

impl BarcaTarget {
    pub fn value_deviation(&self) -> Option<f64> {
        self.value
            .map(|value| value * (self.deviation.unwrap_or(0.0) / 100.0))
    }
}

// BARCA actual row (per_barca_actual)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarcaActual {
    #[serde(default, deserialize_with = "lenient_string")]
    pub barca: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_percent: Option<f64>,
}

/// Body of `GET /api/allocations`. Missing keys decode as empty tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationsPayload {
    #[serde(default)]
    pub per_asset: Vec<AssetRow>,
    #[serde(default)]
    pub per_group: Vec<GroupRollup>,
    #[serde(default)]
    pub per_barca: Vec<BarcaTarget>,
    #[serde(default)]
    pub per_barca_actual: Vec<BarcaActual>,
}

// One row of `GET /api/history`. Which fields are populated depends on the
// level that was requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub barca: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPayload {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub rows: Vec<HistorySnapshot>,
}

/// Rows that carry a target allocation percentage.
pub trait Targeted {
    fn target_percent(&self) -> Option<f64>;
}

impl Targeted for AssetRow {
    fn target_percent(&self) -> Option<f64> {
        self.target_percent
    }
}

impl Targeted for GroupRollup {
    fn target_percent(&self) -> Option<f64> {
        self.target_percent
    }
}

impl Targeted for BarcaTarget {
    fn target_percent(&self) -> Option<f64> {
        self.target_percent
    }
}
