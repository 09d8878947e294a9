use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::models::{AssetRow, Targeted};
use crate::error::ConfigError;

/// Share of the absolute value deviation suggested as the next DCA order.
pub const DCA_FRACTION: f64 = 0.3;

/// One per-asset row plus its deviation metrics against a reference total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetMetrics {
    pub symbol: String,
    pub group: String,
    pub barca: String,
    pub price: Option<f64>,
    pub current_quantity: Option<f64>,
    pub value: Option<f64>,
    pub target_percent: Option<f64>,
    pub current_percent: f64,
    #[serde(rename = "deviation")]
    pub deviation_percent: f64,
    pub target_value: f64,
    pub value_deviation: f64,
    pub dca: f64,
}

impl AssetMetrics {
    pub fn from_row(row: &AssetRow, total: f64) -> Self {
        let value = row.value_or_zero();
        let target_percent = row.target_percent.unwrap_or(0.0);
        let current_percent = percent_of_total(value, total);
        let target_value = if has_usable_total(total) {
            total * target_percent / 100.0
        } else {
            0.0
        };
        let value_deviation = if has_usable_total(total) {
            value - target_value
        } else {
            0.0
        };

        Self {
            symbol: row.symbol.clone(),
            group: row.group.clone(),
            barca: row.barca.clone(),
            price: row.price,
            current_quantity: row.current_quantity,
            value: row.value,
            target_percent: row.target_percent,
            current_percent,
            deviation_percent: current_percent - target_percent,
            target_value,
            value_deviation,
            dca: value_deviation.abs() * DCA_FRACTION,
        }
    }

    fn sort_value(&self, key: SortKey) -> SortValue<'_> {
        match key {
            SortKey::Symbol => SortValue::Text(&self.symbol),
            SortKey::Group => SortValue::Text(&self.group),
            SortKey::Barca => SortValue::Text(&self.barca),
            SortKey::Price => self.price.into(),
            SortKey::CurrentQuantity => self.current_quantity.into(),
            SortKey::Value => self.value.into(),
            SortKey::TargetPercent => self.target_percent.into(),
            SortKey::CurrentPercent => Some(self.current_percent).into(),
            SortKey::Deviation => Some(self.deviation_percent).into(),
            SortKey::ValueDeviation => Some(self.value_deviation).into(),
            SortKey::Dca => Some(self.dca).into(),
        }
    }
}

// An overflowed sum would turn every derived metric into inf or NaN.
fn has_usable_total(total: f64) -> bool {
    total.is_finite() && total > 0.0
}

pub fn percent_of_total(value: f64, total: f64) -> f64 {
    if has_usable_total(total) {
        (value / total) * 100.0
    } else {
        0.0
    }
}

/// Sum of `value` over the rows; missing values count as zero.
pub fn total_value(rows: &[AssetRow]) -> f64 {
    rows.iter().map(AssetRow::value_or_zero).sum()
}

/// Derive deviation metrics for every row, in input order.
///
/// `total_override` is the reference total `T`; without it `T` is the sum of
/// `rows`. Use [`reference_total`] to pick `T` for a filtered view.
pub fn compute_asset_metrics(rows: &[AssetRow], total_override: Option<f64>) -> Vec<AssetMetrics> {
    let total = total_override.unwrap_or_else(|| total_value(rows));
    rows.iter()
        .map(|row| AssetMetrics::from_row(row, total))
        .collect()
}

/// Percentage base for the per-asset table.
///
/// With no active filter this is the whole portfolio. With any filter active
/// it is the total of the matching rows only, so a filtered slice sums
/// towards 100% on its own.
pub fn reference_total(all_rows: &[AssetRow], filter: &AssetFilter) -> f64 {
    if filter.is_active() {
        all_rows
            .iter()
            .filter(|row| filter.matches(row))
            .map(AssetRow::value_or_zero)
            .sum()
    } else {
        total_value(all_rows)
    }
}

/// Sum of target percentages for a table footer. Never fails: entries that
/// did not decode as a number contribute zero.
pub fn sum_target_percent<T: Targeted>(rows: &[T]) -> f64 {
    rows.iter()
        .filter_map(Targeted::target_percent)
        .filter(|v| v.is_finite())
        .sum()
}

/// Equality filter on symbol/group/BARCA. `None` or blank matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFilter {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub barca: Option<String>,
}

impl AssetFilter {
    fn selected(field: &Option<String>) -> Option<&str> {
        field.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn field_matches(field: &Option<String>, value: &str) -> bool {
        Self::selected(field).is_none_or(|wanted| wanted == value)
    }

    pub fn is_active(&self) -> bool {
        Self::selected(&self.symbol).is_some()
            || Self::selected(&self.group).is_some()
            || Self::selected(&self.barca).is_some()
    }

    pub fn matches(&self, row: &AssetRow) -> bool {
        Self::field_matches(&self.symbol, &row.symbol)
            && Self::field_matches(&self.group, &row.group)
            && Self::field_matches(&self.barca, &row.barca)
    }

    pub fn apply(&self, rows: &[AssetRow]) -> Vec<AssetRow> {
        rows.iter().filter(|row| self.matches(row)).cloned().collect()
    }
}

/// Sortable per-asset columns, named by their wire keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Symbol,
    Group,
    Barca,
    Price,
    CurrentQuantity,
    Value,
    TargetPercent,
    CurrentPercent,
    Deviation,
    ValueDeviation,
    Dca,
}

impl SortKey {
    pub const ALL: [Self; 11] = [
        Self::Symbol,
        Self::Group,
        Self::Barca,
        Self::Price,
        Self::CurrentQuantity,
        Self::Value,
        Self::TargetPercent,
        Self::CurrentPercent,
        Self::Deviation,
        Self::ValueDeviation,
        Self::Dca,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::Group => "group",
            Self::Barca => "barca",
            Self::Price => "price",
            Self::CurrentQuantity => "current_quantity",
            Self::Value => "value",
            Self::TargetPercent => "target_percent",
            Self::CurrentPercent => "current_percent",
            Self::Deviation => "deviation",
            Self::ValueDeviation => "value_deviation",
            Self::Dca => "dca",
        }
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or(ConfigError::UnknownSortKey(value.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortDirection {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(ConfigError::UnknownSortDirection(value.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSort {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for AssetSort {
    fn default() -> Self {
        Self {
            key: SortKey::Value,
            direction: SortDirection::Desc,
        }
    }
}

impl AssetSort {
    /// Header click: the active column flips direction, a new column starts ascending.
    pub fn toggle(self, key: SortKey) -> Self {
        if self.key == key {
            Self {
                key,
                direction: self.direction.toggle(),
            }
        } else {
            Self {
                key,
                direction: SortDirection::Asc,
            }
        }
    }
}

enum SortValue<'a> {
    Number(f64),
    Text(&'a str),
    Missing,
}

// NaN has no place in the order, so it sorts with the missing values.
impl From<Option<f64>> for SortValue<'_> {
    fn from(value: Option<f64>) -> Self {
        value
            .filter(|v| !v.is_nan())
            .map_or(SortValue::Missing, SortValue::Number)
    }
}

impl SortValue<'_> {
    fn folded(&self) -> Cow<'_, str> {
        match self {
            SortValue::Number(n) => Cow::Owned(n.to_string()),
            SortValue::Text(s) => Cow::Owned(s.to_lowercase()),
            SortValue::Missing => Cow::Borrowed(""),
        }
    }
}

// Missing values sink to the bottom whatever the direction.
fn compare_sort_values(a: &SortValue<'_>, b: &SortValue<'_>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
        (SortValue::Missing, _) => Ordering::Greater,
        (_, SortValue::Missing) => Ordering::Less,
        (SortValue::Number(x), SortValue::Number(y)) => {
            direction.apply(x.total_cmp(y))
        }
        _ => direction.apply(a.folded().cmp(&b.folded())),
    }
}

/// Stable in-place sort; equal keys keep their input order in both directions.
pub fn sort_asset_metrics(rows: &mut [AssetMetrics], sort: AssetSort) {
    rows.sort_by(|a, b| {
        compare_sort_values(
            &a.sort_value(sort.key),
            &b.sort_value(sort.key),
            sort.direction,
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(symbol: &str, group: &str, barca: &str, value: f64, target: f64) -> AssetRow {
        AssetRow {
            symbol: symbol.to_string(),
            group: group.to_string(),
            barca: barca.to_string(),
            value: Some(value),
            target_percent: Some(target),
            ..Default::default()
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn sum_target_percent_ignores_non_numeric_entries() {
        let rows: Vec<AssetRow> = serde_json::from_value(json!([
            {"target_percent": "15"},
            {"target_percent": "invalid"},
            {"target_percent": 5}
        ]))
        .unwrap();
        assert_close(sum_target_percent(&rows), 20.0);
    }

    #[test]
    fn zero_total_yields_zero_metrics_without_dividing() {
        let rows = vec![
            row("BTC", "Core", "Base", 0.0, 40.0),
            row("ETH", "Core", "Base", 0.0, 60.0),
        ];
        let metrics = compute_asset_metrics(&rows, None);
        for (m, r) in metrics.iter().zip(&rows) {
            assert_eq!(m.current_percent, 0.0);
            assert_eq!(m.target_value, 0.0);
            assert_eq!(m.value_deviation, 0.0);
            assert_eq!(m.dca, 0.0);
            assert_close(m.deviation_percent, -r.target_percent.unwrap());
        }
    }

    #[test]
    fn unfiltered_metrics_against_full_total() {
        let rows = vec![
            row("BTC", "Core", "Base", 60.0, 50.0),
            row("ETH", "Core", "Base", 40.0, 50.0),
        ];
        let metrics = compute_asset_metrics(&rows, None);

        assert_close(metrics[0].current_percent, 60.0);
        assert_close(metrics[0].deviation_percent, 10.0);
        assert_close(metrics[0].value_deviation, 10.0);
        assert_close(metrics[0].dca, 3.0);

        assert_close(metrics[1].current_percent, 40.0);
        assert_close(metrics[1].deviation_percent, -10.0);
        assert_close(metrics[1].value_deviation, -10.0);
        assert_close(metrics[1].dca, 3.0);
    }

    #[test]
    fn filtering_switches_the_percentage_base() {
        let rows = vec![
            row("BTC", "Core", "Base", 50.0, 40.0),
            row("ETH", "Core", "Growth", 30.0, 30.0),
            row("SOL", "Alt", "Growth", 20.0, 30.0),
        ];

        let unfiltered = AssetFilter::default();
        let t_all = reference_total(&rows, &unfiltered);
        assert_close(t_all, 100.0);
        let all = compute_asset_metrics(&unfiltered.apply(&rows), Some(t_all));

        let core = AssetFilter {
            group: Some("Core".to_string()),
            ..Default::default()
        };
        let t_core = reference_total(&rows, &core);
        assert_close(t_core, 80.0);
        let filtered = compute_asset_metrics(&core.apply(&rows), Some(t_core));

        assert_eq!(filtered.len(), 2);
        let eth_all = all.iter().find(|m| m.symbol == "ETH").unwrap();
        let eth_core = filtered.iter().find(|m| m.symbol == "ETH").unwrap();
        assert_close(eth_all.current_percent, 30.0);
        assert_close(eth_core.current_percent, 37.5);
        assert_close(eth_core.deviation_percent, 7.5);
        assert!(eth_all.current_percent != eth_core.current_percent);
    }

    #[test]
    fn missing_values_aggregate_as_zero_but_are_kept() {
        let mut broken = row("DOGE", "Meme", "Degen", 0.0, 5.0);
        broken.value = None;
        let rows = vec![row("BTC", "Core", "Base", 100.0, 95.0), broken];

        let metrics = compute_asset_metrics(&rows, None);
        assert_eq!(metrics.len(), 2);
        assert_close(metrics[0].current_percent, 100.0);
        assert_eq!(metrics[1].value, None);
        assert_close(metrics[1].current_percent, 0.0);
        assert_close(metrics[1].value_deviation, -5.0);
    }

    #[test]
    fn blank_filter_fields_match_everything() {
        let filter = AssetFilter {
            symbol: Some("  ".to_string()),
            group: None,
            barca: Some(String::new()),
        };
        assert!(!filter.is_active());
        assert!(filter.matches(&row("BTC", "Core", "Base", 1.0, 1.0)));
    }

    #[test]
    fn sorting_by_deviation_is_stable_in_both_directions() {
        let rows = vec![
            row("A", "g", "b", 10.0, 10.0), // 10% vs 10 -> 0
            row("B", "g", "b", 50.0, 20.0), // 50% vs 20 -> +30
            row("C", "g", "b", 10.0, 10.0), // tie with A
            row("D", "g", "b", 30.0, 60.0), // 30% vs 60 -> -30
        ];
        let mut metrics = compute_asset_metrics(&rows, None);

        let desc = AssetSort {
            key: SortKey::Deviation,
            direction: SortDirection::Desc,
        };
        sort_asset_metrics(&mut metrics, desc);
        let order: Vec<_> = metrics.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, ["B", "A", "C", "D"]);

        sort_asset_metrics(&mut metrics, desc.toggle(SortKey::Deviation));
        let order: Vec<_> = metrics.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, ["D", "A", "C", "B"]);
    }

    #[test]
    fn text_columns_sort_case_insensitively_and_missing_numbers_sink() {
        let mut no_price = row("eth", "g", "b", 1.0, 0.0);
        no_price.price = None;
        let mut btc = row("BTC", "g", "b", 1.0, 0.0);
        btc.price = Some(100.0);
        let mut ada = row("ada", "g", "b", 1.0, 0.0);
        ada.price = Some(1.0);
        let mut metrics = compute_asset_metrics(&[no_price, btc, ada], None);

        sort_asset_metrics(
            &mut metrics,
            AssetSort {
                key: SortKey::Symbol,
                direction: SortDirection::Asc,
            },
        );
        let order: Vec<_> = metrics.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, ["ada", "BTC", "eth"]);

        sort_asset_metrics(
            &mut metrics,
            AssetSort {
                key: SortKey::Price,
                direction: SortDirection::Desc,
            },
        );
        let order: Vec<_> = metrics.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, ["BTC", "ada", "eth"]);
    }

    #[test]
    fn overflowing_total_is_treated_like_an_empty_portfolio() {
        let rows: Vec<AssetRow> = ["A", "B", "C", "D"]
            .iter()
            .map(|s| row(s, "g", "b", 1e308, 25.0))
            .collect();
        assert!(total_value(&rows).is_infinite());

        let mut metrics = compute_asset_metrics(&rows, None);
        for m in &metrics {
            assert_eq!(m.current_percent, 0.0);
            assert_eq!(m.target_value, 0.0);
            assert_eq!(m.value_deviation, 0.0);
            assert_close(m.deviation_percent, -25.0);
        }

        let sort = AssetSort {
            key: SortKey::ValueDeviation,
            direction: SortDirection::Desc,
        };
        sort_asset_metrics(&mut metrics, sort);
        let order: Vec<_> = metrics.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, ["A", "B", "C", "D"]);
    }

    #[test]
    fn nan_prices_sink_with_the_missing_values() {
        let mut nan = row("NAN", "g", "b", 1.0, 0.0);
        nan.price = Some(f64::NAN);
        let mut low = row("LOW", "g", "b", 1.0, 0.0);
        low.price = Some(1.0);
        let mut high = row("HIGH", "g", "b", 1.0, 0.0);
        high.price = Some(100.0);
        let mut metrics = compute_asset_metrics(&[nan, low, high], None);

        let asc = AssetSort {
            key: SortKey::Price,
            direction: SortDirection::Asc,
        };
        sort_asset_metrics(&mut metrics, asc);
        let order: Vec<_> = metrics.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, ["LOW", "HIGH", "NAN"]);

        sort_asset_metrics(&mut metrics, asc.toggle(SortKey::Price));
        let order: Vec<_> = metrics.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, ["HIGH", "LOW", "NAN"]);
    }

    #[test]
    fn header_toggle_flips_or_resets_direction() {
        let sort = AssetSort::default();
        assert_eq!(sort.key, SortKey::Value);
        assert_eq!(sort.direction, SortDirection::Desc);
        assert_eq!(sort.toggle(SortKey::Value).direction, SortDirection::Asc);
        let other = sort.toggle(SortKey::Symbol);
        assert_eq!(other.key, SortKey::Symbol);
        assert_eq!(other.direction, SortDirection::Asc);
    }

    #[test]
    fn sort_key_parsing() {
        assert_eq!(SortKey::from_str("value_deviation").unwrap(), SortKey::ValueDeviation);
        assert!(matches!(
            SortKey::from_str("comments"),
            Err(ConfigError::UnknownSortKey(_))
        ));
        assert!(SortDirection::from_str("sideways").is_err());
    }
}
