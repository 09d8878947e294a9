use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use serde::Serialize;
use tracing::debug;

use crate::domain::granularity::{Granularity, HistoryLevel};
use crate::domain::models::HistorySnapshot;

/// History timestamps are recorded three hours ahead of the display timezone.
pub const DEFAULT_DISPLAY_OFFSET_HOURS: i64 = 3;
/// Largest display offset accepted from configuration, in either direction.
pub const MAX_DISPLAY_OFFSET_HOURS: i64 = 24;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketOptions {
    /// Subtracted from every timestamp before it is assigned to a bucket.
    pub display_offset: TimeDelta,
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            display_offset: TimeDelta::hours(DEFAULT_DISPLAY_OFFSET_HOURS),
        }
    }
}

impl BucketOptions {
    /// `None` when `hours` does not fit in a `TimeDelta`.
    pub fn with_offset_hours(hours: i64) -> Option<Self> {
        TimeDelta::try_hours(hours).map(|display_offset| Self { display_offset })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodValue {
    Value(f64),
    Values(BTreeMap<String, f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    #[serde(rename = "period")]
    pub label: String,
    /// Latest original (unshifted) timestamp that fell into the bucket.
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub value: PeriodValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketedSeries {
    pub level: HistoryLevel,
    pub granularity: Granularity,
    pub periods: Vec<Period>,
    /// Distinct series keys (symbols or BARCA tags) seen in the input, sorted.
    pub keys: Vec<String>,
}

impl BucketedSeries {
    /// Narrow every period's value map to `keys`. Totals are left as they are.
    pub fn retain_keys(&mut self, keys: &[String]) {
        let wanted: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
        for period in &mut self.periods {
            if let PeriodValue::Values(values) = &mut period.value {
                values.retain(|k, _| wanted.contains(k.as_str()));
            }
        }
    }
}

/// Series shown on the chart: the caller's choice restricted to what was
/// observed, or every observed key when nothing was chosen.
pub fn select_keys(observed: &[String], chosen: Option<&[String]>) -> Vec<String> {
    match chosen {
        Some(chosen) if !chosen.is_empty() => observed
            .iter()
            .filter(|k| chosen.contains(k))
            .cloned()
            .collect(),
        _ => observed.to_vec(),
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Calendar bucket label for an already offset-adjusted wall-clock time.
/// Weeks start on Monday.
pub fn bucket_label(local: NaiveDateTime, granularity: Granularity) -> String {
    let date = local.date();
    let floored = |step: u32| {
        format!(
            "{} {:02}:{:02}",
            date.format("%Y-%m-%d"),
            local.hour(),
            local.minute() - local.minute() % step
        )
    };

    match granularity {
        Granularity::FiveMinutes => floored(5),
        Granularity::ThirtyMinutes => floored(30),
        Granularity::OneHour => format!("{} {:02}:00", date.format("%Y-%m-%d"), local.hour()),
        Granularity::FourHours => format!(
            "{} {:02}:00",
            date.format("%Y-%m-%d"),
            local.hour() - local.hour() % 4
        ),
        Granularity::Daily => date.format("%Y-%m-%d").to_string(),
        Granularity::Weekly => {
            let monday = date - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()));
            monday.format("%Y-%m-%d").to_string()
        }
        Granularity::Monthly => date.format("%Y-%m").to_string(),
        Granularity::Quarterly => format!("{}-Q{}", date.year(), date.month0() / 3 + 1),
        Granularity::Yearly => date.year().to_string(),
    }
}

#[derive(Default)]
struct Bucket {
    latest: Option<DateTime<Utc>>,
    total: Option<(DateTime<Utc>, f64)>,
    series: BTreeMap<String, (DateTime<Utc>, f64)>,
}

// `>=` so that among equal timestamps the later input row wins.
fn is_newer(candidate: DateTime<Utc>, current: Option<DateTime<Utc>>) -> bool {
    current.is_none_or(|existing| candidate >= existing)
}

/// Downsample history rows into calendar periods, keeping the last
/// observation per bucket (totals) or per bucket and series key
/// (assets/BARCA). Rows without a parseable timestamp, or without a series
/// key at the assets/BARCA levels, are skipped.
pub fn bucketize(
    snapshots: &[HistorySnapshot],
    granularity: Granularity,
    level: HistoryLevel,
    options: BucketOptions,
) -> BucketedSeries {
    let mut buckets: HashMap<String, Bucket> = HashMap::new();
    let mut keys: BTreeSet<String> = BTreeSet::new();
    let mut dropped = 0usize;

    for snap in snapshots {
        let Some(ts) = snap.timestamp.as_deref().and_then(parse_timestamp) else {
            dropped += 1;
            continue;
        };
        let series_key = match level {
            HistoryLevel::Totals => None,
            HistoryLevel::Assets => match snap.symbol.as_deref() {
                Some(symbol) => Some(symbol),
                None => {
                    dropped += 1;
                    continue;
                }
            },
            HistoryLevel::Barca => match snap.barca.as_deref() {
                Some(barca) => Some(barca),
                None => {
                    dropped += 1;
                    continue;
                }
            },
        };

        let Some(shifted) = ts.checked_sub_signed(options.display_offset) else {
            dropped += 1;
            continue;
        };
        let local = shifted.naive_utc();
        let bucket = buckets.entry(bucket_label(local, granularity)).or_default();
        if is_newer(ts, bucket.latest) {
            bucket.latest = Some(ts);
        }

        match series_key {
            None => {
                let value = snap.total_value.or(snap.value).unwrap_or(0.0);
                if is_newer(ts, bucket.total.map(|(t, _)| t)) {
                    bucket.total = Some((ts, value));
                }
            }
            Some(key) => {
                let value = snap.value.unwrap_or(0.0);
                let current = bucket.series.get(key).map(|(t, _)| *t);
                if is_newer(ts, current) {
                    bucket.series.insert(key.to_string(), (ts, value));
                }
                keys.insert(key.to_string());
            }
        }
    }

    if dropped > 0 {
        debug!(dropped, level = %level, "Skipped history rows without usable timestamp or key");
    }

    let mut periods: Vec<Period> = buckets
        .into_iter()
        .filter_map(|(label, bucket)| {
            let timestamp = bucket.latest?;
            let value = match level {
                HistoryLevel::Totals => PeriodValue::Value(bucket.total.map_or(0.0, |(_, v)| v)),
                HistoryLevel::Assets | HistoryLevel::Barca => PeriodValue::Values(
                    bucket
                        .series
                        .into_iter()
                        .map(|(key, (_, value))| (key, value))
                        .collect(),
                ),
            };
            Some(Period {
                label,
                timestamp,
                value,
            })
        })
        .collect();
    periods.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.label.cmp(&b.label)));

    BucketedSeries {
        level,
        granularity,
        periods,
        keys: keys.into_iter().collect(),
    }
}
