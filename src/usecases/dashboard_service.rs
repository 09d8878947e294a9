use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::api_client::AllocationsApi;
use crate::domain::granularity::{Granularity, HistoryLevel};
use crate::domain::models::{AllocationsPayload, BarcaActual, BarcaTarget, GroupRollup};
use crate::error::DashboardError;
use crate::usecases::compute_allocations::{
    AssetFilter, AssetMetrics, AssetSort, compute_asset_metrics, reference_total,
    sort_asset_metrics, sum_target_percent, total_value,
};
use crate::usecases::history_buckets::{BucketOptions, BucketedSeries, bucketize, select_keys};
use crate::usecases::table_view::{
    DEFAULT_PAGE_SIZE, FilterOptions, Page, PieSlice, barca_actual_pie, barca_target_pie,
    filter_options, group_pie, local_currency_total, paginate,
};

// Last successful fetch plus the outcome of the most recent attempt.
#[derive(Debug, Default)]
struct DashboardState {
    data: Arc<AllocationsPayload>,
    last_update: Option<DateTime<Utc>>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_wallet_value: f64,
    pub total_local_value: Option<f64>,
    pub usdt_brl_rate: f64,
    pub asset_count: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetQuery {
    pub filter: AssetFilter,
    pub sort: AssetSort,
    pub page: usize,
    pub page_size: usize,
}

impl Default for AssetQuery {
    fn default() -> Self {
        Self {
            filter: AssetFilter::default(),
            sort: AssetSort::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetTable {
    #[serde(flatten)]
    pub page: Page<AssetMetrics>,
    pub sort: AssetSort,
    pub filter: AssetFilter,
    /// True when percentages are relative to the filtered subset.
    pub filtered: bool,
    pub reference_total: f64,
    pub total_target_percent: f64,
    pub options: FilterOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    #[serde(flatten)]
    pub rollup: GroupRollup,
    pub value_deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTable {
    pub rows: Vec<GroupRow>,
    pub total_target_percent: f64,
    pub pie: Vec<PieSlice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarcaTargetRow {
    #[serde(flatten)]
    pub target: BarcaTarget,
    pub value_deviation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarcaSection {
    pub targets: Vec<BarcaTargetRow>,
    pub actual: Vec<BarcaActual>,
    pub total_target_percent: f64,
    pub target_pie: Vec<PieSlice>,
    pub actual_pie: Vec<PieSlice>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    pub level: HistoryLevel,
    pub granularity: Granularity,
    /// Series to chart; `None` or empty means every observed key.
    pub keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    #[serde(flatten)]
    pub series: BucketedSeries,
    pub selected_keys: Vec<String>,
}

pub struct DashboardService {
    provider: Arc<dyn AllocationsApi>,
    usdt_brl_rate: f64,
    bucket_options: BucketOptions,
    state: RwLock<DashboardState>,
}

impl DashboardService {
    pub fn new(
        provider: Arc<dyn AllocationsApi>,
        usdt_brl_rate: f64,
        bucket_options: BucketOptions,
    ) -> Self {
        Self {
            provider,
            usdt_brl_rate,
            bucket_options,
            state: RwLock::new(DashboardState::default()),
        }
    }

    /// Fetch allocations once. A failure leaves the previously loaded data in
    /// place and records a dismissible error message.
    pub async fn refresh(&self) -> Result<Summary, DashboardError> {
        match self.provider.fetch_allocations().await {
            Ok(payload) => {
                info!(
                    assets = payload.per_asset.len(),
                    groups = payload.per_group.len(),
                    barca = payload.per_barca_actual.len(),
                    "Refreshed allocations"
                );
                let mut state = self.state.write().await;
                state.data = Arc::new(payload);
                state.last_update = Some(Utc::now());
                state.error = None;
            }
            Err(e) => {
                error!(error = %e, "Failed fetching allocations; keeping previous data");
                self.state.write().await.error = Some(e.to_string());
                return Err(e);
            }
        }
        Ok(self.summary().await)
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    async fn snapshot(&self) -> Arc<AllocationsPayload> {
        self.state.read().await.data.clone()
    }

    pub async fn summary(&self) -> Summary {
        let state = self.state.read().await;
        let total_wallet_value = total_value(&state.data.per_asset);
        Summary {
            total_wallet_value,
            total_local_value: local_currency_total(total_wallet_value, self.usdt_brl_rate),
            usdt_brl_rate: self.usdt_brl_rate,
            asset_count: state.data.per_asset.len(),
            last_update: state.last_update,
            error: state.error.clone(),
        }
    }

    pub async fn asset_table(&self, query: &AssetQuery) -> AssetTable {
        let data = self.snapshot().await;
        let rows = &data.per_asset;

        let total = reference_total(rows, &query.filter);
        let visible = query.filter.apply(rows);
        let mut metrics = compute_asset_metrics(&visible, Some(total));
        sort_asset_metrics(&mut metrics, query.sort);

        AssetTable {
            page: paginate(metrics, query.page, query.page_size),
            sort: query.sort,
            filter: query.filter.clone(),
            filtered: query.filter.is_active(),
            reference_total: total,
            total_target_percent: sum_target_percent(&visible),
            options: filter_options(rows),
        }
    }

    pub async fn group_table(&self) -> GroupTable {
        let data = self.snapshot().await;
        GroupTable {
            rows: data
                .per_group
                .iter()
                .map(|rollup| GroupRow {
                    value_deviation: rollup.value_deviation(),
                    rollup: rollup.clone(),
                })
                .collect(),
            total_target_percent: sum_target_percent(&data.per_group),
            pie: group_pie(&data.per_group),
        }
    }

    pub async fn barca_section(&self) -> BarcaSection {
        let data = self.snapshot().await;
        BarcaSection {
            targets: data
                .per_barca
                .iter()
                .map(|target| BarcaTargetRow {
                    value_deviation: target.value_deviation(),
                    target: target.clone(),
                })
                .collect(),
            actual: data.per_barca_actual.clone(),
            total_target_percent: sum_target_percent(&data.per_barca),
            target_pie: barca_target_pie(&data.per_barca),
            actual_pie: barca_actual_pie(&data.per_barca_actual),
        }
    }

    /// Fetch one history level and bucket it for the chart.
    pub async fn history(&self, query: &HistoryQuery) -> Result<HistoryView, DashboardError> {
        let payload = self.provider.fetch_history(query.level).await?;
        let mut series = bucketize(
            &payload.rows,
            query.granularity,
            query.level,
            self.bucket_options,
        );
        let selected_keys = select_keys(&series.keys, query.keys.as_deref());
        series.retain_keys(&selected_keys);
        info!(
            level = %query.level,
            granularity = %query.granularity,
            rows = payload.rows.len(),
            periods = series.periods.len(),
            "Bucketed history"
        );
        Ok(HistoryView {
            series,
            selected_keys,
        })
    }
}
