use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::domain::granularity::{Granularity, HistoryLevel};
use crate::error::{ConfigError, DashboardError};
use crate::usecases::compute_allocations::{AssetFilter, AssetSort, SortDirection, SortKey};
use crate::usecases::dashboard_service::{
    AssetQuery, AssetTable, BarcaSection, DashboardService, GroupTable, HistoryQuery, HistoryView,
    Summary,
};
use crate::usecases::table_view::DEFAULT_PAGE_SIZE;

#[derive(Clone)]
pub struct AppState {
    service: Arc<DashboardService>,
}

impl AppState {
    pub fn new(service: Arc<DashboardService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetParams {
    symbol: Option<String>,
    group: Option<String>,
    barca: Option<String>,
    sort: Option<String>,
    direction: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
}

impl AssetParams {
    fn into_query(self) -> Result<AssetQuery, ConfigError> {
        let default_sort = AssetSort::default();
        let key = match self.sort.as_deref() {
            Some(raw) => SortKey::from_str(raw)?,
            None => default_sort.key,
        };
        // A newly chosen column starts ascending, matching a header click.
        let direction = match (self.direction.as_deref(), self.sort.is_some()) {
            (Some(raw), _) => SortDirection::from_str(raw)?,
            (None, true) => SortDirection::Asc,
            (None, false) => default_sort.direction,
        };

        Ok(AssetQuery {
            filter: AssetFilter {
                symbol: self.symbol,
                group: self.group,
                barca: self.barca,
            },
            sort: AssetSort { key, direction },
            page: parse_count("page", self.page.as_deref(), 1)?,
            page_size: parse_count("page_size", self.page_size.as_deref(), DEFAULT_PAGE_SIZE)?,
        })
    }
}

// Parsed here rather than by `Query` so a bad number gets the JSON error body.
fn parse_count(
    name: &'static str,
    raw: Option<&str>,
    default: usize,
) -> Result<usize, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidQueryNumber {
            name,
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    level: Option<String>,
    granularity: Option<String>,
    keys: Option<String>,
}

impl HistoryParams {
    fn into_query(self) -> Result<HistoryQuery, ConfigError> {
        let level = match self.level.as_deref() {
            Some(raw) => HistoryLevel::from_str(raw)?,
            None => HistoryLevel::default(),
        };
        let granularity = match self.granularity.as_deref() {
            Some(raw) => Granularity::from_str(raw)?,
            None => Granularity::default(),
        };
        let keys = self.keys.map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        });
        Ok(HistoryQuery {
            level,
            granularity,
            keys,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/dashboard/summary", get(get_summary))
        .route("/api/dashboard/refresh", post(refresh))
        .route("/api/dashboard/error", delete(dismiss_error))
        .route("/api/dashboard/assets", get(get_assets))
        .route("/api/dashboard/groups", get(get_groups))
        .route("/api/dashboard/barca", get(get_barca))
        .route("/api/dashboard/history", get(get_history))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn get_summary(State(state): State<AppState>) -> Json<Summary> {
    Json(state.service.summary().await)
}

#[tracing::instrument(skip(state))]
async fn refresh(State(state): State<AppState>) -> Result<Json<Summary>, DashboardError> {
    let summary = state.service.refresh().await?;
    Ok(Json(summary))
}

async fn dismiss_error(State(state): State<AppState>) -> StatusCode {
    state.service.clear_error().await;
    StatusCode::NO_CONTENT
}

#[tracing::instrument(skip(state))]
async fn get_assets(
    State(state): State<AppState>,
    Query(params): Query<AssetParams>,
) -> Result<Json<AssetTable>, DashboardError> {
    let query = params.into_query()?;
    Ok(Json(state.service.asset_table(&query).await))
}

async fn get_groups(State(state): State<AppState>) -> Json<GroupTable> {
    Json(state.service.group_table().await)
}

async fn get_barca(State(state): State<AppState>) -> Json<BarcaSection> {
    Json(state.service.barca_section().await)
}

#[tracing::instrument(skip(state))]
async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryView>, DashboardError> {
    let query = params.into_query()?;
    let view = state.service.history(&query).await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_params_default_to_value_descending() {
        let query = AssetParams::default().into_query().unwrap();
        assert_eq!(query.sort, AssetSort::default());
        assert_eq!(query.page, 1);
        assert!(!query.filter.is_active());
    }

    #[test]
    fn new_sort_column_starts_ascending() {
        let params = AssetParams {
            sort: Some("dca".into()),
            ..Default::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.sort.key, SortKey::Dca);
        assert_eq!(query.sort.direction, SortDirection::Asc);
    }

    #[test]
    fn asset_params_parse_page_numbers() {
        let params = AssetParams {
            page: Some("3".into()),
            page_size: Some(" 25 ".into()),
            ..Default::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.page, 3);
        assert_eq!(query.page_size, 25);

        let params = AssetParams {
            page_size: Some("ten".into()),
            ..Default::default()
        };
        assert_eq!(
            params.into_query().unwrap_err(),
            ConfigError::InvalidQueryNumber {
                name: "page_size",
                value: "ten".into()
            }
        );
    }

    #[test]
    fn history_params_split_keys() {
        let params = HistoryParams {
            level: Some("barca".into()),
            granularity: Some("4h".into()),
            keys: Some("Base, Growth,,".into()),
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.level, HistoryLevel::Barca);
        assert_eq!(query.granularity, Granularity::FourHours);
        assert_eq!(query.keys, Some(vec!["Base".to_string(), "Growth".to_string()]));
    }

    #[test]
    fn history_params_reject_unknown_granularity() {
        let params = HistoryParams {
            granularity: Some("fortnightly".into()),
            ..Default::default()
        };
        assert_eq!(
            params.into_query().unwrap_err(),
            ConfigError::UnknownGranularity("fortnightly".into())
        );
    }
}
