use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::models::{AssetRow, BarcaActual, BarcaTarget, GroupRollup};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_rows: usize,
}

/// 1-based pagination. There is always at least one page, and a page number
/// outside `1..=total_pages` is clamped into range.
pub fn paginate<T>(rows: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };
    let total_rows = rows.len();
    let total_pages = total_rows.div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages);

    let rows = rows
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Page {
        rows,
        page,
        page_size,
        total_pages,
        total_rows,
    }
}

// Values offered by the symbol/group/BARCA dropdowns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub symbols: Vec<String>,
    pub groups: Vec<String>,
    pub barcas: Vec<String>,
}

pub fn filter_options(rows: &[AssetRow]) -> FilterOptions {
    fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
        values
            .filter(|v| !v.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    FilterOptions {
        symbols: distinct(rows.iter().map(|r| r.symbol.as_str())),
        groups: distinct(rows.iter().map(|r| r.group.as_str())),
        barcas: distinct(rows.iter().map(|r| r.barca.as_str())),
    }
}

/// Secondary display total in the local currency. `None` when the rate is unusable.
pub fn local_currency_total(total: f64, rate: f64) -> Option<f64> {
    rate.is_finite().then(|| total * rate)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub name: String,
    pub value: f64,
}

pub fn group_pie(groups: &[GroupRollup]) -> Vec<PieSlice> {
    groups
        .iter()
        .filter_map(|g| {
            g.value.filter(|v| *v > 0.0).map(|value| PieSlice {
                name: g.group.clone(),
                value,
            })
        })
        .collect()
}

pub fn barca_target_pie(targets: &[BarcaTarget]) -> Vec<PieSlice> {
    targets
        .iter()
        .filter_map(|t| {
            t.target_percent.filter(|v| *v > 0.0).map(|value| PieSlice {
                name: t.barca.clone(),
                value,
            })
        })
        .collect()
}

pub fn barca_actual_pie(actual: &[BarcaActual]) -> Vec<PieSlice> {
    actual
        .iter()
        .filter_map(|a| {
            a.value.filter(|v| *v > 0.0).map(|value| PieSlice {
                name: a.barca.clone(),
                value,
            })
        })
        .collect()
}
