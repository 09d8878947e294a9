//! Allocation dashboard view service.
//!
//! Pulls pre-computed wallet allocations and history from the allocations
//! backend and turns them into table and chart data: per-asset deviation
//! against target (with filtering, sorting and paging), group and BARCA
//! rollups, and calendar-bucketed history series.

pub mod api_client;
pub mod config;
pub mod domain;
pub mod error;
pub mod routes;
pub mod usecases;
