pub mod compute_allocations;
pub mod dashboard_service;
pub mod history_buckets;
pub mod table_view;
