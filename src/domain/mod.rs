pub mod granularity;
pub mod models;
pub mod numeric;
