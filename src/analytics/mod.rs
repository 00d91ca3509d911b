pub mod client;
pub mod models;

pub use client::{merge_reruns, AnalyticsClient, HttpAnalyticsClient};
pub use models::{HistoricalJob, HistoricalStep};
