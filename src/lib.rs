pub mod api;
pub mod config;
pub mod error;
pub mod helius;
pub mod history;
pub mod models;
pub mod normalize;
pub mod price;
pub mod retry;
pub mod sources;
pub mod upstream_stats;
