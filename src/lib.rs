//! Movie catalog API server library
//!
//! This module exports the core types and functions for testing and reuse.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod rate_limit;
pub mod routes;
pub mod validator;

pub use config::Config;
pub use db::Models;
pub use error::{AppError, Result};
pub use rate_limit::RateLimiter;

use std::sync::Arc;

use mailer::Mailer;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub models: Models,
    pub config: Config,
    pub limiter: RateLimiter,
    pub mailer: Arc<dyn Mailer>,
    /// Present when request metrics are being recorded
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new AppState; the rate limiter is built from `config`
    pub fn new(models: Models, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = RateLimiter::new(
            config.limiter_rps,
            config.limiter_burst,
            config.limiter_enabled,
        );
        Self {
            models,
            config,
            limiter,
            mailer,
            metrics: None,
        }
    }

    /// Serve request metrics from `handle`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
