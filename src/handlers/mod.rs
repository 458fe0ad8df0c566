//! HTTP handlers
//!
//! - data: chunked history queries
//! - events: live SSE feed
//! - status: status, heap and health probes
//! - control: the operator buttons
//! - metrics_handler: Prometheus scrape endpoint

pub mod control;
pub mod data;
pub mod events;
pub mod metrics_handler;
pub mod status;

use crate::config::{LiveConfig, QueryConfig};
use crate::logger::DataLogger;
use crate::signals::ShutdownSignal;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub logger: Arc<DataLogger>,
    pub query: QueryConfig,
    pub live: LiveConfig,
    /// Ends live event streams so graceful shutdown can finish
    pub shutdown: broadcast::Sender<ShutdownSignal>,
}
