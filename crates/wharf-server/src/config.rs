//! Environment-driven configuration (spec §A.3).

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Base URL this process is reachable at, used to build links in
    /// responses and logs (e.g. webhook callback URLs).
    pub local_api_base_url: String,
    pub worker_max_deliver: u32,
    pub event_history_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("WHARF_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            local_api_base_url: env::var("LOCAL_API_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            worker_max_deliver: env::var("WHARF_WORKER_MAX_DELIVER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            event_history_limit: env::var("WHARF_EVENT_HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(wharf_core::event_hub::DEFAULT_HISTORY_LIMIT),
        }
    }
}
