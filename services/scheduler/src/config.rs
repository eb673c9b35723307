//! Configuration for the scheduler.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on for HTTP connections.
    pub listen_addr: SocketAddr,

    /// Hard cap on placements per offer.
    pub max_tasks_per_offer: usize,

    /// Launch tokens granted at startup.
    pub initial_launch_tokens: u64,

    /// Manager mailbox capacity.
    pub mailbox_size: usize,

    /// Maximum concurrent management API requests.
    pub concurrent_requests: usize,

    /// How long a request waits for an admission permit.
    pub request_wait: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("KEEL_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let max_tasks_per_offer = parse_or("KEEL_MAX_TASKS_PER_OFFER", 100)?;
        let initial_launch_tokens = parse_or("KEEL_INITIAL_LAUNCH_TOKENS", 0)?;
        let mailbox_size = parse_or("KEEL_MAILBOX_SIZE", 1024)?;
        let concurrent_requests = parse_or("KEEL_CONCURRENT_REQUESTS", 64)?;
        let request_wait = Duration::from_millis(parse_or("KEEL_REQUEST_WAIT_MS", 500)?);

        Ok(Self {
            listen_addr,
            max_tasks_per_offer,
            initial_launch_tokens,
            mailbox_size,
            concurrent_requests,
            request_wait,
        })
    }
}

fn parse_or<T>(var: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(var) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}
