use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Errors raised while setting up or using the request manager.
#[derive(Debug, Error)]
pub enum ReqManagerError {
    #[error("Invalid request manager configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Request manager closed")]
    Closed,
}

/// Counters for outbound requests.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    /// Requests currently holding a permit.
    pub active_requests: AtomicUsize,
    pub peak_concurrent: AtomicUsize,
}

impl RequestMetrics {
    pub fn summary(&self) -> String {
        format!(
            "Requests - Total: {}, Success: {}, Failed: {}, Active: {}, Peak: {}",
            self.total_requests.load(Ordering::Relaxed),
            self.successful_requests.load(Ordering::Relaxed),
            self.failed_requests.load(Ordering::Relaxed),
            self.active_requests.load(Ordering::Relaxed),
            self.peak_concurrent.load(Ordering::Relaxed),
        )
    }
}

/// Shared HTTP client with a cap on concurrent requests.
///
/// Synthesis and credential requests both go through one manager so the
/// process never opens more than `max_concurrent_requests` connections to the
/// speech service at a time.
pub struct ReqManager {
    max_concurrent_requests: usize,
    client: Arc<Client>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<RequestMetrics>,
}

/// Holds a permit for one request; releases it when dropped.
pub struct ClientGuard<'a> {
    manager: &'a ReqManager,
    client: Arc<Client>,
    _permit: SemaphorePermit<'a>,
}

impl<'a> ClientGuard<'a> {
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends a prepared request, recording the outcome in the manager's metrics.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, reqwest::Error> {
        self.manager
            .metrics
            .total_requests
            .fetch_add(1, Ordering::Relaxed);
        let result = request.send().await;
        let counter = match &result {
            Ok(response) if response.status().is_success() => {
                &self.manager.metrics.successful_requests
            }
            _ => &self.manager.metrics.failed_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }
}

impl<'a> Drop for ClientGuard<'a> {
    fn drop(&mut self) {
        self.manager
            .metrics
            .active_requests
            .fetch_sub(1, Ordering::Relaxed);
    }
}

/// Configuration for the HTTP request manager
#[derive(Debug, Clone)]
pub struct ReqManagerConfig {
    pub max_concurrent_requests: usize,
    pub pool_max_idle_per_host: usize,
    pub tcp_keepalive: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ReqManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 4,
            pool_max_idle_per_host: 8,
            tcp_keepalive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ReqManagerConfig {
    pub fn with_request_timeout(timeout: Duration) -> Self {
        Self {
            request_timeout: timeout,
            ..Default::default()
        }
    }
}

impl ReqManager {
    pub fn new(max_concurrent_requests: usize) -> Result<Self, ReqManagerError> {
        Self::with_config(ReqManagerConfig {
            max_concurrent_requests,
            ..Default::default()
        })
    }

    pub fn with_config(config: ReqManagerConfig) -> Result<Self, ReqManagerError> {
        if config.max_concurrent_requests == 0 {
            return Err(ReqManagerError::InvalidConfig(
                "max_concurrent_requests must be greater than 0".to_string(),
            ));
        }
        if config.max_concurrent_requests > 1000 {
            return Err(ReqManagerError::InvalidConfig(
                "max_concurrent_requests must not exceed 1000".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_keepalive(config.tcp_keepalive)
            .tcp_nodelay(true)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("wordvoice/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            max_concurrent_requests: config.max_concurrent_requests,
            client: Arc::new(client),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            metrics: Arc::new(RequestMetrics::default()),
        })
    }

    /// Waits for a free permit and returns a guard around the shared client.
    pub async fn acquire(&self) -> Result<ClientGuard<'_>, ReqManagerError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ReqManagerError::Closed)?;

        let active = self.metrics.active_requests.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics
            .peak_concurrent
            .fetch_max(active, Ordering::Relaxed);

        Ok(ClientGuard {
            manager: self,
            client: Arc::clone(&self.client),
            _permit: permit,
        })
    }

    pub fn available_count(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent_requests
    }

    pub fn active_requests(&self) -> usize {
        self.metrics.active_requests.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }
}
