use serde::Deserialize;
use tracing::{info, warn};

use crate::utils::req_manager::ReqManager;

/// Key and region for the primary synthesis service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpeechCredentials {
    pub key: String,
    pub region: String,
}

impl SpeechCredentials {
    fn is_usable(&self) -> bool {
        !self.key.trim().is_empty() && !self.region.trim().is_empty()
    }
}

/// Fetches credentials once from a configuration endpoint.
///
/// Returns `None` on any failure. Callers do not retry: without credentials the
/// process runs on the fallback backend only.
pub async fn fetch_credentials(req_manager: &ReqManager, url: &str) -> Option<SpeechCredentials> {
    let guard = match req_manager.acquire().await {
        Ok(guard) => guard,
        Err(e) => {
            warn!("Could not acquire HTTP client for credentials: {}", e);
            return None;
        }
    };

    let response = match guard.send(guard.client().get(url)).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Speech credentials request failed: {}", e);
            return None;
        }
    };

    if !response.status().is_success() {
        warn!("Speech credentials endpoint returned {}", response.status());
        return None;
    }

    match response.json::<SpeechCredentials>().await {
        Ok(credentials) if credentials.is_usable() => {
            info!("Fetched speech credentials for region {}", credentials.region);
            Some(credentials)
        }
        Ok(_) => {
            warn!("Speech credentials endpoint returned an empty key or region");
            None
        }
        Err(e) => {
            warn!("Malformed speech credentials response: {}", e);
            None
        }
    }
}

/// Picks static credentials when configured, otherwise fetches them.
pub async fn resolve_credentials(
    req_manager: &ReqManager,
    static_key: Option<&str>,
    region: &str,
    credentials_url: Option<&str>,
) -> Option<SpeechCredentials> {
    if let Some(key) = static_key {
        let credentials = SpeechCredentials {
            key: key.to_string(),
            region: region.to_string(),
        };
        if credentials.is_usable() {
            return Some(credentials);
        }
        warn!("Configured speech key or region is empty; ignoring it");
    }

    match credentials_url {
        Some(url) => fetch_credentials(req_manager, url).await,
        None => None,
    }
}
