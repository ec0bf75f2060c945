use std::time::Duration;

use reqwest::blocking::Client;

use crate::types::{HttpTransport, TransportError};

/// Blocking reqwest transport. Must not be called from inside an async task;
/// the runner drives it from blocking threads.
pub struct ReqwestTransport {
    client: Result<Client, String>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string());
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<u16, TransportError> {
        let client = self.client.as_ref().map_err(|e| TransportError::Build(e.clone()))?;
        let parsed = reqwest::Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut req = client.get(parsed);
        for (k, v) in headers {
            req = req.header(k.as_str(), v.as_str());
        }

        tracing::debug!("calling server url {url}");
        let resp = req.send().map_err(|e| {
            if e.is_builder() {
                TransportError::Build(e.to_string())
            } else {
                TransportError::Io(e.to_string())
            }
        })?;
        let status = resp.status().as_u16();
        tracing::debug!("server response code {status}");
        Ok(status)
    }
}
