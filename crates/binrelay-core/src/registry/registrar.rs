//! Worker-side client for the gateway's registration listener.
//!
//! Workers announce themselves with `POST /register` once their RPC server is
//! up and withdraw with `POST /unregister` before stopping. Both calls are
//! best-effort: a missing gateway is logged and reported as `false`.

use super::InstanceRegistration;
use crate::config::NetworkConfig;
use crate::{RelayError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Body of `POST /unregister`; keys are tried in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterRequest {
    #[serde(default)]
    pub binary_id: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub md5: String,
}

impl UnregisterRequest {
    /// Non-empty candidate keys in lookup order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        [self.binary_id.as_str(), self.sha256.as_str(), self.md5.as_str()]
            .into_iter()
            .filter(|key| !key.is_empty())
    }
}

/// Reply shape shared by `/register` and `/unregister`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegistrationReply {
    pub fn ok(binary_id: String) -> Self {
        Self {
            success: true,
            binary_id: Some(binary_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            binary_id: None,
            error: Some(error.into()),
        }
    }
}

/// Push-registration client.
#[derive(Debug, Clone)]
pub struct Registrar {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl Registrar {
    /// Client for the listener at `host:port`.
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::builder()
            .timeout(NetworkConfig::REGISTRATION_TIMEOUT)
            .build()
            .map_err(|e| RelayError::Network {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
            timeout: NetworkConfig::REGISTRATION_TIMEOUT,
        })
    }

    /// Create with custom timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Announce a worker. Returns whether the gateway accepted it.
    pub async fn register(&self, registration: &InstanceRegistration) -> bool {
        match self.post("/register", registration).await {
            Ok(reply) => {
                debug!("Registration reply: {:?}", reply);
                reply.success
            }
            Err(e) => {
                warn!("Failed to register with gateway: {}", e);
                false
            }
        }
    }

    /// Withdraw a worker. Returns whether the gateway removed it.
    pub async fn unregister(&self, request: &UnregisterRequest) -> bool {
        match self.post("/unregister", request).await {
            Ok(reply) => reply.success,
            Err(e) => {
                debug!("Failed to unregister from gateway: {}", e);
                false
            }
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<RegistrationReply> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;

        Ok(response.json::<RegistrationReply>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregister_keys_skip_empty() {
        let request = UnregisterRequest {
            binary_id: String::new(),
            sha256: "aa11".into(),
            md5: "m1".into(),
        };
        assert_eq!(request.keys().collect::<Vec<_>>(), vec!["aa11", "m1"]);
    }

    #[test]
    fn test_reply_serialization() {
        let ok = serde_json::to_value(RegistrationReply::ok("aa11".into())).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "binary_id": "aa11"}));

        let failed = serde_json::to_value(RegistrationReply::failed("Instance not found")).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"success": false, "error": "Instance not found"})
        );
    }

    #[tokio::test]
    async fn test_register_without_gateway_returns_false() {
        // Port 1 is never a listening gateway on a test host.
        let registrar = Registrar::new("127.0.0.1", 1)
            .unwrap()
            .with_timeout(Duration::from_millis(500));
        let registration = InstanceRegistration {
            host: "127.0.0.1".into(),
            port: 13338,
            path: "/a.exe".into(),
            module: "a.exe".into(),
            md5: String::new(),
            sha256: "aa11".into(),
        };

        assert!(!registrar.register(&registration).await);
        assert!(!registrar.unregister(&UnregisterRequest::default()).await);
    }
}
