//! Single-shot statistics poller for the transfer process's RC endpoint.
//!
//! Retries are the caller's business: [`StatsPoller::poll`] issues one
//! request and reports any failure as [`RotorError::StatsUnreachable`].

use async_trait::async_trait;
use rotor_config::TransferConfig;
use rotor_core::{RotorError, StatsSnapshot};
use std::time::Duration;
use tracing::debug;

const STATS_METHOD: &str = "core/stats";

/// Anything that can produce one statistics snapshot per call.
#[async_trait]
pub trait StatsSource: Send {
    async fn poll(&mut self) -> Result<StatsSnapshot, RotorError>;
}

pub struct StatsPoller {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, Option<String>)>,
}

impl StatsPoller {
    pub fn new(transfer: &TransferConfig, timeout: Duration) -> Result<Self, RotorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RotorError::InvalidConfig {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: format!("{}/{}", transfer.rc_url(), STATS_METHOD),
            auth: transfer
                .rc_user
                .clone()
                .map(|user| (user, transfer.rc_pass.clone())),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<String, reqwest::Error> {
        let mut request = self.client.post(&self.url).json(&serde_json::json!({}));
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, pass.as_ref());
        }
        request.send().await?.error_for_status()?.text().await
    }
}

#[async_trait]
impl StatsSource for StatsPoller {
    async fn poll(&mut self) -> Result<StatsSnapshot, RotorError> {
        let body = self
            .fetch()
            .await
            .map_err(|e| RotorError::StatsUnreachable {
                reason: e.to_string(),
            })?;
        let snapshot = parse_stats(&body)?;
        debug!(
            bytes = snapshot.bytes,
            speed = snapshot.speed,
            transferring = snapshot.transferring.len(),
            "Polled transfer statistics"
        );
        Ok(snapshot)
    }
}

/// Parse a `core/stats` payload, dropping the stray NUL bytes the RC
/// channel sometimes emits.
pub fn parse_stats(body: &str) -> Result<StatsSnapshot, RotorError> {
    let cleaned: String = body.chars().filter(|c| *c != '\0').collect();
    serde_json::from_str(&cleaned).map_err(|e| RotorError::StatsUnreachable {
        reason: format!("malformed stats payload: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYLOAD: &str = r#"{"bytes":2048,"speed":128.5,"transferring":[{"name":"a","bytes":10,"speed":2}]}"#;

    fn transfer_for(server: &MockServer) -> TransferConfig {
        let address = server.address();
        TransferConfig {
            rc_addr: address.ip().to_string(),
            rc_port: address.port(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_strips_nul_bytes() {
        let body = format!("\0\0{PAYLOAD}\0");
        let snapshot = parse_stats(&body).unwrap();
        assert_eq!(snapshot.bytes, 2048);
        assert_eq!(snapshot.transferring.len(), 1);
    }

    #[test]
    fn test_parse_malformed_is_unreachable() {
        let err = parse_stats("<html>502</html>").unwrap_err();
        assert!(matches!(err, RotorError::StatsUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_poll_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/core/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("\0{PAYLOAD}")))
            .expect(1)
            .mount(&server)
            .await;

        let mut poller = StatsPoller::new(&transfer_for(&server), Duration::from_secs(2)).unwrap();
        let snapshot = poller.poll().await.unwrap();
        assert_eq!(snapshot.bytes, 2048);
        assert!(snapshot.transferring[0].is_moving());
    }

    #[tokio::test]
    async fn test_poll_sends_basic_auth_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/core/stats"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAYLOAD))
            .expect(1)
            .mount(&server)
            .await;

        let mut transfer = transfer_for(&server);
        transfer.rc_user = Some("rotor".to_string());
        transfer.rc_pass = Some("secret".to_string());
        let mut poller = StatsPoller::new(&transfer, Duration::from_secs(2)).unwrap();
        assert!(poller.poll().await.is_ok());
    }

    #[tokio::test]
    async fn test_poll_http_error_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/core/stats"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut poller = StatsPoller::new(&transfer_for(&server), Duration::from_secs(2)).unwrap();
        let err = poller.poll().await.unwrap_err();
        assert!(matches!(err, RotorError::StatsUnreachable { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_poll_connection_refused_is_unreachable() {
        let server = MockServer::start().await;
        let transfer = transfer_for(&server);
        drop(server);

        let mut poller = StatsPoller::new(&transfer, Duration::from_secs(2)).unwrap();
        let err = poller.poll().await.unwrap_err();
        assert!(matches!(err, RotorError::StatsUnreachable { .. }));
    }

    #[test]
    fn test_url_targets_core_stats() {
        let poller = StatsPoller::new(&TransferConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(poller.url(), "http://127.0.0.1:5572/core/stats");
    }
}
