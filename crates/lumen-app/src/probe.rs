//! Portal reachability probe.

use crate::error::{AppError, AppResult};
use lumen_sync::Reachability;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Periodic HEAD request against the portal.
///
/// Any HTTP response, error statuses included, means the network path is
/// up. Only a transport failure counts as unreachable.
#[derive(Debug)]
pub struct ReachabilityProbe {
    client: Client,
    url: String,
    last: Option<Reachability>,
}

impl ReachabilityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create probe client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            last: None,
        })
    }

    pub async fn check(&self) -> Reachability {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "Probe answered");
                Reachability::Reachable
            }
            Err(e) => {
                debug!(error = %e, "Probe failed");
                Reachability::Unreachable
            }
        }
    }

    /// Record an observation; returns it only when it differs from the last.
    pub fn transition(&mut self, status: Reachability) -> Option<Reachability> {
        if self.last == Some(status) {
            return None;
        }
        self.last = Some(status);
        Some(status)
    }

    /// Probe once and report a transition, if any.
    pub async fn poll(&mut self) -> Option<Reachability> {
        let status = self.check().await;
        self.transition(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn probe(url: &str) -> ReachabilityProbe {
        ReachabilityProbe::new(url, Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn test_only_transitions_reported() {
        let mut p = probe("http://127.0.0.1:1");

        assert_eq!(
            p.transition(Reachability::Reachable),
            Some(Reachability::Reachable)
        );
        assert_eq!(p.transition(Reachability::Reachable), None);
        assert_eq!(
            p.transition(Reachability::Unreachable),
            Some(Reachability::Unreachable)
        );
        assert_eq!(p.transition(Reachability::Unreachable), None);
        assert_eq!(
            p.transition(Reachability::Reachable),
            Some(Reachability::Reachable)
        );
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let mut p = probe("http://127.0.0.1:1");
        assert_eq!(p.poll().await, Some(Reachability::Unreachable));
        assert_eq!(p.poll().await, None);
    }

    #[tokio::test]
    async fn test_error_status_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            stream
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let p = probe(&format!("http://{addr}"));
        assert_eq!(p.check().await, Reachability::Reachable);
    }
}
