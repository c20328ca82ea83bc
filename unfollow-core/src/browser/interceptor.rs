use std::collections::HashSet;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
    GetResponseBodyParams, RequestId,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::error::{BrowserError, BrowserResult};
use super::metrics::SharedMetrics;

/// Observes list responses out of band and forwards their JSON bodies.
///
/// Payloads are pushed with `try_send`: when the sink is full the payload is
/// dropped and the rendered entries still cover those users.
#[async_trait(?Send)]
pub trait ResponseInterceptor {
    async fn subscribe(
        &self,
        pattern: &str,
        sink: mpsc::Sender<Value>,
    ) -> BrowserResult<InterceptSubscription>;
}

/// Keeps an interception alive. Dropping it stops forwarding.
#[derive(Debug, Default)]
pub struct InterceptSubscription {
    task: Option<JoinHandle<()>>,
}

impl InterceptSubscription {
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription with no background task, for interceptors that hold
    /// the sink themselves.
    pub fn detached() -> Self {
        Self { task: None }
    }
}

impl Drop for InterceptSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub fn matches_pattern(url: &str, pattern: &str) -> bool {
    !pattern.is_empty() && url.to_ascii_lowercase().contains(&pattern.to_ascii_lowercase())
}

/// Reads matching response bodies through the DevTools network domain.
#[derive(Debug, Clone)]
pub struct CdpInterceptor {
    page: Page,
    metrics: SharedMetrics,
}

impl CdpInterceptor {
    pub fn new(page: Page, metrics: SharedMetrics) -> Self {
        Self { page, metrics }
    }
}

#[async_trait(?Send)]
impl ResponseInterceptor for CdpInterceptor {
    async fn subscribe(
        &self,
        pattern: &str,
        sink: mpsc::Sender<Value>,
    ) -> BrowserResult<InterceptSubscription> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|err| BrowserError::Intercept(format!("network domain: {err}")))?;
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|err| BrowserError::Intercept(err.to_string()))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|err| BrowserError::Intercept(err.to_string()))?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|err| BrowserError::Intercept(err.to_string()))?;

        let page = self.page.clone();
        let metrics = self.metrics.clone();
        let pattern = pattern.to_string();
        let task = tokio::spawn(async move {
            let mut pending: HashSet<String> = HashSet::new();
            loop {
                tokio::select! {
                    Some(event) = responses.next() => {
                        if matches_pattern(&event.response.url, &pattern) {
                            trace!(url = %event.response.url, "matched list response");
                            pending.insert(event.request_id.inner().clone());
                        }
                    }
                    Some(event) = finished.next() => {
                        if pending.remove(event.request_id.inner()) {
                            match read_body(&page, event.request_id.clone()).await {
                                Ok(payload) => forward(&sink, &metrics, payload),
                                Err(err) => debug!(error = %err, "discarding unreadable list response"),
                            }
                        }
                    }
                    Some(event) = failed.next() => {
                        pending.remove(event.request_id.inner());
                    }
                    else => break,
                }
                if sink.is_closed() {
                    break;
                }
            }
        });
        Ok(InterceptSubscription::from_task(task))
    }
}

async fn read_body(page: &Page, request_id: RequestId) -> BrowserResult<Value> {
    let body = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .map_err(|err| BrowserError::Intercept(format!("response body: {err}")))?;
    let bytes = if body.result.base64_encoded {
        BASE64
            .decode(body.result.body.as_bytes())
            .map_err(|err| BrowserError::Intercept(format!("base64 body: {err}")))?
    } else {
        body.result.body.clone().into_bytes()
    };
    serde_json::from_slice(&bytes)
        .map_err(|err| BrowserError::Intercept(format!("json body: {err}")))
}

fn forward(sink: &mpsc::Sender<Value>, metrics: &SharedMetrics, payload: Value) {
    match sink.try_send(payload) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            metrics.with(|m| m.record_queue_overflow());
            warn!("interceptor queue full; dropping list response");
        }
        Err(TrySendError::Closed(_)) => {
            debug!("interceptor sink closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_match_ignores_case() {
        let url = "https://x.com/i/api/graphql/abc123/Following?variables=%7B%7D";
        assert!(matches_pattern(url, "/following"));
        assert!(matches_pattern(url, "/Following"));
        assert!(!matches_pattern(url, "/followers"));
        assert!(!matches_pattern(url, ""));
    }

    #[tokio::test]
    async fn dropping_subscription_aborts_task() {
        let (tx, mut rx) = mpsc::channel::<Value>(1);
        let task = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            let _ = tx.send(Value::Null).await;
        });
        drop(InterceptSubscription::from_task(task));
        assert!(rx.recv().await.is_none());
    }
}
