// 14.0: outbound notifications. strictly fire-and-forget: a failed delivery is
// logged and dropped, it never rolls back the state change that produced it.

use async_trait::async_trait;
use tracing::{info, warn};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: &str, message: &str);
}

/// Default sink: structured log lines.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, user_id: &str, message: &str) {
        info!(user_id, message, "notification");
    }
}

/// Wraps a fallible delivery closure; used by tests and by integrations that
/// push to an external service.
pub struct FnSink<F>(pub F);

#[async_trait]
impl<F> NotificationSink for FnSink<F>
where
    F: Fn(&str, &str) -> Result<(), String> + Send + Sync,
{
    async fn notify(&self, user_id: &str, message: &str) {
        if let Err(error) = (self.0)(user_id, message) {
            warn!(user_id, error, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn failing_sink_does_not_propagate() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let sink = FnSink(move |_: &str, _: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("downstream unavailable".to_string())
        });
        // must not panic or return an error
        sink.notify("u1", "position liquidated").await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
