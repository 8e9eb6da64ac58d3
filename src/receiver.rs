use crate::bus::Event;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// Extension trait for event stream receivers.
///
/// Wraps the raw `broadcast` receive loop with the bus's best-effort
/// semantics: lag is logged and skipped over instead of surfacing as an
/// error to every consumer.
pub trait EventReceiverExt<T> {
    /// Receive the next event, returning `None` once the stream is closed.
    ///
    /// A receiver that fell behind the stream buffer resumes from the fresh
    /// tail; the number of skipped events is reported through `tracing`.
    fn next_event(&mut self) -> impl Future<Output = Option<Arc<T>>> + Send;
}

impl<T: Event> EventReceiverExt<T> for broadcast::Receiver<Arc<T>> {
    async fn next_event(&mut self) -> Option<Arc<T>> {
        loop {
            match self.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        event = std::any::type_name::<T>(),
                        skipped,
                        "Event stream receiver lagged, resuming from the fresh tail"
                    );
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
