// ── Notification stream ──
//
// `Stream` view over the notification broadcast for push-channel
// sinks. A subscriber that falls behind skips what it missed.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

use crate::notify::Notification;

pub struct NotificationStream {
    inner: BroadcastStream<Arc<Notification>>,
}

impl NotificationStream {
    pub fn new(receiver: broadcast::Receiver<Arc<Notification>>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for NotificationStream {
    type Item = Arc<Notification>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(notification)) => return Poll::Ready(Some(notification)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    debug!(skipped, "notification subscriber lagged");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn lagging_subscriber_skips_missed_messages() {
        let (tx, rx) = broadcast::channel(2);
        let mut stream = NotificationStream::new(rx);

        for _ in 0..5 {
            tx.send(Arc::new(Notification::ping())).unwrap();
        }
        drop(tx);

        let received: Vec<_> = (&mut stream).collect().await;
        assert_eq!(received.len(), 2);
        assert!(stream.next().await.is_none());
    }
}
