//! # Notification Stream
//!
//! Per-topic view of a session's notifications.

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

use crate::domain::{Notification, Topic};

/// Notifications for one topic. Ends when the session closes.
///
/// A slow consumer skips what it missed; [`lagged`](Self::lagged) counts how
/// many notifications were dropped so the consumer can resynchronise.
pub struct NotificationStream {
    inner: BroadcastStream<Notification>,
    topic: Topic,
    lagged: u64,
}

impl NotificationStream {
    pub(crate) fn new(receiver: broadcast::Receiver<Notification>, topic: Topic) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            topic,
            lagged: 0,
        }
    }

    /// Topic this stream carries.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Notifications dropped because the consumer fell behind.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}

impl Stream for NotificationStream {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(notification))) => {
                    if self.topic.matches(&notification) {
                        return Poll::Ready(Some(notification));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Notification stream lagged");
                    self.lagged += count;
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn status(script_hash: &str, status: &str) -> Notification {
        Notification::ScriptHashStatus {
            script_hash: script_hash.into(),
            status: Some(status.into()),
        }
    }

    #[tokio::test]
    async fn test_filters_by_topic() {
        let (tx, rx) = broadcast::channel(8);
        let mut stream = NotificationStream::new(rx, Topic::ScriptHash("aa".into()));

        tx.send(status("bb", "1")).unwrap();
        tx.send(status("aa", "2")).unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(status("aa", "2")));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_counts_lag() {
        let (tx, rx) = broadcast::channel(2);
        let mut stream = NotificationStream::new(rx, Topic::ScriptHash("aa".into()));

        for i in 0..5 {
            tx.send(status("aa", &i.to_string())).unwrap();
        }
        drop(tx);

        assert_eq!(stream.next().await, Some(status("aa", "3")));
        assert_eq!(stream.lagged(), 3);
        assert_eq!(stream.next().await, Some(status("aa", "4")));
    }
}
