use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tracing::debug;

/// Live fan-out of the supervised process output.
///
/// This is a tap, not a replay log: a subscriber only sees lines published after it
/// subscribed, and a subscriber that falls more than `capacity` lines behind skips the
/// oldest ones instead of slowing the producers down.
#[derive(Clone, Debug)]
pub struct OutputChannel {
    sender: broadcast::Sender<String>,
}

impl OutputChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish one line; lines published without subscribers are dropped
    pub fn publish(&self, line: impl Into<String>) {
        let _ = self.sender.send(line.into());
    }

    /// Subscribe to lines published from now on.
    ///
    /// The stream ends only once every publisher (including the runtime) has been dropped.
    pub fn subscribe(&self) -> impl Stream<Item = String> + Send + Unpin + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| match item {
            Ok(line) => Some(line),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "Output subscriber lagged behind");
                None
            }
        })
    }

    /// Forward every line of `reader` into the channel until EOF.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected, so the pipe stays
    /// drained for as long as the process writes to it.
    pub async fn forward_lines<R>(self, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let codec = AnyDelimiterCodec::new(b"\n".to_vec(), Vec::new());
        let mut frames = FramedRead::new(reader, codec);
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(chunk) => {
                    let decoded = String::from_utf8_lossy(&chunk);
                    let line: &str = &decoded;
                    self.publish(line.strip_suffix('\r').unwrap_or(line));
                }
                Err(e) => {
                    debug!(error = %e, "Stopped reading process output");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_subscriber_only_sees_new_lines() {
        let channel = OutputChannel::new(16);
        channel.publish("before-1");
        channel.publish("before-2");

        let mut lines = channel.subscribe();
        channel.publish("after");

        assert_eq!(lines.next().await.as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let channel = OutputChannel::new(16);
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        channel.publish("line");

        assert_eq!(first.next().await.as_deref(), Some("line"));
        assert_eq!(second.next().await.as_deref(), Some("line"));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let channel = OutputChannel::new(2);
        let mut lines = channel.subscribe();
        for i in 0..5 {
            channel.publish(format!("line-{i}"));
        }

        assert_eq!(lines.next().await.as_deref(), Some("line-3"));
        assert_eq!(lines.next().await.as_deref(), Some("line-4"));
    }

    #[tokio::test]
    async fn test_forward_lines_splits_reader() {
        let channel = OutputChannel::new(16);
        let mut lines = channel.subscribe();

        let reader: &[u8] = b"started\nlistening on 8080\r\npartial";
        channel.clone().forward_lines(reader).await;

        let mut seen = Vec::new();
        while let Ok(Some(line)) =
            tokio::time::timeout(Duration::from_millis(100), lines.next()).await
        {
            seen.push(line);
        }
        assert_eq!(seen, vec!["started", "listening on 8080", "partial"]);
    }

    #[tokio::test]
    async fn test_forward_lines_survives_invalid_utf8() {
        let channel = OutputChannel::new(16);
        let mut lines = channel.subscribe();

        let reader: &[u8] = b"stream \xff name\nstill reading\n";
        channel.clone().forward_lines(reader).await;

        assert_eq!(lines.next().await.as_deref(), Some("stream \u{fffd} name"));
        assert_eq!(lines.next().await.as_deref(), Some("still reading"));
    }
}
