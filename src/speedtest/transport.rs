use super::error::{StreamOpenError, TransportError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use reqwest::header::ACCEPT;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type ChunkStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Opens the progress stream. Implementations never retry; the caller decides.
pub trait EventTransport: Send + Sync + 'static {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ChunkStream, StreamOpenError>>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// No overall timeout: the stream stays open for the whole test.
    pub fn new(connect_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn connect(&self, url: &str) -> Result<ChunkStream, StreamOpenError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|source| StreamOpenError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamOpenError::Status {
                url: url.to_string(),
                status,
            });
        }
        if response.content_length() == Some(0) {
            return Err(StreamOpenError::MissingBody {
                url: url.to_string(),
            });
        }

        tracing::debug!(%url, %status, "progress stream open");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::Read))
            .boxed())
    }
}

impl EventTransport for HttpTransport {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ChunkStream, StreamOpenError>> {
        self.connect(url).boxed()
    }
}

#[derive(Debug)]
pub enum ReadOutcome {
    Chunk(Bytes),
    Closed,
    Failed(TransportError),
    Cancelled,
}

/// Pulls chunks from an open stream until it ends or the token fires.
///
/// Cancellation is checked before every read and raced against the pending one,
/// so it takes effect within a single read.
pub struct TransportReader {
    stream: Option<ChunkStream>,
    cancel: CancellationToken,
}

impl TransportReader {
    pub fn new(stream: ChunkStream, cancel: CancellationToken) -> Self {
        Self {
            stream: Some(stream),
            cancel,
        }
    }

    pub async fn next_chunk(&mut self) -> ReadOutcome {
        let Some(stream) = self.stream.as_mut() else {
            return ReadOutcome::Closed;
        };
        if self.cancel.is_cancelled() {
            self.close();
            return ReadOutcome::Cancelled;
        }

        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            next = stream.next() => Some(next),
        };

        match next {
            None => {
                self.close();
                ReadOutcome::Cancelled
            }
            Some(Some(Ok(chunk))) => ReadOutcome::Chunk(chunk),
            Some(Some(Err(err))) => {
                self.close();
                ReadOutcome::Failed(err)
            }
            Some(None) => {
                self.close();
                ReadOutcome::Closed
            }
        }
    }

    pub fn close(&mut self) {
        self.stream = None;
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::stream;

    fn reader_over(chunks: Vec<Result<Bytes, TransportError>>) -> TransportReader {
        TransportReader::new(stream::iter(chunks).boxed(), CancellationToken::new())
    }

    #[tokio::test]
    async fn yields_chunks_then_closed() {
        let mut reader = reader_over(vec![
            Ok(Bytes::from_static(b"event: started\n")),
            Ok(Bytes::from_static(b"\n")),
        ]);

        assert!(matches!(reader.next_chunk().await, ReadOutcome::Chunk(c) if c == "event: started\n"));
        assert!(matches!(reader.next_chunk().await, ReadOutcome::Chunk(_)));
        assert!(matches!(reader.next_chunk().await, ReadOutcome::Closed));
        assert!(!reader.is_open());
        assert!(matches!(reader.next_chunk().await, ReadOutcome::Closed));
    }

    #[tokio::test]
    async fn read_error_closes_the_stream() {
        let mut reader = reader_over(vec![Err(TransportError::Other("reset by peer".into()))]);
        assert!(matches!(reader.next_chunk().await, ReadOutcome::Failed(_)));
        assert!(!reader.is_open());
    }

    #[tokio::test]
    async fn cancel_interrupts_a_pending_read() {
        let (tx, rx) = mpsc::unbounded::<Result<Bytes, TransportError>>();
        let cancel = CancellationToken::new();
        let mut reader = TransportReader::new(rx.boxed(), cancel.clone());

        let pending = tokio::spawn(async move {
            let outcome = reader.next_chunk().await;
            (outcome, reader.is_open())
        });
        tokio::task::yield_now().await;
        cancel.cancel();

        let (outcome, open) = pending.await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Cancelled));
        assert!(!open);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn cancel_wins_over_ready_chunk() {
        let cancel = CancellationToken::new();
        let chunks: Vec<Result<Bytes, TransportError>> = vec![Ok(Bytes::from_static(b"data: x\n\n"))];
        let mut reader = TransportReader::new(stream::iter(chunks).boxed(), cancel.clone());
        cancel.cancel();
        assert!(matches!(reader.next_chunk().await, ReadOutcome::Cancelled));
    }
}
