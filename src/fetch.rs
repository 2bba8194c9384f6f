use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use bytes::{Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use reqwest::header;

use crate::error::FetchError;

pub const CHUNK_SIZE: usize = 8 * 1024;

/// Streams a remote file in fixed-size chunks while exposing live transfer
/// counters to concurrent readers. One transfer at a time per instance.
pub struct HttpFetcher {
    url: String,
    client: reqwest::Client,
    total: AtomicU64,
    transferred: AtomicU64,
    in_flight: AtomicBool,
}

// Clears the in-flight flag on every exit path, including an early drop of
// a partially consumed stream.
struct FlightGuard(Arc<HttpFetcher>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, insecure_tls: bool) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;

        Ok(Self {
            url: url.into(),
            client,
            total: AtomicU64::new(0),
            transferred: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the declared size of the remote file without downloading it.
    /// Returns 0 when the server omits Content-Length.
    pub async fn probe_size(&self) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(&self.url)
            // identity encoding so Content-Length reflects the stored size
            // rather than a compressed transfer size
            .header(header::ACCEPT_ENCODING, "identity")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        Ok(response.content_length().unwrap_or(0))
    }

    /// Opens one streaming connection and yields the body in 8 KiB chunks,
    /// bumping the transferred counter before each chunk. The transfer has
    /// no timeout. Fails with [`FetchError::AlreadyInFlight`] while an
    /// earlier stream from this instance is still live.
    pub fn stream_chunks(
        self: &Arc<Self>,
    ) -> impl Stream<Item = Result<Bytes, FetchError>> + Send + 'static {
        let fetcher = Arc::clone(self);

        try_stream! {
            if fetcher
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                Err(FetchError::AlreadyInFlight)?;
            }
            let _guard = FlightGuard(Arc::clone(&fetcher));

            fetcher.transferred.store(0, Ordering::Release);

            let response = fetcher.client.get(&fetcher.url).send().await?;
            if !response.status().is_success() {
                Err(FetchError::Status(response.status()))?;
            }
            fetcher
                .total
                .store(response.content_length().unwrap_or(0), Ordering::Release);

            let mut body = response.bytes_stream();
            let mut pending = BytesMut::new();

            while let Some(chunk) = body.next().await {
                pending.extend_from_slice(&chunk?);
                while pending.len() >= CHUNK_SIZE {
                    let out = pending.split_to(CHUNK_SIZE).freeze();
                    fetcher
                        .transferred
                        .fetch_add(out.len() as u64, Ordering::AcqRel);
                    yield out;
                }
            }

            if !pending.is_empty() {
                let out = pending.freeze();
                fetcher
                    .transferred
                    .fetch_add(out.len() as u64, Ordering::AcqRel);
                yield out;
            }
        }
    }

    /// Live transfer progress in percent. Lock-free, safe to call while a
    /// stream is in flight. 0 while the total size is unknown.
    pub fn progress(&self) -> f64 {
        let total = self.total.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        let transferred = self.transferred.load(Ordering::Acquire);
        transferred as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use futures::pin_mut;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/model.gguf")
    }

    async fn serve_bytes(body: Vec<u8>) -> String {
        serve(Router::new().route("/model.gguf", get(move || async move { body }))).await
    }

    fn fetcher(url: &str) -> Arc<HttpFetcher> {
        Arc::new(HttpFetcher::new(url, false).unwrap())
    }

    #[test]
    fn progress_is_zero_when_total_unknown() {
        let f = HttpFetcher::new("http://localhost/model.gguf", false).unwrap();
        f.transferred.store(250, Ordering::Release);
        assert_eq!(f.progress(), 0.0);
    }

    #[test]
    fn progress_is_percentage_of_total() {
        let f = HttpFetcher::new("http://localhost/model.gguf", false).unwrap();
        f.total.store(1000, Ordering::Release);
        f.transferred.store(250, Ordering::Release);
        assert_eq!(f.progress(), 25.0);
    }

    #[tokio::test]
    async fn probe_returns_declared_size() {
        let url = serve_bytes(vec![7u8; 1234]).await;
        let f = fetcher(&url);
        assert_eq!(f.probe_size().await.unwrap(), 1234);
    }

    #[tokio::test]
    async fn probe_returns_zero_without_content_length() {
        let app = Router::new().route(
            "/model.gguf",
            get(|| async {
                let chunks: Vec<Result<Bytes, std::io::Error>> =
                    vec![Ok(Bytes::from_static(b"abc"))];
                Body::from_stream(futures::stream::iter(chunks)).into_response()
            }),
        );
        let url = serve(app).await;
        let f = fetcher(&url);
        assert_eq!(f.probe_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn probe_fails_on_error_status() {
        let app = Router::new().route("/model.gguf", get(|| async { StatusCode::NOT_FOUND }));
        let url = serve(app).await;
        let f = fetcher(&url);
        assert!(matches!(
            f.probe_size().await,
            Err(FetchError::Status(s)) if s == reqwest::StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn stream_rechunks_body_into_fixed_chunks() {
        let url = serve_bytes(vec![1u8; 20_000]).await;
        let f = fetcher(&url);

        let stream = f.stream_chunks();
        pin_mut!(stream);

        let mut sizes = Vec::new();
        while let Some(chunk) = stream.next().await {
            sizes.push(chunk.unwrap().len());
        }
        assert_eq!(sizes, vec![8192, 8192, 3616]);
        assert_eq!(f.progress(), 100.0);
    }

    #[tokio::test]
    async fn stream_fails_on_error_status() {
        let app = Router::new().route(
            "/model.gguf",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let url = serve(app).await;
        let f = fetcher(&url);

        let stream = f.stream_chunks();
        pin_mut!(stream);
        assert!(matches!(
            stream.next().await,
            Some(Err(FetchError::Status(_)))
        ));
    }

    #[tokio::test]
    async fn second_stream_fails_while_first_is_live() {
        let url = serve_bytes(vec![1u8; 64 * 1024]).await;
        let f = fetcher(&url);

        let first = f.stream_chunks();
        pin_mut!(first);
        first.next().await.unwrap().unwrap();

        let second = f.stream_chunks();
        pin_mut!(second);
        assert!(matches!(
            second.next().await,
            Some(Err(FetchError::AlreadyInFlight))
        ));
    }

    #[tokio::test]
    async fn flag_clears_after_early_drop() {
        let url = serve_bytes(vec![1u8; 64 * 1024]).await;
        let f = fetcher(&url);

        {
            let first = f.stream_chunks();
            pin_mut!(first);
            first.next().await.unwrap().unwrap();
        }

        let second = f.stream_chunks();
        pin_mut!(second);
        assert!(second.next().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn flag_clears_after_exhaustion() {
        let url = serve_bytes(vec![1u8; 1024]).await;
        let f = fetcher(&url);

        let first = f.stream_chunks();
        pin_mut!(first);
        while let Some(chunk) = first.next().await {
            chunk.unwrap();
        }

        let second = f.stream_chunks();
        pin_mut!(second);
        assert!(second.next().await.unwrap().is_ok());
    }
}
