//! Outbound fragment transport.
//!
//! # Responsibilities
//! - Issue the GET for one fragment URL with forwarded request headers
//! - Report transport failures as [`FetchError`]
//!
//! # Design Decisions
//! - Non-2xx statuses are returned as data; the resolver classifies them
//! - Futures are `'static` so a single fetch can be shared between callers
//! - Connection pooling and TLS belong to `reqwest`

use std::time::Duration;

use futures_util::future::BoxFuture;
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::error::{FetchError, TransclusionError};

/// One outbound fragment request.
#[derive(Debug, Clone)]
pub struct FragmentRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

/// Raw response as received from the fragment source.
#[derive(Debug, Clone)]
pub struct FetchedFragment {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Transport used by the resolver.
pub trait FragmentClient: Send + Sync {
    fn fetch(&self, request: FragmentRequest) -> BoxFuture<'static, Result<FetchedFragment, FetchError>>;
}

/// [`FragmentClient`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFragmentClient {
    client: reqwest::Client,
}

impl HttpFragmentClient {
    pub fn new() -> Result<Self, TransclusionError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("transclusion/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransclusionError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl FragmentClient for HttpFragmentClient {
    fn fetch(&self, request: FragmentRequest) -> BoxFuture<'static, Result<FetchedFragment, FetchError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let timeout = request.timeout;
            let response = client
                .get(request.url)
                .headers(request.headers)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| map_reqwest_error(e, timeout))?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .text()
                .await
                .map_err(|e| map_reqwest_error(e, timeout))?;

            Ok(FetchedFragment {
                status,
                headers,
                body,
            })
        })
    }
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Network(error.to_string())
    }
}

#[cfg(test)]
pub(crate) mod stub {
    //! In-process client with programmable routes and call counting.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use dashmap::DashMap;
    use futures_util::future::BoxFuture;
    use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

    use super::{FetchedFragment, FragmentClient, FragmentRequest};
    use crate::error::FetchError;

    #[derive(Debug, Clone)]
    pub struct StubRoute {
        pub status: u16,
        pub body: String,
        pub headers: Vec<(&'static str, &'static str)>,
        pub delay: Duration,
    }

    impl StubRoute {
        pub fn ok(body: &str) -> Self {
            Self {
                status: 200,
                body: body.to_string(),
                headers: Vec::new(),
                delay: Duration::ZERO,
            }
        }

        pub fn status(status: u16, body: &str) -> Self {
            Self {
                status,
                ..Self::ok(body)
            }
        }

        pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
            self.headers.push((name, value));
            self
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[derive(Default)]
    pub struct StubClient {
        routes: DashMap<String, StubRoute>,
        calls: DashMap<String, usize>,
        total: AtomicUsize,
        last_headers: DashMap<String, HeaderMap>,
    }

    impl StubClient {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn route(&self, url: &str, route: StubRoute) {
            self.routes.insert(url.to_string(), route);
        }

        pub fn calls(&self, url: &str) -> usize {
            self.calls.get(url).map(|c| *c).unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }

        pub fn last_headers(&self, url: &str) -> Option<HeaderMap> {
            self.last_headers.get(url).map(|h| h.clone())
        }
    }

    impl FragmentClient for StubClient {
        fn fetch(&self, request: FragmentRequest) -> BoxFuture<'static, Result<FetchedFragment, FetchError>> {
            let url = request.url.to_string();
            self.total.fetch_add(1, Ordering::SeqCst);
            *self.calls.entry(url.clone()).or_insert(0) += 1;
            self.last_headers.insert(url.clone(), request.headers.clone());
            let route = self.routes.get(&url).map(|r| r.clone());

            Box::pin(async move {
                let Some(route) = route else {
                    return Err(FetchError::Network(format!("connection refused: {url}")));
                };
                tokio::time::sleep(route.delay).await;

                let mut headers = HeaderMap::new();
                for (name, value) in route.headers {
                    headers.append(HeaderName::from_static(name), HeaderValue::from_static(value));
                }
                Ok(FetchedFragment {
                    status: StatusCode::from_u16(route.status).unwrap_or(StatusCode::OK),
                    headers,
                    body: route.body,
                })
            })
        }
    }
}
