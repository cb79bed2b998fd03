// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::CONTENT_LENGTH;
use std::pin::Pin;

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// HTTP response with status, content length, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// Outcome of a metadata-only request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    pub content_length: Option<u64>,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the entire response body as bytes, with its status code
    async fn get_bytes(&self, url: &str) -> Result<(u16, Bytes), reqwest::Error>;

    /// Get a streaming response for large downloads
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;

    /// Issue a HEAD request and report the remote size
    async fn head(&self, url: &str) -> Result<HeadResponse, reqwest::Error>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str) -> Result<(u16, Bytes), reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        Ok((status, response.bytes().await?))
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        use futures::StreamExt;

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        let body: ByteStream = Box::pin(response.bytes_stream().map(|result| result));

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }

    async fn head(&self, url: &str) -> Result<HeadResponse, reqwest::Error> {
        let response = self.client.head(url).send().await?;

        // The body of a HEAD response is always empty, so read the header itself
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());

        Ok(HeadResponse {
            status: response.status().as_u16(),
            content_length,
        })
    }
}

/// Canned HTTP client shared by the unit tests
#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone)]
    pub struct Route {
        pub status: u16,
        pub body: Vec<u8>,
        /// Overrides the size reported by HEAD
        pub head_length: Option<u64>,
        /// Makes HEAD fail at the HTTP level
        pub head_status: Option<u16>,
    }

    impl Route {
        pub fn ok(body: impl Into<Vec<u8>>) -> Self {
            Self {
                status: 200,
                body: body.into(),
                head_length: None,
                head_status: None,
            }
        }

        pub fn status(status: u16) -> Self {
            Self {
                status,
                body: Vec::new(),
                head_length: None,
                head_status: Some(status),
            }
        }
    }

    /// Serves registered routes; unknown URLs answer 404
    #[derive(Clone, Default)]
    pub struct MockHttpClient {
        routes: Arc<Mutex<HashMap<String, Route>>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(self, url: &str, route: Route) -> Self {
            self.routes.lock().unwrap().insert(url.to_string(), route);
            self
        }

        fn lookup(&self, url: &str) -> Route {
            self.routes
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Route::status(404))
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<(u16, Bytes), reqwest::Error> {
            let route = self.lookup(url);
            Ok((route.status, Bytes::from(route.body)))
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            let route = self.lookup(url);
            let len = route.body.len() as u64;
            let data = Bytes::from(route.body);

            let stream: ByteStream = Box::pin(futures::stream::once(async move { Ok(data) }));

            Ok(HttpResponse {
                status: route.status,
                content_length: Some(len),
                body: stream,
            })
        }

        async fn head(&self, url: &str) -> Result<HeadResponse, reqwest::Error> {
            let route = self.lookup(url);
            Ok(HeadResponse {
                status: route.head_status.unwrap_or(route.status),
                content_length: route.head_length.or(Some(route.body.len() as u64)),
            })
        }
    }
}
