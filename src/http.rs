//! Outbound HTTP calls as cancellable units of work.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use tokio_util::sync::CancellationToken;

use crate::call::{Response, UnitOfWork};
use crate::error::CallError;

/// A reusable request template sent once per attempt.
///
/// The body is kept as [`Bytes`] so every retry sends an identical request.
#[derive(Debug, Clone)]
pub struct HttpCall {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl HttpCall {
    /// Creates a request template for `method` on `url`.
    pub fn new(client: Client, method: Method, url: Url) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request template.
    pub fn get(client: Client, url: Url) -> Self {
        Self::new(client, Method::GET, url)
    }

    /// Adds a header sent with every attempt.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the body sent with every attempt.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sends one attempt, giving up as soon as `token` is cancelled.
    ///
    /// Any status is returned as a [`Response`]; only failing to obtain one
    /// is an error.
    pub async fn send(&self, token: CancellationToken) -> Result<Response, CallError> {
        let mut request = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        let exchange = async {
            let response = request.send().await.map_err(transport)?;
            let status = response.status().as_u16();
            let payload = response.bytes().await.map_err(transport)?;
            Ok::<_, CallError>(Response { status, payload })
        };

        tokio::select! {
            result = exchange => result,
            _ = token.cancelled() => Err(CallError::Cancelled),
        }
    }

    /// Turns the template into a unit of work for a breaker.
    pub fn into_unit(self) -> impl UnitOfWork {
        move |token: CancellationToken| {
            let call = self.clone();
            async move { call.send(token).await }
        }
    }
}

fn transport(err: reqwest::Error) -> CallError {
    CallError::Transport(err.to_string())
}
