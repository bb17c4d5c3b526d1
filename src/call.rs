//! The unit of work protected by a breaker and what one attempt returns.

use std::future::Future;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::{CallError, CallResult};

/// A response received from the callee, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Raw body. Decoding it is up to the caller.
    pub payload: Bytes,
}

impl Response {
    /// Creates a response from a status and a body.
    pub fn new(status: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    /// Creates a `200 OK` response.
    pub fn ok(payload: impl Into<Bytes>) -> Self {
        Self::new(200, payload)
    }

    /// Splits a response into the payload or the error its status implies.
    ///
    /// 5xx becomes [`CallError::Server`], 4xx becomes [`CallError::Client`],
    /// anything else hands the payload back.
    pub fn into_result(self) -> CallResult {
        match self.status {
            500.. => Err(CallError::Server {
                status: self.status,
                payload: self.payload,
            }),
            400..=499 => Err(CallError::Client {
                status: self.status,
                payload: self.payload,
            }),
            _ => Ok(self.payload),
        }
    }
}

/// Something that can be attempted, possibly many times.
///
/// Every attempt receives a [`CancellationToken`] that is cancelled once the
/// result is no longer wanted, typically after the overall timeout fired.
/// Implemented for any `Fn(CancellationToken) -> impl Future`.
pub trait UnitOfWork: Send + Sync + 'static {
    /// Future driving one attempt.
    type Attempt: Future<Output = Result<Response, CallError>> + Send + 'static;

    /// Starts one attempt.
    fn attempt(&self, token: CancellationToken) -> Self::Attempt;
}

impl<F, Fut> UnitOfWork for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, CallError>> + Send + 'static,
{
    type Attempt = Fut;

    fn attempt(&self, token: CancellationToken) -> Self::Attempt {
        self(token)
    }
}
