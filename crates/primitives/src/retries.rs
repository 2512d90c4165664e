use std::{future::Future, time::Duration};

use alloy::transports::{RpcError as AlloyRpcError, TransportErrorKind};
use alloy_json_rpc::ErrorPayload;
use serde::Deserialize;
use thiserror::Error;
use tokio_retry::RetryIf;
use tracing::debug;

/// The default maximum number of retries for a transient failure.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// The default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// The default timeout applied to every single attempt.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether a failed call is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network hiccups, timeouts, overloaded upstreams.
    Transient,
    /// Malformed requests, reverts, decode failures. Retrying cannot help.
    Fatal,
}

/// Error returned by a network call at the RPC boundary.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The upstream failed in a way that may succeed on retry.
    #[error("transient rpc failure: {0}")]
    Transient(String),
    /// A single attempt did not finish in time.
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),
    /// The call can never succeed as issued.
    #[error("rpc call failed: {0}")]
    Fatal(String),
}

impl RpcError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) | Self::Timeout(_) => ErrorKind::Transient,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Returns `true` if the call should be retried.
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Build a fatal error from anything printable.
    pub fn fatal<S: ToString>(msg: S) -> Self {
        Self::Fatal(msg.to_string())
    }
}

impl From<AlloyRpcError<TransportErrorKind>> for RpcError {
    fn from(err: AlloyRpcError<TransportErrorKind>) -> Self {
        if err.is_retryable() || is_connection_refused(&err) {
            Self::Transient(err.to_string())
        } else {
            Self::Fatal(err.to_string())
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if is_transient_http(&err) {
            Self::Transient(err.to_string())
        } else {
            Self::Fatal(err.to_string())
        }
    }
}

/// Network failures, timeouts, 5xx and 429 responses.
fn is_transient_http(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        return true;
    }
    err.status().is_some_and(|status| status.is_server_error() || status.as_u16() == 429)
}

/// Whether a transport-level failure may succeed on retry. The HTTP transport wraps the
/// underlying `reqwest` error in [`TransportErrorKind::Custom`].
fn is_retryable_transport(err: &TransportErrorKind) -> bool {
    match err {
        TransportErrorKind::Custom(inner) => {
            inner.downcast_ref::<reqwest::Error>().is_some_and(is_transient_http)
        }
        TransportErrorKind::BackendGone | TransportErrorKind::PubsubUnavailable => true,
        _ => err.is_retry_err(),
    }
}

/// Extension trait to implement methods for [`RpcError<TransportErrorKind, E>`].
///
/// Ported from Alloy because it is private to its crate.
/// Reference: <https://github.com/alloy-rs/alloy/blob/a3d521e18fe335f5762be03656a3470f5f6331d8/crates/transport/src/error.rs#L126>
pub(crate) trait RpcErrorExt {
    /// Analyzes whether to retry the request depending on the error.
    fn is_retryable(&self) -> bool;
}

impl RpcErrorExt for AlloyRpcError<TransportErrorKind> {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => is_retryable_transport(err),
            Self::DeserError { text, .. } => {
                if let Ok(resp) = serde_json::from_str::<ErrorPayload>(text) {
                    return resp.is_retry_err();
                }

                // some providers send invalid JSON RPC in the error case (no `id:u64`), but the
                // text should be a `JsonRpcError`
                #[derive(Deserialize)]
                struct Resp {
                    error: ErrorPayload,
                }

                if let Ok(resp) = serde_json::from_str::<Resp>(text) {
                    return resp.error.is_retry_err();
                }

                false
            }
            Self::ErrorResp(err) => err.is_retry_err(),
            Self::NullResp => true,
            _ => false,
        }
    }
}

/// Checks whether the error message contains "connection refused".
#[inline]
pub fn is_connection_refused<S: ToString>(e: S) -> bool {
    e.to_string().to_lowercase().contains("connection refused")
}

/// Retry settings for a single network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled after every retry.
    pub initial_delay: Duration,
    /// Timeout of each attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delays between attempts: `initial, 2*initial, 4*initial, ...`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        std::iter::successors(Some(self.initial_delay), |d| Some(d.saturating_mul(2)))
            .take(self.max_retries as usize)
    }
}

/// Run `op` with a per-attempt timeout, retrying transient failures with doubling delays.
///
/// Fatal errors are returned immediately.
pub async fn call_with_retry<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let timeout = policy.timeout;
    let attempt = move || {
        let fut = op();
        async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout(timeout)),
            }
        }
    };

    RetryIf::spawn(policy.delays(), attempt, |err: &RpcError| {
        let retry = err.is_transient();
        if retry {
            debug!(error = %err, "retrying transient rpc failure");
        }
        retry
    })
    .await
}
