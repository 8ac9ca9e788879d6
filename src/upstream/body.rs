//! Streamed backend bodies bounded by the call deadline.
//!
//! # Responsibilities
//! - Relay a backend body frame by frame without buffering
//! - End the stream with an error once the call deadline passes
//! - Settle the call's breaker permit when the body finishes
//!
//! # Design Decisions
//! - The deadline is the one that bounded the response headers; the whole
//!   exchange shares a single budget
//! - The breaker outcome is known only at end of body: a clean end is a
//!   success, a read error or an expired deadline is a failure
//! - A body dropped early by the client reports nothing

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Bytes;
use hyper::body::{Body, Frame, Incoming, SizeHint};
use tokio::time::Sleep;

use crate::observability::metrics;
use crate::resilience::timeouts::Deadline;
use crate::resilience::{CallBreaker, CallPermit};

/// Why a relayed body ended early.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamBodyError {
    #[error("backend body not complete within {0:?}")]
    Deadline(Duration),

    #[error("failed to read backend body: {0}")]
    Transport(#[source] hyper::Error),
}

/// A backend response body under the call deadline.
pub struct UpstreamBody {
    inner: Incoming,
    deadline: Pin<Box<Sleep>>,
    limit: Duration,
    backend: String,
    permit: Option<CallPermit<Arc<CallBreaker>>>,
    finished: bool,
}

impl std::fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamBody")
            .field("limit", &self.limit)
            .field("backend", &self.backend)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl UpstreamBody {
    pub(crate) fn new(
        inner: Incoming,
        deadline: Deadline,
        backend: &str,
        permit: CallPermit<Arc<CallBreaker>>,
    ) -> Self {
        let mut body = Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(deadline.at())),
            limit: deadline.limit(),
            backend: backend.to_string(),
            permit: Some(permit),
            finished: false,
        };
        // hyper may never poll a body that is already complete.
        if body.inner.is_end_stream() {
            body.settle(Outcome::Success);
        }
        body
    }

    fn settle(&mut self, outcome: Outcome) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        match outcome {
            Outcome::Success => {
                metrics::record_upstream(&self.backend, "success");
                permit.success();
            }
            Outcome::Timeout => {
                tracing::warn!(backend = %self.backend, limit = ?self.limit, "Backend body timed out");
                metrics::record_upstream(&self.backend, "timeout");
                permit.failure();
            }
            Outcome::Transport => {
                metrics::record_upstream(&self.backend, "transport_error");
                permit.failure();
            }
        }
    }
}

enum Outcome {
    Success,
    Timeout,
    Transport,
}

impl Body for UpstreamBody {
    type Data = Bytes;
    type Error = UpstreamBodyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            this.finished = true;
            this.settle(Outcome::Timeout);
            return Poll::Ready(Some(Err(UpstreamBodyError::Deadline(this.limit))));
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(None) => {
                this.finished = true;
                this.settle(Outcome::Success);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Ok(frame))) => {
                if this.inner.is_end_stream() {
                    this.settle(Outcome::Success);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(backend = %this.backend, error = %e, "Backend body failed");
                this.finished = true;
                this.settle(Outcome::Transport);
                Poll::Ready(Some(Err(UpstreamBodyError::Transport(e))))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
