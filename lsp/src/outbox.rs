//! Ordered queue of notifications waiting for a document's writer task.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use lockstep_types::Version;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{DID_CHANGE, DID_CLOSE, DID_SAVE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutgoingKind {
    Change(Version),
    Save,
    Close,
}

impl OutgoingKind {
    pub fn method(self) -> &'static str {
        match self {
            Self::Change(_) => DID_CHANGE,
            Self::Save => DID_SAVE,
            Self::Close => DID_CLOSE,
        }
    }
}

pub(crate) struct Outgoing {
    pub kind: OutgoingKind,
    pub params: Value,
    ack: oneshot::Sender<bool>,
}

impl Outgoing {
    /// Report whether the notification reached the server.
    pub fn acknowledge(self, sent: bool) {
        // The caller may have dropped its Delivery.
        let _ = self.ack.send(sent);
    }

    pub fn into_parts(self) -> (OutgoingKind, Value, Acknowledge) {
        (self.kind, self.params, Acknowledge(self.ack))
    }
}

pub(crate) struct Acknowledge(oneshot::Sender<bool>);

impl Acknowledge {
    pub fn send(self, sent: bool) {
        let _ = self.0.send(sent);
    }
}

/// Sending half of a document's notification queue.
///
/// Unbounded so edit hooks never wait on the network; the writer task drains
/// it in order.
pub(crate) struct Outbox {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// False once the writer task has stopped accepting notifications.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn push(&self, kind: OutgoingKind, params: Value) -> Delivery {
        let (ack, rx) = oneshot::channel();
        match self.tx.send(Outgoing { kind, params, ack }) {
            Ok(()) => Delivery::pending(rx),
            Err(_) => {
                tracing::debug!(method = kind.method(), "Writer stopped, notification skipped");
                Delivery::skipped()
            }
        }
    }
}

/// Resolves to whether a notification was written to the server.
///
/// Dropping a `Delivery` does not cancel the notification.
#[derive(Debug)]
pub struct Delivery {
    rx: Option<oneshot::Receiver<bool>>,
}

impl Delivery {
    fn pending(rx: oneshot::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Nothing was queued.
    #[must_use]
    pub fn skipped() -> Self {
        Self { rx: None }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.rx.is_none()
    }
}

impl Future for Delivery {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        match self.rx.as_mut() {
            None => Poll::Ready(false),
            Some(rx) => Pin::new(rx).poll(cx).map(|result| result.unwrap_or(false)),
        }
    }
}
