//! Collaborator seams: the transport session, the live server, and the editor's text.
//!
//! The engine never owns a connection. It is handed a [`ServerSession`] that
//! resolves to a shared [`ServerHandle`] once the server is initialized, and
//! every document of that server talks through the same handle.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::SessionError;

pub type SessionFut<'a, T> = BoxFuture<'a, Result<T, SessionError>>;

/// An initialized language server connection.
pub trait LanguageServer: Send + Sync {
    /// Send a JSON-RPC notification. Resolves once the frame is handed to the transport.
    fn notify(&self, method: &'static str, params: Value) -> SessionFut<'_, ()>;

    /// Send a JSON-RPC request and resolve with its `result` (which may be `null`).
    fn request(&self, method: &'static str, params: Value) -> SessionFut<'_, Value>;
}

/// Shared, read-only handle to a live server.
pub type ServerHandle = Arc<dyn LanguageServer>;

/// Transport/session lifecycle owned outside this crate.
pub trait ServerSession: Send + Sync {
    /// Resolves with the live server once `initialize` has completed.
    fn initialized_server(&self) -> SessionFut<'_, ServerHandle>;

    /// False once the session is shutting down or has not started.
    fn is_active(&self) -> bool;
}

/// Full buffer text on demand.
pub trait TextSource: Send + Sync {
    fn text(&self) -> String;
}

impl<F> TextSource for F
where
    F: Fn() -> String + Send + Sync,
{
    fn text(&self) -> String {
        self()
    }
}
