//! API route declarations.
//!
//! Plugins with the `api` capability flag declare routes as plain data; the
//! registry collects them into one ordered route table for the external HTTP
//! transport to mount verbatim. No HTTP server lives in this workspace.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::HandlerError;

/// HTTP method of a declared route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl RouteMethod {
    /// Returns the method as an upper-case token.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
            RouteMethod::Put => "PUT",
            RouteMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-erased async route handler: request payload in, response payload out.
///
/// Request decoding and response encoding belong to the external transport;
/// from this crate's perspective both sides are opaque JSON.
pub type RouteHandlerFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// One (path, method, handler) tuple of the produced route table.
#[derive(Clone)]
pub struct RouteEntry {
    /// Path the external transport should mount the handler under.
    pub path: String,
    /// HTTP method.
    pub method: RouteMethod,
    /// The handler itself.
    pub handler: RouteHandlerFn,
}

impl RouteEntry {
    /// Creates a route entry from an async closure.
    pub fn new<F, Fut>(method: RouteMethod, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self {
            path: path.into(),
            method,
            handler: Arc::new(move |request| Box::pin(handler(request))),
        }
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}
