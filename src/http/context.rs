//! Per-request context.

use std::net::SocketAddr;

use uuid::Uuid;

use crate::routing::Params;

/// Header carrying the request identifier.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Values attached to a request by the dispatcher.
///
/// Stored in the request extensions before the handler chain runs and
/// dropped with the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    params: Params,
    remote_addr: Option<SocketAddr>,
}

impl RequestContext {
    pub fn new(
        request_id: impl Into<String>,
        params: Params,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            params,
            remote_addr,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Address of the connected peer, when served over a socket.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Uuid::new_v4().to_string(), Params::new(), None)
    }
}
