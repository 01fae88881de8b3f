//! Immutable route tree used on the request path.

use std::collections::HashMap;

use axum::http::Method;

use crate::http::handler::BoxHandler;
use crate::routing::path::split_path;
use crate::routing::route::{Params, REST_PARAM};

/// Route trie with middleware already folded into every handler.
///
/// Produced by [`Router::compile`](crate::routing::Router::compile). Lookups
/// take `&self` only, so one instance is shared by every connection.
pub struct CompiledRouter {
    pub(crate) handlers: HashMap<Method, BoxHandler>,
    pub(crate) statics: HashMap<String, CompiledRouter>,
    pub(crate) params: Vec<(String, CompiledRouter)>,
}

impl CompiledRouter {
    /// Resolve `method` and already-normalized `segments` to a handler.
    ///
    /// At each level a static child is tried before parameter children. When
    /// no child subtree matches, a handler on the current node receives the
    /// remaining segments as [`REST_PARAM`].
    pub fn lookup<S: AsRef<str>>(
        &self,
        method: &Method,
        segments: &[S],
    ) -> Option<(BoxHandler, Params)> {
        let mut params = Params::new();
        let handler = self.find(method, segments, &mut params)?;
        Some((handler.clone(), params))
    }

    /// Normalize `path` and resolve it.
    pub fn lookup_path(&self, method: &Method, path: &str) -> Option<(BoxHandler, Params)> {
        self.lookup(method, &split_path(path))
    }

    fn find<S: AsRef<str>>(
        &self,
        method: &Method,
        segments: &[S],
        params: &mut Params,
    ) -> Option<&BoxHandler> {
        if let Some((first, rest)) = segments.split_first() {
            let first = first.as_ref();

            if let Some(handler) = self
                .statics
                .get(first)
                .and_then(|child| child.find(method, rest, params))
            {
                return Some(handler);
            }

            for (name, child) in &self.params {
                if let Some(handler) = child.find(method, rest, params) {
                    params.insert(name.clone(), first);
                    return Some(handler);
                }
            }
        }

        let handler = self.handlers.get(method)?;
        if !segments.is_empty() {
            let rest: Vec<&str> = segments.iter().map(AsRef::as_ref).collect();
            params.insert(REST_PARAM, rest.join("/"));
        }
        Some(handler)
    }

    /// Whether any handler at all is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
            && self.statics.values().all(CompiledRouter::is_empty)
            && self.params.iter().all(|(_, child)| child.is_empty())
    }
}

impl std::fmt::Debug for CompiledRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRouter")
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .field("statics", &self.statics.keys().collect::<Vec<_>>())
            .field("params", &self.params.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}
