//! Route registration tree.
//!
//! # Responsibilities
//! - Build the path-segment trie during startup
//! - Reject duplicate (method, node) registrations
//! - Detect ambiguous routes before serving
//! - Produce the immutable [`CompiledRouter`]
//!
//! # Design Decisions
//! - Mutable only until `compile()`; the compiled tree has no mutators
//! - Static children kept in a `BTreeMap` so `routes()` is deterministic
//! - Parameter children kept in registration order, which is also lookup order

use std::collections::btree_map::BTreeMap;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt;

use axum::http::Method;
use thiserror::Error;

use crate::http::handler::BoxHandler;
use crate::routing::compiled::CompiledRouter;
use crate::routing::middleware::{self, Middleware};
use crate::routing::path::split_path;
use crate::routing::route::Route;

/// Error raised while registering or validating routes.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The same method was registered twice on one node.
    #[error("duplicate route: {0}")]
    Duplicate(Route),
    /// Two routes collapse to the same signature once parameter names are erased.
    #[error("ambiguous routes: {first} and {second}")]
    Ambiguous { first: Route, second: Route },
}

/// One node of the route trie; the root node is the whole router.
#[derive(Default)]
pub struct Router {
    middlewares: Vec<Middleware>,
    statics: BTreeMap<String, Router>,
    params: Vec<(String, Router)>,
    handlers: HashMap<Method, BoxHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend to (creating if needed) the node for `path`.
    ///
    /// Segments starting with `:` declare a capture. Calling this twice with
    /// the same path returns the same node.
    pub fn prefix(&mut self, path: &str) -> &mut Router {
        split_path(path)
            .into_iter()
            .fold(self, |node, segment| node.child(segment))
    }

    fn child(&mut self, segment: String) -> &mut Router {
        match segment.strip_prefix(':') {
            Some(name) => {
                let index = match self.params.iter().position(|(n, _)| n == name) {
                    Some(index) => index,
                    None => {
                        self.params.push((name.to_string(), Router::default()));
                        self.params.len() - 1
                    }
                };
                &mut self.params[index].1
            }
            None => self.statics.entry(segment).or_default(),
        }
    }

    /// Append a middleware to this node. It wraps every handler at or below it.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Register `handler` for `method` at `path`.
    pub fn handle(
        &mut self,
        method: Method,
        path: &str,
        handler: BoxHandler,
    ) -> Result<(), RouteError> {
        let node = self.prefix(path);
        match node.handlers.entry(method) {
            Entry::Occupied(entry) => Err(RouteError::Duplicate(Route::new(
                entry.key().clone(),
                pattern(path),
            ))),
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(())
            }
        }
    }

    pub fn get(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.handle(Method::GET, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.handle(Method::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.handle(Method::PUT, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.handle(Method::PATCH, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.handle(Method::DELETE, path, handler)
    }

    pub fn options(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.handle(Method::OPTIONS, path, handler)
    }

    /// Every registered route, statics before parameters, depth first.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes = Vec::new();
        self.collect_routes("", &mut routes);
        routes
    }

    fn collect_routes(&self, base: &str, out: &mut Vec<Route>) {
        let mut methods: Vec<&Method> = self.handlers.keys().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for method in methods {
            let path = if base.is_empty() { "/" } else { base };
            out.push(Route::new(method.clone(), path));
        }
        for (segment, child) in &self.statics {
            child.collect_routes(&format!("{}/{}", base, segment), out);
        }
        for (name, child) in &self.params {
            child.collect_routes(&format!("{}/:{}", base, name), out);
        }
    }

    /// Reject the tree if two routes differ only by parameter names.
    pub fn validate(&self) -> Result<(), RouteError> {
        let mut seen: HashMap<String, Route> = HashMap::new();
        for route in self.routes() {
            match seen.entry(route.signature()) {
                Entry::Occupied(existing) => {
                    return Err(RouteError::Ambiguous {
                        first: existing.get().clone(),
                        second: route,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(route);
                }
            }
        }
        Ok(())
    }

    /// Fold `inherited` plus each node's own middleware around its handlers.
    ///
    /// The returned tree is independent of `self`: later registrations on
    /// this builder only show up in a later `compile()`.
    pub fn compile(&self, inherited: &[Middleware]) -> CompiledRouter {
        let mut chain = inherited.to_vec();
        chain.extend(self.middlewares.iter().cloned());

        CompiledRouter {
            handlers: self
                .handlers
                .iter()
                .map(|(method, handler)| {
                    (method.clone(), middleware::apply(&chain, handler.clone()))
                })
                .collect(),
            statics: self
                .statics
                .iter()
                .map(|(segment, child)| (segment.clone(), child.compile(&chain)))
                .collect(),
            params: self
                .params
                .iter()
                .map(|(name, child)| (name.clone(), child.compile(&chain)))
                .collect(),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Canonical display form of a registration path.
fn pattern(path: &str) -> String {
    let segments = split_path(path);
    if segments.is_empty() {
        return "/".to_string();
    }
    segments.iter().map(|s| format!("/{}", s)).collect()
}
