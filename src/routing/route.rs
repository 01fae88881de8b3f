//! Route descriptors and captured parameters.

use std::collections::HashMap;
use std::fmt;

use axum::http::Method;

/// Parameter name under which unmatched trailing segments are exposed.
pub const REST_PARAM: &str = "filepath";

/// Placeholder every parameter name is replaced with when comparing routes.
const PARAM_PLACEHOLDER: &str = ":PARAM:";

/// A registered (method, path pattern) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: String,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    /// Render a concrete path for this route.
    ///
    /// Every `:name` segment is replaced by the percent-escaped value of
    /// `params[name]`, or by `undefined` when the parameter is missing.
    pub fn url(&self, params: &Params) -> String {
        let mut url = String::new();
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            url.push('/');
            match segment.strip_prefix(':') {
                Some(name) => {
                    let value = params.get(name).unwrap_or("undefined");
                    url.push_str(&urlencoding::encode(value));
                }
                None => url.push_str(&urlencoding::encode(segment)),
            }
        }
        if url.is_empty() {
            url.push('/');
        }
        url
    }

    /// Method plus pattern with every parameter name erased.
    pub(crate) fn signature(&self) -> String {
        let mut signature = format!("{} ", self.method);
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            signature.push('/');
            if segment.starts_with(':') {
                signature.push_str(PARAM_PLACEHOLDER);
            } else {
                signature.push_str(segment);
            }
        }
        signature
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Parameters captured while resolving a request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// The rest-of-path capture, if the matched route consumed one.
    pub fn rest(&self) -> Option<&str> {
        self.get(REST_PARAM)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_method_and_path() {
        let route = Route::new(Method::GET, "/foo/:id");
        assert_eq!(route.to_string(), "GET /foo/:id");
    }

    #[test]
    fn url_escapes_values_and_marks_missing() {
        let route = Route::new(Method::GET, "/path/:missing/:present");
        let params: Params = [("present", "foo/bar")].into_iter().collect();
        assert_eq!(route.url(&params), "/path/undefined/foo%2Fbar");
    }

    #[test]
    fn url_of_root_route() {
        let route = Route::new(Method::GET, "/");
        assert_eq!(route.url(&Params::new()), "/");
    }

    #[test]
    fn signature_erases_parameter_names() {
        let a = Route::new(Method::GET, "/foo/:a/stuff");
        let b = Route::new(Method::GET, "/foo/:b/stuff");
        let c = Route::new(Method::POST, "/foo/:a/stuff");
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
    }
}
