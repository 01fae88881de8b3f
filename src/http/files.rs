//! Static files below a document root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::http::content::serve_content;
use crate::http::error::HttpError;
use crate::http::handler::Handler;
use crate::http::render::render;
use crate::http::reply::Reply;
use crate::http::request::{Request, RequestHead};
use crate::http::sink::ResponseSink;
use crate::routing::split_path;

const INDEX_FILE: &str = "index.html";

/// Content type for a file name, from its extension.
pub fn guess_content_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "webmanifest" => "application/manifest+json",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => return None,
    };
    Some(content_type)
}

/// Resolve a URL path below `root`, refusing anything that would leave it.
pub fn map_path(root: &Path, url_path: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for component in Path::new(url_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(segment) => path.push(segment),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}

/// Serve the file at `path`, or its `index.html` when it is a directory.
pub(crate) async fn serve_file(
    head: &RequestHead,
    path: &Path,
    w: &mut dyn ResponseSink,
) -> Result<(), HttpError> {
    let mut path = path.to_path_buf();
    let mut metadata = tokio::fs::metadata(&path).await?;
    if metadata.is_dir() {
        path.push(INDEX_FILE);
        metadata = tokio::fs::metadata(&path).await?;
    }
    if !metadata.is_file() {
        return Err(HttpError::not_found());
    }

    let mut file = tokio::fs::File::open(&path).await?;
    let name = path.to_string_lossy();
    serve_content(head, &name, &mut file, None, metadata.modified().ok(), w).await
}

/// Fallback handler serving files from a document root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        map_path(&self.root, &split_path(url_path).join("/"))
    }
}

#[async_trait]
impl Handler for StaticFiles {
    async fn serve(&self, req: Request, w: &mut dyn ResponseSink) {
        let head = RequestHead::new(&req);
        let reply = match self.resolve(req.uri().path()) {
            Some(path) => Reply::File(path),
            None => Reply::Error(HttpError::not_found()),
        };
        render(&head, reply, w).await;
    }
}
