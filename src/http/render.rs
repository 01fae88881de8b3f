//! Response materializer.
//!
//! Turns a [`Reply`] into bytes on a [`ResponseSink`]. Every variant has
//! exactly one rendering path; failures that happen before the response
//! head is committed are rendered as the uniform error body, later ones can
//! only be logged.

use std::io::Cursor;

use axum::http::header::{CONTENT_TYPE, ETAG, LAST_MODIFIED};
use axum::http::{HeaderValue, StatusCode};

use crate::http::conditional::{evaluate, ConditionalOutcome, Validators};
use crate::http::content::serve_content;
use crate::http::error::HttpError;
use crate::http::files::serve_file;
use crate::http::reply::Reply;
use crate::http::request::RequestHead;
use crate::http::sink::ResponseSink;
use crate::proxy::ProxyClient;

const JSON: &str = "application/json";

/// Write `reply` as the response to the request described by `head`.
pub async fn render(head: &RequestHead, reply: Reply, w: &mut dyn ResponseSink) {
    let result = match reply {
        Reply::Proxy { request, target } => {
            let client = head.proxy.clone().unwrap_or_default();
            proxy(&client, head, request, &target, w).await
        }
        Reply::Redirect(location) => {
            HttpError::redirect(StatusCode::FOUND, location)
                .write_to(w)
                .await
                .map_err(HttpError::from)
        }
        Reply::File(path) => serve_file(head, &path, w).await,
        Reply::Bytes { data, content_type } => {
            let mut source = Cursor::new(data);
            let content_type = content_type.as_deref();
            serve_content(head, head.uri.path(), &mut source, content_type, None, w).await
        }
        Reply::Reader {
            mut source,
            content_type,
        } => {
            let content_type = content_type.as_deref();
            serve_content(head, head.uri.path(), &mut *source, content_type, None, w).await
        }
        Reply::Error(err) => err.write_to(w).await.map_err(HttpError::from),
        Reply::Stream(body) => {
            w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
            w.write_head(StatusCode::OK);
            if let Err(error) = body.write_to(w).await {
                tracing::warn!(%error, path = %head.uri.path(), "Object stream ended early");
            }
            Ok(())
        }
        Reply::Json { body, validators } => write_json(head, &body, &validators, w).await,
        Reply::Empty => {
            w.write_head(StatusCode::NO_CONTENT);
            Ok(())
        }
    };

    if let Err(err) = result {
        if w.status().is_none() {
            if let Err(error) = err.write_to(w).await {
                tracing::debug!(%error, "Failed to write error response");
            }
        } else {
            tracing::warn!(error = %err, path = %head.uri.path(), "Response failed after commit");
        }
    }
}

async fn proxy(
    client: &ProxyClient,
    head: &RequestHead,
    request: crate::http::request::Request,
    target: &url::Url,
    w: &mut dyn ResponseSink,
) -> Result<(), HttpError> {
    let response = client.forward(request, target, head.context.remote_addr()).await?;
    crate::proxy::copy_response(response, w).await
}

async fn write_json(
    head: &RequestHead,
    body: &[u8],
    validators: &Validators,
    w: &mut dyn ResponseSink,
) -> Result<(), HttpError> {
    let etag = validators
        .etag
        .as_deref()
        .and_then(|tag| HeaderValue::from_str(tag).ok());
    let last_modified = validators
        .last_modified
        .filter(|t| *t > std::time::SystemTime::UNIX_EPOCH)
        .and_then(|t| HeaderValue::from_str(&httpdate::fmt_http_date(t)).ok());

    match evaluate(&head.method, &head.headers, validators) {
        ConditionalOutcome::NotModified => {
            if let Some(etag) = etag {
                w.headers_mut().insert(ETAG, etag);
            }
            w.write_head(StatusCode::NOT_MODIFIED);
            return Ok(());
        }
        ConditionalOutcome::PreconditionFailed => return Err(HttpError::precondition_failed()),
        ConditionalOutcome::Conflict => return Err(HttpError::conflict()),
        ConditionalOutcome::Pass | ConditionalOutcome::NotApplicable => {}
    }

    let headers = w.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    if let Some(etag) = etag {
        headers.insert(ETAG, etag);
    }
    if let Some(last_modified) = last_modified {
        headers.insert(LAST_MODIFIED, last_modified);
    }
    w.write_head(StatusCode::OK);
    if head.method != axum::http::Method::HEAD {
        w.write(body).await?;
    }
    Ok(())
}
