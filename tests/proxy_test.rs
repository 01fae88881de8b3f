//! Reverse proxy tests against a local echo upstream.

use axum::http::StatusCode;
use serde_json::Value;
use treeserve::http::RequestHead;
use treeserve::routing::REST_PARAM;
use treeserve::{reply_fn, HttpError, Reply, RequestExt, Server};
use url::Url;

mod common;

use common::{client, spawn_server, start_echo_backend, test_config};

#[tokio::test]
async fn default_proxy_forwards_unmatched_requests() {
    let backend = start_echo_backend().await;

    let mut config = test_config();
    config.default_proxy = Some(format!("http://{}/", backend));
    let server = spawn_server(Server::new(config).unwrap()).await;
    let host = server.addr.to_string();

    let res = client()
        .get(server.url("/api/items?page=2"))
        .header("x-forwarded-for", "10.0.0.1")
        .header("connection", "keep-alive, x-secret")
        .header("x-secret", "hop")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();

    assert_eq!(body["method"], "GET");
    assert_eq!(body["uri"], "/api/items?page=2");
    let headers = &body["headers"];
    assert_eq!(headers["x-forwarded-host"], host.as_str());
    assert_eq!(headers["x-forwarded-proto"], "http");
    assert_eq!(headers["x-real-ip"], "127.0.0.1");
    assert_eq!(headers["x-forwarded-for"], "10.0.0.1, 127.0.0.1");
    assert_eq!(
        headers["forwarded"],
        format!("for=\"127.0.0.1\";host=\"{}\";proto=http", host).as_str()
    );
    assert!(headers.get("x-secret").is_none());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn default_proxy_only_serves_get_and_head() {
    let backend = start_echo_backend().await;

    let mut config = test_config();
    config.default_proxy = Some(format!("http://{}/", backend));
    let server = spawn_server(Server::new(config).unwrap()).await;

    let res = client().post(server.url("/api/items")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn handlers_can_reply_with_a_proxy() {
    let backend = start_echo_backend().await;
    let upstream = Url::parse(&format!("http://{}/v2/", backend)).unwrap();

    let mut server = Server::new(test_config()).unwrap();
    server
        .post(
            "/gateway",
            reply_fn(move |req| {
                let upstream = upstream.clone();
                async move {
                    let rest = req.param(REST_PARAM).unwrap_or_default().to_string();
                    let target = upstream.join(&rest).map_err(|e| {
                        HttpError::bad_request()
                            .with_message("Invalid proxy URL")
                            .with_source(e)
                    })?;
                    Ok::<_, HttpError>(Reply::proxy(req, target))
                }
            }),
        )
        .unwrap();
    let server = spawn_server(server).await;

    let res = client()
        .post(server.url("/gateway/orders/7"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["uri"], "/v2/orders/7");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn unreachable_upstream_is_a_bad_gateway() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let mut config = test_config();
    config.default_proxy = Some(format!("http://{}/", addr));
    let server = spawn_server(Server::new(config).unwrap()).await;

    let res = client().get(server.url("/anything")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], 502);

    server.stop().await.unwrap();
}

#[test]
fn request_head_keeps_method_and_uri() {
    let req = axum::http::Request::builder()
        .method("PUT")
        .uri("/a/b?c=d")
        .body(axum::body::Body::empty())
        .unwrap();
    let head = RequestHead::new(&req);
    assert_eq!(head.method, "PUT");
    assert_eq!(head.uri.path(), "/a/b");
    assert!(!head.is_get_or_head());
}
