//! REST client against a mock HTTP server.

use pushgate_core::{DiscoveryError, GatewayResolver};
use pushgate_transport::rest::{Method, RestClient, RestError, Route};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

async fn client_for(server: &MockServer) -> RestClient {
    RestClient::new("tok").with_base_url(server.uri())
}

#[tokio::test]
async fn test_gateway_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .and(header("authorization", "Bot tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "wss://gateway.example.com",
            "shards": 1
        })))
        .mount(&server)
        .await;

    let url = client_for(&server).await.gateway_url().await.unwrap();
    assert_eq!(url, "wss://gateway.example.com");
}

#[tokio::test]
async fn test_unauthorized_maps_to_discovery_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client_for(&server).await.gateway_url().await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Unauthorized));
}

#[tokio::test]
async fn test_rate_limited_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-RateLimit-Limit", "2")
                .insert_header("X-RateLimit-Remaining", "0")
                .insert_header("X-RateLimit-Reset-After", "3.5")
                .insert_header("X-RateLimit-Bucket", "gw")
                .set_body_json(json!({"message": "You are being rate limited.", "retry_after": 3.5, "global": false})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .request::<(), Value>(&Route::GET_GATEWAY_BOT, &[], None)
        .await
        .unwrap_err();
    let RestError::RateLimited(limit) = err else {
        panic!("expected rate limit, got {err:?}");
    };
    assert_eq!(limit.limit, Some(2));
    assert_eq!(limit.remaining, Some(0));
    assert_eq!(limit.reset_after, Some(3.5));
    assert_eq!(limit.bucket.as_deref(), Some("gw"));
    assert_eq!(limit.retry_after, Some(3.5));
}

#[tokio::test]
async fn test_bad_gateway_and_generic_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"code": 50001, "message": "Missing Access"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .request::<(), Value>(&Route::GET_GATEWAY, &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::BadGateway));

    let err = client
        .request::<(), Value>(&Route::GET_GATEWAY_BOT, &[], None)
        .await
        .unwrap_err();
    let RestError::Status { status, code, message, .. } = err else {
        panic!("expected status error");
    };
    assert_eq!(status, 403);
    assert_eq!(code, 50001);
    assert_eq!(message, "Missing Access");
}

#[tokio::test]
async fn test_no_content_and_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/9/typing"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let route = Route::new(Method::Post, "/channels/{}/typing");
    let result: Option<Value> = client_for(&server)
        .await
        .request(&route, &[&9u64], Some(&json!({})))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_request_with_args_runs_on_spawned_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guilds/5/members/6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nick": "n"})))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let route = Route::new(Method::Get, "/guilds/{}/members/{}");
    let member: Value = tokio::spawn(async move {
        let guild = 5u64;
        client.request::<(), _>(&route, &[&guild, &"6"], None).await
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(member["nick"], "n");
}
