//! Refresh-and-retry behavior of the authenticated client

use std::sync::Arc;

use insight_api::{AuthenticatedClient, InodeDirectoryClient};
use insight_core::domain::{ClientError, InodeId};
use insight_core::ports::IInodeDirectory;
use reqwest::{Method, StatusCode};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{request_count, CountingTokens};

async fn client() -> (MockServer, Arc<CountingTokens>, AuthenticatedClient) {
    let server = MockServer::start().await;
    let tokens = Arc::new(CountingTokens::default());
    let client = AuthenticatedClient::new(&format!("{}/api", server.uri()), tokens.clone()).unwrap();
    (server, tokens, client)
}

#[tokio::test]
async fn test_401_refreshes_once_and_retries() {
    let (server, tokens, client) = client().await;
    Mock::given(method("GET"))
        .and(path("/api/inodes"))
        .and(header("Authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/inodes"))
        .and(header("Authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let response = client
        .send(client.request(Method::GET, "inodes").unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(tokens.refreshes(), 1);
}

#[tokio::test]
async fn test_second_401_is_returned_without_another_refresh() {
    let (server, tokens, client) = client().await;
    Mock::given(method("GET"))
        .and(path("/api/inodes"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let response = client
        .send(client.request(Method::GET, "inodes").unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(tokens.refreshes(), 1);
    assert_eq!(request_count(&server, "/api/inodes").await, 2);
}

#[tokio::test]
async fn test_retry_replays_request_body() {
    let (server, _tokens, client) = client().await;
    Mock::given(method("POST"))
        .and(path("/api/inodes"))
        .and(header("Authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/inodes"))
        .and(header("Authorization", "Bearer t2"))
        .and(wiremock::matchers::body_json(serde_json::json!({ "name": "docs" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let request = client
        .request(Method::POST, "inodes")
        .unwrap()
        .json(&serde_json::json!({ "name": "docs" }));
    let response = client.send(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_401_from_another_host_does_not_refresh() {
    let (_server, tokens, client) = client().await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/inodes"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&other)
        .await;

    let request = client.inner().get(format!("{}/api/inodes", other.uri()));
    let response = client.send(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(tokens.refreshes(), 0);
}

#[tokio::test]
async fn test_401_outside_api_path_does_not_refresh() {
    let (server, tokens, client) = client().await;
    Mock::given(method("GET"))
        .and(path("/other/resource"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let request = client.inner().get(format!("{}/other/resource", server.uri()));
    let response = client.send(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(tokens.refreshes(), 0);
}

#[tokio::test]
async fn test_persistent_401_surfaces_as_auth_error() {
    let (server, tokens, client) = client().await;
    Mock::given(method("GET"))
        .and(path("/api/inodes"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": "PGRST301",
            "message": "JWT expired",
        })))
        .mount(&server)
        .await;
    let directory = InodeDirectoryClient::new(client);

    let err = directory.get(&InodeId::new("i-1").unwrap()).await.unwrap_err();

    match err {
        ClientError::Auth(message) => assert_eq!(message, "JWT expired"),
        other => panic!("expected auth error, got {other:?}"),
    }
    assert_eq!(tokens.refreshes(), 1);
}
