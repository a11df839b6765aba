//! Token lifecycle tests: device flow, machine grant, refresh and storage
//! credential derivation

use std::time::Duration;

use insight_api::auth::SessionPhase;
use insight_core::domain::ClientError;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::*;

fn pending() -> ResponseTemplate {
    oauth_error("authorization_pending")
}

// ============================================================================
// Device authorization
// ============================================================================

#[tokio::test]
async fn test_device_flow_completes_after_pending_polls() {
    let h = harness(MemoryStore::default(), None).await;
    mount_device_authorization(&h.server, 300, 5).await;
    mount_device_poll(&h.server, pending(), Some(2)).await;
    let access = jwt("user-1", "a");
    mount_device_poll(
        &h.server,
        ResponseTemplate::new(200).set_body_json(token_json(&access, Some("r1"))),
        None,
    )
    .await;

    let tokens = h.manager.ensure_token().await.unwrap();

    assert_eq!(tokens.access_token, access);
    assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
    assert_eq!(h.store.tokens().unwrap().access_token, access);
    assert_eq!(h.manager.phase().await, SessionPhase::Valid);
    assert_eq!(request_count(&h.server, "/token").await, 3);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(5), Duration::from_secs(5)]
    );

    let urls = h.prompt.urls.lock().unwrap().clone();
    assert_eq!(urls, vec![format!("{}/device?user_code=WDJB-MJHT", h.server.uri())]);
}

#[tokio::test]
async fn test_device_flow_stops_polling_at_expiry() {
    let h = harness(MemoryStore::default(), None).await;
    mount_device_authorization(&h.server, 30, 5).await;
    mount_device_poll(&h.server, pending(), None).await;

    let err = h.manager.ensure_token().await.unwrap_err();

    assert!(matches!(err, ClientError::AcquisitionTimeout));
    // Polls at t = 0, 5, ..., 30; none after the deadline
    assert_eq!(request_count(&h.server, "/token").await, 7);
    assert!(h.store.tokens().is_none());
    assert_eq!(h.manager.phase().await, SessionPhase::NoToken);
}

#[tokio::test]
async fn test_slow_down_widens_the_polling_interval() {
    let h = harness(MemoryStore::default(), None).await;
    mount_device_authorization(&h.server, 300, 5).await;
    mount_device_poll(&h.server, oauth_error("slow_down"), Some(1)).await;
    mount_device_poll(&h.server, pending(), Some(1)).await;
    mount_device_poll(
        &h.server,
        ResponseTemplate::new(200).set_body_json(token_json(&jwt("user-1", "a"), None)),
        None,
    )
    .await;

    h.manager.ensure_token().await.unwrap();

    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(10), Duration::from_secs(10)]
    );
}

#[tokio::test]
async fn test_access_denied_is_surfaced() {
    let h = harness(MemoryStore::default(), None).await;
    mount_device_authorization(&h.server, 300, 5).await;
    mount_device_poll(&h.server, oauth_error("access_denied"), None).await;

    let err = h.manager.ensure_token().await.unwrap_err();

    assert!(matches!(err, ClientError::AccessDenied));
    assert_eq!(request_count(&h.server, "/token").await, 1);
}

#[tokio::test]
async fn test_unexpected_poll_error_is_fatal() {
    let h = harness(MemoryStore::default(), None).await;
    mount_device_authorization(&h.server, 300, 5).await;
    mount_device_poll(&h.server, oauth_error("invalid_client"), None).await;

    let err = h.manager.ensure_token().await.unwrap_err();

    match err {
        ClientError::Auth(message) => assert!(message.contains("invalid_client")),
        other => panic!("expected auth error, got {other:?}"),
    }
    assert_eq!(request_count(&h.server, "/token").await, 1);
    assert!(h.clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_expired_token_response_is_timeout() {
    let h = harness(MemoryStore::default(), None).await;
    mount_device_authorization(&h.server, 300, 5).await;
    mount_device_poll(&h.server, oauth_error("expired_token"), None).await;

    let err = h.manager.ensure_token().await.unwrap_err();

    assert!(matches!(err, ClientError::AcquisitionTimeout));
}

// ============================================================================
// Machine grant and stored tokens
// ============================================================================

#[tokio::test]
async fn test_client_secret_uses_machine_grant_without_prompt() {
    let h = harness(MemoryStore::default(), Some("s3cret")).await;
    let access = jwt("service-account", "m");
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json(&access, None)))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/device"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let tokens = h.manager.ensure_token().await.unwrap();

    assert_eq!(tokens.access_token, access);
    assert!(!tokens.is_interactive());
    assert!(h.prompt.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_valid_stored_token_is_used_without_network() {
    let stored = stored_tokens(&jwt("user-1", "stored"), Some("r1"), 600);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;

    let tokens = h.manager.ensure_token().await.unwrap();

    assert_eq!(tokens.access_token, stored.access_token);
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_stored_token_is_refreshed_and_persisted() {
    let stored = stored_tokens(&jwt("user-1", "old"), Some("r1"), -60);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    let fresh = jwt("user-1", "new");
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json(&fresh, Some("r2"))))
        .expect(1)
        .mount(&h.server)
        .await;

    let tokens = h.manager.ensure_token().await.unwrap();

    assert_eq!(tokens.access_token, fresh);
    let persisted = h.store.tokens().unwrap();
    assert_eq!(persisted.access_token, fresh);
    assert_eq!(persisted.refresh_token.as_deref(), Some("r2"));
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_none_is_returned() {
    let stored = stored_tokens(&jwt("user-1", "old"), Some("r1"), -60);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json(&jwt("user-1", "new"), None)),
        )
        .mount(&h.server)
        .await;

    let tokens = h.manager.ensure_token().await.unwrap();

    assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_invalid_grant_falls_back_to_new_authorization() {
    let stored = stored_tokens(&jwt("user-1", "old"), Some("revoked"), -60);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(oauth_error("invalid_grant"))
        .expect(1)
        .mount(&h.server)
        .await;
    mount_device_authorization(&h.server, 300, 5).await;
    let access = jwt("user-1", "reauth");
    mount_device_poll(
        &h.server,
        ResponseTemplate::new(200).set_body_json(token_json(&access, Some("r9"))),
        None,
    )
    .await;

    let tokens = h.manager.ensure_token().await.unwrap();

    assert_eq!(tokens.access_token, access);
    assert_eq!(h.prompt.urls.lock().unwrap().len(), 1);
    assert_eq!(h.store.tokens().unwrap().refresh_token.as_deref(), Some("r9"));
}

#[tokio::test]
async fn test_refresh_server_error_is_terminal() {
    let stored = stored_tokens(&jwt("user-1", "old"), Some("r1"), -60);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let err = h.manager.ensure_token().await.unwrap_err();

    assert!(matches!(err, ClientError::Auth(_)));
    assert_eq!(h.manager.phase().await, SessionPhase::ExpiredTerminal);
    // The stored record is untouched until a replacement is installed
    assert_eq!(h.store.tokens().unwrap().access_token, stored.access_token);
}

#[tokio::test]
async fn test_refresh_with_stale_token_reuses_newer_one() {
    let stored = stored_tokens(&jwt("user-1", "current"), Some("r1"), 600);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    h.manager.ensure_token().await.unwrap();

    let tokens = h.manager.refresh_token("some-older-token").await.unwrap();

    assert_eq!(tokens.access_token, stored.access_token);
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_logout_clears_stored_token() {
    let stored = stored_tokens(&jwt("user-1", "a"), Some("r1"), 600);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    h.manager.ensure_token().await.unwrap();

    h.manager.logout().await;

    assert!(h.store.tokens().is_none());
    assert!(h.manager.status().unwrap().is_none());
    assert_eq!(h.manager.phase().await, SessionPhase::NoToken);
}

// ============================================================================
// Storage credentials
// ============================================================================

#[tokio::test]
async fn test_storage_credentials_are_cached_per_access_token() {
    let access = jwt("user-1", "a");
    let stored = stored_tokens(&access, Some("r1"), 600);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    Mock::given(method("POST"))
        .and(path("/sts"))
        .and(body_string_contains("Action=AssumeRoleWithWebIdentity"))
        .and(body_string_contains("RoleSessionName=user-1"))
        .and(body_string_contains(format!("WebIdentityToken={access}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(sts_xml("AK1")))
        .expect(1)
        .mount(&h.server)
        .await;

    let first = h.manager.storage_credentials().await.unwrap();
    let second = h.manager.storage_credentials().await.unwrap();

    assert_eq!(first.subject, "user-1");
    assert_eq!(first.credentials.access_key, "AK1");
    assert_eq!(second.credentials.access_key, "AK1");
}

#[tokio::test]
async fn test_storage_credentials_are_rederived_after_refresh() {
    let old = jwt("user-1", "old");
    let stored = stored_tokens(&old, Some("r1"), 600);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    let fresh = jwt("user-1", "new");
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json(&fresh, Some("r2"))))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sts"))
        .and(body_string_contains(format!("WebIdentityToken={old}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(sts_xml("AK-old")))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sts"))
        .and(body_string_contains(format!("WebIdentityToken={fresh}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(sts_xml("AK-new")))
        .expect(1)
        .mount(&h.server)
        .await;

    let before = h.manager.storage_credentials().await.unwrap();
    h.manager.refresh_token(&old).await.unwrap();
    let after = h.manager.storage_credentials().await.unwrap();

    assert_eq!(before.credentials.access_key, "AK-old");
    assert_eq!(after.credentials.access_key, "AK-new");
}

#[tokio::test]
async fn test_rejected_federation_is_storage_error() {
    let stored = stored_tokens(&jwt("user-1", "a"), Some("r1"), 600);
    let h = harness(MemoryStore::with_tokens(&stored), None).await;
    Mock::given(method("POST"))
        .and(path("/sts"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            "<ErrorResponse><Error><Code>AccessDenied</Code><Message>Not authorized</Message></Error></ErrorResponse>",
        ))
        .mount(&h.server)
        .await;

    let err = h.manager.storage_credentials().await.unwrap_err();

    match err {
        ClientError::Storage(message) => assert!(message.contains("AccessDenied")),
        other => panic!("expected storage error, got {other:?}"),
    }
}
