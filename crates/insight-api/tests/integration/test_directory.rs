//! Directory client tests against a mock PostgREST-style API

use std::sync::Arc;

use insight_api::{AuthenticatedClient, InodeDirectoryClient};
use insight_core::domain::{ClientError, InodeId, InodeName, InodeType, NewInode};
use insight_core::ports::IInodeDirectory;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::CountingTokens;

async fn directory() -> (MockServer, InodeDirectoryClient) {
    let server = MockServer::start().await;
    let http = AuthenticatedClient::new(&server.uri(), Arc::new(CountingTokens::default())).unwrap();
    (server, InodeDirectoryClient::new(http))
}

fn row(id: &str, name: &str, kind: &str, parent: Option<&str>, path: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "type": kind,
        "parent_id": parent,
        "path": path,
        "is_public": false,
        "is_uploaded": kind == "folder",
    })
}

fn name(s: &str) -> InodeName {
    InodeName::new(s).unwrap()
}

fn id(s: &str) -> InodeId {
    InodeId::new(s).unwrap()
}

#[tokio::test]
async fn test_create_returns_representation() {
    let (server, directory) = directory().await;
    Mock::given(method("POST"))
        .and(path("/inodes"))
        .and(header("Prefer", "return=representation"))
        .and(header("Authorization", "Bearer t1"))
        .and(body_json(serde_json::json!({
            "name": "a.pdf",
            "type": "file",
            "parent_id": "f-1",
            "is_public": true,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([
            row("i-1", "a.pdf", "file", Some("f-1"), "/docs/a.pdf")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let created = directory
        .create(&NewInode::file(name("a.pdf"), Some(id("f-1")), true))
        .await
        .unwrap();

    assert_eq!(created.id, id("i-1"));
    assert_eq!(created.kind, InodeType::File);
    assert_eq!(created.path, "/docs/a.pdf");
    assert!(created.is_pending_upload());
}

#[tokio::test]
async fn test_create_unique_violation_is_conflict() {
    let (server, directory) = directory().await;
    Mock::given(method("POST"))
        .and(path("/inodes"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint",
        })))
        .mount(&server)
        .await;

    let err = directory
        .create(&NewInode::folder(name("docs"), None, false))
        .await
        .unwrap_err();

    match err {
        ClientError::Conflict { name, parent_id } => {
            assert_eq!(name, "docs");
            assert!(parent_id.is_none());
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_other_failure_carries_status_and_message() {
    let (server, directory) = directory().await;
    Mock::given(method("POST"))
        .and(path("/inodes"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": "22P02",
            "message": "invalid input syntax",
        })))
        .mount(&server)
        .await;

    let err = directory
        .create(&NewInode::folder(name("docs"), None, false))
        .await
        .unwrap_err();

    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid input syntax");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lookup_at_root_filters_on_null_parent() {
    let (server, directory) = directory().await;
    Mock::given(method("GET"))
        .and(path("/inodes"))
        .and(query_param("name", "eq.docs"))
        .and(query_param("parent_id", "is.null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            row("f-1", "docs", "folder", None, "/docs")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let found = directory.lookup(&name("docs"), None).await.unwrap();

    assert_eq!(found.id, id("f-1"));
    assert!(found.is_folder());
}

#[tokio::test]
async fn test_lookup_missing_is_not_found() {
    let (server, directory) = directory().await;
    Mock::given(method("GET"))
        .and(path("/inodes"))
        .and(query_param("parent_id", "eq.f-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let err = directory
        .lookup(&name("missing.pdf"), Some(&id("f-1")))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn test_list_orders_by_name() {
    let (server, directory) = directory().await;
    Mock::given(method("GET"))
        .and(path("/inodes"))
        .and(query_param("parent_id", "eq.f-1"))
        .and(query_param("order", "name.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            row("i-1", "a.pdf", "file", Some("f-1"), "/docs/a.pdf"),
            row("f-2", "sub", "folder", Some("f-1"), "/docs/sub"),
        ])))
        .mount(&server)
        .await;

    let children = directory.list(Some(&id("f-1"))).await.unwrap();

    let names: Vec<_> = children.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "sub"]);
}

#[tokio::test]
async fn test_get_by_id() {
    let (server, directory) = directory().await;
    Mock::given(method("GET"))
        .and(path("/inodes"))
        .and(query_param("id", "eq.i-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            row("i-1", "a.pdf", "file", Some("f-1"), "/docs/a.pdf")
        ])))
        .mount(&server)
        .await;

    assert_eq!(directory.get(&id("i-1")).await.unwrap().name, "a.pdf");
}

#[tokio::test]
async fn test_mark_uploaded_patches_flag() {
    let (server, directory) = directory().await;
    Mock::given(method("PATCH"))
        .and(path("/inodes"))
        .and(query_param("id", "eq.i-1"))
        .and(body_json(serde_json::json!({ "is_uploaded": true })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    directory.mark_uploaded(&id("i-1")).await.unwrap();
}

#[tokio::test]
async fn test_mark_uploaded_requires_no_content() {
    let (server, directory) = directory().await;
    Mock::given(method("PATCH"))
        .and(path("/inodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let err = directory.mark_uploaded(&id("i-1")).await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 200, .. }));
}

#[tokio::test]
async fn test_delete() {
    let (server, directory) = directory().await;
    Mock::given(method("DELETE"))
        .and(path("/inodes"))
        .and(query_param("id", "eq.i-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    directory.delete(&id("i-1")).await.unwrap();
}

#[tokio::test]
async fn test_find_or_create_folder_resolves_conflict_by_lookup() {
    let (server, directory) = directory().await;
    Mock::given(method("POST"))
        .and(path("/inodes"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inodes"))
        .and(query_param("name", "eq.sub"))
        .and(query_param("parent_id", "eq.f-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            row("f-2", "sub", "folder", Some("f-1"), "/docs/sub")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = directory
        .find_or_create_folder(&name("sub"), Some(&id("f-1")), false)
        .await
        .unwrap();

    assert!(!outcome.was_created());
    assert_eq!(outcome.inode().id, id("f-2"));
}
