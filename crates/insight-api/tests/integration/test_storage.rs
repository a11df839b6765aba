//! Object storage wired to the token manager: owner-scoped keys and
//! credentials that follow token refreshes

use std::sync::{Arc, Mutex};

use insight_api::storage::{StoreFactory, CONTENT_TYPE};
use insight_api::ObjectStorageClient;
use insight_core::domain::{ClientError, StorageCredentials};
use insight_core::ports::IObjectStorage;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, ObjectStore};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::*;

/// Hands out one shared in-memory store and records the access keys used
struct RecordingFactory {
    memory: Arc<InMemory>,
    access_keys: Mutex<Vec<String>>,
}

impl StoreFactory for RecordingFactory {
    fn build(&self, credentials: &StorageCredentials) -> Result<Arc<dyn ObjectStore>, ClientError> {
        self.access_keys
            .lock()
            .unwrap()
            .push(credentials.access_key.clone());
        Ok(self.memory.clone())
    }
}

async fn mount_sts(h: &Harness, access_token: &str, access_key: &str) {
    Mock::given(method("POST"))
        .and(path("/sts"))
        .and(body_string_contains(format!("WebIdentityToken={access_token}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(sts_xml(access_key)))
        .mount(&h.server)
        .await;
}

#[tokio::test]
async fn test_upload_is_scoped_to_token_subject() {
    let access = jwt("4f1c-user", "a");
    let h = harness(
        MemoryStore::with_tokens(&stored_tokens(&access, Some("r1"), 600)),
        None,
    )
    .await;
    mount_sts(&h, &access, "AK1").await;
    let memory = Arc::new(InMemory::new());
    let factory = Arc::new(RecordingFactory {
        memory: memory.clone(),
        access_keys: Mutex::new(Vec::new()),
    });
    let storage = ObjectStorageClient::new(h.manager.clone(), factory.clone());

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("a.pdf");
    std::fs::write(&local, b"%PDF-1.4").unwrap();

    let bytes = storage.upload("/docs/a.pdf", &local, false).await.unwrap();

    assert_eq!(bytes, 8);
    let object = memory
        .get(&ObjectPath::from("users/4f1c-user/docs/a.pdf"))
        .await
        .unwrap();
    let content_type: Option<&str> = object
        .attributes
        .get(&Attribute::ContentType)
        .map(AsRef::as_ref);
    assert_eq!(content_type, Some(CONTENT_TYPE));
    assert_eq!(*factory.access_keys.lock().unwrap(), vec!["AK1".to_string()]);
}

#[tokio::test]
async fn test_transfers_after_refresh_use_new_credentials() {
    let old = jwt("user-1", "old");
    let fresh = jwt("user-1", "new");
    let h = harness(
        MemoryStore::with_tokens(&stored_tokens(&old, Some("r1"), 600)),
        None,
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json(&fresh, Some("r2"))))
        .mount(&h.server)
        .await;
    mount_sts(&h, &old, "AK-old").await;
    mount_sts(&h, &fresh, "AK-new").await;
    let memory = Arc::new(InMemory::new());
    let factory = Arc::new(RecordingFactory {
        memory: memory.clone(),
        access_keys: Mutex::new(Vec::new()),
    });
    let storage = ObjectStorageClient::new(h.manager.clone(), factory.clone());

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("a.pdf");
    std::fs::write(&local, b"%PDF-1.4").unwrap();

    storage.upload("/a.pdf", &local, false).await.unwrap();
    h.manager.refresh_token(&old).await.unwrap();
    storage
        .download("/a.pdf", &dir.path().join("copy.pdf"))
        .await
        .unwrap();

    assert_eq!(
        *factory.access_keys.lock().unwrap(),
        vec!["AK-old".to_string(), "AK-new".to_string()]
    );
    assert_eq!(std::fs::read(dir.path().join("copy.pdf")).unwrap(), b"%PDF-1.4");
}
