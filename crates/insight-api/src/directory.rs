//! Inode directory client
//!
//! The directory API follows PostgREST conventions: rows are filtered with
//! `column=op.value` query parameters, creation echoes the new row when asked
//! with `Prefer: return=representation`, and errors come back as
//! `{code, message}` with PostgreSQL error codes.

use insight_core::domain::{ClientError, Inode, InodeId, InodeName, NewInode};
use insight_core::ports::IInodeDirectory;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::http::AuthenticatedClient;

const INODES: &str = "inodes";

/// PostgreSQL `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// Filter selecting children of `parent_id`, or root entries
fn parent_filter(parent_id: Option<&InodeId>) -> String {
    match parent_id {
        Some(id) => eq(id.as_str()),
        None => "is.null".to_string(),
    }
}

/// Client for `/inodes`
#[derive(Clone)]
pub struct InodeDirectoryClient {
    http: AuthenticatedClient,
}

impl InodeDirectoryClient {
    pub fn new(http: AuthenticatedClient) -> Self {
        Self { http }
    }

    async fn fetch_rows(&self, query: &[(&str, String)]) -> Result<Vec<Inode>, ClientError> {
        let request = self.http.request(Method::GET, INODES)?.query(query);
        let response = self.http.send(request).await?;
        if response.status() != StatusCode::OK {
            return Err(error_from_response(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::api(200, format!("invalid inode list: {e}")))
    }

    async fn expect_no_content(&self, response: Response) -> Result<(), ClientError> {
        if response.status() == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Maps a non-success response to the error taxonomy
async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();

    let message = body
        .as_ref()
        .and_then(|b| b.message.clone())
        .or_else(|| body.as_ref().and_then(|b| b.details.clone()))
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text.clone()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED => ClientError::Auth(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        _ => ClientError::api(status.as_u16(), message),
    }
}

#[async_trait::async_trait]
impl IInodeDirectory for InodeDirectoryClient {
    async fn create(&self, inode: &NewInode) -> Result<Inode, ClientError> {
        let request = self
            .http
            .request(Method::POST, INODES)?
            .header("Prefer", "return=representation")
            .json(inode);
        let response = self.http.send(request).await?;

        if response.status() != StatusCode::CREATED {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();
            if body.as_ref().and_then(|b| b.code.as_deref()) == Some(UNIQUE_VIOLATION) {
                debug!(name = %inode.name, parent_id = ?inode.parent_id, "Inode already exists");
                return Err(ClientError::Conflict {
                    name: inode.name.to_string(),
                    parent_id: inode.parent_id.clone(),
                });
            }
            let message = body.and_then(|b| b.message).unwrap_or(text);
            return Err(match status {
                StatusCode::UNAUTHORIZED => ClientError::Auth(message),
                _ => ClientError::api(status.as_u16(), message),
            });
        }

        let rows: Vec<Inode> = response
            .json()
            .await
            .map_err(|e| ClientError::api(201, format!("invalid created inode: {e}")))?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::api(201, "create returned no representation"))?;

        info!(
            inode_id = %created.id,
            kind = %created.kind,
            path = %created.path,
            "Created inode"
        );
        Ok(created)
    }

    async fn lookup(
        &self,
        name: &InodeName,
        parent_id: Option<&InodeId>,
    ) -> Result<Inode, ClientError> {
        let rows = self
            .fetch_rows(&[
                ("name", eq(name.as_str())),
                ("parent_id", parent_filter(parent_id)),
            ])
            .await?;
        rows.into_iter().next().ok_or_else(|| {
            ClientError::NotFound(match parent_id {
                Some(parent) => format!("no inode named '{name}' in {parent}"),
                None => format!("no root inode named '{name}'"),
            })
        })
    }

    async fn list(&self, parent_id: Option<&InodeId>) -> Result<Vec<Inode>, ClientError> {
        self.fetch_rows(&[
            ("parent_id", parent_filter(parent_id)),
            ("order", "name.asc".to_string()),
        ])
        .await
    }

    async fn get(&self, id: &InodeId) -> Result<Inode, ClientError> {
        let rows = self.fetch_rows(&[("id", eq(id.as_str()))]).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("inode {id}")))
    }

    async fn mark_uploaded(&self, id: &InodeId) -> Result<(), ClientError> {
        let request = self
            .http
            .request(Method::PATCH, INODES)?
            .query(&[("id", eq(id.as_str()))])
            .json(&serde_json::json!({ "is_uploaded": true }));
        let response = self.http.send(request).await?;
        self.expect_no_content(response).await?;
        debug!(inode_id = %id, "Marked inode uploaded");
        Ok(())
    }

    async fn delete(&self, id: &InodeId) -> Result<(), ClientError> {
        let request = self
            .http
            .request(Method::DELETE, INODES)?
            .query(&[("id", eq(id.as_str()))]);
        let response = self.http.send(request).await?;
        self.expect_no_content(response).await?;
        info!(inode_id = %id, "Deleted inode");
        Ok(())
    }
}
