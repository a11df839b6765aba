//! Integration tests for insight-api
//!
//! Uses wiremock to simulate the identity provider, the federation endpoint
//! and the directory API, and an in-memory object store for file contents.


mod test_auth;
mod test_directory;
mod test_http_retry;
mod test_storage;
