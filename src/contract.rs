//! Collaborator interfaces for the upload pipeline.
//!
//! The sync engine, walker and lister only ever talk to the outside world
//! through the two traits in this module:
//!
//! - [`ObjectStore`]: the remote bucket (S3 in production, see [`crate::store`]).
//! - [`Filesystem`]: directory listing and file reads (see [`crate::local_fs`]).
//!
//! Both traits are annotated for `mockall`, so tests can drive the pipeline
//! with deterministic doubles. The mocks are exported behind the default
//! `test-export-mocks` feature for use from `tests/`.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Canned access policy applied to uploaded objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectAcl {
    Private,
    #[default]
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl ObjectAcl {
    /// Wire name of the canned ACL.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectAcl::Private => "private",
            ObjectAcl::PublicRead => "public-read",
            ObjectAcl::PublicReadWrite => "public-read-write",
            ObjectAcl::AuthenticatedRead => "authenticated-read",
            ObjectAcl::BucketOwnerRead => "bucket-owner-read",
            ObjectAcl::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

/// Parameters of one listing page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    /// Resume listing after this key.
    pub marker: Option<String>,
    pub max_keys: i32,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub is_truncated: bool,
    /// Explicit resume cursor. Some backends omit it even when truncated.
    pub next_marker: Option<String>,
}

/// Remote bucket operations the pipeline depends on.
///
/// Implementors map their transport failures onto [`StoreError`]. Wrap an
/// implementor in [`crate::resilience::ResilientStore`] to get retries and
/// circuit breaking.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Store `bytes` under `key`, overwriting whatever was there.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        acl: Option<ObjectAcl>,
    ) -> Result<(), StoreError>;

    /// Fetch an object's bytes. A missing key is [`StoreError::NotFound`].
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Fetch a single listing page.
    async fn list_objects(&self, bucket: &str, query: &ListQuery) -> Result<ListPage, StoreError>;

    /// Block until the backend confirms `key` does not exist.
    ///
    /// Fails with [`StoreError::Timeout`] if the key is still present after
    /// `timeout`. A zero timeout checks exactly once.
    async fn wait_for_absence(
        &self,
        bucket: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<(), StoreError>;
}

/// Local filesystem primitives used by the walker and the sync engine.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Names of the immediate entries of `path`.
    async fn list_directory(&self, path: &Path) -> std::io::Result<Vec<OsString>>;

    async fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}
