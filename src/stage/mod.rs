//! Object-store staging area: listing what is already there and streaming new
//! files into it.

pub mod s3;
pub mod transfer;

use async_trait::async_trait;

use crate::error::Result;
use crate::identifier::{Identifier, LoadedFileRecord};

pub use s3::S3Store;
pub use transfer::{BatchSummary, TransferAgent, TransferReceipt};

/// A part accepted by the store during a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub number: i32,
    pub etag: String,
}

/// Destination's acknowledgement of a finished object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutAck {
    pub etag: Option<String>,
}

/// The calls the pipeline makes against a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Every key under `prefix`, across all result pages, in listing order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<PutAck>;

    /// Returns the upload id.
    async fn create_multipart(&self, key: &str) -> Result<String>;

    async fn upload_part(&self, key: &str, upload_id: &str, number: i32, body: Vec<u8>) -> Result<CompletedPart>;

    async fn complete_multipart(&self, key: &str, upload_id: &str, parts: Vec<CompletedPart>) -> Result<PutAck>;

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()>;

    fn identifier(&self, key: &str) -> Identifier {
        Identifier::object(self.bucket(), key)
    }
}

/// Object-store variant of the source lister: staged files as known records.
pub async fn list_staged(store: &dyn ObjectStore, prefix: &str) -> Result<Vec<LoadedFileRecord>> {
    Ok(store
        .list_keys(prefix)
        .await?
        .iter()
        .map(|key| LoadedFileRecord::staged(store.bucket(), key))
        .collect())
}
