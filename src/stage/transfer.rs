use futures::StreamExt;
use reqwest::{Client, Response};
use tokio::time::Instant;
use tracing::{error, info, warn};
use url::Url;

use super::ObjectStore;
use crate::error::{PipelineError, Result};
use crate::identifier::{Identifier, RemoteFileRef};

/// S3 rejects non-final multipart parts smaller than this.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub key: String,
    pub identifier: Identifier,
    pub bytes: u64,
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTransfer {
    pub identifier: Identifier,
    pub reason: String,
}

/// Outcome of a best-effort batch: some items may land, some may not.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub transferred: Vec<TransferReceipt>,
    pub failed: Vec<FailedTransfer>,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Streams HTTP bodies into an object store, holding at most one part in memory.
pub struct TransferAgent<'a> {
    http: &'a Client,
    store: &'a dyn ObjectStore,
    part_size: usize,
}

impl<'a> TransferAgent<'a> {
    pub fn new(http: &'a Client, store: &'a dyn ObjectStore, part_size: usize) -> Self {
        Self {
            http,
            store,
            part_size: part_size.max(MIN_PART_SIZE),
        }
    }

    /// Copy each item in turn. A failed item is logged and recorded, never fatal.
    pub async fn transfer_batch(&self, items: &[RemoteFileRef]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for item in items {
            let start = Instant::now();
            match self.transfer_url(&item.source_url, &item.key).await {
                Ok(receipt) => {
                    info!(
                        url = %item.source_url,
                        key = %receipt.key,
                        bytes = receipt.bytes,
                        elapsed = ?start.elapsed(),
                        "New file uploaded to S3"
                    );
                    summary.transferred.push(receipt);
                }
                Err(e) => {
                    error!(url = %item.source_url, error = %e, "upload failed, moving on");
                    summary.failed.push(FailedTransfer {
                        identifier: item.identifier.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        summary
    }

    /// GET `url` and stream the body to `key`.
    pub async fn transfer_url(&self, url: &Url, key: &str) -> Result<TransferReceipt> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PipelineError::transfer(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::transfer(
                url,
                format!("source returned status {}", status),
            ));
        }
        self.transfer_response(resp, key).await
    }

    /// Stream an already-successful response to `key`. A started multipart
    /// upload is aborted if anything fails before completion.
    pub async fn transfer_response(&self, resp: Response, key: &str) -> Result<TransferReceipt> {
        let mut upload_id = None;
        let result = self.stream_into(resp, key, &mut upload_id).await;
        if result.is_err() {
            if let Some(id) = upload_id {
                if let Err(e) = self.store.abort_multipart(key, &id).await {
                    warn!(key, error = %e, "could not abort multipart upload");
                }
            }
        }
        result
    }

    async fn stream_into(
        &self,
        resp: Response,
        key: &str,
        upload_id: &mut Option<String>,
    ) -> Result<TransferReceipt> {
        let mut body = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::with_capacity(self.part_size);
        let mut parts = Vec::new();
        let mut bytes = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| PipelineError::transfer(key, format!("reading source body: {}", e)))?;
            bytes += chunk.len() as u64;
            buf.extend_from_slice(&chunk);

            while buf.len() >= self.part_size {
                let rest = buf.split_off(self.part_size);
                let part = std::mem::replace(&mut buf, rest);
                let id = match upload_id.as_ref() {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.store.create_multipart(key).await?;
                        *upload_id = Some(id.clone());
                        id
                    }
                };
                let number = parts.len() as i32 + 1;
                parts.push(self.store.upload_part(key, &id, number, part).await?);
            }
        }

        let ack = match upload_id.as_deref() {
            // small enough for a single request
            None => self.store.put_object(key, buf).await?,
            Some(id) => {
                if !buf.is_empty() {
                    let number = parts.len() as i32 + 1;
                    parts.push(self.store.upload_part(key, id, number, buf).await?);
                }
                self.store.complete_multipart(key, id, parts).await?
            }
        };

        let etag = ack
            .etag
            .ok_or_else(|| PipelineError::transfer(key, "destination did not confirm the write"))?;
        Ok(TransferReceipt {
            key: key.to_string(),
            identifier: self.store.identifier(key),
            bytes,
            etag,
        })
    }
}
