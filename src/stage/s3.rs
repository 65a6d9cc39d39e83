use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::{
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart},
    Client,
};
use tracing::{debug, instrument};

use super::{CompletedPart, ObjectStore, PutAck};
use crate::error::{PipelineError, Result};

/// Shared AWS configuration for S3 and Secrets Manager clients.
pub async fn load_aws_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// One bucket behind the AWS SDK.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn from_config(sdk: &SdkConfig, bucket: impl Into<String>) -> Self {
        Self::new(Client::new(sdk), bucket)
    }

    fn rejected(&self, key: &str, err: impl std::error::Error) -> PipelineError {
        PipelineError::transfer(
            format!("s3://{}/{}", self.bucket, key),
            DisplayErrorContext(err),
        )
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(level = "debug", skip(self), fields(bucket = %self.bucket))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                PipelineError::fetch(
                    format!("s3://{}/{}", self.bucket, prefix),
                    DisplayErrorContext(e),
                )
            })?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );
        }
        debug!(count = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<PutAck> {
        let out = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| self.rejected(key, e))?;
        Ok(PutAck {
            etag: out.e_tag().map(str::to_string),
        })
    }

    async fn create_multipart(&self, key: &str) -> Result<String> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.rejected(key, e))?;
        out.upload_id()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::transfer(key, "no upload id returned"))
    }

    async fn upload_part(&self, key: &str, upload_id: &str, number: i32, body: Vec<u8>) -> Result<CompletedPart> {
        let out = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| self.rejected(key, e))?;
        let etag = out
            .e_tag()
            .ok_or_else(|| PipelineError::transfer(key, format!("part {} has no ETag", number)))?;
        Ok(CompletedPart {
            number,
            etag: etag.to_string(),
        })
    }

    async fn complete_multipart(&self, key: &str, upload_id: &str, parts: Vec<CompletedPart>) -> Result<PutAck> {
        let parts = parts
            .into_iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .part_number(p.number)
                    .e_tag(p.etag)
                    .build()
            })
            .collect();
        let out = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(|e| self.rejected(key, e))?;
        Ok(PutAck {
            etag: out.e_tag().map(str::to_string),
        })
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| self.rejected(key, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::Credentials;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn listing(keys: &[&str], next: Option<&str>) -> String {
        let contents: String = keys
            .iter()
            .map(|k| format!("<Contents><Key>{}</Key><Size>7</Size></Contents>", k))
            .collect();
        let truncation = match next {
            Some(token) => format!(
                "<IsTruncated>true</IsTruncated><NextContinuationToken>{}</NextContinuationToken>",
                token
            ),
            None => "<IsTruncated>false</IsTruncated>".to_string(),
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>my-nyc-yellowtaxi</Name><Prefix></Prefix><KeyCount>{}</KeyCount><MaxKeys>1000</MaxKeys>{}{}</ListBucketResult>"#,
            keys.len(),
            truncation,
            contents
        )
    }

    fn store_at(server: &MockServer) -> S3Store {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(server.uri())
            .force_path_style(true)
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .build();
        S3Store::new(Client::from_conf(conf), "my-nyc-yellowtaxi")
    }

    #[tokio::test]
    async fn test_list_keys_follows_continuation_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/my-nyc-yellowtaxi/"))
            .and(query_param("list-type", "2"))
            .and(query_param("continuation-token", "page-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/xml")
                    .set_body_string(listing(&["yellow_tripdata_2024-08.parquet"], None)),
            )
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/my-nyc-yellowtaxi/"))
            .and(query_param("list-type", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/xml")
                    .set_body_string(listing(
                        &["yellow_tripdata_2024-06.parquet", "yellow_tripdata_2024-07.parquet"],
                        Some("page-2"),
                    )),
            )
            .expect(1)
            .mount(&server)
            .await;

        let keys = store_at(&server).list_keys("").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "yellow_tripdata_2024-06.parquet",
                "yellow_tripdata_2024-07.parquet",
                "yellow_tripdata_2024-08.parquet",
            ]
        );
    }

    #[tokio::test]
    async fn test_list_denied_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/my-nyc-yellowtaxi/"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("content-type", "application/xml")
                    .set_body_string(
                        "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
                    ),
            )
            .mount(&server)
            .await;

        let err = store_at(&server).list_keys("").await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    fn offline_store() -> S3Store {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        S3Store::new(Client::from_conf(conf), "my-nyc-yellowtaxi")
    }

    #[test]
    fn test_identifier_uses_bucket() {
        let store = offline_store();
        assert_eq!(
            store.identifier("yellow_tripdata_2024-06.parquet").as_str(),
            "s3://my-nyc-yellowtaxi/yellow_tripdata_2024-06.parquet"
        );
    }
}
