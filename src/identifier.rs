//! Canonical file identifiers.
//!
//! Every file the pipeline compares, whether listed from a webpage, an S3
//! prefix or the warehouse's copy history, is reduced to one shape here: the
//! full `s3://bucket/key` URI it lives (or would live) under. Nothing else in
//! the crate builds these strings by hand.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use url::Url;

use crate::error::{PipelineError, Result};

const S3_SCHEME: &str = "s3://";

/// Bare bucket name: config may carry a scheme or trailing slash.
fn bucket_name(bucket: &str) -> &str {
    bucket.trim_start_matches(S3_SCHEME).trim_end_matches('/')
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Identifier(String);

impl Identifier {
    /// `s3://{bucket}/{key}`.
    pub fn object(bucket: &str, key: &str) -> Self {
        Identifier(format!(
            "{}{}/{}",
            S3_SCHEME,
            bucket_name(bucket),
            key.trim_start_matches('/')
        ))
    }

    /// Build from a copy-history row. `file_name` is either already a full
    /// URI or a path relative to `stage_location`.
    pub fn from_stage_file(stage_location: &str, file_name: &str) -> Self {
        if file_name.starts_with(S3_SCHEME) {
            return Identifier(file_name.to_string());
        }
        let location = stage_location.trim_start_matches(S3_SCHEME);
        let (bucket, prefix) = location.split_once('/').unwrap_or((location, ""));
        let prefix = prefix.trim_matches('/');
        let key = if prefix.is_empty() {
            file_name.trim_start_matches('/').to_string()
        } else {
            format!("{}/{}", prefix, file_name.trim_start_matches('/'))
        };
        Identifier::object(bucket, &key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Object key inside `bucket`, or `None` for another bucket.
    pub fn key_in(&self, bucket: &str) -> Option<&str> {
        let head = format!("{}{}/", S3_SCHEME, bucket_name(bucket));
        self.0.strip_prefix(head.as_str())
    }

    /// Path relative to a stage rooted at `bucket`/`prefix`, as a `FILES` entry expects.
    pub fn relative_to(&self, bucket: &str, prefix: &str) -> Option<&str> {
        self.key_in(bucket)?.strip_prefix(prefix)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything that can take part in a novelty comparison.
pub trait Identified {
    fn identifier(&self) -> &Identifier;
}

impl Identified for Identifier {
    fn identifier(&self) -> &Identifier {
        self
    }
}

/// Last non-empty path segment of a URL, taken verbatim.
pub fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
}

/// Flat layout: `{prefix}{filename}`.
pub fn flat_key(prefix: &str, filename: &str) -> String {
    format!("{}{}", prefix, filename)
}

/// Dated layout: `{YYYY-MM}/{filename}`.
pub fn dated_key(date: NaiveDate, filename: &str) -> String {
    format!("{}/{}", date.format("%Y-%m"), filename)
}

/// A file published at a remote source, paired with where it would be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRef {
    pub source_url: Url,
    pub filename: String,
    pub key: String,
    pub identifier: Identifier,
}

impl RemoteFileRef {
    /// Map a source URL onto the flat `{prefix}{filename}` layout of `bucket`.
    pub fn staged_at(source_url: Url, bucket: &str, prefix: &str) -> Result<Self> {
        let filename = filename_from_url(&source_url)
            .ok_or_else(|| PipelineError::fetch(&source_url, "link has no file name"))?;
        let key = flat_key(prefix, &filename);
        let identifier = Identifier::object(bucket, &key);
        Ok(Self {
            source_url,
            filename,
            key,
            identifier,
        })
    }
}

impl Identified for RemoteFileRef {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }
}

/// Where a known identifier was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    Staged,
    CopyHistory,
}

/// An identifier already present at a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFileRecord {
    pub identifier: Identifier,
    pub origin: RecordOrigin,
}

impl LoadedFileRecord {
    pub fn staged(bucket: &str, key: &str) -> Self {
        Self {
            identifier: Identifier::object(bucket, key),
            origin: RecordOrigin::Staged,
        }
    }

    pub fn copied(stage_location: &str, file_name: &str) -> Self {
        Self {
            identifier: Identifier::from_stage_file(stage_location, file_name),
            origin: RecordOrigin::CopyHistory,
        }
    }
}

impl Identified for LoadedFileRecord {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }
}
