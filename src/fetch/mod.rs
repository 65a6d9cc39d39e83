//! Remote sources: the trip-record download page and the weather API.

pub mod links;
pub mod weather;

use reqwest::Response;
use url::Url;

use crate::error::{PipelineError, Result};

/// Send-side failures and non-2xx statuses both become `Fetch` errors.
pub(crate) fn ensure_success(url: &Url, resp: reqwest::Result<Response>) -> Result<Response> {
    let resp = resp.map_err(|e| PipelineError::fetch(url, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(PipelineError::fetch(url, format!("status {}", status)));
    }
    Ok(resp)
}
