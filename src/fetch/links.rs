// src/fetch/links.rs
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::ensure_success;
use crate::error::{PipelineError, Result};

/// Which anchors on a page count as downloads.
#[derive(Debug, Clone)]
pub struct LinkFilter<'a> {
    /// Visible anchor text, compared after trimming.
    pub label: &'a str,
    /// Required ending of the resolved URL path, e.g. `.parquet`.
    pub extension: &'a str,
}

/// GET `page` once and return matching download links in document order.
#[instrument(level = "info", skip_all, fields(page = %page))]
pub async fn list_links(client: &Client, page: &Url, filter: &LinkFilter<'_>) -> Result<Vec<Url>> {
    let resp = ensure_success(page, client.get(page.clone()).send().await)?;
    let html = resp
        .text()
        .await
        .map_err(|e| PipelineError::fetch(page, e))?;

    let links = extract_links(&html, page, filter);
    debug!(count = links.len(), "download links found");
    Ok(links)
}

/// Parse `html`, resolving relative hrefs against `base`.
pub fn extract_links(html: &str, base: &Url, filter: &LinkFilter<'_>) -> Vec<Url> {
    let selector = Selector::parse("a[href]").expect("anchor selector should parse");
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter(|a| a.text().collect::<String>().trim() == filter.label)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| url.path().ends_with(filter.extension))
        .collect()
}
