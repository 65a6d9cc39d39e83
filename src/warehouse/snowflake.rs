use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::{QueryResult, Warehouse};
use crate::error::{PipelineError, Result};
use crate::secrets::WarehouseCredentials;

const CLIENT_APP_ID: &str = "taxi-pipeline";

/// Codes for a statement that outlived the synchronous wait and must be polled.
const QUERY_IN_PROGRESS: [&str; 2] = ["333333", "333334"];
const POLL_START: Duration = Duration::from_millis(250);
const POLL_MAX: Duration = Duration::from_secs(5);

/// A logged-in Snowflake session over the REST connector protocol.
pub struct SnowflakeSession {
    http: Client,
    base: Url,
    token: Option<String>,
    sequence: u64,
    statement_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    code: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn in_progress(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| QUERY_IN_PROGRESS.contains(&code))
    }

    fn failure(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => format!("{} ({})", msg, code),
            (None, Some(msg)) => msg.clone(),
            (Some(code), None) => format!("error code {}", code),
            (None, None) => "request was not successful".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryData {
    rowtype: Vec<RowType>,
    rowset: Vec<Vec<Option<String>>>,
    rowset_base64: Option<String>,
    chunks: Vec<Chunk>,
    chunk_headers: Option<HashMap<String, String>>,
    qrmk: Option<String>,
    get_result_url: Option<String>,
}

/// `https://{account}.snowflakecomputing.com`, unless overridden.
pub fn account_url(account: &str, base_url: Option<&str>) -> Result<Url> {
    let raw = match base_url {
        Some(url) => url.to_string(),
        None => format!("https://{}.snowflakecomputing.com", account),
    };
    Url::parse(&raw).map_err(|e| PipelineError::Configuration(format!("warehouse URL {}: {}", raw, e)))
}

impl SnowflakeSession {
    #[instrument(level = "info", skip_all, fields(account = %creds.account))]
    pub async fn connect(
        http: Client,
        base: Url,
        creds: &WarehouseCredentials,
        statement_timeout: Duration,
    ) -> Result<Self> {
        let mut login = base
            .join("/session/v1/login-request")
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        login
            .query_pairs_mut()
            .append_pair("warehouse", &creds.warehouse)
            .append_pair("databaseName", &creds.database)
            .append_pair("schemaName", &creds.schema);

        let body = json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
                "ACCOUNT_NAME": creds.account,
                "LOGIN_NAME": creds.user,
                "PASSWORD": creds.password,
                "SESSION_PARAMETERS": { "QUERY_RESULT_FORMAT": "JSON" },
            }
        });

        let envelope: Envelope<LoginData> = send_json(http.post(login).json(&body))
            .await
            .map_err(PipelineError::Connection)?;
        if !envelope.success {
            return Err(PipelineError::Connection(envelope.failure()));
        }
        let token = envelope
            .data
            .and_then(|d| d.token)
            .ok_or_else(|| PipelineError::Connection("login response carried no session token".into()))?;

        info!("warehouse session opened");
        Ok(Self {
            http,
            base,
            token: Some(token),
            sequence: 0,
            statement_timeout,
        })
    }

    fn authorised(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .header(reqwest::header::AUTHORIZATION, format!("Snowflake Token=\"{}\"", token))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Poll `getResultUrl` until the statement finishes or the statement timeout passes.
    async fn await_result(&self, mut envelope: Envelope<QueryData>, token: &str) -> Result<Envelope<QueryData>> {
        let deadline = Instant::now() + self.statement_timeout;
        let mut delay = POLL_START;
        while envelope.in_progress() {
            let result_url = envelope
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.as_deref())
                .ok_or_else(|| PipelineError::Query("statement still running but no result URL was given".into()))?;
            let url = self
                .base
                .join(result_url)
                .map_err(|e| PipelineError::Query(format!("result URL {}: {}", result_url, e)))?;

            let now = Instant::now();
            if now >= deadline {
                return Err(PipelineError::Query(format!(
                    "statement still running after {:?}",
                    self.statement_timeout
                )));
            }
            debug!(%url, ?delay, "statement in progress; polling");
            sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(POLL_MAX);

            let req = self.authorised(self.http.get(url), token);
            envelope = send_json(req).await.map_err(PipelineError::Query)?;
        }
        Ok(envelope)
    }

    async fn fetch_chunk(&self, chunk: &Chunk, data: &QueryData) -> Result<Vec<Vec<Option<String>>>> {
        let mut req = self.http.get(&chunk.url);
        match (&data.chunk_headers, &data.qrmk) {
            (Some(headers), _) => {
                for (name, value) in headers {
                    req = req.header(name.as_str(), value.as_str());
                }
            }
            (None, Some(qrmk)) => {
                req = req
                    .header("x-amz-server-side-encryption-customer-algorithm", "AES256")
                    .header("x-amz-server-side-encryption-customer-key", qrmk.as_str());
            }
            (None, None) => {}
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::Query(format!("fetching result chunk: {}", e)))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Query(format!(
                "result chunk returned status {}",
                resp.status()
            )));
        }
        let text = resp
            .text()
            .await
            .map_err(|e| PipelineError::Query(format!("reading result chunk: {}", e)))?;
        // chunks are bare comma-separated rows
        serde_json::from_str(&format!("[{}]", text))
            .map_err(|e| PipelineError::Query(format!("decoding result chunk: {}", e)))
    }
}

/// Send and decode a JSON response; transport and decode failures become the message.
async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> std::result::Result<T, String> {
    let resp = req.send().await.map_err(|e| e.to_string())?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("HTTP status {}", status));
    }
    resp.json::<T>().await.map_err(|e| e.to_string())
}

#[async_trait]
impl Warehouse for SnowflakeSession {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| PipelineError::Connection("session is closed".into()))?;
        self.sequence += 1;

        let mut url = self
            .base
            .join("/queries/v1/query-request")
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        let body = json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": self.sequence,
            "parameters": {
                "STATEMENT_TIMEOUT_IN_SECONDS": self.statement_timeout.as_secs(),
            },
        });
        debug!(sequence = self.sequence, sql, "executing statement");

        let req = self.authorised(self.http.post(url), &token).json(&body);
        let envelope: Envelope<QueryData> = send_json(req).await.map_err(PipelineError::Query)?;
        let envelope = self.await_result(envelope, &token).await?;
        if !envelope.success {
            return Err(PipelineError::Query(envelope.failure()));
        }
        let data = envelope.data.unwrap_or_default();
        if data.rowset_base64.as_deref().is_some_and(|b| !b.is_empty()) {
            return Err(PipelineError::Query(
                "result arrived in Arrow format; JSON results are required".into(),
            ));
        }

        let mut rows = Vec::new();
        rows.extend(data.rowset.iter().cloned());
        for chunk in &data.chunks {
            rows.extend(self.fetch_chunk(chunk, &data).await?);
        }

        Ok(QueryResult {
            columns: data.rowtype.iter().map(|c| c.name.clone()).collect(),
            rows,
        })
    }

    fn is_open(&self) -> bool {
        self.token.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        let mut url = self
            .base
            .join("/session")
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        url.query_pairs_mut().append_pair("delete", "true");

        let req = self.authorised(self.http.post(url), &token);
        match send_json::<Envelope<serde_json::Value>>(req).await {
            Ok(env) if env.success => info!("warehouse session closed"),
            Ok(env) => warn!(reason = %env.failure(), "warehouse refused session close"),
            Err(e) => warn!(error = %e, "warehouse session close failed"),
        }
        Ok(())
    }
}
