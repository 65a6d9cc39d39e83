//! In-memory doubles for the object store and the warehouse session.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taxi_pipeline::error::{PipelineError, Result};
use taxi_pipeline::stage::{CompletedPart, ObjectStore, PutAck};
use taxi_pipeline::warehouse::{QueryResult, Warehouse};

/// A bucket held in a map. Writes to keys listed in `reject` fail.
#[derive(Default)]
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    reject: HashSet<String>,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    pub fn with_objects(bucket: &str, keys: &[&str]) -> Self {
        let store = Self::new(bucket);
        {
            let mut objects = store.objects.lock().unwrap();
            for key in keys {
                objects.insert(key.to_string(), b"staged".to_vec());
            }
        }
        store
    }

    pub fn rejecting(mut self, key: &str) -> Self {
        self.reject.insert(key.to_string());
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.reject.contains(key) {
            Err(PipelineError::transfer(key, "AccessDenied"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<PutAck> {
        self.check(key)?;
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(PutAck {
            etag: Some("\"etag\"".into()),
        })
    }

    async fn create_multipart(&self, key: &str) -> Result<String> {
        self.check(key)?;
        Ok(format!("upload-{}", key))
    }

    async fn upload_part(&self, key: &str, _upload_id: &str, number: i32, body: Vec<u8>) -> Result<CompletedPart> {
        self.objects
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(body);
        Ok(CompletedPart {
            number,
            etag: format!("\"{}\"", number),
        })
    }

    async fn complete_multipart(&self, _key: &str, _upload_id: &str, _parts: Vec<CompletedPart>) -> Result<PutAck> {
        Ok(PutAck {
            etag: Some("\"multi\"".into()),
        })
    }

    async fn abort_multipart(&self, key: &str, _upload_id: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

type Responder = Box<dyn Fn(&str) -> Option<Result<QueryResult>> + Send>;

/// Answers statements from a list of `(prefix, responder)` pairs and records
/// every statement it sees. Unmatched statements succeed with no rows.
pub struct ScriptedWarehouse {
    open: bool,
    responders: Vec<(String, Responder)>,
    pub log: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<Mutex<bool>>,
}

impl ScriptedWarehouse {
    pub fn new() -> Self {
        Self {
            open: true,
            responders: Vec::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
        }
    }

    pub fn closed_session() -> Self {
        Self {
            open: false,
            ..Self::new()
        }
    }

    pub fn on(mut self, prefix: &str, rows: QueryResult) -> Self {
        self.responders
            .push((prefix.to_string(), Box::new(move |_| Some(Ok(rows.clone())))));
        self
    }

    pub fn fail_on(mut self, prefix: &str, message: &str) -> Self {
        let message = message.to_string();
        self.responders.push((
            prefix.to_string(),
            Box::new(move |_| Some(Err(PipelineError::Query(message.clone())))),
        ));
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for ScriptedWarehouse {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        if !self.open {
            return Err(PipelineError::Connection("session is closed".into()));
        }
        self.log.lock().unwrap().push(sql.to_string());
        for (prefix, respond) in &self.responders {
            if sql.starts_with(prefix.as_str()) {
                if let Some(result) = respond(sql) {
                    return result;
                }
            }
        }
        Ok(QueryResult::default())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

pub fn table(columns: &[&str], rows: &[&[Option<&str>]]) -> QueryResult {
    QueryResult {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|v| v.map(str::to_string)).collect())
            .collect(),
    }
}
