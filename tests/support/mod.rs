//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use request_engine::{
    AttachmentError, AttachmentStore, EmitError, Emission, Emitter, Message, PathEvaluator,
    RequestConfig, RequestEngine, StoredObject,
};
use serde_json::{Value, json};

/// Records every emission and rejects overlapping ones.
#[derive(Default)]
pub struct RecordingEmitter {
    emissions: Mutex<Vec<Emission>>,
    busy: AtomicBool,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.emissions().iter().map(Emission::kind).collect()
    }

    /// Payloads of the `data` emissions, in order.
    pub fn data(&self) -> Vec<Message> {
        self.emissions()
            .into_iter()
            .filter_map(|e| match e {
                Emission::Data(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Emitter for RecordingEmitter {
    async fn emit(&self, emission: Emission) -> Result<(), EmitError> {
        let kind = emission.kind();
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(EmitError::new(kind, "previous emission still in flight"));
        }
        tokio::task::yield_now().await;
        self.emissions.lock().unwrap().push(emission);
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Attachment store holding objects in memory.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<(Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, url: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }

    /// Uploaded payloads with their content types.
    pub fn uploads(&self) -> Vec<(Vec<u8>, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttachmentStore for MemoryStore {
    async fn download(&self, url: &str) -> Result<Vec<u8>, AttachmentError> {
        self.objects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AttachmentError::http_status(url, 404))
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, AttachmentError> {
        let mut uploads = self.uploads.lock().unwrap();
        let id = uploads.len() + 1;
        uploads.push((bytes, content_type.to_string()));
        let url = format!("memory://objects/{id}");
        Ok(StoredObject {
            response: json!({ "objectId": id }),
            url,
        })
    }
}

pub fn engine(emitter: &Arc<RecordingEmitter>, store: &Arc<MemoryStore>) -> RequestEngine {
    RequestEngine::new(
        Arc::new(PathEvaluator::new()),
        emitter.clone(),
        store.clone(),
    )
}

pub fn config(value: Value) -> RequestConfig {
    serde_json::from_value(value).unwrap()
}

pub fn message(data: Value) -> Message {
    Message {
        data,
        ..Message::default()
    }
}
