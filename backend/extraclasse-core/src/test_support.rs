// src/test_support.rs
//! In-memory endpoint and storage helpers shared by the store and router tests.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::local_cache::{LocalStorage, DEFAULT_ENDPOINT};
use crate::model::InitialData;
use crate::remote::{RemoteError, RemoteStore, RemoteWrite};
use crate::sync::Connector;

/// Endpoints by URL; an unknown URL answers 503.
#[derive(Default)]
pub struct FakeBackend {
    pub data_by_url: Mutex<HashMap<String, InitialData>>,
    pub sent: Mutex<Vec<RemoteWrite>>,
    pub sent_to: Mutex<Vec<(String, RemoteWrite)>>,
}

impl FakeBackend {
    pub fn serve(&self, url: &str, data: InitialData) {
        self.data_by_url.lock().unwrap().insert(url.to_string(), data);
    }

    pub fn sent(&self) -> Vec<RemoteWrite> {
        self.sent.lock().unwrap().clone()
    }

    /// Writes that reached the endpoint at `url`.
    pub fn sent_to(&self, url: &str) -> Vec<RemoteWrite> {
        self.sent_to
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == url)
            .map(|(_, write)| write.clone())
            .collect()
    }

    /// Waits for the detached writes to land.
    pub async fn wait_for_writes(&self, count: usize) -> Vec<RemoteWrite> {
        for _ in 0..200 {
            if self.sent.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.sent()
    }

    pub fn connector(self: &Arc<Self>) -> Connector {
        let backend = Arc::clone(self);
        Arc::new(move |url: &Url| -> Result<Arc<dyn RemoteStore>, RemoteError> {
            let remote: Arc<dyn RemoteStore> = Arc::new(MemoryRemote {
                url: url.to_string(),
                backend: Arc::clone(&backend),
            });
            Ok(remote)
        })
    }
}

struct MemoryRemote {
    url: String,
    backend: Arc<FakeBackend>,
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_initial_data(&self) -> Result<InitialData, RemoteError> {
        let found = self.backend.data_by_url.lock().unwrap().get(&self.url).cloned();
        found.ok_or_else(|| RemoteError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "offline".to_string(),
        })
    }

    async fn send(&self, write: RemoteWrite) -> Result<(), RemoteError> {
        self.backend.sent_to.lock().unwrap().push((self.url.clone(), write.clone()));
        self.backend.sent.lock().unwrap().push(write);
        Ok(())
    }
}

pub fn storage_dir(test_name: &str) -> PathBuf {
    PathBuf::from(format!("./test_store_{}", test_name))
}

pub fn setup_storage(test_name: &str) -> LocalStorage {
    teardown_storage(test_name);
    LocalStorage::open(storage_dir(test_name), Url::parse(DEFAULT_ENDPOINT).unwrap()).unwrap()
}

pub fn teardown_storage(test_name: &str) {
    let _ = fs::remove_dir_all(storage_dir(test_name));
}
