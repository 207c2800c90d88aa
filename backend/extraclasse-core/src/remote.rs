// src/remote.rs
//! Client for the spreadsheet-backed persistence endpoint.
//!
//! Reads are a single `GET ?action=getInitialData`. Writes are
//! `POST {action, payload}` and are dispatched on detached tasks; nobody
//! waits for them and a failed write is only logged.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use url::Url;

use crate::model::{ActivityType, InitialData, MonthlyReport, Person};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("Remote endpoint answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Remote endpoint did not return JSON")]
    InvalidBody(#[from] serde_json::Error),
}

/// One mutation pushed to the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "payload", rename_all = "camelCase")]
pub enum RemoteWrite {
    SaveTeacher(Person),
    DeleteTeacher { id: String },
    SaveReport(MonthlyReport),
    SaveActivityType(ActivityType),
    DeleteActivityType { id: String },
}

impl RemoteWrite {
    pub fn action(&self) -> &'static str {
        match self {
            RemoteWrite::SaveTeacher(_) => "saveTeacher",
            RemoteWrite::DeleteTeacher { .. } => "deleteTeacher",
            RemoteWrite::SaveReport(_) => "saveReport",
            RemoteWrite::SaveActivityType(_) => "saveActivityType",
            RemoteWrite::DeleteActivityType { .. } => "deleteActivityType",
        }
    }

    /// Id of the record the write concerns, for log lines.
    pub fn subject(&self) -> String {
        match self {
            RemoteWrite::SaveTeacher(p) => p.id.clone(),
            RemoteWrite::SaveReport(r) => r.key().to_string(),
            RemoteWrite::SaveActivityType(a) => a.id.clone(),
            RemoteWrite::DeleteTeacher { id } | RemoteWrite::DeleteActivityType { id } => id.clone(),
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_initial_data(&self) -> Result<InitialData, RemoteError>;
    async fn send(&self, write: RemoteWrite) -> Result<(), RemoteError>;
}

pub struct AppsScriptClient {
    http_client: Client,
    endpoint: Url,
}

impl AppsScriptClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, RemoteError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            endpoint,
        })
    }

    async fn read_body(response: reqwest::Response) -> Result<String, RemoteError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RemoteError::Status { status, body });
        }
        Ok(body)
    }
}

#[async_trait]
impl RemoteStore for AppsScriptClient {
    async fn fetch_initial_data(&self) -> Result<InitialData, RemoteError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("action", "getInitialData");
        debug!("Fetching initial data from {}", url);

        let response = self.http_client.get(url).send().await?;
        let body = Self::read_body(response).await?;
        let data: InitialData = serde_json::from_str(&body)?;
        info!(
            "Remote returned {} teacher(s), {} report(s), {} activity type(s)",
            data.teachers.len(),
            data.reports.len(),
            data.activity_types.len()
        );
        Ok(data)
    }

    async fn send(&self, write: RemoteWrite) -> Result<(), RemoteError> {
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(&write)
            .send()
            .await?;
        Self::read_body(response).await?;
        Ok(())
    }
}

/// Fire-and-forget write. The handle is only used by tests.
pub fn spawn_write(remote: Arc<dyn RemoteStore>, write: RemoteWrite) -> JoinHandle<()> {
    tokio::spawn(async move {
        let action = write.action();
        let subject = write.subject();
        match remote.send(write).await {
            Ok(()) => debug!("Remote {} for {} stored", action, subject),
            Err(e) => error!("Remote {} for {} failed: {}", action, subject, e),
        }
    })
}
