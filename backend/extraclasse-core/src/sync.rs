// src/sync.rs
//! Startup load and the synchronisation points of the application state.
//!
//! `Store` owns the single `AppData` value together with the remote client it
//! pushes to. A change is applied to a copy of the current state and swapped
//! in; the local mirror is then rewritten off the async workers and the
//! matching remote write is spawned without waiting for it.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::local_cache::{CacheError, LocalStorage};
use crate::model::{InitialData, Person};
use crate::remote::{spawn_write, RemoteError, RemoteStore, RemoteWrite};
use crate::schedule::{format_minutes, required_minutes};
use crate::seed;
use crate::session;
use crate::state::AppData;

/// Builds the remote client for an endpoint URL.
pub type Connector =
    Arc<dyn Fn(&Url) -> Result<Arc<dyn RemoteStore>, RemoteError> + Send + Sync>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local storage error")]
    Cache(#[from] CacheError),
    #[error("Remote client error")]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Remote,
    LocalCache,
    Seed,
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadSource::Remote => write!(f, "remote endpoint"),
            LoadSource::LocalCache => write!(f, "local cache"),
            LoadSource::Seed => write!(f, "built-in data"),
        }
    }
}

fn from_remote(data: InitialData) -> AppData {
    let mut app = AppData::from_initial(data);
    if app.activity_types.is_empty() {
        info!("Remote has no activity types; using the built-in list");
        app.activity_types = seed::activity_types();
    }
    app
}

fn from_local(cache: &LocalStorage) -> (AppData, LoadSource) {
    let snapshot = match cache.read_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to read local cache: {}", e);
            Default::default()
        }
    };
    let source = if snapshot.is_empty() {
        LoadSource::Seed
    } else {
        LoadSource::LocalCache
    };
    let app = AppData {
        teachers: snapshot.teachers.unwrap_or_else(seed::teachers),
        activity_types: snapshot.activity_types.unwrap_or_else(seed::activity_types),
        reports: snapshot.reports.unwrap_or_default(),
        sessions: HashMap::new(),
    };
    (app, source)
}

/// First record wins when the roster repeats an id.
fn unique_teachers(teachers: Vec<Person>) -> Vec<Person> {
    let mut seen = HashSet::new();
    teachers
        .into_iter()
        .filter(|t| {
            if seen.insert(t.id.clone()) {
                true
            } else {
                warn!("Dropping duplicate teacher id {} ({})", t.id, t.name);
                false
            }
        })
        .collect()
}

/// Remote first, then the local slots, then the built-in data.
pub async fn load_initial(remote: &dyn RemoteStore, cache: &LocalStorage) -> (AppData, LoadSource) {
    let (mut app, source) = match remote.fetch_initial_data().await {
        Ok(data) => (from_remote(data), LoadSource::Remote),
        Err(e) => {
            warn!("Remote endpoint unavailable ({}); falling back to local data", e);
            from_local(cache)
        }
    };
    app.teachers = unique_teachers(app.teachers.into_iter().map(Person::normalized).collect());
    for teacher in &app.teachers {
        let required = required_minutes(teacher.ch_regime_basico.unwrap_or(0));
        let scheduled = teacher.schedule.as_ref().map(|s| s.total_minutes()).unwrap_or(0);
        if scheduled != required {
            warn!(
                "Teacher {} ({}) has {} scheduled, {} required",
                teacher.name,
                teacher.id,
                format_minutes(scheduled),
                format_minutes(required)
            );
        }
    }
    info!(
        "Loaded {} teacher(s), {} activity type(s), {} report(s) from {}",
        app.teachers.len(),
        app.activity_types.len(),
        app.reports.len(),
        source
    );
    (app, source)
}

/// Everything a commit must see at once.
struct Current {
    data: AppData,
    remote: Arc<dyn RemoteStore>,
    endpoint: Url,
    source: LoadSource,
    version: u64,
}

pub struct Store {
    current: Mutex<Current>,
    cache: LocalStorage,
    connector: Connector,
    // Version of the last snapshot written to `cache`.
    mirrored: Arc<std::sync::Mutex<u64>>,
}

impl Store {
    pub async fn open(cache: LocalStorage, connector: Connector) -> Result<Self, SyncError> {
        let endpoint = cache.endpoint_url()?;
        let remote = connector(&endpoint)?;
        let (data, source) = load_initial(remote.as_ref(), &cache).await;
        let snapshot = data.clone();
        let store = Self {
            current: Mutex::new(Current {
                data,
                remote,
                endpoint,
                source,
                version: 1,
            }),
            cache,
            connector,
            mirrored: Arc::new(std::sync::Mutex::new(0)),
        };
        store.mirror(1, snapshot).await;
        Ok(store)
    }

    pub async fn read<R>(&self, f: impl FnOnce(&AppData) -> R) -> R {
        let current = self.current.lock().await;
        f(&current.data)
    }

    pub async fn session(&self, token: &str) -> Option<Person> {
        self.current.lock().await.data.session(token).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.current.lock().await.data.sessions.len()
    }

    /// Starts a session for `identity` and returns its token.
    pub async fn sign_in(&self, identity: Person) -> String {
        let token = session::new_token();
        let mut current = self.current.lock().await;
        current.data = std::mem::take(&mut current.data).sign_in(token.clone(), identity);
        token
    }

    pub async fn sign_out(&self, token: &str) {
        let mut current = self.current.lock().await;
        current.data = std::mem::take(&mut current.data).sign_out(token);
    }

    /// Applies `change` to a copy of the state. On success the copy becomes
    /// the state, the local mirror is rewritten and the returned write is
    /// dispatched to the remote that was current for that change. On error
    /// nothing changes.
    pub async fn commit<T, E, F>(&self, change: F) -> Result<T, E>
    where
        F: FnOnce(AppData) -> Result<(AppData, RemoteWrite, T), E>,
    {
        let (write, value, remote, version, snapshot) = {
            let mut current = self.current.lock().await;
            let (next, write, value) = change(current.data.clone())?;
            current.data = next;
            current.version += 1;
            (
                write,
                value,
                Arc::clone(&current.remote),
                current.version,
                current.data.clone(),
            )
        };
        self.mirror(version, snapshot).await;
        spawn_write(remote, write);
        Ok(value)
    }

    /// Loads everything again from the configured endpoint. All sessions
    /// end.
    pub async fn reload(&self) -> Result<LoadSource, SyncError> {
        let endpoint = self.cache.endpoint_url()?;
        let remote = (self.connector)(&endpoint)?;
        let (fresh, source) = load_initial(remote.as_ref(), &self.cache).await;
        let (version, snapshot) = {
            let mut current = self.current.lock().await;
            current.data = fresh;
            current.remote = remote;
            current.endpoint = endpoint;
            current.source = source;
            current.version += 1;
            (current.version, current.data.clone())
        };
        self.mirror(version, snapshot).await;
        Ok(source)
    }

    pub async fn set_endpoint(&self, url: &str) -> Result<(Url, LoadSource), SyncError> {
        let url = self.cache.set_endpoint_url(url)?;
        let source = self.reload().await?;
        Ok((url, source))
    }

    pub async fn endpoint(&self) -> Url {
        self.current.lock().await.endpoint.clone()
    }

    pub async fn source(&self) -> LoadSource {
        self.current.lock().await.source
    }

    /// Writes `snapshot` on the blocking pool. A snapshot older than the one
    /// already on disk is skipped.
    async fn mirror(&self, version: u64, snapshot: AppData) {
        let cache = self.cache.clone();
        let mirrored = Arc::clone(&self.mirrored);
        let written = tokio::task::spawn_blocking(move || {
            let mut last = mirrored.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if *last >= version {
                debug!("Skipping stale snapshot {} (on disk: {})", version, *last);
                return Ok(());
            }
            cache.write_snapshot(&snapshot)?;
            *last = version;
            Ok::<_, CacheError>(())
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to update local cache in {:?}: {}", self.cache.dir(), e),
            Err(e) => error!("Local cache writer stopped: {}", e),
        }
    }
}
