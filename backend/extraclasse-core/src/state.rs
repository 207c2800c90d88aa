// src/state.rs
//! The application state container.
//!
//! `AppData` holds the roster, the activity vocabulary, all monthly reports
//! and the signed-in identities by session token. Mutations take the current value and hand back
//! the next one; persistence happens separately in `sync::Store::commit`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{ActivityType, InitialData, MonthlyReport, Person, ReportKey};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Teacher not found: {0}")]
    TeacherNotFound(String),
    #[error("Activity type not found: {0}")]
    ActivityTypeNotFound(String),
    #[error("Activity name must not be blank")]
    BlankActivityName,
    #[error("Id already in use: {0}")]
    DuplicateId(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub teachers: Vec<Person>,
    pub activity_types: Vec<ActivityType>,
    pub reports: Vec<MonthlyReport>,
    #[serde(skip)]
    pub sessions: HashMap<String, Person>,
}

/// Millisecond-clock identifiers; bumped until unused in `taken`.
pub fn next_id<'a, I>(now_millis: i64, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = taken.into_iter().collect();
    let mut candidate = now_millis;
    loop {
        let id = candidate.to_string();
        if !taken.contains(&id.as_str()) {
            return id;
        }
        candidate += 1;
    }
}

impl AppData {
    pub fn from_initial(data: InitialData) -> Self {
        Self {
            teachers: data.teachers,
            activity_types: data.activity_types,
            reports: data.reports,
            sessions: HashMap::new(),
        }
    }

    pub fn session(&self, token: &str) -> Option<&Person> {
        self.sessions.get(token)
    }

    pub fn teacher(&self, id: &str) -> Option<&Person> {
        self.teachers.iter().find(|t| t.id == id)
    }

    pub fn activity_type(&self, id: &str) -> Option<&ActivityType> {
        self.activity_types.iter().find(|a| a.id == id)
    }

    pub fn find_report(&self, key: &ReportKey) -> Option<&MonthlyReport> {
        self.reports.iter().find(|r| r.matches(key))
    }

    pub fn reports_for<'a>(&'a self, teacher_id: &'a str) -> impl Iterator<Item = &'a MonthlyReport> {
        self.reports.iter().filter(move |r| r.teacher_id == teacher_id)
    }

    pub fn next_teacher_id(&self, now_millis: i64) -> String {
        next_id(now_millis, self.teachers.iter().map(|t| t.id.as_str()))
    }

    pub fn next_activity_id(&self, now_millis: i64) -> String {
        next_id(now_millis, self.activity_types.iter().map(|a| a.id.as_str()))
    }

    pub fn add_teacher(mut self, teacher: Person) -> Result<Self, StateError> {
        if self.teacher(&teacher.id).is_some() {
            return Err(StateError::DuplicateId(teacher.id));
        }
        info!("Adding teacher {} ({})", teacher.name, teacher.id);
        self.teachers.push(teacher);
        Ok(self)
    }

    /// Replaces the teacher with the same id. Sessions signed in as that
    /// teacher see the new record.
    pub fn update_teacher(mut self, teacher: Person) -> Result<Self, StateError> {
        let slot = self
            .teachers
            .iter_mut()
            .find(|t| t.id == teacher.id)
            .ok_or_else(|| StateError::TeacherNotFound(teacher.id.clone()))?;
        *slot = teacher.clone();

        for identity in self.sessions.values_mut().filter(|s| s.id == teacher.id) {
            debug!("Refreshing session identity for {}", teacher.id);
            *identity = teacher.clone();
        }
        Ok(self)
    }

    /// Removes the teacher, every report they own and their sessions.
    pub fn delete_teacher(mut self, id: &str) -> Result<Self, StateError> {
        let before = self.teachers.len();
        self.teachers.retain(|t| t.id != id);
        if self.teachers.len() == before {
            return Err(StateError::TeacherNotFound(id.to_string()));
        }
        let owned = self.reports_for(id).count();
        self.reports.retain(|r| r.teacher_id != id);
        self.sessions.retain(|_, s| s.id != id);
        info!("Deleted teacher {} and {} report(s)", id, owned);
        Ok(self)
    }

    pub fn add_activity_type(
        mut self,
        name: &str,
        id: String,
    ) -> Result<(Self, ActivityType), StateError> {
        let name = ActivityType::normalize_name(name).ok_or(StateError::BlankActivityName)?;
        if self.activity_type(&id).is_some() {
            return Err(StateError::DuplicateId(id));
        }
        let activity = ActivityType { id, name };
        self.activity_types.push(activity.clone());
        Ok((self, activity))
    }

    /// Recorded descriptions that used this name are left as they are.
    pub fn delete_activity_type(mut self, id: &str) -> Result<Self, StateError> {
        let before = self.activity_types.len();
        self.activity_types.retain(|a| a.id != id);
        if self.activity_types.len() == before {
            return Err(StateError::ActivityTypeNotFound(id.to_string()));
        }
        Ok(self)
    }

    /// Upsert by (teacherId, month, year): replaced in place when present,
    /// appended otherwise.
    pub fn save_report(mut self, report: MonthlyReport) -> Self {
        let key = report.key();
        match self.reports.iter_mut().find(|r| r.matches(&key)) {
            Some(existing) => {
                debug!("Replacing report {}", key);
                *existing = report;
            }
            None => {
                debug!("Adding report {}", key);
                self.reports.push(report);
            }
        }
        self
    }

    pub fn sign_in(mut self, token: String, identity: Person) -> Self {
        info!("Signed in as {} ({})", identity.name, identity.role);
        self.sessions.insert(token, identity);
        self
    }

    pub fn sign_out(mut self, token: &str) -> Self {
        if let Some(identity) = self.sessions.remove(token) {
            debug!("Signed out {}", identity.id);
        }
        self
    }
}
