// src/report_draft.rs
//! Editing a teacher's report for one month before it is saved.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ActivityType, Month, MonthlyReport, ReportKey, WeeklyEntry, DESCRIPTION_SLOTS};
use crate::serde_lenient;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Week not found: {0}")]
    WeekNotFound(String),
    #[error("Description slot {0} does not exist")]
    SlotOutOfRange(usize),
    #[error("Date {date} is outside {month}/{year}")]
    DateOutsideMonth { date: NaiveDate, month: Month, year: i32 },
    #[error("Unknown activity type: {0}")]
    UnknownActivity(String),
    #[error("Year {0} is not a valid report year")]
    InvalidYear(i32),
}

/// One field change on a week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum WeekUpdate {
    StartDate {
        #[serde(default, deserialize_with = "serde_lenient::date")]
        value: Option<NaiveDate>,
    },
    EndDate {
        #[serde(default, deserialize_with = "serde_lenient::date")]
        value: Option<NaiveDate>,
    },
    Description {
        index: usize,
        #[serde(default)]
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDraft {
    pub key: ReportKey,
    pub weeks: Vec<WeeklyEntry>,
}

impl ReportDraft {
    pub fn new(key: ReportKey) -> Self {
        Self { key, weeks: Vec::new() }
    }

    /// Starts from the stored report for `key`, or an empty one.
    pub fn from_report(key: ReportKey, stored: Option<&MonthlyReport>) -> Self {
        let mut draft = Self::new(key);
        if let Some(report) = stored {
            draft.weeks = report.weeks.clone();
        }
        draft
    }

    pub fn add_week(&mut self, id: String) -> &WeeklyEntry {
        self.weeks.push(WeeklyEntry::empty(id));
        &self.weeks[self.weeks.len() - 1]
    }

    pub fn remove_week(&mut self, id: &str) -> Result<(), ReportError> {
        let before = self.weeks.len();
        self.weeks.retain(|w| w.id != id);
        if self.weeks.len() == before {
            return Err(ReportError::WeekNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Applies one change. A non-blank description must name a known
    /// activity type.
    pub fn update_week(
        &mut self,
        id: &str,
        update: WeekUpdate,
        vocabulary: &[ActivityType],
    ) -> Result<&WeeklyEntry, ReportError> {
        let bounds = self.bounds()?;
        let key = self.key.clone();
        let week = self
            .weeks
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| ReportError::WeekNotFound(id.to_string()))?;

        match update {
            WeekUpdate::StartDate { value } => {
                check_date(value, bounds, &key)?;
                week.start_date = value;
            }
            WeekUpdate::EndDate { value } => {
                check_date(value, bounds, &key)?;
                week.end_date = value;
            }
            WeekUpdate::Description { index, value } => {
                if index >= DESCRIPTION_SLOTS {
                    return Err(ReportError::SlotOutOfRange(index));
                }
                if !value.is_empty() && !vocabulary.iter().any(|a| a.name == value) {
                    return Err(ReportError::UnknownActivity(value));
                }
                week.descriptions[index] = value;
            }
        }
        Ok(week)
    }

    fn bounds(&self) -> Result<(NaiveDate, NaiveDate), ReportError> {
        self.key
            .month
            .bounds(self.key.year)
            .ok_or(ReportError::InvalidYear(self.key.year))
    }

    /// Every set date must fall inside the reported month.
    pub fn validate(&self) -> Result<(), ReportError> {
        let bounds = self.bounds()?;
        for week in &self.weeks {
            check_date(week.start_date, bounds, &self.key)?;
            check_date(week.end_date, bounds, &self.key)?;
        }
        Ok(())
    }

    pub fn into_report(self, now: DateTime<Utc>) -> Result<MonthlyReport, ReportError> {
        self.validate()?;
        Ok(MonthlyReport {
            teacher_id: self.key.teacher_id,
            month: self.key.month,
            year: self.key.year,
            weeks: self.weeks,
            last_updated: now,
        })
    }
}

fn check_date(
    date: Option<NaiveDate>,
    (first, last): (NaiveDate, NaiveDate),
    key: &ReportKey,
) -> Result<(), ReportError> {
    match date {
        Some(d) if d < first || d > last => Err(ReportError::DateOutsideMonth {
            date: d,
            month: key.month,
            year: key.year,
        }),
        _ => Ok(()),
    }
}
