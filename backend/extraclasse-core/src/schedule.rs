// src/schedule.rs
//! Extra-duty schedule arithmetic and the teacher profile rules built on it.
//!
//! Every weekly class period ("base workload") obliges the teacher to 15
//! minutes of extra-duty time. A profile may only be saved when the five
//! weekday time ranges add up to exactly that quota.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::model::{Person, UserRole};
use crate::serde_lenient;

pub const MINUTES_PER_PERIOD: u32 = 15;
pub const MIN_MASP_LEN: usize = 3;

static SLOT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}:\d{2})\s*às\s*(\d{2}:\d{2})").expect("slot pattern is a valid regex")
});

/// A time the slot pattern can read back.
static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("time pattern is a valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Weekday {
    Segunda,
    Terca,
    Quarta,
    Quinta,
    Sexta,
}

impl Weekday {
    pub const ALL: [Weekday; 5] = [
        Weekday::Segunda,
        Weekday::Terca,
        Weekday::Quarta,
        Weekday::Quinta,
        Weekday::Sexta,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Weekday::Segunda => "Segunda",
            Weekday::Terca => "Terça",
            Weekday::Quarta => "Quarta",
            Weekday::Quinta => "Quinta",
            Weekday::Sexta => "Sexta",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// "HH:MM" to minutes since midnight. Blank or non-numeric input counts as 0.
pub fn parse_time(value: &str) -> u32 {
    if value.is_empty() {
        return 0;
    }
    let mut parts = value.split(':');
    let (Some(hours), Some(minutes)) = (parts.next(), parts.next()) else {
        return 0;
    };
    let component = |s: &str| {
        let s = s.trim();
        if s.is_empty() {
            Some(0)
        } else {
            s.parse::<u32>().ok()
        }
    };
    match (component(hours), component(minutes)) {
        (Some(h), Some(m)) => h * 60 + m,
        _ => 0,
    }
}

/// `end - start` in minutes; inverted or malformed ranges give 0.
pub fn minutes_between(start: &str, end: &str) -> u32 {
    let s = parse_time(start);
    let e = parse_time(end);
    if e > s {
        e - s
    } else {
        0
    }
}

pub fn required_minutes(base_workload: u32) -> u32 {
    base_workload.saturating_mul(MINUTES_PER_PERIOD)
}

/// Zero-padded `HH:MM`; hours are not wrapped at 24.
pub fn format_minutes(total_minutes: u32) -> String {
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}

pub fn total_scheduled_minutes(schedule: &ScheduleForm) -> u32 {
    Weekday::ALL
        .iter()
        .map(|day| schedule.day(*day).minutes())
        .sum()
}

/// Digits only, with a dash before the check digit: "13247499" -> "1324749-9".
pub fn format_masp(input: &str) -> String {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 1 {
        return digits;
    }
    let (main, check) = digits.split_at(digits.len() - 1);
    format!("{}-{}", main, check)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

impl TimeRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Reads the first `HH:MM às HH:MM` pair of a stored slot.
    pub fn parse_slot(slot: &str) -> Self {
        match SLOT_PATTERN.captures(slot) {
            Some(caps) => Self::new(&caps[1], &caps[2]),
            None => Self::default(),
        }
    }

    /// Empty unless both ends are `HH:MM`.
    pub fn to_slot(&self) -> String {
        if self.is_well_formed() {
            format!("{} às {}", self.start, self.end)
        } else {
            String::new()
        }
    }

    pub fn minutes(&self) -> u32 {
        minutes_between(&self.start, &self.end)
    }

    pub fn is_blank(&self) -> bool {
        self.start.trim().is_empty() && self.end.trim().is_empty()
    }

    /// Both ends are `HH:MM`, so `to_slot` and `parse_slot` agree on it.
    pub fn is_well_formed(&self) -> bool {
        TIME_PATTERN.is_match(&self.start) && TIME_PATTERN.is_match(&self.end)
    }
}

/// Stored weekday schedule, one free-form slot per weekday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    #[serde(default, deserialize_with = "serde_lenient::string")]
    pub segunda: String,
    #[serde(default, deserialize_with = "serde_lenient::string")]
    pub terca: String,
    #[serde(default, deserialize_with = "serde_lenient::string")]
    pub quarta: String,
    #[serde(default, deserialize_with = "serde_lenient::string")]
    pub quinta: String,
    #[serde(default, deserialize_with = "serde_lenient::string")]
    pub sexta: String,
}

impl WeeklySchedule {
    pub fn slot(&self, day: Weekday) -> &str {
        match day {
            Weekday::Segunda => &self.segunda,
            Weekday::Terca => &self.terca,
            Weekday::Quarta => &self.quarta,
            Weekday::Quinta => &self.quinta,
            Weekday::Sexta => &self.sexta,
        }
    }

    pub fn total_minutes(&self) -> u32 {
        total_scheduled_minutes(&ScheduleForm::from_schedule(self))
    }
}

/// Edit-form shape of a schedule: explicit start/end per weekday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleForm {
    #[serde(default)]
    pub segunda: TimeRange,
    #[serde(default)]
    pub terca: TimeRange,
    #[serde(default)]
    pub quarta: TimeRange,
    #[serde(default)]
    pub quinta: TimeRange,
    #[serde(default)]
    pub sexta: TimeRange,
}

impl ScheduleForm {
    pub fn day(&self, day: Weekday) -> &TimeRange {
        match day {
            Weekday::Segunda => &self.segunda,
            Weekday::Terca => &self.terca,
            Weekday::Quarta => &self.quarta,
            Weekday::Quinta => &self.quinta,
            Weekday::Sexta => &self.sexta,
        }
    }

    pub fn day_mut(&mut self, day: Weekday) -> &mut TimeRange {
        match day {
            Weekday::Segunda => &mut self.segunda,
            Weekday::Terca => &mut self.terca,
            Weekday::Quarta => &mut self.quarta,
            Weekday::Quinta => &mut self.quinta,
            Weekday::Sexta => &mut self.sexta,
        }
    }

    pub fn from_schedule(schedule: &WeeklySchedule) -> Self {
        let mut form = Self::default();
        for day in Weekday::ALL {
            *form.day_mut(day) = TimeRange::parse_slot(schedule.slot(day));
        }
        form
    }

    pub fn to_schedule(&self) -> WeeklySchedule {
        WeeklySchedule {
            segunda: self.segunda.to_slot(),
            terca: self.terca.to_slot(),
            quarta: self.quarta.to_slot(),
            quinta: self.quinta.to_slot(),
            sexta: self.sexta.to_slot(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ProfileIssue {
    #[error("Name is required")]
    NameMissing,
    #[error("MASP must have at least 3 characters (got {length})")]
    MaspTooShort { length: usize },
    #[error("Subject is required")]
    SubjectMissing,
    #[error("Base workload must be greater than zero")]
    WorkloadNotPositive,
    #[error("{day}: times must be filled in as HH:MM")]
    MalformedRange { day: String },
    #[error("Scheduled time {scheduled} does not match the required {required}")]
    ScheduleMismatch { scheduled: String, required: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Teacher profile is invalid: {}", .issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
pub struct ProfileError {
    pub issues: Vec<ProfileIssue>,
}

/// Teacher record as edited on either dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub masp: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, rename = "chRegimeBasico")]
    pub base_workload: u32,
    #[serde(default)]
    pub schedule: ScheduleForm,
}

impl ProfileForm {
    /// Pre-fills the form from a stored teacher.
    pub fn from_teacher(teacher: &Person) -> Self {
        Self {
            name: teacher.name.clone(),
            masp: teacher.masp.clone(),
            subject: teacher.subject.clone().unwrap_or_default(),
            base_workload: teacher.ch_regime_basico.unwrap_or(0),
            schedule: teacher
                .schedule
                .as_ref()
                .map(ScheduleForm::from_schedule)
                .unwrap_or_default(),
        }
    }

    pub fn required_minutes(&self) -> u32 {
        required_minutes(self.base_workload)
    }

    /// What the stored schedule will add up to: only well-formed ranges count.
    pub fn scheduled_minutes(&self) -> u32 {
        Weekday::ALL
            .iter()
            .map(|day| self.schedule.day(*day))
            .filter(|range| range.is_well_formed())
            .map(TimeRange::minutes)
            .sum()
    }

    /// All failing rules, or `Ok` when the record may be saved.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let mut issues = Vec::new();
        if self.name.trim().is_empty() {
            issues.push(ProfileIssue::NameMissing);
        }
        let masp_len = self.masp.chars().count();
        if masp_len < MIN_MASP_LEN {
            issues.push(ProfileIssue::MaspTooShort { length: masp_len });
        }
        if self.subject.trim().is_empty() {
            issues.push(ProfileIssue::SubjectMissing);
        }
        if self.base_workload == 0 {
            issues.push(ProfileIssue::WorkloadNotPositive);
        }
        for day in Weekday::ALL {
            let range = self.schedule.day(day);
            if !range.is_blank() && !range.is_well_formed() {
                issues.push(ProfileIssue::MalformedRange {
                    day: day.label().to_string(),
                });
            }
        }
        let scheduled = self.scheduled_minutes();
        let required = self.required_minutes();
        if scheduled != required {
            issues.push(ProfileIssue::ScheduleMismatch {
                scheduled: format_minutes(scheduled),
                required: format_minutes(required),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            debug!("Profile for '{}' rejected: {:?}", self.name, issues);
            Err(ProfileError { issues })
        }
    }

    /// Validates, then builds the teacher record under `id`.
    pub fn into_teacher(self, id: String) -> Result<Person, ProfileError> {
        self.validate()?;
        Ok(self.teacher_record(id))
    }

    /// Builds the record without validating; callers must have run `validate`.
    pub(crate) fn teacher_record(self, id: String) -> Person {
        let required = self.required_minutes();
        Person {
            id,
            name: self.name.to_uppercase(),
            masp: self.masp,
            role: UserRole::Teacher,
            subject: Some(self.subject.to_uppercase()),
            ch_regime_basico: Some(self.base_workload),
            ch_extra_classe: Some(format_minutes(required)),
            schedule: Some(self.schedule.to_schedule()),
        }
    }
}
