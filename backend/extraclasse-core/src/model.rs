// src/model.rs
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schedule::{format_minutes, required_minutes, WeeklySchedule};
use crate::serde_lenient;

/// Number of activity description rows on every weekly entry.
pub const DESCRIPTION_SLOTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    Teacher,
    Supervisor,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UserRole::Teacher => write!(f, "TEACHER"),
            UserRole::Supervisor => write!(f, "SUPERVISOR"),
        }
    }
}

/// A teacher on the roster, or the supervisor identity.
///
/// Teacher records also carry the subject, the base workload (weekly class
/// periods, `chRegimeBasico`), the derived extra-duty duration
/// (`chExtraClasse`, always `base workload × 15min` as `HH:MM`) and the
/// weekday schedule on which that duty is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(deserialize_with = "serde_lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "serde_lenient::string")]
    pub masp: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(
        default,
        deserialize_with = "serde_lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub subject: Option<String>,
    #[serde(
        default,
        deserialize_with = "serde_lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub ch_regime_basico: Option<u32>,
    #[serde(
        default,
        deserialize_with = "serde_lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub ch_extra_classe: Option<String>,
    #[serde(
        default,
        deserialize_with = "serde_lenient::embedded",
        skip_serializing_if = "Option::is_none"
    )]
    pub schedule: Option<WeeklySchedule>,
}

impl Person {
    /// Recomputes the derived extra-duty duration from the base workload.
    /// Applied at the load boundary so stale `chExtraClasse` values never
    /// survive a round trip through the spreadsheet.
    pub fn normalized(mut self) -> Self {
        if self.role == UserRole::Teacher {
            let workload = self.ch_regime_basico.unwrap_or(0);
            self.ch_extra_classe = Some(format_minutes(required_minutes(workload)));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityType {
    #[serde(deserialize_with = "serde_lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "serde_lenient::string")]
    pub name: String,
}

impl ActivityType {
    /// Trimmed and upper-cased; `None` for a blank name.
    pub fn normalize_name(name: &str) -> Option<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_uppercase())
        }
    }
}

/// Report months, named the way the school writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Month {
    #[serde(rename = "JANEIRO")]
    Janeiro,
    #[serde(rename = "FEVEREIRO")]
    Fevereiro,
    #[serde(rename = "MARÇO")]
    Marco,
    #[serde(rename = "ABRIL")]
    Abril,
    #[serde(rename = "MAIO")]
    Maio,
    #[serde(rename = "JUNHO")]
    Junho,
    #[serde(rename = "JULHO")]
    Julho,
    #[serde(rename = "AGOSTO")]
    Agosto,
    #[serde(rename = "SETEMBRO")]
    Setembro,
    #[serde(rename = "OUTUBRO")]
    Outubro,
    #[serde(rename = "NOVEMBRO")]
    Novembro,
    #[serde(rename = "DEZEMBRO")]
    Dezembro,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Janeiro,
        Month::Fevereiro,
        Month::Marco,
        Month::Abril,
        Month::Maio,
        Month::Junho,
        Month::Julho,
        Month::Agosto,
        Month::Setembro,
        Month::Outubro,
        Month::Novembro,
        Month::Dezembro,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Month::Janeiro => "JANEIRO",
            Month::Fevereiro => "FEVEREIRO",
            Month::Marco => "MARÇO",
            Month::Abril => "ABRIL",
            Month::Maio => "MAIO",
            Month::Junho => "JUNHO",
            Month::Julho => "JULHO",
            Month::Agosto => "AGOSTO",
            Month::Setembro => "SETEMBRO",
            Month::Outubro => "OUTUBRO",
            Month::Novembro => "NOVEMBRO",
            Month::Dezembro => "DEZEMBRO",
        }
    }

    /// 1-based calendar month.
    pub fn number(self) -> u32 {
        Month::ALL
            .iter()
            .position(|m| *m == self)
            .map(|i| i as u32 + 1)
            .unwrap_or(1)
    }

    pub fn from_number(number: u32) -> Option<Month> {
        number
            .checked_sub(1)
            .and_then(|i| Month::ALL.get(i as usize).copied())
    }

    pub fn of(date: NaiveDate) -> Month {
        Month::from_number(date.month()).unwrap_or(Month::Janeiro)
    }

    /// First and last calendar day of this month in `year`.
    pub fn bounds(self, year: i32) -> Option<(NaiveDate, NaiveDate)> {
        let first = NaiveDate::from_ymd_opt(year, self.number(), 1)?;
        let next_first = if self == Month::Dezembro {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, self.number() + 1, 1)?
        };
        Some((first, next_first.pred_opt()?))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One reported week: a date range and six activity rows.
///
/// Descriptions are plain text snapshots of activity-type names, not
/// references; an empty slot is an unused row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyEntry {
    #[serde(deserialize_with = "serde_lenient::string")]
    pub id: String,
    #[serde(
        default,
        deserialize_with = "serde_lenient::date",
        serialize_with = "serde_lenient::serialize_date"
    )]
    pub start_date: Option<NaiveDate>,
    #[serde(
        default,
        deserialize_with = "serde_lenient::date",
        serialize_with = "serde_lenient::serialize_date"
    )]
    pub end_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "serde_lenient::slots")]
    pub descriptions: [String; DESCRIPTION_SLOTS],
}

impl WeeklyEntry {
    pub fn empty(id: String) -> Self {
        Self {
            id,
            start_date: None,
            end_date: None,
            descriptions: Default::default(),
        }
    }

    /// Non-blank descriptions in row order.
    pub fn filled_descriptions(&self) -> impl Iterator<Item = &str> {
        self.descriptions
            .iter()
            .map(|d| d.as_str())
            .filter(|d| !d.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub teacher_id: String,
    pub month: Month,
    pub year: i32,
}

impl ReportKey {
    pub fn new(teacher_id: impl Into<String>, month: Month, year: i32) -> Self {
        Self {
            teacher_id: teacher_id.into(),
            month,
            year,
        }
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.teacher_id, self.month, self.year)
    }
}

/// At most one per (teacherId, month, year); saving replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReport {
    #[serde(deserialize_with = "serde_lenient::string")]
    pub teacher_id: String,
    pub month: Month,
    #[serde(deserialize_with = "serde_lenient::year")]
    pub year: i32,
    #[serde(default, deserialize_with = "serde_lenient::records")]
    pub weeks: Vec<WeeklyEntry>,
    #[serde(default, deserialize_with = "serde_lenient::timestamp")]
    pub last_updated: DateTime<Utc>,
}

impl MonthlyReport {
    pub fn key(&self) -> ReportKey {
        ReportKey::new(self.teacher_id.clone(), self.month, self.year)
    }

    pub fn matches(&self, key: &ReportKey) -> bool {
        self.teacher_id == key.teacher_id && self.month == key.month && self.year == key.year
    }
}

/// Remote read payload (`?action=getInitialData`) and local-cache snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    #[serde(default, deserialize_with = "serde_lenient::records")]
    pub teachers: Vec<Person>,
    #[serde(default, deserialize_with = "serde_lenient::records")]
    pub reports: Vec<MonthlyReport>,
    #[serde(default, deserialize_with = "serde_lenient::records")]
    pub activity_types: Vec<ActivityType>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn person_accepts_spreadsheet_shapes() {
        let person: Person = serde_json::from_value(json!({
            "id": 1,
            "name": "RENATO PEREIRA SILVA",
            "masp": "1324749-9",
            "role": "TEACHER",
            "subject": "QUÍMICA",
            "chRegimeBasico": "22",
            "chExtraClasse": "00:00",
            "schedule": "{\"segunda\":\"16:00 às 17:00\",\"terca\":null}"
        }))
        .unwrap();

        assert_eq!(person.id, "1");
        assert_eq!(person.ch_regime_basico, Some(22));
        let schedule = person.schedule.clone().unwrap();
        assert_eq!(schedule.segunda, "16:00 às 17:00");
        assert_eq!(schedule.terca, "");
        assert_eq!(schedule.sexta, "");

        let person = person.normalized();
        assert_eq!(person.ch_extra_classe.as_deref(), Some("05:30"));
    }

    #[test]
    fn supervisor_serializes_without_teacher_fields() {
        let supervisor = Person {
            id: "supervisor".into(),
            name: "Supervisor".into(),
            masp: "ADMIN".into(),
            role: UserRole::Supervisor,
            subject: None,
            ch_regime_basico: None,
            ch_extra_classe: None,
            schedule: None,
        };
        let value = serde_json::to_value(&supervisor).unwrap();
        assert_eq!(
            value,
            json!({ "id": "supervisor", "name": "Supervisor", "masp": "ADMIN", "role": "SUPERVISOR" })
        );
    }

    #[test]
    fn report_wire_format_uses_portuguese_month_names() {
        let report: MonthlyReport = serde_json::from_value(json!({
            "teacherId": "2",
            "month": "MARÇO",
            "year": "2025",
            "weeks": [{
                "id": "1740000000000",
                "startDate": "2025-03-03",
                "endDate": "",
                "descriptions": ["CONSELHO DE CLASSE", "", ""]
            }],
            "lastUpdated": "2025-03-07T18:30:00.000Z"
        }))
        .unwrap();

        assert_eq!(report.month, Month::Marco);
        assert_eq!(report.year, 2025);
        let week = &report.weeks[0];
        assert_eq!(week.descriptions.len(), DESCRIPTION_SLOTS);
        assert_eq!(week.filled_descriptions().collect::<Vec<_>>(), vec!["CONSELHO DE CLASSE"]);

        let back = serde_json::to_value(&report).unwrap();
        assert_eq!(back["month"], "MARÇO");
        assert_eq!(back["weeks"][0]["endDate"], "");
        assert_eq!(back["weeks"][0]["descriptions"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn initial_data_drops_reports_with_unknown_months() {
        let data: InitialData = serde_json::from_value(json!({
            "teachers": [],
            "reports": [
                { "teacherId": "1", "month": "MAIO", "year": 2025, "weeks": [] },
                { "teacherId": "1", "month": "MAY", "year": 2025, "weeks": [] }
            ]
        }))
        .unwrap();

        assert_eq!(data.reports.len(), 1);
        assert!(data.activity_types.is_empty());
    }

    #[test]
    fn month_bounds_cover_the_whole_month() {
        let (first, last) = Month::Fevereiro.bounds(2024).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, last) = Month::Dezembro.bounds(2025).unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());

        assert_eq!(Month::from_number(3), Some(Month::Marco));
        assert_eq!(Month::Marco.number(), 3);
        assert_eq!(Month::from_number(13), None);
    }
}
