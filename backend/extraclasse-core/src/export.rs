// src/export.rs
//! Printable report rendering.
//!
//! A report is first bound into a read-only [`ReportView`] (everything the
//! page shows, already formatted) and then handed to a [`ReportRenderer`].
//! Rendering failures are reported to the caller and never touch state.

use chrono::NaiveDate;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::model::{Month, Person, WeeklyEntry};
use crate::schedule::Weekday;

pub const HEADER_LINES: [&str; 3] = [
    "Secretaria de Estado de Educação de Minas Gerais",
    "ESCOLA ESTADUAL SEGISMUNDO PEREIRA",
    "Registros de Atividades Extra-Classe (Módulo II) do Professor",
];

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is a valid regex"));

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to render report: {0}")]
    Render(String),
}

/// `Relatorio_<name>_<MONTH>`, whitespace runs in the name replaced by `_`.
pub fn export_file_stem(teacher_name: &str, month: Month) -> String {
    format!(
        "Relatorio_{}_{}",
        WHITESPACE_RUN.replace_all(teacher_name, "_"),
        month.name()
    )
}

fn display_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => d.format("%d/%m/%Y").to_string(),
        None => "---".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleCell {
    pub day: String,
    pub slot: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekView {
    pub start: String,
    pub end: String,
    pub descriptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportView {
    pub teacher_name: String,
    pub masp: String,
    pub subject: String,
    pub base_workload: String,
    pub ch_modulo: String,
    pub month: Month,
    pub schedule: Vec<ScheduleCell>,
    pub weeks: Vec<WeekView>,
    pub file_stem: String,
}

impl ReportView {
    /// Blank rows are left out, and so are weeks with nothing recorded.
    pub fn bind(teacher: &Person, month: Month, weeks: &[WeeklyEntry]) -> Self {
        let schedule = Weekday::ALL
            .iter()
            .map(|day| {
                let slot = teacher
                    .schedule
                    .as_ref()
                    .map(|s| s.slot(*day).trim())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("--");
                ScheduleCell {
                    day: format!("{}-Feira", day),
                    slot: slot.to_string(),
                }
            })
            .collect();

        let weeks = weeks
            .iter()
            .filter_map(|week| {
                let descriptions: Vec<String> =
                    week.filled_descriptions().map(str::to_string).collect();
                if descriptions.is_empty() {
                    return None;
                }
                Some(WeekView {
                    start: display_date(week.start_date),
                    end: display_date(week.end_date),
                    descriptions,
                })
            })
            .collect();

        Self {
            teacher_name: teacher.name.clone(),
            masp: teacher.masp.clone(),
            subject: teacher.subject.clone().unwrap_or_default(),
            base_workload: teacher
                .ch_regime_basico
                .map(|n| n.to_string())
                .unwrap_or_default(),
            ch_modulo: teacher.ch_extra_classe.clone().unwrap_or_default(),
            month,
            schedule,
            weeks,
            file_stem: export_file_stem(&teacher.name, month),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub trait ReportRenderer: Send + Sync {
    fn render(&self, view: &ReportView) -> Result<RenderedDocument, ExportError>;
}

/// One self-contained A4 page; printing it from a browser yields the PDF.
#[derive(Debug, Default, Clone)]
pub struct HtmlPageRenderer;

const PRINT_CSS: &str = r#"
@page { size: A4; margin: 12mm; }
body { font-family: Arial, Helvetica, sans-serif; font-size: 11pt; color: #000; }
.page { width: 186mm; margin: 0 auto; }
header { text-align: center; margin-bottom: 8mm; }
header p { margin: 1mm 0; }
header .school { font-weight: bold; }
table { width: 100%; border-collapse: collapse; margin-bottom: 5mm; }
th, td { border: 1px solid #000; padding: 1.5mm 2mm; text-align: left; vertical-align: top; }
th { background: #eee; }
.schedule td, .schedule th { text-align: center; }
.signatures { display: flex; justify-content: space-between; margin-top: 20mm; }
.signatures div { width: 45%; border-top: 1px solid #000; text-align: center; padding-top: 2mm; }
"#;

impl HtmlPageRenderer {
    pub fn page(&self, view: &ReportView) -> Markup {
        html! {
            (DOCTYPE)
            html lang="pt-BR" {
                head {
                    meta charset="UTF-8";
                    title { (view.file_stem) }
                    style { (PreEscaped(PRINT_CSS)) }
                }
                body {
                    div.page {
                        header {
                            p { (HEADER_LINES[0]) }
                            p.school { (HEADER_LINES[1]) }
                            p { (HEADER_LINES[2]) }
                        }
                        table.teacher {
                            tr {
                                th { "Professor(a)" } td { (view.teacher_name) }
                                th { "Masp" } td { (view.masp) }
                            }
                            tr {
                                th { "Conteúdo" } td { (view.subject) }
                                th { "RB (AULAS)" } td { (view.base_workload) }
                            }
                            tr {
                                th { "CH MÓDULO" } td { (view.ch_modulo) }
                                th { "Mês Referência" } td { (view.month.name()) }
                            }
                        }
                        table.schedule {
                            tr { th colspan="5" { "Horário de Cumprimento do Módulo" } }
                            tr {
                                @for cell in &view.schedule { th { (cell.day) } }
                            }
                            tr {
                                @for cell in &view.schedule { td { (cell.slot) } }
                            }
                        }
                        (self.weeks(view))
                        div.signatures {
                            div { "Assinatura do(a) Especialista" }
                            div { "Assinatura do(a) Professor(a)" }
                        }
                    }
                }
            }
        }
    }

    fn weeks(&self, view: &ReportView) -> Markup {
        html! {
            table.weeks {
                tr {
                    th { "Período" }
                    th { "Atividades" }
                }
                @if view.weeks.is_empty() {
                    tr { td colspan="2" { "Nenhuma atividade registrada." } }
                }
                @for week in &view.weeks {
                    tr {
                        td { (week.start) " a " (week.end) }
                        td {
                            @for description in &week.descriptions {
                                div { (description) }
                            }
                        }
                    }
                }
            }
        }
    }
}

impl ReportRenderer for HtmlPageRenderer {
    fn render(&self, view: &ReportView) -> Result<RenderedDocument, ExportError> {
        if view.file_stem.trim().is_empty() {
            return Err(ExportError::Render("report has no file name".to_string()));
        }
        let bytes = self.page(view).into_string().into_bytes();
        debug!("Rendered {} ({} bytes)", view.file_stem, bytes.len());
        Ok(RenderedDocument {
            file_name: format!("{}.html", view.file_stem),
            content_type: "text/html; charset=utf-8",
            bytes,
        })
    }
}
