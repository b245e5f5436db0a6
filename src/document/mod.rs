//! Registrar PDF documents as JSON tables.
//!
//! ```text
//! DocumentRequest → GET downloads?method=printDocument&... → PDF bytes
//!   → TableExtractor (utf-8, then windows-1252) → PageTable per page
//!   → ExtractedTable::concat → repair \r → JSON (table | columns)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use regi::{DocumentRequest, JsonShape, RegistrarClient};
//!
//! # async fn example() -> regi::Result<()> {
//! let client = RegistrarClient::new()?;
//! let request = DocumentRequest::schedule("2024F", None, Some("13"));
//! let json = client.fetch_document_json(&request, JsonShape::Columns).await?;
//! println!("{json}");
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod lattice;
pub mod table;

use std::fmt;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::client::RegistrarClient;
use crate::error::{RegistrarError, Result};

pub use extract::{
    extract_with_fallback, Cell, ExtractError, ExtractOptions, PageSelection, PageTable,
    TableExtractor, TextEncoding,
};
pub use lattice::LatticeExtractor;
pub use table::{ExtractedTable, JsonShape};

/// The three printable reports the downloads endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Schedule,
    FinalExamSchedule,
    Requirements,
}

impl DocumentKind {
    /// Value of the `name` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "school_schedule_by_term",
            Self::FinalExamSchedule => "final_exams_schedule",
            Self::Requirements => "course_requirements",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document download with the parameters its kind accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRequest {
    Schedule {
        semester: String,
        academic_level: Option<String>,
        school: Option<String>,
    },
    FinalExamSchedule {
        semester: String,
        school: String,
    },
    Requirements {
        semester: String,
        academic_level: Option<String>,
        school: Option<String>,
    },
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn required(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(RegistrarError::validation(format!("{name} is required")))
    } else {
        Ok(())
    }
}

impl DocumentRequest {
    pub fn schedule(semester: impl Into<String>, academic_level: Option<&str>, school: Option<&str>) -> Self {
        Self::Schedule {
            semester: semester.into(),
            academic_level: optional(academic_level),
            school: optional(school),
        }
    }

    pub fn final_exam_schedule(semester: impl Into<String>, school: impl Into<String>) -> Self {
        Self::FinalExamSchedule {
            semester: semester.into(),
            school: school.into(),
        }
    }

    pub fn requirements(semester: impl Into<String>, academic_level: Option<&str>, school: Option<&str>) -> Self {
        Self::Requirements {
            semester: semester.into(),
            academic_level: optional(academic_level),
            school: optional(school),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Schedule { .. } => DocumentKind::Schedule,
            Self::FinalExamSchedule { .. } => DocumentKind::FinalExamSchedule,
            Self::Requirements { .. } => DocumentKind::Requirements,
        }
    }

    pub fn semester(&self) -> &str {
        match self {
            Self::Schedule { semester, .. }
            | Self::FinalExamSchedule { semester, .. }
            | Self::Requirements { semester, .. } => semester,
        }
    }

    /// Reject empty required parameters.
    pub fn validate(&self) -> Result<()> {
        required("semester", self.semester())?;
        if let Self::FinalExamSchedule { school, .. } = self {
            required("school", school)?;
        }
        Ok(())
    }

    /// Query string for the downloads endpoint, in wire order.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("method".to_string(), "printDocument".to_string()),
            ("name".to_string(), self.kind().as_str().to_string()),
            ("termid".to_string(), self.semester().trim().to_string()),
        ];

        let (level, school) = match self {
            Self::Schedule {
                academic_level,
                school,
                ..
            }
            | Self::Requirements {
                academic_level,
                school,
                ..
            } => (academic_level.as_deref(), school.as_deref()),
            Self::FinalExamSchedule { school, .. } => (None, Some(school.as_str())),
        };

        if let Some(level) = level {
            params.push(("academiclevel".to_string(), level.to_string()));
        }
        if let Some(school) = school {
            params.push(("schoolid".to_string(), school.trim().to_string()));
        }
        if self.kind() == DocumentKind::FinalExamSchedule {
            params.push(("type".to_string(), "pdf".to_string()));
        }
        params
    }
}

impl RegistrarClient {
    /// Download the PDF for `request` without extracting anything.
    #[instrument(skip(self), fields(kind = %request.kind()))]
    pub async fn fetch_document_pdf(&self, request: &DocumentRequest) -> Result<Bytes> {
        request.validate()?;
        let response = self
            .get(&self.config().downloads_url, &request.query_params())
            .await?;
        let content_type = response.content_type.as_deref().unwrap_or_default();
        if !content_type.is_empty() && !content_type.starts_with("application/pdf") {
            warn!(content_type, url = %response.url, "Document download is not labelled as a PDF");
        }
        debug!(bytes = response.body.len(), content_type, "Downloaded document");
        Ok(response.body)
    }

    /// Download and extract every ruled table of the document as one table.
    pub async fn fetch_document_table(&self, request: &DocumentRequest) -> Result<ExtractedTable> {
        let pdf = self.fetch_document_pdf(request).await?;
        let extractor = self.extractor();

        let pages = tokio::task::spawn_blocking(move || {
            extract_with_fallback(extractor.as_ref(), &pdf, &ExtractOptions::default())
        })
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))??;

        if pages.is_empty() {
            return Err(ExtractError::NoTables.into());
        }

        let mut table = ExtractedTable::concat(pages);
        table.repair_line_breaks();
        debug!(
            rows = table.row_count(),
            columns = table.column_count(),
            "Extracted document table"
        );
        Ok(table)
    }

    /// Download, extract and serialize the document in `shape`.
    pub async fn fetch_document_json(&self, request: &DocumentRequest, shape: JsonShape) -> Result<String> {
        let table = self.fetch_document_table(request).await?;
        Ok(table.to_json(shape))
    }

    /// Course schedule for a semester, optionally narrowed by level and school.
    pub async fn schedule_json(
        &self,
        shape: JsonShape,
        semester: &str,
        academic_level: Option<&str>,
        school: Option<&str>,
    ) -> Result<String> {
        let request = DocumentRequest::schedule(semester, academic_level, school);
        self.fetch_document_json(&request, shape).await
    }

    /// Final exam timetable of one school.
    pub async fn final_exam_schedule_json(&self, shape: JsonShape, semester: &str, school: &str) -> Result<String> {
        let request = DocumentRequest::final_exam_schedule(semester, school);
        self.fetch_document_json(&request, shape).await
    }

    pub async fn requirements_json(
        &self,
        shape: JsonShape,
        semester: &str,
        academic_level: Option<&str>,
        school: Option<&str>,
    ) -> Result<String> {
        let request = DocumentRequest::requirements(semester, academic_level, school);
        self.fetch_document_json(&request, shape).await
    }
}
