//! Course search payload.
//!
//! The catalog's `getSearchData` endpoint expects a flat form whose field
//! *names* change with the filters: a filter that is set is sent as an
//! array field (`searchParams[schools][]=13`), an unset one as a plain
//! empty field (`searchParams[schools]=`). Field order is fixed.

use crate::error::{RegistrarError, Result};

/// Page sent when no offset is given.
const DEFAULT_PAGE: &str = "1";

/// Semester sent when unfiltered; the backend reads it as "latest".
const UNFILTERED_SEMESTER: &str = "-1";

/// Filters for a course search. Only `limit` is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    limit: u32,
    page: Option<u32>,
    semester: Option<String>,
    school: Option<String>,
    department: Option<String>,
    level: Option<String>,
    subject: Option<String>,
    instructor: Option<String>,
    breadth: Option<String>,
}

impl SearchFilters {
    /// Unfiltered search returning at most `limit` courses per page.
    pub fn new(limit: u32) -> Result<Self> {
        if limit == 0 {
            return Err(RegistrarError::validation("limit must be positive"));
        }
        Ok(Self {
            limit,
            page: None,
            semester: None,
            school: None,
            department: None,
            level: None,
            subject: None,
            instructor: None,
            breadth: None,
        })
    }

    /// 1-based result page. `0` is treated as unset.
    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn semester(mut self, id: impl Into<String>) -> Self {
        self.semester = Some(id.into());
        self
    }

    #[must_use]
    pub fn school(mut self, id: impl Into<String>) -> Self {
        self.school = Some(id.into());
        self
    }

    #[must_use]
    pub fn department(mut self, id: impl Into<String>) -> Self {
        self.department = Some(id.into());
        self
    }

    #[must_use]
    pub fn level(mut self, id: impl Into<String>) -> Self {
        self.level = Some(id.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, id: impl Into<String>) -> Self {
        self.subject = Some(id.into());
        self
    }

    #[must_use]
    pub fn instructor(mut self, id: impl Into<String>) -> Self {
        self.instructor = Some(id.into());
        self
    }

    #[must_use]
    pub fn breadth(mut self, id: impl Into<String>) -> Self {
        self.breadth = Some(id.into());
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Ordered form fields for one search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPayload {
    fields: Vec<(String, String)>,
}

impl SearchPayload {
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first field called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A set, non-empty filter value.
fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// `searchParams[<name>][]` with the ID when set, `searchParams[<name>]` with
/// an empty value when not.
fn array_field(name: &str, value: Option<&String>) -> (String, String) {
    match present(value) {
        Some(id) => (format!("searchParams[{name}][]"), id.to_string()),
        None => (format!("searchParams[{name}]"), String::new()),
    }
}

fn scalar_field(name: &str, value: impl Into<String>) -> (String, String) {
    (format!("searchParams[{name}]"), value.into())
}

/// Build the form payload for `filters`. Pure and deterministic.
pub fn build_search_payload(filters: &SearchFilters) -> SearchPayload {
    let page = filters
        .page
        .filter(|&p| p > 0)
        .map_or_else(|| DEFAULT_PAGE.to_string(), |p| p.to_string());
    let semester = present(filters.semester.as_ref()).unwrap_or(UNFILTERED_SEMESTER);

    let fields = vec![
        ("method".to_string(), "getSearchData".to_string()),
        scalar_field("formSimple", "false"),
        scalar_field("limit", filters.limit.to_string()),
        scalar_field("page", page),
        scalar_field("start", "0"),
        scalar_field("quickSearch", ""),
        scalar_field("sortField", "-1"),
        scalar_field("sortDescending", "-1"),
        scalar_field("semester", semester),
        array_field("schools", filters.school.as_ref()),
        array_field("departments", filters.department.as_ref()),
        array_field("levels", filters.level.as_ref()),
        array_field("subjects", filters.subject.as_ref()),
        array_field("instructors", filters.instructor.as_ref()),
        array_field("breadths", filters.breadth.as_ref()),
        scalar_field("abbrNum", ""),
        scalar_field("credit", ""),
    ];

    SearchPayload { fields }
}
