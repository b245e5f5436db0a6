//! Public course catalog API.
//!
//! The catalog speaks a single form-encoded POST endpoint. Reference
//! entities (semesters, schools, levels, ...) are fetched with
//! `method=get<Type>s`; course search uses the `getSearchData` payload built
//! in [`search`].
//!
//! # Example
//!
//! ```rust,no_run
//! use regi::catalog::EntityKind;
//! use regi::RegistrarClient;
//!
//! # async fn example() -> regi::Result<()> {
//! let client = RegistrarClient::new()?;
//! let fall = client.semester("2024F").await?;
//! println!("{} = {}", fall.id, fall.name);
//!
//! let schools = client.fetch_entities(EntityKind::School).await?;
//! println!("{} schools", schools.len());
//! # Ok(())
//! # }
//! ```

pub mod search;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::client::RegistrarClient;
use crate::error::{RegistrarError, Result};

pub use search::{build_search_payload, SearchFilters, SearchPayload};

/// Key the lookup responses are sorted by.
const SORT_KEY: &str = "ID";

/// Reference entity types the catalog can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Semester,
    School,
    AcademicLevel,
    Department,
    Subject,
    Instructor,
    Breadth,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Semester,
        EntityKind::School,
        EntityKind::AcademicLevel,
        EntityKind::Department,
        EntityKind::Subject,
        EntityKind::Instructor,
        EntityKind::Breadth,
    ];

    /// Name used by the backend (`level` for academic levels).
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Semester => "semester",
            Self::School => "school",
            Self::AcademicLevel => "level",
            Self::Department => "department",
            Self::Subject => "subject",
            Self::Instructor => "instructor",
            Self::Breadth => "breadth",
        }
    }

    /// Lookup method, e.g. `getSemesters`.
    pub fn lookup_method(self) -> String {
        let name = self.wire_name();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        };
        format!("get{capitalized}s")
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for EntityKind {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "semester" | "semesters" => Ok(Self::Semester),
            "school" | "schools" => Ok(Self::School),
            "level" | "levels" | "academic-level" | "academic_level" => Ok(Self::AcademicLevel),
            "department" | "departments" => Ok(Self::Department),
            "subject" | "subjects" => Ok(Self::Subject),
            "instructor" | "instructors" => Ok(Self::Instructor),
            "breadth" | "breadths" => Ok(Self::Breadth),
            other => Err(RegistrarError::validation(format!(
                "unknown entity kind '{other}'"
            ))),
        }
    }
}

/// A catalog reference entity. Identity is by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "ID", deserialize_with = "canonical_id")]
    pub id: String,
    #[serde(rename = "NAME", default, deserialize_with = "lenient_string")]
    pub name: String,
    /// Any other fields the backend sent, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// Result of [`RegistrarClient::fetch_entity`]: one entity when an ID was
/// given, the whole collection otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    One(Entity),
    All(Vec<Entity>),
}

/// Canonical string form of an ID value: strings as-is, numbers in decimal.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn canonical_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_string(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("ID must be a string or number, got {value}")))
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Parse a catalog response body and reject the error envelope.
///
/// The backend answers 200 with `{"status":"error", ...}` when it cannot
/// serve a request, so a successful transport call is not enough.
pub(crate) fn parse_envelope(body: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RegistrarError::Api(format!("invalid JSON in catalog response: {e}")))?;

    if let Some(object) = value.as_object() {
        if object.get("status").and_then(Value::as_str) == Some("error") {
            tracing::error!(response = %value, "Catalog returned an error envelope");
            let detail = object
                .get("message")
                .or_else(|| object.get("error"))
                .map_or_else(|| value.to_string(), ToString::to_string);
            return Err(RegistrarError::Api(format!(
                "error occurred while processing the request: {detail}"
            )));
        }
    }

    Ok(value)
}

/// Stable ascending sort on the string form of `key`.
pub(crate) fn sort_by_key(items: Vec<Value>, key: &str) -> Result<Vec<Value>> {
    let mut keyed = items
        .into_iter()
        .map(|item| {
            let sort_value = item.get(key).and_then(id_string);
            match sort_value {
                Some(k) => Ok((k, item)),
                None => Err(RegistrarError::validation(format!("invalid sort key: {key}"))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

fn parse_entities(kind: EntityKind, value: Value) -> Result<Vec<Entity>> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(RegistrarError::Api(format!(
                "expected a list of {kind}s, got {other}"
            )))
        }
    };

    let items = sort_by_key(items, SORT_KEY)?;
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| RegistrarError::Api(format!("malformed {kind} entry: {e}")))
        })
        .collect()
}

fn find_entity(entities: Vec<Entity>, kind: EntityKind, id: &str) -> Result<Entity> {
    let id = id.trim();
    entities
        .into_iter()
        .find(|entity| entity.id == id)
        .ok_or_else(|| RegistrarError::validation(format!("invalid {kind} id: {id}")))
}

impl RegistrarClient {
    /// All entities of `kind`, sorted ascending by ID.
    pub async fn fetch_entities(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let fields = vec![("method".to_string(), kind.lookup_method())];
        let value = self.post_catalog(&fields).await?;
        let entities = parse_entities(kind, value)?;
        tracing::debug!(kind = %kind, count = entities.len(), "Fetched entities");
        Ok(entities)
    }

    /// Look up one entity by ID, or the whole collection when `id` is `None`.
    ///
    /// An ID with no match is a validation error, never an empty result.
    pub async fn fetch_entity(&self, kind: EntityKind, id: Option<&str>) -> Result<Lookup> {
        let entities = self.fetch_entities(kind).await?;

        match id {
            Some(id) => find_entity(entities, kind, id).map(Lookup::One),
            None => Ok(Lookup::All(entities)),
        }
    }

    async fn entity(&self, kind: EntityKind, id: &str) -> Result<Entity> {
        let entities = self.fetch_entities(kind).await?;
        find_entity(entities, kind, id)
    }

    /// Newest semester: the last one in ascending ID order.
    pub async fn latest_semester(&self) -> Result<Entity> {
        self.semesters()
            .await?
            .pop()
            .ok_or_else(|| RegistrarError::Api("no semesters published".to_string()))
    }

    pub async fn semesters(&self) -> Result<Vec<Entity>> {
        self.fetch_entities(EntityKind::Semester).await
    }

    pub async fn semester(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::Semester, id).await
    }

    pub async fn schools(&self) -> Result<Vec<Entity>> {
        self.fetch_entities(EntityKind::School).await
    }

    pub async fn school(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::School, id).await
    }

    pub async fn academic_levels(&self) -> Result<Vec<Entity>> {
        self.fetch_entities(EntityKind::AcademicLevel).await
    }

    pub async fn academic_level(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::AcademicLevel, id).await
    }

    pub async fn departments(&self) -> Result<Vec<Entity>> {
        self.fetch_entities(EntityKind::Department).await
    }

    pub async fn department(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::Department, id).await
    }

    pub async fn subjects(&self) -> Result<Vec<Entity>> {
        self.fetch_entities(EntityKind::Subject).await
    }

    pub async fn subject(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::Subject, id).await
    }

    pub async fn instructors(&self) -> Result<Vec<Entity>> {
        self.fetch_entities(EntityKind::Instructor).await
    }

    pub async fn instructor(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::Instructor, id).await
    }

    pub async fn breadths(&self) -> Result<Vec<Entity>> {
        self.fetch_entities(EntityKind::Breadth).await
    }

    pub async fn breadth(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::Breadth, id).await
    }

    /// Run a course search and return the backend's JSON untouched.
    pub async fn search(&self, filters: &SearchFilters) -> Result<Value> {
        let payload = build_search_payload(filters);
        self.post_catalog(payload.fields()).await
    }
}
