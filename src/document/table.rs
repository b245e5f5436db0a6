//! Page-table concatenation and JSON serialization.
//!
//! Pages are stacked in page order into one [`ExtractedTable`], rows padded
//! to the widest page, and serialized in one of two layouts:
//!
//! ```text
//! table:   {"schema":{"fields":[{"name":0,"type":"string"},..]},"data":[{"0":"A","1":"B"},..]}
//! columns: {"0":{"0":"A","1":"C D"},"1":{"0":"B","1":"E"}}
//! ```

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Number, Value};

use super::extract::{Cell, PageTable};
use crate::error::RegistrarError;

/// JSON layout for an extracted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    /// Explicit schema plus row records, no index.
    Table,
    /// Column label to `{row index: value}`.
    Columns,
}

impl JsonShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Columns => "columns",
        }
    }
}

impl fmt::Display for JsonShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JsonShape {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Self::Table),
            "columns" => Ok(Self::Columns),
            other => Err(RegistrarError::validation(format!(
                "data format must be either 'table' or 'columns', got '{other}'"
            ))),
        }
    }
}

/// Inferred JSON type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Number,
    String,
}

impl ColumnType {
    fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
        }
    }
}

/// All pages of a document as one logical table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTable {
    rows: Vec<Vec<Cell>>,
    width: usize,
}

impl ExtractedTable {
    /// Build from rows; ragged rows are padded with empty cells.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { rows, width }
    }

    /// Stack page tables in the order given. No sorting, no de-duplication.
    pub fn concat(pages: impl IntoIterator<Item = PageTable>) -> Self {
        Self::from_rows(pages.into_iter().flat_map(|page| page.rows).collect())
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.width
    }

    /// Replace every carriage return in every cell with a single space.
    ///
    /// Lattice extraction joins wrapped lines inside a cell with `\r`.
    pub fn repair_line_breaks(&mut self) {
        for cell in self.rows.iter_mut().flatten().flatten() {
            if cell.contains('\r') {
                *cell = cell.replace('\r', " ");
            }
        }
    }

    /// Serialize to a JSON value in `shape`.
    pub fn to_json_value(&self, shape: JsonShape) -> Value {
        let types: Vec<ColumnType> = (0..self.width).map(|col| self.column_type(col)).collect();
        match shape {
            JsonShape::Table => self.table_json(&types),
            JsonShape::Columns => self.columns_json(&types),
        }
    }

    /// Serialize to a compact JSON string in `shape`.
    pub fn to_json(&self, shape: JsonShape) -> String {
        self.to_json_value(shape).to_string()
    }

    fn table_json(&self, types: &[ColumnType]) -> Value {
        let fields: Vec<Value> = types
            .iter()
            .enumerate()
            .map(|(col, ty)| {
                let mut field = Map::new();
                field.insert("name".into(), Value::from(col));
                field.insert("type".into(), Value::from(ty.name()));
                Value::Object(field)
            })
            .collect();

        let data: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let record: Map<String, Value> = row
                    .iter()
                    .enumerate()
                    .map(|(col, cell)| (col.to_string(), typed_value(cell.as_deref(), types[col])))
                    .collect();
                Value::Object(record)
            })
            .collect();

        let mut schema = Map::new();
        schema.insert("fields".into(), Value::Array(fields));

        let mut root = Map::new();
        root.insert("schema".into(), Value::Object(schema));
        root.insert("data".into(), Value::Array(data));
        Value::Object(root)
    }

    fn columns_json(&self, types: &[ColumnType]) -> Value {
        let columns: Map<String, Value> = types
            .iter()
            .enumerate()
            .map(|(col, ty)| {
                let values: Map<String, Value> = self
                    .rows
                    .iter()
                    .enumerate()
                    .map(|(idx, row)| (idx.to_string(), typed_value(row[col].as_deref(), *ty)))
                    .collect();
                (col.to_string(), Value::Object(values))
            })
            .collect();
        Value::Object(columns)
    }

    /// `integer` if every non-empty cell is an `i64`, `number` if every one
    /// is numeric, `string` otherwise. An all-empty column is `string`, as
    /// is one holding a digit string wider than `i64`.
    fn column_type(&self, col: usize) -> ColumnType {
        let mut values = self.rows.iter().filter_map(|row| row[col].as_deref()).peekable();
        if values.peek().is_none() {
            return ColumnType::String;
        }

        let mut ty = ColumnType::Integer;
        for value in values {
            let value = value.trim();
            if value.parse::<i64>().is_ok() {
                continue;
            }
            if is_integer_literal(value) {
                // Too wide for i64; as f64 it would lose digits.
                return ColumnType::String;
            }
            match value.parse::<f64>() {
                Ok(f) if f.is_finite() => ty = ColumnType::Number,
                _ => return ColumnType::String,
            }
        }
        ty
    }
}

/// Optional sign followed by ASCII digits only.
fn is_integer_literal(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn typed_value(cell: Option<&str>, ty: ColumnType) -> Value {
    let Some(text) = cell else {
        return Value::Null;
    };
    match ty {
        ColumnType::Integer => text
            .trim()
            .parse::<i64>()
            .map_or_else(|_| Value::from(text), Value::from),
        ColumnType::Number => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(|| Value::from(text), Value::Number),
        ColumnType::String => Value::from(text),
    }
}
