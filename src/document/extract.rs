//! Table extraction contract.
//!
//! A [`TableExtractor`] turns raw PDF bytes into one [`PageTable`] per page
//! that carries a ruled table. Implementations are stateless and synchronous;
//! the client runs them inside `tokio::task::spawn_blocking`.

use thiserror::Error;
use tracing::warn;

/// One cell: text, or `None` when the cell is empty.
pub type Cell = Option<String>;

/// Rows of cells extracted from a single page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTable {
    /// Page index (0-based).
    pub page: usize,
    pub rows: Vec<Vec<Cell>>,
}

impl PageTable {
    pub fn new(page: usize, rows: Vec<Vec<Cell>>) -> Self {
        Self { page, rows }
    }
}

/// Encoding applied to glyph codes of fonts that carry neither a ToUnicode
/// map nor an `/Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// Windows code page 1252, the fallback for legacy producers.
    Windows1252,
}

impl TextEncoding {
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Windows1252 => "windows-1252",
        }
    }

    /// Decode `bytes`, or `None` when they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            Self::Windows1252 => encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(std::borrow::Cow::into_owned),
        }
    }
}

/// Which pages to scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageSelection {
    #[default]
    All,
    /// Explicit 0-based page indices.
    Pages(Vec<usize>),
}

impl PageSelection {
    pub fn includes(&self, page: usize) -> bool {
        match self {
            Self::All => true,
            Self::Pages(pages) => pages.contains(&page),
        }
    }
}

/// Options passed to every extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub pages: PageSelection,
    /// Cells are delimited by ruling lines.
    pub lattice: bool,
    /// Treat the first row as a header. The registrar's documents have none.
    pub header: bool,
    pub encoding: TextEncoding,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            pages: PageSelection::All,
            lattice: true,
            header: false,
            encoding: TextEncoding::Utf8,
        }
    }
}

impl ExtractOptions {
    #[must_use]
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Failures turning a downloaded document or page into data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// Text in the document is not valid in the requested encoding.
    #[error("text is not valid {encoding}")]
    Decode { encoding: &'static str },

    #[error("not a valid PDF: {0}")]
    InvalidPdf(String),

    #[error("no ruled tables found")]
    NoTables,

    #[error("both utf-8 and windows-1252 decoding failed")]
    EncodingExhausted,

    /// The blocking extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Task(String),

    /// The course-schedules page links no published schedule.
    #[error("no published semester link on the course-schedules page")]
    NoPublishedSemester,

    #[error("unreadable page markup: {0}")]
    Markup(String),
}

/// Extracts ruled tables from PDF bytes.
pub trait TableExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], options: &ExtractOptions) -> Result<Vec<PageTable>, ExtractError>;
}

/// Run `extractor` as UTF-8, retrying the whole extraction once as
/// Windows-1252 if decoding fails. Any other failure is returned as-is.
pub fn extract_with_fallback(
    extractor: &dyn TableExtractor,
    bytes: &[u8],
    options: &ExtractOptions,
) -> Result<Vec<PageTable>, ExtractError> {
    let primary = options.clone().with_encoding(TextEncoding::Utf8);
    match extractor.extract(bytes, &primary) {
        Err(ExtractError::Decode { .. }) => {
            warn!("Failed to read document text as utf-8, falling back to windows-1252");
            let fallback = options.clone().with_encoding(TextEncoding::Windows1252);
            extractor.extract(bytes, &fallback).map_err(|e| match e {
                ExtractError::Decode { .. } => ExtractError::EncodingExhausted,
                other => other,
            })
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubExtractor;

    fn cell(s: &str) -> Cell {
        Some(s.to_string())
    }

    #[test]
    fn utf8_rejects_invalid_bytes() {
        assert_eq!(TextEncoding::Utf8.decode(b"caf\xc3\xa9"), Some("café".to_string()));
        assert_eq!(TextEncoding::Utf8.decode(b"caf\xe9"), None);
    }

    #[test]
    fn windows_1252_decodes_legacy_bytes() {
        assert_eq!(
            TextEncoding::Windows1252.decode(b"caf\xe9 \x93q\x94"),
            Some("café \u{201c}q\u{201d}".to_string())
        );
    }

    #[test]
    fn default_options_are_lattice_all_pages_no_header() {
        let options = ExtractOptions::default();
        assert!(options.lattice);
        assert!(!options.header);
        assert_eq!(options.pages, PageSelection::All);
        assert_eq!(options.encoding, TextEncoding::Utf8);
    }

    #[test]
    fn utf8_success_does_not_retry() {
        let extractor = StubExtractor::pages(vec![PageTable::new(0, vec![vec![cell("A")]])]);
        let tables = extract_with_fallback(&extractor, b"%PDF", &ExtractOptions::default()).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(extractor.encodings(), vec![TextEncoding::Utf8]);
    }

    #[test]
    fn decode_failure_retries_once_with_windows_1252() {
        let extractor = StubExtractor::pages(vec![PageTable::new(0, vec![vec![cell("B")]])])
            .failing_for(TextEncoding::Utf8);
        let tables = extract_with_fallback(&extractor, b"%PDF", &ExtractOptions::default()).unwrap();
        assert_eq!(tables[0].rows, vec![vec![cell("B")]]);
        assert_eq!(
            extractor.encodings(),
            vec![TextEncoding::Utf8, TextEncoding::Windows1252]
        );
    }

    #[test]
    fn both_encodings_failing_is_fatal() {
        let extractor = StubExtractor::default()
            .failing_for(TextEncoding::Utf8)
            .failing_for(TextEncoding::Windows1252);
        let err = extract_with_fallback(&extractor, b"%PDF", &ExtractOptions::default()).unwrap_err();
        assert_eq!(err, ExtractError::EncodingExhausted);
        assert_eq!(extractor.encodings().len(), 2);
    }

    #[test]
    fn invalid_pdf_is_not_retried() {
        let extractor = StubExtractor::error(ExtractError::InvalidPdf("bad header".into()));
        let err = extract_with_fallback(&extractor, b"nope", &ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPdf(_)));
        assert_eq!(extractor.encodings().len(), 1);
    }
}
