//! Lattice (ruled-border) table extraction over `pdfplumber`.
//!
//! `pdfplumber` finds the ruled tables on each page and resolves every glyph
//! through its font's ToUnicode map, `/Encoding` and `/Differences`, or CID
//! mapping. Cell text is assembled here from the page's chars so that glyphs
//! of fonts with none of those can be read in the requested [`TextEncoding`]:
//!
//! ```text
//! PDF bytes → lattice tables → chars per cell → lines → "line1\rline2"
//! ```
//!
//! Fonts are classified with `lopdf`, which sees the raw font dictionaries
//! `pdfplumber` does not expose.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};
use pdfplumber::{BBox, Char, Pdf, Strategy, TableSettings};
use tracing::debug;

use super::extract::{Cell, ExtractError, ExtractOptions, PageTable, TableExtractor, TextEncoding};

/// Glyphs whose tops differ by less than this (in points) share a line.
const LINE_TOLERANCE: f64 = 3.0;

/// Horizontal gap (in points) that separates two words on a line.
const WORD_GAP: f64 = 3.0;

/// Bound on `/Parent` hops when looking up inherited page resources.
const MAX_INHERIT_DEPTH: usize = 32;

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// `/Resources /Font` of a page, following `/Parent` inheritance.
fn page_fonts(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            let resources = resolve(doc, resources)?.as_dict().ok()?;
            return resolve(doc, resources.get(b"Font").ok()?)?.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Drop a subset tag such as `ABCDEF+` from a font name.
fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// Names of the simple fonts on a page with neither a `/ToUnicode` map nor
/// an `/Encoding`. Their glyph codes are bytes in an unknown text encoding.
///
/// Names match `Char::fontname`: the `/BaseFont` without its subset tag,
/// or the resource key when there is no `/BaseFont`. A name shared with a
/// mapped font is never raw.
fn raw_fonts(doc: &Document, page_id: ObjectId) -> HashSet<String> {
    let mut raw = HashSet::new();
    let mut mapped = HashSet::new();
    let Some(fonts) = page_fonts(doc, page_id) else {
        return raw;
    };

    for (key, font) in fonts.iter() {
        let Some(font) = resolve(doc, font).and_then(|o| o.as_dict().ok()) else {
            continue;
        };
        let name = match font.get(b"BaseFont").ok().and_then(|o| o.as_name().ok()) {
            Some(base) => strip_subset_prefix(&String::from_utf8_lossy(base)).to_string(),
            None => String::from_utf8_lossy(key).into_owned(),
        };
        let composite = font
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .is_some_and(|subtype| subtype == b"Type0");

        if composite || font.has(b"ToUnicode") || font.has(b"Encoding") {
            mapped.insert(name);
        } else {
            raw.insert(name);
        }
    }

    raw.retain(|name| !mapped.contains(name));
    raw
}

fn contains(bbox: &BBox, ch: &Char) -> bool {
    let cx = (ch.bbox.x0 + ch.bbox.x1) / 2.0;
    let cy = (ch.bbox.top + ch.bbox.bottom) / 2.0;
    cx >= bbox.x0 && cx <= bbox.x1 && cy >= bbox.top && cy <= bbox.bottom
}

/// Decoded text of one cell line.
struct LineText<'a> {
    raw: &'a HashSet<String>,
    encoding: TextEncoding,
    text: String,
    /// Raw glyph codes not yet decoded. Multi-byte UTF-8 sequences span
    /// several glyphs, so runs are decoded together.
    pending: Vec<u8>,
}

impl<'a> LineText<'a> {
    fn new(raw: &'a HashSet<String>, encoding: TextEncoding) -> Self {
        Self {
            raw,
            encoding,
            text: String::new(),
            pending: Vec::new(),
        }
    }

    fn flush(&mut self) -> Result<(), ExtractError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let decoded = self.encoding.decode(&self.pending).ok_or(ExtractError::Decode {
            encoding: self.encoding.name(),
        })?;
        self.text.push_str(&decoded);
        self.pending.clear();
        Ok(())
    }

    fn push(&mut self, ch: &Char) -> Result<(), ExtractError> {
        let raw_code = self
            .raw
            .contains(&ch.fontname)
            .then(|| u8::try_from(ch.char_code).ok())
            .flatten();
        match raw_code {
            Some(byte) => self.pending.push(byte),
            None => {
                self.flush()?;
                self.text.push_str(&ch.text);
            }
        }
        Ok(())
    }

    fn space(&mut self) -> Result<(), ExtractError> {
        self.flush()?;
        self.text.push(' ');
        Ok(())
    }

    fn finish(mut self) -> Result<String, ExtractError> {
        self.flush()?;
        Ok(self.text.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Text of the chars inside one cell; lines are joined with `\r`.
fn cell_text(mut chars: Vec<&Char>, raw: &HashSet<String>, encoding: TextEncoding) -> Result<Cell, ExtractError> {
    chars.sort_by(|a, b| {
        a.bbox
            .top
            .total_cmp(&b.bbox.top)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    let mut lines: Vec<Vec<&Char>> = Vec::new();
    for ch in chars {
        match lines.last_mut() {
            Some(line) if (ch.bbox.top - line[0].bbox.top).abs() <= LINE_TOLERANCE => line.push(ch),
            _ => lines.push(vec![ch]),
        }
    }

    let mut texts = Vec::new();
    for mut line in lines {
        line.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        let mut text = LineText::new(raw, encoding);
        let mut prev_x1: Option<f64> = None;
        for ch in line {
            if prev_x1.is_some_and(|x1| ch.bbox.x0 - x1 > WORD_GAP) {
                text.space()?;
            }
            text.push(ch)?;
            prev_x1 = Some(ch.bbox.x1);
        }
        let text = text.finish()?;
        if !text.is_empty() {
            texts.push(text);
        }
    }

    Ok((!texts.is_empty()).then(|| texts.join("\r")))
}

/// [`TableExtractor`] for PDFs whose tables have visible cell borders.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatticeExtractor;

impl LatticeExtractor {
    pub fn new() -> Self {
        Self
    }

    fn settings() -> TableSettings {
        TableSettings {
            strategy: Strategy::Lattice,
            ..TableSettings::default()
        }
    }
}

impl TableExtractor for LatticeExtractor {
    fn extract(&self, bytes: &[u8], options: &ExtractOptions) -> Result<Vec<PageTable>, ExtractError> {
        if !options.lattice {
            return Err(ExtractError::InvalidPdf(
                "only lattice extraction is supported".to_string(),
            ));
        }

        let pdf = Pdf::open(bytes, None).map_err(|e| ExtractError::InvalidPdf(e.to_string()))?;
        let doc = Document::load_mem(bytes).map_err(|e| ExtractError::InvalidPdf(e.to_string()))?;
        let settings = Self::settings();
        let mut tables = Vec::new();

        for (index, page_id) in doc.get_pages().into_values().enumerate() {
            if index >= pdf.page_count() || !options.pages.includes(index) {
                continue;
            }

            let page = pdf
                .page(index)
                .map_err(|e| ExtractError::InvalidPdf(format!("page {}: {e}", index + 1)))?;
            let raw = raw_fonts(&doc, page_id);

            let mut found = page.find_tables(&settings);
            found.sort_by(|a, b| a.bbox.top.total_cmp(&b.bbox.top));

            let mut rows = Vec::new();
            for table in &found {
                for row in &table.rows {
                    let cells = row
                        .iter()
                        .map(|cell| {
                            let chars = page.chars().iter().filter(|ch| contains(&cell.bbox, ch)).collect();
                            cell_text(chars, &raw, options.encoding)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    rows.push(cells);
                }
            }

            if options.header && !rows.is_empty() {
                rows.remove(0);
            }
            debug!(page = index + 1, tables = found.len(), rows = rows.len(), "Extracted page table");

            if !rows.is_empty() {
                tables.push(PageTable::new(index, rows));
            }
        }

        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PageSelection;
    use lopdf::{dictionary, Stream};

    fn helvetica(doc: &mut Document) -> ObjectId {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        })
    }

    /// Build a PDF with one page per content stream, `F1` set by `font`.
    fn build_pdf_with(contents: &[Vec<u8>], font: impl FnOnce(&mut Document) -> ObjectId) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let font_id = font(&mut doc);

        let media_box = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ];

        let mut page_ids = Vec::new();
        for content in contents {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.clone()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => media_box.clone(),
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
            });
            page_ids.push(page_id);
        }

        let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_ids.len() as i64),
        });

        for page_id in &page_ids {
            if let Ok(page) = doc.get_object_mut(*page_id) {
                if let Ok(dict) = page.as_dict_mut() {
                    dict.set("Parent", Object::Reference(pages_id));
                }
            }
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn build_pdf(contents: &[Vec<u8>]) -> Vec<u8> {
        build_pdf_with(contents, helvetica)
    }

    /// 2x2 grid between x=100..300 and y=660..700, drawn with lines.
    const GRID: &str = "0.5 w \
        100 700 m 300 700 l S 100 680 m 300 680 l S 100 660 m 300 660 l S \
        100 660 m 100 700 l S 200 660 m 200 700 l S 300 660 m 300 700 l S ";

    /// A single ruled cell between x=100..300 and y=660..700.
    const BOX: &str =
        "100 700 m 300 700 l S 100 660 m 300 660 l S 100 660 m 100 700 l S 300 660 m 300 700 l S ";

    fn text(x: u32, y: u32, s: &str) -> String {
        format!("BT /F1 10 Tf {x} {y} Td ({s}) Tj ET ")
    }

    fn grid_page(cells: [&str; 4]) -> Vec<u8> {
        let mut content = GRID.to_string();
        content.push_str(&text(105, 685, cells[0]));
        content.push_str(&text(205, 685, cells[1]));
        content.push_str(&text(105, 665, cells[2]));
        content.push_str(&text(205, 665, cells[3]));
        content.into_bytes()
    }

    fn boxed(show: &str) -> Vec<u8> {
        format!("{BOX}BT /F1 10 Tf 105 675 Td {show} Tj ET ").into_bytes()
    }

    fn cell(s: &str) -> Cell {
        Some(s.to_string())
    }

    fn extract(pdf: &[u8]) -> Result<Vec<PageTable>, ExtractError> {
        LatticeExtractor::new().extract(pdf, &ExtractOptions::default())
    }

    #[test]
    fn ruled_grid_yields_rows() {
        let pdf = build_pdf(&[grid_page(["A", "B", "C", "D"])]);
        let tables = extract(&pdf).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].page, 0);
        assert_eq!(
            tables[0].rows,
            vec![vec![cell("A"), cell("B")], vec![cell("C"), cell("D")]]
        );
    }

    #[test]
    fn rectangle_borders_work_like_lines() {
        let mut content = String::from(
            "100 680 100 20 re S 200 680 100 20 re S 100 660 100 20 re S 200 660 100 20 re S ",
        );
        content.push_str(&text(105, 685, "Mon"));
        content.push_str(&text(205, 665, "Fri"));
        let pdf = build_pdf(&[content.into_bytes()]);

        let tables = extract(&pdf).unwrap();
        assert_eq!(
            tables[0].rows,
            vec![vec![cell("Mon"), None], vec![None, cell("Fri")]]
        );
    }

    #[test]
    fn words_keep_their_spaces() {
        let pdf = build_pdf(&[grid_page(["CSCI 151", "7.210", "MATH 161", "Online"])]);
        let tables = extract(&pdf).unwrap();
        assert_eq!(tables[0].rows[0], vec![cell("CSCI 151"), cell("7.210")]);
    }

    #[test]
    fn wrapped_lines_are_joined_with_carriage_return() {
        let mut content = BOX.to_string();
        content.push_str("BT /F1 8 Tf 105 688 Td (Line1) Tj 0 -10 Td (Line2) Tj ET ");
        let pdf = build_pdf(&[content.into_bytes()]);

        let tables = extract(&pdf).unwrap();
        assert_eq!(tables[0].rows, vec![vec![cell("Line1\rLine2")]]);
    }

    #[test]
    fn pages_come_back_in_order() {
        let pdf = build_pdf(&[
            grid_page(["A", "B", "C", "D"]),
            grid_page(["E", "F", "G", "H"]),
        ]);
        let tables = extract(&pdf).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].page, 1);
        assert_eq!(tables[1].rows[0], vec![cell("E"), cell("F")]);
    }

    #[test]
    fn page_selection_skips_pages() {
        let pdf = build_pdf(&[
            grid_page(["A", "B", "C", "D"]),
            grid_page(["E", "F", "G", "H"]),
        ]);
        let options = ExtractOptions {
            pages: PageSelection::Pages(vec![1]),
            ..ExtractOptions::default()
        };
        let tables = LatticeExtractor::new().extract(&pdf, &options).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].page, 1);
    }

    #[test]
    fn text_without_rulings_is_not_a_table() {
        let pdf = build_pdf(&[text(72, 720, "Just a heading").into_bytes()]);
        assert!(extract(&pdf).unwrap().is_empty());
    }

    #[test]
    fn non_utf8_text_fails_only_as_utf8() {
        let pdf = build_pdf(&[boxed("<436166E9>")]);

        let err = extract(&pdf).unwrap_err();
        assert_eq!(err, ExtractError::Decode { encoding: "utf-8" });

        let options = ExtractOptions::default().with_encoding(TextEncoding::Windows1252);
        let tables = LatticeExtractor::new().extract(&pdf, &options).unwrap();
        assert_eq!(tables[0].rows, vec![vec![cell("Café")]]);
    }

    #[test]
    fn multibyte_utf8_spans_glyphs() {
        let pdf = build_pdf(&[boxed("<436166C3A9>")]);
        let tables = extract(&pdf).unwrap();
        assert_eq!(tables[0].rows, vec![vec![cell("Café")]]);
    }

    #[test]
    fn standard_encoding_is_not_reinterpreted() {
        let pdf = build_pdf_with(&[boxed("<436166E9>")], |doc| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            })
        });

        let tables = extract(&pdf).unwrap();
        assert_eq!(tables[0].rows, vec![vec![cell("Café")]]);
    }

    #[test]
    fn type0_font_text_goes_through_to_unicode() {
        let pdf = build_pdf_with(&[boxed("<00240025>")], |doc| {
            let to_unicode = b"\
                /CIDInit /ProcSet findresource begin\n\
                12 dict begin\n\
                begincmap\n\
                /CMapName /Adobe-Identity-UCS def\n\
                /CMapType 2 def\n\
                1 begincodespacerange\n\
                <0000> <FFFF>\n\
                endcodespacerange\n\
                2 beginbfchar\n\
                <0024> <0041>\n\
                <0025> <0042>\n\
                endbfchar\n\
                endcmap\n";
            let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, to_unicode.to_vec()));
            let cid_font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "CIDFontType2",
                "BaseFont" => "ABCDEF+Arial",
                "DW" => Object::Integer(1000),
                "CIDToGIDMap" => "Identity",
                "CIDSystemInfo" => dictionary! {
                    "Registry" => Object::string_literal("Adobe"),
                    "Ordering" => Object::string_literal("Identity"),
                    "Supplement" => Object::Integer(0),
                },
            });
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => "ABCDEF+Arial",
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![Object::Reference(cid_font_id)],
                "ToUnicode" => Object::Reference(to_unicode_id),
            })
        });

        let tables = extract(&pdf).unwrap();
        assert_eq!(tables[0].rows, vec![vec![cell("AB")]]);
    }

    #[test]
    fn garbage_is_invalid_pdf() {
        let err = extract(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPdf(_)));
    }

    #[test]
    fn stream_mode_is_rejected() {
        let pdf = build_pdf(&[grid_page(["A", "B", "C", "D"])]);
        let options = ExtractOptions {
            lattice: false,
            ..ExtractOptions::default()
        };
        let err = LatticeExtractor::new().extract(&pdf, &options).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPdf(_)));
    }

    #[test]
    fn header_option_drops_first_row() {
        let pdf = build_pdf(&[grid_page(["Course", "Room", "CSCI 151", "7.210"])]);
        let options = ExtractOptions {
            header: true,
            ..ExtractOptions::default()
        };
        let tables = LatticeExtractor::new().extract(&pdf, &options).unwrap();
        assert_eq!(tables[0].rows, vec![vec![cell("CSCI 151"), cell("7.210")]]);
    }

    #[test]
    fn raw_fonts_skip_mapped_fonts() {
        let mut doc = Document::with_version("1.5");
        let plain = helvetica(&mut doc);
        let encoded = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "XYZABC+Times-Roman",
            "Encoding" => "WinAnsiEncoding",
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    "F1" => Object::Reference(plain),
                    "F2" => Object::Reference(encoded),
                },
            },
        });

        let raw = raw_fonts(&doc, page_id);
        assert!(raw.contains("Helvetica"));
        assert!(!raw.contains("Times-Roman"));
    }

    #[test]
    fn subset_prefix_is_stripped() {
        assert_eq!(strip_subset_prefix("ABCDEF+Arial"), "Arial");
        assert_eq!(strip_subset_prefix("Arial"), "Arial");
        assert_eq!(strip_subset_prefix("abc+Arial"), "abc+Arial");
    }
}
