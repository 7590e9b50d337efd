//! Typed layout-analysis results.
//!
//! The service returns one deeply nested JSON document per analysis. Rather
//! than walking it dynamically, we model each section we consume as an
//! explicit type: styles, pages with their lines and selection marks, and
//! tables with their cells. Fields we don't consume are tolerated and
//! dropped during deserialization, since the service adds fields between API
//! versions.

use schemars::JsonSchema;

use crate::prelude::*;

/// The complete result of one layout analysis.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    /// The service API version that produced this result.
    pub api_version: Option<String>,

    /// The model that performed the analysis, e.g. `prebuilt-layout`.
    pub model_id: Option<String>,

    /// The full extracted text, in reading order.
    #[serde(default)]
    pub content: String,

    /// Text styles observed in the document, including handwriting flags.
    #[serde(default)]
    pub styles: Vec<DocumentStyle>,

    /// Per-page layout elements.
    #[serde(default)]
    pub pages: Vec<DocumentPage>,

    /// Tables recognized anywhere in the document.
    #[serde(default)]
    pub tables: Vec<DocumentTable>,
}

/// A text style observed somewhere in the document.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStyle {
    /// Whether the spans covered by this style are handwritten.
    pub is_handwritten: Option<bool>,

    /// The service's confidence in this style, between 0.0 and 1.0.
    pub confidence: Option<f64>,

    /// The content regions this style applies to.
    #[serde(default)]
    pub spans: Vec<DocumentSpan>,
}

/// Layout elements extracted from one page.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    /// 1-based page number.
    pub page_number: u32,

    /// Rotation of the page text, in degrees.
    pub angle: Option<f64>,

    /// Page width, in `unit`s.
    pub width: Option<f64>,

    /// Page height, in `unit`s.
    pub height: Option<f64>,

    /// The measurement unit for `width`/`height` (`pixel` or `inch`).
    pub unit: Option<String>,

    /// Text lines, in reading order.
    #[serde(default)]
    pub lines: Vec<DocumentLine>,

    /// Checkboxes and radio buttons found on the page.
    #[serde(default)]
    pub selection_marks: Vec<DocumentSelectionMark>,

    /// The content regions this page covers.
    #[serde(default)]
    pub spans: Vec<DocumentSpan>,
}

/// One line of text on a page.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLine {
    /// The text content of the line.
    pub content: String,

    /// Bounding polygon, as alternating x/y coordinates.
    #[serde(default)]
    pub polygon: Vec<f64>,

    /// The content regions this line covers.
    #[serde(default)]
    pub spans: Vec<DocumentSpan>,
}

/// Whether a selection mark is checked.
#[derive(Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMarkState {
    /// The mark is checked.
    Selected,
    /// The mark is unchecked.
    Unselected,
}

impl SelectionMarkState {
    /// The wire name of this state, for display.
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionMarkState::Selected => "selected",
            SelectionMarkState::Unselected => "unselected",
        }
    }
}

/// A checkbox or radio button found on a page.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSelectionMark {
    /// Whether the mark is checked.
    pub state: SelectionMarkState,

    /// Bounding polygon, as alternating x/y coordinates.
    #[serde(default)]
    pub polygon: Vec<f64>,

    /// The service's confidence in this mark, between 0.0 and 1.0.
    pub confidence: f64,
}

/// A table recognized in the document.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTable {
    /// Number of rows.
    pub row_count: u32,

    /// Number of columns.
    pub column_count: u32,

    /// The cells of the table, in row-major order.
    #[serde(default)]
    pub cells: Vec<DocumentTableCell>,

    /// Where the table appears in the document.
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
}

/// One cell of a recognized table.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTableCell {
    /// The cell kind (`columnHeader`, `rowHeader`, etc.), when not a plain
    /// content cell.
    pub kind: Option<String>,

    /// 0-based row position.
    pub row_index: u32,

    /// 0-based column position.
    pub column_index: u32,

    /// Number of rows this cell spans, when more than one.
    pub row_span: Option<u32>,

    /// Number of columns this cell spans, when more than one.
    pub column_span: Option<u32>,

    /// The text content of the cell.
    #[serde(default)]
    pub content: String,
}

/// A contiguous region of the document's extracted text.
#[derive(Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSpan {
    /// Byte offset into the extracted text.
    pub offset: u64,

    /// Length of the region, in bytes.
    pub length: u64,
}

/// A polygon on a specific page.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRegion {
    /// 1-based page number.
    pub page_number: u32,

    /// Bounding polygon, as alternating x/y coordinates.
    #[serde(default)]
    pub polygon: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A trimmed-down service response covering every section we consume.
    const SAMPLE: &str = r#"{
        "apiVersion": "2024-11-30",
        "modelId": "prebuilt-layout",
        "stringIndexType": "textElements",
        "content": "Contoso\nPurchase Order",
        "styles": [
            {"isHandwritten": true, "confidence": 0.9, "spans": [{"offset": 0, "length": 7}]}
        ],
        "pages": [
            {
                "pageNumber": 1,
                "angle": 0.12,
                "width": 8.5,
                "height": 11.0,
                "unit": "inch",
                "words": [],
                "lines": [
                    {"content": "Contoso", "polygon": [1.0, 1.0, 2.0, 1.0, 2.0, 1.2, 1.0, 1.2], "spans": [{"offset": 0, "length": 7}]}
                ],
                "selectionMarks": [
                    {"state": "selected", "polygon": [3.0, 3.0, 3.2, 3.0, 3.2, 3.2, 3.0, 3.2], "confidence": 0.92, "span": {"offset": 8, "length": 1}}
                ],
                "spans": [{"offset": 0, "length": 22}]
            }
        ],
        "tables": [
            {
                "rowCount": 2,
                "columnCount": 2,
                "cells": [
                    {"kind": "columnHeader", "rowIndex": 0, "columnIndex": 0, "content": "Item"},
                    {"kind": "columnHeader", "rowIndex": 0, "columnIndex": 1, "content": "Qty"},
                    {"rowIndex": 1, "columnIndex": 0, "content": "Widget"},
                    {"rowIndex": 1, "columnIndex": 1, "content": "3"}
                ],
                "boundingRegions": [{"pageNumber": 1, "polygon": [0.5, 4.0, 4.0, 4.0, 4.0, 6.0, 0.5, 6.0]}]
            }
        ]
    }"#;

    #[test]
    fn deserializes_a_real_shaped_response() {
        let result: AnalyzeResult = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(result.model_id.as_deref(), Some("prebuilt-layout"));
        assert_eq!(result.styles.len(), 1);
        assert_eq!(result.styles[0].is_handwritten, Some(true));

        let page = &result.pages[0];
        assert_eq!(page.page_number, 1);
        assert_eq!(page.unit.as_deref(), Some("inch"));
        assert_eq!(page.lines[0].content, "Contoso");
        assert_eq!(
            page.selection_marks[0].state,
            SelectionMarkState::Selected
        );

        let table = &result.tables[0];
        assert_eq!((table.row_count, table.column_count), (2, 2));
        assert_eq!(table.cells.len(), 4);
        assert_eq!(table.cells[0].kind.as_deref(), Some("columnHeader"));
        assert_eq!(table.cells[3].content, "3");
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let result: AnalyzeResult =
            serde_json::from_str(r#"{"content": "nothing to see"}"#).unwrap();
        assert!(result.styles.is_empty());
        assert!(result.pages.is_empty());
        assert!(result.tables.is_empty());
    }
}
