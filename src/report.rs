//! Rendering analysis results as a human-readable layout report.
//!
//! This walks the typed result sections in document order and builds one
//! report string: handwriting flags first, then each page's lines and
//! selection marks, then every recognized table cell by cell. Callers decide
//! where the text goes.

use crate::analyze::result::{AnalyzeResult, DocumentPage, DocumentTable};

/// Builds the report text for one [`AnalyzeResult`].
#[derive(Debug, Default)]
pub struct LayoutReport {
    /// The report we're building.
    out: String,
}

impl LayoutReport {
    /// Render a complete result.
    pub fn render(result: &AnalyzeResult) -> String {
        let mut report = LayoutReport::default();
        report.write_styles(result);
        for page in &result.pages {
            report.write_page(page);
        }
        for (index, table) in result.tables.iter().enumerate() {
            report.write_table(index, table);
        }
        report.out
    }

    /// Append one line to the report.
    fn push_line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    /// One line per style, flagging handwritten content.
    fn write_styles(&mut self, result: &AnalyzeResult) {
        for style in &result.styles {
            let line = match (style.is_handwritten, style.confidence) {
                (Some(true), Some(confidence)) => format!(
                    "Document contains handwritten content (confidence {:.2})",
                    confidence
                ),
                (Some(true), None) => {
                    "Document contains handwritten content".to_owned()
                }
                _ => "Document contains no handwritten content".to_owned(),
            };
            self.push_line(&line);
        }
    }

    /// Page header plus its lines and selection marks.
    fn write_page(&mut self, page: &DocumentPage) {
        let mut header = format!("Page {}", page.page_number);
        if let (Some(width), Some(height)) = (page.width, page.height) {
            header.push_str(&format!(" ({} x {}", width, height));
            if let Some(unit) = &page.unit {
                header.push_str(&format!(" {unit}"));
            }
            header.push(')');
        }
        self.push_line(&header);

        for (index, line) in page.lines.iter().enumerate() {
            self.push_line(&format!("  line {}: {:?}", index, line.content));
        }
        for mark in &page.selection_marks {
            self.push_line(&format!(
                "  selection mark: {} (confidence {:.2})",
                mark.state.as_str(),
                mark.confidence
            ));
        }
    }

    /// Table header plus every cell, row-major.
    fn write_table(&mut self, index: usize, table: &DocumentTable) {
        self.push_line(&format!(
            "Table {}: {} rows x {} columns",
            index, table.row_count, table.column_count
        ));
        for cell in &table.cells {
            self.push_line(&format!(
                "  cell[{}][{}]: {:?}",
                cell.row_index, cell.column_index, cell.content
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::result::{
        DocumentLine, DocumentSelectionMark, DocumentStyle, DocumentTableCell,
        SelectionMarkState,
    };

    fn sample_result() -> AnalyzeResult {
        AnalyzeResult {
            api_version: Some("2024-11-30".to_owned()),
            model_id: Some("prebuilt-layout".to_owned()),
            content: "Contoso".to_owned(),
            styles: vec![DocumentStyle {
                is_handwritten: Some(true),
                confidence: Some(0.9),
                spans: vec![],
            }],
            pages: vec![DocumentPage {
                page_number: 1,
                angle: None,
                width: Some(8.5),
                height: Some(11.0),
                unit: Some("inch".to_owned()),
                lines: vec![DocumentLine {
                    content: "Contoso".to_owned(),
                    polygon: vec![],
                    spans: vec![],
                }],
                selection_marks: vec![DocumentSelectionMark {
                    state: SelectionMarkState::Selected,
                    polygon: vec![],
                    confidence: 0.92,
                }],
                spans: vec![],
            }],
            tables: vec![DocumentTable {
                row_count: 1,
                column_count: 2,
                cells: vec![
                    DocumentTableCell {
                        kind: None,
                        row_index: 0,
                        column_index: 0,
                        row_span: None,
                        column_span: None,
                        content: "Item".to_owned(),
                    },
                    DocumentTableCell {
                        kind: None,
                        row_index: 0,
                        column_index: 1,
                        row_span: None,
                        column_span: None,
                        content: "Qty".to_owned(),
                    },
                ],
                bounding_regions: vec![],
            }],
        }
    }

    #[test]
    fn renders_every_section_in_document_order() {
        let report = LayoutReport::render(&sample_result());
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Document contains handwritten content (confidence 0.90)",
                "Page 1 (8.5 x 11 inch)",
                "  line 0: \"Contoso\"",
                "  selection mark: selected (confidence 0.92)",
                "Table 0: 1 rows x 2 columns",
                "  cell[0][0]: \"Item\"",
                "  cell[0][1]: \"Qty\"",
            ]
        );
    }

    #[test]
    fn empty_results_render_to_an_empty_report() {
        let mut result = sample_result();
        result.styles.clear();
        result.pages.clear();
        result.tables.clear();
        assert_eq!(LayoutReport::render(&result), "");
    }
}
