//! PDF text extraction feeding the chunking stage.

use std::fmt;
use std::path::Path;

use lopdf::Document;

/// Errors surfaced while opening a document for extraction.
#[derive(Debug)]
pub enum ExtractError {
    /// The document could not be opened or parsed at all.
    Open(lopdf::Error),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(err) => write!(f, "failed to open document: {err}"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// One successfully extracted page.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// 1-based page number within the source document.
    pub page_no: u32,
    /// Raw text recovered from the page.
    pub text: String,
}

/// A page that failed to extract and was skipped.
#[derive(Debug, Clone)]
pub struct SkippedPage {
    /// 1-based page number within the source document.
    pub page_no: u32,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Outcome of walking every page of a document.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Pages that extracted successfully, in document order.
    pub pages: Vec<ExtractedPage>,
    /// Pages that failed to extract, in document order.
    pub skipped: Vec<SkippedPage>,
    /// Total page count reported by the document.
    pub pages_total: usize,
}

/// Page-by-page text extractor over a parsed PDF document.
///
/// The input file handle lives only for the duration of [`PdfExtractor::open`];
/// afterwards the parsed object graph is held in memory and the handle is
/// released on every exit path.
pub struct PdfExtractor {
    document: Document,
}

impl PdfExtractor {
    /// Opens and parses the document at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let document = Document::load(path).map_err(ExtractError::Open)?;
        Ok(Self { document })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Extracts the text of a single 1-based page.
    pub fn page_text(&self, page_no: u32) -> Result<String, lopdf::Error> {
        self.document.extract_text(&[page_no])
    }

    /// Walks all pages in order; a page that fails to extract is recorded as
    /// skipped rather than failing the run.
    pub fn extract_pages(&self) -> ExtractedDocument {
        let page_numbers: Vec<u32> = self.document.get_pages().keys().copied().collect();
        let pages_total = page_numbers.len();
        let mut pages = Vec::with_capacity(pages_total);
        let mut skipped = Vec::new();
        for page_no in page_numbers {
            match self.page_text(page_no) {
                Ok(text) => pages.push(ExtractedPage { page_no, text }),
                Err(err) => skipped.push(SkippedPage {
                    page_no,
                    reason: err.to_string(),
                }),
            }
        }
        ExtractedDocument {
            pages,
            skipped,
            pages_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::path::PathBuf;

    fn temp_pdf_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pdfvec-{}-{}.pdf", std::process::id(), name));
        path
    }

    fn write_single_page_pdf(path: &std::path::Path, text: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("save pdf");
    }

    #[test]
    fn extracts_single_page_text() {
        let path = temp_pdf_path("hello");
        write_single_page_pdf(&path, "Hello world");

        let extractor = PdfExtractor::open(&path).expect("open pdf");
        assert_eq!(extractor.page_count(), 1);

        let document = extractor.extract_pages();
        assert_eq!(document.pages_total, 1);
        assert_eq!(document.pages.len(), 1);
        assert!(document.skipped.is_empty());
        assert!(document.pages[0].text.contains("Hello"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = PdfExtractor::open("definitely/not/here.pdf").expect_err("open fails");
        assert!(err.to_string().contains("failed to open document"));
    }
}
