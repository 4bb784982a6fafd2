//! PDF text extraction.
//!
//! Produces one plain-text string per document: the text of every page, in
//! page order, joined with `\n`. A page whose text cannot be decoded aborts
//! the whole extraction; no partial text is returned.

use sha2::{Digest, Sha256};
use std::path::Path;

use docqa_core::error::QaError;

/// Extraction error. Converted into [`QaError::Extraction`] at the pipeline
/// boundary.
#[derive(Debug)]
pub enum ExtractError {
    Io(String),
    Pdf(String),
    Page { page: u32, message: String },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "cannot read file: {}", e),
            ExtractError::Pdf(e) => write!(f, "not a readable PDF: {}", e),
            ExtractError::Page { page, message } => {
                write!(f, "cannot extract text from page {}: {}", page, message)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<ExtractError> for QaError {
    fn from(err: ExtractError) -> Self {
        QaError::Extraction(err.to_string())
    }
}

/// Text extracted from a PDF, plus the hash of the bytes it came from.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
    /// SHA-256 of the raw PDF bytes, hex encoded.
    pub sha256: String,
}

/// Extract the text of every page from in-memory PDF bytes.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let sha256 = format!("{:x}", hasher.finalize());

    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    // get_pages is keyed by page number, so iteration is in page order
    let pages = doc.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());
    for page in pages.keys() {
        let text = doc
            .extract_text(&[*page])
            .map_err(|e| ExtractError::Page {
                page: *page,
                message: e.to_string(),
            })?;
        page_texts.push(text);
    }

    Ok(ExtractedText {
        text: page_texts.join("\n"),
        page_count: pages.len(),
        sha256,
    })
}

/// Read a PDF from disk and extract its text on the blocking pool.
pub async fn extract_file(path: &Path) -> Result<ExtractedText, ExtractError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractError::Io(format!("{}: {}", path.display(), e)))?;

    tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
        .await
        .map_err(|e| ExtractError::Pdf(format!("extraction task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
            ];
            if !text.is_empty() {
                operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            }
            operations.push(Operation::new("ET", vec![]));
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_extracts_pages_in_order() {
        let bytes = pdf_with_pages(&["First page text", "Second page text"]);
        let extracted = extract_pdf_text(&bytes).unwrap();
        assert_eq!(extracted.page_count, 2);
        let first = extracted.text.find("First page text").unwrap();
        let second = extracted.text.find("Second page text").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_hash_is_stable() {
        let bytes = pdf_with_pages(&["Hash me"]);
        let a = extract_pdf_text(&bytes).unwrap();
        let b = extract_pdf_text(&bytes).unwrap();
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.sha256.len(), 64);
    }

    #[test]
    fn test_page_without_text_yields_blank_text() {
        let bytes = pdf_with_pages(&[""]);
        let extracted = extract_pdf_text(&bytes).unwrap();
        assert!(extracted.text.trim().is_empty());
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = extract_pdf_text(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[tokio::test]
    async fn test_missing_file_returns_io_error() {
        let err = extract_file(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
        let qa: QaError = err.into();
        assert!(matches!(qa, QaError::Extraction(_)));
    }
}
