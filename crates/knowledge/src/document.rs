//! Document intake: content-type checks, decoding and text extraction.
//!
//! Text formats are decoded as UTF-8. PDF and DOCX are extracted to plain
//! text; scanned pages without a text layer yield no text and are rejected.

use chrono::{DateTime, Utc};
use docent_core::{AppError, AppResult};
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Largest decompressed `word/document.xml` we read.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Content types accepted for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    PlainText,
    Markdown,
    Html,
    Csv,
    Json,
    Xml,
    Yaml,
    Pdf,
    Docx,
}

impl ContentType {
    /// Parse a MIME type (parameters allowed) or a bare file extension.
    ///
    /// Returns `None` for anything we cannot extract text from.
    pub fn parse(s: &str) -> Option<Self> {
        let essence = s
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_start_matches('.')
            .to_lowercase();

        match essence.as_str() {
            "text/markdown" | "text/x-markdown" | "md" | "markdown" => Some(Self::Markdown),
            "text/html" | "application/xhtml+xml" | "html" | "htm" => Some(Self::Html),
            "text/csv" | "csv" => Some(Self::Csv),
            "application/json" | "json" => Some(Self::Json),
            "application/xml" | "text/xml" | "xml" => Some(Self::Xml),
            "application/yaml" | "application/x-yaml" | "text/yaml" | "yaml" | "yml" => {
                Some(Self::Yaml)
            }
            "txt" | "text" | "log" | "rst" | "rs" | "py" | "js" | "ts" | "go" | "c" | "cpp"
            | "java" | "sh" | "toml" => Some(Self::PlainText),
            "application/pdf" | "pdf" => Some(Self::Pdf),
            MIME_DOCX | "docx" => Some(Self::Docx),
            other if other.starts_with("text/") => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Yaml => "application/yaml",
            Self::Pdf => "application/pdf",
            Self::Docx => MIME_DOCX,
        }
    }
}

/// Document metadata recorded at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub content_type: ContentType,
    pub ingested_at: DateTime<Utc>,
    /// SHA-256 of the raw bytes, hex encoded
    pub content_hash: String,
    pub size_bytes: u64,
}

/// A document handed to the core by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Extracted text; chunk offsets index into this string
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Build a document from raw bytes and a declared content type.
    ///
    /// Fails with `InvalidDocument` for empty ids, unsupported content
    /// types, text that is not valid UTF-8 or contains NUL bytes, PDF or
    /// DOCX files that cannot be read, and documents with no text.
    ///
    /// PDF extraction is CPU-bound; async callers should prefer
    /// [`Document::extract`].
    pub fn from_bytes(
        id: impl Into<String>,
        bytes: &[u8],
        content_type: &str,
        title: Option<String>,
    ) -> AppResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::InvalidDocument(
                "Document id cannot be empty".to_string(),
            ));
        }

        let kind = ContentType::parse(content_type).ok_or_else(|| {
            AppError::InvalidDocument(format!(
                "Unsupported content type for {}: {}",
                id, content_type
            ))
        })?;

        let text = match kind {
            ContentType::Pdf => extract_pdf(&id, bytes)?,
            ContentType::Docx => extract_docx(&id, bytes)?,
            _ => {
                check_charset(&id, content_type)?;

                let raw = std::str::from_utf8(bytes).map_err(|e| {
                    AppError::InvalidDocument(format!("{} is not valid UTF-8: {}", id, e))
                })?;

                if raw.contains('\0') {
                    return Err(AppError::InvalidDocument(format!(
                        "{} looks like binary data",
                        id
                    )));
                }

                match kind {
                    ContentType::Html => clean_html(raw),
                    ContentType::Csv => csv_rows(&id, raw)?,
                    _ => raw.to_string(),
                }
            }
        };

        if text.trim().is_empty() {
            return Err(AppError::InvalidDocument(format!("{} has no text", id)));
        }

        Ok(Self {
            metadata: DocumentMetadata {
                title,
                content_type: kind,
                ingested_at: Utc::now(),
                content_hash: content_hash(bytes),
                size_bytes: bytes.len() as u64,
            },
            id,
            text,
        })
    }

    /// [`Document::from_bytes`] on the blocking thread pool.
    pub async fn extract(
        id: impl Into<String>,
        bytes: Vec<u8>,
        content_type: impl Into<String>,
        title: Option<String>,
    ) -> AppResult<Self> {
        let id = id.into();
        let content_type = content_type.into();
        let label = id.clone();

        tokio::task::spawn_blocking(move || Self::from_bytes(id, &bytes, &content_type, title))
            .await
            .map_err(|e| {
                AppError::InvalidDocument(format!("Extracting {} failed: {}", label, e))
            })?
    }

    /// Build a plain-text document.
    pub fn from_text(id: impl Into<String>, text: impl Into<String>) -> AppResult<Self> {
        let text = text.into();
        Self::from_bytes(id, text.as_bytes(), ContentType::PlainText.as_str(), None)
    }

    /// Character count of the extracted text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Generate SHA-256 content hash
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reject declared charsets we cannot decode.
fn check_charset(id: &str, content_type: &str) -> AppResult<()> {
    for param in content_type.split(';').skip(1) {
        if let Some((key, value)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("charset") {
                let charset = value.trim().trim_matches('"').to_lowercase();
                if !matches!(charset.as_str(), "utf-8" | "utf8" | "us-ascii" | "ascii") {
                    return Err(AppError::InvalidDocument(format!(
                        "{} uses unsupported charset {}",
                        id, charset
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Strip tags, script and style bodies, and collapse whitespace.
///
/// A `<` only opens a tag when a letter, `/` or `!` follows it and a `>`
/// closes it; anything else is kept as text.
fn clean_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut skip_until: Option<&str> = None;
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        let tag_area = &rest[lt..];
        let opens_tag = tag_area[1..]
            .starts_with(|c: char| c.is_ascii_alphabetic() || c == '/' || c == '!');
        let Some(gt) = tag_area.find('>').filter(|_| opens_tag) else {
            if skip_until.is_none() {
                result.push_str(&rest[..=lt]);
            }
            rest = &tag_area[1..];
            continue;
        };

        if skip_until.is_none() {
            result.push_str(&rest[..lt]);
            result.push(' ');
        }

        let tag = tag_area[1..gt].trim().to_lowercase();
        match skip_until {
            Some(closing) if tag.starts_with(closing) => skip_until = None,
            Some(_) => {}
            None if tag.starts_with("script") => skip_until = Some("/script"),
            None if tag.starts_with("style") => skip_until = Some("/style"),
            None => {}
        }

        rest = &tag_area[gt + 1..];
    }

    if skip_until.is_none() {
        result.push_str(rest);
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render CSV rows as `header: value` lines, one blank line between rows.
///
/// Empty cells are dropped. Cells beyond the header row are labelled by
/// their column number.
fn csv_rows(id: &str, raw: &str) -> AppResult<String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::InvalidDocument(format!("{} is not valid CSV: {}", id, e)))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| AppError::InvalidDocument(format!("{} is not valid CSV: {}", id, e)))?;

        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(i, value)| match headers.get(i) {
                Some(header) if !header.trim().is_empty() => {
                    format!("{}: {}", header.trim(), value.trim())
                }
                _ => format!("column {}: {}", i + 1, value.trim()),
            })
            .collect();

        if !lines.is_empty() {
            rows.push(lines.join("\n"));
        }
    }

    Ok(rows.join("\n\n"))
}

fn extract_pdf(id: &str, bytes: &[u8]) -> AppResult<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AppError::InvalidDocument(format!("Cannot read PDF {}: {}", id, e)))
}

/// Paragraph text of `word/document.xml`, paragraphs separated by blank lines.
fn extract_docx(id: &str, bytes: &[u8]) -> AppResult<String> {
    let invalid = |e: String| AppError::InvalidDocument(format!("Cannot read DOCX {}: {}", id, e));

    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| invalid(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| invalid(e.to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| invalid(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(invalid("word/document.xml is too large".to_string()));
    }

    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(current.trim().to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text => {
                let text = text.unescape().map_err(|e| invalid(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(invalid(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }

    Ok(paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(ContentType::parse("text/plain; charset=utf-8"), Some(ContentType::PlainText));
        assert_eq!(ContentType::parse("text/markdown"), Some(ContentType::Markdown));
        assert_eq!(ContentType::parse(".md"), Some(ContentType::Markdown));
        assert_eq!(ContentType::parse("text/x-rst"), Some(ContentType::PlainText));
        assert_eq!(ContentType::parse("application/pdf"), Some(ContentType::Pdf));
        assert_eq!(ContentType::parse(MIME_DOCX), Some(ContentType::Docx));
        assert_eq!(ContentType::parse("image/png"), None);
        assert_eq!(
            ContentType::from_path(Path::new("notes/report.HTML")),
            Some(ContentType::Html)
        );
        assert_eq!(ContentType::from_path(Path::new("photo.jpg")), None);
        assert_eq!(
            ContentType::from_path(Path::new("reports/q3.pdf")),
            Some(ContentType::Pdf)
        );
        assert_eq!(
            ContentType::from_path(Path::new("minutes.DOCX")),
            Some(ContentType::Docx)
        );
    }

    #[test]
    fn test_from_bytes_fills_metadata() {
        let doc = Document::from_bytes(
            "handbook",
            "Vacation policy".as_bytes(),
            "text/plain",
            Some("Handbook".to_string()),
        )
        .unwrap();

        assert_eq!(doc.text, "Vacation policy");
        assert_eq!(doc.metadata.title.as_deref(), Some("Handbook"));
        assert_eq!(doc.metadata.size_bytes, 15);
        assert_eq!(doc.metadata.content_hash.len(), 64);
        assert_eq!(doc.metadata.content_hash, content_hash(b"Vacation policy"));
    }

    #[test]
    fn test_rejects_invalid_documents() {
        let cases: Vec<AppResult<Document>> = vec![
            Document::from_text("empty", ""),
            Document::from_text("blank", "  \n\t "),
            Document::from_text("", "text"),
            Document::from_bytes("bin", &[0xff, 0xfe, 0x00], "text/plain", None),
            Document::from_bytes("nul", b"abc\0def", "text/plain", None),
            Document::from_bytes("pdf", b"not a pdf", "application/pdf", None),
            Document::from_bytes("docx", b"not a zip", "docx", None),
            Document::from_bytes("png", &[0x89, 0x50, 0x4e, 0x47], "image/png", None),
            Document::from_bytes("latin", b"caf\xe9", "text/plain; charset=iso-8859-1", None),
        ];

        for case in cases {
            assert!(matches!(case, Err(AppError::InvalidDocument(_))));
        }
    }

    #[test]
    fn test_html_is_cleaned() {
        let html = "<html><head><style>p { color: red; }</style><script>alert('x')</script></head>\
                    <body><p>Hello <b>world</b></p>\n<p>Second   paragraph</p></body></html>";
        let doc = Document::from_bytes("page", html.as_bytes(), "text/html", None).unwrap();
        assert_eq!(doc.text, "Hello world Second paragraph");
    }

    #[test]
    fn test_html_without_text_is_invalid() {
        let result = Document::from_bytes("empty", b"<div><br/></div>", "text/html", None);
        assert!(matches!(result, Err(AppError::InvalidDocument(_))));
    }

    #[test]
    fn test_html_keeps_literal_angle_brackets() {
        let html = "<p>Revenue grew when cost < budget, as planned.</p><p>Second paragraph survives?</p>";
        let doc = Document::from_bytes("report", html.as_bytes(), "text/html", None).unwrap();
        assert_eq!(
            doc.text,
            "Revenue grew when cost < budget, as planned. Second paragraph survives?"
        );

        let doc = Document::from_bytes(
            "math",
            b"x < 5 and the rest of the sentence",
            "text/html",
            None,
        )
        .unwrap();
        assert_eq!(doc.text, "x < 5 and the rest of the sentence");

        let doc = Document::from_bytes("open", b"<b>bold</b> <unterminated", "html", None).unwrap();
        assert_eq!(doc.text, "bold <unterminated");
    }

    #[test]
    fn test_csv_rows_become_labelled_lines() {
        let csv = "name,role,office\nAda,engineer,\nGrace,admiral,Arlington\n";
        let doc = Document::from_bytes("staff", csv.as_bytes(), "text/csv", None).unwrap();
        assert_eq!(
            doc.text,
            "name: Ada\nrole: engineer\n\nname: Grace\nrole: admiral\noffice: Arlington"
        );
    }

    #[test]
    fn test_csv_with_only_headers_is_invalid() {
        let result = Document::from_bytes("headers", b"name,role\n", "csv", None);
        assert!(matches!(result, Err(AppError::InvalidDocument(_))));
    }

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        use std::io::Write;

        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );

        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_docx_paragraphs_are_extracted() {
        let bytes = docx_with_paragraphs(&["Travel policy", "Book economy &amp; keep receipts."]);
        let doc = Document::from_bytes("travel", &bytes, MIME_DOCX, None).unwrap();

        assert_eq!(doc.text, "Travel policy\n\nBook economy & keep receipts.");
        assert_eq!(doc.metadata.content_type, ContentType::Docx);
        assert_eq!(doc.metadata.size_bytes, bytes.len() as u64);
    }

    #[test]
    fn test_docx_without_text_is_invalid() {
        let bytes = docx_with_paragraphs(&[]);
        let result = Document::from_bytes("blank", &bytes, "docx", None);
        assert!(matches!(result, Err(AppError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_extract_runs_off_the_runtime() {
        let bytes = docx_with_paragraphs(&["Expenses are reimbursed monthly."]);
        let doc = Document::extract("expenses", bytes, "docx", Some("Expenses".into()))
            .await
            .unwrap();
        assert_eq!(doc.text, "Expenses are reimbursed monthly.");

        let result = Document::extract("scan", b"not a pdf".to_vec(), "pdf", None).await;
        assert!(matches!(result, Err(AppError::InvalidDocument(_))));
    }
}
