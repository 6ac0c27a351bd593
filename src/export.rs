//! Markdown to DOCX.
//!
//! Blank-line separated chunks become paragraphs; `# ` and `## ` chunks
//! become headings. The package is the minimal WordprocessingML set:
//! content types, package relationships, styles and the document body.

use std::io::{Cursor, Write};

use base64::Engine;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DEFAULT_FILENAME: &str = "grant-draft.docx";

const BODY_FONT: &str = "Times New Roman";
/// Half-points: 24 = 12pt.
const BODY_SIZE: u32 = 24;
/// Twips: 1440 = 1 inch.
const PAGE_MARGIN: u32 = 1440;
/// US Letter in twips.
const PAGE_WIDTH: u32 = 12240;
const PAGE_HEIGHT: u32 = 15840;
const SINGLE_LINE: u32 = 240;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// A generated document and the name to save it under.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl ExportResult {
    /// For JSON transports that cannot carry raw bytes.
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Heading1(String),
    Heading2(String),
    Body(String),
}

fn blocks(markdown: &str) -> Vec<Block> {
    let normalized = markdown.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            if let Some(rest) = chunk.strip_prefix("# ") {
                Block::Heading1(rest.trim_start().to_string())
            } else if let Some(rest) = chunk.strip_prefix("## ") {
                Block::Heading2(rest.trim_start().to_string())
            } else {
                Block::Body(chunk.to_string())
            }
        })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn run(text: &str) -> String {
    let props = format!(
        r#"<w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/><w:sz w:val="{size}"/><w:szCs w:val="{size}"/></w:rPr>"#,
        font = BODY_FONT,
        size = BODY_SIZE
    );
    let lines: Vec<String> = text
        .lines()
        .map(|line| format!(r#"<w:t xml:space="preserve">{}</w:t>"#, escape(line)))
        .collect();
    format!("<w:r>{}{}</w:r>", props, lines.join("<w:br/>"))
}

fn paragraph(block: &Block) -> String {
    match block {
        Block::Heading1(text) => format!(r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr>{}</w:p>"#, run(text)),
        Block::Heading2(text) => format!(r#"<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr>{}</w:p>"#, run(text)),
        Block::Body(text) => format!(
            r#"<w:p><w:pPr><w:spacing w:line="{}" w:lineRule="exact"/></w:pPr>{}</w:p>"#,
            SINGLE_LINE,
            run(text)
        ),
    }
}

fn document_xml(markdown: &str) -> String {
    let body: String = blocks(markdown).iter().map(paragraph).collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{ns}"><w:body>{body}<w:sectPr><w:pgSz w:w="{w}" w:h="{h}"/><w:pgMar w:top="{m}" w:right="{m}" w:bottom="{m}" w:left="{m}" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#,
        ns = W_NS,
        body = body,
        w = PAGE_WIDTH,
        h = PAGE_HEIGHT,
        m = PAGE_MARGIN
    )
}

fn styles_xml() -> String {
    let heading = |id: &str, name: &str, size: u32| {
        format!(
            r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{name}"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/></w:pPr><w:rPr><w:b/><w:sz w:val="{size}"/><w:szCs w:val="{size}"/></w:rPr></w:style>"#
        )
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{ns}"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/><w:sz w:val="{size}"/><w:szCs w:val="{size}"/></w:rPr></w:rPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style>{h1}{h2}</w:styles>"#,
        ns = W_NS,
        font = BODY_FONT,
        size = BODY_SIZE,
        h1 = heading("Heading1", "heading 1", 32),
        h2 = heading("Heading2", "heading 2", 28),
    )
}

/// Build the DOCX bytes for a markdown draft.
pub fn build_docx(markdown: &str) -> zip::result::ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", PACKAGE_RELS.to_string()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
        ("word/document.xml", document_xml(markdown)),
        ("word/styles.xml", styles_xml()),
    ];
    for (name, content) in parts {
        writer.start_file(name, options)?;
        writer.write_all(content.as_bytes())?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Build a DOCX, defaulting the filename.
pub fn export_docx(markdown: &str, filename: Option<&str>) -> zip::result::ZipResult<ExportResult> {
    let bytes = build_docx(markdown)?;
    let filename = filename
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_FILENAME)
        .to_string();
    Ok(ExportResult { bytes, filename })
}
