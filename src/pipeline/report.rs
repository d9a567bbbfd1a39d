//! Word report assembly.
//!
//! A report is laid out as a flat list of [`Block`]s and then serialised into
//! a minimal WordprocessingML package: six XML parts in a deflated zip, which
//! Word, LibreOffice and Pages all open without complaint. The package is
//! built in memory; writing it to disk is the orchestrator's job.

use crate::error::Patent2DocxError;
use crate::pipeline::sections::SectionSet;
use chrono::{DateTime, Local, Utc};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const REPORT_TITLE: &str = "Patent Analysis Report";
pub const BRIEF_HEADING: &str = "Brief Version";
pub const FULL_HEADING: &str = "Full Version";
pub const TRANSLATION_HEADING: &str = "Original-Language Translation";

pub const BRIEF_PLACEHOLDER: &str =
    "(The model did not produce a separate brief version for this patent.)";
pub const TRANSLATION_PLACEHOLDER: &str =
    "(The model did not produce a translation section for this patent.)";

/// Everything a report is built from.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    pub source_name: String,
    pub generated_at: DateTime<Local>,
    pub sections: SectionSet,
}

impl ReportSpec {
    /// Report stamped with the current local time.
    pub fn new(source_name: impl Into<String>, sections: SectionSet) -> Self {
        Self {
            source_name: source_name.into(),
            generated_at: Local::now(),
            sections,
        }
    }
}

/// One unit of report layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Title(String),
    Heading(String),
    Paragraph(String),
    PageBreak,
}

/// Lay out a report: title, metadata, then the three sections separated by
/// page breaks.
pub fn layout(spec: &ReportSpec) -> Vec<Block> {
    let mut blocks = vec![
        Block::Title(REPORT_TITLE.to_string()),
        Block::Paragraph(format!("Source file: {}", spec.source_name)),
        Block::Paragraph(format!(
            "Generated at: {}",
            spec.generated_at.format("%Y-%m-%d %H:%M:%S")
        )),
        Block::Paragraph(String::new()),
    ];

    blocks.push(Block::Heading(BRIEF_HEADING.to_string()));
    push_section(&mut blocks, &spec.sections.brief, Some(BRIEF_PLACEHOLDER));

    blocks.push(Block::PageBreak);
    blocks.push(Block::Heading(FULL_HEADING.to_string()));
    push_section(&mut blocks, &spec.sections.full, None);

    blocks.push(Block::PageBreak);
    blocks.push(Block::Heading(TRANSLATION_HEADING.to_string()));
    push_section(
        &mut blocks,
        &spec.sections.translation,
        Some(TRANSLATION_PLACEHOLDER),
    );

    blocks
}

fn push_section(blocks: &mut Vec<Block>, text: &str, placeholder: Option<&str>) {
    match placeholder {
        Some(p) if text.trim().is_empty() => blocks.push(Block::Paragraph(p.to_string())),
        _ => blocks.extend(text.lines().map(|l| Block::Paragraph(l.to_string()))),
    }
}

/// Lay out and package a report as `.docx` bytes.
pub fn build_report(spec: &ReportSpec) -> Result<Vec<u8>, Patent2DocxError> {
    render_docx(&layout(spec), spec)
}

/// Serialise `blocks` into a `.docx` package.
pub fn render_docx(blocks: &[Block], spec: &ReportSpec) -> Result<Vec<u8>, Patent2DocxError> {
    let parts: [(&str, String); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", PACKAGE_RELS_XML.to_string()),
        ("word/document.xml", document_xml(blocks)),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.to_string()),
        ("word/styles.xml", STYLES_XML.to_string()),
        ("docProps/core.xml", core_xml(spec)),
    ];

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, xml) in parts {
        writer.start_file(name, options).map_err(zip_failure)?;
        writer
            .write_all(xml.as_bytes())
            .map_err(|source| Patent2DocxError::ReportWriteFailed { source })?;
    }

    let cursor = writer.finish().map_err(zip_failure)?;
    Ok(cursor.into_inner())
}

fn zip_failure(e: zip::result::ZipError) -> Patent2DocxError {
    Patent2DocxError::ReportWriteFailed {
        source: std::io::Error::other(e),
    }
}

/// Escape XML markup characters and drop characters XML 1.0 forbids.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => {}
            '\u{FFFE}' | '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

// ── Package parts ────────────────────────────────────────────────────────

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

// East-Asian font hints keep CJK text from falling back to a Latin face.
const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:eastAsia="SimSun" w:cs="Calibri"/><w:sz w:val="22"/><w:szCs w:val="22"/><w:lang w:val="en-US" w:eastAsia="zh-CN"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="120" w:line="276" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:spacing w:after="240"/></w:pPr><w:rPr><w:b/><w:sz w:val="48"/><w:szCs w:val="48"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/><w:szCs w:val="32"/></w:rPr></w:style></w:styles>"#;

fn document_xml(blocks: &[Block]) -> String {
    let mut body = String::new();
    for block in blocks {
        match block {
            Block::Title(text) => body.push_str(&styled_paragraph("Title", text)),
            Block::Heading(text) => body.push_str(&styled_paragraph("Heading1", text)),
            Block::Paragraph(text) if text.is_empty() => body.push_str("<w:p/>"),
            Block::Paragraph(text) => {
                body.push_str("<w:p>");
                body.push_str(&run(text));
                body.push_str("</w:p>");
            }
            Block::PageBreak => body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#),
        }
    }

    format!(
        "{XML_DECL}\n<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{body}<w:sectPr><w:pgSz w:w=\"11906\" w:h=\"16838\"/><w:pgMar w:top=\"1440\" w:right=\"1440\" w:bottom=\"1440\" w:left=\"1440\" w:header=\"708\" w:footer=\"708\" w:gutter=\"0\"/></w:sectPr></w:body></w:document>"
    )
}

fn styled_paragraph(style: &str, text: &str) -> String {
    format!(
        "<w:p><w:pPr><w:pStyle w:val=\"{style}\"/></w:pPr>{}</w:p>",
        run(text)
    )
}

fn run(text: &str) -> String {
    format!("<w:r><w:t xml:space=\"preserve\">{}</w:t></w:r>", escape_xml(text))
}

fn core_xml(spec: &ReportSpec) -> String {
    let created = spec
        .generated_at
        .with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        "{XML_DECL}\n<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"><dc:title>{title}</dc:title><dc:subject>{subject}</dc:subject><dc:creator>patent2docx</dc:creator><dcterms:created xsi:type=\"dcterms:W3CDTF\">{created}</dcterms:created><dcterms:modified xsi:type=\"dcterms:W3CDTF\">{created}</dcterms:modified></cp:coreProperties>",
        title = escape_xml(REPORT_TITLE),
        subject = escape_xml(&spec.source_name),
    )
}
