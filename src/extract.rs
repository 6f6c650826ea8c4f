//! Raw text extraction from document containers.
//!
//! Connectors hand over bytes plus a [`DocumentKind`]; this module returns
//! the document text in reading order with one `\n` per paragraph. Cleanup
//! of whitespace and invisible characters happens in [`crate::normalize`].

use std::io::Read;

use quick_xml::events::Event;

use crate::error::ParseError;
use crate::models::DocumentKind;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";

/// Extract paragraph text from `bytes`.
pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String, ParseError> {
    match kind {
        DocumentKind::Docx => extract_docx(bytes),
        DocumentKind::PlainText => Ok(decode_plain_text(bytes)),
    }
}

fn decode_plain_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ParseError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ParseError::Container(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ParseError::Container(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ParseError::Container(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ParseError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ParseError::Container(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, DOCX_BODY, MAX_XML_ENTRY_BYTES)?;
    paragraphs_from_document_xml(&xml)
}

/// Walk `word/document.xml`, keeping `w:t` run text and closing each `w:p`
/// with a newline. Tabs and manual breaks become spaces.
fn paragraphs_from_document_xml(xml: &[u8]) -> Result<String, ParseError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" | b"br" | b"cr" => out.push(' '),
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(DOCX_BODY, zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"{}\"><w:body>{}</w:body></w:document>",
                W_NS, body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn runs_concatenate_and_paragraphs_break() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t xml:space=\"preserve\">Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>",
        );
        let text = extract_text(&bytes, DocumentKind::Docx).unwrap();
        assert_eq!(text, "Hello world\nSecond & last\n");
    }

    #[test]
    fn tabs_and_breaks_become_spaces() {
        let bytes =
            docx_with_body("<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p>");
        let text = extract_text(&bytes, DocumentKind::Docx).unwrap();
        assert_eq!(text, "a b c\n");
    }

    #[test]
    fn deleted_revisions_are_ignored() {
        let bytes = docx_with_body(
            "<w:p><w:del><w:r><w:delText>gone</w:delText></w:r></w:del><w:r><w:t>kept</w:t></w:r></w:p>",
        );
        let text = extract_text(&bytes, DocumentKind::Docx).unwrap();
        assert_eq!(text, "kept\n");
    }

    #[test]
    fn invalid_zip_is_container_error() {
        let err = extract_text(b"not a zip", DocumentKind::Docx).unwrap_err();
        assert!(matches!(err, ParseError::Container(_)));
    }

    #[test]
    fn zip_without_document_xml_is_container_error() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_text(&buf, DocumentKind::Docx).unwrap_err();
        assert!(matches!(err, ParseError::Container(_)));
    }

    #[test]
    fn plain_text_strips_bom() {
        let text = extract_text(b"\xEF\xBB\xBFhello", DocumentKind::PlainText).unwrap();
        assert_eq!(text, "hello");
    }
}
