//! Legacy word-processor (DOCX) text extraction.
//!
//! DOCX files are ZIP containers; the page text lives in
//! `word/document.xml` as `w:t` runs grouped into `w:p` paragraphs. Only
//! the text stream is needed here; styles, numbering and relationships
//! stay untouched.

use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

/// Extract the paragraph text of a legacy word-processor document.
pub fn read_docx_text(data: &[u8]) -> Result<String> {
    let mut archive =
        ZipArchive::new(Cursor::new(data)).context("can't open legacy document container")?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("legacy document has no word/document.xml")?
        .read_to_string(&mut xml)
        .context("can't read legacy document body")?;
    extract_paragraph_text(&xml)
}

fn extract_paragraph_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:br" | b"w:cr" => out.push('\n'),
                b"w:tab" => out.push('\t'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text => {
                out.push_str(&text.unescape().context("bad entity in document body")?);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(err).context("malformed legacy document xml"),
            _ => {}
        }
    }
    Ok(out.trim_end().to_owned())
}
