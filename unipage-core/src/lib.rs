//! unipage-core: page-level document extraction and reconciliation.
//!
//! Heterogeneous inputs (PDF, legacy word-processor files, plain text,
//! raster images) are normalized into one page-addressable model: per-page
//! text with a native/OCR decision, classified text blocks, zones, table
//! candidates, visual artifacts and document-level quality signals.

use anyhow::Context;
use colored::*;
use serde::Serialize;
use std::{
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use entities::ExtractedDocument;

pub mod artifacts;
pub mod blocks;
pub mod config;
pub mod decide;
pub mod entities;
pub mod error;
pub mod lang;
pub mod ocr;
pub mod parse;
pub mod summary;
pub mod tables;
pub mod zones;

pub use config::ReaderConfig;
pub use parse::document::{DocumentInput, DocumentParser};

fn sanitize_doc_name(doc_name: &str) -> String {
    doc_name
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
}

/// Create (or recreate) the per-document result directory.
pub fn create_result_dir<P: AsRef<Path>>(
    output_dir: Option<P>,
    doc_name: &str,
) -> anyhow::Result<PathBuf> {
    let result_dir_name = format!("{}-results", sanitize_doc_name(doc_name));
    let res_dir_path = match output_dir {
        Some(p) => p.as_ref().to_owned().join(&result_dir_name),
        None => PathBuf::from(format!("./{}", &result_dir_name)),
    };
    if res_dir_path.exists() {
        std::fs::remove_dir_all(&res_dir_path)?;
    }
    create_dir_all(&res_dir_path).context("can't create result dir")?;
    Ok(res_dir_path)
}

/// Write one serializable record per line. Nothing is written for an empty
/// collection, so absent artifacts stay absent on disk.
fn save_jsonl<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    let file = File::create(path)
        .with_context(|| format!("can't create output file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Persist every artifact of an extracted document. Each file is
/// independently re-loadable; downstream phases consume subsets.
pub fn save_extracted_document(
    doc: &ExtractedDocument,
    res_dir_path: &Path,
) -> anyhow::Result<()> {
    save_jsonl(&res_dir_path.join("unified_text.jsonl"), &doc.pages)?;
    save_jsonl(&res_dir_path.join("text_blocks.jsonl"), &doc.blocks)?;
    save_jsonl(&res_dir_path.join("zones.jsonl"), &doc.zones)?;
    save_jsonl(&res_dir_path.join("tables.jsonl"), &doc.tables)?;
    save_jsonl(
        &res_dir_path.join("table_candidates.jsonl"),
        &doc.table_candidates,
    )?;
    save_jsonl(
        &res_dir_path.join("visual_artifacts.jsonl"),
        &doc.artifacts,
    )?;

    let summary_out = res_dir_path.join("summary.json");
    let file = File::create(&summary_out)?;
    let mut writer = BufWriter::new(file);
    let payload = serde_json::json!({
        "doc_name": doc.doc_name,
        "kind": doc.kind,
        "summary": doc.summary,
        "metadata": doc.metadata,
    });
    writer.write_all(serde_json::to_string(&payload)?.as_bytes())?;

    println!(
        "{} Results saved in: {}",
        "✓".green().bold(),
        res_dir_path.display().to_string().cyan().underline()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::entities::{DocumentKind, PageDecision};
    use crate::parse::page::{simple_page_outcome, DEFAULT_PAGE_BBOX};
    use crate::summary::DocumentBuilder;
    use std::time::Duration;

    fn sample_doc() -> ExtractedDocument {
        let mut builder =
            DocumentBuilder::new("probe", DocumentKind::Text, ReaderConfig::default());
        builder.push(simple_page_outcome(
            "probe.txt".to_owned(),
            1,
            PageDecision::Native,
            "Der Inhalt der Seite und die Anlage.".to_owned(),
            92.0,
            Duration::from_millis(3),
            None,
            DEFAULT_PAGE_BBOX,
            0,
        ));
        builder.finish()
    }

    #[test]
    fn sanitizes_doc_names() {
        assert_eq!(sanitize_doc_name("Vertrag 2024 (final).pdf"), "Vertrag2024-final--pdf");
        assert_eq!(sanitize_doc_name("plain_name"), "plain_name");
    }

    #[test]
    fn artifacts_are_independently_reloadable() {
        let doc = sample_doc();
        let tmp = tempfile::tempdir().unwrap();
        let res_dir = create_result_dir(Some(tmp.path()), &doc.doc_name).unwrap();
        save_extracted_document(&doc, &res_dir).unwrap();

        let pages_raw = std::fs::read_to_string(res_dir.join("unified_text.jsonl")).unwrap();
        let first: crate::entities::PageRecord =
            serde_json::from_str(pages_raw.lines().next().unwrap()).unwrap();
        assert_eq!(first.page, 1);
        assert_eq!(first.decision, PageDecision::Native);

        let blocks_raw = std::fs::read_to_string(res_dir.join("text_blocks.jsonl")).unwrap();
        let block: crate::entities::TextBlock =
            serde_json::from_str(blocks_raw.lines().next().unwrap()).unwrap();
        assert_eq!(block.reading_order_index, 0);

        // Empty collections must stay absent, not be empty files.
        assert!(!res_dir.join("tables.jsonl").exists());
        assert!(!res_dir.join("visual_artifacts.jsonl").exists());

        let summary_raw = std::fs::read_to_string(res_dir.join("summary.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&summary_raw).unwrap();
        assert_eq!(value["summary"]["page_count"], 1);
        assert_eq!(value["metadata"]["coordinate_origin"], "top-left");
    }
}
