use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use unipage_core::config::{DpiMode, ReaderMode, TablesMode};
use unipage_core::entities::DocumentKind;
use unipage_core::{
    create_result_dir, save_extracted_document, DocumentInput, DocumentParser, ReaderConfig,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "unipage - normalized page-level extraction for heterogeneous documents",
    long_about = "unipage ingests PDFs, legacy word-processor files, plain text and raster \
images and produces a page-addressable extraction of text, tables and visual artifacts, \
annotated with per-page confidence, language and layout metadata."
)]
struct Args {
    /// Input files to process (PDF, legacy doc, text, image)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[arg(
        long,
        value_enum,
        default_value_t = ModeArg::Mixed,
        help = "Page decision mode: trust native text, force OCR, or decide per page"
    )]
    mode: ModeArg,

    #[arg(
        long,
        value_enum,
        default_value_t = TablesArg::Detect,
        help = "Table handling: off, detect candidates only, or extract cell text"
    )]
    tables: TablesArg,

    #[arg(long, default_value = "deu+eng", help = "OCR language (tesseract notation)")]
    lang: String,

    #[arg(long, default_value_t = 300, help = "OCR rasterization DPI")]
    dpi: u32,

    #[arg(
        long,
        default_value_t = false,
        help = "Use a fixed DPI instead of adapting to the estimated font size"
    )]
    fixed_dpi: bool,

    #[arg(long, default_value_t = 3, help = "Tesseract page segmentation mode")]
    psm: u8,

    #[arg(long, default_value_t = 1, help = "Tesseract engine mode")]
    oem: u8,

    #[arg(long, default_value_t = 120, help = "Per-page OCR timeout in seconds")]
    ocr_timeout_secs: u64,

    #[arg(
        long,
        default_value_t = false,
        help = "Enable OCR overlay on otherwise-native pages with embedded images"
    )]
    overlay: bool,

    #[arg(
        long,
        default_value_t = 0.35,
        help = "Embedded-image coverage ratio that triggers the overlay"
    )]
    overlay_area_thr: f32,

    #[arg(
        long,
        default_value_t = 1,
        help = "Minimum embedded-image count for the overlay"
    )]
    overlay_min_images: usize,

    #[arg(
        long,
        default_value_t = false,
        help = "Trigger the overlay whenever any embedded image is present"
    )]
    overlay_if_any_image: bool,

    /// Directory where per-document result folders are written
    #[arg(long, env = "UNIPAGE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Native,
    Ocr,
    Mixed,
}

impl From<ModeArg> for ReaderMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Native => ReaderMode::Native,
            ModeArg::Ocr => ReaderMode::Ocr,
            ModeArg::Mixed => ReaderMode::Mixed,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TablesArg {
    Off,
    Detect,
    Extract,
}

impl From<TablesArg> for TablesMode {
    fn from(value: TablesArg) -> Self {
        match value {
            TablesArg::Off => TablesMode::Off,
            TablesArg::Detect => TablesMode::Detect,
            TablesArg::Extract => TablesMode::Extract,
        }
    }
}

/// Resolve the document kind once, at input time. The engine itself never
/// looks at file extensions again.
fn resolve_kind(path: &Path) -> anyhow::Result<DocumentKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let kind = match ext.as_str() {
        "pdf" => DocumentKind::Pdf,
        "doc" | "docx" => DocumentKind::LegacyDoc,
        "txt" | "log" | "md" | "csv" | "tsv" => DocumentKind::Text,
        "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" => DocumentKind::Image,
        other => anyhow::bail!("unsupported input extension '{other}': {}", path.display()),
    };
    Ok(kind)
}

fn build_config(args: &Args) -> ReaderConfig {
    ReaderConfig {
        mode: args.mode.into(),
        tables_mode: args.tables.into(),
        lang: args.lang.clone(),
        dpi: args.dpi,
        dpi_mode: if args.fixed_dpi {
            DpiMode::Fixed
        } else {
            DpiMode::Auto
        },
        psm: args.psm,
        oem: args.oem,
        ocr_timeout: Duration::from_secs(args.ocr_timeout_secs),
        native_ocr_overlay: args.overlay,
        overlay_area_thr: args.overlay_area_thr,
        overlay_min_images: args.overlay_min_images,
        overlay_if_any_image: args.overlay_if_any_image,
        ..Default::default()
    }
}

fn setup_spinner(file: &Path) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}").unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Processing {}", file.display()));
    pb
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cfg = build_config(&args);
    if let Err(err) = cfg.validate() {
        eprintln!("{} invalid configuration: {err:#}", "✗".red().bold());
        std::process::exit(2);
    }

    let parser = DocumentParser::with_system_ocr();
    let mut failures = 0usize;

    for file in &args.files {
        let kind = match resolve_kind(file) {
            Ok(kind) => kind,
            Err(err) => {
                eprintln!("{} {err:#}", "✗".red().bold());
                failures += 1;
                continue;
            }
        };
        let input = DocumentInput::new(file, kind);
        let pb = setup_spinner(file);
        match parser.parse_document(&input, &cfg).await {
            Ok(doc) => {
                pb.finish_with_message(format!(
                    "Parsed {} ({} pages, avg conf {:.1}{}) in {}ms",
                    file.display(),
                    doc.summary.page_count,
                    doc.summary.avg_conf,
                    if doc.summary.manual_review {
                        ", needs review"
                    } else {
                        ""
                    },
                    doc.metadata.parsing_duration.as_millis()
                ));
                let saved = create_result_dir(args.output_dir.as_ref(), &doc.doc_name)
                    .and_then(|dir| save_extracted_document(&doc, &dir));
                if let Err(err) = saved {
                    eprintln!("{} can't save results: {err:#}", "✗".red().bold());
                    failures += 1;
                }
            }
            Err(err) => {
                pb.finish_and_clear();
                eprintln!("{} {}: {err:#}", "✗".red().bold(), file.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        eprintln!(
            "{} {failures} of {} inputs failed",
            "ℹ".yellow().bold(),
            args.files.len()
        );
        std::process::exit(1);
    }
}
