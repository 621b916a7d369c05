//! secrank - rank document sections against a persona and a task
//!
//! Usage:
//!   secrank rank --input in.json --docs pdfs/ --output out.json
//!   secrank outline doc.pdf       Print the heading outline of a document
//!   secrank sections doc.pdf      Print the sections of a document

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use secrank_core::{
    default_config_path, load_embedder, load_settings, ChallengeOutput, DocumentSource,
    EmbedderKind, FallbackClassifier, FileSource, HeadingLevel, InputConfig, Outline, Pipeline,
    RankOptions, Section, Settings, TreeEnsemble,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "secrank")]
#[command(about = "Rank document sections against a persona and a task")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML). Defaults to the platform config directory.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the sections of every input document and write the result
    Rank {
        /// Input record (documents, persona, job_to_be_done)
        #[arg(long)]
        input: PathBuf,
        /// Directory holding the input documents
        #[arg(long)]
        docs: PathBuf,
        /// Where to write the output JSON
        #[arg(long)]
        output: PathBuf,
        /// Number of sections to return
        #[arg(long)]
        top_k: Option<usize>,
        /// Embedding backend (hashing, bert). Overrides SECRANK_EMBEDDER.
        #[arg(long)]
        embedder: Option<EmbedderKind>,
        /// Fallback heading classifier (tree ensemble JSON)
        #[arg(long)]
        classifier: Option<PathBuf>,
        /// No progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print the heading outline of one document
    Outline {
        file: PathBuf,
        /// Fallback heading classifier (tree ensemble JSON)
        #[arg(long)]
        classifier: Option<PathBuf>,
        /// Print an indented tree instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Print the sections of one document
    Sections {
        file: PathBuf,
        /// Output sections as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let settings = resolve_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Rank {
            input,
            docs,
            output,
            top_k,
            embedder,
            classifier,
            quiet,
        } => cmd_rank(
            &settings,
            &RankArgs {
                input,
                docs,
                output,
                top_k,
                embedder,
                classifier,
                quiet,
            },
        ),
        Commands::Outline {
            file,
            classifier,
            text,
        } => cmd_outline(&settings, &file, classifier.as_deref(), text),
        Commands::Sections { file, json } => cmd_sections(&settings, &file, json),
    }
}

struct RankArgs {
    input: PathBuf,
    docs: PathBuf,
    output: PathBuf,
    top_k: Option<usize>,
    embedder: Option<EmbedderKind>,
    classifier: Option<PathBuf>,
    quiet: bool,
}

/// Settings from `--config`, else from the platform config dir. A missing
/// default file means defaults; a missing explicit file is an error.
fn resolve_settings(config: Option<&Path>) -> Result<Settings> {
    match config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            load_settings(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))
        }
        None => match default_config_path() {
            Ok(path) => load_settings(&path)
                .with_context(|| format!("Failed to load config: {}", path.display())),
            Err(e) => {
                tracing::debug!("No default config path: {}", e);
                Ok(Settings::default())
            }
        },
    }
}

fn load_classifier(path: Option<&Path>) -> Result<Option<Arc<dyn FallbackClassifier>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let model = TreeEnsemble::load(path)
        .with_context(|| format!("Failed to load classifier: {}", path.display()))?;
    Ok(Some(Arc::new(model)))
}

/// Paths of the input documents, resolved against `docs`.
fn document_paths(input: &InputConfig, docs: &Path) -> Vec<PathBuf> {
    input.documents.iter().map(|d| docs.join(&d.filename)).collect()
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let sp = ProgressBar::new_spinner();
    sp.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    sp.set_message(message.to_string());
    sp.enable_steady_tick(Duration::from_millis(80));
    Ok(sp)
}

fn write_output(path: &Path, output: &ChallengeOutput) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(output)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write output: {}", path.display()))
}

fn cmd_rank(settings: &Settings, args: &RankArgs) -> Result<()> {
    let input = InputConfig::load(&args.input)
        .with_context(|| format!("Failed to read input record: {}", args.input.display()))?;
    let query = input.query()?;
    let paths = document_paths(&input, &args.docs);

    let mut pipeline = Pipeline::from_settings(settings, load_classifier(args.classifier.as_deref())?);
    if let Some(top_k) = args.top_k {
        if top_k == 0 {
            anyhow::bail!("--top-k must be at least 1");
        }
        let options = RankOptions {
            top_k,
            ..*pipeline.rank_options()
        };
        pipeline = pipeline.with_rank_options(options);
    }

    let mut embedder_options = settings.embedder();
    if let Some(kind) = args.embedder {
        embedder_options.kind = kind;
    } else if let Some(kind) = EmbedderKind::from_env()? {
        embedder_options.kind = kind;
    }

    let sp = if args.quiet {
        None
    } else {
        Some(spinner(&format!("Loading {} embedder...", embedder_options.kind))?)
    };
    let mut embedder = load_embedder(&embedder_options).context("Failed to load embedder")?;
    embedder.warmup()?;
    if let Some(sp) = sp {
        sp.finish_with_message(format!(
            "Embedder ready ({}, dim={})",
            embedder.name(),
            embedder.embedding_dim()
        ));
    }

    let pb = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(paths.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents",
            )?
            .progress_chars("#>-"),
        );
        pb
    };

    let report = pipeline.run(&FileSource, embedder.as_mut(), &query, &paths, Some(&pb))?;
    pb.finish_and_clear();

    let output = ChallengeOutput::now(&input, &report.sections);
    write_output(&args.output, &output)?;

    if !args.quiet {
        for skipped in &report.skipped {
            eprintln!("{} {}: {}", "skipped".yellow(), skipped.path.display(), skipped.reason);
        }
        for entry in &output.extracted_sections {
            eprintln!(
                "{:>2}. {} {} (p. {})",
                entry.importance_rank,
                entry.document.cyan(),
                entry.section_title.bold(),
                entry.page_number
            );
        }
        eprintln!(
            "Wrote {} sections to {}",
            output.extracted_sections.len().to_string().green(),
            args.output.display()
        );
    }
    Ok(())
}

fn cmd_outline(settings: &Settings, file: &Path, classifier: Option<&Path>, text: bool) -> Result<()> {
    let pipeline = Pipeline::from_settings(settings, load_classifier(classifier)?);
    let doc = FileSource
        .load(file)
        .with_context(|| format!("Failed to load document: {}", file.display()))?;
    let outline = pipeline.outline(&doc);

    if text {
        print!("{}", render_outline(&outline));
    } else {
        println!("{}", serde_json::to_string_pretty(&outline)?);
    }
    Ok(())
}

fn render_outline(outline: &Outline) -> String {
    let mut out = String::new();
    if !outline.title.is_empty() {
        out.push_str(&format!("{}\n", outline.title.bold()));
    }
    for entry in &outline.outline {
        let indent = match entry.level {
            HeadingLevel::H1 => 0,
            HeadingLevel::H2 => 2,
            HeadingLevel::H3 => 4,
            HeadingLevel::H4 => 6,
        };
        out.push_str(&format!(
            "{:indent$}{} {} {}\n",
            "",
            entry.level.as_str().cyan(),
            entry.text,
            format!("(p. {})", entry.page).dimmed(),
        ));
    }
    out
}

fn cmd_sections(settings: &Settings, file: &Path, json: bool) -> Result<()> {
    let pipeline = Pipeline::from_settings(settings, None);
    let doc = FileSource
        .load(file)
        .with_context(|| format!("Failed to load document: {}", file.display()))?;
    let sections = pipeline.sections_of(&doc);

    if json {
        println!("{}", serde_json::to_string_pretty(&sections)?);
    } else {
        for section in &sections {
            println!("{}", describe_section(section));
        }
    }
    Ok(())
}

fn describe_section(section: &Section) -> String {
    let pages = if section.start_page == section.end_page {
        format!("p. {}", section.start_page)
    } else {
        format!("pp. {}-{}", section.start_page, section.end_page)
    };
    format!(
        "{} {} ({} chars)",
        format!("[{pages}]").cyan(),
        section.title.bold(),
        section.content.chars().count()
    )
}
