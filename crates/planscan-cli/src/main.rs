#![allow(
    clippy::cast_possible_truncation, // progress lengths and page numbers
    clippy::cast_precision_loss,      // coordinates printed for display
    clippy::too_many_lines,           // CLI handlers are necessarily long
    clippy::needless_pass_by_value,   // clap hands over owned values
    clippy::fn_params_excessive_bools,
)]

//! Planscan CLI - column detection and column project editing
//!
//! Detect columns on vector PDF blueprints (or JSON operation lists), keep
//! them in a project file, and adjust them by hand.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use config::{Config, DetectionOverrides, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use planscan_core::{
    export_columns, export_pages, lock_store, Column, ColumnPatch, ColumnProjector, ColumnStore,
    ColumnType, DebouncedSaver, DetectionOutcome, DetectionRunner, DetectionStage, ExportFormat,
    JsonFileRepository, LopdfSource, PageSource, Point, ProjectRepository, ProjectSnapshot, Rect,
    StaticSource,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Verbosity level for output control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    const fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    const fn should_show_output(self) -> bool {
        !matches!(self, Self::Quiet)
    }

    const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable table (default)
    Text,
    /// CSV records
    Csv,
    /// Pretty-printed JSON array
    Json,
}

impl OutputFormat {
    const fn export_format(self) -> Option<ExportFormat> {
        match self {
            Self::Text => None,
            Self::Csv => Some(ExportFormat::Csv),
            Self::Json => Some(ExportFormat::Json),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "planscan",
    about = "Detect structural columns on vector blueprints",
    long_about = "Detect structural columns on vector PDF blueprints from their drawing\n\
                  instructions, keep them in a project file, and edit them by hand.",
    version
)]
struct Args {
    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed processing information
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect columns on one or more pages
    #[command(long_about = "Detect columns on one or more pages of a PDF or a JSON operation list.\n\
                      \n\
                      With --project, automatic columns are committed into the project file;\n\
                      manual columns already there are kept.\n\
                      \n\
                      Examples:\n\
                        planscan detect plan.pdf\n\
                        planscan detect plan.pdf --pages 1,3-4 -f csv -o columns.csv\n\
                        planscan detect plan.pdf --project plan.planscan.json --preset strict")]
    Detect {
        /// Input PDF, or a .json operation list
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Pages to process, 1-based (e.g. "1,3-5"); all pages by default
        #[arg(short, long, value_name = "PAGES", value_parser = parse_pages)]
        pages: Option<PageList>,

        /// Render scale detection runs at
        #[arg(short, long)]
        scale: Option<f64>,

        /// Region of interest "x,y,w,h" in page coordinates at scale 1
        #[arg(long, value_name = "RECT", value_parser = parse_rect)]
        roi: Option<Rect>,

        /// Commit results into this project file
        #[arg(long, value_name = "FILE")]
        project: Option<PathBuf>,

        /// Threshold preset: default, strict or lenient
        #[arg(long)]
        preset: Option<String>,

        /// Max deviation from 90° per corner
        #[arg(long, value_name = "DEG")]
        tolerance: Option<f64>,

        /// Minimum side length in render pixels
        #[arg(long, value_name = "PX")]
        min_side: Option<f64>,

        /// Minimum short/long side ratio for a square
        #[arg(long, value_name = "RATIO")]
        square_ratio: Option<f64>,

        /// IoU above which overlapping boxes merge
        #[arg(long, value_name = "IOU")]
        merge_iou: Option<f64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Write output to a file instead of stdout
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// List the columns stored in a project
    List {
        #[arg(long, value_name = "FILE")]
        project: PathBuf,

        /// Only this page (1-based)
        #[arg(long)]
        page: Option<usize>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Place a manual column centered on a point
    Add {
        #[arg(long, value_name = "FILE")]
        project: PathBuf,

        /// Page (1-based)
        #[arg(long)]
        page: usize,

        /// Center "x,y"
        #[arg(long, value_name = "POINT", value_parser = parse_point)]
        at: Point,

        /// Scale the point was measured at (e.g. the viewer zoom)
        #[arg(long, default_value_t = 1.0)]
        scale: f64,

        /// Side length at scale 1; configured default when omitted
        #[arg(long)]
        size: Option<f64>,
    },

    /// Delete a column
    Delete {
        #[arg(long, value_name = "FILE")]
        project: PathBuf,

        /// Page (1-based)
        #[arg(long)]
        page: usize,

        #[arg(long)]
        id: String,
    },

    /// Change a column's metadata
    Edit {
        #[arg(long, value_name = "FILE")]
        project: PathBuf,

        /// Page (1-based)
        #[arg(long)]
        page: usize,

        #[arg(long)]
        id: String,

        /// structural, decorative, support, pillar, custom or manual
        #[arg(long = "type", value_name = "TYPE", value_parser = parse_column_type)]
        column_type: Option<ColumnType>,

        #[arg(long)]
        note: Option<String>,

        #[arg(long)]
        material: Option<String>,

        #[arg(long)]
        unit: Option<String>,

        #[arg(long)]
        color: Option<String>,
    },

    /// Export a project's columns as CSV or JSON
    Export {
        #[arg(long, value_name = "FILE")]
        project: PathBuf,

        /// Only this page (1-based)
        #[arg(long)]
        page: Option<usize>,

        /// csv or json; configured default when omitted
        #[arg(short, long, value_parser = parse_export_format)]
        format: Option<ExportFormat>,

        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Manage .planscan.toml configuration
    #[command(long_about = "Manage planscan configuration files.\n\
                      \n\
                      Configuration files are loaded in this order (later overrides earlier):\n\
                        1. User config: ~/.planscan.toml\n\
                        2. Project config: ./.planscan.toml\n\
                        3. Command-line arguments")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Create a .planscan.toml with the default settings
    Init {
        /// Create in the home directory instead of the current directory
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display the effective configuration
    Show {
        /// Output as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

/// Sorted, deduplicated 1-based page numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PageList(Vec<usize>);

/// Parse "1,3-5" into a [`PageList`].
fn parse_pages(s: &str) -> Result<PageList, String> {
    let mut pages = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let number = |text: &str| -> Result<usize, String> {
            match text.trim().parse::<usize>() {
                Ok(0) => Err("pages are numbered from 1".to_string()),
                Ok(n) => Ok(n),
                Err(_) => Err(format!("invalid page number: '{text}'")),
            }
        };
        if let Some((start, end)) = part.split_once('-') {
            let (start, end) = (number(start)?, number(end)?);
            if start > end {
                return Err(format!("invalid page range: '{part}'"));
            }
            pages.extend(start..=end);
        } else {
            pages.push(number(part)?);
        }
    }
    if pages.is_empty() {
        return Err("no pages given".to_string());
    }
    pages.sort_unstable();
    pages.dedup();
    Ok(PageList(pages))
}

fn parse_numbers<const N: usize>(s: &str, what: &str) -> Result<[f64; N], String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid {what} '{s}': {e}"))?;
    let values: [f64; N] = values
        .try_into()
        .map_err(|_| format!("invalid {what} '{s}': expected {N} comma-separated numbers"))?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(format!("invalid {what} '{s}': values must be finite"));
    }
    Ok(values)
}

fn parse_point(s: &str) -> Result<Point, String> {
    let [x, y] = parse_numbers(s, "point")?;
    Ok(Point::new(x, y))
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let [x, y, w, h] = parse_numbers(s, "rectangle")?;
    if w < 0.0 || h < 0.0 {
        return Err(format!("invalid rectangle '{s}': negative size"));
    }
    Ok(Rect::new(x, y, w, h))
}

fn parse_column_type(s: &str) -> Result<ColumnType, String> {
    s.parse()
}

fn parse_export_format(s: &str) -> Result<ExportFormat, String> {
    s.parse().map_err(|e: planscan_core::PlanscanError| e.to_string())
}

/// 1-based page number from the command line to a store index.
fn page_index(page: usize) -> Result<usize> {
    page.checked_sub(1).context("Pages are numbered from 1")
}

fn init_logging(verbosity: Verbosity) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(verbosity.log_filter()),
    )
    .target(env_logger::Target::Stderr)
    .init();
}

fn open_source(input: &Path) -> Result<Arc<dyn PageSource>> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }
    let is_json = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let source: Arc<dyn PageSource> = if is_json {
        Arc::new(
            StaticSource::open(input)
                .with_context(|| format!("Failed to read operation list {}", input.display()))?,
        )
    } else {
        Arc::new(
            LopdfSource::open(input)
                .with_context(|| format!("Failed to open PDF {}", input.display()))?,
        )
    };
    Ok(source)
}

fn load_project(path: &Path) -> Result<ColumnStore> {
    let snapshot = JsonFileRepository::new(path)
        .load()
        .with_context(|| format!("Failed to load project {}", path.display()))?;
    Ok(snapshot.map_or_else(ColumnStore::new, ProjectSnapshot::into_store))
}

fn load_existing_project(path: &Path) -> Result<ColumnStore> {
    if !path.exists() {
        bail!("Project file not found: {}", path.display());
    }
    load_project(path)
}

fn save_project(path: &Path, store: &ColumnStore) -> Result<()> {
    JsonFileRepository::new(path)
        .save(&ProjectSnapshot::capture(store))
        .with_context(|| format!("Failed to save project {}", path.display()))
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(io::BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Write the given pages (store indices) in `format`.
fn write_columns(
    store: &ColumnStore,
    pages: &[usize],
    format: OutputFormat,
    mut out: impl Write,
) -> Result<()> {
    match format.export_format() {
        Some(export) => {
            export_pages(pages.iter().map(|&p| (p, store.list(p))), export, out)?;
        }
        None => {
            for &page in pages {
                write_text_page(page, store.list(page), &mut out)?;
            }
        }
    }
    Ok(())
}

fn write_text_page(page: usize, columns: &[Column], out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "{} {} ({} columns)",
        "Page".bold(),
        (page + 1).to_string().bold(),
        columns.len()
    )?;
    for column in columns {
        let id = if column.is_manual() {
            column.id.blue()
        } else {
            column.id.red()
        };
        let r = &column.geometry;
        writeln!(
            out,
            "  {:<6} {:>9.2} {:>9.2} {:>8.2} {:>8.2}  {}{}",
            id,
            r.x,
            r.y,
            r.w,
            r.h,
            column.column_type,
            if column.note.is_empty() {
                String::new()
            } else {
                format!("  {}", column.note.dimmed())
            }
        )?;
    }
    Ok(())
}

fn stage_progress(show: bool, total: u64) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░  "));
    }
    pb
}

struct DetectOptions {
    input: PathBuf,
    pages: Option<PageList>,
    scale: Option<f64>,
    roi: Option<Rect>,
    project: Option<PathBuf>,
    preset: Option<String>,
    overrides: DetectionOverrides,
    format: OutputFormat,
    output: Option<PathBuf>,
}

fn detect_command(options: DetectOptions, config: &Config, verbosity: Verbosity) -> Result<()> {
    let source = open_source(&options.input)?;
    let page_count = source.page_count();
    if page_count == 0 {
        bail!("{} has no pages", options.input.display());
    }

    let pages: Vec<usize> = match &options.pages {
        Some(PageList(pages)) => {
            if let Some(&bad) = pages.iter().find(|&&p| p > page_count) {
                bail!(
                    "Page {} out of range ({} has {} pages)",
                    bad,
                    options.input.display(),
                    page_count
                );
            }
            pages.iter().map(|p| p - 1).collect()
        }
        None => (0..page_count).collect(),
    };

    let detection = config.detection_config(options.preset.as_deref(), options.overrides)?;
    let scale = config.scale(options.scale);

    let store = match &options.project {
        Some(path) => load_project(path)?,
        None => ColumnStore::with_manual_size(detection.default_manual_size),
    }
    .into_shared();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let show = verbosity.should_show_output();
    let committed = runtime.block_on(async {
        let runner = DetectionRunner::new(Arc::clone(&store), source)
            .with_scale(scale)
            .context("Invalid render scale")?;
        let saver = options.project.as_ref().map(|path| {
            DebouncedSaver::with_delay(
                Arc::clone(&store),
                Arc::new(JsonFileRepository::new(path)),
                config.save_delay(),
            )
        });

        let steps = (pages.len() * DetectionStage::ALL.len()) as u64;
        let pb = stage_progress(show, steps);
        let mut committed = 0usize;

        for &page in &pages {
            let mut handle = runner.start(page, detection, options.roi);
            while let Some(event) = handle.events().recv().await {
                pb.set_message(format!("page {} {}", event.page + 1, event.stage));
                pb.inc(1);
            }
            let outcome = handle
                .wait()
                .await
                .with_context(|| format!("Detection failed on page {}", page + 1))?;
            match outcome {
                DetectionOutcome::Committed { count } => {
                    committed += count;
                    if let Some(saver) = &saver {
                        saver.mark_dirty();
                    }
                }
                DetectionOutcome::Superseded | DetectionOutcome::Cancelled => {
                    log::warn!("Page {}: detection did not commit ({:?})", page + 1, outcome);
                }
            }
        }
        pb.finish_and_clear();

        if let Some(saver) = saver {
            saver.shutdown().await.context("Failed to save project")?;
        }
        anyhow::Ok(committed)
    })?;

    let guard = lock_store(&store)?;
    let out = open_output(options.output.as_deref())?;
    write_columns(&guard, &pages, options.format, out)?;

    if show {
        eprintln!(
            "{} {} columns on {} page(s)",
            "Detected".green().bold(),
            committed,
            pages.len()
        );
        if let Some(path) = &options.project {
            eprintln!("{} {}", "Saved".green().bold(), path.display());
        }
        if let Some(path) = &options.output {
            eprintln!("{} {}", "Wrote".green().bold(), path.display());
        }
    }
    Ok(())
}

fn selected_pages(store: &ColumnStore, page: Option<usize>) -> Result<Vec<usize>> {
    match page {
        Some(page) => Ok(vec![page_index(page)?]),
        None => Ok(store.pages().collect()),
    }
}

fn list_command(project: &Path, page: Option<usize>, format: OutputFormat) -> Result<()> {
    let store = load_existing_project(project)?;
    let pages = selected_pages(&store, page)?;
    write_columns(&store, &pages, format, io::stdout().lock())
}

fn add_command(
    project: &Path,
    page: usize,
    at: Point,
    scale: f64,
    size: Option<f64>,
    config: &Config,
    verbosity: Verbosity,
) -> Result<()> {
    let page0 = page_index(page)?;
    let projector = ColumnProjector::new(scale).context("Invalid --scale")?;
    let size = match size {
        Some(size) if size.is_finite() && size > 0.0 => size,
        Some(size) => bail!("Invalid --size {size}: must be positive"),
        None => {
            config
                .detection_config(None, DetectionOverrides::default())?
                .default_manual_size
        }
    };

    let mut store = load_project(project)?;
    let id = store.add_manual_sized(page0, projector.to_base_point(at), size);
    save_project(project, &store)?;

    if verbosity.should_show_output() {
        eprintln!("{} {} on page {}", "Added".green().bold(), id, page);
    }
    println!("{id}");
    Ok(())
}

fn delete_command(project: &Path, page: usize, id: &str, verbosity: Verbosity) -> Result<()> {
    let mut store = load_existing_project(project)?;
    store
        .delete_column(page_index(page)?, id)
        .with_context(|| format!("Cannot delete {id}"))?;
    save_project(project, &store)?;

    if verbosity.should_show_output() {
        eprintln!("{} {} from page {}", "Deleted".green().bold(), id, page);
    }
    Ok(())
}

fn edit_command(
    project: &Path,
    page: usize,
    id: &str,
    patch: &ColumnPatch,
    verbosity: Verbosity,
) -> Result<()> {
    if patch.is_empty() {
        bail!("Nothing to change: give at least one of --type, --note, --material, --unit, --color");
    }
    let mut store = load_existing_project(project)?;
    let page0 = page_index(page)?;
    store
        .update_fields(page0, id, patch)
        .with_context(|| format!("Cannot edit {id}"))?;
    save_project(project, &store)?;

    if verbosity.should_show_output() {
        eprintln!("{} {} on page {}", "Updated".green().bold(), id, page);
    }
    Ok(())
}

fn export_command(
    project: &Path,
    page: Option<usize>,
    format: Option<ExportFormat>,
    output: Option<&Path>,
    config: &Config,
    verbosity: Verbosity,
) -> Result<()> {
    let store = load_existing_project(project)?;
    let format = config.export_format(format)?;
    let out = open_output(output)?;
    match page {
        Some(page) => export_columns(store.list(page_index(page)?), format, out)?,
        None => export_pages(store.pages().map(|p| (p, store.list(p))), format, out)?,
    }

    if verbosity.should_show_output() {
        if let Some(path) = output {
            eprintln!(
                "{} {} columns to {}",
                "Exported".green().bold(),
                store.len(),
                path.display()
            );
        }
    }
    Ok(())
}

fn config_command(action: ConfigAction, config: &Config, verbosity: Verbosity) -> Result<()> {
    match action {
        ConfigAction::Init { global, force } => {
            let path = if global {
                Config::user_config_path().context("Cannot determine home directory")?
            } else {
                Config::project_config_path()
            };
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            let content = toml::to_string_pretty(&Config::starter())
                .context("Failed to serialize configuration")?;
            fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if verbosity.should_show_output() {
                eprintln!("{} {}", "Created".green().bold(), path.display());
            }
        }
        ConfigAction::Show { json } => {
            let text = if json {
                serde_json::to_string_pretty(config).context("Failed to serialize configuration")?
            } else {
                toml::to_string_pretty(config).context("Failed to serialize configuration")?
            };
            if text.trim().is_empty() {
                println!("# No {CONFIG_FILE_NAME} found; built-in defaults apply");
            } else {
                println!("{text}");
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);
    init_logging(verbosity);

    let config = Config::discover();

    match args.command {
        Commands::Detect {
            input,
            pages,
            scale,
            roi,
            project,
            preset,
            tolerance,
            min_side,
            square_ratio,
            merge_iou,
            format,
            output,
        } => detect_command(
            DetectOptions {
                input,
                pages,
                scale,
                roi,
                project,
                preset,
                overrides: DetectionOverrides {
                    angular_tolerance_deg: tolerance,
                    min_side_px: min_side,
                    square_ratio_min: square_ratio,
                    merge_iou_threshold: merge_iou,
                },
                format,
                output,
            },
            &config,
            verbosity,
        ),
        Commands::List {
            project,
            page,
            format,
        } => list_command(&project, page, format),
        Commands::Add {
            project,
            page,
            at,
            scale,
            size,
        } => add_command(&project, page, at, scale, size, &config, verbosity),
        Commands::Delete { project, page, id } => delete_command(&project, page, &id, verbosity),
        Commands::Edit {
            project,
            page,
            id,
            column_type,
            note,
            material,
            unit,
            color,
        } => edit_command(
            &project,
            page,
            &id,
            &ColumnPatch {
                column_type,
                note,
                color,
                material,
                unit,
            },
            verbosity,
        ),
        Commands::Export {
            project,
            page,
            format,
            output,
        } => export_command(
            &project,
            page,
            format,
            output.as_deref(),
            &config,
            verbosity,
        ),
        Commands::Config { action } => config_command(action, &config, verbosity),
    }
}
