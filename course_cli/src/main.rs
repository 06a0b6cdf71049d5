use clap::{Args, Parser, Subcommand};
use course_core::library::{self, LibraryReport};
use course_core::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ergsheet")]
#[command(about = "Trainer course workbook to ERG/MRC converter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log parsing details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Course name patterns; `*` matches any prefix or suffix
#[derive(Args, Debug, Default)]
struct Selection {
    /// Only courses matching one of these patterns
    #[arg(long, num_args = 1..)]
    include: Vec<String>,

    /// Skip courses matching any of these patterns
    #[arg(long, num_args = 1..)]
    exclude: Vec<String>,

    /// Take at most this many included courses, before exclusion
    #[arg(long)]
    limit: Option<usize>,
}

impl Selection {
    fn filter(&self) -> NameFilter {
        let filter = NameFilter::new(&self.include, &self.exclude);
        match self.limit {
            Some(limit) => filter.with_limit(limit),
            None => filter,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print every course with its segments
    Summary {
        /// Workbook to read (.xlsx or .json snapshot)
        workbook: PathBuf,

        /// Include statistics on each course line
        #[arg(long)]
        stats: bool,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        selection: Selection,
    },

    /// Write one training file per course
    Export {
        workbook: PathBuf,

        /// Export root (defaults to export.output_dir)
        #[arg(long)]
        dst: Option<PathBuf>,

        /// erg or mrc (defaults to export.format)
        #[arg(long)]
        format: Option<String>,

        #[command(flatten)]
        selection: Selection,
    },

    /// Update the course library with each course's statistics
    Library {
        workbook: PathBuf,

        /// Library CSV (defaults to library.file next to the workbook)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List the named regions found on each sheet
    Regions {
        workbook: PathBuf,

        /// Only this sheet
        #[arg(long)]
        sheet: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        course_core::logging::init_with_level("debug");
    } else {
        course_core::logging::init();
    }

    if let Err(e) = run(cli) {
        tracing::debug!("Command failed: {:?}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Summary {
            workbook,
            stats,
            json,
            selection,
        } => cmd_summary(&workbook, stats, json, &selection, &config),
        Commands::Export {
            workbook,
            dst,
            format,
            selection,
        } => cmd_export(&workbook, dst, format, &selection, &config),
        Commands::Library { workbook, out } => cmd_library(&workbook, out, &config),
        Commands::Regions { workbook, sheet } => cmd_regions(&workbook, sheet.as_deref()),
    }
}

#[derive(Serialize)]
struct CourseJson<'a> {
    name: String,
    category: Category,
    comments: Option<&'a str>,
    stats: &'a CourseStats,
    segments: &'a [CourseSegment],
}

fn cmd_summary(
    workbook: &Path,
    stats: bool,
    json: bool,
    selection: &Selection,
    config: &Config,
) -> Result<()> {
    let collection = CourseCollection::open(workbook, config)?;
    let filter = selection.filter();

    if json {
        let courses = collection
            .filter(&filter)
            .into_iter()
            .map(|course| {
                Ok(CourseJson {
                    name: course.display_name(),
                    category: course.category,
                    comments: course.comments.as_deref(),
                    stats: course.statistics()?,
                    segments: course.segments(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&courses)?);
    } else {
        println!("{}", collection.summary(stats, &filter)?);
    }
    Ok(())
}

fn cmd_export(
    workbook: &Path,
    dst: Option<PathBuf>,
    format: Option<String>,
    selection: &Selection,
    config: &Config,
) -> Result<()> {
    let collection = CourseCollection::open(workbook, config)?;

    let mut options = ExportOptions::from(&config.export);
    if let Some(format) = format {
        options.format = format.parse()?;
    }
    let dst = dst.unwrap_or_else(|| config.export.output_dir.join(collection.name()));

    let written = collection.save(&dst, &options, &selection.filter())?;
    for path in &written {
        println!("  {}", path.display());
    }
    println!("✓ Exported {} courses to {}", written.len(), dst.display());
    Ok(())
}

fn cmd_library(workbook: &Path, out: Option<PathBuf>, config: &Config) -> Result<()> {
    let mut collection = CourseCollection::open(workbook, config)?;
    let csv_path = out.unwrap_or_else(|| library::default_path(&collection, &config.library));

    let LibraryReport { updated, appended } =
        library::write_back(&mut collection, &config.library, &csv_path)?;
    println!(
        "✓ Library updated: {} updated, {} added ({})",
        updated,
        appended,
        csv_path.display()
    );
    Ok(())
}

fn cmd_regions(workbook: &Path, only: Option<&str>) -> Result<()> {
    let workbook = Workbook::open(workbook)?;

    for sheet in &workbook.sheets {
        if only.map(|s| s != sheet.title).unwrap_or(false) {
            continue;
        }
        let regions = extract_regions(sheet)?;
        println!("{} ({} regions)", sheet.title, regions.len());
        for region in regions.top_level() {
            print_region(&region, 1);
            for (key, child) in region.implicit_named_ranges() {
                println!("{}↳ {} (row {})", "  ".repeat(2), key.name, key.row + 1);
                print_region(&child, 3);
            }
        }
    }
    Ok(())
}

fn print_region(region: &course_core::region::RegionRef<'_>, depth: usize) {
    let bounds = region.region();
    let indent = "  ".repeat(depth);
    if depth == 1 {
        println!("{}{}", indent, region.name());
    }
    println!(
        "{}rows {}-{}, cols {}-{}: {}",
        indent,
        bounds.min_row + 1,
        bounds.max_row + 1,
        bounds.min_col + 1,
        bounds.max_col + 1,
        region.header().join(", ")
    );
}
