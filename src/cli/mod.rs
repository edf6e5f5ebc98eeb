//! # CLI Module
//!
//! Command-line interface for the photo lookup service.
//!
//! ## Usage
//! ```bash
//! # Build or update the index of the configured library
//! photo-lookup --data-dir ~/.photo-lookup build
//! photo-lookup build --rebuild
//!
//! # Find the closest library photos to a scan
//! photo-lookup lookup scan.jpg --detect --top-k 5
//!
//! # Show the detected region, writing scan_detected.jpg
//! photo-lookup bbox scan.jpg --preview
//!
//! # JSON output
//! photo-lookup --output json status
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use image::{Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use photo_lookup::config::AppConfig;
use photo_lookup::core::coordinator::{BuildStatus, BuildTask};
use photo_lookup::core::detector::{detect_main_region, BoundingBox};
use photo_lookup::core::imaging;
use photo_lookup::core::scanner::{ImageFilter, LibraryScanner, ScanConfig, WalkDirScanner};
use photo_lookup::error::{BuildError, PhotoLookupError, Result};
use photo_lookup::service::{LookupResponse, PhotoLookup};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const PREVIEW_SUFFIX: &str = "_detected";
const PREVIEW_THICKNESS: u32 = 5;
const PREVIEW_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Photo Lookup - find library photos that match a scan
#[derive(Parser, Debug)]
#[command(name = "photo-lookup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding config.json, index.json and debug captures
    #[arg(long, global = true, env = "PHOTOLOOKUP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update the index (or rebuild it from scratch) and wait for it
    Build {
        /// Discard the existing index and rehash every file
        #[arg(long)]
        rebuild: bool,
    },

    /// Show index and build status
    Status,

    /// Find the closest library images to a query image
    Lookup {
        image: PathBuf,

        /// Number of matches (1-100, default from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Hash only this region: x0,y0,x1,y1
        #[arg(long, conflicts_with = "detect")]
        bbox: Option<String>,

        /// Detect the main region first and hash only that
        #[arg(long)]
        detect: bool,
    },

    /// Detect the main image region of a file or every image in a directory
    Bbox {
        path: PathBuf,

        /// Write <stem>_detected.<ext> with the region outlined
        #[arg(long)]
        preview: bool,
    },

    /// Save a query image and its regions to the debug directory
    Capture {
        image: PathBuf,

        /// Region the user chose: x0,y0,x1,y1
        #[arg(long)]
        bbox: Option<String>,
    },

    /// Show the effective configuration
    Config,

    /// Show an indexed image by id
    Image {
        id: String,

        /// Copy the image file here
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let term = Term::stderr();

    // Region detection needs no configuration
    if let Commands::Bbox { path, preview } = &cli.command {
        return run_bbox(&term, path, *preview, cli.output);
    }

    let config = AppConfig::load(cli.data_dir)?;
    let service = PhotoLookup::open(config);

    let result = match cli.command {
        Commands::Build { rebuild } => run_build(&term, &service, rebuild, cli.output),
        Commands::Status => {
            let status = service.status();
            match cli.output {
                OutputFormat::Json => print_json(&status),
                OutputFormat::Pretty => print_status(&term, &status),
            }
            Ok(())
        }
        Commands::Lookup {
            image,
            top_k,
            bbox,
            detect,
        } => run_lookup(&term, &service, &image, top_k, bbox, detect, cli.output),
        Commands::Capture { image, bbox } => {
            let bytes = read_input(&image)?;
            let detected = service.detect_bbox(&bytes)?.bbox.to_string();
            let capture = service.save_debug_capture(&bytes, Some(&detected), bbox.as_deref())?;
            match cli.output {
                OutputFormat::Json => print_json(&capture),
                OutputFormat::Pretty => {
                    term.write_line(&format!("{} Saved capture {}", style("✓").green().bold(), style(&capture.id).cyan()))
                        .ok();
                    term.write_line(&format!("  {}", capture.image.display())).ok();
                    term.write_line(&format!("  {}", capture.meta.display())).ok();
                }
            }
            Ok(())
        }
        Commands::Config => {
            print_json(&service.config_summary());
            Ok(())
        }
        Commands::Image { id, save } => run_image(&term, &service, &id, save, cli.output),
        Commands::Bbox { .. } => Ok(()),
    };

    service.shutdown(SHUTDOWN_TIMEOUT);
    result
}

fn run_build(term: &Term, service: &PhotoLookup, rebuild: bool, output: OutputFormat) -> Result<()> {
    let started = service.start_build(rebuild)?;

    let progress = if output == OutputFormat::Pretty {
        term.write_line(&format!(
            "{} {}",
            style("Photo Lookup").bold().cyan(),
            style(format!("index {}", started.operation)).dim()
        ))
        .ok();
        let pb = ProgressBar::new(0);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(bar_style);
        pb.set_message("hashing");
        Some(pb)
    } else {
        None
    };

    let task = loop {
        match service.build_status() {
            Some(task) if task.is_running() => {
                if let Some(ref pb) = progress {
                    if let Some(total) = task.total {
                        pb.set_length(total as u64);
                    }
                    pb.set_position(task.progress as u64);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Some(task) => break task,
            None => break started,
        }
    };

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match output {
        OutputFormat::Json => print_json(&task),
        OutputFormat::Pretty => print_build_result(term, &task),
    }

    match (task.status, task.error) {
        (BuildStatus::Failed, Some(error)) => Err(BuildError::Failed(error).into()),
        _ => Ok(()),
    }
}

fn run_lookup(
    term: &Term,
    service: &PhotoLookup,
    image: &Path,
    top_k: Option<usize>,
    bbox: Option<String>,
    detect: bool,
    output: OutputFormat,
) -> Result<()> {
    let bytes = read_input(image)?;
    let region = if detect {
        Some(service.detect_bbox(&bytes)?.bbox.to_string())
    } else {
        bbox
    };

    let response = service.lookup(&bytes, top_k, region.as_deref())?;
    match output {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Pretty => print_matches(term, &response, region.as_deref()),
    }
    Ok(())
}

fn run_bbox(term: &Term, path: &Path, preview: bool, output: OutputFormat) -> Result<()> {
    let roots = vec![path.to_path_buf()];
    let scanner = WalkDirScanner::new(ScanConfig::default(), ImageFilter::new());
    let files: Vec<PathBuf> = scanner
        .discover(&roots)
        .filter(|file| !is_preview(file))
        .collect();

    #[derive(Serialize)]
    struct Detection {
        path: PathBuf,
        bbox: BoundingBox,
        preview: Option<PathBuf>,
    }

    let mut detections = Vec::with_capacity(files.len());
    for file in files {
        let image = match imaging::load_path(&file) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(path = %file.display(), "Skipping: {}", e);
                continue;
            }
        };
        let bbox = detect_main_region(&image);

        let preview_path = if preview {
            let mut canvas = image.to_rgb8();
            draw_outline(&mut canvas, bbox, PREVIEW_THICKNESS, PREVIEW_COLOR);
            let target = preview_path_for(&file);
            match canvas.save(&target) {
                Ok(()) => Some(target),
                Err(e) => {
                    tracing::warn!(path = %target.display(), "Failed to write preview: {}", e);
                    None
                }
            }
        } else {
            None
        };

        if output == OutputFormat::Pretty {
            term.write_line(&format!(
                "{} {}",
                style(bbox.to_string()).cyan(),
                file.display()
            ))
            .ok();
        }
        detections.push(Detection {
            path: file,
            bbox,
            preview: preview_path,
        });
    }

    if output == OutputFormat::Json {
        print_json(&detections);
    }
    Ok(())
}

fn run_image(term: &Term, service: &PhotoLookup, id: &str, save: Option<PathBuf>, output: OutputFormat) -> Result<()> {
    let entry = service
        .image_info(id)
        .ok_or_else(|| PhotoLookupError::NotFound(format!("image {}", id)))?;

    if let Some(target) = save {
        let blob = service
            .image_blob(id)
            .ok_or_else(|| PhotoLookupError::NotFound(entry.path.clone()))?;
        fs::write(&target, &blob.bytes).map_err(|source| PhotoLookupError::Io {
            path: target.clone(),
            source,
        })?;
        if output == OutputFormat::Pretty {
            term.write_line(&format!("Saved {} ({}) to {}", id, blob.mime_type, target.display()))
                .ok();
        }
    }

    match output {
        OutputFormat::Json => print_json(&entry),
        OutputFormat::Pretty => {
            term.write_line(&format!("{} {}", style(&entry.image_id).bold(), entry.path)).ok();
            term.write_line(&format!("  hash {}", style(&entry.hash).dim())).ok();
        }
    }
    Ok(())
}

fn print_status(term: &Term, status: &photo_lookup::service::IndexStatus) {
    term.write_line(&format!("{}", style("Index").bold().underlined())).ok();
    term.write_line(&format!("  path     {}", status.index_path.display())).ok();

    if let Some(error) = &status.load_error {
        term.write_line(&format!("  {} {}", style("corrupt").red().bold(), error)).ok();
    } else if let Some(count) = status.count {
        term.write_line(&format!("  entries  {}", style(count).cyan())).ok();
        if let Some(meta) = &status.meta {
            if let Some(updated) = meta.updated_at {
                term.write_line(&format!("  updated  {}", updated.format("%Y-%m-%d %H:%M:%S"))).ok();
            }
            if !meta.errors.is_empty() {
                term.write_line(&format!("  errors   {}", style(meta.errors.len()).yellow())).ok();
            }
        }
    } else {
        term.write_line(&format!("  {}", style("not built yet, run `photo-lookup build`").yellow()))
            .ok();
    }
}

fn print_build_result(term: &Term, task: &BuildTask) {
    match task.status {
        BuildStatus::Completed => {
            term.write_line(&format!(
                "{} Index {} complete: {} files processed",
                style("✓").green().bold(),
                task.operation,
                style(task.progress).cyan()
            ))
            .ok();
            if task.errors > 0 {
                term.write_line(&format!("  {} errors", style(task.errors).yellow())).ok();
            }
            if let Some(meta) = &task.result {
                if let Some(stats) = &meta.stats {
                    term.write_line(&format!(
                        "  {} added, {} removed, {} total",
                        stats.added, stats.removed, stats.total
                    ))
                    .ok();
                }
                for error in &meta.errors {
                    term.write_line(&format!("  {} {}", style("!").yellow(), style(error).dim())).ok();
                }
            }
        }
        BuildStatus::Failed => {
            term.write_line(&format!(
                "{} Index {} failed: {}",
                style("✗").red().bold(),
                task.operation,
                task.error.as_deref().unwrap_or("unknown error")
            ))
            .ok();
        }
        BuildStatus::Running => {}
    }
}

fn print_matches(term: &Term, response: &LookupResponse, region: Option<&str>) {
    term.write_line(&format!("  query {}", style(&response.query_hash).dim())).ok();
    if let Some(region) = region {
        term.write_line(&format!("  region {}", region)).ok();
    }
    term.write_line("").ok();

    if response.matches.is_empty() {
        term.write_line("  No matches, the index is empty").ok();
        return;
    }

    for (rank, m) in response.matches.iter().enumerate() {
        term.write_line(&format!(
            "  {} {:.4}  {}",
            style(format!("{}.", rank + 1)).bold(),
            m.distance,
            m.path
        ))
        .ok();
    }
    term.write_line("").ok();
    term.write_line(&format!("{}", style(format!("{} images in index", response.count)).dim()))
        .ok();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Failed to serialize output: {}", e),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| PhotoLookupError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_preview(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().ends_with(PREVIEW_SUFFIX))
        .unwrap_or(false)
}

/// `dir/scan.jpg` -> `dir/scan_detected.jpg`
fn preview_path_for(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, PREVIEW_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, PREVIEW_SUFFIX),
    };
    path.with_file_name(name)
}

/// Stroke `bbox` inward with `thickness` pixels of `color`.
fn draw_outline(canvas: &mut RgbImage, bbox: BoundingBox, thickness: u32, color: Rgb<u8>) {
    let Some(b) = bbox.clamped(canvas.width(), canvas.height()) else {
        return;
    };
    for y in b.y0..=b.y1 {
        for x in b.x0..=b.x1 {
            let on_edge = x - b.x0 < thickness || b.x1 - x < thickness || y - b.y0 < thickness || b.y1 - y < thickness;
            if on_edge {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_names_keep_extension() {
        assert_eq!(preview_path_for(Path::new("/scans/a.jpg")), PathBuf::from("/scans/a_detected.jpg"));
        assert_eq!(preview_path_for(Path::new("/scans/b")), PathBuf::from("/scans/b_detected"));
        assert!(is_preview(Path::new("/scans/a_detected.jpg")));
        assert!(!is_preview(Path::new("/scans/a.jpg")));
    }

    #[test]
    fn outline_only_touches_the_border_band() {
        let mut canvas = RgbImage::new(40, 30);
        draw_outline(&mut canvas, BoundingBox::new(5, 5, 34, 24), 5, PREVIEW_COLOR);

        assert_eq!(*canvas.get_pixel(5, 5), PREVIEW_COLOR);
        assert_eq!(*canvas.get_pixel(9, 15), PREVIEW_COLOR);
        assert_eq!(*canvas.get_pixel(34, 24), PREVIEW_COLOR);
        assert_eq!(*canvas.get_pixel(10, 15), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(4, 4), Rgb([0, 0, 0]));
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["photo-lookup", "lookup", "q.jpg", "-k", "5", "--output", "json"]).unwrap();

        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Lookup { top_k: Some(5), detect: false, .. }));
    }

    #[test]
    fn bbox_and_detect_conflict() {
        let parsed = Cli::try_parse_from(["photo-lookup", "lookup", "q.jpg", "--bbox", "1,2,3,4", "--detect"]);
        assert!(parsed.is_err());
    }
}
