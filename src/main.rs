use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use crispy::{ClipRect, Compression, Mode, Notice, Options, RunReport, compress, optimize_file, optimize_with_options};
use log::{error, info, warn};

/// Suffix marking files this tool wrote.
const OPTIMIZED_SUFFIX: &str = "_optimized";

#[derive(Parser)]
#[command(name = "crispy")]
#[command(about = "A pixel-art SVG optimizer", long_about = None)]
struct Cli {
    /// Input files (use - for stdin)
    #[arg(default_value = "-", num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Output file, for a single input (use - for stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit one outline path per same-color region instead of rects
    #[arg(long)]
    paths: bool,

    /// Only merge horizontally
    #[arg(long)]
    no_vertical: bool,

    /// Merge emitted rects that share an edge and a color
    #[arg(long)]
    merge_shapes: bool,

    /// Pretty-print the output with an XML declaration
    #[arg(long)]
    no_minify: bool,

    /// Keep attributes in writing order instead of sorting them
    #[arg(long)]
    no_sort_attrs: bool,

    /// Output compression
    #[arg(long, value_enum, default_value = "none")]
    compress: CompressArg,

    /// gzip level (1-9)
    #[arg(long, default_value = "9")]
    gzip_level: u32,

    /// Stream inputs larger than this many bytes (0 never streams)
    #[arg(long, default_value = "33554432")]
    streaming_threshold: u64,

    /// Size of one pixel in user units (default: derived from the input)
    #[arg(long)]
    pixel_size: Option<f64>,

    /// Clip to a rectangle in user units: x,y,width,height
    #[arg(long, value_parser = parse_clip)]
    clip: Option<ClipRect>,

    /// Fail on content that isn't pixel rects instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Write `<name>.svg` instead of `<name>_optimized.svg`
    #[arg(long)]
    keep_name: bool,

    /// Process inputs that already look optimized
    #[arg(long)]
    force: bool,

    /// Print size comparison
    #[arg(short, long)]
    stats: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CompressArg {
    None,
    Gzip,
    Zopfli,
}

impl From<CompressArg> for Compression {
    fn from(arg: CompressArg) -> Self {
        match arg {
            CompressArg::None => Compression::None,
            CompressArg::Gzip => Compression::Gzip,
            CompressArg::Zopfli => Compression::Zopfli,
        }
    }
}

fn parse_clip(s: &str) -> Result<ClipRect, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{:?}: {}", p, e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(ClipRect {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => Err("expected x,y,width,height".into()),
    }
}

/// Whether a file name says it was already optimized.
fn is_already_optimized(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with(OPTIMIZED_SUFFIX))
}

fn output_path_for(input: &Path, keep_name: bool, compression: Compression) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = match compression {
        Compression::None => "svg",
        Compression::Gzip | Compression::Zopfli => "svgz",
    };
    let name = if keep_name {
        format!("{}.{}", stem, ext)
    } else {
        format!("{}{}.{}", stem, OPTIMIZED_SUFFIX, ext)
    };
    input.with_file_name(name)
}

fn log_report(report: &RunReport, input_len: Option<u64>, stats: bool) {
    match &report.error {
        Some(e) => error!("{}: {}", report.input_path.display(), e),
        None => {
            info!(
                "{} -> {}: {} shapes, {} bytes",
                report.input_path.display(),
                report.output_path.display(),
                report.shape_count,
                report.byte_size
            );
            for notice in &report.notices {
                log_notice(&report.input_path, notice);
            }
            if stats && let Some(input_len) = input_len {
                print_stats(input_len as usize, report.byte_size as usize);
            }
        }
    }
}

fn log_notice(input: &Path, notice: &Notice) {
    match notice {
        Notice::StreamingRectFallback { reason } => {
            warn!("{}: wrote rects instead of paths: {}", input.display(), reason)
        }
        Notice::SkippedElements { count } => {
            warn!("{}: skipped {} elements that are not pixel rects", input.display(), count)
        }
    }
}

fn print_stats(input_len: usize, output_len: usize) {
    let saved = input_len.saturating_sub(output_len);
    let percent = if input_len > 0 {
        (saved as f64 / input_len as f64) * 100.0
    } else {
        0.0
    };
    eprintln!(
        "{} -> {} bytes ({:.1}% smaller)",
        input_len, output_len, percent
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let options = Options {
        mode: if cli.paths { Mode::Paths } else { Mode::Rects },
        merge_vertical: !cli.no_vertical,
        merge_shapes: cli.merge_shapes,
        minify: !cli.no_minify,
        sort_attrs: !cli.no_sort_attrs,
        compress: cli.compress.into(),
        gzip_level: cli.gzip_level,
        streaming_threshold: (cli.streaming_threshold > 0).then_some(cli.streaming_threshold),
        canvas_clip: cli.clip,
        pixel_size: cli.pixel_size,
        strict: cli.strict,
    };
    options.validate()?;

    if cli.output.is_some() && cli.inputs.len() > 1 {
        return Err("--output needs a single input".into());
    }

    // stdin -> stdout (or --output)
    if cli.inputs.len() == 1 && cli.inputs[0].as_os_str() == "-" {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        let optimized = optimize_with_options(&input, &options)?;
        for notice in &optimized.notices {
            log_notice(Path::new("-"), notice);
        }
        let bytes = compress(optimized.svg.into_bytes(), options.compress, options.gzip_level)?;
        match &cli.output {
            Some(path) if path.as_os_str() != "-" => fs::write(path, &bytes)?,
            _ => io::stdout().write_all(&bytes)?,
        }
        if cli.stats {
            print_stats(input.len(), bytes.len());
        }
        return Ok(());
    }

    let mut failed = 0usize;
    for input in &cli.inputs {
        if !cli.force && is_already_optimized(input) {
            info!("{}: already optimized, skipping", input.display());
            continue;
        }
        let output = match &cli.output {
            Some(path) => path.clone(),
            None => output_path_for(input, cli.keep_name, options.compress),
        };
        let input_len = fs::metadata(input).ok().map(|m| m.len());
        let report = optimize_file(input, &output, &options);
        log_report(&report, input_len, cli.stats);
        if !report.is_ok() {
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} inputs failed", failed, cli.inputs.len()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_optimized_predicate() {
        assert!(is_already_optimized(Path::new("art/hero_optimized.svg")));
        assert!(is_already_optimized(Path::new("hero_optimized.svgz")));
        assert!(!is_already_optimized(Path::new("hero.svg")));
        assert!(!is_already_optimized(Path::new("optimized/hero.svg")));
    }

    #[test]
    fn test_output_naming() {
        assert_eq!(
            output_path_for(Path::new("art/hero.svg"), false, Compression::None),
            PathBuf::from("art/hero_optimized.svg")
        );
        assert_eq!(
            output_path_for(Path::new("hero.svg"), false, Compression::Gzip),
            PathBuf::from("hero_optimized.svgz")
        );
        assert_eq!(
            output_path_for(Path::new("hero.svg"), true, Compression::None),
            PathBuf::from("hero.svg")
        );
    }

    #[test]
    fn test_parse_clip() {
        assert_eq!(
            parse_clip("0, 0, 16,8").unwrap(),
            ClipRect {
                x: 0.0,
                y: 0.0,
                width: 16.0,
                height: 8.0
            }
        );
        assert!(parse_clip("1,2,3").is_err());
    }
}
