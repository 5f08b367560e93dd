use betasquares::inputs::{
    group_colours, load_order_and_rename, load_row_colours, load_sample_groups, prefix_groups,
};
use betasquares::{render_matrix, DistanceMatrix, Distances, LogDiagnostics, RangeMethod, RenderOptions};
use clap::Parser;
use log::{debug, info};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "betasquares")]
#[command(about = "Draw a beta diversity distance matrix as a grid of squares.", long_about = None)]
struct Args {
    // MANDATORY OPTIONS
    /// Load the distance matrix (PHYLIP lower triangle or square) from this FILE.
    #[arg(short = 'i', long = "distances", value_name = "FILE")]
    distances: PathBuf,

    /// Write the SVG to this FILE ('-' for stdout).
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    out: PathBuf,

    // Sample Selection Options
    /// Order, subset and rename samples from FILE (sample<TAB>display name).
    #[arg(short = 'r', long = "order-and-rename", value_name = "FILE")]
    order_and_rename: Option<PathBuf>,

    // Colour Options
    /// Read per-sample fill colours from FILE (sample<TAB>#rrggbb or r,g,b).
    #[arg(short = 'c', long = "row-colours", value_name = "FILE")]
    row_colours: Option<PathBuf>,

    /// Colour samples by group, read from FILE (sample<TAB>group). Colours from -c win.
    #[arg(short = 'g', long = "groups", value_name = "FILE")]
    groups: Option<PathBuf>,

    /// Colour samples by group, taking the sample name prefix before CHAR as the group.
    #[arg(short = 's', long = "group-by-prefix", value_name = "CHAR", conflicts_with = "groups")]
    group_by_prefix: Option<char>,

    // Scaling Options
    /// Lower percentile of pairwise similarities drawn as an empty square.
    #[arg(long = "low-percentile", value_name = "P", default_value_t = 10.0)]
    low_percentile: f64,

    /// Upper percentile of pairwise similarities drawn as a full square.
    #[arg(long = "high-percentile", value_name = "P", default_value_t = 90.0)]
    high_percentile: f64,

    /// Use a fixed similarity range instead of percentiles.
    #[arg(long = "fixed-range", value_name = "MIN,MAX", value_parser = parse_range,
          conflicts_with_all = ["low_percentile", "high_percentile"])]
    fixed_range: Option<(f64, f64)>,

    // Logging
    /// Verbosity level (0 = error, 1 = info, 2 = debug).
    #[arg(short = 'v', long = "verbose", value_name = "N", default_value_t = 1)]
    verbose: u8,
}

fn parse_range(s: &str) -> Result<(f64, f64), String> {
    let (min, max) = s
        .split_once(',')
        .ok_or_else(|| format!("expected MIN,MAX, found '{}'", s))?;
    let min = min.trim().parse::<f64>().map_err(|e| format!("invalid MIN: {}", e))?;
    let max = max.trim().parse::<f64>().map_err(|e| format!("invalid MAX: {}", e))?;
    Ok((min, max))
}

fn build_options(args: &Args, matrix: &DistanceMatrix) -> betasquares::Result<RenderOptions> {
    let mut options = RenderOptions::default();

    if let Some(ref path) = args.order_and_rename {
        let order = load_order_and_rename(path)?;
        info!("Loaded order of {} samples from {:?}", order.len(), path);
        options.order_and_rename = Some(order);
    }

    if let Some(ref path) = args.groups {
        let groups = load_sample_groups(path)?;
        debug!("Loaded groups for {} samples from {:?}", groups.len(), path);
        options.row_colours = group_colours(&groups);
    } else if let Some(sep) = args.group_by_prefix {
        let groups = prefix_groups(matrix.sample_names().iter().map(String::as_str), sep);
        options.row_colours = group_colours(&groups);
    }

    if let Some(ref path) = args.row_colours {
        let colours = load_row_colours(path)?;
        debug!("Loaded {} colours from {:?}", colours.len(), path);
        options.row_colours.extend(colours);
    }

    options.range = match args.fixed_range {
        Some((min, max)) => RangeMethod::Fixed { min, max },
        None => RangeMethod::Percentile {
            low: args.low_percentile,
            high: args.high_percentile,
        },
    };

    Ok(options)
}

fn main() {
    let args = Args::parse();

    // Initialize logger based on verbosity
    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let matrix = match DistanceMatrix::from_file(&args.distances) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error loading distance matrix {:?}: {}", args.distances, e);
            std::process::exit(1);
        }
    };

    let options = match build_options(&args, &matrix) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error loading inputs: {}", e);
            std::process::exit(1);
        }
    };

    info!("Rendering SVG...");
    let svg_content = match render_matrix(&matrix, &options, &mut LogDiagnostics) {
        Ok(svg) => svg,
        Err(e) => {
            eprintln!("Error rendering SVG: {}", e);
            std::process::exit(1);
        }
    };

    let written = if args.out.as_os_str() == "-" {
        std::io::stdout().lock().write_all(svg_content.as_bytes())
    } else {
        info!("Saving to {:?}...", args.out);
        File::create(&args.out).and_then(|mut file| file.write_all(svg_content.as_bytes()))
    };
    if let Err(e) = written {
        eprintln!("Error writing SVG: {}", e);
        std::process::exit(1);
    }

    info!("Done.");
}
