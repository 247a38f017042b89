use anyhow::Result;
use batchdem::{ElevationReader, GeoTiffSource, HgtSource, RasterSource};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Format, ReaderOptions};

/// Batch elevation lookups over a remote DEM tile set
#[derive(Parser)]
#[command(name = "batchdem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tile set location: http(s) URL or local directory with index.list.gz
    #[arg(short, long, env = "BATCHDEM_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Directory for downloaded tiles (default: <temp>/dem)
    #[arg(short, long, env = "BATCHDEM_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Raster format of the tiles
    #[arg(short, long, value_enum, default_value = "geotiff", global = true)]
    format: Format,

    /// HTTP timeout in seconds, 0 disables it
    #[arg(
        long,
        env = "BATCHDEM_TIMEOUT_SECS",
        default_value = "300",
        global = true
    )]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// X coordinate (longitude)
        #[arg(short, long, allow_negative_numbers = true)]
        x: f64,

        /// Y coordinate (latitude)
        #[arg(short, long, allow_negative_numbers = true)]
        y: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an elevation column to a CSV file
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: <input>_elevation.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for x (longitude)
        #[arg(long, default_value = "lon")]
        x_col: String,

        /// Column name for y (latitude)
        #[arg(long, default_value = "lat")]
        y_col: String,

        /// Number of worker threads
        #[arg(short, long, default_value = "4")]
        threads: usize,
    },

    /// Print the tile covering a coordinate without fetching it
    Lookup {
        /// X coordinate (longitude)
        #[arg(short, long, allow_negative_numbers = true)]
        x: f64,

        /// Y coordinate (latitude)
        #[arg(short, long, allow_negative_numbers = true)]
        y: f64,
    },

    /// List the tiles of the manifest and whether they are cached
    Tiles,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batchdem=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let options = ReaderOptions {
        base_url: cli.base_url,
        cache_dir: cli.cache_dir,
        timeout_secs: cli.timeout_secs,
    };

    match cli.format {
        Format::Geotiff => dispatch(options.open(GeoTiffSource)?, cli.command),
        Format::Hgt => dispatch(options.open(HgtSource)?, cli.command),
    }
}

fn dispatch<R: RasterSource>(reader: ElevationReader<R>, command: Commands) -> Result<()> {
    let result = match command {
        Commands::Query { x, y, json } => commands::query::run(&reader, x, y, json),
        Commands::Batch {
            input,
            output,
            x_col,
            y_col,
            threads,
        } => commands::batch::run(&reader, input, output, &x_col, &y_col, threads),
        Commands::Lookup { x, y } => commands::lookup::run(&reader, x, y),
        Commands::Tiles => commands::tiles::run(&reader),
    };
    reader.close();
    result
}
