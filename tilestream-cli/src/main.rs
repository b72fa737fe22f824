//! Tilestream CLI - fetch map tiles and inspect projections from the
//! command line.
//!
//! The `fetch` command drives the full pipeline the same way an embedding
//! map surface would: submit requests, then poll for completions on a
//! fixed interval until everything has resolved.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::debug;

use tilestream::coord::{self, LonLat, TileCoord, MAX_ZOOM, TILE_SIZE};
use tilestream::logging::init_logging;
use tilestream::{FetchOutcome, PipelineConfig, TilePipeline};

/// How long `fetch` waits for stragglers before giving up.
const FETCH_DEADLINE: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "tilestream", about = "Raster map tiles on demand", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a block of tiles around a point into the local cache.
    Fetch {
        /// Longitude of the center point, in degrees.
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Latitude of the center point, in degrees.
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Zoom level.
        #[arg(long)]
        zoom: u8,

        /// Tiles to fetch in each direction around the center tile.
        #[arg(long, default_value_t = 1)]
        radius: i32,

        /// Tile source URL template with {z}/{x}/{y} placeholders.
        #[arg(long)]
        url: Option<String>,

        /// Root directory for the tile cache.
        #[arg(long, default_value = ".tile_cache")]
        cache_dir: PathBuf,

        /// Fetch worker thread count.
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },

    /// Print pixel and tile coordinates for a point.
    Locate {
        /// Longitude in degrees.
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Latitude in degrees.
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Zoom level.
        #[arg(long)]
        zoom: u8,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(None) {
        eprintln!("failed to initialize logging: {}", e);
        return std::process::ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Fetch {
            lon,
            lat,
            zoom,
            radius,
            url,
            cache_dir,
            workers,
        } => fetch(lon, lat, zoom, radius, url, cache_dir, workers),
        Command::Locate { lon, lat, zoom } => {
            locate(lon, lat, zoom);
            Ok(())
        }
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

fn fetch(
    lon: f64,
    lat: f64,
    zoom: u8,
    radius: i32,
    url: Option<String>,
    cache_dir: PathBuf,
    workers: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if zoom > MAX_ZOOM {
        return Err(format!("zoom {} exceeds maximum {}", zoom, MAX_ZOOM).into());
    }

    let mut config = PipelineConfig::default()
        .with_cache_root(cache_dir)
        .with_workers(workers);
    if let Some(url) = url {
        config = config.with_url_template(url);
    }
    let poll_interval = config.poll_interval;
    let pipeline = TilePipeline::new(config)?;

    let center = coord::lonlat_to_tile(LonLat::new(lon, lat), zoom, TILE_SIZE);
    let n = 1i64 << zoom;
    let mut requested = 0usize;

    let done = Rc::new(RefCell::new(0usize));
    let failures = Rc::new(RefCell::new(Vec::<String>::new()));

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let x = center.x() as i64 + dx as i64;
            let y = center.y() as i64 + dy as i64;
            // Wrap east-west like a world map; clamp rows to the grid.
            let x = x.rem_euclid(n) as i32;
            if !(0..n).contains(&y) {
                continue;
            }

            requested += 1;
            let done = Rc::clone(&done);
            let failures = Rc::clone(&failures);
            pipeline.get_tile(zoom, x, y as i32, move |outcome, id| {
                *done.borrow_mut() += 1;
                match outcome {
                    FetchOutcome::Image(image) => {
                        debug!(key = %id, width = image.width(), "tile resolved")
                    }
                    FetchOutcome::Failed(e) => failures.borrow_mut().push(format!("{}: {}", id, e)),
                    FetchOutcome::Absent => {
                        failures.borrow_mut().push(format!("{}: no data", id))
                    }
                }
            });
        }
    }

    println!(
        "fetching {} tiles around {} at zoom {}...",
        requested,
        LonLat::new(lon, lat),
        zoom
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
    }

    let deadline = Instant::now() + FETCH_DEADLINE;
    while *done.borrow() < requested {
        if interrupted.load(Ordering::SeqCst) {
            println!("interrupted, shutting down");
            break;
        }
        if Instant::now() > deadline {
            eprintln!(
                "timed out with {}/{} tiles resolved",
                done.borrow(),
                requested
            );
            break;
        }
        pipeline.poll();
        std::thread::sleep(poll_interval);
    }

    let failed = failures.borrow();
    println!(
        "{}/{} tiles resolved, {} failed, cached under {}",
        *done.borrow() - failed.len(),
        requested,
        failed.len(),
        pipeline.cache_dir().display()
    );
    for failure in failed.iter() {
        eprintln!("  {}", failure);
    }

    pipeline.shutdown(true);
    Ok(())
}

fn locate(lon: f64, lat: f64, zoom: u8) {
    let point = LonLat::new(lon, lat);
    let pixel = coord::lonlat_to_pixel(point, zoom, TILE_SIZE);
    let tile = coord::lonlat_to_tile(point, zoom, TILE_SIZE);
    let corner = coord::tile_to_lonlat(TileCoord::new(zoom, tile.x() as f64, tile.y() as f64));

    println!("point:  {}", point);
    println!("pixel:  ({:.1}, {:.1}) at zoom {}", pixel.x, pixel.y, zoom);
    println!(
        "tile:   {}/{}/{} (fractional {:.4}, {:.4})",
        zoom,
        tile.x(),
        tile.y(),
        tile.xf,
        tile.yf
    );
    println!("anchor: {} (tile northwest corner)", corner);
}
