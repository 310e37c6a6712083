//! Terrabox CLI - raster region-growing and terrain tools

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use terrabox_algorithms::allocation::EuclideanAllocation;
use terrabox_algorithms::clump::{Clump, ClumpParams};
use terrabox_algorithms::cost_distance::{CostAllocation, CostDistance};
use terrabox_algorithms::focal::{Focal, FocalFilter, FocalParams, LaplacianKernel};
use terrabox_algorithms::new_raster::{FillValue, NewRasterFromBase, NewRasterParams};
use terrabox_algorithms::oto::{OtoParams, RemoveOffTerrainObjects};
use terrabox_core::io::write_raster;
use terrabox_core::{run_plugin, Access, DataType, PluginHost, Raster, ReturnData};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "terrabox")]
#[command(author, version, about = "Raster region-growing and terrain tools", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Cancel the running tool after this many seconds
    #[arg(long, global = true)]
    time_limit: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster (.dep header + .tas payload)
    Info {
        /// Input raster header
        input: PathBuf,
        /// Print the header and statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Label connected regions of equal value
    Clump {
        /// Input raster
        input: PathBuf,
        /// Output raster
        output: PathBuf,
        /// Only join the four axis neighbours
        #[arg(long)]
        no_diagonal: bool,
        /// Treat zero cells as background
        #[arg(short, long)]
        zero_background: bool,
    },
    /// Assign every cell the value of its nearest non-zero cell
    Allocation {
        /// Input raster of targets (non-zero cells)
        input: PathBuf,
        /// Output allocation raster
        output: PathBuf,
        /// Also write the distance to the nearest target
        #[arg(short, long)]
        distance: Option<PathBuf>,
    },
    /// Accumulated cost distance from source cells
    CostDistance {
        /// Source raster (non-zero cells are sources)
        sources: PathBuf,
        /// Cost surface (NoData or negative cells are impassable)
        cost: PathBuf,
        /// Output accumulated cost raster
        output: PathBuf,
        /// Output backlink raster
        backlink: PathBuf,
    },
    /// Follow backlinks to assign each cell its source's value
    CostAllocation {
        /// Source raster
        sources: PathBuf,
        /// Backlink raster from cost-distance
        backlink: PathBuf,
        /// Output raster
        output: PathBuf,
    },
    /// Remove buildings and vegetation from a DEM
    RemoveOtos {
        /// Input DEM
        input: PathBuf,
        /// Output DEM
        output: PathBuf,
        /// Largest object width, in cells
        #[arg(short, long, default_value = "101")]
        max_size: usize,
        /// Minimum slope of an object's edge, in degrees
        #[arg(short = 's', long, default_value = "15.0")]
        min_slope: f64,
        /// Repeat until the DEM stops changing
        #[arg(short, long)]
        iterate: bool,
    },
    /// Focal filters with reflected edges
    Filter {
        /// Input raster
        input: PathBuf,
        /// Output raster
        output: PathBuf,
        /// Filter to apply
        #[arg(short, long, value_enum, default_value = "laplacian")]
        filter: FilterKind,
        /// Laplacian kernel variant (1-4 are 3x3, 5-6 are 5x5)
        #[arg(short, long, default_value = "1")]
        kernel: u8,
        /// Window half-width or ring radius, in cells
        #[arg(short, long, default_value = "1")]
        radius: usize,
    },
    /// Create a raster with the grid of an existing one
    NewFromBase {
        /// Base raster
        base: PathBuf,
        /// Output raster
        output: PathBuf,
        /// Data type: double, float, integer, byte
        #[arg(short = 't', long, default_value = "float")]
        data_type: String,
        /// Initial cell value, or "nodata"
        #[arg(short, long, default_value = "0")]
        fill: String,
        /// NoData value (defaults to the base's)
        #[arg(short, long)]
        nodata: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterKind {
    Laplacian,
    Deviation,
    RingMean,
}

// ─── Host ───────────────────────────────────────────────────────────────

/// Drives an `indicatif` bar from algorithm progress
struct BarHost {
    bar: ProgressBar,
    cancel: Arc<AtomicBool>,
}

impl BarHost {
    fn new(time_limit: Option<u64>) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg:<24} [{bar:40.cyan/blue}] {pos:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        let cancel = Arc::new(AtomicBool::new(false));
        if let Some(secs) = time_limit {
            let flag = Arc::clone(&cancel);
            thread::spawn(move || {
                thread::sleep(Duration::from_secs(secs));
                flag.store(true, Ordering::Relaxed);
            });
        }
        Self { bar, cancel }
    }
}

impl PluginHost for BarHost {
    fn show_feedback(&self, message: &str) {
        self.bar.println(message);
    }

    fn update_progress(&self, label: &str, percent: u8) {
        self.bar.set_message(label.to_string());
        self.bar.set_position(u64::from(percent));
    }

    fn return_data(&self, data: ReturnData) {
        match data {
            ReturnData::Raster(path) => info!("Output: {}", path.display()),
            ReturnData::Text(text) => self.bar.println(text),
            ReturnData::Report { title, body } => self.bar.println(format!("{}\n{}", title, body)),
        }
    }

    fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn plugin_complete(&self) {
        self.bar.finish_and_clear();
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn read_raster(path: &Path) -> Result<Raster> {
    let raster = Raster::open(path, Access::ReadOnly)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(host: &BarHost, raster: &Raster, path: &Path) -> Result<()> {
    write_raster(raster, path).with_context(|| format!("Failed to write {}", path.display()))?;
    host.return_data(ReturnData::Raster(path.to_path_buf()));
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_kernel(kernel: u8) -> Result<LaplacianKernel> {
    match kernel {
        1 => Ok(LaplacianKernel::Four),
        2 => Ok(LaplacianKernel::FourSharpen),
        3 => Ok(LaplacianKernel::Eight),
        4 => Ok(LaplacianKernel::Diagonal),
        5 => Ok(LaplacianKernel::Wide),
        6 => Ok(LaplacianKernel::WideBalanced),
        _ => anyhow::bail!("Unknown Laplacian kernel: {}. Use 1 to 6.", kernel),
    }
}

fn parse_fill(fill: &str) -> Result<FillValue> {
    let lower = fill.to_lowercase();
    if lower.contains("nodata") || lower.contains("no data") {
        return Ok(FillValue::NoData);
    }
    let value = fill
        .trim()
        .parse()
        .with_context(|| format!("Invalid fill value: {}", fill))?;
    Ok(FillValue::Constant(value))
}

fn print_info(input: &Path, raster: &Raster, json: bool) -> Result<()> {
    let header = raster.header();
    let stats = raster.statistics();
    if json {
        let report = serde_json::json!({
            "file": input.display().to_string(),
            "header": header,
            "statistics": {
                "min": stats.min,
                "max": stats.max,
                "mean": stats.mean,
                "std_dev": stats.std_dev,
                "valid_count": stats.valid_count,
                "nodata_count": stats.nodata_count,
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let extent = raster.extent();
    println!("File: {}", input.display());
    println!(
        "Dimensions: {} x {} ({} cells)",
        raster.cols(),
        raster.rows(),
        raster.len()
    );
    println!(
        "Cell size: {} x {}",
        raster.cell_size_x(),
        raster.cell_size_y()
    );
    println!(
        "Extent: N {:.6}  S {:.6}  E {:.6}  W {:.6}",
        extent.north, extent.south, extent.east, extent.west
    );
    println!("Data type: {}  Scale: {}", header.data_type, header.data_scale);
    println!("Byte order: {}", header.byte_order);
    println!("NoData: {}", header.nodata);
    if header.projection != terrabox_core::raster::NOT_SPECIFIED {
        println!("Projection: {}", header.projection);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    if let Some(sd) = stats.std_dev {
        println!("  Std dev: {:.4}", sd);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    for entry in &header.metadata {
        println!("  Metadata: {}", entry);
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Info { input, json } => {
            let raster = read_raster(&input)?;
            print_info(&input, &raster, json)?;
        }

        Commands::Clump {
            input,
            output,
            no_diagonal,
            zero_background,
        } => {
            let raster = read_raster(&input)?;
            let host = BarHost::new(cli.time_limit);
            let start = Instant::now();
            let params = ClumpParams {
                diagonal: !no_diagonal,
                zero_background,
            };
            let result = run_plugin(&host, &Clump, raster, params).context("Clump failed")?;
            let elapsed = start.elapsed();
            write_result(&host, &result, &output)?;
            done("Clump", &output, elapsed);
        }

        Commands::Allocation {
            input,
            output,
            distance,
        } => {
            let raster = read_raster(&input)?;
            let host = BarHost::new(cli.time_limit);
            let start = Instant::now();
            let result = run_plugin(&host, &EuclideanAllocation, raster, ())
                .context("Euclidean allocation failed")?;
            let elapsed = start.elapsed();
            write_result(&host, &result.allocation, &output)?;
            if let Some(path) = &distance {
                write_result(&host, &result.distance, path)?;
            }
            done("Euclidean allocation", &output, elapsed);
        }

        Commands::CostDistance {
            sources,
            cost,
            output,
            backlink,
        } => {
            let sources = read_raster(&sources)?;
            let cost = read_raster(&cost)?;
            let host = BarHost::new(cli.time_limit);
            let start = Instant::now();
            let result = run_plugin(&host, &CostDistance, (sources, cost), ())
                .context("Cost distance failed")?;
            let elapsed = start.elapsed();
            write_result(&host, &result.distance, &output)?;
            write_result(&host, &result.backlink, &backlink)?;
            done("Cost distance", &output, elapsed);
        }

        Commands::CostAllocation {
            sources,
            backlink,
            output,
        } => {
            let sources = read_raster(&sources)?;
            let links = read_raster(&backlink)?;
            let host = BarHost::new(cli.time_limit);
            let start = Instant::now();
            let result = run_plugin(&host, &CostAllocation, (sources, links), ())
                .context("Cost allocation failed")?;
            let elapsed = start.elapsed();
            write_result(&host, &result, &output)?;
            done("Cost allocation", &output, elapsed);
        }

        Commands::RemoveOtos {
            input,
            output,
            max_size,
            min_slope,
            iterate,
        } => {
            let dem = read_raster(&input)?;
            let host = BarHost::new(cli.time_limit);
            let start = Instant::now();
            let params = OtoParams {
                max_size,
                min_edge_slope: min_slope,
                iterate,
            };
            let result = run_plugin(&host, &RemoveOffTerrainObjects, dem, params)
                .context("Failed to remove off-terrain objects")?;
            let elapsed = start.elapsed();
            write_result(&host, &result, &output)?;
            done("Bare-earth DEM", &output, elapsed);
        }

        Commands::Filter {
            input,
            output,
            filter,
            kernel,
            radius,
        } => {
            let filter = match filter {
                FilterKind::Laplacian => FocalFilter::Laplacian(parse_kernel(kernel)?),
                FilterKind::Deviation => FocalFilter::DeviationFromMean,
                FilterKind::RingMean => FocalFilter::RingMean,
            };
            let raster = read_raster(&input)?;
            let host = BarHost::new(cli.time_limit);
            let start = Instant::now();
            let result = run_plugin(&host, &Focal, raster, FocalParams { filter, radius })
                .context("Filter failed")?;
            let elapsed = start.elapsed();
            write_result(&host, &result, &output)?;
            done("Filtered raster", &output, elapsed);
        }

        Commands::NewFromBase {
            base,
            output,
            data_type,
            fill,
            nodata,
        } => {
            let data_type = DataType::parse(&data_type)
                .with_context(|| format!("Unknown data type: {}", data_type))?;
            let params = NewRasterParams {
                data_type,
                fill: parse_fill(&fill)?,
                nodata,
            };
            let host = BarHost::new(cli.time_limit);
            let start = Instant::now();
            let raster = run_plugin(&host, &NewRasterFromBase, (base, output.clone()), params)
                .context("Failed to create raster")?;
            raster.close().context("Failed to close new raster")?;
            host.return_data(ReturnData::Raster(output.clone()));
            done("New raster", &output, start.elapsed());
        }
    }

    Ok(())
}
