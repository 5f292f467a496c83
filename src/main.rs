use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use streetlight_map::config::{AppConfig, LoggingConfig};
use streetlight_map::geo::CoordinateHierarchy;
use streetlight_map::map::{FsBoundaries, LayerTree, Tier};
use streetlight_map::report;
use streetlight_map::telemetry::{Cache, HttpEndpoint, QueryLayer};
use streetlight_map::Dashboard;
use tracing::{error, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt;

type App = Dashboard<HttpEndpoint, FsBoundaries, LayerTree>;

#[derive(Parser)]
#[command(name = "streetlight-map")]
#[command(about = "Solar streetlight map and status engine", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Total, active and inactive device counts
    Stats,
    /// Resolve a device id to province, municipality and barangay
    Locate {
        /// Device id, e.g. BTU-001AB
        id: String,
    },
    /// Reading history and current status of one device
    Details {
        /// Device id, e.g. BTU-001AB
        id: String,
    },
    /// Drive the map and print the visible tier
    Map {
        /// Zoom level to apply after any drill-down
        #[arg(long)]
        zoom: Option<f64>,
        /// Province to drill into
        #[arg(long)]
        province: Option<String>,
        /// Municipality to drill into (needs --province)
        #[arg(long)]
        municipality: Option<String>,
        /// Barangay whose devices to list (needs --municipality)
        #[arg(long)]
        barangay: Option<String>,
        /// Boundary overlays to show, by region code or province name
        #[arg(long = "region")]
        regions: Vec<String>,
    },
    /// Write the per-device status report as CSV
    Export {
        /// Output directory (defaults to the log directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Count devices whose id matches a pattern
    Count { pattern: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(AppConfig::find);
    let config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    // Set up logging
    let _guard = setup_logging(&config.logging);
    info!("Starting application");
    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => warn!("No config file found - using defaults"),
    }

    let hierarchy = match CoordinateHierarchy::load(&config.data.coordinates_path) {
        Ok(hierarchy) => hierarchy,
        Err(e) => {
            error!(
                "Failed to load coordinates from {}: {}",
                config.data.coordinates_path.display(),
                e
            );
            return Err(Box::new(e) as Box<dyn std::error::Error>);
        }
    };

    let mut app: App = Dashboard::new(
        QueryLayer::new(HttpEndpoint::new(&config.api.base_url), Cache::new(config.cache.ttl())),
        FsBoundaries::new(&config.data.boundaries_dir),
        LayerTree::default(),
        hierarchy,
        config.map.clone(),
        config.status.clone(),
    );

    let result = run(&mut app, cli.command, &config).await;
    if let Err(e) = &result {
        error!("Command failed: {}", e);
        eprintln!("Command failed: {}", e);
    }

    info!("Application shutting down");
    result
}

async fn run(
    app: &mut App,
    command: Commands,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Stats => {
            app.load().await?;
            let stats = app.fleet_stats();
            println!("Total: {}", stats.total);
            println!("Active: {}", stats.active);
            println!("Inactive: {}", stats.inactive);
        }
        Commands::Locate { id } => match app.locate(&id) {
            Some(l) => println!("{}: {}, {}, {}", id, l.barangay, l.municipality, l.province),
            None => println!("{}: Unknown Location", id),
        },
        Commands::Details { id } => {
            let details = app.device_details(&id).await?;
            println!("{} ({})", details.id, details.location_label());
            match details.status {
                Some(status) => println!("Status: {}", status),
                None => println!("Status: no readings"),
            }
            for r in &details.history {
                println!(
                    "{}  bulb {:.2} V / {:.2} A  panel {:.2} V / {:.2} A  battery {:.2} V / {:.2} A  SOC {:.1}%",
                    r.timestamp,
                    r.bulb_voltage,
                    r.current_draw,
                    r.panel_voltage,
                    r.panel_current,
                    r.battery_voltage,
                    r.battery_current,
                    r.battery_soc
                );
            }
        }
        Commands::Map {
            zoom,
            province,
            municipality,
            barangay,
            regions,
        } => {
            // A failed load still leaves an empty province tier to show.
            if let Err(e) = app.load().await {
                warn!("Continuing without readings: {}", e);
            }
            if let Some(province) = &province {
                app.select_province(province).await?;
                if let Some(municipality) = &municipality {
                    app.select_municipality(province, municipality).await?;
                    if let Some(barangay) = &barangay {
                        for row in app.barangay_devices(province, municipality, barangay).await? {
                            println!("{}  {}  {}", row.id, row.status, row.reading.timestamp);
                        }
                    }
                }
            }
            for region in &regions {
                if app.hierarchy().province(region).is_some() {
                    app.toggle_province_boundary(region).await?;
                } else {
                    app.toggle_region(region).await?;
                }
            }
            if let Some(zoom) = zoom {
                app.set_zoom(zoom);
            }
            print_map(app);
        }
        Commands::Export { out } => {
            app.load().await?;
            let dir = out.unwrap_or_else(|| config.logging.directory.clone());
            let path = report::save_status_report(&app.status_records(), &dir)?;
            println!("Status report saved to: {}", path.display());
        }
        Commands::Count { pattern } => {
            let count = app.count(&pattern).await?;
            println!("{}: {}", pattern, count);
        }
    }
    Ok(())
}

fn print_map(app: &App) {
    let viewport = app.controller().viewport();
    println!(
        "View: {:.4}, {:.4} at zoom {} ({:?} tier)",
        viewport.center.lat, viewport.center.lng, viewport.zoom, viewport.visible_tier
    );
    let surface = app.surface();
    for tier in Tier::ALL {
        if let Some(markers) = surface.attached(tier) {
            for marker in markers.iter() {
                println!(
                    "  {:<24} {:.4}, {:.4}",
                    marker.name, marker.position.lat, marker.position.lng
                );
            }
        }
    }
    for region in surface.overlays() {
        println!("  overlay {}", region);
    }
    for message in surface.messages() {
        println!("  ! {}", message);
    }
}

fn setup_logging(logging: &LoggingConfig) -> WorkerGuard {
    // Set up file-based logging with rotation
    let file_appender = rolling::daily(&logging.directory, "streetlight-map.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let level = Level::from_str(&logging.level).unwrap_or(Level::INFO);

    fmt()
        .with_writer(non_blocking)
        .with_ansi(false) // Disable ANSI colors in log files
        .with_level(true)
        .with_max_level(level)
        .init();

    guard
}
