use clap::{CommandFactory, Parser};
use common::location::Location;
use common::sensitivity::LocationSensitivity;
use futures::StreamExt;
use location_source::LocationSource;
use location_source::gpsd::GpsdPlatform;
use location_source::platform::LocationPlatform;
use location_source::sim::SimulatedPlatform;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Replay the route from this CSV file (longitude,latitude per record)
    #[arg(short = 'f', long)]
    route_file: Option<String>,
    /// Read fixes from a GPSD daemon
    #[arg(short = 'd', long)]
    gpsd: bool,
    /// Address of the GPSD daemon
    #[arg(long, default_value = "127.0.0.1:2947")]
    gpsd_address: String,
    /// Update filter sensitivity: high, medium or low
    #[arg(short, long, default_value = "high")]
    sensitivity: LocationSensitivity,
    /// Report the location permission as missing (replay only)
    #[arg(long)]
    deny_permission: bool,
    /// Report the fused service as unavailable (replay only)
    #[arg(long)]
    no_fused: bool,
}

const REPLAY_TICK_MS: u64 = 500;

fn read_route_from_file(file_path: &str) -> Result<Vec<Location>, ()> {
    let mut rdr = csv::Reader::from_path(file_path).unwrap();
    let mut route = Vec::new();

    for result in rdr.records() {
        let record = result.unwrap();
        let longitude: f64 = f64::from_str(record.get(0).unwrap()).unwrap();
        let latitude: f64 = f64::from_str(record.get(1).unwrap()).unwrap();
        route.push(Location::new(latitude, longitude));
    }
    debug!("length of route: {}", route.len());
    Ok(route)
}

fn create_replay_platform(cli: &Cli) -> Result<Arc<dyn LocationPlatform>, ()> {
    if let Some(route_file) = &cli.route_file {
        let route = read_route_from_file(route_file)?;
        let platform = SimulatedPlatform::new(&route, Duration::from_millis(REPLAY_TICK_MS))
            .map_err(|e| {
                error!("Failed to create the replay platform. Error: {e}");
            })?;
        if cli.deny_permission {
            platform.set_permission_granted(false);
        }
        if cli.no_fused {
            platform.set_fused_available(false);
        }
        Ok(Arc::new(platform))
    } else {
        error!("No location backend specified. Use --gpsd or --route-file");
        Cli::command().print_help().unwrap();
        Err(())
    }
}

#[tokio::main]
async fn main() -> Result<(), ()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let platform: Arc<dyn LocationPlatform> = if cli.gpsd {
        Arc::new(GpsdPlatform::connect(&cli.gpsd_address).await)
    } else {
        create_replay_platform(&cli)?
    };

    let source = LocationSource::new(platform);
    info!("Last known location: {:?}", source.last_known_location());

    let updates = source.request_location_updates(cli.sensitivity);
    let mut secondary = updates.subscribe();
    tokio::spawn(async move {
        while let Some(update) = secondary.next().await {
            debug!("Secondary subscriber update: {update:?}");
        }
    });

    let mut stream = updates.subscribe();
    info!(
        "Watching location updates with sensitivity {}",
        cli.sensitivity
    );
    loop {
        tokio::select! {
            update = stream.next() => {
                match update {
                    Some(Some(fix)) => {
                        info!("Location update: lat {}, lon {}", fix.latitude(), fix.longitude());
                    }
                    Some(None) => {
                        error!("Location permission is missing");
                        return Err(());
                    }
                    None => {
                        info!("Location update stream ended");
                        return Ok(());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
