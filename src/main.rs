use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use weather_resolver::config::LocationProviderKind;
use weather_resolver::telemetry::init_logging;
use weather_resolver::{ResolverConfig, ResolverError, WeatherResolutionService};

/// Shortest re-poll interval accepted by `--watch`
const MIN_WATCH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "weather-resolver", version, about = "Current weather for this device's location")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Location query deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Use this latitude instead of locating the device
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Use this longitude instead of locating the device
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Keep resolving every N seconds
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,
}

fn load_config(cli: &Cli) -> Result<ResolverConfig> {
    let mut config = ResolverConfig::read_from_path(cli.config.clone())?;

    if let Some(timeout_ms) = cli.timeout_ms {
        config.location.timeout_ms = timeout_ms;
    }
    if let (Some(lat), Some(lon)) = (cli.lat, cli.lon) {
        config.location.provider = LocationProviderKind::Fixed;
        config.location.latitude = Some(lat);
        config.location.longitude = Some(lon);
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    let service = WeatherResolutionService::from_config(&config)?;
    let interval = cli
        .watch
        .map(|secs| Duration::from_secs(secs).max(MIN_WATCH_INTERVAL));

    loop {
        service.start_location_query(config.location_timeout());
        let status = service.acquirer().settled().await;
        info!(?status, "Location query finished");

        let result = service.get_weather_result().await;
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| ResolverError::general(format!("Failed to encode result: {e}")))?;
        println!("{json}");

        match interval {
            Some(interval) => tokio::time::sleep(interval).await,
            None => return Ok(()),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ResolverError>() {
            Some(err) => eprintln!("{}", err.user_message()),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_cli_coordinates_complete_fixed_provider() {
        let file = config_file("[location]\nprovider = \"fixed\"\n");
        let path = file.path().to_str().unwrap();

        let cli = Cli::parse_from(["weather-resolver", "--config", path]);
        assert!(load_config(&cli).is_err());

        let cli = Cli::parse_from([
            "weather-resolver",
            "--config",
            path,
            "--lat",
            "37.7",
            "--lon",
            "-122.4",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.location.provider, LocationProviderKind::Fixed);
        assert_eq!(config.location.latitude, Some(37.7));
        assert_eq!(config.location.longitude, Some(-122.4));
    }

    #[test]
    fn test_cli_overrides_are_validated() {
        let file = config_file("");
        let cli = Cli::parse_from([
            "weather-resolver",
            "--config",
            file.path().to_str().unwrap(),
            "--timeout-ms",
            "900000",
        ]);
        let err = load_config(&cli).unwrap_err();
        assert!(err.to_string().contains("Location timeout"), "{err}");
    }
}
