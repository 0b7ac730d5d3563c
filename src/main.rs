use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use places_heatmap::colormap::Colormap;
use places_heatmap::config::AppConfig;
use places_heatmap::fips;
use places_heatmap::pipeline::{full_process, national_process, HeatMapRequest, Indicator};
use places_heatmap::types::Resolution;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolutionArg {
    Tract,
    County,
}

impl From<ResolutionArg> for Resolution {
    fn from(arg: ResolutionArg) -> Resolution {
        match arg {
            ResolutionArg::Tract => Resolution::Tract,
            ResolutionArg::County => Resolution::County,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render heat maps for one state, optionally one county
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Full state name, e.g. "California"
        state: String,
        /// County name, e.g. "Alameda"; all counties when omitted
        #[arg(long)]
        county: Option<String>,
        #[arg(long, value_enum, default_value = "tract")]
        resolution: ResolutionArg,
        /// Socrata app token, overriding the configured one
        #[arg(long)]
        token: Option<String>,
    },
    /// Render state-wide heat maps for every configured state
    Batch {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, value_enum, default_value = "county")]
        resolution: ResolutionArg,
        #[arg(long)]
        token: Option<String>,
    },
    /// Render one nationwide county-level heat map per indicator
    National {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Socrata app token, overriding the configured one
        #[arg(long)]
        token: Option<String>,
    },
}

fn states_from(config: &AppConfig) -> Vec<String> {
    if config.batch.states.is_empty() {
        fips::STATE_FIPS.iter().map(|(name, _)| name.to_string()).collect()
    } else {
        config.batch.states.clone()
    }
}

fn indicators_from(config: &AppConfig) -> anyhow::Result<Vec<Indicator>> {
    if config.indicators.is_empty() {
        anyhow::bail!("no [[indicators]] configured; nothing to render");
    }
    for indicator in &config.indicators {
        if let Some(name) = &indicator.cmap {
            if Colormap::from_name(name).is_none() {
                warn!(cmap = %name, column = %indicator.column, "unknown colormap, using default");
            }
        }
    }
    Ok(config.indicators.iter().map(Indicator::from_config).collect())
}

fn run_region(config: &AppConfig, request: &HeatMapRequest) -> anyhow::Result<()> {
    let report = full_process(config, request)?;
    info!(
        state = %request.state,
        images = report.images.len(),
        failures = report.failures.len(),
        "region finished"
    );
    for (column, err) in &report.failures {
        error!(%column, error = %err, "indicator failed");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            config,
            state,
            county,
            resolution,
            token,
        } => {
            let mut app_config = AppConfig::load_from_file(&config)?;
            if token.is_some() {
                app_config.api.token = token;
            }
            let request = HeatMapRequest {
                state,
                county,
                resolution: resolution.into(),
                indicators: indicators_from(&app_config)?,
            };
            run_region(&app_config, &request)?;
        }
        Commands::Batch {
            config,
            resolution,
            token,
        } => {
            let mut app_config = AppConfig::load_from_file(&config)?;
            if token.is_some() {
                app_config.api.token = token;
            }
            let indicators = indicators_from(&app_config)?;
            let states = states_from(&app_config);

            // Best effort: one state failing must not stop the rest.
            let mut failed = 0usize;
            for state in states {
                let request = HeatMapRequest {
                    state: state.clone(),
                    county: None,
                    resolution: resolution.into(),
                    indicators: indicators.clone(),
                };
                if let Err(e) = run_region(&app_config, &request) {
                    error!(%state, error = %e, "state failed, continuing");
                    failed += 1;
                }
            }
            if failed > 0 {
                warn!(failed, "batch finished with failures");
            }
        }
        Commands::National { config, token } => {
            let mut app_config = AppConfig::load_from_file(&config)?;
            if token.is_some() {
                app_config.api.token = token;
            }
            let indicators = indicators_from(&app_config)?;
            let states = states_from(&app_config);
            let report = national_process(&app_config, &indicators, &states)?;
            info!(
                images = report.images.len(),
                failures = report.failures.len(),
                "national run finished"
            );
            for (label, err) in &report.failures {
                error!(%label, error = %err, "national run failure");
            }
        }
    }

    Ok(())
}
