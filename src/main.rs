use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use dataforge::apis::StateManualConnector;
use dataforge::config::Settings;
use dataforge::domain::{BusinessPullRequest, PullResponse, RfpPullRequest};
use dataforge::logging;
use dataforge::observability;
use dataforge::server::{self, AppState};

#[derive(Parser)]
#[command(name = "dataforge")]
#[command(about = "Business and solicitation record aggregation with reconciliation and QA")]
#[command(version = "0.1.0")]
struct Cli {
    /// Settings file (defaults to ./dataforge.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull, reconcile and export business records
    Biz {
        /// States to pull (comma-separated), e.g. CA,TX
        #[arg(long)]
        states: String,
        /// NAICS codes (comma-separated)
        #[arg(long)]
        naics: Option<String>,
        /// Keywords (comma-separated)
        #[arg(long)]
        keywords: Option<String>,
        #[arg(long)]
        min_emp: Option<u64>,
        #[arg(long)]
        max_emp: Option<u64>,
        #[arg(long)]
        min_rev: Option<u64>,
        #[arg(long)]
        max_rev: Option<u64>,
        #[arg(long)]
        min_years: Option<u32>,
        #[arg(long)]
        max_years: Option<u32>,
        #[arg(long, default_value_t = 500)]
        limit: usize,
        /// Fill county and FIPS through the Census geocoder
        #[arg(long)]
        geocode: bool,
        #[arg(long)]
        small_business_only: bool,
        /// micro, small, medium or large
        #[arg(long)]
        business_size: Option<String>,
    },
    /// Pull, validate and export government solicitations
    Rfp {
        /// States to pull (comma-separated)
        #[arg(long)]
        states: String,
        #[arg(long)]
        naics: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        posted_from: Option<NaiveDate>,
        /// YYYY-MM-DD
        #[arg(long)]
        posted_to: Option<NaiveDate>,
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// Run the HTTP API
    Serve {
        /// Overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write a sample column mapper for a state's CSV drops
    SampleMapper {
        #[arg(long)]
        state: String,
    },
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_response(response: &PullResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    if response.ok {
        println!("✅ {}", response.message.as_deref().unwrap_or("Done"));
    } else {
        println!("⚠️  Export written but QA found problems");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let _log_guard = logging::init_logging(&settings.log_dir);
    let metrics = match observability::init() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics recorder unavailable");
            None
        }
    };

    match cli.command {
        Commands::Biz {
            states,
            naics,
            keywords,
            min_emp,
            max_emp,
            min_rev,
            max_rev,
            min_years,
            max_years,
            limit,
            geocode,
            small_business_only,
            business_size,
        } => {
            println!("🔄 Running business pull...");
            let request = BusinessPullRequest {
                states: split_list(&states),
                naics: naics.as_deref().map(split_list),
                keywords: keywords.as_deref().map(split_list),
                min_emp,
                max_emp,
                min_rev,
                max_rev,
                min_years,
                max_years,
                limit,
                enable_geocoder: geocode.then_some(true),
                small_business_only: Some(small_business_only),
                business_size,
            };
            let criteria = request.validate(settings.enable_geocoder_default)?;
            let state = AppState::from_settings(settings, metrics).await?;
            match state.business.execute(&criteria).await {
                Ok(response) => print_response(&response)?,
                Err(e) => {
                    error!(error = %e, "Business pull failed");
                    println!("❌ Business pull failed: {e}");
                    return Err(e.into());
                }
            }
        }
        Commands::Rfp {
            states,
            naics,
            keywords,
            posted_from,
            posted_to,
            limit,
        } => {
            println!("🔄 Running RFP pull...");
            let request = RfpPullRequest {
                states: split_list(&states),
                naics: naics.as_deref().map(split_list),
                keywords: keywords.as_deref().map(split_list),
                posted_from,
                posted_to,
                limit,
            };
            let criteria = request.validate()?;
            let state = AppState::from_settings(settings, metrics).await?;
            match state.rfp.execute(&criteria).await {
                Ok(response) => print_response(&response)?,
                Err(e) => {
                    error!(error = %e, "RFP pull failed");
                    println!("❌ RFP pull failed: {e}");
                    return Err(e.into());
                }
            }
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.server_port = port;
            }
            info!(environment = %settings.environment, "Starting API server");
            let state = AppState::from_settings(settings, metrics).await?;
            server::start_server(Arc::new(state)).await?;
        }
        Commands::SampleMapper { state } => {
            let connector = StateManualConnector::new(settings.state_manual_dir());
            let path = connector.create_sample_mapper(&state)?;
            println!("📝 Sample mapper written to {}", path.display());
        }
    }
    Ok(())
}
