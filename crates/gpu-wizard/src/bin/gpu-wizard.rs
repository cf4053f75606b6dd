//! GPU Wizard CLI - rent a GPU machine in four steps.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gpu_wizard::catalog::{Location, StrategyKind, TierKind, REGIONS, STRATEGIES, TIERS};
use gpu_wizard::format::{format_duration, format_eta, format_price, format_step};
use gpu_wizard::providers::http::HttpProvisioningApi;
use gpu_wizard::providers::{OfferQuery, ProvisioningApi};
use gpu_wizard::wizard::{rank_offers, Action, Outcome, WizardSession, WizardState};
use gpu_wizard::WizardConfig;

/// GPU Wizard CLI - Provision a rented GPU machine.
#[derive(Parser)]
#[command(name = "gpu-wizard")]
#[command(about = "Choose a location, hardware and failover strategy, then provision a GPU")]
struct Cli {
    /// Provisioning API base URL (or set `GPU_WIZARD_API_URL` env var).
    #[arg(long, env = "GPU_WIZARD_API_URL", default_value = "")]
    api_url: String,

    /// API key (or set `GPU_WIZARD_API_KEY` env var).
    #[arg(long, env = "GPU_WIZARD_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show regions, hardware tiers and failover strategies.
    Catalog,

    /// List recommended offers for a selection.
    Offers {
        /// Countries (ISO code) or region keys (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        location: Vec<String>,

        /// Hardware tier: budget, standard or high_end.
        #[arg(long, default_value = "standard")]
        tier: TierKind,
    },

    /// Show the account balance.
    Balance,

    /// Run the wizard end to end and provision a machine.
    Run {
        /// Countries (ISO code) or region keys (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        location: Vec<String>,

        /// Hardware tier: budget, standard or high_end.
        #[arg(long, default_value = "standard")]
        tier: TierKind,

        /// Offer ID (defaults to the top recommendation).
        #[arg(long)]
        offer: Option<String>,

        /// Failover strategy.
        #[arg(long, default_value = "cpu_standby_only")]
        strategy: StrategyKind,

        /// Ports to open (comma-separated).
        #[arg(long, value_delimiter = ',')]
        ports: Vec<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if matches!(cli.command, Commands::Catalog) {
        print_catalog();
        return Ok(());
    }

    if cli.api_url.trim().is_empty() {
        anyhow::bail!("API URL is missing. Provide --api-url or set GPU_WIZARD_API_URL.");
    }
    let api = HttpProvisioningApi::new(cli.api_url.trim(), cli.api_key.trim())
        .context("Failed to create provisioning API client")?;

    match cli.command {
        Commands::Catalog => {}

        Commands::Offers { location, tier } => {
            let locations = parse_locations(&location)?;
            let query = OfferQuery {
                region_codes: gpu_wizard::catalog::locations_to_region_codes(&locations),
                tier,
            };
            let offers = api
                .fetch_offers(&query)
                .await
                .context("Failed to fetch offers")?;
            let ranked = rank_offers(&offers, tier.tier(), usize::MAX);

            println!("\n🎮 Offers for {} in {}", tier.tier().name, query.region_codes.join(", "));
            println!("{}", "=".repeat(80));
            if ranked.is_empty() {
                println!("\nNo available offers match this selection.");
            }
            for machine in ranked {
                let offer = &machine.offer;
                println!(
                    "\n#{} {} x{} ({} GB) [{:?}] (ID: {})",
                    machine.rank + 1,
                    offer.gpu_model,
                    offer.gpu_count,
                    offer.gpu_ram_gb,
                    machine.tag,
                    offer.id
                );
                println!(
                    "   💰 {} | compute {:.1} | 📍 {}",
                    format_price(offer.price_per_hour),
                    offer.compute_score,
                    offer.region
                );
            }
            println!();
        }

        Commands::Balance => {
            let credit = api.fetch_balance().await.context("Failed to fetch balance")?;
            println!("\n💳 Balance: ${credit:.2}");
        }

        Commands::Run {
            location,
            tier,
            offer,
            strategy,
            ports,
        } => {
            let locations = parse_locations(&location)?;
            let mut session = WizardSession::new(Arc::new(api), WizardConfig::from_env());
            run_wizard(&mut session, locations, tier, offer, strategy, ports).await?;
        }
    }

    Ok(())
}

fn parse_locations(inputs: &[String]) -> Result<Vec<Location>> {
    inputs
        .iter()
        .map(|input| {
            Location::parse(input)
                .with_context(|| format!("Unknown location '{input}' (see `gpu-wizard catalog`)"))
        })
        .collect()
}

fn ensure_no_error(state: &WizardState) -> Result<()> {
    match &state.error {
        Some(error) => Err(anyhow::Error::new(error.clone())),
        None => Ok(()),
    }
}

async fn advance(session: &mut WizardSession) -> Result<()> {
    ensure_no_error(session.dispatch(Action::Advance))?;
    let state = session.settle().await;
    ensure_no_error(state)?;
    println!("\n▶ {}", format_step(state.step));
    Ok(())
}

async fn run_wizard(
    session: &mut WizardSession,
    locations: Vec<Location>,
    tier: TierKind,
    offer: Option<String>,
    strategy: StrategyKind,
    ports: Vec<u16>,
) -> Result<()> {
    println!("\n▶ {}", format_step(session.state().step));
    for location in locations {
        ensure_no_error(session.dispatch(Action::SelectLocation(location)))?;
    }
    ensure_no_error(session.dispatch(Action::SelectTier(tier)))?;
    ensure_no_error(session.dispatch(Action::SelectStrategy(strategy)))?;
    if !ports.is_empty() {
        ensure_no_error(session.dispatch(Action::SetPorts(ports)))?;
    }

    advance(session).await.context("Could not enter the hardware step")?;
    if let Some(id) = offer {
        ensure_no_error(session.dispatch(Action::SelectOffer(id)))?;
    }
    if let Some(chosen) = &session.state().chosen_offer {
        println!(
            "   {} x{} at {} (ID: {})",
            chosen.gpu_model,
            chosen.gpu_count,
            format_price(chosen.price_per_hour),
            chosen.id
        );
    }

    advance(session).await.context("Could not enter the strategy step")?;
    let selected = session.state().selected_strategy();
    println!(
        "   {} at {} (${:.2}/month)",
        selected.name,
        format_price(selected.hourly_cost),
        selected.monthly_cost()
    );

    advance(session).await.context("Could not enter the provision step")?;

    ensure_no_error(session.dispatch(Action::StartProvisioning))
        .context("Not ready to provision")?;
    info!("Provisioning started");

    let cancel = session.sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel.send(Action::Cancel);
        }
    });

    let mut last_printed = None;
    while session.state().attempt.is_some() {
        let state = session.next_event().await;
        if let Some(attempt) = &state.attempt {
            let key = (attempt.status.phase, attempt.elapsed_secs / 10);
            if last_printed != Some(key) {
                last_printed = Some(key);
                println!(
                    "⏳ {} | elapsed {} | ETA {}",
                    attempt.status.phase,
                    format_duration(attempt.elapsed_secs),
                    format_eta(attempt.estimated_remaining_secs)
                );
            }
        }
    }

    match &session.state().outcome {
        Some(Outcome::Succeeded {
            attempt_id,
            elapsed_secs,
            ..
        }) => {
            println!("\n✅ Machine is ready!");
            println!("   Attempt: {attempt_id}");
            println!("   Took:    {}", format_duration(*elapsed_secs));
            Ok(())
        }
        Some(Outcome::Failed { reason, .. }) => {
            let detail = session
                .state()
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            anyhow::bail!("Provisioning failed ({reason}): {detail}")
        }
        None => anyhow::bail!("Provisioning ended without an outcome"),
    }
}

fn print_catalog() {
    println!("\n📍 Regions");
    println!("{}", "=".repeat(60));
    for region in REGIONS {
        println!(
            "   {:<15} {:<15} {}",
            region.key,
            region.name,
            region.countries.join(", ")
        );
    }

    println!("\n🎮 Hardware tiers");
    println!("{}", "=".repeat(60));
    for tier in &TIERS {
        println!(
            "   {:<10} ≥{} GB, compute ≥{:.0}, ≤{} - {}",
            tier.kind.as_str(),
            tier.min_vram_gb,
            tier.min_compute_score,
            format_price(tier.max_price_per_hour),
            tier.description
        );
    }

    println!("\n🛟 Failover strategies");
    println!("{}", "=".repeat(60));
    for strategy in STRATEGIES {
        let recovery = strategy
            .recovery_time_secs
            .map_or_else(|| "none".to_string(), format_duration);
        println!(
            "   {:<20} {:<10} recovery {:<8} {}{}",
            strategy.kind.as_str(),
            format_price(strategy.hourly_cost),
            recovery,
            if strategy.available { "" } else { "(unavailable) " },
            if strategy.recommended { "⭐" } else { "" }
        );
    }
    println!();
}
