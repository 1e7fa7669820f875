//! Curve Advisor - Bonding-Curve Peg Monitor
//!
//! Run with: cargo run -- tips
//!       or: cargo run -- watch

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use curve_advisor::curve::{CurveRegistry, EngineContext, Tip, TipAction};
use curve_advisor::events::EventBus;
use curve_advisor::ledger::HttpLedgerClient;
use curve_advisor::tokens::TokenRegistry;
use curve_advisor::watcher::{Templates, Watcher};
use curve_advisor::{Advisor, Config, TipHandler, TipLog};

#[derive(Parser)]
#[command(name = "curve-advisor", version, about = "Bonding-curve peg monitor and trade tipper")]
struct Cli {
    /// TOML config file; environment (.env) is used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute tips once and exit
    Tips {
        /// Only this curve agent
        #[arg(long)]
        agent: Option<String>,
    },
    /// Follow the ledger and print tips as curves drift off peg
    Watch,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 📈 CURVE ADVISOR - Bonding-Curve Peg Monitor").cyan().bold()
    );
    println!(
        "{}",
        style("    Off-peg detection | Exchange probing | Trade tips").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_tips(tips: &[Tip]) {
    if tips.is_empty() {
        println!("{}", style("All monitored curves are on peg.").green());
        return;
    }

    for (i, tip) in tips.iter().enumerate() {
        let action = match tip.action {
            TipAction::Buy => style("BUY ").green().bold(),
            TipAction::Sell => style("SELL").red().bold(),
        };
        println!(
            "  {}. {} {:.6} {} on {}",
            i + 1,
            action,
            tip.max_amount,
            style(&tip.token).cyan(),
            tip.aa
        );
        println!(
            "     Price: {:.6} {} → target {:.6} ({:+.2}%)",
            tip.current_price, tip.reserve_token, tip.target_price, tip.price_difference_percentage
        );
    }
}

fn log_tips(config: &Config, tips: &[Tip]) {
    if !config.tip_log {
        return;
    }
    for tip in tips {
        if let Err(e) = TipLog::new(tip.clone()).append_to_file(&config.tip_log_path) {
            warn!("Failed to write tip log: {}", e);
        }
    }
}

fn build_advisor(config: &Config) -> Result<Arc<Advisor>> {
    let ledger = Arc::new(HttpLedgerClient::new(
        config.ledger_url.clone(),
        config.request_timeout(),
    )?);
    info!("Ledger endpoint: {}", ledger.url());
    let bus = EventBus::default();

    let tokens = Arc::new(TokenRegistry::new(
        ledger.clone(),
        config.token_registry_agent.clone(),
        &config.base_asset_symbol,
    ));

    let registry = Arc::new(CurveRegistry::new(EngineContext {
        oracle: ledger.clone(),
        feeds: ledger.clone(),
        tokens,
        bus: bus.clone(),
        feed_mode: config.feed_mode,
        feed_refresh_interval: config.feed_refresh_interval(),
    }));

    let watcher = Arc::new(Watcher::new(
        ledger.clone(),
        ledger,
        Arc::clone(&registry),
        bus.clone(),
        Templates {
            curves: config.curve_templates.clone(),
            auxiliary: config.auxiliary_templates(),
        },
    ));

    Ok(Advisor::new(registry, watcher, bus))
}

async fn run_tips(advisor: &Advisor, config: &Config, agent: Option<String>) -> Result<()> {
    let tips = match agent {
        Some(agent) => {
            println!("{}", style(format!("Assessing {}...", agent)).blue());
            advisor.get_tips_by_agent(&agent).await?
        }
        None => {
            println!(
                "{}",
                style(format!("Assessing {} curves...", advisor.registry().len())).blue()
            );
            advisor.get_all_tips().await?
        }
    };

    println!();
    print_tips(&tips);
    log_tips(config, &tips);
    Ok(())
}

async fn run_watch(advisor: &Arc<Advisor>, config: Arc<Config>) -> Result<()> {
    let handler: TipHandler = {
        let config = Arc::clone(&config);
        Arc::new(move |tips: Vec<Tip>| {
            if tips.is_empty() {
                return;
            }
            println!();
            println!("{}", style(format!("═══ {} new tips ═══", tips.len())).magenta().bold());
            print_tips(&tips);
            log_tips(&config, &tips);
        })
    };

    let mut tasks = advisor
        .subscribe(Arc::clone(&handler), config.debounce_window())
        .await?;
    if config.tip_interval_secs > 0 {
        tasks.push(
            advisor
                .subscribe_on_interval(handler, Duration::from_secs(config.tip_interval_secs))
                .await?,
        );
    }

    println!(
        "{} Watching {} curves, Ctrl-C to stop",
        style("✓").green(),
        advisor.registry().len()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    for task in tasks {
        task.abort();
    }
    advisor.registry().shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("curve_advisor=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    print_banner();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or --config");
        return Err(e);
    }

    config.print_summary();
    println!();

    let advisor = build_advisor(&config)?;
    advisor.start().await?;
    println!(
        "{} Monitoring {} curves",
        style("✓").green(),
        advisor.registry().len()
    );

    match cli.command {
        Command::Tips { agent } => run_tips(&advisor, &config, agent).await?,
        Command::Watch => run_watch(&advisor, Arc::new(config)).await?,
    }

    Ok(())
}
