//! WHOIS Bot
//!
//! Runs the Telegram bot by default. `--lookup` and `--classify` run a
//! single lookup or classification from the command line instead, which is
//! handy for checking the server setup and for tuning classifier policy.

mod telegram;
mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whois_bot_lib::{
    extract_dns, extract_expiry, load_env_config, normalize_domain, validate_domain,
    AvailabilityClassifier, BotConfig, BotSettings, Classification, ConfigManager,
    JsonConfigStore, JsonUserStore, UserStore, Verdict, WhoisBot, WhoisFetcher, WhoisMode,
    WhoisRecord,
};

use crate::telegram::TelegramClient;
use crate::ui::Spinner;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for whois-bot
#[derive(Parser, Debug)]
#[command(name = "whois-bot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Telegram bot for WHOIS lookups and domain availability checks")]
#[command(
    long_about = "Telegram bot for WHOIS lookups and domain availability checks.\n\nWithout --lookup or --classify the bot starts long polling. Settings come from a TOML file, the environment (TELEGRAM_BOT_TOKEN, SERVER_IP, SSH_USER, ROOT_PASSWORD, ADMIN_USER_ID, ...) and these flags."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Look up one domain, print the verdict and exit
    #[arg(long = "lookup", value_name = "DOMAIN", help_heading = "One-shot")]
    pub lookup: Option<String>,

    /// Classify a saved WHOIS reply from FILE and exit (requires --domain)
    #[arg(long = "classify", value_name = "FILE", help_heading = "One-shot")]
    pub classify: Option<PathBuf>,

    /// Domain the saved reply belongs to (used with --classify)
    #[arg(long = "domain", value_name = "DOMAIN", help_heading = "One-shot")]
    pub domain: Option<String>,

    /// Output the report as JSON
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Also print the raw WHOIS text
    #[arg(long = "raw", help_heading = "Output Format")]
    pub raw: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Directory for users.json and config.json
    #[arg(long = "data-dir", value_name = "DIR", help_heading = "Configuration")]
    pub data_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

/// Result of a one-shot lookup or classification.
#[derive(Debug, Serialize)]
pub struct LookupReport {
    pub domain: String,
    pub verdict: Verdict,
    pub rule: String,
    pub expiry: Vec<String>,
    pub name_servers: Vec<String>,
    pub lookup_failed: bool,
}

impl LookupReport {
    fn new(record: &WhoisRecord, classification: &Classification) -> Self {
        Self {
            domain: record.domain.clone(),
            verdict: classification.verdict,
            rule: classification.rule.to_string(),
            expiry: extract_expiry(&record.text).lines,
            name_servers: extract_dns(&record.text).lines,
            lookup_failed: record.transport_error,
        }
    }
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    init_tracing(args.verbose);

    let result = if args.classify.is_some() {
        run_classify(&args)
    } else if args.lookup.is_some() {
        run_lookup(&args).await
    } else {
        run_bot(&args).await
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if args.lookup.is_some() && args.classify.is_some() {
        return Err("Cannot use --lookup and --classify together".to_string());
    }

    if args.classify.is_some() && args.domain.is_none() {
        return Err("--classify requires --domain to know which TLD rules apply".to_string());
    }

    if args.classify.is_none() && args.domain.is_some() {
        return Err("--domain is only used with --classify".to_string());
    }

    let one_shot = args.lookup.is_some() || args.classify.is_some();
    if !one_shot && (args.json || args.raw) {
        return Err("--json and --raw only apply to --lookup and --classify".to_string());
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: file, then environment, then CLI flags.
fn build_config(args: &Args) -> Result<BotConfig, Box<dyn std::error::Error>> {
    let manager = ConfigManager::new(args.verbose);

    let file_config = match &args.config {
        Some(path) => manager.load_file(path)?,
        None => match manager.discover_and_load() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Config discovery failed, using defaults");
                Default::default()
            }
        },
    };

    let mut config = BotConfig::resolve(file_config, load_env_config())?;

    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }

    Ok(config)
}

/// Run the bot until Ctrl-C.
async fn run_bot(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(args)?;
    let token = config.require_token()?;
    let fetcher = config.whois_client()?;

    if config.whois.mode == WhoisMode::Remote && config.whois.password.is_none() {
        warn!("ROOT_PASSWORD is not set; lookups will report a configuration error");
    }
    if config.admin_user_id.is_none() {
        warn!("ADMIN_USER_ID is not set; /stats and /broadcast are disabled");
    }

    let users = JsonUserStore::open(config.users_path())?;
    let config_map = JsonConfigStore::open(config.config_map_path())?;
    info!(users = users.len(), data_dir = %config.data_dir.display(), "State loaded");

    let client = Arc::new(TelegramClient::new(
        &config.telegram_api_url,
        token,
        config.poll_timeout,
    )?);
    let username = client.get_me().await?;

    let bot = Arc::new(
        WhoisBot::new(fetcher, BotSettings::from(&config))
            .with_user_store(Box::new(users))
            .with_config_store(config_map)
            .with_username(username.as_str()),
    );
    info!(bot = %username, "Bot started, polling for updates");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let polled = telegram::run_polling(Arc::clone(&bot), client, shutdown).await;

    bot.shutdown()?;
    info!(users = bot.user_count(), "State saved, bye");
    polled?;
    Ok(())
}

/// Fetch and classify one domain.
async fn run_lookup(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let domain = normalize_domain(args.lookup.as_deref().unwrap_or_default());
    validate_domain(&domain)?;

    let config = build_config(args)?;
    let fetcher = config.whois_client()?;

    let spinner = if args.json {
        None
    } else {
        Spinner::start_if_tty(format!("Looking up {}...", domain))
    };
    let record = fetcher.fetch_whois(&domain).await;
    if let Some(spinner) = spinner {
        spinner.stop().await;
    }

    let classifier = AvailabilityClassifier::with_policy(config.classifier);
    display_report(args, &record, &classifier.explain(&record.text, &domain))
}

/// Classify a saved WHOIS reply without any network access.
fn run_classify(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let domain = normalize_domain(args.domain.as_deref().unwrap_or_default());
    validate_domain(&domain)?;

    let path = args.classify.as_ref().ok_or("missing --classify file")?;
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Could not read '{}': {}", path.display(), e))?;

    let config = build_config(args)?;
    let classifier = AvailabilityClassifier::with_policy(config.classifier);
    let record = WhoisRecord::reply(domain.as_str(), text);
    display_report(args, &record, &classifier.explain(&record.text, &domain))
}

fn display_report(
    args: &Args,
    record: &WhoisRecord,
    classification: &Classification,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = LookupReport::new(record, classification);

    if args.json {
        let mut value = serde_json::to_value(&report)?;
        if args.raw {
            value["raw"] = serde_json::Value::String(record.text.clone());
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        ui::print_report(&report);
        if args.raw {
            ui::print_raw(&record.text);
        }
    }

    Ok(())
}
