use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod errors;
mod models;
mod notify;
mod server;

#[derive(Parser)]
#[command(name = "jiraldo")]
#[command(version)]
#[command(about = "Slack notifications for Jira ticket assignments", long_about = None)]
struct Cli {
    /// for debugging purposes
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// TOML config file (defaults to ./jiraldo.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: HTTP endpoints plus assignment polling (default)
    Serve {
        /// Overrides server.host / HOST
        #[arg(long)]
        host: Option<String>,

        /// Overrides server.port / PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration and test the Jira and Slack credentials
    Check,

    /// List a user's open tickets (e.g., maria or maria@company.com)
    Tickets { user: String },

    /// Display effective configuration (with masked secrets)
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref();

    let result = match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => handle_serve(config_path, host, port).await,
        Commands::Check => handle_check(config_path).await,
        Commands::Tickets { user } => handle_tickets(config_path, &user).await,
        Commands::Config => handle_config(config_path),
    };

    if let Err(e) = result {
        eprintln!("\n{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "jiraldo=debug,tower_http=debug"
    } else {
        "jiraldo=info,tower_http=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

async fn handle_serve(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    use config::settings::Settings;

    let mut settings = Settings::load(config_path)?;
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    println!(
        "{}",
        format!("Jiraldo v{}", env!("CARGO_PKG_VERSION")).bright_cyan().bold()
    );
    println!("  {} {}", "Jira:".bold(), settings.jira.url.bright_white());
    println!(
        "  {} {}:{}",
        "Listening:".bold(),
        settings.server.host,
        settings.server.port
    );
    println!();

    let missing = settings.missing_credentials();
    if !missing.is_empty() {
        warn!(
            missing = %missing.join(", "),
            "credentials missing, assignment monitoring disabled"
        );
    }

    let state = Arc::new(server::AppState::from_settings(settings)?);

    if let Some(jira) = &state.jira {
        match jira.myself().await {
            Ok(me) => info!(user = %me.display_name, "Jira connection OK"),
            Err(e) => warn!(error = %e, "Jira connection check failed"),
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let poller = state.poller().map(|poller| tokio::spawn(poller.run(stop_rx)));
    if poller.is_none() {
        info!("assignment polling disabled; webhooks and slash commands still served");
    }

    server::serve(state, server::shutdown_signal()).await?;

    let _ = stop_tx.send(true);
    if let Some(handle) = poller {
        handle.await?;
    }

    Ok(())
}

async fn handle_check(config_path: Option<&Path>) -> anyhow::Result<()> {
    use config::settings::Settings;

    println!("{}", "Validating configuration...".cyan().bold());
    println!();

    let settings = Settings::load(config_path)?;
    println!("  {} {}", "Settings".dimmed(), "✓".green().bold());

    let state = server::AppState::from_settings(settings)?;
    let mut failed = false;

    print!("{}", "  Testing Jira connection... ".dimmed());
    std::io::Write::flush(&mut std::io::stdout())?;
    match &state.jira {
        None => {
            println!("{}", "✗".red().bold());
            println!("{}", "    JIRA_EMAIL and JIRA_API_TOKEN are not set".red());
            failed = true;
        }
        Some(jira) => match jira.myself().await {
            Ok(me) => println!("{} {}", "✓".green().bold(), me.display_name.dimmed()),
            Err(e) => {
                println!("{}", "✗".red().bold());
                println!("{}", format!("    {}", e).red());
                failed = true;
            }
        },
    }

    print!("{}", "  Testing Slack connection... ".dimmed());
    std::io::Write::flush(&mut std::io::stdout())?;
    match &state.slack {
        None => {
            println!("{}", "✗".red().bold());
            println!("{}", "    SLACK_BOT_TOKEN is not set".red());
            failed = true;
        }
        Some(slack) => match slack.auth_test().await {
            Ok(who) => println!(
                "{} {}",
                "✓".green().bold(),
                format!("{} @ {}", who.user, who.team).dimmed()
            ),
            Err(e) => {
                println!("{}", "✗".red().bold());
                println!("{}", format!("    {}", e).red());
                failed = true;
            }
        },
    }

    println!();
    println!("  {} {}", "Business hours:".bold(), state.hours);
    if state.settings.slack.signing_secret.is_none() {
        println!(
            "{}",
            "  SLACK_SIGNING_SECRET not set: slash commands are not verified".yellow()
        );
    }
    println!();

    if failed {
        anyhow::bail!("Configuration check failed");
    }

    println!("{}", "✓ All validations passed!".green().bold());
    Ok(())
}

async fn handle_tickets(config_path: Option<&Path>, user: &str) -> anyhow::Result<()> {
    use config::settings::Settings;

    let settings = Settings::load(config_path)?;
    let email = settings.email_for(user).ok_or_else(|| {
        anyhow::anyhow!("EMAIL_DOMAIN is not set; pass a full email address instead of '{}'", user)
    })?;

    let state = server::AppState::from_settings(settings)?;
    let jira = state
        .jira
        .as_ref()
        .ok_or_else(|| errors::JiraldoError::MissingCredentials(vec!["JIRA_EMAIL", "JIRA_API_TOKEN"]))?;

    let tickets = jira.user_tickets(&email).await?;

    println!("{}", format!("Open tickets for {}", email).cyan().bold());
    println!();

    if tickets.is_empty() {
        println!("{}", "  No open tickets".dimmed());
        return Ok(());
    }

    for ticket in &tickets {
        println!(
            "  {} {} {}",
            ticket.key.bright_white().bold(),
            ticket.fields.summary,
            format!("({})", ticket.status_name()).yellow()
        );
        println!("    {}", jira.browse_url(&ticket.key).dimmed());
    }

    Ok(())
}

fn handle_config(config_path: Option<&Path>) -> anyhow::Result<()> {
    use config::settings::Settings;

    let settings = Settings::load(config_path)?;

    println!("{}", "Current Configuration".cyan().bold());
    println!();
    println!("{}", toml::to_string_pretty(&settings.masked())?);

    let missing = settings.missing_credentials();
    if !missing.is_empty() {
        println!(
            "{}",
            format!("Missing: {}", missing.join(", ")).yellow()
        );
    }

    Ok(())
}
