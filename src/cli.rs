//! Command-line interface for the `connect` binary.
//!
//! Each subcommand maps onto one [`HandshakeClient`] operation. Results go to
//! stdout, as text or as JSON with `--json`; logs go to stderr.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::api::{ConnectionsApi, InitiateParams};
use crate::config::{ClientConfig, MAX_ACTIVATION_TIMEOUT_SECONDS};
use crate::handshake::HandshakeClient;
use crate::models::{
    ConnectedAccount, ConnectedAccountId, ConnectionRequest, EntityId, IntegrationId,
};
use crate::telemetry::{TraceContext, with_trace_context};

/// Connect end users to third-party services through a managed connections API.
#[derive(Parser, Debug)]
#[command(name = "connect")]
#[command(about = "Initiate connections and wait for them to become active")]
#[command(version)]
#[command(
    long_about = "connect drives the OAuth connection handshake against a managed connections API.\n\nConfiguration comes from .env files and CONNECT_* environment variables.\n\nExample usage:\n  connect connect --integration int_google_1 --entity alice --timeout 180"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Start a connection and print the redirect URL.
    Initiate(InitiateArgs),

    /// Show the current remote status of a connected account.
    Status(AccountArgs),

    /// Wait for a connected account to become active.
    Wait(WaitArgs),

    /// Start a fresh authorization attempt for an existing connected account.
    Reinitiate(ReinitiateArgs),

    /// List an entity's connected accounts.
    Accounts(AccountsArgs),

    /// Initiate, print the redirect URL, then wait for activation.
    Connect(ConnectArgs),
}

#[derive(Parser, Debug)]
pub struct InitiateArgs {
    /// Integration to connect against.
    #[arg(long)]
    pub integration: IntegrationId,

    /// End-user identity the connection belongs to.
    #[arg(long)]
    pub entity: EntityId,

    /// Where the provider sends the user after authorization.
    #[arg(long)]
    pub redirect: Option<Url>,
}

#[derive(Parser, Debug)]
pub struct AccountArgs {
    /// Connected account identifier.
    pub id: ConnectedAccountId,
}

#[derive(Parser, Debug)]
pub struct WaitArgs {
    /// Connected account identifier.
    pub id: ConnectedAccountId,

    /// Seconds to wait before giving up. Defaults to the configured activation timeout.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_ACTIVATION_TIMEOUT_SECONDS))]
    pub timeout: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct ReinitiateArgs {
    /// Connected account identifier.
    pub id: ConnectedAccountId,

    /// Where the provider sends the user after authorization.
    #[arg(long)]
    pub redirect: Option<Url>,
}

#[derive(Parser, Debug)]
pub struct AccountsArgs {
    /// End-user identity whose accounts are listed.
    #[arg(long)]
    pub entity: EntityId,

    /// Only list accounts for this integration.
    #[arg(long)]
    pub integration: Option<IntegrationId>,
}

#[derive(Parser, Debug)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub initiate: InitiateArgs,

    /// Seconds to wait before giving up. Defaults to the configured activation timeout.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_ACTIVATION_TIMEOUT_SECONDS))]
    pub timeout: Option<u64>,
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the parsed command against an HTTP-backed client built from `config`.
pub async fn run_with_cli(cli: Cli, config: &ClientConfig) -> anyhow::Result<()> {
    let client =
        HandshakeClient::from_config(config).context("failed to build connections client")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    with_trace_context(
        TraceContext::generate(),
        run_command(&client, cli.command, cli.json, &cancel),
    )
    .await
}

async fn run_command<A: ConnectionsApi>(
    client: &HandshakeClient<A>,
    command: Commands,
    json: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Commands::Initiate(args) => {
            let request = client
                .initiate(&args.integration, &args.entity, args.redirect)
                .await
                .context("failed to initiate connection")?;
            print_request(&request, json)
        }
        Commands::Status(args) => {
            let account = client
                .connected_account(&args.id)
                .await
                .with_context(|| format!("failed to fetch connected account {}", args.id))?;
            if json {
                print_json(&account)
            } else {
                println!("{}", account_line(&account));
                Ok(())
            }
        }
        Commands::Wait(args) => {
            let timeout = timeout_or_default(args.timeout, client);
            let account = client
                .connected_account(&args.id)
                .await
                .with_context(|| format!("failed to fetch connected account {}", args.id))?;
            let request = ConnectionRequest::new(account.id, None, account.status);
            let request = client
                .await_active_until_cancelled(request, timeout, cancel)
                .await?;
            print_request(&request, json)
        }
        Commands::Reinitiate(args) => {
            let request = client
                .reinitiate(&args.id, args.redirect)
                .await
                .with_context(|| format!("failed to reinitiate connected account {}", args.id))?;
            print_request(&request, json)
        }
        Commands::Accounts(args) => {
            let accounts = client
                .list_connected_accounts(&args.entity, args.integration.as_ref())
                .await
                .with_context(|| format!("failed to list connected accounts for {}", args.entity))?;
            if json {
                print_json(&accounts)
            } else {
                for account in &accounts {
                    println!("{}", account_line(account));
                }
                Ok(())
            }
        }
        Commands::Connect(args) => {
            let timeout = timeout_or_default(args.timeout, client);
            let mut params = InitiateParams::new(args.initiate.integration, args.initiate.entity);
            params.redirect_destination = args.initiate.redirect;

            let request = client
                .connect(
                    params,
                    |url| {
                        // Keep stdout a single JSON document in json mode
                        if json {
                            eprintln!("Open this URL to authorize: {url}");
                        } else {
                            println!("Open this URL to authorize: {url}");
                        }
                    },
                    timeout,
                    cancel,
                )
                .await?;
            print_request(&request, json)
        }
    }
}

fn timeout_or_default<A: ConnectionsApi>(
    seconds: Option<u64>,
    client: &HandshakeClient<A>,
) -> Duration {
    seconds
        .map(Duration::from_secs)
        .unwrap_or_else(|| client.default_timeout())
}

fn print_request(request: &ConnectionRequest, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(request);
    }

    println!("connected_account_id: {}", request.connected_account_id());
    println!("status: {}", request.status());
    if let Some(url) = request.redirect_url() {
        println!("redirect_url: {url}");
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn account_line(account: &ConnectedAccount) -> String {
    let label = account
        .app_name
        .as_deref()
        .or(account.integration_id.as_ref().map(IntegrationId::as_str))
        .unwrap_or("-");
    format!("{}\t{}\t{}", account.id, account.status, label)
}
