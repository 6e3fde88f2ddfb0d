//! Monobank and Wise MCP server entry point.
//!
//! Reads configuration from flags and the environment, builds clients for
//! the banks whose tokens are set, then serves MCP tools over HTTP with
//! Server-Sent Events (or stdio). The `report` subcommand writes a markdown
//! spending report instead.

mod auth;
mod config;
mod error;
mod mcc;
mod monobank;
mod params;
mod report;
mod response;
mod retry;
mod server;
mod sse;
mod transaction;
mod wise;

use std::io::Write as _;

use clap::Parser as _;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

use crate::auth::BearerAuth;
use crate::config::{Banks, Cli, Command, Config, ReportArgs, Transport};
use crate::retry::RetryPolicy;
use crate::server::FinanceMcpServer;

/// Runs the MCP server on the configured transport.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the transport fails.
async fn serve(config: &Config, banks: Banks) -> Result<(), Box<dyn core::error::Error>> {
    tracing::info!(
        monobank = banks.monobank.is_some(),
        wise = banks.wise.is_some(),
        "starting finance MCP server"
    );
    let mcp_server = FinanceMcpServer::new(banks, RetryPolicy::default());

    match config.transport {
        Transport::Sse => {
            let auth = BearerAuth::new(config.auth_token());
            if !auth.is_enabled() {
                tracing::warn!("MCP_AUTH_TOKEN is not set, accepting unauthenticated clients");
            }
            sse::serve(config.bind_addr(), mcp_server, auth).await?;
        }
        Transport::Stdio => {
            if config.auth_token().is_some() {
                tracing::warn!("MCP_AUTH_TOKEN has no effect on the stdio transport");
            }
            let transport = (tokio::io::stdin(), tokio::io::stdout());
            let service = mcp_server.serve(transport).await?;
            tracing::info!("MCP server running on stdio");
            let _quit_reason = service.waiting().await?;
        }
    }
    Ok(())
}

/// Generates a report, saves it under the output directory and prints it.
///
/// # Errors
///
/// Returns an error if the report cannot be written.
async fn write_report(banks: &Banks, args: &ReportArgs) -> Result<(), Box<dyn core::error::Error>> {
    tracing::info!(days = args.days, banks = ?args.banks, "generating spending report");
    let transactions = report::fetch_all_transactions(banks, &args.banks, args.days).await;
    let now = transaction::local_now();
    let markdown = report::render(&transactions, args.days, now);
    let file_name = report::report_file_name(now, args.days, &args.banks);
    let path = report::save_report(&args.output_dir, &file_name, &markdown)?;
    tracing::info!(
        path = %path.display(),
        transactions = transactions.len(),
        "report saved"
    );

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{markdown}")?;
    Ok(())
}

/// Parses the command line and dispatches.
///
/// # Errors
///
/// Returns an error if a bank token is unusable or the chosen command fails.
async fn run() -> Result<(), Box<dyn core::error::Error>> {
    // Tracing goes to stderr; stdout carries the stdio transport and reports.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let banks = cli.config.banks()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config, banks).await,
        Command::Report(args) => write_report(&banks, &args).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(%err, "fatal error");
        std::process::exit(1);
    }
}
