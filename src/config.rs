//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it; the process needs neither to start.

use core::convert::Infallible;
use core::fmt;
use core::net::{IpAddr, Ipv4Addr, SocketAddr};
use core::num::ParseIntError;
use core::str::FromStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::BankError;
use crate::monobank::{self, MonobankClient};
use crate::wise::{self, WiseClient};

/// A secret string whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    pub(crate) const fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns the secret value.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` for an empty secret.
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl FromStr for Secret {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

/// Numeric identifier whose empty form means "not set".
///
/// Env files commonly carry `NAME=` for optional values; clap hands those
/// through as empty strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OptionalId(Option<i64>);

impl OptionalId {
    /// Returns the identifier, if one was given.
    pub(crate) const fn get(self) -> Option<i64> {
        self.0
    }
}

impl FromStr for OptionalId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self(None));
        }
        trimmed.parse().map(|id| Self(Some(id)))
    }
}

/// MCP transport to serve on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Transport {
    /// HTTP with a Server-Sent-Events stream at `/sse`.
    Sse,
    /// Newline-delimited JSON-RPC over stdin/stdout.
    Stdio,
}

/// A bank the report can pull from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub(crate) enum Bank {
    /// Monobank.
    Mono,
    /// Wise.
    Wise,
}

impl Bank {
    /// Short name used on the command line and in report file names.
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Wise => "wise",
        }
    }
}

/// Top-level command line.
#[derive(Debug, Parser)]
#[command(name = "finance-mcp", version, about = "MCP server for Monobank and Wise")]
pub(crate) struct Cli {
    /// Shared configuration.
    #[command(flatten)]
    pub(crate) config: Config,
    /// What to do; serves MCP when omitted.
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the MCP server (default).
    Serve,
    /// Generate a spending report and save it as markdown.
    Report(ReportArgs),
}

/// Options of the `report` subcommand.
#[derive(Debug, Clone, Args)]
pub(crate) struct ReportArgs {
    /// Number of days to include.
    #[arg(long, default_value_t = 14, value_parser = clap::value_parser!(u32).range(1..=366))]
    pub(crate) days: u32,
    /// Banks to fetch from.
    #[arg(long, value_enum, num_args = 1.., default_values_t = [Bank::Mono, Bank::Wise])]
    pub(crate) banks: Vec<Bank>,
    /// Directory the report file is written to.
    #[arg(long, default_value = "reports")]
    pub(crate) output_dir: PathBuf,
}

/// Process configuration.
#[derive(Debug, Clone, Args)]
pub(crate) struct Config {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "MCP_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub(crate) host: IpAddr,
    /// Port to bind the HTTP server to.
    #[arg(long, env = "MCP_PORT", default_value_t = 8000)]
    pub(crate) port: u16,
    /// MCP transport.
    #[arg(long, env = "MCP_TRANSPORT", value_enum, default_value_t = Transport::Sse)]
    pub(crate) transport: Transport,
    /// Bearer token clients must present; authentication is off when unset.
    #[arg(long, env = "MCP_AUTH_TOKEN", hide_env_values = true)]
    pub(crate) auth_token: Option<Secret>,
    /// Monobank personal API token.
    #[arg(long, env = "MONOBANK_API_TOKEN", hide_env_values = true)]
    pub(crate) monobank_token: Option<Secret>,
    /// Wise API token.
    #[arg(long, env = "WISE_API_TOKEN", hide_env_values = true)]
    pub(crate) wise_token: Option<Secret>,
    /// Wise profile to query instead of the first personal one; empty means unset.
    #[arg(long, env = "WISE_PROFILE_ID")]
    pub(crate) wise_profile_id: Option<OptionalId>,
}

impl Config {
    /// Socket address of the HTTP server.
    pub(crate) const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Configured bearer token; an empty value counts as unset.
    pub(crate) fn auth_token(&self) -> Option<Secret> {
        self.auth_token.clone().filter(|t| !t.is_empty())
    }

    /// Configured Wise profile; an empty value counts as unset.
    pub(crate) fn wise_profile_id(&self) -> Option<i64> {
        self.wise_profile_id.and_then(OptionalId::get)
    }

    /// Builds clients for every bank with a non-empty token.
    ///
    /// # Errors
    ///
    /// Returns an error if a token cannot be used as an HTTP header or a
    /// client cannot be built.
    pub(crate) fn banks(&self) -> Result<Banks, BankError> {
        let monobank = self
            .monobank_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| MonobankClient::new(t.expose()))
            .transpose()?;
        let wise = self
            .wise_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| WiseClient::new(t.expose(), self.wise_profile_id()))
            .transpose()?;
        Ok(Banks { monobank, wise })
    }
}

/// Bank clients available to tools; either may be absent.
#[derive(Debug, Clone, Default)]
pub(crate) struct Banks {
    /// Monobank client, if `MONOBANK_API_TOKEN` is set.
    pub(crate) monobank: Option<MonobankClient>,
    /// Wise client, if `WISE_API_TOKEN` is set.
    pub(crate) wise: Option<WiseClient>,
}

impl Banks {
    /// Returns the Monobank client.
    ///
    /// # Errors
    ///
    /// Returns [`BankError::MissingToken`] when no token is configured.
    pub(crate) fn monobank(&self) -> Result<&MonobankClient, BankError> {
        self.monobank
            .as_ref()
            .ok_or(BankError::MissingToken(monobank::TOKEN_VAR))
    }

    /// Returns the Wise client.
    ///
    /// # Errors
    ///
    /// Returns [`BankError::MissingToken`] when no token is configured.
    pub(crate) fn wise(&self) -> Result<&WiseClient, BankError> {
        self.wise
            .as_ref()
            .ok_or(BankError::MissingToken(wise::TOKEN_VAR))
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::panic,
    clippy::use_debug,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect, panic and debug output for readability"
)]
mod tests {
    use core::net::{IpAddr, Ipv4Addr};

    use clap::Parser;

    use super::{Bank, Banks, Cli, Command, OptionalId, Secret, Transport};
    use crate::error::BankError;

    #[test]
    fn explicit_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "finance-mcp",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--transport",
            "stdio",
            "--auth-token",
            "secret123",
        ])
        .expect("should parse");
        assert_eq!(cli.config.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cli.config.bind_addr().port(), 9000);
        assert_eq!(cli.config.transport, Transport::Stdio);
        assert_eq!(
            cli.config.auth_token().as_ref().map(Secret::expose),
            Some("secret123")
        );
        assert!(cli.command.is_none());
    }

    #[test]
    fn empty_auth_token_disables_auth() {
        let cli = Cli::try_parse_from(["finance-mcp", "--auth-token", ""]).expect("should parse");
        assert!(cli.config.auth_token().is_none());
    }

    #[test]
    fn empty_optional_values_count_as_unset() {
        let cli = Cli::try_parse_from([
            "finance-mcp",
            "--wise-profile-id",
            "",
            "--monobank-token",
            "",
            "--wise-token",
            "",
            "--auth-token",
            "",
        ])
        .expect("empty values should parse");
        assert_eq!(cli.config.wise_profile_id(), None);
        assert!(cli.config.auth_token().is_none());
        let banks = cli.config.banks().expect("no clients to build");
        assert!(banks.monobank.is_none());
        assert!(banks.wise.is_none());
    }

    #[test]
    fn wise_profile_id_parses_numbers() {
        let cli = Cli::try_parse_from(["finance-mcp", "--wise-profile-id", " 12345 "])
            .expect("should parse");
        assert_eq!(cli.config.wise_profile_id(), Some(12345));
        assert_eq!("".parse::<OptionalId>(), Ok(OptionalId::default()));
        let _bad_value = "abc"
            .parse::<OptionalId>()
            .expect_err("non-numeric profile id is rejected");
        let _bad_flag = Cli::try_parse_from(["finance-mcp", "--wise-profile-id", "abc"])
            .expect_err("non-numeric profile id fails parsing");
    }

    #[test]
    fn report_subcommand_defaults() {
        let cli = Cli::try_parse_from(["finance-mcp", "report"]).expect("should parse");
        let Some(Command::Report(args)) = cli.command else {
            panic!("expected report subcommand");
        };
        assert_eq!(args.days, 14);
        assert_eq!(args.banks, vec![Bank::Mono, Bank::Wise]);
        assert_eq!(args.output_dir.to_str(), Some("reports"));
    }

    #[test]
    fn report_subcommand_selects_banks() {
        let cli = Cli::try_parse_from(["finance-mcp", "report", "--days", "7", "--banks", "wise"])
            .expect("should parse");
        let Some(Command::Report(args)) = cli.command else {
            panic!("expected report subcommand");
        };
        assert_eq!(args.days, 7);
        assert_eq!(args.banks, vec![Bank::Wise]);
    }

    #[test]
    fn report_rejects_zero_days() {
        let _err = Cli::try_parse_from(["finance-mcp", "report", "--days", "0"])
            .expect_err("zero days is out of range");
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let secret = Secret::new("hunter2".to_owned());
        assert_eq!(format!("{secret:?}"), "Secret(***)");
    }

    #[test]
    fn missing_bank_reports_variable() {
        let banks = Banks::default();
        assert!(matches!(
            banks.monobank(),
            Err(BankError::MissingToken("MONOBANK_API_TOKEN"))
        ));
        assert!(matches!(
            banks.wise(),
            Err(BankError::MissingToken("WISE_API_TOKEN"))
        ));
    }
}
