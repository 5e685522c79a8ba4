//! Command-line interface for the `toolgate` binary.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use toolgate_core::authorization::{Broker, Decision, HttpBrokerClient, Verdict};
use toolgate_core::{Error, Result, ToolArgs};

use crate::serve::ServeConfig;

#[derive(Debug, Parser)]
#[command(
    name = "toolgate",
    version,
    about = "Human-in-the-loop authorization broker for agent tool calls"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the broker server.
    Serve(ServeArgs),
    /// Show pending request and channel counts of a running server.
    Status(ClientArgs),
    /// Show the request held for a session, without consuming it.
    Snapshot {
        #[command(flatten)]
        client: ClientArgs,
        session_id: String,
    },
    /// Record a decision for a session's pending request.
    Respond {
        #[command(flatten)]
        client: ClientArgs,
        session_id: String,
        #[arg(value_enum)]
        decision: DecisionArg,
        /// Replacement arguments as a JSON object (approve only).
        #[arg(long)]
        args: Option<String>,
    },
}

/// Upper bound for `--ttl-secs` and `--sweep-secs` (one day).
pub const MAX_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "TOOLGATE_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    #[arg(long, env = "TOOLGATE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Seconds a request may stay undecided.
    #[arg(
        long,
        env = "TOOLGATE_TTL_SECS",
        default_value_t = 600,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS)
    )]
    pub ttl_secs: u64,

    /// Seconds between expired-request sweeps.
    #[arg(
        long,
        env = "TOOLGATE_SWEEP_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS)
    )]
    pub sweep_secs: u64,
}

impl ServeArgs {
    pub fn config(&self) -> ServeConfig {
        ServeConfig {
            bind: self.bind.clone(),
            port: self.port,
            ttl: Duration::from_secs(self.ttl_secs),
            sweep_interval: Duration::from_secs(self.sweep_secs),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ClientArgs {
    /// Base URL of the toolgate server.
    #[arg(long, env = "TOOLGATE_URL", default_value = "http://127.0.0.1:8000")]
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecisionArg {
    #[value(alias = "a", alias = "A")]
    Approve,
    #[value(alias = "d", alias = "D")]
    Deny,
}

impl From<DecisionArg> for Verdict {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Approve => Verdict::Approve,
            DecisionArg::Deny => Verdict::Deny,
        }
    }
}

/// Run a client subcommand against a server and return the text to print.
pub async fn run_client(command: Command) -> Result<String> {
    match command {
        Command::Serve(_) => Err(Error::Config("serve is not a client command".into())),
        Command::Status(client) => {
            let health = HttpBrokerClient::new(client.url)?.health().await?;
            Ok(format!(
                "pending: {}, channels: {}",
                health.pending, health.channels
            ))
        }
        Command::Snapshot { client, session_id } => {
            let client = HttpBrokerClient::new(client.url)?;
            match client.get_request_snapshot(&session_id).await? {
                Some(request) => Ok(serde_json::to_string_pretty(&request)?),
                None => Ok(format!("no request for session '{}'", session_id)),
            }
        }
        Command::Respond {
            client,
            session_id,
            decision,
            args,
        } => {
            let modified = args.as_deref().map(parse_args).transpose()?;
            let decision = Decision::from_verdict(decision.into(), modified);
            HttpBrokerClient::new(client.url)?
                .submit_decision(&session_id, &decision)
                .await?;
            Ok(format!("recorded {} for session '{}'", decision.verdict(), session_id))
        }
    }
}

fn parse_args(raw: &str) -> Result<ToolArgs> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::Config(format!(
            "--args must be a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["toolgate", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.port, 9000);
                let config = args.config();
                assert_eq!(config.ttl, Duration::from_secs(args.ttl_secs));
            }
            other => panic!("expected serve, got {:?}", other),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_respond_accepts_letter_code() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "respond",
            "s1",
            "A",
            "--args",
            r#"{"to": "z@y.com"}"#,
            "--json-logs",
        ])
        .unwrap();
        assert!(cli.json_logs);
        match cli.command {
            Command::Respond {
                session_id,
                decision,
                args,
                ..
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(decision, DecisionArg::Approve);
                assert!(args.is_some());
            }
            other => panic!("expected respond, got {:?}", other),
        }
    }

    #[test]
    fn test_ttl_out_of_range_rejected() {
        for ttl in ["0", "86401", "18446744073709551615"] {
            assert!(
                Cli::try_parse_from(["toolgate", "serve", "--ttl-secs", ttl]).is_err(),
                "ttl {} should be rejected",
                ttl
            );
        }
        assert!(Cli::try_parse_from(["toolgate", "serve", "--sweep-secs", "0"]).is_err());

        let cli = Cli::try_parse_from(["toolgate", "serve", "--ttl-secs", "86400"]).unwrap();
        match cli.command {
            Command::Serve(args) => assert_eq!(args.config().ttl, Duration::from_secs(86_400)),
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_decision_rejected() {
        assert!(Cli::try_parse_from(["toolgate", "respond", "s1", "maybe"]).is_err());
    }

    #[test]
    fn test_parse_args_requires_object() {
        assert!(parse_args(r#"{"a": 1}"#).is_ok());
        assert!(parse_args("[1, 2]").unwrap_err().is_config());
        assert!(parse_args("{").unwrap_err().is_config());
    }
}
