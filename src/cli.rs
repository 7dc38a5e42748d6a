// src/cli.rs
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use crate::recipients;
use crate::registration::RegistrationRequest;
use crate::types::{CheckFrequency, Team};

/// cert-patrol: TLS certificate expiry monitor
///
/// Probes registered domains on their own schedule and sends a one-time
/// alert per validity window before the certificate expires.
#[derive(Parser, Debug, Clone)]
#[command(name = "cert-patrol")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to TOML config file
    #[arg(short = 'c', long = "config", default_value = "config.toml", global = true)]
    pub config: String,

    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the scheduler until interrupted
    Run,

    /// Run one scan now
    Scan {
        /// Probe this domain even if it is not due
        #[arg(short = 'd', long = "domain")]
        domain: Option<String>,
    },

    /// Run the alert pass without probing
    Alerts,

    /// Register a domain (probes it first)
    Add {
        domain: String,

        #[arg(short = 'p', long = "port")]
        port: Option<u16>,

        #[arg(short = 't', long = "team")]
        team: Option<i64>,

        /// 1h, 2h, 4h, 8h, 12h, daily, weekly or monthly
        #[arg(short = 'f', long = "frequency", default_value = "daily")]
        frequency: String,

        /// Alert this many days before expiry
        #[arg(long = "alert-days")]
        alert_days: Option<u32>,

        /// Comma separated alert recipients
        #[arg(short = 'e', long = "emails")]
        emails: Option<String>,
    },

    /// Create or update a team and its alert defaults
    Team {
        id: i64,

        name: String,

        /// Default alert threshold in days for the team's domains
        #[arg(long = "alert-days")]
        alert_days: Option<u32>,

        /// Comma separated default recipients
        #[arg(short = 'e', long = "emails")]
        emails: Option<String>,
    },

    /// Print stored records
    List {
        /// Output in JSONL format
        #[arg(short = 'j', long = "json")]
        json: bool,

        /// Output in CSV format
        #[arg(long = "csv")]
        csv: bool,
    },
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        match &self.command {
            Command::List { json: true, csv: true } => {
                anyhow::bail!("Cannot specify multiple output formats. Choose one of: --json or --csv");
            }
            Command::Add { frequency, .. } => {
                let parsed = CheckFrequency::parse_lenient(frequency);
                if !parsed.as_str().eq_ignore_ascii_case(frequency.trim()) {
                    anyhow::bail!(
                        "Invalid frequency '{}'. Must be one of: 1h, 2h, 4h, 8h, 12h, daily, weekly, monthly",
                        frequency
                    );
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Log level from -v/-q, if either was given
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }
}

impl Command {
    /// Output format for `list`
    pub fn output_format(&self) -> OutputFormat {
        match self {
            Command::List { json: true, .. } => OutputFormat::Json,
            Command::List { csv: true, .. } => OutputFormat::Csv,
            _ => OutputFormat::Human,
        }
    }

    /// Registration request for `add`
    pub fn registration_request(&self) -> Option<RegistrationRequest> {
        match self {
            Command::Add {
                domain,
                port,
                team,
                frequency,
                alert_days,
                emails,
            } => Some(RegistrationRequest {
                domain: domain.clone(),
                port: *port,
                team_id: *team,
                check_frequency: CheckFrequency::parse_lenient(frequency),
                custom_alert_days: *alert_days,
                custom_emails: emails.as_deref().map(recipients::parse_list).unwrap_or_default(),
            }),
            _ => None,
        }
    }

    /// Team record for `team`
    pub fn team(&self) -> Option<Team> {
        match self {
            Command::Team {
                id,
                name,
                alert_days,
                emails,
            } => Some(Team {
                id: *id,
                name: name.clone(),
                default_alert_days: *alert_days,
                default_emails: emails
                    .as_deref()
                    .map(|raw| recipients::resolve(&recipients::parse_list(raw), &[], ""))
                    .unwrap_or_default(),
            }),
            _ => None,
        }
    }
}
