//! CLI command definitions and the dry-run roster format

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use eyre::{Context, Result, eyre};
use serde::Deserialize;

use crate::collab::{LeadProfile, SignalKind};
use crate::domain::LAST_DAY;

/// sq - outreach sequencer dry-run harness
#[derive(Parser)]
#[command(
    name = "sq",
    about = "Rehearse the five-day outreach cadence against in-memory collaborators",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Enroll a roster, run daily passes and print where each lead ended up
    Simulate {
        /// Roster YAML file
        #[arg(short, long)]
        roster: PathBuf,

        /// Number of daily passes to run
        #[arg(short, long, default_value_t = LAST_DAY)]
        days: u8,

        /// Sends allowed per pass (defaults to the configured daily limit)
        #[arg(short, long)]
        quota: Option<u32>,

        /// Print final enrollments as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the five-day cadence
    Blueprint,
}

/// One lead in a roster file
#[derive(Debug, Clone, Deserialize)]
pub struct RosterLead {
    pub id: String,

    #[serde(rename = "name")]
    pub display_name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default, rename = "prior-touches")]
    pub prior_touches: Vec<String>,
}

impl From<RosterLead> for LeadProfile {
    fn from(lead: RosterLead) -> Self {
        Self {
            lead_id: lead.id.into(),
            display_name: lead.display_name,
            email_address: lead.email,
            phone_number: lead.phone,
            prior_touch_summaries: lead.prior_touches,
        }
    }
}

/// A signal injected before a given pass
#[derive(Debug, Clone, Deserialize)]
pub struct RosterSignal {
    pub lead: String,
    pub kind: SignalKind,
    /// Pass (1-based) before which the signal is observed
    #[serde(rename = "before-day")]
    pub before_day: u8,
}

/// Dry-run input: leads to enroll and signals to replay
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Roster {
    pub leads: Vec<RosterLead>,

    #[serde(default)]
    pub signals: Vec<RosterSignal>,
}

impl Roster {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read roster {}", path.display()))?;
        let roster: Self = serde_yaml::from_str(&content).context("Failed to parse roster")?;
        roster.validate()?;
        Ok(roster)
    }

    /// Reject rosters that reference unknown leads or repeat an id
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for lead in &self.leads {
            if !seen.insert(lead.id.as_str()) {
                return Err(eyre!("Duplicate lead id in roster: {}", lead.id));
            }
        }
        for signal in &self.signals {
            if !seen.contains(signal.lead.as_str()) {
                return Err(eyre!("Signal references unknown lead: {}", signal.lead));
            }
        }
        Ok(())
    }

    /// Signals due before the given pass
    pub fn signals_before(&self, day: u8) -> impl Iterator<Item = &RosterSignal> {
        self.signals.iter().filter(move |s| s.before_day == day)
    }
}
