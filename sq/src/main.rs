//! sq - outreach sequencer dry-run harness
//!
//! Runs the sequencer against in-memory collaborators so an operator can see
//! how a roster would move through the cadence without sending anything.

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use sequencer::cli::{Cli, Command, Roster};
use sequencer::collab::memory::{MemoryDirectory, MemorySignals, RecordingDialer, RecordingMailer, ScriptedWriter};
use sequencer::collab::{Collaborators, DailyQuota, LeadProfile, Signal};
use sequencer::config::{Config, PacingConfig};
use sequencer::domain::{BLUEPRINT, Enrollment, EnrollmentStatus, StepStatus};
use sequencer::{BatchReport, Sequencer};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    // Logs go to stderr so the report on stdout stays readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    config.validate()?;

    match cli.command {
        Command::Simulate {
            roster,
            days,
            quota,
            json,
        } => {
            let roster = Roster::load(&roster)?;
            cmd_simulate(&config, roster, days, quota, json).await
        }
        Command::Blueprint => cmd_blueprint(),
    }
}

/// Print the cadence
fn cmd_blueprint() -> Result<()> {
    println!("{}", "Five-day outreach cadence".bold());
    for step in &BLUEPRINT {
        println!(
            "  Day {}  {} {}",
            step.day,
            format!("{:<8}", step.channel.to_string()).cyan(),
            step.kind.label()
        );
    }
    Ok(())
}

/// Enroll the roster and run one generate + execute pass per day
async fn cmd_simulate(config: &Config, roster: Roster, days: u8, quota: Option<u32>, json: bool) -> Result<()> {
    debug!(leads = roster.leads.len(), days, ?quota, "cmd_simulate: called");
    let profiles: Vec<LeadProfile> = roster.leads.iter().cloned().map(LeadProfile::from).collect();

    let dialer = Arc::new(RecordingDialer::new());
    dialer.set_calling_hours_open(config.calling_hours.is_open_now());
    let signals = Arc::new(MemorySignals::new());
    let mailer = Arc::new(RecordingMailer::new());
    let daily = Arc::new(DailyQuota::new(config.quota.daily_send_limit));
    let collaborators = Collaborators {
        directory: Arc::new(MemoryDirectory::new(profiles.clone())),
        writer: Arc::new(ScriptedWriter::new()),
        email: mailer.clone(),
        voice: dialer.clone(),
        signals: signals.clone(),
        quota: daily.clone(),
    };

    // A rehearsal does not need to wait between in-memory calls
    let mut config = config.clone();
    config.pacing = PacingConfig::none();
    let sequencer = Sequencer::new(&config, collaborators);

    for profile in &profiles {
        sequencer.enroll(profile.lead_id.clone()).await?;
    }
    let per_pass = quota.unwrap_or(daily.limit());

    for day in 1..=days {
        for signal in roster.signals_before(day) {
            signals.push(signal.lead.as_str(), Signal::now(signal.kind));
        }
        let reconciled = sequencer.reconcile_signals().await;
        for transition in &reconciled.transitions {
            println!(
                "{} {} {} -> {}",
                format!("[day {}]", day).dimmed(),
                transition.lead,
                transition.from,
                status_colored(transition.to)
            );
        }

        let generated = sequencer.generate_all_pending().await;
        let executed = sequencer.execute_all_ready(per_pass).await;
        print_pass(day, &generated, &executed);
    }

    let enrollments = sequencer.list(None).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&enrollments)?);
        return Ok(());
    }

    println!();
    println!("{}", "Enrollments".bold());
    for enrollment in &enrollments {
        print_enrollment(enrollment);
    }
    println!();
    println!(
        "{} emails recorded, {} calls recorded",
        mailer.sent().len(),
        dialer.calls().len()
    );
    Ok(())
}

fn print_pass(day: u8, generated: &BatchReport, executed: &BatchReport) {
    println!(
        "{} generate: {}; execute: {}",
        format!("[day {}]", day).dimmed(),
        generated.summary(),
        executed.summary()
    );
    for error in generated.errors.iter().chain(&executed.errors) {
        println!("  {} {} day {}: {}", "error".red(), error.lead, error.day, error.message);
    }
}

fn print_enrollment(enrollment: &Enrollment) {
    let steps: Vec<String> = enrollment
        .steps
        .iter()
        .map(|s| match s.status {
            StepStatus::Sent | StepStatus::Called => s.status.to_string().green().to_string(),
            StepStatus::Skipped => s.status.to_string().yellow().to_string(),
            _ => s.status.to_string(),
        })
        .collect();
    let reason = enrollment
        .end_reason
        .map(|r| format!(" ({})", r))
        .unwrap_or_default();
    println!(
        "  {:<12} {}{} day {}  [{}]",
        enrollment.lead_id.as_str(),
        status_colored(enrollment.status),
        reason,
        enrollment.current_day,
        steps.join(", ")
    );
}

fn status_colored(status: EnrollmentStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        EnrollmentStatus::Active => label.green(),
        EnrollmentStatus::Paused => label.yellow(),
        EnrollmentStatus::Stopped => label.red(),
        EnrollmentStatus::Completed => label.blue(),
        EnrollmentStatus::Replied => label.magenta(),
    }
}
