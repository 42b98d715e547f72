//! MessageLater CLI
//!
//! Schedule reminders to message a contact later, and run the host that
//! fires them.

use anyhow::Context as _;
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use clap::{Parser, Subcommand};
use messagelater::context::{self, AppContext, UserAction};
use messagelater::daemon::{describe_report, Daemon};
use messagelater::gateway::{AlarmPayload, ManualAlarmBackend, TokioAlarmBackend};
use messagelater::{
    config, Clock, FormEvent, MessageLaterConfig, Reminder, RepeatOption, SystemClock, UiEffect,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// MessageLater - remind yourself to message someone later
#[derive(Parser, Debug)]
#[command(name = "messagelater")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Home directory (defaults to $MESSAGELATER_HOME or ~/.messagelater)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Path to the reminder database
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule a new reminder
    Create {
        /// Pick the first contact matching this query
        #[arg(long, conflicts_with_all = ["name", "number"])]
        contact: Option<String>,

        /// Contact name, when not picking from the directory
        #[arg(long, requires = "number")]
        name: Option<String>,

        /// Contact phone number
        #[arg(long, requires = "name")]
        number: Option<String>,

        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Local date, YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        /// Local time, HH:MM
        #[arg(long, value_parser = parse_time)]
        time: NaiveTime,

        /// none, monthly or yearly
        #[arg(long, default_value = "none")]
        repeat: RepeatOption,
    },

    /// List reminders, soonest first
    List {
        /// Only scheduled and pending reminders
        #[arg(long)]
        active: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one reminder as JSON
    Show { id: String },

    /// Delete a reminder and cancel its alarm
    Delete { id: String },

    /// Fire a reminder's alarm now
    Fire { id: String },

    /// Tap a reminder's notification
    Tap { id: String },

    /// Open the messaging app from a reminder's notification
    Open { id: String },

    /// Dismiss a reminder's notification
    Dismiss { id: String },

    /// Run the restart recovery sweep once
    Boot,

    /// Run the host: fire alarms as they come due and accept
    /// `tap|open|dismiss <id>` lines on stdin
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Run => run_host(config, clock).await,
        command => run_once(command, config, clock).await,
    }
}

/// One-shot commands register alarms with a recording backend. A running
/// host picks new reminders up on its next resync.
async fn run_once(
    command: Command,
    config: MessageLaterConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<()> {
    let backend = Arc::new(ManualAlarmBackend::new());
    backend.set_exact_alarms_allowed(config.exact_alarms_allowed);
    backend.set_messaging_app_installed(config.messaging_app_installed);
    let app = AppContext::open(config, backend.clone(), clock)?;

    match command {
        Command::Create {
            contact,
            name,
            number,
            message,
            date,
            time,
            repeat,
        } => {
            let (session, mut effects) = app.create_session();
            match (contact, name, number) {
                (Some(query), _, _) => {
                    let found = session.pick_contacts(&query).await?;
                    let contact = found
                        .into_iter()
                        .next()
                        .with_context(|| format!("No contact matches '{}'", query))?;
                    session.on_event(FormEvent::ContactSelected(contact));
                }
                (None, Some(name), Some(number)) => {
                    session.on_event(FormEvent::ContactSelected(messagelater::contacts::Contact {
                        id: String::new(),
                        name,
                        phone_numbers: vec![number],
                    }));
                }
                _ => anyhow::bail!("Pass --contact, or both --name and --number"),
            }
            session.on_event(FormEvent::MessageChanged(message));
            session.on_event(FormEvent::DateSelected(date));
            session.on_event(FormEvent::TimeSelected(time));
            session.on_event(FormEvent::RepeatSelected(repeat));

            let result = session.submit().await;
            while let Ok(effect) = effects.try_recv() {
                match effect {
                    UiEffect::ShowSuccess(msg) => println!("{}", msg),
                    UiEffect::ShowError(msg) => eprintln!("{}", msg),
                    _ => {}
                }
            }
            let reminder = result?;
            println!("{}", reminder.id);
        }
        Command::List { active, json } => {
            let reminders = if active {
                app.lifecycle.list_active().await?
            } else {
                app.lifecycle.list_all().await?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&reminders)?);
            } else {
                for reminder in &reminders {
                    println!("{}", format_row(reminder));
                }
            }
        }
        Command::Show { id } => {
            let reminder = app
                .lifecycle
                .get(&id)
                .await?
                .with_context(|| format!("Reminder not found: {}", id))?;
            println!("{}", serde_json::to_string_pretty(&reminder)?);
        }
        Command::Delete { id } => {
            app.lifecycle.delete(&id).await?;
            println!("Deleted {}", id);
        }
        Command::Fire { id } => {
            let reminder = app
                .lifecycle
                .get(&id)
                .await?
                .with_context(|| format!("Reminder not found: {}", id))?;
            let payload = AlarmPayload::for_reminder(&reminder, reminder.contact_name.clone());
            report_outcome(&id, app.handle_alarm(&payload).await);
            if let Some(notification) = backend.presented_notification(&id) {
                println!("{}: {}", notification.title, notification.body);
            }
        }
        Command::Tap { id } => {
            report_outcome(&id, app.handle_action(&UserAction::Tapped(id.clone())).await)
        }
        Command::Open { id } => {
            report_outcome(
                &id,
                app.handle_action(&UserAction::OpenMessagingApp(id.clone())).await,
            );
            for url in backend.opened_urls() {
                println!("{}", url);
            }
        }
        Command::Dismiss { id } => {
            report_outcome(&id, app.handle_action(&UserAction::Dismissed(id.clone())).await)
        }
        Command::Boot => {
            let report = app.handle_boot().await;
            println!("{}", describe_report(&report));
        }
        Command::Run => run_host_hint(),
    }

    Ok(())
}

async fn run_host(config: MessageLaterConfig, clock: Arc<dyn Clock>) -> anyhow::Result<()> {
    info!("Starting MessageLater host");
    info!("Database: {:?}", config.database_file);

    let (backend, events) = TokioAlarmBackend::new(
        clock.clone(),
        config.exact_alarms_allowed,
        config.messaging_app_installed,
    )
    .map_err(messagelater::MessageLaterError::from)?;
    let app = Arc::new(AppContext::open(config, Arc::new(backend), clock)?);
    context::install(app.clone())?;

    let (input_tx, input_rx) = mpsc::channel::<String>(32);
    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();

    // Spawn blocking thread to read actions from stdin
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if input_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });

    // Spawn task to write to stdout
    tokio::spawn(async move {
        while let Some(msg) = output_rx.recv().await {
            if let Err(e) = writeln!(io::stdout(), "{}", msg) {
                error!("Error writing stdout: {}", e);
                break;
            }
            let _ = io::stdout().flush();
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    Daemon::new(app).run(events, input_rx, output_tx, shutdown).await?;
    Ok(())
}

fn run_host_hint() {
    eprintln!("`run` starts the host; it is not a one-shot command");
}

fn load_config(cli: &Cli) -> anyhow::Result<MessageLaterConfig> {
    let home = match &cli.home {
        Some(home) => home.clone(),
        None => config::resolve_home()?,
    };
    let mut config = config::load(&home)?;
    if let Some(database) = &cli.database {
        config = config.with_database_file(database.clone());
    }
    Ok(config)
}

fn report_outcome(id: &str, outcome: Option<Reminder>) {
    match outcome {
        Some(reminder) => println!("{} is now {}", id, reminder.state),
        None => eprintln!("{} unchanged, see log for details", id),
    }
}

fn format_row(reminder: &Reminder) -> String {
    let when = Local
        .timestamp_opt(reminder.scheduled_at, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| reminder.scheduled_at.to_string());
    format!(
        "{}  {:<9}  {}  {} ({})  {}",
        reminder.id,
        reminder.state.as_str(),
        when, reminder.contact_name, reminder.contact_number, reminder.message
    )
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM: {}", e))
}
