//! Pennywise CLI - a command-line host for the Pennywise client core.
//!
//! Stands in for the mobile shell: it logs in, hands out tokens, fires the
//! resume trigger, runs storage migrations and categorizes transactions.

mod app;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use pennywise_core::categorize::{categorize, categorize_all};
use pennywise_core::Config;

/// Default interval for `watch`
const RESUME_INTERVAL_SECS: u64 = 60;

const USAGE: &str = "\
Usage: pennywise <command> [options]

Commands:
  login [email] [--remember]        Log in (password is prompted)
  logout [--forget-device]          Clear the session
  status                            Show the session state
  token                             Print a valid access token
  resume                            Run the resume check once
  watch [seconds]                   Run the resume check periodically
  migrate                           Move legacy plaintext data to secure storage
  categorize <description> [--merchant <name>]
  bank-callback <start|clear|status>
  profile | goals | transactions    Fetch data from the backend";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and to a daily rolling file in the data directory.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = Config::load()
        .and_then(|config| config.data_dir())
        .map(|dir| dir.join("logs"))
        .ok();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pennywise.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    // Categorizing needs no session or storage
    if command == "categorize" {
        return run_categorize(rest);
    }
    if command == "help" || command == "--help" || command == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut app = App::new()?;
    info!(command = %command, "Pennywise starting");

    // Migrations run before anything reads secure storage
    if command != "migrate" {
        app.migrate_quietly();
    }

    match command.as_str() {
        "login" => login(&mut app, rest).await,
        "logout" => {
            app.session.logout(has_flag(rest, "--forget-device"))?;
            println!("Logged out");
            Ok(())
        }
        "status" => print_json(&app.session.session_info()),
        "token" => match app.session.get_valid_access_token().await {
            Some(token) => {
                println!("{}", token);
                Ok(())
            }
            None => bail!("No valid session. Run `pennywise login`."),
        },
        "resume" => {
            let state = app.session.on_resume().await;
            print_json(&state)
        }
        "watch" => watch(&app, rest).await,
        "migrate" => {
            let runner = app.migration_runner();
            let report = runner.run_migrations();
            print_json(&report)?;
            eprintln!(
                "Storage at version {} of {}",
                runner.current_version()?,
                runner.latest_version()
            );
            if !report.success {
                bail!("Migration did not complete");
            }
            Ok(())
        }
        "bank-callback" => bank_callback(&app, rest),
        "profile" => {
            let profile = app.api.fetch_profile().await?;
            eprintln!("Signed in as {}", profile.display_name());
            print_json(&profile)
        }
        "goals" => {
            for goal in app.api.fetch_goals().await? {
                println!(
                    "{}: {:.0}% ({:.2} of {:.2})",
                    goal.name,
                    goal.progress_percent(),
                    goal.current_amount,
                    goal.target_amount
                );
            }
            Ok(())
        }
        "transactions" => {
            let transactions = app.api.fetch_transactions().await?;
            print_json(&categorize_all(transactions))
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            bail!("Unknown command: {}", other)
        }
    }
}

async fn login(app: &mut App, args: &[String]) -> Result<()> {
    let remember_me = has_flag(args, "--remember");
    let email = match args.iter().find(|a| !a.starts_with("--")) {
        Some(email) => email.clone(),
        None => prompt_email(app.config.last_email.as_deref())?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }

    let password = rpassword::prompt_password("Password: ")?;
    let info = app.session.login(&email, &password, remember_me).await?;
    app.remember_email(&email)?;

    print_json(&info)
}

fn prompt_email(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => eprint!("Email [{}]: ", last),
        None => eprint!("Email: "),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let entered = line.trim();
    Ok(if entered.is_empty() {
        last.unwrap_or_default().to_string()
    } else {
        entered.to_string()
    })
}

async fn watch(app: &App, args: &[String]) -> Result<()> {
    let secs = match args.first() {
        Some(raw) => raw.parse::<u64>()?,
        None => RESUME_INTERVAL_SECS,
    };
    if secs == 0 {
        bail!("Interval must be at least one second");
    }

    let interval = Duration::from_secs(secs);
    let timer = app.session.spawn_resume_timer(interval);
    eprintln!("Checking the session every {}s, Ctrl-C to stop", secs);

    loop {
        tokio::time::sleep(interval).await;
        if timer.is_finished() {
            bail!("Resume timer stopped unexpectedly");
        }
        let info = app.session.session_info();
        println!("{:?} (expires in {:?}s)", info.state, info.seconds_until_expiry);
    }
}

fn bank_callback(app: &App, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("start") => app.session.mark_banking_callback_started()?,
        Some("clear") => app.session.clear_banking_callback()?,
        Some("status") | None => {}
        Some(other) => bail!("Unknown bank-callback action: {}", other),
    }
    println!("banking callback recent: {}", app.session.is_banking_callback_recent());
    Ok(())
}

fn run_categorize(args: &[String]) -> Result<()> {
    let mut description = Vec::new();
    let mut merchant = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--merchant" {
            merchant = iter.next().cloned();
        } else {
            description.push(arg.as_str());
        }
    }
    if description.is_empty() {
        bail!("Usage: pennywise categorize <description> [--merchant <name>]");
    }

    println!("{}", categorize(&description.join(" "), merchant.as_deref()));
    Ok(())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
