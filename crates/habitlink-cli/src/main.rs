//! habitlink - drive the habitlink session SDK from the terminal.
//!
//! Useful for checking a partner configuration end to end: identify a
//! user, fetch their bearer token, report a habit completion, log out.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use habitlink_core::config::{ENVIRONMENT_ENV, PARTNER_ID_ENV};
use habitlink_core::{
    AlwaysSupported, Environment, FileBackend, HabitSdk, IdentifyOutcome, KeyringBackend,
    SdkConfig, SdkError, StoreBackend,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for an additional log file, if set
const LOG_DIR_ENV: &str = "HABITLINK_LOG_DIR";

/// Log file name inside `HABITLINK_LOG_DIR`
const LOG_FILE: &str = "habitlink.log";

const USAGE: &str = "\
Usage: habitlink [--keychain] <command>

Commands:
  configure <partner-id> [production|staging]   Save the SDK configuration
  identify <user-id>                            Identify the current user
  token [user-id]                               Print a bearer token
  complete                                      Report today's habit as done
  logout                                        Forget the current user
  status                                        Show the stored session

Environment:
  HABITLINK_PARTNER_ID, HABITLINK_ENVIRONMENT override the saved config.
  RUST_LOG controls log verbosity (default: warn).";

enum Command {
    Configure {
        partner_id: String,
        environment: Environment,
    },
    Identify(String),
    Token(Option<String>),
    Complete,
    Logout,
    Status,
}

struct Args {
    keychain: bool,
    command: Command,
}

impl Args {
    fn parse(raw: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut keychain = false;
        let mut words = Vec::new();
        for arg in raw {
            if arg == "--keychain" {
                keychain = true;
            } else {
                words.push(arg);
            }
        }

        let mut words = words.into_iter();
        let command = match words.next().as_deref() {
            Some("configure") => {
                let partner_id = words.next().context("configure needs a partner id")?;
                let environment = match words.next() {
                    Some(env) => env.parse()?,
                    None => Environment::default(),
                };
                Command::Configure {
                    partner_id,
                    environment,
                }
            }
            Some("identify") => Command::Identify(words.next().context("identify needs a user id")?),
            Some("token") => Command::Token(words.next()),
            Some("complete") => Command::Complete,
            Some("logout") => Command::Logout,
            Some("status") => Command::Status,
            Some(other) => anyhow::bail!("unknown command '{}'\n\n{}", other, USAGE),
            None => anyhow::bail!("{}", USAGE),
        };

        Ok(Self { keychain, command })
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn open_backend(keychain: bool) -> Result<Box<dyn StoreBackend>> {
    if keychain {
        Ok(Box::new(KeyringBackend::new()?))
    } else {
        Ok(Box::new(FileBackend::new(SdkConfig::data_dir())))
    }
}

fn save_config(partner_id: String, environment: Environment) -> Result<()> {
    let config = SdkConfig::new(partner_id, environment);
    config.validate()?;
    config.save()?;
    println!("Saved configuration to {}", SdkConfig::config_path()?.display());
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let command = match args.command {
        Command::Configure {
            partner_id,
            environment,
        } => return save_config(partner_id, environment),
        command => command,
    };

    let config = SdkConfig::load().context("Failed to load configuration")?;
    let sdk = HabitSdk::new(open_backend(args.keychain)?, Arc::new(AlwaysSupported));
    if let Err(e) = sdk.configure(config) {
        if matches!(e, SdkError::InvalidSdkConfiguration(_)) {
            eprintln!(
                "Run `habitlink configure <partner-id>` or set {} / {}.",
                PARTNER_ID_ENV, ENVIRONMENT_ENV
            );
        }
        return Err(e.into());
    }

    match command {
        Command::Configure { .. } => {}
        Command::Identify(user_id) => {
            let outcome = sdk.identify(&user_id)?;
            println!("{}", describe(outcome));
            if matches!(outcome, IdentifyOutcome::New | IdentifyOutcome::Mismatched) {
                // the background fetch dies with the runtime, so wait for it here
                sdk.partner_token(None).await?;
                println!("Token cached for {}", user_id);
            }
        }
        Command::Token(user_id) => {
            let token = sdk.partner_token(user_id.as_deref()).await?;
            println!("{}", token);
        }
        Command::Complete => {
            sdk.complete_daily_habit().await?;
            println!("Daily habit completed");
        }
        Command::Logout => {
            sdk.logout();
            println!("Logged out");
        }
        Command::Status => {
            let status = sdk.status()?;
            println!("user:          {}", status.user_id.as_deref().unwrap_or("(none)"));
            println!("token cached:  {}", if status.has_token { "yes" } else { "no" });
            if status.persistence_degraded {
                println!("warning:       session could not be read or saved");
            }
        }
    }

    Ok(())
}

fn describe(outcome: IdentifyOutcome) -> &'static str {
    match outcome {
        IdentifyOutcome::Unsupported => "Not supported on this device",
        IdentifyOutcome::Known => "User already identified",
        IdentifyOutcome::New => "New user identified",
        IdentifyOutcome::Mismatched => "Switched from a different user (no logout in between)",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    info!("habitlink starting");
    if let Err(e) = run(args).await {
        match e.downcast_ref::<SdkError>() {
            Some(sdk_err) => eprintln!("Error ({:?}): {}", sdk_err.category(), sdk_err),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(words: &[&str]) -> Result<Args> {
        Args::parse(words.iter().map(|w| w.to_string()))
    }

    #[test]
    fn test_parse_configure_defaults_to_production() {
        let args = parse(&["configure", "acme"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Configure { ref partner_id, environment: Environment::Production } if partner_id == "acme"
        ));
    }

    #[test]
    fn test_parse_keychain_flag_anywhere() {
        let args = parse(&["token", "--keychain", "u1"]).unwrap();
        assert!(args.keychain);
        assert!(matches!(args.command, Command::Token(Some(ref id)) if id == "u1"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["identify"]).is_err());
        assert!(parse(&["configure", "acme", "qa"]).is_err());
        assert!(parse(&["launch"]).is_err());
    }
}
