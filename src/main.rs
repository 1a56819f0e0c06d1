use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use speechcoach::api::{AppleCredentials, AudioUpload, FullName};
use speechcoach::app::{AppConfig, AppState, CredentialBackend};
use speechcoach::platform::AppPaths;

mod cli;

use cli::{Cli, Commands, RecordingAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = AppPaths::new()?;
    paths.ensure_dirs_exist()?;

    // Dropping the guard flushes the file writer
    let _guard = init_logging(&paths, cli.debug)?;
    info!("Starting SpeechCoach {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(file) => AppConfig::from_file(Path::new(file))
            .with_context(|| format!("Failed to read configuration from {}", file))?,
        None => AppConfig::load(&paths).await?,
    };
    if cli.ephemeral {
        config.credentials.backend = CredentialBackend::Memory;
    }

    let state = AppState::new(config, paths)?;
    run(&state, cli.command).await
}

fn init_logging(paths: &AppPaths, debug: bool) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let level = if debug { "speechcoach=debug" } else { "speechcoach=info" };
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if debug {
        filter = filter.add_directive(level.parse()?);
    }

    let appender = tracing_appender::rolling::daily(paths.logs_dir(), "speechcoach.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}

async fn run(state: &AppState, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::SignIn {
            identity_token,
            user,
            email,
            given_name,
            family_name,
        } => {
            let full_name = (given_name.is_some() || family_name.is_some()).then(|| FullName {
                given_name,
                family_name,
            });
            let credentials = AppleCredentials {
                identity_token,
                nonce: None,
                user,
                full_name,
                email,
            };
            print_json(&state.session().sign_in(&credentials).await?)
        }
        Commands::Me => match state.session().restore().await? {
            Some(profile) => print_json(&profile),
            None => {
                println!("Not signed in");
                Ok(())
            }
        },
        Commands::SignOut => {
            state.session().sign_out().await?;
            println!("Signed out");
            Ok(())
        }
        Commands::DeleteAccount => {
            state.session().delete_account().await?;
            println!("Speech profile deleted");
            Ok(())
        }
        Commands::Analyze { file, duration, mime } => {
            let audio = AudioUpload::from_path(&file)
                .await
                .with_context(|| format!("Failed to read audio file {}", file))?
                .with_mime(mime);
            debug!("Uploading {} bytes", audio.bytes.len());
            print_json(&state.analyze(audio, duration).await?)
        }
        Commands::Recordings { action } => match action.unwrap_or(RecordingAction::List) {
            RecordingAction::List => print_json(&state.load_recordings().await?),
            RecordingAction::Show { id } => {
                print_json(&state.recordings_api().get_recording(&id.to_string()).await?)
            }
            RecordingAction::Delete { id } => {
                state.delete_recording(id).await?;
                println!("Recording {} deleted", id);
                Ok(())
            }
        },
        Commands::Balance => print_json(&state.load_balance().await?),
        Commands::Transactions => print_json(&state.balance_api().get_transactions().await?),
        Commands::PaymentIntent { amount } => {
            print_json(&state.balance_api().create_payment_intent(amount).await?)
        }
        Commands::PaymentSheet { amount } => {
            print_json(&state.balance_api().create_payment_sheet(amount).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
