//! Subcommand implementations

use std::process::ExitCode;

use anyhow::{Context, anyhow};
use dsync_core::{Mutex, MutexBuilder};
use tracing::{debug, info};

use crate::cli::{Cli, Command};

/// Environment variable carrying the lock value into `exec` children
pub const VALUE_ENV: &str = "DSYNC_VALUE";

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.mutex_config()?;
    let mut mutex = MutexBuilder::from_config(config)
        .build()
        .await
        .context("failed to initialize lock client")?;
    debug!(name = %mutex.name(), session_id = mutex.session_id(), "Client ready");

    match cli.command {
        Command::Get => println!("{}", get(&mut mutex).await?),
        Command::Set { value } => set(&mut mutex, value).await?,
        Command::Incr { by } => println!("{}", incr(&mut mutex, by).await?),
        Command::Status => println!("{}", status(&mutex).await?),
        Command::Exec { command } => return exec(&mut mutex, &command).await,
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn get(mutex: &mut Mutex) -> anyhow::Result<String> {
    let value = mutex.lock_and_get_value().await?;
    mutex.unlock().await?;
    Ok(value)
}

pub async fn set(mutex: &mut Mutex, value: String) -> anyhow::Result<()> {
    mutex.lock().await?;
    mutex.set_value_and_unlock(value).await?;
    Ok(())
}

/// Add `by` to the integer value. The lock is released even when the stored
/// value is not a number.
pub async fn incr(mutex: &mut Mutex, by: i64) -> anyhow::Result<i64> {
    mutex.lock().await?;

    let next = mutex.value_i64().map_err(anyhow::Error::from).and_then(|current| {
        current
            .checked_add(by)
            .ok_or_else(|| anyhow!("value {} overflows when adding {}", current, by))
    });
    if let Ok(next) = next {
        mutex.set_value_i64(next);
    }

    mutex.unlock().await?;
    next
}

/// Stored record as pretty JSON, without taking part in the protocol
pub async fn status(mutex: &Mutex) -> anyhow::Result<String> {
    let record = mutex.store().get(mutex.name()).await?;
    match record {
        Some(record) => Ok(serde_json::to_string_pretty(&record)?),
        None => Ok(format!("lock '{}' has no record", mutex.name())),
    }
}

/// Run `command` while holding the lock and exit with its status
pub async fn exec(mutex: &mut Mutex, command: &[String]) -> anyhow::Result<ExitCode> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("no command given"))?;

    mutex.lock().await?;
    info!(name = %mutex.name(), program = %program, "Running command under lock");

    let status = tokio::process::Command::new(program)
        .args(args)
        .env(VALUE_ENV, mutex.value())
        .status()
        .await;

    mutex.unlock().await?;

    let status = status.with_context(|| format!("failed to run '{}'", program))?;
    debug!(status = %status, "Command finished");
    Ok(match status.code() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    })
}
