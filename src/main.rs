//! shardkv server binary
//!
//! Parses configuration, rebuilds the store from the append-only log,
//! then accepts connections until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use shardkv::commands::CommandHandler;
use shardkv::config::Config;
use shardkv::connection::{handle_connection, ConnectionStats};
use shardkv::persistence::{replay_file, AppendOnlyLog};
use shardkv::storage::StorageEngine;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(version = shardkv::VERSION, "Starting shardkv");

    let storage = Arc::new(StorageEngine::with_shards(config.shards));
    info!(shards = storage.shard_count(), "Storage engine initialized");

    let aof = match config.aof() {
        Some(path) => {
            let replayer = CommandHandler::new(Arc::clone(&storage));
            let replayed = replay_file(path, &replayer)
                .with_context(|| format!("failed to replay {}", path.display()))?;
            info!(
                path = %path.display(),
                commands = replayed.commands,
                skipped = replayed.skipped,
                bytes = replayed.bytes,
                keys = storage.len(),
                "Replayed append-only log"
            );

            let log = AppendOnlyLog::open(path, config.fsync)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Some(Arc::new(log))
        }
        None => {
            warn!("Append-only log disabled, data will not survive a restart");
            None
        }
    };

    let handler = match &aof {
        Some(log) => CommandHandler::with_log(Arc::clone(&storage), Arc::clone(log)),
        None => CommandHandler::new(Arc::clone(&storage)),
    };
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Ready to accept connections");

    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping server..."),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        }
    }

    if let Some(log) = &aof {
        match log.sync() {
            Ok(()) => info!(records = log.appended(), failed = log.failed(), "Append-only log synced"),
            Err(e) => error!(error = %e, "Failed to sync append-only log"),
        }
    }

    let store = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        protocol_errors = stats.protocol_errors.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        keys = store.keys,
        expired = store.expired,
        "Server shutdown complete"
    );
    Ok(())
}

/// Accepts connections forever, one task per client.
async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    handler.clone(),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
