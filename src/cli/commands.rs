// Gazette — CLI Command Handlers
//
// Each function handles one CLI subcommand. The store is opened once per
// invocation from the validated configuration; `serve` shares it with the
// gateway and the purge sweep and closes it on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::GazetteError;
use crate::gateway::UdsServer;
use crate::store::{EscrowRepository, EscrowStore};
use crate::sweep::spawn_purge_sweep;

use super::{Cli, Commands};

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<(), GazetteError> {
    let config = cli.store.to_config()?;

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::List => cmd_list(&config),
        Commands::Show { password_hash } => cmd_show(&config, &password_hash),
        Commands::Delete { password_hash } => cmd_delete(&config, &password_hash),
        Commands::Purge { max_age } => cmd_purge(&config, max_age),
        Commands::Serve {
            socket,
            purge_max_age,
            purge_interval,
        } => cmd_serve(&config, socket, purge_max_age, purge_interval).await,
    }
}

// ─── Init ────────────────────────────────────────────────────────────────────

fn cmd_init(config: &StoreConfig) -> Result<(), GazetteError> {
    let store = EscrowStore::open(config)?;
    let entries = store.count()?;
    store.close()?;

    println!("✓ Gazette store ready");
    println!("  Database: {}", config.path.display());
    println!("  Cipher:   {}", config.cipher);
    println!("  Journal:  {}", config.journal_mode.pragma_value());
    println!("  Entries:  {}", entries);

    Ok(())
}

// ─── List ────────────────────────────────────────────────────────────────────

fn cmd_list(config: &StoreConfig) -> Result<(), GazetteError> {
    let store = EscrowStore::open(config)?;
    let summaries = store.list_all()?;
    store.close()?;

    if summaries.is_empty() {
        println!("No escrow entries stored.");
        return Ok(());
    }

    println!("Escrow entries ({}):\n", summaries.len());
    for summary in &summaries {
        println!("  {}", summary);
    }

    Ok(())
}

// ─── Show ────────────────────────────────────────────────────────────────────

fn cmd_show(config: &StoreConfig, password_hash: &str) -> Result<(), GazetteError> {
    let store = EscrowStore::open(config)?;
    let entry = store.get(password_hash)?;
    store.close()?;

    let Some(entry) = entry else {
        println!("Entry not found: {}", password_hash);
        return Ok(());
    };

    let stamp = |dt: Option<chrono::DateTime<chrono::Utc>>| {
        dt.map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
            .unwrap_or_else(|| "invalid timestamp".to_string())
    };

    println!("Escrow entry:\n");
    println!("  Password hash: {}", entry.password_hash);
    println!("  Encrypted DEK: [REDACTED]");
    println!("  Salt:          [REDACTED]");
    println!("  Version:       {}", entry.version);
    println!("  Created:       {}", stamp(entry.created_at_utc()));
    println!("  Updated:       {}", stamp(entry.updated_at_utc()));
    match &entry.metadata {
        Some(meta) => println!("  Metadata:      {}", meta),
        None => println!("  Metadata:      (none)"),
    }

    Ok(())
}

// ─── Delete ──────────────────────────────────────────────────────────────────

fn cmd_delete(config: &StoreConfig, password_hash: &str) -> Result<(), GazetteError> {
    let store = EscrowStore::open(config)?;
    let deleted = store.delete(password_hash)?;
    store.close()?;

    if deleted {
        println!("✓ Entry {} securely erased", password_hash);
    } else {
        println!("Entry not found: {}", password_hash);
    }

    Ok(())
}

// ─── Purge ───────────────────────────────────────────────────────────────────

fn cmd_purge(config: &StoreConfig, max_age: Duration) -> Result<(), GazetteError> {
    let store = EscrowStore::open(config)?;
    let purged = store.purge_older_than(max_age)?;
    store.close()?;

    println!("✓ Purged {} entr{} older than {:?}", purged, if purged == 1 { "y" } else { "ies" }, max_age);
    Ok(())
}

// ─── Serve ───────────────────────────────────────────────────────────────────

async fn cmd_serve(
    config: &StoreConfig,
    socket: Option<PathBuf>,
    purge_max_age: Option<Duration>,
    purge_interval: Duration,
) -> Result<(), GazetteError> {
    let store: Arc<dyn EscrowRepository> = Arc::new(EscrowStore::open(config)?);

    let sweep = purge_max_age.map(|max_age| {
        tracing::info!(?max_age, every = ?purge_interval, "Purge sweep enabled");
        spawn_purge_sweep(Arc::clone(&store), max_age, purge_interval)
    });

    let socket_path = socket.unwrap_or_else(UdsServer::default_socket_path);
    let server = UdsServer::new(Arc::clone(&store), socket_path);
    println!("Gazette gateway listening on {}", server.socket_path().display());

    let served = server.run(shutdown_signal()).await;

    if let Some(handle) = sweep {
        handle.abort();
    }

    // Waits for any in-flight store operation, then rejects the rest.
    store.close()?;
    served?;

    tracing::info!("Gazette shut down cleanly");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received, starting graceful shutdown"),
        _ = terminate => tracing::info!("SIGTERM received, starting graceful shutdown"),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use clap::Parser;

    fn cli(dir: &tempfile::TempDir, args: &[&str]) -> Cli {
        let db = dir.path().join("gazette.db");
        let mut argv = vec![
            "gazette".to_string(),
            "--db-key".to_string(),
            "cli test key".to_string(),
            "--db-path".to_string(),
            db.display().to_string(),
        ];
        argv.extend(args.iter().map(|s| s.to_string()));
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_init_list_show_delete_purge() {
        let dir = tempfile::tempdir().unwrap();

        execute(cli(&dir, &["init"])).await.unwrap();

        let config = cli(&dir, &["list"]).store.to_config().unwrap();
        {
            let store = EscrowStore::open(&config).unwrap();
            store.insert("h-cli", "dek", "salt").unwrap();
            store.close().unwrap();
        }

        execute(cli(&dir, &["list"])).await.unwrap();
        execute(cli(&dir, &["show", "h-cli"])).await.unwrap();
        execute(cli(&dir, &["show", "h-missing"])).await.unwrap();
        execute(cli(&dir, &["purge", "--max-age", "30d"])).await.unwrap();
        execute(cli(&dir, &["delete", "h-cli"])).await.unwrap();

        let store = EscrowStore::open(&config).unwrap();
        assert!(store.get("h-cli").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("never.db");
        // An explicit blank key overrides any DB_KEY in the environment.
        let parsed = Cli::try_parse_from([
            "gazette",
            "--db-key=",
            "--db-path",
            db.to_str().unwrap(),
            "init",
        ])
        .unwrap();
        assert_eq!(parsed.store.db_key.as_deref(), Some(""));

        let err = execute(parsed).await.unwrap_err();
        assert!(matches!(
            err,
            GazetteError::Config(ConfigError::MissingEncryptionKey)
        ));
        assert!(!db.exists());
        assert!(!dir.path().join("data").exists());
    }
}
