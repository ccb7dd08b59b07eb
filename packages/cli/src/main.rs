//! `wardrobe`: inspect and maintain appearance snapshots from the shell.

mod folder;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use provider_core::{ActorIdentity, AuxKind, ProviderRegistry};
use snapshot::{
    AppConfig, ApplyRequest, AuxChoice, FileMapId, MigrationOutcome, Session, SnapshotLibrary,
    UpdateOptions,
};
use tracing::{Level, error, info};
use uuid::Uuid;

use folder::{FolderSource, FolderTarget};

#[derive(Parser)]
#[command(name = "wardrobe", version, about = "Versioned appearance snapshots")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Snapshot library root, overriding `storage.root`.
    #[arg(long, global = true, env = "WARDROBE_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List snapshots in the library.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Capture a folder of loose files into a snapshot.
    Capture {
        name: String,
        /// Folder whose relative file paths are the game paths.
        #[arg(long)]
        from: PathBuf,
        /// Actor label recorded on a new snapshot.
        #[arg(long, default_value = "local")]
        actor: String,
        #[arg(long)]
        world: Option<u16>,
        /// File holding the outfit payload.
        #[arg(long)]
        outfit: Option<PathBuf>,
        /// File holding the shape payload.
        #[arg(long)]
        shape: Option<PathBuf>,
        /// The folder is the complete file set: missing paths are removals.
        #[arg(long)]
        full: bool,
        #[arg(long)]
        description: Option<String>,
    },

    /// Print the flattened file map of a version.
    Resolve {
        name: String,
        /// File-map version id; defaults to the current one.
        #[arg(long)]
        version: Option<FileMapId>,
    },

    /// Print the history of one auxiliary kind.
    History { name: String, kind: KindArg },

    /// Delete a history entry.
    HistoryRm {
        name: String,
        kind: KindArg,
        id: Uuid,
    },

    /// Change the description of a history entry.
    HistoryRename {
        name: String,
        kind: KindArg,
        id: Uuid,
        description: String,
    },

    /// Materialise a snapshot into a folder.
    Export {
        name: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        version: Option<FileMapId>,
        /// `latest`, `skip` or a history entry id.
        #[arg(long, default_value = "latest")]
        outfit: String,
        /// `latest`, `skip` or a history entry id.
        #[arg(long, default_value = "latest")]
        shape: String,
    },

    /// Upgrade every legacy snapshot directory in the library.
    Migrate,

    /// Report file-map entries whose blobs are missing.
    Audit { name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Outfit,
    Shape,
}

impl From<KindArg> for AuxKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Outfit => AuxKind::Outfit,
            KindArg::Shape => AuxKind::Shape,
        }
    }
}

fn parse_choice(value: &str) -> Result<AuxChoice> {
    match value {
        "latest" => Ok(AuxChoice::Latest),
        "skip" => Ok(AuxChoice::Skip),
        id => Uuid::parse_str(id)
            .map(AuxChoice::Entry)
            .with_context(|| format!("expected 'latest', 'skip' or an entry id, got {id:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let mut config = AppConfig::load().context("Failed to load config")?;
    if let Some(root) = &cli.root {
        config.storage.root = root.display().to_string();
    }

    run(cli.command, &config).await
}

async fn run(command: Commands, config: &AppConfig) -> Result<()> {
    let library = SnapshotLibrary::from_config(config);

    match command {
        Commands::List { json } => {
            let summaries = library.list().await.context("Failed to list snapshots")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for s in &summaries {
                    println!(
                        "{}\t{}\t{} version(s)\t{}",
                        s.name,
                        s.actor,
                        s.versions,
                        s.last_update.to_rfc3339()
                    );
                }
            }
        }

        Commands::Capture {
            name,
            from,
            actor,
            world,
            outfit,
            shape,
            full,
            description,
        } => {
            let mut source =
                FolderSource::new(&from, config.storage.io_concurrency).with_world(world);
            for (kind, file) in [(AuxKind::Outfit, outfit), (AuxKind::Shape, shape)] {
                if let Some(file) = file {
                    let payload = tokio::fs::read_to_string(&file)
                        .await
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    source = source.with_aux(kind, payload);
                }
            }

            let mut providers = ProviderRegistry::new();
            providers.register(Arc::new(source));
            let session = Session::from_config(config, providers);

            let options = UpdateOptions {
                include_removals: full,
                description,
            };
            let outcome = session
                .capture(&name, &ActorIdentity::new(0, true, actor), &options)
                .await
                .with_context(|| format!("Failed to capture into {name:?}"))?;

            info!(
                snapshot = %name,
                new_version = outcome.new_version,
                file_map = ?outcome.file_map_id,
                history = ?outcome.appended,
                skipped = outcome.skipped.len(),
                "Capture complete"
            );
        }

        Commands::Resolve { name, version } => {
            let repo = library.open(&name).await?;
            let resolved = repo.resolve(version).await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }

        Commands::History { name, kind } => {
            let repo = library.open(&name).await?;
            let entries = repo.history(kind.into()).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }

        Commands::HistoryRm { name, kind, id } => {
            let repo = library.open(&name).await?;
            let removed = repo.delete_history(kind.into(), id).await?;
            info!(snapshot = %name, id = %removed.id, "History entry deleted");
        }

        Commands::HistoryRename {
            name,
            kind,
            id,
            description,
        } => {
            let repo = library.open(&name).await?;
            repo.rename_history(kind.into(), id, &description).await?;
            info!(snapshot = %name, %id, "History entry renamed");
        }

        Commands::Export {
            name,
            out,
            version,
            outfit,
            shape,
        } => {
            let request = ApplyRequest {
                file_map: version,
                outfit: parse_choice(&outfit)?,
                shape: parse_choice(&shape)?,
                lock_aux: false,
                unlock_aux: false,
            };

            let mut providers = ProviderRegistry::new();
            providers.register(Arc::new(FolderTarget::new(&out)));
            let mut session = Session::from_config(config, providers);

            session
                .apply(&name, &request, &ActorIdentity::new(0, true, "export"))
                .await
                .with_context(|| format!("Failed to export {name:?}"))?;
            info!(snapshot = %name, out = %out.display(), "Export complete");
        }

        Commands::Migrate => {
            let migrated = migrate_all(config).await?;
            info!(migrated, "Migration pass complete");
        }

        Commands::Audit { name } => {
            let repo = library.open(&name).await?;
            let missing = repo.audit().await?;
            println!("{}", serde_json::to_string_pretty(&missing)?);
            if !missing.is_empty() {
                bail!("{} referenced blob(s) missing from {name:?}", missing.len());
            }
        }
    }

    Ok(())
}

/// Migrate each snapshot directory under the library root, returning how
/// many were upgraded. Failures are moved aside and logged, not fatal.
async fn migrate_all(config: &AppConfig) -> Result<usize> {
    let root = PathBuf::from(&config.storage.root);
    let migrator = snapshot::LegacyMigrator::new(config.repository_settings());
    let mut migrated = 0;

    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).context("Failed to read library root"),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        match migrator.migrate(&entry.path()).await {
            Ok(MigrationOutcome::Migrated { files, skipped }) => {
                info!(dir = %entry.path().display(), files, skipped, "Migrated");
                migrated += 1;
            }
            Ok(_) => {}
            Err(e) => error!(dir = %entry.path().display(), error = %e, "Migration failed"),
        }
    }
    Ok(migrated)
}
