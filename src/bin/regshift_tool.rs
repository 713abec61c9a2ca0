use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use regshift::core::parse_instant;
use regshift::lock::new_owner_id;
use regshift::{
    InMemoryStore, LockScope, MigrationConfig, MigrationRegistry, PremiumList, PrimaryStore,
    ReservedList, SnapshotManager, SystemClock, TransitionId,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "regshift-tool")]
#[command(about = "Operator tooling for the store migration: schedules, list comparison and locks")]
struct Cli {
    /// Directory holding the two store snapshots
    #[arg(long, default_value = ".regshift")]
    state_dir: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListKind {
    Reserved,
    Premium,
    Revocation,
}

#[derive(Subcommand)]
enum Command {
    /// Print the transition schedule of each id
    GetSchedule {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Append one transition to a schedule
    UpdateSchedule {
        #[arg(long)]
        id: String,
        #[arg(long)]
        start_time: String,
        #[arg(long)]
        store: String,
    },
    /// Replace a schedule with a full `timestamp=store,...` list
    SetSchedule {
        #[arg(long)]
        id: String,
        #[arg(long)]
        transitions: String,
    },
    /// Save a reserved list from a `label,RESERVATION_TYPE` file
    SaveReservedList {
        #[arg(long)]
        name: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        should_publish: bool,
    },
    /// Load the latest revision of a reserved list from the primary store
    GetReservedList {
        #[arg(long)]
        name: String,
    },
    /// Save a premium list from a `label,CUR amount` file
    SavePremiumList {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        input: PathBuf,
    },
    /// Load the latest revision of a premium list from the primary store
    GetPremiumList {
        #[arg(long)]
        name: String,
    },
    /// Report lists that differ between the two stores
    CompareLists {
        #[arg(long, value_enum)]
        kind: ListKind,
    },
    AcquireLock {
        #[arg(long)]
        resource: String,
        #[arg(long, default_value = "GLOBAL")]
        scope: String,
        #[arg(long)]
        owner: Option<String>,
        /// Lease in seconds; defaults to the configured lease
        #[arg(long)]
        lease_secs: Option<u64>,
    },
    ReleaseLock {
        #[arg(long)]
        resource: String,
        #[arg(long, default_value = "GLOBAL")]
        scope: String,
        #[arg(long)]
        owner: String,
    },
}

struct State {
    dir: PathBuf,
    store_a: Arc<InMemoryStore>,
    store_b: Arc<InMemoryStore>,
}

impl State {
    fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory '{}'", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            store_a: Arc::new(load_store(&dir.join("store_a.snap"), "store_a")?),
            store_b: Arc::new(load_store(&dir.join("store_b.snap"), "store_b")?),
        })
    }

    async fn persist(&self) -> Result<()> {
        SnapshotManager::new(self.dir.join("store_a.snap"))
            .save(&self.store_a.snapshot().await)
            .context("Failed to save StoreA snapshot")?;
        SnapshotManager::new(self.dir.join("store_b.snap"))
            .save(&self.store_b.snapshot().await)
            .context("Failed to save StoreB snapshot")?;
        Ok(())
    }
}

fn load_store(path: &Path, name: &str) -> Result<InMemoryStore> {
    let snapshot = SnapshotManager::new(path)
        .load()
        .with_context(|| format!("Failed to load snapshot '{}'", path.display()))?;
    Ok(match snapshot {
        Some(snapshot) => InMemoryStore::from_snapshot(snapshot),
        None => InMemoryStore::new(name),
    })
}

fn load_config(path: Option<&Path>) -> Result<MigrationConfig> {
    match path {
        Some(path) => MigrationConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration '{}'", path.display())),
        None => Ok(MigrationConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let state = State::open(&cli.state_dir)?;
    let registry = MigrationRegistry::new(
        state.store_a.clone(),
        state.store_b.clone(),
        config,
        Arc::new(SystemClock),
    )?;

    let changed = run(&registry, cli.command).await?;
    if changed {
        state.persist().await?;
    }
    Ok(())
}

/// Execute one command; returns whether either store was written.
async fn run(registry: &MigrationRegistry, command: Command) -> Result<bool> {
    match command {
        Command::GetSchedule { ids } => {
            let commands = registry.schedule_commands();
            for id in ids {
                let id: TransitionId = id.parse()?;
                println!("{}", commands.get(id).await?);
            }
            Ok(false)
        }
        Command::UpdateSchedule { id, start_time, store } => {
            let change = registry
                .schedule_commands()
                .append(
                    id.parse()?,
                    parse_instant(&start_time)?,
                    store.parse::<PrimaryStore>()?,
                )
                .await?;
            println!("{}", change);
            Ok(true)
        }
        Command::SetSchedule { id, transitions } => {
            let change = registry
                .schedule_commands()
                .update(id.parse()?, &transitions)
                .await?;
            println!("{}", change);
            Ok(true)
        }
        Command::SaveReservedList {
            name,
            input,
            should_publish,
        } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read reserved list '{}'", input.display()))?;
            let list = ReservedList::parse(&name, registry.clock().now(), should_publish, &text)?;
            let shadow = registry.save_reserved_list(&list).await?;
            println!(
                "Saved ReservedList '{}' with {} entries ({:?})",
                name,
                list.len(),
                shadow
            );
            Ok(true)
        }
        Command::GetReservedList { name } => {
            let loaded = registry.latest_reserved_list(&name).await?;
            for entry in loaded.value.iter_entries() {
                println!("{},{}", entry.label, entry);
            }
            println!("Verification: {:?}", loaded.verification);
            Ok(false)
        }
        Command::SavePremiumList {
            name,
            currency,
            input,
        } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read premium list '{}'", input.display()))?;
            let list = PremiumList::parse(&name, registry.clock().now(), &currency, &text)?;
            let shadow = registry.save_premium_list(&list).await?;
            println!(
                "Saved PremiumList '{}' with {} entries ({:?})",
                name,
                list.len(),
                shadow
            );
            Ok(true)
        }
        Command::GetPremiumList { name } => {
            let loaded = registry.latest_premium_list(&name).await?;
            for (label, price) in loaded.value.iter_prices() {
                println!("{},{}", label, price);
            }
            println!("Verification: {:?}", loaded.verification);
            Ok(false)
        }
        Command::CompareLists { kind } => {
            let report = match kind {
                ListKind::Reserved => registry.compare_reserved_lists().await?,
                ListKind::Premium => registry.compare_premium_lists().await?,
                ListKind::Revocation => registry.compare_revocation_lists().await?,
            };
            println!("{}", report);
            Ok(false)
        }
        Command::AcquireLock {
            resource,
            scope,
            owner,
            lease_secs,
        } => {
            let scope: LockScope = scope.parse()?;
            let owner = owner.unwrap_or_else(new_owner_id);
            let lock = match lease_secs {
                Some(secs) => {
                    let lease = i64::try_from(secs)
                        .ok()
                        .and_then(chrono::Duration::try_seconds)
                        .ok_or_else(|| anyhow!("lease of {} seconds is too long", secs))?;
                    registry
                        .locks()
                        .acquire(&resource, scope, &owner, lease, registry.clock().now())
                        .await?
                }
                None => registry.acquire_lock(&resource, scope, &owner).await?,
            };
            println!(
                "Acquired lock '{}' ({}) for owner '{}' until {}",
                lock.resource_name, lock.scope, lock.owner_id, lock.expiration_time
            );
            Ok(true)
        }
        Command::ReleaseLock { resource, scope, owner } => {
            let scope: LockScope = scope.parse()?;
            let lock = registry
                .locks()
                .load(&resource, &scope)
                .await?
                .ok_or_else(|| anyhow!("Lock '{}' ({}) is not held", resource, scope))?;
            if lock.owner_id != owner {
                return Err(anyhow!(
                    "Lock '{}' ({}) is held by '{}', not '{}'",
                    resource,
                    scope,
                    lock.owner_id,
                    owner
                ));
            }
            registry.locks().release(&lock).await?;
            println!("Released lock '{}' ({})", resource, scope);
            Ok(true)
        }
    }
}
