use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod commands;

#[derive(Parser)]
#[command(name = "wms")]
#[command(about = "Warehouse fulfillment operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Exit non-zero when a config key is not consumed by any reader.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Stock ledger commands
    Inventory {
        #[command(subcommand)]
        cmd: InventoryCmd,
    },

    /// Stale-claim reaper
    Reaper {
        #[command(subcommand)]
        cmd: ReaperCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while orders are in PICKING unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with pickers on the floor.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum InventoryCmd {
    /// Book received stock into a bin (RECEIPT).
    Receive {
        #[arg(long)]
        sku: String,
        #[arg(long = "bin")]
        bin_location: String,
        #[arg(long)]
        qty: i64,
        #[arg(long)]
        actor: String,
        /// Receiving reference, e.g. a PO number
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Signed on-hand correction (ADJUSTMENT). A reason is mandatory.
    Adjust {
        #[arg(long)]
        sku: String,
        #[arg(long = "bin")]
        bin_location: String,
        #[arg(long, allow_hyphen_values = true)]
        delta: i64,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        reason: String,
    },

    /// Print live bin rows for one SKU.
    Show {
        #[arg(long)]
        sku: String,
    },

    /// Compare live balances against the transaction log. Exits non-zero on drift.
    Reconcile {
        /// Single SKU; every known SKU when omitted.
        #[arg(long)]
        sku: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReaperCmd {
    /// Release every PICKING claim idle for longer than the threshold, once.
    Sweep {
        /// Overrides /claims/stale_after_secs from the config layers.
        #[arg(long)]
        stale_after_secs: Option<i64>,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = wms_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = wms_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate { yes } => {
                    let n = wms_db::count_orders_in_picking(&pool).await?;
                    if n > 0 && !yes {
                        warn!(orders_in_picking = n, "migrate refused");
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} order(s) in PICKING. Re-run with: `wms db migrate --yes`",
                            n
                        );
                    }

                    wms_db::migrate(&pool).await?;
                    info!(orders_in_picking = n, "migrations applied");
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths, strict } => {
            commands::config::config_hash(&paths, strict)?;
        }

        Commands::Inventory { cmd } => {
            let pool = wms_db::connect_from_env().await?;
            match cmd {
                InventoryCmd::Receive {
                    sku,
                    bin_location,
                    qty,
                    actor,
                    reason,
                } => {
                    commands::inventory::receive(&pool, &sku, &bin_location, qty, &actor, &reason)
                        .await?
                }
                InventoryCmd::Adjust {
                    sku,
                    bin_location,
                    delta,
                    actor,
                    reason,
                } => {
                    commands::inventory::adjust(&pool, &sku, &bin_location, delta, &actor, &reason)
                        .await?
                }
                InventoryCmd::Show { sku } => commands::inventory::show(&pool, &sku).await?,
                InventoryCmd::Reconcile { sku } => {
                    commands::inventory::reconcile(&pool, sku.as_deref()).await?
                }
            }
        }

        Commands::Reaper { cmd } => match cmd {
            ReaperCmd::Sweep {
                stale_after_secs,
                config_paths,
            } => commands::reaper::sweep(stale_after_secs, &config_paths).await?,
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,wms_cli=info".into()),
        )
        .init();
}
