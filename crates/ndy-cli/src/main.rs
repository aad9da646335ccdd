use anyhow::Result;
use clap::{Parser, Subcommand};

use ndy_audit::{verify_hash_chain, VerifyResult};
use ndy_eligibility::NDYRA_SYSTEM_OF_RECORD;

mod commands;

use commands::evaluate::{run_booking, run_evaluate, BookingArgs, EvaluateArgs};

#[derive(Parser)]
#[command(name = "ndy")]
#[command(about = "Gym admission operator CLI", long_about = None)]
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
        /// Paths in merge order (base -> source -> site...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Evaluate check-in / booking readiness against a fixture file
    Evaluate {
        #[arg(long)]
        fixture: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        user: String,

        /// checkin | booking
        #[arg(long, default_value = "checkin")]
        operation: String,

        #[arg(long = "required-tokens")]
        required_tokens: Option<f64>,

        /// Evaluation instant (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,

        /// Append the decision to this JSONL audit log
        #[arg(long)]
        audit: Option<String>,

        /// system_of_record value treated as authoritative
        #[arg(long, default_value = NDYRA_SYSTEM_OF_RECORD)]
        marker: String,
    },

    /// Resolve booking paths for a class session against a fixture file
    Booking {
        #[arg(long)]
        fixture: String,

        #[arg(long)]
        session: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        audit: Option<String>,

        #[arg(long, default_value = NDYRA_SYSTEM_OF_RECORD)]
        marker: String,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a JSONL audit log. Exits non-zero when broken.
    Verify { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    // stdout carries results; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = ndy_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = ndy_db::status(&pool).await?;
                    println!("db_ok={} has_overrides_table={}", s.ok, s.has_overrides_table);
                }
                DbCmd::Migrate => {
                    ndy_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = ndy_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Evaluate {
            fixture,
            tenant,
            user,
            operation,
            required_tokens,
            at,
            audit,
            marker,
        } => {
            run_evaluate(EvaluateArgs {
                fixture,
                tenant,
                user,
                operation,
                required_tokens,
                at,
                audit,
                marker,
            })
            .await?;
        }

        Commands::Booking {
            fixture,
            session,
            user,
            at,
            audit,
            marker,
        } => {
            run_booking(BookingArgs {
                fixture,
                session,
                user,
                at,
                audit,
                marker,
            })
            .await?;
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match verify_hash_chain(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("audit_chain=valid lines={}", lines);
                }
                VerifyResult::Broken { line, reason } => {
                    println!("audit_chain=broken line={} reason={}", line, reason);
                    anyhow::bail!("audit chain broken at line {}: {}", line, reason);
                }
            },
        },
    }

    Ok(())
}
