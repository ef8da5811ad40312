use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use sqldb_middleware::{
    Database, DatabaseType, DbOptions, SqlDbError, SqlDirectory, SqliteDriver, SqliteOptions,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Apply and inspect SQL migrations")]
struct Args {
    #[arg(long, value_enum, default_value = "sqlite")]
    driver: DatabaseType,
    /// Database file
    #[arg(long)]
    db: PathBuf,
    /// Directory of `*.sql` migration files
    #[arg(long, default_value = "migrations")]
    dir: PathBuf,
    /// Bookkeeping table
    #[arg(long, default_value = "migrations")]
    table: String,
    #[arg(long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Apply pending migrations
    Migrate,
    /// List pending migrations without applying them
    Status,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if let Err(err) = run(args).await {
        eprintln!("sqldb: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), SqlDbError> {
    let driver = match args.driver {
        DatabaseType::Sqlite => SqliteDriver::new(SqliteOptions::new(args.db.to_string_lossy())),
    };
    let source = SqlDirectory::new(&args.dir);
    let mut db = Database::open(driver, DbOptions::new().migrations_table(&args.table)).await?;

    let outcome = match args.command {
        Command::Migrate => migrate(&db, &source).await,
        Command::Status => status(&db, &source).await,
    };
    db.shutdown().await?;
    outcome
}

async fn migrate(db: &Database<SqliteDriver>, source: &SqlDirectory) -> Result<(), SqlDbError> {
    let report = db.run_migrations_from(source).await?;
    for name in &report.applied {
        println!("applied  {name}");
    }
    match report.failed {
        Some(failed) => {
            for name in &report.skipped {
                println!("skipped  {name}");
            }
            Err(SqlDbError::MigrationError(format!(
                "{} failed: {}",
                failed.name, failed.error
            )))
        }
        None => Ok(()),
    }
}

async fn status(db: &Database<SqliteDriver>, source: &SqlDirectory) -> Result<(), SqlDbError> {
    let pending = db.pending_migrations(source).await?;
    if pending.is_empty() {
        println!("up to date");
    }
    for name in pending {
        println!("pending  {name}");
    }
    Ok(())
}
