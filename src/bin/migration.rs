use order_reconciler::{config, db, migrator::Migrator};
use sea_orm_migration::MigratorTrait;
use tracing::{error, info};

/// `migrate [up|down|status]`; defaults to `up`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    if cfg.uses_memory_store() {
        info!("in-process order store configured; nothing to migrate");
        return Ok(());
    }

    let pool = db::establish_connection_from_app_config(&cfg).await?;
    db::check_connection(&pool).await?;

    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());
    match command.as_str() {
        "up" => db::run_migrations(&pool).await?,
        "down" => {
            info!("Rolling back the latest migration");
            Migrator::down(&pool, Some(1)).await?;
        }
        "status" => Migrator::status(&pool).await?,
        other => {
            error!(command = other, "unknown migration command");
            return Err(format!("unknown command '{}': expected up, down or status", other).into());
        }
    }

    info!(command = %command, "migration command finished");
    Ok(())
}
