//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `daokit_core` linkage and run one in-memory persist/flush/
//!   safe-persist round through the entity manager.
//! - Keep output deterministic for quick local sanity checks.

use daokit_core::{
    ClassMetadata, Configuration, ConnectionParams, EmResult, EntityManager, EntityRecord,
    StaticMappingDriver,
};
use log::info;
use std::process::ExitCode;

const LOG_DIR_ENV: &str = "DAOKIT_LOG_DIR";

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        if let Err(err) = daokit_core::init_logging(daokit_core::default_log_level(), &log_dir) {
            eprintln!("daokit_cli logging disabled: {err}");
        }
    }

    println!("daokit_core version={}", daokit_core::core_version());
    match smoke() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("daokit_cli smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn smoke() -> EmResult<()> {
    let driver = StaticMappingDriver::new()
        .register(ClassMetadata::new("demo::User").with_unique_key("email", ["email"]))
        .map_err(|err| daokit_core::EntityManagerError::InvalidConfiguration(err.to_string()))?;
    let manager = EntityManager::create(
        ConnectionParams::default(),
        Configuration::new().with_metadata_driver(driver),
        None,
    )?;

    let ada = EntityRecord::new("demo::User").with_field("email", "ada@example.com");
    manager.persist(&ada)?.flush(None)?;

    let rival = EntityRecord::new("demo::User").with_field("email", "ada@example.com");
    let outcome = manager.safe_persist(&rival)?;
    let users = manager.get_repository("demo::User")?;

    println!("daokit_core safe_persist inserted={}", outcome.was_inserted());
    println!("daokit_core users={}", users.find_all()?.len());
    info!("event=cli_smoke module=cli status=ok");
    Ok(())
}
