use anyhow::Context;
use orders_core::{
    config::{Config, StoreBackend},
    paths,
    store::RedbStore,
};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing standing orders in: {}", root.display());

    let dir = paths::orders_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if !paths::config_path(root).exists() {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let config = Config::load(root).context("failed to load config")?;
    if config.store.backend == StoreBackend::Redb {
        let db = config.db_path(root);
        let existed = db.exists();
        RedbStore::open(&db).with_context(|| format!("failed to open {}", db.display()))?;
        let label = if existed { "exists: " } else { "created:" };
        println!("  {label} {}", db.display());
    }

    println!("\nReady.");
    println!("Next: orders create --owner <you> --name \"...\" --frequency daily --time 09:00 --actions '[{{\"type\":\"notification\"}}]'");
    Ok(())
}
