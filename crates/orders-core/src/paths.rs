use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ORDERS_DIR: &str = ".orders";
pub const CONFIG_FILE: &str = ".orders/config.yaml";
pub const DEFAULT_DB_FILE: &str = "orders.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn orders_dir(root: &Path) -> PathBuf {
    root.join(ORDERS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured database path: absolute paths are used as-is,
/// relative ones live under `.orders/`.
pub fn db_path(root: &Path, configured: &str) -> PathBuf {
    let p = Path::new(configured);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        orders_dir(root).join(p)
    }
}
