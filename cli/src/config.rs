use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use hearth_core::auth::hash_pin;

pub const PIN_HASH_ENV: &str = "FAMILY_PIN_HASH";
pub const DB_PATH_ENV: &str = "HEARTHBOARD_DB";

const PIN_HASH_FILE: &str = "pin_hash";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("", "", "hearthboard")
            .context("Could not determine home directory")?;

        let mut config = Self::from_dir(proj_dirs.data_dir())?;
        if let Some(db) = std::env::var_os(DB_PATH_ENV).filter(|v| !v.is_empty()) {
            config.db_path = PathBuf::from(db);
        }
        Ok(config)
    }

    /// Config rooted at an explicit data directory, created if missing.
    pub fn from_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("hearthboard.db"),
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn pin_hash_path(&self) -> PathBuf {
        self.data_dir.join(PIN_HASH_FILE)
    }

    /// Reference PIN hash: `FAMILY_PIN_HASH` wins over the stored file.
    pub fn pin_hash(&self) -> Result<Option<String>> {
        let from_env = std::env::var(PIN_HASH_ENV).ok();
        self.pin_hash_with(from_env)
    }

    fn pin_hash_with(&self, from_env: Option<String>) -> Result<Option<String>> {
        if let Some(hash) = from_env.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()) {
            return Ok(Some(hash));
        }

        let path = self.pin_hash_path();
        if !path.exists() {
            return Ok(None);
        }
        let hash = std::fs::read_to_string(&path).context("Failed to read PIN hash file")?;
        let hash = hash.trim().to_string();
        Ok((!hash.is_empty()).then_some(hash))
    }

    /// Hashes the PIN and writes it to the data directory, readable only by
    /// the owner. Returns the stored hash.
    pub fn store_pin(&self, pin: &str) -> Result<String> {
        let path = self.pin_hash_path();
        let hash = hash_pin(pin);
        std::fs::write(&path, &hash).context("Failed to write PIN hash file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set PIN hash file permissions")?;
        }
        Ok(hash)
    }
}
