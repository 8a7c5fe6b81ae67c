//! On-disk layout of a node setup.
//!
//! ```text
//! <home>/.syntropy/
//!   config/manager.yaml
//!   keys/owner.key        (0600)
//!   keys/owner.key.pub
//!   logs/ cache/ backups/ (0755)
//! ```

use crate::setup_config::{DefaultPaths, Directories};
use std::path::{Path, PathBuf};

pub const SYNTROPY_DIR: &str = ".syntropy";
pub const MANAGER_CONFIG_FILE: &str = "manager.yaml";
pub const OWNER_KEY_FILE: &str = "owner.key";
pub const OWNER_PUB_FILE: &str = "owner.key.pub";
pub const DATABASE_FILE: &str = "manager.db";

/// Every path a setup touches, derived from one user home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupLayout {
    pub user_home: PathBuf,
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub keys_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub manager_config: PathBuf,
    pub owner_key: PathBuf,
    pub owner_pub: PathBuf,
    pub database: PathBuf,
}

impl SetupLayout {
    pub fn under(user_home: impl AsRef<Path>) -> Self {
        let user_home = user_home.as_ref().to_path_buf();
        let root = user_home.join(SYNTROPY_DIR);
        let config_dir = root.join("config");
        let keys_dir = root.join("keys");
        let cache_dir = root.join("cache");
        Self {
            manager_config: config_dir.join(MANAGER_CONFIG_FILE),
            owner_key: keys_dir.join(OWNER_KEY_FILE),
            owner_pub: keys_dir.join(OWNER_PUB_FILE),
            database: cache_dir.join(DATABASE_FILE),
            logs_dir: root.join("logs"),
            backups_dir: root.join("backups"),
            user_home,
            root,
            config_dir,
            keys_dir,
            cache_dir,
        }
    }

    pub fn directories(&self) -> Directories {
        Directories {
            config: display(&self.config_dir),
            keys: display(&self.keys_dir),
            logs: display(&self.logs_dir),
            cache: display(&self.cache_dir),
            backups: display(&self.backups_dir),
        }
    }

    pub fn default_paths(&self) -> DefaultPaths {
        DefaultPaths {
            manager_config: display(&self.manager_config),
            owner_key: display(&self.owner_key),
            owner_pub: display(&self.owner_pub),
        }
    }

    /// Whether a prior setup exists (manager config present)
    pub fn is_installed(&self) -> bool {
        self.manager_config.is_file()
    }
}

pub fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Whether `child` lies strictly below `parent` (component-wise)
pub fn is_strictly_under(child: &Path, parent: &Path) -> bool {
    child != parent && child.starts_with(parent)
}
