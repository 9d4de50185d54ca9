//! Client configuration loaded from environment variables.

use std::path::PathBuf;

use directories::UserDirs;
use tocka_broker::BrokerConfig;

/// Default number of uploads that may wait for the upload worker.
pub const DEFAULT_UPLOAD_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Local user; also the name of their message queue.
    /// Env: `TOCKA_USER`
    /// Default: empty (the binary prompts for it).
    pub username: String,

    /// Where received files are written.
    /// Env: `TOCKA_DOWNLOAD_DIR`
    /// Default: `<home>/chat/downloads`
    pub download_dir: PathBuf,

    /// Bound of the outbound upload queue.
    pub upload_queue_capacity: usize,

    pub broker: BrokerConfig,
}

impl ClientConfig {
    pub fn new(username: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            download_dir: download_dir.into(),
            upload_queue_capacity: DEFAULT_UPLOAD_QUEUE_CAPACITY,
            broker: BrokerConfig::default(),
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let username = std::env::var("TOCKA_USER")
            .map(|u| u.trim().to_string())
            .unwrap_or_default();

        let download_dir = std::env::var("TOCKA_DOWNLOAD_DIR")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_download_dir);

        Self {
            username,
            download_dir,
            upload_queue_capacity: DEFAULT_UPLOAD_QUEUE_CAPACITY,
            broker: BrokerConfig::from_env(),
        }
    }
}

/// `<home>/chat/downloads`, or a relative `chat/downloads` when no home
/// directory can be determined.
pub fn default_download_dir() -> PathBuf {
    UserDirs::new()
        .map(|dirs| dirs.home_dir().join("chat").join("downloads"))
        .unwrap_or_else(|| PathBuf::from("chat").join("downloads"))
}
