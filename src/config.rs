use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub superuser: SuperuserConfig,

    pub generator: GeneratorConfig,

    pub uploads: UploadConfig,

    pub optimisation: OptimisationConfig,

    pub shortening: ShorteningConfig,

    pub messaging: MessagingConfig,

    pub webhooks: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads. 0 uses the number of CPU cores.
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/hoard.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    /// Base URL used when building public links (upload URLs, short links).
    pub public_url: String,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            public_url: "http://localhost:5000".to_string(),
            cors_allowed_origins: vec!["http://localhost:5000".to_string()],
        }
    }
}

/// The singleton admin account seeded at boot. Never written to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperuserConfig {
    pub username: String,

    pub password: String,

    pub display_name: String,

    pub api_token: String,
}

impl Default for SuperuserConfig {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: "please-change-me".to_string(),
            display_name: "Root".to_string(),
            api_token: "hoard_default_master_token".to_string(),
        }
    }
}

/// Lengths for generated identifiers. Longer keys shrink the collision
/// retry rate as the collections grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub file_key: usize,

    pub url_key: usize,

    pub token: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            file_key: 6,
            url_key: 5,
            token: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub uploads_path: String,

    pub archive_path: String,

    /// When enabled, deletion moves files to the archive instead of
    /// removing them, and admins can restore them until the purge runs.
    pub archive_enabled: bool,

    /// Days an archived file survives before the purge job removes it.
    pub archive_retention_days: u32,

    /// Cron expression for the archive purge job.
    pub archive_purge_cron: String,

    pub max_file_size_mb: u64,

    /// Maps a file extension to its served type (image, text, code, ...).
    /// Extensions absent from this map are rejected at upload.
    pub allowed_extensions: HashMap<String, String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let mut allowed = HashMap::new();
        for ext in ["png", "jpg", "jpeg", "gif", "webp"] {
            allowed.insert(ext.to_string(), "image".to_string());
        }
        for ext in ["py", "js", "ts", "go", "rs", "cpp", "html", "css"] {
            allowed.insert(ext.to_string(), "code".to_string());
        }
        allowed.insert("txt".to_string(), "text".to_string());
        allowed.insert("md".to_string(), "markdown".to_string());
        allowed.insert("mp4".to_string(), "video".to_string());
        allowed.insert("webm".to_string(), "video".to_string());
        allowed.insert("mp3".to_string(), "audio".to_string());
        allowed.insert("wav".to_string(), "audio".to_string());

        Self {
            uploads_path: "data/uploads".to_string(),
            archive_path: "data/archive".to_string(),
            archive_enabled: true,
            archive_retention_days: 1,
            archive_purge_cron: "0 0 0 * * *".to_string(),
            max_file_size_mb: 32,
            allowed_extensions: allowed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimisationConfig {
    /// Re-encode images after upload to shave bytes. Best-effort only.
    pub compress: bool,

    /// JPEG quality used for the re-encode pass (1-100).
    pub quality: u8,

    /// Whether admins may skip the pass with the Compression-Bypass header.
    pub admin_can_bypass: bool,

    /// Whether admins skip the pass even without the header.
    pub admin_bypass_by_default: bool,
}

impl Default for OptimisationConfig {
    fn default() -> Self {
        Self {
            compress: true,
            quality: 80,
            admin_can_bypass: true,
            admin_bypass_by_default: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShorteningConfig {
    /// Restrict custom short keys (URL-Name header) to admins.
    pub custom_keys_admin_only: bool,
}

impl Default for ShorteningConfig {
    fn default() -> Self {
        Self {
            custom_keys_admin_only: true,
        }
    }
}

/// Templates for system messages delivered to users' inboxes.
/// Events without a template are silently skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub before: String,

    pub after: String,

    pub events: HashMap<String, String>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        let mut events = HashMap::new();
        events.insert(
            "FORCE_FILE_DELETE".to_string(),
            "An admin removed your file {key}.".to_string(),
        );
        events.insert(
            "FORCE_USER_EDIT".to_string(),
            "An admin updated your account details.".to_string(),
        );
        events.insert(
            "FORCE_USER_TOKEN_RESET".to_string(),
            "An admin reset your API token.".to_string(),
        );

        Self {
            before: String::new(),
            after: String::new(),
            events,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,

    pub hooks: Vec<WebhookEntry>,

    /// Per-event message templates; placeholders come from the event fields.
    pub messages: HashMap<String, String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hooks: Vec::new(),
            messages: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntry {
    pub url: String,

    pub username: String,

    /// Event names this hook subscribes to.
    pub events: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("hoard").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".hoard").join("config.toml"));
        }

        paths
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = PathBuf::from("config.toml");
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.superuser.username.is_empty() {
            anyhow::bail!("Superuser username cannot be empty");
        }

        if self.superuser.api_token.is_empty() {
            anyhow::bail!("Superuser API token cannot be empty");
        }

        if self.generator.file_key == 0 || self.generator.url_key == 0 || self.generator.token == 0
        {
            anyhow::bail!("Generator lengths must be greater than zero");
        }

        if self.uploads.allowed_extensions.is_empty() {
            anyhow::bail!("At least one upload extension must be allowed");
        }

        if !(1..=100).contains(&self.optimisation.quality) {
            anyhow::bail!("Optimisation quality must be between 1 and 100");
        }

        Ok(())
    }

    /// Served type for a filename, or None when the extension is not allowed.
    #[must_use]
    pub fn filetype(&self, filename: &str) -> Option<&str> {
        let ext = file_extension(filename)?;
        self.uploads
            .allowed_extensions
            .get(&ext)
            .map(String::as_str)
    }
}

/// Lowercased extension of a filename, if it has one.
#[must_use]
pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("photo.PNG"), Some("png".to_string()));
        assert_eq!(file_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(file_extension("no_extension"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn test_filetype_lookup() {
        let config = Config::default();
        assert_eq!(config.filetype("cat.jpg"), Some("image"));
        assert_eq!(config.filetype("notes.md"), Some("markdown"));
        assert_eq!(config.filetype("evil.exe"), None);
        assert_eq!(config.filetype("noext"), None);
    }

    #[test]
    fn test_default_config_validates() {
        Config::default().validate().expect("defaults should pass");
    }

    #[test]
    fn test_validate_rejects_zero_length_generator() {
        let mut config = Config::default();
        config.generator.token = 0;
        assert!(config.validate().is_err());
    }
}
