use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("campus_portal".to_string())
}

fn default_port() -> u16 {
    env::var("PORT")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(5000)
}

fn default_token_lifetime_hours() -> i64 {
    48
}

fn default_bcrypt_cost() -> u32 {
    10
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_media_base_url() -> String {
    env::var("CLOUDINARY_BASE_URL").unwrap_or("https://api.cloudinary.com".to_string())
}

fn env_or_empty(key: &str) -> String {
    env::var(key).unwrap_or_default()
}

fn default_media_api_key() -> String {
    env_or_empty("CLOUDINARY_API_KEY")
}

fn default_media_api_secret() -> String {
    env_or_empty("CLOUDINARY_API_SECRET")
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub cloud_name: String,
    #[serde(default = "default_media_api_key", skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_media_api_secret", skip_serializing)]
    pub api_secret: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            base_url: default_media_base_url(),
            cloud_name: env_or_empty("CLOUDINARY_CLOUD_NAME"),
            api_key: default_media_api_key(),
            api_secret: default_media_api_secret(),
        }
    }
}

impl std::fmt::Debug for MediaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaConfig")
            .field("base_url", &self.base_url)
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl MediaConfig {
    pub fn is_configured(&self) -> bool {
        !self.cloud_name.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    // Credentials come from the environment and are never written back.
    #[serde(default = "default_mongodb_uri", skip_serializing)]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_token_lifetime_hours")]
    pub token_lifetime_hours: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    #[serde(default)]
    pub media: MediaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            port: default_port(),
            token_lifetime_hours: default_token_lifetime_hours(),
            bcrypt_cost: default_bcrypt_cost(),
            max_upload_bytes: default_max_upload_bytes(),
            media: MediaConfig::default(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_lifetime_hours)
    }
}
