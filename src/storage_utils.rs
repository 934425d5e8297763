use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

// CONFIGURATION STRUCTS
// Every section falls back to its defaults, so a partial config.json is fine.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MarketConfig {
    pub base_url: String,  // e.g., "https://query1.finance.yahoo.com"
    pub timeout_secs: u64, // per request
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 700,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ImageHostConfig {
    pub upload_url: String,
    pub folder: Option<String>, // e.g., "/wick-charts"
    // ImageKit URL transformation applied to the delivered image, e.g. "f-png"
    pub delivery_transform: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ImageHostConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://upload.imagekit.io/api/v1/files/upload".to_string(),
            folder: None,
            delivery_transform: Some("f-png".to_string()),
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub model: String, // e.g., "gpt-4o"
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 500,
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    // Nested structs organize the config logically
    pub market: MarketConfig,
    pub chart: ChartConfig,
    pub image_host: ImageHostConfig,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Reads an explicit `--config` file. Nothing is created on the way.
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            anyhow::bail!("config file must be a .json file: {}", path.display());
        }
        let content = fs::read(path)
            .await
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

/// Secrets are never read from config.json, only from the environment.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub imagekit_private_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            openai_api_key: read("OPENAI_API_KEY"),
            imagekit_private_key: read("IMAGEKIT_PRIVATE_KEY"),
        }
    }
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Opens (and creates if needed) a storage directory at `base_dir`.
    pub async fn new<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// **Constructor: new_relative**
    /// Resolves the storage path relative to the running executable.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;

        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        Self::new(base_dir).await
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.base_dir.join(file_name)
    }

    /// **Generic Load Function**
    /// Reads `{filename}.json` and deserializes it into `T`.
    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));

        // serde_json validates UTF-8 itself, no need for read_to_string.
        let content = fs::read(path).await?;

        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Like `load`, but a missing file yields `T::default()`.
    pub async fn load_or_default<T: DeserializeOwned + Default>(
        &self,
        filename: &str,
    ) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));
        if !fs::try_exists(&path).await? {
            return Ok(T::default());
        }
        self.load(filename).await
    }

    /// **CSV Save Function**
    /// Serializes `rows` (header taken from the first row's field names) and
    /// writes them with the same atomic tmp + rename strategy as JSON saves.
    pub async fn save_csv<T, I>(&self, file_name: &str, rows: I) -> anyhow::Result<PathBuf>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let final_path = self.base_dir.join(file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in rows {
            writer.serialize(row)?;
        }
        let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;

        // The file handle lives only inside `write`, it is closed before the rename.
        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, &final_path).await?;

        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Row {
        #[serde(rename = "Date")]
        date: &'static str,
        #[serde(rename = "Value")]
        value: f64,
    }

    #[tokio::test]
    async fn missing_config_yields_defaults() {
        let dir = tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        let config: AppConfig = storage.load_or_default("config").await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.analysis.model, "gpt-4o");
        assert_eq!(config.analysis.max_tokens, 500);
        assert_eq!(config.analysis.timeout_secs, 30);
    }

    #[tokio::test]
    async fn partial_config_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{ "analysis": { "model": "gpt-4o-mini" }, "chart": { "width": 800 } }"#,
        )
        .unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        let config: AppConfig = storage.load_or_default("config").await.unwrap();
        assert_eq!(config.analysis.model, "gpt-4o-mini");
        assert_eq!(config.analysis.max_tokens, 500);
        assert_eq!(config.chart.width, 800);
        assert_eq!(config.chart.height, 700);
        assert_eq!(config.image_host, ImageHostConfig::default());
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        assert!(storage.load_or_default::<AppConfig>("config").await.is_err());
    }

    #[tokio::test]
    async fn explicit_config_file_is_read_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wick.json");
        std::fs::write(&path, r#"{ "analysis": { "max_tokens": 300 } }"#).unwrap();

        let config = AppConfig::from_file(&path).await.unwrap();
        assert_eq!(config.analysis.max_tokens, 300);
        assert_eq!(config.analysis.model, "gpt-4o");
    }

    #[tokio::test]
    async fn explicit_config_in_missing_directory_creates_nothing() {
        let dir = tempdir().unwrap();
        let missing_dir = dir.path().join("missing").join("dir");

        let err = AppConfig::from_file(&missing_dir.join("cfg.json")).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to read config"));
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn explicit_config_must_be_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        assert!(AppConfig::from_file(&path).await.is_err());
    }

    #[tokio::test]
    async fn new_creates_nested_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let storage = AsyncStorageManager::new(&nested).await.unwrap();
        assert!(storage.base_dir.is_dir());
    }

    #[tokio::test]
    async fn save_csv_writes_header_and_rows_without_leftovers() {
        let dir = tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        let rows = vec![
            Row { date: "2024-10-15", value: 1.5 },
            Row { date: "2024-10-16", value: 2.0 },
        ];
        let path = storage.save_csv("out.csv", rows).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Date,Value\n2024-10-15,1.5\n2024-10-16,2.0\n");
        assert!(!dir.path().join("out.csv.tmp").exists());
    }
}
