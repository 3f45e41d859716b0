use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::notification::{LogNotifier, Notifier};
use crate::records::client::HttpRecordStore;
use crate::records::RecordStore;
use crate::services::Services;
use crate::types::{Config, TableNames};

/// Environment variable that overrides `apiKey` from config.json.
pub const API_KEY_ENV: &str = "PIPELINECRM_API_KEY";

/// Application state shared by the CLI commands
pub struct AppState {
    pub config: Mutex<Option<Config>>,
    pub services: Services,
    /// True when running against the in-memory demo store
    pub demo: bool,
}

impl AppState {
    /// Build state from ~/.pipelinecrm/config.json, or from demo data.
    pub fn new(demo: bool) -> Result<Self, String> {
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        if demo {
            let tables = TableNames::default();
            let store = crate::devtools::demo_store(&tables)?;
            return Ok(Self::with_store(Arc::new(store), notifier, None, &tables, true));
        }

        let config = load_config()?;
        let store = HttpRecordStore::new(&config).map_err(|e| e.to_string())?;
        log::info!(
            "Using record store at {} (project {})",
            config.api_base_url,
            config.project_id
        );
        let tables = config.tables.clone();
        Ok(Self::with_store(
            Arc::new(store),
            notifier,
            Some(config),
            &tables,
            false,
        ))
    }

    pub fn with_store(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        config: Option<Config>,
        tables: &TableNames,
        demo: bool,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            services: Services::new(store, notifier, tables),
            demo,
        }
    }
}

/// Get the canonical config file path (~/.pipelinecrm/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".pipelinecrm").join("config.json"))
}

/// Load configuration from ~/.pipelinecrm/config.json
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;
    let mut config = load_config_from(&path)?;
    apply_env_overrides(&mut config, std::env::var(API_KEY_ENV).ok());
    Ok(config)
}

pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"apiBaseUrl\": \"https://records.example.com/v1\", \"projectId\": \"crm\" }}",
            path.display()
        ));
    }

    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    validate_config(&config)?;
    Ok(config)
}

/// A non-empty key from the environment wins over the file.
pub fn apply_env_overrides(config: &mut Config, env_key: Option<String>) {
    if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
        log::debug!("Using API key from {}", API_KEY_ENV);
        config.api_key = Some(key);
    }
}

pub fn validate_config(config: &Config) -> Result<(), String> {
    let url = Url::parse(&config.api_base_url)
        .map_err(|e| format!("Invalid apiBaseUrl {:?}: {}", config.api_base_url, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "apiBaseUrl must be http or https, got {}",
            url.scheme()
        ));
    }
    if config.project_id.trim().is_empty() {
        return Err("projectId must not be empty".to_string());
    }
    if config.request_timeout_secs == 0 {
        return Err("requestTimeoutSecs must be at least 1".to_string());
    }
    Ok(())
}

/// Write config to `path` via a sibling temp file and a rename.
fn write_config_to(path: &Path, config: &Config) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|e| format!("Failed to write config: {}", e))?;
    fs::rename(&tmp, path).map_err(|e| format!("Failed to replace config: {}", e))?;
    Ok(())
}

/// Create or update config.json atomically.
///
/// Starts from the in-memory config (or serde defaults on first run), applies
/// the mutator, validates, writes, and updates in-memory state.
pub fn create_or_update_config(
    state: &AppState,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    let path = config_path()?;
    create_or_update_config_at(state, &path, mutator)
}

pub fn create_or_update_config_at(
    state: &AppState,
    path: &Path,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    let mut guard = state.config.lock().map_err(|_| "Lock poisoned")?;

    let mut config = match guard.clone() {
        Some(c) => c,
        None => Config {
            api_base_url: String::new(),
            project_id: String::new(),
            api_key: None,
            request_timeout_secs: 30,
            tables: TableNames::default(),
        },
    };

    mutator(&mut config);
    validate_config(&config)?;
    write_config_to(path, &config)?;

    *guard = Some(config.clone());
    Ok(config)
}

/// Reload configuration from disk
pub fn reload_config(state: &AppState) -> Result<Config, String> {
    let config = load_config()?;
    let mut guard = state.config.lock().map_err(|_| "Lock poisoned")?;
    *guard = Some(config.clone());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::QueuedNotifier;
    use crate::records::memory::MemoryRecordStore;

    fn memory_state() -> AppState {
        AppState::with_store(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(QueuedNotifier::new()),
            None,
            &TableNames::default(),
            false,
        )
    }

    #[test]
    fn test_config_path_location() {
        let path = config_path().unwrap();
        assert!(path.ends_with(".pipelinecrm/config.json"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "apiBaseUrl": "https://records.example.com/v1", "projectId": "crm", "tables": { "deals": "opportunity_c" } }"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.project_id, "crm");
        assert_eq!(config.tables.deals, "opportunity_c");
        assert_eq!(config.tables.contacts, "contact_c");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_missing_and_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(load_config_from(&path).unwrap_err().contains("Config file not found"));

        fs::write(&path, r#"{ "apiBaseUrl": "records.example.com", "projectId": "crm" }"#).unwrap();
        assert!(load_config_from(&path).unwrap_err().contains("Invalid apiBaseUrl"));

        fs::write(&path, "{ not json").unwrap();
        assert!(load_config_from(&path).unwrap_err().starts_with("Failed to parse config"));
    }

    #[test]
    fn test_env_key_overrides_file() {
        let mut config: Config = serde_json::from_str(
            r#"{ "apiBaseUrl": "https://records.example.com", "projectId": "crm", "apiKey": "from-file" }"#,
        )
        .unwrap();

        apply_env_overrides(&mut config, Some("  ".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));

        apply_env_overrides(&mut config, Some("from-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_create_or_update_config_writes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let state = memory_state();

        let err = create_or_update_config_at(&state, &path, |_| {}).unwrap_err();
        assert!(err.contains("apiBaseUrl"));
        assert!(!path.exists());

        create_or_update_config_at(&state, &path, |c| {
            c.api_base_url = "https://records.example.com/v1".to_string();
            c.project_id = "crm".to_string();
        })
        .unwrap();
        let updated = create_or_update_config_at(&state, &path, |c| c.request_timeout_secs = 10).unwrap();

        assert_eq!(updated.project_id, "crm");
        let on_disk = load_config_from(&path).unwrap();
        assert_eq!(on_disk.request_timeout_secs, 10);
        assert_eq!(
            state.config.lock().unwrap().as_ref().map(|c| c.request_timeout_secs),
            Some(10)
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_demo_state_has_data() {
        let state = AppState::new(true).unwrap();
        assert!(state.demo);
        assert_eq!(state.services.contacts.get_all().await.len(), 4);
        assert!(state.config.lock().unwrap().is_none());
    }
}
