use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DataForgeError, Result};

const DEFAULT_CONFIG_PATH: &str = "dataforge.toml";
const ENV_PREFIX: &str = "DATAFORGE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub export_dir: PathBuf,
    /// Defaults to `<export_dir>/state_manual`.
    pub state_manual_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub opencorp_api_key: Option<String>,
    pub sam_api_key: Option<String>,
    /// Pull healthcare organizations from the NPPES monthly file.
    pub include_nppes: bool,
    /// Pull grant opportunities from grants.gov alongside SAM.gov.
    pub include_grants: bool,
    pub enable_geocoder_default: bool,
    pub cors_allow_origins: Vec<String>,
    pub environment: String,
    pub server_port: u16,
    pub preview_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("./exports"),
            state_manual_dir: None,
            log_dir: PathBuf::from("logs"),
            opencorp_api_key: None,
            sam_api_key: None,
            include_nppes: false,
            include_grants: false,
            enable_geocoder_default: false,
            cors_allow_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            server_port: 8000,
            preview_capacity: 500,
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file (explicit path, or `dataforge.toml` if
    /// present), then `DATAFORGE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        settings.apply_overrides(|key| env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DataForgeError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply overrides from a key lookup (upper-case field names).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EXPORT_DIR") {
            self.export_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("STATE_MANUAL_DIR") {
            self.state_manual_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OPENCORP_API_KEY") {
            self.opencorp_api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("SAM_API_KEY") {
            self.sam_api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("INCLUDE_NPPES") {
            self.include_nppes = parse_flag("INCLUDE_NPPES", &v)?;
        }
        if let Some(v) = lookup("INCLUDE_GRANTS") {
            self.include_grants = parse_flag("INCLUDE_GRANTS", &v)?;
        }
        if let Some(v) = lookup("ENABLE_GEOCODER_DEFAULT") {
            self.enable_geocoder_default = parse_flag("ENABLE_GEOCODER_DEFAULT", &v)?;
        }
        if let Some(v) = lookup("CORS_ALLOW_ORIGINS") {
            self.cors_allow_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("ENVIRONMENT") {
            self.environment = v;
        }
        if let Some(v) = lookup("SERVER_PORT") {
            self.server_port = v
                .parse()
                .map_err(|_| DataForgeError::Config(format!("SERVER_PORT is not a port: {v}")))?;
        }
        if let Some(v) = lookup("PREVIEW_CAPACITY") {
            self.preview_capacity = v.parse().map_err(|_| {
                DataForgeError::Config(format!("PREVIEW_CAPACITY is not a number: {v}"))
            })?;
        }
        Ok(())
    }

    pub fn state_manual_dir(&self) -> PathBuf {
        self.state_manual_dir
            .clone()
            .unwrap_or_else(|| self.export_dir.join("state_manual"))
    }

    /// Downloaded NPPES archives are kept here between pulls.
    pub fn nppes_cache_dir(&self) -> PathBuf {
        self.export_dir.join("nppes_cache")
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DataForgeError::Config(format!("{key} is not a boolean: {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server_port, 8000);
        assert_eq!(settings.state_manual_dir(), PathBuf::from("./exports/state_manual"));
        assert_eq!(settings.cors_allow_origins, vec!["*"]);
        assert!(!settings.include_nppes && !settings.include_grants);
        assert_eq!(settings.nppes_cache_dir(), PathBuf::from("./exports/nppes_cache"));
        assert!(!settings.is_production());
    }

    #[test]
    fn test_file_then_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataforge.toml");
        fs::write(&path, "export_dir = \"/data/out\"\nserver_port = 9000\n").unwrap();

        let mut settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.export_dir, PathBuf::from("/data/out"));
        assert_eq!(settings.server_port, 9000);
        assert_eq!(settings.preview_capacity, 500);

        let env: HashMap<&str, &str> = HashMap::from([
            ("SERVER_PORT", "9100"),
            ("ENABLE_GEOCODER_DEFAULT", "yes"),
            ("CORS_ALLOW_ORIGINS", "https://a.example, https://b.example"),
            ("SAM_API_KEY", ""),
            ("INCLUDE_GRANTS", "on"),
        ]);
        settings
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.server_port, 9100);
        assert!(settings.enable_geocoder_default);
        assert_eq!(settings.cors_allow_origins.len(), 2);
        assert_eq!(settings.sam_api_key, None);
        assert!(settings.include_grants);
        assert!(!settings.include_nppes);
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(|k| (k == "SERVER_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, DataForgeError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Settings::from_file(Path::new("/nonexistent/dataforge.toml")).unwrap_err();
        assert!(matches!(err, DataForgeError::Config(_)));
    }
}
