use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono_tz::Tz;
use tracing::{debug, error, info, trace, warn};

use crate::persist::DEFAULT_DEBOUNCE_MS;
use crate::remind::DEFAULT_POLL_INTERVAL_MS;
use crate::task::DEFAULT_NOTIFY_BEFORE_MS;

const CONFIG_ENV_VAR: &str = "TALLY_CONFIG";
const CONFIG_FILE: &str = "tally/tally.toml";

/// Flattened configuration: the TOML file collapses to dotted keys
/// (`data.location`, `poll.interval-seconds`), then `rc.key=value`
/// overrides from the command line win over everything.
#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Config {
    #[tracing::instrument(skip(config_override))]
    pub fn load(config_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config {
            map: HashMap::new(),
            loaded_files: vec![],
        };

        cfg.map.insert("color".to_string(), "on".to_string());
        cfg.map.insert("time.zone".to_string(), "UTC".to_string());

        if let Some(path) = resolve_config_path(config_override) {
            info!(config = %path.display(), "loading config file");
            cfg.load_file(&path)?;
        } else {
            debug!("no config file found; using defaults");
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.map.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).map(|v| parse_bool(v))
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        let raw = self.map.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "ignoring non-numeric config value");
                None
            }
        }
    }

    pub fn color(&self) -> bool {
        self.get_bool("color").unwrap_or(true)
    }

    /// Display timezone; an unknown id falls back to UTC rather than
    /// failing startup.
    pub fn timezone(&self) -> Tz {
        let raw = self
            .get("time.zone")
            .unwrap_or_else(|| "UTC".to_string());
        match raw.trim().parse::<Tz>() {
            Ok(tz) => tz,
            Err(err) => {
                error!(timezone = %raw, error = %err, "invalid time.zone; using UTC");
                chrono_tz::UTC
            }
        }
    }

    pub fn poll_interval_ms(&self) -> i64 {
        self.get_i64("poll.interval-seconds")
            .map(|secs| secs * 1000)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
    }

    pub fn debounce_ms(&self) -> i64 {
        self.get_i64("persist.debounce-ms")
            .unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    pub fn default_notify_before_ms(&self) -> i64 {
        self.get_i64("reminder.default-notify-before-minutes")
            .map(|mins| mins * 60 * 1000)
            .unwrap_or(DEFAULT_NOTIFY_BEFORE_MS)
    }

    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: toml::Value = toml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        self.loaded_files.push(path.clone());
        flatten_toml("", &value, &mut self.map);
        Ok(())
    }
}

fn flatten_toml(prefix: &str, value: &toml::Value, map: &mut HashMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, nested) in table {
                let full = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_toml(&full, nested, map);
            }
        }
        toml::Value::String(s) => {
            trace!(key = %prefix, value = %s, "loaded config key");
            map.insert(prefix.to_string(), s.clone());
        }
        toml::Value::Integer(n) => {
            map.insert(prefix.to_string(), n.to_string());
        }
        toml::Value::Float(n) => {
            map.insert(prefix.to_string(), n.to_string());
        }
        toml::Value::Boolean(b) => {
            map.insert(prefix.to_string(), b.to_string());
        }
        other => {
            warn!(key = %prefix, kind = other.type_str(), "ignoring unsupported config value");
        }
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

fn resolve_config_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        if env_path == "/dev/null" {
            return None;
        }
        return Some(PathBuf::from(env_path));
    }

    let candidate = dirs::config_dir()?.join(CONFIG_FILE);
    candidate.exists().then_some(candidate)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    if let Some(data) = dirs::data_dir() {
        return Ok(data.join("tally"));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".tally"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{Config, resolve_data_dir};

    fn config_from(text: &str) -> Config {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tally.toml");
        fs::write(&path, text).expect("write config");
        Config::load(Some(&path)).expect("load config")
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let cfg = config_from("");
        assert!(cfg.color());
        assert_eq!(cfg.timezone(), chrono_tz::UTC);
        assert_eq!(cfg.poll_interval_ms(), 30_000);
        assert_eq!(cfg.debounce_ms(), 1000);
        assert_eq!(cfg.default_notify_before_ms(), 15 * 60 * 1000);
    }

    #[test]
    fn toml_tables_flatten_to_dotted_keys() {
        let cfg = config_from(
            r#"
color = false

[data]
location = "/tmp/tally-data"

[poll]
interval-seconds = 60

[time]
zone = "Europe/Berlin"
"#,
        );

        assert!(!cfg.color());
        assert_eq!(cfg.get("data.location").as_deref(), Some("/tmp/tally-data"));
        assert_eq!(cfg.poll_interval_ms(), 60_000);
        assert_eq!(cfg.timezone(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn overrides_win_over_the_file() {
        let mut cfg = config_from("color = true");
        cfg.apply_overrides(vec![
            ("rc.color".to_string(), "off".to_string()),
            ("persist.debounce-ms".to_string(), "250".to_string()),
        ]);

        assert!(!cfg.color());
        assert_eq!(cfg.debounce_ms(), 250);
    }

    #[test]
    fn invalid_timezone_falls_back_to_utc() {
        let mut cfg = config_from("");
        cfg.apply_overrides(vec![("time.zone".to_string(), "Mars/Olympus".to_string())]);
        assert_eq!(cfg.timezone(), chrono_tz::UTC);
    }

    #[test]
    fn data_dir_override_beats_config() {
        let dir = tempdir().expect("tempdir");
        let cfg = config_from("[data]\nlocation = \"/nonexistent/unused\"");
        let resolved =
            resolve_data_dir(&cfg, Some(&dir.path().join("data"))).expect("resolve");
        assert_eq!(resolved, dir.path().join("data"));
        assert!(resolved.exists());
    }
}
