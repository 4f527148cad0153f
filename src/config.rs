use crate::error::AppError;
use crate::retry::RetryPolicy;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_KEY_FILE: &str = "openAI_key.txt";
const DEFAULT_ERROR_LOG: &str = "error_log.txt";

/// Connection settings for the text generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            temperature: None,
        }
    }
}

/// Values given on the command line; they win over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub key_file: Option<PathBuf>,
    pub model: Option<String>,
    pub reformat_cmd: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub working_dir: PathBuf,
    pub llm: LlmSettings,
    pub retry: RetryPolicy,
    pub reformat_cmd: Option<String>,
    pub error_log: PathBuf,
}

impl Config {
    /// Creates a new Config from the process environment.
    ///
    /// Relative paths (key file, error log) are resolved against the current directory.
    pub fn new(overrides: &Overrides) -> Result<Self, AppError> {
        let working_dir = env::current_dir().map_err(|io_err| {
            AppError::IoError(format!(
                "Failed to determine current working directory: {}",
                io_err
            ))
        })?;
        Self::from_lookup(working_dir, overrides, |name| env::var(name).ok())
    }

    /// Builds a Config reading variables through `lookup`.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(
        working_dir: PathBuf,
        overrides: &Overrides,
        lookup: F,
    ) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let endpoint = get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_http_endpoint("OPENAI_BASE_URL", &endpoint)?;

        let model = overrides
            .model
            .clone()
            .or_else(|| get("AUTODOC_MODEL"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        if model.trim().is_empty() {
            return Err(AppError::ConfigError("model name must not be empty".into()));
        }

        let timeout_secs =
            parse_number::<u64>("AUTODOC_TIMEOUT_SECS", get("AUTODOC_TIMEOUT_SECS"))?
                .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let temperature = parse_number::<f32>("AUTODOC_TEMPERATURE", get("AUTODOC_TEMPERATURE"))?;
        if let Some(t) = temperature {
            validate_range_f32("AUTODOC_TEMPERATURE", t, 0.0, 2.0)?;
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_number::<u32>("AUTODOC_MAX_ATTEMPTS", get("AUTODOC_MAX_ATTEMPTS"))?,
            rate_limit_backoff: parse_number::<u64>(
                "AUTODOC_RATE_LIMIT_BACKOFF_SECS",
                get("AUTODOC_RATE_LIMIT_BACKOFF_SECS"),
            )?
            .map(Duration::from_secs)
            .unwrap_or(defaults.rate_limit_backoff),
            transient_backoff: parse_number::<u64>(
                "AUTODOC_TRANSIENT_BACKOFF_SECS",
                get("AUTODOC_TRANSIENT_BACKOFF_SECS"),
            )?
            .map(Duration::from_secs)
            .unwrap_or(defaults.transient_backoff),
        };
        if retry.max_attempts == Some(0) {
            return Err(AppError::ConfigError(
                "AUTODOC_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }

        let key_file = overrides
            .key_file
            .clone()
            .or_else(|| get("AUTODOC_KEY_FILE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_FILE));
        let api_key = match get("OPENAI_API_KEY") {
            Some(key) => Some(key),
            None => read_key_file(&working_dir.join(key_file))?,
        };

        let reformat_cmd = overrides
            .reformat_cmd
            .clone()
            .or_else(|| get("AUTODOC_REFORMAT_CMD"));

        let error_log = working_dir.join(
            get("AUTODOC_ERROR_LOG").unwrap_or_else(|| DEFAULT_ERROR_LOG.to_string()),
        );

        Ok(Config {
            working_dir,
            llm: LlmSettings {
                api_key,
                endpoint,
                model,
                timeout_secs,
                temperature,
            },
            retry,
            reformat_cmd,
            error_log,
        })
    }
}

/// Reads the first non-empty line of the key file, if the file exists.
fn read_key_file(path: &Path) -> Result<Option<String>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| {
        AppError::CredentialError(format!("cannot read key file {}: {}", path.display(), e))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string))
}

fn parse_number<T: std::str::FromStr>(
    var: &str,
    value: Option<String>,
) -> Result<Option<T>, AppError> {
    value
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                AppError::ConfigError(format!("invalid number in {}: '{}'", var, raw))
            })
        })
        .transpose()
}

fn validate_http_endpoint(var: &str, value: &str) -> Result<(), AppError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(AppError::ConfigError(format!(
            "invalid format in {}: must start with http:// or https://",
            var
        )))
    }
}

fn validate_range_f32(field: &str, value: f32, min: f32, max: f32) -> Result<(), AppError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(AppError::ConfigError(format!(
            "{} is out of range: expected {}..={}",
            field, min, max
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(dir: &Path, vars: &[(&str, &str)], overrides: &Overrides) -> Result<Config, AppError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(dir.to_path_buf(), overrides, |name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load(dir.path(), &[], &Overrides::default()).expect("config");
        assert_eq!(config.llm, LlmSettings::default());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.error_log, dir.path().join("error_log.txt"));
        assert!(config.reformat_cmd.is_none());
    }

    #[test]
    fn key_falls_back_to_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("openAI_key.txt"), "\n  sk-from-file  \n").expect("write");
        let config = load(dir.path(), &[], &Overrides::default()).expect("config");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-from-file"));

        let config = load(
            dir.path(),
            &[("OPENAI_API_KEY", "sk-env")],
            &Overrides::default(),
        )
        .expect("config");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn cli_overrides_win_over_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("other.key"), "sk-other").expect("write");
        let overrides = Overrides {
            key_file: Some(PathBuf::from("other.key")),
            model: Some("gpt-4o".into()),
            reformat_cmd: Some("yapf".into()),
        };
        let config = load(
            dir.path(),
            &[("AUTODOC_MODEL", "ignored"), ("AUTODOC_REFORMAT_CMD", "black -")],
            &overrides,
        )
        .expect("config");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-other"));
        assert_eq!(config.reformat_cmd.as_deref(), Some("yapf"));
    }

    #[test]
    fn retry_settings_are_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load(
            dir.path(),
            &[
                ("AUTODOC_MAX_ATTEMPTS", "3"),
                ("AUTODOC_RATE_LIMIT_BACKOFF_SECS", "10"),
                ("AUTODOC_TRANSIENT_BACKOFF_SECS", "1"),
            ],
            &Overrides::default(),
        )
        .expect("config");
        assert_eq!(config.retry.max_attempts, Some(3));
        assert_eq!(config.retry.rate_limit_backoff, Duration::from_secs(10));
        assert_eq!(config.retry.transient_backoff, Duration::from_secs(1));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        for vars in [
            vec![("OPENAI_BASE_URL", "ftp://example.com")],
            vec![("AUTODOC_TIMEOUT_SECS", "soon")],
            vec![("AUTODOC_TEMPERATURE", "3.5")],
            vec![("AUTODOC_MAX_ATTEMPTS", "0")],
        ] {
            let err = load(dir.path(), &vars, &Overrides::default()).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "{vars:?} gave {err:?}");
        }
    }
}
