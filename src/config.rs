use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::notify::DEFAULT_PUSHOVER_URL;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_BIOGRAPHY_PATH: &str = "me/summary.txt";
pub const DEFAULT_RESUME_PATH: &str = "me/resume.txt";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

const CONFIG_DIR_NAME: &str = "persona-chat";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub config_path: PathBuf,
    pub config_is_explicit: bool,
    pub persona_name: String,
    pub biography_path: PathBuf,
    pub resume_path: PathBuf,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub evaluator_model: String,
    pub pushover_token: Option<String>,
    pub pushover_user: Option<String>,
    pub pushover_url: String,
    pub evaluate: bool,
    pub max_tool_rounds: usize,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    persona_name: Option<String>,
    biography_path: Option<PathBuf>,
    resume_path: Option<PathBuf>,
    llm_api_key: Option<String>,
    llm_base_url: Option<String>,
    llm_model: Option<String>,
    evaluator_model: Option<String>,
    pushover_token: Option<String>,
    pushover_user: Option<String>,
    pushover_url: Option<String>,
    evaluate: Option<bool>,
    max_tool_rounds: Option<usize>,
    request_timeout_ms: Option<u64>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    /// Environment wins over the file, the file over built-in defaults.
    pub fn load_with_path(explicit_path: Option<&Path>) -> Result<Self> {
        let (config_path, config_is_explicit) = match explicit_path {
            Some(path) => (path.to_path_buf(), true),
            None => (discover_config_path()?, false),
        };
        if config_is_explicit && !config_path.is_file() {
            bail!(
                "Failed to load config {}: file does not exist",
                config_path.display()
            );
        }
        let file = load_file_config(&config_path)?.unwrap_or_default();

        load_dotenv()?;

        let persona_name = env_non_empty("PERSONA_NAME")
            .or_else(|| file_value(file.persona_name.as_deref()))
            .ok_or_else(|| {
                anyhow!(
                    "Missing persona name: set PERSONA_NAME or persona_name in {}",
                    config_path.display()
                )
            })?;

        let max_tool_rounds = file.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);
        if max_tool_rounds == 0 {
            bail!(
                "Failed to load config {}: max_tool_rounds must be at least 1",
                config_path.display()
            );
        }
        let request_timeout_ms = file.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        if request_timeout_ms == 0 {
            bail!(
                "Failed to load config {}: request_timeout_ms must be positive",
                config_path.display()
            );
        }

        Ok(Self {
            persona_name,
            biography_path: env_non_empty("PERSONA_BIOGRAPHY_PATH")
                .map(PathBuf::from)
                .or(file.biography_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BIOGRAPHY_PATH)),
            resume_path: env_non_empty("PERSONA_RESUME_PATH")
                .map(PathBuf::from)
                .or(file.resume_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESUME_PATH)),
            llm_api_key: env_non_empty("LLM_API_KEY")
                .or_else(|| env_non_empty("GOOGLE_API_KEY"))
                .or_else(|| file_value(file.llm_api_key.as_deref())),
            llm_base_url: env_non_empty("LLM_BASE_URL")
                .or_else(|| file_value(file.llm_base_url.as_deref()))
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: env_non_empty("LLM_MODEL")
                .or_else(|| file_value(file.llm_model.as_deref()))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            evaluator_model: env_non_empty("EVALUATOR_MODEL")
                .or_else(|| file_value(file.evaluator_model.as_deref()))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            pushover_token: env_non_empty("PUSHOVER_TOKEN")
                .or_else(|| file_value(file.pushover_token.as_deref())),
            pushover_user: env_non_empty("PUSHOVER_USER")
                .or_else(|| file_value(file.pushover_user.as_deref())),
            pushover_url: env_non_empty("PUSHOVER_URL")
                .or_else(|| file_value(file.pushover_url.as_deref()))
                .unwrap_or_else(|| DEFAULT_PUSHOVER_URL.to_string()),
            evaluate: file.evaluate.unwrap_or(true),
            max_tool_rounds,
            request_timeout_ms,
            config_path,
            config_is_explicit,
        })
    }
}

/// Variables already present in the process environment are left alone.
/// A missing `.env` is fine; one that fails to parse is not, since dotenvy
/// stops at the first bad line and would drop every key after it.
fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env");
            Ok(())
        }
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(anyhow!("Failed to load .env: {err}")),
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        anyhow!("Failed to resolve config path: HOME directory is unavailable")
    })?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn env_non_empty(key: &str) -> Option<String> {
    file_value(env::var(key).ok().as_deref())
}

fn file_value(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{
        AppConfig, DEFAULT_BIOGRAPHY_PATH, DEFAULT_LLM_BASE_URL, DEFAULT_MAX_TOOL_ROUNDS,
        DEFAULT_MODEL,
    };
    use crate::notify::DEFAULT_PUSHOVER_URL;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use std::path::{Path, PathBuf};

    const VARS: &[&str] = &[
        "PERSONA_NAME",
        "PERSONA_BIOGRAPHY_PATH",
        "PERSONA_RESUME_PATH",
        "LLM_API_KEY",
        "GOOGLE_API_KEY",
        "LLM_BASE_URL",
        "LLM_MODEL",
        "EVALUATOR_MODEL",
        "PUSHOVER_TOKEN",
        "PUSHOVER_USER",
        "PUSHOVER_URL",
        "XDG_CONFIG_HOME",
    ];

    fn reset_vars() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    fn with_cwd<T>(path: &Path, f: impl FnOnce() -> T) -> T {
        let cwd = env::current_dir().expect("current dir");
        env::set_current_dir(path).expect("set current dir");
        let result = f();
        env::set_current_dir(cwd).expect("restore current dir");
        result
    }

    fn write_config(root: &Path, body: &str) {
        let config_dir = root.join("persona-chat");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(config_dir.join("config.toml"), body).expect("write config");
    }

    #[test]
    #[serial]
    fn load_applies_defaults_when_only_name_is_set() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("PERSONA_NAME", "Ada Example");
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(cfg.persona_name, "Ada Example");
        assert_eq!(cfg.biography_path, PathBuf::from(DEFAULT_BIOGRAPHY_PATH));
        assert_eq!(cfg.llm_model, DEFAULT_MODEL);
        assert_eq!(cfg.evaluator_model, DEFAULT_MODEL);
        assert_eq!(cfg.llm_base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(cfg.pushover_url, DEFAULT_PUSHOVER_URL);
        assert_eq!(cfg.llm_api_key, None);
        assert!(cfg.evaluate);
        assert_eq!(cfg.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert!(!cfg.config_is_explicit);
    }

    #[test]
    #[serial]
    fn load_env_overrides_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_config(
            tmp.path(),
            r#"
persona_name = "File Name"
llm_api_key = "file_key"
llm_model = "file_model"
pushover_user = "file_user"
evaluate = false
max_tool_rounds = 3
"#,
        );

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("PERSONA_NAME", "Env Name");
            env::set_var("LLM_API_KEY", "os_key");
            env::set_var("PUSHOVER_USER", "   ");
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(cfg.persona_name, "Env Name");
        assert_eq!(cfg.llm_api_key.as_deref(), Some("os_key"));
        assert_eq!(cfg.llm_model, "file_model");
        assert_eq!(cfg.pushover_user.as_deref(), Some("file_user"));
        assert!(!cfg.evaluate);
        assert_eq!(cfg.max_tool_rounds, 3);
    }

    #[test]
    #[serial]
    fn load_falls_back_to_google_api_key() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("PERSONA_NAME", "Ada");
            env::set_var("GOOGLE_API_KEY", "google_key");
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(cfg.llm_api_key.as_deref(), Some("google_key"));
    }

    #[test]
    #[serial]
    fn load_does_not_override_existing_os_env_with_dotenv() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(
            tmp.path().join(".env"),
            "PERSONA_NAME=\"Dotenv Name\"\nLLM_MODEL=dotenv_model\n",
        )
        .expect("write env file");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("PERSONA_NAME", "OS Name");
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(cfg.persona_name, "OS Name");
        assert_eq!(cfg.llm_model, "dotenv_model");
        unsafe {
            env::remove_var("LLM_MODEL");
        }
    }

    #[test]
    #[serial]
    fn load_fails_on_malformed_dotenv() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(
            tmp.path().join(".env"),
            "PERSONA_NAME=Dotenv Name\nLLM_MODEL=dotenv_model\n",
        )
        .expect("write env file");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("PERSONA_NAME", "OS Name");
        }

        let err = with_cwd(tmp.path(), || AppConfig::load().expect_err("load should fail"));
        assert!(err.to_string().contains("Failed to load .env"), "{err}");
        assert!(env::var("LLM_MODEL").is_err());
    }

    #[test]
    #[serial]
    fn load_with_explicit_path_skips_discovery() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("custom.toml");
        fs::write(&path, "persona_name = \"Explicit\"\nrequest_timeout_ms = 500\n")
            .expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", "   ");
        }

        let cfg = with_cwd(tmp.path(), || {
            AppConfig::load_with_path(Some(&path)).expect("load config")
        });
        assert_eq!(cfg.persona_name, "Explicit");
        assert_eq!(cfg.request_timeout_ms, 500);
        assert!(cfg.config_is_explicit);
        assert_eq!(cfg.config_path, path);
    }

    #[test]
    #[serial]
    fn load_fails_when_explicit_path_is_missing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();

        let missing = tmp.path().join("missing.toml");
        let err = AppConfig::load_with_path(Some(&missing)).expect_err("load should fail");
        assert!(err.to_string().contains("file does not exist"));
    }

    #[test]
    #[serial]
    fn load_fails_without_persona_name() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let err = with_cwd(tmp.path(), || AppConfig::load().expect_err("load should fail"));
        assert!(err.to_string().contains("Missing persona name"));
    }

    #[test]
    #[serial]
    fn load_fails_when_xdg_config_home_is_empty() {
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", "   ");
        }

        let err = AppConfig::load().expect_err("load should fail");
        assert!(
            err.to_string()
                .contains("Failed to resolve config path: XDG_CONFIG_HOME is set but empty")
        );
    }

    #[test]
    #[serial]
    fn load_fails_on_unknown_root_key() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_config(tmp.path(), "persona_name = \"Ada\"\nunknown_key = 1");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let err = with_cwd(tmp.path(), || AppConfig::load().expect_err("load should fail"));
        assert!(err.to_string().contains("Failed to load config"));
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    #[serial]
    fn load_rejects_zero_tool_rounds() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_config(tmp.path(), "persona_name = \"Ada\"\nmax_tool_rounds = 0");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let err = with_cwd(tmp.path(), || AppConfig::load().expect_err("load should fail"));
        assert!(err.to_string().contains("max_tool_rounds must be at least 1"));
    }
}
