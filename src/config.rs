use anyhow::{Context, Result};
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for labmirror
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitLab instance and API settings
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// What to mirror and where
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Git executor settings
    #[serde(default)]
    pub git: GitConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which clone address the remote directory reports for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneMethod {
    /// Use SSH (git@gitlab.com:group/project.git)
    #[default]
    Ssh,
    /// Use HTTPS (https://gitlab.com/group/project.git)
    Https,
}

/// GitLab configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitLabConfig {
    /// Base URL of the GitLab instance
    #[serde(default = "default_gitlab_url")]
    pub url: String,

    /// Environment variable holding a personal access token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Page size for listing calls
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Timeout for a single API request in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout: u64,
}

/// Mirror selection and layout
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MirrorConfig {
    /// Directory the mirror tree is written to
    #[serde(default = "default_output_directory")]
    pub output_directory: String,

    /// Root group ids, merged with the ones given on the command line
    #[serde(default)]
    pub groups: Vec<u64>,

    /// Also mirror projects owned by the authenticated account
    #[serde(default)]
    pub include_personal: bool,

    /// Clone over SSH or HTTPS
    #[serde(default)]
    pub clone_method: CloneMethod,

    /// Joins group and project path segments into the local directory name
    #[serde(default = "default_path_separator")]
    pub path_separator: String,

    /// Glob patterns on the relative path; matching projects are skipped
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// Git executor configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    /// Git binary to invoke
    #[serde(default = "default_git_program")]
    pub program: String,

    /// Locale forced on every git invocation so its output can be classified
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Timeout for a single clone or pull in seconds
    #[serde(default = "default_git_timeout")]
    pub timeout: u64,

    /// Fast-forward only pulls
    #[serde(default = "default_true")]
    pub fast_forward_only: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level used when neither --verbose, --quiet nor RUST_LOG is set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_gitlab_url() -> String {
    "https://gitlab.com".to_string()
}
fn default_token_env() -> String {
    "GITLAB_TOKEN".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_api_timeout() -> u64 {
    30
}
fn default_output_directory() -> String {
    ".".to_string()
}
fn default_path_separator() -> String {
    ":".to_string()
}
fn default_git_program() -> String {
    "git".to_string()
}
fn default_locale() -> String {
    "en_US.UTF-8".to_string()
}
fn default_git_timeout() -> u64 {
    600
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: default_gitlab_url(),
            token_env: default_token_env(),
            per_page: default_per_page(),
            timeout: default_api_timeout(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            groups: Vec::new(),
            include_personal: false,
            clone_method: CloneMethod::default(),
            path_separator: default_path_separator(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            locale: default_locale(),
            timeout: default_git_timeout(),
            fast_forward_only: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: default_true(),
        }
    }
}

impl GitLabConfig {
    /// Personal access token from the configured environment variable, if any
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl GitConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    ///
    /// Unlike an explicit `--config`, a missing default file is not an error
    /// and nothing is written: the mirror tree is the only durable output.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            let mut config = Self::default();
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        // Expand environment variables in paths
        config.expand_paths()?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("labmirror").join("config.yml"))
    }

    /// Expand `~` and environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.mirror.output_directory = shellexpand::full(&self.mirror.output_directory)
            .context("Failed to expand output_directory path")?
            .into_owned();

        Ok(())
    }

    /// Normalized output directory of the mirror tree
    pub fn output_directory(&self) -> PathBuf {
        PathBuf::from(&self.mirror.output_directory).clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.gitlab.url, "https://gitlab.com");
        assert_eq!(config.gitlab.token_env, "GITLAB_TOKEN");
        assert_eq!(config.gitlab.per_page, 100);
        assert_eq!(config.mirror.output_directory, ".");
        assert!(config.mirror.groups.is_empty());
        assert!(!config.mirror.include_personal);
        assert_eq!(config.mirror.clone_method, CloneMethod::Ssh);
        assert_eq!(config.mirror.path_separator, ":");
        assert_eq!(config.git.program, "git");
        assert_eq!(config.git.locale, "en_US.UTF-8");
        assert!(config.git.fast_forward_only);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    #[serial]
    fn test_expand_paths() {
        env::set_var("TEST_LABMIRROR_HOME", "/test/home");

        let mut config = Config::default();
        config.mirror.output_directory = "${TEST_LABMIRROR_HOME}/backup".to_string();

        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(config.mirror.output_directory, "/test/home/backup");

        env::remove_var("TEST_LABMIRROR_HOME");
    }

    #[test]
    fn test_output_directory_is_cleaned() {
        let mut config = Config::default();
        config.mirror.output_directory = "/srv/backup/./gitlab/../gitlab/".to_string();

        assert_eq!(config.output_directory(), PathBuf::from("/srv/backup/gitlab"));
    }

    #[test]
    #[serial]
    fn test_token_from_environment() {
        let mut config = GitLabConfig::default();
        config.token_env = "TEST_LABMIRROR_TOKEN".to_string();

        env::remove_var("TEST_LABMIRROR_TOKEN");
        assert!(config.token().is_none());

        env::set_var("TEST_LABMIRROR_TOKEN", "  ");
        assert!(config.token().is_none());

        env::set_var("TEST_LABMIRROR_TOKEN", "glpat-abc\n");
        assert_eq!(config.token().as_deref(), Some("glpat-abc"));

        env::remove_var("TEST_LABMIRROR_TOKEN");
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let nonexistent_path = Path::new("/nonexistent/path/config.yml");
        let result = Config::load(nonexistent_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");
        std::fs::write(
            &config_path,
            "mirror:\n  output_directory: /custom/path\n  groups: [3, 9]\n",
        )
        .expect("Failed to write config");

        let loaded = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(loaded.mirror.output_directory, "/custom/path");
        assert_eq!(loaded.mirror.groups, vec![3, 9]);
        assert_eq!(loaded.gitlab.url, "https://gitlab.com");
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("labmirror"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
gitlab:
  url: "https://gitlab.example.com"
  token_env: "EXAMPLE_TOKEN"
  per_page: 50
mirror:
  output_directory: "/srv/backup"
  groups: [12, 34]
  include_personal: true
  clone_method: https
  path_separator: "/"
  exclude_patterns:
    - "*:archive-*"
git:
  program: "/usr/local/bin/git"
  locale: "C"
  timeout: 60
  fast_forward_only: false
logging:
  level: "debug"
  color: false
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.gitlab.url, "https://gitlab.example.com");
        assert_eq!(config.gitlab.token_env, "EXAMPLE_TOKEN");
        assert_eq!(config.gitlab.per_page, 50);
        assert_eq!(config.gitlab.timeout, 30);
        assert_eq!(config.mirror.groups, vec![12, 34]);
        assert!(config.mirror.include_personal);
        assert_eq!(config.mirror.clone_method, CloneMethod::Https);
        assert_eq!(config.mirror.path_separator, "/");
        assert_eq!(config.mirror.exclude_patterns, vec!["*:archive-*".to_string()]);
        assert_eq!(config.git.program, "/usr/local/bin/git");
        assert_eq!(config.git.locale, "C");
        assert_eq!(config.git.operation_timeout(), Duration::from_secs(60));
        assert!(!config.git.fast_forward_only);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.color);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("git:\n  locale: C\n").expect("Failed to parse");

        assert_eq!(config.git.locale, "C");
        assert_eq!(config.git.program, "git");
        assert_eq!(config.mirror.path_separator, ":");
    }
}
