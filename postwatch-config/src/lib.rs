//! Loader for monitor configuration with YAML + environment overlays.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. built-in defaults (every key has one, the webhook defaults to
//!    `${DISCORD_WEBHOOK_URL}`)
//! 2. YAML files added with [`PostwatchConfigLoader::with_file`],
//!    [`PostwatchConfigLoader::with_optional_file`] or inline snippets
//! 3. `POSTWATCH__`-prefixed environment variables, `__` separating sections
//!    (`POSTWATCH__POLL__INTERVAL_SECS=60`)
//!
//! `${VAR}` placeholders in any string are expanded after merging.
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "POSTWATCH";
const CONFIG_FILE_NAME: &str = "postwatch.yaml";

const BUILTIN_DEFAULTS: &str = r#"
notifier:
  discord_webhook_url: "${DISCORD_WEBHOOK_URL}"
"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostwatchConfig {
    pub feed: FeedSettings,
    pub display: DisplaySettings,
    pub notifier: NotifierSettings,
    pub poll: PollSettings,
    pub log: LogSettings,
}

/// Where the feed lives and how hard the pipeline works on each entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub url: String,
    /// Origin used to absolutise relative image URLs.
    pub base_origin: String,
    pub timeout_secs: u64,
    /// Timeout for permalink fetches made by the timestamp/image fallbacks.
    pub page_timeout_secs: u64,
    /// `None` keeps the HTTP client's browser agent.
    pub user_agent: Option<String>,
    pub fetch_page_images: bool,
    pub concurrency: usize,
    pub title_placeholders: Vec<String>,
    pub min_content_chars: usize,
    pub title_min_chars: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: "https://trumpstruth.org/feed".into(),
            base_origin: "https://trumpstruth.org".into(),
            timeout_secs: 30,
            page_timeout_secs: 10,
            user_agent: None,
            fetch_page_images: false,
            concurrency: 4,
            title_placeholders: vec!["[No Title]".into(), "REFORMING".into()],
            min_content_chars: 10,
            title_min_chars: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// IANA zone name, e.g. `America/Los_Angeles`.
    pub timezone: String,
    pub label: String,
    /// chrono `strftime` pattern; the label is appended in parentheses.
    pub pattern: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            timezone: "America/Los_Angeles".into(),
            label: "洛杉矶时间".into(),
            pattern: "%Y年%m月%d日 %H:%M".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub discord_webhook_url: Option<String>,
    pub username: String,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            discord_webhook_url: None,
            username: "Truth Social Monitor".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    /// Deliver the posts already in the feed on the first cycle.
    pub notify_on_startup: bool,
    /// How many delivered ids are remembered for dedup.
    pub seen_capacity: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            notify_on_startup: false,
            seen_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: Option<PathBuf>,
    /// `text` or `json`.
    pub format: String,
    pub stderr: bool,
    /// Used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            format: "text".into(),
            stderr: true,
            filter: "info".into(),
        }
    }
}

impl PostwatchConfig {
    /// The Discord webhook, rejecting missing or unexpanded values.
    ///
    /// ```
    /// use postwatch_config::PostwatchConfig;
    ///
    /// let mut cfg = PostwatchConfig::default();
    /// assert!(cfg.webhook_url().is_err());
    ///
    /// cfg.notifier.discord_webhook_url = Some("${DISCORD_WEBHOOK_URL}".into());
    /// assert!(cfg.webhook_url().is_err());
    ///
    /// cfg.notifier.discord_webhook_url = Some("https://discord.com/api/webhooks/1/t".into());
    /// assert_eq!(cfg.webhook_url().unwrap(), "https://discord.com/api/webhooks/1/t");
    /// ```
    pub fn webhook_url(&self) -> Result<&str, ConfigError> {
        match self.notifier.discord_webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() && !url.contains("${") => Ok(url),
            _ => Err(ConfigError::Message(
                "notifier.discord_webhook_url is not set (export DISCORD_WEBHOOK_URL)".into(),
            )),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.feed.url.trim().is_empty(), "feed.url must not be empty"),
            (self.feed.timeout_secs == 0, "feed.timeout_secs must be > 0"),
            (
                self.feed.page_timeout_secs == 0,
                "feed.page_timeout_secs must be > 0",
            ),
            (self.feed.concurrency == 0, "feed.concurrency must be > 0"),
            (self.poll.interval_secs == 0, "poll.interval_secs must be > 0"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Message((*message).to_string())),
            None => Ok(()),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Standard search locations for `postwatch.yaml`, lowest priority first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("postwatch").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(CONFIG_FILE_NAME));
    paths
}

/// Builder hides the `config` crate wiring (defaults + YAML + env overrides).
pub struct PostwatchConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for PostwatchConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PostwatchConfigLoader {
    /// Start from the built-in defaults.
    ///
    /// ```
    /// use postwatch_config::PostwatchConfigLoader;
    ///
    /// let config = PostwatchConfigLoader::new()
    ///     .with_yaml_str("poll:\n  interval_secs: 60")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.poll.interval_secs, 60);
    /// assert_eq!(config.feed.url, "https://trumpstruth.org/feed");
    /// ```
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(File::from_str(BUILTIN_DEFAULTS, FileFormat::Yaml));
        Self { builder }
    }

    /// Attach a required YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is merged only when it exists.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Attach every path from [`default_config_paths`] as optional.
    pub fn with_default_locations(self) -> Self {
        default_config_paths()
            .into_iter()
            .fold(self, |loader, path| loader.with_optional_file(path))
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use postwatch_config::PostwatchConfigLoader;
    ///
    /// let cfg = PostwatchConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// feed:
    ///   fetch_page_images: true
    ///   title_placeholders: ["[No Title]"]
    /// display:
    ///   timezone: "UTC"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(cfg.feed.fetch_page_images);
    /// assert_eq!(cfg.feed.title_placeholders, vec!["[No Title]".to_string()]);
    /// assert_eq!(cfg.display.timezone, "UTC");
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// Environment overrides are applied last, then `${VAR}` placeholders are
    /// expanded and the result is validated.
    ///
    /// ```
    /// use postwatch_config::PostwatchConfigLoader;
    ///
    /// unsafe { std::env::set_var("HOOK_FROM_ENV", "https://discord.com/api/webhooks/9/abc"); }
    ///
    /// let config = PostwatchConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// notifier:
    ///   discord_webhook_url: "${HOOK_FROM_ENV}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.webhook_url().unwrap(), "https://discord.com/api/webhooks/9/abc");
    ///
    /// unsafe { std::env::remove_var("HOOK_FROM_ENV"); }
    /// ```
    pub fn load(self) -> Result<PostwatchConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: PostwatchConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;

        Ok(typed)
    }
}
