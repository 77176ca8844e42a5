use anyhow::{bail, Context, Result};
use chrono::Datelike;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::YearMonth;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    pub latest_url: String,
    /// Template with `{year}` and `{month}` placeholders.
    pub monthly_url: String,
    pub base_url: String,
}

impl ArchiveConfig {
    pub fn monthly_url_for(&self, ym: YearMonth) -> String {
        self.monthly_url
            .replace("{year}", &format!("{:04}", ym.year))
            .replace("{month}", &format!("{:02}", ym.month))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("qah/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

/// What to do with a fragment above `max_fragment_bytes`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    #[default]
    Passthrough,
    Truncate,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_fragment_separator")]
    pub fragment_separator: String,
    #[serde(default = "default_max_fragment_bytes")]
    pub max_fragment_bytes: usize,
    #[serde(default)]
    pub oversize: OversizePolicy,
    /// Latest year a record may carry. Defaults to next calendar year.
    #[serde(default)]
    pub max_year: Option<i32>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            fragment_separator: default_fragment_separator(),
            max_fragment_bytes: default_max_fragment_bytes(),
            oversize: OversizePolicy::default(),
            max_year: None,
        }
    }
}

impl ParserConfig {
    pub fn effective_max_year(&self) -> i32 {
        self.max_year
            .unwrap_or_else(|| chrono::Utc::now().year() + 1)
    }
}

fn default_fragment_separator() -> String {
    "</br></br>".to_string()
}
fn default_max_fragment_bytes() -> usize {
    10240 - 100
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    /// `"adaptive"` or a `YYYY-MM` month.
    #[serde(default = "default_start")]
    pub start: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
        }
    }
}

fn default_start() -> String {
    "adaptive".to_string()
}

/// Where the historical crawl begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCursor {
    Fixed(YearMonth),
    /// Read from the latest page's "previous" navigation link.
    Adaptive,
}

pub fn parse_start(value: &str) -> Result<StartCursor> {
    if value.eq_ignore_ascii_case("adaptive") {
        return Ok(StartCursor::Adaptive);
    }
    let ym: YearMonth = value
        .parse()
        .with_context(|| format!("crawl.start must be 'adaptive' or YYYY-MM, got '{}'", value))?;
    Ok(StartCursor::Fixed(ym))
}

impl CrawlConfig {
    pub fn start_cursor(&self) -> Result<StartCursor> {
        parse_start(&self.start)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_index_url")]
    pub url: String,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub refresh: bool,
    #[serde(default)]
    pub recreate_on_start: bool,
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_index_url(),
            name: default_index_name(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            refresh: true,
            recreate_on_start: false,
            path: default_index_path(),
        }
    }
}

fn default_backend() -> String {
    "elasticsearch".to_string()
}
fn default_index_url() -> String {
    "https://localhost:9200".to_string()
}
fn default_index_name() -> String {
    "qa".to_string()
}
fn default_api_key_env() -> String {
    "ELASTIC_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    crate::bulk::MAX_BATCH_SIZE
}
fn default_index_path() -> PathBuf {
    PathBuf::from("./data/qa.sqlite")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Config {
    /// Config used when no file is available (e.g. `qah parse`).
    pub fn minimal() -> Self {
        Self {
            archive: ArchiveConfig {
                latest_url: "https://billwurtz.com/questions/questions.html".to_string(),
                monthly_url: "https://billwurtz.com/questions/questions-{year}-{month}.html"
                    .to_string(),
                base_url: "https://billwurtz.com/questions/".to_string(),
            },
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            parser: ParserConfig::default(),
            crawl: CrawlConfig::default(),
            index: IndexConfig {
                backend: "memory".to_string(),
                ..IndexConfig::default()
            },
            notify: NotifyConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate archive
    let monthly = &config.archive.monthly_url;
    if !monthly.contains("{year}") || !monthly.contains("{month}") {
        bail!("archive.monthly_url must contain both {{year}} and {{month}} placeholders");
    }
    url::Url::parse(&config.archive.base_url)
        .with_context(|| format!("archive.base_url is not a URL: {}", config.archive.base_url))?;

    // Validate parser
    if config.parser.max_fragment_bytes == 0 {
        bail!("parser.max_fragment_bytes must be > 0");
    }
    if config.parser.fragment_separator.trim().is_empty() {
        bail!("parser.fragment_separator must not be empty");
    }

    // Validate crawl
    config.crawl.start_cursor()?;

    // Validate index
    if config.index.batch_size == 0 || config.index.batch_size > crate::bulk::MAX_BATCH_SIZE {
        bail!(
            "index.batch_size must be in 1..={}",
            crate::bulk::MAX_BATCH_SIZE
        );
    }
    match config.index.backend.as_str() {
        "elasticsearch" | "sqlite" | "memory" => {}
        other => bail!(
            "Unknown index backend: '{}'. Must be elasticsearch, sqlite, or memory.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[archive]
latest_url = "https://example.org/questions/questions.html"
monthly_url = "https://example.org/questions/questions-{year}-{month}.html"
base_url = "https://example.org/questions/"
"#;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse_config(BASE).unwrap();
        assert_eq!(cfg.index.batch_size, 300);
        assert_eq!(cfg.index.backend, "elasticsearch");
        assert_eq!(cfg.parser.fragment_separator, "</br></br>");
        assert_eq!(cfg.parser.max_fragment_bytes, 10140);
        assert_eq!(cfg.parser.oversize, OversizePolicy::Passthrough);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.crawl.start_cursor().unwrap(), StartCursor::Adaptive);
        assert!(cfg.notify.webhook_url.is_none());
    }

    #[test]
    fn monthly_url_is_zero_padded() {
        let cfg = parse_config(BASE).unwrap();
        let url = cfg.archive.monthly_url_for(YearMonth::new(2021, 3).unwrap());
        assert_eq!(url, "https://example.org/questions/questions-2021-03.html");
    }

    #[test]
    fn fixed_start_and_truncate_policy() {
        let text = format!(
            "{}\n[crawl]\nstart = \"2021-01\"\n[parser]\noversize = \"truncate\"\n",
            BASE
        );
        let cfg = parse_config(&text).unwrap();
        assert_eq!(
            cfg.crawl.start_cursor().unwrap(),
            StartCursor::Fixed(YearMonth::new(2021, 1).unwrap())
        );
        assert_eq!(cfg.parser.oversize, OversizePolicy::Truncate);
    }

    #[test]
    fn rejects_oversized_batch() {
        let text = format!("{}\n[index]\nbatch_size = 301\n", BASE);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn rejects_bad_start_month() {
        let text = format!("{}\n[crawl]\nstart = \"2021-13\"\n", BASE);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn rejects_template_without_placeholders() {
        let text = BASE.replace("questions-{year}-{month}.html", "questions.html");
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn rejects_unknown_backend() {
        let text = format!("{}\n[index]\nbackend = \"solr\"\n", BASE);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn example_config_parses() {
        let cfg = parse_config(include_str!("../config/qah.example.toml")).unwrap();
        assert_eq!(cfg.index.backend, "elasticsearch");
        assert_eq!(cfg.crawl.start_cursor().unwrap(), StartCursor::Adaptive);
        assert!(cfg.notify.webhook_url.is_none());
    }
}
