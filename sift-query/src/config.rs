//! Engine configuration.
//!
//! Configuration is read from TOML, with `${VAR}` references expanded from
//! the environment before parsing:
//!
//! ```toml
//! [filters]
//! max_filters = 16
//! string_comparison = "ignore_case"
//!
//! [ordering]
//! max_sort_keys = 4
//!
//! [paging]
//! default_page_size = 25
//! max_page_size = ${SIFT_PAGE_LIMIT}
//! ```
//!
//! Every section and key is optional.

use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::order::DEFAULT_MAX_SORT_KEYS;
use crate::translate::DEFAULT_MAX_FILTERS;
use crate::value::StringComparison;

/// Default page size when a request does not specify `take`.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Default upper bound on `take`.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 500;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Filter translation settings.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Ordering settings.
    #[serde(default)]
    pub ordering: OrderingConfig,

    /// Paging settings.
    #[serde(default)]
    pub paging: PagingConfig,
}

/// `[filters]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Maximum number of filters in one request.
    #[serde(default = "default_max_filters")]
    pub max_filters: usize,

    /// How string operators compare text.
    #[serde(default)]
    pub string_comparison: StringComparison,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_filters: default_max_filters(),
            string_comparison: StringComparison::default(),
        }
    }
}

/// `[ordering]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrderingConfig {
    /// Maximum number of sort keys in one request.
    #[serde(default = "default_max_sort_keys")]
    pub max_sort_keys: usize,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            max_sort_keys: default_max_sort_keys(),
        }
    }
}

/// `[paging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PagingConfig {
    /// Page size used when `take` is absent.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Upper bound applied to `take`.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_max_filters() -> usize {
    DEFAULT_MAX_FILTERS
}

fn default_max_sort_keys() -> usize {
    DEFAULT_MAX_SORT_KEYS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

impl EngineConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::configuration(format!("Cannot read '{}'", path.display())).with_source(e)
        })?;

        Self::from_str(&content)
    }

    /// Defaults overlaid with `SIFT_*` environment variables.
    pub fn from_env() -> QueryResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `SIFT_*` environment variables on top of this configuration.
    ///
    /// Recognized variables: `SIFT_MAX_FILTERS`, `SIFT_STRING_COMPARISON`,
    /// `SIFT_MAX_SORT_KEYS`, `SIFT_DEFAULT_PAGE_SIZE`, `SIFT_MAX_PAGE_SIZE`.
    pub fn with_env_overrides(mut self) -> QueryResult<Self> {
        if let Some(max) = env_usize("SIFT_MAX_FILTERS")? {
            self.filters.max_filters = max;
        }
        if let Ok(raw) = env::var("SIFT_STRING_COMPARISON") {
            self.filters.string_comparison = parse_string_comparison(&raw)?;
        }
        if let Some(max) = env_usize("SIFT_MAX_SORT_KEYS")? {
            self.ordering.max_sort_keys = max;
        }
        if let Some(size) = env_usize("SIFT_DEFAULT_PAGE_SIZE")? {
            self.paging.default_page_size = size;
        }
        if let Some(size) = env_usize("SIFT_MAX_PAGE_SIZE")? {
            self.paging.max_page_size = size;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that limits are usable.
    pub fn validate(&self) -> QueryResult<()> {
        if self.filters.max_filters == 0 {
            return Err(QueryError::configuration("filters.max_filters must be at least 1"));
        }
        if self.ordering.max_sort_keys == 0 {
            return Err(QueryError::configuration("ordering.max_sort_keys must be at least 1"));
        }
        if self.paging.max_page_size == 0 {
            return Err(QueryError::configuration("paging.max_page_size must be at least 1"));
        }
        if self.paging.default_page_size > self.paging.max_page_size {
            return Err(QueryError::configuration(format!(
                "paging.default_page_size ({}) exceeds paging.max_page_size ({})",
                self.paging.default_page_size, self.paging.max_page_size
            ))
            .with_help("Lower default_page_size or raise max_page_size"));
        }
        Ok(())
    }
}

impl FromStr for EngineConfig {
    type Err = QueryError;

    /// Parse configuration from a TOML string.
    fn from_str(content: &str) -> QueryResult<Self> {
        let expanded = expand_env_vars(content);

        let config: EngineConfig = toml::from_str(&expanded).map_err(|e| {
            QueryError::configuration(format!("Invalid configuration: {}", e.message())).with_source(e)
        })?;
        config.validate()?;
        debug!(?config, "EngineConfig loaded");
        Ok(config)
    }
}

fn env_usize(name: &str) -> QueryResult<Option<usize>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| QueryError::configuration(format!("{} must be a non-negative integer, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

fn parse_string_comparison(raw: &str) -> QueryResult<StringComparison> {
    match raw.trim().to_lowercase().as_str() {
        "ordinal" => Ok(StringComparison::Ordinal),
        "ignore_case" | "ignorecase" => Ok(StringComparison::IgnoreCase),
        _ => Err(QueryError::configuration(format!(
            "SIFT_STRING_COMPARISON must be 'ordinal' or 'ignore_case', got '{}'",
            raw
        ))),
    }
}

/// Expand `${VAR}` references. Unset variables are left as written.
fn expand_env_vars(content: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
