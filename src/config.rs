// ampcache_rewriter::config
//
// Rewriter configuration, loaded from TOML.
//
//   cache_domain = "cdn.ampproject.org"
//   html_format = "AMP"

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache_url::DEFAULT_CACHE_DOMAIN;
use crate::error::ConfigError;
use crate::request::HtmlFormat;

/// Environment variable the C ABI reads the config path from.
pub const CONFIG_ENV: &str = "AMPCACHE_REWRITER_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriterConfig {
    /// Parent domain every cache subdomain is placed under.
    pub cache_domain: String,
    /// Format assumed for requests that do not name one.
    pub html_format: HtmlFormat,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            cache_domain: DEFAULT_CACHE_DOMAIN.to_string(),
            html_format: HtmlFormat::default(),
        }
    }
}

impl RewriterConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(s)?;
        config.cache_domain = config.cache_domain.trim().trim_end_matches('.').to_ascii_lowercase();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let domain = &self.cache_domain;
        let well_formed = !domain.is_empty()
            && domain.split('.').all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && !label.starts_with('-')
                    && !label.ends_with('-')
                    && label
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
            });
        if well_formed {
            Ok(())
        } else {
            Err(ConfigError::InvalidCacheDomain(domain.clone()))
        }
    }
}
