// ampcache_rewriter::error
//
// Error types for cache URL construction, transformer selection and
// configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while rewriting a document or one of its references.
///
/// `UnsupportedScheme` is the only one produced by the URL core itself; it is
/// always recoverable by leaving the original reference in place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// The reference is empty, unparseable, or resolves to a scheme other
    /// than http/https.
    #[error("unsupported scheme in {0:?}: only http and https can be served from the cache")]
    UnsupportedScheme(String),

    /// A custom transformer list named a transformer that does not exist.
    #[error("unknown transformer {0:?}")]
    UnknownTransformer(String),

    /// The configured cache domain cannot be used as a host.
    #[error("invalid cache domain {0:?}")]
    InvalidCacheDomain(String),
}

/// Errors raised while loading a [`RewriterConfig`](crate::config::RewriterConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cache_domain must be a bare ASCII host name, got {0:?}")]
    InvalidCacheDomain(String),
}
