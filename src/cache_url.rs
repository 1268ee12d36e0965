// ampcache_rewriter::cache_url
//
// Builds the URL a subresource is served from on the cache:
//
//   https://<subdomain>.<cache-domain>/<type>[/w<N>][/s]/<host><path>[?q][#f]
//
//   <type>  r   any resource
//           i   image
//           ii  image with a requested width, followed by w<N>
//   s       present when the origin URL is https
//
// The cache URL itself is always https; the port of the origin is dropped.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RewriteError;
use crate::resolve::to_absolute_url;
use crate::subdomain::to_cache_subdomain;

/// Parent domain of every cache subdomain unless configured otherwise.
pub const DEFAULT_CACHE_DOMAIN: &str = "cdn.ampproject.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubresourceType {
    Image,
    #[default]
    Other,
}

/// One occurrence of a subresource reference in a document.
///
/// `start..end` is the byte range of the reference in the source text; it is
/// only carried along so the caller can splice the rewritten URL back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceOffset {
    pub sub_type: SubresourceType,
    pub start: usize,
    pub end: usize,
    /// Requested display width. Ignored unless positive and `sub_type` is
    /// `Image`.
    pub desired_image_width: i32,
}

impl SubresourceOffset {
    pub fn new(sub_type: SubresourceType, start: usize, end: usize) -> Self {
        Self {
            sub_type,
            start,
            end,
            desired_image_width: 0,
        }
    }

    pub fn with_width(mut self, width: i32) -> Self {
        self.desired_image_width = width;
        self
    }

    /// The width marker to encode, if any.
    pub fn image_width(&self) -> Option<u32> {
        match self.sub_type {
            SubresourceType::Image if self.desired_image_width > 0 => {
                Some(self.desired_image_width.unsigned_abs())
            }
            _ => None,
        }
    }

    /// Cache URL on the default cache domain.
    pub fn get_cache_url(
        &self,
        document_url: &str,
        base: &Url,
        raw: &str,
    ) -> Result<Url, RewriteError> {
        self.get_cache_url_on(DEFAULT_CACHE_DOMAIN, document_url, base, raw)
    }

    /// Cache URL under `cache_domain`.
    ///
    /// Fails with [`RewriteError::UnsupportedScheme`] when `raw` is empty,
    /// points into the document itself, or does not resolve to http/https.
    pub fn get_cache_url_on(
        &self,
        cache_domain: &str,
        document_url: &str,
        base: &Url,
        raw: &str,
    ) -> Result<Url, RewriteError> {
        let unsupported = || RewriteError::UnsupportedScheme(raw.to_string());

        let absolute = to_absolute_url(document_url, base, raw);
        let origin = Url::parse(&absolute).map_err(|_| unsupported())?;
        let secure = match origin.scheme() {
            "https" => true,
            "http" => false,
            _ => return Err(unsupported()),
        };
        let host = origin.host_str().ok_or_else(unsupported)?;

        let mut prefix = match (self.sub_type, self.image_width()) {
            (_, Some(width)) => format!("ii/w{width}"),
            (SubresourceType::Image, None) => "i".to_string(),
            (SubresourceType::Other, None) => "r".to_string(),
        };
        if secure {
            prefix.push_str("/s");
        }

        let mut cache_url = origin.clone();
        cache_url.set_port(None).map_err(|_| unsupported())?;
        cache_url.set_scheme("https").map_err(|_| unsupported())?;
        cache_url.set_username("").map_err(|_| unsupported())?;
        cache_url.set_password(None).map_err(|_| unsupported())?;
        cache_url
            .set_host(Some(&format!("{}.{}", to_cache_subdomain(host), cache_domain)))
            .map_err(|_| RewriteError::InvalidCacheDomain(cache_domain.to_string()))?;
        cache_url.set_path(&format!("/{prefix}/{host}{}", origin.path()));

        Ok(cache_url)
    }
}
