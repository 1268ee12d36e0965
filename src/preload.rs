// ampcache_rewriter::preload
//
// Collects preload hints for the response: each hint is a cache URL, the
// request destination it will be fetched as, and (images only) a media
// query.  A hint whose URL cannot be served from the cache is dropped.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache_url::{SubresourceOffset, SubresourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDestination {
    Script,
    Style,
    Image,
}

impl RequestDestination {
    /// Parse the value of a `<link as=…>` attribute. Only destinations the
    /// cache preloads are recognised.
    pub fn from_link_as(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "script" => Some(Self::Script),
            "style" => Some(Self::Style),
            "image" => Some(Self::Image),
            _ => None,
        }
    }

    fn subresource_type(self) -> SubresourceType {
        match self {
            Self::Image => SubresourceType::Image,
            Self::Script | Self::Style => SubresourceType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preload {
    pub url: String,
    #[serde(rename = "as")]
    pub destination: RequestDestination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

/// Ordered, de-duplicated preload hints for one document.
#[derive(Debug, Default)]
pub struct PreloadCollector {
    preloads: Vec<Preload>,
    seen: HashSet<String>,
}

impl PreloadCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn a reference into a cache-URL preload. Returns whether a hint was
    /// added; unsupported references are dropped.
    pub fn collect(
        &mut self,
        cache_domain: &str,
        document_url: &str,
        base: &Url,
        raw: &str,
        destination: RequestDestination,
        media: Option<&str>,
    ) -> bool {
        let offset = SubresourceOffset::new(destination.subresource_type(), 0, raw.len());
        match offset.get_cache_url_on(cache_domain, document_url, base, raw) {
            Ok(url) => self.push(Preload {
                url: url.into(),
                destination,
                media: media
                    .filter(|_| destination == RequestDestination::Image)
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string),
            }),
            Err(err) => {
                debug!("dropping preload for {raw:?}: {err}");
                false
            }
        }
    }

    pub fn push(&mut self, preload: Preload) -> bool {
        if !self.seen.insert(preload.url.clone()) {
            return false;
        }
        self.preloads.push(preload);
        true
    }

    pub fn len(&self) -> usize {
        self.preloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preloads.is_empty()
    }

    pub fn into_preloads(self) -> Vec<Preload> {
        self.preloads
    }
}
