// ampcache_rewriter::request
//
// Request descriptor handed over by the packaging pipeline.

use serde::{Deserialize, Serialize};

use crate::error::RewriteError;

/// HTML compatibility mode of the document being packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HtmlFormat {
    #[default]
    Amp,
    Amp4Ads,
    Amp4Email,
    Experimental,
}

impl HtmlFormat {
    /// Attributes on `<html>` that identify a document of this format.
    pub fn root_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Amp => &["⚡", "amp"],
            Self::Amp4Ads => &["⚡4ads", "amp4ads"],
            Self::Amp4Email => &["⚡4email", "amp4email"],
            Self::Experimental => &[],
        }
    }
}

/// A single document pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformer {
    /// Rewrite subresource references to cache URLs.
    UrlRewrite,
    /// Lift `<link rel=preload>` hints out of the document.
    Preload,
}

impl Transformer {
    pub fn from_name(name: &str) -> Result<Self, RewriteError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "url" | "urlrewrite" => Ok(Self::UrlRewrite),
            "preload" => Ok(Self::Preload),
            _ => Err(RewriteError::UnknownTransformer(name.to_string())),
        }
    }
}

/// Which transformers to run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransformerSet {
    #[default]
    Default,
    None,
    Validation,
    Custom(Vec<String>),
}

impl TransformerSet {
    /// The ordered list of passes this selection stands for.
    pub fn resolve(&self) -> Result<Vec<Transformer>, RewriteError> {
        match self {
            Self::Default => Ok(vec![Transformer::UrlRewrite, Transformer::Preload]),
            Self::None => Ok(Vec::new()),
            Self::Validation => Ok(vec![Transformer::Preload]),
            Self::Custom(names) => names.iter().map(|n| Transformer::from_name(n)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// URL the document was fetched from.
    pub document_url: String,
    /// Resolution base overriding both the document URL and any `<base>`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Falls back to the configured format when absent.
    #[serde(default)]
    pub html_format: Option<HtmlFormat>,
    #[serde(default)]
    pub transformers: TransformerSet,
}

impl Request {
    pub fn new(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
            base_url: None,
            html_format: None,
            transformers: TransformerSet::Default,
        }
    }
}
