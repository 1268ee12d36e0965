// ampcache_rewriter
//
// Rewrites a publisher's document and its subresource references so they can
// be served from a distribution cache.  Compiled as a `cdylib` so the
// packager process can call into it over the C ABI.
//
// Exposed functions:
//   transform_document(input: *const c_char) -> *mut c_char
//   cache_url(input: *const c_char) -> *mut c_char
//
// Input and output are JSON (see `TransformInput` / `CacheUrlInput`).  On
// failure the output is `{ "error": "…" }`.
//
// Return value is a NUL-terminated C string allocated with CString.
// The caller MUST free it by calling `free_string`.

pub mod cache_url;
pub mod config;
pub mod css;
pub mod error;
pub mod html;
pub mod preload;
pub mod request;
pub mod resolve;
pub mod script;
pub mod subdomain;

pub use cache_url::{SubresourceOffset, SubresourceType, DEFAULT_CACHE_DOMAIN};
pub use config::RewriterConfig;
pub use error::{ConfigError, RewriteError};
pub use html::{transform, Transformed};
pub use preload::{Preload, PreloadCollector, RequestDestination};
pub use request::{HtmlFormat, Request, Transformer, TransformerSet};
pub use resolve::to_absolute_url;
pub use subdomain::{from_cache_subdomain, to_cache_subdomain, DomainLabel};

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::OnceLock;

use log::warn;
use serde::Deserialize;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TransformInput {
    request: Request,
    content: String,
}

#[derive(Deserialize)]
struct CacheUrlInput {
    document_url: String,
    #[serde(default)]
    base_url: Option<String>,
    url: String,
    #[serde(default)]
    kind: SubresourceType,
    #[serde(default)]
    width: i32,
}

static CONFIG: OnceLock<RewriterConfig> = OnceLock::new();

/// Config from `$AMPCACHE_REWRITER_CONFIG`, loaded on first use.
fn shared_config() -> &'static RewriterConfig {
    CONFIG.get_or_init(|| match std::env::var_os(config::CONFIG_ENV) {
        Some(path) => RewriterConfig::load(&path).unwrap_or_else(|err| {
            warn!("using default rewriter config: {err}");
            RewriterConfig::default()
        }),
        None => RewriterConfig::default(),
    })
}

fn run_transform(json: &str) -> Result<String, String> {
    let input: TransformInput = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let transformed =
        transform(shared_config(), &input.request, &input.content).map_err(|e| e.to_string())?;
    serde_json::to_string(&transformed).map_err(|e| e.to_string())
}

fn run_cache_url(json: &str) -> Result<String, String> {
    let input: CacheUrlInput = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let base_str = input.base_url.as_deref().unwrap_or(&input.document_url);
    let base = url::Url::parse(base_str).map_err(|e| format!("invalid base URL {base_str:?}: {e}"))?;

    let offset = SubresourceOffset::new(input.kind, 0, input.url.len()).with_width(input.width);
    let cache_url = offset
        .get_cache_url_on(&shared_config().cache_domain, &input.document_url, &base, &input.url)
        .map_err(|e| e.to_string())?;
    Ok(json!({ "url": cache_url.as_str() }).to_string())
}

fn respond(result: Result<String, String>) -> String {
    result.unwrap_or_else(|error| json!({ "error": error }).to_string())
}

/// Convert a Rust String into a heap-allocated C string.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Read a `*const c_char` into a `&str`.  Returns `None` on null or invalid
/// UTF-8.
unsafe fn read_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

// ---------------------------------------------------------------------------
// C ABI exports
// ---------------------------------------------------------------------------

/// Rewrite a document for the cache.
///
/// Input: JSON `{ "request": { "document_url": "…", … }, "content": "…" }`
/// Returns: JSON `{ "content": "…", "preloads": [ … ] }`, or null when the
/// input is not a valid C string.
///
/// # Safety
/// `input` must be null or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn transform_document(input: *const c_char) -> *mut c_char {
    match read_c_str(input) {
        Some(json) => to_c_string(respond(run_transform(json))),
        None => ptr::null_mut(),
    }
}

/// Build the cache URL of a single subresource.
///
/// Input: JSON `{ "document_url": "…", "base_url"?: "…", "url": "…",
/// "kind"?: "image" | "other", "width"?: N }`
/// Returns: JSON `{ "url": "…" }`.
///
/// # Safety
/// `input` must be null or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cache_url(input: *const c_char) -> *mut c_char {
    match read_c_str(input) {
        Some(json) => to_c_string(respond(run_cache_url(json))),
        None => ptr::null_mut(),
    }
}

/// Free a C string previously returned by one of the functions above.
///
/// # Safety
/// `ptr` must be null or a pointer returned by this library, freed once.
#[no_mangle]
pub unsafe extern "C" fn free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = CString::from_raw(ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: unsafe extern "C" fn(*const c_char) -> *mut c_char, input: &str) -> serde_json::Value {
        let input = CString::new(input).unwrap();
        unsafe {
            let out = f(input.as_ptr());
            assert!(!out.is_null());
            let text = CStr::from_ptr(out).to_str().unwrap().to_string();
            free_string(out);
            serde_json::from_str(&text).unwrap()
        }
    }

    #[test]
    fn cache_url_over_ffi() {
        let out = call(
            cache_url,
            r#"{"document_url":"https://example.com/","url":"http://www.example.com/blah.jpg","kind":"image","width":50}"#,
        );
        assert_eq!(
            out["url"],
            "https://www-example-com.cdn.ampproject.org/ii/w50/www.example.com/blah.jpg"
        );
    }

    #[test]
    fn cache_url_error_over_ffi() {
        let out = call(
            cache_url,
            r#"{"document_url":"https://example.com/","url":"data:image/png.foo"}"#,
        );
        assert!(out["error"].as_str().unwrap().contains("unsupported scheme"));
    }

    #[test]
    fn transform_over_ffi() {
        let out = call(
            transform_document,
            r#"{"request":{"document_url":"https://example.com/"},"content":"<html amp><body><img src=\"a.png\"></body></html>"}"#,
        );
        assert!(out["content"]
            .as_str()
            .unwrap()
            .contains("https://example-com.cdn.ampproject.org/i/s/example.com/a.png"));
        assert_eq!(out["preloads"], json!([]));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let out = call(transform_document, "{");
        assert!(out.get("error").is_some());
    }

    #[test]
    fn null_input_returns_null() {
        unsafe {
            assert!(cache_url(ptr::null()).is_null());
            free_string(ptr::null_mut());
        }
    }
}
