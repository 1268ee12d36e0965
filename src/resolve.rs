// ampcache_rewriter::resolve
//
// Anchors a reference found in a document to an absolute URL.
//
//   ""                  → ""                (nothing to rewrite)
//   //host/path         → https://host/path (always upgraded)
//   mailto:, file:, …   → unchanged
//   /path, rel, #frag   → joined against the base URL
//
// A result that points back at the document itself (ignoring fragments) is
// reduced to its fragment so in-page anchors do not trigger a navigation.

use url::{ParseError, Url};

/// Resolve `raw` against `base`, reducing same-document links to `#fragment`.
///
/// Never fails: input that cannot be parsed is returned unchanged.
pub fn to_absolute_url(document_url: &str, base: &Url, raw: &str) -> String {
    let raw = raw.trim_matches(|c: char| c.is_ascii_whitespace());
    if raw.is_empty() {
        return String::new();
    }

    let Some((resolved, absolute)) = resolve(base, raw) else {
        return raw.to_string();
    };

    match resolved.fragment() {
        Some(fragment) if same_document(document_url, &resolved) => format!("#{fragment}"),
        _ => absolute,
    }
}

/// Parsed form plus the string callers get back. Inputs that already carry a
/// scheme keep their original spelling.
fn resolve(base: &Url, raw: &str) -> Option<(Url, String)> {
    if raw.starts_with("//") {
        let upgraded = format!("https:{raw}");
        return Url::parse(&upgraded).ok().map(|url| (url, upgraded));
    }

    match Url::parse(raw) {
        Ok(url) => Some((url, raw.to_string())),
        Err(ParseError::RelativeUrlWithoutBase) => base.join(raw).ok().map(|url| {
            let serialized = url.to_string();
            (url, serialized)
        }),
        Err(_) => None,
    }
}

fn same_document(document_url: &str, resolved: &Url) -> bool {
    let Ok(mut document) = Url::parse(document_url) else {
        return false;
    };
    document.set_fragment(None);

    let mut target = resolved.clone();
    target.set_fragment(None);

    document == target
}
