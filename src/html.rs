// ampcache_rewriter::html
//
// Document walker.  Parses the document with kuchikiki, runs the requested
// transformers over the tree and serialises it again.
//
//   url      img / amp-img / amp-anim            src, srcset   (image)
//            picture > source                    srcset        (image)
//            video / audio > source              src           (other)
//            link rel=icon                       href          (image)
//            link rel=stylesheet, script         href, src     (other)
//            <style> bodies, style="…"           url(…)        (css module)
//   preload  link rel=preload as=script|style|image  → lifted out of the
//            document into the response's preload list

use kuchikiki::traits::*;
use kuchikiki::{parse_html, ElementData, NodeDataRef, NodeRef};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache_url::{SubresourceOffset, SubresourceType};
use crate::config::RewriterConfig;
use crate::css::rewrite_css;
use crate::error::RewriteError;
use crate::preload::{Preload, PreloadCollector, RequestDestination};
use crate::request::{HtmlFormat, Request, Transformer};

/// Output of [`transform`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformed {
    pub content: String,
    pub preloads: Vec<Preload>,
}

struct Context<'a> {
    cache_domain: &'a str,
    document_url: &'a str,
    base: Url,
}

impl Context<'_> {
    fn cache_url(&self, sub_type: SubresourceType, width: i32, raw: &str) -> Option<String> {
        SubresourceOffset::new(sub_type, 0, raw.len())
            .with_width(width)
            .get_cache_url_on(self.cache_domain, self.document_url, &self.base, raw)
            .map(String::from)
            .map_err(|err| debug!("not rewriting {raw:?}: {err}"))
            .ok()
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Run the transformers `request` selects over `html`.
///
/// Fails only when the document URL is not http/https or a custom
/// transformer list names an unknown transformer.  Individual references
/// that cannot be served from the cache are left as they are.
pub fn transform(
    config: &RewriterConfig,
    request: &Request,
    html: &str,
) -> Result<Transformed, RewriteError> {
    let transformers = request.transformers.resolve()?;
    let document = Url::parse(&request.document_url)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .ok_or_else(|| RewriteError::UnsupportedScheme(request.document_url.clone()))?;

    if transformers.is_empty() {
        return Ok(Transformed {
            content: html.to_string(),
            preloads: Vec::new(),
        });
    }

    let doc = parse_html().one(html);
    check_format(&doc, request.html_format.unwrap_or(config.html_format));

    let ctx = Context {
        cache_domain: &config.cache_domain,
        document_url: &request.document_url,
        base: effective_base(&doc, request, &document),
    };

    let mut preloads = PreloadCollector::new();
    for transformer in transformers {
        match transformer {
            Transformer::UrlRewrite => rewrite_urls(&doc, &ctx),
            Transformer::Preload => collect_preloads(&doc, &ctx, &mut preloads),
        }
    }

    Ok(Transformed {
        content: serialize(&doc, html),
        preloads: preloads.into_preloads(),
    })
}

// ---------------------------------------------------------------------------
// URL rewriting
// ---------------------------------------------------------------------------

fn rewrite_urls(doc: &NodeRef, ctx: &Context<'_>) {
    let elements: Vec<NodeDataRef<ElementData>> = doc.descendants().elements().collect();

    for element in elements {
        let tag = element.name.local.to_string();
        match tag.as_str() {
            "img" | "amp-img" | "amp-anim" => rewrite_image(&element, ctx),
            "source" if parent_is(element.as_node(), "picture") => rewrite_image(&element, ctx),
            "source" => rewrite_attr(&element, "src", SubresourceType::Other, 0, ctx),
            "script" => rewrite_attr(&element, "src", SubresourceType::Other, 0, ctx),
            "link" => {
                let rel = attr(&element, "rel").unwrap_or_default();
                if has_rel(&rel, "preload") {
                    // Left for the preload transformer.
                } else if has_rel(&rel, "stylesheet") {
                    rewrite_attr(&element, "href", SubresourceType::Other, 0, ctx);
                } else if has_rel(&rel, "icon") || has_rel(&rel, "apple-touch-icon") {
                    rewrite_attr(&element, "href", SubresourceType::Image, 0, ctx);
                }
            }
            "style" => rewrite_style_element(element.as_node(), ctx),
            _ => {}
        }

        if let Some(style) = attr(&element, "style") {
            let rewritten = rewrite_css(ctx.cache_domain, ctx.document_url, &ctx.base, &style);
            set_attr(&element, "style", rewritten);
        }
    }
}

fn rewrite_image(element: &ElementData, ctx: &Context<'_>) {
    let width = attr(element, "width")
        .as_deref()
        .and_then(parse_width)
        .unwrap_or(0);
    rewrite_attr(element, "src", SubresourceType::Image, width, ctx);
    if let Some(srcset) = attr(element, "srcset") {
        set_attr(element, "srcset", rewrite_srcset(&srcset, ctx));
    }
}

fn rewrite_attr(
    element: &ElementData,
    name: &str,
    sub_type: SubresourceType,
    width: i32,
    ctx: &Context<'_>,
) {
    let Some(value) = attr(element, name) else {
        return;
    };
    if let Some(cache_url) = ctx.cache_url(sub_type, width, &value) {
        set_attr(element, name, cache_url);
    }
}

/// `url1 1x, url2 300w` → each candidate rewritten, `Nw` used as the width.
/// Candidates the cache cannot serve are kept as written.
fn rewrite_srcset(srcset: &str, ctx: &Context<'_>) -> String {
    srcset_candidates(srcset)
        .into_iter()
        .map(|(url, descriptor)| {
            let width = descriptor
                .strip_suffix('w')
                .and_then(|w| w.parse().ok())
                .unwrap_or(0);
            let url = ctx
                .cache_url(SubresourceType::Image, width, url)
                .unwrap_or_else(|| url.to_string());
            if descriptor.is_empty() {
                url
            } else {
                format!("{url} {descriptor}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a srcset into `(url, descriptor)` pairs the way HTML does: the URL
/// runs to the next whitespace (commas included), descriptors to the next
/// comma outside parentheses.
fn srcset_candidates(srcset: &str) -> Vec<(&str, &str)> {
    let mut candidates = Vec::new();
    let mut rest = srcset;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let (raw_url, after) = rest.split_at(url_end);

        // `a.jpg,b.jpg 2x`: trailing commas end a candidate with no descriptor.
        let url = raw_url.trim_end_matches(',');
        if url.len() < raw_url.len() {
            candidates.push((url, ""));
            rest = after;
            continue;
        }

        let mut depth = 0usize;
        let mut descriptor_end = after.len();
        for (i, c) in after.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    descriptor_end = i;
                    break;
                }
                _ => {}
            }
        }
        candidates.push((url, after[..descriptor_end].trim()));
        rest = &after[descriptor_end..];
    }

    candidates
}

fn rewrite_style_element(node: &NodeRef, ctx: &Context<'_>) {
    let css = node.text_contents();
    if css.is_empty() {
        return;
    }
    let rewritten = rewrite_css(ctx.cache_domain, ctx.document_url, &ctx.base, &css);
    if rewritten == css {
        return;
    }
    let children: Vec<NodeRef> = node.children().collect();
    for child in children {
        child.detach();
    }
    node.append(NodeRef::new_text(rewritten));
}

// ---------------------------------------------------------------------------
// Preloads
// ---------------------------------------------------------------------------

fn collect_preloads(doc: &NodeRef, ctx: &Context<'_>, preloads: &mut PreloadCollector) {
    let links: Vec<NodeDataRef<ElementData>> = doc
        .descendants()
        .elements()
        .filter(|e| &*e.name.local == "link")
        .collect();

    for link in links {
        if !has_rel(&attr(&link, "rel").unwrap_or_default(), "preload") {
            continue;
        }
        let Some(destination) = attr(&link, "as")
            .as_deref()
            .and_then(RequestDestination::from_link_as)
        else {
            continue;
        };
        let Some(href) = attr(&link, "href") else {
            continue;
        };
        let media = attr(&link, "media");

        if preloads.collect(
            ctx.cache_domain,
            ctx.document_url,
            &ctx.base,
            &href,
            destination,
            media.as_deref(),
        ) {
            link.as_node().detach();
        }
    }
}

// ---------------------------------------------------------------------------
// Document helpers
// ---------------------------------------------------------------------------

/// Request override, then `<base href>`, then the document URL itself.
fn effective_base(doc: &NodeRef, request: &Request, document: &Url) -> Url {
    request
        .base_url
        .clone()
        .or_else(|| find_base_href(doc))
        .and_then(|href| document.join(&href).ok())
        .unwrap_or_else(|| document.clone())
}

fn find_base_href(doc: &NodeRef) -> Option<String> {
    doc.descendants()
        .elements()
        .find(|e| &*e.name.local == "base")
        .and_then(|base| attr(&base, "href"))
}

fn check_format(doc: &NodeRef, format: HtmlFormat) {
    let markers = format.root_attributes();
    if markers.is_empty() {
        return;
    }
    let Some(root) = doc.descendants().elements().find(|e| &*e.name.local == "html") else {
        return;
    };
    let attrs = root.attributes.borrow();
    if !markers.iter().any(|marker| attrs.contains(*marker)) {
        warn!("<html> carries none of {markers:?}; document may not be {format:?}");
    }
}

fn serialize(doc: &NodeRef, original: &str) -> String {
    let mut buf = Vec::new();
    if let Err(err) = doc.serialize(&mut buf) {
        warn!("serialising rewritten document failed, returning it unchanged: {err}");
        return original.to_string();
    }
    String::from_utf8(buf).unwrap_or_else(|_| original.to_string())
}

fn attr(element: &ElementData, name: &str) -> Option<String> {
    element.attributes.borrow().get(name).map(str::to_string)
}

fn set_attr(element: &ElementData, name: &str, value: String) {
    element.attributes.borrow_mut().insert(name, value);
}

fn parent_is(node: &NodeRef, tag: &str) -> bool {
    node.parent()
        .and_then(|parent| parent.into_element_ref())
        .is_some_and(|parent| &*parent.name.local == tag)
}

fn has_rel(rel: &str, wanted: &str) -> bool {
    rel.split_ascii_whitespace().any(|r| r.eq_ignore_ascii_case(wanted))
}

fn parse_width(value: &str) -> Option<i32> {
    value.trim().trim_end_matches("px").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::TransformerSet;

    const DOC: &str = "https://example.com/news/story.html";

    fn run(html: &str) -> Transformed {
        transform(&RewriterConfig::default(), &Request::new(DOC), html).unwrap()
    }

    #[test]
    fn rewrites_image_src_with_width() {
        let out = run(r#"<html amp><body><amp-img src="/a.jpg" width="300"></amp-img></body></html>"#);
        assert!(out
            .content
            .contains(r#"src="https://example-com.cdn.ampproject.org/ii/w300/s/example.com/a.jpg""#));
    }

    #[test]
    fn rewrites_srcset_candidates() {
        let out = run(r#"<html amp><body><img srcset="a.jpg 100w, b.jpg 2x"></body></html>"#);
        assert!(out.content.contains(
            "https://example-com.cdn.ampproject.org/ii/w100/s/example.com/news/a.jpg 100w, \
             https://example-com.cdn.ampproject.org/i/s/example.com/news/b.jpg 2x"
        ));
    }

    #[test]
    fn honours_base_element() {
        let out = run(r#"<html amp><head><base href="http://static.example.com/"></head><body><script src="app.js"></script></body></html>"#);
        assert!(out
            .content
            .contains("https://static-example-com.cdn.ampproject.org/r/static.example.com/app.js"));
    }

    #[test]
    fn leaves_unsupported_references_alone() {
        let out = run(r#"<html amp><body><img src="data:image/gif;base64,R0lGOD"></body></html>"#);
        assert!(out.content.contains(r#"src="data:image/gif;base64,R0lGOD""#));
    }

    #[test]
    fn rewrites_style_blocks_and_attributes() {
        let out = run(
            r#"<html amp><head><style amp-custom>p{background:url(bg.png)}</style></head><body><div style="background:url(/d.png)"></div></body></html>"#,
        );
        assert!(out
            .content
            .contains("https://example-com.cdn.ampproject.org/i/s/example.com/news/bg.png"));
        assert!(out
            .content
            .contains("https://example-com.cdn.ampproject.org/i/s/example.com/d.png"));
    }

    #[test]
    fn lifts_preloads_out_of_the_document() {
        let out = run(
            r#"<html amp><head><link rel="preload" as="image" href="/hero.jpg" media="(min-width: 600px)"><link rel="preload" as="font" href="/f.woff2"></head><body></body></html>"#,
        );
        assert_eq!(out.preloads.len(), 1);
        assert_eq!(
            out.preloads[0].url,
            "https://example-com.cdn.ampproject.org/i/s/example.com/hero.jpg"
        );
        assert_eq!(out.preloads[0].media.as_deref(), Some("(min-width: 600px)"));
        assert!(!out.content.contains("hero.jpg"));
        assert!(out.content.contains("/f.woff2"));
    }

    #[test]
    fn none_returns_input_verbatim() {
        let mut request = Request::new(DOC);
        request.transformers = TransformerSet::None;
        let html = "<p>not even a full document";
        let out = transform(&RewriterConfig::default(), &request, html).unwrap();
        assert_eq!(out.content, html);
        assert!(out.preloads.is_empty());
    }

    #[test]
    fn rejects_non_http_document() {
        let request = Request::new("file:///tmp/doc.html");
        let err = transform(&RewriterConfig::default(), &request, "").unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedScheme(_)));
    }

    #[test]
    fn srcset_keeps_data_candidates_whole() {
        let out = run(r#"<html amp><body><img srcset="data:image/png;base64,AAAA 1x, b.jpg 2x"></body></html>"#);
        assert!(out.content.contains(
            "data:image/png;base64,AAAA 1x, \
             https://example-com.cdn.ampproject.org/i/s/example.com/news/b.jpg 2x"
        ));
        assert!(!out.content.contains("example.com/news/AAAA"));
    }

    #[test]
    fn srcset_candidate_splitting() {
        assert_eq!(
            srcset_candidates(" a.jpg 1x,b.jpg, c.jpg 300w , data:x,y 2x "),
            vec![("a.jpg", "1x"), ("b.jpg", ""), ("c.jpg", "300w"), ("data:x,y", "2x")]
        );
        assert_eq!(srcset_candidates("a.jpg (max-width: 1, 2) 1x"), vec![("a.jpg", "(max-width: 1, 2) 1x")]);
        assert!(srcset_candidates(" , ").is_empty());
    }

    #[test]
    fn source_type_follows_parent() {
        let out = run(
            r#"<html amp><body><picture><source srcset="p.jpg 200w"></picture><amp-video><source src="v.mp4" type="video/mp4"></amp-video><video><source src="/w.webm"></video></body></html>"#,
        );
        assert!(out
            .content
            .contains("https://example-com.cdn.ampproject.org/ii/w200/s/example.com/news/p.jpg 200w"));
        assert!(out
            .content
            .contains("https://example-com.cdn.ampproject.org/r/s/example.com/news/v.mp4"));
        assert!(out
            .content
            .contains("https://example-com.cdn.ampproject.org/r/s/example.com/w.webm"));
    }

    #[test]
    fn srcset_width_parsing() {
        assert_eq!(parse_width("300"), Some(300));
        assert_eq!(parse_width(" 120px "), Some(120));
        assert_eq!(parse_width("auto"), None);
    }
}
