// ampcache_rewriter::css
//
// Stylesheet subresources.  Tokenises CSS with `cssparser`, records the byte
// range of every URL reference, then splices cache URLs in at those ranges.
// Bytes outside the recorded ranges are never touched.
//
//   url(foo.png)  url("foo.png")      image, unless inside @font-face
//   @import "a.css" / @import url()   other
//   @font-face { src: url(…) }        other

use cssparser::{ParseError, Parser, ParserInput, Token};
use log::debug;
use url::Url;

use crate::cache_url::{SubresourceOffset, SubresourceType};

/// A URL reference found in a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssUrl {
    /// Range covers the whole `url(…)` token, or the quoted string of an
    /// `@import "…"`.
    pub offset: SubresourceOffset,
    pub url: String,
    /// False for the bare-string form of `@import`.
    pub url_function: bool,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Every URL reference in `css`, in source order.
pub fn find_subresources(css: &str) -> Vec<CssUrl> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut found = Vec::new();
    scan(&mut parser, SubresourceType::Image, &mut found);
    found
}

fn scan<'i, 't>(parser: &mut Parser<'i, 't>, kind: SubresourceType, found: &mut Vec<CssUrl>) {
    // Set by @import / @font-face until the end of that rule.
    let mut rule_kind: Option<SubresourceType> = None;
    let mut in_import = false;

    loop {
        let start = parser.position().byte_index();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => break,
        };
        let current = rule_kind.unwrap_or(kind);

        match token {
            Token::UnquotedUrl(ref value) => {
                let value: &str = value;
                found.push(css_url(current, start, parser.position().byte_index(), value, true));
                in_import = false;
            }

            Token::Function(ref name) if name.eq_ignore_ascii_case("url") => {
                let quoted: Result<String, ParseError<'i, ()>> = parser.parse_nested_block(|inner| {
                    let value: &str = inner.expect_string()?;
                    Ok(value.to_owned())
                });
                if let Ok(value) = quoted {
                    found.push(css_url(current, start, parser.position().byte_index(), &value, true));
                }
                in_import = false;
            }

            Token::QuotedString(ref value) if in_import => {
                let value: &str = value;
                found.push(css_url(current, start, parser.position().byte_index(), value, false));
                in_import = false;
            }

            Token::AtKeyword(ref name) => {
                in_import = name.eq_ignore_ascii_case("import");
                if in_import || name.eq_ignore_ascii_case("font-face") {
                    rule_kind = Some(SubresourceType::Other);
                }
            }

            Token::CurlyBracketBlock => {
                let _: Result<(), ParseError<'i, ()>> = parser.parse_nested_block(|inner| {
                    scan(inner, current, found);
                    Ok(())
                });
                rule_kind = None;
                in_import = false;
            }

            Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock => {
                let _: Result<(), ParseError<'i, ()>> = parser.parse_nested_block(|inner| {
                    scan(inner, current, found);
                    Ok(())
                });
            }

            Token::Semicolon => {
                rule_kind = None;
                in_import = false;
            }

            _ => {}
        }
    }
}

fn css_url(kind: SubresourceType, start: usize, end: usize, url: &str, url_function: bool) -> CssUrl {
    CssUrl {
        offset: SubresourceOffset::new(kind, start, end),
        url: url.to_string(),
        url_function,
    }
}

// ---------------------------------------------------------------------------
// Splicing
// ---------------------------------------------------------------------------

/// Rewrite every servable URL reference in `css` to its cache URL.
pub fn rewrite_css(cache_domain: &str, document_url: &str, base: &Url, css: &str) -> String {
    let mut out = css.to_string();

    for reference in find_subresources(css).into_iter().rev() {
        let offset = reference.offset;
        match offset.get_cache_url_on(cache_domain, document_url, base, &reference.url) {
            Ok(cache_url) => {
                let quoted = quote_css_string(cache_url.as_str());
                let replacement = if reference.url_function {
                    format!("url({quoted})")
                } else {
                    quoted
                };
                out.replace_range(offset.start..offset.end, &replacement);
            }
            Err(err) => debug!("leaving {:?} in stylesheet: {err}", reference.url),
        }
    }

    out
}

fn quote_css_string(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\a ");
    format!("\"{escaped}\"")
}
