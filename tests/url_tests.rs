//! Resolution and cache URL construction against the reference vectors.

use ampcache_rewriter::*;
use url::Url;

const ROOT_URL: &str = "https://www.example.com/";
const FOO_URL: &str = "https://www.example.com/foo";
const BAR_URL: &str = "https://www.example.com/bar";
const OTHER_URL: &str = "http://otherdomain.com";

#[test]
fn test_to_absolute_url() {
    // (description, input, base, document, expected)
    let bar_dogs = format!("{BAR_URL}#dogs");
    let root_dogs = format!("{ROOT_URL}#dogs");
    let test_cases = vec![
        ("empty", "", BAR_URL, ROOT_URL, ""),
        ("protocol relative upgraded to https", "//domain.com", BAR_URL, "http://example.com/", "https://domain.com"),
        ("unusual protocol", "file://foo.txt", BAR_URL, ROOT_URL, "file://foo.txt"),
        ("mailto protocol", "mailto:user@example.com", BAR_URL, ROOT_URL, "mailto:user@example.com"),
        ("valid absolute", FOO_URL, BAR_URL, ROOT_URL, FOO_URL),
        ("valid relative", "/foo", BAR_URL, ROOT_URL, FOO_URL),
        ("relative to base, not document", "/foo", ROOT_URL, OTHER_URL, FOO_URL),
        ("absolute with different base", FOO_URL, OTHER_URL, ROOT_URL, FOO_URL),
        ("empty fragment preserved", "#", ROOT_URL, ROOT_URL, "#"),
        ("fragment same base", bar_dogs.as_str(), BAR_URL, ROOT_URL, bar_dogs.as_str()),
        ("fragment different base", bar_dogs.as_str(), OTHER_URL, ROOT_URL, bar_dogs.as_str()),
        ("same url ignoring fragment", "#dogs", ROOT_URL, ROOT_URL, "#dogs"),
        ("fragment differs from document", "#dogs", ROOT_URL, OTHER_URL, root_dogs.as_str()),
    ];

    for (desc, input, base, document, expected) in test_cases {
        let base = Url::parse(base).unwrap();
        let actual = to_absolute_url(document, &base, input);
        assert_eq!(actual, expected, "{desc}: to_absolute_url({input:?})");
    }
}

#[test]
fn test_absolute_urls_are_idempotent() {
    let bases = ["https://a.example/", "http://b.example/x/y", "https://c.example/?q#f"];
    for base in bases {
        let base = Url::parse(base).unwrap();
        for input in ["https://www.example.com/x?y=1#z", "http://x.example/", "mailto:a@b.c"] {
            assert_eq!(to_absolute_url(ROOT_URL, &base, input), input);
        }
    }
}

#[test]
fn test_protocol_relative_always_https() {
    for (document, base) in [
        ("http://a.example/", "http://a.example/"),
        ("https://a.example/", "https://b.example/"),
        ("http://a.example/", "ftp://files.example/"),
    ] {
        let base = Url::parse(base).unwrap();
        let out = to_absolute_url(document, &base, "//cdn.example.net/x.js");
        assert!(out.starts_with("https://"), "{out}");
    }
}

struct CacheCase {
    desc: &'static str,
    input: &'static str,
    width: i32,
    expected_image: Option<&'static str>,
    expected_other: Option<&'static str>,
}

#[test]
fn test_get_cache_url() {
    let test_cases = vec![
        CacheCase {
            desc: "empty string",
            input: "",
            width: 0,
            expected_image: None,
            expected_other: None,
        },
        CacheCase {
            desc: "image",
            input: "http://www.example.com/blah.jpg",
            width: 0,
            expected_image: Some("https://www-example-com.cdn.ampproject.org/i/www.example.com/blah.jpg"),
            expected_other: Some("https://www-example-com.cdn.ampproject.org/r/www.example.com/blah.jpg"),
        },
        CacheCase {
            desc: "secure",
            input: "https://www.example.com/blah.jpg",
            width: 0,
            expected_image: Some("https://www-example-com.cdn.ampproject.org/i/s/www.example.com/blah.jpg"),
            expected_other: Some("https://www-example-com.cdn.ampproject.org/r/s/www.example.com/blah.jpg"),
        },
        CacheCase {
            desc: "image with requested width",
            input: "http://www.example.com/blah.jpg",
            width: 50,
            expected_image: Some("https://www-example-com.cdn.ampproject.org/ii/w50/www.example.com/blah.jpg"),
            expected_other: Some("https://www-example-com.cdn.ampproject.org/r/www.example.com/blah.jpg"),
        },
        CacheCase {
            desc: "image negative width",
            input: "http://www.example.com/blah.jpg",
            width: -50,
            expected_image: Some("https://www-example-com.cdn.ampproject.org/i/www.example.com/blah.jpg"),
            expected_other: Some("https://www-example-com.cdn.ampproject.org/r/www.example.com/blah.jpg"),
        },
        CacheCase {
            desc: "fragment",
            input: "https://localhost.test/icons/below.svg#icon-whatsapp",
            width: 0,
            expected_image: Some("https://localhost-test.cdn.ampproject.org/i/s/localhost.test/icons/below.svg#icon-whatsapp"),
            expected_other: Some("https://localhost-test.cdn.ampproject.org/r/s/localhost.test/icons/below.svg#icon-whatsapp"),
        },
        CacheCase {
            desc: "port is dropped",
            input: "http://www.example.com:8080/blah.jpg",
            width: 0,
            expected_image: Some("https://www-example-com.cdn.ampproject.org/i/www.example.com/blah.jpg"),
            expected_other: Some("https://www-example-com.cdn.ampproject.org/r/www.example.com/blah.jpg"),
        },
        CacheCase {
            desc: "unsupported scheme",
            input: "data:image/png.foo",
            width: 0,
            expected_image: None,
            expected_other: None,
        },
        CacheCase {
            desc: "relative url with width",
            input: "itshappening.gif",
            width: 100,
            expected_image: Some("https://example-com.cdn.ampproject.org/ii/w100/s/example.com/itshappening.gif"),
            expected_other: Some("https://example-com.cdn.ampproject.org/r/s/example.com/itshappening.gif"),
        },
    ];

    let document_url = "https://example.com/";
    let base = Url::parse(document_url).unwrap();

    for tc in &test_cases {
        for (sub_type, expected) in [
            (SubresourceType::Other, tc.expected_other),
            (SubresourceType::Image, tc.expected_image),
        ] {
            let offset = SubresourceOffset::new(sub_type, 0, tc.input.len()).with_width(tc.width);
            let result = offset.get_cache_url(document_url, &base, tc.input);
            match expected {
                Some(expected) => {
                    let url = result.unwrap_or_else(|e| panic!("{}: unexpected error {e}", tc.desc));
                    assert_eq!(url.as_str(), expected, "{} ({sub_type:?})", tc.desc);
                    assert_eq!(url.scheme(), "https");
                }
                None => assert!(
                    matches!(result, Err(RewriteError::UnsupportedScheme(_))),
                    "{} ({sub_type:?}): expected an error, got {result:?}",
                    tc.desc
                ),
            }
        }
    }
}

#[test]
fn test_cache_url_carries_offsets_untouched() {
    let offset = SubresourceOffset::new(SubresourceType::Image, 17, 42).with_width(64);
    let base = Url::parse("https://example.com/").unwrap();
    offset.get_cache_url("https://example.com/", &base, "/a.png").unwrap();
    assert_eq!((offset.start, offset.end, offset.desired_image_width), (17, 42, 64));
}
