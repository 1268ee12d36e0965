// ampcache_rewriter::subdomain
//
// Origin host → cache subdomain label.
//
// Human-readable form:  www.my-site.com  →  www-my--site-com
//   literal hyphens are doubled, dots become single hyphens, and the result
//   is punycoded again when it holds non-ASCII characters.
//
// Hashed form:  base32(sha256(host)), lowercase, unpadded, 52 characters.
//   Used whenever the host or the readable form fails IDNA, the readable
//   form is too long or breaks the DNS label rules, or it mixes scripts in a
//   way that could render as a different host.

use idna::punycode;
use idna::uts46::{AsciiDenyList, DnsLength, Hyphens, Uts46};
use log::debug;
use sha2::{Digest, Sha256};

use crate::script::label_is_safe;

/// Longest label DNS allows.
pub const MAX_LABEL_LENGTH: usize = 63;

const ACE_PREFIX: &str = "xn--";
const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// An origin host together with the label it is served under on the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainLabel {
    /// Canonical ASCII form of the origin host, or its lowercased form when
    /// IDNA rejects it.
    pub origin: String,
    /// The single DNS label used as the cache subdomain.
    pub encoded: String,
    /// False when `encoded` is the hashed fallback.
    pub human_readable: bool,
}

impl DomainLabel {
    pub fn new(host: &str) -> Self {
        let mapped = map_deviations(&host.to_lowercase());
        let Ok(origin) = idna::domain_to_ascii(&mapped) else {
            debug!("{mapped}: rejected by IDNA, hashing");
            return Self::hashed(mapped);
        };
        match human_readable_label(&origin) {
            Some(encoded) => Self {
                origin,
                encoded,
                human_readable: true,
            },
            None => {
                debug!("falling back to hashed cache subdomain for {origin}");
                Self::hashed(origin)
            }
        }
    }

    fn hashed(origin: String) -> Self {
        let encoded = hashed_label(&origin);
        Self {
            origin,
            encoded,
            human_readable: false,
        }
    }
}

/// Encode an origin host as a cache subdomain label. Never fails.
pub fn to_cache_subdomain(host: &str) -> String {
    DomainLabel::new(host).encoded
}

/// Reverse a human-readable cache label back to the canonical origin host.
///
/// Returns `None` for hashed labels and for anything
/// [`to_cache_subdomain`] would not have produced.
pub fn from_cache_subdomain(label: &str) -> Option<String> {
    let unicode = decode_label(label)?;

    let mut host = String::with_capacity(unicode.len());
    let mut chars = unicode.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '-' {
            host.push(c);
            continue;
        }
        let mut run = 1;
        while chars.peek() == Some(&'-') {
            chars.next();
            run += 1;
        }
        match run {
            1 => host.push('.'),
            n if n % 2 == 0 => host.extend(std::iter::repeat('-').take(n / 2)),
            _ => return None,
        }
    }

    let ace = host
        .split('.')
        .map(encode_label)
        .collect::<Option<Vec<_>>>()?
        .join(".");
    let origin = canonicalize_host(&ace)?;
    (to_cache_subdomain(&origin) == label).then_some(origin)
}

/// Lowercase, apply the UTS #46 transitional deviations and convert to ASCII.
///
/// `None` when IDNA rejects the host.
pub fn canonicalize_host(host: &str) -> Option<String> {
    idna::domain_to_ascii(&map_deviations(&host.to_lowercase())).ok()
}

/// Transitional processing differs from the non-transitional mapping only in
/// these four code points.
fn map_deviations(host: &str) -> String {
    let mut out = String::with_capacity(host.len());
    for c in host.chars() {
        match c {
            'ß' => out.push_str("ss"),
            'ς' => out.push('σ'),
            '\u{200C}' | '\u{200D}' => {}
            _ => out.push(c),
        }
    }
    out
}

fn human_readable_label(origin: &str) -> Option<String> {
    // A lone label carries no structure worth exposing.
    if !origin.contains(|c| c == '.' || c == '-') {
        return None;
    }

    let labels = origin
        .split('.')
        .map(decode_label)
        .collect::<Option<Vec<_>>>()?;
    if labels
        .iter()
        .any(|l| l.is_empty() || l.starts_with('-') || l.ends_with('-'))
    {
        return None;
    }

    let candidate = labels
        .iter()
        .map(|l| l.replace('-', "--"))
        .collect::<Vec<_>>()
        .join("-");
    if !label_is_safe(&candidate) {
        debug!("{origin}: readable label {candidate:?} mixes scripts");
        return None;
    }

    // Bidi, joiner and length rules apply to the joined label as a whole.
    let encoded = Uts46::new()
        .to_ascii(
            candidate.as_bytes(),
            AsciiDenyList::STD3,
            Hyphens::Allow,
            DnsLength::Verify,
        )
        .map_err(|_| debug!("{origin}: readable label {candidate:?} fails IDNA"))
        .ok()?
        .into_owned();
    is_valid_dns_label(&encoded).then_some(encoded)
}

fn decode_label(label: &str) -> Option<String> {
    match label.strip_prefix(ACE_PREFIX) {
        Some(ace) => punycode::decode_to_string(ace),
        None => Some(label.to_string()),
    }
}

fn encode_label(label: &str) -> Option<String> {
    if label.is_ascii() {
        return Some(label.to_string());
    }
    punycode::encode_str(label).map(|ace| format!("{ACE_PREFIX}{ace}"))
}

/// LDH syntax, length, and no `--` in positions 3-4 unless it is the ACE prefix.
fn is_valid_dns_label(label: &str) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
        return false;
    }
    if !label
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    !(label.get(2..4) == Some("--") && !label.starts_with(ACE_PREFIX))
}

/// base32(sha256(origin)) without padding.
pub fn hashed_label(origin: &str) -> String {
    base32_lower(&Sha256::digest(origin.as_bytes()))
}

fn base32_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}
