//! Input and output guards
//!
//! Everything that crosses the trust boundary passes through here: prompts
//! and image URLs before they reach the upstream provider, and user text
//! before it is interpolated into markdown returned to the agent.

use crate::error::{AppError, AppResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Maximum allowed prompt length in characters (100K chars)
pub const MAX_PROMPT_LENGTH: usize = 100_000;

/// Smallest generated image side in pixels
pub const MIN_IMAGE_DIMENSION: u32 = 64;

/// Largest generated image side in pixels
pub const MAX_IMAGE_DIMENSION: u32 = 2048;

/// Hostnames that resolve to instance metadata or the local machine
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "ip6-localhost",
    "ip6-loopback",
    "metadata.google.internal",
    "metadata.aws.internal",
    "instance-data",
];

/// Validate a prompt (non-empty after trimming, bounded length)
///
/// Length is counted in Unicode characters, not bytes.
pub fn validate_prompt(prompt: &str) -> AppResult<()> {
    if prompt.trim().is_empty() {
        return Err(AppError::Validation(
            "prompt cannot be empty or contain only whitespace".to_string(),
        ));
    }

    let char_count = prompt.chars().count();
    if char_count > MAX_PROMPT_LENGTH {
        return Err(AppError::Validation(format!(
            "prompt exceeds maximum length of {} characters (got {})",
            MAX_PROMPT_LENGTH, char_count
        )));
    }

    Ok(())
}

/// Validate an image URL before it is forwarded upstream
///
/// Rejects malformed URLs, non-http(s) schemes, and hosts that name the local
/// machine or a private/internal address range. Hostnames are checked
/// literally; `url` already normalizes decimal and hex IPv4 forms.
pub fn validate_image_url(raw: &str) -> AppResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Validation("image_url cannot be empty".to_string()));
    }

    let url = Url::parse(raw)
        .map_err(|e| AppError::Validation(format!("image_url is not a valid URL: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::Validation(format!(
            "image_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    match url.host() {
        None => {
            return Err(AppError::Validation(
                "image_url must include a host".to_string(),
            ));
        }
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if BLOCKED_HOSTNAMES.contains(&domain.as_str())
                || domain.ends_with(".localhost")
                || domain.ends_with(".internal")
            {
                return Err(AppError::Validation(format!(
                    "image_url host '{}' is not allowed",
                    domain
                )));
            }
        }
        Some(Host::Ipv4(ip)) => reject_internal_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => reject_internal_ip(IpAddr::V6(ip))?,
    }

    Ok(url)
}

fn reject_internal_ip(ip: IpAddr) -> AppResult<()> {
    if is_internal_ip(&ip) {
        return Err(AppError::Validation(format!(
            "image_url points to an internal address ({})",
            ip
        )));
    }
    Ok(())
}

/// True for loopback, private, link-local, CGNAT, unspecified and unique-local addresses
pub fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_ipv4(v4),
        IpAddr::V6(v6) => {
            if let Some(embedded) = embedded_ipv4(v6) {
                return is_internal_ipv4(&embedded);
            }
            is_internal_ipv6(v6)
        }
    }
}

/// IPv4 address carried inside an IPv6 literal, if any
///
/// Covers IPv4-mapped `::ffff:0:0/96`, IPv4-compatible `::/96` (except
/// `::` and `::1`), NAT64 `64:ff9b::/96` and 6to4 `2002::/16`.
fn embedded_ipv4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return Some(mapped);
    }
    let segments = ip.segments();
    let from_pair = |hi: u16, lo: u16| {
        let [a, b] = hi.to_be_bytes();
        let [c, d] = lo.to_be_bytes();
        Ipv4Addr::new(a, b, c, d)
    };
    match segments {
        [0x0064, 0xff9b, 0, 0, 0, 0, hi, lo] => Some(from_pair(hi, lo)),
        [0x2002, hi, lo, ..] => Some(from_pair(hi, lo)),
        _ if ip.is_unspecified() || ip.is_loopback() => None,
        _ => ip.to_ipv4(),
    }
}

fn is_internal_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        // 0.0.0.0/8 "this network"
        || octets[0] == 0
}

fn is_internal_ipv6(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (segments[0] & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (segments[0] & 0xffc0) == 0xfe80
}

/// Clamp image generation dimensions to [`MIN_IMAGE_DIMENSION`, `MAX_IMAGE_DIMENSION`]
pub fn clamp_dimensions(width: u32, height: u32) -> (u32, u32) {
    (
        width.clamp(MIN_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION),
        height.clamp(MIN_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION),
    )
}

/// Escape user text for safe interpolation into markdown output
///
/// Markdown metacharacters are backslash-escaped, angle brackets become
/// entities, and line breaks collapse to spaces so the text cannot open a
/// new block, link, image or HTML tag.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '`' | '*' | '_' | '{' | '}' | '[' | ']' | '(' | ')' | '#' | '+' | '-'
            | '.' | '!' | '|' | '~' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' | '\n' => escaped.push(' '),
            c if c.is_control() => {}
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_prompt_rejects_empty_and_whitespace() {
        for prompt in ["", " ", "\t", "\n", " \t\n "] {
            assert!(
                validate_prompt(prompt).is_err(),
                "prompt {:?} should be rejected",
                prompt
            );
        }
    }

    #[test]
    fn test_validate_prompt_counts_characters_not_bytes() {
        // 100K multi-byte chars is exactly at the limit
        let at_limit = "é".repeat(MAX_PROMPT_LENGTH);
        assert!(validate_prompt(&at_limit).is_ok());

        let over_limit = "a".repeat(MAX_PROMPT_LENGTH + 1);
        let err = validate_prompt(&over_limit).unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[test]
    fn test_validate_image_url_accepts_public_https() {
        let url = validate_image_url("https://example.com/image.png").unwrap();
        assert_eq!(url.as_str(), "https://example.com/image.png");
        assert!(validate_image_url("http://sub.example.org/path").is_ok());
        assert!(validate_image_url("https://8.8.8.8/img.jpg").is_ok());
    }

    #[test]
    fn test_validate_image_url_rejects_loopback() {
        assert!(validate_image_url("http://127.0.0.1/x").is_err());
        assert!(validate_image_url("http://localhost/x").is_err());
        assert!(validate_image_url("https://localhost:8443/image.png").is_err());
        assert!(validate_image_url("http://[::1]/x").is_err());
        assert!(validate_image_url("http://app.localhost/x").is_err());
    }

    #[test]
    fn test_validate_image_url_rejects_encoded_loopback() {
        // url normalizes these to 127.0.0.1
        assert!(validate_image_url("http://2130706433/x").is_err());
        assert!(validate_image_url("http://0x7f000001/x").is_err());
    }

    #[test]
    fn test_validate_image_url_rejects_private_ranges() {
        assert!(validate_image_url("https://192.168.1.10/some/path").is_err());
        assert!(validate_image_url("http://10.0.0.5/x").is_err());
        assert!(validate_image_url("http://172.16.3.4/x").is_err());
        assert!(validate_image_url("http://169.254.169.254/latest/meta-data/").is_err());
        assert!(validate_image_url("http://100.64.0.1/x").is_err());
        assert!(validate_image_url("http://0.0.0.0/x").is_err());
        assert!(validate_image_url("http://[fd00::1]/x").is_err());
        assert!(validate_image_url("http://[::ffff:10.0.0.1]/x").is_err());
        // IPv4-compatible, NAT64 and 6to4 forms carry the same ranges
        assert!(validate_image_url("http://[::127.0.0.1]/x").is_err());
        assert!(validate_image_url("http://[64:ff9b::127.0.0.1]/x").is_err());
        assert!(validate_image_url("http://[64:ff9b::a9fe:a9fe]/latest/meta-data/").is_err());
        assert!(validate_image_url("http://[2002:7f00:1::]/x").is_err());
        assert!(validate_image_url("http://[2002:c0a8:0101::1]/x").is_err());
        assert!(validate_image_url("http://metadata.google.internal/computeMetadata/v1/").is_err());
    }

    #[test]
    fn test_embedded_public_ipv4_is_allowed() {
        assert!(validate_image_url("http://[64:ff9b::808:808]/x").is_ok());
        assert!(validate_image_url("http://[2002:808:808::1]/x").is_ok());
        assert!(validate_image_url("http://[2606:4700::1111]/x").is_ok());
    }

    #[test]
    fn test_validate_image_url_rejects_bad_schemes_and_garbage() {
        assert!(validate_image_url("ftp://host/x").is_err());
        assert!(validate_image_url("file:///etc/passwd").is_err());
        assert!(validate_image_url("javascript:alert(1)").is_err());
        assert!(validate_image_url("not a url").is_err());
        assert!(validate_image_url("").is_err());
        assert!(validate_image_url("   ").is_err());
    }

    #[test]
    fn test_clamp_dimensions() {
        assert_eq!(clamp_dimensions(1024, 768), (1024, 768));
        assert_eq!(clamp_dimensions(0, 10), (MIN_IMAGE_DIMENSION, MIN_IMAGE_DIMENSION));
        assert_eq!(
            clamp_dimensions(u32::MAX, 100_000),
            (MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION)
        );
        assert_eq!(clamp_dimensions(64, 2048), (64, 2048));
    }

    #[test]
    fn test_escape_markdown_neutralizes_links_and_images() {
        let escaped = escape_markdown("![x](javascript:alert(1))");
        assert_eq!(escaped, r"\!\[x\]\(javascript:alert\(1\)\)");

        let escaped = escape_markdown("a cat closing a [bracket]");
        assert!(!escaped.contains("a cat closing a [bracket]"));
        assert!(escaped.contains(r"\[bracket\]"));
    }

    #[test]
    fn test_escape_markdown_collapses_newlines_and_html() {
        let escaped = escape_markdown("line one\n# heading\r\n<script>");
        assert!(!escaped.contains('\n'));
        assert!(!escaped.contains('<'));
        assert!(escaped.contains("&lt;script&gt;"));
        assert!(escaped.contains(r"\# heading"));
    }

    #[test]
    fn test_is_internal_ip_allows_public() {
        assert!(!is_internal_ip(&"8.8.8.8".parse().unwrap()));
        assert!(!is_internal_ip(&"1.1.1.1".parse().unwrap()));
        assert!(!is_internal_ip(&"2606:4700:4700::1111".parse().unwrap()));
    }
}
