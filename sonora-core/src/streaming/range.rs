//! HTTP range request parsing and resolution for track streaming
//!
//! Parsing is permissive: anything that does not look like `bytes=<start>-<end?>`
//! is treated as a plain request for the whole resource.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::StreamingError;
use crate::config::RangePolicy;

static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*bytes\s*=[ \t]*(\d+)[ \t]*-[ \t]*(\d*)").expect("range pattern is valid")
});

/// Byte range as requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    /// Inclusive end, `None` for `bytes=<start>-`
    pub end: Option<u64>,
}

/// Parse a `Range` header value.
///
/// Only the first range of a multi-range header is honoured. Returns `None`
/// for anything without a numeric start, including suffix ranges such as
/// `bytes=-500` and values that overflow `u64`.
///
/// # Examples
/// ```
/// use sonora_core::streaming::range::{RangeRequest, parse_range_header};
///
/// assert_eq!(
///     parse_range_header("bytes=100-199"),
///     Some(RangeRequest { start: 100, end: Some(199) })
/// );
/// assert_eq!(parse_range_header("bytes=-500"), None);
/// ```
pub fn parse_range_header(value: &str) -> Option<RangeRequest> {
    let captures = RANGE_PATTERN.captures(value)?;
    let start = captures.get(1)?.as_str().parse::<u64>().ok()?;
    let end = match captures.get(2).map(|m| m.as_str()) {
        None | Some("") => None,
        Some(digits) => Some(digits.parse::<u64>().ok()?),
    };
    Some(RangeRequest { start, end })
}

/// A single streaming request, parsed once at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub resource_id: u64,
    /// `None` when no usable `Range` header was sent
    pub requested_range: Option<RangeRequest>,
}

impl StreamRequest {
    /// Builds a request from the raw `Range` header, if any.
    ///
    /// Malformed headers are logged and dropped.
    pub fn from_header(resource_id: u64, range_header: Option<&str>) -> Self {
        let requested_range = range_header.and_then(|value| {
            let parsed = parse_range_header(value);
            if parsed.is_none() {
                debug!(
                    "Ignoring malformed range header {:?} for resource {}",
                    value, resource_id
                );
            }
            parsed
        });

        Self {
            resource_id,
            requested_range,
        }
    }
}

/// Byte window actually served, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub begin: u64,
    pub end: u64,
    /// Whether the response is `206 Partial Content`
    pub is_partial: bool,
}

impl ResolvedRange {
    fn full(size: u64) -> Self {
        Self {
            begin: 0,
            end: size - 1,
            is_partial: false,
        }
    }

    /// Resolves the client's request against a resource of `size` bytes.
    ///
    /// Returns `Ok(None)` when there is nothing to send (empty resource).
    /// The end is always clamped to the last byte. A start past the end is
    /// served as the whole resource under [`RangePolicy::Lenient`] and rejected
    /// under [`RangePolicy::Strict`]. A range whose end precedes its start is
    /// syntactically invalid and is ignored under both policies.
    ///
    /// A Range header alone does not make the response partial. A 206 always
    /// carries a `Content-Range` for the bytes sent, so the lenient fallback
    /// for a start past the last byte is a 200 with the full body.
    ///
    /// # Errors
    ///
    /// - `StreamingError::RangeUnsatisfiable` - Strict policy and the range starts past the end
    pub fn resolve(
        requested: Option<RangeRequest>,
        size: u64,
        policy: RangePolicy,
    ) -> Result<Option<Self>, StreamingError> {
        if size == 0 {
            return match (requested, policy) {
                (Some(_), RangePolicy::Strict) => Err(StreamingError::RangeUnsatisfiable { size }),
                _ => Ok(None),
            };
        }

        let Some(range) = requested else {
            return Ok(Some(Self::full(size)));
        };

        if let Some(end) = range.end
            && end < range.start
        {
            debug!("Ignoring inverted range {}-{}", range.start, end);
            return Ok(Some(Self::full(size)));
        }

        let last = size - 1;
        if range.start > last {
            return match policy {
                RangePolicy::Lenient => {
                    debug!(
                        "Range start {} beyond last byte {}, serving full resource",
                        range.start, last
                    );
                    Ok(Some(Self::full(size)))
                }
                RangePolicy::Strict => Err(StreamingError::RangeUnsatisfiable { size }),
            };
        }

        Ok(Some(Self {
            begin: range.start,
            end: range.end.unwrap_or(last).min(last),
            is_partial: true,
        }))
    }

    /// Number of bytes in the window, equal to the `Content-Length` sent.
    pub fn len(&self) -> u64 {
        self.end - self.begin + 1
    }

    /// `Content-Range` value for this window.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.begin, self.end, size)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_range_header_valid() {
        assert_eq!(
            parse_range_header("bytes=500-599"),
            Some(RangeRequest {
                start: 500,
                end: Some(599)
            })
        );
    }

    #[test]
    fn test_parse_range_header_open_end() {
        assert_eq!(
            parse_range_header("bytes=900-"),
            Some(RangeRequest {
                start: 900,
                end: None
            })
        );
    }

    #[test]
    fn test_parse_range_header_is_lenient_about_spacing_and_case() {
        assert_eq!(
            parse_range_header("Bytes= 10-20"),
            Some(RangeRequest {
                start: 10,
                end: Some(20)
            })
        );
        assert_eq!(
            parse_range_header("bytes=10-20, 30-40"),
            Some(RangeRequest {
                start: 10,
                end: Some(20)
            })
        );
    }

    #[test]
    fn test_parse_range_header_invalid() {
        assert_eq!(parse_range_header("invalid"), None);
        assert_eq!(parse_range_header("bytes=-500"), None);
        assert_eq!(parse_range_header("bytes=abc-def"), None);
        assert_eq!(parse_range_header("items=0-10"), None);
        assert_eq!(parse_range_header("bytes=99999999999999999999999-"), None);
        assert_eq!(parse_range_header(""), None);
    }

    #[test]
    fn test_stream_request_drops_malformed_header() {
        let request = StreamRequest::from_header(3, Some("bytes=oops"));
        assert_eq!(request.resource_id, 3);
        assert_eq!(request.requested_range, None);

        let request = StreamRequest::from_header(3, None);
        assert_eq!(request.requested_range, None);
    }

    #[test]
    fn test_resolve_without_range_is_full() {
        let resolved = ResolvedRange::resolve(None, 1000, RangePolicy::Lenient)
            .unwrap()
            .unwrap();
        assert_eq!(
            resolved,
            ResolvedRange {
                begin: 0,
                end: 999,
                is_partial: false
            }
        );
        assert_eq!(resolved.len(), 1000);
    }

    #[test]
    fn test_resolve_explicit_range() {
        let requested = parse_range_header("bytes=500-599");
        let resolved = ResolvedRange::resolve(requested, 1000, RangePolicy::Lenient)
            .unwrap()
            .unwrap();
        assert!(resolved.is_partial);
        assert_eq!(resolved.len(), 100);
        assert_eq!(resolved.content_range(1000), "bytes 500-599/1000");
    }

    #[test]
    fn test_resolve_open_end_reaches_last_byte() {
        let requested = parse_range_header("bytes=900-");
        let resolved = ResolvedRange::resolve(requested, 1000, RangePolicy::Strict)
            .unwrap()
            .unwrap();
        assert_eq!((resolved.begin, resolved.end), (900, 999));
        assert_eq!(resolved.len(), 100);
    }

    #[test]
    fn test_resolve_clamps_end() {
        let requested = parse_range_header("bytes=100-5000");
        let resolved = ResolvedRange::resolve(requested, 1000, RangePolicy::Strict)
            .unwrap()
            .unwrap();
        assert_eq!((resolved.begin, resolved.end), (100, 999));
    }

    #[test]
    fn test_resolve_start_past_end_by_policy() {
        let requested = parse_range_header("bytes=1500-1600");

        let lenient = ResolvedRange::resolve(requested, 1000, RangePolicy::Lenient)
            .unwrap()
            .unwrap();
        assert!(!lenient.is_partial);
        assert_eq!(lenient.len(), 1000);

        let strict = ResolvedRange::resolve(requested, 1000, RangePolicy::Strict);
        assert!(matches!(
            strict,
            Err(StreamingError::RangeUnsatisfiable { size: 1000 })
        ));
    }

    #[test]
    fn test_resolve_inverted_range_is_ignored() {
        let requested = parse_range_header("bytes=600-500");
        let resolved = ResolvedRange::resolve(requested, 1000, RangePolicy::Strict)
            .unwrap()
            .unwrap();
        assert!(!resolved.is_partial);
        assert_eq!(resolved.len(), 1000);
    }

    #[test]
    fn test_resolve_empty_resource() {
        assert_eq!(
            ResolvedRange::resolve(None, 0, RangePolicy::Strict).unwrap(),
            None
        );
        assert_eq!(
            ResolvedRange::resolve(parse_range_header("bytes=0-"), 0, RangePolicy::Lenient)
                .unwrap(),
            None
        );
        assert!(
            ResolvedRange::resolve(parse_range_header("bytes=0-"), 0, RangePolicy::Strict)
                .is_err()
        );
    }

    proptest! {
        #[test]
        fn resolved_window_stays_inside_resource(
            size in 1u64..1_000_000,
            start in 0u64..2_000_000,
            end in proptest::option::of(0u64..2_000_000),
            strict in any::<bool>(),
        ) {
            let policy = if strict { RangePolicy::Strict } else { RangePolicy::Lenient };
            let requested = Some(RangeRequest { start, end });

            if let Ok(Some(window)) = ResolvedRange::resolve(requested, size, policy) {
                prop_assert!(window.begin <= window.end);
                prop_assert!(window.end < size);
                prop_assert_eq!(window.len(), window.end - window.begin + 1);
                if window.is_partial {
                    prop_assert_eq!(window.begin, start);
                }
            }
        }

        #[test]
        fn valid_ranges_are_honoured_exactly(
            size in 1u64..1_000_000,
            a in 0u64..1_000_000,
            b in 0u64..1_000_000,
        ) {
            let (a, b) = (a.min(b) % size, a.max(b) % size);
            prop_assume!(a <= b);
            let header = format!("bytes={a}-{b}");

            let window = ResolvedRange::resolve(parse_range_header(&header), size, RangePolicy::Strict)
                .unwrap()
                .unwrap();
            prop_assert!(window.is_partial);
            prop_assert_eq!((window.begin, window.end), (a, b));
            prop_assert_eq!(window.content_range(size), format!("bytes {a}-{b}/{size}"));
        }
    }
}
