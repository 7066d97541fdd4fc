//! HTTP Range header parsing and resolution
//!
//! Parsing and validation are split: a header is parsed into a `ByteRange`
//! without knowing the media size, and only resolved into a `RangeSpec` once
//! the authoritative total size has been probed.

/// Errors produced while interpreting a client `Range` header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Malformed range header: {header}")]
    Malformed { header: String },

    #[error("Range not satisfiable for {total_size} byte media")]
    NotSatisfiable { total_size: u64 },
}

/// A parsed but not yet validated byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-` or `bytes=start-end`
    FromStart { start: u64, end: Option<u64> },
    /// `bytes=-len`, the final `len` bytes
    Suffix { len: u64 },
}

/// A validated, inclusive byte interval within media of known size.
///
/// Invariant: `start <= end < total_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
}

impl RangeSpec {
    /// Number of bytes covered, `end - start + 1`.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }

    /// `Range` value for the upstream request.
    pub fn request_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfied_content_range(total_size: u64) -> String {
    format!("bytes */{total_size}")
}

/// Parse a Range header value.
///
/// Supports:
/// - `bytes=start-end`
/// - `bytes=start-`
/// - `bytes=-suffix_len`
///
/// Multiple ranges are not supported and are reported as malformed.
///
/// # Errors
///
/// - `RangeError::Malformed` - Wrong unit, missing dash, non-numeric bound, or multiple ranges
pub fn parse_range_header(value: &str) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::Malformed {
        header: value.to_string(),
    };

    let value_trimmed = value.trim();
    let (unit, spec) = value_trimmed.split_once('=').ok_or_else(malformed)?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(malformed());
    }
    if spec.contains(',') {
        return Err(malformed());
    }

    let (start_str, end_str) = spec.split_once('-').ok_or_else(malformed)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        let len = parse_bound(end_str).ok_or_else(malformed)?;
        return Ok(ByteRange::Suffix { len });
    }

    let start = parse_bound(start_str).ok_or_else(malformed)?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(parse_bound(end_str).ok_or_else(malformed)?)
    };

    Ok(ByteRange::FromStart { start, end })
}

fn parse_bound(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl ByteRange {
    /// Validates the range against the media's total size.
    ///
    /// Out-of-bounds ranges are rejected, never clamped.
    ///
    /// # Errors
    ///
    /// - `RangeError::NotSatisfiable` - Start beyond the media, end before start or beyond the media, empty suffix, or empty media
    pub fn resolve(self, total_size: u64) -> Result<RangeSpec, RangeError> {
        let unsatisfiable = RangeError::NotSatisfiable { total_size };
        if total_size == 0 {
            return Err(unsatisfiable);
        }

        match self {
            ByteRange::FromStart { start, end } => {
                if start >= total_size {
                    return Err(unsatisfiable);
                }
                let end = end.unwrap_or(total_size - 1);
                if end < start || end >= total_size {
                    return Err(unsatisfiable);
                }
                Ok(RangeSpec { start, end })
            }
            ByteRange::Suffix { len } => {
                if len == 0 {
                    return Err(unsatisfiable);
                }
                Ok(RangeSpec {
                    start: total_size.saturating_sub(len),
                    end: total_size - 1,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_range_header_full() {
        assert_eq!(
            parse_range_header("bytes=0-1023"),
            Ok(ByteRange::FromStart {
                start: 0,
                end: Some(1023)
            })
        );
    }

    #[test]
    fn test_parse_range_header_open_ended() {
        assert_eq!(
            parse_range_header("bytes=500-"),
            Ok(ByteRange::FromStart {
                start: 500,
                end: None
            })
        );
    }

    #[test]
    fn test_parse_range_header_suffix() {
        assert_eq!(
            parse_range_header("bytes=-1024"),
            Ok(ByteRange::Suffix { len: 1024 })
        );
    }

    #[test]
    fn test_parse_range_header_tolerates_whitespace_and_case() {
        assert_eq!(
            parse_range_header("  Bytes = 10 - 20 "),
            Ok(ByteRange::FromStart {
                start: 10,
                end: Some(20)
            })
        );
    }

    #[test]
    fn test_parse_range_header_invalid() {
        for header in [
            "invalid",
            "bytes=abc-def",
            "items=0-10",
            "bytes=10",
            "bytes=-",
            "bytes=+5-10",
            "bytes=0-1,4-5",
        ] {
            assert!(
                matches!(parse_range_header(header), Err(RangeError::Malformed { .. })),
                "{header} should be malformed"
            );
        }
    }

    #[test]
    fn test_resolve_open_ended_runs_to_last_byte() {
        let spec = ByteRange::FromStart {
            start: 500,
            end: None,
        }
        .resolve(1000)
        .unwrap();
        assert_eq!(spec, RangeSpec { start: 500, end: 999 });
        assert_eq!(spec.len(), 500);
        assert_eq!(spec.content_range(1000), "bytes 500-999/1000");
        assert_eq!(spec.request_header(), "bytes=500-999");
    }

    #[test]
    fn test_resolve_start_beyond_size() {
        let err = ByteRange::FromStart {
            start: 1000,
            end: Some(1999),
        }
        .resolve(1500)
        .unwrap_err();
        assert_eq!(err, RangeError::NotSatisfiable { total_size: 1500 });
        assert_eq!(unsatisfied_content_range(1500), "bytes */1500");
    }

    #[test]
    fn test_resolve_end_beyond_size_is_not_clamped() {
        let result = ByteRange::FromStart {
            start: 100,
            end: Some(1000),
        }
        .resolve(1000);
        assert!(matches!(result, Err(RangeError::NotSatisfiable { .. })));
    }

    #[test]
    fn test_resolve_inverted_range() {
        let result = ByteRange::FromStart {
            start: 20,
            end: Some(10),
        }
        .resolve(100);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_suffix() {
        let spec = ByteRange::Suffix { len: 100 }.resolve(1000).unwrap();
        assert_eq!(spec, RangeSpec { start: 900, end: 999 });

        let spec = ByteRange::Suffix { len: 5000 }.resolve(1000).unwrap();
        assert_eq!(spec, RangeSpec { start: 0, end: 999 });

        assert!(ByteRange::Suffix { len: 0 }.resolve(1000).is_err());
    }

    #[test]
    fn test_resolve_empty_media() {
        let result = ByteRange::FromStart {
            start: 0,
            end: None,
        }
        .resolve(0);
        assert_eq!(result, Err(RangeError::NotSatisfiable { total_size: 0 }));
    }

    proptest! {
        #[test]
        fn prop_valid_ranges_resolve_exactly(
            total in 1u64..10_000_000,
            a in any::<u64>(),
            b in any::<u64>(),
        ) {
            let start = a % total;
            let end = start + b % (total - start);
            let header = format!("bytes={start}-{end}");

            let spec = parse_range_header(&header).unwrap().resolve(total).unwrap();
            prop_assert_eq!(spec.len(), end - start + 1);
            prop_assert_eq!(spec.content_range(total), format!("bytes {start}-{end}/{total}"));
        }

        #[test]
        fn prop_start_at_or_past_size_is_unsatisfiable(
            total in 0u64..10_000_000,
            offset in 0u64..10_000_000,
            end in proptest::option::of(any::<u64>()),
        ) {
            let range = ByteRange::FromStart { start: total + offset, end };
            prop_assert_eq!(range.resolve(total), Err(RangeError::NotSatisfiable { total_size: total }));
        }

        #[test]
        fn prop_resolved_ranges_stay_in_bounds(total in 0u64..1_000_000, header in "bytes=[0-9]{0,7}-[0-9]{0,7}") {
            if let Ok(range) = parse_range_header(&header) {
                if let Ok(spec) = range.resolve(total) {
                    prop_assert!(spec.start <= spec.end);
                    prop_assert!(spec.end < total);
                }
            }
        }
    }
}
