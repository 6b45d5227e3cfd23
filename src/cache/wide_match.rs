//! Wide matching: serving a paginated miss from a cached superset.
//!
//! Candidates are every stored key sharing the request's base key. A ranged
//! candidate `[cs, ce)` can serve `[rs, re)` when `cs <= rs` and `ce >= re`;
//! the candidate with the smallest `ce - cs` wins. The bare base key holds the
//! whole result set and is only used when no ranged candidate fits.

use thiserror::Error;
use tracing::warn;

use super::keys::RANGE_DELIMITER;
use super::pagination::Range;

#[derive(Debug, Error)]
pub enum WideMatchError {
    #[error("key `{key}` does not share the requested base key")]
    Unrelated { key: String },
    #[error("key `{key}` has an unreadable range suffix: {source}")]
    MalformedRange {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("key `{key}` has a range ending before it starts")]
    InvertedRange { key: String },
}

/// What a stored sibling key covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Whole,
    Window(Range),
}

/// A resolved superset and the slice of it that answers the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideMatch {
    pub target_key: String,
    pub local_range: Range,
}

/// Read what `key` covers relative to `base_key`.
pub fn parse_candidate(base_key: &str, key: &str) -> Result<Coverage, WideMatchError> {
    let Some(rest) = key.strip_prefix(base_key) else {
        return Err(WideMatchError::Unrelated {
            key: key.to_string(),
        });
    };
    if rest.is_empty() {
        return Ok(Coverage::Whole);
    }
    let Some(suffix) = rest.strip_prefix(RANGE_DELIMITER) else {
        return Err(WideMatchError::Unrelated {
            key: key.to_string(),
        });
    };

    let range: Range =
        serde_json::from_str(suffix).map_err(|source| WideMatchError::MalformedRange {
            key: key.to_string(),
            source,
        })?;
    if range.end < range.start {
        return Err(WideMatchError::InvertedRange {
            key: key.to_string(),
        });
    }
    Ok(Coverage::Window(range))
}

/// Pick the most specific stored superset for `requested`.
///
/// An unpaginated request has no wide match: its only superset is the base
/// key, which is the key that just missed.
pub fn resolve(base_key: &str, requested: Option<Range>, candidates: &[String]) -> Option<WideMatch> {
    let requested = requested?;
    let mut best: Option<(&str, Range)> = None;
    let mut whole: Option<&str> = None;

    for key in candidates {
        let window = match parse_candidate(base_key, key) {
            Ok(Coverage::Whole) => {
                whole = Some(key.as_str());
                continue;
            }
            Ok(Coverage::Window(window)) => window,
            Err(WideMatchError::Unrelated { .. }) => continue,
            Err(error) => {
                warn!(key = %key, error = %error, "skipping wide-match candidate");
                continue;
            }
        };

        if !window.contains(&requested) {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_key, best_window)) => {
                (window.len(), window.start, key.as_str())
                    < (best_window.len(), best_window.start, best_key)
            }
        };
        if better {
            best = Some((key.as_str(), window));
        }
    }

    let (target_key, offset) = match (best, whole) {
        (Some((key, window)), _) => (key, window.start),
        (None, Some(key)) => (key, 0),
        (None, None) => return None,
    };

    let start = requested.start - offset;
    Some(WideMatch {
        target_key: target_key.to_string(),
        local_range: Range {
            start,
            end: start + requested.len(),
        },
    })
}
