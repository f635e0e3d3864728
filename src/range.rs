//! Commit range parsing and validation (C9).

use crate::error::{Error, Result};
use crate::vcs::Vcs;

/// An ordered pair of refs, either side of which may be empty (meaning "open").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitRange {
    pub start: String,
    pub end: String,
}

/// Splits `"A..B"` on the first and only occurrence of `..`.
///
/// Returns an error if the separator is absent or appears more than once.
pub fn parse_range(spec: &str) -> Result<CommitRange> {
    let mut parts = spec.splitn(3, "..");
    let start = parts.next().unwrap_or_default();
    let Some(end) = parts.next() else {
        return Err(Error::range_invalid(spec, "", "missing '..' separator"));
    };
    if parts.next().is_some() {
        return Err(Error::range_invalid(spec, "", "more than one '..' separator"));
    }
    Ok(CommitRange { start: start.to_string(), end: end.to_string() })
}

/// Resolves and validates a range: both endpoints must resolve (unless empty
/// and `allow_empty` is set) and `start` must be an ancestor of `end` when
/// both are non-empty.
pub fn validate_range(
    vcs: &Vcs,
    range: &CommitRange,
    allow_empty: bool,
) -> Result<(Option<String>, Option<String>)> {
    let start = resolve_endpoint(vcs, &range.start, allow_empty)?;
    let end = resolve_endpoint(vcs, &range.end, allow_empty)?;

    if let (Some(start), Some(end)) = (&start, &end) {
        if !vcs.is_ancestor(start, end) {
            return Err(Error::range_invalid(
                &range.start,
                &range.end,
                "start is not an ancestor of end",
            ));
        }
    }

    Ok((start, end))
}

fn resolve_endpoint(vcs: &Vcs, ref_str: &str, allow_empty: bool) -> Result<Option<String>> {
    if ref_str.is_empty() {
        if allow_empty {
            return Ok(None);
        }
        return Err(Error::range_invalid(ref_str, "", "empty endpoint not allowed"));
    }
    match vcs.resolve(ref_str) {
        Some(commit) => Ok(Some(commit)),
        None => Err(Error::range_invalid(ref_str, "", "unresolvable ref")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_separator() {
        let range = parse_range("abc..def").unwrap();
        assert_eq!(range.start, "abc");
        assert_eq!(range.end, "def");
    }

    #[test]
    fn allows_open_endpoints() {
        let range = parse_range("..def").unwrap();
        assert_eq!(range.start, "");
        assert_eq!(range.end, "def");

        let range = parse_range("abc..").unwrap();
        assert_eq!(range.start, "abc");
        assert_eq!(range.end, "");
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(parse_range("abcdef").is_err());
    }

    #[test]
    fn rejects_extra_separator() {
        assert!(parse_range("a..b..c").is_err());
    }
}
