//! Conditional request evaluation (RFC 7232).
//!
//! # Responsibilities
//! - Parse entity-tag lists (`W/` weak prefix, quoted strings, `*`)
//! - Evaluate `If-Match`, `If-Unmodified-Since`, `If-None-Match`,
//!   `If-Modified-Since` and `If-Range` against a resource's validators
//! - Fold the individual checks into one [`ConditionalOutcome`]
//!
//! # Design Decisions
//! - Pure functions over headers; no response state involved
//! - Every check is tri-state so "header absent" never reads as "passed"
//! - A resource without an ETag (or without a modification time) skips the
//!   checks that need it instead of failing them
//! - Dates compare at one-second precision, the resolution of HTTP-date

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::header::{
    IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE, RANGE,
};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};

/// Result of one conditional header check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    NotApplicable,
    Pass,
    Fail,
}

/// Combined verdict for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOutcome {
    /// No conditional header applied.
    NotApplicable,
    /// At least one check applied and all passed.
    Pass,
    PreconditionFailed,
    NotModified,
    /// `If-Range` did not match the current representation.
    Conflict,
}

impl ConditionalOutcome {
    /// Status that short-circuits the response, if any.
    pub fn status(self) -> Option<StatusCode> {
        match self {
            ConditionalOutcome::NotApplicable | ConditionalOutcome::Pass => None,
            ConditionalOutcome::PreconditionFailed => Some(StatusCode::PRECONDITION_FAILED),
            ConditionalOutcome::NotModified => Some(StatusCode::NOT_MODIFIED),
            ConditionalOutcome::Conflict => Some(StatusCode::CONFLICT),
        }
    }
}

/// Current validators of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<SystemTime>,
}

impl Validators {
    pub fn new(etag: Option<String>, last_modified: Option<SystemTime>) -> Self {
        Self { etag, last_modified }
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref().filter(|tag| !tag.is_empty())
    }

    /// Modification time in whole seconds; the Unix epoch counts as unknown.
    fn modified_secs(&self) -> Option<u64> {
        self.last_modified.and_then(unix_secs).filter(|secs| *secs > 0)
    }
}

/// Split the first entity tag off `s`.
///
/// Returns the tag (including `W/` and quotes) and the unparsed remainder, or
/// `None` if `s` does not start with a well-formed tag.
pub fn scan_etag(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_matches(|c: char| c == ' ' || c == '\t');
    let bytes = s.as_bytes();
    let start = if s.starts_with("W/") { 2 } else { 0 };
    if bytes.len() < start + 2 || bytes[start] != b'"' {
        return None;
    }
    for (i, &c) in bytes.iter().enumerate().skip(start + 1) {
        match c {
            b'"' => return Some((&s[..=i], &s[i + 1..])),
            0x21 | 0x23..=0x7E | 0x80..=0xFF => {}
            _ => return None,
        }
    }
    None
}

/// Strong comparison: identical, non-weak tags.
pub fn etag_strong_match(a: &str, b: &str) -> bool {
    a == b && !a.is_empty() && a.starts_with('"')
}

/// Weak comparison: identical once any `W/` prefix is dropped.
pub fn etag_weak_match(a: &str, b: &str) -> bool {
    a.strip_prefix("W/").unwrap_or(a) == b.strip_prefix("W/").unwrap_or(b)
}

/// How a tag list compared against the current ETag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListMatch {
    Found,
    NotFound,
    /// The list stopped parsing before a match was found.
    Malformed,
}

/// Walk a comma-separated tag list until `matches` accepts a tag.
fn match_list(mut list: &str, mut matches: impl FnMut(&str) -> bool) -> ListMatch {
    loop {
        list = list.trim_start_matches(|c: char| c == ' ' || c == '\t');
        if list.is_empty() {
            return ListMatch::NotFound;
        }
        if let Some(rest) = list.strip_prefix(',') {
            list = rest;
            continue;
        }
        if list.starts_with('*') {
            return ListMatch::Found;
        }
        let Some((tag, remain)) = scan_etag(list) else {
            return ListMatch::Malformed;
        };
        if matches(tag) {
            return ListMatch::Found;
        }
        list = remain;
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

fn unix_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

fn header_secs(headers: &HeaderMap, name: &HeaderName) -> Option<u64> {
    header_str(headers, name)
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .and_then(unix_secs)
}

fn is_get_or_head(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

pub fn check_if_match(headers: &HeaderMap, validators: &Validators) -> Check {
    let Some(list) = header_str(headers, &IF_MATCH) else {
        return Check::NotApplicable;
    };
    let Some(etag) = validators.etag() else {
        return Check::NotApplicable;
    };
    match match_list(list, |tag| etag_strong_match(tag, etag)) {
        ListMatch::Found => Check::Pass,
        ListMatch::NotFound => Check::Fail,
        ListMatch::Malformed => Check::NotApplicable,
    }
}

pub fn check_if_unmodified_since(headers: &HeaderMap, validators: &Validators) -> Check {
    let (Some(modified), Some(since)) = (
        validators.modified_secs(),
        header_secs(headers, &IF_UNMODIFIED_SINCE),
    ) else {
        return Check::NotApplicable;
    };
    if modified <= since {
        Check::Pass
    } else {
        Check::Fail
    }
}

/// `Fail` means a tag matched, i.e. the client's copy is current.
pub fn check_if_none_match(headers: &HeaderMap, validators: &Validators) -> Check {
    let Some(list) = header_str(headers, &IF_NONE_MATCH) else {
        return Check::NotApplicable;
    };
    let Some(etag) = validators.etag() else {
        return Check::NotApplicable;
    };
    match match_list(list, |tag| etag_weak_match(tag, etag)) {
        ListMatch::Found => Check::Fail,
        ListMatch::NotFound => Check::Pass,
        ListMatch::Malformed => Check::NotApplicable,
    }
}

/// `Fail` means the resource is unchanged since the given date.
pub fn check_if_modified_since(
    method: &Method,
    headers: &HeaderMap,
    validators: &Validators,
) -> Check {
    if !is_get_or_head(method) {
        return Check::NotApplicable;
    }
    let (Some(modified), Some(since)) = (
        validators.modified_secs(),
        header_secs(headers, &IF_MODIFIED_SINCE),
    ) else {
        return Check::NotApplicable;
    };
    if modified <= since {
        Check::Fail
    } else {
        Check::Pass
    }
}

pub fn check_if_range(method: &Method, headers: &HeaderMap, validators: &Validators) -> Check {
    if !is_get_or_head(method) {
        return Check::NotApplicable;
    }
    let Some(value) = header_str(headers, &IF_RANGE) else {
        return Check::NotApplicable;
    };

    if let Some((tag, _)) = scan_etag(value) {
        return match validators.etag() {
            None => Check::NotApplicable,
            Some(etag) if etag_strong_match(tag, etag) => Check::Pass,
            Some(_) => Check::Fail,
        };
    }

    let (Some(modified), Some(date)) = (
        validators.modified_secs(),
        httpdate::parse_http_date(value).ok().and_then(unix_secs),
    ) else {
        return Check::NotApplicable;
    };
    if date == modified {
        Check::Pass
    } else {
        Check::Fail
    }
}

/// Evaluate every conditional header of a request.
pub fn evaluate(
    method: &Method,
    headers: &HeaderMap,
    validators: &Validators,
) -> ConditionalOutcome {
    let mut applied = false;

    let mut check = check_if_match(headers, validators);
    if check == Check::NotApplicable {
        check = check_if_unmodified_since(headers, validators);
    }
    match check {
        Check::Fail => return ConditionalOutcome::PreconditionFailed,
        Check::Pass => applied = true,
        Check::NotApplicable => {}
    }

    match check_if_none_match(headers, validators) {
        Check::Fail if is_get_or_head(method) => return ConditionalOutcome::NotModified,
        Check::Fail => return ConditionalOutcome::PreconditionFailed,
        Check::Pass => applied = true,
        Check::NotApplicable => match check_if_modified_since(method, headers, validators) {
            Check::Fail => return ConditionalOutcome::NotModified,
            Check::Pass => applied = true,
            Check::NotApplicable => {}
        },
    }

    if headers.contains_key(RANGE) {
        match check_if_range(method, headers, validators) {
            Check::Fail => return ConditionalOutcome::Conflict,
            Check::Pass => applied = true,
            Check::NotApplicable => {}
        }
    }

    if applied {
        ConditionalOutcome::Pass
    } else {
        ConditionalOutcome::NotApplicable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn headers(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), value.parse().unwrap());
        }
        map
    }

    fn tagged(tag: &str) -> Validators {
        Validators::new(Some(tag.to_string()), None)
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn dated(secs: u64) -> Validators {
        Validators::new(None, Some(at(secs)))
    }

    #[test]
    fn scans_strong_and_weak_tags() {
        assert_eq!(scan_etag(r#""abc", "def""#), Some((r#""abc""#, r#", "def""#)));
        assert_eq!(scan_etag(r#" W/"abc""#), Some((r#"W/"abc""#, "")));
        assert_eq!(scan_etag("abc"), None);
        assert_eq!(scan_etag(r#""unterminated"#), None);
        assert_eq!(scan_etag("\"a b\""), None);
    }

    #[test]
    fn strong_and_weak_comparison() {
        assert!(etag_strong_match(r#""a""#, r#""a""#));
        assert!(!etag_strong_match(r#"W/"a""#, r#"W/"a""#));
        assert!(etag_weak_match(r#"W/"a""#, r#""a""#));
        assert!(!etag_weak_match(r#""a""#, r#""b""#));
    }

    #[test]
    fn if_none_match_is_not_modified_for_get_and_failed_for_put() {
        let h = headers(&[(IF_NONE_MATCH, r#""abc""#)]);
        let v = tagged(r#""abc""#);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::NotModified);
        assert_eq!(evaluate(&Method::HEAD, &h, &v), ConditionalOutcome::NotModified);
        assert_eq!(evaluate(&Method::PUT, &h, &v), ConditionalOutcome::PreconditionFailed);
    }

    #[test]
    fn if_none_match_star_and_lists() {
        let v = tagged(r#""abc""#);
        let h = headers(&[(IF_NONE_MATCH, "*")]);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::NotModified);

        let h = headers(&[(IF_NONE_MATCH, r#""x", W/"abc""#)]);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::NotModified);

        let h = headers(&[(IF_NONE_MATCH, r#""x", "y""#)]);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::Pass);
    }

    #[test]
    fn if_match_requires_strong_match() {
        let v = tagged(r#""abc""#);
        let h = headers(&[(IF_MATCH, r#""abc""#)]);
        assert_eq!(evaluate(&Method::PUT, &h, &v), ConditionalOutcome::Pass);

        let h = headers(&[(IF_MATCH, r#"W/"abc""#)]);
        assert_eq!(evaluate(&Method::PUT, &h, &v), ConditionalOutcome::PreconditionFailed);

        let h = headers(&[(IF_MATCH, "*")]);
        assert_eq!(check_if_match(&h, &v), Check::Pass);
    }

    #[test]
    fn missing_etag_skips_etag_checks() {
        let v = Validators::default();
        let h = headers(&[(IF_MATCH, r#""abc""#), (IF_NONE_MATCH, r#""abc""#)]);
        assert_eq!(check_if_match(&h, &v), Check::NotApplicable);
        assert_eq!(check_if_none_match(&h, &v), Check::NotApplicable);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::NotApplicable);
    }

    #[test]
    fn absent_headers_are_not_a_pass() {
        let v = Validators::new(Some(r#""abc""#.into()), Some(at(1_000)));
        assert_eq!(
            evaluate(&Method::GET, &HeaderMap::new(), &v),
            ConditionalOutcome::NotApplicable
        );
    }

    #[test]
    fn if_unmodified_since_uses_second_precision() {
        let since = httpdate::fmt_http_date(at(1_000));
        let h = headers(&[(IF_UNMODIFIED_SINCE, since.as_str())]);

        let v = Validators::new(None, Some(at(1_000) + Duration::from_millis(900)));
        assert_eq!(check_if_unmodified_since(&h, &v), Check::Pass);
        assert_eq!(check_if_unmodified_since(&h, &dated(1_001)), Check::Fail);
        assert_eq!(
            evaluate(&Method::PUT, &h, &dated(1_001)),
            ConditionalOutcome::PreconditionFailed
        );
    }

    #[test]
    fn if_match_takes_precedence_over_if_unmodified_since() {
        let since = httpdate::fmt_http_date(at(1_000));
        let h = headers(&[(IF_MATCH, r#""abc""#), (IF_UNMODIFIED_SINCE, since.as_str())]);
        let v = Validators::new(Some(r#""abc""#.into()), Some(at(5_000)));
        assert_eq!(evaluate(&Method::PUT, &h, &v), ConditionalOutcome::Pass);
    }

    #[test]
    fn if_modified_since_only_for_get_and_head() {
        let since = httpdate::fmt_http_date(at(1_000));
        let h = headers(&[(IF_MODIFIED_SINCE, since.as_str())]);

        assert_eq!(evaluate(&Method::GET, &h, &dated(1_000)), ConditionalOutcome::NotModified);
        assert_eq!(evaluate(&Method::GET, &h, &dated(2_000)), ConditionalOutcome::Pass);
        assert_eq!(evaluate(&Method::POST, &h, &dated(1_000)), ConditionalOutcome::NotApplicable);
    }

    #[test]
    fn if_none_match_overrides_if_modified_since() {
        let since = httpdate::fmt_http_date(at(1_000));
        let h = headers(&[(IF_NONE_MATCH, r#""new""#), (IF_MODIFIED_SINCE, since.as_str())]);
        let v = Validators::new(Some(r#""old""#.into()), Some(at(1_000)));
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::Pass);
    }

    #[test]
    fn epoch_and_garbage_dates_are_ignored() {
        let h = headers(&[(IF_MODIFIED_SINCE, "yesterday")]);
        assert_eq!(check_if_modified_since(&Method::GET, &h, &dated(1_000)), Check::NotApplicable);

        let since = httpdate::fmt_http_date(at(1_000));
        let h = headers(&[(IF_MODIFIED_SINCE, since.as_str())]);
        assert_eq!(check_if_modified_since(&Method::GET, &h, &dated(0)), Check::NotApplicable);
    }

    #[test]
    fn if_range_conflicts_on_mismatch() {
        let v = Validators::new(Some(r#""abc""#.into()), Some(at(1_000)));

        let h = headers(&[(RANGE, "bytes=0-1"), (IF_RANGE, r#""abc""#)]);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::Pass);

        let h = headers(&[(RANGE, "bytes=0-1"), (IF_RANGE, r#""zzz""#)]);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::Conflict);

        let exact = httpdate::fmt_http_date(at(1_000));
        let h = headers(&[(RANGE, "bytes=0-1"), (IF_RANGE, exact.as_str())]);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::Pass);

        let later = httpdate::fmt_http_date(at(1_001));
        let h = headers(&[(RANGE, "bytes=0-1"), (IF_RANGE, later.as_str())]);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::Conflict);
    }

    #[test]
    fn if_range_without_range_is_ignored() {
        let v = tagged(r#""abc""#);
        let h = headers(&[(IF_RANGE, r#""zzz""#)]);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::NotApplicable);
    }

    #[test]
    fn unparsable_if_range_is_not_applicable() {
        let v = Validators::new(Some(r#""abc""#.into()), Some(at(1_000)));
        let h = headers(&[(RANGE, "bytes=0-1"), (IF_RANGE, "not a date or tag")]);
        assert_eq!(check_if_range(&Method::GET, &h, &v), Check::NotApplicable);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::NotApplicable);
    }

    #[test]
    fn unparsable_if_match_is_not_applicable() {
        let v = tagged(r#""abc""#);
        let h = headers(&[(IF_MATCH, "abc")]);
        assert_eq!(check_if_match(&h, &v), Check::NotApplicable);
        assert_eq!(evaluate(&Method::PUT, &h, &v), ConditionalOutcome::NotApplicable);

        let h = headers(&[(IF_MATCH, r#""zzz", oops"#)]);
        assert_eq!(check_if_match(&h, &v), Check::NotApplicable);

        let h = headers(&[(IF_MATCH, r#""zzz", "yyy""#)]);
        assert_eq!(check_if_match(&h, &v), Check::Fail);
    }

    #[test]
    fn unparsable_if_none_match_is_not_applicable() {
        let v = tagged(r#""abc""#);
        let h = headers(&[(IF_NONE_MATCH, "abc")]);
        assert_eq!(check_if_none_match(&h, &v), Check::NotApplicable);
        assert_eq!(evaluate(&Method::GET, &h, &v), ConditionalOutcome::NotApplicable);
    }

    #[test]
    fn unparsable_if_unmodified_since_is_not_applicable() {
        let h = headers(&[(IF_UNMODIFIED_SINCE, "last tuesday")]);
        assert_eq!(check_if_unmodified_since(&h, &dated(1_000)), Check::NotApplicable);
        assert_eq!(evaluate(&Method::PUT, &h, &dated(1_000)), ConditionalOutcome::NotApplicable);
    }

    #[test]
    fn outcome_statuses() {
        assert_eq!(ConditionalOutcome::NotModified.status(), Some(StatusCode::NOT_MODIFIED));
        assert_eq!(ConditionalOutcome::Conflict.status(), Some(StatusCode::CONFLICT));
        assert_eq!(ConditionalOutcome::Pass.status(), None);
    }
}
