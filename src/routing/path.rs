//! Path normalization shared by route registration and lookup.

use std::borrow::Cow;

/// Split a URL path into cleaned, percent-decoded segments.
///
/// Empty and `.` segments are dropped and `..` removes the previous segment,
/// so `/a//b/./c/../d/` yields `["a", "b", "d"]`. Decoding happens after
/// splitting, which keeps an encoded `%2F` inside its own segment. Segments
/// that do not decode to UTF-8 are kept verbatim.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for raw in path.split('/') {
        match raw {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(decode_segment(raw)),
        }
    }
    segments
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}
