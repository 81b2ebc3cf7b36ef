//! Sanitization of document paths for use as remote-store keys.
//!
//! The hierarchical store rejects `. $ # [ ] %` inside a key segment, so each
//! is percent-encoded individually. `/` is left alone: it separates tree
//! levels and the hierarchy is intentional.

/// Escapes the characters the remote tree store treats specially.
///
/// Literal `%` is escaped before the others; escaping it afterwards would
/// re-encode the `%` the other replacements introduce.
pub fn sanitize_store_key(path: &str) -> String {
    let mut out = path.replace('%', "%25");
    for (ch, escaped) in [
        ('.', "%2E"),
        ('$', "%24"),
        ('#', "%23"),
        ('[', "%5B"),
        (']', "%5D"),
    ] {
        out = out.replace(ch, escaped);
    }
    out
}
