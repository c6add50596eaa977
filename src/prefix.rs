//! Prefix Codec
//!
//! Maps logical keys to physical (prefixed) keys and back.
//!
//! ## Key Layout
//! ```text
//! prefix = "settings"          prefix = ""
//! ┌──────────┬───┬────────┐    ┌────────┐
//! │ settings │ . │ theme  │    │ theme  │
//! └──────────┴───┴────────┘    └────────┘
//!   namespace  sep  logical      logical (verbatim)
//! ```
//!
//! The separator makes prefixes self-delimiting: `"ab"` owns `"ab.x"` but
//! never `"abc.x"`. An empty prefix owns the whole adapter namespace.

/// Separator placed between a prefix and a logical key
pub const SEPARATOR: char = '.';

/// Map a logical key to its physical key under `prefix`
pub fn to_physical(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        return key.to_string();
    }

    let mut physical = String::with_capacity(prefix.len() + 1 + key.len());
    physical.push_str(prefix);
    physical.push(SEPARATOR);
    physical.push_str(key);
    physical
}

/// Strip `prefix` from a physical key
///
/// Returns `None` when the physical key is not in the prefix's namespace.
pub fn from_physical<'a>(prefix: &str, physical: &'a str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(physical);
    }

    physical
        .strip_prefix(prefix)?
        .strip_prefix(SEPARATOR)
}

/// Check whether a physical key belongs to `prefix`
pub fn matches(prefix: &str, physical: &str) -> bool {
    from_physical(prefix, physical).is_some()
}

/// Combine an outer prefix with a nested segment
///
/// `join("a", "b") == "a.b"`; an empty side leaves the other unchanged.
pub fn join(outer: &str, inner: &str) -> String {
    match (outer.is_empty(), inner.is_empty()) {
        (true, _) => inner.to_string(),
        (false, true) => outer.to_string(),
        (false, false) => to_physical(outer, inner),
    }
}
