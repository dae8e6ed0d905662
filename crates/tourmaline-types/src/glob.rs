//! Glob matching for resource and field names.
//!
//! The only metacharacters are `*` (any run of bytes, including empty)
//! and `?` (exactly one byte). Resource and field names are flat
//! identifiers, so there is no separator handling, no character classes,
//! and no escaping.

/// Returns whether `value` matches the glob `pattern`.
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    matches_bytes(pattern.as_bytes(), value.as_bytes())
}

/// Byte-wise recursive matcher. Each step strips at least one byte from
/// the pattern or the value, so recursion depth stays linear in the
/// combined input length.
fn matches_bytes(pattern: &[u8], value: &[u8]) -> bool {
    match (pattern.first(), value.first()) {
        (None, None) => true,
        // A trailing `*` swallows whatever is left of the value.
        (Some(b'*'), _) if pattern.len() == 1 => true,
        // Either the `*` is done, or it absorbs one more value byte.
        (Some(b'*'), _) => {
            matches_bytes(&pattern[1..], value)
                || (!value.is_empty() && matches_bytes(pattern, &value[1..]))
        }
        (Some(b'?'), Some(_)) => matches_bytes(&pattern[1..], &value[1..]),
        (Some(p), Some(v)) if p == v => matches_bytes(&pattern[1..], &value[1..]),
        // Leftover value bytes, a starved `?`, or a literal mismatch.
        _ => false,
    }
}
