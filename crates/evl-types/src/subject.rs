//! Subject namespace rules.
//!
//! Subjects are `/`-rooted hierarchical names such as `/books/42`. They
//! partition events for reads; they play no part in the global hash chain.

use crate::error::TypeError;

/// Check that a subject is non-empty and starts with `/`.
pub fn validate_subject(subject: &str) -> Result<(), TypeError> {
    if subject.is_empty() {
        return Err(TypeError::EmptyField("subject"));
    }
    if !subject.starts_with('/') {
        return Err(TypeError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

/// Returns `true` if `subject` equals `base` or is one of its descendants.
///
/// `/a` contains `/a` and `/a/b` but not `/ab`. The root `/` contains every
/// subject.
pub fn is_within(subject: &str, base: &str) -> bool {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return subject.starts_with('/');
    }
    match subject.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}
