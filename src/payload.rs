//! Payload validity checks
//!
//! The fetcher does not interpret snapshot contents. It only rejects output
//! that carries no data at all.

/// Check whether command output should be treated as an empty response
///
/// Blank text, and JSON `null`, `{}` or `[]`, are empty. Any other text is
/// accepted, including scalars like `0` and text that is not JSON at all.
///
/// # Examples
///
/// ```
/// use netuid_fetch::payload::is_empty_payload;
///
/// assert!(is_empty_payload("  \n"));
/// assert!(is_empty_payload("{}"));
/// assert!(!is_empty_payload("[1]"));
/// assert!(!is_empty_payload("Subnet 7 info"));
/// ```
#[must_use]
pub fn is_empty_payload(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Null) => true,
        Ok(serde_json::Value::Array(items)) => items.is_empty(),
        Ok(serde_json::Value::Object(fields)) => fields.is_empty(),
        Ok(_) => false,
        // Not JSON but not blank either
        Err(_) => false,
    }
}
