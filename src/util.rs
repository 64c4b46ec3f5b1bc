//! Small shared helpers

/// Truncate a string for log output, appending "..." when truncated.
/// Cuts on a char boundary so multi-byte text stays valid.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let cut = (0..=max_len)
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}...", &s[..cut])
}
