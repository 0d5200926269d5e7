//! Filename validity rules
//!
//! The remote store rejects names its least capable client platform cannot
//! represent, so invalid names are caught during scanning and excluded with
//! a recorded reason instead of failing later in propagation.

/// Characters the remote store refuses inside a name.
const FORBIDDEN: &[char] = &['\\', ':', '*', '?', '"', '<', '>', '|'];

/// Device names reserved regardless of extension.
const RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Check one path component against the shared validity rules.
///
/// Returns the reason the name is invalid, or `None` for a valid name.
#[must_use]
pub fn invalid_name_reason(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("empty name".to_string());
    }
    if name.ends_with('.') || name.ends_with(' ') {
        return Some(format!("'{name}' ends with a dot or space"));
    }
    if let Some(c) = name.chars().find(|c| c.is_control()) {
        return Some(format!("'{name}' contains control character {:#04x}", c as u32));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return Some(format!("'{name}' contains forbidden character '{c}'"));
    }
    // Reserved device names apply to the stem: "con.txt" is as bad as "con".
    let stem = name.split('.').next().unwrap_or(name);
    if RESERVED.iter().any(|r| stem.eq_ignore_ascii_case(r)) {
        return Some(format!("'{name}' is a reserved device name"));
    }
    None
}

/// Check every component of a relative slash-separated path.
#[must_use]
pub fn invalid_path_reason(path: &str) -> Option<String> {
    path.split('/').find_map(invalid_name_reason)
}
