//! Tunnel naming rules
//!
//! Tunnel names double as interface names, so they follow the kernel's interface-name
//! limits: at most 15 characters from a conservative set.

use regex::Regex;
use std::sync::OnceLock;

/// Longest accepted tunnel name
pub const NAME_MAX_LENGTH: usize = 15;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_=+.-]{1,15}$").expect("tunnel name pattern is valid")
    })
}

/// Returns true if `name` cannot be used as a tunnel name
pub fn is_name_invalid(name: &str) -> bool {
    !name_pattern().is_match(name)
}
