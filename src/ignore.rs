//! Name-based ignore filter.
//!
//! Decides per directory entry whether it participates in a sync. Pure
//! function of the name and two fixed sets; no filesystem access.

/// Names excluded outright.
const DEFAULT_IGNORES: &[&str] = &[".git", "node_modules", ".DS_Store"];

/// Extensions (lowercased, last dot) excluded from upload.
const IGNORE_EXTS: &[&str] = &[".map", ".log"];

/// Hidden entries are skipped except for this one, which web servers need.
const HIDDEN_EXCEPTION: &str = ".well-known";

/// Returns true if the entry should be skipped entirely.
pub fn is_ignored(name: &str) -> bool {
    if DEFAULT_IGNORES.contains(&name) {
        return true;
    }
    if name.starts_with('.') && name != HIDDEN_EXCEPTION {
        return true;
    }
    if let Some(idx) = name.rfind('.') {
        let ext = name[idx..].to_ascii_lowercase();
        if IGNORE_EXTS.contains(&ext.as_str()) {
            return true;
        }
    }
    false
}
