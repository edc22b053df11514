//! Pure path hygiene for archive entry names.
//!
//! Entry paths inside an archive are attacker-controlled bytes.  Everything here is total (never
//! panics, never errors) and side-effect free: a hostile path simply produces `None`, which the
//! pipeline records as a skipped entry.
//!
//! Rejection, not repair: a path that tries to traverse above its root (`../../etc/passwd`) is
//! rejected outright rather than clamped to a safe equivalent, since a clamped name would
//! silently collide with a legitimate entry.

/// Derive a safe destination key by normalizing `entry_path` and joining it onto `prefix`.
///
/// Returns `None` for any of the adversarial path classes:
///
/// * bytes that aren't valid UTF-8, or contain a NUL
/// * absolute paths (leading `/`, or leading `\` before normalization)
/// * traversal that escapes the root after `.`/`..` resolution
/// * directory-only paths (trailing separator) and paths with no components
///
/// Separators are normalized so Windows-style `\` traversal is caught by the same checks.
/// Already-normalized paths pass through unchanged, so the derivation is idempotent.
pub fn safe_destination_key(prefix: &str, entry_path: &[u8]) -> Option<String> {
    let components = normalize_components(entry_path)?;

    Some(format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        components.join("/")
    ))
}

/// Derive the safe bare file name of an archive entry: the final path component after the same
/// normalization and rejection rules as [`safe_destination_key`].
///
/// The bare name is what the staging key and the downstream correlation use, so it must never be
/// empty, `.`, or `..`.
pub fn safe_base_name(entry_path: &[u8]) -> Option<String> {
    let components = normalize_components(entry_path)?;

    components.last().map(|name| name.to_string())
}

/// Shared normalization: separator folding, `.`/`..` resolution, and rejection of every unsafe
/// class.  Returns the normalized components, which are guaranteed non-empty and free of `.` and
/// `..`.
fn normalize_components(raw: &[u8]) -> Option<Vec<&str>> {
    if raw.is_empty() || raw.contains(&0) {
        return None;
    }

    let path = std::str::from_utf8(raw).ok()?;

    // Absolute paths are rejected before normalization so that a leading backslash counts too
    if path.starts_with('/') || path.starts_with('\\') {
        return None;
    }

    // An entry that names a directory rather than a file carries no data to stage
    if path.ends_with('/') || path.ends_with('\\') {
        return None;
    }

    let mut components: Vec<&str> = Vec::new();

    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => {
                // Popping past the root means the path escapes its prefix
                components.pop()?;
            }
            other => components.push(other),
        }
    }

    if components.is_empty() {
        return None;
    }

    Some(components)
}
