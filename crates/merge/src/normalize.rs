/// Map a human-facing name to its canonical comparison key.
///
/// Steps run in a fixed order; reordering them changes the output:
/// lowercase, `" & "` to `-`, remaining `&` to `-`, drop `.`, spaces to `-`,
/// then drop anything that is not alphanumeric or `-`.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .replace(" & ", "-")
        .replace('&', "-")
        .replace('.', "")
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// True for keys with nothing to compare: empty, or only separators
/// (`" "`, `"&"` and `" . "` all normalize to hyphens).
pub fn is_blank_key(key: &str) -> bool {
    key.chars().all(|c| c == '-')
}
