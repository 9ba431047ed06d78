/// Decorators that change what a definition means and therefore survive
/// extraction.
pub const KEPT_DECORATORS: &[&str] = &["@staticmethod", "@classmethod", "@property"];

/// Removes decorator lines from a definition, keeping those starting with one
/// of `keep`.
///
/// This is line based: a decorator call spanning several lines is skipped up
/// to the first line ending in `)`, so a closing line with a trailing comment
/// is not recognised.
pub fn strip_decorators(source: &str, keep: &[&str]) -> String {
    let mut kept = Vec::new();
    let mut in_decorator = false;

    for line in source.lines() {
        let stripped = line.trim();

        if in_decorator {
            if stripped.ends_with(')') {
                in_decorator = false;
            }
            continue;
        }

        if stripped.starts_with('@') {
            if keep.iter().any(|prefix| stripped.starts_with(prefix)) {
                kept.push(line);
            } else if !stripped.ends_with(')') && stripped.contains('(') {
                in_decorator = true;
            }
            continue;
        }

        kept.push(line);
    }

    kept.join("\n")
}
