//! Filename sanitization for the local filesystem.

/// Longest name most Unix filesystems accept, in bytes.
const NAME_MAX: usize = 255;

/// Makes `name` safe to use as a single path component.
///
/// Path separators, NUL and control characters become `_`; leading and
/// trailing whitespace and dots are stripped (no hidden files, no `..`); the
/// result is cut to [`NAME_MAX`] bytes on a char boundary. May return an
/// empty string, which callers replace with a default.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
