//! Cross-site-scripting sanitization seam.
//!
//! Mail content is rendered by downstream viewers, so anything user
//! controlled (subject, body, attachment filenames) passes through a
//! sanitizer before the mail item leaves the worker. Implementations must be
//! deterministic and idempotent: sanitizing twice yields the same string.

/// Capability for scrubbing untrusted strings.
pub trait StringSanitizer: Send + Sync {
    fn sanitize(&self, input: &str) -> String;
}

/// Default sanitizer: removes script blocks and `javascript:` URL schemes.
///
/// Removal (rather than escaping) keeps the operation idempotent.
#[derive(Debug, Default, Clone, Copy)]
pub struct XssSanitizer;

impl StringSanitizer for XssSanitizer {
    fn sanitize(&self, input: &str) -> String {
        let without_scripts = strip_tag_blocks(input, "script");
        without_scripts.replace("javascript:", "").replace("Javascript:", "")
    }
}

/// Pass-through sanitizer for embedders that handle escaping elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSanitizer;

impl StringSanitizer for NoopSanitizer {
    fn sanitize(&self, input: &str) -> String {
        input.to_string()
    }
}

/// Removes every `<tag …>…</tag>` block, ASCII-case-insensitively. An
/// unclosed opening tag removes through the end of the input.
fn strip_tag_blocks(input: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut result = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(found) = find_ascii_ci(input, &open, cursor) {
        result.push_str(&input[cursor..found]);

        match find_ascii_ci(input, &close, found) {
            Some(end) => cursor = end + close.len(),
            None => return result,
        }
    }

    result.push_str(&input[cursor..]);
    result
}

/// Byte-wise ASCII-case-insensitive substring search. Tag names are ASCII,
/// so byte offsets stay valid for the original string regardless of what
/// Unicode surrounds them.
fn find_ascii_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();

    if needle.is_empty() || haystack.len() < from + needle.len() {
        return None;
    }

    (from..=haystack.len() - needle.len()).find(|&offset| {
        haystack[offset..offset + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_blocks() {
        let sanitizer = XssSanitizer;
        let result = sanitizer.sanitize("hello <script>alert(1)</script>world");
        assert_eq!(result, "hello world");
    }

    #[test]
    fn strips_mixed_case_script_blocks() {
        let sanitizer = XssSanitizer;
        let result = sanitizer.sanitize("a<SCRIPT src=\"x\">b</SCRIPT>c");
        assert_eq!(result, "ac");
    }

    #[test]
    fn removes_javascript_scheme() {
        let sanitizer = XssSanitizer;
        let result = sanitizer.sanitize("<a href=\"javascript:alert(1)\">x</a>");
        assert_eq!(result, "<a href=\"alert(1)\">x</a>");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let sanitizer = XssSanitizer;
        let once = sanitizer.sanitize("hi <script>x</script> javascript:there");
        let twice = sanitizer.sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn plain_text_unchanged() {
        let sanitizer = XssSanitizer;
        assert_eq!(sanitizer.sanitize("just a subject"), "just a subject");
    }
}
