//! Byte-level JSON scanning without allocation.
//!
//! Used by the frame decoder to find complete top-level values in a rolling
//! buffer of concatenated JSON, and by the tool-call accumulator to salvage
//! the first balanced object from a damaged argument payload. A proper
//! string-aware scan is required here: brace counting that ignores string
//! context breaks on values containing `{` or `}`.

#[inline]
pub(crate) fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\n' | b'\r' | b'\t') {
        i += 1;
    }
    i
}

/// End offset (exclusive) of the JSON value starting at `start`, or `None`
/// when the buffer ends before the value is complete or no value starts there.
#[inline]
pub(crate) fn value_end(bytes: &[u8], start: usize) -> Option<usize> {
    let i = skip_ws(bytes, start);
    match bytes.get(i)? {
        b'"' => string_end(bytes, i),
        b'{' => container_end(bytes, i, b'}'),
        b'[' => container_end(bytes, i, b']'),
        b't' => literal_end(bytes, i, b"true"),
        b'f' => literal_end(bytes, i, b"false"),
        b'n' => literal_end(bytes, i, b"null"),
        b'-' | b'0'..=b'9' => number_end(bytes, i),
        _ => None,
    }
}

#[inline]
pub(crate) fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes.get(start) != Some(&b'"') {
        return None;
    }
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Some(i + 1),
            b'\\' => i += 2,
            _ => i += 1,
        }
    }
    None
}

/// Object and array scanning share one structural walk; element-level
/// grammar is delegated back to [`value_end`].
fn container_end(bytes: &[u8], start: usize, close: u8) -> Option<usize> {
    let mut i = start + 1;
    loop {
        i = skip_ws(bytes, i);
        if *bytes.get(i)? == close {
            return Some(i + 1);
        }

        if close == b'}' {
            i = string_end(bytes, i)?;
            i = skip_ws(bytes, i);
            if *bytes.get(i)? != b':' {
                return None;
            }
            i += 1;
        }
        i = value_end(bytes, i)?;
        i = skip_ws(bytes, i);
        match *bytes.get(i)? {
            b',' => i += 1,
            c if c == close => return Some(i + 1),
            _ => return None,
        }
    }
}

#[inline]
fn literal_end(bytes: &[u8], start: usize, lit: &[u8]) -> Option<usize> {
    let end = start.checked_add(lit.len())?;
    (bytes.get(start..end)? == lit).then_some(end)
}

#[inline]
fn number_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }
    let digits = |bytes: &[u8], mut i: usize| {
        let from = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        (i > from).then_some(i)
    };

    i = digits(bytes, i)?;
    if bytes.get(i) == Some(&b'.') {
        i = digits(bytes, i + 1)?;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        i = digits(bytes, i)?;
    }
    Some(i)
}

/// Locate the first complete, balanced JSON object anywhere in `text`.
///
/// This is the repair path for tool-call arguments that arrive wrapped in
/// stray prose or markup: everything before the first `{` that opens a
/// parseable object is discarded.
#[must_use]
pub(crate) fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(rel) = memchr::memchr(b'{', &bytes[from..]) {
        let start = from + rel;
        if let Some(end) = container_end(bytes, start, b'}') {
            return text.get(start..end);
        }
        from = start + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_end_simple_object() {
        let buf = br#"{"a":1}{"b":2}"#;
        assert_eq!(value_end(buf, 0), Some(7));
        assert_eq!(value_end(buf, 7), Some(14));
    }

    #[test]
    fn test_value_end_incomplete() {
        assert_eq!(value_end(br#"{"a":"#, 0), None);
        assert_eq!(value_end(br#"{"a":"tru"#, 0), None);
        assert_eq!(value_end(b"[1,2", 0), None);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scan() {
        let buf = br#"{"text":"a } b { c","n":1}"#;
        assert_eq!(value_end(buf, 0), Some(buf.len()));
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let buf = br#"{"text":"say \"}\" loudly"}"#;
        assert_eq!(value_end(buf, 0), Some(buf.len()));
    }

    #[test]
    fn test_nested_containers() {
        let buf = br#"{"a":[{"b":[1,2,{}]},null,true],"c":-1.5e3}"#;
        assert_eq!(value_end(buf, 0), Some(buf.len()));
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(value_end(b"-12.5e+3,", 0), Some(8));
        assert_eq!(value_end(b"0", 0), Some(1));
        assert_eq!(value_end(b"-", 0), None);
        assert_eq!(value_end(b"1.", 0), None);
    }

    #[test]
    fn test_first_balanced_object_skips_prose() {
        let text = r#"Sure, calling now: {"query":"weather"} done"#;
        assert_eq!(first_balanced_object(text), Some(r#"{"query":"weather"}"#));
    }

    #[test]
    fn test_first_balanced_object_skips_unclosed_prefix() {
        let text = r#"{oops {"q":1}"#;
        assert_eq!(first_balanced_object(text), Some(r#"{"q":1}"#));
    }

    #[test]
    fn test_first_balanced_object_none() {
        assert_eq!(first_balanced_object("no json here"), None);
        assert_eq!(first_balanced_object(r#"{"open": "#), None);
    }
}
