//! Structured source minifier.
//!
//! Works on the byte level with a small scanner that understands:
//! - open and close tags: text outside `<?php` / `<?=` ... `?>` is inline
//!   output and copied verbatim, as is a file with no open tag at all
//! - string literals delimited by `'`, `"` or `` ` `` (backslash escapes)
//! - heredoc / nowdoc blocks (`<<<ID`, `<<<'ID'`, `<<<"ID"`)
//! - line comments `//` and `#` (`#[` starts an attribute, not a comment),
//!   which end at a newline or just before `?>`
//! - block comments `/* ... */`
//!
//! Every gap made of whitespace and comments is replaced by the newlines it
//! contained, or by a single space when it contained none. Line numbers of
//! the remaining code are therefore unchanged. A gap at the very end of the
//! file without newlines is dropped.

/// Strips comments and redundant whitespace from source files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuredSourceMinifier;

impl StructuredSourceMinifier {
    pub fn compact(&self, content: &[u8], logical_path: &str) -> Vec<u8> {
        match minify(content) {
            Ok(out) => out,
            Err(reason) => {
                tracing::debug!(path = logical_path, reason, "source not compacted, keeping original");
                content.to_vec()
            }
        }
    }
}

fn minify(src: &[u8]) -> Result<Vec<u8>, &'static str> {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        let Some(code) = find_open_tag(src, i) else {
            out.extend_from_slice(&src[i..]);
            break;
        };
        out.extend_from_slice(&src[i..code]);
        i = minify_code(src, code, &mut out)?;
    }

    Ok(out)
}

/// End of the next `<?php` or `<?=` tag at or after `from`.
fn find_open_tag(src: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while let Some(p) = find(&src[i..], b"<?") {
        let at = i + p;
        let rest = &src[at + 2..];
        if rest.starts_with(b"=") {
            return Some(at + 3);
        }
        if rest.len() >= 3
            && rest[..3].eq_ignore_ascii_case(b"php")
            && rest.get(3).map_or(true, |b| is_space(*b))
        {
            return Some(at + 5);
        }
        i = at + 2;
    }
    None
}

/// Compact code from `start` up to and including the next `?>`. Returns the
/// position after it, or the end of input.
fn minify_code(src: &[u8], start: usize, out: &mut Vec<u8>) -> Result<usize, &'static str> {
    let mut i = start;

    while i < src.len() {
        if src[i..].starts_with(b"?>") {
            out.extend_from_slice(b"?>");
            return Ok(i + 2);
        }
        if starts_gap(src, i) {
            let (end, newlines) = scan_gap(src, i)?;
            if newlines > 0 {
                out.resize(out.len() + newlines, b'\n');
            } else if end != src.len() {
                out.push(b' ');
            }
            i = end;
            continue;
        }

        match src[i] {
            b'\'' | b'"' | b'`' => {
                let end = scan_string(src, i)?;
                out.extend_from_slice(&src[i..end]);
                i = end;
            }
            b'<' if src[i..].starts_with(b"<<<") => match scan_heredoc(src, i)? {
                Some(end) => {
                    out.extend_from_slice(&src[i..end]);
                    i = end;
                }
                None => {
                    out.push(b'<');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    Ok(i)
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn starts_line_comment(src: &[u8], i: usize) -> bool {
    src[i..].starts_with(b"//") || (src[i] == b'#' && src.get(i + 1) != Some(&b'['))
}

fn starts_gap(src: &[u8], i: usize) -> bool {
    is_space(src[i]) || starts_line_comment(src, i) || src[i..].starts_with(b"/*")
}

/// Returns the end of the gap starting at `i` and the newlines it contains.
fn scan_gap(src: &[u8], mut i: usize) -> Result<(usize, usize), &'static str> {
    let mut newlines = 0;
    while i < src.len() {
        if is_space(src[i]) {
            if src[i] == b'\n' {
                newlines += 1;
            }
            i += 1;
        } else if starts_line_comment(src, i) {
            // The terminating newline belongs to the gap as whitespace.
            while i < src.len() && src[i] != b'\n' && !src[i..].starts_with(b"?>") {
                i += 1;
            }
        } else if src[i..].starts_with(b"/*") {
            let body = i + 2;
            let close = find(&src[body..], b"*/").ok_or("unterminated block comment")?;
            newlines += src[body..body + close].iter().filter(|&&b| b == b'\n').count();
            i = body + close + 2;
        } else {
            break;
        }
    }
    Ok((i, newlines))
}

fn scan_string(src: &[u8], start: usize) -> Result<usize, &'static str> {
    let quote = src[start];
    let mut j = start + 1;
    while j < src.len() {
        match src[j] {
            b'\\' => j += 2,
            b if b == quote => return Ok(j + 1),
            _ => j += 1,
        }
    }
    Err("unterminated string literal")
}

/// Scan a heredoc starting at `start` (which points at `<<<`).
///
/// `Ok(None)` means the `<<<` does not open a heredoc and is plain code.
fn scan_heredoc(src: &[u8], start: usize) -> Result<Option<usize>, &'static str> {
    let mut j = start + 3;
    while j < src.len() && matches!(src[j], b' ' | b'\t') {
        j += 1;
    }
    let quote = match src.get(j) {
        Some(&q @ (b'\'' | b'"')) => {
            j += 1;
            Some(q)
        }
        _ => None,
    };
    let ident_start = j;
    match src.get(j) {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return Ok(None),
    }
    while j < src.len() && is_ident(src[j]) {
        j += 1;
    }
    let ident = &src[ident_start..j];
    if let Some(q) = quote {
        if src.get(j) != Some(&q) {
            return Ok(None);
        }
        j += 1;
    }
    if src.get(j) == Some(&b'\r') {
        j += 1;
    }
    if src.get(j) != Some(&b'\n') {
        return Ok(None);
    }

    let mut line = j + 1;
    while line < src.len() {
        let mut p = line;
        while p < src.len() && matches!(src[p], b' ' | b'\t') {
            p += 1;
        }
        if src[p..].starts_with(ident) {
            let after = p + ident.len();
            if src.get(after).map_or(true, |b| !is_ident(*b)) {
                return Ok(Some(after));
            }
        }
        match find(&src[line..], b"\n") {
            Some(nl) => line += nl + 1,
            None => break,
        }
    }
    Err("unterminated heredoc")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
