//! Field encoding for the write side.
//!
//! The encoder mirrors the parser: the same dialect that governs how a field
//! is decoded governs how it must be written so that a round trip through
//! both is the identity.

use memchr::{memchr, memchr3};

use crate::dialect::{Dialect, Mode, Terminator};

/// Whether `field` must be quoted to survive a round trip.
///
/// This is the default predicate: quote when the field starts or ends with a
/// whitespace character, or contains the quote character, the delimiter, or
/// any recognized line break.
pub fn needs_quotes(field: &str, dialect: &Dialect) -> bool {
    let starts_ws = field.chars().next().map_or(false, |c| dialect.is_whitespace(c));
    let ends_ws = field.chars().next_back().map_or(false, |c| dialect.is_whitespace(c));
    if starts_ws || ends_ws {
        return true;
    }
    // Fast path: with a single-byte ASCII delimiter and quote, one scan over
    // the bytes decides.
    let delim = dialect.delimiter.as_bytes();
    if delim.len() == 1 && dialect.quote.is_ascii() {
        let bytes = field.as_bytes();
        if memchr3(delim[0], dialect.quote as u8, b'\r', bytes).is_some()
            || memchr(b'\n', bytes).is_some()
        {
            return true;
        }
    } else if field.contains(dialect.quote)
        || field.contains(&dialect.delimiter)
        || field.contains('\r')
        || field.contains('\n')
    {
        return true;
    }
    if let Terminator::Custom(ref term) = dialect.terminator {
        if field.contains(term.as_str()) {
            return true;
        }
    }
    false
}

/// Encode `field` onto `out` according to the dialect.
///
/// `force_quote` overrides the default quoting predicate in RFC 4180 mode;
/// it has no effect in the other modes.
pub fn encode_field(out: &mut String, field: &str, dialect: &Dialect, force_quote: Option<bool>) {
    match dialect.mode {
        Mode::Rfc4180 => {
            let quote_it = force_quote.unwrap_or_else(|| needs_quotes(field, dialect));
            if !quote_it {
                out.push_str(field);
                return;
            }
            let quote = dialect.quote;
            let escape = dialect.escape;
            out.push(quote);
            for c in field.chars() {
                if escape != quote && c == escape {
                    out.push(escape);
                    out.push(escape);
                } else if c == quote {
                    out.push(escape);
                    out.push(quote);
                } else {
                    out.push(c);
                }
            }
            out.push(quote);
        }
        Mode::Escape => encode_escape_mode(out, field, dialect),
        Mode::NoEscape => out.push_str(field),
    }
}

/// Escape-dialect encoding: prefix each occurrence of the escape, the quote,
/// the delimiter or a line break with the escape character. No quotes are
/// added.
fn encode_escape_mode(out: &mut String, field: &str, dialect: &Dialect) {
    let escape = dialect.escape;
    let quote = dialect.quote;
    let mut rest = field;
    while !rest.is_empty() {
        if rest.starts_with(&dialect.delimiter) {
            out.push(escape);
            out.push_str(&dialect.delimiter);
            rest = &rest[dialect.delimiter.len()..];
            continue;
        }
        if let Some(term) = line_break_at(rest, dialect) {
            out.push(escape);
            out.push_str(term);
            rest = &rest[term.len()..];
            continue;
        }
        // Guaranteed non-empty by the loop condition.
        let Some(c) = rest.chars().next() else { break };
        if c == escape || c == quote {
            out.push(escape);
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
}

/// The line break starting at the front of `rest`, if any, as recognized by
/// the reader for this dialect.
fn line_break_at<'a>(rest: &'a str, dialect: &Dialect) -> Option<&'a str> {
    match dialect.terminator {
        Terminator::Auto => {
            if rest.starts_with("\r\n") {
                Some(&rest[..2])
            } else if rest.starts_with('\r') || rest.starts_with('\n') {
                Some(&rest[..1])
            } else {
                None
            }
        }
        ref term => {
            let t = term.as_str();
            if rest.starts_with(t) {
                Some(&rest[..t.len()])
            } else {
                None
            }
        }
    }
}
