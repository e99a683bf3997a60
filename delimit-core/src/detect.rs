//! Delimiter detection over an initial sample of the input.
//!
//! Runs at most once, on the first buffer fill. Quoted regions (or escape
//! sequences) are stripped first so that delimiters inside field data do not
//! skew the counts, then every candidate that appears on each sampled line
//! is ranked by total occurrences.

use memchr::memchr2;

use crate::dialect::{Dialect, Mode, Terminator};

/// Pick a delimiter for `sample`, or `None` when no candidate qualifies.
///
/// A candidate qualifies when it appears at least once on every sampled
/// line. The configured delimiter is preferred when it qualifies and more
/// than one line was sampled; otherwise the qualifying candidate with the
/// most total occurrences wins, ties broken by candidate order.
pub fn detect_delimiter(sample: &str, dialect: &Dialect) -> Option<String> {
    let stripped = strip_structure(sample, dialect);
    let mut lines = split_lines(&stripped, dialect);
    if lines.len() > 1 {
        // The last line may have been cut off mid-row by the buffer.
        lines.pop();
    }
    if lines.is_empty() {
        return None;
    }

    let occurrences = |cand: &str| -> Option<usize> {
        let mut total = 0;
        for line in &lines {
            let n = line.matches(cand).count();
            if n == 0 {
                return None;
            }
            total += n;
        }
        Some(total)
    };

    if lines.len() > 1 && occurrences(&dialect.delimiter).is_some() {
        return Some(dialect.delimiter.clone());
    }

    let mut best: Option<(&str, usize)> = None;
    for cand in &dialect.detect_candidates {
        if let Some(total) = occurrences(cand) {
            match best {
                Some((_, top)) if total <= top => {}
                _ => best = Some((cand, total)),
            }
        }
    }
    best.map(|(cand, _)| cand.to_string())
}

/// Remove quoted regions or escape sequences so only structural characters
/// remain.
fn strip_structure(sample: &str, dialect: &Dialect) -> String {
    let mut out = String::with_capacity(sample.len());
    match dialect.mode {
        Mode::Rfc4180 => {
            let mut in_quotes = false;
            for c in sample.chars() {
                if c == dialect.quote {
                    in_quotes = !in_quotes;
                    continue;
                }
                if !in_quotes || c == '\r' || c == '\n' {
                    out.push(c);
                }
            }
        }
        Mode::Escape => {
            let mut chars = sample.chars();
            while let Some(c) = chars.next() {
                if c == dialect.escape {
                    chars.next();
                    continue;
                }
                out.push(c);
            }
        }
        Mode::NoEscape => out.push_str(sample),
    }
    out
}

/// Split the sample into logical lines by the configured terminator, or any
/// of `\r\n`, `\r`, `\n` when the terminator is automatic.
fn split_lines<'a>(sample: &'a str, dialect: &Dialect) -> Vec<&'a str> {
    match dialect.terminator {
        Terminator::Auto => {
            let mut lines = Vec::new();
            let bytes = sample.as_bytes();
            let mut start = 0;
            let mut at = 0;
            while let Some(i) = memchr2(b'\r', b'\n', &bytes[at..]) {
                let i = at + i;
                lines.push(&sample[start..i]);
                start = if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
                    i + 2
                } else {
                    i + 1
                };
                at = start;
            }
            lines.push(&sample[start..]);
            lines
        }
        ref term => sample.split(term.as_str()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_candidates(cands: &[&str]) -> Dialect {
        Dialect {
            detect_candidates: cands.iter().map(|s| s.to_string()).collect(),
            ..Dialect::default()
        }
    }

    #[test]
    fn picks_semicolon() {
        let d = with_candidates(&[",", ";", "\t"]);
        assert_eq!(
            detect_delimiter("h1;h2;h3\n1;2;3\n", &d),
            Some(";".to_string())
        );
    }

    #[test]
    fn prefers_configured_delimiter_when_present_everywhere() {
        // Both "," and ";" appear on every line; the configured delimiter
        // wins.
        let d = with_candidates(&[";", ","]);
        assert_eq!(
            detect_delimiter("a,b;c\nd,e;f\n", &d),
            Some(",".to_string())
        );
    }

    #[test]
    fn candidate_missing_from_one_line_is_disqualified() {
        let d = with_candidates(&[";", "\t"]);
        assert_eq!(
            detect_delimiter("a;b\tc\nd\te\nf\tg\n", &d),
            Some("\t".to_string())
        );
    }

    #[test]
    fn quoted_delimiters_are_ignored() {
        let d = with_candidates(&[",", ";"]);
        assert_eq!(
            detect_delimiter("\"a,a,a,a\";b\n\"c,c\";d\n", &d),
            Some(";".to_string())
        );
    }

    #[test]
    fn drops_incomplete_last_line() {
        let d = with_candidates(&[",", ";"]);
        // The trailing line has no terminator yet and would disqualify ";".
        assert_eq!(
            detect_delimiter("a;b\nc;d\ne", &d),
            Some(";".to_string())
        );
    }

    #[test]
    fn no_candidate_qualifies() {
        let d = with_candidates(&[";", "\t"]);
        assert_eq!(detect_delimiter("plain text\nmore text\n", &d), None);
    }

    #[test]
    fn single_line_sample_still_detects() {
        let d = with_candidates(&[",", ";"]);
        assert_eq!(detect_delimiter("a;b;c", &d), Some(";".to_string()));
    }

    #[test]
    fn tie_breaks_by_candidate_order() {
        let d = with_candidates(&["|", ";"]);
        assert_eq!(
            detect_delimiter("a|b;c\nd|e;f\n", &d),
            Some("|".to_string())
        );
    }
}
