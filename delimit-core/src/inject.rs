//! Spreadsheet formula injection guard.
//!
//! Spreadsheet applications interpret a leading `=`, `+`, `-` or `@` as the
//! start of a formula, which turns an innocent-looking CSV export into an
//! execution vector. When enabled, the guard inspects the first character of
//! each outgoing field (or the first character inside an enclosing pair of
//! quotes) and neutralizes it before encoding.

use crate::dialect::{Dialect, InjectionGuard};

/// The outcome of sanitizing one outgoing field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Sanitized<'a> {
    /// The field is harmless (or the guard is off); encode it as usual.
    Clean(&'a str),
    /// The field was rewritten; encode the replacement text. When
    /// `force_quote` is set the encoder must quote regardless of its
    /// predicate, so the escape character stays inside quotes.
    Rewritten {
        /// The replacement field text.
        text: String,
        /// Quote the replacement unconditionally.
        force_quote: bool,
    },
    /// The caller pre-quoted the field and the rewrite preserved its quotes;
    /// write the text verbatim, bypassing the encoder.
    Verbatim(String),
}

/// An injection character led a field while the guard was set to
/// [`InjectionGuard::Error`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InjectionError {
    /// The offending field.
    pub field: String,
}

impl core::fmt::Display for InjectionError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "field {:?} begins with a formula injection character",
            self.field
        )
    }
}

impl std::error::Error for InjectionError {}

/// Apply the dialect's injection guard to `field`.
pub fn sanitize<'a>(field: &'a str, dialect: &Dialect) -> Result<Sanitized<'a>, InjectionError> {
    if dialect.injection == InjectionGuard::Off {
        return Ok(Sanitized::Clean(field));
    }
    let quote = dialect.quote;
    let pre_quoted = field.starts_with(quote)
        && field.ends_with(quote)
        && field.chars().count() >= 2;
    let inner = if pre_quoted {
        &field[quote.len_utf8()..field.len() - quote.len_utf8()]
    } else {
        field
    };
    let leads_with_injection = inner
        .chars()
        .next()
        .map_or(false, |c| dialect.injection_chars.contains(&c));
    if !leads_with_injection {
        return Ok(Sanitized::Clean(field));
    }
    match dialect.injection {
        InjectionGuard::Off => Ok(Sanitized::Clean(field)),
        InjectionGuard::Error => Err(InjectionError { field: field.to_string() }),
        InjectionGuard::Escape => {
            if pre_quoted {
                let mut text = String::with_capacity(field.len() + 1);
                text.push(quote);
                text.push(dialect.injection_escape);
                text.push_str(inner);
                text.push(quote);
                Ok(Sanitized::Verbatim(text))
            } else {
                let mut text = String::with_capacity(field.len() + 1);
                text.push(dialect.injection_escape);
                text.push_str(field);
                Ok(Sanitized::Rewritten { text, force_quote: true })
            }
        }
        InjectionGuard::Strip => {
            let stripped =
                inner.trim_start_matches(|c: char| dialect.injection_chars.contains(&c));
            if pre_quoted {
                let mut text = String::with_capacity(stripped.len() + 2);
                text.push(quote);
                text.push_str(stripped);
                text.push(quote);
                Ok(Sanitized::Verbatim(text))
            } else {
                Ok(Sanitized::Rewritten { text: stripped.to_string(), force_quote: false })
            }
        }
    }
}
