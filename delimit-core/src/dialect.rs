use core::fmt;

/// The parsing and encoding mode of a dialect.
///
/// The default is `Rfc4180`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// RFC 4180 semantics: quoted fields, doubled (or escaped) quotes and
    /// newlines permitted inside quotes.
    Rfc4180,
    /// A single escape character makes the following character literal.
    /// Quotes are not structural in this mode.
    Escape,
    /// Only the delimiter and the record terminator are special. Everything
    /// else is field data.
    NoEscape,
}

impl Default for Mode {
    fn default() -> Mode {
        Mode::Rfc4180
    }
}

/// Whitespace trimming applied to fields while parsing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Trim {
    /// Fields are returned exactly as they appear in the input.
    None,
    /// Leading and trailing whitespace outside quotes is removed.
    Outer,
    /// Leading and trailing whitespace inside quotes is removed.
    InsideQuotes,
    /// Both `Outer` and `InsideQuotes`.
    All,
}

impl Trim {
    pub(crate) fn outer(&self) -> bool {
        matches!(*self, Trim::Outer | Trim::All)
    }

    pub(crate) fn inside(&self) -> bool {
        matches!(*self, Trim::InsideQuotes | Trim::All)
    }
}

impl Default for Trim {
    fn default() -> Trim {
        Trim::None
    }
}

/// A record terminator.
///
/// The default is `Auto`, which treats `\r`, `\n` or `\r\n` as a single
/// record terminator while reading and writes `\n`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Terminator {
    /// Accept any of `\r`, `\n` or `\r\n` while reading; write `\n`.
    Auto,
    /// `\r\n`.
    Crlf,
    /// `\n`.
    Lf,
    /// An arbitrary terminator string. Must be non-empty.
    Custom(String),
}

impl Terminator {
    /// The string written between records.
    pub fn as_str(&self) -> &str {
        match *self {
            Terminator::Auto | Terminator::Lf => "\n",
            Terminator::Crlf => "\r\n",
            Terminator::Custom(ref s) => s,
        }
    }

    /// Whether `c` can begin a record terminator.
    pub(crate) fn starts_with(&self, c: char) -> bool {
        match *self {
            Terminator::Auto => c == '\r' || c == '\n',
            Terminator::Crlf => c == '\r',
            Terminator::Lf => c == '\n',
            Terminator::Custom(ref s) => s.chars().next() == Some(c),
        }
    }
}

impl Default for Terminator {
    fn default() -> Terminator {
        Terminator::Auto
    }
}

/// What to do when a field written out begins with a spreadsheet formula
/// character.
///
/// The default is `Off`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InjectionGuard {
    /// Write fields untouched.
    Off,
    /// Fail the write.
    Error,
    /// Quote the field and prepend the injection escape character, so a
    /// consuming spreadsheet treats it as text.
    Escape,
    /// Remove leading injection characters.
    Strip,
}

impl Default for InjectionGuard {
    fn default() -> InjectionGuard {
        InjectionGuard::Off
    }
}

/// The character encoding used for advisory byte counting.
///
/// The parser consumes decoded characters; this only controls how wide each
/// consumed character is counted to be when `count_bytes` is enabled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    /// Count UTF-8 code units.
    Utf8,
    /// Count UTF-16 code units as bytes (two per unit).
    Utf16,
}

impl Encoding {
    pub(crate) fn width(&self, c: char) -> u64 {
        match *self {
            Encoding::Utf8 => c.len_utf8() as u64,
            Encoding::Utf16 => 2 * c.len_utf16() as u64,
        }
    }
}

impl Default for Encoding {
    fn default() -> Encoding {
        Encoding::Utf8
    }
}

/// A validated bundle of dialect and behavior settings shared by the parser
/// and the encoder.
///
/// A `Dialect` is plain data: build one with struct update syntax from
/// `Dialect::default()` and hand it to a parser or writer, which validates it
/// once at construction. After that it never changes (delimiter detection
/// replaces the delimiter through [`crate::Parser::set_delimiter`], which
/// re-validates).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dialect {
    /// The parsing and encoding mode.
    pub mode: Mode,
    /// The field separator. May be more than one character. Must be
    /// non-empty.
    pub delimiter: String,
    /// The quote character.
    pub quote: char,
    /// The escape character. Commonly equal to `quote`, which yields the
    /// RFC 4180 `""` doubling.
    pub escape: char,
    /// The record terminator.
    pub terminator: Terminator,
    /// The comment character. Only meaningful with `allow_comments`.
    pub comment: char,
    /// Skip lines whose first character is `comment`.
    pub allow_comments: bool,
    /// Skip lines that consist solely of a record terminator.
    pub ignore_blank_lines: bool,
    /// Whitespace trimming applied while parsing.
    pub trim: Trim,
    /// The characters `trim` removes.
    pub whitespace: Vec<char>,
    /// Inspect the first buffer fill and pick a delimiter from
    /// `detect_candidates`.
    pub detect_delimiter: bool,
    /// Candidate delimiters for detection, in preference order.
    pub detect_candidates: Vec<String>,
    /// Upper bound on the raw character length of a single field. Zero
    /// disables the check.
    pub max_field_size: usize,
    /// Treat a line break inside a quoted field as bad data and terminate
    /// the record there.
    pub quoted_line_break_is_bad_data: bool,
    /// Track the encoded byte count of consumed input.
    pub count_bytes: bool,
    /// The encoding used for byte counting.
    pub encoding: Encoding,
    /// Initial capacity of the row buffer, in bytes.
    pub buffer_size: usize,
    /// Initial capacity of the decoded-field buffer, in bytes.
    pub processed_buffer_size: usize,
    /// What to do about leading formula characters when writing.
    pub injection: InjectionGuard,
    /// Characters that trigger the injection guard when leading a field.
    pub injection_chars: Vec<char>,
    /// The character prepended by `InjectionGuard::Escape`.
    pub injection_escape: char,
}

impl Default for Dialect {
    fn default() -> Dialect {
        Dialect {
            mode: Mode::default(),
            delimiter: ",".to_string(),
            quote: '"',
            escape: '"',
            terminator: Terminator::default(),
            comment: '#',
            allow_comments: false,
            ignore_blank_lines: true,
            trim: Trim::default(),
            whitespace: vec![' '],
            detect_delimiter: false,
            detect_candidates: vec![
                ",".to_string(),
                ";".to_string(),
                "|".to_string(),
                "\t".to_string(),
            ],
            max_field_size: 0,
            quoted_line_break_is_bad_data: false,
            count_bytes: false,
            encoding: Encoding::default(),
            buffer_size: 8 * (1 << 10),
            processed_buffer_size: 1 << 10,
            injection: InjectionGuard::default(),
            injection_chars: vec!['=', '+', '-', '@'],
            injection_escape: '\'',
        }
    }
}

impl Dialect {
    /// Check this dialect for internal consistency.
    ///
    /// This is called by parser and writer constructors and again after
    /// delimiter detection. The checks are structural: a delimiter that
    /// contains the quote, escape or a terminator character can never be
    /// matched unambiguously, and zero-sized buffers can never make
    /// progress.
    pub fn validate(&self) -> Result<(), Error> {
        if self.delimiter.is_empty() {
            return Err(Error::invalid("delimiter must not be empty"));
        }
        if self.delimiter.contains(self.quote) {
            return Err(Error::invalid("delimiter must not contain the quote character"));
        }
        if self.delimiter.contains(self.escape) {
            return Err(Error::invalid("delimiter must not contain the escape character"));
        }
        if self.delimiter.contains('\r') || self.delimiter.contains('\n') {
            return Err(Error::invalid("delimiter must not contain a line break"));
        }
        if let Terminator::Custom(ref s) = self.terminator {
            if s.is_empty() {
                return Err(Error::invalid("custom terminator must not be empty"));
            }
            if s.contains(self.quote) {
                return Err(Error::invalid("terminator must not contain the quote character"));
            }
        }
        if self.quote == self.comment && self.allow_comments {
            return Err(Error::invalid("comment character must differ from the quote character"));
        }
        if self.whitespace.contains(&self.quote) {
            return Err(Error::invalid("whitespace set must not contain the quote character"));
        }
        if self.delimiter.chars().any(|c| self.whitespace.contains(&c)) {
            return Err(Error::invalid("whitespace set must not contain a delimiter character"));
        }
        if self.buffer_size == 0 || self.processed_buffer_size == 0 {
            return Err(Error::invalid("buffer sizes must be greater than zero"));
        }
        if self.injection_chars.is_empty() && self.injection != InjectionGuard::Off {
            return Err(Error::invalid("injection guard enabled with no injection characters"));
        }
        Ok(())
    }

    /// The first character of the delimiter.
    pub(crate) fn delimiter_first(&self) -> char {
        // Validation guarantees the delimiter is non-empty.
        self.delimiter.chars().next().unwrap_or(',')
    }

    pub(crate) fn is_whitespace(&self, c: char) -> bool {
        self.whitespace.contains(&c)
    }
}

/// An error produced by the parsing core.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The dialect failed validation. The message names the offending
    /// setting.
    InvalidDialect(String),
    /// A field exceeded `max_field_size`.
    FieldSize {
        /// The configured limit, in characters.
        limit: usize,
        /// The logical row on which the oversized field started.
        row: u64,
        /// The zero-based index of the oversized field.
        field: usize,
    },
}

impl Error {
    fn invalid(msg: &str) -> Error {
        Error::InvalidDialect(msg.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidDialect(ref msg) => {
                write!(f, "invalid dialect: {}", msg)
            }
            Error::FieldSize { limit, row, field } => {
                write!(
                    f,
                    "field {} on row {} is longer than the limit of {} characters",
                    field, row, limit
                )
            }
        }
    }
}

impl std::error::Error for Error {}
