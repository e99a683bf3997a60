use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::result;

/// A type alias for `Result<T, delimit::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur when reading or writing delimited data.
///
/// The error kind is boxed to keep `Result<T>` small on the happy path.
#[derive(Debug)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error(Box::new(kind))
    }

    /// Return the specific type of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Unwrap this error into its underlying type.
    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns true if and only if this is an I/O error.
    ///
    /// If this is true, the underlying `ErrorKind` is guaranteed to be
    /// `ErrorKind::Io`.
    pub fn is_io_error(&self) -> bool {
        matches!(*self.0, ErrorKind::Io(_))
    }

    /// The position at which this error occurred, if known.
    pub fn position(&self) -> Option<&Position> {
        match *self.0 {
            ErrorKind::Utf8 { ref pos } => Some(pos),
            ErrorKind::UnequalLengths { pos: Some(ref pos), .. } => Some(pos),
            ErrorKind::FieldSize { ref pos, .. } => Some(pos),
            ErrorKind::BadData { ref pos, .. } => Some(pos),
            ErrorKind::MissingField { ref pos, .. } => Some(pos),
            ErrorKind::Convert { ref pos, .. } => Some(pos),
            _ => None,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Error {
        Error::new(ErrorKind::Config(msg.into()))
    }
}

/// The specific type of an error.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An I/O error that occurred while reading or writing delimited data.
    Io(io::Error),
    /// The input was not valid UTF-8.
    Utf8 {
        /// The position at which decoding failed.
        pos: Position,
    },
    /// The configuration failed validation, either at construction or after
    /// delimiter detection replaced the delimiter.
    Config(String),
    /// Two records with an unequal number of fields were found while
    /// column-count checking was enabled.
    UnequalLengths {
        /// The position of the offending record, if available (reads only).
        pos: Option<Position>,
        /// The number of fields in the first record.
        expected_len: u64,
        /// The number of fields in the offending record.
        len: u64,
    },
    /// A field exceeded the configured `max_field_size`.
    FieldSize {
        /// The position of the record containing the oversized field.
        pos: Position,
        /// The configured limit, in characters.
        limit: usize,
    },
    /// A field violated the dialect's quoting rules and no bad-data hook was
    /// installed to recover.
    BadData {
        /// The position of the offending record.
        pos: Position,
        /// The raw text of the offending field.
        field: String,
        /// The raw row window, when `raw_data_in_errors` permits.
        raw_record: Option<String>,
    },
    /// A requested field index was out of range, or a header name did not
    /// resolve.
    MissingField {
        /// The position of the current record.
        pos: Position,
        /// The requested index, when the lookup was by index.
        index: Option<usize>,
        /// The requested name, when the lookup was by name.
        name: Option<String>,
    },
    /// Header validation found names missing from the header record.
    HeaderValidation {
        /// The schema names that did not resolve.
        missing: Vec<String>,
    },
    /// A typed field accessor failed to convert the field text.
    Convert {
        /// The position of the current record.
        pos: Position,
        /// The index of the field being converted.
        index: usize,
        /// What went wrong.
        message: String,
    },
    /// A field written with `InjectionGuard::Error` began with a formula
    /// injection character.
    Injection {
        /// The offending field.
        field: String,
    },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::new(ErrorKind::Io(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self.0 {
            ErrorKind::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.0 {
            ErrorKind::Io(ref err) => err.fmt(f),
            ErrorKind::Utf8 { ref pos } => {
                write!(f, "CSV parse error: {}: invalid UTF-8 in input", pos)
            }
            ErrorKind::Config(ref msg) => {
                write!(f, "CSV configuration error: {}", msg)
            }
            ErrorKind::UnequalLengths { pos: None, expected_len, len } => {
                write!(
                    f,
                    "CSV error: found record with {} fields, but the \
                     previous record has {} fields",
                    len, expected_len
                )
            }
            ErrorKind::UnequalLengths { pos: Some(ref pos), expected_len, len } => {
                write!(
                    f,
                    "CSV error: {}: found record with {} fields, but the \
                     previous record has {} fields",
                    pos, len, expected_len
                )
            }
            ErrorKind::FieldSize { ref pos, limit } => {
                write!(
                    f,
                    "CSV error: {}: field exceeds the limit of {} characters",
                    pos, limit
                )
            }
            ErrorKind::BadData { ref pos, ref field, ref raw_record } => {
                write!(f, "CSV error: {}: bad data in field {:?}", pos, field)?;
                if let Some(raw) = raw_record {
                    write!(f, " (raw record: {:?})", raw)?;
                }
                Ok(())
            }
            ErrorKind::MissingField { ref pos, index, ref name } => match (index, name) {
                (_, Some(name)) => {
                    write!(f, "CSV error: {}: no field named {:?}", pos, name)
                }
                (Some(index), None) => {
                    write!(f, "CSV error: {}: no field at index {}", pos, index)
                }
                (None, None) => write!(f, "CSV error: {}: missing field", pos),
            },
            ErrorKind::HeaderValidation { ref missing } => {
                write!(f, "CSV error: header is missing {:?}", missing)
            }
            ErrorKind::Convert { ref pos, index, ref message } => {
                write!(
                    f,
                    "CSV error: {}: cannot convert field {}: {}",
                    pos, index, message
                )
            }
            ErrorKind::Injection { ref field } => {
                write!(
                    f,
                    "CSV write error: field {:?} begins with a formula \
                     injection character",
                    field
                )
            }
        }
    }
}

/// The position of a record in delimited input.
///
/// `record` counts logical rows (blank and comment lines excluded when
/// skipping is enabled); `line` counts physical lines, including lines
/// inside quoted fields, so `line >= record` always holds.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Position {
    record: u64,
    line: u64,
    char_index: u64,
    byte: Option<u64>,
}

impl Position {
    /// Create a position at the start of input.
    pub fn new() -> Position {
        Position::default()
    }

    pub(crate) fn at(record: u64, line: u64, char_index: u64, byte: Option<u64>) -> Position {
        Position { record, line, char_index, byte }
    }

    /// The logical record number, starting at 1.
    pub fn record(&self) -> u64 {
        self.record
    }

    /// The physical line number, starting at 1.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The number of characters consumed up to this position.
    pub fn char_index(&self) -> u64 {
        self.char_index
    }

    /// The number of encoded bytes consumed up to this position, when byte
    /// counting is enabled.
    pub fn byte(&self) -> Option<u64> {
        self.byte
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "record {} (line {})", self.record, self.line)?;
        if let Some(byte) = self.byte {
            write!(f, " (byte {})", byte)?;
        }
        Ok(())
    }
}

/// `IntoInnerError` occurs when consuming a [`crate::Writer`] fails.
///
/// Consuming the writer causes a flush to happen. If the flush fails, then
/// this error is returned, which contains both the original writer and the
/// error that occurred.
pub struct IntoInnerError<W> {
    wtr: W,
    err: io::Error,
}

impl<W> IntoInnerError<W> {
    pub(crate) fn new(wtr: W, err: io::Error) -> IntoInnerError<W> {
        IntoInnerError { wtr, err }
    }

    /// Returns the error which caused the flush to fail.
    pub fn error(&self) -> &io::Error {
        &self.err
    }

    /// Returns the unconsumed writer, which can be used for error recovery.
    pub fn into_inner(self) -> W {
        self.wtr
    }
}

impl<W: std::any::Any> StdError for IntoInnerError<W> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.err.source()
    }
}

impl<W> fmt::Display for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl<W> fmt::Debug for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.err.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let err = Error::new(ErrorKind::FieldSize {
            pos: Position::at(3, 7, 120, None),
            limit: 64,
        });
        let msg = err.to_string();
        assert!(msg.contains("record 3"), "{}", msg);
        assert!(msg.contains("line 7"), "{}", msg);
        assert!(msg.contains("64"), "{}", msg);
    }

    #[test]
    fn bad_data_display_gates_raw_record() {
        let gated = Error::new(ErrorKind::BadData {
            pos: Position::at(1, 1, 4, None),
            field: "\"b".to_string(),
            raw_record: None,
        });
        assert!(!gated.to_string().contains("raw record"));

        let open = Error::new(ErrorKind::BadData {
            pos: Position::at(1, 1, 4, None),
            field: "\"b".to_string(),
            raw_record: Some("a,\"b".to_string()),
        });
        assert!(open.to_string().contains("raw record"));
    }

    #[test]
    fn io_round_trip() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(err.is_io_error());
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::Other);
    }
}
