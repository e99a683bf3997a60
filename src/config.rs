//! Callback hooks invoked by the reader.
//!
//! Every hook is optional. The defaults raise typed errors (bad data,
//! missing field) or propagate (read errors); installing a hook turns the
//! anomaly into a notification and lets the reader continue with its
//! best-effort recovery.

use std::fmt;

use delimit_core::Dialect;

use crate::error::{Error, Position};
use crate::record::Record;

/// The context handed to a bad-data hook.
///
/// The offending field and the raw row window are provided here directly;
/// they borrow from the parser's buffers and are only valid for the duration
/// of the call.
#[derive(Debug)]
pub struct BadDataContext<'a> {
    /// The raw, undecoded text of the offending field.
    pub field: &'a str,
    /// The verbatim row window, up to the point the row ended.
    pub raw_record: &'a str,
    /// Where the offending record is.
    pub position: Position,
}

/// The context handed to a missing-field hook.
#[derive(Debug)]
pub struct MissingFieldContext<'a> {
    /// The requested index, for lookups by index.
    pub index: Option<usize>,
    /// The requested name, for lookups by name.
    pub name: Option<&'a str>,
    /// Where the current record is.
    pub position: Position,
}

/// A notification that a field violated the quoting rules.
pub type BadDataHook = Box<dyn FnMut(&BadDataContext)>;
/// A notification that a requested field does not exist.
pub type MissingFieldHook = Box<dyn FnMut(&MissingFieldContext)>;
/// Decides whether a recoverable read error propagates (`true`) or is
/// swallowed and the offending row skipped (`false`).
pub type ReadErrorHook = Box<dyn FnMut(&Error) -> bool>;
/// Receives the schema names that failed header validation.
pub type HeaderValidatedHook = Box<dyn FnMut(&[String])>;
/// Decides whether a row is skipped before it is surfaced.
pub type SkipRecordHook = Box<dyn FnMut(&Record) -> bool>;
/// Normalizes a header name before it enters the name index.
pub type PrepareHeaderHook = Box<dyn FnMut(&str, usize) -> String>;
/// Names a column that has no header entry.
pub type DynamicColumnNameHook = Box<dyn FnMut(usize) -> String>;
/// Picks a delimiter from the first sample of input, replacing the built-in
/// detection.
pub type DelimiterDetectorHook = Box<dyn FnMut(&str, &Dialect) -> Option<String>>;

/// The reader's table of optional hooks.
#[derive(Default)]
pub(crate) struct Hooks {
    pub(crate) bad_data: Option<BadDataHook>,
    pub(crate) missing_field: Option<MissingFieldHook>,
    pub(crate) read_error: Option<ReadErrorHook>,
    pub(crate) header_validated: Option<HeaderValidatedHook>,
    pub(crate) skip_record: Option<SkipRecordHook>,
    pub(crate) prepare_header: Option<PrepareHeaderHook>,
    pub(crate) dynamic_column_name: Option<DynamicColumnNameHook>,
    pub(crate) delimiter_detector: Option<DelimiterDetectorHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("bad_data", &self.bad_data.is_some())
            .field("missing_field", &self.missing_field.is_some())
            .field("read_error", &self.read_error.is_some())
            .field("header_validated", &self.header_validated.is_some())
            .field("skip_record", &self.skip_record.is_some())
            .field("prepare_header", &self.prepare_header.is_some())
            .field("dynamic_column_name", &self.dynamic_column_name.is_some())
            .field("delimiter_detector", &self.delimiter_detector.is_some())
            .finish()
    }
}
