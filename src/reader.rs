use std::fs::File;
use std::io::{self, BufRead};
use std::mem;
use std::path::Path;
use std::rc::Rc;
use std::str;

use delimit_core::{
    Dialect, Encoding, Error as CoreError, Mode, Parser, ReadRowResult, Terminator, Trim,
};

use crate::cache::FieldCache;
use crate::config::{
    BadDataContext, BadDataHook, DelimiterDetectorHook, DynamicColumnNameHook,
    HeaderValidatedHook, Hooks, MissingFieldContext, MissingFieldHook, PrepareHeaderHook,
    ReadErrorHook, SkipRecordHook,
};
use crate::convert::FromField;
use crate::error::{Error, ErrorKind, Position, Result};
use crate::record::{HeaderIndex, Record};

/// Builds a CSV reader with various configuration knobs.
///
/// This builder can be used to tweak the dialect (delimiter, quote, escape,
/// terminator, mode), reading behavior (trimming, comments, blank lines,
/// column-count checking) and the callback hooks. Once a [`Reader`] is
/// built, its configuration cannot be changed.
///
/// Note that hooks are moved into the reader they are built into: building a
/// second reader from the same builder starts with an empty hook table.
///
/// # Example
///
/// ```
/// use delimit::ReaderBuilder;
///
/// let data = "city;pop\nProvo;117335\n";
/// let mut rdr = ReaderBuilder::new()
///     .delimiter(";")
///     .from_reader(data.as_bytes())
///     .unwrap();
/// rdr.read_header().unwrap();
/// assert!(rdr.read().unwrap());
/// assert_eq!(rdr.field_by_name("pop").unwrap(), "117335");
/// ```
#[derive(Debug)]
pub struct ReaderBuilder {
    dialect: Dialect,
    capacity: usize,
    has_header: bool,
    detect_column_count_changes: bool,
    raw_data_in_errors: bool,
    cache_fields: bool,
    hooks: Hooks,
}

impl Default for ReaderBuilder {
    fn default() -> ReaderBuilder {
        ReaderBuilder::new()
    }
}

impl ReaderBuilder {
    /// Create a new builder with the default configuration: RFC 4180, comma
    /// delimited, `"` as both quote and escape, any of `\r\n`, `\r` or `\n`
    /// accepted as a record terminator, no header row.
    pub fn new() -> ReaderBuilder {
        ReaderBuilder {
            dialect: Dialect::default(),
            capacity: 8 * (1 << 10),
            has_header: false,
            detect_column_count_changes: false,
            raw_data_in_errors: true,
            cache_fields: false,
            hooks: Hooks::default(),
        }
    }

    /// Build a reader from this configuration that reads the given file.
    pub fn from_path<P: AsRef<Path>>(&mut self, path: P) -> Result<Reader<File>> {
        self.from_reader(File::open(path)?)
    }

    /// Build a reader from this configuration that reads from `rdr`.
    ///
    /// The reader buffers internally, so `rdr` should not be wrapped in a
    /// `BufReader`.
    ///
    /// Fails when the configuration is inconsistent, for example a delimiter
    /// that contains the quote character.
    pub fn from_reader<R: io::Read>(&mut self, rdr: R) -> Result<Reader<R>> {
        Ok(Reader {
            rdr: io::BufReader::with_capacity(self.capacity, rdr),
            engine: Engine::new(self)?,
        })
    }

    /// The field delimiter. May be more than one character.
    ///
    /// The default is `,`.
    pub fn delimiter(&mut self, delimiter: &str) -> &mut ReaderBuilder {
        self.dialect.delimiter = delimiter.to_string();
        self
    }

    /// The quote character. The default is `"`.
    pub fn quote(&mut self, quote: char) -> &mut ReaderBuilder {
        self.dialect.quote = quote;
        self
    }

    /// The escape character.
    ///
    /// The default equals the quote character, which yields RFC 4180 `""`
    /// doubling. Setting it to something else (commonly `\`) makes
    /// `\"`-style escapes structural instead.
    pub fn escape(&mut self, escape: char) -> &mut ReaderBuilder {
        self.dialect.escape = escape;
        self
    }

    /// The record terminator.
    ///
    /// The default, [`Terminator::Auto`], treats any of `\r`, `\n` or
    /// `\r\n` as a single terminator.
    pub fn terminator(&mut self, terminator: Terminator) -> &mut ReaderBuilder {
        self.dialect.terminator = terminator;
        self
    }

    /// The parsing mode: RFC 4180 quoting, a bare escape character, or no
    /// escaping at all.
    pub fn mode(&mut self, mode: Mode) -> &mut ReaderBuilder {
        self.dialect.mode = mode;
        self
    }

    /// Treat lines whose first character is `comment` as comments and skip
    /// them. Implies nothing about `#` in field data.
    pub fn comment(&mut self, comment: char) -> &mut ReaderBuilder {
        self.dialect.comment = comment;
        self.dialect.allow_comments = true;
        self
    }

    /// Skip lines that consist solely of a record terminator. Enabled by
    /// default.
    pub fn ignore_blank_lines(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.ignore_blank_lines = yes;
        self
    }

    /// Whitespace trimming applied to fields while parsing.
    pub fn trim(&mut self, trim: Trim) -> &mut ReaderBuilder {
        self.dialect.trim = trim;
        self
    }

    /// The characters [`Trim`] removes. The default is a space.
    pub fn whitespace(&mut self, chars: &[char]) -> &mut ReaderBuilder {
        self.dialect.whitespace = chars.to_vec();
        self
    }

    /// Inspect the first buffer of input and pick the delimiter from the
    /// candidate set.
    pub fn detect_delimiter(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.detect_delimiter = yes;
        self
    }

    /// The candidate delimiters for detection, in preference order.
    ///
    /// The default is `,`, `;`, `|` and tab.
    pub fn detect_delimiter_candidates(&mut self, candidates: &[&str]) -> &mut ReaderBuilder {
        self.dialect.detect_candidates = candidates.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Upper bound on the character length of a single field. Exceeding it
    /// is a fatal error. Zero (the default) disables the check.
    pub fn max_field_size(&mut self, limit: usize) -> &mut ReaderBuilder {
        self.dialect.max_field_size = limit;
        self
    }

    /// Treat a line break inside a quoted field as bad data. The field is
    /// reported to the bad-data hook and the record ends at the break.
    pub fn quoted_line_break_is_bad_data(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.quoted_line_break_is_bad_data = yes;
        self
    }

    /// Track the encoded byte count of consumed input for diagnostics.
    pub fn count_bytes(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.count_bytes = yes;
        self
    }

    /// The encoding used for byte counting. The default is UTF-8.
    pub fn encoding(&mut self, encoding: Encoding) -> &mut ReaderBuilder {
        self.dialect.encoding = encoding;
        self
    }

    /// Initial capacity of the row buffer, in bytes.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut ReaderBuilder {
        self.dialect.buffer_size = capacity;
        self
    }

    /// Initial capacity of the decoded-field buffer, in bytes.
    pub fn field_buffer_capacity(&mut self, capacity: usize) -> &mut ReaderBuilder {
        self.dialect.processed_buffer_size = capacity;
        self
    }

    /// Whether the first record is a header. When enabled, the record
    /// iterators consume the header automatically.
    ///
    /// This is disabled by default; call [`Reader::read_header`] to capture
    /// a header explicitly.
    pub fn has_header(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.has_header = yes;
        self
    }

    /// Latch the column count of the first non-empty row and fail any later
    /// row with a different count.
    pub fn detect_column_count_changes(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.detect_column_count_changes = yes;
        self
    }

    /// Include the raw row window in error messages. Enabled by default;
    /// disable when field data must not leak into logs.
    pub fn raw_data_in_errors(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.raw_data_in_errors = yes;
        self
    }

    /// Intern decoded field strings, so owned lookups of repeated values
    /// share one allocation. See [`Reader::field_shared`].
    pub fn cache_fields(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.cache_fields = yes;
        self
    }

    /// Install a bad-data hook.
    ///
    /// Without one, a field that violates the quoting rules fails with
    /// [`ErrorKind::BadData`] on access. With one, the hook is notified once
    /// per offending field and the access returns the best-effort recovery.
    pub fn on_bad_data(&mut self, hook: impl FnMut(&BadDataContext) + 'static) -> &mut ReaderBuilder {
        self.hooks.bad_data = Some(Box::new(hook) as BadDataHook);
        self
    }

    /// Install a missing-field hook. Without one, out-of-range lookups fail
    /// with [`ErrorKind::MissingField`]; with one, they return an empty
    /// field after notifying the hook.
    pub fn on_missing_field(
        &mut self,
        hook: impl FnMut(&MissingFieldContext) + 'static,
    ) -> &mut ReaderBuilder {
        self.hooks.missing_field = Some(Box::new(hook) as MissingFieldHook);
        self
    }

    /// Install a read-error hook, consulted for recoverable structural
    /// errors (currently column-count changes). Return `true` to propagate
    /// the error, `false` to skip the offending row and continue.
    pub fn on_read_error(&mut self, hook: impl FnMut(&Error) -> bool + 'static) -> &mut ReaderBuilder {
        self.hooks.read_error = Some(Box::new(hook) as ReadErrorHook);
        self
    }

    /// Install a header-validation hook, invoked with the schema names that
    /// failed to resolve. Without one, [`Reader::validate_header`] fails
    /// with [`ErrorKind::HeaderValidation`].
    pub fn on_header_validated(
        &mut self,
        hook: impl FnMut(&[String]) + 'static,
    ) -> &mut ReaderBuilder {
        self.hooks.header_validated = Some(Box::new(hook) as HeaderValidatedHook);
        self
    }

    /// Install a record-skipping predicate, consulted for every parsed row
    /// before it is surfaced.
    pub fn should_skip_record(
        &mut self,
        hook: impl FnMut(&Record) -> bool + 'static,
    ) -> &mut ReaderBuilder {
        self.hooks.skip_record = Some(Box::new(hook) as SkipRecordHook);
        self
    }

    /// Install a header normalizer applied to each header name before it
    /// enters the name index. Lookups match against the normalized names.
    pub fn prepare_header(
        &mut self,
        hook: impl FnMut(&str, usize) -> String + 'static,
    ) -> &mut ReaderBuilder {
        self.hooks.prepare_header = Some(Box::new(hook) as PrepareHeaderHook);
        self
    }

    /// Install a fallback namer for columns beyond the header. The default
    /// is `Field{n}`, 1-based.
    pub fn dynamic_column_name(
        &mut self,
        hook: impl FnMut(usize) -> String + 'static,
    ) -> &mut ReaderBuilder {
        self.hooks.dynamic_column_name = Some(Box::new(hook) as DynamicColumnNameHook);
        self
    }

    /// Replace the built-in delimiter detection with a custom routine,
    /// handed the first sample of input and the current dialect.
    pub fn delimiter_detector(
        &mut self,
        hook: impl FnMut(&str, &Dialect) -> Option<String> + 'static,
    ) -> &mut ReaderBuilder {
        self.hooks.delimiter_detector = Some(Box::new(hook) as DelimiterDetectorHook);
        self
    }
}

/// What the engine wants the driver to do next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Step {
    /// A row is available.
    Row,
    /// Feed more input (or signal the end of it).
    NeedInput,
    /// All input has been consumed.
    End,
}

/// Everything about reading that is not I/O.
///
/// Both the blocking [`Reader`] and the asynchronous reader drive this same
/// engine; they differ only in how bytes reach [`Engine::feed`]. The engine
/// handles UTF-8 chunk boundaries, delimiter-detection hand-off, the
/// skip-record loop, the column-count latch and all field access.
#[derive(Debug)]
pub(crate) struct Engine {
    parser: Box<Parser>,
    hooks: Hooks,
    has_header: bool,
    header: Option<HeaderIndex>,
    detect_column_count_changes: bool,
    first_len: Option<usize>,
    raw_data_in_errors: bool,
    cache: Option<FieldCache>,
    /// Bytes of an incomplete UTF-8 sequence split across chunks.
    carry: Vec<u8>,
    first_chunk: bool,
    /// Per-row memo of which bad fields have been reported.
    bad_reported: Vec<bool>,
    done: bool,
}

impl Engine {
    pub(crate) fn new(builder: &mut ReaderBuilder) -> Result<Engine> {
        let hooks = mem::take(&mut builder.hooks);
        let mut dialect = builder.dialect.clone();
        if hooks.delimiter_detector.is_some() {
            // The hook replaces the built-in detection entirely.
            dialect.detect_delimiter = false;
        }
        let parser = Parser::new(dialect).map_err(core_config_error)?;
        Ok(Engine {
            parser: Box::new(parser),
            hooks,
            has_header: builder.has_header,
            header: None,
            detect_column_count_changes: builder.detect_column_count_changes,
            first_len: None,
            raw_data_in_errors: builder.raw_data_in_errors,
            cache: if builder.cache_fields { Some(FieldCache::new()) } else { None },
            carry: Vec::new(),
            first_chunk: true,
            bad_reported: Vec::new(),
            done: false,
        })
    }

    /// Feed a chunk of raw bytes, decoding UTF-8 across chunk boundaries.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        let mut rest = bytes;
        while !self.carry.is_empty() && !rest.is_empty() {
            self.carry.push(rest[0]);
            rest = &rest[1..];
            let complete = match str::from_utf8(&self.carry) {
                Ok(_) => true,
                Err(err) => {
                    if err.error_len().is_some() || self.carry.len() >= 4 {
                        return Err(self.utf8_error());
                    }
                    false
                }
            };
            if complete {
                let completed = mem::take(&mut self.carry);
                // Validated just above.
                if let Ok(s) = str::from_utf8(&completed) {
                    self.fill_parser(s)?;
                }
            }
        }
        if rest.is_empty() {
            return Ok(());
        }
        match str::from_utf8(rest) {
            Ok(s) => self.fill_parser(s),
            Err(err) => {
                let valid = err.valid_up_to();
                if valid > 0 {
                    // SAFETY: `valid_up_to` guarantees the prefix is UTF-8.
                    let prefix = unsafe { str::from_utf8_unchecked(&rest[..valid]) };
                    self.fill_parser(prefix)?;
                }
                match err.error_len() {
                    Some(_) => Err(self.utf8_error()),
                    None => {
                        // An incomplete trailing sequence; finish it with
                        // the next chunk.
                        self.carry.extend_from_slice(&rest[valid..]);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Signal the end of input.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if !self.carry.is_empty() {
            return Err(self.utf8_error());
        }
        self.parser.finish();
        Ok(())
    }

    fn fill_parser(&mut self, s: &str) -> Result<()> {
        if self.first_chunk {
            self.first_chunk = false;
            if let Some(hook) = self.hooks.delimiter_detector.as_mut() {
                if let Some(delim) = hook(s, self.parser.dialect()) {
                    self.parser.set_delimiter(&delim).map_err(core_config_error)?;
                }
            }
        }
        self.parser.fill(s).map_err(core_config_error)
    }

    /// Advance to the next surfaced row, running the skip loop and the
    /// column-count check.
    pub(crate) fn step(&mut self) -> Result<Step> {
        loop {
            match self.parser.read_row() {
                Err(err) => return Err(self.core_error(err)),
                Ok(ReadRowResult::InputNeeded) => return Ok(Step::NeedInput),
                Ok(ReadRowResult::End) => {
                    self.done = true;
                    return Ok(Step::End);
                }
                Ok(ReadRowResult::Row) => {
                    self.bad_reported.clear();
                    self.bad_reported.resize(self.parser.len(), false);
                    if self.hooks.skip_record.is_some() && self.skip_current()? {
                        continue;
                    }
                    if self.detect_column_count_changes {
                        match self.check_column_count() {
                            Ok(()) => {}
                            Err(err) => {
                                let propagate = match self.hooks.read_error.as_mut() {
                                    Some(hook) => hook(&err),
                                    None => true,
                                };
                                if propagate {
                                    return Err(err);
                                }
                                continue;
                            }
                        }
                    }
                    return Ok(Step::Row);
                }
            }
        }
    }

    fn skip_current(&mut self) -> Result<bool> {
        let mut row = Record::new();
        for i in 0..self.parser.len() {
            row.push_field(self.parser.field(i).unwrap_or(""));
        }
        row.set_position(self.position());
        match self.hooks.skip_record.as_mut() {
            Some(hook) => Ok(hook(&row)),
            None => Ok(false),
        }
    }

    fn check_column_count(&mut self) -> Result<()> {
        let len = self.parser.len();
        let first_len = self.first_len;
        match first_len {
            None => {
                let empty = len == 1 && self.parser.field(0) == Some("");
                if len > 0 && !empty {
                    self.first_len = Some(len);
                }
                Ok(())
            }
            Some(expected) if expected != len => Err(Error::new(ErrorKind::UnequalLengths {
                pos: Some(self.position()),
                expected_len: expected as u64,
                len: len as u64,
            })),
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn position(&self) -> Position {
        Position::at(
            self.parser.row(),
            self.parser.raw_row(),
            self.parser.char_count(),
            self.parser.byte_count(),
        )
    }

    pub(crate) fn len(&self) -> usize {
        self.parser.len()
    }

    pub(crate) fn raw_record(&self) -> &str {
        self.parser.raw_record()
    }

    /// Report a bad span to the hook, or fail when no hook is installed.
    /// Each span is reported at most once.
    fn handle_bad_data(&mut self, i: usize) -> Result<()> {
        if !self.parser.field_is_bad(i) {
            return Ok(());
        }
        if self.bad_reported.get(i).copied().unwrap_or(true) {
            return Ok(());
        }
        self.bad_reported[i] = true;
        let position = self.position();
        match self.hooks.bad_data.as_mut() {
            Some(hook) => {
                let ctx = BadDataContext {
                    field: self.parser.raw_field(i).unwrap_or(""),
                    raw_record: self.parser.raw_record(),
                    position,
                };
                hook(&ctx);
                Ok(())
            }
            None => Err(Error::new(ErrorKind::BadData {
                pos: position,
                field: self.parser.raw_field(i).unwrap_or("").to_string(),
                raw_record: if self.raw_data_in_errors {
                    Some(self.parser.raw_record().to_string())
                } else {
                    None
                },
            })),
        }
    }

    fn missing_field(&mut self, index: Option<usize>, name: Option<&str>) -> Result<&'static str> {
        let position = self.position();
        match self.hooks.missing_field.as_mut() {
            Some(hook) => {
                let ctx = MissingFieldContext { index, name, position };
                hook(&ctx);
                Ok("")
            }
            None => Err(Error::new(ErrorKind::MissingField {
                pos: position,
                index,
                name: name.map(str::to_string),
            })),
        }
    }

    pub(crate) fn field(&mut self, i: usize) -> Result<&str> {
        if i >= self.parser.len() {
            return self.missing_field(Some(i), None).map(|s| s as &str);
        }
        self.handle_bad_data(i)?;
        Ok(self.parser.field(i).unwrap_or(""))
    }

    pub(crate) fn try_field(&mut self, i: usize) -> Option<&str> {
        if i >= self.parser.len() {
            return None;
        }
        // The non-throwing path still notifies the hook, but swallows the
        // default error.
        let _ = self.handle_bad_data(i);
        self.parser.field(i)
    }

    pub(crate) fn field_by_name(&mut self, name: &str, nth: usize) -> Result<&str> {
        let header = match self.header.as_mut() {
            Some(header) => header,
            None => {
                return Err(Error::config(
                    "field lookup by name requires read_header to be called first",
                ))
            }
        };
        match header.resolve(name, nth) {
            Some(i) => self.field(i),
            None => self.missing_field(None, Some(name)).map(|s| s as &str),
        }
    }

    pub(crate) fn try_field_by_name(&mut self, name: &str, nth: usize) -> Option<&str> {
        let i = self.header.as_mut()?.resolve(name, nth)?;
        self.try_field(i)
    }

    pub(crate) fn field_as<T: FromField>(&mut self, i: usize) -> Result<T> {
        let position = self.position();
        let field = self.field(i)?;
        match T::from_field(field) {
            Ok(value) => Ok(value),
            Err(message) => Err(Error::new(ErrorKind::Convert {
                pos: position,
                index: i,
                message,
            })),
        }
    }

    pub(crate) fn field_shared(&mut self, i: usize) -> Result<Rc<str>> {
        if i >= self.parser.len() {
            return self.missing_field(Some(i), None).map(Rc::from);
        }
        self.handle_bad_data(i)?;
        let text = self.parser.field(i).unwrap_or("");
        match self.cache.as_mut() {
            Some(cache) => Ok(cache.intern(text)),
            None => Ok(Rc::from(text)),
        }
    }

    pub(crate) fn record(&mut self) -> Result<Record> {
        let pos = self.position();
        let mut record = Record::new();
        for i in 0..self.parser.len() {
            let field = self.field(i)?;
            record.push_field(field);
        }
        record.set_position(pos);
        Ok(record)
    }

    pub(crate) fn build_header(&mut self) -> Result<()> {
        let mut header = HeaderIndex::default();
        for i in 0..self.parser.len() {
            let original = self.parser.field(i).unwrap_or("").to_string();
            let prepared = match self.hooks.prepare_header.as_mut() {
                Some(hook) => hook(&original, i),
                None => original.clone(),
            };
            header.push(original, prepared);
        }
        self.header = Some(header);
        Ok(())
    }

    pub(crate) fn has_header_record(&self) -> bool {
        self.has_header
    }

    pub(crate) fn header_read(&self) -> bool {
        self.header.is_some()
    }

    pub(crate) fn headers(&self) -> Option<&[String]> {
        self.header.as_ref().map(|h| h.names())
    }

    pub(crate) fn validate_header(&mut self, schema: &[&str]) -> Result<()> {
        let header = match self.header.as_ref() {
            Some(header) => header,
            None => {
                return Err(Error::config(
                    "header validation requires read_header to be called first",
                ))
            }
        };
        let missing: Vec<String> = schema
            .iter()
            .filter(|name| !header.contains(name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        match self.hooks.header_validated.as_mut() {
            Some(hook) => {
                hook(&missing);
                Ok(())
            }
            None => Err(Error::new(ErrorKind::HeaderValidation { missing })),
        }
    }

    pub(crate) fn dynamic_column_name(&mut self, i: usize) -> String {
        if let Some(name) = self.headers().and_then(|names| names.get(i)) {
            return name.clone();
        }
        match self.hooks.dynamic_column_name.as_mut() {
            Some(hook) => hook(i),
            None => format!("Field{}", i + 1),
        }
    }

    fn core_error(&self, err: CoreError) -> Error {
        match err {
            CoreError::FieldSize { limit, .. } => Error::new(ErrorKind::FieldSize {
                pos: self.position(),
                limit,
            }),
            other => core_config_error(other),
        }
    }

    fn utf8_error(&self) -> Error {
        Error::new(ErrorKind::Utf8 { pos: self.position() })
    }
}

fn core_config_error(err: CoreError) -> Error {
    Error::config(err.to_string())
}

/// An already configured CSV reader over any `io::Read`.
///
/// A `Reader` is a single-pass row cursor: [`Reader::read`] advances to the
/// next row, after which fields are available by index or header name until
/// the next call. The [`Reader::records`] iterator wraps the same cursor
/// and yields owned [`Record`]s.
///
/// # Example
///
/// ```
/// use delimit::Reader;
///
/// let data = "\
/// city,country,pop
/// Boston,United States,4628910
/// Concord,United States,42695
/// ";
/// let mut rdr = Reader::from_reader(data.as_bytes()).unwrap();
/// rdr.read_header().unwrap();
/// let mut cities = Vec::new();
/// while rdr.read().unwrap() {
///     cities.push(rdr.field_by_name("city").unwrap().to_string());
/// }
/// assert_eq!(cities, vec!["Boston", "Concord"]);
/// ```
#[derive(Debug)]
pub struct Reader<R> {
    rdr: io::BufReader<R>,
    engine: Engine,
}

impl Reader<File> {
    /// Create a reader with the default configuration for the given file
    /// path.
    ///
    /// To customize, use a [`ReaderBuilder`].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Reader<File>> {
        ReaderBuilder::new().from_path(path)
    }
}

impl<R: io::Read> Reader<R> {
    /// Create a reader with the default configuration.
    ///
    /// To customize, use a [`ReaderBuilder`].
    pub fn from_reader(rdr: R) -> Result<Reader<R>> {
        ReaderBuilder::new().from_reader(rdr)
    }

    /// Advance to the next row.
    ///
    /// Returns `false` once the input is exhausted. After a successful
    /// read, the row's fields are available through the accessors below and
    /// remain valid until the next call.
    pub fn read(&mut self) -> Result<bool> {
        loop {
            match self.engine.step()? {
                Step::Row => return Ok(true),
                Step::End => return Ok(false),
                Step::NeedInput => {
                    let consumed = {
                        let buf = self.rdr.fill_buf()?;
                        if buf.is_empty() {
                            self.engine.finish()?;
                            0
                        } else {
                            self.engine.feed(buf)?;
                            buf.len()
                        }
                    };
                    self.rdr.consume(consumed);
                }
            }
        }
    }

    /// Read the next row and capture it as the header record.
    ///
    /// Header names pass through the `prepare_header` hook before entering
    /// the name index; duplicated names resolve by occurrence with
    /// [`Reader::field_by_name_nth`]. Returns `false` when the input is
    /// empty.
    pub fn read_header(&mut self) -> Result<bool> {
        if !self.read()? {
            return Ok(false);
        }
        self.engine.build_header()?;
        Ok(true)
    }

    /// The captured header names, in column order, if a header has been
    /// read.
    pub fn headers(&self) -> Option<&[String]> {
        self.engine.headers()
    }

    /// Check that every name in `schema` resolves against the captured
    /// header.
    ///
    /// Missing names go to the `header_validated` hook when one is
    /// installed, and otherwise fail with [`ErrorKind::HeaderValidation`].
    pub fn validate_header(&mut self, schema: &[&str]) -> Result<()> {
        self.engine.validate_header(schema)
    }

    /// The number of fields in the current row.
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    /// True when the current row has no fields.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The decoded text of field `i` of the current row.
    ///
    /// Out-of-range indexes go through the missing-field hook; fields that
    /// violate the quoting rules go through the bad-data hook. Without
    /// hooks, both fail with typed errors.
    pub fn field(&mut self, i: usize) -> Result<&str> {
        self.engine.field(i)
    }

    /// The decoded text of field `i`, or `None` when out of range. Never
    /// fails: bad data yields the best-effort recovery.
    pub fn try_field(&mut self, i: usize) -> Option<&str> {
        self.engine.try_field(i)
    }

    /// The decoded text of the field under the header `name`.
    ///
    /// The name must match a header name after normalization by the
    /// `prepare_header` hook.
    pub fn field_by_name(&mut self, name: &str) -> Result<&str> {
        self.engine.field_by_name(name, 0)
    }

    /// Like [`Reader::field_by_name`], resolving the `nth` occurrence of a
    /// duplicated header name.
    pub fn field_by_name_nth(&mut self, name: &str, nth: usize) -> Result<&str> {
        self.engine.field_by_name(name, nth)
    }

    /// Non-throwing variant of [`Reader::field_by_name`].
    pub fn try_field_by_name(&mut self, name: &str) -> Option<&str> {
        self.engine.try_field_by_name(name, 0)
    }

    /// Parse field `i` as `T`.
    pub fn field_as<T: FromField>(&mut self, i: usize) -> Result<T> {
        self.engine.field_as(i)
    }

    /// Parse the field under the header `name` as `T`.
    pub fn field_by_name_as<T: FromField>(&mut self, name: &str) -> Result<T> {
        if let Some(i) = self.engine.try_field_index(name) {
            return self.engine.field_as(i);
        }
        // Unresolved name: route through the missing-field machinery, then
        // convert whatever it recovered.
        let pos = self.engine.position();
        let recovered = self.engine.field_by_name(name, 0)?.to_string();
        T::from_field(&recovered).map_err(|message| {
            Error::new(ErrorKind::Convert { pos, index: 0, message })
        })
    }

    /// A shared handle to field `i`, deduplicated through the field cache
    /// when `cache_fields` is enabled.
    pub fn field_shared(&mut self, i: usize) -> Result<Rc<str>> {
        self.engine.field_shared(i)
    }

    /// The verbatim text of the current row, excluding its terminator.
    pub fn raw_record(&self) -> &str {
        self.engine.raw_record()
    }

    /// Materialize the current row as an owned [`Record`].
    pub fn record(&mut self) -> Result<Record> {
        self.engine.record()
    }

    /// The position of the current record.
    pub fn position(&self) -> Position {
        self.engine.position()
    }

    /// True once the input has been exhausted.
    pub fn is_done(&self) -> bool {
        self.engine.is_done()
    }

    /// The name of column `i`: its header name when one exists, otherwise
    /// the `dynamic_column_name` hook or `Field{n}`.
    pub fn column_name(&mut self, i: usize) -> String {
        self.engine.dynamic_column_name(i)
    }

    /// A borrowed iterator over the remaining rows as owned [`Record`]s.
    ///
    /// When `has_header` is enabled and no header has been read yet, the
    /// first row is consumed as the header. The iterator is single-pass;
    /// restart by constructing a new reader.
    pub fn records(&mut self) -> Records<R> {
        Records { rdr: self }
    }

    /// An owned iterator over the remaining rows as owned [`Record`]s.
    pub fn into_records(self) -> IntoRecords<R> {
        IntoRecords { rdr: self }
    }

    fn next_record(&mut self) -> Option<Result<Record>> {
        if self.engine.has_header_record() && !self.engine.header_read() {
            match self.read_header() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
        match self.read() {
            Ok(true) => Some(self.record()),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Engine {
    /// The column index `name` resolves to, without touching the row.
    pub(crate) fn try_field_index(&mut self, name: &str) -> Option<usize> {
        self.header.as_mut()?.resolve(name, 0)
    }
}

/// A borrowed iterator over rows as owned [`Record`]s.
pub struct Records<'r, R: 'r> {
    rdr: &'r mut Reader<R>,
}

impl<'r, R: io::Read> Iterator for Records<'r, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        self.rdr.next_record()
    }
}

/// An owned iterator over rows as owned [`Record`]s.
pub struct IntoRecords<R> {
    rdr: Reader<R>,
}

impl<R: io::Read> Iterator for IntoRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        self.rdr.next_record()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn rdr(data: &str) -> Reader<&[u8]> {
        Reader::from_reader(data.as_bytes()).unwrap()
    }

    #[test]
    fn cursor_and_indexing() {
        let mut rdr = rdr("a,b,c\r\n1,2,3\n");
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.len(), 3);
        assert_eq!(rdr.field(0).unwrap(), "a");
        assert_eq!(rdr.field(2).unwrap(), "c");
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field(1).unwrap(), "2");
        assert!(!rdr.read().unwrap());
        assert!(rdr.is_done());
    }

    #[test]
    fn missing_field_errors_by_default() {
        let mut rdr = rdr("a,b\n");
        assert!(rdr.read().unwrap());
        let err = rdr.field(5).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingField { index: Some(5), .. }));
        assert_eq!(rdr.try_field(5), None);
    }

    #[test]
    fn missing_field_hook_recovers() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let mut rdr = ReaderBuilder::new()
            .on_missing_field(move |ctx| log.borrow_mut().push(ctx.index))
            .from_reader("a,b\n".as_bytes())
            .unwrap();
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field(9).unwrap(), "");
        assert_eq!(seen.borrow().as_slice(), &[Some(9)]);
    }

    #[test]
    fn header_lookup() {
        let mut rdr = rdr("id,name,id\n1,alpha,2\n");
        assert!(rdr.read_header().unwrap());
        assert_eq!(
            rdr.headers().unwrap(),
            &["id".to_string(), "name".to_string(), "id".to_string()]
        );
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field_by_name("name").unwrap(), "alpha");
        assert_eq!(rdr.field_by_name("id").unwrap(), "1");
        assert_eq!(rdr.field_by_name_nth("id", 1).unwrap(), "2");
        assert!(rdr.field_by_name("missing").is_err());
        assert_eq!(rdr.try_field_by_name("missing"), None);
    }

    #[test]
    fn prepare_header_normalizes_matching() {
        let mut rdr = ReaderBuilder::new()
            .prepare_header(|name, _| name.trim().to_lowercase())
            .from_reader(" Name ,AGE\nalice,9\n".as_bytes())
            .unwrap();
        assert!(rdr.read_header().unwrap());
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field_by_name("name").unwrap(), "alice");
        assert_eq!(rdr.field_by_name_as::<u32>("age").unwrap(), 9);
    }

    #[test]
    fn validate_header_reports_missing() {
        let mut rdr = rdr("a,b\n1,2\n");
        rdr.read_header().unwrap();
        assert!(rdr.validate_header(&["a", "b"]).is_ok());
        let err = rdr.validate_header(&["a", "z"]).unwrap_err();
        match err.into_kind() {
            ErrorKind::HeaderValidation { missing } => {
                assert_eq!(missing, vec!["z".to_string()]);
            }
            other => panic!("expected HeaderValidation, got {:?}", other),
        }
    }

    #[test]
    fn bad_data_errors_by_default() {
        let mut rdr = rdr("a\"b,c\n");
        assert!(rdr.read().unwrap());
        let err = rdr.field(0).unwrap_err();
        match err.into_kind() {
            ErrorKind::BadData { field, raw_record, .. } => {
                assert_eq!(field, "a\"b");
                assert_eq!(raw_record.as_deref(), Some("a\"b,c"));
            }
            other => panic!("expected BadData, got {:?}", other),
        }
        // The second field is unaffected.
        assert_eq!(rdr.field(1).unwrap(), "c");
    }

    #[test]
    fn bad_data_hook_fires_once_and_recovers() {
        let count = Rc::new(RefCell::new(0));
        let hits = Rc::clone(&count);
        let mut rdr = ReaderBuilder::new()
            .on_bad_data(move |ctx| {
                assert_eq!(ctx.field, "a\"b");
                *hits.borrow_mut() += 1;
            })
            .from_reader("a\"b,c\n".as_bytes())
            .unwrap();
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field(0).unwrap(), "a\"b");
        assert_eq!(rdr.field(0).unwrap(), "a\"b");
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn raw_data_in_errors_can_be_disabled() {
        let mut rdr = ReaderBuilder::new()
            .raw_data_in_errors(false)
            .from_reader("secret\"x\n".as_bytes())
            .unwrap();
        assert!(rdr.read().unwrap());
        let err = rdr.field(0).unwrap_err();
        match err.into_kind() {
            ErrorKind::BadData { raw_record, .. } => assert!(raw_record.is_none()),
            other => panic!("expected BadData, got {:?}", other),
        }
    }

    #[test]
    fn column_count_latch() {
        let mut rdr = ReaderBuilder::new()
            .detect_column_count_changes(true)
            .from_reader("a,b,c\n1,2\n".as_bytes())
            .unwrap();
        assert!(rdr.read().unwrap());
        let err = rdr.read().unwrap_err();
        match err.into_kind() {
            ErrorKind::UnequalLengths { expected_len, len, .. } => {
                assert_eq!(expected_len, 3);
                assert_eq!(len, 2);
            }
            other => panic!("expected UnequalLengths, got {:?}", other),
        }
    }

    #[test]
    fn read_error_hook_skips_bad_rows() {
        let mut rdr = ReaderBuilder::new()
            .detect_column_count_changes(true)
            .on_read_error(|_| false)
            .from_reader("a,b,c\n1,2\nx,y,z\n".as_bytes())
            .unwrap();
        assert!(rdr.read().unwrap());
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field(0).unwrap(), "x");
        assert!(!rdr.read().unwrap());
    }

    #[test]
    fn skip_record_hook() {
        let mut rdr = ReaderBuilder::new()
            .should_skip_record(|row| row.get(0) == Some("skip"))
            .from_reader("keep,1\nskip,2\nkeep,3\n".as_bytes())
            .unwrap();
        let rows: Vec<Record> = rdr.records().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(1), Some("1"));
        assert_eq!(rows[1].get(1), Some("3"));
    }

    #[test]
    fn records_iterator_consumes_header() {
        let mut rdr = ReaderBuilder::new()
            .has_header(true)
            .from_reader("h1,h2\na,b\nc,d\n".as_bytes())
            .unwrap();
        let rows: Vec<Record> = rdr.records().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["a", "b"]);
        assert_eq!(rows[1], vec!["c", "d"]);
    }

    #[test]
    fn typed_access() {
        let mut rdr = rdr("42,2.5,true,\n");
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field_as::<i64>(0).unwrap(), 42);
        assert_eq!(rdr.field_as::<f64>(1).unwrap(), 2.5);
        assert!(rdr.field_as::<bool>(2).unwrap());
        assert_eq!(rdr.field_as::<Option<i32>>(3).unwrap(), None);
        assert!(rdr.field_as::<i64>(1).is_err());
    }

    #[test]
    fn shared_fields_dedup_with_cache() {
        let mut rdr = ReaderBuilder::new()
            .cache_fields(true)
            .from_reader("active\nactive\n".as_bytes())
            .unwrap();
        assert!(rdr.read().unwrap());
        let first = rdr.field_shared(0).unwrap();
        assert!(rdr.read().unwrap());
        let second = rdr.field_shared(0).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn position_counters() {
        let mut rdr = rdr("a,b\n\"x\ny\",z\n");
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.position().record(), 1);
        assert_eq!(rdr.position().line(), 1);
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.position().record(), 2);
        assert_eq!(rdr.position().line(), 3);
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut rdr = Reader::from_reader(&b"a,b\xFFc\n"[..]).unwrap();
        let err = rdr.read().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Utf8 { .. }));
    }

    #[test]
    fn multibyte_across_tiny_chunks() {
        // A reader that yields one byte at a time forces the carry path.
        struct OneByte<'a>(&'a [u8]);
        impl io::Read for OneByte<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[0];
                self.0 = &self.0[1..];
                Ok(1)
            }
        }
        let data = "é,ü\nπ,ß\n".as_bytes();
        let mut rdr = Reader::from_reader(OneByte(data)).unwrap();
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field(0).unwrap(), "é");
        assert_eq!(rdr.field(1).unwrap(), "ü");
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.field(0).unwrap(), "π");
        assert!(!rdr.read().unwrap());
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let err = ReaderBuilder::new()
            .delimiter("\"")
            .from_reader("a".as_bytes())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config(_)));
    }

    #[test]
    fn delimiter_detector_hook_overrides_builtin() {
        let mut rdr = ReaderBuilder::new()
            .delimiter_detector(|sample, _| {
                assert!(sample.contains(';'));
                Some(";".to_string())
            })
            .from_reader("a;b\nc;d\n".as_bytes())
            .unwrap();
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.len(), 2);
        assert_eq!(rdr.field(1).unwrap(), "b");
    }

    #[test]
    fn column_name_fallbacks() {
        let mut rdr = ReaderBuilder::new()
            .dynamic_column_name(|i| format!("col_{}", i))
            .from_reader("h\nv,extra\n".as_bytes())
            .unwrap();
        rdr.read_header().unwrap();
        assert!(rdr.read().unwrap());
        assert_eq!(rdr.column_name(0), "h");
        assert_eq!(rdr.column_name(1), "col_1");
    }
}
