use std::fmt;
use std::fs::File;
use std::io;
use std::mem;
use std::path::Path;
use std::result;

use delimit_core::{
    encode_field, sanitize, Dialect, InjectionGuard, Mode, Sanitized, Terminator,
};

use crate::convert::{ToField, ValueKind};
use crate::error::{Error, ErrorKind, IntoInnerError, Result};

/// Decides whether an outgoing field is quoted, given the field text and the
/// declared type of the value it was converted from.
pub type ShouldQuoteHook = Box<dyn FnMut(&str, ValueKind) -> bool>;

/// Builds a CSV writer with various configuration knobs.
///
/// The write side mirrors the read side: the same dialect settings govern
/// encoding, so data written with one configuration parses back with the
/// same one.
///
/// Like [`crate::ReaderBuilder`], a configured `should_quote` hook is moved
/// into the writer it is built into.
///
/// # Example
///
/// ```
/// use delimit::WriterBuilder;
///
/// let mut wtr = WriterBuilder::new().delimiter(";").from_writer(vec![]).unwrap();
/// wtr.write_record(["a", "b"]).unwrap();
/// wtr.write_record(["x", "y"]).unwrap();
/// let data = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
/// assert_eq!(data, "a;b\nx;y\n");
/// ```
pub struct WriterBuilder {
    dialect: Dialect,
    capacity: usize,
    flexible: bool,
    should_quote: Option<ShouldQuoteHook>,
}

impl fmt::Debug for WriterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterBuilder")
            .field("dialect", &self.dialect)
            .field("capacity", &self.capacity)
            .field("flexible", &self.flexible)
            .field("should_quote", &self.should_quote.is_some())
            .finish()
    }
}

impl Default for WriterBuilder {
    fn default() -> WriterBuilder {
        WriterBuilder::new()
    }
}

impl WriterBuilder {
    /// Create a new builder with the default configuration: RFC 4180, comma
    /// delimited, `"` as quote and escape, `\n` terminators, quoting only
    /// when necessary.
    pub fn new() -> WriterBuilder {
        WriterBuilder {
            dialect: Dialect::default(),
            capacity: 8 * (1 << 10),
            flexible: false,
            should_quote: None,
        }
    }

    /// Build a writer that writes to the given file path, truncating it if
    /// it exists.
    pub fn from_path<P: AsRef<Path>>(&mut self, path: P) -> Result<Writer<File>> {
        self.from_writer(File::create(path)?)
    }

    /// Build a writer that writes to `wtr`.
    ///
    /// The writer buffers internally, so `wtr` should not be wrapped in a
    /// `BufWriter`.
    pub fn from_writer<W: io::Write>(&mut self, wtr: W) -> Result<Writer<W>> {
        Ok(Writer {
            wtr: Some(wtr),
            engine: WriterEngine::new(self)?,
            panicked: false,
        })
    }

    /// The field delimiter. May be more than one character. The default is
    /// `,`.
    pub fn delimiter(&mut self, delimiter: &str) -> &mut WriterBuilder {
        self.dialect.delimiter = delimiter.to_string();
        self
    }

    /// The quote character. The default is `"`.
    pub fn quote(&mut self, quote: char) -> &mut WriterBuilder {
        self.dialect.quote = quote;
        self
    }

    /// The escape character. The default equals the quote character, which
    /// doubles quotes; any other character writes `escape,quote` pairs.
    pub fn escape(&mut self, escape: char) -> &mut WriterBuilder {
        self.dialect.escape = escape;
        self
    }

    /// The record terminator written after each record.
    ///
    /// [`Terminator::Auto`] writes `\n`; use [`Terminator::Crlf`] for
    /// RFC 4180 `\r\n` output.
    pub fn terminator(&mut self, terminator: Terminator) -> &mut WriterBuilder {
        self.dialect.terminator = terminator;
        self
    }

    /// The encoding mode: RFC 4180 quoting, escape-prefixing, or verbatim.
    pub fn mode(&mut self, mode: Mode) -> &mut WriterBuilder {
        self.dialect.mode = mode;
        self
    }

    /// The comment character used by [`Writer::write_comment`]. The default
    /// is `#`.
    pub fn comment(&mut self, comment: char) -> &mut WriterBuilder {
        self.dialect.comment = comment;
        self
    }

    /// The whitespace characters whose presence at a field boundary forces
    /// quoting.
    pub fn whitespace(&mut self, chars: &[char]) -> &mut WriterBuilder {
        self.dialect.whitespace = chars.to_vec();
        self
    }

    /// Whether records of varying field counts are allowed.
    ///
    /// Disabled by default: writing a record with a different number of
    /// fields than the first record fails with
    /// [`ErrorKind::UnequalLengths`].
    pub fn flexible(&mut self, yes: bool) -> &mut WriterBuilder {
        self.flexible = yes;
        self
    }

    /// Capacity of the internal write buffer, in bytes.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut WriterBuilder {
        self.capacity = capacity;
        self
    }

    /// What to do when a field begins with a spreadsheet formula character.
    /// The default is [`InjectionGuard::Off`].
    pub fn injection_guard(&mut self, guard: InjectionGuard) -> &mut WriterBuilder {
        self.dialect.injection = guard;
        self
    }

    /// The characters that trigger the injection guard. The default is
    /// `=`, `+`, `-` and `@`.
    pub fn injection_characters(&mut self, chars: &[char]) -> &mut WriterBuilder {
        self.dialect.injection_chars = chars.to_vec();
        self
    }

    /// The character prepended by [`InjectionGuard::Escape`]. The default
    /// is `'`.
    pub fn injection_escape(&mut self, escape: char) -> &mut WriterBuilder {
        self.dialect.injection_escape = escape;
        self
    }

    /// Install a quoting predicate consulted for every field, replacing the
    /// default "quote when necessary" rule. The predicate receives the
    /// field text and the [`ValueKind`] declared by the conversion that
    /// produced it (`Text` for plain field writes).
    pub fn should_quote(
        &mut self,
        hook: impl FnMut(&str, ValueKind) -> bool + 'static,
    ) -> &mut WriterBuilder {
        self.should_quote = Some(Box::new(hook) as ShouldQuoteHook);
        self
    }
}

/// Everything about writing that is not I/O.
///
/// Both the blocking [`Writer`] and the asynchronous writer drive this same
/// engine; they differ only in how [`WriterEngine::readable`] reaches the
/// sink.
pub(crate) struct WriterEngine {
    buf: String,
    capacity: usize,
    dialect: Dialect,
    should_quote: Option<ShouldQuoteHook>,
    /// Reused by the typed write path for formatting.
    scratch: String,
    /// Whether inconsistent record lengths are allowed.
    flexible: bool,
    /// The number of fields in the first record, for the length check.
    first_len: Option<u64>,
    /// Fields written in the current record.
    fields_written: u64,
    /// The current record is a comment line, which is exempt from the
    /// length check.
    wrote_comment: bool,
    /// Completed records.
    rows: u64,
}

impl WriterEngine {
    pub(crate) fn new(builder: &mut WriterBuilder) -> Result<WriterEngine> {
        builder
            .dialect
            .validate()
            .map_err(|err| Error::config(err.to_string()))?;
        Ok(WriterEngine {
            buf: String::with_capacity(builder.capacity),
            capacity: builder.capacity,
            dialect: builder.dialect.clone(),
            should_quote: builder.should_quote.take(),
            scratch: String::new(),
            flexible: builder.flexible,
            first_len: None,
            fields_written: 0,
            wrote_comment: false,
            rows: 0,
        })
    }

    pub(crate) fn write_field(
        &mut self,
        field: &str,
        kind: ValueKind,
        force: Option<bool>,
    ) -> Result<()> {
        if self.fields_written > 0 {
            self.buf.push_str(&self.dialect.delimiter);
        }
        let force = match force {
            Some(choice) => Some(choice),
            None => self.should_quote.as_mut().map(|hook| hook(field, kind)),
        };
        match sanitize(field, &self.dialect) {
            Ok(Sanitized::Clean(clean)) => {
                encode_field(&mut self.buf, clean, &self.dialect, force);
            }
            Ok(Sanitized::Rewritten { text, force_quote }) => {
                let force = if force_quote { Some(true) } else { force };
                encode_field(&mut self.buf, &text, &self.dialect, force);
            }
            Ok(Sanitized::Verbatim(text)) => {
                self.buf.push_str(&text);
            }
            Err(err) => {
                return Err(Error::new(ErrorKind::Injection { field: err.field }));
            }
        }
        self.fields_written += 1;
        Ok(())
    }

    pub(crate) fn write_convert<T: ToField + ?Sized>(&mut self, value: &T) -> Result<()> {
        let mut scratch = mem::take(&mut self.scratch);
        scratch.clear();
        value.format(&mut scratch);
        let result = self.write_field(&scratch, value.kind(), None);
        self.scratch = scratch;
        result
    }

    pub(crate) fn write_comment(&mut self, text: &str) -> Result<()> {
        if self.fields_written > 0 {
            return Err(Error::config(
                "comments must be written at the start of a record",
            ));
        }
        self.buf.push(self.dialect.comment);
        self.buf.push_str(text);
        self.wrote_comment = true;
        self.next_record()
    }

    pub(crate) fn next_record(&mut self) -> Result<()> {
        if self.fields_written == 0 && !self.wrote_comment {
            // An empty record is written as a quoted empty field, so it
            // stays distinguishable from a blank line.
            let quote = self.dialect.quote;
            self.buf.push(quote);
            self.buf.push(quote);
            self.fields_written = 1;
        }
        if !self.flexible && !self.wrote_comment {
            match self.first_len {
                None => self.first_len = Some(self.fields_written),
                Some(expected) if expected != self.fields_written => {
                    return Err(Error::new(ErrorKind::UnequalLengths {
                        pos: None,
                        expected_len: expected,
                        len: self.fields_written,
                    }));
                }
                Some(_) => {}
            }
        }
        let term = match self.dialect.terminator {
            Terminator::Auto => "\n",
            ref other => other.as_str(),
        };
        self.buf.push_str(term);
        self.fields_written = 0;
        self.wrote_comment = false;
        self.rows += 1;
        Ok(())
    }

    pub(crate) fn should_spill(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    pub(crate) fn readable(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }

    pub(crate) fn rows_written(&self) -> u64 {
        self.rows
    }

    pub(crate) fn fields_written(&self) -> u64 {
        self.fields_written
    }
}

impl fmt::Debug for WriterEngine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WriterEngine")
            .field("dialect", &self.dialect)
            .field("buffered", &self.buf.len())
            .field("rows", &self.rows)
            .field("fields_written", &self.fields_written)
            .finish()
    }
}

/// An already configured CSV writer over any `io::Write`.
///
/// Fields are encoded according to the dialect (quoting, escaping, the
/// injection guard) into an internal buffer that spills to the underlying
/// writer as it fills. Dropping the writer flushes it; use
/// [`Writer::into_inner`] to retrieve the underlying writer and observe
/// flush errors.
///
/// # Example
///
/// ```
/// use delimit::Writer;
///
/// let mut wtr = Writer::from_writer(vec![]).unwrap();
/// wtr.write_record(["a,b", "c\"d", ""]).unwrap();
/// let data = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
/// assert_eq!(data, "\"a,b\",\"c\"\"d\",\n");
/// ```
#[derive(Debug)]
pub struct Writer<W: io::Write> {
    wtr: Option<W>,
    engine: WriterEngine,
    /// Set while flushing so a panicking underlying writer does not get
    /// flushed again from `Drop`.
    panicked: bool,
}

impl<W: io::Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if self.wtr.is_some() && !self.panicked {
            let _ = self.flush();
        }
    }
}

impl Writer<File> {
    /// Build a writer with the default configuration that writes to the
    /// given file path, truncating it if it exists.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Writer<File>> {
        WriterBuilder::new().from_path(path)
    }
}

impl<W: io::Write> Writer<W> {
    /// Build a writer with the default configuration that writes to `wtr`.
    pub fn from_writer(wtr: W) -> Result<Writer<W>> {
        WriterBuilder::new().from_writer(wtr)
    }

    /// Write a single field.
    ///
    /// Fields accumulate into the current record until
    /// [`Writer::next_record`] terminates it. Prefer
    /// [`Writer::write_record`] when a whole record is at hand.
    pub fn write_field<T: AsRef<str>>(&mut self, field: T) -> Result<()> {
        self.engine.write_field(field.as_ref(), ValueKind::Text, None)?;
        self.spill_if_full()
    }

    /// Write a single field with an explicit quoting decision, bypassing
    /// both the default predicate and any `should_quote` hook.
    pub fn write_field_quoted<T: AsRef<str>>(&mut self, field: T, quote: bool) -> Result<()> {
        self.engine.write_field(field.as_ref(), ValueKind::Text, Some(quote))?;
        self.spill_if_full()
    }

    /// Convert `value` to its field text and write it.
    ///
    /// The value's [`ValueKind`] is remembered across the encode step, so a
    /// type-aware `should_quote` hook can, for example, quote text but not
    /// numbers.
    pub fn write_convert<T: ToField + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.engine.write_convert(value)?;
        self.spill_if_full()
    }

    /// Write a complete record and terminate it.
    pub fn write_record<I, T>(&mut self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        for field in record {
            self.write_field(field)?;
        }
        self.next_record()
    }

    /// Write a header record. This is a plain record write; it exists so
    /// call sites can say what they mean.
    pub fn write_header<I, T>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.write_record(names)
    }

    /// Write a comment line: the comment character followed by `text`,
    /// terminated like a record. Comment lines are exempt from the
    /// record-length check.
    ///
    /// The text is written verbatim; a terminator inside it would break the
    /// line structure.
    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        self.engine.write_comment(text)?;
        self.spill_if_full()
    }

    /// Terminate the current record.
    ///
    /// An empty record is written as a single quoted empty field, so it
    /// stays distinguishable from a blank line. Unless `flexible` is set,
    /// the number of fields is checked against the first record.
    pub fn next_record(&mut self) -> Result<()> {
        self.engine.next_record()?;
        self.spill_if_full()
    }

    /// The number of records written so far.
    pub fn rows_written(&self) -> u64 {
        self.engine.rows_written()
    }

    /// The number of fields written in the current record.
    pub fn fields_written(&self) -> u64 {
        self.engine.fields_written()
    }

    /// Flush the internal buffer and the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.spill()?;
        if let Some(wtr) = self.wtr.as_mut() {
            wtr.flush()?;
        }
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> result::Result<W, IntoInnerError<Writer<W>>> {
        match self.flush() {
            Ok(()) => Ok(self.wtr.take().expect("writer present until into_inner")),
            Err(err) => Err(IntoInnerError::new(self, err)),
        }
    }

    fn spill_if_full(&mut self) -> Result<()> {
        if self.engine.should_spill() {
            self.spill()?;
        }
        Ok(())
    }

    /// Write the buffer's contents to the underlying writer.
    fn spill(&mut self) -> io::Result<()> {
        if self.engine.readable().is_empty() {
            return Ok(());
        }
        if let Some(wtr) = self.wtr.as_mut() {
            self.panicked = true;
            let result = wtr.write_all(self.engine.readable());
            self.panicked = false;
            result?;
        }
        self.engine.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wtr_as_string(wtr: Writer<Vec<u8>>) -> String {
        String::from_utf8(wtr.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn one_record() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_record(["a", "b", "c"]).unwrap();
        assert_eq!(wtr_as_string(wtr), "a,b,c\n");
    }

    #[test]
    fn quoting_when_necessary() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_record(["a,b", "c\"d", ""]).unwrap();
        assert_eq!(wtr_as_string(wtr), "\"a,b\",\"c\"\"d\",\n");
    }

    #[test]
    fn crlf_terminator() {
        let mut wtr = WriterBuilder::new()
            .terminator(Terminator::Crlf)
            .from_writer(vec![])
            .unwrap();
        wtr.write_record(["a", "b"]).unwrap();
        wtr.write_record(["x", "y"]).unwrap();
        assert_eq!(wtr_as_string(wtr), "a,b\r\nx,y\r\n");
    }

    #[test]
    fn field_at_a_time() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_field("a").unwrap();
        wtr.write_field("b").unwrap();
        wtr.next_record().unwrap();
        wtr.write_field("x").unwrap();
        wtr.write_field("y").unwrap();
        wtr.next_record().unwrap();
        assert_eq!(wtr_as_string(wtr), "a,b\nx,y\n");
    }

    #[test]
    fn unequal_records_bad() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_record(["a", "b", "c"]).unwrap();
        wtr.write_field("a").unwrap();
        let err = wtr.next_record().unwrap_err();
        match err.into_kind() {
            ErrorKind::UnequalLengths { expected_len, len, .. } => {
                assert_eq!(expected_len, 3);
                assert_eq!(len, 1);
            }
            other => panic!("expected UnequalLengths, got {:?}", other),
        }
    }

    #[test]
    fn unequal_records_ok_when_flexible() {
        let mut wtr = WriterBuilder::new().flexible(true).from_writer(vec![]).unwrap();
        wtr.write_record(["a", "b", "c"]).unwrap();
        wtr.write_record(["a"]).unwrap();
        assert_eq!(wtr_as_string(wtr), "a,b,c\na\n");
    }

    #[test]
    fn empty_record_is_quoted_empty_field() {
        let mut wtr = WriterBuilder::new().flexible(true).from_writer(vec![]).unwrap();
        wtr.write_record(["a"]).unwrap();
        wtr.next_record().unwrap();
        assert_eq!(wtr_as_string(wtr), "a\n\"\"\n");
    }

    #[test]
    fn comments_are_exempt_from_length_check() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_record(["a", "b"]).unwrap();
        wtr.write_comment("generated file").unwrap();
        wtr.write_record(["x", "y"]).unwrap();
        assert_eq!(wtr_as_string(wtr), "a,b\n#generated file\nx,y\n");
    }

    #[test]
    fn typed_writes() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_convert(&42i64).unwrap();
        wtr.write_convert(&2.5f64).unwrap();
        wtr.write_convert(&true).unwrap();
        wtr.write_convert("text").unwrap();
        wtr.next_record().unwrap();
        assert_eq!(wtr_as_string(wtr), "42,2.5,true,text\n");
    }

    #[test]
    fn type_aware_quote_hook() {
        let mut wtr = WriterBuilder::new()
            .should_quote(|_, kind| kind == ValueKind::Text)
            .from_writer(vec![])
            .unwrap();
        wtr.write_convert(&7i32).unwrap();
        wtr.write_convert("seven").unwrap();
        wtr.next_record().unwrap();
        assert_eq!(wtr_as_string(wtr), "7,\"seven\"\n");
    }

    #[test]
    fn explicit_quote_decision_wins() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_field_quoted("abc", true).unwrap();
        wtr.write_field_quoted("a,b", false).unwrap();
        wtr.next_record().unwrap();
        assert_eq!(wtr_as_string(wtr), "\"abc\",a,b\n");
    }

    #[test]
    fn injection_escape_guard() {
        let mut wtr = WriterBuilder::new()
            .injection_guard(InjectionGuard::Escape)
            .from_writer(vec![])
            .unwrap();
        wtr.write_field("=SUM(A1)").unwrap();
        wtr.next_record().unwrap();
        assert_eq!(wtr_as_string(wtr), "\"'=SUM(A1)\"\n");
    }

    #[test]
    fn injection_strip_guard() {
        let mut wtr = WriterBuilder::new()
            .injection_guard(InjectionGuard::Strip)
            .flexible(true)
            .from_writer(vec![])
            .unwrap();
        wtr.write_field("@@cmd").unwrap();
        wtr.next_record().unwrap();
        wtr.write_field("\"@@cmd\"").unwrap();
        wtr.next_record().unwrap();
        assert_eq!(wtr_as_string(wtr), "cmd\n\"cmd\"\n");
    }

    #[test]
    fn injection_error_guard() {
        let mut wtr = WriterBuilder::new()
            .injection_guard(InjectionGuard::Error)
            .from_writer(vec![])
            .unwrap();
        let err = wtr.write_field("=1+1").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Injection { .. }));
    }

    #[test]
    fn escape_mode_output() {
        let mut wtr = WriterBuilder::new()
            .mode(Mode::Escape)
            .escape('\\')
            .from_writer(vec![])
            .unwrap();
        wtr.write_record(["a,b", "c"]).unwrap();
        assert_eq!(wtr_as_string(wtr), "a\\,b,c\n");
    }

    #[test]
    fn multi_char_delimiter_output() {
        let mut wtr = WriterBuilder::new().delimiter("||").from_writer(vec![]).unwrap();
        wtr.write_record(["a", "b|c", "d||e"]).unwrap();
        assert_eq!(wtr_as_string(wtr), "a||b|c||\"d||e\"\n");
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let err = WriterBuilder::new().delimiter("").from_writer(vec![]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config(_)));
    }

    #[test]
    fn spills_through_small_buffer() {
        let mut wtr = WriterBuilder::new().buffer_capacity(4).from_writer(vec![]).unwrap();
        for _ in 0..100 {
            wtr.write_record(["field-one", "field-two"]).unwrap();
        }
        let data = wtr_as_string(wtr);
        assert_eq!(data.lines().count(), 100);
        assert!(data.lines().all(|line| line == "field-one,field-two"));
    }
}
