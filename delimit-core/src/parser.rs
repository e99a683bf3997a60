use crate::decode::{self, Decoded};
use crate::detect;
use crate::dialect::{Dialect, Error, Mode, Terminator};

/// The result of asking the parser for the next row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadRowResult {
    /// A row was produced. Its fields are available until the next call to
    /// `read_row`.
    Row,
    /// The internal buffer was exhausted before a row boundary was found.
    /// Call `fill` (or `finish` if the input is done) and retry.
    InputNeeded,
    /// All input has been consumed.
    End,
}

/// The parser's position within the current row.
///
/// `None` is the ordinary in-field reading state. The remaining states are
/// the resumable continuations of multi-character matches, so that input may
/// run out at any point without losing progress.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    None,
    Spaces,
    BlankLine,
    Delimiter,
    LineEnding,
    NewLine,
}

/// The raw extent of one field inside the current row window.
#[derive(Clone, Copy, Debug)]
struct Span {
    start: usize,
    len: usize,
    quote_count: u32,
    bad: bool,
}

/// What `step_none` asks the driver loop to do next.
enum Step {
    Continue,
    Row,
    NeedInput,
}

/// A streaming, character-oriented CSV parser.
///
/// The parser owns a growable row buffer and is fed decoded characters by a
/// driver through [`Parser::fill`]. [`Parser::read_row`] advances through the
/// buffer one character at a time, segmenting fields and rows according to
/// the dialect, and returns [`ReadRowResult::InputNeeded`] whenever the
/// buffer runs dry mid-row. All match state is kept on the parser so a
/// refill can happen between any two characters.
///
/// Field text is decoded lazily: [`Parser::field`] applies quote stripping,
/// escape resolution and trimming on first access and caches the result for
/// the remainder of the row.
///
/// # Example
///
/// ```
/// use delimit_core::{Dialect, Parser, ReadRowResult};
///
/// let mut parser = Parser::new(Dialect::default()).unwrap();
/// parser.fill("a,b,c\n1,2,3\n").unwrap();
/// parser.finish();
///
/// assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
/// assert_eq!(parser.field(0), Some("a"));
/// assert_eq!(parser.field(2), Some("c"));
/// assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
/// assert_eq!(parser.field(1), Some("2"));
/// assert_eq!(parser.read_row().unwrap(), ReadRowResult::End);
/// ```
#[derive(Debug)]
pub struct Parser {
    dialect: Dialect,
    /// The primary buffer. Positions below are byte offsets into it.
    buf: String,
    /// The parse cursor.
    pos: usize,
    row_start: usize,
    /// One past the last content byte of the completed row, excluding the
    /// terminator.
    row_end: usize,
    field_start: usize,
    spans: Vec<Span>,
    /// Lazily decoded fields, parallel to `spans`.
    decoded: Vec<Option<Decoded>>,
    /// The secondary buffer holding decoded text when it differs from the
    /// raw span.
    processed: String,
    state: State,
    row_pending: bool,
    at_field_start: bool,
    in_quotes: bool,
    field_is_bad: bool,
    quote_count: u32,
    /// Consume the rest of the row without producing fields. Entered when a
    /// quoted line break is treated as bad data.
    discarding: bool,
    /// Escape mode: an escape character was consumed and the next character
    /// is literal.
    pending_escape: bool,
    /// BlankLine: a `\r` was consumed and a following `\n` belongs to it.
    pending_blank_cr: bool,
    /// Bytes and characters of the delimiter matched so far.
    delim_pos: usize,
    delim_chars: usize,
    delim_start: usize,
    /// Bytes and characters of a non-auto terminator matched so far.
    term_pos: usize,
    term_chars: usize,
    term_start: usize,
    /// Characters in the current field, for `max_field_size`.
    field_chars: usize,
    last_was_cr: bool,
    eof: bool,
    done: bool,
    row: u64,
    raw_row: u64,
    chars: u64,
    bytes: u64,
    first_fill: bool,
}

impl Parser {
    /// Create a parser for the given dialect.
    ///
    /// Fails if the dialect is inconsistent; see [`Dialect::validate`].
    pub fn new(dialect: Dialect) -> Result<Parser, Error> {
        dialect.validate()?;
        let mut buf = String::new();
        buf.reserve(dialect.buffer_size);
        let mut processed = String::new();
        processed.reserve(dialect.processed_buffer_size);
        Ok(Parser {
            dialect,
            buf,
            pos: 0,
            row_start: 0,
            row_end: 0,
            field_start: 0,
            spans: Vec::new(),
            decoded: Vec::new(),
            processed,
            state: State::None,
            row_pending: false,
            at_field_start: true,
            in_quotes: false,
            field_is_bad: false,
            quote_count: 0,
            discarding: false,
            pending_escape: false,
            pending_blank_cr: false,
            delim_pos: 0,
            delim_chars: 0,
            delim_start: 0,
            term_pos: 0,
            term_chars: 0,
            term_start: 0,
            field_chars: 0,
            last_was_cr: false,
            eof: false,
            done: false,
            row: 0,
            raw_row: 0,
            chars: 0,
            bytes: 0,
            first_fill: true,
        })
    }

    /// The dialect this parser was built with.
    ///
    /// Delimiter detection may have replaced the delimiter since
    /// construction.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Replace the delimiter and re-validate the dialect.
    ///
    /// This is the entry point used by external delimiter detection. It must
    /// be called before the first row is parsed.
    pub fn set_delimiter(&mut self, delimiter: &str) -> Result<(), Error> {
        self.dialect.delimiter = delimiter.to_string();
        self.dialect.validate()
    }

    /// Append decoded characters to the row buffer.
    ///
    /// On the first fill, if the dialect enables it, a delimiter is detected
    /// from the supplied sample and the dialect re-validated.
    pub fn fill(&mut self, input: &str) -> Result<(), Error> {
        if self.first_fill {
            self.first_fill = false;
            if self.dialect.detect_delimiter {
                if let Some(delim) = detect::detect_delimiter(input, &self.dialect) {
                    self.set_delimiter(&delim)?;
                }
            }
        }
        self.buf.push_str(input);
        Ok(())
    }

    /// Signal that no more input will arrive.
    pub fn finish(&mut self) {
        self.eof = true;
    }

    /// The logical row number, starting at 1, excluding skipped blank and
    /// comment lines.
    pub fn row(&self) -> u64 {
        self.row
    }

    /// The physical line number, starting at 1, including lines inside
    /// quoted fields.
    pub fn raw_row(&self) -> u64 {
        self.raw_row
    }

    /// The number of characters consumed so far.
    pub fn char_count(&self) -> u64 {
        self.chars
    }

    /// The number of encoded bytes consumed so far, when byte counting is
    /// enabled.
    pub fn byte_count(&self) -> Option<u64> {
        if self.dialect.count_bytes {
            Some(self.bytes)
        } else {
            None
        }
    }

    /// The number of fields in the current row.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True when the current row has no fields.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// The verbatim text of the current row, excluding its terminator.
    pub fn raw_record(&self) -> &str {
        &self.buf[self.row_start..self.row_end]
    }

    /// The raw, undecoded text of field `i`.
    pub fn raw_field(&self, i: usize) -> Option<&str> {
        let span = self.spans.get(i)?;
        Some(&self.buf[span.start..span.start + span.len])
    }

    /// The decoded text of field `i`, or `None` when out of range.
    ///
    /// The first access decodes the span and caches the result; repeated
    /// accesses are free. The returned slice is valid until the next call to
    /// `read_row`.
    pub fn field(&mut self, i: usize) -> Option<&str> {
        self.ensure_decoded(i)?;
        let d = self.decoded[i]?;
        let text = if d.processed {
            &self.processed[d.start..d.start + d.len]
        } else {
            &self.buf[d.start..d.start + d.len]
        };
        Some(text)
    }

    /// Whether field `i` violates the dialect's quoting rules.
    ///
    /// This forces decoding, since some bad data is only discovered when the
    /// span is examined.
    pub fn field_is_bad(&mut self, i: usize) -> bool {
        let _ = self.ensure_decoded(i);
        self.decoded
            .get(i)
            .and_then(|d| *d)
            .map_or(false, |d| d.bad)
    }

    fn ensure_decoded(&mut self, i: usize) -> Option<()> {
        let span = *self.spans.get(i)?;
        if self.decoded[i].is_none() {
            let d = decode::decode(
                &self.buf,
                span.start,
                span.len,
                span.quote_count,
                span.bad,
                &self.dialect,
                &mut self.processed,
            );
            self.decoded[i] = Some(d);
        }
        Some(())
    }

    /// Advance to the next row.
    ///
    /// Returns `Row` when a row is available, `InputNeeded` when the buffer
    /// must be refilled, and `End` once all input is consumed. The only
    /// error is a `max_field_size` overflow, which is fatal.
    pub fn read_row(&mut self) -> Result<ReadRowResult, Error> {
        if self.done {
            return Ok(ReadRowResult::End);
        }
        if !self.row_pending {
            self.begin_row();
        }
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    if !self.eof {
                        return Ok(ReadRowResult::InputNeeded);
                    }
                    return Ok(self.finish_at_eof());
                }
            };
            match self.state {
                State::None => match self.step_none(c)? {
                    Step::Continue => continue,
                    Step::Row => return Ok(ReadRowResult::Row),
                    Step::NeedInput => return Ok(ReadRowResult::InputNeeded),
                },
                State::Spaces => {
                    if self.dialect.is_whitespace(c) {
                        self.bump(c);
                        self.count_field_char()?;
                        continue;
                    }
                    if c == self.dialect.quote {
                        self.in_quotes = true;
                        self.quote_count += 1;
                        self.bump(c);
                        self.count_field_char()?;
                    }
                    self.at_field_start = false;
                    self.state = State::None;
                }
                State::BlankLine => self.step_blank_line(c),
                State::Delimiter => match self.delimiter_char_at(self.delim_pos) {
                    Some(expected) if c == expected => {
                        self.bump(c);
                        self.delim_pos += c.len_utf8();
                        self.delim_chars += 1;
                        if self.delim_pos == self.dialect.delimiter.len() {
                            self.end_field_at(self.delim_start);
                            self.field_start = self.pos;
                            self.at_field_start = true;
                            self.delim_pos = 0;
                            self.delim_chars = 0;
                            self.state = State::None;
                        }
                    }
                    _ => {
                        // Partial match canceled: the matched prefix becomes
                        // field content and the current character is
                        // re-examined.
                        self.field_chars += self.delim_chars;
                        self.delim_pos = 0;
                        self.delim_chars = 0;
                        self.state = State::None;
                        self.check_field_size()?;
                    }
                },
                State::LineEnding => {
                    if c == '\n' {
                        self.bump(c);
                    }
                    self.end_row();
                    return Ok(ReadRowResult::Row);
                }
                State::NewLine => match self.terminator_char_at(self.term_pos) {
                    Some(expected) if c == expected => {
                        self.bump(c);
                        self.term_pos += c.len_utf8();
                        self.term_chars += 1;
                        if self.term_pos == self.terminator_len() {
                            self.term_pos = 0;
                            self.term_chars = 0;
                            self.end_row();
                            return Ok(ReadRowResult::Row);
                        }
                    }
                    _ => {
                        self.field_chars += self.term_chars;
                        self.term_pos = 0;
                        self.term_chars = 0;
                        self.state = State::None;
                        self.check_field_size()?;
                    }
                },
            }
        }
    }

    /// One step of the main in-field state.
    fn step_none(&mut self, c: char) -> Result<Step, Error> {
        let quote = self.dialect.quote;
        let escape = self.dialect.escape;

        if self.at_field_start && !self.discarding {
            // Row-level skips apply only at the very first character.
            if self.spans.is_empty() && self.pos == self.row_start {
                if self.dialect.allow_comments && c == self.dialect.comment {
                    self.state = State::BlankLine;
                    self.row -= 1;
                    self.bump(c);
                    return Ok(Step::Continue);
                }
                if self.dialect.ignore_blank_lines && self.dialect.terminator.starts_with(c) {
                    self.state = State::BlankLine;
                    self.row -= 1;
                    return Ok(Step::Continue);
                }
            }
            if self.dialect.mode == Mode::Rfc4180 {
                if self.dialect.trim.outer() && self.dialect.is_whitespace(c) {
                    self.state = State::Spaces;
                    return Ok(Step::Continue);
                }
                if c == quote {
                    self.in_quotes = true;
                    self.quote_count += 1;
                    self.at_field_start = false;
                    self.bump(c);
                    self.count_field_char()?;
                    return Ok(Step::Continue);
                }
            }
            self.at_field_start = false;
        }

        if self.dialect.mode == Mode::Rfc4180 && self.in_quotes {
            if c == escape && escape != quote {
                return match self.peek_after(c) {
                    None if !self.eof => Ok(Step::NeedInput),
                    Some(n) if n == quote || n == escape => {
                        self.quote_count += 2;
                        self.bump(c);
                        self.count_field_char()?;
                        self.bump(n);
                        self.count_field_char()?;
                        Ok(Step::Continue)
                    }
                    _ => {
                        // A lone escape inside quotes is literal.
                        self.quote_count += 1;
                        self.bump(c);
                        self.count_field_char()?;
                        Ok(Step::Continue)
                    }
                };
            }
            if c == quote {
                if escape == quote {
                    match self.peek_after(c) {
                        None if !self.eof => return Ok(Step::NeedInput),
                        Some(n) if n == quote => {
                            self.quote_count += 2;
                            self.bump(c);
                            self.count_field_char()?;
                            self.bump(n);
                            self.count_field_char()?;
                            return Ok(Step::Continue);
                        }
                        _ => {}
                    }
                }
                self.quote_count += 1;
                self.in_quotes = false;
                self.bump(c);
                self.count_field_char()?;
                return Ok(Step::Continue);
            }
            if c == '\r' || c == '\n' {
                if self.dialect.quoted_line_break_is_bad_data && !self.discarding {
                    // The line break both poisons the field and terminates
                    // the row; the rest of the physical record is consumed
                    // without producing fields. The row window ends here so
                    // diagnostics see the record as it stood at the break.
                    self.count_raw_line(c);
                    self.field_is_bad = true;
                    self.end_field_at(self.pos);
                    self.field_start = self.pos;
                    self.row_end = self.pos;
                    self.discarding = true;
                    self.bump(c);
                    return Ok(Step::Continue);
                }
                self.count_raw_line(c);
                self.bump(c);
                self.count_field_char()?;
                return Ok(Step::Continue);
            }
            self.bump(c);
            self.count_field_char()?;
            return Ok(Step::Continue);
        }

        if self.dialect.mode == Mode::Escape {
            if self.pending_escape {
                self.pending_escape = false;
                self.bump(c);
                self.count_field_char()?;
                return Ok(Step::Continue);
            }
            if c == escape {
                self.pending_escape = true;
                self.bump(c);
                self.count_field_char()?;
                return Ok(Step::Continue);
            }
        }

        // Not inside quotes: delimiters and terminators are live.
        if !self.discarding && c == self.dialect.delimiter_first() {
            self.delim_start = self.pos;
            self.bump(c);
            if self.dialect.delimiter.len() == c.len_utf8() {
                self.end_field_at(self.delim_start);
                self.field_start = self.pos;
                self.at_field_start = true;
            } else {
                self.delim_pos = c.len_utf8();
                self.delim_chars = 1;
                self.state = State::Delimiter;
            }
            return Ok(Step::Continue);
        }

        match self.dialect.terminator {
            Terminator::Auto => {
                if c == '\n' {
                    self.term_start = self.pos;
                    self.bump(c);
                    self.end_row();
                    return Ok(Step::Row);
                }
                if c == '\r' {
                    self.term_start = self.pos;
                    self.bump(c);
                    self.state = State::LineEnding;
                    return Ok(Step::Continue);
                }
            }
            _ => {
                if let Some(first) = self.terminator_char_at(0) {
                    if c == first {
                        self.term_start = self.pos;
                        self.bump(c);
                        if self.terminator_len() == c.len_utf8() {
                            self.end_row();
                            return Ok(Step::Row);
                        }
                        self.term_pos = c.len_utf8();
                        self.term_chars = 1;
                        self.state = State::NewLine;
                        return Ok(Step::Continue);
                    }
                }
            }
        }

        if self.dialect.mode == Mode::Rfc4180 && c == quote {
            if self.discarding {
                // Track quoting so the discarded tail ends at a true row
                // boundary.
                self.in_quotes = true;
                self.bump(c);
                return Ok(Step::Continue);
            }
            // A quote after field content is bad data but not structural.
            self.field_is_bad = true;
            self.quote_count += 1;
            self.bump(c);
            self.count_field_char()?;
            return Ok(Step::Continue);
        }

        self.bump(c);
        self.count_field_char()?;
        Ok(Step::Continue)
    }

    fn step_blank_line(&mut self, c: char) {
        if self.pending_blank_cr {
            self.pending_blank_cr = false;
            if c == '\n' {
                self.bump(c);
            }
            self.begin_row();
            return;
        }
        match self.dialect.terminator {
            Terminator::Auto => {
                if c == '\n' {
                    self.bump(c);
                    self.begin_row();
                } else if c == '\r' {
                    self.bump(c);
                    self.pending_blank_cr = true;
                } else {
                    self.bump(c);
                }
            }
            _ => match self.terminator_char_at(self.term_pos) {
                Some(expected) if c == expected => {
                    self.bump(c);
                    self.term_pos += c.len_utf8();
                    if self.term_pos == self.terminator_len() {
                        self.term_pos = 0;
                        self.begin_row();
                    }
                }
                _ => {
                    if self.term_pos > 0 {
                        self.term_pos = 0;
                    } else {
                        self.bump(c);
                    }
                }
            },
        }
    }

    /// Row bookkeeping at the start of each candidate row. Compacts the
    /// buffer so the new row window begins at offset zero.
    fn begin_row(&mut self) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.row_start = self.pos;
        self.field_start = self.pos;
        self.row_end = self.pos;
        self.spans.clear();
        self.decoded.clear();
        self.processed.clear();
        self.state = State::None;
        self.at_field_start = true;
        self.in_quotes = false;
        self.field_is_bad = false;
        self.quote_count = 0;
        self.discarding = false;
        self.pending_escape = false;
        self.pending_blank_cr = false;
        self.delim_pos = 0;
        self.delim_chars = 0;
        self.term_pos = 0;
        self.term_chars = 0;
        self.field_chars = 0;
        self.last_was_cr = false;
        self.row += 1;
        self.raw_row += 1;
        self.row_pending = true;
    }

    fn end_field_at(&mut self, end: usize) {
        self.spans.push(Span {
            start: self.field_start,
            len: end - self.field_start,
            quote_count: self.quote_count,
            bad: self.field_is_bad,
        });
        self.quote_count = 0;
        self.field_is_bad = false;
        self.field_chars = 0;
    }

    fn end_row(&mut self) {
        let mut end = self.term_start;
        if self.discarding {
            // The discarded tail contributes exactly one empty trailing
            // field, and the row window stays frozen at the bad line break.
            self.field_start = self.term_start;
            self.quote_count = 0;
            self.field_is_bad = false;
            self.discarding = false;
            end = self.row_end;
        }
        self.end_field_at(self.term_start);
        self.complete_row(end);
    }

    fn complete_row(&mut self, end: usize) {
        self.row_end = end;
        self.row_pending = false;
        self.state = State::None;
        self.in_quotes = false;
        self.last_was_cr = false;
        self.decoded.clear();
        self.decoded.resize(self.spans.len(), None);
    }

    /// The end-of-file finaliser. Emits any pending field or partially
    /// matched delimiter/terminator, or reports the end of input.
    fn finish_at_eof(&mut self) -> ReadRowResult {
        match self.state {
            State::Delimiter => {
                // A truncated delimiter still separates: the field before it
                // plus a trailing empty field.
                self.end_field_at(self.delim_start);
                self.field_start = self.pos;
                self.end_field_at(self.pos);
                self.complete_row(self.pos);
                ReadRowResult::Row
            }
            State::LineEnding | State::NewLine => {
                self.term_pos = 0;
                self.term_chars = 0;
                self.end_row();
                ReadRowResult::Row
            }
            State::Spaces => {
                self.end_field_at(self.pos);
                self.complete_row(self.pos);
                ReadRowResult::Row
            }
            State::BlankLine => {
                self.row_pending = false;
                self.done = true;
                ReadRowResult::End
            }
            State::None => {
                if self.pos > self.row_start || !self.spans.is_empty() {
                    let mut end = self.pos;
                    if self.discarding {
                        self.field_start = self.pos;
                        self.quote_count = 0;
                        self.field_is_bad = false;
                        self.discarding = false;
                        end = self.row_end;
                    }
                    self.end_field_at(self.pos);
                    self.complete_row(end);
                    ReadRowResult::Row
                } else {
                    // The candidate row never materialized.
                    self.row -= 1;
                    self.raw_row -= 1;
                    self.row_pending = false;
                    self.done = true;
                    ReadRowResult::End
                }
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.buf[self.pos..].chars().next()
    }

    fn peek_after(&self, c: char) -> Option<char> {
        self.buf[self.pos + c.len_utf8()..].chars().next()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
        self.chars += 1;
        if self.dialect.count_bytes {
            self.bytes += self.dialect.encoding.width(c);
        }
        self.last_was_cr = c == '\r';
    }

    /// Count a physical line inside a quoted field, treating `\r\n` as one.
    /// Must run before the character is consumed.
    fn count_raw_line(&mut self, c: char) {
        if c == '\n' && self.last_was_cr {
            return;
        }
        self.raw_row += 1;
    }

    fn count_field_char(&mut self) -> Result<(), Error> {
        if self.discarding {
            return Ok(());
        }
        self.field_chars += 1;
        self.check_field_size()
    }

    fn check_field_size(&mut self) -> Result<(), Error> {
        let limit = self.dialect.max_field_size;
        if limit > 0 && self.field_chars > limit {
            self.done = true;
            return Err(Error::FieldSize {
                limit,
                row: self.row,
                field: self.spans.len(),
            });
        }
        Ok(())
    }

    fn delimiter_char_at(&self, byte_idx: usize) -> Option<char> {
        self.dialect.delimiter[byte_idx..].chars().next()
    }

    fn terminator_str(&self) -> &str {
        match self.dialect.terminator {
            Terminator::Auto => "\n",
            Terminator::Crlf => "\r\n",
            Terminator::Lf => "\n",
            Terminator::Custom(ref s) => s,
        }
    }

    fn terminator_char_at(&self, byte_idx: usize) -> Option<char> {
        self.terminator_str()[byte_idx..].chars().next()
    }

    fn terminator_len(&self) -> usize {
        self.terminator_str().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Trim;

    /// Parse `data` to completion, handing the parser `chunk`-sized pieces.
    fn parse_chunked(dialect: Dialect, data: &str, chunk: usize) -> Vec<Vec<String>> {
        let mut parser = Parser::new(dialect).unwrap();
        let mut rows = Vec::new();
        let mut rest = data;
        loop {
            match parser.read_row().unwrap() {
                ReadRowResult::Row => {
                    let row = (0..parser.len())
                        .map(|i| parser.field(i).unwrap().to_string())
                        .collect();
                    rows.push(row);
                }
                ReadRowResult::InputNeeded => {
                    if rest.is_empty() {
                        parser.finish();
                    } else {
                        let mut take = chunk.min(rest.len());
                        while !rest.is_char_boundary(take) {
                            take += 1;
                        }
                        parser.fill(&rest[..take]).unwrap();
                        rest = &rest[take..];
                    }
                }
                ReadRowResult::End => return rows,
            }
        }
    }

    fn parse(dialect: Dialect, data: &str) -> Vec<Vec<String>> {
        // Whole-input and byte-at-a-time feeding must agree; the latter
        // exercises every resumable continuation.
        let all = parse_chunked(dialect.clone(), data, usize::MAX);
        let trickled = parse_chunked(dialect, data, 1);
        assert_eq!(all, trickled, "chunked parse diverged");
        all
    }

    macro_rules! csv {
        ($([$($field:expr),*]),* $(,)?) => {
            vec![$(vec![$($field.to_string()),*]),*] as Vec<Vec<String>>
        };
    }

    macro_rules! parses_to {
        ($name:ident, $data:expr, $expected:expr) => {
            parses_to!($name, $data, $expected, |d| d);
        };
        ($name:ident, $data:expr, $expected:expr, $config:expr) => {
            #[test]
            fn $name() {
                #[allow(clippy::redundant_closure_call)]
                let dialect: Dialect = ($config)(Dialect::default());
                assert_eq!(parse(dialect, $data), $expected);
            }
        };
    }

    parses_to!(one_row_one_field, "a", csv![["a"]]);
    parses_to!(one_row_many_fields, "a,b,c", csv![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma, "a,b,", csv![["a", "b", ""]]);
    parses_to!(one_row_one_field_lf, "a\n", csv![["a"]]);
    parses_to!(one_row_many_fields_lf, "a,b,c\n", csv![["a", "b", "c"]]);
    parses_to!(one_row_one_field_crlf, "a\r\n", csv![["a"]]);
    parses_to!(one_row_one_field_cr, "a\r", csv![["a"]]);
    parses_to!(
        many_rows_many_fields,
        "a,b,c\nx,y,z",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(
        many_rows_trailing_comma_crlf,
        "a,b,\r\nx,y,\r\n",
        csv![["a", "b", ""], ["x", "y", ""]]
    );
    parses_to!(
        trailing_lines_no_record,
        "\n\n\na,b,c\nx,y,z\n\n\n",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(empty, "", csv![]);
    parses_to!(empty_lines, "\n\n\n\n", csv![]);
    parses_to!(
        empty_lines_interspersed_mixed,
        "\n\r\na,b\r\n\n\r\nx,y\r\n\n\r\nm,n\r\n",
        csv![["a", "b"], ["x", "y"], ["m", "n"]]
    );

    parses_to!(quote_empty, "\"\"", csv![[""]]);
    parses_to!(quote_space, "\" \"", csv![[" "]]);
    parses_to!(quote_inner_space, "\" a \"", csv![[" a "]]);
    parses_to!(quoted_delimiter, "\"a,b\",c", csv![["a,b", "c"]]);
    parses_to!(quoted_doubled_quote, "\"c\"\"d\"", csv![["c\"d"]]);
    parses_to!(quoted_newline, "\"e\nf\"", csv![["e\nf"]]);
    parses_to!(quoted_crlf, "\"e\r\nf\",g\r\n", csv![["e\r\nf", "g"]]);
    parses_to!(
        quote_escapes_backslash,
        r#""a\"b""#,
        csv![[r#"a"b"#]],
        |d: Dialect| Dialect { escape: '\\', ..d }
    );

    parses_to!(
        delimiter_tabs,
        "a\tb",
        csv![["a", "b"]],
        |d: Dialect| Dialect { delimiter: "\t".to_string(), ..d }
    );
    parses_to!(
        delimiter_multi_char,
        "a||b||c\nd||e||f\n",
        csv![["a", "b", "c"], ["d", "e", "f"]],
        |d: Dialect| Dialect { delimiter: "||".to_string(), ..d }
    );
    parses_to!(
        delimiter_multi_char_partial,
        "a|b||c\n",
        csv![["a|b", "c"]],
        |d: Dialect| Dialect { delimiter: "||".to_string(), ..d }
    );
    parses_to!(
        delimiter_multi_char_truncated_at_eof,
        "a||b|",
        csv![["a", "b", ""]],
        |d: Dialect| Dialect { delimiter: "||".to_string(), ..d }
    );

    parses_to!(
        terminator_custom,
        "a,bzc,dz",
        csv![["a", "b"], ["c", "d"]],
        |d: Dialect| Dialect { terminator: Terminator::Custom("z".to_string()), ..d }
    );
    parses_to!(
        terminator_custom_multi,
        "a,b$$c,d$$",
        csv![["a", "b"], ["c", "d"]],
        |d: Dialect| Dialect { terminator: Terminator::Custom("$$".to_string()), ..d }
    );
    parses_to!(
        terminator_crlf_lone_cr_is_data,
        "a\rb\r\nc\r\n",
        csv![["a\rb"], ["c"]],
        |d: Dialect| Dialect { terminator: Terminator::Crlf, ..d }
    );

    parses_to!(
        comments_skipped,
        "#comment\r\na,b\r\n",
        csv![["a", "b"]],
        |d: Dialect| Dialect { allow_comments: true, ..d }
    );
    parses_to!(
        comment_char_not_special_by_default,
        "#c\na,b\n",
        csv![["#c"], ["a", "b"]]
    );

    parses_to!(
        trim_outer,
        "  a  ,b\n",
        csv![["a", "b"]],
        |d: Dialect| Dialect { trim: Trim::Outer, ..d }
    );
    parses_to!(
        trim_all_quoted,
        "  \"a\"  ,b",
        csv![["a", "b"]],
        |d: Dialect| Dialect { trim: Trim::All, ..d }
    );
    parses_to!(
        trim_inside_quotes,
        "\"  a  \",b",
        csv![["a", "b"]],
        |d: Dialect| Dialect { trim: Trim::InsideQuotes, ..d }
    );
    parses_to!(
        no_trim_keeps_spaces,
        "  \"a\"  ,b",
        csv![["  \"a\"  ", "b"]]
    );

    parses_to!(
        escape_mode_literal_specials,
        "a\\,b,c\n",
        csv![["a,b", "c"]],
        |d: Dialect| Dialect { mode: Mode::Escape, escape: '\\', ..d }
    );
    parses_to!(
        escape_mode_escaped_newline,
        "a\\\nb,c\n",
        csv![["a\nb", "c"]],
        |d: Dialect| Dialect { mode: Mode::Escape, escape: '\\', ..d }
    );
    parses_to!(
        no_escape_mode_quotes_are_data,
        "\"a\",b\n",
        csv![["\"a\"", "b"]],
        |d: Dialect| Dialect { mode: Mode::NoEscape, ..d }
    );

    parses_to!(multibyte_fields, "über,naïve\nπ,ß\n", csv![["über", "naïve"], ["π", "ß"]]);
    parses_to!(
        multibyte_delimiter,
        "a€b€c\n",
        csv![["a", "b", "c"]],
        |d: Dialect| Dialect { delimiter: "€".to_string(), ..d }
    );

    #[test]
    fn quoted_newline_advances_physical_line_only() {
        let mut parser = Parser::new(Dialect::default()).unwrap();
        parser.fill("\"a,b\",\"c\"\"d\",\"e\nf\"\n").unwrap();
        parser.finish();
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        assert_eq!(parser.field(0), Some("a,b"));
        assert_eq!(parser.field(1), Some("c\"d"));
        assert_eq!(parser.field(2), Some("e\nf"));
        assert_eq!(parser.row(), 1);
        assert_eq!(parser.raw_row(), 2);
    }

    #[test]
    fn comment_counters() {
        let dialect = Dialect { allow_comments: true, ..Dialect::default() };
        let mut parser = Parser::new(dialect).unwrap();
        parser.fill("#comment\r\na,b\r\n").unwrap();
        parser.finish();
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        assert_eq!(parser.row(), 1);
        assert_eq!(parser.raw_row(), 2);
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::End);
    }

    #[test]
    fn quoted_line_break_as_bad_data() {
        let dialect = Dialect {
            quoted_line_break_is_bad_data: true,
            ..Dialect::default()
        };
        let mut parser = Parser::new(dialect).unwrap();
        parser.fill("a,\"b\nc\",d\nx,y,z\n").unwrap();
        parser.finish();

        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        assert_eq!(parser.len(), 3);
        assert_eq!(parser.field(0), Some("a"));
        assert_eq!(parser.field(1), Some("b"));
        assert_eq!(parser.field(2), Some(""));
        assert!(parser.field_is_bad(1));
        assert_eq!(parser.raw_record(), "a,\"b");

        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        assert_eq!(parser.field(0), Some("x"));
        assert_eq!(parser.field(1), Some("y"));
        assert_eq!(parser.field(2), Some("z"));
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::End);
    }

    #[test]
    fn stray_quote_marks_field_bad() {
        let mut parser = Parser::new(Dialect::default()).unwrap();
        parser.fill("a\"b,c\n").unwrap();
        parser.finish();
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        assert!(parser.field_is_bad(0));
        assert!(!parser.field_is_bad(1));
        assert_eq!(parser.field(0), Some("a\"b"));
    }

    #[test]
    fn unquoted_quoted_field_is_bad() {
        let mut parser = Parser::new(Dialect::default()).unwrap();
        parser.fill("  \"a\"  ,b").unwrap();
        parser.finish();
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        assert!(parser.field_is_bad(0));
        assert_eq!(parser.field(0), Some("  \"a\"  "));
        assert_eq!(parser.field(1), Some("b"));
    }

    #[test]
    fn raw_record_and_raw_fields() {
        let mut parser = Parser::new(Dialect::default()).unwrap();
        parser.fill("\"a,b\",c\r\nnext,row\r\n").unwrap();
        parser.finish();
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        assert_eq!(parser.raw_record(), "\"a,b\",c");
        assert_eq!(parser.raw_field(0), Some("\"a,b\""));
        assert_eq!(parser.raw_field(1), Some("c"));
    }

    #[test]
    fn repeated_field_access_is_stable() {
        let mut parser = Parser::new(Dialect::default()).unwrap();
        parser.fill("\"x\"\"y\",b\n").unwrap();
        parser.finish();
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        let first = parser.field(0).map(str::to_string);
        let second = parser.field(0).map(str::to_string);
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("x\"y"));
    }

    #[test]
    fn max_field_size_is_fatal() {
        let dialect = Dialect { max_field_size: 4, ..Dialect::default() };
        let mut parser = Parser::new(dialect).unwrap();
        parser.fill("ok,toolong\n").unwrap();
        parser.finish();
        let err = parser.read_row().unwrap_err();
        assert!(matches!(err, Error::FieldSize { limit: 4, .. }));
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::End);
    }

    #[test]
    fn counters_are_monotonic() {
        let mut parser = Parser::new(Dialect::default()).unwrap();
        parser.fill("a,b\n\"x\ny\",z\nc,d\n").unwrap();
        parser.finish();
        let mut last = (0, 0);
        while parser.read_row().unwrap() == ReadRowResult::Row {
            let now = (parser.row(), parser.raw_row());
            assert!(now.0 >= last.0 && now.1 >= last.1);
            assert!(parser.raw_row() >= parser.row());
            last = now;
        }
    }

    #[test]
    fn byte_count_tracks_encoding() {
        let dialect = Dialect { count_bytes: true, ..Dialect::default() };
        let mut parser = Parser::new(dialect).unwrap();
        parser.fill("aé,b\n").unwrap();
        parser.finish();
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        // a=1, é=2, comma=1, b=1, newline=1.
        assert_eq!(parser.byte_count(), Some(6));
        assert_eq!(parser.char_count(), 5);
    }

    #[test]
    fn delimiter_detection_switches_dialect() {
        let dialect = Dialect { detect_delimiter: true, ..Dialect::default() };
        let mut parser = Parser::new(dialect).unwrap();
        parser.fill("h1;h2;h3\n1;2;3\n").unwrap();
        parser.finish();
        assert_eq!(parser.dialect().delimiter, ";");
        assert_eq!(parser.read_row().unwrap(), ReadRowResult::Row);
        assert_eq!(parser.field(1), Some("h2"));
    }
}
