//! Asynchronous drivers for the reader and writer.
//!
//! The parser and encoder are shared with the blocking side; these types
//! only change how bytes move. The sole suspension point on the read side
//! is the buffer refill, and on the write side the buffer spill.
//! Cancellation is by dropping the future between rows, as usual in async
//! Rust.
//!
//! Available with the `async` feature.

use std::path::Path;
use std::rc::Rc;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::convert::{FromField, ToField, ValueKind};
use crate::error::{Position, Result};
use crate::reader::{Engine, ReaderBuilder, Step};
use crate::record::Record;
use crate::writer::{WriterBuilder, WriterEngine};

impl ReaderBuilder {
    /// Build an asynchronous reader from this configuration.
    ///
    /// Semantics are identical to [`ReaderBuilder::from_reader`]; only the
    /// refill suspends.
    pub fn from_async_reader<R: AsyncRead + Unpin>(&mut self, rdr: R) -> Result<AsyncReader<R>> {
        Ok(AsyncReader {
            rdr: BufReader::new(rdr),
            engine: Engine::new(self)?,
        })
    }
}

impl WriterBuilder {
    /// Build an asynchronous writer from this configuration.
    pub fn from_async_writer<W: AsyncWrite + Unpin>(&mut self, wtr: W) -> Result<AsyncWriter<W>> {
        Ok(AsyncWriter {
            wtr,
            engine: WriterEngine::new(self)?,
        })
    }
}

/// An asynchronous CSV reader over any `AsyncRead`.
///
/// The row cursor mirrors [`crate::Reader`]: `read().await` advances, then
/// fields are available through the same accessors until the next call.
///
/// # Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use delimit::AsyncReader;
///
/// let data = "a,b\n1,2\n";
/// let mut rdr = AsyncReader::from_reader(data.as_bytes()).unwrap();
/// assert!(rdr.read().await.unwrap());
/// assert_eq!(rdr.field(0).unwrap(), "a");
/// assert!(rdr.read().await.unwrap());
/// assert_eq!(rdr.field(1).unwrap(), "2");
/// assert!(!rdr.read().await.unwrap());
/// # }
/// ```
#[derive(Debug)]
pub struct AsyncReader<R> {
    rdr: BufReader<R>,
    engine: Engine,
}

impl AsyncReader<File> {
    /// Create an asynchronous reader with the default configuration for the
    /// given file path.
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<AsyncReader<File>> {
        let file = File::open(path).await?;
        ReaderBuilder::new().from_async_reader(file)
    }
}

impl<R: AsyncRead + Unpin> AsyncReader<R> {
    /// Create an asynchronous reader with the default configuration.
    pub fn from_reader(rdr: R) -> Result<AsyncReader<R>> {
        ReaderBuilder::new().from_async_reader(rdr)
    }

    /// Advance to the next row. See [`crate::Reader::read`].
    pub async fn read(&mut self) -> Result<bool> {
        loop {
            match self.engine.step()? {
                Step::Row => return Ok(true),
                Step::End => return Ok(false),
                Step::NeedInput => {
                    let consumed = {
                        let buf = self.rdr.fill_buf().await?;
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

    /// Read the next row and capture it as the header record. See
    /// [`crate::Reader::read_header`].
    pub async fn read_header(&mut self) -> Result<bool> {
        if !self.read().await? {
            return Ok(false);
        }
        self.engine.build_header()?;
        Ok(true)
    }

    /// The captured header names, if a header has been read.
    pub fn headers(&self) -> Option<&[String]> {
        self.engine.headers()
    }

    /// Check that every name in `schema` resolves against the captured
    /// header. See [`crate::Reader::validate_header`].
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

    /// The decoded text of field `i`. See [`crate::Reader::field`].
    pub fn field(&mut self, i: usize) -> Result<&str> {
        self.engine.field(i)
    }

    /// Non-throwing variant of [`AsyncReader::field`].
    pub fn try_field(&mut self, i: usize) -> Option<&str> {
        self.engine.try_field(i)
    }

    /// The decoded text of the field under the header `name`.
    pub fn field_by_name(&mut self, name: &str) -> Result<&str> {
        self.engine.field_by_name(name, 0)
    }

    /// Like [`AsyncReader::field_by_name`], resolving the `nth` occurrence
    /// of a duplicated header name.
    pub fn field_by_name_nth(&mut self, name: &str, nth: usize) -> Result<&str> {
        self.engine.field_by_name(name, nth)
    }

    /// Parse field `i` as `T`.
    pub fn field_as<T: FromField>(&mut self, i: usize) -> Result<T> {
        self.engine.field_as(i)
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
}

/// An asynchronous CSV writer over any `AsyncWrite`.
///
/// Encoding happens synchronously into the internal buffer; only the spill
/// to the sink suspends. Call [`AsyncWriter::flush`] before dropping: an
/// async drop cannot flush for you.
///
/// # Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use delimit::AsyncWriter;
///
/// let mut wtr = AsyncWriter::from_writer(Vec::new()).unwrap();
/// wtr.write_record(["a", "b"]).await.unwrap();
/// wtr.flush().await.unwrap();
/// let data = String::from_utf8(wtr.into_inner()).unwrap();
/// assert_eq!(data, "a,b\n");
/// # }
/// ```
#[derive(Debug)]
pub struct AsyncWriter<W> {
    wtr: W,
    engine: WriterEngine,
}

impl<W: AsyncWrite + Unpin> AsyncWriter<W> {
    /// Create an asynchronous writer with the default configuration.
    pub fn from_writer(wtr: W) -> Result<AsyncWriter<W>> {
        WriterBuilder::new().from_async_writer(wtr)
    }

    /// Write a single field. See [`crate::Writer::write_field`].
    pub async fn write_field<T: AsRef<str>>(&mut self, field: T) -> Result<()> {
        self.engine.write_field(field.as_ref(), ValueKind::Text, None)?;
        self.spill_if_full().await
    }

    /// Write a single field with an explicit quoting decision.
    pub async fn write_field_quoted<T: AsRef<str>>(&mut self, field: T, quote: bool) -> Result<()> {
        self.engine.write_field(field.as_ref(), ValueKind::Text, Some(quote))?;
        self.spill_if_full().await
    }

    /// Convert `value` to its field text and write it.
    pub async fn write_convert<T: ToField + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.engine.write_convert(value)?;
        self.spill_if_full().await
    }

    /// Write a complete record and terminate it.
    pub async fn write_record<I, T>(&mut self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        for field in record {
            self.engine.write_field(field.as_ref(), ValueKind::Text, None)?;
        }
        self.next_record().await
    }

    /// Write a header record.
    pub async fn write_header<I, T>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.write_record(names).await
    }

    /// Write a comment line. See [`crate::Writer::write_comment`].
    pub async fn write_comment(&mut self, text: &str) -> Result<()> {
        self.engine.write_comment(text)?;
        self.spill_if_full().await
    }

    /// Terminate the current record. See [`crate::Writer::next_record`].
    pub async fn next_record(&mut self) -> Result<()> {
        self.engine.next_record()?;
        self.spill_if_full().await
    }

    /// The number of records written so far.
    pub fn rows_written(&self) -> u64 {
        self.engine.rows_written()
    }

    /// Flush the internal buffer and the underlying writer.
    pub async fn flush(&mut self) -> Result<()> {
        self.spill().await?;
        self.wtr.flush().await?;
        Ok(())
    }

    /// Return the underlying writer. Flush first; unspilled buffer contents
    /// are discarded.
    pub fn into_inner(self) -> W {
        self.wtr
    }

    async fn spill_if_full(&mut self) -> Result<()> {
        if self.engine.should_spill() {
            self.spill().await?;
        }
        Ok(())
    }

    async fn spill(&mut self) -> Result<()> {
        if self.engine.readable().is_empty() {
            return Ok(());
        }
        self.wtr.write_all(self.engine.readable()).await?;
        self.engine.clear();
        Ok(())
    }
}
