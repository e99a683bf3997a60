/*!
The `delimit` crate provides streaming, dialect-aware CSV reading and
writing.

It speaks RFC 4180 plus the two dialects seen most often in the wild — a
bare escape character, and no escaping at all — and is built for messy real
data: quoting violations are salvaged and reported instead of aborting the
parse, delimiters can be auto-detected from a sample, fields can be trimmed
inside or outside quotes, and the write side can neutralize spreadsheet
formula injection.

# Reading

[`Reader`] is a single-pass row cursor. After each successful
[`Reader::read`], fields are available by index or, once a header has been
captured, by name:

```
use delimit::Reader;

let data = "\
city,country,pop
Boston,United States,4628910
";
let mut rdr = Reader::from_reader(data.as_bytes()).unwrap();
rdr.read_header().unwrap();
while rdr.read().unwrap() {
    let city = rdr.field_by_name("city").unwrap();
    assert_eq!(city, "Boston");
    let pop: u64 = rdr.field_as(2).unwrap();
    assert_eq!(pop, 4628910);
}
```

The [`Reader::records`] iterator yields owned [`Record`]s and consumes a
configured header row automatically:

```
use delimit::{ReaderBuilder, Record};

let data = "h1,h2\na,b\n";
let mut rdr = ReaderBuilder::new()
    .has_header(true)
    .from_reader(data.as_bytes())
    .unwrap();
let rows: Vec<Record> = rdr.records().collect::<Result<_, _>>().unwrap();
assert_eq!(rows[0], vec!["a", "b"]);
```

Anomalies are routed through hooks configured on [`ReaderBuilder`]: bad
quoting to `on_bad_data`, out-of-range lookups to `on_missing_field`,
column-count changes to `on_read_error`. Without a hook each raises its
typed [`ErrorKind`].

# Writing

[`Writer`] mirrors the reader: the same dialect settings govern encoding,
so what is written parses back identically.

```
use delimit::Writer;

let mut wtr = Writer::from_writer(vec![]).unwrap();
wtr.write_record(["a,b", "c\"d", "e\nf"]).unwrap();
let data = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
assert_eq!(data, "\"a,b\",\"c\"\"d\",\"e\nf\"\n");
```

# Async

With the `async` feature, [`AsyncReader`] and [`AsyncWriter`] drive the
same parser and encoder over `tokio` I/O; only the buffer refill and spill
suspend.
*/

#![deny(missing_docs)]

pub use delimit_core::{Dialect, Encoding, InjectionGuard, Mode, Terminator, Trim};

pub use crate::config::{
    BadDataContext, BadDataHook, DelimiterDetectorHook, DynamicColumnNameHook,
    HeaderValidatedHook, MissingFieldContext, MissingFieldHook, PrepareHeaderHook,
    ReadErrorHook, SkipRecordHook,
};
pub use crate::convert::{FromField, ToField, ValueKind};
pub use crate::error::{Error, ErrorKind, IntoInnerError, Position, Result};
pub use crate::reader::{IntoRecords, Reader, ReaderBuilder, Records};
pub use crate::record::{Record, RecordIter};
pub use crate::writer::{ShouldQuoteHook, Writer, WriterBuilder};

#[cfg(feature = "async")]
pub use crate::aio::{AsyncReader, AsyncWriter};

#[cfg(feature = "async")]
mod aio;
mod cache;
mod config;
mod convert;
mod error;
mod reader;
mod record;
mod writer;
