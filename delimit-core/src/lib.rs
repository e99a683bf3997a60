/*!
`delimit-core` provides the dialect-aware parsing and encoding primitives
underneath the [`delimit`](https://docs.rs/delimit) crate.

The centerpiece is [`Parser`], a streaming, character-oriented CSV parser
driven as a pull loop: feed it decoded text with [`Parser::fill`], ask for
rows with [`Parser::read_row`], and refill whenever it reports
[`ReadRowResult::InputNeeded`]. Because every piece of match state lives on
the parser, the input can be cut anywhere — mid-field, mid-delimiter, even
between a `\r` and its `\n` — and parsing resumes exactly where it stopped.
That is what lets the `delimit` crate drive one state machine from both a
blocking and an asynchronous reader.

The write side lives in [`encode_field`] and [`needs_quotes`], which apply
the same dialect rules in reverse, and [`sanitize`], which neutralizes
spreadsheet formula injection before encoding.

# Example: reading rows

```
use delimit_core::{Dialect, Parser, ReadRowResult};

let mut parser = Parser::new(Dialect::default()).unwrap();
parser.fill("city,pop\n\"Provo, UT\",117335\n").unwrap();
parser.finish();

let mut rows = 0;
while parser.read_row().unwrap() == ReadRowResult::Row {
    rows += 1;
}
assert_eq!(rows, 2);
```

# Example: encoding a field

```
use delimit_core::{encode_field, Dialect};

let mut out = String::new();
encode_field(&mut out, "Provo, UT", &Dialect::default(), None);
assert_eq!(out, "\"Provo, UT\"");
```
*/

#![deny(missing_docs)]

pub use crate::dialect::{
    Dialect, Encoding, Error, InjectionGuard, Mode, Terminator, Trim,
};
pub use crate::detect::detect_delimiter;
pub use crate::encode::{encode_field, needs_quotes};
pub use crate::inject::{sanitize, InjectionError, Sanitized};
pub use crate::parser::{Parser, ReadRowResult};

mod decode;
mod detect;
mod dialect;
mod encode;
mod inject;
mod parser;
