//! Typed field conversion.
//!
//! These two traits are the seam between the streaming core and any
//! higher-level record mapper: [`FromField`] parses a decoded field into a
//! typed value, and [`ToField`] formats a typed value for the writer while
//! reporting a [`ValueKind`] that a type-aware quoting predicate can
//! consult.

use std::fmt::Write as _;

/// The broad type category of a written field, consulted by `should_quote`
/// predicates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    /// Free-form text.
    Text,
    /// An integer.
    Integer,
    /// A floating-point number.
    Float,
    /// A boolean.
    Boolean,
}

/// A value that can be written as a single field.
pub trait ToField {
    /// The type category reported to quoting predicates.
    fn kind(&self) -> ValueKind;

    /// Append this value's field text to `out`.
    fn format(&self, out: &mut String);
}

impl ToField for str {
    fn kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn format(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl ToField for &str {
    fn kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn format(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl ToField for String {
    fn kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn format(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl ToField for bool {
    fn kind(&self) -> ValueKind {
        ValueKind::Boolean
    }

    fn format(&self, out: &mut String) {
        out.push_str(if *self { "true" } else { "false" });
    }
}

impl ToField for char {
    fn kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn format(&self, out: &mut String) {
        out.push(*self);
    }
}

macro_rules! to_field_int {
    ($($ty:ty),*) => {
        $(
            impl ToField for $ty {
                fn kind(&self) -> ValueKind {
                    ValueKind::Integer
                }

                fn format(&self, out: &mut String) {
                    let mut buf = itoa::Buffer::new();
                    out.push_str(buf.format(*self));
                }
            }
        )*
    };
}

to_field_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! to_field_float {
    ($($ty:ty),*) => {
        $(
            impl ToField for $ty {
                fn kind(&self) -> ValueKind {
                    ValueKind::Float
                }

                fn format(&self, out: &mut String) {
                    if self.is_finite() {
                        let mut buf = ryu::Buffer::new();
                        out.push_str(buf.format(*self));
                    } else {
                        // ryu only handles finite values.
                        let _ = write!(out, "{}", self);
                    }
                }
            }
        )*
    };
}

to_field_float!(f32, f64);

/// A value that can be parsed from a single decoded field.
pub trait FromField: Sized {
    /// Parse `field`, returning a human-readable message on failure.
    fn from_field(field: &str) -> Result<Self, String>;
}

impl FromField for String {
    fn from_field(field: &str) -> Result<String, String> {
        Ok(field.to_string())
    }
}

impl FromField for bool {
    fn from_field(field: &str) -> Result<bool, String> {
        match field {
            "true" | "True" | "TRUE" | "1" => Ok(true),
            "false" | "False" | "FALSE" | "0" => Ok(false),
            other => Err(format!("{:?} is not a boolean", other)),
        }
    }
}

impl FromField for char {
    fn from_field(field: &str) -> Result<char, String> {
        let mut chars = field.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(format!("{:?} is not a single character", field)),
        }
    }
}

macro_rules! from_field_parse {
    ($($ty:ty => $what:expr),* $(,)?) => {
        $(
            impl FromField for $ty {
                fn from_field(field: &str) -> Result<$ty, String> {
                    field
                        .trim()
                        .parse()
                        .map_err(|err| format!("{:?} is not {}: {}", field, $what, err))
                }
            }
        )*
    };
}

from_field_parse! {
    i8 => "an integer", i16 => "an integer", i32 => "an integer",
    i64 => "an integer", i128 => "an integer", isize => "an integer",
    u8 => "an unsigned integer", u16 => "an unsigned integer",
    u32 => "an unsigned integer", u64 => "an unsigned integer",
    u128 => "an unsigned integer", usize => "an unsigned integer",
    f32 => "a number", f64 => "a number",
}

impl<T: FromField> FromField for Option<T> {
    /// An empty field is `None`; anything else must parse as `T`.
    fn from_field(field: &str) -> Result<Option<T>, String> {
        if field.is_empty() {
            Ok(None)
        } else {
            T::from_field(field).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt<T: ToField>(value: T) -> String {
        let mut out = String::new();
        value.format(&mut out);
        out
    }

    #[test]
    fn integers_format_via_itoa() {
        assert_eq!(fmt(42i32), "42");
        assert_eq!(fmt(-7i64), "-7");
        assert_eq!(fmt(0u8), "0");
        assert_eq!(42i32.kind(), ValueKind::Integer);
    }

    #[test]
    fn floats_format_via_ryu() {
        assert_eq!(fmt(2.5f64), "2.5");
        assert_eq!(fmt(f64::INFINITY), "inf");
        assert_eq!((2.5f64).kind(), ValueKind::Float);
    }

    #[test]
    fn text_and_bool() {
        assert_eq!(fmt("hi"), "hi");
        assert_eq!(fmt(true), "true");
        assert_eq!("hi".kind(), ValueKind::Text);
        assert_eq!(true.kind(), ValueKind::Boolean);
    }

    #[test]
    fn parse_primitives() {
        assert_eq!(i64::from_field("42"), Ok(42));
        assert_eq!(f64::from_field(" 2.5 "), Ok(2.5));
        assert_eq!(bool::from_field("TRUE"), Ok(true));
        assert_eq!(char::from_field("x"), Ok('x'));
        assert!(i64::from_field("forty-two").is_err());
    }

    #[test]
    fn optional_fields() {
        assert_eq!(Option::<i32>::from_field(""), Ok(None));
        assert_eq!(Option::<i32>::from_field("3"), Ok(Some(3)));
        assert!(Option::<i32>::from_field("x").is_err());
    }
}
