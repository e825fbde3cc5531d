use std::fmt;
use std::io;

use crate::layout::Field;


// The set of fatal compilation errors. All of these abort the
// pipeline; nothing is retried or silently dropped.
#[derive(Debug)]
pub enum Error {
    // The source text did not parse.
    Parse { message: String, at: Option<usize> },
    // A statement the engine's data model cannot express.
    UnsupportedConstruct { what: String, at: Option<usize> },
    // A condition shape outside the supported predicate forms.
    UnsupportedCondition { what: String, at: Option<usize> },
    // Two state declarations claimed the same state number.
    DuplicateStateNumber { name: String, number: u32 },
    // A name is declared as both a state and an input, or twice.
    NameCollision { name: String },
    // A jump survived resolution. This is a compiler bug, not a
    // problem with the source program.
    UnresolvedJump { index: usize },
    // A packed field exceeds its declared width. The observed
    // maximum is reported so the layout can be widened.
    FieldOverflow { field: Field, observed: u32, limit: u32 },
    Io { path: String, cause: io::Error },
}


pub type Result<T> = core::result::Result<T, Error>;


impl Error {
    pub fn unsupported(what: String, at: usize) -> Error {
        Error::UnsupportedConstruct { what, at: Some(at) }
    }

    pub fn condition(what: String, at: usize) -> Error {
        Error::UnsupportedCondition { what, at: Some(at) }
    }

    // Byte offset of the offending source construct, when one is
    // derivable from the AST.
    pub fn position(&self) -> Option<usize> {
        match self {
            Error::Parse { at, .. } => *at,
            Error::UnsupportedConstruct { at, .. } => *at,
            Error::UnsupportedCondition { at, .. } => *at,
            _ => None,
        }
    }
}


impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse { message, .. } =>
                write!(f, "parse error: {}", message),
            Error::UnsupportedConstruct { what, .. } =>
                write!(f, "unsupported construct: {}", what),
            Error::UnsupportedCondition { what, .. } =>
                write!(f, "unsupported condition: {}", what),
            Error::DuplicateStateNumber { name, number } =>
                write!(f, "state `{}` reuses state number {}", name, number),
            Error::NameCollision { name } =>
                write!(f, "`{}` is declared more than once", name),
            Error::UnresolvedJump { index } =>
                write!(f, "internal error: unresolved jump at address {}", index),
            Error::FieldOverflow { field, observed, limit } =>
                write!(
                    f,
                    "field {} needs value {} but its width only allows {}; \
                     widen the layout",
                    field, observed, limit
                ),
            Error::Io { path, cause } =>
                write!(f, "{}: {}", path, cause),
        }
    }
}
