// Thin wrapper around the generated grammar: turn lalrpop's parse
// errors into our error type, keeping the byte offset for the CLI's
// line/column report.

use lalrpop_util::ParseError;

use crate::ast::Program;
use crate::error::{Error, Result};
use crate::grammar;


pub fn parse(source: &str) -> Result<Program> {
    grammar::ProgramParser::new().parse(source).map_err(describe)
}


fn describe(
    error: ParseError<usize, lalrpop_util::lexer::Token<'_>, &'static str>,
) -> Error {
    let (message, at) = match error {
        ParseError::InvalidToken { location } =>
            (String::from("invalid token"), Some(location)),
        ParseError::UnrecognizedEOF { location, .. } =>
            (String::from("unexpected end of input"), Some(location)),
        ParseError::UnrecognizedToken { token: (start, token, _), .. } =>
            (format!("unexpected `{}`", token.1), Some(start)),
        ParseError::ExtraToken { token: (start, token, _) } =>
            (format!("extra `{}` after the program", token.1), Some(start)),
        ParseError::User { error } =>
            (String::from(error), None),
    };
    Error::Parse { message, at }
}
