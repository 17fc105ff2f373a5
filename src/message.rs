//! IRC protocol line parser.
//!
//! Splits one raw line into its structural parts: an optional `:`-led
//! prefix, the command token, the space-delimited positional parameters,
//! and the optional trailing parameter introduced by `" :"` (which may
//! itself contain spaces and is never split further).
//!
//! Parsing is zero-copy: [`ParsedLine`] borrows from the input line.

use nom::bytes::complete::take_while1;
use nom::character::complete::{char, space0};
use nom::combinator::opt;
use nom::sequence::preceded;
use nom::IResult;

use crate::error::MessageParseError;

/// A parsed IRC line with borrowed string slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    /// Origin prefix (without the leading `:`), if present.
    pub prefix: Option<&'a str>,
    /// The command token; numerics arrive as their three-digit string.
    pub command: &'a str,
    /// Positional parameters, not including the trailing parameter.
    pub params: Vec<&'a str>,
    /// Trailing parameter (after `" :"`), if present.
    pub trailing: Option<&'a str>,
    /// The line as received, terminator stripped.
    pub raw: &'a str,
}

/// Prefix: the part after `:` and before the first space.
fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

/// Optional prefix followed by the command token.
fn parse_head(input: &str) -> IResult<&str, (Option<&str>, &str)> {
    let (input, prefix) = opt(parse_prefix)(input)?;
    let (input, _) = space0(input)?;
    let (input, command) = take_while1(|c| c != ' ')(input)?;
    Ok((input, (prefix, command)))
}

impl<'a> ParsedLine<'a> {
    /// Parse a raw IRC line.
    ///
    /// Returns an error for empty input or input lacking a command
    /// token; it never panics, whatever the server sends.
    pub fn parse(raw: &'a str) -> Result<ParsedLine<'a>, MessageParseError> {
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let (rest, (prefix, command)) =
            parse_head(line).map_err(|_| MessageParseError::InvalidCommand)?;

        let (params_str, trailing) = match rest.find(" :") {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 2..])),
            None => (rest, None),
        };
        let params: Vec<&str> = params_str.split_whitespace().collect();

        Ok(ParsedLine {
            prefix,
            command,
            params,
            trailing,
            raw: line,
        })
    }

    /// Positional parameter by index, if present.
    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).copied()
    }
}

/// Extract the nick from a `nick!user@host` prefix.
///
/// Server prefixes carry no `!` and are returned whole.
pub fn extract_nick(prefix: &str) -> &str {
    match prefix.find('!') {
        Some(idx) => &prefix[..idx],
        None => prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg() {
        let msg = ParsedLine::parse(":nick!u@h PRIVMSG #c :hello world").unwrap();
        assert_eq!(msg.prefix, Some("nick!u@h"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#c"]);
        assert_eq!(msg.trailing, Some("hello world"));
    }

    #[test]
    fn test_parse_ping() {
        let msg = ParsedLine::parse("PING :abc").unwrap();
        assert!(msg.prefix.is_none());
        assert_eq!(msg.command, "PING");
        assert!(msg.params.is_empty());
        assert_eq!(msg.trailing, Some("abc"));
    }

    #[test]
    fn test_parse_bare_command() {
        let msg = ParsedLine::parse("AWAY").unwrap();
        assert_eq!(msg.command, "AWAY");
        assert!(msg.params.is_empty());
        assert!(msg.trailing.is_none());
    }

    #[test]
    fn test_parse_numeric() {
        let msg = ParsedLine::parse(":srv 353 me = #t :@alice bob").unwrap();
        assert_eq!(msg.prefix, Some("srv"));
        assert_eq!(msg.command, "353");
        assert_eq!(msg.params, vec!["me", "=", "#t"]);
        assert_eq!(msg.trailing, Some("@alice bob"));
    }

    #[test]
    fn test_parse_multiple_params_no_trailing() {
        let msg = ParsedLine::parse("MODE #chan +o nick").unwrap();
        assert_eq!(msg.params, vec!["#chan", "+o", "nick"]);
        assert!(msg.trailing.is_none());
    }

    #[test]
    fn test_trailing_keeps_inner_colons() {
        let msg = ParsedLine::parse("PRIVMSG #c :see: this :stays whole").unwrap();
        assert_eq!(msg.trailing, Some("see: this :stays whole"));
    }

    #[test]
    fn test_empty_trailing() {
        let msg = ParsedLine::parse("PRIVMSG #c :").unwrap();
        assert_eq!(msg.params, vec!["#c"]);
        assert_eq!(msg.trailing, Some(""));
    }

    #[test]
    fn test_crlf_stripped() {
        let msg = ParsedLine::parse("PING :srv\r\n").unwrap();
        assert_eq!(msg.raw, "PING :srv");
        assert_eq!(msg.trailing, Some("srv"));
    }

    #[test]
    fn test_malformed_input() {
        assert_eq!(ParsedLine::parse(""), Err(MessageParseError::EmptyMessage));
        assert_eq!(ParsedLine::parse("   "), Err(MessageParseError::EmptyMessage));
        assert_eq!(ParsedLine::parse("\r\n"), Err(MessageParseError::EmptyMessage));
        assert_eq!(
            ParsedLine::parse(":prefix-only "),
            Err(MessageParseError::InvalidCommand)
        );
    }

    #[test]
    fn test_extract_nick() {
        assert_eq!(extract_nick("nick!u@h"), "nick");
        assert_eq!(extract_nick("irc.server.net"), "irc.server.net");
        assert_eq!(extract_nick(""), "");
    }
}
