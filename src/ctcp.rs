//! CTCP ACTION framing.
//!
//! Emote messages travel inside a PRIVMSG trailing parameter wrapped in
//! `\x01` markers: `\x01ACTION waves\x01`. Only the ACTION form matters
//! to the engine; other CTCP queries pass through as ordinary text.

const CTCP_DELIM: char = '\u{1}';

/// Unwrap a CTCP ACTION payload, returning the emote text.
///
/// A missing closing delimiter is tolerated; several clients omit it.
pub fn unwrap_action(trailing: &str) -> Option<&str> {
    let inner = trailing.strip_prefix(CTCP_DELIM)?;
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    inner.strip_prefix("ACTION ")
}

/// Wrap emote text for transmission inside a PRIVMSG.
pub fn wrap_action(text: &str) -> String {
    format!("\u{1}ACTION {}\u{1}", text)
}
