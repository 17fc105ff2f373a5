//! User-input dispatch: slash commands to wire lines.
//!
//! [`dispatch`] is pure; the engine executes the returned [`Action`]
//! (enqueue lines, emit the local echo, trigger disconnect, or surface
//! a usage hint).

/// Reason attached to the QUIT sent by `/quit`.
pub const DEFAULT_QUIT_REASON: &str = "Client exiting";

/// What the engine should do with one line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a protocol line as-is (terminator added by the codec).
    Send(String),
    /// Send a PRIVMSG and emit a local echo; the server does not echo
    /// our own PRIVMSG back to us.
    SendWithEcho {
        line: String,
        target: String,
        text: String,
    },
    /// Send QUIT, then tear the connection down locally.
    Quit { line: String },
    /// Input was malformed; surface a usage hint instead of sending.
    Usage(&'static str),
}

/// Parse one line of user input into an [`Action`].
///
/// Slash commands match case-insensitively. An unrecognized `/word` is
/// forwarded verbatim as a protocol command, which keeps newer IRC
/// commands usable without a client update; input without a leading
/// slash is sent as a raw line (console-context behavior).
pub fn dispatch(input: &str) -> Option<Action> {
    if input.is_empty() {
        return None;
    }
    let Some(body) = input.strip_prefix('/') else {
        return Some(Action::Send(input.to_string()));
    };
    if body.is_empty() {
        return None;
    }

    let (cmd, rest) = match body.find(' ') {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => (body, ""),
    };

    match cmd.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Some(Action::Quit {
            line: format!("QUIT :{}", DEFAULT_QUIT_REASON),
        }),
        "raw" => {
            if rest.is_empty() {
                Some(Action::Usage("/raw <line>"))
            } else {
                Some(Action::Send(rest.to_string()))
            }
        }
        "msg" | "privmsg" => match rest.find(' ') {
            Some(idx) => {
                let target = &rest[..idx];
                let text = &rest[idx + 1..];
                Some(Action::SendWithEcho {
                    line: format!("PRIVMSG {} :{}", target, text),
                    target: target.to_string(),
                    text: text.to_string(),
                })
            }
            None => Some(Action::Usage("/msg <target> <message>")),
        },
        "join" | "j" => {
            if rest.is_empty() {
                Some(Action::Usage("/join <#channel>"))
            } else {
                Some(Action::Send(format!("JOIN {}", rest)))
            }
        }
        "part" | "leave" => {
            if rest.is_empty() {
                Some(Action::Usage("/part <#channel> [reason]"))
            } else {
                Some(Action::Send(format!("PART {}", rest)))
            }
        }
        "nick" => {
            if rest.is_empty() {
                Some(Action::Usage("/nick <newnick>"))
            } else {
                // No local echo: the server's own NICK broadcast comes
                // back to us and drives the rename.
                Some(Action::Send(format!("NICK {}", rest)))
            }
        }
        "me" => Some(Action::Usage("/me is used in channel tabs")),
        // Forward-compatible: any other /command goes out verbatim.
        _ => Some(Action::Send(body.to_string())),
    }
}
