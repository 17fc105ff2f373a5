//! Typed events delivered to the consumer, and the WHOIS aggregate.

use chrono::{DateTime, TimeZone, Utc};

/// Information about a user, accumulated across WHOIS numeric replies.
///
/// Fields fill in as the numerics arrive (311, 312, 313, 317, 319, 330,
/// 301); `complete` flips when the terminal 318 is seen and the
/// aggregate is emitted as [`Event::Whois`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// The queried nickname.
    pub nick: String,
    /// Ident / username (311).
    pub username: String,
    /// Hostname (311).
    pub hostname: String,
    /// Real name / GECOS (311).
    pub realname: String,
    /// Server the user is attached to (312).
    pub server: String,
    /// Free-text server description (312).
    pub server_info: String,
    /// Channels the user occupies (319), mode sigils stripped.
    pub channels: Vec<String>,
    /// Seconds idle (317).
    pub idle_secs: u64,
    /// Signon time as a Unix timestamp (317), `0` when unreported.
    pub signon_time: i64,
    /// IRC operator status (313).
    pub is_operator: bool,
    /// Operator description text (313).
    pub operator_info: String,
    /// Services account name (330).
    pub account: String,
    /// Away message (301), empty when the user is present.
    pub away_message: String,
    /// True once the terminal end-of-WHOIS reply arrived.
    pub complete: bool,
}

impl UserInfo {
    pub(crate) fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            ..Self::default()
        }
    }

    /// Signon time as a UTC timestamp, when the server reported one.
    pub fn signon(&self) -> Option<DateTime<Utc>> {
        if self.signon_time <= 0 {
            return None;
        }
        Utc.timestamp_opt(self.signon_time, 0).single()
    }
}

/// Events produced by the engine, delivered over the event channel in
/// arrival order. The channel send never blocks the I/O loop.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// Human-readable engine log line (connection lifecycle, usage hints).
    Log(String),
    /// A server line as received, before interpretation. PING/PONG
    /// keepalive traffic is answered internally and not surfaced here.
    RawLine(String),
    /// PRIVMSG to a channel.
    ChatMessage {
        channel: String,
        nick: String,
        text: String,
    },
    /// CTCP ACTION (emote) to a channel.
    ActionMessage {
        channel: String,
        nick: String,
        text: String,
    },
    /// PRIVMSG addressed to us.
    PrivateMessage { nick: String, text: String },
    /// NOTICE; `channel` is `None` when addressed to us.
    Notice {
        channel: Option<String>,
        nick: String,
        text: String,
    },
    /// A user (possibly us) joined a channel.
    Join {
        channel: String,
        nick: String,
        is_self: bool,
    },
    /// A user left a channel.
    Part {
        channel: String,
        nick: String,
        reason: Option<String>,
    },
    /// A user quit the network; `channels` lists the rosters they were
    /// removed from.
    Quit {
        nick: String,
        reason: String,
        channels: Vec<String>,
    },
    /// A user was kicked from a channel.
    Kick {
        channel: String,
        kicked: String,
        kicker: String,
        reason: String,
    },
    /// A nickname changed; rosters have already been renamed in place.
    NickChange {
        old: String,
        new: String,
        is_self: bool,
    },
    /// TOPIC command from a user.
    TopicChanged {
        channel: String,
        topic: String,
        set_by: String,
    },
    /// RPL_TOPIC (332) in response to joining or querying.
    TopicReply { channel: String, topic: String },
    /// One RPL_NAMREPLY (353) batch, mode sigils stripped. Rosters
    /// accumulate across batches until [`Event::EndOfNames`].
    NamesReply { channel: String, nicks: Vec<String> },
    /// RPL_ENDOFNAMES (366): `members` is the complete, sorted roster.
    EndOfNames {
        channel: String,
        members: Vec<String>,
    },
    /// ERR_NICKNAMEINUSE (433). Recoverable; the connection stays open.
    NicknameInUse { nick: String, text: String },
    /// Welcome burst (001-004); `registered` is true for 001 only.
    Welcome { text: String, registered: bool },
    /// MOTD text (372/375/376).
    Motd(String),
    /// One WHOIS field numeric, pre-formatted for display.
    WhoisReply { nick: String, info: String },
    /// The completed WHOIS aggregate (318 received).
    Whois(UserInfo),
    /// Local echo for an outgoing message the server will not repeat
    /// back to us.
    Echo {
        target: String,
        nick: String,
        text: String,
    },
    /// The connection ended; emitted exactly once per connection.
    Disconnected,
    /// Any server line the session does not interpret, verbatim.
    Unhandled(String),
}
