//! # ircflow
//!
//! An asynchronous IRC client engine. One engine owns one TCP
//! connection: it frames and parses the line-oriented IRC protocol,
//! maintains derived session state (current nick, per-channel rosters,
//! WHOIS aggregation), answers protocol keepalive, reconnects with
//! exponential backoff, and delivers a typed event stream to the
//! consumer over a channel.
//!
//! Rendering, window management, and preference storage are consumer
//! concerns; the engine is the protocol core only. TLS, SASL, and
//! IRCv3 capability negotiation are out of scope.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ircflow::{Event, IrcEngine, ReconnectPolicy};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (engine, mut events) = IrcEngine::new(ReconnectPolicy::default());
//! engine.connect("irc.libera.chat", 6667, "flowbot", None).await;
//! engine.handle_user_input("/join #rust").await;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         Event::ChatMessage { channel, nick, text } => {
//!             println!("[{}] <{}> {}", channel, nick, text);
//!         }
//!         Event::Disconnected => break,
//!         _ => {}
//!     }
//! }
//! # }
//! ```
//!
//! ## Parsing
//!
//! The protocol parser is usable on its own:
//!
//! ```
//! use ircflow::ParsedLine;
//!
//! let msg = ParsedLine::parse(":nick!u@h PRIVMSG #rust :hello").unwrap();
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.params, vec!["#rust"]);
//! assert_eq!(msg.trailing, Some("hello"));
//! ```

#![deny(clippy::all)]

pub mod casemap;
pub mod chan;
pub mod command;
pub mod ctcp;
pub mod engine;
pub mod error;
pub mod event;
pub mod line;
pub mod message;
pub mod reconnect;
mod session;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::chan::{normalize_target, ChannelExt};
pub use self::command::{dispatch, Action, DEFAULT_QUIT_REASON};
pub use self::engine::{IrcEngine, Phase};
pub use self::error::{EngineError, MessageParseError};
pub use self::event::{Event, UserInfo};
pub use self::line::LineCodec;
pub use self::message::{extract_nick, ParsedLine};
pub use self::reconnect::{backoff_delay, ReconnectPolicy};
