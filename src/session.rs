//! Session state derived from the server's message stream.
//!
//! The state lives on the I/O task and is mutated only there; consumers
//! observe it through the [`Event`]s produced by [`SessionState::apply`].
//! The shape follows the sans-IO rule: consume a parsed message, mutate
//! local state, hand back a value for the caller to deliver.

use std::collections::{HashMap, HashSet};

use crate::casemap::irc_to_lower;
use crate::chan::{normalize_target, ChannelExt};
use crate::ctcp;
use crate::event::{Event, UserInfo};
use crate::message::{extract_nick, ParsedLine};

/// Membership of one channel.
///
/// Keyed externally by the casefolded channel name; `name` keeps the
/// case the channel was first seen in.
#[derive(Debug, Default)]
struct Roster {
    name: String,
    members: HashSet<String>,
    /// NAMES replies accumulate here until 366 swaps them in. Multiple
    /// 353 batches for one channel are a union, not a replacement.
    pending_names: Option<HashSet<String>>,
}

/// Derived connection state: channel rosters and in-flight WHOIS
/// aggregation. Nick comparisons are literal; channel identity uses
/// RFC 1459 casefolding.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    rosters: HashMap<String, Roster>,
    whois: HashMap<String, UserInfo>,
}

impl SessionState {
    /// Interpret one parsed server line, updating rosters and WHOIS
    /// accumulators. Returns the event to surface, or `None` for lines
    /// that are suppressed (005, 331) or carry nothing to report.
    pub(crate) fn apply(&mut self, msg: &ParsedLine<'_>, current_nick: &str) -> Option<Event> {
        match msg.command {
            "PRIVMSG" => self.on_privmsg(msg),
            "NOTICE" => self.on_notice(msg),
            "JOIN" => self.on_join(msg, current_nick),
            "PART" => self.on_part(msg, current_nick),
            "QUIT" => self.on_quit(msg),
            "KICK" => self.on_kick(msg),
            "NICK" => self.on_nick(msg, current_nick),
            "TOPIC" => self.on_topic(msg),
            "332" => self.on_topic_reply(msg),
            "353" => self.on_names_reply(msg),
            "366" => self.on_end_of_names(msg),
            "433" => Some(Event::NicknameInUse {
                nick: msg.param(1).unwrap_or_default().to_string(),
                text: msg
                    .trailing
                    .unwrap_or("Nickname is already in use")
                    .to_string(),
            }),
            "001" | "002" | "003" | "004" => Some(Event::Welcome {
                text: msg.trailing.unwrap_or("").to_string(),
                registered: msg.command == "001",
            }),
            "372" | "375" | "376" => Some(Event::Motd(msg.trailing.unwrap_or("").to_string())),
            "311" | "312" | "313" | "317" | "319" | "301" | "330" => self.on_whois_field(msg),
            "318" => self.on_whois_end(msg),
            // Server feature advertisement and "no topic set" are noise.
            "005" | "331" => None,
            _ => Some(Event::Unhandled(msg.raw.to_string())),
        }
    }

    fn roster_mut(&mut self, channel: &str) -> &mut Roster {
        self.rosters
            .entry(irc_to_lower(channel))
            .or_insert_with(|| Roster {
                name: channel.to_string(),
                ..Roster::default()
            })
    }

    fn on_privmsg(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let target = normalize_target(msg.param(0)?);
        let nick = extract_nick(msg.prefix.unwrap_or("")).to_string();
        let text = msg.trailing.unwrap_or("");

        if target.is_channel_name() {
            let channel = target.to_string();
            match ctcp::unwrap_action(text) {
                Some(action) => Some(Event::ActionMessage {
                    channel,
                    nick,
                    text: action.to_string(),
                }),
                None => Some(Event::ChatMessage {
                    channel,
                    nick,
                    text: text.to_string(),
                }),
            }
        } else {
            Some(Event::PrivateMessage {
                nick,
                text: text.to_string(),
            })
        }
    }

    fn on_notice(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let target = normalize_target(msg.param(0)?);
        let nick = extract_nick(msg.prefix.unwrap_or("")).to_string();
        let text = msg.trailing.unwrap_or("").to_string();
        let channel = target
            .is_channel_name()
            .then(|| target.to_string());
        Some(Event::Notice {
            channel,
            nick,
            text,
        })
    }

    fn on_join(&mut self, msg: &ParsedLine<'_>, current_nick: &str) -> Option<Event> {
        let nick = extract_nick(msg.prefix.unwrap_or("")).to_string();
        // Some servers put the channel in the trailing parameter.
        let channel = normalize_target(msg.trailing.or_else(|| msg.param(0))?).to_string();

        self.roster_mut(&channel).members.insert(nick.clone());
        let is_self = nick == current_nick;
        Some(Event::Join {
            channel,
            nick,
            is_self,
        })
    }

    fn on_part(&mut self, msg: &ParsedLine<'_>, current_nick: &str) -> Option<Event> {
        let channel = normalize_target(msg.param(0)?).to_string();
        let nick = extract_nick(msg.prefix.unwrap_or("")).to_string();
        let reason = msg.trailing.map(str::to_string);

        let key = irc_to_lower(&channel);
        if nick == current_nick {
            self.rosters.remove(&key);
        } else if let Some(roster) = self.rosters.get_mut(&key) {
            roster.members.remove(&nick);
        }
        Some(Event::Part {
            channel,
            nick,
            reason,
        })
    }

    fn on_quit(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let nick = extract_nick(msg.prefix.unwrap_or("")).to_string();
        let reason = msg.trailing.unwrap_or("Quit").to_string();

        let mut channels: Vec<String> = Vec::new();
        for roster in self.rosters.values_mut() {
            if roster.members.remove(&nick) {
                channels.push(roster.name.clone());
            }
        }
        channels.sort();
        Some(Event::Quit {
            nick,
            reason,
            channels,
        })
    }

    fn on_kick(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let channel = normalize_target(msg.param(0)?).to_string();
        let kicked = msg.param(1)?.to_string();
        let kicker = extract_nick(msg.prefix.unwrap_or("")).to_string();
        let reason = msg.trailing.unwrap_or(&kicked).to_string();

        if let Some(roster) = self.rosters.get_mut(&irc_to_lower(&channel)) {
            roster.members.remove(&kicked);
        }
        Some(Event::Kick {
            channel,
            kicked,
            kicker,
            reason,
        })
    }

    fn on_nick(&mut self, msg: &ParsedLine<'_>, current_nick: &str) -> Option<Event> {
        let old = extract_nick(msg.prefix.unwrap_or("")).to_string();
        let new = normalize_target(msg.trailing.or_else(|| msg.param(0))?).to_string();
        if new.is_empty() {
            return None;
        }

        for roster in self.rosters.values_mut() {
            if roster.members.remove(&old) {
                roster.members.insert(new.clone());
            }
        }
        let is_self = old == current_nick;
        Some(Event::NickChange { old, new, is_self })
    }

    fn on_topic(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let channel = normalize_target(msg.param(0)?).to_string();
        let set_by = extract_nick(msg.prefix.unwrap_or("")).to_string();
        Some(Event::TopicChanged {
            channel,
            topic: msg.trailing.unwrap_or("").to_string(),
            set_by,
        })
    }

    fn on_topic_reply(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let channel = normalize_target(msg.param(1)?).to_string();
        Some(Event::TopicReply {
            channel,
            topic: msg.trailing.unwrap_or("").to_string(),
        })
    }

    fn on_names_reply(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let channel = normalize_target(msg.param(2)?).to_string();
        let trailing = msg.trailing.unwrap_or("");

        let roster = self.roster_mut(&channel);
        let pending = roster.pending_names.get_or_insert_with(HashSet::new);
        let mut nicks = Vec::new();
        for token in trailing.split_whitespace() {
            let nick = token.trim_start_matches(['@', '+', '%', '~', '&']);
            if !nick.is_empty() {
                pending.insert(nick.to_string());
                nicks.push(nick.to_string());
            }
        }
        Some(Event::NamesReply { channel, nicks })
    }

    fn on_end_of_names(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let channel = normalize_target(msg.param(1)?).to_string();
        let roster = self.roster_mut(&channel);
        if let Some(pending) = roster.pending_names.take() {
            roster.members = pending;
        }
        let mut members: Vec<String> = roster.members.iter().cloned().collect();
        members.sort();
        Some(Event::EndOfNames { channel, members })
    }

    fn on_whois_field(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let nick = msg.param(1)?.to_string();
        let trailing = msg.trailing.unwrap_or("");

        let info = match msg.command {
            // 311 opens a fresh aggregate: a new WHOIS restarts any
            // stale or completed accumulation for the same nick.
            "311" => {
                let mut user = UserInfo::new(&nick);
                user.username = msg.param(2).unwrap_or_default().to_string();
                user.hostname = msg.param(3).unwrap_or_default().to_string();
                user.realname = trailing.to_string();
                let line = format!(
                    "{} is {}@{} ({})",
                    nick, user.username, user.hostname, user.realname
                );
                self.whois.insert(nick.clone(), user);
                line
            }
            "312" => {
                let user = self.whois_entry(&nick);
                user.server = msg.param(2).unwrap_or_default().to_string();
                user.server_info = trailing.to_string();
                format!("{} using {} ({})", nick, user.server, user.server_info)
            }
            "313" => {
                let user = self.whois_entry(&nick);
                user.is_operator = true;
                user.operator_info = trailing.to_string();
                format!(
                    "{} {}",
                    nick,
                    if trailing.is_empty() {
                        "is an IRC operator"
                    } else {
                        trailing
                    }
                )
            }
            "317" => {
                let idle = msg.param(2).and_then(|v| v.parse().ok()).unwrap_or(0);
                let signon = msg.param(3).and_then(|v| v.parse().ok()).unwrap_or(0);
                let user = self.whois_entry(&nick);
                user.idle_secs = idle;
                user.signon_time = signon;
                format!("{} has been idle {}s", nick, idle)
            }
            "319" => {
                let channels: Vec<String> = trailing
                    .split_whitespace()
                    .map(|c| c.trim_start_matches(['@', '+', '%', '~', '&']).to_string())
                    .collect();
                let user = self.whois_entry(&nick);
                user.channels = channels;
                format!("{} on {}", nick, trailing)
            }
            "301" => {
                let user = self.whois_entry(&nick);
                user.away_message = trailing.to_string();
                format!("{} is away: {}", nick, trailing)
            }
            "330" => {
                let account = msg.param(2).unwrap_or_default().to_string();
                let label = if trailing.is_empty() {
                    "is logged in as"
                } else {
                    trailing
                };
                let user = self.whois_entry(&nick);
                user.account = account.clone();
                format!("{} {} {}", nick, label, account)
            }
            _ => return None,
        };
        Some(Event::WhoisReply { nick, info })
    }

    fn whois_entry(&mut self, nick: &str) -> &mut UserInfo {
        self.whois
            .entry(nick.to_string())
            .or_insert_with(|| UserInfo::new(nick))
    }

    fn on_whois_end(&mut self, msg: &ParsedLine<'_>) -> Option<Event> {
        let nick = msg.param(1)?;
        let mut info = self
            .whois
            .remove(nick)
            .unwrap_or_else(|| UserInfo::new(nick));
        info.complete = true;
        Some(Event::Whois(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "tester";

    fn apply(state: &mut SessionState, line: &str) -> Option<Event> {
        let msg = ParsedLine::parse(line).unwrap();
        state.apply(&msg, ME)
    }

    fn members(state: &SessionState, channel: &str) -> Vec<String> {
        let mut out: Vec<String> = state.rosters[&irc_to_lower(channel)]
            .members
            .iter()
            .cloned()
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_chat_vs_private_message() {
        let mut state = SessionState::default();
        assert_eq!(
            apply(&mut state, ":bob!u@h PRIVMSG #t :hi all"),
            Some(Event::ChatMessage {
                channel: "#t".to_string(),
                nick: "bob".to_string(),
                text: "hi all".to_string(),
            })
        );
        assert_eq!(
            apply(&mut state, ":bob!u@h PRIVMSG tester :psst"),
            Some(Event::PrivateMessage {
                nick: "bob".to_string(),
                text: "psst".to_string(),
            })
        );
    }

    #[test]
    fn test_ctcp_action_is_not_chat() {
        let mut state = SessionState::default();
        assert_eq!(
            apply(&mut state, ":bob!u@h PRIVMSG #t :\u{1}ACTION waves\u{1}"),
            Some(Event::ActionMessage {
                channel: "#t".to_string(),
                nick: "bob".to_string(),
                text: "waves".to_string(),
            })
        );
    }

    #[test]
    fn test_notice_target_classification() {
        let mut state = SessionState::default();
        assert_eq!(
            apply(&mut state, ":srv NOTICE #t :channel notice"),
            Some(Event::Notice {
                channel: Some("#t".to_string()),
                nick: "srv".to_string(),
                text: "channel notice".to_string(),
            })
        );
        assert_eq!(
            apply(&mut state, ":srv NOTICE tester :user notice"),
            Some(Event::Notice {
                channel: None,
                nick: "srv".to_string(),
                text: "user notice".to_string(),
            })
        );
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut state = SessionState::default();
        apply(&mut state, ":alice!u@h JOIN #t");
        apply(&mut state, ":alice!u@h JOIN #t");
        assert_eq!(members(&state, "#t"), vec!["alice"]);
    }

    #[test]
    fn test_self_join_flag_and_trailing_channel() {
        let mut state = SessionState::default();
        assert_eq!(
            apply(&mut state, ":tester!u@h JOIN :#t"),
            Some(Event::Join {
                channel: "#t".to_string(),
                nick: "tester".to_string(),
                is_self: true,
            })
        );
        assert_eq!(members(&state, "#t"), vec!["tester"]);
    }

    #[test]
    fn test_part_removes_member() {
        let mut state = SessionState::default();
        apply(&mut state, ":alice!u@h JOIN #t");
        apply(&mut state, ":bob!u@h JOIN #t");
        assert_eq!(
            apply(&mut state, ":alice!u@h PART #t :gone"),
            Some(Event::Part {
                channel: "#t".to_string(),
                nick: "alice".to_string(),
                reason: Some("gone".to_string()),
            })
        );
        assert_eq!(members(&state, "#t"), vec!["bob"]);
    }

    #[test]
    fn test_self_part_drops_roster() {
        let mut state = SessionState::default();
        apply(&mut state, ":tester!u@h JOIN #t");
        apply(&mut state, ":tester!u@h PART #t");
        assert!(state.rosters.is_empty());
    }

    #[test]
    fn test_quit_removes_from_every_roster() {
        let mut state = SessionState::default();
        apply(&mut state, ":alice!u@h JOIN #a");
        apply(&mut state, ":alice!u@h JOIN #b");
        apply(&mut state, ":bob!u@h JOIN #b");

        assert_eq!(
            apply(&mut state, ":alice!u@h QUIT :bye"),
            Some(Event::Quit {
                nick: "alice".to_string(),
                reason: "bye".to_string(),
                channels: vec!["#a".to_string(), "#b".to_string()],
            })
        );
        assert_eq!(members(&state, "#b"), vec!["bob"]);
    }

    #[test]
    fn test_quit_default_reason() {
        let mut state = SessionState::default();
        match apply(&mut state, ":alice!u@h QUIT") {
            Some(Event::Quit { reason, .. }) => assert_eq!(reason, "Quit"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_kick_fallback_reason_is_kicked_nick() {
        let mut state = SessionState::default();
        apply(&mut state, ":bob!u@h JOIN #t");
        assert_eq!(
            apply(&mut state, ":op!u@h KICK #t bob"),
            Some(Event::Kick {
                channel: "#t".to_string(),
                kicked: "bob".to_string(),
                kicker: "op".to_string(),
                reason: "bob".to_string(),
            })
        );
        assert!(members(&state, "#t").is_empty());
    }

    #[test]
    fn test_nick_rename_touches_all_rosters() {
        let mut state = SessionState::default();
        apply(&mut state, ":alice!u@h JOIN #a");
        apply(&mut state, ":alice!u@h JOIN #b");
        apply(&mut state, ":bob!u@h JOIN #b");

        assert_eq!(
            apply(&mut state, ":alice!u@h NICK :alicia"),
            Some(Event::NickChange {
                old: "alice".to_string(),
                new: "alicia".to_string(),
                is_self: false,
            })
        );
        assert_eq!(members(&state, "#a"), vec!["alicia"]);
        assert_eq!(members(&state, "#b"), vec!["alicia", "bob"]);
    }

    #[test]
    fn test_self_nick_change() {
        let mut state = SessionState::default();
        match apply(&mut state, ":tester!u@h NICK newname") {
            Some(Event::NickChange { is_self, new, .. }) => {
                assert!(is_self);
                assert_eq!(new, "newname");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_names_accumulate_until_end() {
        let mut state = SessionState::default();
        apply(&mut state, ":srv 353 tester = #t :@alice bob");
        apply(&mut state, ":srv 353 tester = #t :+carol");

        // Accumulation must not touch the live roster until 366.
        assert!(members(&state, "#t").is_empty());

        assert_eq!(
            apply(&mut state, ":srv 366 tester #t :End of /NAMES list"),
            Some(Event::EndOfNames {
                channel: "#t".to_string(),
                members: vec![
                    "alice".to_string(),
                    "bob".to_string(),
                    "carol".to_string(),
                ],
            })
        );
        assert_eq!(members(&state, "#t"), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_names_replace_previous_roster_at_end() {
        let mut state = SessionState::default();
        apply(&mut state, ":stale!u@h JOIN #t");
        apply(&mut state, ":srv 353 tester = #t :fresh");
        apply(&mut state, ":srv 366 tester #t :End");
        assert_eq!(members(&state, "#t"), vec!["fresh"]);
    }

    #[test]
    fn test_channel_identity_is_casefolded() {
        let mut state = SessionState::default();
        apply(&mut state, ":alice!u@h JOIN #Test");
        apply(&mut state, ":alice!u@h PART #test");
        assert!(members(&state, "#TEST").is_empty());
    }

    #[test]
    fn test_topic_events() {
        let mut state = SessionState::default();
        assert_eq!(
            apply(&mut state, ":alice!u@h TOPIC #t :new topic"),
            Some(Event::TopicChanged {
                channel: "#t".to_string(),
                topic: "new topic".to_string(),
                set_by: "alice".to_string(),
            })
        );
        assert_eq!(
            apply(&mut state, ":srv 332 tester #t :standing topic"),
            Some(Event::TopicReply {
                channel: "#t".to_string(),
                topic: "standing topic".to_string(),
            })
        );
    }

    #[test]
    fn test_welcome_and_motd() {
        let mut state = SessionState::default();
        assert_eq!(
            apply(&mut state, ":srv 001 tester :Welcome to the network"),
            Some(Event::Welcome {
                text: "Welcome to the network".to_string(),
                registered: true,
            })
        );
        assert_eq!(
            apply(&mut state, ":srv 002 tester :Your host is srv"),
            Some(Event::Welcome {
                text: "Your host is srv".to_string(),
                registered: false,
            })
        );
        assert_eq!(
            apply(&mut state, ":srv 372 tester :- enjoy your stay"),
            Some(Event::Motd("- enjoy your stay".to_string()))
        );
    }

    #[test]
    fn test_nickname_in_use_is_recoverable() {
        let mut state = SessionState::default();
        assert_eq!(
            apply(&mut state, ":srv 433 * taken :Nickname is already in use"),
            Some(Event::NicknameInUse {
                nick: "taken".to_string(),
                text: "Nickname is already in use".to_string(),
            })
        );
    }

    #[test]
    fn test_suppressed_numerics() {
        let mut state = SessionState::default();
        assert_eq!(
            apply(&mut state, ":srv 005 tester CHANTYPES=# :are supported"),
            None
        );
        assert_eq!(apply(&mut state, ":srv 331 tester #t :No topic"), None);
    }

    #[test]
    fn test_unknown_command_is_forwarded_verbatim() {
        let mut state = SessionState::default();
        let raw = ":srv 252 tester 3 :operator(s) online";
        assert_eq!(
            apply(&mut state, raw),
            Some(Event::Unhandled(raw.to_string()))
        );
    }

    #[test]
    fn test_whois_aggregation() {
        let mut state = SessionState::default();
        apply(
            &mut state,
            ":srv 311 tester alice ident example.org * :Alice Liddell",
        );
        apply(&mut state, ":srv 312 tester alice irc.example.org :Main hub");
        apply(&mut state, ":srv 317 tester alice 42 1700000000 :seconds idle");
        apply(&mut state, ":srv 319 tester alice :@#wonder +#land");
        apply(&mut state, ":srv 330 tester alice alice_acct :is logged in as");
        apply(&mut state, ":srv 301 tester alice :tea break");

        match apply(&mut state, ":srv 318 tester alice :End of /WHOIS list") {
            Some(Event::Whois(info)) => {
                assert!(info.complete);
                assert_eq!(info.nick, "alice");
                assert_eq!(info.username, "ident");
                assert_eq!(info.hostname, "example.org");
                assert_eq!(info.realname, "Alice Liddell");
                assert_eq!(info.server, "irc.example.org");
                assert_eq!(info.idle_secs, 42);
                assert_eq!(info.signon_time, 1_700_000_000);
                assert_eq!(info.channels, vec!["#wonder", "#land"]);
                assert_eq!(info.account, "alice_acct");
                assert_eq!(info.away_message, "tea break");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // The accumulator is consumed by 318.
        assert!(state.whois.is_empty());
    }

    #[test]
    fn test_concurrent_whois_do_not_collide() {
        let mut state = SessionState::default();
        apply(&mut state, ":srv 311 tester alice a hostA * :A");
        apply(&mut state, ":srv 311 tester bob b hostB * :B");
        apply(&mut state, ":srv 312 tester alice srvA :hub A");

        match apply(&mut state, ":srv 318 tester bob :End") {
            Some(Event::Whois(info)) => {
                assert_eq!(info.nick, "bob");
                assert_eq!(info.hostname, "hostB");
                assert!(info.server.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match apply(&mut state, ":srv 318 tester alice :End") {
            Some(Event::Whois(info)) => {
                assert_eq!(info.server, "srvA");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_whois_restart_on_new_query() {
        let mut state = SessionState::default();
        apply(&mut state, ":srv 311 tester alice a hostA * :A");
        apply(&mut state, ":srv 312 tester alice srvA :hub A");
        // A second WHOIS for the same nick starts over.
        apply(&mut state, ":srv 311 tester alice a hostA * :A");
        match apply(&mut state, ":srv 318 tester alice :End") {
            Some(Event::Whois(info)) => assert!(info.server.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
