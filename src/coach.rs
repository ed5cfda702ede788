//! The cornerman: a chat coach backed by whatever the host plugs in.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

pub const GREETING: &str =
    "I'm in your corner, kid. What do we need to work on? Defense? Speed? Or just surviving the next round?";
pub const EMPTY_REPLY: &str = "Keep your hands up, kid.";
pub const FALLBACK_REPLY: &str = "I can't hear you over the crowd! (Network Error)";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct WireTurn<'a> {
    role: Role,
    parts: [Part<'a>; 1],
}

/// `[{role, parts:[{text}]}]`, the history shape chat hosts expect.
pub fn history_json(history: &[ChatTurn]) -> String {
    let wire: Vec<WireTurn<'_>> = history
        .iter()
        .map(|t| WireTurn {
            role: t.role,
            parts: [Part { text: &t.text }],
        })
        .collect();
    serde_json::to_string(&wire).unwrap_or_else(|_| "[]".to_string())
}

/// Turn a raw host answer into the reply we show. Never fails.
pub fn settle_reply(raw: Result<Option<String>, String>) -> String {
    match raw {
        Ok(Some(text)) if !text.trim().is_empty() => text,
        Ok(_) => EMPTY_REPLY.to_string(),
        Err(e) => {
            log::error!("cornerman error: {e}");
            FALLBACK_REPLY.to_string()
        }
    }
}

pub type ReplyFuture = Pin<Box<dyn Future<Output = String>>>;

/// Reply source. Implementations resolve to a safe fallback rather than fail.
pub trait Cornerman {
    fn advise(&self, history: &[ChatTurn], message: &str) -> ReplyFuture;
}

/// Conversation so far, seeded with the opening line.
#[derive(Clone, Debug)]
pub struct CornerLog {
    turns: Vec<ChatTurn>,
}

impl Default for CornerLog {
    fn default() -> Self {
        Self {
            turns: vec![ChatTurn {
                role: Role::Model,
                text: GREETING.to_string(),
            }],
        }
    }
}

impl CornerLog {
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Record the user's line and return the history to send with it
    /// (everything before the new line). Blank input is ignored.
    pub fn push_user(&mut self, text: &str) -> Option<Vec<ChatTurn>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let history = self.turns.clone();
        self.turns.push(ChatTurn {
            role: Role::User,
            text: text.to_string(),
        });
        Some(history)
    }

    pub fn push_reply(&mut self, text: String) {
        self.turns.push(ChatTurn { role: Role::Model, text });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_wire_shape() {
        let log = CornerLog::default();
        let json = history_json(log.turns());
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v[0]["role"], "model");
        assert_eq!(v[0]["parts"][0]["text"], GREETING);
    }

    #[test]
    fn replies_never_fail() {
        assert_eq!(settle_reply(Ok(Some("Jab more.".into()))), "Jab more.");
        assert_eq!(settle_reply(Ok(Some("  ".into()))), EMPTY_REPLY);
        assert_eq!(settle_reply(Ok(None)), EMPTY_REPLY);
        assert_eq!(settle_reply(Err("timeout".into())), FALLBACK_REPLY);
    }

    #[test]
    fn user_turn_history_excludes_new_line() {
        let mut log = CornerLog::default();
        assert!(log.push_user("   ").is_none());
        let hist = log.push_user("How do I slip?").unwrap();
        assert_eq!(hist.len(), 1);
        assert_eq!(log.turns().len(), 2);
        log.push_reply("Move your head, kid.".into());
        assert_eq!(log.turns()[2].role, Role::Model);
    }
}
