//! Bounded conversation history used as generation context.
//!
//! History is a FIFO of exchanges, oldest first. An exchange is added when
//! the user's text is accepted and completed when the reply arrives; if
//! generation fails the exchange keeps only the user side. The context given
//! to the generator is always the history *before* the current turn, so the
//! turn in flight is never part of its own context.

use crate::pipeline::messages::TurnId;
use std::collections::VecDeque;

/// Who said a history message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The person talking to Nanna.
    User,
    /// Nanna's reply.
    Assistant,
}

/// One message of generation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    /// Speaker.
    pub role: Role,
    /// Message text.
    pub text: String,
}

/// One user → reply exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Turn that produced this exchange.
    pub turn: TurnId,
    /// What the user said or typed.
    pub user_text: String,
    /// Nanna's reply, absent when generation failed.
    pub reply_text: Option<String>,
}

/// Ordered, bounded log of exchanges.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    capacity: usize,
    exchanges: VecDeque<Exchange>,
}

impl ConversationHistory {
    /// Create an empty history holding at most `capacity` exchanges.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            exchanges: VecDeque::with_capacity(capacity),
        }
    }

    /// Record the user side of `turn`, evicting the oldest exchange on overflow.
    pub fn push_user(&mut self, turn: TurnId, text: &str) {
        if self.exchanges.len() == self.capacity {
            let _ = self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            turn,
            user_text: text.to_owned(),
            reply_text: None,
        });
    }

    /// Record the reply for `turn`. Returns `false` if the turn is not the
    /// newest exchange (it was evicted or cleared meanwhile).
    pub fn push_reply(&mut self, turn: TurnId, text: &str) -> bool {
        match self.exchanges.back_mut() {
            Some(last) if last.turn == turn => {
                last.reply_text = Some(text.to_owned());
                true
            }
            _ => false,
        }
    }

    /// Context messages, oldest first, in the order they were spoken.
    pub fn messages(&self) -> Vec<HistoryMessage> {
        let mut out = Vec::with_capacity(self.exchanges.len() * 2);
        for ex in &self.exchanges {
            out.push(HistoryMessage {
                role: Role::User,
                text: ex.user_text.clone(),
            });
            if let Some(ref reply) = ex.reply_text {
                out.push(HistoryMessage {
                    role: Role::Assistant,
                    text: reply.clone(),
                });
            }
        }
        out
    }

    /// Retained exchanges, oldest first.
    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    /// Number of retained exchanges.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether no exchange is retained.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Maximum number of exchanges.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.exchanges.clear();
    }
}
