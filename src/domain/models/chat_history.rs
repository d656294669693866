use serde::{Deserialize, Serialize};

use super::{ChatTurn, Role};

/// Ordered conversation of one session; insertion order is conversation order.
///
/// Alternation of user and assistant turns is a usage convention of the chat
/// loop, not something this type enforces. [`ChatHistory::is_alternating`]
/// only reports whether the convention currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// Every turn, oldest first. Reading has no side effects, so repeated
    /// calls return the same sequence.
    pub fn all(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn is_alternating(&self) -> bool {
        self.turns.iter().enumerate().all(|(i, turn)| {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            turn.role() == expected
        })
    }
}

impl From<Vec<ChatTurn>> for ChatHistory {
    fn from(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }
}
