//! Stable anonymized agent tokens.
//!
//! The first time an agent is referenced in logged content it receives the
//! next `"agent N"` token, and it keeps that token for the rest of the run.
//! One manager belongs to one simulation run; it is owned by the run's
//! context rather than shared process-wide, so independent runs in the same
//! process number their agents independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use worldsim_types::AgentId;

/// Prefix of every anonymized token.
const TOKEN_PREFIX: &str = "agent ";

/// Assigns and remembers anonymized agent tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentNumberManager {
    next_number: u64,
    by_agent: BTreeMap<AgentId, String>,
    by_token: BTreeMap<String, AgentId>,
}

/// Content with display names replaced by tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anonymized {
    /// The rewritten content.
    pub content: String,
    /// Token to agent id for every replacement that was made.
    pub mapping: BTreeMap<String, AgentId>,
}

impl Default for AgentNumberManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentNumberManager {
    /// Create an empty manager. The first token handed out is `"agent 1"`.
    pub const fn new() -> Self {
        Self {
            next_number: 1,
            by_agent: BTreeMap::new(),
            by_token: BTreeMap::new(),
        }
    }

    /// Return the token for `agent_id`, assigning the next one if needed.
    pub fn token_for(&mut self, agent_id: &AgentId) -> String {
        if let Some(token) = self.by_agent.get(agent_id) {
            return token.clone();
        }
        let token = format!("{TOKEN_PREFIX}{}", self.next_number);
        self.next_number = self.next_number.saturating_add(1);
        self.by_agent.insert(agent_id.clone(), token.clone());
        self.by_token.insert(token.clone(), agent_id.clone());
        token
    }

    /// The token already assigned to `agent_id`, without assigning one.
    pub fn existing_token(&self, agent_id: &AgentId) -> Option<&str> {
        self.by_agent.get(agent_id).map(String::as_str)
    }

    /// Resolve a token back to its agent.
    pub fn agent_for(&self, token: &str) -> Option<&AgentId> {
        self.by_token.get(token)
    }

    /// Every token assigned so far.
    pub const fn mappings(&self) -> &BTreeMap<String, AgentId> {
        &self.by_token
    }

    /// Number of agents that have a token.
    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    /// Whether no token has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    /// Replace every display name from `names` found in `content` with the
    /// named agent's token.
    ///
    /// Names only match as whole words: a name is not replaced inside a
    /// longer word (`"a"` leaves `"cafe"` alone). Longer names win over
    /// shorter ones starting at the same position (`"Ann Lee"` before
    /// `"Ann"`), and text already emitted as a token is never rescanned.
    pub fn anonymize(&mut self, content: &str, names: &BTreeMap<String, AgentId>) -> Anonymized {
        let mut candidates: Vec<(&String, &AgentId)> =
            names.iter().filter(|(name, _)| !name.is_empty()).collect();
        candidates.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        let mut out = String::with_capacity(content.len());
        let mut mapping = BTreeMap::new();
        let mut rest = content;
        let mut previous: Option<char> = None;
        while let Some(ch) = rest.chars().next() {
            let hit = candidates
                .iter()
                .find(|(name, _)| matches_whole_word(previous, rest, name));
            if let Some((name, agent_id)) = hit {
                let token = self.token_for(agent_id);
                out.push_str(&token);
                mapping.insert(token, (*agent_id).clone());
                previous = name.chars().next_back();
                rest = rest.get(name.len()..).unwrap_or_default();
            } else {
                out.push(ch);
                previous = Some(ch);
                rest = rest.get(ch.len_utf8()..).unwrap_or_default();
            }
        }

        Anonymized {
            content: out,
            mapping,
        }
    }

    /// Forget every assignment and restart numbering at `"agent 1"`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Whether `rest` starts with `name` and the match is not glued to a
/// neighbouring word character.
fn matches_whole_word(previous: Option<char>, rest: &str, name: &str) -> bool {
    let Some(after) = rest.strip_prefix(name) else {
        return false;
    };
    let (Some(first), Some(last)) = (name.chars().next(), name.chars().next_back()) else {
        return false;
    };
    let open = !is_word_char(first) || !previous.is_some_and(is_word_char);
    let close = !is_word_char(last) || !after.chars().next().is_some_and(is_word_char);
    open && close
}
