use crate::models::{ChatTurn, SessionStats};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory conversation store keyed by client-generated session id.
///
/// A session springs into existence on its first append and lives for the
/// process lifetime; there is no eviction. The single mutex keeps appends for
/// one session atomic under concurrent requests, and `append_turns` writes a
/// whole user/assistant exchange in one lock acquisition so readers never see
/// half an exchange. No await happens while the lock is held.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Vec<ChatTurn>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Ordered history snapshot; empty for an unknown session.
    pub fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append turns atomically, creating the session when unseen. Returns the
    /// message count after the append.
    pub fn append_turns(&self, session_id: &str, turns: Vec<ChatTurn>) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        let history = match sessions.get_mut(session_id) {
            Some(history) => history,
            None => {
                info!("Created new chat session: {}", session_id);
                sessions.entry(session_id.to_string()).or_default()
            }
        };

        for turn in turns {
            debug!(
                "Appending {:?} turn to session {} ({} chars)",
                turn.role,
                session_id,
                turn.text.len()
            );
            history.push(turn);
        }

        history.len()
    }

    pub fn message_count(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|history| history.len())
            .unwrap_or(0)
    }

    /// Remove a session entirely. Returns false when it never existed.
    pub fn clear(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().unwrap().remove(session_id).is_some();
        if removed {
            info!("Cleared chat session: {}", session_id);
        }
        removed
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> SessionStats {
        let sessions = self.sessions.lock().unwrap();
        let total_sessions = sessions.len();
        let total_messages: usize = sessions.values().map(|history| history.len()).sum();

        SessionStats {
            total_sessions,
            total_messages,
            average_messages_per_session: if total_sessions > 0 {
                total_messages as f64 / total_sessions as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
