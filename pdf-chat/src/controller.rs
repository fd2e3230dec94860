//! Per-turn driver for a [`ChatSession`].
//!
//! A session is `Idle` between turns and `Generating` while a response is being
//! produced. Whatever the outcome of a turn, the session is `Idle` again when
//! [`SessionController::submit`] returns, and its transcript has either grown by
//! exactly one turn or is unchanged.

use tracing::{info, warn};

use crate::document::DocumentText;
use crate::error::Result;
use crate::responder::Responder;
use crate::session::{ChatSession, SessionState, Turn};

/// What a submission did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty or whitespace-only input; nothing happened.
    Ignored,
    /// A new turn was appended.
    Answered(Turn),
}

#[derive(Clone)]
pub struct SessionController {
    document: DocumentText,
    responder: Responder,
}

impl SessionController {
    pub fn new(document: DocumentText, responder: Responder) -> Self {
        Self {
            document,
            responder,
        }
    }

    pub fn document(&self) -> &DocumentText {
        &self.document
    }

    pub async fn submit(&self, session: &mut ChatSession, input: &str) -> Result<SubmitOutcome> {
        let user_input = input.trim();
        if user_input.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        info!(
            "Session {}: generating reply to turn {}",
            session.id,
            session.transcript.len() + 1
        );
        let generating = GeneratingGuard::enter(&mut session.state);
        let result = self
            .responder
            .respond(&self.document, &session.transcript, user_input)
            .await;
        drop(generating);

        match result {
            Ok(answer) => {
                let turn = Turn::new(user_input, answer);
                session.transcript.push(turn.clone());
                Ok(SubmitOutcome::Answered(turn))
            }
            Err(e) => {
                warn!("Session {}: turn failed, transcript unchanged: {}", session.id, e);
                Err(e)
            }
        }
    }
}

/// Marks the session `Generating` and puts it back to `Idle` on drop, including when
/// the submitting future is cancelled mid-call.
struct GeneratingGuard<'a> {
    state: &'a mut SessionState,
}

impl<'a> GeneratingGuard<'a> {
    fn enter(state: &'a mut SessionState) -> Self {
        *state = SessionState::Generating;
        Self { state }
    }
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        *self.state = SessionState::Idle;
    }
}
