use tracing::debug;

use crate::envelope::StreamEnvelope;
use crate::error::{Result, WonderError};

/// What the assembler reports for each envelope it accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment arrived; `full_content` is everything so far.
    Update {
        content: String,
        full_content: String,
    },
    /// The session finished successfully.
    Complete { full_content: String },
}

impl StreamEvent {
    pub fn full_content(&self) -> &str {
        match self {
            StreamEvent::Update { full_content, .. } | StreamEvent::Complete { full_content } => {
                full_content
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Active,
    Completed,
    Failed,
}

/// Folds envelopes from one connection into a single running string.
#[derive(Debug)]
pub struct Assembler {
    full_content: String,
    state: AssemblerState,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            full_content: String::new(),
            state: AssemblerState::Active,
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state != AssemblerState::Active
    }

    /// Text accumulated so far, including after a failure.
    pub fn full_content(&self) -> &str {
        &self.full_content
    }

    /// Apply one envelope. Returns `None` once the session has ended.
    pub fn accept(&mut self, envelope: StreamEnvelope) -> Option<Result<StreamEvent>> {
        if self.is_done() {
            debug!("ignoring envelope after session end: {envelope:?}");
            return None;
        }

        let terminal = envelope.is_terminal();
        match envelope {
            StreamEnvelope::Content { content, .. } => {
                self.full_content.push_str(&content);
                if terminal {
                    Some(Ok(self.complete()))
                } else {
                    Some(Ok(StreamEvent::Update {
                        content,
                        full_content: self.full_content.clone(),
                    }))
                }
            }
            StreamEnvelope::Complete { .. } => Some(Ok(self.complete())),
            StreamEnvelope::Error { error, .. } => {
                self.state = AssemblerState::Failed;
                Some(Err(WonderError::Server {
                    message: error,
                    partial: self.full_content.clone(),
                }))
            }
        }
    }

    /// The transport closed cleanly; finalize with what has been received.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.is_done() {
            return None;
        }
        debug!("stream ended without a terminal envelope");
        Some(self.complete())
    }

    /// The transport broke; the partial text travels with the error.
    pub fn fail(&mut self, reason: impl Into<String>) -> Option<WonderError> {
        if self.is_done() {
            return None;
        }
        self.state = AssemblerState::Failed;
        Some(WonderError::Interrupted {
            reason: reason.into(),
            partial: self.full_content.clone(),
        })
    }

    fn complete(&mut self) -> StreamEvent {
        self.state = AssemblerState::Completed;
        StreamEvent::Complete {
            full_content: self.full_content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn concatenates_fragments_in_order() {
        let fragments = ["The", " quick", " brown", " fox", ""];
        let mut assembler = Assembler::new();
        let mut expected = String::new();

        for fragment in fragments {
            expected.push_str(fragment);
            let event = assembler
                .accept(StreamEnvelope::content(fragment))
                .unwrap()
                .unwrap();
            assert_eq!(
                event,
                StreamEvent::Update {
                    content: fragment.to_string(),
                    full_content: expected.clone(),
                }
            );
        }

        let done = assembler.accept(StreamEnvelope::complete()).unwrap().unwrap();
        assert_eq!(
            done,
            StreamEvent::Complete {
                full_content: "The quick brown fox".to_string()
            }
        );
        assert_eq!(assembler.state(), AssemblerState::Completed);
    }

    #[test]
    fn running_buffer_wins_over_server_full_content() {
        let mut assembler = Assembler::new();
        assembler.accept(StreamEnvelope::content("abc"));
        let done = assembler
            .accept(StreamEnvelope::Complete {
                full_content: Some("something else".to_string()),
                finished: true,
            })
            .unwrap()
            .unwrap();
        assert_eq!(done.full_content(), "abc");
    }

    #[test]
    fn finished_content_envelope_completes_with_its_text() {
        let mut assembler = Assembler::new();
        assembler.accept(StreamEnvelope::content("Hi"));
        let done = assembler
            .accept(StreamEnvelope::Content {
                content: "!".to_string(),
                finished: true,
            })
            .unwrap()
            .unwrap();
        assert!(done.is_finished());
        assert_eq!(done.full_content(), "Hi!");
    }

    #[test]
    fn error_envelope_fails_and_keeps_partial_text() {
        let mut assembler = Assembler::new();
        assembler.accept(StreamEnvelope::content("Par"));
        let result = assembler
            .accept(StreamEnvelope::Error {
                error: "rate limited".to_string(),
                finished: true,
            })
            .unwrap();
        assert!(matches!(
            result,
            Err(WonderError::Server { ref message, ref partial })
                if message == "rate limited" && partial == "Par"
        ));
        assert_eq!(assembler.state(), AssemblerState::Failed);
        assert_eq!(assembler.full_content(), "Par");
    }

    #[test]
    fn input_after_terminal_is_ignored() {
        let mut assembler = Assembler::new();
        assembler.accept(StreamEnvelope::complete());
        assert!(assembler.accept(StreamEnvelope::content("late")).is_none());
        assert!(assembler.finish().is_none());
        assert!(assembler.fail("reset").is_none());
        assert_eq!(assembler.full_content(), "");
    }

    #[test]
    fn eof_completes_and_break_fails() {
        let mut clean = Assembler::new();
        clean.accept(StreamEnvelope::content("partial"));
        assert_eq!(clean.finish().unwrap().full_content(), "partial");

        let mut broken = Assembler::new();
        broken.accept(StreamEnvelope::content("half"));
        let err = broken.fail("connection reset").unwrap();
        assert_eq!(err.partial_content(), Some("half"));
    }
}
