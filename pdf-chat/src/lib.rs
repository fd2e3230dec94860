pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod prompt;
pub mod responder;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::ChatConfig;
pub use controller::{SessionController, SubmitOutcome};
pub use document::{DocumentLoader, DocumentText, PdfTextExtractor, TextExtractor};
pub use error::{ChatError, Result};
pub use prompt::compose_prompt;
pub use responder::{GeminiClient, GenerationClient, Responder};
pub use session::{ChatSession, SessionState, Transcript, Turn};
pub use storage::{InMemorySessionStore, SessionHandle, SessionStore, spawn_session_sweeper};
