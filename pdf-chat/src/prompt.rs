use std::fmt::Write;

use crate::session::Transcript;

const PREAMBLE: &str = "You are a helpful assistant for AiCouncil. Use the information below to answer user questions naturally without mentioning the source document.

Please provide your answers with clear formatting. Use bullet points or numbered lists wherever applicable to improve readability.";

/// Serialize prior turns as alternating "User:" / "Assistant:" lines.
pub fn format_history(transcript: &Transcript) -> String {
    let mut conversation = String::new();
    for turn in transcript {
        let _ = write!(
            conversation,
            "User: {}\nAssistant: {}\n",
            turn.user, turn.assistant
        );
    }
    conversation
}

/// Build the full prompt: instructions, the document verbatim, history, then an open
/// "Assistant:" cue after the new user line.
pub fn compose_prompt(document: &str, transcript: &Transcript, user_input: &str) -> String {
    format!(
        "\n{PREAMBLE}\n\n{document}\n\nConversation so far:\n{history}\nUser: {user_input}\nAssistant:\n",
        history = format_history(transcript),
    )
}
