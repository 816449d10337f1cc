//! Prompt assembly from conversation history

use crate::session::ConversationMessage;

/// Number of recent messages fed to the language model
pub const DEFAULT_CONTEXT_WINDOW: usize = 10;

/// Instruction appended after the rendered transcript
pub const REPLY_INSTRUCTION: &str = "Continue this conversation as the Assistant. \
Reply to the user's latest message naturally and concisely, in a friendly \
conversational tone suited to being spoken aloud.";

/// Render a transcript window into a language model prompt
///
/// Each message becomes a `<Role>: <content>` line in chronological order,
/// followed by a blank line and [`REPLY_INSTRUCTION`].
#[must_use]
pub fn format_prompt(messages: &[ConversationMessage]) -> String {
    let mut prompt = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str(REPLY_INSTRUCTION);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_roles_in_order() {
        let messages = vec![
            ConversationMessage::user("hello"),
            ConversationMessage::assistant("hi there"),
            ConversationMessage::user("what's the weather?"),
        ];

        let prompt = format_prompt(&messages);
        assert!(prompt.starts_with(
            "User: hello\nAssistant: hi there\nUser: what's the weather?\n\n"
        ));
        assert!(prompt.ends_with(REPLY_INSTRUCTION));
    }

    #[test]
    fn empty_window_is_instruction_only() {
        assert_eq!(format_prompt(&[]), REPLY_INSTRUCTION);
    }
}
