//! Prompt builder for model calls
//!
//! Every call sends the system prompt followed by the whole transcript:
//! - the instruction as user text
//! - each screenshot entry as a user image block
//! - each assistant entry as the model's own earlier answer

use xagent_core::{ConversationEntry, Origin};
use xagent_model::ChatMessage;

/// Action space offered to the model by the default prompt
const ACTION_SPACE: &[&str] = &[
    "click(start_box='(x1,y1)')",
    "left_double(start_box='(x1,y1)')",
    "right_single(start_box='(x1,y1)')",
    "drag(start_box='(x1,y1)', end_box='(x2,y2)')",
    "hotkey(key='ctrl c')",
    "type(content='text to type')",
    "scroll(start_box='(x1,y1)', direction='down or up or right or left')",
    "wait()",
    "finished()",
    "call_user()",
];

/// Default system prompt for GUI runs
pub fn default_system_prompt() -> String {
    let mut prompt = String::new();

    prompt.push_str("You are a GUI agent. You are given a task and screenshots of the screen. ");
    prompt.push_str("Decide the next action to perform to complete the task.\n\n");

    prompt.push_str("## Output Format\n\n");
    prompt.push_str("```\nThought: ...\nAction: ...\n```\n\n");

    prompt.push_str("## Action Space\n\n");
    for action in ACTION_SPACE {
        prompt.push_str(action);
        prompt.push('\n');
    }
    prompt.push('\n');

    prompt.push_str("## Notes\n\n");
    prompt.push_str("- Coordinates are in a 1000x1000 space over the screenshot.\n");
    prompt.push_str("- Use `finished()` once the task is complete.\n");
    prompt.push_str("- Use `call_user()` when the task needs help from a human.\n");

    prompt
}

/// Build the message list for one model call
pub fn build_messages(system_prompt: &str, transcript: &[ConversationEntry]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(ChatMessage::system(system_prompt));

    for entry in transcript {
        let message = match (entry.origin, &entry.screenshot) {
            (Origin::Human, Some(shot)) => ChatMessage::user_image(shot.data_url()),
            (Origin::Human, None) => ChatMessage::user(&entry.text),
            (Origin::Assistant, _) => ChatMessage::assistant(&entry.text),
        };
        messages.push(message);
    }

    messages
}
