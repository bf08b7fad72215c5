//! Per-turn message construction for the two-model dialogue.
//!
//! The outbound message list is recomputed from the transcript on every turn;
//! nothing here keeps state between turns.

use crate::models::{ChatMessage, DialogueSlot, DialogueTurnRecord, MessageRole, Speaker};

pub const TOPIC_MARKER: &str = "[Discussion Topic]:";
pub const MAX_RESPONSE_WORDS: u32 = 200;

/// Display names of both participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueNames {
    pub a: String,
    pub b: String,
}

impl DialogueNames {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self { a: a.into(), b: b.into() }
    }

    pub fn name(&self, slot: DialogueSlot) -> &str {
        match slot {
            DialogueSlot::A => &self.a,
            DialogueSlot::B => &self.b,
        }
    }
}

/// System instruction for whoever speaks next.
pub fn system_instruction(speaker: DialogueSlot, names: &DialogueNames) -> String {
    let you = names.name(speaker);
    let other = names.name(speaker.other());
    let role = match speaker {
        DialogueSlot::A => "- Lead with clear, well-reasoned positions\n\
             - Ask thought-provoking questions to deepen the dialogue\n\
             - Develop and evolve your arguments as the conversation progresses",
        DialogueSlot::B => "- Offer alternative perspectives and build on ideas\n\
             - Respectfully challenge points when you disagree\n\
             - Find common ground while maintaining your distinct viewpoint",
    };

    format!(
        "You are {you}, engaging in an ongoing discussion with {other} (another AI assistant).\n\
         \n\
         CONVERSATION MEMORY:\n\
         - Remember and reference your previous statements throughout this conversation\n\
         - Build upon your earlier points and stay consistent with what you have said before\n\
         - Respond directly to specific points {other} has made, naming {other} when you do\n\
         - Reference earlier parts of the discussion when relevant\n\
         \n\
         Your role in this discussion:\n\
         {role}\n\
         \n\
         Keep responses focused (under {MAX_RESPONSE_WORDS} words) but substantive. \
         Express your perspective clearly while engaging genuinely with {other}'s contributions."
    )
}

/// Role and content a transcript record takes from `speaker`'s point of view:
/// its own turns become assistant history, the other participant's turns are
/// user input labeled with that participant's name.
fn relabel(
    record: &DialogueTurnRecord,
    speaker: DialogueSlot,
    names: &DialogueNames,
) -> Option<ChatMessage> {
    if record.content.trim().is_empty() {
        return None;
    }
    match record.speaker {
        Speaker::User => Some(ChatMessage::user(format!("{TOPIC_MARKER} {}", record.content))),
        Speaker::SystemError => None,
        own if own == Speaker::from(speaker) => Some(ChatMessage::assistant(record.content.clone())),
        _ => {
            let other = names.name(speaker.other());
            Some(ChatMessage::user(format!("[{other}]: {}", record.content)))
        }
    }
}

/// Full message list for `speaker`'s next turn: the system instruction first,
/// then the relabeled transcript with consecutive same-role messages merged
/// (blank-line separated) so user and assistant strictly alternate.
pub fn build_turn_messages(
    transcript: &[DialogueTurnRecord],
    speaker: DialogueSlot,
    names: &DialogueNames,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_instruction(speaker, names))];
    messages.extend(coalesce(
        transcript.iter().filter_map(|record| relabel(record, speaker, names)),
    ));
    messages
}

/// Merges runs of messages that share a role.
pub fn coalesce(messages: impl IntoIterator<Item = ChatMessage>) -> Vec<ChatMessage> {
    let mut merged: Vec<ChatMessage> = Vec::new();
    for message in messages {
        match merged.last_mut() {
            Some(last) if last.role == message.role && message.role != MessageRole::System => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => merged.push(message),
        }
    }
    merged
}
