//! Сценарии диалогов: парсинг и распределение голосов

pub mod cast;
pub mod parser;

pub use cast::{CastSheet, DialogueRequest};
pub use parser::{parse_dialogue, ParseIssue, ParsedDialogue, Utterance};
