//! Модуль для парсинга сценариев диалогов
//!
//! Сценарий состоит из строк вида `Имя: реплика` (или `[Имя]: реплика`).
//! Парсер никогда не завершается ошибкой: некорректные строки попадают
//! в список замечаний и пропускаются.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Сообщение для строки без двоеточия
pub const MISSING_SEPARATOR: &str = "missing ':' separator";
/// Сообщение для строки с пустым именем персонажа
pub const EMPTY_SPEAKER: &str = "empty speaker name";

lazy_static! {
    static ref LINE_BREAK: Regex = Regex::new(r"\r\n|\r|\n").unwrap();
    static ref DIALOGUE_LINE: Regex = Regex::new(r"^\s*([^:]*):(.*)$").unwrap();
    static ref BRACKETED_NAME: Regex = Regex::new(r"^\[([^\[\]]*)\]$").unwrap();
}

/// Одна реплика диалога
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Имя персонажа (без пробелов по краям и без обрамляющих скобок)
    pub speaker: String,
    /// Текст реплики, может быть пустым
    pub text: String,
    /// Порядковый номер реплики, начиная с 0
    pub index: usize,
}

/// Замечание к строке сценария
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseIssue {
    /// Номер строки, начиная с 1; 0 если неизвестен
    pub line: usize,
    pub message: String,
}

impl ParseIssue {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Результат разбора сценария
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDialogue {
    /// Уникальные персонажи в порядке первого появления
    pub characters: Vec<String>,
    pub utterances: Vec<Utterance>,
    pub issues: Vec<ParseIssue>,
}

impl ParsedDialogue {
    /// Нет ни одной реплики
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Реплики указанного персонажа в порядке появления
    pub fn lines_of<'a>(&'a self, speaker: &'a str) -> impl Iterator<Item = &'a Utterance> + 'a {
        self.utterances.iter().filter(move |u| u.speaker == speaker)
    }

    fn push(&mut self, speaker: String, text: String) {
        if !self.characters.iter().any(|c| *c == speaker) {
            self.characters.push(speaker.clone());
        }
        let index = self.utterances.len();
        self.utterances.push(Utterance { speaker, text, index });
    }
}

/// Разобрать текст сценария
pub fn parse_dialogue(input: &str) -> ParsedDialogue {
    let mut dialogue = ParsedDialogue::default();
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);

    for (i, line) in LINE_BREAK.split(input).enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match parse_line(line) {
            Ok((speaker, text)) => dialogue.push(speaker, text),
            Err(message) => dialogue.issues.push(ParseIssue::new(i + 1, message)),
        }
    }

    log::debug!(
        "Parsed dialogue: {} utterances, {} characters, {} issues",
        dialogue.utterances.len(),
        dialogue.characters.len(),
        dialogue.issues.len()
    );

    dialogue
}

/// Разбор одной непустой строки на (персонаж, текст)
fn parse_line(line: &str) -> Result<(String, String), &'static str> {
    let caps = DIALOGUE_LINE.captures(line).ok_or(MISSING_SEPARATOR)?;

    let speaker = normalize_speaker(&caps[1]);
    if speaker.is_empty() {
        return Err(EMPTY_SPEAKER);
    }

    Ok((speaker, caps[2].trim().to_string()))
}

/// Обрезать пробелы и снять одну пару обрамляющих квадратных скобок
fn normalize_speaker(raw: &str) -> String {
    let name = raw.trim();
    match BRACKETED_NAME.captures(name) {
        Some(caps) => caps[1].trim().to_string(),
        None => name.to_string(),
    }
}
