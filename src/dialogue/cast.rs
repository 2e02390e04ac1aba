//! Распределение голосов по персонажам и построение запросов на генерацию

use std::collections::HashMap;

use crate::dialogue::parser::ParsedDialogue;
use crate::error::{Result, TtsStudioError};
use crate::models::{Engine, ExportOptions, GenerateRequest, SynthesisConfig};

/// Запрос на озвучивание одной реплики
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueRequest {
    /// Индекс реплики в разобранном диалоге
    pub index: usize,
    pub speaker: String,
    pub request: GenerateRequest,
}

/// Таблица голосов персонажей
#[derive(Debug, Clone, Default)]
pub struct CastSheet {
    default_voice: Option<SynthesisConfig>,
    voices: HashMap<String, SynthesisConfig>,
}

impl CastSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Голос для персонажей без явного назначения
    pub fn with_default(mut self, config: SynthesisConfig) -> Self {
        self.default_voice = Some(config);
        self
    }

    /// Назначить голос персонажу
    pub fn assign(&mut self, speaker: impl Into<String>, config: SynthesisConfig) -> &mut Self {
        self.voices.insert(speaker.into(), config);
        self
    }

    pub fn voice_for(&self, speaker: &str) -> Option<&SynthesisConfig> {
        self.voices.get(speaker).or(self.default_voice.as_ref())
    }

    /// Персонажи диалога, которым не достался ни один голос
    pub fn unassigned<'a>(&self, dialogue: &'a ParsedDialogue) -> Vec<&'a str> {
        dialogue
            .characters
            .iter()
            .filter(|c| self.voice_for(c).is_none())
            .map(String::as_str)
            .collect()
    }

    /// Построить по запросу на каждую непустую реплику
    pub fn build_requests(
        &self,
        dialogue: &ParsedDialogue,
        engine: Engine,
        export: Option<&ExportOptions>,
    ) -> Result<Vec<DialogueRequest>> {
        let missing = self.unassigned(dialogue);
        if !missing.is_empty() {
            return Err(TtsStudioError::InvalidRequest(format!(
                "no voice assigned for speaker(s): {}",
                missing.join(", ")
            )));
        }

        let mut requests = Vec::new();
        for utterance in dialogue.utterances.iter().filter(|u| !u.text.is_empty()) {
            let Some(config) = self.voice_for(&utterance.speaker) else {
                continue;
            };
            let mut request = GenerateRequest::new(engine, utterance.text.clone(), config.clone());
            request.export = export.cloned();

            requests.push(DialogueRequest {
                index: utterance.index,
                speaker: utterance.speaker.clone(),
                request,
            });
        }

        Ok(requests)
    }
}
