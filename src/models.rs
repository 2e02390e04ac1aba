//! Модели данных API сервиса генерации речи
//!
//! Запросы, ответы и статусы задач в том виде, в котором они передаются
//! по сети (JSON, поля в camelCase).

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::TextLimits;
use crate::error::{Result, TtsStudioError};

/// Движок TTS
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Piper, отвечает синхронно
    Piper,
    /// XTTS, обычно ставит задачу в очередь
    Xtts,
}

impl Engine {
    /// Получить строковое представление движка
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Piper => "piper",
            Self::Xtts => "xtts",
        }
    }
}

/// Формат экспорта аудио
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Mp3,
    #[default]
    Wav,
    Flac,
    M4a,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::M4a => "m4a",
        }
    }
}

/// Допустимые значения битрейта для форматов с потерями (кбит/с)
pub const ALLOWED_BITRATES_KBPS: [u16; 4] = [128, 192, 256, 320];

/// Пресет обработки на стороне сервиса
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresetKey {
    PodcastStandard,
    AudiobookProfessional,
    Announcement,
    NaturalMinimal,
}

/// Эмоциональная окраска речи
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmotionTag {
    Happy,
    Sad,
    Excited,
    Calm,
    Serious,
    Whisper,
}

/// Фоновый эффект
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundFx {
    #[default]
    None,
    Rain,
    Cafe,
    Forest,
    Ocean,
    Fire,
    Wind,
}

/// Скорость чтения в диапазоне 0.5–2.0
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct PlaybackRate(f32);

impl PlaybackRate {
    pub const MIN: f32 = 0.5;
    pub const MAX: f32 = 2.0;

    /// Создать скорость, отклоняя значения вне диапазона
    pub fn new(value: f32) -> Result<Self> {
        let rate = Self(value);
        rate.check()?;
        Ok(rate)
    }

    /// Создать скорость, прижимая значение к границам диапазона
    pub fn clamped(value: f32) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    fn check(&self) -> Result<()> {
        if !(Self::MIN..=Self::MAX).contains(&self.0) {
            return Err(TtsStudioError::InvalidRequest(format!(
                "speed must be within [{}, {}], got {}",
                Self::MIN,
                Self::MAX,
                self.0
            )));
        }
        Ok(())
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self(1.0)
    }
}

/// Параметры фонового эффекта
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Background {
    pub kind: BackgroundFx,
    /// Громкость фона 0–0.5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
}

impl Background {
    pub const MAX_GAIN: f32 = 0.5;
    pub const DEFAULT_GAIN: f32 = 0.2;

    pub fn new(kind: BackgroundFx) -> Self {
        Self { kind, gain: None }
    }

    /// Установить громкость, прижимая ее к допустимому диапазону
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = Some(gain.clamp(0.0, Self::MAX_GAIN));
        self
    }

    /// Фактическая громкость с учетом значения по умолчанию
    pub fn effective_gain(&self) -> f32 {
        self.gain.unwrap_or(Self::DEFAULT_GAIN)
    }
}

/// Настройки синтеза для одного голоса
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisConfig {
    pub voice_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<PlaybackRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotions: Option<Vec<EmotionTag>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_key: Option<PresetKey>,
}

impl SynthesisConfig {
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            speed: None,
            emotions: None,
            background: None,
            preset_key: None,
        }
    }

    pub fn with_speed(mut self, speed: PlaybackRate) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_emotions(mut self, emotions: Vec<EmotionTag>) -> Self {
        self.emotions = Some(emotions);
        self
    }

    pub fn with_background(mut self, background: Background) -> Self {
        self.background = Some(background);
        self
    }

    pub fn with_preset(mut self, preset: PresetKey) -> Self {
        self.preset_key = Some(preset);
        self
    }
}

/// Параметры экспорта
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub format: ExportFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u16>,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            bitrate_kbps: None,
        }
    }

    pub fn with_bitrate(mut self, kbps: u16) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }
}

/// Режим выполнения задачи генерации
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Sync,
    Async,
}

/// Запрос на генерацию речи (/generate)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateRequest {
    /// Пожелание по режиму; сервис может его проигнорировать
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<JobMode>,
    pub engine: Engine,
    pub text: String,
    pub config: SynthesisConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportOptions>,
}

impl GenerateRequest {
    pub fn new(engine: Engine, text: impl Into<String>, config: SynthesisConfig) -> Self {
        Self {
            mode: None,
            engine,
            text: text.into(),
            config,
            export: None,
        }
    }

    pub fn with_export(mut self, export: ExportOptions) -> Self {
        self.export = Some(export);
        self
    }

    pub fn with_mode_hint(mut self, mode: JobMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Проверить запрос перед отправкой
    pub fn validate(&self, limits: &TextLimits) -> Result<()> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(TtsStudioError::InvalidRequest("text must not be empty".to_string()));
        }

        let max = limits.for_engine(self.engine);
        let len = text.chars().count();
        if len > max {
            return Err(TtsStudioError::InvalidRequest(format!(
                "text is {} characters, {} accepts at most {}",
                len,
                self.engine.as_str(),
                max
            )));
        }

        if self.config.voice_id.trim().is_empty() {
            return Err(TtsStudioError::InvalidRequest("voiceId must not be empty".to_string()));
        }

        if let Some(speed) = &self.config.speed {
            speed.check()?;
        }

        if let Some(gain) = self.config.background.as_ref().and_then(|b| b.gain) {
            if !(0.0..=Background::MAX_GAIN).contains(&gain) {
                return Err(TtsStudioError::InvalidRequest(format!(
                    "background gain must be within [0, {}], got {}",
                    Background::MAX_GAIN,
                    gain
                )));
            }
        }

        if let Some(kbps) = self.export.as_ref().and_then(|e| e.bitrate_kbps) {
            if !ALLOWED_BITRATES_KBPS.contains(&kbps) {
                return Err(TtsStudioError::InvalidRequest(format!(
                    "unsupported bitrate {} kbps",
                    kbps
                )));
            }
        }

        Ok(())
    }
}

/// Метрики качества, рассчитанные сервисом
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub lufs_integrated: f64,
    pub true_peak_db: f64,
    pub duration_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crest_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snr_approx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clipping_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_gaps_ms: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// Готовый результат генерации
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// URL файла; может быть относительным путем
    #[serde(alias = "audioUrl")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ExportFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<QualityMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Квитанция асинхронной задачи
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AsyncJob {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

/// Ответ /generate: либо готовый результат, либо идентификатор задачи
///
/// Режим передается в поле `mode`; поле `kind` принимается как его синоним.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum GenerateResponse {
    Sync(SyncResult),
    Async(AsyncJob),
}

impl<'de> Deserialize<'de> for GenerateResponse {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut body = Map::<String, Value>::deserialize(deserializer)?;
        let tag = match (body.remove("mode"), body.remove("kind")) {
            (Some(tag), _) | (None, Some(tag)) => tag,
            (None, None) => return Err(de::Error::missing_field("mode")),
        };

        let mode = JobMode::deserialize(tag).map_err(de::Error::custom)?;
        let body = Value::Object(body);
        let response = match mode {
            JobMode::Sync => SyncResult::deserialize(body).map(Self::Sync),
            JobMode::Async => AsyncJob::deserialize(body).map(Self::Async),
        };
        response.map_err(de::Error::custom)
    }
}

impl GenerateResponse {
    pub fn mode(&self) -> JobMode {
        match self {
            Self::Sync(_) => JobMode::Sync,
            Self::Async(_) => JobMode::Async,
        }
    }
}

/// Состояние задачи на стороне сервиса
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobState {
    /// Завершающее ли это состояние (после него опрос прекращается)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

/// Ошибка, сообщенная воркером
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Ответ /status/{jobId}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    /// Прогресс 0–100, если сервис его сообщает
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// При state=done сервис может сразу приложить результат
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncResult>,
}

impl JobStatus {
    pub fn new(job_id: impl Into<String>, state: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            progress: None,
            error: None,
            result: None,
        }
    }

    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(JobError {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn with_result(mut self, result: SyncResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// Описание пресета (/presets)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresetInfo {
    pub key: PresetKey,
    pub title: String,
    pub lufs_target: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
