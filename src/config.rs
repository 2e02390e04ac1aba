//! Модуль конфигурации библиотеки tts-studio
//!
//! Этот модуль содержит структуры для настройки клиента сервиса генерации речи.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsStudioError};
use crate::models::Engine;

/// Переменная окружения с базовым URL API
pub const API_BASE_ENV: &str = "TTS_STUDIO_API_BASE";
/// Переменная окружения с интервалом опроса статуса (мс)
pub const POLL_INTERVAL_ENV: &str = "TTS_STUDIO_POLL_INTERVAL_MS";

/// Базовый URL API по умолчанию
pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";

/// Ограничения длины текста запроса для каждого движка
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextLimits {
    /// Максимальная длина текста для Piper
    pub piper: usize,
    /// Максимальная длина текста для XTTS
    pub xtts: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            piper: 5_000,
            xtts: 20_000,
        }
    }
}

impl TextLimits {
    /// Получить ограничение для указанного движка
    pub fn for_engine(&self, engine: Engine) -> usize {
        match engine {
            Engine::Piper => self.piper,
            Engine::Xtts => self.xtts,
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioConfig {
    /// Базовый URL API (например, http://localhost:8000/api)
    pub api_base: String,
    /// Интервал опроса статуса асинхронной задачи в миллисекундах
    pub poll_interval_ms: u64,
    /// Таймаут одного HTTP запроса в секундах
    pub request_timeout_secs: u64,
    /// Максимальная длина сценария диалога, принимаемого фасадом
    pub max_script_chars: usize,
    /// Ограничения длины текста запроса
    pub text_limits: TextLimits,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval_ms: 1000,
            request_timeout_secs: 300,
            max_script_chars: 20_000,
            text_limits: TextLimits::default(),
        }
    }
}

impl StudioConfig {
    /// Создать конфигурацию по умолчанию с переопределениями из окружения
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                config.api_base = base.trim().to_string();
            }
        }

        if let Ok(raw) = std::env::var(POLL_INTERVAL_ENV) {
            config.poll_interval_ms = raw.trim().parse().map_err(|_| {
                TtsStudioError::Configuration(format!(
                    "{} must be an integer number of milliseconds, got '{}'",
                    POLL_INTERVAL_ENV, raw
                ))
            })?;
        }

        config.validate()?;
        log::debug!("Loaded configuration, API base: {}", config.api_base);
        Ok(config)
    }

    /// Проверить корректность конфигурации
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(TtsStudioError::Configuration(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        reqwest::Url::parse(&self.api_base).map_err(|e| {
            TtsStudioError::Configuration(format!("invalid API base '{}': {}", self.api_base, e))
        })?;

        Ok(())
    }

    /// Интервал опроса в виде Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Таймаут HTTP запроса в виде Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
