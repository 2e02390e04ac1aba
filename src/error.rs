//! Модуль обработки ошибок библиотеки tts-studio
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при работе библиотеки.

use thiserror::Error;

/// Ошибки библиотеки tts-studio
#[derive(Debug, Error)]
pub enum TtsStudioError {
    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Сервис ответил статусом, отличным от 2xx
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Отказ шлюза генерации; сообщение передается как есть
    #[error("{0}")]
    Gateway(String),

    /// Некорректный запрос на генерацию
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Входной текст превышает допустимый размер
    #[error("Input too long: {len} characters (max {max})")]
    InputTooLong { len: usize, max: usize },

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl From<&str> for TtsStudioError {
    fn from(s: &str) -> Self {
        TtsStudioError::Other(s.to_string())
    }
}

impl From<String> for TtsStudioError {
    fn from(s: String) -> Self {
        TtsStudioError::Other(s)
    }
}

/// Тип Result для библиотеки tts-studio
pub type Result<T> = std::result::Result<T, TtsStudioError>;
