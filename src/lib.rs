//! Основной файл библиотеки tts-studio
//!
//! Библиотека-клиент сервиса генерации речи: разбор сценариев диалогов
//! и отслеживание задач генерации в синхронном и асинхронном режимах.

pub mod config;
pub mod dialogue;
pub mod error;
pub mod gateway;
pub mod job;
pub mod models;
pub mod notification;
pub mod progress;

use std::sync::Arc;

pub use crate::config::StudioConfig;
pub use crate::dialogue::{parse_dialogue, CastSheet, ParsedDialogue};
pub use crate::error::{Result, TtsStudioError};
pub use crate::gateway::{GenerationGateway, HttpGateway};
pub use crate::job::{JobController, JobControllerState};
pub use crate::models::{GenerateRequest, GenerateResponse, JobStatus, SyncResult};

/// Основная структура для работы с библиотекой
pub struct TtsStudio {
    /// Конфигурация библиотеки
    config: StudioConfig,
    /// Шлюз к сервису генерации
    gateway: Arc<dyn GenerationGateway>,
}

impl TtsStudio {
    /// Создать экземпляр с HTTP шлюзом по указанной конфигурации
    pub fn new(config: StudioConfig) -> Result<Self> {
        let gateway = HttpGateway::new(&config)?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    /// Создать экземпляр с конфигурацией из переменных окружения
    pub fn from_env() -> Result<Self> {
        Self::new(StudioConfig::from_env()?)
    }

    /// Создать экземпляр с произвольным шлюзом
    pub fn with_gateway(config: StudioConfig, gateway: Arc<dyn GenerationGateway>) -> Self {
        Self { config, gateway }
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn gateway(&self) -> Arc<dyn GenerationGateway> {
        Arc::clone(&self.gateway)
    }

    /// Разобрать сценарий, предварительно проверив его длину
    pub fn parse_script(&self, script: &str) -> Result<ParsedDialogue> {
        let len = script.chars().count();
        if len > self.config.max_script_chars {
            log::warn!(
                "Rejecting dialogue script of {} characters (max {})",
                len,
                self.config.max_script_chars
            );
            return Err(TtsStudioError::InputTooLong {
                len,
                max: self.config.max_script_chars,
            });
        }
        Ok(parse_dialogue(script))
    }

    /// Создать новый контроллер задач с интервалом опроса из конфигурации
    pub fn job_controller(&self) -> JobController {
        JobController::with_poll_interval(self.gateway(), self.config.poll_interval())
    }

    /// Выполнить одну генерацию до конца и вернуть результат
    pub async fn generate(&self, request: GenerateRequest) -> Result<SyncResult> {
        let controller = self.job_controller();
        controller.start(request);
        let state = controller.wait_until_settled().await;

        match (state.result, state.error) {
            (Some(result), None) => Ok(result),
            (_, Some(error)) => Err(TtsStudioError::Gateway(error)),
            (None, None) => Err(TtsStudioError::Other("job finished without a result".to_string())),
        }
    }
}
