//! Снимок состояния контроллера задач

use serde::Serialize;

use crate::models::{JobMode, JobStatus, SyncResult};

/// Состояние задачи, публикуемое контроллером после каждого перехода
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobControllerState {
    /// Режим выполнения; известен после ответа на запрос генерации
    pub mode: Option<JobMode>,
    pub is_running: bool,
    pub job_id: Option<String>,
    /// Последний статус, полученный при опросе
    pub status: Option<JobStatus>,
    pub result: Option<SyncResult>,
    /// Прогресс 0–100
    pub progress: Option<f32>,
    /// Текст ошибки; `None`, пока с текущей задачей все в порядке
    pub error: Option<String>,
}

impl JobControllerState {
    /// Состояние в момент запуска новой задачи
    pub fn starting() -> Self {
        Self {
            is_running: true,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.is_running && self.error.is_none() && self.result.is_some()
    }

    pub fn failed(&self) -> bool {
        !self.is_running && self.error.is_some()
    }
}
