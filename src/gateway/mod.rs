//! Шлюз к сервису генерации речи
//!
//! Контроллер задач работает с сервисом только через трейт [`GenerationGateway`].
//! Отмена запроса в полете выполняется сбросом его future.

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{GenerateRequest, GenerateResponse, JobStatus, SyncResult};

pub use http::HttpGateway;

/// Операции сервиса, которые нужны контроллеру задач
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Отправить запрос на генерацию
    async fn submit(&self, request: &GenerateRequest) -> Result<GenerateResponse>;

    /// Получить текущий статус асинхронной задачи
    async fn get_status(&self, job_id: &str) -> Result<JobStatus>;

    /// Получить результат завершенной задачи
    async fn get_result(&self, job_id: &str) -> Result<SyncResult>;
}
