//! HTTP реализация шлюза генерации
//!
//! Эндпоинты: `POST /generate`, `GET /status/{jobId}`, `GET /result/{jobId}`,
//! `GET /presets`.

use async_trait::async_trait;
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{StudioConfig, TextLimits};
use crate::error::{Result, TtsStudioError};
use crate::gateway::GenerationGateway;
use crate::models::{ExportFormat, GenerateRequest, GenerateResponse, JobStatus, PresetInfo, SyncResult};

lazy_static! {
    static ref ABSOLUTE_URL: Regex = Regex::new(r"(?i)^https?://").unwrap();
}

/// Клиент REST API сервиса генерации
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    api_base: Url,
    text_limits: TextLimits,
}

impl HttpGateway {
    /// Создать клиент по конфигурации
    pub fn new(config: &StudioConfig) -> Result<Self> {
        config.validate()?;

        let api_base = Url::parse(&config.api_base)
            .map_err(|e| TtsStudioError::Configuration(format!("invalid API base: {}", e)))?;
        if api_base.cannot_be_a_base() {
            return Err(TtsStudioError::Configuration(format!(
                "API base '{}' cannot carry a path",
                config.api_base
            )));
        }

        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            api_base,
            text_limits: config.text_limits.clone(),
        })
    }

    /// Origin API (схема, хост и порт) для сборки ссылок на файлы
    pub fn api_origin(&self) -> String {
        self.api_base.origin().ascii_serialization()
    }

    /// Превратить путь вида `/outputs/...` в полный URL
    pub fn to_backend_url(&self, path_or_url: &str) -> String {
        if path_or_url.is_empty() {
            return String::new();
        }
        if ABSOLUTE_URL.is_match(path_or_url) {
            return path_or_url.to_string();
        }
        if path_or_url.starts_with('/') {
            format!("{}{}", self.api_origin(), path_or_url)
        } else {
            format!("{}/{}", self.api_origin(), path_or_url)
        }
    }

    /// Скачать аудиофайл завершенной задачи в нужном формате
    pub async fn download_result(&self, job_id: &str, format: ExportFormat) -> Result<Bytes> {
        let mut url = self.endpoint(&["result", job_id])?;
        url.query_pairs_mut().append_pair("format", format.as_str());

        log::debug!("GET {}", url);
        let response = ensure_success(self.client.get(url).send().await?).await?;
        Ok(response.bytes().await?)
    }

    /// Список пресетов обработки
    pub async fn list_presets(&self) -> Result<Vec<PresetInfo>> {
        let url = self.endpoint(&["presets"])?;
        log::debug!("GET {}", url);
        handle_json(self.client.get(url).send().await?).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| TtsStudioError::Configuration("API base cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl GenerationGateway for HttpGateway {
    async fn submit(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        request.validate(&self.text_limits)?;

        let url = self.endpoint(&["generate"])?;
        log::debug!("POST {} (engine: {})", url, request.engine.as_str());
        let response = self.client.post(url).json(request).send().await?;
        handle_json(response).await
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatus> {
        let url = self.endpoint(&["status", job_id])?;
        log::debug!("GET {}", url);
        handle_json(self.client.get(url).send().await?).await
    }

    async fn get_result(&self, job_id: &str) -> Result<SyncResult> {
        let url = self.endpoint(&["result", job_id])?;
        log::debug!("GET {}", url);
        handle_json(self.client.get(url).send().await?).await
    }
}

async fn handle_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(status.as_u16(), &body);
    log::error!("Service request failed: {}", message);
    Err(TtsStudioError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Сообщение об ошибке: `HTTP <код>` и поле `detail` из тела, если оно есть
fn error_message(status: u16, body: &str) -> String {
    let mut message = format!("HTTP {}", status);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        match value.get("detail") {
            Some(Value::String(detail)) => {
                message.push_str(": ");
                message.push_str(detail);
            }
            Some(Value::Null) | None => {}
            Some(detail) => {
                message.push_str(": ");
                message.push_str(&detail.to_string());
            }
        }
    }
    message
}
