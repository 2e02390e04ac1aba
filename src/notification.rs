//! Модуль для реализации системы уведомлений
//!
//! Этот модуль предоставляет конкретные реализации наблюдателей для
//! состояния контроллера задач.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::job::JobControllerState;
use crate::progress::{ProgressInfo, StateObserver};

fn describe(progress: &ProgressInfo) -> String {
    let job = progress.job_id.as_deref().unwrap_or("-");
    let details = progress.details.as_deref().unwrap_or("");
    format!(
        "Задача: {}, Этап: {}, Прогресс: {:.1}%{}",
        job,
        progress.stage.as_str(),
        progress.progress,
        if details.is_empty() { String::new() } else { format!(", Детали: {}", details) }
    )
}

/// Наблюдатель, пишущий изменения состояния в лог
pub struct LogStateObserver {
    prefix: Option<String>,
}

impl LogStateObserver {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl Default for LogStateObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StateObserver for LogStateObserver {
    fn on_state_update(&self, state: &JobControllerState) {
        let prefix = self.prefix.as_deref().unwrap_or("");
        let line = describe(&ProgressInfo::from_state(state));
        if state.error.is_some() {
            log::warn!("{}{}", prefix, line);
        } else {
            log::info!("{}{}", prefix, line);
        }
    }
}

/// Наблюдатель, сохраняющий все снимки состояния в памяти
///
/// Клоны разделяют одну историю, поэтому один экземпляр можно отдать
/// контроллеру, а другой оставить себе для чтения.
#[derive(Clone, Default)]
pub struct MemoryStateObserver {
    history: Arc<Mutex<Vec<JobControllerState>>>,
}

impl MemoryStateObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить историю снимков
    pub fn history(&self) -> Vec<JobControllerState> {
        self.history.lock().clone()
    }

    pub fn last(&self) -> Option<JobControllerState> {
        self.history.lock().last().cloned()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl StateObserver for MemoryStateObserver {
    fn on_state_update(&self, state: &JobControllerState) {
        self.history.lock().push(state.clone());
    }
}

/// Наблюдатель, дописывающий строки с временной меткой в файл
pub struct FileStateObserver {
    file_path: String,
}

impl FileStateObserver {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

impl StateObserver for FileStateObserver {
    fn on_state_update(&self, state: &JobControllerState) {
        let entry = format!(
            "[{}] {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            describe(&ProgressInfo::from_state(state))
        );

        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .and_then(|mut file| file.write_all(entry.as_bytes()));

        if let Err(e) = written {
            log::error!("Failed to write job state to {}: {}", self.file_path, e);
        }
    }
}

/// Наблюдатель, отправляющий снимки в канал
pub struct ChannelStateObserver {
    sender: mpsc::Sender<JobControllerState>,
}

impl ChannelStateObserver {
    pub fn new(sender: mpsc::Sender<JobControllerState>) -> Self {
        Self { sender }
    }
}

impl StateObserver for ChannelStateObserver {
    fn on_state_update(&self, state: &JobControllerState) {
        if let Err(e) = self.sender.try_send(state.clone()) {
            log::warn!("Dropped job state update: {}", e);
        }
    }
}

/// Наблюдатель, объединяющий несколько наблюдателей
#[derive(Default)]
pub struct CompositeStateObserver {
    observers: Vec<Box<dyn StateObserver>>,
}

impl CompositeStateObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn StateObserver>) {
        self.observers.push(observer);
    }
}

impl StateObserver for CompositeStateObserver {
    fn on_state_update(&self, state: &JobControllerState) {
        for observer in &self.observers {
            observer.on_state_update(state);
        }
    }
}
