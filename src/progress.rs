//! Модуль для отслеживания прогресса задач генерации
//!
//! Этот модуль предоставляет реализацию паттерна Observer: контроллер задач
//! уведомляет зарегистрированных наблюдателей о каждом новом снимке состояния.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::job::JobControllerState;
use crate::models::JobState;

/// Этап жизненного цикла задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStage {
    /// Задача не запускалась
    Idle,
    /// Запрос отправлен, ответа еще нет
    Submitting,
    /// Задача стоит в очереди
    Queued,
    /// Задача выполняется
    Processing,
    /// Результат получен
    Completed,
    /// Задача завершилась ошибкой
    Failed,
}

impl JobStage {
    /// Определить этап по снимку состояния
    pub fn of(state: &JobControllerState) -> Self {
        if state.error.is_some() {
            return Self::Failed;
        }
        if !state.is_running {
            return if state.result.is_some() { Self::Completed } else { Self::Idle };
        }
        match state.status.as_ref().map(|s| s.state) {
            Some(JobState::Processing) => Self::Processing,
            Some(_) => Self::Queued,
            None if state.job_id.is_some() => Self::Queued,
            None => Self::Submitting,
        }
    }

    /// Получить название этапа в виде строки
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Ожидание",
            Self::Submitting => "Отправка запроса",
            Self::Queued => "В очереди",
            Self::Processing => "Генерация речи",
            Self::Completed => "Готово",
            Self::Failed => "Ошибка",
        }
    }
}

/// Информация о прогрессе задачи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub job_id: Option<String>,
    pub stage: JobStage,
    /// Процент выполнения (0.0 - 100.0)
    pub progress: f32,
    /// Дополнительная информация (например, текст ошибки)
    pub details: Option<String>,
}

impl ProgressInfo {
    /// Построить по снимку состояния контроллера
    pub fn from_state(state: &JobControllerState) -> Self {
        let stage = JobStage::of(state);
        let progress = match stage {
            JobStage::Completed => 100.0,
            _ => state.progress.unwrap_or(0.0),
        };

        Self {
            job_id: state.job_id.clone(),
            stage,
            progress: progress.clamp(0.0, 100.0),
            details: state.error.clone(),
        }
    }
}

/// Трейт для наблюдателя, получающего снимки состояния
pub trait StateObserver: Send + Sync {
    /// Метод, вызываемый после каждого изменения состояния
    fn on_state_update(&self, state: &JobControllerState);
}

/// Трейт для объекта, рассылающего уведомления наблюдателям
pub trait StateReporter: Send + Sync {
    /// Добавить наблюдателя
    ///
    /// Возвращает идентификатор, по которому наблюдателя можно удалить.
    fn add_observer(&self, observer: Box<dyn StateObserver>) -> usize;

    /// Удалить наблюдателя по идентификатору
    fn remove_observer(&self, id: usize) -> Option<Box<dyn StateObserver>>;

    /// Уведомить всех наблюдателей
    fn notify(&self, state: &JobControllerState);
}

/// Реестр наблюдателей по умолчанию
pub struct DefaultStateReporter {
    observers: RwLock<HashMap<usize, Box<dyn StateObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultStateReporter {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

impl Default for DefaultStateReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StateReporter for DefaultStateReporter {
    fn add_observer(&self, observer: Box<dyn StateObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    fn remove_observer(&self, id: usize) -> Option<Box<dyn StateObserver>> {
        self.observers.write().remove(&id)
    }

    fn notify(&self, state: &JobControllerState) {
        let observers = self.observers.read();
        for observer in observers.values() {
            observer.on_state_update(state);
        }
    }
}
