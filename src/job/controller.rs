//! Контроллер жизненного цикла задачи генерации
//!
//! Один контроллер ведет одну задачу за раз. `start` отправляет запрос и, если
//! сервис поставил задачу в очередь, опрашивает статус с фиксированным
//! интервалом до завершения. Каждый запуск получает свой номер эпохи; любое
//! изменение состояния из устаревшей эпохи отбрасывается.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::gateway::GenerationGateway;
use crate::job::state::JobControllerState;
use crate::models::{GenerateRequest, GenerateResponse, JobMode, JobState, JobStatus};
use crate::progress::{DefaultStateReporter, StateObserver, StateReporter};

/// Интервал опроса статуса по умолчанию
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Сообщение, если воркер не сообщил текст ошибки
const WORKER_ERROR_FALLBACK: &str = "Worker error";

/// Контроллер задачи генерации
pub struct JobController {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    gateway: Arc<dyn GenerationGateway>,
    poll_interval: Duration,
    epoch: AtomicU64,
    /// Есть ли задача, которую еще не отменили
    active: AtomicBool,
    state_tx: watch::Sender<JobControllerState>,
    /// Порядок уведомлений наблюдателей совпадает с порядком изменений состояния
    publish_lock: Mutex<()>,
    reporter: DefaultStateReporter,
}

impl JobController {
    /// Создать контроллер с интервалом опроса по умолчанию
    pub fn new(gateway: Arc<dyn GenerationGateway>) -> Self {
        Self::with_poll_interval(gateway, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(gateway: Arc<dyn GenerationGateway>, poll_interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(JobControllerState::default());
        Self {
            inner: Arc::new(Inner {
                gateway,
                poll_interval,
                epoch: AtomicU64::new(0),
                active: AtomicBool::new(false),
                state_tx,
                publish_lock: Mutex::new(()),
                reporter: DefaultStateReporter::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Текущий снимок состояния
    pub fn state(&self) -> JobControllerState {
        self.inner.state_tx.borrow().clone()
    }

    /// Подписаться на изменения состояния
    pub fn subscribe(&self) -> watch::Receiver<JobControllerState> {
        self.inner.state_tx.subscribe()
    }

    /// Добавить наблюдателя
    ///
    /// Наблюдатели вызываются синхронно; вызывать из них `start` нельзя.
    pub fn add_observer(&self, observer: Box<dyn StateObserver>) -> usize {
        self.inner.reporter.add_observer(observer)
    }

    /// Удалить наблюдателя по идентификатору
    pub fn remove_observer(&self, id: usize) -> Option<Box<dyn StateObserver>> {
        self.inner.reporter.remove_observer(id)
    }

    /// Запустить новую задачу, отменив текущую
    ///
    /// Результат наблюдается через [`state`](Self::state) или подписку.
    /// Должен вызываться внутри рантайма Tokio.
    pub fn start(&self, request: GenerateRequest) {
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.active.store(true, Ordering::SeqCst);
        self.inner.publish(epoch, |state| *state = JobControllerState::starting());

        log::info!(
            "Starting generation job (epoch {}, engine: {})",
            epoch,
            request.engine.as_str()
        );

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run(epoch, request).await }));
    }

    /// Дождаться, пока текущая задача перестанет выполняться
    ///
    /// После `shutdown` возвращает замороженное состояние сразу.
    pub async fn wait_until_settled(&self) -> JobControllerState {
        let mut rx = self.subscribe();
        let active = &self.inner.active;
        let settled = rx
            .wait_for(|state| !state.is_running || !active.load(Ordering::SeqCst))
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.state())
    }

    /// Остановить опрос; дальнейших обращений к шлюзу и изменений состояния не будет
    pub fn shutdown(&self) {
        let mut task = self.task.lock();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.active.store(false, Ordering::SeqCst);
        if let Some(handle) = task.take() {
            log::debug!("Cancelling job task");
            handle.abort();
        }
        // будим ожидающих wait_until_settled, значение не меняется
        self.inner.state_tx.send_modify(|_| {});
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    /// Применить изменение, если эпоха еще актуальна, и уведомить наблюдателей
    fn publish(&self, epoch: u64, update: impl FnOnce(&mut JobControllerState)) -> bool {
        let _order = self.publish_lock.lock();
        let mut snapshot = None;
        self.state_tx.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            update(state);
            snapshot = Some(state.clone());
            true
        });

        match snapshot {
            Some(state) => {
                self.reporter.notify(&state);
                true
            }
            None => {
                log::debug!("Discarding state update from superseded epoch {}", epoch);
                false
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    async fn run(&self, epoch: u64, request: GenerateRequest) {
        let response = match self.gateway.submit(&request).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Generation request failed: {}", e);
                self.publish(epoch, |state| {
                    *state = JobControllerState {
                        error: Some(e.to_string()),
                        ..JobControllerState::default()
                    }
                });
                return;
            }
        };

        match response {
            GenerateResponse::Sync(result) => {
                log::info!("Generation finished synchronously: {}", result.url);
                self.publish(epoch, |state| {
                    *state = JobControllerState {
                        mode: Some(JobMode::Sync),
                        result: Some(result),
                        ..JobControllerState::default()
                    }
                });
            }
            GenerateResponse::Async(job) => {
                log::info!("Generation queued as job {}", job.job_id);
                let job_id = job.job_id;
                let accepted = self.publish(epoch, |state| {
                    *state = JobControllerState {
                        mode: Some(JobMode::Async),
                        is_running: true,
                        job_id: Some(job_id.clone()),
                        progress: Some(0.0),
                        ..JobControllerState::default()
                    }
                });
                if accepted {
                    self.poll(epoch, &job_id).await;
                }
            }
        }
    }

    /// Опрос статуса; завершается ровно одним исходом: done, error или сбой запроса
    async fn poll(&self, epoch: u64, job_id: &str) {
        let mut ticker = time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.is_current(epoch) {
                return;
            }

            let status = match self.gateway.get_status(job_id).await {
                Ok(status) => status,
                Err(e) => {
                    log::error!("Status request for job {} failed: {}", job_id, e);
                    self.publish(epoch, |state| {
                        state.is_running = false;
                        state.error = Some(e.to_string());
                    });
                    return;
                }
            };

            log::debug!(
                "Job {} is {} ({:?}%)",
                job_id,
                status.state.as_str(),
                status.progress
            );

            match status.state {
                JobState::Queued | JobState::Processing => {
                    let applied = self.publish(epoch, |state| {
                        state.progress = status.progress.or(state.progress);
                        state.status = Some(status);
                    });
                    if !applied {
                        return;
                    }
                }
                JobState::Done => {
                    self.complete(epoch, job_id, status).await;
                    return;
                }
                JobState::Error => {
                    let message = status
                        .error
                        .as_ref()
                        .map(|e| e.message.as_str())
                        .filter(|m| !m.is_empty())
                        .unwrap_or(WORKER_ERROR_FALLBACK)
                        .to_string();
                    log::warn!("Job {} failed on the worker: {}", job_id, message);
                    self.publish(epoch, |state| {
                        *state = JobControllerState {
                            mode: Some(JobMode::Async),
                            job_id: Some(job_id.to_string()),
                            status: Some(status),
                            error: Some(message),
                            ..JobControllerState::default()
                        }
                    });
                    return;
                }
            }
        }
    }

    async fn complete(&self, epoch: u64, job_id: &str, status: JobStatus) {
        let result = match status.result.clone() {
            Some(result) => result,
            None => {
                if !self.is_current(epoch) {
                    return;
                }
                match self.gateway.get_result(job_id).await {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!("Fetching result of job {} failed: {}", job_id, e);
                        self.publish(epoch, |state| {
                            state.is_running = false;
                            state.status = Some(status);
                            state.error = Some(e.to_string());
                        });
                        return;
                    }
                }
            }
        };

        log::info!("Job {} finished: {}", job_id, result.url);
        self.publish(epoch, |state| {
            *state = JobControllerState {
                mode: Some(JobMode::Async),
                is_running: false,
                job_id: Some(job_id.to_string()),
                status: Some(status),
                result: Some(result),
                progress: Some(100.0),
                error: None,
            }
        });
    }
}
