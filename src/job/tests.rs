//! Тесты контроллера задач на управляемом времени Tokio

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::*;
use crate::error::{Result, TtsStudioError};
use crate::gateway::GenerationGateway;
use crate::models::{
    AsyncJob, Engine, ExportFormat, ExportOptions, GenerateRequest, GenerateResponse, JobMode, JobState,
    JobStatus, QualityMetrics, SynthesisConfig, SyncResult,
};
use crate::notification::MemoryStateObserver;

type Scripted<T> = std::result::Result<T, String>;

/// Шлюз с заранее заданными ответами
#[derive(Default)]
struct ScriptedGateway {
    submits: Mutex<VecDeque<Scripted<GenerateResponse>>>,
    statuses: Mutex<HashMap<String, VecDeque<Scripted<JobStatus>>>>,
    result: Mutex<Option<Scripted<SyncResult>>>,
    status_delay: Duration,
    submit_calls: Mutex<Vec<GenerateRequest>>,
    status_calls: Mutex<Vec<String>>,
    result_calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn new() -> Self {
        Self::default()
    }

    fn on_submit(self, response: Scripted<GenerateResponse>) -> Self {
        self.submits.lock().push_back(response);
        self
    }

    /// Статусы выдаются по одному на вызов; последний повторяется
    fn on_status(self, job_id: &str, statuses: Vec<Scripted<JobStatus>>) -> Self {
        self.statuses.lock().insert(job_id.to_string(), statuses.into());
        self
    }

    fn on_result(self, result: Scripted<SyncResult>) -> Self {
        *self.result.lock() = Some(result);
        self
    }

    fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    fn status_calls(&self) -> Vec<String> {
        self.status_calls.lock().clone()
    }

    fn result_calls(&self) -> Vec<String> {
        self.result_calls.lock().clone()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn submit(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        self.submit_calls.lock().push(request.clone());
        let next = self.submits.lock().pop_front();
        next.unwrap_or_else(|| Err("no scripted submit".to_string()))
            .map_err(TtsStudioError::Gateway)
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatus> {
        self.status_calls.lock().push(job_id.to_string());
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }

        let next = {
            let mut statuses = self.statuses.lock();
            match statuses.get_mut(job_id) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        next.unwrap_or_else(|| Err(format!("unknown job {}", job_id)))
            .map_err(TtsStudioError::Gateway)
    }

    async fn get_result(&self, job_id: &str) -> Result<SyncResult> {
        self.result_calls.lock().push(job_id.to_string());
        let result = self.result.lock().clone();
        result
            .unwrap_or_else(|| Err("no scripted result".to_string()))
            .map_err(TtsStudioError::Gateway)
    }
}

fn request() -> GenerateRequest {
    GenerateRequest::new(Engine::Xtts, "xin chào", SynthesisConfig::new("vi_VN-vais1000-medium"))
        .with_export(ExportOptions::new(ExportFormat::Mp3).with_bitrate(192))
}

fn sync_result(url: &str) -> SyncResult {
    SyncResult {
        engine: Some("piper".to_string()),
        url: url.to_string(),
        filename: url.rsplit('/').next().map(str::to_string),
        format: Some(ExportFormat::Mp3),
        metrics: Some(QualityMetrics {
            lufs_integrated: -16.0,
            true_peak_db: -1.0,
            duration_sec: 1.0,
            rms: None,
            crest_factor: None,
            snr_approx: None,
            clipping_count: None,
            silence_gaps_ms: None,
            quality_score: None,
            warnings: None,
        }),
        duration: Some(1.0),
    }
}

fn async_response(job_id: &str) -> GenerateResponse {
    GenerateResponse::Async(AsyncJob {
        job_id: job_id.to_string(),
        engine: Some("xtts".to_string()),
    })
}

fn setup(gateway: ScriptedGateway) -> (Arc<ScriptedGateway>, JobController, MemoryStateObserver) {
    let gateway = Arc::new(gateway);
    let controller = JobController::new(gateway.clone());
    let observer = MemoryStateObserver::new();
    controller.add_observer(Box::new(observer.clone()));
    (gateway, controller, observer)
}

async fn wait_for(
    controller: &JobController,
    predicate: impl FnMut(&JobControllerState) -> bool,
) -> JobControllerState {
    let mut rx = controller.subscribe();
    let state = rx.wait_for(predicate).await.expect("controller state channel closed").clone();
    state
}

#[tokio::test(start_paused = true)]
async fn test_sync_response_finishes_immediately() {
    let result = sync_result("http://localhost:8000/outputs/out.mp3");
    let (gateway, controller, observer) =
        setup(ScriptedGateway::new().on_submit(Ok(GenerateResponse::Sync(result.clone()))));

    assert_eq!(controller.state(), JobControllerState::default());

    controller.start(request().with_mode_hint(JobMode::Async));
    let state = controller.wait_until_settled().await;

    assert_eq!(
        state,
        JobControllerState {
            mode: Some(JobMode::Sync),
            is_running: false,
            result: Some(result),
            ..JobControllerState::default()
        }
    );
    assert!(state.succeeded());
    assert!(gateway.status_calls().is_empty());
    assert!(gateway.result_calls().is_empty());

    let history = observer.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], JobControllerState::starting());
}

#[tokio::test(start_paused = true)]
async fn test_async_job_polls_until_done_with_embedded_result() {
    let result = sync_result("http://localhost:8000/outputs/xtts.mp3");
    let (gateway, controller, observer) = setup(
        ScriptedGateway::new().on_submit(Ok(async_response("job-1"))).on_status(
            "job-1",
            vec![
                Ok(JobStatus::new("job-1", JobState::Queued).with_progress(0.0)),
                Ok(JobStatus::new("job-1", JobState::Processing).with_progress(50.0)),
                Ok(JobStatus::new("job-1", JobState::Done)
                    .with_progress(100.0)
                    .with_result(result.clone())),
            ],
        ),
    );

    let started = Instant::now();
    controller.start(request());

    let state = wait_for(&controller, |s| s.job_id.is_some()).await;
    assert_eq!(state.mode, Some(JobMode::Async));
    assert!(state.is_running);
    assert_eq!(state.job_id.as_deref(), Some("job-1"));
    assert_eq!(state.progress, Some(0.0));
    assert!(gateway.status_calls().is_empty());

    let state = wait_for(&controller, |s| {
        s.status.as_ref().map(|st| st.state) == Some(JobState::Queued)
    })
    .await;
    assert_eq!(state.progress, Some(0.0));
    assert!(started.elapsed() >= Duration::from_millis(1000));

    let state = wait_for(&controller, |s| {
        s.status.as_ref().map(|st| st.state) == Some(JobState::Processing)
    })
    .await;
    assert_eq!(state.progress, Some(50.0));
    assert_eq!(state.job_id.as_deref(), Some("job-1"));

    let state = controller.wait_until_settled().await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3000) && elapsed < Duration::from_millis(3100));
    assert!(!state.is_running);
    assert_eq!(state.progress, Some(100.0));
    assert_eq!(state.result, Some(result));
    assert_eq!(state.error, None);
    assert_eq!(gateway.status_calls().len(), 3);
    assert!(gateway.result_calls().is_empty());

    // starting, async, queued, processing, done
    assert_eq!(observer.history().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_done_without_result_fetches_it_once() {
    let result = sync_result("/outputs/job-2.mp3");
    let (gateway, controller, _observer) = setup(
        ScriptedGateway::new()
            .on_submit(Ok(async_response("job-2")))
            .on_status(
                "job-2",
                vec![
                    Ok(JobStatus::new("job-2", JobState::Processing).with_progress(20.0)),
                    Ok(JobStatus::new("job-2", JobState::Done).with_progress(100.0)),
                ],
            )
            .on_result(Ok(result.clone())),
    );

    controller.start(request());
    let state = controller.wait_until_settled().await;

    assert_eq!(state.result, Some(result));
    assert_eq!(state.progress, Some(100.0));
    assert_eq!(state.error, None);
    assert_eq!(state.status.map(|s| s.state), Some(JobState::Done));
    assert_eq!(gateway.result_calls(), vec!["job-2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_worker_error_is_surfaced() {
    let (gateway, controller, _observer) = setup(
        ScriptedGateway::new().on_submit(Ok(async_response("job-3"))).on_status(
            "job-3",
            vec![Ok(JobStatus::new("job-3", JobState::Error).with_error("WORKER_ERROR", "Worker exploded"))],
        ),
    );

    controller.start(request());
    let state = controller.wait_until_settled().await;

    assert!(state.failed());
    assert_eq!(state.error.as_deref(), Some("Worker exploded"));
    assert_eq!(state.job_id.as_deref(), Some("job-3"));
    let status = state.status.unwrap();
    assert_eq!(status.state, JobState::Error);
    assert_eq!(status.error.unwrap().code, "WORKER_ERROR");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.status_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_worker_error_without_message_uses_fallback() {
    let (_gateway, controller, _observer) = setup(
        ScriptedGateway::new()
            .on_submit(Ok(async_response("job-5")))
            .on_status("job-5", vec![Ok(JobStatus::new("job-5", JobState::Error))]),
    );

    controller.start(request());
    let state = controller.wait_until_settled().await;
    assert_eq!(state.error.as_deref(), Some("Worker error"));
}

#[tokio::test(start_paused = true)]
async fn test_worker_error_message_is_published_verbatim() {
    let (_gateway, controller, _observer) = setup(
        ScriptedGateway::new().on_submit(Ok(async_response("job-6"))).on_status(
            "job-6",
            vec![Ok(JobStatus::new("job-6", JobState::Error).with_error("OOM", "  CUDA out of memory\n"))],
        ),
    );

    controller.start(request());
    let state = controller.wait_until_settled().await;
    assert_eq!(state.error.as_deref(), Some("  CUDA out of memory\n"));
}

#[tokio::test(start_paused = true)]
async fn test_status_failure_stops_polling() {
    let (gateway, controller, _observer) = setup(
        ScriptedGateway::new()
            .on_submit(Ok(async_response("job-4")))
            .on_status("job-4", vec![Err("network down".to_string())]),
    );

    controller.start(request());
    let state = controller.wait_until_settled().await;

    assert!(!state.is_running);
    assert_eq!(state.error.as_deref(), Some("network down"));
    assert_eq!(state.job_id.as_deref(), Some("job-4"));
    assert_eq!(state.mode, Some(JobMode::Async));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(gateway.status_calls().len(), 1);
    assert_eq!(controller.state(), state);
}

#[tokio::test(start_paused = true)]
async fn test_result_fetch_failure_keeps_done_status() {
    let (_gateway, controller, _observer) = setup(
        ScriptedGateway::new()
            .on_submit(Ok(async_response("job-6")))
            .on_status("job-6", vec![Ok(JobStatus::new("job-6", JobState::Done))])
            .on_result(Err("HTTP 404: Result not ready".to_string())),
    );

    controller.start(request());
    let state = controller.wait_until_settled().await;

    assert_eq!(state.error.as_deref(), Some("HTTP 404: Result not ready"));
    assert_eq!(state.status.map(|s| s.state), Some(JobState::Done));
    assert_eq!(state.result, None);
}

#[tokio::test(start_paused = true)]
async fn test_submit_failure_sets_error() {
    let (gateway, controller, _observer) =
        setup(ScriptedGateway::new().on_submit(Err("bad request".to_string())));

    controller.start(request());
    let state = controller.wait_until_settled().await;

    assert!(!state.is_running);
    assert_eq!(state.error.as_deref(), Some("bad request"));
    assert_eq!(state.job_id, None);
    assert_eq!(state.mode, None);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(gateway.status_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_progress_falls_back_when_status_omits_it() {
    let (_gateway, controller, _observer) = setup(
        ScriptedGateway::new().on_submit(Ok(async_response("job-7"))).on_status(
            "job-7",
            vec![
                Ok(JobStatus::new("job-7", JobState::Queued).with_progress(30.0)),
                Ok(JobStatus::new("job-7", JobState::Processing)),
                Ok(JobStatus::new("job-7", JobState::Error).with_error("E", "late failure")),
            ],
        ),
    );

    controller.start(request());
    let state = wait_for(&controller, |s| {
        s.status.as_ref().map(|st| st.state) == Some(JobState::Processing)
    })
    .await;
    assert_eq!(state.progress, Some(30.0));

    let state = controller.wait_until_settled().await;
    assert_eq!(state.error.as_deref(), Some("late failure"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_before_first_tick_discards_old_job() {
    let (gateway, controller, _observer) = setup(
        ScriptedGateway::new()
            .on_submit(Ok(async_response("job-old")))
            .on_submit(Ok(GenerateResponse::Sync(sync_result("/outputs/new.mp3"))))
            .on_status(
                "job-old",
                vec![Ok(JobStatus::new("job-old", JobState::Done).with_result(sync_result("/outputs/old.mp3")))],
            ),
    );

    controller.start(request());
    wait_for(&controller, |s| s.job_id.as_deref() == Some("job-old")).await;

    controller.start(request());
    let state = controller.wait_until_settled().await;
    assert_eq!(state.mode, Some(JobMode::Sync));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(gateway.status_calls().is_empty());
    let current = controller.state();
    assert_eq!(current, state);
    assert_eq!(current.result.map(|r| r.url), Some("/outputs/new.mp3".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_inflight_poll_discards_old_status() {
    let (gateway, controller, observer) = setup(
        ScriptedGateway::new()
            .with_status_delay(Duration::from_millis(500))
            .on_submit(Ok(async_response("job-old")))
            .on_submit(Ok(GenerateResponse::Sync(sync_result("/outputs/new.mp3"))))
            .on_status(
                "job-old",
                vec![Ok(JobStatus::new("job-old", JobState::Processing).with_progress(70.0))],
            ),
    );

    controller.start(request());
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(gateway.status_calls(), vec!["job-old".to_string()]);

    controller.start(request());
    let state = controller.wait_until_settled().await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(controller.state(), state);
    assert_eq!(state.mode, Some(JobMode::Sync));
    assert_eq!(state.status, None);
    assert_eq!(gateway.status_calls().len(), 1);

    let history = observer.history();
    let restart = history
        .iter()
        .rposition(|s| *s == JobControllerState::starting())
        .unwrap();
    assert!(history[restart..].iter().all(|s| s.job_id.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_drop_cancels_polling() {
    let (gateway, controller, observer) = setup(
        ScriptedGateway::new()
            .on_submit(Ok(async_response("job-8")))
            .on_status("job-8", vec![Ok(JobStatus::new("job-8", JobState::Processing))]),
    );

    controller.start(request());
    wait_for(&controller, |s| s.job_id.is_some()).await;
    let updates = observer.history().len();

    drop(controller);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(gateway.status_calls().is_empty());
    assert_eq!(observer.history().len(), updates);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_freezes_state_and_allows_restart() {
    let (gateway, controller, _observer) = setup(
        ScriptedGateway::new()
            .on_submit(Ok(async_response("job-9")))
            .on_submit(Ok(GenerateResponse::Sync(sync_result("/outputs/after.mp3"))))
            .on_status("job-9", vec![Ok(JobStatus::new("job-9", JobState::Queued))]),
    );

    controller.start(request());
    let frozen = wait_for(&controller, |s| s.status.is_some()).await;
    controller.shutdown();
    controller.shutdown();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(controller.state(), frozen);
    assert_eq!(gateway.status_calls().len(), 1);

    controller.start(request());
    let state = controller.wait_until_settled().await;
    assert!(state.succeeded());
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_settled_returns_after_shutdown() {
    let (_gateway, controller, _observer) = setup(
        ScriptedGateway::new()
            .on_submit(Ok(async_response("job-10")))
            .on_status("job-10", vec![Ok(JobStatus::new("job-10", JobState::Processing))]),
    );

    controller.start(request());
    wait_for(&controller, |s| s.status.is_some()).await;

    let (settled, _) = tokio::join!(
        tokio::time::timeout(Duration::from_secs(60), controller.wait_until_settled()),
        async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            controller.shutdown();
        }
    );
    let settled = settled.expect("wait_until_settled hung after shutdown");
    assert!(settled.is_running);
    assert_eq!(settled, controller.state());

    let again = tokio::time::timeout(Duration::from_secs(60), controller.wait_until_settled()).await;
    assert_eq!(again.expect("wait_until_settled hung after shutdown"), settled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observers_see_updates_in_publish_order() {
    let mut gateway = ScriptedGateway::new();
    for i in 0..50 {
        gateway = gateway.on_submit(Ok(GenerateResponse::Sync(sync_result(&format!("/outputs/{}.mp3", i)))));
    }
    let (_gateway, controller, observer) = setup(gateway);

    for _ in 0..50 {
        controller.start(request());
        tokio::task::yield_now().await;
    }
    let state = controller.wait_until_settled().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(state.succeeded());
    assert_eq!(observer.last(), Some(controller.state()));
}
