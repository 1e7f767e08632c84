#![allow(dead_code)]

use async_trait::async_trait;
use deploy_hook::error::{HookError, Result};
use deploy_hook::invalidate::{
    CacheInvalidator, InvalidationClient, InvalidationRequest, StaticCredentials,
};
use deploy_hook::job::DeploymentJob;
use deploy_hook::webhook::PushEvent;
use deploy_hook::{AppState, CdnConfig, HookConfig, SharedState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use uuid::Uuid;

pub const SECRET: &str = "test-secret";

/// Scratch directory removed on drop
pub struct TestDir {
    pub path: PathBuf,
}

impl TestDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("deploy_hook-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Writes a shell script; it is run through /bin/sh so it needs no exec bit.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Number of lines in `path`, 0 when it doesn't exist
pub fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Polls `condition` every 25ms until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Records every invalidation request; distribution ids in `failing` error out.
#[derive(Default)]
pub struct RecordingClient {
    requests: Mutex<Vec<InvalidationRequest>>,
    failing: HashSet<String>,
}

impl RecordingClient {
    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failing: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn requests(&self) -> Vec<InvalidationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvalidationClient for RecordingClient {
    async fn create_invalidation(&self, request: &InvalidationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.distribution_id) {
            return Err(HookError::InvalidationFailed(format!(
                "AccessDenied for {}",
                request.distribution_id
            )));
        }
        Ok(format!("I{}", request.distribution_id))
    }
}

pub fn both_distributions() -> CdnConfig {
    CdnConfig {
        book_distribution_id: Some("EBOOK".to_string()),
        docs_distribution_id: Some("EDOCS".to_string()),
    }
}

pub fn invalidator(
    cdn: &CdnConfig,
    credentials: bool,
    client: &Arc<RecordingClient>,
) -> CacheInvalidator {
    let client: Arc<dyn InvalidationClient> = client.clone();
    CacheInvalidator::from_config(cdn, Arc::new(StaticCredentials(credentials)), client)
}

/// App state running `script` with both distributions and credentials present
pub fn state(script: &Path, client: &Arc<RecordingClient>) -> SharedState {
    let config = HookConfig {
        secret: SECRET.to_string(),
        script: script.to_path_buf(),
        cdn: both_distributions(),
        ..HookConfig::default()
    };
    let invalidator = invalidator(&config.cdn, true, client);
    Arc::new(AppState::new(config, invalidator))
}

pub fn job(script: &Path) -> DeploymentJob {
    DeploymentJob::new(
        "/bin/sh",
        script,
        PushEvent {
            git_ref: "refs/heads/master".to_string(),
            commit_sha: Some("0123abc".to_string()),
            pusher_name: Some("octocat".to_string()),
        },
    )
}

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub target: String,
    pub message: String,
    pub stream: Option<String>,
}

/// Layer keeping every event in memory, in emission order
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn script_lines(&self) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.target == deploy_hook::runner::SCRIPT_LOG_TARGET)
            .collect()
    }

    /// Index of the first event whose message contains `needle`
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.events().iter().position(|e| e.message.contains(needle))
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    stream: Option<String>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "stream" => self.stream = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "stream" => self.stream = Some(format!("{:?}", value)),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            target: event.metadata().target().to_string(),
            message: visitor.message,
            stream: visitor.stream,
        });
    }
}

/// Routes this thread's events into a fresh capture until the guard drops.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
