//! Reload the model when its artifact changes on disk.
//!
//! The watcher observes the artifact's parent directory rather than the file itself, so atomic
//! replacement (write a temp file, rename over the artifact) is seen as well as in-place writes.
//! Bursts of events are collapsed: a reload happens once no further event has arrived for the
//! configured debounce period.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::model::ModelStore;

/// Start watching the store's artifact. The returned task ends when `shutdown_token` is cancelled.
#[instrument(skip_all, fields(path = %models.path().display()))]
pub fn spawn_model_watcher(
    models: Arc<ModelStore>,
    debounce: Duration,
    shutdown_token: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let path = models.path().to_path_buf();
    let file_name = path
        .file_name()
        .with_context(|| format!("model path '{}' does not name a file", path.display()))?
        .to_os_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    let (tx, rx) = unbounded_channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        // Receiver gone means the task has stopped
        let _ = tx.send(event);
    })
    .context("Failed to create model file watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch model directory '{}'", dir.display()))?;

    info!("Watching {} for model changes", path.display());

    Ok(tokio::spawn(async move {
        // Dropping the watcher stops event delivery
        let _watcher = watcher;
        run(models, rx, file_name, debounce, shutdown_token).await;
    }))
}

async fn run(
    models: Arc<ModelStore>,
    mut events: UnboundedReceiver<notify::Result<Event>>,
    file_name: OsString,
    debounce: Duration,
    shutdown_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!("Received shutdown signal, stopping model watcher");
                break;
            }

            event = events.recv() => match event {
                Some(Ok(event)) if touches_artifact(&event, &file_name) => {
                    debug!("Model artifact changed: {:?}", event.kind);
                    tokio::select! {
                        _ = shutdown_token.cancelled() => break,
                        _ = settle(&mut events, debounce) => {}
                    }
                    // Failures are logged by the store; the previous model keeps serving
                    let _ = models.reload().await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!("Model watcher error: {}", e),
                None => {
                    warn!("Model watcher event stream closed");
                    break;
                }
            }
        }
    }
}

/// Wait until no event has arrived for `debounce`.
async fn settle(events: &mut UnboundedReceiver<notify::Result<Event>>, debounce: Duration) {
    while let Ok(Some(_)) = tokio::time::timeout(debounce, events.recv()).await {}
}

fn touches_artifact(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeatureRow;
    use crate::test_utils::{MODEL_FILE, constant_model_json, write_model};
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::path::PathBuf;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_touches_artifact() {
        let name = OsString::from(MODEL_FILE);
        assert!(touches_artifact(&event(EventKind::Create(CreateKind::File), "/m/node_volume_model.json"), &name));
        assert!(touches_artifact(&event(EventKind::Modify(ModifyKind::Any), "/m/node_volume_model.json"), &name));
        assert!(!touches_artifact(&event(EventKind::Modify(ModifyKind::Any), "/m/other.json"), &name));
        assert!(!touches_artifact(&event(EventKind::Remove(RemoveKind::File), "/m/node_volume_model.json"), &name));
    }

    #[test_log::test(tokio::test)]
    async fn test_watcher_reloads_changed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(dir.path(), &constant_model_json(10.0));
        let models = Arc::new(ModelStore::new(&path));
        models.load().await.unwrap();

        let shutdown_token = CancellationToken::new();
        let handle = spawn_model_watcher(models.clone(), Duration::from_millis(50), shutdown_token.clone()).unwrap();

        write_model(dir.path(), &constant_model_json(77.0));

        let row = FeatureRow::new(1, 1);
        let mut volume = 0.0;
        for _ in 0..100 {
            volume = models.current().unwrap().predict_volume(&row).unwrap();
            if volume == 77.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(volume, 77.0);

        shutdown_token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_watcher_requires_existing_directory() {
        let models = Arc::new(ModelStore::new("/definitely/not/here/node_volume_model.json"));
        assert!(spawn_model_watcher(models, Duration::from_millis(50), CancellationToken::new()).is_err());
    }
}
