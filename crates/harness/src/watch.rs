//! File watching for `rigger watch`
//!
//! Filesystem events from `notify` are bridged into a tokio channel,
//! filtered through the configured glob patterns and debounced into
//! batches of changed paths.

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use rigger_common::WatchConfig;

use crate::error::HarnessResult;

/// Compile watch patterns into one matcher
pub fn build_matcher(patterns: &[String]) -> HarnessResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

pub struct FileWatcher {
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    matcher: GlobSet,
    base: PathBuf,
    debounce: Duration,
}

impl FileWatcher {
    /// Watch `config.paths` (relative to `base`) recursively
    pub fn new(config: &WatchConfig, base: &Path) -> HarnessResult<Self> {
        let base = base.canonicalize()?;
        let matcher = build_matcher(&config.patterns)?;

        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        for path in &config.paths {
            let root = base.join(path).canonicalize()?;
            watcher.watch(&root, RecursiveMode::Recursive)?;
            debug!("Watching {}", root.display());
        }

        Ok(Self {
            _watcher: watcher,
            events,
            matcher,
            base,
            debounce: config.debounce(),
        })
    }

    /// Whether a changed path matches the watch patterns
    pub fn is_match(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.base).unwrap_or(path);
        self.matcher.is_match(relative)
    }

    /// Wait for the next burst of relevant changes
    ///
    /// Returns the changed paths once no further matching event arrived
    /// within the debounce window, or None when the watcher shut down.
    /// Events that match nothing do not extend the window.
    pub async fn next_change(&mut self) -> Option<Vec<PathBuf>> {
        let mut changed = BTreeSet::new();

        while changed.is_empty() {
            let event = self.events.recv().await?;
            self.collect(event, &mut changed);
        }

        let mut deadline = Instant::now() + self.debounce;
        loop {
            match timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => {
                    if self.collect(event, &mut changed) {
                        deadline = Instant::now() + self.debounce;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        Some(changed.into_iter().collect())
    }

    /// Add the matching paths of `event`; true if any path matched
    fn collect(&self, event: notify::Result<Event>, changed: &mut BTreeSet<PathBuf>) -> bool {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!("Watch error: {}", e);
                return false;
            }
        };
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        let mut matched = false;
        for path in event.paths {
            if self.is_match(&path) {
                changed.insert(path);
                matched = true;
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(patterns: &[&str]) -> WatchConfig {
        WatchConfig {
            paths: vec![PathBuf::from("src")],
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            task: "build".to_string(),
            debounce_ms: 100,
        }
    }

    #[test]
    fn test_matcher_is_relative_to_base() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        let watcher = FileWatcher::new(&config(&["src/**/*.js"]), tmp.path()).unwrap();
        let base = tmp.path().canonicalize().unwrap();

        assert!(watcher.is_match(&base.join("src/app/main.js")));
        assert!(!watcher.is_match(&base.join("src/app/styles.scss")));
        assert!(!watcher.is_match(&base.join("dist/main.js")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(build_matcher(&["src/[".to_string()]).is_err());
    }

    #[test]
    fn test_missing_watch_path() {
        let tmp = TempDir::new().unwrap();
        assert!(FileWatcher::new(&config(&["**/*"]), tmp.path()).is_err());
    }

    #[tokio::test]
    async fn test_change_is_reported() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        let mut watcher = FileWatcher::new(&config(&["**/*.js"]), tmp.path()).unwrap();

        let src = tmp.path().join("src");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            std::fs::write(src.join("ignored.txt"), "x").unwrap();
            std::fs::write(src.join("app.js"), "let a = 1;").unwrap();
        });

        let changed = tokio::time::timeout(Duration::from_secs(5), watcher.next_change())
            .await
            .unwrap()
            .unwrap();

        assert!(!changed.is_empty());
        assert!(changed.iter().all(|p| p.extension().unwrap() == "js"));
    }

    #[tokio::test]
    async fn test_unrelated_events_do_not_hold_back_a_change() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        let mut watcher = FileWatcher::new(&config(&["**/*.js"]), tmp.path()).unwrap();

        let src = tmp.path().join("src");
        let noise = tokio::spawn(async move {
            std::fs::write(src.join("app.js"), "let a = 1;").unwrap();
            // Keep touching a non-matching file for longer than the wait below
            for i in 0..150 {
                std::fs::write(src.join("build.log"), i.to_string()).unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let changed = tokio::time::timeout(Duration::from_secs(2), watcher.next_change())
            .await
            .unwrap()
            .unwrap();
        noise.abort();

        assert_eq!(changed.len(), 1);
        assert!(changed[0].ends_with("app.js"));
    }
}
