//! `notify`-backed directory watcher

use super::{DirectoryWatcher, WatchEvent, WatchEventKind};
use crate::error::WatchError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

struct Inner {
    watcher: RecommendedWatcher,
    registered: HashSet<PathBuf>,
}

/// Watches registered directories (non-recursively) with the platform backend
///
/// Events are forwarded on a channel obtained with [`NotifyWatcher::events`].
pub struct NotifyWatcher {
    inner: Mutex<Inner>,
    events: Receiver<WatchEvent>,
}

impl NotifyWatcher {
    /// Create a watcher with no registrations
    pub fn new() -> Result<Self, WatchError> {
        let (tx, rx) = unbounded();

        let watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => forward_event(&tx, event),
            Err(e) => warn!(error = %e, "Watch backend error"),
        })
        .map_err(|e| WatchError::InitFailed(e.to_string()))?;

        Ok(Self {
            inner: Mutex::new(Inner {
                watcher,
                registered: HashSet::new(),
            }),
            events: rx,
        })
    }

    /// Channel of translated events
    pub fn events(&self) -> Receiver<WatchEvent> {
        self.events.clone()
    }
}

impl DirectoryWatcher for NotifyWatcher {
    fn register(&self, dir: &Path) -> Result<bool, WatchError> {
        let mut inner = self.inner.lock();

        if inner.registered.contains(dir) {
            return Ok(false);
        }

        inner
            .watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::RegisterFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        inner.registered.insert(dir.to_path_buf());
        debug!(path = %dir.display(), "Registered for watch");
        Ok(true)
    }

    fn unregister(&self, dir: &Path) -> usize {
        let mut inner = self.inner.lock();

        let dropped: Vec<PathBuf> = inner
            .registered
            .iter()
            .filter(|registered| registered.starts_with(dir))
            .cloned()
            .collect();

        for path in &dropped {
            inner.registered.remove(path);
            // The backend usually dropped the watch with the directory already
            if let Err(e) = inner.watcher.unwatch(path) {
                trace!(path = %path.display(), error = %e, "Unwatch failed");
            }
        }

        if !dropped.is_empty() {
            debug!(path = %dir.display(), count = dropped.len(), "Unregistered from watch");
        }
        dropped.len()
    }

    fn is_registered(&self, dir: &Path) -> bool {
        self.inner.lock().registered.contains(dir)
    }

    fn registered_count(&self) -> usize {
        self.inner.lock().registered.len()
    }
}

fn forward_event(tx: &Sender<WatchEvent>, event: Event) {
    for watch_event in translate(event) {
        trace!(path = %watch_event.path().display(), kind = ?watch_event.kind, "Watch event");
        // The receiver is gone once the crawler shuts down
        if tx.send(watch_event).is_err() {
            return;
        }
    }
}

/// Map a backend event onto created/modified/deleted entries
fn translate(event: Event) -> Vec<WatchEvent> {
    let kinds: Vec<WatchEventKind> = match event.kind {
        EventKind::Create(_) => vec![WatchEventKind::Created; event.paths.len()],
        EventKind::Remove(_) => vec![WatchEventKind::Deleted; event.paths.len()],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            vec![WatchEventKind::Deleted; event.paths.len()]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            vec![WatchEventKind::Created; event.paths.len()]
        }
        // Both: paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            vec![WatchEventKind::Deleted, WatchEventKind::Created]
        }
        EventKind::Modify(_) => vec![WatchEventKind::Modified; event.paths.len()],
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    };

    event
        .paths
        .iter()
        .zip(kinds)
        .filter_map(|(path, kind)| WatchEvent::from_path(path, kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use std::time::Duration;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |ev, p| ev.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_translate_kinds() {
        let created = translate(event(EventKind::Create(CreateKind::File), &["/w/a"]));
        assert_eq!(created, vec![WatchEvent::new("/w", WatchEventKind::Created, "a")]);

        let modified = translate(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/w/a"],
        ));
        assert_eq!(modified[0].kind, WatchEventKind::Modified);

        let removed = translate(event(EventKind::Remove(RemoveKind::File), &["/w/a"]));
        assert_eq!(removed[0].kind, WatchEventKind::Deleted);

        let accessed = translate(event(EventKind::Access(AccessKind::Any), &["/w/a"]));
        assert!(accessed.is_empty());
    }

    #[test]
    fn test_translate_rename_both() {
        let events = translate(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/old", "/w/new"],
        ));
        assert_eq!(
            events,
            vec![
                WatchEvent::new("/w", WatchEventKind::Deleted, "old"),
                WatchEvent::new("/w", WatchEventKind::Created, "new"),
            ]
        );
    }

    #[test]
    fn test_register_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = NotifyWatcher::new().unwrap();

        assert!(watcher.register(dir.path()).unwrap());
        assert!(!watcher.register(dir.path()).unwrap());
        assert!(watcher.is_registered(dir.path()));
        assert_eq!(watcher.registered_count(), 1);
    }

    #[test]
    fn test_unregister_drops_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let nested = sub.join("nested");
        std::fs::create_dir_all(&nested).unwrap();

        let watcher = NotifyWatcher::new().unwrap();
        watcher.register(dir.path()).unwrap();
        watcher.register(&sub).unwrap();
        watcher.register(&nested).unwrap();

        assert_eq!(watcher.unregister(&sub), 2);
        assert!(watcher.is_registered(dir.path()));
        assert!(!watcher.is_registered(&nested));
        assert_eq!(watcher.unregister(&sub), 0);
    }

    #[test]
    fn test_recreated_dir_is_watched_again() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let watcher = NotifyWatcher::new().unwrap();
        let events = watcher.events();
        assert!(watcher.register(&sub).unwrap());

        std::fs::remove_dir(&sub).unwrap();
        watcher.unregister(&sub);
        std::fs::create_dir(&sub).unwrap();
        assert!(watcher.register(&sub).unwrap());

        std::fs::write(sub.join("new.txt"), b"hello").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let mut seen = false;
        while std::time::Instant::now() < deadline {
            if let Ok(ev) = events.recv_timeout(Duration::from_millis(200)) {
                if ev.directory == sub && ev.child == "new.txt" {
                    seen = true;
                    break;
                }
            }
        }
        assert!(seen, "expected an event for a file in the re-created directory");
    }

    #[test]
    fn test_register_missing_dir_fails() {
        let watcher = NotifyWatcher::new().unwrap();
        let err = watcher
            .register(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(err, WatchError::RegisterFailed { .. }));
        assert_eq!(watcher.registered_count(), 0);
    }

    #[test]
    fn test_created_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = NotifyWatcher::new().unwrap();
        watcher.register(dir.path()).unwrap();
        let events = watcher.events();

        std::fs::write(dir.path().join("new.txt"), b"hello").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let mut seen = false;
        while std::time::Instant::now() < deadline {
            if let Ok(ev) = events.recv_timeout(Duration::from_millis(200)) {
                if ev.child == "new.txt" {
                    seen = true;
                    break;
                }
            }
        }
        assert!(seen, "expected an event for new.txt");
    }
}
