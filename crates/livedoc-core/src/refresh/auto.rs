//! Automatic refresh on storage changes.

use super::{Debouncer, RefreshCoordinator, UserModuleSource};
use crate::config::{normalize_components_folders, Settings};
use crate::loader::LoadTrigger;
use crate::paths::{normalize_slash_path, SOURCE_EXTENSIONS, STORAGE_FILE_NAME};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, trace};

/// A change reported by the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    Modify(String),
    Create(String),
    Delete(String),
    Rename { path: String, old_path: String },
}

impl StorageEvent {
    /// Paths affected by the event; a rename touches both.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::Modify(path) | Self::Create(path) | Self::Delete(path) => vec![path.as_str()],
            Self::Rename { path, old_path } => vec![path.as_str(), old_path.as_str()],
        }
    }
}

/// Whether a change at `path` should schedule an automatic refresh.
#[must_use]
pub fn should_auto_refresh_for_path(path: &str, folders: &[String], enabled: bool, files_loaded: bool) -> bool {
    if !enabled || !files_loaded {
        return false;
    }
    let path = normalize_slash_path(path);
    normalize_components_folders(folders).iter().any(|folder| {
        let inside = path == *folder || path.starts_with(&format!("{folder}/"));
        inside
            && path != format!("{folder}/{STORAGE_FILE_NAME}")
            && SOURCE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    })
}

/// Debounced bridge from storage events to the coordinator.
pub struct AutoRefresh<S: UserModuleSource> {
    coordinator: RefreshCoordinator<S>,
    settings: Arc<RwLock<Settings>>,
    files_loaded: AtomicBool,
    debouncer: Debouncer,
}

impl<S: UserModuleSource> AutoRefresh<S> {
    /// Must be called within a tokio runtime.
    pub fn new(coordinator: RefreshCoordinator<S>, settings: Settings) -> Self {
        let delay = Duration::from_millis(settings.auto_refresh_debounce_ms);
        let settings = Arc::new(RwLock::new(settings));

        let timer_coordinator = coordinator.clone();
        let timer_settings = Arc::clone(&settings);
        let debouncer = Debouncer::spawn(delay, move || {
            let coordinator = timer_coordinator.clone();
            let settings = Arc::clone(&timer_settings);
            async move {
                let enabled = settings
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .auto_refresh_enabled;
                if enabled {
                    coordinator.refresh(LoadTrigger::AutoRefresh).await;
                }
            }
        });

        Self {
            coordinator,
            settings,
            files_loaded: AtomicBool::new(false),
            debouncer,
        }
    }

    /// Run the startup load, then start accepting storage events.
    pub async fn startup(&self) -> bool {
        let ok = self.coordinator.refresh(LoadTrigger::Startup).await;
        self.files_loaded.store(true, Ordering::SeqCst);
        ok
    }

    /// Feed a storage event; returns whether the timer was reset.
    pub fn handle(&self, event: &StorageEvent) -> bool {
        let (folders, enabled) = {
            let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
            (settings.components_folders.clone(), settings.auto_refresh_enabled)
        };
        let files_loaded = self.is_files_loaded();

        let mut scheduled = false;
        for path in event.paths() {
            if should_auto_refresh_for_path(path, &folders, enabled, files_loaded) {
                debug!(target: "livedoc::refresh", path, "auto refresh scheduled");
                self.debouncer.trigger();
                scheduled = true;
            } else {
                trace!(target: "livedoc::refresh", path, "storage change ignored");
            }
        }
        scheduled
    }

    /// Replace settings; the debounce delay applies from the next event.
    pub fn update_settings(&self, settings: Settings) {
        self.debouncer
            .set_delay(Duration::from_millis(settings.auto_refresh_debounce_ms));
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    #[must_use]
    pub fn is_files_loaded(&self) -> bool {
        self.files_loaded.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator<S> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadOutcome;
    use crate::registry::Exports;
    use crate::scope::ScopeGraph;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;

    fn components() -> Vec<String> {
        vec!["Components".to_string()]
    }

    #[test]
    fn test_disabled_or_not_loaded_is_never_eligible() {
        for (enabled, loaded) in [(false, true), (true, false), (false, false)] {
            assert!(!should_auto_refresh_for_path("Components/index.tsx", &components(), enabled, loaded));
        }
    }

    #[test]
    fn test_path_eligibility() {
        let folders = vec!["./Components/".to_string(), "Lib\\ui".to_string()];
        assert!(should_auto_refresh_for_path("Components/index.tsx", &folders, true, true));
        assert!(should_auto_refresh_for_path("Components/nested/style.css", &folders, true, true));
        assert!(should_auto_refresh_for_path("Lib/ui/Button.jsx", &folders, true, true));
        assert!(!should_auto_refresh_for_path("Components/storage.json", &folders, true, true));
        assert!(!should_auto_refresh_for_path("Components/notes.md", &folders, true, true));
        assert!(!should_auto_refresh_for_path("Other/index.tsx", &folders, true, true));
        assert!(!should_auto_refresh_for_path("ComponentsX/index.tsx", &folders, true, true));
    }

    #[test]
    fn test_rename_touches_both_paths() {
        let event = StorageEvent::Rename {
            path: "Components/b.ts".to_string(),
            old_path: "Components/a.ts".to_string(),
        };
        assert_eq!(event.paths(), vec!["Components/b.ts", "Components/a.ts"]);
        assert_eq!(StorageEvent::Delete("x.js".to_string()).paths(), vec!["x.js"]);
    }

    struct CountingSource(AtomicUsize);

    impl UserModuleSource for CountingSource {
        type Value = u32;

        fn load(&self, _trigger: LoadTrigger) -> BoxFuture<'_, LoadOutcome<u32>> {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
                LoadOutcome {
                    registry: Exports::new(),
                    ok: true,
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_before_startup_are_ignored() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let coordinator = RefreshCoordinator::new(Arc::clone(&source), ScopeGraph::new().root());
        let auto = AutoRefresh::new(coordinator, Settings::default());

        assert!(!auto.handle(&StorageEvent::Modify("Components/index.tsx".to_string())));
        assert!(auto.startup().await);
        assert!(auto.is_files_loaded());
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_events_runs_one_refresh() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let coordinator = RefreshCoordinator::new(Arc::clone(&source), ScopeGraph::new().root());
        let auto = AutoRefresh::new(coordinator, Settings::default().with_debounce_ms(300));
        auto.startup().await;

        assert!(auto.handle(&StorageEvent::Modify("Components/index.tsx".to_string())));
        assert!(auto.handle(&StorageEvent::Create("Components/Card.tsx".to_string())));
        assert!(!auto.handle(&StorageEvent::Modify("Notes/today.md".to_string())));

        tokio::time::sleep(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_before_timer_fires() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let coordinator = RefreshCoordinator::new(Arc::clone(&source), ScopeGraph::new().root());
        let auto = AutoRefresh::new(coordinator, Settings::default());
        auto.startup().await;

        assert!(auto.handle(&StorageEvent::Delete("Components/old.ts".to_string())));
        auto.update_settings(Settings::default().with_auto_refresh(false));

        tokio::time::sleep(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }
}
