use rand::thread_rng;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::background::{BackgroundSetter, SettingsStore, uri_to_path};
use crate::catalog::{list_images, pick_random};
use crate::config::{APP_NAME, ConfigStore, PICKER_EXECUTABLE, default_wallpaper_dir};
use crate::host::Host;
use crate::launcher::{
    Cancellation, EventClock, LaunchError, LaunchHandle, LaunchOutcome, LaunchRequest, launch,
};
use crate::resolver::Resolver;
use crate::types::{Action, MenuItem, Notice, Thumbnail};

const TITLE: &str = "Wallpaper Picker";

pub const MENU_ITEMS: [MenuItem; 4] = [
    MenuItem {
        label: "Pick Wallpaper",
        icon: "preferences-desktop-wallpaper-symbolic",
        action: Action::Pick,
    },
    MenuItem {
        label: "Shuffle Wallpaper",
        icon: "media-playlist-shuffle-symbolic",
        action: Action::Shuffle,
    },
    MenuItem {
        label: "Settings",
        icon: "preferences-system-symbolic",
        action: Action::Settings,
    },
    MenuItem {
        label: "Open Wallpapers Folder",
        icon: "folder-pictures-symbolic",
        action: Action::OpenFolder,
    },
];

/// A finished launch, delivered back to the control thread.
#[derive(Debug)]
pub struct Completion {
    pub action: Action,
    pub outcome: LaunchOutcome,
    /// The action already showed its one notice (the "configure first" prompt).
    pub prompted: bool,
}

impl Completion {
    pub fn into_notice(self) -> Option<Notice> {
        if self.prompted {
            if let LaunchOutcome::Failed(err) = &self.outcome {
                warn!(action = %self.action, "launch failed after prompt: {err}");
            }
            return None;
        }
        self.outcome.into_notice()
    }
}

pub type CompletionSink = Arc<dyn Fn(Completion) + Send + Sync>;

pub struct Controller<H, S> {
    host: H,
    config: ConfigStore,
    resolver: Resolver,
    background: BackgroundSetter<S>,
    clock: EventClock,
    detached: Cancellation,
    sink: CompletionSink,
}

impl<H: Host, S: SettingsStore> Controller<H, S> {
    pub fn new(
        host: H,
        config: ConfigStore,
        resolver: Resolver,
        settings: S,
        sink: CompletionSink,
    ) -> Self {
        Self {
            host,
            config,
            resolver,
            background: BackgroundSetter::new(settings),
            clock: EventClock::default(),
            detached: Cancellation::default(),
            sink,
        }
    }

    #[cfg(test)]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Runs one menu action. `timestamp` is the input event time if the host knows it.
    pub fn activate(&self, action: Action, timestamp: Option<u32>) -> Option<LaunchHandle> {
        debug!(%action, "menu action");
        match action {
            Action::Pick => self.on_pick_activated(timestamp),
            Action::Shuffle => self.on_shuffle_activated(timestamp),
            Action::Settings => self.on_settings_activated(timestamp),
            Action::OpenFolder => {
                self.on_open_folder_activated();
                None
            }
        }
    }

    pub fn on_pick_activated(&self, timestamp: Option<u32>) -> Option<LaunchHandle> {
        self.launch_configured(Action::Pick, &[], timestamp)
    }

    pub fn on_shuffle_activated(&self, timestamp: Option<u32>) -> Option<LaunchHandle> {
        self.launch_configured(Action::Shuffle, &["--shuffle"], timestamp)
    }

    pub fn on_settings_activated(&self, timestamp: Option<u32>) -> Option<LaunchHandle> {
        self.launch_picker(Action::Settings, &["--settings"], None, timestamp)
    }

    pub fn on_open_folder_activated(&self) {
        let Some(dir) = self.config.primary_directory() else {
            self.host
                .notify(&Notice::new(TITLE, "No wallpaper folder configured."));
            return;
        };
        if !dir.is_dir() {
            self.host.notify(&Notice::new(
                TITLE,
                format!("Folder not found: {}", dir.display()),
            ));
            return;
        }
        if let Err(err) = self.host.open_folder(&dir) {
            self.host.notify(&Notice::new(TITLE, format!("{err:#}")));
        }
    }

    /// Stops caring about running launches; they are still reaped but report nothing.
    pub fn detach(&self) {
        self.detached.cancel();
    }

    /// Shows the notice for a finished launch, if it needs one.
    pub fn finish(&self, completion: Completion) {
        if let Some(notice) = completion.into_notice() {
            self.host.notify(&notice);
        }
    }

    fn launch_configured(
        &self,
        action: Action,
        args: &[&str],
        timestamp: Option<u32>,
    ) -> Option<LaunchHandle> {
        if self.config.primary_directory().is_none() {
            let prompt = Notice::new(
                TITLE,
                "No wallpaper folder configured. Choose one in the settings.",
            );
            return self.launch_picker(action, &["--settings"], Some(prompt), timestamp);
        }
        self.launch_picker(action, args, None, timestamp)
    }

    fn launch_picker(
        &self,
        action: Action,
        args: &[&str],
        prompt: Option<Notice>,
        timestamp: Option<u32>,
    ) -> Option<LaunchHandle> {
        let Some(program) = self.resolver.resolve(PICKER_EXECUTABLE) else {
            let outcome =
                LaunchOutcome::Failed(LaunchError::ExecutableNotFound(PICKER_EXECUTABLE.to_string()));
            self.finish(Completion {
                action,
                outcome,
                prompted: false,
            });
            return None;
        };
        let prompted = prompt.is_some();
        if let Some(prompt) = prompt {
            self.host.notify(&prompt);
        }
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now());
        let request = LaunchRequest::new(
            APP_NAME,
            program,
            args.iter().map(|arg| arg.to_string()).collect(),
            timestamp,
        );
        let sink = self.sink.clone();
        Some(launch(request, self.detached.clone(), move |outcome| {
            sink(Completion {
                action,
                outcome,
                prompted,
            });
        }))
    }

    fn wallpaper_dirs(&self) -> Vec<PathBuf> {
        let dirs = self.config.load().wall_dirs;
        if dirs.is_empty() {
            return default_wallpaper_dir().into_iter().collect();
        }
        dirs
    }

    /// Thumbnail rows for the direct front-end, marking the current background.
    pub fn grid(&self, columns: usize) -> Vec<Vec<Thumbnail>> {
        let Some(dir) = self.wallpaper_dirs().into_iter().next() else {
            return Vec::new();
        };
        let current = self.background.current().and_then(|uri| uri_to_path(&uri));
        let thumbs: Vec<Thumbnail> = list_images(&dir)
            .into_iter()
            .map(|name| {
                let path = dir.join(name);
                let active = current.as_ref() == Some(&path);
                Thumbnail { path, active }
            })
            .collect();
        thumbs
            .chunks(columns.max(1))
            .map(<[Thumbnail]>::to_vec)
            .collect()
    }

    /// Sets `path` as the background. Returns false after notifying on failure.
    pub fn apply(&self, path: &Path) -> bool {
        let mode = self.config.load().picture_mode;
        match self.background.set_background(path, mode.as_deref()) {
            Ok(_) => true,
            Err(err) => {
                self.host.notify(&Notice::new(TITLE, err.to_string()));
                false
            }
        }
    }

    pub fn current(&self) -> Option<String> {
        self.background.current()
    }

    /// Picks a random image from the configured folders and applies it in-process.
    pub fn shuffle_direct(&self) -> Option<PathBuf> {
        let Some(choice) = pick_random(&self.wallpaper_dirs(), &mut thread_rng()) else {
            self.host.notify(&Notice::new(TITLE, "No wallpapers found"));
            return None;
        };
        info!(path = %choice.display(), "shuffled");
        self.apply(&choice).then_some(choice)
    }
}
