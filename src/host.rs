//! What the agent needs from whatever renders its menu.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::APP_NAME;
use crate::launcher::{Cancellation, EventClock, LaunchOutcome, LaunchRequest, launch};
use crate::types::Notice;

pub trait Host {
    fn notify(&self, notice: &Notice);
    fn open_folder(&self, dir: &Path) -> Result<()>;
}

/// Desktop host: `notify-send` for notices, `xdg-open` for folders.
#[derive(Default)]
pub struct DesktopHost {
    clock: EventClock,
}

impl DesktopHost {
    fn spawn_detached(&self, program: &str, args: Vec<String>) {
        let request = LaunchRequest::new(APP_NAME, PathBuf::from(program), args, self.clock.now());
        let program = program.to_string();
        // the reaper thread outlives the handle
        let _ = launch(request, Cancellation::default(), move |outcome| {
            if let LaunchOutcome::Failed(err) = outcome {
                warn!(program = %program, "{err}");
            }
        });
    }
}

impl Host for DesktopHost {
    fn notify(&self, notice: &Notice) {
        info!(title = %notice.title, "{}", notice.message);
        self.spawn_detached(
            "notify-send",
            vec![
                "--app-name".to_string(),
                APP_NAME.to_string(),
                notice.title.clone(),
                notice.message.clone(),
            ],
        );
    }

    fn open_folder(&self, dir: &Path) -> Result<()> {
        self.spawn_detached("xdg-open", vec![dir.display().to_string()]);
        Ok(())
    }
}

/// Host that only logs; used when running headless.
#[derive(Default)]
pub struct LogHost;

impl Host for LogHost {
    fn notify(&self, notice: &Notice) {
        eprintln!("{}: {}", notice.title, notice.message);
    }

    fn open_folder(&self, dir: &Path) -> Result<()> {
        println!("{}", dir.display());
        Ok(())
    }
}
