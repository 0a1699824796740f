use std::{
    ffi::{CString, OsString},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Finds an executable, preferring the per-user install over `PATH`.
#[derive(Clone, Debug, Default)]
pub struct Resolver {
    local_bin: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl Resolver {
    pub fn new(local_bin: Option<PathBuf>, search_path: Option<OsString>) -> Self {
        Self {
            local_bin,
            search_path,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            dirs::home_dir().map(|home| home.join(".local").join("bin")),
            std::env::var_os("PATH"),
        )
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if let Some(local) = self.local_bin.as_ref().map(|dir| dir.join(name)) {
            if is_executable(&local) {
                debug!(path = %local.display(), "using local install");
                return Some(local);
            }
        }
        let search_path = self.search_path.as_ref()?;
        std::env::split_paths(search_path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }
}

pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}
