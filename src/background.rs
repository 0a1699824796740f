use anyhow::{Context, Result, anyhow};
use std::{
    cell::RefCell,
    collections::HashMap,
    ffi::OsStr,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
    process::Command,
};
use thiserror::Error;
use tracing::{info, warn};

pub const BACKGROUND_SCHEMA: &str = "org.gnome.desktop.background";
pub const LIGHT_KEY: &str = "picture-uri";
pub const DARK_KEY: &str = "picture-uri-dark";
pub const MODE_KEY: &str = "picture-options";

#[derive(Debug, Error)]
#[error("could not write {key}: {source:#}")]
pub struct SettingWriteFailure {
    pub key: &'static str,
    #[source]
    pub source: anyhow::Error,
}

pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for Box<T> {
    fn get(&self, key: &str) -> Result<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// The desktop background schema, through the `gsettings` CLI.
#[derive(Clone, Debug, Default)]
pub struct Gsettings;

impl SettingsStore for Gsettings {
    fn get(&self, key: &str) -> Result<String> {
        let output = Command::new("gsettings")
            .args(["get", BACKGROUND_SCHEMA, key])
            .output()
            .with_context(|| format!("run gsettings get {key}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("gsettings get {key} failed: {}", stderr.trim()));
        }
        Ok(unquote_gvariant(String::from_utf8_lossy(&output.stdout).trim()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let output = Command::new("gsettings")
            .args(["set", BACKGROUND_SCHEMA, key, value])
            .output()
            .with_context(|| format!("run gsettings set {key}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("gsettings set {key} failed: {}", stderr.trim()));
        }
        Ok(())
    }
}

/// In-process store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
    read_only: Vec<String>,
}

impl MemoryStore {
    #[cfg(test)]
    pub fn with_read_only(keys: &[&str]) -> Self {
        Self {
            values: RefCell::default(),
            read_only: keys.iter().map(|key| key.to_string()).collect(),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<String> {
        Ok(self.values.borrow().get(key).cloned().unwrap_or_default())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.read_only.iter().any(|locked| locked == key) {
            return Err(anyhow!("key {key} is not writable"));
        }
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// `gsettings get` prints strings as GVariant text: `'file:///x'`.
fn unquote_gvariant(text: &str) -> String {
    let inner = text
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(text);
    inner.replace("\\'", "'").replace("\\\\", "\\")
}

pub fn file_uri(path: &Path) -> String {
    let mut uri = String::from("file://");
    for &byte in path.as_os_str().as_bytes() {
        if byte.is_ascii_alphanumeric() || b"/-._~".contains(&byte) {
            uri.push(char::from(byte));
        } else {
            uri.push_str(&format!("%{byte:02X}"));
        }
    }
    uri
}

/// Local path of a `file://` URI, undoing any percent-escapes.
/// Writers disagree on which characters to escape, so compare paths, not URIs.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    if !rest.starts_with('/') {
        return None;
    }
    let raw = rest.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let escaped = match raw.get(i + 1..i + 3) {
            Some(hex) if raw[i] == b'%' => std::str::from_utf8(hex)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok()),
            _ => None,
        };
        match escaped {
            Some(byte) => {
                bytes.push(byte);
                i += 3;
            }
            None => {
                bytes.push(raw[i]);
                i += 1;
            }
        }
    }
    Some(PathBuf::from(OsStr::from_bytes(&bytes)))
}

pub struct BackgroundSetter<S> {
    store: S,
}

impl<S: SettingsStore> BackgroundSetter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Writes the light key then the dark key. A failed write is not rolled back.
    pub fn set_background(
        &self,
        path: &Path,
        mode: Option<&str>,
    ) -> Result<String, SettingWriteFailure> {
        let uri = file_uri(path);
        for key in [LIGHT_KEY, DARK_KEY] {
            self.store
                .set(key, &uri)
                .map_err(|source| SettingWriteFailure { key, source })?;
        }
        if let Some(mode) = mode {
            if let Err(err) = self.store.set(MODE_KEY, mode) {
                warn!("could not set picture mode {mode}: {err:#}");
            }
        }
        info!(%uri, "background set");
        Ok(uri)
    }

    pub fn current(&self) -> Option<String> {
        [DARK_KEY, LIGHT_KEY].into_iter().find_map(|key| match self.store.get(key) {
            Ok(value) if !value.is_empty() => Some(value),
            Ok(_) => None,
            Err(err) => {
                warn!("could not read {key}: {err:#}");
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_keys_get_the_same_uri() {
        let setter = BackgroundSetter::new(MemoryStore::default());
        let uri = setter
            .set_background(Path::new("/home/u/Pictures/Wallpapers/sunset.png"), None)
            .unwrap();
        assert_eq!(uri, "file:///home/u/Pictures/Wallpapers/sunset.png");
        assert_eq!(setter.store().get(LIGHT_KEY).unwrap(), uri);
        assert_eq!(setter.store().get(DARK_KEY).unwrap(), uri);
        assert_eq!(setter.current(), Some(uri));
    }

    #[test]
    fn overwrites_previous_values() {
        let setter = BackgroundSetter::new(MemoryStore::default());
        setter.set_background(Path::new("/a.png"), None).unwrap();
        setter.set_background(Path::new("/b.png"), Some("zoom")).unwrap();
        assert_eq!(setter.current().as_deref(), Some("file:///b.png"));
        assert_eq!(setter.store().get(LIGHT_KEY).unwrap(), "file:///b.png");
        assert_eq!(setter.store().get(MODE_KEY).unwrap(), "zoom");
    }

    #[test]
    fn current_prefers_dark_then_light() {
        let store = MemoryStore::default();
        assert_eq!(BackgroundSetter::new(MemoryStore::default()).current(), None);

        store.set(LIGHT_KEY, "file:///light.png").unwrap();
        let setter = BackgroundSetter::new(store);
        assert_eq!(setter.current().as_deref(), Some("file:///light.png"));

        setter.store().set(DARK_KEY, "file:///dark.png").unwrap();
        assert_eq!(setter.current().as_deref(), Some("file:///dark.png"));
    }

    #[test]
    fn dark_write_failure_leaves_light_in_place() {
        let setter = BackgroundSetter::new(MemoryStore::with_read_only(&[DARK_KEY]));
        let err = setter.set_background(Path::new("/x.png"), None).unwrap_err();
        assert_eq!(err.key, DARK_KEY);
        assert_eq!(setter.store().get(LIGHT_KEY).unwrap(), "file:///x.png");
        assert_eq!(setter.store().get(DARK_KEY).unwrap(), "");
    }

    #[test]
    fn uri_escapes_unsafe_bytes() {
        assert_eq!(
            file_uri(Path::new("/walls/my pic#1.png")),
            "file:///walls/my%20pic%231.png"
        );
    }

    #[test]
    fn uri_decodes_to_path_whatever_the_escaping() {
        let path = Path::new("/w/beach (1).png");
        assert_eq!(uri_to_path("file:///w/beach%20(1).png").as_deref(), Some(path));
        assert_eq!(uri_to_path(&file_uri(path)).as_deref(), Some(path));
        assert_eq!(
            uri_to_path("file://localhost/w/a%2Fb%zz.png").as_deref(),
            Some(Path::new("/w/a/b%zz.png"))
        );
        assert_eq!(uri_to_path("https://example.org/a.png"), None);
        assert_eq!(uri_to_path("file://host/a.png"), None);
    }

    #[test]
    fn gvariant_strings_are_unquoted() {
        assert_eq!(unquote_gvariant("'file:///a.png'"), "file:///a.png");
        assert_eq!(unquote_gvariant("''"), "");
        assert_eq!(unquote_gvariant("'it\\'s'"), "it's");
    }
}
