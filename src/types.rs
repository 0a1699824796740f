use std::{fmt, path::PathBuf, str::FromStr};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Pick,
    Shuffle,
    Settings,
    OpenFolder,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pick => "pick",
            Self::Shuffle => "shuffle",
            Self::Settings => "settings",
            Self::OpenFolder => "folder",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pick" => Ok(Self::Pick),
            "shuffle" => Ok(Self::Shuffle),
            "settings" => Ok(Self::Settings),
            "folder" => Ok(Self::OpenFolder),
            other => Err(anyhow::anyhow!("unknown action: {other}")),
        }
    }
}

/// A user-visible message handed to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuItem {
    pub label: &'static str,
    pub icon: &'static str,
    pub action: Action,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_their_wire_names() {
        for action in [Action::Pick, Action::Shuffle, Action::Settings, Action::OpenFolder] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!("pick\n".parse::<Action>().unwrap(), Action::Pick);
        assert!("explode".parse::<Action>().is_err());
    }
}
