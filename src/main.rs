mod background;
mod catalog;
mod config;
mod daemon;
mod host;
mod launcher;
mod menu;
mod resolver;
mod types;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, sync::mpsc};
use tracing_subscriber::EnvFilter;

use crate::background::{Gsettings, MemoryStore, SettingsStore};
use crate::config::{APP_NAME, ConfigStore, GRID_COLUMNS};
use crate::daemon::{run_daemon, send_action};
use crate::host::{DesktopHost, LogHost};
use crate::launcher::startup_env;
use crate::menu::{CompletionSink, Controller};
use crate::resolver::Resolver;
use crate::types::Action;

#[derive(Debug, Parser)]
#[command(name = "wallpicker-menu")]
#[command(about = "Status-menu agent for the wallpaper picker", long_about = None)]
struct Cli {
    /// Read this config file instead of the per-user one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run menu actions in this process instead of asking the daemon.
    #[arg(long, global = true)]
    no_daemon: bool,

    /// Keep background changes in memory instead of writing desktop settings.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run the agent and listen for menu actions.
    Daemon,
    /// Print the menu entries as `action<TAB>icon<TAB>label`.
    Menu,
    /// Open the picker.
    Pick {
        #[arg(long)]
        timestamp: Option<u32>,
    },
    /// Ask the picker for a random wallpaper.
    Shuffle {
        #[arg(long)]
        timestamp: Option<u32>,
    },
    /// Open the picker's settings.
    Settings {
        #[arg(long)]
        timestamp: Option<u32>,
    },
    /// Open the wallpaper folder in the file manager.
    Folder,
    /// List wallpapers, marking the current one with `*`.
    List,
    /// Set the desktop background directly.
    Set { image: PathBuf },
    /// Print the current background URI.
    Current,
    /// Pick a random wallpaper without the picker program.
    ShuffleDirect,
    /// Print the environment given to launched programs.
    Env {
        #[arg(long, default_value_t = 0)]
        timestamp: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wallpicker_menu=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli
        .config
        .map(ConfigStore::new)
        .unwrap_or_else(ConfigStore::default_location);

    let settings: Box<dyn SettingsStore> = if cli.dry_run {
        Box::new(MemoryStore::default())
    } else {
        Box::new(Gsettings)
    };

    match cli.cmd {
        Cmd::Daemon => run_daemon(config),
        Cmd::Menu => {
            for item in menu::MENU_ITEMS {
                println!("{}\t{}\t{}", item.action, item.icon, item.label);
            }
            Ok(())
        }
        Cmd::Pick { timestamp } => {
            dispatch(config, settings, cli.no_daemon, Action::Pick, timestamp)
        }
        Cmd::Shuffle { timestamp } => {
            dispatch(config, settings, cli.no_daemon, Action::Shuffle, timestamp)
        }
        Cmd::Settings { timestamp } => {
            dispatch(config, settings, cli.no_daemon, Action::Settings, timestamp)
        }
        Cmd::Folder => dispatch(config, settings, cli.no_daemon, Action::OpenFolder, None),
        Cmd::List => {
            let controller = local_controller(config, LogHost, settings).0;
            for thumb in controller.grid(GRID_COLUMNS).into_iter().flatten() {
                let marker = if thumb.active { "*" } else { " " };
                println!("{marker} {}", thumb.path.display());
            }
            Ok(())
        }
        Cmd::Set { image } => {
            let image = std::path::absolute(&image)
                .with_context(|| format!("resolve {}", image.display()))?;
            if !image.is_file() {
                return Err(anyhow!("{} is not a file", image.display()));
            }
            let controller = local_controller(config, LogHost, settings).0;
            if !controller.apply(&image) {
                return Err(anyhow!("could not set {}", image.display()));
            }
            if let Some(uri) = controller.current() {
                println!("{uri}");
            }
            Ok(())
        }
        Cmd::Current => {
            let controller = local_controller(config, LogHost, settings).0;
            match controller.current() {
                Some(uri) => println!("{uri}"),
                None => println!("(unset)"),
            }
            Ok(())
        }
        Cmd::ShuffleDirect => {
            let controller = local_controller(config, LogHost, settings).0;
            match controller.shuffle_direct() {
                Some(path) => {
                    println!("{}", path.display());
                    Ok(())
                }
                None => Err(anyhow!("no wallpaper was set")),
            }
        }
        Cmd::Env { timestamp } => {
            for (key, value) in startup_env(APP_NAME, std::process::id(), timestamp) {
                println!("{key}={value}");
            }
            Ok(())
        }
    }
}

fn dispatch(
    config: ConfigStore,
    settings: Box<dyn SettingsStore>,
    in_process: bool,
    action: Action,
    timestamp: Option<u32>,
) -> Result<()> {
    if !in_process {
        return send_action(action, timestamp);
    }
    let (controller, completions) = local_controller(config, DesktopHost::default(), settings);
    if let Some(handle) = controller.activate(action, timestamp) {
        handle.join();
    }
    for completion in completions.try_iter() {
        controller.finish(completion);
    }
    Ok(())
}

fn local_controller<H: host::Host, S: SettingsStore>(
    config: ConfigStore,
    host: H,
    settings: S,
) -> (Controller<H, S>, mpsc::Receiver<menu::Completion>) {
    let (tx, rx) = mpsc::channel();
    let sink: CompletionSink = Arc::new(move |completion| {
        let _ = tx.send(completion);
    });
    let controller = Controller::new(host, config, Resolver::from_env(), settings, sink);
    (controller, rx)
}
