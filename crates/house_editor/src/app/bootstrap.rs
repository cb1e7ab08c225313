use std::path::PathBuf;

use house_core::{
    resolve_save_dir, username_from_env, HouseStorage, LocalFileStorage, MemoryStorage,
    PathsError,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::replay::{load_replay, Replay, ReplayError};

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("missing value for {flag}")]
    MissingValue { flag: &'static str },
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("missing replay file path")]
    MissingReplayPath,
    #[error("unexpected argument '{0}' after replay file path")]
    UnexpectedArgument(String),
    #[error(transparent)]
    Paths(#[from] PathsError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    Help,
    Replay(CliOptions),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CliOptions {
    pub(crate) save_dir: Option<PathBuf>,
    pub(crate) username: Option<String>,
    pub(crate) memory_store: bool,
    pub(crate) replay_path: PathBuf,
}

pub(crate) struct AppWiring {
    pub(crate) storage: Box<dyn HouseStorage>,
    pub(crate) username: Option<String>,
    pub(crate) replay: Replay,
}

pub(crate) fn parse_args(args: &[String]) -> Result<CliCommand, CliError> {
    let mut options = CliOptions::default();
    let mut replay_path = None;
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => return Ok(CliCommand::Help),
            "--save-dir" => {
                let value = args
                    .get(index + 1)
                    .ok_or(CliError::MissingValue { flag: "--save-dir" })?;
                options.save_dir = Some(PathBuf::from(value));
                index += 2;
            }
            "--username" => {
                let value = args
                    .get(index + 1)
                    .ok_or(CliError::MissingValue { flag: "--username" })?;
                options.username = Some(value.clone());
                index += 2;
            }
            "--memory-store" => {
                options.memory_store = true;
                index += 1;
            }
            other if other.starts_with('-') => {
                return Err(CliError::UnknownOption(other.to_string()));
            }
            other => {
                if replay_path.is_some() {
                    return Err(CliError::UnexpectedArgument(other.to_string()));
                }
                replay_path = Some(PathBuf::from(other));
                index += 1;
            }
        }
    }

    options.replay_path = replay_path.ok_or(CliError::MissingReplayPath)?;
    Ok(CliCommand::Replay(options))
}

pub(crate) fn build_app(options: CliOptions) -> Result<AppWiring, CliError> {
    let replay = load_replay(&options.replay_path)?;
    let username = match options.username {
        Some(username) => Some(username),
        None => username_from_env()?,
    };

    let storage: Box<dyn HouseStorage> = if options.memory_store {
        info!("using in-memory room storage");
        Box::new(MemoryStorage::new())
    } else {
        let save_dir = match options.save_dir {
            Some(save_dir) => save_dir,
            None => resolve_save_dir()?,
        };
        info!(save_dir = %save_dir.display(), "using local file room storage");
        Box::new(LocalFileStorage::new(save_dir))
    };

    info!(
        replay = %options.replay_path.display(),
        frames = replay.frames.len(),
        username = username.as_deref().unwrap_or("<none>"),
        "replay_loaded"
    );
    Ok(AppWiring {
        storage,
        username,
        replay,
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

pub(crate) fn usage_text() -> String {
    [
        "Usage:",
        "  house_editor [options] <replay.json>",
        "",
        "Options:",
        "  --save-dir <dir>   directory for room snapshots (env HOUSE_EDITOR_SAVE_DIR,",
        "                     default ~/.house-editor)",
        "  --username <name>  storage identity (env HOUSE_EDITOR_USERNAME)",
        "  --memory-store     keep snapshots in memory only",
        "  -h, --help         show this help",
    ]
    .join("\n")
}
