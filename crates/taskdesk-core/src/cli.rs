use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{anyhow, bail};
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdesk",
    version,
    about = "Your assigned tasks, with a live clock for the one you are working on",
    disable_help_subcommand = true,
    after_help = "Commands: list [search...] | watch | start <id> | done <id> | summary"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Base URL of the task API, overrides `api.url`.
    #[arg(long = "api")]
    pub api: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.KEY=VALUE` / `rc.KEY:VALUE` overrides out of the
/// raw arguments before clap sees them.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                rest.split_once(':')
                    .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Watch,
    Start,
    Done,
    Summary,
}

impl Action {
    const ALL: [(&'static str, Action); 5] = [
        ("list", Action::List),
        ("watch", Action::Watch),
        ("start", Action::Start),
        ("done", Action::Done),
        ("summary", Action::Summary),
    ];

    /// Exact name or an unambiguous prefix of one.
    pub fn expand(token: &str) -> anyhow::Result<Option<Self>> {
        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            return Ok(None);
        }
        if let Some((_, action)) = Self::ALL.iter().find(|(name, _)| *name == token) {
            return Ok(Some(*action));
        }

        let candidates: Vec<_> = Self::ALL
            .iter()
            .filter(|(name, _)| name.starts_with(&token))
            .collect();
        match candidates.as_slice() {
            [] => Ok(None),
            [(_, action)] => Ok(Some(*action)),
            many => bail!(
                "ambiguous command '{token}': could be {}",
                many.iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub action: Action,
    pub args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let mut tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        let explicit = match tokens.first() {
            Some(first) => Action::expand(first)?,
            None => None,
        };

        let action = match explicit {
            Some(action) => {
                tokens.remove(0);
                action
            }
            None => {
                let default = cfg
                    .get("default.command")
                    .unwrap_or_else(|| "list".to_string());
                debug!(command = %default, "no explicit command, using default");
                Action::expand(&default)?
                    .ok_or_else(|| anyhow!("invalid default.command: {default}"))?
            }
        };

        if matches!(action, Action::Start | Action::Done) && tokens.len() != 1 {
            bail!("expected exactly one task id after the command");
        }
        if matches!(action, Action::Watch | Action::Summary) && !tokens.is_empty() {
            bail!("unexpected arguments: {}", tokens.join(" "));
        }

        Ok(Self {
            action,
            args: tokens,
        })
    }
}
