use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::api::TaskApi;
use crate::clock::LiveClock;
use crate::controller::{PendingUpdate, TaskListController};
use crate::render::Renderer;

const HELP: &str = "commands: s <id> start | c <id> complete | /text search | / clear | r reload | q quit";

type Resolved = (PendingUpdate, anyhow::Result<()>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Complete(String),
    Search(String),
    Reload,
    Redraw,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if let Some(search) = line.strip_prefix('/') {
            return Self::Search(search.trim().to_string());
        }

        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let arg = words.next().map(str::to_string);

        match (verb, arg) {
            ("", _) => Self::Redraw,
            ("q" | "quit" | "exit", None) => Self::Quit,
            ("r" | "reload", None) => Self::Reload,
            ("?" | "h" | "help", None) => Self::Help,
            ("s" | "start", Some(id)) => Self::Start(id),
            ("c" | "done" | "complete", Some(id)) => Self::Complete(id),
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Interactive session: a table that refreshes on every clock tick and
/// reads one command per line from `input`.
///
/// Updates run on spawned tasks so the clock and input keep flowing
/// while a request is outstanding. On quit the clock is stopped and
/// outstanding requests are awaited, not cancelled. Tick frames are
/// only drawn on a terminal; otherwise a frame is written per command
/// or resolved update.
#[tracing::instrument(skip_all)]
pub async fn run_live<A, R, W>(
    controller: &mut TaskListController<A>,
    renderer: &Renderer,
    period: Duration,
    input: R,
    mut out: W,
) -> anyhow::Result<()>
where
    A: TaskApi + Clone + Send + Sync + 'static,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut message = String::from("Loading tasks…");
    draw(&mut out, controller, renderer, &message, Utc::now())?;

    message = load_message(controller).await;
    draw(&mut out, controller, renderer, &message, Utc::now())?;

    let mut clock = LiveClock::spawn(period);
    let mut lines = input.lines();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Resolved>();

    loop {
        tokio::select! {
            Some(now) = clock.tick() => {
                if renderer.is_terminal() {
                    draw(&mut out, controller, renderer, &message, now)?;
                } else {
                    trace!("skipping tick frame off a terminal");
                }
            }
            Some((update, result)) = done_rx.recv() => {
                let id = update.id.clone();
                message = match controller.finish(update, result) {
                    Ok(()) => format!("updated {id}"),
                    Err(err) => format!("{err:#}"),
                };
                draw(&mut out, controller, renderer, &message, Utc::now())?;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "failed reading command");
                        break;
                    }
                };

                let command = Command::parse(&line);
                debug!(?command, "live command");
                match command {
                    Command::Quit => break,
                    Command::Redraw => {}
                    Command::Help => message = HELP.to_string(),
                    Command::Unknown(raw) => message = format!("unknown command: {raw}  ({HELP})"),
                    Command::Search(search) => {
                        controller.set_search(search);
                        message.clear();
                    }
                    Command::Reload => message = load_message(controller).await,
                    Command::Start(id) => {
                        message = match controller.begin_start(&id, Utc::now()) {
                            Ok(update) => dispatch(controller.api().clone(), update, done_tx.clone()),
                            Err(rejection) => rejection.to_string(),
                        };
                    }
                    Command::Complete(id) => {
                        message = match controller.begin_complete(&id, Utc::now()) {
                            Ok(update) => dispatch(controller.api().clone(), update, done_tx.clone()),
                            Err(rejection) => rejection.to_string(),
                        };
                    }
                }
                draw(&mut out, controller, renderer, &message, Utc::now())?;
            }
        }
    }

    clock.stop().await;

    while controller.in_flight_count() > 0 {
        let Some((update, result)) = done_rx.recv().await else {
            break;
        };
        // Already logged by the controller.
        let _ = controller.finish(update, result);
    }

    info!("live view closed");
    Ok(())
}

/// Writes one frame: summary, filtered table and the status message.
pub fn draw<W, A>(
    mut out: W,
    controller: &TaskListController<A>,
    renderer: &Renderer,
    message: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()>
where
    W: Write,
    A: TaskApi,
{
    if renderer.is_terminal() {
        write!(out, "\x1b[2J\x1b[H")?;
    }

    renderer.write_summary(&mut out, &controller.summary())?;
    if !controller.search().is_empty() {
        writeln!(out, "search: {}", controller.search().as_str())?;
    }
    writeln!(out)?;

    if controller.is_loading() {
        writeln!(out, "Loading tasks…")?;
    } else {
        let visible = controller.filtered();
        if visible.is_empty() {
            writeln!(out, "no tasks")?;
        } else {
            renderer.write_task_table(
                &mut out,
                &visible,
                controller.tracker(),
                |id| controller.is_updating(id),
                now,
            )?;
        }
    }

    writeln!(out)?;
    if !message.is_empty() {
        writeln!(out, "{message}")?;
    }
    write!(out, "> ")?;
    out.flush()?;
    Ok(())
}

async fn load_message<A: TaskApi>(controller: &mut TaskListController<A>) -> String {
    match controller.load(Utc::now()).await {
        Ok(count) => format!("loaded {count} tasks"),
        Err(err) => format!("{err:#}"),
    }
}

fn dispatch<A>(api: A, update: PendingUpdate, done: mpsc::UnboundedSender<Resolved>) -> String
where
    A: TaskApi + Send + Sync + 'static,
{
    let message = format!("updating {}…", update.id);
    tokio::spawn(async move {
        let result = api.update_task(&update.id, &update.patch).await;
        if done.send((update, result)).is_err() {
            debug!("live view closed before update resolved");
        }
    });
    message
}

#[cfg(test)]
mod tests {
    use super::Command;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(Command::parse("s t-1"), Command::Start("t-1".to_string()));
        assert_eq!(
            Command::parse("  done 42 "),
            Command::Complete("42".to_string())
        );
        assert_eq!(
            Command::parse("/Slab pour"),
            Command::Search("Slab pour".to_string())
        );
        assert_eq!(Command::parse("/"), Command::Search(String::new()));
        assert_eq!(Command::parse("q"), Command::Quit);
        assert_eq!(Command::parse("reload"), Command::Reload);
        assert_eq!(Command::parse(""), Command::Redraw);
    }

    #[test]
    fn incomplete_commands_are_unknown() {
        assert_eq!(Command::parse("start"), Command::Unknown("start".to_string()));
        assert_eq!(
            Command::parse("q now"),
            Command::Unknown("q now".to_string())
        );
    }
}
