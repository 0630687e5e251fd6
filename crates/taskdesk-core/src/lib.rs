pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod datetime;
pub mod filter;
pub mod render;
pub mod summary;
pub mod task;
pub mod tracker;
pub mod view;

use std::ffi::OsString;
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::api::{
  HttpTaskApi,
  TaskApi
};
use crate::cli::{
  Action,
  Invocation
};
use crate::controller::TaskListController;
use crate::render::Renderer;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskdesk"
  );
  debug!(
    overrides = pre.rc_overrides.len(),
    "preprocessed rc overrides"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  if let Some(api_url) = cli.api {
    cfg.set("api.url", api_url);
  }

  let renderer = Renderer::new(&cfg)?;
  let api =
    HttpTaskApi::new(&cfg.api_settings()?)
      .context(
        "failed to set up the task API \
         client"
      )?;
  let period = cfg.refresh_period()?;
  let inv = Invocation::parse(
    &cfg, cli.rest
  )?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  let mut controller =
    TaskListController::new(api);
  runtime.block_on(execute(
    &mut controller,
    &renderer,
    period,
    inv
  ))?;

  info!("done");
  Ok(())
}

/// Runs one invocation against an already configured controller.
#[tracing::instrument(skip_all, fields(action = ?inv.action))]
pub async fn execute<A>(
  controller: &mut TaskListController<A>,
  renderer: &Renderer,
  period: Duration,
  inv: Invocation
) -> anyhow::Result<()>
where
  A: TaskApi + Clone + Send + Sync + 'static
{
  if inv.action == Action::Watch {
    return view::run_live(
      controller,
      renderer,
      period,
      tokio::io::BufReader::new(
        tokio::io::stdin()
      ),
      std::io::stdout()
    )
    .await;
  }

  controller.load(Utc::now()).await?;

  match inv.action {
    | Action::List => {
      controller.set_search(
        inv.args.join(" ")
      );
      renderer.print_summary(
        &controller.summary()
      )?;
      let visible = controller.filtered();
      if visible.is_empty() {
        println!("no tasks");
        return Ok(());
      }
      renderer.print_task_table(
        &visible,
        controller.tracker(),
        |id| controller.is_updating(id),
        Utc::now()
      )?;
    }
    | Action::Summary => {
      renderer.print_summary(
        &controller.summary()
      )?;
    }
    | Action::Start => {
      let id = task_id_arg(&inv)?;
      controller
        .start(id, Utc::now())
        .await?;
      println!("started {id}");
    }
    | Action::Done => {
      let id = task_id_arg(&inv)?;
      controller
        .complete(id, Utc::now())
        .await?;
      let hours = controller
        .task(id)
        .and_then(|task| task.actual_hours)
        .unwrap_or(0.0);
      println!(
        "completed {id} ({hours}h worked)"
      );
    }
    | Action::Watch => {}
  }

  Ok(())
}

fn task_id_arg(
  inv: &Invocation
) -> anyhow::Result<&str> {
  inv
    .args
    .first()
    .map(String::as_str)
    .ok_or_else(|| {
      anyhow!("missing task id")
    })
}
