use anyhow::{anyhow, Context};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use ploy_dqn::cli::output::{
    checkpoint_rows, episode_rows, print_items, report_rows, summary_rows, OutputMode,
};
use ploy_dqn::config::AppConfig;
use ploy_dqn::data::FeatureSeries;
use ploy_dqn::rl::training::{evaluate, CheckpointStore, Checkpointer, TrainingLoop};
use ploy_dqn::rl::{DqnAgent, TradingEnvironment};

fn load_series(config: &AppConfig) -> anyhow::Result<FeatureSeries> {
    let path = config
        .data
        .path
        .as_deref()
        .ok_or_else(|| anyhow!("no feature data: pass --data or set data.path"))?;
    FeatureSeries::from_csv(path).with_context(|| format!("loading features from {path}"))
}

pub(crate) async fn run_train(config: AppConfig, mode: OutputMode) -> anyhow::Result<()> {
    let series = load_series(&config)?;
    let series = match config.data.split_date {
        Some(date) => {
            let (train, test) = series.split_at(date)?;
            info!(
                "Training on {} rows before {}, holding out {} rows",
                train.len(),
                date,
                test.len()
            );
            train
        }
        None => series,
    };

    info!("Starting DQN training mode");
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               ploy-dqn Training Mode                         ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Episodes:        {:>8}                                   ║", config.training.episodes);
    println!("║  Batch Size:      {:>8}                                   ║", config.training.batch_size);
    println!("║  Rows:            {:>8}                                   ║", series.len());
    println!("║  Checkpoint:      {}", config.training.checkpoint_path);
    println!("╚══════════════════════════════════════════════════════════════╝");

    let stop = Arc::new(AtomicBool::new(false));
    let ctrl_c_flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, stopping after the current step");
            ctrl_c_flag.store(true, Ordering::SeqCst);
        }
    });

    let summary = tokio::task::spawn_blocking(move || {
        let mut env = TradingEnvironment::new(series, config.environment.clone())?;
        let store = Checkpointer::new(&config.training.checkpoint_path);
        let mut agent = DqnAgent::load_or_new(
            &store,
            env.observation_dim(),
            config.agent.clone(),
            config.training.buffer_size,
            config.training.seed,
        )?;

        TrainingLoop::new(config.training.clone(), Box::new(store))
            .with_stop_flag(stop)
            .run(&mut agent, &mut env)
    })
    .await??;

    print_items(&episode_rows(&summary), mode)?;
    print_items(&summary_rows(&summary), mode)?;
    Ok(())
}

pub(crate) fn run_eval(config: AppConfig, mode: OutputMode) -> anyhow::Result<()> {
    let store = Checkpointer::new(&config.training.checkpoint_path);
    if !store.exists() {
        anyhow::bail!("no checkpoint at {}", store.location());
    }
    let checkpoint = store.load()?;

    let series = load_series(&config)?;
    let series = match config.data.split_date {
        Some(date) => series.since(date)?,
        None => {
            warn!("No evaluation start date; evaluating on the full series");
            series
        }
    };

    let mut env = match checkpoint.scaler.clone() {
        Some(scaler) => TradingEnvironment::with_scaler(series, config.environment.clone(), scaler)?,
        None => {
            warn!("Checkpoint has no stored scaler; fitting one on the evaluation rows");
            TradingEnvironment::new(series, config.environment.clone())?
        }
    };

    let mut agent = DqnAgent::from_checkpoint(
        checkpoint,
        env.observation_dim(),
        config.agent.clone(),
        1,
        config.training.seed,
    )?;
    let report = evaluate(&mut agent, &mut env)?;

    print_items(&report_rows(&report), mode)?;
    Ok(())
}

pub(crate) fn run_info(config: &AppConfig, mode: OutputMode) -> anyhow::Result<()> {
    let store = Checkpointer::new(&config.training.checkpoint_path);
    if !store.exists() {
        anyhow::bail!("no checkpoint at {}", store.location());
    }
    let checkpoint = store.load()?;
    print_items(&checkpoint_rows(&checkpoint), mode)?;
    Ok(())
}
