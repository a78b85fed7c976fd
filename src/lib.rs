// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::FlowGraph;
use crate::engine::{EventLoop, ForwardScheduler, SchedulerSettings, Timeline};
use crate::exec::{AlgorithmPool, ThreadInitHook, WorkerId, WorkerPool};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (plus CLI overrides)
/// - flow graph and algorithm pool
/// - worker threads and the forward scheduler
/// - the event loop, and the timeline dump at the end
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    apply_overrides(&mut cfg, &args);

    let graph = Arc::new(FlowGraph::from_config(&cfg));
    let pool = Arc::new(AlgorithmPool::from_config(&cfg));
    let workers = Arc::new(
        WorkerPool::new(cfg.scheduler.threads, vec![Arc::new(WorkerLogHook)])
            .context("spawning worker threads")?,
    );
    let timeline = Arc::new(Timeline::new(cfg.scheduler.record_timeline));

    let settings = SchedulerSettings::from(&cfg.scheduler);
    let scheduler = Arc::new(ForwardScheduler::start_with_timeline(
        settings,
        graph,
        pool,
        workers.clone(),
        Arc::clone(&timeline),
    )?);

    let outcome = EventLoop::new(Arc::clone(&scheduler))
        .execute_run(args.events)
        .await;

    scheduler.shutdown().await;
    let joined = Arc::clone(&workers);
    tokio::task::spawn_blocking(move || joined.shutdown())
        .await
        .context("joining worker threads")?;

    if timeline.is_enabled() {
        let path = &cfg.scheduler.timeline_file;
        timeline
            .dump_csv(path)
            .with_context(|| format!("writing timeline to {path}"))?;
        info!(path = %path, entries = timeline.events().len(), "timeline written");
    }

    let summary = outcome?;
    println!(
        "hivesched: {} events finished ({} failed, {} stalled) in {:.3}s{}",
        summary.finished,
        summary.failed,
        summary.stalled,
        summary.elapsed.as_secs_f64(),
        if summary.interrupted { ", interrupted" } else { "" },
    );
    Ok(())
}

/// CLI flags win over the config file.
fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) {
    if args.simulate {
        cfg.scheduler.simulate_execution = true;
    }
    if let Some(ref path) = args.timeline {
        cfg.scheduler.record_timeline = true;
        cfg.scheduler.timeline_file = path.clone();
    }
}

/// Logs the first job of each worker thread.
struct WorkerLogHook;

impl ThreadInitHook for WorkerLogHook {
    fn init_thread(&self, worker: WorkerId) {
        debug!(worker, "worker thread initialised");
    }
}

/// Simple dry-run output: print scheduler settings, algorithms and decisions.
fn print_dry_run(cfg: &ConfigFile) {
    let s = &cfg.scheduler;
    println!("hivesched dry-run");
    println!("  scheduler.max_events_in_flight = {}", s.max_events_in_flight);
    println!("  scheduler.max_algos_in_flight = {}", s.max_algos_in_flight);
    println!("  scheduler.threads = {}", s.threads);
    println!("  scheduler.optimization_mode = {:?}", s.optimization_mode);
    if let Some(ref root) = s.root {
        println!("  scheduler.root = {root}");
    }
    println!();

    println!("algorithms ({}):", cfg.algorithm.len());
    for (name, alg) in cfg.algorithm.iter() {
        println!("  - {name}");
        if !alg.inputs.is_empty() {
            println!("      inputs: {:?}", alg.inputs);
        }
        if !alg.outputs.is_empty() {
            println!("      outputs: {:?}", alg.outputs);
        }
        println!(
            "      policy: {:?} x{}",
            alg.policy,
            alg.effective_instances()
        );
        if alg.runtime_ms > 0 {
            println!("      runtime_ms: {}", alg.runtime_ms);
        }
        if alg.fail_every > 0 {
            println!("      fail_every: {}", alg.fail_every);
        }
        if alg.reject_every > 0 {
            println!("      reject_every: {}", alg.reject_every);
        }
    }

    if !cfg.decision.is_empty() {
        println!();
        println!("decisions ({}):", cfg.decision.len());
        for (name, dec) in cfg.decision.iter() {
            println!("  - {name}");
            println!(
                "      mode: {:?}{}{}",
                dec.mode,
                if dec.prompt { ", prompt" } else { "" },
                if dec.sequential { ", sequential" } else { "" },
            );
            println!("      children: {:?}", dec.children);
        }
    }

    debug!("dry-run complete (no execution)");
}
