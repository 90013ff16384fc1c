//! Alaris supervisor process
//!
//! Wires the runtime core together and drives it with the static task
//! schedule: market data every 10 ms, signal generation every 100 ms,
//! control processing every 50 ms, a 1 s heartbeat and a 10 s
//! performance report (all configurable).
//!
//! The producer role synthesizes a market feed and publishes into the
//! shared-memory channels; the consumer role opens the same segments
//! and drains them. Steady-state faults degrade to counters and log
//! entries; only setup errors exit non-zero.

use alaris_bins::common::{init_logging, log_status, setup_performance};
use alaris_core::ipc::ShmConfig;
use alaris_core::journal::EventKind;
use alaris_core::monitoring::MetricsRegistry;
use alaris_core::prelude::*;
use anyhow::{bail, Context};
use clap::Parser;
use parking_lot::Mutex;
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Alaris time-triggered supervisor")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Override the configured role (producer|consumer)
    #[arg(short, long)]
    role: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut cfg = CoreConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(role) = args.role {
        cfg.process.role = role;
        cfg.validate()?;
    }

    init_logging(&cfg.metrics.log_level, cfg.metrics.json_logs);
    info!(config = %args.config.display(), role = %cfg.process.role, "alaris supervisor starting");

    setup_performance(cfg.process.cpu_core, cfg.process.realtime)?;

    // Shutdown flag flipped by Ctrl-C / SIGTERM and by a SystemShutdown
    // control message on the consumer side.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Release);
        })
        .context("installing signal handler")?;
    }

    // Core components.
    let pool = Arc::new(MemoryPool::with_initial_size(cfg.memory.initial_pool_bytes));

    if let Some(parent) = cfg.journal.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating journal directory {}", parent.display()))?;
    }
    let journal = Arc::new(EventLogger::new(&cfg.journal.path, cfg.journal.binary)?);
    journal.log_system_status("supervisor starting");

    let role = match cfg.process.role.as_str() {
        "producer" => Role::Producer,
        "consumer" => Role::Consumer,
        other => bail!("unsupported role '{other}'"),
    };
    let shm = Arc::new(Mutex::new(ShmManager::new(
        role,
        ShmConfig {
            operation_timeout: Duration::from_micros(cfg.ipc.operation_timeout_us),
            max_batch_size: cfg.ipc.max_batch_size,
            market_data_name: cfg.ipc.market_data_name.clone(),
            signal_name: cfg.ipc.signal_name.clone(),
            control_name: cfg.ipc.control_name.clone(),
        },
    )?));

    let metrics = MetricsRegistry::new().context("creating metrics registry")?;

    let trading_enabled = Arc::new(AtomicBool::new(cfg.process.start_trading_enabled));
    journal.log_system_status(if trading_enabled.load(Ordering::Relaxed) {
        "trading enabled on startup"
    } else {
        "trading disabled on startup"
    });

    let mut scheduler = TtScheduler::new(Duration::from_micros(cfg.scheduler.basic_time_unit_us));
    match role {
        Role::Producer => register_producer_tasks(
            &mut scheduler,
            &cfg,
            &pool,
            &journal,
            &shm,
            &trading_enabled,
        )?,
        Role::Consumer => register_consumer_tasks(
            &mut scheduler,
            &cfg,
            &journal,
            &shm,
            &shutdown,
        )?,
    }
    register_report_task(&mut scheduler, &cfg, &pool, &journal, &shm, &metrics)?;

    let report = scheduler.finalize()?;
    for warning in &report.warnings {
        warn!(%warning, "schedulability warning");
    }
    if !report.schedulable {
        for conflict in &report.conflicts {
            error!(%conflict, "schedulability conflict");
        }
        journal.log_error("task set is not schedulable");
        bail!("task set is not schedulable");
    }
    info!(
        hyperperiod_ms = report.hyperperiod.as_millis() as u64,
        utilization = report.utilization,
        instances = report.total_instances,
        "schedule finalized"
    );
    scheduler.log_schedule_table();

    scheduler.start()?;
    journal.log_system_status("time-triggered execution started");

    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("shutdown requested, stopping scheduler");
    scheduler.stop();
    journal.log_system_status("supervisor stopped");
    if let Some(m) = scheduler.task_metrics_by_name("market_data") {
        info!(
            executions = m.executions_completed,
            deadline_misses = m.deadline_misses,
            "market data task totals"
        );
    }
    log_status(&shm.lock().status());
    Ok(())
}

/// Producer tasks: synthesize quotes, derive signals, heartbeat.
fn register_producer_tasks(
    scheduler: &mut TtScheduler,
    cfg: &CoreConfig,
    pool: &Arc<MemoryPool>,
    journal: &Arc<EventLogger>,
    shm: &Arc<Mutex<ShmManager>>,
    trading_enabled: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let pid = std::process::id();

    // Synthetic market feed: a slow random walk around 100. Stands in
    // for the external feed handler, which is outside the core.
    let feed_sequence = Arc::new(AtomicU32::new(0));
    let last_mid = Arc::new(Mutex::new(100.0f64));

    let md_spec = TaskSpec::new(
        "market_data",
        Duration::from_millis(cfg.scheduler.market_data_period_ms),
        Duration::from_millis(1),
    )
    .with_priority(10)
    .critical();
    let md_shm = Arc::clone(shm);
    let md_journal = Arc::clone(journal);
    let md_seq = Arc::clone(&feed_sequence);
    let md_mid = Arc::clone(&last_mid);
    scheduler.add_task(TaskDefinition::new(md_spec, move || {
        let mut rng = rand::thread_rng();
        let mut mid = md_mid.lock();
        *mid += rng.gen_range(-0.05..0.05);

        let mut quote = MarketDataMessage::new(1);
        quote.bid = *mid - 0.25;
        quote.ask = *mid + 0.25;
        quote.underlying_price = *mid;
        quote.bid_iv = 0.22;
        quote.ask_iv = 0.24;
        quote.bid_size = 10;
        quote.ask_size = 10;
        quote.processing_sequence = md_seq.fetch_add(1, Ordering::Relaxed);
        quote.source_pid = pid;

        if md_shm.lock().publish_market_data(&quote) {
            md_journal.log_market_data(&quote);
        }
    }))?;

    let sig_spec = TaskSpec::new(
        "signal_generation",
        Duration::from_millis(cfg.scheduler.signal_period_ms),
        Duration::from_millis(5),
    )
    .with_priority(5);
    let sig_shm = Arc::clone(shm);
    let sig_journal = Arc::clone(journal);
    let sig_pool = Arc::clone(pool);
    let sig_mid = Arc::clone(&last_mid);
    let sig_enabled = Arc::clone(trading_enabled);
    let sig_arena_size = cfg.memory.default_arena_bytes;
    let sig_sequence = Arc::new(AtomicU32::new(0));
    scheduler.add_task(TaskDefinition::new(sig_spec, move || {
        if !sig_enabled.load(Ordering::Relaxed) {
            return;
        }
        // Per-cycle scratch; everything handed out here dies at reset.
        let mut arena = CycleArena::with_arena_size(&sig_pool, sig_arena_size);
        let Some(scratch) = arena.allocate(std::mem::size_of::<TradingSignalMessage>(), 64)
        else {
            return;
        };

        let mid = *sig_mid.lock();
        // SAFETY: the arena allocation is 128 bytes, 64-byte aligned and
        // exclusively ours until reset.
        let signal = unsafe { &mut *(scratch.as_ptr() as *mut TradingSignalMessage) };
        *signal = TradingSignalMessage::new(1);
        signal.theoretical_price = mid;
        signal.market_price = mid;
        signal.implied_volatility = 0.23;
        signal.forecast_volatility = 0.23;
        signal.confidence = 0.5;
        signal.quantity = 1;
        signal.side = 0;
        signal.sequence_number = sig_sequence.fetch_add(1, Ordering::Relaxed);
        signal.processing_deadline_us = 500;

        if sig_shm.lock().publish_signal(signal) {
            sig_journal.log_trading_signal(signal);
        }
        arena.reset();
    }))?;

    let hb_spec = TaskSpec::new(
        "heartbeat",
        Duration::from_millis(cfg.scheduler.heartbeat_period_ms),
        Duration::from_millis(1),
    )
    .with_priority(1);
    let hb_shm = Arc::clone(shm);
    let hb_journal = Arc::clone(journal);
    scheduler.add_task(TaskDefinition::new(hb_spec, move || {
        let mut beat = ControlMessage::new(ControlKind::Heartbeat);
        beat.source_pid = pid;
        if hb_shm.lock().publish_control(&beat) {
            hb_journal.log_control(&beat);
        }
    }))?;

    Ok(())
}

/// Consumer tasks: drain the three channels and honor shutdown
/// commands.
fn register_consumer_tasks(
    scheduler: &mut TtScheduler,
    cfg: &CoreConfig,
    journal: &Arc<EventLogger>,
    shm: &Arc<Mutex<ShmManager>>,
    shutdown: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let md_spec = TaskSpec::new(
        "market_data",
        Duration::from_millis(cfg.scheduler.market_data_period_ms),
        Duration::from_millis(1),
    )
    .with_priority(10)
    .critical();
    let md_shm = Arc::clone(shm);
    scheduler.add_task(TaskDefinition::new(md_spec, move || {
        let mut batch = [MarketDataMessage::new(0); 32];
        let n = md_shm.lock().consume_market_data_batch(&mut batch);
        if n > 0 {
            tracing::debug!(count = n, last_seq = batch[n - 1].processing_sequence, "market data drained");
        }
    }))?;

    let sig_spec = TaskSpec::new(
        "signal_processing",
        Duration::from_millis(cfg.scheduler.signal_period_ms),
        Duration::from_millis(5),
    )
    .with_priority(5);
    let sig_shm = Arc::clone(shm);
    let sig_journal = Arc::clone(journal);
    scheduler.add_task(TaskDefinition::new(sig_spec, move || {
        while let Some(signal) = sig_shm.lock().consume_signal() {
            sig_journal.log_trading_signal(&signal);
        }
    }))?;

    let ctl_spec = TaskSpec::new(
        "control_processing",
        Duration::from_millis(cfg.scheduler.control_period_ms),
        Duration::from_millis(1),
    )
    .with_priority(8);
    let ctl_shm = Arc::clone(shm);
    let ctl_journal = Arc::clone(journal);
    let ctl_shutdown = Arc::clone(shutdown);
    scheduler.add_task(TaskDefinition::new(ctl_spec, move || {
        while let Some(control) = ctl_shm.lock().consume_control() {
            ctl_journal.log_control(&control);
            match control.kind() {
                ControlKind::SystemShutdown | ControlKind::EmergencyStop => {
                    warn!(kind = ?control.kind(), "shutdown control received");
                    ctl_shutdown.store(true, Ordering::Release);
                }
                ControlKind::Heartbeat => {}
                other => tracing::debug!(kind = ?other, "control message"),
            }
        }
    }))?;

    Ok(())
}

/// Periodic performance report shared by both roles.
fn register_report_task(
    scheduler: &mut TtScheduler,
    cfg: &CoreConfig,
    pool: &Arc<MemoryPool>,
    journal: &Arc<EventLogger>,
    shm: &Arc<Mutex<ShmManager>>,
    metrics: &MetricsRegistry,
) -> anyhow::Result<()> {
    let spec = TaskSpec::new(
        "performance_report",
        Duration::from_millis(cfg.scheduler.report_period_ms),
        Duration::from_millis(2),
    );
    let shm = Arc::clone(shm);
    let pool = Arc::clone(pool);
    let journal = Arc::clone(journal);
    let metrics = metrics.clone();
    scheduler.add_task(TaskDefinition::new(spec, move || {
        let status = shm.lock().status();
        metrics.record_shm_status(&status);
        metrics.record_pool_stats(&pool.stats());
        log_status(&status);
        journal.log_performance_metric("ipc.failure_rate", status.failure_rate);
        journal.log_performance_metric("pool.utilization", pool.utilization());
        if !status.healthy {
            journal.log_event(EventKind::Warning, b"shared memory channels unhealthy");
        }
    }))?;
    Ok(())
}
