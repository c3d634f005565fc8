//! Engine binary for World Sim.
//!
//! Loads a town scenario, turns every agent's plan into scheduled events
//! and runs one simulated day tick by tick, with a scripted executor
//! standing in for agent cognition.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `worldsim-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Load the scenario (first argument, default `scenarios/sample-town.yaml`)
//! 4. Build the opening world and the simulation clock
//! 5. Generate wake times and convert plans into scheduled events
//! 6. Run the day, persisting to `PostgreSQL` when enabled
//! 7. Log the result

mod error;
mod scenario;
mod scripted;
mod sink;

use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use worldsim_core::{
    ConversationTrigger, DaySummary, MemorySink, NoOpCallback, PersistenceSink, PlanSettings,
    SimulationConfig, SimulationContext, TickScheduler, convert_plan, generate_wake_time,
    run_day, validate_schedule,
};
use worldsim_db::PostgresPool;
use worldsim_types::{AgentId, FirmId, SimulationId};

use crate::error::EngineError;
use crate::scenario::Scenario;
use crate::scripted::{ScriptedConversations, ScriptedExecutor};
use crate::sink::PostgresSink;

/// Config file looked up in the working directory.
const CONFIG_PATH: &str = "worldsim-config.yaml";

/// Scenario used when none is given on the command line.
const DEFAULT_SCENARIO: &str = "scenarios/sample-town.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the day run fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        world_name = config.world.name,
        environment = config.world.environment,
        seed = config.world.seed,
        tick = config.time.granularity().as_str(),
        persist = config.infrastructure.persist,
        "worldsim-engine starting"
    );

    // 3. Load the scenario.
    let scenario_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_SCENARIO), PathBuf::from);
    let scenario = Scenario::from_file(&scenario_path)?;
    info!(
        scenario = %scenario_path.display(),
        agents = scenario.agents.len(),
        firms = scenario.firms.len(),
        "Scenario loaded"
    );

    // 4. Build the world and clock.
    let world = scenario.build_world()?;
    let mut clock = config.build_clock();
    if let Some(date) = scenario.date.filter(|d| *d != clock.date()) {
        let start = date.and_time(clock.current().time());
        clock.initialize(start, clock.tick_size(), config.time.end);
    }
    let date = clock.date();
    let simulation_id = SimulationId::generate();
    let context = SimulationContext::new(
        simulation_id.clone(),
        clock,
        world,
        &config.world.environment,
    );
    let mut scheduler = TickScheduler::new(context);
    scheduler.add_hook(Box::new(ConversationTrigger::new(ScriptedConversations::new(
        scenario.display_names(),
    ))));

    // 5. Plans to scheduled events.
    let scheduled = schedule_plans(
        &mut scheduler,
        &scenario,
        date,
        config.world.seed,
        &config.plan_settings(),
    );
    info!(
        simulation_id = %simulation_id,
        date = %date,
        scheduled,
        "Plans converted"
    );

    // 6. Run the day.
    let mut executor = ScriptedExecutor::new(scenario.display_names(), scenario.location.clone());
    let batch_size = usize::try_from(config.logging.event_batch_size).unwrap_or(usize::MAX);
    let summary = if config.infrastructure.persist {
        let pool = PostgresPool::connect_url(&config.infrastructure.postgres_url).await?;
        pool.run_migrations().await?;
        let mut sink = PostgresSink::new(pool.clone(), batch_size);
        let summary = run(&mut scheduler, &mut executor, &mut sink).await?;
        pool.close().await;
        summary
    } else {
        run(&mut scheduler, &mut executor, &mut MemorySink::new()).await?
    };

    // 7. Log results.
    let world = scheduler.context().world();
    for firm in &scenario.firms {
        let firm_id = FirmId::new(firm.id.as_str());
        info!(
            firm_id = %firm_id,
            cash = %world.firm_cash(&firm_id),
            next_order = ?world.peek_next_order_id(&firm_id),
            "Firm closing state"
        );
    }
    info!(
        simulation_id = %summary.simulation_id,
        ticks = summary.ticks,
        next_event_id = %scheduler.context().events().next_id(),
        "worldsim-engine shutdown complete"
    );

    Ok(())
}

/// Load the main configuration from `worldsim-config.yaml`, falling back to
/// defaults when the file is absent.
fn load_config() -> Result<SimulationConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok(SimulationConfig::from_file(config_path)?)
    } else {
        Ok(SimulationConfig::parse("")?)
    }
}

/// Convert every agent's plan and hand the events to the scheduler.
///
/// Agents whose schedule fails validation are left idle for the day.
/// Returns the number of events scheduled.
fn schedule_plans(
    scheduler: &mut TickScheduler,
    scenario: &Scenario,
    date: chrono::NaiveDate,
    seed: u64,
    settings: &PlanSettings,
) -> usize {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scheduled: usize = 0;
    for agent in &scenario.agents {
        let agent_id = AgentId::new(agent.id.as_str());
        let wake = generate_wake_time(agent.age, date, &mut rng);
        let conversion = convert_plan(&agent_id, &agent.plan, date, Some(wake), settings);
        let validation = validate_schedule(&conversion.events);
        for warning in &validation.warnings {
            warn!(agent_id = %agent_id, warning = %warning, "Schedule warning");
        }
        if !validation.is_valid() {
            warn!(
                agent_id = %agent_id,
                errors = ?validation.errors,
                "Schedule rejected, agent stays idle"
            );
            continue;
        }
        info!(
            agent_id = %agent_id,
            wake = %wake.time(),
            events = conversion.events.len(),
            shifted = conversion.shifted.len(),
            "Schedule accepted"
        );
        scheduled = scheduled.saturating_add(conversion.events.len());
        scheduler.schedule_all(conversion.events);
    }
    scheduled
}

async fn run<S: PersistenceSink>(
    scheduler: &mut TickScheduler,
    executor: &mut ScriptedExecutor,
    sink: &mut S,
) -> Result<DaySummary, EngineError> {
    Ok(run_day(scheduler, executor, sink, &mut NoOpCallback).await?)
}
