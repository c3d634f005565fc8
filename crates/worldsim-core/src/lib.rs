//! Clock, tick scheduler and orchestration for the World Sim engine.
//!
//! This crate turns agent plans into scheduled actions and dispatches them
//! tick by tick against the event-sourced world: each due action goes to an
//! [`Executor`], the events it produces are appended to the log, and the
//! registered reducers fold them into the world.
//!
//! # Modules
//!
//! - [`clock`] -- Simulated clock with tick granularity, end boundary and
//!   pause state.
//! - [`config`] -- Configuration loading from `worldsim-config.yaml` into
//!   strongly-typed structs.
//! - [`context`] -- Per-run state: clock, world, event log, numbering,
//!   reducers.
//! - [`executor`] -- [`Executor`] trait and [`StubExecutor`].
//! - [`hooks`] -- Pre- and post-tick side hooks, including conversation
//!   triggers for direct messages.
//! - [`persistence`] -- [`PersistenceSink`] trait and an in-memory sink.
//! - [`plan`] -- Plan-to-schedule conversion, validation and wake times.
//! - [`runner`] -- Day loop over the scheduler.
//! - [`scheduler`] -- The [`TickScheduler`].
//!
//! [`Executor`]: executor::Executor
//! [`StubExecutor`]: executor::StubExecutor
//! [`PersistenceSink`]: persistence::PersistenceSink
//! [`TickScheduler`]: scheduler::TickScheduler

pub mod clock;
pub mod config;
pub mod context;
pub mod executor;
pub mod hooks;
pub mod persistence;
pub mod plan;
pub mod runner;
pub mod scheduler;

pub use clock::{SimulationClock, TickGranularity, TickWindow};
pub use config::{ConfigError, SimulationConfig};
pub use context::SimulationContext;
pub use executor::{ExecutionContext, ExecutionReport, Executor, ExecutorError, StubExecutor};
pub use hooks::{Conversation, ConversationRunner, ConversationTrigger, TickHook, TickView};
pub use persistence::{MemorySink, PersistenceSink, SinkError, resume_clock};
pub use plan::{PlanConversion, PlanSettings, convert_plan, generate_wake_time, validate_schedule};
pub use runner::{DaySummary, NoOpCallback, RunnerError, TickCallback, run_day};
pub use scheduler::{TickPhase, TickReport, TickScheduler};
