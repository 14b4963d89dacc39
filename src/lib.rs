//! # GPU-Resident Multi-Tree Monte Carlo Tree Search
//!
//! A search engine for two-player, perfect-information games that runs the
//! whole MCTS pipeline on the GPU: tree descent, expansion, random rollouts
//! and statistics backup all execute as cooperating compute kernels over a
//! pre-sized device arena, and only scalar summaries ever cross back to the
//! host. Three axes of parallelism compose: independent tree replicas,
//! concurrent exploration inside each tree, and per-stage thread
//! cooperation through shared-memory reductions.
//!
//! The crate also ships a conventional multi-threaded CPU engine as a
//! baseline opponent, host implementations of the supported games, and an
//! interactive match driver (`play` binary).
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcts::config::MctsConfig;
//! use mcts::games::connect4::Connect4State;
//! use mcts::games::GameState;
//! use mcts::gpu::{GpuContext, GpuMcts};
//!
//! let context = Arc::new(GpuContext::new().unwrap());
//! let engine = GpuMcts::<Connect4State>::new(context, MctsConfig::default()).unwrap();
//! let (best, report) = engine.run(&Connect4State::new_game()).unwrap();
//! println!("best action {}\n{}", best, report);
//! ```

pub mod config;
pub mod cpu;
pub mod diagnostics;
pub mod error;
pub mod games;
pub mod gpu;
pub mod runner;

pub use config::{MctsConfig, Variant};
pub use cpu::CpuMcts;
pub use diagnostics::SearchReport;
pub use error::EngineError;
pub use games::GameState;
pub use gpu::{GpuContext, GpuMcts};
