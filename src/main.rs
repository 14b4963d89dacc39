//! # GPU-Resident Multi-Tree MCTS Engine
//!
//! Entry point for the match driver. Pits any combination of a human, the
//! CPU baseline engine and the GPU engine against each other in Connect 4,
//! Gomoku or Reversi, over a configurable number of games with alternating
//! colors.
//!
//! Run with `cargo run --release` for best performance.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::Colorize;

use mcts::config::{MctsConfig, Variant};
use mcts::cpu::CpuMcts;
use mcts::error::Result;
use mcts::games::connect4::Connect4State;
use mcts::games::gomoku::GomokuState;
use mcts::games::reversi::ReversiState;
use mcts::games::GameState;
use mcts::gpu::{GpuContext, GpuMcts};
use mcts::runner::{GameRunner, PlayerHandle};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GameChoice {
    Connect4,
    Gomoku,
    Reversi,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlayerChoice {
    Human,
    Cpu,
    Gpu,
}

/// Play board games against GPU- and CPU-based MCTS engines
#[derive(Parser, Debug)]
#[command(name = "play", version, about)]
struct Cli {
    /// Game to play
    #[arg(long, value_enum, default_value = "connect4")]
    game: GameChoice,

    /// First participant (black in odd-numbered games)
    #[arg(long, value_enum, default_value = "human")]
    black: PlayerChoice,

    /// Second participant
    #[arg(long, value_enum, default_value = "gpu")]
    white: PlayerChoice,

    /// Number of games in the series
    #[arg(long, default_value_t = 1)]
    games: u32,

    /// Search time limit per move in seconds; 0 means unbounded
    #[arg(long, default_value_t = 5.0)]
    time_limit: f64,

    /// Search step limit per move; 0 means unbounded
    #[arg(long, default_value_t = 0)]
    steps_limit: u64,

    /// Number of independent tree replicas grown by the GPU engine
    #[arg(long, default_value_t = 8)]
    n_trees: usize,

    /// Rollouts per playout target per step (a power of two)
    #[arg(long, default_value_t = 128)]
    n_playouts: usize,

    /// Playout variant: ocp_thrifty, ocp_prodigal, acp_thrifty, acp_prodigal
    #[arg(long, default_value = "acp_prodigal")]
    variant: String,

    /// Exploration constant of the UCB1 formula
    #[arg(long, default_value_t = 2.0)]
    ucb_c: f64,

    /// Seed for all random streams
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Device memory budget for the tree arena, in GiB
    #[arg(long, default_value_t = 2.0)]
    device_memory: f64,

    /// Worker threads of the CPU engine; 0 means one per logical CPU
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Suppress per-move engine reports
    #[arg(long)]
    quiet: bool,
}

impl Cli {
    fn time_limit(&self) -> Option<Duration> {
        (self.time_limit > 0.0).then(|| Duration::from_secs_f64(self.time_limit))
    }

    fn steps_limit(&self) -> Option<u64> {
        (self.steps_limit > 0).then_some(self.steps_limit)
    }

    fn engine_config(&self) -> std::result::Result<MctsConfig, String> {
        let variant: Variant = self.variant.parse()?;
        if self.device_memory <= 0.0 {
            return Err("device memory budget must be positive".to_string());
        }
        Ok(MctsConfig {
            search_time_limit: self.time_limit(),
            search_steps_limit: self.steps_limit(),
            n_trees: self.n_trees,
            n_playouts: self.n_playouts,
            variant,
            ucb_c: self.ucb_c,
            seed: self.seed,
            device_memory: (self.device_memory * (1u64 << 30) as f64) as u64,
        })
    }
}

fn build_player<G: GameState>(
    choice: PlayerChoice,
    cli: &Cli,
    context: &mut Option<Arc<GpuContext>>,
) -> Result<PlayerHandle<G>> {
    match choice {
        PlayerChoice::Human => Ok(PlayerHandle::Human),
        PlayerChoice::Cpu => Ok(PlayerHandle::Cpu {
            engine: CpuMcts::new(cli.ucb_c, cli.threads),
            time_limit: cli.time_limit(),
            steps_limit: cli.steps_limit(),
        }),
        PlayerChoice::Gpu => {
            let config = cli
                .engine_config()
                .map_err(mcts::error::EngineError::Configuration)?;
            if context.is_none() {
                let fresh = Arc::new(GpuContext::new()?);
                let info = fresh.adapter_info();
                println!(
                    "{}",
                    format!("GPU: {} ({:?})", info.name, info.backend).dimmed()
                );
                *context = Some(fresh);
            }
            let engine = GpuMcts::new(context.as_ref().unwrap().clone(), config)?;
            println!(
                "{}",
                format!(
                    "arena: {} trees x {} nodes, {} B per state",
                    engine.config().n_trees,
                    engine.max_tree_size(),
                    engine.per_state_memory()
                )
                .dimmed()
            );
            Ok(PlayerHandle::Gpu(engine))
        }
    }
}

fn run_match<G: GameState>(cli: &Cli) -> Result<()> {
    let mut context: Option<Arc<GpuContext>> = None;
    let player_a = build_player::<G>(cli.black, cli, &mut context)?;
    let player_b = build_player::<G>(cli.white, cli, &mut context)?;
    let runner = GameRunner::new(player_a, player_b, !cli.quiet);
    let stats = runner.play_series(cli.games);
    if !stats.outcomes.is_empty() {
        let black_wins = stats.outcomes.iter().filter(|&&o| o == 1).count();
        let white_wins = stats.outcomes.iter().filter(|&&o| o == -1).count();
        let draws = stats.outcomes.len() - black_wins - white_wins;
        println!();
        println!(
            "{}",
            format!(
                "series over -> black wins: {}, draws: {}, white wins: {}",
                black_wins, draws, white_wins
            )
            .bold()
        );
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.game {
        GameChoice::Connect4 => run_match::<Connect4State>(&cli),
        GameChoice::Gomoku => run_match::<GomokuState>(&cli),
        GameChoice::Reversi => run_match::<ReversiState>(&cli),
    };
    if let Err(e) = result {
        eprintln!("{}", format!("error: {}", e).red());
        std::process::exit(1);
    }
}
