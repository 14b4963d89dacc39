//! Interactive Match Driver
//!
//! Carries out a series of games between two participants, each a human at
//! the terminal, the CPU baseline engine or the GPU engine. Colors alternate
//! between games; running scores and per-move engine reports are printed as
//! the match progresses.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use colored::Colorize;

use crate::cpu::CpuMcts;
use crate::games::GameState;
use crate::gpu::GpuMcts;

/// One participant of a match
pub enum PlayerHandle<G: GameState> {
    Human,
    Cpu {
        engine: CpuMcts<G>,
        time_limit: Option<Duration>,
        steps_limit: Option<u64>,
    },
    Gpu(GpuMcts<G>),
}

impl<G: GameState> PlayerHandle<G> {
    pub fn label(&self) -> &'static str {
        match self {
            PlayerHandle::Human => "human",
            PlayerHandle::Cpu { .. } => "cpu-mcts",
            PlayerHandle::Gpu(_) => "gpu-mcts",
        }
    }

    /// Picks a move for `state`; `None` means the human resigned the match
    fn choose(&self, state: &G, verbose: bool) -> Option<usize> {
        match self {
            PlayerHandle::Human => prompt_for_move(state),
            PlayerHandle::Cpu {
                engine,
                time_limit,
                steps_limit,
            } => {
                let (best, stats) = engine.search(state, *time_limit, *steps_limit);
                if verbose {
                    println!(
                        "{}",
                        format!("[cpu: {} iterations]", stats.iterations).dimmed()
                    );
                }
                Some(best)
            }
            PlayerHandle::Gpu(engine) => match engine.run(state) {
                Ok((best, report)) => {
                    if verbose {
                        println!("{}", format!("{}", report).dimmed());
                    }
                    Some(best)
                }
                Err(e) => {
                    eprintln!("{}", format!("engine failure: {}", e).red());
                    None
                }
            },
        }
    }
}

/// Reads moves from stdin until a legal one (or "quit") arrives
fn prompt_for_move<G: GameState>(state: &G) -> Option<usize> {
    let stdin = io::stdin();
    loop {
        print!("{}", "your move: ".bold());
        io::stdout().flush().ok();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") {
            return None;
        }
        match G::action_index(trimmed) {
            Some(action) if state.is_action_legal(action) => return Some(action),
            Some(_) => println!("{}", "illegal move".yellow()),
            None => println!("{}", "unrecognized move".yellow()),
        }
    }
}

/// Aggregate result of a match series
#[derive(Debug, Clone, Default)]
pub struct MatchStats {
    /// Game outcomes in play order: 1 black win, 0 draw, -1 white win
    pub outcomes: Vec<i32>,
    pub score_a: f64,
    pub score_b: f64,
}

/// Drives a series of games between two participants
pub struct GameRunner<G: GameState> {
    player_a: PlayerHandle<G>,
    player_b: PlayerHandle<G>,
    verbose: bool,
}

impl<G: GameState> GameRunner<G> {
    pub fn new(player_a: PlayerHandle<G>, player_b: PlayerHandle<G>, verbose: bool) -> Self {
        Self {
            player_a,
            player_b,
            verbose,
        }
    }

    /// Plays `n_games` games, alternating colors; returns the series stats.
    /// Stops early if a human participant resigns.
    pub fn play_series(&self, n_games: u32) -> MatchStats {
        let mut stats = MatchStats::default();
        for game_index in 0..n_games {
            let a_is_black = game_index % 2 == 0;
            let (black, white) = if a_is_black {
                (&self.player_a, &self.player_b)
            } else {
                (&self.player_b, &self.player_a)
            };
            println!();
            println!(
                "{}",
                format!("GAME {}/{} ({})", game_index + 1, n_games, G::game_name()).bold()
            );
            println!("black: {}, white: {}", black.label(), white.label());
            let outcome = match self.play_game(black, white) {
                Some(outcome) => outcome,
                None => {
                    println!("{}", "match stopped".yellow());
                    break;
                }
            };
            stats.outcomes.push(outcome);
            let normed = 0.5 * (f64::from(outcome) + 1.0);
            let (for_a, for_b) = if a_is_black {
                (normed, 1.0 - normed)
            } else {
                (1.0 - normed, normed)
            };
            stats.score_a += for_a;
            stats.score_b += for_b;
            let played = stats.outcomes.len() as f64;
            println!(
                "score so far -> {}: {} ({:.2} mean), {}: {} ({:.2} mean)",
                self.player_a.label(),
                stats.score_a,
                stats.score_a / played,
                self.player_b.label(),
                stats.score_b,
                stats.score_b / played,
            );
        }
        stats
    }

    /// Plays a single game; returns its outcome or `None` on resignation
    fn play_game(&self, black: &PlayerHandle<G>, white: &PlayerHandle<G>) -> Option<i32> {
        let mut state = G::new_game();
        println!("{}", state);
        loop {
            let mover = if state.turn() == 1 { black } else { white };
            let action = mover.choose(&state, self.verbose)?;
            println!(
                "{} plays {}",
                if state.turn() == 1 { "black" } else { "white" },
                G::action_name(action).bold()
            );
            state.apply(action);
            println!("{}", state);
            if let Some(outcome) = state.outcome() {
                let message = match outcome {
                    1 => "BLACK WINS".green().bold(),
                    -1 => "WHITE WINS".green().bold(),
                    _ => "DRAW".cyan().bold(),
                };
                println!("{}", message);
                return Some(outcome);
            }
        }
    }
}
