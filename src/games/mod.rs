//! # Game Implementations Module
//!
//! This module contains the games the engine ships with and the contract a
//! game must satisfy to be searchable. Each game supplies two layers:
//!
//! - a host-side implementation of the [`GameState`] trait (rule checks,
//!   state transitions, terminal detection, board rendering) used by the
//!   interactive driver and the CPU baseline engine;
//! - a device-side mechanics fragment in WGSL, spliced into the search
//!   kernels at engine construction, providing the same three operations
//!   callable from inside compute shaders with no host round trip:
//!   `ms_is_action_legal`, `ms_take_action`, `ms_compute_outcome`.
//!
//! ## Supported Games
//! - **Connect 4**: gravity-based connection game on a 6x7 grid
//! - **Gomoku (Five in a Row)**: exact-five-in-a-row game on a 15x15 board
//! - **Reversi**: disc-flipping game on a 6x6 board, with an explicit pass
//!   action so turn alternation stays unconditional inside the kernels
//!
//! ## Adding New Games
//! Implement [`GameState`] for a new state type and write the matching WGSL
//! fragment against the `Board`/`Extra` aliases and the `BOARD_M`/`BOARD_N`/
//! `OUTCOME_ONGOING` constants provided by the kernel template. The fragment
//! must keep host and device rules in exact agreement; the engine trusts the
//! device rules during search and the host rules at the driver boundary.

use std::fmt;

pub mod connect4;
pub mod gomoku;
pub mod reversi;

/// Outcome sentinel used on both host and device for a game still going
pub const OUTCOME_ONGOING: i32 = 2;

/// A two-player, perfect-information game searchable by the engines.
///
/// Actions are dense indices in `0..max_actions()`; not every index is legal
/// in every state. Players are `1` (maximizing, moves first) and `-1`
/// (minimizing); outcomes are from the same absolute perspective.
pub trait GameState: Clone + Send + Sync + fmt::Display {
    /// Short name of the game, used in reports
    fn game_name() -> &'static str;
    /// Board shape as (rows, columns)
    fn board_shape() -> (usize, usize);
    /// Bytes of per-state information not derivable from the board itself
    fn extra_info_size() -> usize;
    /// Largest branching factor of the game
    fn max_actions() -> usize;
    /// WGSL source of the device mechanics adapter for this game
    fn device_mechanics_wgsl() -> &'static str;

    /// The initial position
    fn new_game() -> Self;
    /// Player to move: `1` or `-1`
    fn turn(&self) -> i32;
    /// Whether the given action index is legal in this state
    fn is_action_legal(&self, action: usize) -> bool;
    /// Applies a legal action, mutating the state and flipping the turn.
    /// Callers must check legality first.
    fn apply(&mut self, action: usize);
    /// `Some(-1 | 0 | 1)` for a finished game, `None` while ongoing
    fn outcome(&self) -> Option<i32>;

    /// Writes the board as bytes, row-major, into `out` (length `m * n`)
    fn encode_board(&self, out: &mut [i8]);
    /// Writes the extra info bytes into `out` (length `extra_info_size()`)
    fn encode_extra_info(&self, out: &mut [i8]);

    /// Human-readable name of an action (e.g. a column number or "B4")
    fn action_name(action: usize) -> String;
    /// Inverse of [`action_name`](Self::action_name)
    fn action_index(name: &str) -> Option<usize>;

    /// All legal action indices in this state
    fn legal_actions(&self) -> Vec<usize> {
        (0..Self::max_actions())
            .filter(|&a| self.is_action_legal(a))
            .collect()
    }
}
