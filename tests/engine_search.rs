//! End-to-end searches on the GPU engine.
//!
//! Every test acquires a real device; on machines without a usable adapter
//! the tests log a skip notice and return early instead of failing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use mcts::config::{MctsConfig, Variant};
use mcts::error::EngineError;
use mcts::games::connect4::Connect4State;
use mcts::games::GameState;
use mcts::gpu::{GpuContext, GpuMcts};

fn gpu_context() -> Option<Arc<GpuContext>> {
    match GpuContext::new() {
        Ok(context) => Some(Arc::new(context)),
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            None
        }
    }
}

fn steps_config(steps: u64, variant: Variant) -> MctsConfig {
    MctsConfig {
        search_time_limit: None,
        search_steps_limit: Some(steps),
        n_trees: 2,
        n_playouts: 32,
        variant,
        device_memory: 256 * 1024 * 1024,
        ..MctsConfig::default()
    }
}

/// A position where the mover (player 1) completes four in a row with
/// column 3; the opponent has no faster threat.
fn one_ply_win_position() -> Connect4State {
    let mut game = Connect4State::new_game();
    for col in [0, 0, 1, 1, 2, 2] {
        game.apply(col);
    }
    game
}

#[test]
fn construction_rejects_invalid_playout_count() {
    let Some(context) = gpu_context() else { return };
    let mut config = steps_config(8, Variant::OcpThrifty);
    config.n_playouts = 100;
    assert!(matches!(
        GpuMcts::<Connect4State>::new(context.clone(), config),
        Err(EngineError::Configuration(_))
    ));
    let config = steps_config(8, Variant::OcpThrifty);
    assert!(GpuMcts::<Connect4State>::new(context, config).is_ok());
}

#[test]
fn finds_forced_win_with_proof() {
    let Some(context) = gpu_context() else { return };
    for variant in [Variant::OcpProdigal, Variant::AcpProdigal] {
        let engine =
            GpuMcts::<Connect4State>::new(context.clone(), steps_config(64, variant)).unwrap();
        let (best, report) = engine.run(&one_ply_win_position()).unwrap();
        assert_eq!(best, 3, "variant {}", variant);
        let winning = report.best_action();
        assert!(winning.win_flag, "variant {}", variant);
        assert!(winning.q > 0.99, "variant {}: q = {}", variant, winning.q);
    }
}

#[test]
fn fixed_seed_and_steps_are_deterministic() {
    let Some(context) = gpu_context() else { return };
    let game = Connect4State::new_game();
    let mut observed = Vec::new();
    for _ in 0..2 {
        let engine =
            GpuMcts::<Connect4State>::new(context.clone(), steps_config(40, Variant::AcpThrifty))
                .unwrap();
        let (best, report) = engine.run(&game).unwrap();
        let stats: Vec<(usize, u64, u64, bool)> = report
            .actions
            .iter()
            .map(|a| (a.index, a.n, a.n_wins, a.win_flag))
            .collect();
        observed.push((best, stats));
    }
    assert_eq!(observed[0], observed[1]);
}

#[test]
fn thrifty_and_prodigal_produce_identical_statistics() {
    // rollout streams are keyed by absolute rollout index, so the two
    // scheduling profiles must agree bit-for-bit on the search outcome
    let Some(context) = gpu_context() else { return };
    let game = Connect4State::new_game();
    let collect = |variant: Variant| {
        // 128 rollouts so the two profiles really differ in geometry:
        // thrifty runs 64 threads looping twice, prodigal 128 threads once
        let mut config = steps_config(32, variant);
        config.n_playouts = 128;
        let engine = GpuMcts::<Connect4State>::new(context.clone(), config).unwrap();
        let (best, report) = engine.run(&game).unwrap();
        let stats: Vec<(usize, u64, u64)> = report
            .actions
            .iter()
            .map(|a| (a.index, a.n, a.n_wins))
            .collect();
        (best, stats)
    };
    assert_eq!(
        collect(Variant::OcpThrifty),
        collect(Variant::OcpProdigal)
    );
    assert_eq!(
        collect(Variant::AcpThrifty),
        collect(Variant::AcpProdigal)
    );
}

#[test]
fn step_budget_is_exact_and_visits_are_conserved() {
    let Some(context) = gpu_context() else { return };
    let steps = 50;
    let config = steps_config(steps, Variant::OcpProdigal);
    let (n_trees, n_playouts) = (config.n_trees as u64, config.n_playouts as u64);
    let engine = GpuMcts::<Connect4State>::new(context, config).unwrap();
    let (_, report) = engine.run(&Connect4State::new_game()).unwrap();
    assert_eq!(report.performance.steps, steps);
    // every step credits exactly one playout batch per tree at the root
    assert_eq!(report.performance.playouts, steps * n_trees * n_playouts);
    // the root's visits all flow through its children
    let child_total: u64 = report.actions.iter().map(|a| a.n).sum();
    assert_eq!(child_total, report.performance.playouts);
}

#[test]
fn acp_visits_are_conserved_at_the_root() {
    let Some(context) = gpu_context() else { return };
    let engine = GpuMcts::<Connect4State>::new(
        context,
        steps_config(30, Variant::AcpProdigal),
    )
    .unwrap();
    let (_, report) = engine.run(&Connect4State::new_game()).unwrap();
    let child_total: u64 = report.actions.iter().map(|a| a.n).sum();
    assert_eq!(child_total, report.performance.playouts);
    assert!(report.performance.playouts > 0);
}

#[test]
fn time_budget_overrun_is_bounded() {
    let Some(context) = gpu_context() else { return };
    let limit = Duration::from_millis(400);
    let config = MctsConfig {
        search_time_limit: Some(limit),
        search_steps_limit: None,
        n_trees: 2,
        n_playouts: 32,
        variant: Variant::OcpThrifty,
        device_memory: 256 * 1024 * 1024,
        ..MctsConfig::default()
    };
    let engine = GpuMcts::<Connect4State>::new(context, config).unwrap();
    let started = Instant::now();
    let (_, report) = engine.run(&Connect4State::new_game()).unwrap();
    let elapsed = started.elapsed();
    assert!(report.performance.steps > 0);
    // the loop may overrun by at most roughly one step plus readback
    assert!(
        elapsed < limit + Duration::from_secs(3),
        "run took {:?}",
        elapsed
    );
}

#[test]
fn full_arena_freezes_trees_instead_of_failing() {
    let Some(context) = gpu_context() else { return };
    let mut config = steps_config(200, Variant::OcpThrifty);
    // enough for the fixed buffers plus only a handful of nodes per tree
    config.device_memory = 64 * 1024;
    let engine = match GpuMcts::<Connect4State>::new(context, config) {
        Ok(engine) => engine,
        Err(EngineError::ResourceExhaustion(_)) => return,
        Err(e) => panic!("unexpected construction failure: {}", e),
    };
    assert!(engine.max_tree_size() < 200);
    let (best, report) = engine.run(&Connect4State::new_game()).unwrap();
    assert_eq!(report.performance.steps, 200);
    assert!(report.performance.trees.frozen_trees > 0);
    assert!(Connect4State::new_game().is_action_legal(best));
}

#[test]
fn symmetric_opening_gets_symmetric_exploration() {
    let Some(context) = gpu_context() else { return };
    let mut config = steps_config(150, Variant::AcpProdigal);
    config.n_trees = 4;
    let engine = GpuMcts::<Connect4State>::new(context, config).unwrap();
    let (_, report) = engine.run(&Connect4State::new_game()).unwrap();
    assert_eq!(report.actions.len(), 7);
    for a in &report.actions {
        assert!(a.n > 0, "column {} never explored", a.index);
    }
    // mirrored columns should receive comparable attention
    for (left, right) in [(0usize, 6usize), (1, 5), (2, 4)] {
        let n_left = report.actions[left].n as f64;
        let n_right = report.actions[right].n as f64;
        let ratio = n_left.min(n_right) / n_left.max(n_right);
        assert!(
            ratio > 0.2,
            "columns {} and {} out of balance: {} vs {}",
            left,
            right,
            n_left,
            n_right
        );
    }
}

#[test]
fn proven_win_flag_is_monotonic_across_a_run() {
    // the flag is latched on the device; a longer run from the same position
    // must still report it
    let Some(context) = gpu_context() else { return };
    let position = one_ply_win_position();
    for steps in [16, 256] {
        let engine = GpuMcts::<Connect4State>::new(
            context.clone(),
            steps_config(steps, Variant::AcpProdigal),
        )
        .unwrap();
        let (best, report) = engine.run(&position).unwrap();
        assert_eq!(best, 3);
        assert!(report.best_action().win_flag, "steps = {}", steps);
    }
}

#[test]
fn terminal_position_is_rejected() {
    let Some(context) = gpu_context() else { return };
    let mut game = one_ply_win_position();
    game.apply(3);
    assert!(game.outcome().is_some());
    let engine =
        GpuMcts::<Connect4State>::new(context, steps_config(8, Variant::OcpThrifty)).unwrap();
    assert!(matches!(
        engine.run(&game),
        Err(EngineError::Configuration(_))
    ));
}

#[test]
fn reversi_search_handles_the_pass_action() {
    let Some(context) = gpu_context() else { return };
    use mcts::games::reversi::ReversiState;
    let engine =
        GpuMcts::<ReversiState>::new(context, steps_config(24, Variant::AcpThrifty)).unwrap();
    let game = ReversiState::new_game();
    let (best, report) = engine.run(&game).unwrap();
    assert!(game.is_action_legal(best));
    assert_eq!(report.performance.steps, 24);
    // the four opening moves and nothing else
    let explored: Vec<usize> = report.actions.iter().map(|a| a.index).collect();
    assert_eq!(explored, vec![8, 13, 22, 27]);
}

#[test]
fn forced_step_override_wins_over_configured_budget() {
    let Some(context) = gpu_context() else { return };
    let engine = GpuMcts::<Connect4State>::new(
        context,
        steps_config(1000, Variant::OcpThrifty),
    )
    .unwrap();
    let (_, report) = engine
        .run_with(&Connect4State::new_game(), Some(7))
        .unwrap();
    assert_eq!(report.performance.steps, 7);
}
