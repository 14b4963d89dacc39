//! CPU Baseline Engine
//!
//! A multi-threaded, lock-based MCTS used as the reference opponent and as a
//! sanity baseline for the GPU engine. It shares the [`GameState`] contract
//! but none of the device machinery: nodes live on the heap behind `Arc`,
//! statistics behind a mutex and an atomic visit counter, and simulations
//! run in parallel on a rayon pool.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::games::GameState;

/// Simulations launched per budget check
const BATCH_SIZE: u64 = 256;

/// A node in the search tree.
/// Wrapped in an `Arc` for shared ownership across worker threads.
struct Node {
    /// Sum of rewards from the perspective of the player who moved into
    /// this node. Protected by a mutex for concurrent accumulation.
    wins: Mutex<f64>,
    /// Number of times this node has been visited. Atomic for lock-free updates.
    visits: AtomicI32,
    /// Child nodes keyed by action index.
    children: Mutex<HashMap<usize, Arc<Node>>>,
}

impl Node {
    fn new() -> Self {
        Node {
            wins: Mutex::new(0.0),
            visits: AtomicI32::new(0),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// UCB1 score balancing exploitation against exploration
    fn ucb1(&self, parent_visits: i32, exploration: f64) -> f64 {
        let visits = self.visits.load(Ordering::Relaxed);
        if visits == 0 {
            f64::INFINITY
        } else {
            let wins = *self.wins.lock();
            wins / f64::from(visits)
                + exploration * ((f64::from(parent_visits)).ln() / f64::from(visits)).sqrt()
        }
    }
}

/// Per-action statistics of a finished CPU search
#[derive(Debug, Clone, Default)]
pub struct CpuSearchStats {
    pub iterations: u64,
    /// (action, visits, accumulated reward) per root child
    pub actions: Vec<(usize, i32, f64)>,
}

/// The CPU baseline MCTS engine
pub struct CpuMcts<G: GameState> {
    exploration: f64,
    pool: ThreadPool,
    _game: PhantomData<G>,
}

impl<G: GameState> CpuMcts<G> {
    /// Creates an engine with the given exploration constant and thread
    /// count; `0` threads means one per logical CPU.
    pub fn new(exploration: f64, num_threads: usize) -> Self {
        let threads = if num_threads > 0 {
            num_threads
        } else {
            num_cpus::get()
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("failed to build rayon pool");
        CpuMcts {
            exploration,
            pool,
            _game: PhantomData,
        }
    }

    /// Searches from `state` until a budget expires and returns the most
    /// visited root action with the collected statistics.
    ///
    /// The caller must pass a non-terminal state with at least one legal
    /// action.
    pub fn search(
        &self,
        state: &G,
        time_limit: Option<Duration>,
        steps_limit: Option<u64>,
    ) -> (usize, CpuSearchStats) {
        let root = Arc::new(Node::new());
        let started = Instant::now();
        let mut iterations: u64 = 0;
        loop {
            if let Some(limit) = steps_limit {
                if iterations >= limit {
                    break;
                }
            }
            if let Some(limit) = time_limit {
                if started.elapsed() >= limit {
                    break;
                }
            }
            if time_limit.is_none() && steps_limit.is_none() {
                // no budget at all would spin forever
                break;
            }
            let batch = match steps_limit {
                Some(limit) => BATCH_SIZE.min(limit - iterations),
                None => BATCH_SIZE,
            };
            self.pool.install(|| {
                (0..batch).into_par_iter().for_each(|_| {
                    self.run_simulation(state, &root);
                });
            });
            iterations += batch;
        }

        let children = root.children.lock();
        let mut actions: Vec<(usize, i32, f64)> = children
            .iter()
            .map(|(&mv, node)| (mv, node.visits.load(Ordering::Relaxed), *node.wins.lock()))
            .collect();
        actions.sort_by_key(|&(mv, _, _)| mv);
        let best = actions
            .iter()
            .max_by_key(|&&(_, visits, _)| visits)
            .map(|&(mv, _, _)| mv)
            .unwrap_or_else(|| state.legal_actions()[0]);
        (
            best,
            CpuSearchStats {
                iterations,
                actions,
            },
        )
    }

    /// One selection-expansion-playout-backup pass
    fn run_simulation(&self, state: &G, root: &Arc<Node>) {
        let mut current = state.clone();
        // (node, player who moved into it); for the root that player is the
        // opponent of the mover at the root
        let mut path: Vec<(Arc<Node>, i32)> = vec![(root.clone(), -state.turn())];
        let mut node = root.clone();

        // selection, with expansion at the first childless node
        while current.outcome().is_none() {
            let moves = current.legal_actions();
            let parent_visits = node.visits.load(Ordering::Relaxed);
            let mut children = node.children.lock();
            if children.is_empty() {
                for &mv in &moves {
                    children.insert(mv, Arc::new(Node::new()));
                }
                let mv = moves[rand::thread_rng().gen_range(0..moves.len())];
                let child = children[&mv].clone();
                drop(children);
                let mover = current.turn();
                current.apply(mv);
                path.push((child, mover));
                break;
            }
            let picked = moves
                .iter()
                .filter_map(|m| children.get(m).map(|n| (*m, n.clone())))
                .max_by(|(_, a), (_, b)| {
                    let a_ucb = a.ucb1(parent_visits, self.exploration);
                    let b_ucb = b.ucb1(parent_visits, self.exploration);
                    a_ucb.partial_cmp(&b_ucb).unwrap_or(std::cmp::Ordering::Equal)
                });
            let (best_mv, next) = match picked {
                Some(found) => found,
                None => break,
            };
            drop(children);
            let mover = current.turn();
            current.apply(best_mv);
            node = next;
            path.push((node.clone(), mover));
        }

        // playout with the uniform random policy
        let mut sim = current;
        while sim.outcome().is_none() {
            let moves = sim.legal_actions();
            if moves.is_empty() {
                break;
            }
            let mv = moves[rand::thread_rng().gen_range(0..moves.len())];
            sim.apply(mv);
        }
        let outcome = sim.outcome().unwrap_or(0);

        // backup: reward each node from its mover's perspective
        for (node, mover) in path {
            node.visits.fetch_add(1, Ordering::Relaxed);
            let reward = if outcome == 0 {
                0.5
            } else if outcome == mover {
                1.0
            } else {
                0.0
            };
            *node.wins.lock() += reward;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::connect4::Connect4State;
    use crate::games::GameState;

    #[test]
    fn finds_immediate_win() {
        // three in a row for player 1 at the bottom; column 3 wins at once
        let mut game = Connect4State::new_game();
        for col in [0, 0, 1, 1, 2, 2] {
            game.apply(col);
        }
        let engine = CpuMcts::<Connect4State>::new(2.0, 2);
        let (best, stats) = engine.search(&game, None, Some(4096));
        assert_eq!(best, 3);
        assert_eq!(stats.iterations, 4096);
    }

    #[test]
    fn respects_step_budget() {
        let game = Connect4State::new_game();
        let engine = CpuMcts::<Connect4State>::new(2.0, 2);
        let (_, stats) = engine.search(&game, None, Some(100));
        assert_eq!(stats.iterations, 100);
    }

    #[test]
    fn no_budget_returns_immediately() {
        let game = Connect4State::new_game();
        let engine = CpuMcts::<Connect4State>::new(2.0, 1);
        let (best, stats) = engine.search(&game, None, None);
        assert_eq!(stats.iterations, 0);
        assert!(game.is_action_legal(best));
    }
}
