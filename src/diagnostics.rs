//! Search Diagnostics
//!
//! The record returned alongside every decision: per-action statistics
//! reduced over all tree replicas, the chosen action, performance counters
//! and tree-shape aggregates. The driver prints these through the `Display`
//! impls; tests assert on the raw fields.

use std::fmt;
use std::time::Duration;

/// Statistics of one legal root action, reduced over all tree replicas
#[derive(Debug, Clone)]
pub struct ActionInfo {
    /// Dense action index
    pub index: usize,
    /// Human-readable action name supplied by the game
    pub name: String,
    /// Total visits of the root across trees (denominator of the UCB bonus)
    pub n_root: u64,
    /// True when the action is proven to win (sticky for the whole run)
    pub win_flag: bool,
    /// Visits of this action across trees
    pub n: u64,
    /// Wins observed for the root mover through this action
    pub n_wins: u64,
    /// Empirical action value `n_wins / n`
    pub q: f64,
    /// Upper confidence bound used by selection
    pub ucb: f64,
}

impl fmt::Display for ActionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: n_root: {}, win_flag: {}, n: {}, n_wins: {}, q: {:.4}, ucb: {:.4}",
            self.name, self.n_root, self.win_flag, self.n, self.n_wins, self.q, self.ucb
        )
    }
}

/// Per-stage and aggregate timing of a run, in milliseconds
#[derive(Debug, Clone, Default)]
pub struct TimesInfo {
    pub total_ms: f64,
    pub loop_ms: f64,
    pub reduce_over_trees_ms: f64,
    pub mean_loop_ms: f64,
    pub mean_select_ms: f64,
    pub mean_expand_ms: f64,
    pub mean_playout_ms: f64,
    pub mean_backup_ms: f64,
}

/// Shape statistics of the grown tree replicas
#[derive(Debug, Clone, Default)]
pub struct TreesInfo {
    /// Node count of each tree at the end of the run
    pub sizes: Vec<u32>,
    /// Mean node depth of each tree
    pub mean_depths: Vec<f64>,
    /// Maximum node depth of each tree
    pub max_depths: Vec<u32>,
    /// Trees whose growth was frozen by a full arena
    pub frozen_trees: u32,
}

impl TreesInfo {
    /// Total number of nodes across all trees
    pub fn total_size(&self) -> u64 {
        self.sizes.iter().map(|&s| u64::from(s)).sum()
    }

    /// Largest depth reached by any tree
    pub fn max_depth(&self) -> u32 {
        self.max_depths.iter().copied().max().unwrap_or(0)
    }

    /// Mean of the per-tree mean depths
    pub fn mean_depth(&self) -> f64 {
        if self.mean_depths.is_empty() {
            return 0.0;
        }
        self.mean_depths.iter().sum::<f64>() / self.mean_depths.len() as f64
    }
}

/// Performance counters of a single `run`
#[derive(Debug, Clone, Default)]
pub struct PerformanceInfo {
    /// Completed Selection-Expansion-Playout-Backup steps
    pub steps: u64,
    pub steps_per_second: f64,
    /// Total rollouts credited at the roots across all trees
    pub playouts: u64,
    pub playouts_per_second: f64,
    pub times: TimesInfo,
    pub trees: TreesInfo,
}

/// Full diagnostic record of one decision
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Per-action statistics, ordered by action index
    pub actions: Vec<ActionInfo>,
    /// Index into `actions` of the chosen entry
    pub best: usize,
    pub performance: PerformanceInfo,
}

impl SearchReport {
    /// The chosen action's statistics
    pub fn best_action(&self) -> &ActionInfo {
        &self.actions[self.best]
    }
}

impl fmt::Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "actions info:")?;
        for action in &self.actions {
            writeln!(f, "  {}", action)?;
        }
        let best = self.best_action();
        writeln!(f, "  best: {} (index: {})", best, best.index)?;
        let p = &self.performance;
        writeln!(f, "performance info:")?;
        writeln!(
            f,
            "  steps: {} ({:.1}/s), playouts: {} ({:.1}/s)",
            p.steps, p.steps_per_second, p.playouts, p.playouts_per_second
        )?;
        let t = &p.times;
        writeln!(
            f,
            "  times [ms] -> total: {:.2}, loop: {:.2}, reduce_over_trees: {:.2}",
            t.total_ms, t.loop_ms, t.reduce_over_trees_ms
        )?;
        writeln!(
            f,
            "  mean times [ms] -> loop: {:.3}, select: {:.3}, expand: {:.3}, playout: {:.3}, backup: {:.3}",
            t.mean_loop_ms, t.mean_select_ms, t.mean_expand_ms, t.mean_playout_ms, t.mean_backup_ms
        )?;
        let trees = &p.trees;
        write!(
            f,
            "  trees -> count: {}, total size: {}, mean depth: {:.2}, max depth: {}, frozen: {}",
            trees.sizes.len(),
            trees.total_size(),
            trees.mean_depth(),
            trees.max_depth(),
            trees.frozen_trees
        )
    }
}

/// Helper converting a duration to fractional milliseconds
pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}
