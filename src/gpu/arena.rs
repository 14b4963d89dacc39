//! Device Arena
//!
//! Flat, pre-sized GPU buffers holding every node of every tree replica:
//! per-node scalar fields, child-index tables, board and extra-info lanes,
//! per-tree control words, rollout outcome records and the root-statistics
//! block. Sizing happens once, at engine construction, from the configured
//! device-memory budget and the device's binding limits; after that the
//! allocation is fixed for the lifetime of the engine and only
//! [`DeviceArena::reset_trees`] rewinds the per-tree allocation cursors for
//! a fresh decision.
//!
//! Nothing here needs thread-safety primitives: stage ordering guarantees
//! at most one kernel mutates a tree's slice of the arena at any instant.

use bytemuck::{Pod, Zeroable};
use wgpu::Buffer;

use crate::config::MctsConfig;
use crate::error::{EngineError, Result};
use crate::gpu::context::GpuContext;

/// Per-tree control stride in i32 words, must match the kernel layout
pub const CTL_STRIDE: usize = 8;
/// Control-word indices (kernel layout)
pub const CTL_SIZE: usize = 0;
pub const CTL_FROZEN: usize = 1;
pub const CTL_DEPTH_SUM: usize = 5;
pub const CTL_DEPTH_MAX: usize = 6;
pub const CTL_ERROR: usize = 7;

/// Upper bound on nodes per tree regardless of budget, keeps indices well
/// inside i32 range
const MAX_TREE_SIZE_CAP: u64 = 1 << 24;

/// Host mirror of the device node struct (layout must match the shader)
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default)]
pub struct GpuNode {
    pub parent: i32,
    pub depth: i32,
    pub turn: i32,
    pub flags: u32,
    pub outcome: i32,
    pub last_action: i32,
    pub n: i32,
    pub n_wins: i32,
}

/// Host mirror of the device uniform parameters
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct GpuParams {
    pub seed: u32,
    pub step: u32,
    pub root_turn: i32,
    pub ucb_c: f32,
}

/// Geometry and memory accounting of one arena
#[derive(Debug, Clone, Copy)]
pub struct ArenaPlan {
    pub n_trees: usize,
    pub max_actions: usize,
    pub board_cells: usize,
    /// Extra-info lanes per state; at least 1 so the buffer is never empty
    pub extra_words: usize,
    pub n_playouts: usize,
    /// Playout targets per tree whose outcomes are recorded (1 or max_actions)
    pub playout_slots: usize,
    /// Bytes a single state occupies on device (board + extra lanes)
    pub per_state_memory: u64,
    /// Nodes each tree may ever hold
    pub max_tree_size: u32,
}

impl ArenaPlan {
    /// Derives the arena geometry from the configuration, the game
    /// dimensions and the device's largest storage binding.
    pub fn derive(
        config: &MctsConfig,
        board_shape: (usize, usize),
        extra_info_size: usize,
        max_actions: usize,
        max_storage_binding: u64,
    ) -> Result<Self> {
        let board_cells = board_shape.0 * board_shape.1;
        let extra_words = extra_info_size.max(1);
        let playout_slots = if config.variant.is_acp() { max_actions } else { 1 };
        let n_trees = config.n_trees as u64;

        let per_state_memory = ((board_cells + extra_words) * 4) as u64;
        let per_node = std::mem::size_of::<GpuNode>() as u64
            + (max_actions * 4) as u64
            + per_state_memory;

        let outcomes_bytes = n_trees * (playout_slots * config.n_playouts * 4) as u64;
        let root_stats_bytes = (n_trees * max_actions as u64 + (max_actions * 4 + 1) as u64) * 4;
        let ctl_bytes = n_trees * (CTL_STRIDE * 4) as u64;
        let fixed = outcomes_bytes + root_stats_bytes + ctl_bytes;

        if config.device_memory <= fixed {
            return Err(EngineError::ResourceExhaustion(format!(
                "device memory budget {} B is consumed by fixed buffers ({} B)",
                config.device_memory, fixed
            )));
        }
        let mut max_tree_size = (config.device_memory - fixed) / (n_trees * per_node);

        // each storage buffer must fit in a single binding
        let per_node_binding_costs = [
            std::mem::size_of::<GpuNode>() as u64,
            (max_actions * 4) as u64,
            (board_cells * 4) as u64,
            (extra_words * 4) as u64,
        ];
        for cost in per_node_binding_costs {
            max_tree_size = max_tree_size.min(max_storage_binding / (n_trees * cost));
        }
        max_tree_size = max_tree_size.min(MAX_TREE_SIZE_CAP);

        if max_tree_size < 1 {
            return Err(EngineError::ResourceExhaustion(format!(
                "device memory budget {} B cannot host even one node per tree \
                 ({} trees, {} B per node)",
                config.device_memory, n_trees, per_node
            )));
        }

        Ok(Self {
            n_trees: config.n_trees,
            max_actions,
            board_cells,
            extra_words,
            n_playouts: config.n_playouts,
            playout_slots,
            per_state_memory,
            max_tree_size: max_tree_size as u32,
        })
    }

    fn total_nodes(&self) -> u64 {
        self.n_trees as u64 * u64::from(self.max_tree_size)
    }

    pub fn nodes_bytes(&self) -> u64 {
        self.total_nodes() * std::mem::size_of::<GpuNode>() as u64
    }

    pub fn children_bytes(&self) -> u64 {
        self.total_nodes() * (self.max_actions * 4) as u64
    }

    pub fn boards_bytes(&self) -> u64 {
        self.total_nodes() * (self.board_cells * 4) as u64
    }

    pub fn extras_bytes(&self) -> u64 {
        self.total_nodes() * (self.extra_words * 4) as u64
    }

    pub fn ctl_bytes(&self) -> u64 {
        (self.n_trees * CTL_STRIDE * 4) as u64
    }

    pub fn outcomes_bytes(&self) -> u64 {
        (self.n_trees * self.playout_slots * self.n_playouts * 4) as u64
    }

    /// Sticky flags per (tree, action), reduced block, one summary word
    pub fn root_stats_words(&self) -> usize {
        self.n_trees * self.max_actions + self.max_actions * 4 + 1
    }

    pub fn root_stats_bytes(&self) -> u64 {
        (self.root_stats_words() * 4) as u64
    }

    /// Word offset of the reduced per-action block inside `root_stats`
    pub fn reduced_base(&self) -> usize {
        self.n_trees * self.max_actions
    }
}

/// The arena proper: one buffer per kernel binding
pub struct DeviceArena {
    pub plan: ArenaPlan,
    pub params: Buffer,
    pub nodes: Buffer,
    pub children: Buffer,
    pub boards: Buffer,
    pub extras: Buffer,
    pub tree_ctl: Buffer,
    pub rollout_outcomes: Buffer,
    pub root_stats: Buffer,
}

impl DeviceArena {
    /// Allocates every buffer of the plan on the device
    pub fn new(context: &GpuContext, plan: ArenaPlan) -> Self {
        Self {
            params: context
                .create_uniform_buffer("Search Params", std::mem::size_of::<GpuParams>() as u64),
            nodes: context.create_storage_buffer("Arena Nodes", plan.nodes_bytes()),
            children: context.create_storage_buffer("Arena Children", plan.children_bytes()),
            boards: context.create_storage_buffer("Arena Boards", plan.boards_bytes()),
            extras: context.create_storage_buffer("Arena Extras", plan.extras_bytes()),
            tree_ctl: context.create_storage_buffer("Tree Control", plan.ctl_bytes()),
            rollout_outcomes: context
                .create_storage_buffer("Rollout Outcomes", plan.outcomes_bytes()),
            root_stats: context.create_storage_buffer("Root Stats", plan.root_stats_bytes()),
            plan,
        }
    }

    /// Rewinds every tree to a fresh root holding the given position.
    ///
    /// Boards arrive as bytes and are widened to one i32 lane per cell, the
    /// layout the kernels operate on.
    pub fn reset_trees(&self, context: &GpuContext, board: &[i8], extra: &[i8], turn: i32) {
        let queue = context.queue();
        let plan = &self.plan;

        let root = GpuNode {
            parent: -1,
            depth: 0,
            turn,
            flags: 0,
            outcome: crate::games::OUTCOME_ONGOING,
            last_action: -1,
            n: 0,
            n_wins: 0,
        };
        let no_children = vec![-1i32; plan.max_actions];
        let mut board_lanes = vec![0i32; plan.board_cells];
        for (lane, &cell) in board_lanes.iter_mut().zip(board.iter()) {
            *lane = i32::from(cell);
        }
        let mut extra_lanes = vec![0i32; plan.extra_words];
        for (lane, &byte) in extra_lanes.iter_mut().zip(extra.iter()) {
            *lane = i32::from(byte);
        }
        let mut ctl = [0i32; CTL_STRIDE];
        ctl[CTL_SIZE] = 1;

        for tree in 0..plan.n_trees {
            let node_offset = (tree as u64 * u64::from(plan.max_tree_size))
                * std::mem::size_of::<GpuNode>() as u64;
            queue.write_buffer(&self.nodes, node_offset, bytemuck::bytes_of(&root));

            let children_offset =
                (tree as u64 * u64::from(plan.max_tree_size)) * (plan.max_actions * 4) as u64;
            queue.write_buffer(
                &self.children,
                children_offset,
                bytemuck::cast_slice(&no_children),
            );

            let board_offset =
                (tree as u64 * u64::from(plan.max_tree_size)) * (plan.board_cells * 4) as u64;
            queue.write_buffer(&self.boards, board_offset, bytemuck::cast_slice(&board_lanes));

            let extra_offset =
                (tree as u64 * u64::from(plan.max_tree_size)) * (plan.extra_words * 4) as u64;
            queue.write_buffer(&self.extras, extra_offset, bytemuck::cast_slice(&extra_lanes));

            let ctl_offset = (tree * CTL_STRIDE * 4) as u64;
            queue.write_buffer(&self.tree_ctl, ctl_offset, bytemuck::cast_slice(&ctl));
        }

        let zero_stats = vec![0i32; plan.root_stats_words()];
        queue.write_buffer(&self.root_stats, 0, bytemuck::cast_slice(&zero_stats));
    }

    /// Uploads the per-step uniform parameters
    pub fn write_params(&self, context: &GpuContext, params: &GpuParams) {
        context
            .queue()
            .write_buffer(&self.params, 0, bytemuck::bytes_of(params));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MctsConfig, Variant};

    fn config(n_trees: usize, n_playouts: usize, variant: Variant) -> MctsConfig {
        MctsConfig {
            n_trees,
            n_playouts,
            variant,
            ..MctsConfig::default()
        }
    }

    #[test]
    fn plan_fits_budget() {
        let mut cfg = config(4, 128, Variant::OcpProdigal);
        cfg.device_memory = 64 * 1024 * 1024;
        let plan = ArenaPlan::derive(&cfg, (6, 7), 7, 7, 128 << 20).unwrap();
        assert!(plan.max_tree_size > 1000);
        let total = plan.nodes_bytes()
            + plan.children_bytes()
            + plan.boards_bytes()
            + plan.extras_bytes()
            + plan.ctl_bytes()
            + plan.outcomes_bytes()
            + plan.root_stats_bytes();
        assert!(total <= cfg.device_memory);
        // one i32 lane per board cell plus one per extra byte
        assert_eq!(plan.per_state_memory, (42 + 7) * 4);
    }

    #[test]
    fn acp_plans_one_slot_per_action() {
        let cfg = config(2, 64, Variant::AcpThrifty);
        let plan = ArenaPlan::derive(&cfg, (6, 7), 7, 7, 128 << 20).unwrap();
        assert_eq!(plan.playout_slots, 7);
        let ocp = ArenaPlan::derive(&config(2, 64, Variant::OcpThrifty), (6, 7), 7, 7, 128 << 20)
            .unwrap();
        assert_eq!(ocp.playout_slots, 1);
    }

    #[test]
    fn tiny_budget_is_rejected() {
        let mut cfg = config(8, 128, Variant::AcpProdigal);
        cfg.device_memory = 1024;
        assert!(matches!(
            ArenaPlan::derive(&cfg, (6, 7), 7, 7, 128 << 20),
            Err(EngineError::ResourceExhaustion(_))
        ));
    }

    #[test]
    fn binding_limit_caps_tree_size() {
        let mut cfg = config(1, 32, Variant::OcpThrifty);
        cfg.device_memory = 8 * 1024 * 1024 * 1024;
        let plan = ArenaPlan::derive(&cfg, (32, 32), 0, 512, 1 << 20).unwrap();
        // the board buffer is the widest per-node cost: 1024 cells * 4 B
        assert!(plan.boards_bytes() <= 1 << 20);
    }

    #[test]
    fn zero_extra_info_still_gets_a_lane() {
        let cfg = config(2, 64, Variant::OcpThrifty);
        let plan = ArenaPlan::derive(&cfg, (15, 15), 0, 225, 128 << 20).unwrap();
        assert_eq!(plan.extra_words, 1);
        assert!(plan.extras_bytes() > 0);
    }
}
