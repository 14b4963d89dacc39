//! GPU Search Engine
//!
//! The host-resident orchestrator around the stage kernels. Each decision
//! step launches Selection, Expansion, Playout and Backup as four separate
//! command submissions, in that order, for all tree replicas at once;
//! submission boundaries are the only synchronization points, and the host
//! polls the wall clock and step counter strictly between steps. After the
//! loop a statistics pass and the cross-tree reduction run once, and the
//! only data that ever crosses back to the host is the small root-statistics
//! block and the per-tree control words.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngCore;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, BufferBindingType, CommandEncoderDescriptor,
    ComputePipeline, ComputePipelineDescriptor, PipelineLayoutDescriptor, ShaderModuleDescriptor,
    ShaderStages,
};

use crate::config::MctsConfig;
use crate::diagnostics::{
    duration_ms, ActionInfo, PerformanceInfo, SearchReport, TimesInfo, TreesInfo,
};
use crate::error::{EngineError, Result};
use crate::games::GameState;
use crate::gpu::arena::{
    ArenaPlan, DeviceArena, GpuParams, CTL_DEPTH_MAX, CTL_DEPTH_SUM, CTL_ERROR, CTL_FROZEN,
    CTL_SIZE, CTL_STRIDE,
};
use crate::gpu::context::GpuContext;
use crate::gpu::shaders::{build_shader_source, KernelSpec};

/// Rollout-loop safety cap tripped; reported as a mechanics violation
const ERROR_PLY_CAP: i32 = 2;

/// GPU-resident multi-tree MCTS engine for one game type.
///
/// Construction compiles the game-specialized kernels and allocates the
/// whole arena; `run` reuses both for every subsequent decision.
pub struct GpuMcts<G: GameState> {
    context: Arc<GpuContext>,
    config: MctsConfig,
    arena: DeviceArena,
    bind_group: BindGroup,
    select_pipeline: ComputePipeline,
    expand_pipeline: ComputePipeline,
    playout_pipeline: ComputePipeline,
    backup_pipeline: ComputePipeline,
    stats_pipeline: ComputePipeline,
    reduce_pipeline: ComputePipeline,
    playout_chunks: u32,
    seed32: u32,
    _game: PhantomData<G>,
}

impl<G: GameState> GpuMcts<G> {
    /// Builds an engine instance: validates the configuration, derives the
    /// arena geometry, compiles the specialized shader module and allocates
    /// every device buffer. Fails fast before any allocation on invalid
    /// parameters.
    pub fn new(context: Arc<GpuContext>, config: MctsConfig) -> Result<Self> {
        config.validate()?;
        config.validate_game(G::board_shape(), G::extra_info_size(), G::max_actions())?;

        let plan = ArenaPlan::derive(
            &config,
            G::board_shape(),
            G::extra_info_size(),
            G::max_actions(),
            context.max_storage_binding(),
        )?;

        let (playout_wg, playout_chunks) =
            KernelSpec::playout_geometry(config.n_playouts as u32, config.variant.is_prodigal());
        let spec = KernelSpec {
            n_trees: config.n_trees as u32,
            max_tree_size: plan.max_tree_size,
            max_actions: plan.max_actions as u32,
            n_playouts: config.n_playouts as u32,
            board_m: G::board_shape().0 as u32,
            board_n: G::board_shape().1 as u32,
            extra_words: plan.extra_words as u32,
            playout_wg,
            playout_chunks,
        };
        let source = build_shader_source(&spec, G::device_mechanics_wgsl());

        let device = context.device();
        let shader_module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Search Kernels"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = Self::create_bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Search Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |entry: &str, label: &str| -> ComputePipeline {
            device.create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader_module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let select_pipeline = make_pipeline("select_leaf", "Select Pipeline");
        let expand_pipeline = make_pipeline("expand_leaf", "Expand Pipeline");
        let (playout_entry, backup_entry) = if config.variant.is_acp() {
            ("playout_acp", "backup_acp")
        } else {
            ("playout_ocp", "backup_ocp")
        };
        let playout_pipeline = make_pipeline(playout_entry, "Playout Pipeline");
        let backup_pipeline = make_pipeline(backup_entry, "Backup Pipeline");
        let stats_pipeline = make_pipeline("tree_stats", "Tree Stats Pipeline");
        let reduce_pipeline = make_pipeline("reduce_over_trees", "Reduce Pipeline");

        let arena = DeviceArena::new(&context, plan);
        let bind_group = Self::create_bind_group(device, &bind_group_layout, &arena);

        let seed32 = Xoshiro256StarStar::seed_from_u64(config.seed).next_u32();

        Ok(Self {
            context,
            config,
            arena,
            bind_group,
            select_pipeline,
            expand_pipeline,
            playout_pipeline,
            backup_pipeline,
            stats_pipeline,
            reduce_pipeline,
            playout_chunks,
            seed32,
            _game: PhantomData,
        })
    }

    /// Bytes one state occupies on the device
    pub fn per_state_memory(&self) -> u64 {
        self.arena.plan.per_state_memory
    }

    /// Nodes each tree replica may ever hold
    pub fn max_tree_size(&self) -> u32 {
        self.arena.plan.max_tree_size
    }

    /// The engine configuration
    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    fn create_bind_group_layout(device: &wgpu::Device) -> BindGroupLayout {
        let storage_entry = |binding: u32| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Arena Layout"),
            entries: &[
                // params (uniform)
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1), // nodes
                storage_entry(2), // children
                storage_entry(3), // boards
                storage_entry(4), // extras
                storage_entry(5), // tree_ctl
                storage_entry(6), // rollout_outcomes
                storage_entry(7), // root_stats
            ],
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &BindGroupLayout,
        arena: &DeviceArena,
    ) -> BindGroup {
        device.create_bind_group(&BindGroupDescriptor {
            label: Some("Arena Bind Group"),
            layout,
            entries: &[
                BindGroupEntry { binding: 0, resource: arena.params.as_entire_binding() },
                BindGroupEntry { binding: 1, resource: arena.nodes.as_entire_binding() },
                BindGroupEntry { binding: 2, resource: arena.children.as_entire_binding() },
                BindGroupEntry { binding: 3, resource: arena.boards.as_entire_binding() },
                BindGroupEntry { binding: 4, resource: arena.extras.as_entire_binding() },
                BindGroupEntry { binding: 5, resource: arena.tree_ctl.as_entire_binding() },
                BindGroupEntry {
                    binding: 6,
                    resource: arena.rollout_outcomes.as_entire_binding(),
                },
                BindGroupEntry { binding: 7, resource: arena.root_stats.as_entire_binding() },
            ],
        })
    }

    /// Launches one stage for all trees and waits for it to finish
    fn run_stage(
        &self,
        pipeline: &ComputePipeline,
        label: &str,
        workgroups: (u32, u32, u32),
    ) -> Duration {
        let started = Instant::now();
        let mut encoder = self
            .context
            .device()
            .create_command_encoder(&CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        self.context.submit_and_wait(encoder.finish());
        started.elapsed()
    }

    fn playout_workgroups(&self) -> (u32, u32, u32) {
        let trees = self.config.n_trees as u32;
        if self.config.variant.is_acp() {
            (trees, self.playout_chunks, self.arena.plan.max_actions as u32)
        } else {
            (trees, self.playout_chunks, 1)
        }
    }

    /// Runs a full search from the given position and returns the best
    /// action index with the diagnostic record.
    pub fn run(&self, state: &G) -> Result<(usize, SearchReport)> {
        self.run_with(state, None)
    }

    /// Like [`run`](Self::run), with an optional forced step budget that
    /// overrides both configured limits (used when reproducing recorded
    /// games).
    pub fn run_with(
        &self,
        state: &G,
        forced_steps_limit: Option<u64>,
    ) -> Result<(usize, SearchReport)> {
        if state.outcome().is_some() {
            return Err(EngineError::Configuration(
                "cannot search from a terminal position".to_string(),
            ));
        }
        let started = Instant::now();
        let plan = self.arena.plan;
        let trees = self.config.n_trees as u32;

        let mut board = vec![0i8; plan.board_cells];
        let mut extra = vec![0i8; G::extra_info_size()];
        state.encode_board(&mut board);
        state.encode_extra_info(&mut extra);
        let root_turn = state.turn();
        self.arena.reset_trees(&self.context, &board, &extra, root_turn);

        let mut time_select = Duration::ZERO;
        let mut time_expand = Duration::ZERO;
        let mut time_playout = Duration::ZERO;
        let mut time_backup = Duration::ZERO;
        let mut steps: u64 = 0;

        let loop_started = Instant::now();
        loop {
            // budget polling happens only between steps; an in-flight step is
            // never interrupted
            if let Some(forced) = forced_steps_limit {
                if steps >= forced {
                    break;
                }
            } else {
                if let Some(limit) = self.config.search_steps_limit {
                    if steps >= limit {
                        break;
                    }
                }
                if let Some(limit) = self.config.search_time_limit {
                    if loop_started.elapsed() >= limit {
                        break;
                    }
                }
            }

            self.arena.write_params(
                &self.context,
                &GpuParams {
                    seed: self.seed32,
                    step: steps as u32,
                    root_turn,
                    ucb_c: self.config.ucb_c as f32,
                },
            );

            time_select += self.run_stage(&self.select_pipeline, "Select Pass", (trees, 1, 1));
            time_expand += self.run_stage(&self.expand_pipeline, "Expand Pass", (trees, 1, 1));
            time_playout +=
                self.run_stage(&self.playout_pipeline, "Playout Pass", self.playout_workgroups());
            time_backup += self.run_stage(&self.backup_pipeline, "Backup Pass", (trees, 1, 1));
            steps += 1;
        }
        let time_loop = loop_started.elapsed();

        let reduce_started = Instant::now();
        self.run_stage(&self.stats_pipeline, "Tree Stats Pass", (trees, 1, 1));
        let reduce_groups = (plan.max_actions as u32).div_ceil(256).max(1);
        self.run_stage(&self.reduce_pipeline, "Reduce Pass", (reduce_groups, 1, 1));
        let time_reduce = reduce_started.elapsed();

        let ctl_bytes = self
            .context
            .read_buffer(&self.arena.tree_ctl, plan.ctl_bytes());
        let ctl: Vec<i32> = bytemuck::pod_collect_to_vec(&ctl_bytes);
        let stats_bytes = self
            .context
            .read_buffer(&self.arena.root_stats, plan.root_stats_bytes());
        let stats: Vec<i32> = bytemuck::pod_collect_to_vec(&stats_bytes);

        for tree in 0..plan.n_trees {
            let code = ctl[tree * CTL_STRIDE + CTL_ERROR];
            if code != 0 {
                let detail = if code == ERROR_PLY_CAP {
                    "a rollout failed to reach a terminal state"
                } else {
                    "an ongoing state reported no legal action"
                };
                return Err(EngineError::MechanicsContractViolation(format!(
                    "tree {}: {}",
                    tree, detail
                )));
            }
        }

        let report = self.build_report(
            &stats,
            &ctl,
            &state.legal_actions(),
            steps,
            started.elapsed(),
            time_loop,
            time_reduce,
            time_select,
            time_expand,
            time_playout,
            time_backup,
        );
        if report.actions.is_empty() {
            return Err(EngineError::MechanicsContractViolation(
                "no legal root action reported".to_string(),
            ));
        }
        Ok((report.best_action().index, report))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_report(
        &self,
        stats: &[i32],
        ctl: &[i32],
        legal_root_actions: &[usize],
        steps: u64,
        time_total: Duration,
        time_loop: Duration,
        time_reduce: Duration,
        time_select: Duration,
        time_expand: Duration,
        time_playout: Duration,
        time_backup: Duration,
    ) -> SearchReport {
        let plan = &self.arena.plan;
        let reduced_base = plan.reduced_base();
        let n_root = stats[reduced_base + plan.max_actions * 4] as u64;

        let mut actions = Vec::new();
        for a in 0..plan.max_actions {
            let base = reduced_base + a * 4;
            if stats[base + 3] == 0 {
                continue;
            }
            let n = stats[base] as u64;
            let n_wins = stats[base + 1] as u64;
            let win_flag = stats[base + 2] != 0;
            let q = if n > 0 { n_wins as f64 / n as f64 } else { f64::NAN };
            let ucb = if n > 0 {
                n_wins as f64 / n as f64
                    + self.config.ucb_c * ((n_root.max(1) as f64).ln() / n as f64).sqrt()
            } else {
                f64::INFINITY
            };
            actions.push(ActionInfo {
                index: a,
                name: G::action_name(a),
                n_root,
                win_flag,
                n,
                n_wins,
                q,
                ucb,
            });
        }

        if actions.is_empty() {
            // budget expired before the first expansion; report the host's
            // view of the legal actions with empty statistics
            for &a in legal_root_actions {
                actions.push(ActionInfo {
                    index: a,
                    name: G::action_name(a),
                    n_root,
                    win_flag: false,
                    n: 0,
                    n_wins: 0,
                    q: f64::NAN,
                    ucb: f64::INFINITY,
                });
            }
        }

        // decision priority: a proven win, else the most visited action,
        // ties broken by the higher empirical value
        let finite_q = |q: f64| if q.is_nan() { 0.0 } else { q };
        let mut best = 0;
        for i in 1..actions.len() {
            let (cand, cur) = (&actions[i], &actions[best]);
            let better = (cand.win_flag && !cur.win_flag)
                || (cand.win_flag == cur.win_flag && cand.n > cur.n)
                || (cand.win_flag == cur.win_flag
                    && cand.n == cur.n
                    && finite_q(cand.q) > finite_q(cur.q));
            if better {
                best = i;
            }
        }

        let mut trees_info = TreesInfo::default();
        for tree in 0..plan.n_trees {
            let size = ctl[tree * CTL_STRIDE + CTL_SIZE].max(1);
            let depth_sum = ctl[tree * CTL_STRIDE + CTL_DEPTH_SUM];
            trees_info.sizes.push(size as u32);
            trees_info
                .mean_depths
                .push(f64::from(depth_sum) / f64::from(size));
            trees_info
                .max_depths
                .push(ctl[tree * CTL_STRIDE + CTL_DEPTH_MAX] as u32);
            if ctl[tree * CTL_STRIDE + CTL_FROZEN] != 0 {
                trees_info.frozen_trees += 1;
            }
        }

        let total_secs = time_total.as_secs_f64().max(f64::EPSILON);
        let divisor = steps.max(1) as f64;
        let times = TimesInfo {
            total_ms: duration_ms(time_total),
            loop_ms: duration_ms(time_loop),
            reduce_over_trees_ms: duration_ms(time_reduce),
            mean_loop_ms: duration_ms(time_loop) / divisor,
            mean_select_ms: duration_ms(time_select) / divisor,
            mean_expand_ms: duration_ms(time_expand) / divisor,
            mean_playout_ms: duration_ms(time_playout) / divisor,
            mean_backup_ms: duration_ms(time_backup) / divisor,
        };
        let performance = PerformanceInfo {
            steps,
            steps_per_second: steps as f64 / total_secs,
            playouts: n_root,
            playouts_per_second: n_root as f64 / total_secs,
            times,
            trees: trees_info,
        };

        SearchReport {
            actions,
            best,
            performance,
        }
    }
}
