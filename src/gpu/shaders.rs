//! WGSL Compute Shaders for the Search Pipeline
//!
//! One shader module holds every stage kernel: cooperative UCB descent,
//! allocator-free expansion, massively parallel playouts (one-child and
//! all-children flavors), cooperative backup, tree-shape statistics and the
//! final cross-tree reduction. The module source is assembled per engine
//! instance: a generated constant header (tree geometry, playout geometry,
//! board shape) is followed by the game's mechanics fragment and the common
//! kernel template below.
//!
//! Concurrency model: there are no atomics anywhere. Stages are separate
//! dispatches, so cross-stage ordering comes from submission order; inside a
//! stage each tree (or playout target) is owned by one workgroup, and every
//! shared decision is made by one designated thread and broadcast through
//! workgroup memory. `workgroupUniformLoad` gates all barrier-crossing
//! control flow so the broadcast values are uniform by construction.

/// Compile-time geometry of a specialized shader module
#[derive(Debug, Clone, Copy)]
pub struct KernelSpec {
    pub n_trees: u32,
    pub max_tree_size: u32,
    pub max_actions: u32,
    pub n_playouts: u32,
    pub board_m: u32,
    pub board_n: u32,
    /// Extra-info lanes per state (each lane carries one byte, at least 1)
    pub extra_words: u32,
    /// Threads per playout workgroup
    pub playout_wg: u32,
    /// Playout workgroups per target along the second dispatch dimension
    pub playout_chunks: u32,
}

impl KernelSpec {
    /// Playout dispatch geometry for the configured profile: prodigal
    /// schedules one thread per rollout up front, thrifty keeps one small
    /// workgroup per target and loops each thread over its rollout share.
    pub fn playout_geometry(n_playouts: u32, prodigal: bool) -> (u32, u32) {
        if prodigal {
            let wg = n_playouts.min(256);
            (wg, n_playouts / wg)
        } else {
            (n_playouts.min(64), 1)
        }
    }
}

/// Assembles the full WGSL source for one engine instance
pub fn build_shader_source(spec: &KernelSpec, mechanics_wgsl: &str) -> String {
    let header = format!(
        r#"// generated constants
const N_TREES: u32 = {n_trees}u;
const MAX_TREE_SIZE: u32 = {max_tree_size}u;
const MAX_ACTIONS: u32 = {max_actions}u;
const N_PLAYOUTS: u32 = {n_playouts}u;
const BOARD_M: i32 = {board_m};
const BOARD_N: i32 = {board_n};
const BOARD_CELLS: u32 = {board_cells}u;
const EXTRA_WORDS: u32 = {extra_words}u;
const PLAYOUT_WG: u32 = {playout_wg}u;
const PLAYOUT_CHUNKS: u32 = {playout_chunks}u;

alias Board = array<i32, BOARD_CELLS>;
alias Extra = array<i32, EXTRA_WORDS>;

const OUTCOME_ONGOING: i32 = 2;
"#,
        n_trees = spec.n_trees,
        max_tree_size = spec.max_tree_size,
        max_actions = spec.max_actions,
        n_playouts = spec.n_playouts,
        board_m = spec.board_m,
        board_n = spec.board_n,
        board_cells = spec.board_m * spec.board_n,
        extra_words = spec.extra_words,
        playout_wg = spec.playout_wg,
        playout_chunks = spec.playout_chunks,
    );
    let mut source = String::with_capacity(header.len() + mechanics_wgsl.len() + TREE_KERNELS.len());
    source.push_str(&header);
    source.push_str(mechanics_wgsl);
    source.push_str(TREE_KERNELS);
    source
}

/// Stage kernels shared by every game and variant
const TREE_KERNELS: &str = r#"
// ---------------------------------------------------------------------------
// Data layout
// ---------------------------------------------------------------------------

struct Params {
    seed: u32,
    step: u32,
    root_turn: i32,
    ucb_c: f32,
}

struct Node {
    parent: i32,
    depth: i32,
    turn: i32,
    flags: u32,
    outcome: i32,
    last_action: i32,
    n: i32,
    n_wins: i32,
}

const FLAG_EXPANDED: u32 = 1u;
const FLAG_TERMINAL: u32 = 2u;

// per-tree control words
const CTL_STRIDE: u32 = 8u;
const CTL_SIZE: u32 = 0u;
const CTL_FROZEN: u32 = 1u;
const CTL_LEAF: u32 = 2u;
const CTL_LEAF_TERMINAL: u32 = 3u;
const CTL_PLAYOUT_ACTION: u32 = 4u;
const CTL_DEPTH_SUM: u32 = 5u;
const CTL_DEPTH_MAX: u32 = 6u;
const CTL_ERROR: u32 = 7u;

// root_stats layout: sticky proven-win flags per (tree, action), then the
// reduced per-action block (n, n_wins, win_flag, present), then the summary
const REDUCED_BASE: u32 = N_TREES * MAX_ACTIONS;
const REDUCED_STRIDE: u32 = 4u;
const SUMMARY_BASE: u32 = REDUCED_BASE + MAX_ACTIONS * REDUCED_STRIDE;

const UCB_UNVISITED: f32 = 1.0e30;
const PROVEN_WIN_MIN_SAMPLE: i32 = 32;
const MAX_PLAYOUT_PLIES: u32 = 4096u;

const SELECT_WG: u32 = 256u;
const EXPAND_WG: u32 = 256u;
const BACKUP_WG: u32 = 256u;
const STATS_WG: u32 = 256u;
const REDUCE_WG: u32 = 256u;

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read_write> nodes: array<Node>;
@group(0) @binding(2) var<storage, read_write> children: array<i32>;
@group(0) @binding(3) var<storage, read_write> boards: array<i32>;
@group(0) @binding(4) var<storage, read_write> extras: array<i32>;
@group(0) @binding(5) var<storage, read_write> tree_ctl: array<i32>;
@group(0) @binding(6) var<storage, read_write> rollout_outcomes: array<i32>;
@group(0) @binding(7) var<storage, read_write> root_stats: array<i32>;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn node_at(tree: u32, local: u32) -> u32 {
    return tree * MAX_TREE_SIZE + local;
}

// SplitMix-style stream initialization keyed by (seed, step, tree, slot,
// rollout); the same key always yields the same stream, which makes the
// thrifty and prodigal profiles statistically identical and whole runs
// reproducible under a fixed seed and step count.
fn rng_init(tree: u32, slot: u32, rollout: u32) -> u32 {
    var x = params.seed ^ (params.step * 0x9e3779b9u) ^ (tree * 0x85ebca6bu)
        ^ (slot * 0xc2b2ae35u) ^ (rollout * 0x27d4eb2fu);
    x = x ^ (x >> 16u);
    x = x * 0x7feb352du;
    x = x ^ (x >> 15u);
    x = x * 0x846ca68bu;
    x = x ^ (x >> 16u);
    if (x == 0u) {
        x = 0x6d2b79f5u;
    }
    return x;
}

fn rng_next(state: ptr<function, u32>) -> u32 {
    var x = *state;
    x = x ^ (x << 13u);
    x = x ^ (x >> 17u);
    x = x ^ (x << 5u);
    *state = x;
    return x;
}

fn rng_below(state: ptr<function, u32>, bound: u32) -> u32 {
    return rng_next(state) % bound;
}

fn load_state(g: u32, board: ptr<function, Board>, extra: ptr<function, Extra>) {
    for (var c = 0u; c < BOARD_CELLS; c++) {
        (*board)[c] = boards[g * BOARD_CELLS + c];
    }
    for (var e = 0u; e < EXTRA_WORDS; e++) {
        (*extra)[e] = extras[g * EXTRA_WORDS + e];
    }
}

fn store_state(g: u32, board: ptr<function, Board>, extra: ptr<function, Extra>) {
    for (var c = 0u; c < BOARD_CELLS; c++) {
        boards[g * BOARD_CELLS + c] = (*board)[c];
    }
    for (var e = 0u; e < EXTRA_WORDS; e++) {
        extras[g * EXTRA_WORDS + e] = (*extra)[e];
    }
}

fn is_terminal_outcome(outcome: i32) -> bool {
    return outcome >= -1 && outcome <= 1;
}

// ---------------------------------------------------------------------------
// Selection: cooperative UCB descent, one workgroup per tree
// ---------------------------------------------------------------------------

var<workgroup> sel_val: array<f32, SELECT_WG>;
var<workgroup> sel_arg: array<u32, SELECT_WG>;
var<workgroup> sel_cur: u32;
var<workgroup> sel_halt: u32;

@compute @workgroup_size(SELECT_WG)
fn select_leaf(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_id) lid3: vec3<u32>,
) {
    let tree = wg.x;
    let lid = lid3.x;
    if (lid == 0u) {
        sel_cur = 0u;
        sel_halt = 0u;
    }
    loop {
        // the designated thread inspects the current node and broadcasts
        if (lid == 0u) {
            let g = node_at(tree, sel_cur);
            let flags = nodes[g].flags;
            if ((flags & FLAG_EXPANDED) == 0u || (flags & FLAG_TERMINAL) != 0u) {
                sel_halt = 1u;
            } else {
                sel_halt = 0u;
            }
        }
        if (workgroupUniformLoad(&sel_halt) != 0u) {
            break;
        }
        let cur = workgroupUniformLoad(&sel_cur);
        let g = node_at(tree, cur);
        let log_parent = log(f32(max(nodes[g].n, 1)));

        // each thread pre-reduces its strided share of the actions
        var best_val = -1.0e38;
        var best_arg = MAX_ACTIONS;
        for (var a = lid; a < MAX_ACTIONS; a += SELECT_WG) {
            let child = children[g * MAX_ACTIONS + a];
            if (child < 0) {
                continue;
            }
            let cg = node_at(tree, u32(child));
            let cn = nodes[cg].n;
            var val = UCB_UNVISITED;
            if (cn > 0) {
                let q = f32(nodes[cg].n_wins) / f32(cn);
                val = q + params.ucb_c * sqrt(log_parent / f32(cn));
            }
            if (val > best_val) {
                best_val = val;
                best_arg = a;
            }
        }
        sel_val[lid] = best_val;
        sel_arg[lid] = best_arg;
        workgroupBarrier();

        // pairwise argmax; ties resolve toward the lowest action index
        var stride = SELECT_WG / 2u;
        while (stride > 0u) {
            if (lid < stride) {
                let other_val = sel_val[lid + stride];
                let other_arg = sel_arg[lid + stride];
                if (other_val > sel_val[lid]
                    || (other_val == sel_val[lid] && other_arg < sel_arg[lid])) {
                    sel_val[lid] = other_val;
                    sel_arg[lid] = other_arg;
                }
            }
            workgroupBarrier();
            stride = stride / 2u;
        }

        if (lid == 0u) {
            let best = sel_arg[0];
            if (best >= MAX_ACTIONS) {
                sel_halt = 1u;
            } else {
                sel_cur = u32(children[g * MAX_ACTIONS + best]);
            }
        }
        if (workgroupUniformLoad(&sel_halt) != 0u) {
            break;
        }
    }
    if (lid == 0u) {
        let leaf = sel_cur;
        let ctl = tree * CTL_STRIDE;
        let g = node_at(tree, leaf);
        tree_ctl[ctl + CTL_LEAF] = i32(leaf);
        if ((nodes[g].flags & FLAG_TERMINAL) != 0u) {
            tree_ctl[ctl + CTL_LEAF_TERMINAL] = 1;
        } else {
            tree_ctl[ctl + CTL_LEAF_TERMINAL] = 0;
        }
        tree_ctl[ctl + CTL_PLAYOUT_ACTION] = -1;
    }
}

// ---------------------------------------------------------------------------
// Expansion: allocator-free child creation, one workgroup per tree
// ---------------------------------------------------------------------------

var<workgroup> exp_legal: array<u32, MAX_ACTIONS>;
var<workgroup> exp_offset: array<i32, MAX_ACTIONS>;
var<workgroup> exp_base: i32;
var<workgroup> exp_skip: u32;

@compute @workgroup_size(EXPAND_WG)
fn expand_leaf(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_id) lid3: vec3<u32>,
) {
    let tree = wg.x;
    let lid = lid3.x;
    let ctl = tree * CTL_STRIDE;
    if (lid == 0u) {
        let leaf = u32(tree_ctl[ctl + CTL_LEAF]);
        let g = node_at(tree, leaf);
        var skip = 0u;
        if (tree_ctl[ctl + CTL_LEAF_TERMINAL] != 0) {
            skip = 1u;
        } else if (tree_ctl[ctl + CTL_FROZEN] != 0) {
            skip = 1u;
        } else if ((nodes[g].flags & FLAG_EXPANDED) != 0u) {
            skip = 1u;
        }
        exp_skip = skip;
    }
    if (workgroupUniformLoad(&exp_skip) != 0u) {
        return;
    }

    let leaf = u32(tree_ctl[ctl + CTL_LEAF]);
    let g = node_at(tree, leaf);
    var board: Board;
    var extra: Extra;
    load_state(g, &board, &extra);
    let turn = nodes[g].turn;

    for (var a = lid; a < MAX_ACTIONS; a += EXPAND_WG) {
        if (ms_is_action_legal(&board, &extra, turn, a)) {
            exp_legal[a] = 1u;
        } else {
            exp_legal[a] = 0u;
        }
    }
    workgroupBarrier();

    // single cooperative cursor advance: the designated thread reserves one
    // contiguous block of child slots and broadcasts the base offset
    if (lid == 0u) {
        var count = 0;
        for (var a = 0u; a < MAX_ACTIONS; a++) {
            exp_offset[a] = count;
            if (exp_legal[a] != 0u) {
                count = count + 1;
            }
        }
        let size = tree_ctl[ctl + CTL_SIZE];
        if (count == 0) {
            // mechanics reported an ongoing state with no legal action
            tree_ctl[ctl + CTL_ERROR] = 1;
            exp_base = -1;
        } else if (size + count > i32(MAX_TREE_SIZE)) {
            // arena full: freeze this tree's growth, keep searching its nodes
            tree_ctl[ctl + CTL_FROZEN] = 1;
            exp_base = -1;
        } else {
            exp_base = size;
            tree_ctl[ctl + CTL_SIZE] = size + count;
            nodes[g].flags = nodes[g].flags | FLAG_EXPANDED;
        }
    }
    let base = workgroupUniformLoad(&exp_base);
    if (base < 0) {
        return;
    }

    for (var a = lid; a < MAX_ACTIONS; a += EXPAND_WG) {
        if (exp_legal[a] == 0u) {
            continue;
        }
        let ci = u32(base + exp_offset[a]);
        let cg = node_at(tree, ci);
        var child_board = board;
        var child_extra = extra;
        ms_take_action(&child_board, &child_extra, turn, a);
        let child_turn = -turn;
        let outcome = ms_compute_outcome(&child_board, &child_extra, child_turn, i32(a));
        var flags = 0u;
        if (is_terminal_outcome(outcome)) {
            flags = FLAG_TERMINAL;
        }
        nodes[cg] = Node(i32(leaf), nodes[g].depth + 1, child_turn, flags, outcome, i32(a), 0, 0);
        store_state(cg, &child_board, &child_extra);
        for (var slot = 0u; slot < MAX_ACTIONS; slot++) {
            children[cg * MAX_ACTIONS + slot] = -1;
        }
        children[g * MAX_ACTIONS + a] = i32(ci);
    }
}

// ---------------------------------------------------------------------------
// Playout: uniform-random rollouts to terminal states
// ---------------------------------------------------------------------------

fn run_rollout(g: u32, tree: u32, slot: u32, rollout: u32) -> i32 {
    var rng = rng_init(tree, slot, rollout);
    var board: Board;
    var extra: Extra;
    load_state(g, &board, &extra);
    var turn = nodes[g].turn;
    var last = nodes[g].last_action;
    for (var ply = 0u; ply < MAX_PLAYOUT_PLIES; ply++) {
        let outcome = ms_compute_outcome(&board, &extra, turn, last);
        if (is_terminal_outcome(outcome)) {
            return outcome;
        }
        var count = 0u;
        for (var a = 0u; a < MAX_ACTIONS; a++) {
            if (ms_is_action_legal(&board, &extra, turn, a)) {
                count = count + 1u;
            }
        }
        if (count == 0u) {
            tree_ctl[tree * CTL_STRIDE + CTL_ERROR] = 1;
            return 0;
        }
        var pick = rng_below(&rng, count);
        var action = 0u;
        for (var a = 0u; a < MAX_ACTIONS; a++) {
            if (ms_is_action_legal(&board, &extra, turn, a)) {
                if (pick == 0u) {
                    action = a;
                    break;
                }
                pick = pick - 1u;
            }
        }
        ms_take_action(&board, &extra, turn, action);
        last = i32(action);
        turn = -turn;
    }
    tree_ctl[tree * CTL_STRIDE + CTL_ERROR] = 2;
    return 0;
}

// One-child variant: the playout target is one uniformly random child of the
// expanded leaf. The choice is a pure function of (seed, step, tree), so
// every workgroup of the tree computes the same target without coordination.
fn ocp_target_action(tree: u32) -> i32 {
    let ctl = tree * CTL_STRIDE;
    let leaf = u32(tree_ctl[ctl + CTL_LEAF]);
    let g = node_at(tree, leaf);
    if ((nodes[g].flags & FLAG_EXPANDED) == 0u) {
        return -1;
    }
    var count = 0u;
    for (var a = 0u; a < MAX_ACTIONS; a++) {
        if (children[g * MAX_ACTIONS + a] >= 0) {
            count = count + 1u;
        }
    }
    if (count == 0u) {
        return -1;
    }
    var rng = rng_init(tree, 0xffffu, 0u);
    var pick = rng_below(&rng, count);
    for (var a = 0u; a < MAX_ACTIONS; a++) {
        if (children[g * MAX_ACTIONS + a] >= 0) {
            if (pick == 0u) {
                return i32(a);
            }
            pick = pick - 1u;
        }
    }
    return -1;
}

@compute @workgroup_size(PLAYOUT_WG)
fn playout_ocp(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_id) lid3: vec3<u32>,
) {
    let tree = wg.x;
    let chunk = wg.y;
    let lid = lid3.x;
    let ctl = tree * CTL_STRIDE;
    if (tree_ctl[ctl + CTL_LEAF_TERMINAL] != 0) {
        return;
    }
    let leaf = u32(tree_ctl[ctl + CTL_LEAF]);
    let action = ocp_target_action(tree);
    if (lid == 0u && chunk == 0u) {
        tree_ctl[ctl + CTL_PLAYOUT_ACTION] = action;
    }
    var g = node_at(tree, leaf);
    if (action >= 0) {
        g = node_at(tree, u32(children[node_at(tree, leaf) * MAX_ACTIONS + u32(action)]));
    }
    let terminal = (nodes[g].flags & FLAG_TERMINAL) != 0u;
    var r = chunk * PLAYOUT_WG + lid;
    let stride = PLAYOUT_WG * PLAYOUT_CHUNKS;
    while (r < N_PLAYOUTS) {
        var outcome: i32;
        if (terminal) {
            outcome = nodes[g].outcome;
        } else {
            outcome = run_rollout(g, tree, 0u, r);
        }
        rollout_outcomes[tree * N_PLAYOUTS + r] = outcome;
        r = r + stride;
    }
}

@compute @workgroup_size(PLAYOUT_WG)
fn playout_acp(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_id) lid3: vec3<u32>,
) {
    let tree = wg.x;
    let chunk = wg.y;
    let slot = wg.z;
    let lid = lid3.x;
    let ctl = tree * CTL_STRIDE;
    if (tree_ctl[ctl + CTL_LEAF_TERMINAL] != 0) {
        return;
    }
    let leaf = u32(tree_ctl[ctl + CTL_LEAF]);
    let lg = node_at(tree, leaf);
    var g: u32;
    if ((nodes[lg].flags & FLAG_EXPANDED) == 0u) {
        // frozen tree with an unexpanded leaf: rollouts run from the leaf
        if (slot != 0u) {
            return;
        }
        g = lg;
    } else {
        let child = children[lg * MAX_ACTIONS + slot];
        if (child < 0) {
            return;
        }
        g = node_at(tree, u32(child));
    }
    let terminal = (nodes[g].flags & FLAG_TERMINAL) != 0u;
    var r = chunk * PLAYOUT_WG + lid;
    let stride = PLAYOUT_WG * PLAYOUT_CHUNKS;
    while (r < N_PLAYOUTS) {
        var outcome: i32;
        if (terminal) {
            outcome = nodes[g].outcome;
        } else {
            outcome = run_rollout(g, tree, slot, r);
        }
        rollout_outcomes[(tree * MAX_ACTIONS + slot) * N_PLAYOUTS + r] = outcome;
        r = r + stride;
    }
}

// ---------------------------------------------------------------------------
// Backup: cooperative outcome reduction, then one ascent to the root
// ---------------------------------------------------------------------------

var<workgroup> bk_plus: array<i32, BACKUP_WG>;
var<workgroup> bk_minus: array<i32, BACKUP_WG>;
var<workgroup> bk_term: u32;
var<workgroup> bk_expanded: u32;
var<workgroup> bk_target: i32;

// Updates the sticky proven-win flag of one root action: a terminal child
// winning for the root mover, or a sufficiently sampled 100% win rate.
fn update_root_flag(tree: u32, action: i32) {
    if (action < 0) {
        return;
    }
    let child = children[node_at(tree, 0u) * MAX_ACTIONS + u32(action)];
    if (child < 0) {
        return;
    }
    let cg = node_at(tree, u32(child));
    let terminal_win = ((nodes[cg].flags & FLAG_TERMINAL) != 0u)
        && (nodes[cg].outcome == params.root_turn);
    let sampled_win = nodes[cg].n >= PROVEN_WIN_MIN_SAMPLE
        && nodes[cg].n_wins == nodes[cg].n;
    if (terminal_win || sampled_win) {
        root_stats[tree * MAX_ACTIONS + u32(action)] = 1;
    }
}

// Walks from `start` up to the root adding the reduced counts at each level;
// returns the root action along the path (or -1 when starting at the root).
fn ascend(tree: u32, start: i32, total: i32, plus: i32, minus: i32) -> i32 {
    var cur = start;
    var root_action = -1;
    while (cur >= 0) {
        let g = node_at(tree, u32(cur));
        nodes[g].n = nodes[g].n + total;
        if (nodes[g].turn == -1) {
            nodes[g].n_wins = nodes[g].n_wins + plus;
        } else {
            nodes[g].n_wins = nodes[g].n_wins + minus;
        }
        if (nodes[g].parent == 0) {
            root_action = nodes[g].last_action;
        }
        cur = nodes[g].parent;
    }
    return root_action;
}

@compute @workgroup_size(BACKUP_WG)
fn backup_ocp(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_id) lid3: vec3<u32>,
) {
    let tree = wg.x;
    let lid = lid3.x;
    let ctl = tree * CTL_STRIDE;
    if (lid == 0u) {
        bk_term = u32(tree_ctl[ctl + CTL_LEAF_TERMINAL]);
    }
    let term = workgroupUniformLoad(&bk_term);
    var plus = 0;
    var minus = 0;
    if (term == 0u) {
        var p = 0;
        var m = 0;
        for (var r = lid; r < N_PLAYOUTS; r += BACKUP_WG) {
            let o = rollout_outcomes[tree * N_PLAYOUTS + r];
            if (o == 1) {
                p = p + 1;
            } else if (o == -1) {
                m = m + 1;
            }
        }
        bk_plus[lid] = p;
        bk_minus[lid] = m;
        workgroupBarrier();
        var stride = BACKUP_WG / 2u;
        while (stride > 0u) {
            if (lid < stride) {
                bk_plus[lid] = bk_plus[lid] + bk_plus[lid + stride];
                bk_minus[lid] = bk_minus[lid] + bk_minus[lid + stride];
            }
            workgroupBarrier();
            stride = stride / 2u;
        }
        plus = bk_plus[0];
        minus = bk_minus[0];
    }
    if (lid != 0u) {
        return;
    }

    let leaf = tree_ctl[ctl + CTL_LEAF];
    var start = leaf;
    if (term != 0u) {
        // terminal leaf bypassed playout: feed its known outcome directly,
        // weighted as one full playout batch
        let o = nodes[node_at(tree, u32(leaf))].outcome;
        if (o == 1) {
            plus = i32(N_PLAYOUTS);
        } else if (o == -1) {
            minus = i32(N_PLAYOUTS);
        }
    } else {
        let action = tree_ctl[ctl + CTL_PLAYOUT_ACTION];
        if (action >= 0) {
            start = children[node_at(tree, u32(leaf)) * MAX_ACTIONS + u32(action)];
        }
    }
    let root_action = ascend(tree, start, i32(N_PLAYOUTS), plus, minus);
    update_root_flag(tree, root_action);
}

@compute @workgroup_size(BACKUP_WG)
fn backup_acp(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_id) lid3: vec3<u32>,
) {
    let tree = wg.x;
    let lid = lid3.x;
    let ctl = tree * CTL_STRIDE;
    if (lid == 0u) {
        bk_term = u32(tree_ctl[ctl + CTL_LEAF_TERMINAL]);
        let leaf = u32(tree_ctl[ctl + CTL_LEAF]);
        if ((nodes[node_at(tree, leaf)].flags & FLAG_EXPANDED) != 0u) {
            bk_expanded = 1u;
        } else {
            bk_expanded = 0u;
        }
    }
    let term = workgroupUniformLoad(&bk_term);
    if (term != 0u) {
        if (lid == 0u) {
            let leaf = tree_ctl[ctl + CTL_LEAF];
            let o = nodes[node_at(tree, u32(leaf))].outcome;
            var plus = 0;
            var minus = 0;
            if (o == 1) {
                plus = i32(N_PLAYOUTS);
            } else if (o == -1) {
                minus = i32(N_PLAYOUTS);
            }
            let root_action = ascend(tree, leaf, i32(N_PLAYOUTS), plus, minus);
            update_root_flag(tree, root_action);
        }
        return;
    }
    let expanded = workgroupUniformLoad(&bk_expanded);

    var tot_n = 0;
    var tot_plus = 0;
    var tot_minus = 0;
    for (var a = 0u; a < MAX_ACTIONS; a++) {
        if (lid == 0u) {
            bk_target = -1;
            let leaf = tree_ctl[ctl + CTL_LEAF];
            if (expanded == 0u) {
                if (a == 0u) {
                    bk_target = leaf;
                }
            } else {
                bk_target = children[node_at(tree, u32(leaf)) * MAX_ACTIONS + a];
            }
        }
        let target_node = workgroupUniformLoad(&bk_target);
        if (target_node < 0) {
            continue;
        }
        var p = 0;
        var m = 0;
        for (var r = lid; r < N_PLAYOUTS; r += BACKUP_WG) {
            let o = rollout_outcomes[(tree * MAX_ACTIONS + a) * N_PLAYOUTS + r];
            if (o == 1) {
                p = p + 1;
            } else if (o == -1) {
                m = m + 1;
            }
        }
        bk_plus[lid] = p;
        bk_minus[lid] = m;
        workgroupBarrier();
        var stride = BACKUP_WG / 2u;
        while (stride > 0u) {
            if (lid < stride) {
                bk_plus[lid] = bk_plus[lid] + bk_plus[lid + stride];
                bk_minus[lid] = bk_minus[lid] + bk_minus[lid + stride];
            }
            workgroupBarrier();
            stride = stride / 2u;
        }
        if (lid == 0u) {
            let plus = bk_plus[0];
            let minus = bk_minus[0];
            if (expanded != 0u) {
                let g = node_at(tree, u32(target_node));
                nodes[g].n = nodes[g].n + i32(N_PLAYOUTS);
                if (nodes[g].turn == -1) {
                    nodes[g].n_wins = nodes[g].n_wins + plus;
                } else {
                    nodes[g].n_wins = nodes[g].n_wins + minus;
                }
            }
            tot_n = tot_n + i32(N_PLAYOUTS);
            tot_plus = tot_plus + plus;
            tot_minus = tot_minus + minus;
        }
        workgroupBarrier();
    }
    if (lid != 0u) {
        return;
    }
    let leaf = tree_ctl[ctl + CTL_LEAF];
    let root_action = ascend(tree, leaf, tot_n, tot_plus, tot_minus);
    if (leaf == 0 && expanded != 0u) {
        // the root itself was expanded this step: every root action changed
        for (var a = 0u; a < MAX_ACTIONS; a++) {
            if (children[node_at(tree, 0u) * MAX_ACTIONS + a] >= 0) {
                update_root_flag(tree, i32(a));
            }
        }
    } else {
        update_root_flag(tree, root_action);
    }
}

// ---------------------------------------------------------------------------
// Tree-shape statistics, one workgroup per tree
// ---------------------------------------------------------------------------

var<workgroup> st_sum: array<i32, STATS_WG>;
var<workgroup> st_max: array<i32, STATS_WG>;

@compute @workgroup_size(STATS_WG)
fn tree_stats(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_id) lid3: vec3<u32>,
) {
    let tree = wg.x;
    let lid = lid3.x;
    let ctl = tree * CTL_STRIDE;
    let size = u32(tree_ctl[ctl + CTL_SIZE]);
    var depth_sum = 0;
    var depth_max = 0;
    for (var i = lid; i < size; i += STATS_WG) {
        let d = nodes[node_at(tree, i)].depth;
        depth_sum = depth_sum + d;
        depth_max = max(depth_max, d);
    }
    st_sum[lid] = depth_sum;
    st_max[lid] = depth_max;
    workgroupBarrier();
    var stride = STATS_WG / 2u;
    while (stride > 0u) {
        if (lid < stride) {
            st_sum[lid] = st_sum[lid] + st_sum[lid + stride];
            st_max[lid] = max(st_max[lid], st_max[lid + stride]);
        }
        workgroupBarrier();
        stride = stride / 2u;
    }
    if (lid == 0u) {
        tree_ctl[ctl + CTL_DEPTH_SUM] = st_sum[0];
        tree_ctl[ctl + CTL_DEPTH_MAX] = st_max[0];
    }
}

// ---------------------------------------------------------------------------
// Final reduction over trees, one thread per root action
// ---------------------------------------------------------------------------

@compute @workgroup_size(REDUCE_WG)
fn reduce_over_trees(@builtin(global_invocation_id) gid: vec3<u32>) {
    let a = gid.x;
    if (a < MAX_ACTIONS) {
        var n = 0;
        var n_wins = 0;
        var flag = 0;
        var present = 0;
        for (var t = 0u; t < N_TREES; t++) {
            let child = children[node_at(t, 0u) * MAX_ACTIONS + a];
            if (child < 0) {
                continue;
            }
            present = 1;
            let cg = node_at(t, u32(child));
            n = n + nodes[cg].n;
            n_wins = n_wins + nodes[cg].n_wins;
            if (root_stats[t * MAX_ACTIONS + a] != 0) {
                flag = 1;
            }
            if (((nodes[cg].flags & FLAG_TERMINAL) != 0u)
                && (nodes[cg].outcome == params.root_turn)) {
                flag = 1;
            }
        }
        let base = REDUCED_BASE + a * REDUCED_STRIDE;
        root_stats[base] = n;
        root_stats[base + 1u] = n_wins;
        root_stats[base + 2u] = flag;
        root_stats[base + 3u] = present;
    }
    if (a == 0u) {
        var total = 0;
        for (var t = 0u; t < N_TREES; t++) {
            total = total + nodes[node_at(t, 0u)].n;
        }
        root_stats[SUMMARY_BASE] = total;
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playout_geometry_profiles() {
        // prodigal: one thread per rollout
        assert_eq!(KernelSpec::playout_geometry(128, true), (128, 1));
        assert_eq!(KernelSpec::playout_geometry(1024, true), (256, 4));
        // thrifty: few resident threads looping over their share
        assert_eq!(KernelSpec::playout_geometry(128, false), (64, 1));
        assert_eq!(KernelSpec::playout_geometry(32, false), (32, 1));
    }

    #[test]
    fn shader_source_is_specialized() {
        let spec = KernelSpec {
            n_trees: 4,
            max_tree_size: 1000,
            max_actions: 7,
            n_playouts: 128,
            board_m: 6,
            board_n: 7,
            extra_words: 7,
            playout_wg: 128,
            playout_chunks: 1,
        };
        let source = build_shader_source(&spec, "fn ms_stub() {}\n");
        assert!(source.contains("const MAX_ACTIONS: u32 = 7u;"));
        assert!(source.contains("const MAX_TREE_SIZE: u32 = 1000u;"));
        assert!(source.contains("fn ms_stub()"));
        assert!(source.contains("fn select_leaf"));
        assert!(source.contains("fn reduce_over_trees"));
    }
}
