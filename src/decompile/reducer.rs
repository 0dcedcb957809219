//! Structuring: collapses the control flow graph into nested statements.
//!
//! Reductions are found by a fixed table of strategies, each a pure
//! function inspecting one block. A pass tries every strategy over every
//! live block in priority order. Every applied reduction removes at least
//! one block or one edge into a loop header or exit, so the process
//! reaches a fixpoint; a ceiling on passes guards against malformed input.

use std::collections::BTreeSet;

use crate::error::{DecompileError, Result};

use super::cfg::*;
use super::expr::{Expr, LogicalOp};
use super::instruction::*;
use super::locals::{LocalId, LocalVariables};

/// Where an edge leaves its block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Next,
    Branch,
    Case(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopShape {
    /// `S` jumps to itself: `while (true)`.
    Infinite,
    /// `S` is a conditional that loops to itself: `do { } while (c)`.
    DoWhile,
    /// `S` tests, `body` runs and returns to `S`.
    While { body: BlockIndex },
}

/// One rewrite of the graph.
#[derive(Clone, Debug)]
pub enum Reduction {
    ThreadGoto {
        block: BlockIndex,
        target: BlockIndex,
    },
    Merge {
        block: BlockIndex,
        next: BlockIndex,
    },
    ShortCircuit {
        block: BlockIndex,
        inner: BlockIndex,
        condition: Expr,
        branch: BlockIndex,
        next: BlockIndex,
    },
    Ternary {
        block: BlockIndex,
        join: BlockIndex,
    },
    /// A conditional whose both edges reach the same block.
    Collapse {
        block: BlockIndex,
    },
    If {
        block: BlockIndex,
        body: BlockIndex,
        negate: bool,
        next: Option<BlockIndex>,
    },
    IfElse {
        block: BlockIndex,
        next: Option<BlockIndex>,
    },
    Switch {
        block: BlockIndex,
        /// Case bodies in source order with their labels.
        cases: Vec<(Vec<Option<i32>>, BlockIndex)>,
        join: Option<BlockIndex>,
    },
    Try {
        region: RegionIndex,
        block: BlockIndex,
        /// Copies of an enclosing finally body folded into the preceding
        /// block before the try is built.
        absorb: Vec<(BlockIndex, BlockIndex)>,
        /// Blocks outside the region that consume what the try body or a
        /// handler leaves on the stack, keyed by the block leaving it.
        consumers: Vec<(BlockIndex, BlockIndex)>,
        next: Option<BlockIndex>,
    },
    Loop {
        index: LoopIndex,
        shape: LoopShape,
    },
    Jump {
        block: BlockIndex,
        slot: Slot,
        target_loop: LoopIndex,
        is_break: bool,
        labeled: bool,
        /// Set when the edge enters the update code of a `for` loop.
        update_len: Option<usize>,
    },
}

type Strategy = fn(&Cfg, BlockIndex) -> Option<Reduction>;

/// Strategies in priority order. `jump` runs only when nothing else
/// applies anywhere.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("thread-goto", thread_goto),
    ("merge", merge),
    ("short-circuit", short_circuit),
    ("ternary", ternary),
    ("if", if_then),
    ("if-else", if_else),
    ("switch", switch),
    ("try", try_region),
    ("loop", loop_strategy),
];

const JUMP_STRATEGY: (&str, Strategy) = ("break-continue", jump);

/// Structures `cfg` in place and returns the number of reductions applied.
pub fn reduce(cfg: &mut Cfg, max_passes: usize) -> Result<usize> {
    pre_reduce(cfg);
    let mut reductions = 0;
    let mut passes = 0;
    loop {
        passes += 1;
        if passes > max_passes {
            return Err(DecompileError::StructuringStalled {
                passes,
                live_blocks: cfg.live_count(),
            });
        }
        let mut applied = run_pass(cfg, STRATEGIES);
        if applied == 0 {
            applied = run_pass(cfg, &[JUMP_STRATEGY]);
        }
        log::trace!("reducer pass {}: {} reductions", passes, applied);
        if applied == 0 {
            break;
        }
        reductions += applied;
    }
    if !is_reduced(cfg) {
        log::warn!(
            "structuring stalled after {} passes with {} live blocks",
            passes,
            cfg.live_count()
        );
        return Err(DecompileError::StructuringStalled {
            passes,
            live_blocks: cfg.live_count(),
        });
    }
    Ok(reductions)
}

fn run_pass(cfg: &mut Cfg, strategies: &[(&str, Strategy)]) -> usize {
    let mut applied = 0;
    for (name, strategy) in strategies {
        let mut b = 0;
        while b < cfg.blocks.len() {
            if cfg.blocks[b].is_live() {
                if let Some(reduction) = strategy(cfg, b) {
                    log::trace!("{} at block {}: {:?}", name, cfg.blocks[b].from_offset, reduction);
                    apply(cfg, reduction);
                    cfg.compute_predecessors();
                    applied += 1;
                    // The jump strategy converts one edge per pass.
                    if *name == JUMP_STRATEGY.0 {
                        return applied;
                    }
                    continue;
                }
            }
            b += 1;
        }
    }
    applied
}

/// A fully structured graph is a single statement block.
pub fn is_reduced(cfg: &Cfg) -> bool {
    let mut live = cfg.live_blocks();
    match (live.next(), live.next()) {
        (Some(only), None) => only.kind == BlockKind::Statement && only.next.is_none(),
        (None, None) => true,
        _ => false,
    }
}

/// The statements of a reduced graph.
pub fn into_statements(cfg: &mut Cfg) -> Vec<Instruction> {
    match cfg.blocks.iter_mut().find(|b| b.is_live()) {
        Some(block) => std::mem::take(&mut block.statements),
        None => Vec::new(),
    }
}

/// Flips a conditional looping back to its header when its fall-through
/// is a conditional join of at least three edges, so the loop test reads
/// positively.
fn pre_reduce(cfg: &mut Cfg) {
    let mut flips = Vec::new();
    for block in cfg.live_blocks() {
        if block.kind != BlockKind::Conditional {
            continue;
        }
        let (Some(branch), Some(next), Some(l)) = (block.branch, block.next, block.enclosing_loop) else {
            continue;
        };
        let fallthrough = &cfg.blocks[next];
        if branch == cfg.loops[l].start
            && fallthrough.kind == BlockKind::Conditional
            && fallthrough.predecessors.len() >= 3
            && fallthrough
                .predecessors
                .iter()
                .all(|p| cfg.blocks[*p].next == Some(next))
        {
            flips.push(block.index);
        }
    }
    for b in flips {
        log::trace!("flipping branch polarity at {}", cfg.blocks[b].from_offset);
        let block = &mut cfg.blocks[b];
        std::mem::swap(&mut block.branch, &mut block.next);
        block.condition = block.condition.take().map(Expr::negate);
    }
}

// ============================================================
// Predicates
// ============================================================

fn same_context(cfg: &Cfg, a: BlockIndex, b: BlockIndex) -> bool {
    let (a, b) = (&cfg.blocks[a], &cfg.blocks[b]);
    a.protected_by == b.protected_by && a.enclosing_loop == b.enclosing_loop
}

fn only_predecessor(cfg: &Cfg, b: BlockIndex, pred: BlockIndex) -> bool {
    let preds = &cfg.blocks[b].predecessors;
    preds.len() == 1 && preds.contains(&pred)
}

/// Blocks other strategies must not absorb or discard.
fn is_anchored(cfg: &Cfg, b: BlockIndex) -> bool {
    cfg.is_loop_start(b) || cfg.is_handler(b) || cfg.is_region_entry(b)
}

/// A statement block that neither consumes nor leaves stack values.
fn is_plain_body(cfg: &Cfg, owner: BlockIndex, b: BlockIndex) -> bool {
    let block = &cfg.blocks[b];
    block.is_live()
        && block.kind == BlockKind::Statement
        && block.entry_depth == 0
        && block.exit_stack.is_empty()
        && b != owner
        && same_context(cfg, owner, b)
        && !is_anchored(cfg, b)
}

fn loop_end_offset(cfg: &Cfg, b: BlockIndex) -> u32 {
    cfg.blocks[b]
        .enclosing_loop
        .and_then(|l| cfg.loops[l].end)
        .map_or(u32::MAX, |end| cfg.blocks[end].from_offset)
}

/// An `if` is created when the body is entered only from the test and the
/// join does not lie past the end of the enclosing loop.
pub fn need_to_create_if(cfg: &Cfg, body: BlockIndex, join: Option<BlockIndex>, max_offset: u32) -> bool {
    cfg.blocks[body].predecessors.len() == 1
        && join.map_or(true, |j| cfg.blocks[j].from_offset <= max_offset)
}

/// Both arms are entered only from the test and neither falls into the
/// other.
pub fn need_to_create_if_else(cfg: &Cfg, then_block: BlockIndex, else_block: BlockIndex) -> bool {
    let (t, e) = (&cfg.blocks[then_block], &cfg.blocks[else_block]);
    t.predecessors.len() == 1
        && e.predecessors.len() == 1
        && t.next != Some(else_block)
        && e.next != Some(then_block)
}

/// Both arms leave exactly one more value than `block` did, and the join
/// expects it.
pub fn need_to_update_condition_ternary(cfg: &Cfg, block: BlockIndex, join: BlockIndex) -> bool {
    let b = &cfg.blocks[block];
    let depth = b.exit_stack.len();
    let arms_agree = [b.branch, b.next].iter().all(|arm| match arm {
        Some(a) => {
            let arm = &cfg.blocks[*a];
            arm.entry_depth == depth && arm.exit_stack.len() == depth + 1
        }
        None => false,
    });
    arms_agree && cfg.blocks[join].entry_depth == depth + 1
}

/// The first `depth` exit values of `arm` pass its entry stack through.
fn passes_through(arm: &BasicBlock, incoming: &[Expr]) -> bool {
    incoming
        .iter()
        .enumerate()
        .all(|(k, v)| arm.exit_stack[k] == Expr::StackEntry(k) || arm.exit_stack[k] == *v)
}

fn stack_values(block: &BasicBlock) -> Vec<Expr> {
    block.exit_stack.iter().cloned().map(Expr::undup).collect()
}

/// Replaces `StackEntry` placeholders in `statements` with `values`.
fn substitute_entries(statements: &mut [Instruction], values: &[Expr]) {
    if values.is_empty() {
        return;
    }
    for s in statements.iter_mut() {
        s.walk_expressions_mut(&mut |e| {
            if let Expr::StackEntry(k) = e {
                if let Some(v) = values.get(*k) {
                    *e = v.clone();
                }
            }
        });
    }
}

// ============================================================
// Strategies
// ============================================================

fn thread_goto(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    let target = block.next?;
    let empty = block.kind == BlockKind::Statement
        && block.statements.is_empty()
        && block.exit_stack.is_empty()
        && block.entry_depth == 0;
    if !empty || b == 0 || target == b || block.predecessors.is_empty() || is_anchored(cfg, b) {
        return None;
    }
    Some(Reduction::ThreadGoto { block: b, target })
}

fn merge(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    let next = block.next?;
    let n = &cfg.blocks[next];
    if block.kind != BlockKind::Statement
        || next == b
        || !n.is_live()
        || !only_predecessor(cfg, next, b)
        || !same_context(cfg, b, next)
        || is_anchored(cfg, next)
        || block.exit_stack.len() != n.entry_depth
    {
        return None;
    }
    Some(Reduction::Merge { block: b, next })
}

fn short_circuit(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    if block.kind != BlockKind::Conditional {
        return None;
    }
    let (t1, inner) = (block.branch?, block.next?);
    let n = &cfg.blocks[inner];
    if inner == b
        || n.kind != BlockKind::Conditional
        || !n.statements.is_empty()
        || !only_predecessor(cfg, inner, b)
        || !same_context(cfg, b, inner)
        || is_anchored(cfg, inner)
        || n.entry_depth != block.exit_stack.len()
        || n.exit_stack.len() != n.entry_depth
        || !passes_through(n, &block.exit_stack)
    {
        return None;
    }
    let (t2, f2) = (n.branch?, n.next?);
    if t2 == inner || f2 == inner {
        return None;
    }
    let c1 = block.condition.clone()?;
    let mut c2 = n.condition.clone()?;
    c2.substitute_stack(&stack_values(block));
    let (condition, branch, next) = if t1 == t2 {
        (
            Expr::Logical {
                op: LogicalOp::Or,
                left: c1.boxed(),
                right: c2.boxed(),
            },
            t1,
            f2,
        )
    } else if t1 == f2 {
        (
            Expr::Logical {
                op: LogicalOp::And,
                left: c1.negate().boxed(),
                right: c2.boxed(),
            },
            t2,
            t1,
        )
    } else {
        return None;
    };
    Some(Reduction::ShortCircuit {
        block: b,
        inner,
        condition,
        branch,
        next,
    })
}

fn ternary(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    if block.kind != BlockKind::Conditional {
        return None;
    }
    let (t, f) = (block.branch?, block.next?);
    if t == f || t == b || f == b {
        return None;
    }
    let (tb, fb) = (&cfg.blocks[t], &cfg.blocks[f]);
    let join = tb.next?;
    let arm_ok = |arm: &BasicBlock| {
        arm.is_live()
            && arm.kind == BlockKind::Statement
            && arm.statements.is_empty()
            && only_predecessor(cfg, arm.index, b)
            && same_context(cfg, b, arm.index)
            && !is_anchored(cfg, arm.index)
            && arm.exit_stack.len() == block.exit_stack.len() + 1
            && passes_through(arm, &block.exit_stack)
    };
    if fb.next != Some(join) || !arm_ok(tb) || !arm_ok(fb) || !need_to_update_condition_ternary(cfg, b, join) {
        return None;
    }
    Some(Reduction::Ternary { block: b, join })
}

fn if_then(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    if block.kind != BlockKind::Conditional || !block.exit_stack.is_empty() {
        return None;
    }
    let (t, f) = (block.branch?, block.next?);
    if t == f {
        return Some(Reduction::Collapse { block: b });
    }
    let max_offset = loop_end_offset(cfg, b);
    // Fall-through body, joining at the branch target.
    let fb = &cfg.blocks[f];
    if is_plain_body(cfg, b, f)
        && (fb.next.is_none() || fb.next == Some(t))
        && need_to_create_if(cfg, f, Some(t), max_offset)
    {
        return Some(Reduction::If {
            block: b,
            body: f,
            negate: true,
            next: Some(t),
        });
    }
    // Branch-target body, joining at the fall-through.
    let tb = &cfg.blocks[t];
    if is_plain_body(cfg, b, t)
        && (tb.next.is_none() || tb.next == Some(f))
        && need_to_create_if(cfg, t, Some(f), max_offset)
    {
        return Some(Reduction::If {
            block: b,
            body: t,
            negate: false,
            next: Some(f),
        });
    }
    None
}

fn if_else(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    if block.kind != BlockKind::Conditional || !block.exit_stack.is_empty() {
        return None;
    }
    let (t, f) = (block.branch?, block.next?);
    if t == f || !is_plain_body(cfg, b, t) || !is_plain_body(cfg, b, f) || !need_to_create_if_else(cfg, f, t) {
        return None;
    }
    let next = match (cfg.blocks[f].next, cfg.blocks[t].next) {
        (Some(a), Some(c)) if a == c => Some(a),
        (Some(a), None) | (None, Some(a)) => Some(a),
        (None, None) => None,
        _ => return None,
    };
    Some(Reduction::IfElse { block: b, next })
}

fn switch(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    if block.kind != BlockKind::Switch || !block.exit_stack.is_empty() {
        return None;
    }
    let targets = &block.switch.as_ref()?.cases;
    let default = targets.iter().find(|(k, _)| k.is_none()).map(|(_, t)| *t)?;
    let mut distinct: Vec<BlockIndex> = targets.iter().map(|(_, t)| *t).collect();
    distinct.sort_by_key(|t| (cfg.blocks[*t].from_offset, *t));
    distinct.dedup();

    let flows_into_default = distinct
        .iter()
        .any(|t| *t != default && cfg.blocks[*t].next == Some(default));
    let outside_preds = cfg.blocks[default]
        .predecessors
        .iter()
        .any(|p| *p != b && !distinct.contains(p));
    let join = if flows_into_default || outside_preds || default == b {
        Some(default)
    } else {
        let exits: BTreeSet<BlockIndex> = distinct
            .iter()
            .filter_map(|t| cfg.blocks[*t].next)
            .filter(|n| !distinct.contains(n))
            .collect();
        match exits.len() {
            0 => None,
            1 => exits.into_iter().next(),
            _ => return None,
        }
    };
    let bodies: Vec<BlockIndex> = distinct.into_iter().filter(|t| Some(*t) != join).collect();
    for (i, body) in bodies.iter().enumerate() {
        if !is_plain_body(cfg, b, *body) {
            return None;
        }
        let previous = i.checked_sub(1).map(|p| bodies[p]);
        let following = bodies.get(i + 1).copied();
        let c = &cfg.blocks[*body];
        if c.predecessors.iter().any(|p| *p != b && Some(*p) != previous) {
            return None;
        }
        if c.next.is_some() && c.next != join && c.next != following {
            return None;
        }
    }
    let cases = bodies
        .iter()
        .map(|body| {
            let labels = targets
                .iter()
                .filter(|(_, t)| t == body)
                .map(|(k, _)| *k)
                .collect();
            (labels, *body)
        })
        .collect();
    Some(Reduction::Switch { block: b, cases, join })
}

/// Splits a rethrowing any-handler into its catch local and the finally
/// body: `t = caught; F; throw t`.
pub fn finally_pattern(statements: &[Instruction]) -> Option<(LocalId, Vec<Instruction>)> {
    let (first, rest) = statements.split_first()?;
    let (last, body) = rest.split_last()?;
    match (&first.kind, &last.kind) {
        (
            InstructionKind::Store {
                local,
                value: Expr::CaughtException(_),
            },
            InstructionKind::Throw(Expr::Local(thrown)),
        ) if local == thrown => Some((*local, body.to_vec())),
        _ => None,
    }
}

/// The finally body of the nearest enclosing region with an any-handler.
fn enclosing_finally(cfg: &Cfg, mut region: Option<RegionIndex>) -> Option<Vec<Instruction>> {
    while let Some(r) = region {
        let current = &cfg.regions[r];
        for (types, h) in &current.handlers {
            if types.iter().all(Option::is_none) {
                let handler = &cfg.blocks[*h];
                if handler.kind == BlockKind::Statement && handler.next.is_none() {
                    return finally_pattern(&handler.statements).map(|(_, f)| f);
                }
                return None;
            }
        }
        region = current.parent;
    }
    None
}

fn is_finally_copy(cfg: &Cfg, source: BlockIndex, j: BlockIndex, finally: &[Instruction]) -> bool {
    let block = &cfg.blocks[j];
    !finally.is_empty()
        && block.is_live()
        && block.kind == BlockKind::Statement
        && block.entry_depth == 0
        && block.exit_stack.is_empty()
        && only_predecessor(cfg, j, source)
        && !is_anchored(cfg, j)
        && block.statements.len() >= finally.len()
        && block.statements[..finally.len()] == *finally
}

fn region_contains(cfg: &Cfg, region: RegionIndex, mut current: Option<RegionIndex>) -> bool {
    while let Some(r) = current {
        if r == region {
            return true;
        }
        current = cfg.regions[r].parent;
    }
    false
}

/// The block that pops what `source` leaves on the stack when leaving
/// region `r`: a lone return, throw or store outside the region, entered
/// only from `source`.
fn stack_consumer(cfg: &Cfg, source: BlockIndex, r: RegionIndex) -> Option<BlockIndex> {
    let block = &cfg.blocks[source];
    let c = block.next?;
    let consumer = &cfg.blocks[c];
    let consumes = match consumer.statements.as_slice() {
        [only] => matches!(
            only.kind,
            InstructionKind::Return(_)
                | InstructionKind::Throw(_)
                | InstructionKind::Store { .. }
                | InstructionKind::FieldStore { .. }
                | InstructionKind::ArrayStore { .. }
        ),
        _ => false,
    };
    let outside = match consumer.protected_by {
        None => true,
        Some(p) => region_contains(cfg, p, cfg.regions[r].parent),
    };
    let fits = c != source
        && consumer.is_live()
        && consumer.kind == BlockKind::Statement
        && consumes
        && outside
        && consumer.entry_depth == block.exit_stack.len()
        && consumer.exit_stack.is_empty()
        && only_predecessor(cfg, c, source)
        && !is_anchored(cfg, c);
    fits.then_some(c)
}

fn try_region(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    let r = block.protected_by?;
    let region = &cfg.regions[r];
    if region.reduced || region.entry != b || block.kind != BlockKind::Statement {
        return None;
    }
    if cfg
        .live_blocks()
        .any(|other| other.index != b && region_contains(cfg, r, other.protected_by))
    {
        return None;
    }
    let finally = enclosing_finally(cfg, region.parent);
    let mut absorb = Vec::new();
    let mut consumers = Vec::new();
    let mut tail = b;
    if !block.exit_stack.is_empty() {
        let c = stack_consumer(cfg, b, r)?;
        consumers.push((b, c));
        tail = c;
    }
    let mut next = cfg.blocks[tail].next;
    if let (Some(j), Some(f)) = (next, &finally) {
        if is_finally_copy(cfg, tail, j, f) {
            absorb.push((tail, j));
            next = cfg.blocks[j].next;
        }
    }
    for (_, h) in &region.handlers {
        let handler = &cfg.blocks[*h];
        if !handler.is_live() || handler.kind != BlockKind::Statement || handler.predecessors.iter().any(|p| *p != b) {
            return None;
        }
        let mut handler_tail = *h;
        if !handler.exit_stack.is_empty() {
            let c = stack_consumer(cfg, *h, r)?;
            consumers.push((*h, c));
            handler_tail = c;
        }
        let mut handler_next = cfg.blocks[handler_tail].next;
        if let (Some(j), Some(f)) = (handler_next, &finally) {
            if is_finally_copy(cfg, handler_tail, j, f) {
                absorb.push((handler_tail, j));
                handler_next = cfg.blocks[j].next;
            }
        }
        match (next, handler_next) {
            (_, None) => {}
            (None, Some(j)) => next = Some(j),
            (Some(a), Some(j)) if a == j => {}
            _ => return None,
        }
    }
    Some(Reduction::Try {
        region: r,
        block: b,
        absorb,
        consumers,
        next,
    })
}

fn loop_strategy(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let index = cfg.loops.iter().position(|l| !l.reduced && l.start == b)?;
    let block = &cfg.blocks[b];
    if !block.exit_stack.is_empty() {
        return None;
    }
    let others: Vec<BlockIndex> = cfg
        .live_blocks()
        .filter(|x| x.index != b && x.enclosing_loop == Some(index))
        .map(|x| x.index)
        .collect();
    // Inner loops must be structured first.
    if cfg
        .loops
        .iter()
        .any(|l| !l.reduced && l.parent == Some(index))
    {
        return None;
    }
    match block.kind {
        BlockKind::Statement if block.next == Some(b) && others.is_empty() => Some(Reduction::Loop {
            index,
            shape: LoopShape::Infinite,
        }),
        BlockKind::Conditional if others.is_empty() && (block.branch == Some(b) || block.next == Some(b)) => {
            Some(Reduction::Loop {
                index,
                shape: LoopShape::DoWhile,
            })
        }
        BlockKind::Conditional if others.len() == 1 => {
            let body = others[0];
            let e = &cfg.blocks[body];
            let enters = block.branch == Some(body) || block.next == Some(body);
            if enters
                && e.kind == BlockKind::Statement
                && e.next == Some(b)
                && e.entry_depth == 0
                && e.exit_stack.is_empty()
                && only_predecessor(cfg, body, b)
                && e.protected_by == block.protected_by
            {
                Some(Reduction::Loop {
                    index,
                    shape: LoopShape::While { body },
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

/// The in-loop predecessor of the header with the highest offset. Its edge
/// to the header is the back edge the loop shape consumes.
fn latch(cfg: &Cfg, l: LoopIndex) -> Option<BlockIndex> {
    let start = cfg.loops[l].start;
    cfg.blocks[start]
        .predecessors
        .iter()
        .copied()
        .filter(|p| cfg.loop_chain(*p).contains(&l))
        .max_by_key(|p| (cfg.blocks[*p].from_offset, *p))
}

/// The update code of a `for` loop: a latch holding statements that is
/// entered from more than one place, because `continue` jumps to it.
fn update_block(cfg: &Cfg, l: LoopIndex) -> Option<BlockIndex> {
    let start = cfg.loops[l].start;
    let u = latch(cfg, l)?;
    let block = &cfg.blocks[u];
    let shaped = u != start
        && block.kind == BlockKind::Statement
        && block.next == Some(start)
        && !block.statements.is_empty()
        && block.entry_depth == 0
        && block.predecessors.len() >= 2;
    shaped.then_some(u)
}

/// The predecessor of `target` that reaches it by falling through.
fn fallthrough_predecessor(cfg: &Cfg, target: BlockIndex) -> Option<BlockIndex> {
    cfg.blocks[target]
        .predecessors
        .iter()
        .copied()
        .filter(|p| cfg.blocks[*p].from_offset < cfg.blocks[target].from_offset)
        .max_by_key(|p| (cfg.blocks[*p].from_offset, *p))
}

fn jump(cfg: &Cfg, b: BlockIndex) -> Option<Reduction> {
    let block = &cfg.blocks[b];
    let chain: Vec<LoopIndex> = cfg
        .loop_chain(b)
        .into_iter()
        .filter(|l| !cfg.loops[*l].reduced)
        .collect();
    if chain.is_empty() {
        return None;
    }
    let mut edges: Vec<(Slot, BlockIndex)> = Vec::new();
    if let Some(n) = block.next {
        edges.push((Slot::Next, n));
    }
    if let Some(t) = block.branch {
        edges.push((Slot::Branch, t));
    }
    if let Some(switch) = &block.switch {
        edges.extend(switch.cases.iter().enumerate().map(|(i, (_, t))| (Slot::Case(i), *t)));
    }
    for (slot, target) in edges {
        for (depth, &l) in chain.iter().enumerate() {
            let lp = &cfg.loops[l];
            let update = update_block(cfg, l).filter(|u| *u == target);
            let is_continue = target == lp.start || update.is_some();
            let is_break = lp.end == Some(target);
            if !is_continue && !is_break {
                if lp.members.contains(&target) {
                    break;
                }
                continue;
            }
            if depth == 0 {
                let natural = if update.is_some() {
                    fallthrough_predecessor(cfg, target) == Some(b)
                } else if is_continue {
                    b == lp.start || latch(cfg, l) == Some(b)
                } else {
                    b == lp.start
                        || (block.kind == BlockKind::Conditional
                            && (block.branch == Some(lp.start) || block.next == Some(lp.start)))
                };
                if natural {
                    break;
                }
            }
            let in_switch = is_break
                && cfg
                    .live_blocks()
                    .any(|x| x.kind == BlockKind::Switch && x.enclosing_loop == block.enclosing_loop && x.index != b);
            return Some(Reduction::Jump {
                block: b,
                slot,
                target_loop: l,
                is_break,
                labeled: depth > 0 || in_switch,
                update_len: update.map(|u| cfg.blocks[u].statements.len()),
            });
        }
    }
    None
}

// ============================================================
// Application
// ============================================================

fn delete(cfg: &mut Cfg, b: BlockIndex) {
    let block = &mut cfg.blocks[b];
    block.kind = BlockKind::Deleted;
    block.next = None;
    block.branch = None;
    block.switch = None;
}

fn retarget_loop_ends(cfg: &mut Cfg, from: BlockIndex, to: BlockIndex) {
    for l in cfg.loops.iter_mut() {
        if l.end == Some(from) {
            l.end = Some(to);
        }
    }
}

fn take_statements(cfg: &mut Cfg, b: BlockIndex) -> Vec<Instruction> {
    std::mem::take(&mut cfg.blocks[b].statements)
}

fn make(cfg: &Cfg, b: BlockIndex, kind: InstructionKind) -> Instruction {
    let block = &cfg.blocks[b];
    let line = block
        .statements
        .first()
        .and_then(|i| i.line_number)
        .or(block.line_number);
    Instruction::new(block.from_offset, line, kind)
}

/// Turns `b` into a statement block continuing at `next`.
fn become_statement(cfg: &mut Cfg, b: BlockIndex, next: Option<BlockIndex>) {
    let block = &mut cfg.blocks[b];
    block.kind = BlockKind::Statement;
    block.condition = None;
    block.branch = None;
    block.switch = None;
    block.next = next;
}

fn apply(cfg: &mut Cfg, reduction: Reduction) {
    match reduction {
        Reduction::ThreadGoto { block, target } => {
            let preds: Vec<BlockIndex> = cfg.blocks[block].predecessors.iter().copied().collect();
            for p in preds {
                cfg.blocks[p].redirect(block, target);
            }
            retarget_loop_ends(cfg, block, target);
            delete(cfg, block);
        }
        Reduction::Merge { block, next } => {
            let values = stack_values(&cfg.blocks[block]);
            let mut n = cfg.blocks[next].clone();
            if !values.is_empty() {
                substitute_entries(&mut n.statements, &values);
                for e in n.exit_stack.iter_mut() {
                    e.substitute_stack(&values);
                }
                if let Some(c) = n.condition.as_mut() {
                    c.substitute_stack(&values);
                }
                if let Some(s) = n.switch.as_mut() {
                    s.selector.substitute_stack(&values);
                }
            }
            let b = &mut cfg.blocks[block];
            b.statements.append(&mut n.statements);
            b.kind = n.kind;
            b.condition = n.condition;
            b.next = n.next;
            b.branch = n.branch;
            b.switch = n.switch;
            b.exit_stack = n.exit_stack;
            b.to_offset = b.to_offset.max(n.to_offset);
            delete(cfg, next);
            retarget_loop_ends(cfg, next, block);
        }
        Reduction::ShortCircuit {
            block,
            inner,
            condition,
            branch,
            next,
        } => {
            let b = &mut cfg.blocks[block];
            b.condition = Some(condition);
            b.branch = Some(branch);
            b.next = Some(next);
            delete(cfg, inner);
            retarget_loop_ends(cfg, inner, block);
        }
        Reduction::Ternary { block, join } => {
            let depth = cfg.blocks[block].exit_stack.len();
            let values = stack_values(&cfg.blocks[block]);
            let (Some(t), Some(f)) = (cfg.blocks[block].branch, cfg.blocks[block].next) else {
                return;
            };
            let arm_value = |cfg: &Cfg, arm: BlockIndex| {
                let mut v = cfg.blocks[arm].exit_stack[depth].clone().undup();
                v.substitute_stack(&values);
                v
            };
            let then_expr = arm_value(cfg, t);
            let else_expr = arm_value(cfg, f);
            let condition = cfg.blocks[block]
                .condition
                .take()
                .unwrap_or(Expr::BooleanLiteral(true));
            become_statement(cfg, block, Some(join));
            cfg.blocks[block].exit_stack.push(Expr::Ternary {
                condition: condition.boxed(),
                then_expr: then_expr.boxed(),
                else_expr: else_expr.boxed(),
            });
            delete(cfg, t);
            delete(cfg, f);
        }
        Reduction::Collapse { block } => {
            let target = cfg.blocks[block].next;
            if let Some(condition) = cfg.blocks[block].condition.take() {
                if condition.has_side_effects() {
                    let statement = make(cfg, block, InstructionKind::Expression(condition));
                    cfg.blocks[block].statements.push(statement);
                }
            }
            become_statement(cfg, block, target);
        }
        Reduction::If {
            block,
            body,
            negate,
            next,
        } => {
            let condition = cfg.blocks[block]
                .condition
                .take()
                .unwrap_or(Expr::BooleanLiteral(true));
            let condition = if negate { condition.negate() } else { condition };
            let then_body = take_statements(cfg, body);
            let statement = make(
                cfg,
                body,
                InstructionKind::If {
                    condition,
                    then_body,
                    else_body: None,
                },
            );
            cfg.blocks[block].statements.push(statement);
            become_statement(cfg, block, next);
            delete(cfg, body);
        }
        Reduction::IfElse { block, next } => {
            let (Some(t), Some(f)) = (cfg.blocks[block].branch, cfg.blocks[block].next) else {
                return;
            };
            let condition = cfg.blocks[block]
                .condition
                .take()
                .unwrap_or(Expr::BooleanLiteral(true))
                .negate();
            let then_body = take_statements(cfg, f);
            let else_body = take_statements(cfg, t);
            let statement = make(
                cfg,
                f,
                InstructionKind::If {
                    condition,
                    then_body,
                    else_body: Some(else_body),
                },
            );
            cfg.blocks[block].statements.push(statement);
            become_statement(cfg, block, next);
            delete(cfg, t);
            delete(cfg, f);
        }
        Reduction::Switch { block, cases, join } => {
            let selector = match cfg.blocks[block].switch.take() {
                Some(s) => s.selector,
                None => return,
            };
            let count = cases.len();
            let mut built = Vec::with_capacity(count);
            for (i, (labels, body)) in cases.into_iter().enumerate() {
                let mut statements = take_statements(cfg, body);
                let ends_in_join = join.is_some() && cfg.blocks[body].next == join;
                if ends_in_join && i + 1 < count {
                    statements.push(make(cfg, body, InstructionKind::Break(None)));
                }
                built.push(SwitchCase {
                    labels,
                    body: statements,
                });
                delete(cfg, body);
            }
            let statement = make(
                cfg,
                block,
                InstructionKind::SwitchBlock {
                    selector,
                    cases: built,
                },
            );
            cfg.blocks[block].statements.push(statement);
            become_statement(cfg, block, join);
        }
        Reduction::Try {
            region,
            block,
            absorb,
            consumers,
            next,
        } => apply_try(cfg, region, block, absorb, consumers, next),
        Reduction::Loop { index, shape } => apply_loop(cfg, index, shape),
        Reduction::Jump {
            block,
            slot,
            target_loop,
            is_break,
            labeled,
            update_len,
        } => {
            if update_len.is_some() {
                cfg.loops[target_loop].update_len = update_len;
            }
            let label = if labeled {
                let l = &mut cfg.loops[target_loop];
                let name = l
                    .label
                    .get_or_insert_with(|| format!("label{}", target_loop + 1))
                    .clone();
                Some(name)
            } else {
                None
            };
            if is_break {
                cfg.loops[target_loop].has_breaks = true;
            }
            let kind = if is_break {
                InstructionKind::Break(label)
            } else {
                InstructionKind::Continue(label)
            };
            let statement = make(cfg, block, kind);
            let b = &cfg.blocks[block];
            if slot == Slot::Next && b.kind == BlockKind::Statement {
                let b = &mut cfg.blocks[block];
                b.statements.push(statement);
                b.next = None;
                return;
            }
            let k = cfg.add_block(block, vec![statement]);
            let b = &mut cfg.blocks[block];
            match slot {
                Slot::Next => b.next = Some(k),
                Slot::Branch => b.branch = Some(k),
                Slot::Case(i) => {
                    if let Some(s) = b.switch.as_mut() {
                        if let Some(case) = s.cases.get_mut(i) {
                            case.1 = k;
                        }
                    }
                }
            }
        }
    }
}

fn apply_try(
    cfg: &mut Cfg,
    region: RegionIndex,
    block: BlockIndex,
    absorb: Vec<(BlockIndex, BlockIndex)>,
    consumers: Vec<(BlockIndex, BlockIndex)>,
    next: Option<BlockIndex>,
) {
    for (source, copy) in absorb {
        let mut statements = take_statements(cfg, copy);
        cfg.blocks[source].statements.append(&mut statements);
        cfg.blocks[source].next = cfg.blocks[copy].next;
        delete(cfg, copy);
    }
    for (source, consumer) in consumers {
        let values = stack_values(&cfg.blocks[source]);
        let mut statements = take_statements(cfg, consumer);
        substitute_entries(&mut statements, &values);
        let after = cfg.blocks[consumer].next;
        let s = &mut cfg.blocks[source];
        s.statements.append(&mut statements);
        s.exit_stack.clear();
        s.next = after;
        delete(cfg, consumer);
        retarget_loop_ends(cfg, consumer, source);
    }
    let handlers = cfg.regions[region].handlers.clone();
    let mut body = take_statements(cfg, block);
    let mut catches = Vec::new();
    let mut finally = None;
    for (types, h) in handlers {
        let mut statements = take_statements(cfg, h);
        delete(cfg, h);
        if types.iter().all(Option::is_none) {
            if let Some((_, f)) = finally_pattern(&statements) {
                finally = Some(f);
                continue;
            }
        }
        let local = match statements.first().map(|i| &i.kind) {
            Some(InstructionKind::Store {
                local,
                value: Expr::CaughtException(_),
            }) => {
                let local = *local;
                statements.remove(0);
                Some(local)
            }
            _ => None,
        };
        let types = types
            .into_iter()
            .map(|t| t.unwrap_or_else(|| "java/lang/Throwable".to_string()))
            .collect();
        catches.push(CatchClause {
            types,
            local,
            body: statements,
        });
    }
    if let Some(f) = &finally {
        strip_finally(&mut body, f);
        for c in catches.iter_mut() {
            strip_finally(&mut c.body, f);
        }
    }
    // `try { try { } catch { } } finally { }` reads as one statement.
    if catches.is_empty() && finally.is_some() && body.len() == 1 {
        if let InstructionKind::Try {
            finally: None,
            ..
        } = &body[0].kind
        {
            if let Some(Instruction {
                kind:
                    InstructionKind::Try {
                        body: inner_body,
                        catches: inner_catches,
                        ..
                    },
                ..
            }) = body.pop()
            {
                body = inner_body;
                catches = inner_catches;
            }
        }
    }
    let statement = make(
        cfg,
        block,
        InstructionKind::Try {
            body,
            catches,
            finally,
        },
    );
    let parent = cfg.regions[region].parent;
    cfg.regions[region].reduced = true;
    let b = &mut cfg.blocks[block];
    b.statements = vec![statement];
    b.protected_by = parent;
    b.next = next;
}

/// Removes the inlined copies of a finally body: the one closing the
/// normal path and those in front of every early exit.
pub fn strip_finally(list: &mut Vec<Instruction>, finally: &[Instruction]) {
    if finally.is_empty() {
        return;
    }
    strip_before_exits(list, finally);
    strip_tail(list, finally);
}

fn strip_tail(list: &mut Vec<Instruction>, finally: &[Instruction]) {
    if list.len() >= finally.len() && list[list.len() - finally.len()..] == *finally {
        list.truncate(list.len() - finally.len());
        return;
    }
    if let Some(last) = list.last_mut() {
        match &mut last.kind {
            InstructionKind::Try {
                body,
                catches,
                finally: None,
            } => {
                strip_tail(body, finally);
                for c in catches.iter_mut() {
                    strip_tail(&mut c.body, finally);
                }
            }
            InstructionKind::If {
                then_body,
                else_body: Some(else_body),
                ..
            } => {
                strip_tail(then_body, finally);
                strip_tail(else_body, finally);
            }
            _ => {}
        }
    }
}

fn strip_before_exits(list: &mut Vec<Instruction>, finally: &[Instruction]) {
    let mut i = 0;
    while i < list.len() {
        for body in list[i].bodies_mut() {
            strip_before_exits(body, finally);
        }
        let exits = matches!(
            list[i].kind,
            InstructionKind::Return(_) | InstructionKind::Break(_) | InstructionKind::Continue(_)
        );
        if exits && i >= finally.len() && list[i - finally.len()..i] == *finally {
            list.drain(i - finally.len()..i);
            i -= finally.len();
        }
        i += 1;
    }
}

fn apply_loop(cfg: &mut Cfg, index: LoopIndex, shape: LoopShape) {
    let start = cfg.loops[index].start;
    let label = cfg.loops[index].label.clone();
    let end = cfg.loops[index].end;
    let parent = cfg.loops[index].parent;
    let (statement, next) = match shape {
        LoopShape::Infinite => {
            let body = take_statements(cfg, start);
            let next = if cfg.loops[index].has_breaks { end } else { None };
            (
                InstructionKind::While {
                    label,
                    condition: Expr::BooleanLiteral(true),
                    body,
                },
                next,
            )
        }
        LoopShape::DoWhile => {
            let block = &mut cfg.blocks[start];
            let condition = block.condition.take().unwrap_or(Expr::BooleanLiteral(true));
            let (condition, exit) = if block.branch == Some(start) {
                (condition, block.next)
            } else {
                (condition.negate(), block.branch)
            };
            let body = std::mem::take(&mut block.statements);
            (
                InstructionKind::DoWhile {
                    label,
                    body,
                    condition,
                },
                exit,
            )
        }
        LoopShape::While { body: inner } => {
            let block = &mut cfg.blocks[start];
            let condition = block.condition.take().unwrap_or(Expr::BooleanLiteral(true));
            let (stay, exit) = if block.branch == Some(inner) {
                (condition, block.next)
            } else {
                (condition.negate(), block.branch)
            };
            let header = std::mem::take(&mut block.statements);
            let mut body = take_statements(cfg, inner);
            delete(cfg, inner);
            let kind = if header.is_empty() {
                InstructionKind::While {
                    label,
                    condition: stay,
                    body,
                }
            } else {
                let leave = make(
                    cfg,
                    start,
                    InstructionKind::If {
                        condition: stay.negate(),
                        then_body: vec![make(cfg, start, InstructionKind::Break(None))],
                        else_body: None,
                    },
                );
                let mut full = header;
                full.push(leave);
                full.append(&mut body);
                InstructionKind::While {
                    label,
                    condition: Expr::BooleanLiteral(true),
                    body: full,
                }
            };
            (kind, exit)
        }
    };
    let statement = match cfg.loops[index].update_len {
        Some(n) => with_update(statement, n),
        None => statement,
    };
    let statement = make(cfg, start, statement);
    cfg.blocks[start].statements = vec![statement];
    become_statement(cfg, start, next);
    cfg.blocks[start].enclosing_loop = parent;
    cfg.loops[index].reduced = true;
    // Blocks created for jumps out of this loop now belong to the parent.
    for block in cfg.blocks.iter_mut() {
        if block.is_live() && block.enclosing_loop == Some(index) {
            block.enclosing_loop = parent;
        }
    }
}

/// Moves the last `n` body statements of a `while` into a `for` update,
/// where `continue` statements jumping to them belong.
fn with_update(kind: InstructionKind, n: usize) -> InstructionKind {
    match kind {
        InstructionKind::While {
            label,
            condition,
            mut body,
        } if body.len() >= n => {
            let update = body.split_off(body.len() - n);
            let condition = match condition {
                Expr::BooleanLiteral(true) => None,
                c => Some(c),
            };
            InstructionKind::For {
                label,
                init: None,
                condition,
                update,
                body,
            }
        }
        other => other,
    }
}

// ============================================================
// Fallback rendering
// ============================================================

fn label_for(cfg: &Cfg, b: BlockIndex) -> String {
    format!("L{}", cfg.blocks[b].from_offset)
}

fn goto_comment(cfg: &Cfg, b: BlockIndex) -> String {
    format!("goto {}", label_for(cfg, b))
}

/// Gives every operand stack slot that crosses a block boundary a
/// variable: exits store into it and entries read from it.
fn bind_stack_temporaries(cfg: &mut Cfg, locals: &mut LocalVariables) {
    let live: Vec<BlockIndex> = cfg.live_blocks().map(|b| b.index).collect();
    let mut temps: Vec<LocalId> = Vec::new();
    for &b in &live {
        for (k, value) in cfg.blocks[b].exit_stack.iter().enumerate() {
            if k >= temps.len() {
                let ty = value.ty(locals);
                temps.push(locals.temporary(ty));
            }
        }
    }
    if temps.is_empty() {
        return;
    }
    let entries: Vec<Expr> = temps.iter().map(|t| Expr::Local(*t)).collect();
    for &b in &live {
        let block = &mut cfg.blocks[b];
        if block.entry_depth > 0 {
            substitute_entries(&mut block.statements, &entries);
            if let Some(c) = block.condition.as_mut() {
                c.substitute_stack(&entries);
            }
            if let Some(s) = block.switch.as_mut() {
                s.selector.substitute_stack(&entries);
            }
            for e in block.exit_stack.iter_mut() {
                e.substitute_stack(&entries);
            }
        }
        let exits = std::mem::take(&mut block.exit_stack);
        for (k, value) in exits.into_iter().enumerate() {
            let value = value.undup();
            // Stable values reach successors verbatim, not through a slot.
            let verbatim = matches!(
                value,
                Expr::This | Expr::UninitNew { .. } | Expr::CaughtException(_)
            );
            if verbatim || value == entries[k] {
                continue;
            }
            let store = make(cfg, b, InstructionKind::Store { local: temps[k], value });
            cfg.blocks[b].statements.push(store);
        }
    }
}

/// Renders the graph one block after another, with jumps as comments.
/// Used when structuring fails and by the linear engine.
pub fn linearize(cfg: &mut Cfg, locals: &mut LocalVariables) -> Vec<Instruction> {
    bind_stack_temporaries(cfg, locals);
    let mut order: Vec<BlockIndex> = cfg.live_blocks().map(|b| b.index).collect();
    order.sort_by_key(|b| (cfg.blocks[*b].from_offset, *b));
    let mut out = Vec::new();
    for (i, &b) in order.iter().enumerate() {
        let following = order.get(i + 1).copied();
        let previous = i.checked_sub(1).map(|p| order[p]);
        let block = &cfg.blocks[b];
        let only_falls_in = block.predecessors.len() == 1
            && previous.map_or(false, |p| {
                cfg.blocks[p].next == Some(b) && cfg.blocks[p].kind == BlockKind::Statement
            });
        if b != 0 && !only_falls_in {
            out.push(make(cfg, b, InstructionKind::Label(label_for(cfg, b))));
        }
        let mut statements = take_statements(cfg, b);
        out.append(&mut statements);
        let block = &cfg.blocks[b];
        match block.kind {
            BlockKind::Conditional => {
                if let (Some(condition), Some(target)) = (block.condition.clone(), block.branch) {
                    let jump = make(cfg, b, InstructionKind::Comment(goto_comment(cfg, target)));
                    out.push(make(
                        cfg,
                        b,
                        InstructionKind::If {
                            condition,
                            then_body: vec![jump],
                            else_body: None,
                        },
                    ));
                }
            }
            BlockKind::Switch => {
                if let Some(switch) = block.switch.clone() {
                    let cases = switch
                        .cases
                        .iter()
                        .map(|(key, target)| SwitchCase {
                            labels: vec![*key],
                            body: vec![make(cfg, b, InstructionKind::Comment(goto_comment(cfg, *target)))],
                        })
                        .collect();
                    out.push(make(
                        cfg,
                        b,
                        InstructionKind::SwitchBlock {
                            selector: switch.selector,
                            cases,
                        },
                    ));
                }
            }
            _ => {}
        }
        if let Some(n) = block.next {
            if Some(n) != following && block.kind != BlockKind::Switch {
                out.push(make(cfg, b, InstructionKind::Comment(goto_comment(cfg, n))));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(kind: InstructionKind) -> Instruction {
        Instruction::new(0, None, kind)
    }

    #[test]
    fn test_finally_pattern() {
        let f = statement(InstructionKind::Expression(Expr::Unresolved("cleanup()".into())));
        let handler = vec![
            statement(InstructionKind::Store {
                local: 3,
                value: Expr::CaughtException(None),
            }),
            f.clone(),
            statement(InstructionKind::Throw(Expr::Local(3))),
        ];
        let (local, body) = finally_pattern(&handler).unwrap();
        assert_eq!(local, 3);
        assert_eq!(body, vec![f]);
    }

    #[test]
    fn test_strip_finally_before_return_and_at_tail() {
        let f = statement(InstructionKind::Expression(Expr::Unresolved("cleanup()".into())));
        let mut body = vec![
            statement(InstructionKind::If {
                condition: Expr::Local(1),
                then_body: vec![f.clone(), statement(InstructionKind::Return(None))],
                else_body: None,
            }),
            statement(InstructionKind::Expression(Expr::Unresolved("work()".into()))),
            f.clone(),
        ];
        strip_finally(&mut body, std::slice::from_ref(&f));
        assert_eq!(body.len(), 2);
        match &body[0].kind {
            InstructionKind::If { then_body, .. } => {
                assert_eq!(then_body, &vec![statement(InstructionKind::Return(None))])
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
