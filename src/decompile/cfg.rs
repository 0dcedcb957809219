//! Control flow graph over the built instructions.
//!
//! Blocks live in an arena and refer to each other by index. Structuring
//! mutates the arena in place: reduced blocks are marked `Deleted` rather
//! than removed, so indices stay stable for the lifetime of the graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::attribute_info::{CodeAttribute, ExceptionEntry};
use crate::code_attribute::Bytecode;
use crate::constant_info::ConstantPool;
use crate::error::{DecompileError, Result};

use super::builder::BuiltCode;
use super::expr::Expr;
use super::instruction::{Instruction, InstructionKind};

pub type BlockIndex = usize;
pub type LoopIndex = usize;
pub type RegionIndex = usize;

/// Offsets that start a basic block.
pub fn leaders(bytecodes: &[Bytecode], exception_table: &[ExceptionEntry]) -> BTreeSet<u32> {
    let mut leaders = BTreeSet::new();
    leaders.insert(0u32);
    for ex in exception_table {
        leaders.insert(u32::from(ex.start_pc));
        leaders.insert(u32::from(ex.end_pc));
        leaders.insert(u32::from(ex.handler_pc));
    }
    for bc in bytecodes {
        let targets = bc.branch_targets();
        if !targets.is_empty() || bc.ends_flow() {
            leaders.insert(bc.offset + bc.length);
        }
        leaders.extend(targets);
    }
    if let Some(last) = bytecodes.last() {
        leaders.remove(&(last.offset + last.length));
    }
    leaders
}

/// Handler entry offsets mapped to the exception pushed on entry.
pub fn handler_types(
    code: &CodeAttribute,
    pool: &ConstantPool,
) -> Result<BTreeMap<u32, Option<String>>> {
    let mut handlers: BTreeMap<u32, Vec<Option<String>>> = BTreeMap::new();
    for ex in &code.exception_table {
        let caught = match ex.catch_type {
            0 => None,
            index => Some(pool.class_name(index)?.to_string()),
        };
        handlers.entry(u32::from(ex.handler_pc)).or_default().push(caught);
    }
    Ok(handlers
        .into_iter()
        .map(|(pc, mut types)| {
            types.dedup();
            let caught = if types.len() == 1 { types.remove(0) } else { None };
            (pc, caught)
        })
        .collect())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// Straight-line code continuing at `next`, or ending flow when `next`
    /// is `None`.
    Statement,
    /// Jumps to `branch` when `condition` holds, to `next` otherwise.
    Conditional,
    Switch,
    Deleted,
}

#[derive(Clone, Debug)]
pub struct SwitchTargets {
    pub selector: Expr,
    /// `None` labels the default target.
    pub cases: Vec<(Option<i32>, BlockIndex)>,
}

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub index: BlockIndex,
    pub kind: BlockKind,
    pub from_offset: u32,
    pub to_offset: u32,
    pub statements: Vec<Instruction>,
    /// Stack depth on entry.
    pub entry_depth: usize,
    /// Values left on the stack at exit.
    pub exit_stack: Vec<Expr>,
    pub condition: Option<Expr>,
    pub next: Option<BlockIndex>,
    pub branch: Option<BlockIndex>,
    pub switch: Option<SwitchTargets>,
    pub predecessors: BTreeSet<BlockIndex>,
    pub enclosing_loop: Option<LoopIndex>,
    pub protected_by: Option<RegionIndex>,
    pub line_number: Option<u16>,
}

impl BasicBlock {
    fn new(index: BlockIndex, from_offset: u32, to_offset: u32) -> Self {
        BasicBlock {
            index,
            kind: BlockKind::Statement,
            from_offset,
            to_offset,
            statements: Vec::new(),
            entry_depth: 0,
            exit_stack: Vec::new(),
            condition: None,
            next: None,
            branch: None,
            switch: None,
            predecessors: BTreeSet::new(),
            enclosing_loop: None,
            protected_by: None,
            line_number: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.kind != BlockKind::Deleted
    }

    /// Normal-flow successors.
    pub fn successors(&self) -> Vec<BlockIndex> {
        let mut out: Vec<BlockIndex> = self.next.iter().chain(self.branch.iter()).copied().collect();
        if let Some(switch) = &self.switch {
            out.extend(switch.cases.iter().map(|(_, b)| *b));
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Redirects every edge to `from` so that it reaches `to` instead.
    pub fn redirect(&mut self, from: BlockIndex, to: BlockIndex) {
        if self.next == Some(from) {
            self.next = Some(to);
        }
        if self.branch == Some(from) {
            self.branch = Some(to);
        }
        if let Some(switch) = &mut self.switch {
            for (_, target) in switch.cases.iter_mut() {
                if *target == from {
                    *target = to;
                }
            }
        }
    }
}

/// A protected range and the handlers guarding it.
#[derive(Clone, Debug)]
pub struct TryRegion {
    pub start: u32,
    pub end: u32,
    /// Caught types (`None` for any) and handler entry block, in handler
    /// order.
    pub handlers: Vec<(Vec<Option<String>>, BlockIndex)>,
    pub entry: BlockIndex,
    pub parent: Option<RegionIndex>,
    pub reduced: bool,
}

impl TryRegion {
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    fn len(&self) -> u32 {
        self.end - self.start
    }
}

#[derive(Clone, Debug)]
pub struct Loop {
    pub start: BlockIndex,
    pub members: BTreeSet<BlockIndex>,
    pub end: Option<BlockIndex>,
    pub parent: Option<LoopIndex>,
    pub label: Option<String>,
    /// Set once a `break` has been synthesized for this loop.
    pub has_breaks: bool,
    /// Trailing statements of the body that `continue` jumps to, once a
    /// `continue` into them has been synthesized. The loop renders as `for`.
    pub update_len: Option<usize>,
    pub reduced: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub regions: Vec<TryRegion>,
    pub loops: Vec<Loop>,
    pub code_length: u32,
}

impl Cfg {
    /// Splits built instructions into blocks at `leaders`.
    pub fn build(
        code: &CodeAttribute,
        pool: &ConstantPool,
        leaders: &BTreeSet<u32>,
        built: BuiltCode,
    ) -> Result<Cfg> {
        let code_length = code.code.len() as u32;
        let starts: Vec<u32> = leaders.iter().copied().filter(|o| *o < code_length).collect();
        let mut cfg = Cfg {
            code_length,
            ..Cfg::default()
        };
        let mut by_offset: BTreeMap<u32, BlockIndex> = BTreeMap::new();
        for (i, start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(code_length);
            let mut block = BasicBlock::new(i, *start, end);
            block.entry_depth = built.entry_depths.get(start).copied().unwrap_or(0);
            block.line_number = code.line_number_at(*start);
            by_offset.insert(*start, i);
            cfg.blocks.push(block);
        }
        let lookup = |offset: u32| -> Result<BlockIndex> {
            by_offset.get(&offset).copied().ok_or_else(|| {
                DecompileError::malformed_class(format!("jump to {offset} is not an instruction boundary"))
            })
        };

        // Terminators: the last branch or switch of each block.
        let mut terminated = vec![false; cfg.blocks.len()];
        for instruction in built.instructions {
            let index = match by_offset.range(..=instruction.offset).next_back() {
                Some((_, index)) => *index,
                None => continue,
            };
            let block = &mut cfg.blocks[index];
            match instruction.kind {
                InstructionKind::Push(value) => block.exit_stack.push(value),
                InstructionKind::Branch(branch) => {
                    terminated[index] = true;
                    let target = lookup(branch.target())?;
                    match branch.condition {
                        Some(condition) => {
                            block.kind = BlockKind::Conditional;
                            block.condition = Some(condition);
                            block.branch = Some(target);
                            block.next = Some(lookup(block.to_offset)?);
                        }
                        None => block.next = Some(target),
                    }
                }
                InstructionKind::Switch(switch) => {
                    terminated[index] = true;
                    let mut cases = Vec::with_capacity(switch.cases.len() + 1);
                    for (key, target) in &switch.cases {
                        cases.push((Some(*key), lookup(*target)?));
                    }
                    cases.push((None, lookup(switch.default_target)?));
                    block.kind = BlockKind::Switch;
                    block.switch = Some(SwitchTargets {
                        selector: switch.selector,
                        cases,
                    });
                }
                _ => {
                    if instruction.ends_flow() {
                        terminated[index] = true;
                    }
                    block.statements.push(instruction);
                }
            }
        }
        for i in 0..cfg.blocks.len() {
            if !terminated[i] {
                let to = cfg.blocks[i].to_offset;
                cfg.blocks[i].next = by_offset.get(&to).copied();
            }
        }

        cfg.build_regions(code, pool, &by_offset)?;
        cfg.compute_predecessors();
        cfg.remove_unreachable();
        cfg.compute_predecessors();
        cfg.find_loops();
        log::debug!(
            "cfg: {} blocks, {} try regions, {} loops",
            cfg.blocks.len(),
            cfg.regions.len(),
            cfg.loops.len()
        );
        Ok(cfg)
    }

    /// Groups exception entries by handler. Each handler guards the union
    /// of its ranges; an any-handler also guards everything up to its own
    /// entry, which covers the copies of the finally body.
    fn build_regions(
        &mut self,
        code: &CodeAttribute,
        pool: &ConstantPool,
        by_offset: &BTreeMap<u32, BlockIndex>,
    ) -> Result<()> {
        let mut per_handler: BTreeMap<u32, (u32, u32, Vec<Option<String>>)> = BTreeMap::new();
        for ex in &code.exception_table {
            let (start, end, handler) = (
                u32::from(ex.start_pc),
                u32::from(ex.end_pc),
                u32::from(ex.handler_pc),
            );
            if start <= handler && handler < end {
                continue;
            }
            let caught = match ex.catch_type {
                0 => None,
                index => Some(pool.class_name(index)?.to_string()),
            };
            let entry = per_handler.entry(handler).or_insert((start, end, Vec::new()));
            entry.0 = entry.0.min(start);
            entry.1 = entry.1.max(end);
            if !entry.2.contains(&caught) {
                entry.2.push(caught);
            }
        }

        let mut grouped: BTreeMap<(u32, u32), Vec<(Vec<Option<String>>, BlockIndex)>> = BTreeMap::new();
        for (handler, (start, mut end, types)) in per_handler {
            if types.iter().any(Option::is_none) && handler > end {
                end = handler;
            }
            let block = by_offset.get(&handler).copied().ok_or_else(|| {
                DecompileError::malformed_class(format!("handler {handler} is not an instruction boundary"))
            })?;
            grouped.entry((start, end)).or_default().push((types, block));
        }

        let mut regions: Vec<TryRegion> = Vec::new();
        for ((start, end), handlers) in grouped {
            let Some(entry) = by_offset.get(&start).copied() else {
                continue;
            };
            regions.push(TryRegion {
                start,
                end,
                handlers,
                entry,
                parent: None,
                reduced: false,
            });
        }
        // Outer regions first.
        regions.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        for i in 0..regions.len() {
            regions[i].parent = (0..i)
                .filter(|&j| {
                    regions[j].start <= regions[i].start
                        && regions[i].end <= regions[j].end
                        && regions[j].len() > regions[i].len()
                })
                .min_by_key(|&j| regions[j].len());
        }
        for block in self.blocks.iter_mut() {
            block.protected_by = regions
                .iter()
                .enumerate()
                .filter(|(_, r)| r.contains(block.from_offset))
                .min_by_key(|(_, r)| r.len())
                .map(|(i, _)| i);
        }
        self.regions = regions;
        Ok(())
    }

    pub fn block(&self, index: BlockIndex) -> &BasicBlock {
        &self.blocks[index]
    }

    pub fn block_mut(&mut self, index: BlockIndex) -> &mut BasicBlock {
        &mut self.blocks[index]
    }

    pub fn live_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|b| b.is_live())
    }

    pub fn live_count(&self) -> usize {
        self.live_blocks().count()
    }

    pub fn edge_count(&self) -> usize {
        self.live_blocks().map(|b| b.successors().len()).sum()
    }

    /// Handler blocks of unreduced regions entered from `index`.
    pub fn handler_successors(&self, index: BlockIndex) -> Vec<BlockIndex> {
        self.regions
            .iter()
            .filter(|r| !r.reduced && r.entry == index)
            .flat_map(|r| r.handlers.iter().map(|(_, h)| *h))
            .collect()
    }

    pub fn is_handler(&self, index: BlockIndex) -> bool {
        self.regions
            .iter()
            .any(|r| !r.reduced && r.handlers.iter().any(|(_, h)| *h == index))
    }

    pub fn is_region_entry(&self, index: BlockIndex) -> bool {
        self.regions.iter().any(|r| !r.reduced && r.entry == index)
    }

    /// Whether `index` heads a loop that has not been structured yet.
    pub fn is_loop_start(&self, index: BlockIndex) -> bool {
        self.loops.iter().any(|l| !l.reduced && l.start == index)
    }

    pub fn compute_predecessors(&mut self) {
        for block in self.blocks.iter_mut() {
            block.predecessors.clear();
        }
        let mut edges = Vec::new();
        for block in self.live_blocks() {
            for s in block.successors() {
                edges.push((block.index, s));
            }
            for h in self.handler_successors(block.index) {
                edges.push((block.index, h));
            }
        }
        for (from, to) in edges {
            self.blocks[to].predecessors.insert(from);
        }
    }

    fn all_successors(&self, index: BlockIndex) -> Vec<BlockIndex> {
        let mut out = self.blocks[index].successors();
        out.extend(self.handler_successors(index));
        out
    }

    fn remove_unreachable(&mut self) {
        if self.blocks.is_empty() {
            return;
        }
        let mut seen = vec![false; self.blocks.len()];
        let mut work = vec![0];
        while let Some(b) = work.pop() {
            if std::mem::replace(&mut seen[b], true) {
                continue;
            }
            work.extend(self.all_successors(b));
        }
        for (i, reachable) in seen.into_iter().enumerate() {
            if !reachable {
                log::debug!("block at {} is unreachable", self.blocks[i].from_offset);
                self.blocks[i].kind = BlockKind::Deleted;
            }
        }
    }

    /// Reverse postorder of live blocks reachable from the entry.
    pub fn reverse_postorder(&self) -> Vec<BlockIndex> {
        let mut order = Vec::new();
        if self.blocks.is_empty() {
            return order;
        }
        let mut seen = vec![false; self.blocks.len()];
        let mut stack: Vec<(BlockIndex, usize)> = vec![(0, 0)];
        seen[0] = true;
        while let Some((b, i)) = stack.pop() {
            let succs = self.all_successors(b);
            if let Some(&s) = succs.get(i) {
                stack.push((b, i + 1));
                if !seen[s] {
                    seen[s] = true;
                    stack.push((s, 0));
                }
            } else {
                order.push(b);
            }
        }
        order.reverse();
        order
    }

    /// Immediate dominators, by the iterative algorithm of Cooper, Harvey
    /// and Kennedy. Unreachable blocks map to `None`.
    pub fn dominators(&self) -> Vec<Option<BlockIndex>> {
        let order = self.reverse_postorder();
        let mut rank = vec![usize::MAX; self.blocks.len()];
        for (i, b) in order.iter().enumerate() {
            rank[*b] = i;
        }
        let mut idom: Vec<Option<BlockIndex>> = vec![None; self.blocks.len()];
        if order.is_empty() {
            return idom;
        }
        idom[order[0]] = Some(order[0]);
        let intersect = |idom: &[Option<BlockIndex>], mut a: BlockIndex, mut b: BlockIndex| {
            while a != b {
                while rank[a] > rank[b] {
                    a = idom[a].unwrap_or(order[0]);
                }
                while rank[b] > rank[a] {
                    b = idom[b].unwrap_or(order[0]);
                }
            }
            a
        };
        let mut changed = true;
        while changed {
            changed = false;
            for &b in order.iter().skip(1) {
                let mut new_idom: Option<BlockIndex> = None;
                for &p in &self.blocks[b].predecessors {
                    if idom[p].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(current) => intersect(&idom, p, current),
                    });
                }
                if new_idom.is_some() && idom[b] != new_idom {
                    idom[b] = new_idom;
                    changed = true;
                }
            }
        }
        idom
    }

    pub fn dominates(idom: &[Option<BlockIndex>], a: BlockIndex, mut b: BlockIndex) -> bool {
        loop {
            if a == b {
                return true;
            }
            match idom[b] {
                Some(d) if d != b => b = d,
                _ => return false,
            }
        }
    }

    /// Natural loops: one per header, members gathered backwards from each
    /// back-edge source.
    fn find_loops(&mut self) {
        let idom = self.dominators();
        let mut back_edges: BTreeMap<BlockIndex, Vec<BlockIndex>> = BTreeMap::new();
        for block in self.live_blocks() {
            for s in self.all_successors(block.index) {
                if idom[block.index].is_some() && Self::dominates(&idom, s, block.index) {
                    back_edges.entry(s).or_default().push(block.index);
                }
            }
        }
        let mut loops = Vec::new();
        for (start, sources) in back_edges {
            let mut members = BTreeSet::from([start]);
            let mut work = sources;
            while let Some(b) = work.pop() {
                if members.insert(b) {
                    work.extend(self.blocks[b].predecessors.iter().copied());
                }
            }
            loops.push(Loop {
                start,
                end: self.loop_end(start, &members),
                members,
                parent: None,
                label: None,
                has_breaks: false,
                update_len: None,
                reduced: false,
            });
        }
        for i in 0..loops.len() {
            loops[i].parent = (0..loops.len())
                .filter(|&j| {
                    j != i
                        && loops[j].members.len() > loops[i].members.len()
                        && loops[i].members.is_subset(&loops[j].members)
                })
                .min_by_key(|&j| loops[j].members.len());
        }
        for block in self.blocks.iter_mut() {
            block.enclosing_loop = loops
                .iter()
                .enumerate()
                .filter(|(_, l)| l.members.contains(&block.index))
                .min_by_key(|(_, l)| l.members.len())
                .map(|(i, _)| i);
        }
        self.loops = loops;
    }

    fn loop_end(&self, start: BlockIndex, members: &BTreeSet<BlockIndex>) -> Option<BlockIndex> {
        let header = &self.blocks[start];
        if header.kind == BlockKind::Conditional {
            let outside: Vec<BlockIndex> = header
                .successors()
                .into_iter()
                .filter(|s| !members.contains(s))
                .collect();
            if outside.len() == 1 {
                return Some(outside[0]);
            }
        }
        let max_offset = members
            .iter()
            .map(|m| self.blocks[*m].from_offset)
            .max()
            .unwrap_or(0);
        let exits: BTreeSet<BlockIndex> = members
            .iter()
            .flat_map(|m| self.blocks[*m].successors())
            .filter(|s| !members.contains(s))
            .collect();
        exits
            .iter()
            .copied()
            .filter(|e| self.blocks[*e].from_offset > max_offset)
            .min_by_key(|e| self.blocks[*e].from_offset)
    }

    /// Loops enclosing `index`, innermost first.
    pub fn loop_chain(&self, index: BlockIndex) -> Vec<LoopIndex> {
        let mut chain = Vec::new();
        let mut current = self.blocks[index].enclosing_loop;
        while let Some(l) = current {
            chain.push(l);
            current = self.loops[l].parent;
        }
        chain
    }

    /// Appends a fresh statement block holding `statements` that ends flow.
    pub fn add_block(&mut self, after: BlockIndex, statements: Vec<Instruction>) -> BlockIndex {
        let index = self.blocks.len();
        let template = &self.blocks[after];
        let mut block = BasicBlock::new(index, template.to_offset, template.to_offset);
        block.statements = statements;
        block.enclosing_loop = template.enclosing_loop;
        block.protected_by = template.protected_by;
        block.line_number = template.line_number;
        self.blocks.push(block);
        index
    }
}
