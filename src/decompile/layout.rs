//! Line layout of the printed source.
//!
//! The writer produces a flat list of [`Fragment`]s: printed lines,
//! indentation changes and [`LayoutBlock`] spacers. A spacer stands for a
//! run of blank lines whose length may vary between its minimum and
//! maximum. When line numbers are realigned, [`fit`] sizes the spacers so
//! each statement lands on its original source line where possible.

use crate::printer::{statement_line, Printer, Token};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutTag {
    /// Between the package clause, the imports and the type.
    Section,
    /// Between two members of a type body.
    Member,
    /// After the opening brace of a type or method body.
    BodyStart,
    /// Before the closing brace of a type or method body.
    BodyEnd,
    /// Between two statements.
    Statement,
    /// Before the metadata trailer.
    Trailer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutBlock {
    pub tag: LayoutTag,
    pub min: u32,
    pub preferred: u32,
    /// `None` is unlimited.
    pub max: Option<u32>,
    pub assigned: u32,
    /// Nesting depth. Deeper blocks give up their lines first.
    pub depth: usize,
}

impl LayoutBlock {
    /// A block with bounds clamped so `min <= preferred <= max`.
    pub fn new(tag: LayoutTag, min: u32, preferred: u32, max: Option<u32>, depth: usize) -> Self {
        let max = max.map(|m| m.max(min));
        let preferred = match max {
            Some(m) => preferred.clamp(min, m),
            None => preferred.max(min),
        };
        LayoutBlock {
            tag,
            min,
            preferred,
            max,
            assigned: preferred,
            depth,
        }
    }

    pub fn for_tag(tag: LayoutTag, depth: usize) -> Self {
        match tag {
            LayoutTag::Section | LayoutTag::Member | LayoutTag::Trailer => LayoutBlock::new(tag, 0, 1, None, depth),
            LayoutTag::BodyStart | LayoutTag::BodyEnd | LayoutTag::Statement => {
                LayoutBlock::new(tag, 0, 0, None, depth)
            }
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        self.min <= self.assigned && self.max.map_or(true, |m| self.assigned <= m)
    }

    fn headroom(&self) -> u32 {
        self.max.map_or(u32::MAX, |m| m.saturating_sub(self.assigned))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    /// One printed line.
    Line(Vec<Token>),
    Indent,
    Unindent,
    Spacer(LayoutBlock),
}

/// Largest source line claimed by any printed statement.
pub fn max_line_number(fragments: &[Fragment]) -> u32 {
    fragments
        .iter()
        .filter_map(|f| match f {
            Fragment::Line(tokens) => statement_line(tokens),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

/// Assigns a line count to every spacer. Without realignment each spacer
/// takes its preferred count. With it, the spacers between two anchored
/// lines share the gap between their source lines: preferred counts are
/// shrunk innermost first when they overflow it and the outermost spacers
/// absorb what is left over. No spacer leaves its bounds.
pub fn fit(fragments: &mut [Fragment], realign: bool) {
    for fragment in fragments.iter_mut() {
        if let Fragment::Spacer(block) = fragment {
            block.assigned = block.preferred;
        }
    }
    if !realign {
        return;
    }
    // Output line of the last anchored line; the virtual start is line 0.
    let mut placed = 0u32;
    let mut unanchored = 0u32;
    let mut segment: Vec<usize> = Vec::new();
    for i in 0..fragments.len() {
        let anchor = match &fragments[i] {
            Fragment::Spacer(_) => {
                segment.push(i);
                continue;
            }
            Fragment::Line(tokens) => statement_line(tokens),
            Fragment::Indent | Fragment::Unindent => continue,
        };
        match anchor {
            None => unanchored += 1,
            Some(line) => {
                let available = line.saturating_sub(placed + unanchored + 1);
                let used = distribute(fragments, &segment, available);
                placed += unanchored + used + 1;
                unanchored = 0;
                segment.clear();
            }
        }
    }
}

/// Sizes the spacers at `indices` toward a total of `available` lines and
/// returns the total actually assigned.
fn distribute(fragments: &mut [Fragment], indices: &[usize], available: u32) -> u32 {
    let mut blocks: Vec<&mut LayoutBlock> = Vec::with_capacity(indices.len());
    for (i, fragment) in fragments.iter_mut().enumerate() {
        if let Fragment::Spacer(block) = fragment {
            if indices.binary_search(&i).is_ok() {
                blocks.push(block);
            }
        }
    }
    let total: u32 = blocks.iter().map(|b| b.assigned).sum();

    if total > available {
        let mut excess = total - available;
        // Deepest first; among equals the later block gives way first.
        let mut order: Vec<usize> = (0..blocks.len()).collect();
        order.sort_by(|a, b| blocks[*b].depth.cmp(&blocks[*a].depth).then(b.cmp(a)));
        for i in order {
            if excess == 0 {
                break;
            }
            let give = (blocks[i].assigned - blocks[i].min).min(excess);
            blocks[i].assigned -= give;
            excess -= give;
        }
    } else if total < available {
        let mut missing = available - total;
        let mut order: Vec<usize> = (0..blocks.len()).collect();
        order.sort_by(|a, b| blocks[*a].depth.cmp(&blocks[*b].depth).then(b.cmp(a)));
        for i in order {
            if missing == 0 {
                break;
            }
            let take = blocks[i].headroom().min(missing);
            blocks[i].assigned += take;
            missing -= take;
        }
    }
    blocks.iter().map(|b| b.assigned).sum()
}

/// Sends the laid out fragments to `printer`.
pub fn write(fragments: &[Fragment], printer: &mut dyn Printer) {
    for fragment in fragments {
        match fragment {
            Fragment::Line(tokens) => {
                printer.start_line(statement_line(tokens));
                for token in tokens {
                    token.emit(printer);
                }
                printer.end_line();
            }
            Fragment::Indent => printer.indent(),
            Fragment::Unindent => printer.unindent(),
            Fragment::Spacer(block) => {
                if block.assigned > 0 {
                    printer.extra_line(block.assigned);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::Marker;

    fn anchored(line: u32) -> Fragment {
        Fragment::Line(vec![
            Token::Start(Marker::Statement),
            Token::LineNumber(line),
            Token::text("s();"),
            Token::End(Marker::Statement),
        ])
    }

    fn plain() -> Fragment {
        Fragment::Line(vec![Token::text("}")])
    }

    fn spacer(tag: LayoutTag, depth: usize) -> Fragment {
        Fragment::Spacer(LayoutBlock::for_tag(tag, depth))
    }

    fn assigned(fragments: &[Fragment]) -> Vec<u32> {
        fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Spacer(b) => Some(b.assigned),
                _ => None,
            })
            .collect()
    }

    fn all_within_bounds(fragments: &[Fragment]) -> bool {
        fragments.iter().all(|f| match f {
            Fragment::Spacer(b) => b.is_within_bounds(),
            _ => true,
        })
    }

    #[test]
    fn test_new_clamps_preferred() {
        let b = LayoutBlock::new(LayoutTag::Member, 1, 5, Some(3), 0);
        assert_eq!((b.min, b.preferred, b.max), (1, 3, Some(3)));
        let b = LayoutBlock::new(LayoutTag::Member, 2, 0, None, 0);
        assert_eq!(b.preferred, 2);
        let b = LayoutBlock::new(LayoutTag::Member, 4, 4, Some(1), 0);
        assert!(b.is_within_bounds());
    }

    #[test]
    fn test_preferred_without_realign() {
        let mut fragments = vec![
            spacer(LayoutTag::Section, 0),
            anchored(40),
            spacer(LayoutTag::Statement, 2),
            anchored(1),
        ];
        fit(&mut fragments, false);
        assert_eq!(assigned(&fragments), vec![1, 0]);
    }

    #[test]
    fn test_grow_to_reach_source_lines() {
        let mut fragments = vec![
            plain(),
            spacer(LayoutTag::Member, 1),
            spacer(LayoutTag::BodyStart, 2),
            anchored(5),
            spacer(LayoutTag::Statement, 2),
            anchored(8),
        ];
        fit(&mut fragments, true);
        // line 1 is "}", then three blank lines put the statement on line 5.
        assert_eq!(assigned(&fragments), vec![3, 0, 2]);
        assert!(all_within_bounds(&fragments));
    }

    #[test]
    fn test_shrink_innermost_first() {
        let mut fragments = vec![
            anchored(1),
            spacer(LayoutTag::Member, 1),
            Fragment::Spacer(LayoutBlock::new(LayoutTag::BodyStart, 0, 2, None, 2)),
            anchored(3),
        ];
        fit(&mut fragments, true);
        // One line is available: the inner block gives up both of its lines
        // before the outer one gives up any.
        assert_eq!(assigned(&fragments), vec![1, 0]);
    }

    #[test]
    fn test_never_below_minimum() {
        let mut fragments = vec![
            anchored(10),
            Fragment::Spacer(LayoutBlock::new(LayoutTag::Member, 2, 3, Some(4), 1)),
            Fragment::Spacer(LayoutBlock::new(LayoutTag::BodyEnd, 1, 1, Some(1), 2)),
            anchored(4),
            Fragment::Spacer(LayoutBlock::new(LayoutTag::Statement, 0, 0, Some(2), 2)),
            anchored(30),
        ];
        fit(&mut fragments, true);
        assert_eq!(assigned(&fragments), vec![2, 1, 2]);
        assert!(all_within_bounds(&fragments));
    }

    #[test]
    fn test_bounds_hold_for_mixed_layouts() {
        let tags = [
            LayoutTag::Section,
            LayoutTag::Member,
            LayoutTag::BodyStart,
            LayoutTag::BodyEnd,
            LayoutTag::Statement,
            LayoutTag::Trailer,
        ];
        for seed in 0u32..64 {
            let mut fragments = Vec::new();
            let mut line = 1 + seed % 3;
            for i in 0..24u32 {
                let k = (seed.wrapping_mul(31) + i * 17) % 7;
                match k {
                    0 | 1 => {
                        line = if k == 0 { line + (i % 5) } else { line.saturating_sub(2) };
                        fragments.push(anchored(line));
                    }
                    2 => fragments.push(plain()),
                    _ => {
                        let tag = tags[((seed + i) % 6) as usize];
                        let min = (i + seed) % 2;
                        let max = if k == 3 { Some(min + i % 3) } else { None };
                        fragments.push(Fragment::Spacer(LayoutBlock::new(tag, min, 1 + i % 2, max, (k as usize) % 3)));
                    }
                }
            }
            fit(&mut fragments, true);
            assert!(all_within_bounds(&fragments), "seed {seed}");
        }
    }
}
