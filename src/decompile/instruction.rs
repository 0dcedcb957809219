use super::descriptor::Type;
use super::expr::Expr;
use super::locals::LocalId;

/// One statement-level node. Offsets and line numbers are metadata: two
/// instructions compare equal when their kinds do.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub offset: u32,
    pub line_number: Option<u16>,
    pub kind: InstructionKind,
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

/// A conditional or unconditional jump. The target is `offset + delta`.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchInstruction {
    pub offset: u32,
    pub delta: i32,
    /// Jump taken when this holds; `None` for `goto`.
    pub condition: Option<Expr>,
}

impl BranchInstruction {
    pub fn target(&self) -> u32 {
        (self.offset as i64 + self.delta as i64) as u32
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchInstruction {
    pub selector: Expr,
    pub default_target: u32,
    pub cases: Vec<(i32, u32)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    /// `None` is the `default` label.
    pub labels: Vec<Option<i32>>,
    pub body: Vec<Instruction>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    pub types: Vec<String>,
    pub local: Option<LocalId>,
    pub body: Vec<Instruction>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstructionKind {
    // --- Bytecode level ---
    Store { local: LocalId, value: Expr },
    FieldStore {
        object: Option<Expr>,
        owner: String,
        name: String,
        ty: Type,
        value: Expr,
    },
    ArrayStore { array: Expr, index: Expr, value: Expr },
    Expression(Expr),
    Return(Option<Expr>),
    Throw(Expr),
    MonitorEnter(Expr),
    MonitorExit(Expr),
    /// A value still on the operand stack at the end of a block.
    Push(Expr),
    Branch(BranchInstruction),
    Switch(SwitchInstruction),

    // --- Reconstructed ("fast") nodes ---
    Declaration { local: LocalId, value: Option<Expr> },
    If {
        condition: Expr,
        then_body: Vec<Instruction>,
        else_body: Option<Vec<Instruction>>,
    },
    While {
        label: Option<String>,
        condition: Expr,
        body: Vec<Instruction>,
    },
    DoWhile {
        label: Option<String>,
        body: Vec<Instruction>,
        condition: Expr,
    },
    For {
        label: Option<String>,
        init: Option<Box<Instruction>>,
        condition: Option<Expr>,
        update: Vec<Instruction>,
        body: Vec<Instruction>,
    },
    SwitchBlock { selector: Expr, cases: Vec<SwitchCase> },
    Try {
        body: Vec<Instruction>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Instruction>>,
    },
    Synchronized { monitor: Expr, body: Vec<Instruction> },
    Assert { condition: Expr, message: Option<Expr> },
    Break(Option<String>),
    Continue(Option<String>),
    /// Target marker used by the unstructured fallback rendering.
    Label(String),
    Comment(String),
}

impl Instruction {
    pub fn new(offset: u32, line_number: Option<u16>, kind: InstructionKind) -> Self {
        Instruction {
            offset,
            line_number,
            kind,
        }
    }

    /// True for statements after which control never falls through.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Return(_)
                | InstructionKind::Throw(_)
                | InstructionKind::Break(_)
                | InstructionKind::Continue(_)
        )
    }

    /// Expressions directly owned by this node, excluding nested bodies.
    pub fn expressions(&self) -> Vec<&Expr> {
        use InstructionKind::*;
        match &self.kind {
            Store { value, .. } | Push(value) => vec![value],
            FieldStore { object, value, .. } => object.iter().chain(std::iter::once(value)).collect(),
            ArrayStore {
                array,
                index,
                value,
            } => vec![array, index, value],
            Expression(e) | Throw(e) | MonitorEnter(e) | MonitorExit(e) => vec![e],
            Return(e) => e.iter().collect(),
            Branch(b) => b.condition.iter().collect(),
            Switch(s) => vec![&s.selector],
            Declaration { value, .. } => value.iter().collect(),
            If { condition, .. } | While { condition, .. } | DoWhile { condition, .. } => {
                vec![condition]
            }
            For { condition, .. } => condition.iter().collect(),
            SwitchBlock { selector, .. } => vec![selector],
            Synchronized { monitor, .. } => vec![monitor],
            Assert { condition, message } => std::iter::once(condition).chain(message.iter()).collect(),
            Try { .. } | Break(_) | Continue(_) | Label(_) | Comment(_) => Vec::new(),
        }
    }

    pub fn expressions_mut(&mut self) -> Vec<&mut Expr> {
        use InstructionKind::*;
        match &mut self.kind {
            Store { value, .. } | Push(value) => vec![value],
            FieldStore { object, value, .. } => {
                let mut v: Vec<&mut Expr> = object.iter_mut().collect();
                v.push(value);
                v
            }
            ArrayStore {
                array,
                index,
                value,
            } => vec![array, index, value],
            Expression(e) | Throw(e) | MonitorEnter(e) | MonitorExit(e) => vec![e],
            Return(e) => e.iter_mut().collect(),
            Branch(b) => b.condition.iter_mut().collect(),
            Switch(s) => vec![&mut s.selector],
            Declaration { value, .. } => value.iter_mut().collect(),
            If { condition, .. } | While { condition, .. } | DoWhile { condition, .. } => {
                vec![condition]
            }
            For { condition, .. } => condition.iter_mut().collect(),
            SwitchBlock { selector, .. } => vec![selector],
            Synchronized { monitor, .. } => vec![monitor],
            Assert { condition, message } => {
                let mut v = vec![condition];
                v.extend(message.iter_mut());
                v
            }
            Try { .. } | Break(_) | Continue(_) | Label(_) | Comment(_) => Vec::new(),
        }
    }

    /// Nested statement lists, in source order.
    pub fn bodies(&self) -> Vec<&Vec<Instruction>> {
        use InstructionKind::*;
        match &self.kind {
            If {
                then_body,
                else_body,
                ..
            } => std::iter::once(then_body).chain(else_body.iter()).collect(),
            While { body, .. } | DoWhile { body, .. } | Synchronized { body, .. } => vec![body],
            For { update, body, .. } => vec![body, update],
            SwitchBlock { cases, .. } => cases.iter().map(|c| &c.body).collect(),
            Try {
                body,
                catches,
                finally,
            } => std::iter::once(body)
                .chain(catches.iter().map(|c| &c.body))
                .chain(finally.iter())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<Instruction>> {
        use InstructionKind::*;
        match &mut self.kind {
            If {
                then_body,
                else_body,
                ..
            } => {
                let mut v = vec![then_body];
                v.extend(else_body.iter_mut());
                v
            }
            While { body, .. } | DoWhile { body, .. } | Synchronized { body, .. } => vec![body],
            For { update, body, .. } => vec![body, update],
            SwitchBlock { cases, .. } => cases.iter_mut().map(|c| &mut c.body).collect(),
            Try {
                body,
                catches,
                finally,
            } => {
                let mut v = vec![body];
                v.extend(catches.iter_mut().map(|c| &mut c.body));
                v.extend(finally.iter_mut());
                v
            }
            _ => Vec::new(),
        }
    }

    /// Applies `f` to every expression in this node and its nested bodies.
    pub fn walk_expressions_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        for e in self.expressions_mut() {
            e.walk_mut(f);
        }
        if let InstructionKind::For { init: Some(init), .. } = &mut self.kind {
            init.walk_expressions_mut(f);
        }
        for body in self.bodies_mut() {
            for instruction in body.iter_mut() {
                instruction.walk_expressions_mut(f);
            }
        }
    }

    /// Whether `local` is read or written anywhere in this node.
    pub fn references_local(&self, local: LocalId) -> bool {
        use InstructionKind::*;
        let direct = match &self.kind {
            Store { local: l, .. } | Declaration { local: l, .. } => *l == local,
            Try { catches, .. } => catches.iter().any(|c| c.local == Some(local)),
            For { init: Some(init), .. } => init.references_local(local),
            _ => false,
        };
        direct
            || self.expressions().iter().any(|e| e.references_local(local))
            || self
                .bodies()
                .iter()
                .any(|body| body.iter().any(|i| i.references_local(local)))
    }

    /// Like `references_local`, restricted to this node's own expressions
    /// and header, not its nested bodies.
    pub fn header_references_local(&self, local: LocalId) -> bool {
        use InstructionKind::*;
        let direct = match &self.kind {
            Store { local: l, .. } | Declaration { local: l, .. } => *l == local,
            Try { catches, .. } => catches.iter().any(|c| c.local == Some(local)),
            For { init: Some(init), .. } => init.references_local(local),
            _ => false,
        };
        direct || self.expressions().iter().any(|e| e.references_local(local))
    }

    /// Counts nodes of the given shape anywhere below and including `self`.
    pub fn count(&self, predicate: &dyn Fn(&InstructionKind) -> bool) -> usize {
        let own = usize::from(predicate(&self.kind));
        let nested: usize = self
            .bodies()
            .iter()
            .flat_map(|b| b.iter())
            .map(|i| i.count(predicate))
            .sum();
        own + nested
    }
}

/// Counts matching nodes in a statement list.
pub fn count_in(list: &[Instruction], predicate: &dyn Fn(&InstructionKind) -> bool) -> usize {
    list.iter().map(|i| i.count(predicate)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_offsets() {
        let a = Instruction::new(3, Some(10), InstructionKind::Return(None));
        let b = Instruction::new(40, None, InstructionKind::Return(None));
        assert_eq!(a, b);
    }

    #[test]
    fn test_branch_target() {
        let branch = BranchInstruction {
            offset: 20,
            delta: -12,
            condition: None,
        };
        assert_eq!(branch.target(), 8);
    }

    #[test]
    fn test_references_in_nested_body() {
        let inner = Instruction::new(
            4,
            None,
            InstructionKind::Store {
                local: 2,
                value: Expr::IntLiteral(1),
            },
        );
        let outer = Instruction::new(
            0,
            None,
            InstructionKind::If {
                condition: Expr::Local(1),
                then_body: vec![inner],
                else_body: None,
            },
        );
        assert!(outer.references_local(2));
        assert!(!outer.header_references_local(2));
        assert!(outer.header_references_local(1));
    }
}
