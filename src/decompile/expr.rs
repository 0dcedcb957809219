use super::descriptor::{PrimitiveFlags, Type};
use super::locals::{LocalId, LocalVariables};

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, Rem,
    Shl, Shr, Ushr,
    And, Or, Xor,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 12,
            BinaryOp::Add | BinaryOp::Sub => 11,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => 10,
            BinaryOp::And => 7,
            BinaryOp::Xor => 6,
            BinaryOp::Or => 5,
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    /// Logical `!`.
    Not,
    /// Bitwise `~`.
    BitNot,
}

/// Short-circuit operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq, Ne, Lt, Ge, Gt, Le,
}

impl CompareOp {
    /// Returns the negated comparison.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    /// Java source token for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
        }
    }
}

/// Method invocation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Compare instruction kinds (for lcmp, fcmpl, etc.)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpKind {
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
}

/// Expression tree node. Sub-expressions are owned by their parent.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    // --- Literals ---
    IntLiteral(i32),
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    BooleanLiteral(bool),
    CharLiteral(u16),
    StringLiteral(String),
    ClassLiteral(Type),
    NullLiteral,

    // --- Variables ---
    Local(LocalId),
    This,

    // --- Operations ---
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    /// Result of lcmp/fcmpl/fcmpg/dcmpl/dcmpg: -1, 0, or 1
    CmpResult { kind: CmpKind, left: Box<Expr>, right: Box<Expr> },
    Cast { ty: Type, operand: Box<Expr> },
    InstanceOf { operand: Box<Expr>, ty: Type },

    // --- Member access ---
    Field {
        object: Option<Box<Expr>>,
        owner: String,
        name: String,
        ty: Type,
    },
    Invoke {
        kind: InvokeKind,
        object: Option<Box<Expr>>,
        owner: String,
        name: String,
        descriptor: String,
        args: Vec<Expr>,
        return_type: Type,
    },
    /// A call site bound at run time. `method_ref` is the implementation
    /// method (`owner`, `name`) when the bootstrap is a lambda factory.
    InvokeDynamic {
        name: String,
        descriptor: String,
        args: Vec<Expr>,
        return_type: Type,
        method_ref: Option<(String, String)>,
    },

    // --- Object creation ---
    New { ty: Type, descriptor: String, args: Vec<Expr> },
    /// `new` before its constructor has run.
    UninitNew { owner: String },
    /// `ty` is the full array type; one length per allocated dimension.
    NewArray { ty: Type, dimensions: Vec<Expr> },
    ArrayInit { ty: Type, values: Vec<Expr> },
    ArrayLoad { array: Box<Expr>, index: Box<Expr>, ty: Type },
    ArrayLength(Box<Expr>),

    // --- Synthesized ---
    Ternary { condition: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    /// `target = value` or `target op= value` used as a value.
    Assign { target: Box<Expr>, op: Option<BinaryOp>, value: Box<Expr> },
    /// `i++`, `--i` and friends.
    Increment { target: Box<Expr>, delta: i32, prefix: bool },

    // --- Stack bookkeeping (resolved during structuring) ---
    /// The k-th value on the operand stack when a block is entered.
    StackEntry(usize),
    /// The exception pushed on entry to a handler.
    CaughtException(Option<String>),
    /// Lower copy left behind by `dup`.
    Dup(Box<Expr>),

    // --- Fallback ---
    Unresolved(String),
}

impl Expr {
    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }

    /// Removes `Dup` wrappers.
    pub fn undup(self) -> Expr {
        match self {
            Expr::Dup(inner) => inner.undup(),
            other => other,
        }
    }

    pub fn is_dup_of(&self, other: &Expr) -> bool {
        matches!(self, Expr::Dup(inner) if inner.as_ref() == other)
    }

    /// Logical negation, pushing `!` through comparisons and De Morgan.
    pub fn negate(self) -> Expr {
        match self {
            Expr::Compare { op, left, right } => Expr::Compare {
                op: op.negate(),
                left,
                right,
            },
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => *operand,
            Expr::BooleanLiteral(b) => Expr::BooleanLiteral(!b),
            Expr::Logical { op, left, right } => Expr::Logical {
                op: match op {
                    LogicalOp::And => LogicalOp::Or,
                    LogicalOp::Or => LogicalOp::And,
                },
                left: left.negate().boxed(),
                right: right.negate().boxed(),
            },
            other => Expr::Unary {
                op: UnaryOp::Not,
                operand: other.boxed(),
            },
        }
    }

    /// Whether evaluating the expression can have an observable effect.
    pub fn has_side_effects(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(
                e,
                Expr::Invoke { .. }
                    | Expr::InvokeDynamic { .. }
                    | Expr::New { .. }
                    | Expr::Assign { .. }
                    | Expr::Increment { .. }
                    | Expr::Unresolved(_)
            ) {
                found = true;
            }
        });
        found
    }

    /// Pre-order traversal.
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Post-order mutable traversal.
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        for child in self.children_mut() {
            child.walk_mut(f);
        }
        f(self);
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Binary { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right, .. } => vec![left, right],
            Expr::Unary { operand, .. }
            | Expr::Cast { operand, .. }
            | Expr::InstanceOf { operand, .. } => vec![operand],
            Expr::Field { object, .. } => object.iter().map(|o| o.as_ref()).collect(),
            Expr::Invoke { object, args, .. } => {
                let mut v: Vec<&Expr> = object.iter().map(|o| o.as_ref()).collect();
                v.extend(args.iter());
                v
            }
            Expr::InvokeDynamic { args, .. } | Expr::New { args, .. } => args.iter().collect(),
            Expr::NewArray { dimensions, .. } => dimensions.iter().collect(),
            Expr::ArrayInit { values, .. } => values.iter().collect(),
            Expr::ArrayLoad { array, index, .. } => vec![array, index],
            Expr::ArrayLength(inner) | Expr::Dup(inner) => vec![inner],
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => vec![condition, then_expr, else_expr],
            Expr::Assign { target, value, .. } => vec![target, value],
            Expr::Increment { target, .. } => vec![target],
            _ => Vec::new(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Binary { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::Unary { operand, .. }
            | Expr::Cast { operand, .. }
            | Expr::InstanceOf { operand, .. } => vec![operand.as_mut()],
            Expr::Field { object, .. } => object.iter_mut().map(|o| o.as_mut()).collect(),
            Expr::Invoke { object, args, .. } => {
                let mut v: Vec<&mut Expr> = object.iter_mut().map(|o| o.as_mut()).collect();
                v.extend(args.iter_mut());
                v
            }
            Expr::InvokeDynamic { args, .. } | Expr::New { args, .. } => args.iter_mut().collect(),
            Expr::NewArray { dimensions, .. } => dimensions.iter_mut().collect(),
            Expr::ArrayInit { values, .. } => values.iter_mut().collect(),
            Expr::ArrayLoad { array, index, .. } => vec![array.as_mut(), index.as_mut()],
            Expr::ArrayLength(inner) | Expr::Dup(inner) => vec![inner.as_mut()],
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => vec![condition.as_mut(), then_expr.as_mut(), else_expr.as_mut()],
            Expr::Assign { target, value, .. } => vec![target.as_mut(), value.as_mut()],
            Expr::Increment { target, .. } => vec![target.as_mut()],
            _ => Vec::new(),
        }
    }

    pub fn references_local(&self, local: LocalId) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if *e == Expr::Local(local) {
                found = true;
            }
        });
        found
    }

    pub fn contains_stack_entry(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::StackEntry(_)) {
                found = true;
            }
        });
        found
    }

    /// Replaces `StackEntry(k)` with `values[k]`. Entries past the end are
    /// left in place.
    pub fn substitute_stack(&mut self, values: &[Expr]) {
        self.walk_mut(&mut |e| {
            if let Expr::StackEntry(k) = e {
                if let Some(v) = values.get(*k) {
                    *e = v.clone();
                }
            }
        });
    }

    /// Best-effort static type.
    pub fn ty(&self, locals: &LocalVariables) -> Type {
        match self {
            Expr::IntLiteral(_) | Expr::CmpResult { .. } | Expr::ArrayLength(_) => Type::INT,
            Expr::LongLiteral(_) => Type::LONG,
            Expr::FloatLiteral(_) => Type::FLOAT,
            Expr::DoubleLiteral(_) => Type::DOUBLE,
            Expr::CharLiteral(_) => Type::CHAR,
            Expr::BooleanLiteral(_)
            | Expr::Compare { .. }
            | Expr::Logical { .. }
            | Expr::InstanceOf { .. } => Type::BOOLEAN,
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => Type::BOOLEAN,
            Expr::StringLiteral(_) => Type::string(),
            Expr::ClassLiteral(_) => Type::object("java/lang/Class"),
            Expr::NullLiteral | Expr::Unresolved(_) | Expr::StackEntry(_) => Type::object_root(),
            Expr::CaughtException(ty) => Type::object(
                ty.clone()
                    .unwrap_or_else(|| "java/lang/Throwable".to_string()),
            ),
            Expr::Local(id) => locals.get(*id).ty.clone(),
            Expr::This => Type::object(locals.this_class().to_string()),
            Expr::Binary { left, .. } => left.ty(locals),
            Expr::Unary { operand, .. } => operand.ty(locals),
            Expr::Cast { ty, .. } => ty.clone(),
            Expr::Field { ty, .. } => ty.clone(),
            Expr::Invoke { return_type, .. } | Expr::InvokeDynamic { return_type, .. } => {
                return_type.clone()
            }
            Expr::New { ty, .. } => ty.clone(),
            Expr::UninitNew { owner } => Type::object(owner.clone()),
            Expr::NewArray { ty, .. } | Expr::ArrayInit { ty, .. } => ty.clone(),
            Expr::ArrayLoad { ty, .. } => ty.clone(),
            Expr::Ternary { then_expr, .. } => then_expr.ty(locals),
            Expr::Assign { target, .. } | Expr::Increment { target, .. } => target.ty(locals),
            Expr::Dup(inner) => inner.ty(locals),
        }
    }

    pub fn is_boolean(&self, locals: &LocalVariables) -> bool {
        match self {
            Expr::Ternary {
                then_expr,
                else_expr,
                ..
            } => then_expr.is_boolean(locals) && else_expr.is_boolean(locals),
            Expr::Local(id) => locals.get(*id).primitive_flags() == Some(PrimitiveFlags::BOOLEAN),
            _ => self.ty(locals).is_boolean(),
        }
    }

    /// Operator precedence, higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Assign { .. } => 1,
            Expr::Ternary { .. } => 2,
            Expr::Logical {
                op: LogicalOp::Or, ..
            } => 3,
            Expr::Logical {
                op: LogicalOp::And, ..
            } => 4,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Compare {
                op: CompareOp::Eq | CompareOp::Ne,
                ..
            } => 8,
            Expr::Compare { .. } | Expr::InstanceOf { .. } => 9,
            Expr::Unary { .. } | Expr::Cast { .. } => 14,
            Expr::Increment { prefix: true, .. } => 14,
            Expr::Increment { prefix: false, .. } => 15,
            Expr::IntLiteral(v) if *v < 0 => 14,
            Expr::LongLiteral(v) if *v < 0 => 14,
            Expr::New { .. } | Expr::NewArray { .. } | Expr::ArrayInit { .. } => 15,
            _ => 16,
        }
    }
}

/// Converts `value op 0` into a condition, dropping redundant comparisons of
/// boolean values against zero.
pub fn make_if_zero_cond(value: Expr, op: CompareOp, locals: &LocalVariables) -> Expr {
    match value {
        Expr::CmpResult { left, right, .. } => Expr::Compare { op, left, right },
        v if v.is_boolean(locals) => match op {
            CompareOp::Ne => v,
            CompareOp::Eq => v.negate(),
            _ => Expr::Compare {
                op,
                left: v.boxed(),
                right: Expr::IntLiteral(0).boxed(),
            },
        },
        v => Expr::Compare {
            op,
            left: v.boxed(),
            right: Expr::IntLiteral(0).boxed(),
        },
    }
}

/// Rewrites int literals and `c ? 1 : 0` shapes into booleans. Applied
/// wherever the consumer is known to expect a boolean.
pub fn narrow_to_boolean(expr: Expr) -> Expr {
    match expr {
        Expr::IntLiteral(0) => Expr::BooleanLiteral(false),
        Expr::IntLiteral(1) => Expr::BooleanLiteral(true),
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            let then_expr = narrow_to_boolean(*then_expr);
            let else_expr = narrow_to_boolean(*else_expr);
            match (&then_expr, &else_expr) {
                (Expr::BooleanLiteral(true), Expr::BooleanLiteral(false)) => *condition,
                (Expr::BooleanLiteral(false), Expr::BooleanLiteral(true)) => condition.negate(),
                _ => Expr::Ternary {
                    condition,
                    then_expr: then_expr.boxed(),
                    else_expr: else_expr.boxed(),
                },
            }
        }
        Expr::Compare {
            op: op @ (CompareOp::Eq | CompareOp::Ne),
            left,
            right,
        } if matches!(*right, Expr::IntLiteral(0) | Expr::IntLiteral(1))
            && matches!(*left, Expr::Compare { .. } | Expr::Logical { .. }) =>
        {
            let truthy = (*right == Expr::IntLiteral(1)) == (op == CompareOp::Eq);
            if truthy {
                *left
            } else {
                left.negate()
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(id: usize) -> Expr {
        Expr::Local(id)
    }

    #[test]
    fn test_negate_de_morgan() {
        let cond = Expr::Logical {
            op: LogicalOp::And,
            left: Expr::Compare {
                op: CompareOp::Lt,
                left: local(0).boxed(),
                right: Expr::IntLiteral(3).boxed(),
            }
            .boxed(),
            right: Expr::Unary {
                op: UnaryOp::Not,
                operand: local(1).boxed(),
            }
            .boxed(),
        };
        let negated = cond.negate();
        assert_eq!(
            negated,
            Expr::Logical {
                op: LogicalOp::Or,
                left: Expr::Compare {
                    op: CompareOp::Ge,
                    left: local(0).boxed(),
                    right: Expr::IntLiteral(3).boxed(),
                }
                .boxed(),
                right: local(1).boxed(),
            }
        );
    }

    #[test]
    fn test_substitute_stack() {
        let mut e = Expr::Binary {
            op: BinaryOp::Add,
            left: Expr::StackEntry(0).boxed(),
            right: Expr::StackEntry(1).boxed(),
        };
        e.substitute_stack(&[Expr::IntLiteral(1)]);
        assert_eq!(
            e,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Expr::IntLiteral(1).boxed(),
                right: Expr::StackEntry(1).boxed(),
            }
        );
        assert!(e.contains_stack_entry());
    }

    #[test]
    fn test_narrow_ternary() {
        let c = Expr::Compare {
            op: CompareOp::Gt,
            left: local(0).boxed(),
            right: Expr::IntLiteral(0).boxed(),
        };
        let t = Expr::Ternary {
            condition: c.clone().boxed(),
            then_expr: Expr::IntLiteral(0).boxed(),
            else_expr: Expr::IntLiteral(1).boxed(),
        };
        assert_eq!(narrow_to_boolean(t), c.negate());
        assert_eq!(narrow_to_boolean(Expr::IntLiteral(2)), Expr::IntLiteral(2));
    }

    #[test]
    fn test_side_effects() {
        assert!(!Expr::ArrayLength(local(0).boxed()).has_side_effects());
        let call = Expr::Invoke {
            kind: InvokeKind::Static,
            object: None,
            owner: "a/B".into(),
            name: "f".into(),
            descriptor: "()I".into(),
            args: vec![],
            return_type: Type::INT,
        };
        assert!(Expr::Cast {
            ty: Type::LONG,
            operand: call.boxed()
        }
        .has_side_effects());
    }
}
