//! Rewrites of fixed compiler idioms on the structured statement tree.
//!
//! Every pass scans statement lists backward and only touches the
//! statements it matched, so running a pass twice changes nothing.

use std::collections::{HashMap, HashSet};

use super::builder::coerce;
use super::descriptor::{parse_method_signature, PrimitiveFlags, Type};
use super::expr::{narrow_to_boolean, BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
use super::instruction::{Instruction, InstructionKind};
use super::locals::{LocalId, LocalVariables};

const ASSERTIONS_DISABLED: &str = "$assertionsDisabled";
const ASSERTION_ERROR: &str = "java/lang/AssertionError";

/// Runs every reconstruction pass over a method body.
pub fn reconstruct(
    list: &mut Vec<Instruction>,
    this_class: &str,
    return_type: &Type,
    locals: &mut LocalVariables,
) {
    for_each_list(list, &mut |l| reconstruct_assert(l, this_class));
    for_each_list(list, &mut |l| reconstruct_synchronized(l, locals));
    inline_return_temps(list, locals);
    for_each_list(list, &mut fold_for_loops);
    narrow_booleans(list, return_type, locals);
    place_declarations(list, locals);
    strip_dup_markers(list);
    remove_trailing_return(list);
}

/// Applies `f` to every nested statement list, innermost first, then to
/// `list` itself.
pub fn for_each_list(list: &mut Vec<Instruction>, f: &mut dyn FnMut(&mut Vec<Instruction>)) {
    for instruction in list.iter_mut() {
        for body in instruction.bodies_mut() {
            for_each_list(body, f);
        }
    }
    f(list);
}

fn for_each_instruction(list: &[Instruction], f: &mut dyn FnMut(&Instruction)) {
    for instruction in list {
        f(instruction);
        if let InstructionKind::For { init: Some(init), .. } = &instruction.kind {
            f(init);
        }
        for body in instruction.bodies() {
            for_each_instruction(body, f);
        }
    }
}

// ============================================================
// assert
// ============================================================

fn is_assertions_enabled(expr: &Expr, this_class: &str) -> bool {
    match expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => matches!(
            operand.as_ref(),
            Expr::Field { object: None, owner, name, .. }
                if owner == this_class && name == ASSERTIONS_DISABLED
        ),
        _ => false,
    }
}

/// `if (!$assertionsDisabled && !c) throw new AssertionError(m)` becomes
/// `assert c : m`.
fn match_assert(instruction: &Instruction, this_class: &str) -> Option<InstructionKind> {
    let InstructionKind::If {
        condition,
        then_body,
        else_body: None,
    } = &instruction.kind
    else {
        return None;
    };
    let [thrown] = then_body.as_slice() else {
        return None;
    };
    let InstructionKind::Throw(Expr::New { ty, args, .. }) = &thrown.kind else {
        return None;
    };
    if !ty.is_object(ASSERTION_ERROR) || args.len() > 1 {
        return None;
    }
    let failed = match condition {
        Expr::Logical {
            op: LogicalOp::And,
            left,
            right,
        } if is_assertions_enabled(left, this_class) => right.as_ref().clone(),
        c if is_assertions_enabled(c, this_class) => Expr::BooleanLiteral(true),
        _ => return None,
    };
    Some(InstructionKind::Assert {
        condition: failed.negate(),
        message: args.first().cloned(),
    })
}

pub fn reconstruct_assert(list: &mut [Instruction], this_class: &str) {
    for i in (0..list.len()).rev() {
        if let Some(assert) = match_assert(&list[i], this_class) {
            list[i].kind = assert;
        }
    }
}

// ============================================================
// synchronized
// ============================================================

/// `monitorenter(t = lock); try { .. } finally { monitorexit(t) }` becomes
/// `synchronized (lock) { .. }`.
fn reconstruct_synchronized(list: &mut Vec<Instruction>, locals: &mut LocalVariables) {
    let mut i = list.len();
    while i > 0 {
        i -= 1;
        let (temp, monitor, stored_before) = match &list[i].kind {
            InstructionKind::MonitorEnter(Expr::Assign {
                target,
                op: None,
                value,
            }) => match target.as_ref() {
                Expr::Local(t) => (*t, value.as_ref().clone(), false),
                _ => continue,
            },
            InstructionKind::MonitorEnter(Expr::Local(t)) if i > 0 => match &list[i - 1].kind {
                InstructionKind::Store { local, value } if local == t => (*t, value.clone(), true),
                _ => continue,
            },
            _ => continue,
        };
        let exit = InstructionKind::MonitorExit(Expr::Local(temp));
        let matches_try = match list.get(i + 1).map(|s| &s.kind) {
            Some(InstructionKind::Try {
                catches,
                finally: Some(finally),
                ..
            }) => catches.is_empty() && finally.len() == 1 && finally[0].kind == exit,
            _ => false,
        };
        if !matches_try {
            continue;
        }
        let try_statement = list.remove(i + 1);
        let InstructionKind::Try { body, .. } = try_statement.kind else {
            continue;
        };
        list[i].kind = InstructionKind::Synchronized { monitor, body };
        if stored_before {
            list.remove(i - 1);
            i -= 1;
        }
        locals.get_mut(temp).to_be_removed = true;
    }
}

// ============================================================
// return temporaries
// ============================================================

fn reference_counts(list: &[Instruction]) -> HashMap<LocalId, usize> {
    let mut counts = HashMap::new();
    for_each_instruction(list, &mut |instruction| {
        let mut seen = HashSet::new();
        match &instruction.kind {
            InstructionKind::Store { local, .. } | InstructionKind::Declaration { local, .. } => {
                seen.insert(*local);
            }
            InstructionKind::Try { catches, .. } => {
                seen.extend(catches.iter().filter_map(|c| c.local));
            }
            _ => {}
        }
        for e in instruction.expressions() {
            e.walk(&mut |x| {
                if let Expr::Local(id) = x {
                    seen.insert(*id);
                }
            });
        }
        for id in seen {
            *counts.entry(id).or_insert(0) += 1;
        }
    });
    counts
}

/// `t = v; return t;` becomes `return v;` when `t` is a compiler temporary
/// used nowhere else.
fn inline_return_temps(list: &mut Vec<Instruction>, locals: &mut LocalVariables) {
    let counts = reference_counts(list);
    let mut removed = Vec::new();
    for_each_list(list, &mut |l| {
        let mut i = l.len();
        while i > 1 {
            i -= 1;
            let temp = match (&l[i - 1].kind, &l[i].kind) {
                (InstructionKind::Store { local, .. }, InstructionKind::Return(Some(Expr::Local(r))))
                    if local == r =>
                {
                    *local
                }
                _ => continue,
            };
            let var = locals.get(temp);
            if var.from_table || var.is_parameter || counts.get(&temp) != Some(&2) {
                continue;
            }
            if let InstructionKind::Store { value, .. } = l.remove(i - 1).kind {
                l[i - 1].kind = InstructionKind::Return(Some(value));
                removed.push(temp);
                i -= 1;
            }
        }
    });
    for temp in removed {
        locals.get_mut(temp).to_be_removed = true;
    }
}

// ============================================================
// for loops
// ============================================================

fn is_update_of(instruction: &Instruction, local: LocalId) -> bool {
    let target_is = |e: &Expr| *e == Expr::Local(local);
    match &instruction.kind {
        InstructionKind::Expression(Expr::Increment { target, .. })
        | InstructionKind::Expression(Expr::Assign { target, .. }) => target_is(target),
        InstructionKind::Store { local: l, value } => *l == local && value.references_local(local),
        _ => false,
    }
}

/// `i = 0; while (i < n) { ..; i++; }` becomes `for (i = 0; i < n; i++)`,
/// when `i` is not used after the loop.
pub fn fold_for_loops(list: &mut Vec<Instruction>) {
    let mut i = list.len();
    while i > 1 {
        i -= 1;
        let local = match &list[i - 1].kind {
            InstructionKind::Store { local, .. } => *local,
            _ => continue,
        };
        if list[i + 1..].iter().any(|s| s.references_local(local)) {
            continue;
        }
        let foldable = match &list[i].kind {
            InstructionKind::While { condition, body, .. } => {
                condition.references_local(local)
                    && body.last().map_or(false, |last| is_update_of(last, local))
            }
            InstructionKind::For {
                init: None,
                condition: Some(condition),
                update,
                ..
            } => condition.references_local(local) && update.iter().any(|u| is_update_of(u, local)),
            _ => false,
        };
        if !foldable {
            continue;
        }
        let init = list.remove(i - 1);
        i -= 1;
        let statement = &mut list[i];
        let kind = std::mem::replace(&mut statement.kind, InstructionKind::Comment(String::new()));
        statement.kind = match kind {
            InstructionKind::While {
                label,
                condition,
                mut body,
            } => {
                let update = body.pop().into_iter().collect();
                InstructionKind::For {
                    label,
                    init: Some(Box::new(init)),
                    condition: Some(condition),
                    update,
                    body,
                }
            }
            InstructionKind::For {
                label,
                condition,
                update,
                body,
                ..
            } => InstructionKind::For {
                label,
                init: Some(Box::new(init)),
                condition,
                update,
                body,
            },
            other => other,
        };
    }
}

// ============================================================
// booleans
// ============================================================

#[derive(Default)]
struct BooleanEvidence {
    stores_boolish: bool,
    stores_other: bool,
    stores_real: bool,
    zero_compared: bool,
    arithmetic: bool,
}

fn is_boolean_literal_int(e: &Expr) -> bool {
    matches!(e, Expr::IntLiteral(0) | Expr::IntLiteral(1))
}

fn is_real_boolean(e: &Expr, locals: &LocalVariables) -> bool {
    match e {
        Expr::IntLiteral(_) | Expr::Local(_) => false,
        Expr::Ternary {
            then_expr,
            else_expr,
            ..
        } => {
            (is_boolean_literal_int(then_expr) || is_real_boolean(then_expr, locals))
                && (is_boolean_literal_int(else_expr) || is_real_boolean(else_expr, locals))
        }
        other => other.ty(locals).is_boolean(),
    }
}

fn collect_evidence(list: &[Instruction], locals: &LocalVariables) -> HashMap<LocalId, BooleanEvidence> {
    let mut evidence: HashMap<LocalId, BooleanEvidence> = HashMap::new();
    for_each_instruction(list, &mut |instruction| {
        if let InstructionKind::Store { local, value } = &instruction.kind {
            let entry = evidence.entry(*local).or_default();
            if is_real_boolean(value, locals) {
                entry.stores_real = true;
                entry.stores_boolish = true;
            } else if is_boolean_literal_int(value) {
                entry.stores_boolish = true;
            } else {
                entry.stores_other = true;
            }
        }
        for e in instruction.expressions() {
            e.walk(&mut |x| match x {
                Expr::Compare {
                    op: CompareOp::Eq | CompareOp::Ne,
                    left,
                    right,
                } if matches!(right.as_ref(), Expr::IntLiteral(0)) => {
                    if let (Expr::Local(id), Expr::IntLiteral(0)) = (left.as_ref(), right.as_ref()) {
                        evidence.entry(*id).or_default().zero_compared = true;
                    }
                }
                Expr::Compare { left, right, .. } | Expr::Binary { left, right, .. } => {
                    let logical = matches!(
                        x,
                        Expr::Binary {
                            op: BinaryOp::And | BinaryOp::Or | BinaryOp::Xor,
                            ..
                        }
                    );
                    for side in [left, right] {
                        if let Expr::Local(id) = side.as_ref() {
                            if !logical {
                                evidence.entry(*id).or_default().arithmetic = true;
                            }
                        }
                    }
                }
                Expr::Increment { target, .. } | Expr::Assign { target, op: Some(_), .. } => {
                    if let Expr::Local(id) = target.as_ref() {
                        evidence.entry(*id).or_default().arithmetic = true;
                    }
                }
                Expr::Unary {
                    op: UnaryOp::Neg | UnaryOp::BitNot,
                    operand,
                }
                | Expr::Cast { operand, .. } => {
                    if let Expr::Local(id) = operand.as_ref() {
                        evidence.entry(*id).or_default().arithmetic = true;
                    }
                }
                Expr::ArrayLoad { index, .. } => {
                    if let Expr::Local(id) = index.as_ref() {
                        evidence.entry(*id).or_default().arithmetic = true;
                    }
                }
                _ => {}
            });
        }
    });
    evidence
}

/// Rewrites `x != 0` on a boolean `x` and int literals flowing into boolean
/// consumers.
fn narrow_expression(e: &mut Expr, locals: &LocalVariables) {
    e.walk_mut(&mut |x| {
        let narrowed = match x {
            Expr::Compare {
                op: op @ (CompareOp::Eq | CompareOp::Ne),
                left,
                right,
            } if **right == Expr::IntLiteral(0) && left.is_boolean(locals) => {
                let value = std::mem::replace(left.as_mut(), Expr::NullLiteral);
                Some(if *op == CompareOp::Ne { value } else { value.negate() })
            }
            Expr::Invoke { descriptor, args, .. } | Expr::New { descriptor, args, .. } => {
                if let Some(signature) = parse_method_signature(descriptor) {
                    for (arg, ty) in args.iter_mut().zip(signature.parameters.iter()) {
                        if ty.is_boolean() {
                            let value = std::mem::replace(arg, Expr::NullLiteral);
                            *arg = narrow_to_boolean(value);
                        }
                    }
                }
                None
            }
            Expr::Assign {
                target,
                op: None,
                value,
            } if target.is_boolean(locals) => {
                let v = std::mem::replace(value.as_mut(), Expr::NullLiteral);
                **value = narrow_to_boolean(v);
                None
            }
            _ => None,
        };
        if let Some(n) = narrowed {
            *x = n;
        }
    });
}

fn narrow_booleans(list: &mut Vec<Instruction>, return_type: &Type, locals: &mut LocalVariables) {
    let evidence = collect_evidence(list, locals);
    for (id, found) in &evidence {
        let var = locals.get(*id);
        let candidate = !var.from_table
            && !var.is_parameter
            && var
                .primitive_flags()
                .map_or(false, |f| f.contains(PrimitiveFlags::BOOLEAN) && f != PrimitiveFlags::BOOLEAN);
        if candidate
            && found.stores_boolish
            && !found.stores_other
            && !found.arithmetic
            && (found.stores_real || found.zero_compared)
        {
            log::trace!("narrowing local {} to boolean", var.name);
            locals.narrow(*id, PrimitiveFlags::BOOLEAN);
        }
    }
    let locals = &*locals;
    let returns_boolean = return_type.is_boolean();
    for_each_list(list, &mut |l| {
        for instruction in l.iter_mut() {
            for e in instruction.expressions_mut() {
                narrow_expression(e, locals);
            }
            let kind = std::mem::replace(&mut instruction.kind, InstructionKind::Comment(String::new()));
            instruction.kind = match kind {
                InstructionKind::Store { local, value } if locals.get(local).ty.is_boolean() => {
                    InstructionKind::Store {
                        local,
                        value: narrow_to_boolean(value),
                    }
                }
                InstructionKind::Store { local, value }
                    if locals.get(local).primitive_flags().map(PrimitiveFlags::resolve) == Some(PrimitiveFlags::CHAR) =>
                {
                    InstructionKind::Store {
                        local,
                        value: coerce(value, &Type::CHAR),
                    }
                }
                InstructionKind::Return(Some(value)) if returns_boolean => {
                    InstructionKind::Return(Some(narrow_to_boolean(value)))
                }
                InstructionKind::FieldStore {
                    object,
                    owner,
                    name,
                    ty,
                    value,
                } if ty.is_boolean() => InstructionKind::FieldStore {
                    object,
                    owner,
                    name,
                    ty,
                    value: narrow_to_boolean(value),
                },
                InstructionKind::ArrayStore {
                    array,
                    index,
                    value,
                } if array.ty(locals).element_type().is_boolean() && array.ty(locals).dimension() == 1 => {
                    InstructionKind::ArrayStore {
                        array,
                        index,
                        value: narrow_to_boolean(value),
                    }
                }
                other => other,
            };
        }
    });
    for_each_list(list, &mut |l| {
        for instruction in l.iter_mut() {
            if let InstructionKind::For { init: Some(init), .. } = &mut instruction.kind {
                if let InstructionKind::Store { local, value } = &mut init.kind {
                    if locals.get(*local).ty.is_boolean() {
                        let v = std::mem::replace(value, Expr::NullLiteral);
                        *value = narrow_to_boolean(v);
                    }
                }
            }
        }
    });
}

// ============================================================
// declarations
// ============================================================

fn catch_locals(list: &[Instruction]) -> HashSet<LocalId> {
    let mut out = HashSet::new();
    for_each_instruction(list, &mut |instruction| {
        if let InstructionKind::Try { catches, .. } = &instruction.kind {
            out.extend(catches.iter().filter_map(|c| c.local));
        }
    });
    out
}

/// Declares `local` in the innermost statement list holding every
/// reference to it, at its first reference. Returns false when nothing
/// references it.
fn place_declaration(list: &mut Vec<Instruction>, local: LocalId) -> bool {
    let referencing: Vec<usize> = (0..list.len())
        .filter(|&i| list[i].references_local(local))
        .collect();
    let Some(&first) = referencing.first() else {
        return false;
    };
    if referencing.len() == 1 && !list[first].header_references_local(local) {
        let mut bodies: Vec<&mut Vec<Instruction>> = list[first]
            .bodies_mut()
            .into_iter()
            .filter(|b| b.iter().any(|i| i.references_local(local)))
            .collect();
        if bodies.len() == 1 {
            if let Some(body) = bodies.pop() {
                if place_declaration(body, local) {
                    return true;
                }
            }
        }
    }
    if referencing.len() == 1 {
        if let InstructionKind::For { init: Some(init), .. } = &mut list[first].kind {
            if let Some(value) = stored_value(init, local) {
                init.kind = InstructionKind::Declaration {
                    local,
                    value: Some(value),
                };
                return true;
            }
        }
    }
    match stored_value(&list[first], local) {
        Some(value) => {
            list[first].kind = InstructionKind::Declaration {
                local,
                value: Some(value),
            };
        }
        None => {
            let declaration = Instruction::new(
                list[first].offset,
                list[first].line_number,
                InstructionKind::Declaration { local, value: None },
            );
            list.insert(first, declaration);
        }
    }
    true
}

fn stored_value(instruction: &Instruction, local: LocalId) -> Option<Expr> {
    match &instruction.kind {
        InstructionKind::Store { local: l, value } if *l == local => Some(value.clone()),
        _ => None,
    }
}

fn place_declarations(list: &mut Vec<Instruction>, locals: &mut LocalVariables) {
    let in_catch = catch_locals(list);
    let pending: Vec<LocalId> = locals
        .iter()
        .filter(|(id, v)| !v.is_parameter && !v.to_be_removed && !v.declared && !in_catch.contains(id))
        .map(|(id, _)| id)
        .collect();
    for id in in_catch {
        locals.get_mut(id).declared = true;
    }
    for id in pending {
        if place_declaration(list, id) {
            locals.get_mut(id).declared = true;
        }
    }
}

// ============================================================
// cleanup
// ============================================================

fn strip_dup_markers(list: &mut [Instruction]) {
    for instruction in list.iter_mut() {
        instruction.walk_expressions_mut(&mut |e| {
            if let Expr::Dup(inner) = e {
                let value = std::mem::replace(inner.as_mut(), Expr::NullLiteral);
                *e = value;
            }
        });
    }
}

fn remove_trailing_return(list: &mut Vec<Instruction>) {
    if matches!(list.last().map(|i| &i.kind), Some(InstructionKind::Return(None))) {
        list.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(kind: InstructionKind) -> Instruction {
        Instruction::new(0, None, kind)
    }

    fn disabled_flag() -> Expr {
        Expr::Field {
            object: None,
            owner: "a/Checked".into(),
            name: ASSERTIONS_DISABLED.into(),
            ty: Type::BOOLEAN,
        }
    }

    fn assertion_if(failed: Expr) -> Instruction {
        statement(InstructionKind::If {
            condition: Expr::Logical {
                op: LogicalOp::And,
                left: disabled_flag().negate().boxed(),
                right: failed.boxed(),
            },
            then_body: vec![statement(InstructionKind::Throw(Expr::New {
                ty: Type::object(ASSERTION_ERROR),
                descriptor: "(Ljava/lang/Object;)V".into(),
                args: vec![Expr::StringLiteral("bad".into())],
            }))],
            else_body: None,
        })
    }

    #[test]
    fn test_assert_is_idempotent() {
        let cond = Expr::Compare {
            op: CompareOp::Gt,
            left: Expr::Local(1).boxed(),
            right: Expr::IntLiteral(0).boxed(),
        };
        let mut list = vec![assertion_if(cond.clone().negate())];
        reconstruct_assert(&mut list, "a/Checked");
        let once = list.clone();
        reconstruct_assert(&mut list, "a/Checked");
        assert_eq!(list, once);
        assert_eq!(
            list[0].kind,
            InstructionKind::Assert {
                condition: cond,
                message: Some(Expr::StringLiteral("bad".into())),
            }
        );
    }

    #[test]
    fn test_assert_on_other_class_is_left_alone() {
        let mut list = vec![assertion_if(Expr::Local(1))];
        reconstruct_assert(&mut list, "a/Other");
        assert!(matches!(list[0].kind, InstructionKind::If { .. }));
    }

    #[test]
    fn test_fold_for_loop() {
        let store = statement(InstructionKind::Store {
            local: 1,
            value: Expr::IntLiteral(0),
        });
        let update = statement(InstructionKind::Expression(Expr::Increment {
            target: Expr::Local(1).boxed(),
            delta: 1,
            prefix: false,
        }));
        let work = statement(InstructionKind::Expression(Expr::Unresolved("work()".into())));
        let mut list = vec![
            store,
            statement(InstructionKind::While {
                label: None,
                condition: Expr::Compare {
                    op: CompareOp::Lt,
                    left: Expr::Local(1).boxed(),
                    right: Expr::IntLiteral(10).boxed(),
                },
                body: vec![work.clone(), update.clone()],
            }),
        ];
        fold_for_loops(&mut list);
        assert_eq!(list.len(), 1);
        match &list[0].kind {
            InstructionKind::For {
                init: Some(_),
                update: u,
                body,
                ..
            } => {
                assert_eq!(u, &vec![update]);
                assert_eq!(body, &vec![work]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_char_local_gets_char_literal() {
        let mut locals = LocalVariables::new("a/B", 10);
        let c = locals.store(1, 0, 2, Type::CHAR);
        let n = locals.store(2, 2, 4, Type::INT);
        let mut list = vec![
            statement(InstructionKind::Store {
                local: c,
                value: Expr::IntLiteral(233),
            }),
            statement(InstructionKind::Store {
                local: n,
                value: Expr::IntLiteral(233),
            }),
        ];
        narrow_booleans(&mut list, &Type::VOID, &mut locals);
        assert_eq!(
            list[0].kind,
            InstructionKind::Store {
                local: c,
                value: Expr::CharLiteral(233),
            }
        );
        assert_eq!(
            list[1].kind,
            InstructionKind::Store {
                local: n,
                value: Expr::IntLiteral(233),
            }
        );
    }
}
