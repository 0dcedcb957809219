//! Operand stack simulation: turns decoded bytecode into statement-level
//! instructions with expression trees.
//!
//! The simulation is linear over the code array. At every basic block
//! boundary the values still on the stack are flushed as `Push`
//! instructions, and the next block starts from an entry stack of
//! `StackEntry` placeholders that structuring later substitutes.

use std::collections::{BTreeMap, BTreeSet};

use crate::attribute_info::{BootstrapMethod, CodeAttribute};
use crate::code_attribute::opcodes::*;
use crate::code_attribute::{Bytecode, Operand};
use crate::constant_info::{ConstantInfo, ConstantPool};
use crate::error::{DecompileError, Result};

use super::descriptor::*;
use super::expr::*;
use super::instruction::*;
use super::locals::LocalVariables;

/// Everything the simulation needs to know about the method being built.
pub struct BuildContext<'a> {
    pub pool: &'a ConstantPool,
    pub code: &'a CodeAttribute,
    pub this_class: &'a str,
    pub is_static: bool,
    pub return_type: Type,
    pub bootstrap_methods: &'a [BootstrapMethod],
    /// Handler entry offsets and the exception they catch (`None` for any).
    pub handlers: &'a BTreeMap<u32, Option<String>>,
}

/// Output of the simulation for one method.
#[derive(Debug, Default)]
pub struct BuiltCode {
    pub instructions: Vec<Instruction>,
    /// Operand stack depth on entry to each block leader.
    pub entry_depths: BTreeMap<u32, usize>,
    /// Soft errors. The method is still decompiled when these occur.
    pub errors: Vec<DecompileError>,
}

impl BuiltCode {
    pub fn contains_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

const BOX_TYPES: &[(&str, &str)] = &[
    ("java/lang/Boolean", "booleanValue"),
    ("java/lang/Byte", "byteValue"),
    ("java/lang/Character", "charValue"),
    ("java/lang/Short", "shortValue"),
    ("java/lang/Integer", "intValue"),
    ("java/lang/Long", "longValue"),
    ("java/lang/Float", "floatValue"),
    ("java/lang/Double", "doubleValue"),
];

fn is_string_builder(name: &str) -> bool {
    name == "java/lang/StringBuilder" || name == "java/lang/StringBuffer"
}

/// Values that can be copied into a successor's entry stack verbatim
/// instead of being passed through a `StackEntry` placeholder.
fn is_stable(e: &Expr) -> bool {
    match e {
        Expr::Dup(inner) => matches!(inner.as_ref(), Expr::UninitNew { .. }),
        Expr::UninitNew { .. } | Expr::This | Expr::CaughtException(_) => true,
        _ => false,
    }
}

/// Literal coercion for a consumer of known type.
pub fn coerce(value: Expr, ty: &Type) -> Expr {
    match ty.primitive_flags() {
        Some(PrimitiveFlags::BOOLEAN) => narrow_to_boolean(value),
        Some(PrimitiveFlags::CHAR) => match value {
            Expr::IntLiteral(v) if (0..=0xFFFF).contains(&v) => Expr::CharLiteral(v as u16),
            other => other,
        },
        _ => value,
    }
}

struct Builder<'a, 'l> {
    ctx: &'a BuildContext<'a>,
    locals: &'l mut LocalVariables,
    stack: Vec<Expr>,
    out: Vec<Instruction>,
    templates: BTreeMap<u32, Vec<Expr>>,
    entered: BTreeSet<u32>,
    errors: Vec<DecompileError>,
    offset: u32,
    line: Option<u16>,
}

/// Simulates `bytecodes`, splitting at `leaders`.
pub fn build(
    bytecodes: &[Bytecode],
    leaders: &BTreeSet<u32>,
    ctx: &BuildContext<'_>,
    locals: &mut LocalVariables,
) -> Result<BuiltCode> {
    let mut builder = Builder {
        ctx,
        locals,
        stack: Vec::new(),
        out: Vec::new(),
        templates: BTreeMap::new(),
        entered: BTreeSet::new(),
        errors: Vec::new(),
        offset: 0,
        line: None,
    };
    for (i, bc) in bytecodes.iter().enumerate() {
        builder.offset = bc.offset;
        builder.line = ctx.code.line_number_at(bc.offset);
        if leaders.contains(&bc.offset) {
            builder.enter_block(bc.offset);
        }
        let next_pc = bc.offset + bc.length;
        builder.step(bc, next_pc)?;
        let at_boundary = bytecodes
            .get(i + 1)
            .map_or(true, |n| leaders.contains(&n.offset));
        if at_boundary && !bc.ends_flow() && !bc.is_conditional_branch() {
            builder.record_entry(next_pc);
            builder.flush();
        }
    }
    let entry_depths = builder
        .templates
        .iter()
        .map(|(offset, t)| (*offset, t.len()))
        .collect();
    log::trace!(
        "built {} instructions, {} soft errors",
        builder.out.len(),
        builder.errors.len()
    );
    Ok(BuiltCode {
        instructions: builder.out,
        entry_depths,
        errors: builder.errors,
    })
}

impl<'a, 'l> Builder<'a, 'l> {
    fn soft_error(&mut self, message: String) {
        log::warn!("offset {}: {}", self.offset, message);
        self.errors.push(DecompileError::mismatch(self.offset, message));
    }

    fn emit(&mut self, kind: InstructionKind) {
        self.out.push(Instruction::new(self.offset, self.line, kind));
    }

    fn push(&mut self, e: Expr) {
        self.stack.push(e);
    }

    fn pop(&mut self) -> Expr {
        match self.stack.pop() {
            Some(e) => e.undup(),
            None => {
                self.soft_error("operand stack underflow".to_string());
                Expr::Unresolved("<stack underflow>".to_string())
            }
        }
    }

    fn pop_n(&mut self, n: usize) -> Vec<Expr> {
        let mut values: Vec<Expr> = (0..n).map(|_| self.pop()).collect();
        values.reverse();
        values
    }

    fn is_wide(&self, e: &Expr) -> bool {
        e.ty(self.locals).is_wide()
    }

    fn enter_block(&mut self, offset: u32) {
        self.entered.insert(offset);
        if let Some(caught) = self.ctx.handlers.get(&offset) {
            self.stack = vec![Expr::CaughtException(caught.clone())];
            self.templates.insert(offset, self.stack.clone());
            return;
        }
        self.stack = self.templates.get(&offset).cloned().unwrap_or_default();
        if !self.templates.contains_key(&offset) {
            self.templates.insert(offset, Vec::new());
        }
    }

    /// Records the stack handed to the block starting at `target`.
    fn record_entry(&mut self, target: u32) {
        let incoming: Vec<Expr> = self
            .stack
            .iter()
            .enumerate()
            .map(|(k, e)| {
                if is_stable(e) {
                    e.clone()
                } else {
                    Expr::StackEntry(k)
                }
            })
            .collect();
        let entered = self.entered.contains(&target);
        match self.templates.get_mut(&target) {
            None => {
                self.templates.insert(target, incoming);
            }
            Some(existing) if existing.len() != incoming.len() => {
                let message = format!(
                    "stack depth {} flowing into {} disagrees with {}",
                    incoming.len(),
                    target,
                    existing.len()
                );
                self.soft_error(message);
            }
            Some(existing) => {
                if !entered {
                    for (k, (current, new)) in existing.iter_mut().zip(incoming).enumerate() {
                        if *current != new {
                            *current = Expr::StackEntry(k);
                        }
                    }
                }
            }
        }
    }

    /// Moves the remaining stack into `Push` instructions.
    fn flush(&mut self) {
        for value in std::mem::take(&mut self.stack) {
            self.emit(InstructionKind::Push(value));
        }
    }

    fn branch(&mut self, bc: &Bytecode, condition: Option<Expr>) {
        let delta = match bc.operand {
            Operand::Branch(delta) => delta,
            _ => 0,
        };
        let branch = BranchInstruction {
            offset: bc.offset,
            delta,
            condition,
        };
        self.record_entry(branch.target());
        if branch.condition.is_some() {
            self.record_entry(bc.offset + bc.length);
        }
        self.flush();
        self.emit(InstructionKind::Branch(branch));
    }

    fn compare(&self, op: CompareOp, left: Expr, right: Expr) -> Expr {
        let (left, right) = match (&left, &right) {
            (_, Expr::IntLiteral(_)) => {
                let ty = left.ty(self.locals);
                let right = coerce(right, &ty);
                (left, right)
            }
            (Expr::IntLiteral(_), _) => {
                let ty = right.ty(self.locals);
                (coerce(left, &ty), right)
            }
            _ => (left, right),
        };
        Expr::Compare {
            op,
            left: left.boxed(),
            right: right.boxed(),
        }
    }

    fn load_constant(&self, index: u16) -> Result<Expr> {
        let pool = self.ctx.pool;
        Ok(match pool.get(index)? {
            ConstantInfo::Integer(v) => Expr::IntLiteral(*v),
            ConstantInfo::Float(v) => Expr::FloatLiteral(*v),
            ConstantInfo::Long(v) => Expr::LongLiteral(*v),
            ConstantInfo::Double(v) => Expr::DoubleLiteral(*v),
            ConstantInfo::String { string_index } => {
                Expr::StringLiteral(pool.utf8(*string_index)?.to_string())
            }
            ConstantInfo::Class { name_index } => {
                let name = pool.utf8(*name_index)?;
                Expr::ClassLiteral(class_constant_type(name).unwrap_or_else(|| Type::object(name)))
            }
            c @ (ConstantInfo::MethodType { .. }
            | ConstantInfo::MethodHandle { .. }
            | ConstantInfo::Dynamic { .. }) => {
                Expr::Unresolved(format!("{}#{}", c.tag_name(), index))
            }
            c => {
                return Err(DecompileError::malformed_constant(
                    index,
                    format!("{} is not loadable", c.tag_name()),
                ))
            }
        })
    }

    fn class_type(&self, index: u16) -> Result<Type> {
        let name = self.ctx.pool.class_name(index)?;
        class_constant_type(name).ok_or_else(|| {
            DecompileError::malformed_constant(index, format!("bad class name {name}"))
        })
    }

    fn step(&mut self, bc: &Bytecode, next_pc: u32) -> Result<()> {
        let op = bc.opcode;
        match op {
            // ============================================================
            // Constants
            // ============================================================
            NOP => {}
            ACONST_NULL => self.push(Expr::NullLiteral),
            ICONST_M1..=ICONST_5 => self.push(Expr::IntLiteral(op as i32 - ICONST_0 as i32)),
            LCONST_0 | LCONST_1 => self.push(Expr::LongLiteral((op - LCONST_0) as i64)),
            FCONST_0..=FCONST_2 => self.push(Expr::FloatLiteral((op - FCONST_0) as f32)),
            DCONST_0 | DCONST_1 => self.push(Expr::DoubleLiteral((op - DCONST_0) as f64)),
            BIPUSH | SIPUSH => {
                if let Operand::Int(v) = bc.operand {
                    self.push(Expr::IntLiteral(v));
                }
            }
            LDC | LDC_W | LDC2_W => {
                if let Operand::ConstantIndex(index) = bc.operand {
                    let constant = self.load_constant(index)?;
                    self.push(constant);
                }
            }

            // ============================================================
            // Locals
            // ============================================================
            ILOAD..=ALOAD => {
                if let Operand::Local(slot) = bc.operand {
                    let hint = match op {
                        ILOAD => Type::INT,
                        LLOAD => Type::LONG,
                        FLOAD => Type::FLOAT,
                        DLOAD => Type::DOUBLE,
                        _ => Type::object_root(),
                    };
                    let id = self.locals.load(slot, bc.offset, hint);
                    if op == ALOAD && slot == 0 && !self.ctx.is_static && self.locals.get(id).is_parameter {
                        self.push(Expr::This);
                    } else {
                        self.push(Expr::Local(id));
                    }
                }
            }
            ISTORE..=ASTORE => {
                if let Operand::Local(slot) = bc.operand {
                    self.store_local(op, slot, bc.offset, next_pc);
                }
            }
            IINC => {
                if let Operand::Iinc { index, value } = bc.operand {
                    self.increment(index, i32::from(value), bc.offset);
                }
            }

            // ============================================================
            // Arrays
            // ============================================================
            IALOAD..=SALOAD => {
                let index = self.pop();
                let array = self.pop();
                let ty = self.array_element_type(op - IALOAD, &array);
                self.push(Expr::ArrayLoad {
                    array: array.boxed(),
                    index: index.boxed(),
                    ty,
                });
            }
            IASTORE..=SASTORE => self.array_store(op - IASTORE),
            NEWARRAY => {
                let count = self.pop();
                let element = match bc.operand {
                    Operand::NewArray(atype) => newarray_type(atype),
                    _ => None,
                };
                let element = element.unwrap_or_else(|| {
                    self.soft_error("unknown newarray element type".to_string());
                    Type::INT
                });
                self.push(Expr::NewArray {
                    ty: element.array_of(),
                    dimensions: vec![count],
                });
            }
            ANEWARRAY => {
                if let Operand::ConstantIndex(index) = bc.operand {
                    let element = self.class_type(index)?;
                    let count = self.pop();
                    self.push(Expr::NewArray {
                        ty: element.array_of(),
                        dimensions: vec![count],
                    });
                }
            }
            MULTIANEWARRAY => {
                if let Operand::MultiANewArray { index, dimensions } = bc.operand {
                    let ty = self.class_type(index)?;
                    let dimensions = self.pop_n(dimensions as usize);
                    self.push(Expr::NewArray { ty, dimensions });
                }
            }
            ARRAYLENGTH => {
                let array = self.pop();
                self.push(Expr::ArrayLength(array.boxed()));
            }

            // ============================================================
            // Stack manipulation
            // ============================================================
            POP => {
                let v = self.pop();
                self.discard(v);
            }
            POP2 => {
                let v = self.pop();
                if self.is_wide(&v) {
                    self.discard(v);
                } else {
                    let v2 = self.pop();
                    self.discard(v2);
                    self.discard(v);
                }
            }
            DUP => {
                let v = self.pop();
                self.push(Expr::Dup(v.clone().boxed()));
                self.push(v);
            }
            DUP_X1 => {
                let v1 = self.pop();
                let v2 = self.pop();
                self.push(Expr::Dup(v1.clone().boxed()));
                self.push(v2);
                self.push(v1);
            }
            DUP_X2 => {
                let v1 = self.pop();
                let v2 = self.pop();
                let v3 = if self.is_wide(&v2) { None } else { Some(self.pop()) };
                self.push(Expr::Dup(v1.clone().boxed()));
                self.stack.extend(v3);
                self.push(v2);
                self.push(v1);
            }
            DUP2 => {
                let v1 = self.pop();
                if self.is_wide(&v1) {
                    self.push(Expr::Dup(v1.clone().boxed()));
                    self.push(v1);
                } else {
                    let v2 = self.pop();
                    self.push(v2.clone());
                    self.push(v1.clone());
                    self.push(v2);
                    self.push(v1);
                }
            }
            DUP2_X1 => {
                let v1 = self.pop();
                let v2 = self.pop();
                if self.is_wide(&v1) {
                    self.push(Expr::Dup(v1.clone().boxed()));
                    self.push(v2);
                    self.push(v1);
                } else {
                    let v3 = self.pop();
                    self.push(v2.clone());
                    self.push(v1.clone());
                    self.push(v3);
                    self.push(v2);
                    self.push(v1);
                }
            }
            DUP2_X2 => {
                let v1 = self.pop();
                let v2 = self.pop();
                if self.is_wide(&v1) {
                    let under: Vec<Expr> = if self.is_wide(&v2) {
                        vec![v2]
                    } else {
                        let v3 = self.pop();
                        vec![v3, v2]
                    };
                    self.push(Expr::Dup(v1.clone().boxed()));
                    self.stack.extend(under);
                    self.push(v1);
                } else {
                    let v3 = self.pop();
                    let under: Vec<Expr> = if self.is_wide(&v3) {
                        vec![v3]
                    } else {
                        let v4 = self.pop();
                        vec![v4, v3]
                    };
                    self.push(v2.clone());
                    self.push(v1.clone());
                    self.stack.extend(under);
                    self.push(v2);
                    self.push(v1);
                }
            }
            SWAP => {
                let v1 = self.pop();
                let v2 = self.pop();
                self.push(v1);
                self.push(v2);
            }

            // ============================================================
            // Arithmetic
            // ============================================================
            IADD..=DREM | ISHL..=LXOR => {
                let right = self.pop();
                let left = self.pop();
                let bin_op = match op {
                    IADD..=DADD => BinaryOp::Add,
                    ISUB..=DSUB => BinaryOp::Sub,
                    IMUL..=DMUL => BinaryOp::Mul,
                    IDIV..=DDIV => BinaryOp::Div,
                    IREM..=DREM => BinaryOp::Rem,
                    ISHL | LSHL => BinaryOp::Shl,
                    ISHR | LSHR => BinaryOp::Shr,
                    IUSHR | LUSHR => BinaryOp::Ushr,
                    IAND | LAND => BinaryOp::And,
                    IOR | LOR => BinaryOp::Or,
                    _ => BinaryOp::Xor,
                };
                let value = match (bin_op, &right) {
                    (BinaryOp::Xor, Expr::IntLiteral(-1)) | (BinaryOp::Xor, Expr::LongLiteral(-1)) => {
                        Expr::Unary {
                            op: UnaryOp::BitNot,
                            operand: left.boxed(),
                        }
                    }
                    _ => Expr::Binary {
                        op: bin_op,
                        left: left.boxed(),
                        right: right.boxed(),
                    },
                };
                self.push(value);
            }
            INEG..=DNEG => {
                let v = self.pop();
                let negated = match v {
                    Expr::IntLiteral(i) => Expr::IntLiteral(i.wrapping_neg()),
                    Expr::LongLiteral(l) => Expr::LongLiteral(l.wrapping_neg()),
                    Expr::FloatLiteral(f) => Expr::FloatLiteral(-f),
                    Expr::DoubleLiteral(d) => Expr::DoubleLiteral(-d),
                    other => Expr::Unary {
                        op: UnaryOp::Neg,
                        operand: other.boxed(),
                    },
                };
                self.push(negated);
            }

            // ============================================================
            // Conversions and comparisons
            // ============================================================
            I2L..=I2S => {
                let v = self.pop();
                let ty = match op {
                    I2L | F2L | D2L => Type::LONG,
                    I2F | L2F | D2F => Type::FLOAT,
                    I2D | L2D | F2D => Type::DOUBLE,
                    I2B => Type::BYTE,
                    I2C => Type::CHAR,
                    I2S => Type::SHORT,
                    _ => Type::INT,
                };
                let cast = match (op, v) {
                    (I2C, Expr::IntLiteral(c)) if (0..=0xFFFF).contains(&c) => Expr::CharLiteral(c as u16),
                    (_, v) => Expr::Cast {
                        ty,
                        operand: v.boxed(),
                    },
                };
                self.push(cast);
            }
            LCMP..=DCMPG => {
                let right = self.pop();
                let left = self.pop();
                let kind = match op {
                    LCMP => CmpKind::LCmp,
                    FCMPL => CmpKind::FCmpL,
                    FCMPG => CmpKind::FCmpG,
                    DCMPL => CmpKind::DCmpL,
                    _ => CmpKind::DCmpG,
                };
                self.push(Expr::CmpResult {
                    kind,
                    left: left.boxed(),
                    right: right.boxed(),
                });
            }

            // ============================================================
            // Control flow
            // ============================================================
            IFEQ..=IFLE => {
                let v = self.pop();
                let cond = make_if_zero_cond(v, compare_op(op - IFEQ), self.locals);
                self.branch(bc, Some(cond));
            }
            IF_ICMPEQ..=IF_ACMPNE => {
                let right = self.pop();
                let left = self.pop();
                let cmp = if op >= IF_ACMPEQ {
                    compare_op(op - IF_ACMPEQ)
                } else {
                    compare_op(op - IF_ICMPEQ)
                };
                let cond = self.compare(cmp, left, right);
                self.branch(bc, Some(cond));
            }
            IFNULL | IFNONNULL => {
                let v = self.pop();
                let cmp = if op == IFNULL { CompareOp::Eq } else { CompareOp::Ne };
                let cond = self.compare(cmp, v, Expr::NullLiteral);
                self.branch(bc, Some(cond));
            }
            GOTO | GOTO_W => self.branch(bc, None),
            JSR | JSR_W | RET => {
                self.soft_error(format!("{} subroutines are not supported", bc.mnemonic()));
                self.emit(InstructionKind::Comment(format!("{} {:?}", bc.mnemonic(), bc.operand)));
            }
            TABLESWITCH | LOOKUPSWITCH => {
                let selector = self.pop();
                let targets = bc.branch_targets();
                let keys: Vec<i32> = match &bc.operand {
                    Operand::TableSwitch { low, offsets, .. } => {
                        (0..offsets.len() as i32).map(|i| low + i).collect()
                    }
                    Operand::LookupSwitch { pairs, .. } => pairs.iter().map(|(k, _)| *k).collect(),
                    _ => Vec::new(),
                };
                for target in &targets {
                    self.record_entry(*target);
                }
                self.flush();
                let default_target = targets.first().copied().unwrap_or(next_pc);
                let cases = keys.into_iter().zip(targets.into_iter().skip(1)).collect();
                self.emit(InstructionKind::Switch(SwitchInstruction {
                    selector,
                    default_target,
                    cases,
                }));
            }
            IRETURN..=ARETURN => {
                let v = self.pop();
                let v = coerce(v, &self.ctx.return_type);
                self.stack.clear();
                self.emit(InstructionKind::Return(Some(v)));
            }
            RETURN => {
                self.stack.clear();
                self.emit(InstructionKind::Return(None));
            }
            ATHROW => {
                let v = self.pop();
                self.stack.clear();
                self.emit(InstructionKind::Throw(v));
            }

            // ============================================================
            // Fields and invocations
            // ============================================================
            GETSTATIC | GETFIELD => {
                if let Operand::ConstantIndex(index) = bc.operand {
                    let pool = self.ctx.pool;
                    let member = pool.member_ref(index)?;
                    let ty = parse_type(member.descriptor).unwrap_or_else(Type::object_root);
                    let object = if op == GETFIELD {
                        Some(self.pop().boxed())
                    } else {
                        None
                    };
                    self.push(Expr::Field {
                        object,
                        owner: member.class_name.to_string(),
                        name: member.name.to_string(),
                        ty,
                    });
                }
            }
            PUTSTATIC | PUTFIELD => {
                if let Operand::ConstantIndex(index) = bc.operand {
                    self.field_store(op, index)?;
                }
            }
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => {
                if let Operand::ConstantIndex(index) = bc.operand {
                    self.invoke(op, index)?;
                }
            }
            INVOKEINTERFACE => {
                if let Operand::InvokeInterface { index, .. } = bc.operand {
                    self.invoke(op, index)?;
                }
            }
            INVOKEDYNAMIC => {
                if let Operand::InvokeDynamic(index) = bc.operand {
                    self.invoke_dynamic(index)?;
                }
            }

            // ============================================================
            // Objects
            // ============================================================
            NEW => {
                if let Operand::ConstantIndex(index) = bc.operand {
                    let owner = self.ctx.pool.class_name(index)?.to_string();
                    self.push(Expr::UninitNew { owner });
                }
            }
            CHECKCAST => {
                if let Operand::ConstantIndex(index) = bc.operand {
                    let ty = self.class_type(index)?;
                    let v = self.pop();
                    self.push(Expr::Cast {
                        ty,
                        operand: v.boxed(),
                    });
                }
            }
            INSTANCEOF => {
                if let Operand::ConstantIndex(index) = bc.operand {
                    let ty = self.class_type(index)?;
                    let v = self.pop();
                    self.push(Expr::InstanceOf {
                        operand: v.boxed(),
                        ty,
                    });
                }
            }
            MONITORENTER => {
                let v = self.pop();
                self.emit(InstructionKind::MonitorEnter(v));
            }
            MONITOREXIT => {
                let v = self.pop();
                self.emit(InstructionKind::MonitorExit(v));
            }
            _ => {
                return Err(DecompileError::malformed_class(format!(
                    "unexpected opcode 0x{:02x} at offset {}",
                    op, bc.offset
                )))
            }
        }
        Ok(())
    }

    fn discard(&mut self, v: Expr) {
        if v.has_side_effects() {
            self.emit(InstructionKind::Expression(v));
        }
    }

    fn array_element_type(&self, kind: u8, array: &Expr) -> Type {
        let array_ty = array.ty(self.locals);
        match kind {
            0 => Type::INT,
            1 => Type::LONG,
            2 => Type::FLOAT,
            3 => Type::DOUBLE,
            4 if array_ty.dimension() > 0 => array_ty.element_type(),
            4 => Type::object_root(),
            5 if array_ty.element_type().is_boolean() && array_ty.dimension() == 1 => Type::BOOLEAN,
            5 => Type::BYTE,
            6 => Type::CHAR,
            _ => Type::SHORT,
        }
    }

    fn store_local(&mut self, op: u8, slot: u16, pc: u32, next_pc: u32) {
        let value = self.pop();
        let value_ty = match op {
            ISTORE => match &value {
                Expr::IntLiteral(v) => Type::Primitive(PrimitiveType {
                    flags: PrimitiveFlags::for_int_constant(*v),
                    dimension: 0,
                }),
                v if v.is_boolean(self.locals) => Type::BOOLEAN,
                v => {
                    let ty = v.ty(self.locals);
                    if ty.is_primitive() {
                        ty
                    } else {
                        Type::INT
                    }
                }
            },
            LSTORE => Type::LONG,
            FSTORE => Type::FLOAT,
            DSTORE => Type::DOUBLE,
            _ => match &value {
                Expr::NullLiteral => Type::object_root(),
                v => v.ty(self.locals),
            },
        };
        let id = self.locals.store(slot, pc, next_pc, value_ty);
        let target = Expr::Local(id);
        self.finish_store(target, value, |value| InstructionKind::Store { local: id, value });
    }

    /// Shared tail of local, field and array stores: folds `dup`-based
    /// assignment chains, postfix increments and compound assignments.
    fn finish_store(
        &mut self,
        target: Expr,
        value: Expr,
        statement: impl FnOnce(Expr) -> InstructionKind,
    ) {
        let compound = compound_parts(&target, &value).map(|(op, k)| (op, k.clone()));
        if let Some(top) = self.stack.last_mut() {
            // `dup` of the new value: the assignment itself is the result.
            if top.is_dup_of(&value) {
                *top = match compound {
                    Some((op, k)) => compound_assign(target, op, k, true),
                    None => Expr::Assign {
                        target: target.boxed(),
                        op: None,
                        value: value.boxed(),
                    },
                };
                return;
            }
            // `dup` of the old value: the result is what was read before the store.
            if top.is_dup_of(&target) {
                if let Some(delta) = compound.as_ref().and_then(|(op, k)| unit_delta(*op, k)) {
                    *top = Expr::Increment {
                        target: target.boxed(),
                        delta,
                        prefix: false,
                    };
                    return;
                }
            }
        }
        if let Some((op, k)) = compound {
            let assign = compound_assign(target, op, k, false);
            self.emit(InstructionKind::Expression(assign));
            return;
        }
        let kind = statement(value);
        self.emit(kind);
    }

    fn increment(&mut self, slot: u16, delta: i32, pc: u32) {
        let id = self.locals.load(slot, pc, Type::INT);
        let target = Expr::Local(id);
        if delta.abs() == 1 && self.stack.last() == Some(&target) {
            self.stack.pop();
            self.push(Expr::Increment {
                target: target.boxed(),
                delta,
                prefix: false,
            });
            return;
        }
        let e = if delta.abs() == 1 {
            Expr::Increment {
                target: target.boxed(),
                delta,
                prefix: false,
            }
        } else {
            Expr::Assign {
                target: target.boxed(),
                op: Some(if delta < 0 { BinaryOp::Sub } else { BinaryOp::Add }),
                value: Expr::IntLiteral(delta.unsigned_abs() as i32).boxed(),
            }
        };
        self.emit(InstructionKind::Expression(e));
    }

    fn array_store(&mut self, kind: u8) {
        let value = self.pop();
        let index = self.pop();
        let array = self.pop();
        let ty = self.array_element_type(kind, &array);
        let value = coerce(value, &ty);
        if let Some(top) = self.stack.last_mut() {
            if top.is_dup_of(&array) {
                if let Some(init) = extend_array_init(&array, &index, &value) {
                    *top = init;
                    return;
                }
            }
        }
        let target = Expr::ArrayLoad {
            array: array.clone().boxed(),
            index: index.clone().boxed(),
            ty,
        };
        self.finish_store(target, value, |value| InstructionKind::ArrayStore {
            array,
            index,
            value,
        });
    }

    fn field_store(&mut self, op: u8, index: u16) -> Result<()> {
        let pool = self.ctx.pool;
        let member = pool.member_ref(index)?;
        let owner = member.class_name.to_string();
        let name = member.name.to_string();
        let ty = parse_type(member.descriptor).unwrap_or_else(Type::object_root);
        let value = self.pop();
        let value = coerce(value, &ty);
        let object = if op == PUTFIELD { Some(self.pop()) } else { None };
        let target = Expr::Field {
            object: object.clone().map(Expr::boxed),
            owner: owner.clone(),
            name: name.clone(),
            ty: ty.clone(),
        };
        self.finish_store(target, value, |value| InstructionKind::FieldStore {
            object,
            owner,
            name,
            ty,
            value,
        });
        Ok(())
    }

    fn invoke(&mut self, op: u8, index: u16) -> Result<()> {
        let member = self.ctx.pool.member_ref(index)?;
        let owner = member.class_name.to_string();
        let name = member.name.to_string();
        let descriptor = member.descriptor.to_string();
        let signature = parse_method_signature(&descriptor).ok_or_else(|| {
            DecompileError::malformed_constant(index, format!("bad method descriptor {descriptor}"))
        })?;
        let mut args = self.pop_n(signature.parameters.len());
        for (arg, ty) in args.iter_mut().zip(signature.parameters.iter()) {
            let taken = std::mem::replace(arg, Expr::NullLiteral);
            *arg = coerce(taken, ty);
        }
        let kind = match op {
            INVOKEVIRTUAL => InvokeKind::Virtual,
            INVOKESPECIAL => InvokeKind::Special,
            INVOKESTATIC => InvokeKind::Static,
            _ => InvokeKind::Interface,
        };
        let object = if op == INVOKESTATIC {
            None
        } else {
            Some(self.pop())
        };

        if name == "<init>" {
            if let Some(Expr::UninitNew { owner: created }) = &object {
                let uninit = Expr::UninitNew {
                    owner: created.clone(),
                };
                let value = Expr::New {
                    ty: Type::object(created.clone()),
                    descriptor,
                    args,
                };
                if let Some(top) = self.stack.last_mut() {
                    if top.is_dup_of(&uninit) {
                        *top = value;
                        return Ok(());
                    }
                }
                self.emit(InstructionKind::Expression(value));
                return Ok(());
            }
        }

        // Autoboxing is implicit in source.
        if let Some((box_owner, unbox_name)) = BOX_TYPES.iter().find(|(b, _)| *b == owner) {
            if kind == InvokeKind::Static
                && name == "valueOf"
                && args.len() == 1
                && signature.parameters.0[0].is_primitive()
            {
                log::trace!("elided {}.valueOf", box_owner);
                let arg = args.remove(0);
                self.push(arg);
                return Ok(());
            }
            if kind == InvokeKind::Virtual && name == *unbox_name && args.is_empty() {
                if let Some(object) = object {
                    self.push(object);
                    return Ok(());
                }
            }
        }

        let call = Expr::Invoke {
            kind,
            object: object.map(Expr::boxed),
            owner,
            name,
            descriptor,
            args,
            return_type: signature.return_type.clone(),
        };
        let call = self.fold_string_builder(call);
        if signature.return_type.is_void() {
            self.emit(InstructionKind::Expression(call));
        } else {
            self.push(call);
        }
        Ok(())
    }

    fn is_string(&self, e: &Expr) -> bool {
        matches!(e, Expr::StringLiteral(_)) || e.ty(self.locals).is_object("java/lang/String")
    }

    /// Joins operands with `+`, making sure the chain is a string
    /// concatenation from its first operator on.
    fn concat(&self, mut parts: Vec<Expr>) -> Expr {
        let starts_as_string = parts.first().map_or(false, |p| self.is_string(p))
            || parts.get(1).map_or(false, |p| self.is_string(p));
        if !starts_as_string || parts.len() < 2 {
            parts.insert(0, Expr::StringLiteral(String::new()));
        }
        let mut iter = parts.into_iter();
        let first = iter.next().unwrap_or(Expr::StringLiteral(String::new()));
        iter.fold(first, |left, right| Expr::Binary {
            op: BinaryOp::Add,
            left: left.boxed(),
            right: right.boxed(),
        })
    }

    /// `new StringBuilder().append(a).append(b).toString()` becomes `a + b`.
    fn fold_string_builder(&self, call: Expr) -> Expr {
        let Expr::Invoke {
            name,
            object: Some(object),
            args,
            owner,
            ..
        } = &call
        else {
            return call;
        };
        if name != "toString" || !args.is_empty() || !is_string_builder(owner) {
            return call;
        }
        let mut parts = Vec::new();
        let mut current: &Expr = object;
        loop {
            match current {
                Expr::Invoke {
                    name,
                    object: Some(inner),
                    args,
                    owner,
                    ..
                } if name == "append" && args.len() == 1 && is_string_builder(owner) => {
                    parts.push(args[0].clone());
                    current = inner;
                }
                Expr::New {
                    ty,
                    args,
                    descriptor,
                } if ty.internal_name().map_or(false, is_string_builder) => {
                    if descriptor == "(Ljava/lang/String;)V" && args.len() == 1 {
                        parts.push(args[0].clone());
                    } else if !args.is_empty() {
                        return call;
                    }
                    break;
                }
                _ => return call,
            }
        }
        parts.reverse();
        self.concat(parts)
    }

    fn method_handle_target(&self, index: u16) -> Option<(String, String)> {
        match self.ctx.pool.get(index).ok()? {
            ConstantInfo::MethodHandle {
                reference_index, ..
            } => {
                let member = self.ctx.pool.member_ref(*reference_index).ok()?;
                Some((member.class_name.to_string(), member.name.to_string()))
            }
            _ => None,
        }
    }

    fn invoke_dynamic(&mut self, index: u16) -> Result<()> {
        let bootstrap_index = match self.ctx.pool.get(index)? {
            ConstantInfo::InvokeDynamic {
                bootstrap_method_attr_index,
                ..
            } => *bootstrap_method_attr_index,
            c => {
                return Err(DecompileError::malformed_constant(
                    index,
                    format!("expected InvokeDynamic, found {}", c.tag_name()),
                ))
            }
        };
        let (name, descriptor) = self.ctx.pool.dynamic(index)?;
        let (name, descriptor) = (name.to_string(), descriptor.to_string());
        let signature = parse_method_signature(&descriptor).ok_or_else(|| {
            DecompileError::malformed_constant(index, format!("bad call site descriptor {descriptor}"))
        })?;
        let args = self.pop_n(signature.parameters.len());
        let bootstrap = self.ctx.bootstrap_methods.get(bootstrap_index as usize);
        let factory = bootstrap.and_then(|b| self.method_handle_target(b.bootstrap_method_ref));

        let value = match (factory.as_ref().map(|(_, n)| n.as_str()), bootstrap) {
            (Some("makeConcatWithConstants"), Some(b)) => {
                let recipe = b
                    .bootstrap_arguments
                    .first()
                    .and_then(|i| self.ctx.pool.string(*i).ok())
                    .unwrap_or("")
                    .to_string();
                let constants: Vec<Expr> = b
                    .bootstrap_arguments
                    .iter()
                    .skip(1)
                    .map(|i| self.load_constant(*i))
                    .collect::<Result<_>>()?;
                self.concat(concat_recipe(&recipe, args, constants))
            }
            (Some("makeConcat"), _) => self.concat(args),
            (Some("metafactory") | Some("altMetafactory"), Some(b)) => {
                let method_ref = b
                    .bootstrap_arguments
                    .get(1)
                    .and_then(|i| self.method_handle_target(*i));
                Expr::InvokeDynamic {
                    name,
                    descriptor,
                    args,
                    return_type: signature.return_type.clone(),
                    method_ref,
                }
            }
            _ => Expr::InvokeDynamic {
                name,
                descriptor,
                args,
                return_type: signature.return_type.clone(),
                method_ref: None,
            },
        };
        if signature.return_type.is_void() {
            self.emit(InstructionKind::Expression(value));
        } else {
            self.push(value);
        }
        Ok(())
    }
}

fn compare_op(k: u8) -> CompareOp {
    match k {
        0 => CompareOp::Eq,
        1 => CompareOp::Ne,
        2 => CompareOp::Lt,
        3 => CompareOp::Ge,
        4 => CompareOp::Gt,
        _ => CompareOp::Le,
    }
}

/// Splits `target op k` (possibly under the implicit narrowing cast of a
/// compound assignment) into `op` and `k`.
fn compound_parts<'v>(target: &Expr, value: &'v Expr) -> Option<(BinaryOp, &'v Expr)> {
    let value = match value {
        Expr::Cast { ty, operand } if ty.is_primitive() && matches!(operand.as_ref(), Expr::Binary { .. }) => {
            operand.as_ref()
        }
        v => v,
    };
    match value {
        Expr::Binary { op, left, right } if **left == *target => Some((*op, right.as_ref())),
        _ => None,
    }
}

/// `+1` and `-1` steps, whatever the literal's width.
fn unit_delta(op: BinaryOp, k: &Expr) -> Option<i32> {
    let one = match k {
        Expr::IntLiteral(v) => i64::from(*v) == 1,
        Expr::LongLiteral(v) => *v == 1,
        Expr::FloatLiteral(v) => *v == 1.0,
        Expr::DoubleLiteral(v) => *v == 1.0,
        _ => false,
    };
    match op {
        BinaryOp::Add if one => Some(1),
        BinaryOp::Sub if one => Some(-1),
        _ => None,
    }
}

fn compound_assign(target: Expr, op: BinaryOp, k: Expr, prefix: bool) -> Expr {
    match unit_delta(op, &k) {
        Some(delta) => Expr::Increment {
            target: target.boxed(),
            delta,
            prefix,
        },
        None => Expr::Assign {
            target: target.boxed(),
            op: Some(op),
            value: k.boxed(),
        },
    }
}

fn extend_array_init(array: &Expr, index: &Expr, value: &Expr) -> Option<Expr> {
    match (array, index) {
        (Expr::NewArray { ty, dimensions }, Expr::IntLiteral(0))
            if dimensions.len() == 1 && matches!(dimensions[0], Expr::IntLiteral(n) if n > 0) =>
        {
            Some(Expr::ArrayInit {
                ty: ty.clone(),
                values: vec![value.clone()],
            })
        }
        (Expr::ArrayInit { ty, values }, Expr::IntLiteral(k)) if *k as usize == values.len() => {
            let mut values = values.clone();
            values.push(value.clone());
            Some(Expr::ArrayInit {
                ty: ty.clone(),
                values,
            })
        }
        _ => None,
    }
}

/// Expands a `makeConcatWithConstants` recipe: `\u{1}` takes the next
/// argument, `\u{2}` the next bootstrap constant, anything else is literal.
fn concat_recipe(recipe: &str, args: Vec<Expr>, constants: Vec<Expr>) -> Vec<Expr> {
    let mut parts = Vec::new();
    let mut args = args.into_iter();
    let mut constants = constants.into_iter();
    let mut literal = String::new();
    for c in recipe.chars() {
        let next = match c {
            '\u{1}' => args.next(),
            '\u{2}' => constants.next(),
            c => {
                literal.push(c);
                continue;
            }
        };
        if !literal.is_empty() {
            parts.push(Expr::StringLiteral(std::mem::take(&mut literal)));
        }
        if let Some(e) = next {
            parts.push(e);
        }
    }
    if !literal.is_empty() {
        parts.push(Expr::StringLiteral(literal));
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_recipe() {
        let parts = concat_recipe(
            "a=\u{1}, b=\u{1}!",
            vec![Expr::Local(1), Expr::Local(2)],
            vec![],
        );
        assert_eq!(
            parts,
            vec![
                Expr::StringLiteral("a=".into()),
                Expr::Local(1),
                Expr::StringLiteral(", b=".into()),
                Expr::Local(2),
                Expr::StringLiteral("!".into()),
            ]
        );
    }

    #[test]
    fn test_array_init_extension() {
        let array = Expr::NewArray {
            ty: Type::INT.array_of(),
            dimensions: vec![Expr::IntLiteral(2)],
        };
        let first = extend_array_init(&array, &Expr::IntLiteral(0), &Expr::IntLiteral(7)).unwrap();
        let second = extend_array_init(&first, &Expr::IntLiteral(1), &Expr::IntLiteral(8)).unwrap();
        assert_eq!(
            second,
            Expr::ArrayInit {
                ty: Type::INT.array_of(),
                values: vec![Expr::IntLiteral(7), Expr::IntLiteral(8)],
            }
        );
        assert!(extend_array_init(&first, &Expr::IntLiteral(3), &Expr::IntLiteral(8)).is_none());
    }

    #[test]
    fn test_coerce_literals() {
        assert_eq!(coerce(Expr::IntLiteral(97), &Type::CHAR), Expr::CharLiteral(97));
        assert_eq!(coerce(Expr::IntLiteral(1), &Type::BOOLEAN), Expr::BooleanLiteral(true));
        assert_eq!(coerce(Expr::IntLiteral(1), &Type::INT), Expr::IntLiteral(1));
    }
}
