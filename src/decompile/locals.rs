//! Local variable slots of one method.
//!
//! Each `LocalVariable` owns a `[start_pc, start_pc + length)` range of a
//! slot. Two live variables of the same slot never overlap: when a slot is
//! reused with an incompatible type, the earlier variable is cut at the
//! reusing store.

use std::collections::HashSet;

use crate::attribute_info::CodeAttribute;
use crate::constant_info::ConstantPool;

use super::descriptor::{parse_type, simple_class_name, PrimitiveFlags, PrimitiveType, Type};

pub type LocalId = usize;

/// Slots from here up are handed out to stack temporaries, counting down
/// from the top.
const TEMPORARY_SLOTS: u16 = 0xFF00;

#[derive(Clone, Debug)]
pub struct LocalVariable {
    pub slot: u16,
    pub start_pc: u32,
    pub length: u32,
    /// Empty until a name is generated for a variable the class file does not name.
    pub name: String,
    pub ty: Type,
    pub is_parameter: bool,
    /// Named by the LocalVariableTable.
    pub from_table: bool,
    /// Merged or inlined away; never printed.
    pub to_be_removed: bool,
    /// A declaration has been placed for it.
    pub declared: bool,
}

impl LocalVariable {
    pub fn end_pc(&self) -> u32 {
        self.start_pc.saturating_add(self.length)
    }

    pub fn covers(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc()
    }

    pub fn primitive_flags(&self) -> Option<PrimitiveFlags> {
        self.ty.primitive_flags()
    }

    fn overlaps(&self, other: &LocalVariable) -> bool {
        self.slot == other.slot && self.start_pc < other.end_pc() && other.start_pc < self.end_pc()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Category {
    IntSized,
    Long,
    Float,
    Double,
    Reference,
}

fn category(ty: &Type) -> Category {
    match ty.primitive_flags() {
        Some(f) if f == PrimitiveFlags::LONG => Category::Long,
        Some(f) if f == PrimitiveFlags::FLOAT => Category::Float,
        Some(f) if f == PrimitiveFlags::DOUBLE => Category::Double,
        Some(_) => Category::IntSized,
        None => Category::Reference,
    }
}

/// Describes the parameters a method receives in its first slots.
#[derive(Clone, Debug, Default)]
pub struct ParameterInfo {
    pub is_static: bool,
    pub types: Vec<Type>,
    /// Names from a MethodParameters attribute, by position.
    pub names: Vec<Option<String>>,
}

#[derive(Clone, Debug)]
pub struct LocalVariables {
    this_class: String,
    code_length: u32,
    vars: Vec<LocalVariable>,
}

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try",
    "void", "volatile", "while", "true", "false", "null", "var", "record", "yield",
];

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn decapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn type_word(ty: &Type) -> String {
    match ty {
        Type::Primitive(p) => p.flags.keyword().to_string(),
        Type::Generic(g) => g.name.clone(),
        _ => simple_class_name(ty.internal_name().unwrap_or("Object")).to_string(),
    }
}

/// Base name for a variable of `ty` that the class file does not name.
pub fn generated_name(ty: &Type, is_parameter: bool) -> String {
    let base = if ty.dimension() > 0 {
        format!("arrayOf{}", capitalize(&type_word(&ty.element_type().with_dimension(0))))
    } else if is_parameter {
        format!("param{}", capitalize(&type_word(ty)))
    } else {
        match ty {
            Type::Primitive(p) => match p.flags.resolve() {
                PrimitiveFlags::BOOLEAN => "bool".to_string(),
                PrimitiveFlags::BYTE => "b".to_string(),
                PrimitiveFlags::CHAR => "c".to_string(),
                PrimitiveFlags::SHORT => "s".to_string(),
                PrimitiveFlags::LONG => "l".to_string(),
                PrimitiveFlags::FLOAT => "f".to_string(),
                PrimitiveFlags::DOUBLE => "d".to_string(),
                _ => "i".to_string(),
            },
            Type::Generic(g) => g.name.to_lowercase(),
            _ => match ty.internal_name().unwrap_or("java/lang/Object") {
                "java/lang/Object" => "obj".to_string(),
                "java/lang/String" => "str".to_string(),
                "java/lang/Throwable" => "ex".to_string(),
                name if name.ends_with("Exception") || name.ends_with("Error") => "ex".to_string(),
                name => decapitalize(simple_class_name(name)),
            },
        }
    };
    if JAVA_KEYWORDS.contains(&base.as_str()) {
        format!("local{}", capitalize(&base))
    } else {
        base
    }
}

/// Compilers cut one source variable into several table entries around
/// stores in branches and handlers. Consecutive entries of a slot with the
/// same name and type are one variable over the union of their ranges.
fn merge_split_ranges(mut vars: Vec<LocalVariable>) -> Vec<LocalVariable> {
    vars.sort_by_key(|v| (v.slot, v.start_pc));
    let mut merged: Vec<LocalVariable> = Vec::with_capacity(vars.len());
    for var in vars {
        if let Some(last) = merged.last_mut() {
            if last.slot == var.slot && last.name == var.name && last.ty == var.ty {
                let end = last.end_pc().max(var.end_pc());
                last.length = end - last.start_pc;
                continue;
            }
        }
        merged.push(var);
    }
    merged
}

impl LocalVariables {
    pub fn new(this_class: impl Into<String>, code_length: u32) -> Self {
        LocalVariables {
            this_class: this_class.into(),
            code_length,
            vars: Vec::new(),
        }
    }

    /// Seeds the table from the LocalVariableTable (and its generic
    /// counterpart) when present, then makes sure `this` and every parameter
    /// has a variable covering the whole method.
    pub fn from_method(
        this_class: &str,
        params: &ParameterInfo,
        code: &CodeAttribute,
        pool: &ConstantPool,
    ) -> Self {
        let code_length = code.code.len() as u32;
        let mut locals = LocalVariables::new(this_class, code_length);
        let mut parameter_slots = if params.is_static { 0u16 } else { 1 };
        for ty in &params.types {
            parameter_slots += if ty.is_wide() { 2 } else { 1 };
        }

        if let Some(table) = code.local_variables() {
            for item in &table.items {
                let name = match pool.utf8(item.name_index) {
                    Ok(name) => name.to_string(),
                    Err(e) => {
                        log::warn!("skipping local variable entry: {e}");
                        continue;
                    }
                };
                let mut ty = pool
                    .utf8(item.descriptor_index)
                    .ok()
                    .and_then(parse_type)
                    .unwrap_or_else(Type::object_root);
                if let Some(generic) = code.local_variable_types().and_then(|t| {
                    t.items
                        .iter()
                        .find(|g| g.index == item.index && g.start_pc == item.start_pc)
                }) {
                    if let Some(parsed) = pool.utf8(generic.signature_index).ok().and_then(parse_type)
                    {
                        ty = parsed;
                    }
                }
                let start_pc = u32::from(item.start_pc);
                locals.vars.push(LocalVariable {
                    slot: item.index,
                    start_pc,
                    length: u32::from(item.length),
                    name,
                    ty,
                    is_parameter: start_pc == 0 && item.index < parameter_slots,
                    from_table: true,
                    to_be_removed: false,
                    declared: false,
                });
            }
        }

        locals.vars = merge_split_ranges(std::mem::take(&mut locals.vars));

        let mut slot = 0u16;
        if !params.is_static {
            if locals.find(0, 0).is_none() {
                locals.push_parameter(0, "this".to_string(), Type::object(this_class));
            }
            slot = 1;
        }
        for (i, ty) in params.types.iter().enumerate() {
            match locals.find(slot, 0) {
                Some(id) => locals.vars[id].is_parameter = true,
                None => {
                    let name = params
                        .names
                        .get(i)
                        .cloned()
                        .flatten()
                        .unwrap_or_default();
                    locals.push_parameter(slot, name, ty.clone());
                }
            }
            slot += if ty.is_wide() { 2 } else { 1 };
        }
        locals
    }

    fn push_parameter(&mut self, slot: u16, name: String, ty: Type) {
        let length = self.code_length.max(1);
        self.vars.push(LocalVariable {
            slot,
            start_pc: 0,
            length,
            name,
            ty,
            is_parameter: true,
            from_table: false,
            to_be_removed: false,
            declared: true,
        });
    }

    pub fn this_class(&self) -> &str {
        &self.this_class
    }

    pub fn get(&self, id: LocalId) -> &LocalVariable {
        &self.vars[id]
    }

    pub fn get_mut(&mut self, id: LocalId) -> &mut LocalVariable {
        &mut self.vars[id]
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalId, &LocalVariable)> {
        self.vars.iter().enumerate()
    }

    /// The live variable of `slot` whose range covers `pc`.
    pub fn find(&self, slot: u16, pc: u32) -> Option<LocalId> {
        self.vars
            .iter()
            .position(|v| v.slot == slot && !v.to_be_removed && v.covers(pc))
    }

    fn next_start(&self, slot: u16, pc: u32) -> u32 {
        self.vars
            .iter()
            .filter(|v| v.slot == slot && !v.to_be_removed && v.start_pc > pc)
            .map(|v| v.start_pc)
            .min()
            .unwrap_or(self.code_length)
    }

    fn create(&mut self, slot: u16, pc: u32, ty: Type) -> LocalId {
        let end = self.next_start(slot, pc).max(pc + 1);
        self.vars.push(LocalVariable {
            slot,
            start_pc: pc,
            length: end - pc,
            name: String::new(),
            ty,
            is_parameter: false,
            from_table: false,
            to_be_removed: false,
            declared: false,
        });
        self.vars.len() - 1
    }

    /// A variable with no slot of its own, live over the whole method, for
    /// values the operand stack carries between blocks.
    pub fn temporary(&mut self, ty: Type) -> LocalId {
        let taken = self.vars.iter().filter(|v| v.slot >= TEMPORARY_SLOTS).count();
        let slot = u16::MAX - taken as u16;
        self.vars.push(LocalVariable {
            slot,
            start_pc: 0,
            length: self.code_length.max(1),
            name: String::new(),
            ty,
            is_parameter: false,
            from_table: false,
            to_be_removed: false,
            declared: false,
        });
        self.vars.len() - 1
    }

    /// Resolves a load of `slot` at `pc`.
    pub fn load(&mut self, slot: u16, pc: u32, hint: Type) -> LocalId {
        if let Some(id) = self.find(slot, pc) {
            return id;
        }
        // Loads before the first store happen in loops; stretch the closest
        // generated variable of the slot over the load.
        let before = self
            .vars
            .iter()
            .enumerate()
            .filter(|(_, v)| v.slot == slot && !v.to_be_removed && v.start_pc <= pc)
            .max_by_key(|(_, v)| v.start_pc)
            .map(|(id, _)| id);
        if let Some(id) = before {
            if !self.vars[id].from_table {
                let limit = self.next_start(slot, pc);
                let var = &mut self.vars[id];
                var.length = limit.max(pc + 1) - var.start_pc;
                return id;
            }
        }
        let after = self
            .vars
            .iter()
            .enumerate()
            .filter(|(_, v)| v.slot == slot && !v.to_be_removed && v.start_pc > pc && !v.from_table)
            .min_by_key(|(_, v)| v.start_pc)
            .map(|(id, _)| id);
        if let Some(id) = after {
            let var = &mut self.vars[id];
            var.length += var.start_pc - pc;
            var.start_pc = pc;
            return id;
        }
        self.create(slot, pc, hint)
    }

    /// Resolves a store of a `value_ty` value into `slot` by the instruction
    /// at `pc`. Table ranges start after the storing instruction, at `next_pc`.
    pub fn store(&mut self, slot: u16, pc: u32, next_pc: u32, value_ty: Type) -> LocalId {
        let found = self.find(slot, next_pc).or_else(|| self.find(slot, pc));
        let Some(id) = found else {
            return self.create(slot, pc, value_ty);
        };
        if self.vars[id].from_table || self.vars[id].is_parameter {
            return id;
        }
        if category(&self.vars[id].ty) == category(&value_ty) {
            self.merge_type(id, &value_ty);
            return id;
        }
        let var = &mut self.vars[id];
        if var.start_pc >= pc {
            var.ty = value_ty;
            return id;
        }
        var.length = pc - var.start_pc;
        self.create(slot, pc, value_ty)
    }

    fn merge_type(&mut self, id: LocalId, value_ty: &Type) {
        let var = &mut self.vars[id];
        match (var.ty.primitive_flags(), value_ty.primitive_flags()) {
            (Some(current), Some(incoming)) => {
                let merged = current & incoming;
                let merged = if merged.is_empty() {
                    PrimitiveFlags::INT
                } else {
                    merged
                };
                var.ty = Type::Primitive(PrimitiveType {
                    flags: merged,
                    dimension: 0,
                });
            }
            _ => {
                if var.ty.is_object("java/lang/Object") && !value_ty.is_object("java/lang/Object") {
                    var.ty = value_ty.clone();
                }
            }
        }
    }

    /// Restricts the primitive candidates of a variable, keeping the current
    /// set when the intersection would be empty.
    pub fn narrow(&mut self, id: LocalId, flags: PrimitiveFlags) {
        let var = &mut self.vars[id];
        if var.from_table {
            return;
        }
        if let Some(current) = var.ty.primitive_flags() {
            let merged = current & flags;
            if !merged.is_empty() {
                var.ty = Type::Primitive(PrimitiveType {
                    flags: merged,
                    dimension: 0,
                });
            }
        }
    }

    /// Gives every unnamed variable a type-derived name, suffixed with a
    /// counter when the base name is taken.
    pub fn assign_names(&mut self) {
        let mut used: HashSet<String> = self
            .vars
            .iter()
            .filter(|v| !v.name.is_empty())
            .map(|v| v.name.clone())
            .collect();
        for var in self.vars.iter_mut() {
            if !var.name.is_empty() {
                continue;
            }
            let resolved = match var.ty.primitive_flags() {
                Some(flags) => Type::Primitive(PrimitiveType {
                    flags: flags.resolve(),
                    dimension: 0,
                }),
                None => var.ty.clone(),
            };
            let base = generated_name(&resolved, var.is_parameter);
            let mut name = base.clone();
            let mut counter = 1;
            while used.contains(&name) {
                name = format!("{base}{counter}");
                counter += 1;
            }
            used.insert(name.clone());
            var.name = name;
        }
    }

    /// Pairs of live same-slot variables whose ranges intersect. Empty for a
    /// well-formed table.
    pub fn overlapping_pairs(&self) -> Vec<(LocalId, LocalId)> {
        let mut pairs = Vec::new();
        for (i, a) in self.vars.iter().enumerate() {
            if a.to_be_removed {
                continue;
            }
            for (j, b) in self.vars.iter().enumerate().skip(i + 1) {
                if !b.to_be_removed && a.overlaps(b) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_names() {
        assert_eq!(generated_name(&Type::INT, false), "i");
        assert_eq!(generated_name(&Type::string(), false), "str");
        assert_eq!(generated_name(&Type::object("java/util/List"), false), "list");
        assert_eq!(generated_name(&Type::INT.array_of(), false), "arrayOfInt");
        assert_eq!(generated_name(&Type::string(), true), "paramString");
        assert_eq!(generated_name(&Type::object("a/Enum"), false), "localEnum");
        assert_eq!(generated_name(&Type::object("java/io/IOException"), false), "ex");
    }

    #[test]
    fn test_slot_reuse_splits_range() {
        let mut locals = LocalVariables::new("a/B", 40);
        let a = locals.store(1, 0, 1, Type::INT);
        let b = locals.store(1, 20, 21, Type::string());
        assert_ne!(a, b);
        assert_eq!(locals.get(a).end_pc(), 20);
        assert!(locals.overlapping_pairs().is_empty());
        assert_eq!(locals.load(1, 25, Type::object_root()), b);
        assert_eq!(locals.load(1, 5, Type::INT), a);
    }

    #[test]
    fn test_compatible_store_reuses_variable() {
        let mut locals = LocalVariables::new("a/B", 40);
        let a = locals.store(2, 0, 1, Type::Primitive(PrimitiveType {
            flags: PrimitiveFlags::for_int_constant(1),
            dimension: 0,
        }));
        let b = locals.store(2, 10, 11, Type::BOOLEAN);
        assert_eq!(a, b);
        assert!(locals.get(a).ty.is_boolean());
    }

    fn table_entry(slot: u16, start_pc: u32, length: u32, name: &str, ty: Type) -> LocalVariable {
        LocalVariable {
            slot,
            start_pc,
            length,
            name: name.to_string(),
            ty,
            is_parameter: false,
            from_table: true,
            to_be_removed: false,
            declared: false,
        }
    }

    #[test]
    fn test_split_table_ranges_merge() {
        let vars = merge_split_ranges(vec![
            table_entry(0, 13, 2, "r", Type::INT),
            table_entry(0, 4, 3, "r", Type::INT),
            table_entry(1, 8, 3, "e", Type::object("java/lang/Exception")),
            table_entry(0, 11, 2, "r", Type::INT),
        ]);
        assert_eq!(vars.len(), 2);
        assert_eq!((vars[0].name.as_str(), vars[0].start_pc, vars[0].end_pc()), ("r", 4, 15));
        assert_eq!(vars[1].name, "e");

        let mut locals = LocalVariables::new("a/B", 16);
        locals.vars = vars;
        // a store in the gap between two original entries lands on the merged variable
        assert_eq!(locals.store(0, 9, 10, Type::INT), 0);
        assert!(locals.overlapping_pairs().is_empty());
    }

    #[test]
    fn test_reused_slot_keeps_distinct_entries() {
        let vars = merge_split_ranges(vec![
            table_entry(2, 0, 5, "a", Type::INT),
            table_entry(2, 5, 5, "s", Type::string()),
            table_entry(2, 10, 5, "a", Type::INT),
        ]);
        let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["a", "s", "a"]);
    }

    #[test]
    fn test_temporaries_do_not_collide() {
        let mut locals = LocalVariables::new("a/B", 12);
        locals.store(1, 0, 1, Type::INT);
        let t0 = locals.temporary(Type::INT);
        let t1 = locals.temporary(Type::string());
        assert_ne!(locals.get(t0).slot, locals.get(t1).slot);
        assert!(locals.get(t0).covers(11));
        assert!(locals.overlapping_pairs().is_empty());
    }

    #[test]
    fn test_unique_names() {
        let mut locals = LocalVariables::new("a/B", 40);
        locals.store(1, 0, 1, Type::INT);
        locals.store(2, 0, 1, Type::INT);
        locals.assign_names();
        assert_eq!(locals.get(0).name, "i");
        assert_eq!(locals.get(1).name, "i1");
    }
}
