//! Turns a decompiled class into layout fragments: package and import
//! block, type headers, members and statement trees, each line a run of
//! printer tokens.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::attribute_info::{Attribute, AttributeList, InnerClassAccessFlags, RuntimeAnnotation};
use crate::config::DecompilerConfig;
use crate::constant_info::{ConstantInfo, ConstantPool};
use crate::error::{DecompileError, Result};
use crate::field_info::{FieldAccessFlags, FieldInfo};
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::printer::{Marker, ReferenceKind, Token};

use super::class_decompiler::{DecompiledClass, DecompiledMethod, MethodBody};
use super::descriptor::{
    class_constant_type, internal_to_source_name, package_name, parse_class_signature, parse_type,
    simple_class_name, PrimitiveFlags, Type, TypeParameter,
};
use super::expr::{BinaryOp, CmpKind, Expr, InvokeKind, LogicalOp, UnaryOp};
use super::instruction::{Instruction, InstructionKind};
use super::layout::{Fragment, LayoutBlock, LayoutTag};
use super::locals::{LocalId, LocalVariables};
use super::type_resolver::{AnnotationRef, ElementRef, TypeResolver};

pub const DECOMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

const ASSERTIONS_DISABLED: &str = "$assertionsDisabled";
const ENUM_VALUES: &str = "$VALUES";

/// Lays out `decompiled` as source. `location` names the class file in the
/// metadata trailer.
pub fn write_class<'a>(
    decompiled: &'a DecompiledClass,
    config: &'a DecompilerConfig,
    location: Option<&str>,
) -> Vec<Fragment> {
    let mut writer = ClassWriter {
        config,
        resolver: TypeResolver::new(&decompiled.this_class),
        out: Vec::new(),
        line: Vec::new(),
        depth: 0,
        current: decompiled.this_class.clone(),
        classes: Vec::new(),
    };
    writer.write_type(decompiled);
    let body = std::mem::take(&mut writer.out);

    if let Some(package) = package_name(&decompiled.this_class) {
        writer.keyword("package");
        writer.text(" ");
        writer.text(internal_to_source_name(package));
        writer.text(";");
        writer.end_line();
        writer.spacer(LayoutTag::Section);
    }
    let imports = writer.resolver.imports();
    if !imports.is_empty() {
        let last = imports.len() - 1;
        for (i, import) in imports.into_iter().enumerate() {
            if i == 0 {
                writer.token(Token::Start(Marker::ImportStatements));
            }
            writer.keyword("import");
            writer.text(" ");
            writer.token(Token::Reference {
                kind: ReferenceKind::Type,
                internal_name: import.replace('.', "/"),
                name: import,
                descriptor: String::new(),
                owner: decompiled.this_class.clone(),
            });
            writer.text(";");
            if i == last {
                writer.token(Token::End(Marker::ImportStatements));
            }
            writer.end_line();
        }
        writer.spacer(LayoutTag::Section);
    }
    writer.out.extend(body);
    if config.write_metadata {
        writer.metadata(decompiled, location);
    }
    writer.out
}

/// Stand-in source for a class that could not be decompiled at all.
pub fn internal_error_placeholder(internal_name: &str, error: &DecompileError) -> String {
    format!(
        "// INTERNAL ERROR: {}\n// {}\n",
        internal_to_source_name(internal_name),
        error
    )
}

/// Java source form of a string constant, quotes included.
pub fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        escape_char(c, '"', &mut out);
    }
    out.push('"');
    out
}

/// Java source form of a char constant, quotes included.
pub fn char_literal(c: u16) -> String {
    let mut out = String::from("'");
    match char::from_u32(u32::from(c)) {
        Some(ch) => escape_char(ch, '\'', &mut out),
        None => {
            let _ = write!(out, "\\u{:04X}", c);
        }
    }
    out.push('\'');
    out
}

fn escape_char(c: char, quote: char, out: &mut String) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\t' => out.push_str("\\t"),
        '\r' => out.push_str("\\r"),
        '\u{8}' => out.push_str("\\b"),
        '\u{c}' => out.push_str("\\f"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_ascii_control() => {
            let _ = write!(out, "\\{:03o}", c as u32);
        }
        c => out.push(c),
    }
}

fn float_literal(v: f32) -> String {
    if v.is_nan() {
        "Float.NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Float.POSITIVE_INFINITY" } else { "Float.NEGATIVE_INFINITY" }.to_string()
    } else {
        format!("{:?}F", v)
    }
}

fn double_literal(v: f64) -> String {
    if v.is_nan() {
        "Double.NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Double.POSITIVE_INFINITY" } else { "Double.NEGATIVE_INFINITY" }.to_string()
    } else {
        format!("{:?}D", v)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TypeKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

impl TypeKind {
    fn of(flags: InnerClassAccessFlags) -> Self {
        if flags.contains(InnerClassAccessFlags::ANNOTATION) {
            TypeKind::Annotation
        } else if flags.contains(InnerClassAccessFlags::INTERFACE) {
            TypeKind::Interface
        } else if flags.contains(InnerClassAccessFlags::ENUM) {
            TypeKind::Enum
        } else {
            TypeKind::Class
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Annotation => "@interface",
        }
    }

    fn is_interface(self) -> bool {
        matches!(self, TypeKind::Interface | TypeKind::Annotation)
    }
}

/// Names visible in a method body.
struct Scope<'m> {
    locals: Option<&'m LocalVariables>,
    names: HashSet<&'m str>,
}

impl<'m> Scope<'m> {
    fn empty() -> Self {
        Scope {
            locals: None,
            names: HashSet::new(),
        }
    }

    fn of(locals: &'m LocalVariables) -> Self {
        Scope {
            locals: Some(locals),
            names: locals
                .iter()
                .filter(|(_, v)| !v.to_be_removed)
                .map(|(_, v)| v.name.as_str())
                .collect(),
        }
    }

    fn name(&self, id: LocalId) -> String {
        match self.locals {
            Some(locals) if id < locals.len() && !locals.get(id).name.is_empty() => locals.get(id).name.clone(),
            _ => format!("$local{id}"),
        }
    }

    /// A local of this name hides the field.
    fn shadows(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

struct ClassWriter<'a> {
    config: &'a DecompilerConfig,
    resolver: TypeResolver,
    out: Vec<Fragment>,
    line: Vec<Token>,
    depth: usize,
    /// Internal name of the type being written.
    current: String,
    /// Types being written, outermost first. Lambda bodies and anonymous
    /// classes are looked up here.
    classes: Vec<&'a DecompiledClass>,
}

impl<'a> ClassWriter<'a> {
    // ------------------------------------------------------------
    // token plumbing
    // ------------------------------------------------------------

    fn token(&mut self, token: Token) {
        self.line.push(token);
    }

    fn text(&mut self, text: impl Into<String>) {
        self.line.push(Token::Text(text.into()));
    }

    fn keyword(&mut self, keyword: &'static str) {
        self.line.push(Token::Keyword(keyword));
    }

    fn end_line(&mut self) {
        let tokens = std::mem::take(&mut self.line);
        self.out.push(Fragment::Line(tokens));
    }

    fn indent(&mut self) {
        self.out.push(Fragment::Indent);
        self.depth += 1;
    }

    fn unindent(&mut self) {
        self.out.push(Fragment::Unindent);
        self.depth = self.depth.saturating_sub(1);
    }

    fn spacer(&mut self, tag: LayoutTag) {
        self.out.push(Fragment::Spacer(LayoutBlock::for_tag(tag, self.depth)));
    }

    fn comment_line(&mut self, text: String) {
        self.token(Token::Start(Marker::Comment));
        self.text(format!("// {text}"));
        self.token(Token::End(Marker::Comment));
        self.end_line();
    }

    fn error_line(&mut self, error: &DecompileError) {
        self.token(Token::Start(Marker::Error));
        self.text(format!("// INTERNAL ERROR: {error}"));
        self.token(Token::End(Marker::Error));
        self.end_line();
    }

    fn type_ref(&mut self, ty: &Type) {
        match ty.primitive_flags() {
            Some(flags) => self.keyword(flags.keyword()),
            None => {
                let name = self.resolver.display(ty);
                self.token(Token::Reference {
                    kind: ReferenceKind::Type,
                    internal_name: ty.internal_name().unwrap_or_default().to_string(),
                    name,
                    descriptor: ty.descriptor(),
                    owner: self.current.clone(),
                });
            }
        }
    }

    fn class_ref(&mut self, internal_name: &str) {
        let ty = class_constant_type(internal_name).unwrap_or_else(|| Type::object(internal_name));
        self.type_ref(&ty);
    }

    fn member_spacer(&mut self, first: &mut bool) {
        if !*first {
            self.spacer(LayoutTag::Member);
        }
        *first = false;
    }

    // ------------------------------------------------------------
    // types and members
    // ------------------------------------------------------------

    fn write_type(&mut self, decompiled: &'a DecompiledClass) {
        let previous = std::mem::replace(&mut self.current, decompiled.this_class.clone());
        self.classes.push(decompiled);
        let class = &decompiled.class;
        let pool = &class.const_pool;
        let flags = decompiled
            .member_flags
            .unwrap_or_else(|| InnerClassAccessFlags::from_bits_truncate(class.access_flags.bits()));
        let kind = TypeKind::of(flags);

        self.annotations(pool, class.attributes.annotations(), false);
        self.token(Token::Start(Marker::TypeDeclaration));
        if let Err(e) = self.type_header(decompiled, flags, kind) {
            self.line.clear();
            self.error_line(&e);
            self.text(format!("{} {} {{", kind.keyword(), simple_class_name(&decompiled.this_class)));
        }
        self.end_line();
        self.indent();
        self.spacer(LayoutTag::BodyStart);
        self.members(decompiled, kind, false);
        self.spacer(LayoutTag::BodyEnd);
        self.unindent();
        self.text("}");
        self.token(Token::End(Marker::TypeDeclaration));
        self.end_line();
        self.classes.pop();
        self.current = previous;
    }

    /// Fields, methods and member types of a type body. Anonymous bodies
    /// leave out constructors.
    fn members(&mut self, decompiled: &'a DecompiledClass, kind: TypeKind, anonymous: bool) {
        let class = &decompiled.class;
        let pool = &class.const_pool;
        let clinit = decompiled.method("<clinit>");
        let enum_constants: Vec<&FieldInfo> = if kind == TypeKind::Enum {
            class
                .fields
                .iter()
                .filter(|f| f.access_flags.contains(FieldAccessFlags::ENUM))
                .collect()
        } else {
            Vec::new()
        };
        let mut first = true;
        if kind == TypeKind::Enum {
            self.member_spacer(&mut first);
            self.enum_constants(pool, &enum_constants, clinit);
        }
        for field in &class.fields {
            if field.is_synthetic() || enum_constants.iter().any(|c| std::ptr::eq(*c, field)) {
                continue;
            }
            let name = pool.utf8(field.name_index).unwrap_or_default();
            if name == ASSERTIONS_DISABLED || (kind == TypeKind::Enum && name == ENUM_VALUES) {
                continue;
            }
            self.member_spacer(&mut first);
            if let Err(e) = self.field(pool, field, kind) {
                self.line.clear();
                self.error_line(&e);
            }
        }
        let enum_names: Vec<&str> = enum_constants
            .iter()
            .filter_map(|f| pool.utf8(f.name_index).ok())
            .collect();
        for (info, method) in class.methods.iter().zip(&decompiled.methods) {
            if (anonymous && method.name == "<init>") || !self.is_visible(decompiled, kind, info, method, &enum_names) {
                continue;
            }
            self.member_spacer(&mut first);
            if let Err(e) = self.method(decompiled, kind, info, method, &enum_names) {
                self.line.clear();
                self.error_line(&e);
            }
        }
        for inner in &decompiled.inner_classes {
            self.member_spacer(&mut first);
            self.write_type(inner);
        }
    }

    /// `new Base(args) { members }`, continuing the current line.
    fn anonymous_class(&mut self, anonymous: &'a DecompiledClass, args: &[Expr], scope: &Scope) {
        let class = &anonymous.class;
        let super_name = class.super_class_name().ok().flatten().unwrap_or("java/lang/Object");
        let interfaces = class.interface_names().unwrap_or_default();
        let base = match interfaces.as_slice() {
            [only] if super_name == "java/lang/Object" => *only,
            _ => super_name,
        };
        self.keyword("new");
        self.text(" ");
        self.class_ref(base);
        self.arguments(&anonymous_super_args(anonymous, args), scope);
        self.text(" {");
        self.end_line();
        self.indent();
        let previous = std::mem::replace(&mut self.current, anonymous.this_class.clone());
        self.classes.push(anonymous);
        self.members(anonymous, TypeKind::Class, true);
        self.classes.pop();
        self.current = previous;
        self.unindent();
        self.text("}");
    }

    fn find_anonymous(&self, internal_name: &str) -> Option<&'a DecompiledClass> {
        self.classes
            .iter()
            .rev()
            .copied()
            .flat_map(|c| c.anonymous_classes.iter())
            .find(|a| a.this_class == internal_name)
    }

    /// The synthetic method holding a lambda body, with its class file entry.
    fn find_lambda(&self, owner: &str, name: &str) -> Option<(&'a MethodInfo, &'a DecompiledMethod)> {
        let class: &'a DecompiledClass = self.classes.iter().rev().copied().find(|c| c.this_class == owner)?;
        class
            .class
            .methods
            .iter()
            .zip(&class.methods)
            .find(|(_, m)| m.name == name)
    }

    /// `(a, b) -> body`. The first `captured` arguments of the synthetic
    /// method are values captured from the enclosing scope.
    fn lambda(&mut self, info: &'a MethodInfo, method: &'a DecompiledMethod, captured: usize) {
        let skip = if info.access_flags.contains(MethodAccessFlags::STATIC) {
            captured
        } else {
            captured.saturating_sub(1)
        };
        let names: Vec<&str> = method.parameter_names.iter().skip(skip).map(String::as_str).collect();
        match names.as_slice() {
            [only] => self.text(*only),
            _ => self.text(format!("({})", names.join(", "))),
        }
        self.text(" -> ");
        match &method.body {
            MethodBody::Decompiled { statements, locals, .. } => {
                let scope = Scope::of(locals);
                if let [only] = statements.as_slice() {
                    if let InstructionKind::Return(Some(e)) | InstructionKind::Expression(e) = &only.kind {
                        self.expr(e, &scope);
                        return;
                    }
                }
                self.text("{");
                self.end_line();
                self.indent();
                self.statements(statements, &scope);
                self.unindent();
                self.text("}");
            }
            MethodBody::Failed(e) => {
                self.text("{");
                self.end_line();
                self.indent();
                self.error_line(e);
                self.unindent();
                self.text("}");
            }
            MethodBody::Absent => self.text("{}"),
        }
    }

    fn type_header(&mut self, decompiled: &DecompiledClass, flags: InnerClassAccessFlags, kind: TypeKind) -> Result<()> {
        let class = &decompiled.class;
        let pool = &class.const_pool;
        if flags.contains(InnerClassAccessFlags::PUBLIC) {
            self.keyword("public");
            self.text(" ");
        } else if flags.contains(InnerClassAccessFlags::PROTECTED) {
            self.keyword("protected");
            self.text(" ");
        } else if flags.contains(InnerClassAccessFlags::PRIVATE) {
            self.keyword("private");
            self.text(" ");
        }
        if kind == TypeKind::Class {
            for (flag, keyword) in [
                (InnerClassAccessFlags::STATIC, "static"),
                (InnerClassAccessFlags::ABSTRACT, "abstract"),
                (InnerClassAccessFlags::FINAL, "final"),
            ] {
                if flags.contains(flag) {
                    self.keyword(keyword);
                    self.text(" ");
                }
            }
        }
        self.keyword(kind.keyword());
        self.text(" ");
        self.token(Token::Declaration {
            kind: ReferenceKind::Type,
            internal_name: decompiled.this_class.clone(),
            name: simple_class_name(&decompiled.this_class).to_string(),
            descriptor: String::new(),
        });

        let signature = class
            .attributes
            .signature_index()
            .and_then(|i| pool.utf8(i).ok())
            .and_then(parse_class_signature);
        if let Some(sig) = &signature {
            self.type_parameters(&sig.type_parameters);
        }

        if kind == TypeKind::Class {
            if let Some(super_name) = class.super_class_name()? {
                if super_name != "java/lang/Object" {
                    self.text(" ");
                    self.keyword("extends");
                    self.text(" ");
                    if decompiled.super_resolved {
                        match &signature {
                            Some(sig) => self.type_ref(&sig.super_type),
                            None => self.class_ref(super_name),
                        }
                    } else {
                        // Not loadable: keep the raw name and leave it out of the imports.
                        self.token(Token::Reference {
                            kind: ReferenceKind::Type,
                            internal_name: super_name.to_string(),
                            name: internal_to_source_name(super_name),
                            descriptor: format!("L{super_name};"),
                            owner: self.current.clone(),
                        });
                    }
                }
            }
        }

        if kind != TypeKind::Annotation {
            let interfaces: Vec<Type> = match &signature {
                Some(sig) => sig.interfaces.0.clone(),
                None => class.interface_names()?.into_iter().map(Type::object).collect(),
            };
            if !interfaces.is_empty() {
                self.text(" ");
                self.keyword(if kind == TypeKind::Interface { "extends" } else { "implements" });
                self.text(" ");
                for (i, ty) in interfaces.iter().enumerate() {
                    if i > 0 {
                        self.text(", ");
                    }
                    self.type_ref(ty);
                }
            }
        }
        self.text(" {");
        Ok(())
    }

    fn type_parameters(&mut self, parameters: &[TypeParameter]) {
        if parameters.is_empty() {
            return;
        }
        self.text("<");
        for (i, parameter) in parameters.iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.text(parameter.name.clone());
            let bounds: Vec<&Type> = parameter
                .bounds
                .iter()
                .filter(|b| !b.is_object("java/lang/Object"))
                .collect();
            for (j, bound) in bounds.iter().enumerate() {
                self.text(if j == 0 { " extends " } else { " & " });
                self.type_ref(bound);
            }
        }
        self.text(">");
    }

    fn annotations(&mut self, pool: &ConstantPool, annotations: Vec<&RuntimeAnnotation>, inline: bool) {
        for annotation in annotations {
            match self.resolver.annotation(pool, annotation) {
                Ok(resolved) => {
                    self.annotation(&resolved);
                    if inline {
                        self.text(" ");
                    } else {
                        self.end_line();
                    }
                }
                Err(e) => log::warn!("{}: skipping annotation: {}", self.current, e),
            }
        }
    }

    fn annotation(&mut self, annotation: &AnnotationRef) {
        self.text("@");
        self.type_ref(&annotation.ty);
        if annotation.elements.is_empty() {
            return;
        }
        self.text("(");
        if let [(name, value)] = annotation.elements.as_slice() {
            if name == "value" {
                self.element(value);
                self.text(")");
                return;
            }
        }
        for (i, (name, value)) in annotation.elements.iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.text(format!("{name} = "));
            self.element(value);
        }
        self.text(")");
    }

    fn element(&mut self, value: &ElementRef) {
        match value {
            ElementRef::Constant(e) => self.expr(e, &Scope::empty()),
            ElementRef::Enum { ty, name } => {
                self.type_ref(ty);
                self.text(format!(".{name}"));
            }
            ElementRef::Class(ty) => {
                self.type_ref(ty);
                self.text(".class");
            }
            ElementRef::Annotation(a) => self.annotation(a),
            ElementRef::Array(values) => {
                self.text("{");
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.text(", ");
                    }
                    self.element(v);
                }
                self.text("}");
            }
        }
    }

    fn enum_constants(&mut self, pool: &ConstantPool, constants: &[&FieldInfo], clinit: Option<&DecompiledMethod>) {
        if constants.is_empty() {
            self.text(";");
            self.end_line();
            return;
        }
        let initializers = clinit.map(|m| m.statements()).unwrap_or_default();
        let empty = Scope::empty();
        let last = constants.len() - 1;
        for (i, field) in constants.iter().enumerate() {
            let name = pool.utf8(field.name_index).unwrap_or("$constant");
            let store = initializers.iter().find(|s| {
                matches!(&s.kind, InstructionKind::FieldStore { object: None, owner, name: n, .. }
                    if owner == &self.current && n == name)
            });
            self.annotations(pool, field.attributes.annotations(), false);
            if let Some(store) = store {
                self.begin(store);
            }
            self.token(Token::Declaration {
                kind: ReferenceKind::Field,
                internal_name: self.current.clone(),
                name: name.to_string(),
                descriptor: pool.utf8(field.descriptor_index).unwrap_or_default().to_string(),
            });
            if let Some(InstructionKind::FieldStore {
                value: Expr::New { args, .. },
                ..
            }) = store.map(|s| &s.kind)
            {
                if args.len() > 2 {
                    self.arguments(&args[2..], &empty);
                }
            }
            self.text(if i == last { ";" } else { "," });
            if store.is_some() {
                self.token(Token::End(Marker::Statement));
            }
            self.end_line();
        }
    }

    fn field(&mut self, pool: &ConstantPool, field: &FieldInfo, kind: TypeKind) -> Result<()> {
        let name = pool.utf8(field.name_index)?;
        let descriptor = pool.utf8(field.descriptor_index)?;
        let ty = field
            .attributes
            .signature_index()
            .and_then(|i| pool.utf8(i).ok())
            .and_then(parse_type)
            .or_else(|| parse_type(descriptor))
            .ok_or_else(|| DecompileError::malformed_constant(field.descriptor_index, format!("bad field descriptor {descriptor}")))?;
        let initializer = match field.constant_value() {
            Some(c) => Some(constant_initializer(pool, c.constant_value_index, &ty)?),
            None => None,
        };

        self.annotations(pool, field.attributes.annotations(), false);
        if !kind.is_interface() {
            for (flag, keyword) in [
                (FieldAccessFlags::PUBLIC, "public"),
                (FieldAccessFlags::PROTECTED, "protected"),
                (FieldAccessFlags::PRIVATE, "private"),
                (FieldAccessFlags::STATIC, "static"),
                (FieldAccessFlags::FINAL, "final"),
                (FieldAccessFlags::VOLATILE, "volatile"),
                (FieldAccessFlags::TRANSIENT, "transient"),
            ] {
                if field.access_flags.contains(flag) {
                    self.keyword(keyword);
                    self.text(" ");
                }
            }
        }
        self.type_ref(&ty);
        self.text(" ");
        self.token(Token::Declaration {
            kind: ReferenceKind::Field,
            internal_name: self.current.clone(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        if let Some(value) = initializer {
            self.text(" = ");
            self.expr(&value, &Scope::empty());
        }
        self.text(";");
        self.end_line();
        Ok(())
    }

    fn is_visible(
        &self,
        decompiled: &DecompiledClass,
        kind: TypeKind,
        info: &MethodInfo,
        method: &DecompiledMethod,
        enum_names: &[&str],
    ) -> bool {
        if info.is_synthetic() {
            return false;
        }
        let is_static = info.access_flags.contains(MethodAccessFlags::STATIC);
        if kind == TypeKind::Enum && is_static {
            let values = format!("()[L{};", decompiled.this_class);
            let value_of = format!("(Ljava/lang/String;)L{};", decompiled.this_class);
            if (method.name == "values" && method.descriptor == values)
                || (method.name == "valueOf" && method.descriptor == value_of)
            {
                return false;
            }
        }
        match method.name.as_str() {
            "<clinit>" => {
                method.contains_error()
                    || !self
                        .initializer_statements(method.statements(), kind, enum_names)
                        .is_empty()
            }
            "<init>" if !self.config.write_default_constructor => !self.is_default_constructor(decompiled, kind, method),
            _ => true,
        }
    }

    fn is_default_constructor(&self, decompiled: &DecompiledClass, kind: TypeKind, method: &DecompiledMethod) -> bool {
        let implicit = match kind {
            TypeKind::Enum => "(Ljava/lang/String;I)V",
            _ if has_outer_parameter(decompiled, method) => {
                return method.signature.parameters.len() == 1
                    && !method.contains_error()
                    && matches!(method.body, MethodBody::Decompiled { .. })
                    && self.constructor_statements(kind, method.statements()).is_empty();
            }
            _ => "()V",
        };
        method.descriptor == implicit
            && !method.contains_error()
            && matches!(method.body, MethodBody::Decompiled { .. })
            && self.constructor_statements(kind, method.statements()).is_empty()
    }

    /// Static initializer statements minus the ones the class header
    /// already accounts for.
    fn initializer_statements<'s>(&self, statements: &'s [Instruction], kind: TypeKind, enum_names: &[&str]) -> Vec<&'s Instruction> {
        statements
            .iter()
            .filter(|s| match &s.kind {
                InstructionKind::FieldStore {
                    object: None,
                    owner,
                    name,
                    ..
                } if owner == &self.current => {
                    name != ASSERTIONS_DISABLED
                        && !(kind == TypeKind::Enum && (name == ENUM_VALUES || enum_names.contains(&name.as_str())))
                }
                _ => true,
            })
            .collect()
    }

    /// Constructor statements without the implicit superclass call and
    /// without the stores of the enclosing instance and captured values.
    fn constructor_statements<'s>(&self, kind: TypeKind, statements: &'s [Instruction]) -> Vec<&'s Instruction> {
        let implicit_args = if kind == TypeKind::Enum { 2 } else { 0 };
        let statements: Vec<&Instruction> = statements
            .iter()
            .filter(|s| match &s.kind {
                InstructionKind::FieldStore {
                    object: Some(object),
                    owner,
                    name,
                    ..
                } => !(*object == Expr::This
                    && owner == &self.current
                    && (name.starts_with("this$") || name.starts_with("val$"))),
                _ => true,
            })
            .collect();
        let skip = match statements.first().map(|s| &s.kind) {
            Some(InstructionKind::Expression(Expr::Invoke {
                kind: InvokeKind::Special,
                object: Some(object),
                owner,
                name,
                args,
                ..
            })) if name == "<init>"
                && **object == Expr::This
                && owner != &self.current
                && args.len() == implicit_args =>
            {
                1
            }
            _ => 0,
        };
        statements.into_iter().skip(skip).collect()
    }

    fn method(
        &mut self,
        decompiled: &DecompiledClass,
        kind: TypeKind,
        info: &MethodInfo,
        method: &DecompiledMethod,
        enum_names: &[&str],
    ) -> Result<()> {
        let pool = &decompiled.class.const_pool;
        let flags = info.access_flags;
        let is_constructor = method.name == "<init>";
        let is_initializer = method.name == "<clinit>";
        let throws: Vec<Type> = if method.signature.exceptions.is_empty() {
            info.exceptions()
                .iter()
                .map(|i| pool.class_name(*i).map(Type::object))
                .collect::<Result<_>>()?
        } else {
            method.signature.exceptions.0.clone()
        };
        let default_value = info.attributes.iter().find_map(|a| match a {
            Attribute::AnnotationDefault(v) => Some(v),
            _ => None,
        });
        let default_value = match default_value {
            Some(v) => Some(self.resolver.element_value(pool, v)?),
            None => None,
        };

        self.annotations(pool, info.attributes.annotations(), false);
        if is_initializer {
            self.keyword("static");
        } else {
            self.method_modifiers(kind, flags, is_constructor);
            self.type_parameters(&method.signature.type_parameters);
            if !method.signature.type_parameters.is_empty() {
                self.text(" ");
            }
            if !is_constructor {
                self.type_ref(&method.signature.return_type);
                self.text(" ");
            }
            let name = if is_constructor {
                simple_class_name(&self.current).to_string()
            } else {
                method.name.clone()
            };
            self.token(Token::Declaration {
                kind: if is_constructor {
                    ReferenceKind::Constructor
                } else {
                    ReferenceKind::Method
                },
                internal_name: self.current.clone(),
                name,
                descriptor: method.descriptor.clone(),
            });
            self.parameters(decompiled, kind, info, method, is_constructor);
            if !throws.is_empty() {
                self.text(" ");
                self.keyword("throws");
                self.text(" ");
                for (i, ty) in throws.iter().enumerate() {
                    if i > 0 {
                        self.text(", ");
                    }
                    self.type_ref(ty);
                }
            }
        }

        match &method.body {
            MethodBody::Absent => {
                if let Some(value) = &default_value {
                    self.text(" ");
                    self.keyword("default");
                    self.text(" ");
                    self.element(value);
                }
                self.text(";");
                self.end_line();
            }
            MethodBody::Failed(e) => {
                self.text(" {");
                self.end_line();
                self.indent();
                self.error_line(e);
                self.unindent();
                self.text("}");
                self.end_line();
            }
            MethodBody::Decompiled {
                statements,
                locals,
                errors,
            } => {
                let body = if is_initializer {
                    self.initializer_statements(statements, kind, enum_names)
                } else if is_constructor {
                    self.constructor_statements(kind, statements)
                } else {
                    statements.iter().collect()
                };
                self.text(" {");
                self.end_line();
                self.indent();
                self.spacer(LayoutTag::BodyStart);
                for e in errors {
                    self.comment_line(e.to_string());
                }
                let scope = Scope::of(locals);
                self.statements(body, &scope);
                self.spacer(LayoutTag::BodyEnd);
                self.unindent();
                self.text("}");
                self.end_line();
            }
        }
        Ok(())
    }

    fn method_modifiers(&mut self, kind: TypeKind, flags: MethodAccessFlags, is_constructor: bool) {
        let mut keywords: Vec<&'static str> = Vec::new();
        if kind.is_interface() {
            if flags.contains(MethodAccessFlags::PRIVATE) {
                keywords.push("private");
            }
            if flags.contains(MethodAccessFlags::STATIC) {
                keywords.push("static");
            } else if !flags.intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::PRIVATE) {
                keywords.push("default");
            }
        } else {
            if !(kind == TypeKind::Enum && is_constructor) {
                if flags.contains(MethodAccessFlags::PUBLIC) {
                    keywords.push("public");
                } else if flags.contains(MethodAccessFlags::PROTECTED) {
                    keywords.push("protected");
                } else if flags.contains(MethodAccessFlags::PRIVATE) {
                    keywords.push("private");
                }
            }
            for (flag, keyword) in [
                (MethodAccessFlags::STATIC, "static"),
                (MethodAccessFlags::ABSTRACT, "abstract"),
                (MethodAccessFlags::FINAL, "final"),
                (MethodAccessFlags::SYNCHRONIZED, "synchronized"),
                (MethodAccessFlags::NATIVE, "native"),
            ] {
                if flags.contains(flag) {
                    keywords.push(keyword);
                }
            }
        }
        for keyword in keywords {
            self.keyword(keyword);
            self.text(" ");
        }
    }

    fn parameters(
        &mut self,
        decompiled: &DecompiledClass,
        kind: TypeKind,
        info: &MethodInfo,
        method: &DecompiledMethod,
        is_constructor: bool,
    ) {
        let pool = &decompiled.class.const_pool;
        let types = &method.signature.parameters.0;
        // Enum constructors receive the constant name and ordinal first,
        // inner class constructors the enclosing instance.
        let skip = if kind == TypeKind::Enum && is_constructor && types.len() >= 2 {
            2
        } else if is_constructor && has_outer_parameter(decompiled, method) {
            1
        } else {
            0
        };
        let annotations = info.parameter_annotations();
        let varargs = info.access_flags.contains(MethodAccessFlags::VARARGS);
        self.text("(");
        for (i, ty) in types.iter().enumerate().skip(skip) {
            if i > skip {
                self.text(", ");
            }
            if let Some(list) = annotations.get(i - skip) {
                self.annotations(pool, list.clone(), true);
            }
            if varargs && i + 1 == types.len() && ty.dimension() > 0 {
                self.type_ref(&ty.element_type());
                self.text("...");
            } else {
                self.type_ref(ty);
            }
            self.text(" ");
            let name = method
                .parameter_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("arg{i}"));
            self.text(name);
        }
        self.text(")");
    }

    fn metadata(&mut self, decompiled: &DecompiledClass, location: Option<&str>) {
        let class = &decompiled.class;
        let location = location
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.class", decompiled.this_class));
        self.spacer(LayoutTag::Trailer);
        let lines = [
            format!("/* Location:              {location}"),
            format!(
                " * Java compiler version: {} ({}.{})",
                class.java_version(),
                class.major_version,
                class.minor_version
            ),
            format!(" * Decompiler version:    {DECOMPILER_VERSION}"),
            " */".to_string(),
        ];
        let last = lines.len() - 1;
        for (i, line) in lines.into_iter().enumerate() {
            if i == 0 {
                self.token(Token::Start(Marker::Comment));
            }
            self.text(line);
            if i == last {
                self.token(Token::End(Marker::Comment));
            }
            self.end_line();
        }
    }

    // ------------------------------------------------------------
    // statements
    // ------------------------------------------------------------

    fn statements<'s>(&mut self, list: impl IntoIterator<Item = &'s Instruction>, scope: &Scope) {
        for (i, instruction) in list.into_iter().enumerate() {
            if i > 0 {
                self.spacer(LayoutTag::Statement);
            }
            self.statement(instruction, scope);
        }
    }

    fn body(&mut self, list: &[Instruction], scope: &Scope) {
        self.indent();
        self.statements(list, scope);
        self.unindent();
    }

    fn begin(&mut self, instruction: &Instruction) {
        self.token(Token::Start(Marker::Statement));
        if let Some(line) = instruction.line_number {
            self.token(Token::LineNumber(u32::from(line)));
        }
    }

    fn finish(&mut self) {
        self.token(Token::End(Marker::Statement));
        self.end_line();
    }

    fn closing_brace(&mut self) {
        self.text("}");
        self.end_line();
    }

    fn loop_label(&mut self, label: &Option<String>) {
        if let Some(label) = label {
            self.text(format!("{label}:"));
            self.end_line();
        }
    }

    fn statement(&mut self, instruction: &Instruction, scope: &Scope) {
        use InstructionKind::*;
        match &instruction.kind {
            Store { local, value } => {
                self.begin(instruction);
                self.text(scope.name(*local));
                self.text(" = ");
                self.expr(value, scope);
                self.text(";");
                self.finish();
            }
            Declaration { local, value } => {
                self.begin(instruction);
                self.declaration(*local, value.as_ref(), scope);
                self.text(";");
                self.finish();
            }
            FieldStore {
                object,
                owner,
                name,
                ty,
                value,
            } => {
                self.begin(instruction);
                self.field_access(object.as_ref(), owner, name, ty, scope);
                self.text(" = ");
                self.expr(value, scope);
                self.text(";");
                self.finish();
            }
            ArrayStore { array, index, value } => {
                self.begin(instruction);
                self.operand(array, 16, scope);
                self.text("[");
                self.expr(index, scope);
                self.text("] = ");
                self.expr(value, scope);
                self.text(";");
                self.finish();
            }
            Expression(e) => {
                self.begin(instruction);
                self.expr(e, scope);
                self.text(";");
                self.finish();
            }
            Return(value) => {
                self.begin(instruction);
                self.keyword("return");
                if let Some(value) = value {
                    self.text(" ");
                    self.expr(value, scope);
                }
                self.text(";");
                self.finish();
            }
            Throw(e) => {
                self.begin(instruction);
                self.keyword("throw");
                self.text(" ");
                self.expr(e, scope);
                self.text(";");
                self.finish();
            }
            MonitorEnter(e) | MonitorExit(e) => {
                let op = if matches!(instruction.kind, MonitorEnter(_)) {
                    "monitorenter"
                } else {
                    "monitorexit"
                };
                self.token(Token::Start(Marker::Comment));
                self.text(format!("// {op} "));
                self.expr(e, scope);
                self.token(Token::End(Marker::Comment));
                self.end_line();
            }
            Push(e) => {
                self.token(Token::Start(Marker::Comment));
                self.text("// push ");
                self.expr(e, scope);
                self.token(Token::End(Marker::Comment));
                self.end_line();
            }
            Branch(branch) => {
                self.token(Token::Start(Marker::Comment));
                self.text("// ");
                if let Some(condition) = &branch.condition {
                    self.text("if (");
                    self.expr(condition, scope);
                    self.text(") ");
                }
                self.text(format!("goto L{}", branch.target()));
                self.token(Token::End(Marker::Comment));
                self.end_line();
            }
            Switch(switch) => {
                self.token(Token::Start(Marker::Comment));
                self.text("// switch (");
                self.expr(&switch.selector, scope);
                self.text(format!(") default: goto L{}", switch.default_target));
                self.token(Token::End(Marker::Comment));
                self.end_line();
            }
            If {
                condition,
                then_body,
                else_body,
            } => {
                self.begin(instruction);
                self.keyword("if");
                self.text(" (");
                self.expr(condition, scope);
                self.text(") {");
                self.finish();
                self.body(then_body, scope);
                let mut rest = else_body.as_ref();
                while let Some(list) = rest {
                    self.text("} ");
                    match list.as_slice() {
                        [nested @ Instruction {
                            kind:
                                If {
                                    condition,
                                    then_body,
                                    else_body,
                                },
                            ..
                        }] => {
                            self.begin(nested);
                            self.keyword("else");
                            self.text(" ");
                            self.keyword("if");
                            self.text(" (");
                            self.expr(condition, scope);
                            self.text(") {");
                            self.finish();
                            self.body(then_body, scope);
                            rest = else_body.as_ref();
                        }
                        _ => {
                            self.keyword("else");
                            self.text(" {");
                            self.end_line();
                            self.body(list, scope);
                            rest = None;
                        }
                    }
                }
                self.closing_brace();
            }
            While { label, condition, body } => {
                self.loop_label(label);
                self.begin(instruction);
                self.keyword("while");
                self.text(" (");
                self.expr(condition, scope);
                self.text(") {");
                self.finish();
                self.body(body, scope);
                self.closing_brace();
            }
            DoWhile { label, body, condition } => {
                self.loop_label(label);
                self.keyword("do");
                self.text(" {");
                self.end_line();
                self.body(body, scope);
                self.text("} ");
                self.keyword("while");
                self.text(" (");
                self.expr(condition, scope);
                self.text(");");
                self.end_line();
            }
            For {
                label,
                init,
                condition,
                update,
                body,
            } => {
                self.loop_label(label);
                self.begin(instruction);
                self.keyword("for");
                self.text(" (");
                if let Some(init) = init {
                    self.inline_statement(init, scope);
                }
                self.text(";");
                if let Some(condition) = condition {
                    self.text(" ");
                    self.expr(condition, scope);
                }
                self.text(";");
                for (i, u) in update.iter().enumerate() {
                    self.text(if i == 0 { " " } else { ", " });
                    self.inline_statement(u, scope);
                }
                self.text(") {");
                self.finish();
                self.body(body, scope);
                self.closing_brace();
            }
            SwitchBlock { selector, cases } => {
                self.begin(instruction);
                self.keyword("switch");
                self.text(" (");
                self.expr(selector, scope);
                self.text(") {");
                self.finish();
                let is_char = scope
                    .locals
                    .map_or(false, |l| selector.ty(l).primitive_flags() == Some(PrimitiveFlags::CHAR));
                self.indent();
                for case in cases {
                    for label in &case.labels {
                        match label {
                            Some(v) => {
                                self.keyword("case");
                                self.text(" ");
                                let constant = if is_char && (0..=0xFFFF).contains(v) {
                                    char_literal(*v as u16)
                                } else {
                                    v.to_string()
                                };
                                self.token(Token::NumericConstant(constant));
                                self.text(":");
                            }
                            None => {
                                self.keyword("default");
                                self.text(":");
                            }
                        }
                        self.end_line();
                    }
                    self.body(&case.body, scope);
                }
                self.unindent();
                self.closing_brace();
            }
            Try { body, catches, finally } => {
                self.keyword("try");
                self.text(" {");
                self.end_line();
                self.body(body, scope);
                for clause in catches {
                    self.text("} ");
                    self.keyword("catch");
                    self.text(" (");
                    if clause.types.is_empty() {
                        self.class_ref("java/lang/Throwable");
                    }
                    for (i, ty) in clause.types.iter().enumerate() {
                        if i > 0 {
                            self.text(" | ");
                        }
                        self.class_ref(ty);
                    }
                    let name = clause.local.map_or_else(|| "ex".to_string(), |l| scope.name(l));
                    self.text(format!(" {name}) {{"));
                    self.end_line();
                    self.body(&clause.body, scope);
                }
                if let Some(finally) = finally {
                    self.text("} ");
                    self.keyword("finally");
                    self.text(" {");
                    self.end_line();
                    self.body(finally, scope);
                }
                self.closing_brace();
            }
            Synchronized { monitor, body } => {
                self.begin(instruction);
                self.keyword("synchronized");
                self.text(" (");
                self.expr(monitor, scope);
                self.text(") {");
                self.finish();
                self.body(body, scope);
                self.closing_brace();
            }
            Assert { condition, message } => {
                self.begin(instruction);
                self.keyword("assert");
                self.text(" ");
                self.expr(condition, scope);
                if let Some(message) = message {
                    self.text(" : ");
                    self.expr(message, scope);
                }
                self.text(";");
                self.finish();
            }
            Break(label) | Continue(label) => {
                self.begin(instruction);
                self.keyword(if matches!(instruction.kind, Break(_)) {
                    "break"
                } else {
                    "continue"
                });
                if let Some(label) = label {
                    self.text(format!(" {label}"));
                }
                self.text(";");
                self.finish();
            }
            Label(label) => self.comment_line(format!("{label}:")),
            Comment(text) => self.comment_line(text.clone()),
        }
    }

    /// A statement inside a `for` header, without its semicolon.
    fn inline_statement(&mut self, instruction: &Instruction, scope: &Scope) {
        match &instruction.kind {
            InstructionKind::Declaration { local, value } => self.declaration(*local, value.as_ref(), scope),
            InstructionKind::Store { local, value } => {
                self.text(scope.name(*local));
                self.text(" = ");
                self.expr(value, scope);
            }
            InstructionKind::FieldStore {
                object,
                owner,
                name,
                ty,
                value,
            } => {
                self.field_access(object.as_ref(), owner, name, ty, scope);
                self.text(" = ");
                self.expr(value, scope);
            }
            InstructionKind::ArrayStore { array, index, value } => {
                self.operand(array, 16, scope);
                self.text("[");
                self.expr(index, scope);
                self.text("] = ");
                self.expr(value, scope);
            }
            InstructionKind::Expression(e) => self.expr(e, scope),
            other => log::warn!("{}: statement {:?} cannot sit in a for header", self.current, other),
        }
    }

    fn declaration(&mut self, local: LocalId, value: Option<&Expr>, scope: &Scope) {
        let ty = scope
            .locals
            .filter(|l| local < l.len())
            .map_or_else(Type::object_root, |l| l.get(local).ty.clone());
        self.type_ref(&ty);
        self.text(" ");
        self.text(scope.name(local));
        if let Some(value) = value {
            self.text(" = ");
            self.expr(value, scope);
        }
    }

    // ------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------

    fn expr(&mut self, e: &Expr, scope: &Scope) {
        self.operand(e, 0, scope);
    }

    /// Writes `e`, parenthesized when it binds looser than `min`.
    fn operand(&mut self, e: &Expr, min: u8, scope: &Scope) {
        let e = strip_dup(e);
        if e.precedence() < min {
            self.text("(");
            self.expression(e, scope);
            self.text(")");
        } else {
            self.expression(e, scope);
        }
    }

    fn arguments(&mut self, args: &[Expr], scope: &Scope) {
        self.text("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.expr(arg, scope);
        }
        self.text(")");
    }

    fn optional_this(&mut self) {
        self.token(Token::Start(Marker::OptionalPrefix));
        self.keyword("this");
        self.text(".");
        self.token(Token::End(Marker::OptionalPrefix));
    }

    fn field_access(&mut self, object: Option<&Expr>, owner: &str, name: &str, ty: &Type, scope: &Scope) {
        if matches!(object.map(strip_dup), Some(Expr::This)) && owner == self.current {
            if let Some(captured) = name.strip_prefix("val$") {
                self.text(captured);
                return;
            }
            if name.starts_with("this$") {
                if let Some(outer) = ty.internal_name() {
                    self.class_ref(outer);
                    self.text(".");
                    self.keyword("this");
                    return;
                }
            }
        }
        match object.map(strip_dup) {
            Some(Expr::This) => {
                if scope.shadows(name) {
                    self.keyword("this");
                    self.text(".");
                } else {
                    self.optional_this();
                }
            }
            Some(o) => {
                self.operand(o, 16, scope);
                self.text(".");
            }
            None => {
                if owner != self.current || scope.shadows(name) {
                    self.class_ref(owner);
                    self.text(".");
                }
            }
        }
        self.token(Token::Reference {
            kind: ReferenceKind::Field,
            internal_name: owner.to_string(),
            name: name.to_string(),
            descriptor: ty.descriptor(),
            owner: self.current.clone(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke(
        &mut self,
        kind: InvokeKind,
        object: Option<&Expr>,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: &[Expr],
        scope: &Scope,
    ) {
        if name == "<init>" {
            self.keyword(if owner == self.current { "this" } else { "super" });
            self.arguments(args, scope);
            return;
        }
        match (kind, object.map(strip_dup)) {
            (InvokeKind::Static, _) => {
                if owner != self.current {
                    self.class_ref(owner);
                    self.text(".");
                }
            }
            (InvokeKind::Special, Some(Expr::This)) if owner != self.current => {
                self.keyword("super");
                self.text(".");
            }
            (_, Some(Expr::This)) => self.optional_this(),
            (_, Some(o)) => {
                self.operand(o, 16, scope);
                self.text(".");
            }
            (_, None) => {}
        }
        self.token(Token::Reference {
            kind: ReferenceKind::Method,
            internal_name: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            owner: self.current.clone(),
        });
        self.arguments(args, scope);
    }

    fn expression(&mut self, e: &Expr, scope: &Scope) {
        match e {
            Expr::IntLiteral(v) => self.token(Token::NumericConstant(v.to_string())),
            Expr::LongLiteral(v) => self.token(Token::NumericConstant(format!("{v}L"))),
            Expr::FloatLiteral(v) => self.token(Token::NumericConstant(float_literal(*v))),
            Expr::DoubleLiteral(v) => self.token(Token::NumericConstant(double_literal(*v))),
            Expr::BooleanLiteral(b) => self.keyword(if *b { "true" } else { "false" }),
            Expr::CharLiteral(c) => self.token(Token::StringConstant {
                literal: char_literal(*c),
                owner: self.current.clone(),
            }),
            Expr::StringLiteral(s) => self.token(Token::StringConstant {
                literal: string_literal(s),
                owner: self.current.clone(),
            }),
            Expr::ClassLiteral(ty) => {
                self.type_ref(ty);
                self.text(".class");
            }
            Expr::NullLiteral => self.keyword("null"),
            Expr::Local(id) => self.text(scope.name(*id)),
            Expr::This => self.keyword("this"),
            Expr::Binary { op, left, right } => {
                let p = op.precedence();
                self.operand(left, p, scope);
                self.text(format!(" {} ", op.as_str()));
                self.operand(right, p + 1, scope);
            }
            Expr::Unary { op, operand } => {
                let (symbol, min) = match op {
                    UnaryOp::Neg => ("-", 15),
                    UnaryOp::Not => ("!", 14),
                    UnaryOp::BitNot => ("~", 14),
                };
                self.text(symbol);
                let negative_literal = matches!(operand.as_ref(), Expr::FloatLiteral(v) if v.is_sign_negative())
                    || matches!(operand.as_ref(), Expr::DoubleLiteral(v) if v.is_sign_negative());
                if negative_literal {
                    self.text("(");
                    self.expression(operand, scope);
                    self.text(")");
                } else {
                    self.operand(operand, min, scope);
                }
            }
            Expr::Logical { op, left, right } => {
                let p = e.precedence();
                self.operand(left, p, scope);
                self.text(match op {
                    LogicalOp::And => " && ",
                    LogicalOp::Or => " || ",
                });
                self.operand(right, p, scope);
            }
            Expr::Compare { op, left, right } => {
                let p = e.precedence();
                self.operand(left, p, scope);
                self.text(format!(" {} ", op.as_str()));
                self.operand(right, p + 1, scope);
            }
            Expr::CmpResult { kind, left, right } => {
                let owner = match kind {
                    CmpKind::LCmp => "java/lang/Long",
                    CmpKind::FCmpL | CmpKind::FCmpG => "java/lang/Float",
                    CmpKind::DCmpL | CmpKind::DCmpG => "java/lang/Double",
                };
                self.class_ref(owner);
                self.text(".compare");
                self.arguments(&[(**left).clone(), (**right).clone()], scope);
            }
            Expr::Cast { ty, operand } => {
                self.text("(");
                self.type_ref(ty);
                self.text(")");
                self.operand(operand, 14, scope);
            }
            Expr::InstanceOf { operand, ty } => {
                self.operand(operand, 9, scope);
                self.text(" ");
                self.keyword("instanceof");
                self.text(" ");
                self.type_ref(ty);
            }
            Expr::Field { object, owner, name, ty } => {
                self.field_access(object.as_deref(), owner, name, ty, scope)
            }
            Expr::Invoke {
                kind,
                object,
                owner,
                name,
                descriptor,
                args,
                ..
            } => self.invoke(*kind, object.as_deref(), owner, name, descriptor, args, scope),
            Expr::InvokeDynamic {
                name,
                args,
                method_ref,
                ..
            } => match method_ref {
                Some((owner, target)) => {
                    let body = if target.starts_with("lambda$") {
                        self.find_lambda(owner, target)
                    } else {
                        None
                    };
                    if let Some((info, method)) = body {
                        self.lambda(info, method, args.len());
                    } else {
                        if matches!(args.first().map(strip_dup), Some(Expr::This)) {
                            self.keyword("this");
                        } else {
                            self.class_ref(owner);
                        }
                        self.text(format!("::{target}"));
                    }
                }
                None => {
                    self.text(format!("/* invokedynamic */ {name}"));
                    self.arguments(args, scope);
                }
            },
            Expr::New { ty, args, .. } => match ty.internal_name().and_then(|n| self.find_anonymous(n)) {
                Some(anonymous) => self.anonymous_class(anonymous, args, scope),
                None => {
                    self.keyword("new");
                    self.text(" ");
                    self.type_ref(ty);
                    self.arguments(args, scope);
                }
            },
            Expr::UninitNew { owner } => {
                self.keyword("new");
                self.text(" ");
                self.class_ref(owner);
            }
            Expr::NewArray { ty, dimensions } => {
                self.keyword("new");
                self.text(" ");
                self.type_ref(&ty.with_dimension(0));
                for d in dimensions {
                    self.text("[");
                    self.expr(d, scope);
                    self.text("]");
                }
                for _ in dimensions.len()..ty.dimension() as usize {
                    self.text("[]");
                }
            }
            Expr::ArrayInit { ty, values } => {
                self.keyword("new");
                self.text(" ");
                self.type_ref(ty);
                self.text("{");
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.text(", ");
                    }
                    self.expr(v, scope);
                }
                self.text("}");
            }
            Expr::ArrayLoad { array, index, .. } => {
                self.operand(array, 16, scope);
                self.text("[");
                self.expr(index, scope);
                self.text("]");
            }
            Expr::ArrayLength(array) => {
                self.operand(array, 16, scope);
                self.text(".length");
            }
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.operand(condition, 3, scope);
                self.text(" ? ");
                self.operand(then_expr, 2, scope);
                self.text(" : ");
                self.operand(else_expr, 2, scope);
            }
            Expr::Assign { target, op, value } => {
                self.operand(target, 16, scope);
                match op {
                    Some(op) => self.text(format!(" {}= ", op.as_str())),
                    None => self.text(" = "),
                }
                self.operand(value, 1, scope);
            }
            Expr::Increment { target, delta, prefix } => match delta {
                1 | -1 => {
                    let symbol = if *delta > 0 { "++" } else { "--" };
                    if *prefix {
                        self.text(symbol);
                        self.operand(target, 16, scope);
                    } else {
                        self.operand(target, 16, scope);
                        self.text(symbol);
                    }
                }
                _ => {
                    self.operand(target, 16, scope);
                    let op = if *delta < 0 { BinaryOp::Sub } else { BinaryOp::Add };
                    self.text(format!(" {}= {}", op.as_str(), delta.unsigned_abs()));
                }
            },
            Expr::StackEntry(k) => self.text(format!("$stack{k}")),
            Expr::CaughtException(_) => self.text("$exception"),
            Expr::Dup(inner) => self.expression(inner, scope),
            Expr::Unresolved(what) => self.text(format!("/* {what} */")),
        }
    }
}

/// An inner class constructor whose first parameter is the enclosing
/// instance, stored into a synthetic `this$N` field.
fn has_outer_parameter(decompiled: &DecompiledClass, method: &DecompiledMethod) -> bool {
    let Some(first) = method.signature.parameters.0.first() else {
        return false;
    };
    let pool = &decompiled.class.const_pool;
    method.name == "<init>"
        && decompiled.class.fields.iter().any(|f| {
            f.is_synthetic()
                && pool.utf8(f.name_index).map_or(false, |n| n.starts_with("this$"))
                && pool.utf8(f.descriptor_index).map_or(false, |d| d == first.descriptor())
        })
}

/// The arguments of `new` that reach the superclass constructor of an
/// anonymous class. The others are the enclosing instance and captured
/// values, which the class body reads through its synthetic fields.
fn anonymous_super_args(anonymous: &DecompiledClass, args: &[Expr]) -> Vec<Expr> {
    let Some(init) = anonymous.method("<init>") else {
        return Vec::new();
    };
    let MethodBody::Decompiled { statements, locals, .. } = &init.body else {
        return Vec::new();
    };
    let super_args = statements.iter().find_map(|s| match &s.kind {
        InstructionKind::Expression(Expr::Invoke {
            kind: InvokeKind::Special,
            object: Some(object),
            owner,
            name,
            args,
            ..
        }) if name == "<init>" && **object == Expr::This && owner != &anonymous.this_class => Some(args),
        _ => None,
    });
    let Some(super_args) = super_args else {
        return Vec::new();
    };
    let mut positions = HashMap::new();
    let mut slot = 1u16;
    for (i, ty) in init.signature.parameters.0.iter().enumerate() {
        positions.insert(slot, i);
        slot += if ty.is_wide() { 2 } else { 1 };
    }
    super_args
        .iter()
        .map(|a| match strip_dup(a) {
            Expr::Local(id) => positions
                .get(&locals.get(*id).slot)
                .and_then(|&i| args.get(i))
                .cloned()
                .unwrap_or_else(|| a.clone()),
            other => other.clone(),
        })
        .collect()
}

fn strip_dup(e: &Expr) -> &Expr {
    match e {
        Expr::Dup(inner) => strip_dup(inner),
        other => other,
    }
}

/// The literal a ConstantValue attribute assigns to a field of type `ty`.
fn constant_initializer(pool: &ConstantPool, index: u16, ty: &Type) -> Result<Expr> {
    Ok(match pool.get(index)? {
        ConstantInfo::Integer(v) => match ty.primitive_flags() {
            Some(PrimitiveFlags::BOOLEAN) => Expr::BooleanLiteral(*v != 0),
            Some(PrimitiveFlags::CHAR) => Expr::CharLiteral(*v as u16),
            _ => Expr::IntLiteral(*v),
        },
        ConstantInfo::Long(v) => Expr::LongLiteral(*v),
        ConstantInfo::Float(v) => Expr::FloatLiteral(*v),
        ConstantInfo::Double(v) => Expr::DoubleLiteral(*v),
        ConstantInfo::String { .. } => Expr::StringLiteral(pool.string(index)?.to_string()),
        other => {
            return Err(DecompileError::malformed_constant(
                index,
                format!("{} is not a field constant", other.tag_name()),
            ))
        }
    })
}
