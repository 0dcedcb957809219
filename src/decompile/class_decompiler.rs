//! Per-class orchestration of the decompiler stages.
//!
//! Every method runs through the pipeline on its own: a hard failure in one
//! method is recorded on that method and never stops its siblings.

use crate::attribute_info::{Attribute, AttributeList, CodeAttribute, InnerClassAccessFlags};
use crate::code_attribute::code_parser;
use crate::config::{DecompileEngine, DecompilerConfig};
use crate::error::{DecompileError, Result};
use crate::loader::Loader;
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::printer::{PlainTextPrinter, Printer};
use crate::types::ClassFile;

use super::builder::{self, BuildContext};
use super::cfg::{self, Cfg};
use super::descriptor::{is_anonymous_of, parse_method_signature, MethodSignature};
use super::instruction::Instruction;
use super::layout;
use super::locals::{generated_name, LocalVariables, ParameterInfo};
use super::reconstruct;
use super::reducer;
use super::writer;

/// Member classes nested deeper than this are not rendered.
const MAX_NESTING: usize = 16;

#[derive(Debug)]
pub enum MethodBody {
    /// Abstract or native.
    Absent,
    Decompiled {
        statements: Vec<Instruction>,
        locals: LocalVariables,
        /// Soft errors; the statements are best effort when non-empty.
        errors: Vec<DecompileError>,
    },
    /// The method printed as an `INTERNAL ERROR` block.
    Failed(DecompileError),
}

#[derive(Debug)]
pub struct DecompiledMethod {
    pub name: String,
    pub descriptor: String,
    /// Generic signature when the class file has a usable one, otherwise the
    /// erased descriptor.
    pub signature: MethodSignature,
    pub parameter_names: Vec<String>,
    pub body: MethodBody,
}

impl DecompiledMethod {
    pub fn contains_error(&self) -> bool {
        match &self.body {
            MethodBody::Absent => false,
            MethodBody::Decompiled { errors, .. } => !errors.is_empty(),
            MethodBody::Failed(_) => true,
        }
    }

    pub fn statements(&self) -> &[Instruction] {
        match &self.body {
            MethodBody::Decompiled { statements, .. } => statements,
            _ => &[],
        }
    }
}

#[derive(Debug)]
pub struct DecompiledClass {
    pub class: ClassFile,
    pub this_class: String,
    /// One entry per method of `class`, in the same order.
    pub methods: Vec<DecompiledMethod>,
    pub inner_classes: Vec<DecompiledClass>,
    /// Anonymous classes declared here, rendered where they are instantiated.
    pub anonymous_classes: Vec<DecompiledClass>,
    /// Flags from the enclosing class's InnerClasses entry.
    pub member_flags: Option<InnerClassAccessFlags>,
    /// False when the loader could not supply the superclass.
    pub super_resolved: bool,
}

impl DecompiledClass {
    pub fn method(&self, name: &str) -> Option<&DecompiledMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

pub struct ClassDecompiler<'a> {
    config: &'a DecompilerConfig,
    loader: &'a dyn Loader,
}

impl<'a> ClassDecompiler<'a> {
    pub fn new(config: &'a DecompilerConfig, loader: &'a dyn Loader) -> Self {
        ClassDecompiler { config, loader }
    }

    pub fn decompile_bytes(&self, bytes: &[u8]) -> Result<DecompiledClass> {
        self.decompile(ClassFile::parse(bytes)?)
    }

    pub fn decompile(&self, class: ClassFile) -> Result<DecompiledClass> {
        self.decompile_nested(class, None, 0)
    }

    fn decompile_nested(
        &self,
        class: ClassFile,
        member_flags: Option<InnerClassAccessFlags>,
        depth: usize,
    ) -> Result<DecompiledClass> {
        let this_class = class.this_class_name()?.to_string();
        log::debug!("decompile class start: {}", this_class);

        let super_resolved = match class.super_class_name()? {
            None => true,
            Some(name) => name.starts_with("java/") || self.loader.can_load(name),
        };
        if !super_resolved {
            log::debug!("{}: superclass is not loadable", this_class);
        }

        let methods = class
            .methods
            .iter()
            .map(|m| self.decompile_method(&class, &this_class, m))
            .collect::<Result<Vec<_>>>()?;

        let (inner_classes, anonymous_classes) = if depth < MAX_NESTING {
            (
                self.member_classes(&class, &this_class, depth)?,
                self.anonymous_classes(&class, &this_class, depth)?,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        log::debug!(
            "decompile class end: {} ({} methods, {} with errors)",
            this_class,
            methods.len(),
            methods.iter().filter(|m| m.contains_error()).count()
        );
        Ok(DecompiledClass {
            class,
            this_class,
            methods,
            inner_classes,
            anonymous_classes,
            member_flags,
            super_resolved,
        })
    }

    /// Named member classes the loader can supply, decompiled in turn.
    fn member_classes(&self, class: &ClassFile, this_class: &str, depth: usize) -> Result<Vec<DecompiledClass>> {
        let mut members = Vec::new();
        let Some(attribute) = class.inner_classes() else {
            return Ok(members);
        };
        let pool = &class.const_pool;
        for entry in &attribute.classes {
            if entry.outer_class_info_index == 0
                || entry.inner_name_index == 0
                || entry.inner_class_access_flags.contains(InnerClassAccessFlags::SYNTHETIC)
            {
                continue;
            }
            if pool.class_name(entry.outer_class_info_index)? != this_class {
                continue;
            }
            let name = pool.class_name(entry.inner_class_info_index)?;
            if name == this_class || !self.loader.can_load(name) {
                continue;
            }
            let parsed = self.loader.load(name).and_then(|bytes| ClassFile::parse(&bytes));
            match parsed.and_then(|inner| self.decompile_nested(inner, Some(entry.inner_class_access_flags), depth + 1)) {
                Ok(member) => members.push(member),
                Err(e) => log::warn!("skipping member class {}: {}", name, e),
            }
        }
        Ok(members)
    }

    /// Anonymous classes of `this_class` the loader can supply. Their
    /// InnerClasses entries have neither an outer class nor a name.
    fn anonymous_classes(&self, class: &ClassFile, this_class: &str, depth: usize) -> Result<Vec<DecompiledClass>> {
        let mut found = Vec::new();
        let Some(attribute) = class.inner_classes() else {
            return Ok(found);
        };
        let pool = &class.const_pool;
        for entry in &attribute.classes {
            if entry.outer_class_info_index != 0 || entry.inner_name_index != 0 {
                continue;
            }
            let name = pool.class_name(entry.inner_class_info_index)?;
            if !is_anonymous_of(name, this_class) || !self.loader.can_load(name) {
                continue;
            }
            let parsed = self.loader.load(name).and_then(|bytes| ClassFile::parse(&bytes));
            match parsed.and_then(|inner| self.decompile_nested(inner, Some(entry.inner_class_access_flags), depth + 1)) {
                Ok(anonymous) => found.push(anonymous),
                Err(e) => log::warn!("skipping anonymous class {}: {}", name, e),
            }
        }
        Ok(found)
    }

    pub fn decompile_method(&self, class: &ClassFile, this_class: &str, method: &MethodInfo) -> Result<DecompiledMethod> {
        let pool = &class.const_pool;
        let name = pool.utf8(method.name_index)?.to_string();
        let descriptor = pool.utf8(method.descriptor_index)?.to_string();
        let erased = parse_method_signature(&descriptor).ok_or_else(|| {
            DecompileError::malformed_constant(method.descriptor_index, format!("bad method descriptor {descriptor}"))
        })?;
        let signature = method
            .attributes
            .signature_index()
            .and_then(|i| pool.utf8(i).ok())
            .and_then(parse_method_signature)
            .filter(|s| s.parameters.len() == erased.parameters.len())
            .unwrap_or_else(|| erased.clone());

        let params = ParameterInfo {
            is_static: method.access_flags.contains(MethodAccessFlags::STATIC),
            types: erased.parameters.0.clone(),
            names: parameter_attribute_names(class, method),
        };

        let (body, parameter_names) = match method.code() {
            None => (MethodBody::Absent, declared_parameter_names(&params)),
            Some(code) => match self.decompile_body(class, this_class, &erased, code, &params) {
                Ok((statements, locals, errors)) => {
                    let names = local_parameter_names(&params, &locals);
                    (
                        MethodBody::Decompiled {
                            statements,
                            locals,
                            errors,
                        },
                        names,
                    )
                }
                Err(e) => {
                    log::warn!("{}.{}{}: {}", this_class, name, descriptor, e);
                    (MethodBody::Failed(e), declared_parameter_names(&params))
                }
            },
        };
        Ok(DecompiledMethod {
            name,
            descriptor,
            signature,
            parameter_names,
            body,
        })
    }

    fn decompile_body(
        &self,
        class: &ClassFile,
        this_class: &str,
        erased: &MethodSignature,
        code: &CodeAttribute,
        params: &ParameterInfo,
    ) -> Result<(Vec<Instruction>, LocalVariables, Vec<DecompileError>)> {
        let pool = &class.const_pool;
        let mut locals = LocalVariables::from_method(this_class, params, code, pool);
        let (_, bytecodes) = code_parser(&code.code)
            .map_err(|e| DecompileError::malformed_class(format!("undecodable bytecode: {e}")))?;
        let leaders = cfg::leaders(&bytecodes, &code.exception_table);
        let handlers = cfg::handler_types(code, pool)?;
        let ctx = BuildContext {
            pool,
            code,
            this_class,
            is_static: params.is_static,
            return_type: erased.return_type.clone(),
            bootstrap_methods: class.bootstrap_methods(),
            handlers: &handlers,
        };
        let mut built = builder::build(&bytecodes, &leaders, &ctx, &mut locals)?;
        let mut errors = std::mem::take(&mut built.errors);
        for e in &errors {
            log::warn!("{}: {}", this_class, e);
        }

        let mut graph = Cfg::build(code, pool, &leaders, built)?;
        log::debug!(
            "cfg: {} blocks, {} loops, {} try regions",
            graph.live_count(),
            graph.loops.len(),
            graph.regions.len()
        );
        let mut statements = match self.config.decompile_engine {
            DecompileEngine::Linear => reducer::linearize(&mut graph, &mut locals),
            DecompileEngine::Reducer => match reducer::reduce(&mut graph, self.config.max_reducer_passes) {
                Ok(reductions) => {
                    log::debug!("reduced in {} steps", reductions);
                    reducer::into_statements(&mut graph)
                }
                Err(e) => {
                    log::warn!("{}: {}; using linear rendering", this_class, e);
                    errors.push(e);
                    reducer::linearize(&mut graph, &mut locals)
                }
            },
        };

        reconstruct::reconstruct(&mut statements, this_class, &erased.return_type, &mut locals);
        locals.assign_names();
        if !locals.overlapping_pairs().is_empty() {
            errors.push(DecompileError::mismatch(0, "overlapping local variable ranges"));
        }
        Ok((statements, locals, errors))
    }
}

fn parameter_attribute_names(class: &ClassFile, method: &MethodInfo) -> Vec<Option<String>> {
    method
        .attributes
        .iter()
        .find_map(|a| match a {
            Attribute::MethodParameters(p) => Some(
                p.parameters
                    .iter()
                    .map(|p| match p.name_index {
                        0 => None,
                        i => class.const_pool.utf8(i).ok().map(str::to_string),
                    })
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default()
}

/// Parameter names for a method without code: declared names when the class
/// file has them, generated ones otherwise.
fn declared_parameter_names(params: &ParameterInfo) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(params.types.len());
    for (i, ty) in params.types.iter().enumerate() {
        let name = match params.names.get(i).cloned().flatten() {
            Some(name) => name,
            None => {
                let base = generated_name(ty, true);
                let mut name = base.clone();
                let mut counter = 1;
                while names.contains(&name) {
                    name = format!("{base}{counter}");
                    counter += 1;
                }
                name
            }
        };
        names.push(name);
    }
    names
}

fn local_parameter_names(params: &ParameterInfo, locals: &LocalVariables) -> Vec<String> {
    let mut slot = if params.is_static { 0u16 } else { 1 };
    let mut names = Vec::with_capacity(params.types.len());
    for (i, ty) in params.types.iter().enumerate() {
        let name = match locals.find(slot, 0) {
            Some(id) => locals.get(id).name.clone(),
            None => format!("arg{i}"),
        };
        names.push(name);
        slot += if ty.is_wide() { 2 } else { 1 };
    }
    names
}

/// Decompiles one class and sends the source to `printer`.
pub fn decompile_to_printer(
    bytes: &[u8],
    loader: &dyn Loader,
    config: &DecompilerConfig,
    location: Option<&str>,
    printer: &mut dyn Printer,
) -> Result<()> {
    let decompiled = ClassDecompiler::new(config, loader).decompile_bytes(bytes)?;
    let mut fragments = writer::write_class(&decompiled, config, location);
    layout::fit(&mut fragments, config.realign_line_numbers);
    printer.start(
        layout::max_line_number(&fragments),
        decompiled.class.major_version,
        decompiled.class.minor_version,
    );
    layout::write(&fragments, printer);
    printer.end();
    Ok(())
}

/// Decompiles one class to Java source text.
pub fn decompile_to_string(
    bytes: &[u8],
    loader: &dyn Loader,
    config: &DecompilerConfig,
    location: Option<&str>,
) -> Result<String> {
    let mut printer = PlainTextPrinter::new(config);
    decompile_to_printer(bytes, loader, config, location, &mut printer)?;
    Ok(printer.into_string())
}

/// Decompiles the class `internal_name` supplied by `loader`. A class that
/// cannot be parsed renders as an `INTERNAL ERROR` comment block; only a
/// failure to load the bytes is returned as an error.
pub fn decompile_named(internal_name: &str, loader: &dyn Loader, config: &DecompilerConfig) -> Result<String> {
    let bytes = loader.load(internal_name)?;
    let location = format!("{internal_name}.class");
    match decompile_to_string(&bytes, loader, config, Some(&location)) {
        Ok(source) => Ok(source),
        Err(e) => {
            log::warn!("{}: {}", internal_name, e);
            Ok(writer::internal_error_placeholder(internal_name, &e))
        }
    }
}
