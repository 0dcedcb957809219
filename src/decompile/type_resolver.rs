//! Display names for types, the import set they imply, and annotation
//! values resolved against the constant pool.

use std::collections::BTreeMap;

use crate::attribute_info::{ElementValue, RuntimeAnnotation};
use crate::cache::LruCache;
use crate::constant_info::{ConstantInfo, ConstantPool};
use crate::error::{DecompileError, Result};

use super::descriptor::{
    class_constant_type, internal_to_source_name, package_name, parse_method_signature, parse_type,
    simple_class_name, MethodSignature, Type, TypeArgument,
};
use super::expr::Expr;

const DESCRIPTOR_CACHE_CAPACITY: usize = 512;

/// A resolved annotation: `@Type(name = value, ...)`.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationRef {
    pub ty: Type,
    pub elements: Vec<(String, ElementRef)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementRef {
    Constant(Expr),
    Enum { ty: Type, name: String },
    Class(Type),
    Annotation(AnnotationRef),
    Array(Vec<ElementRef>),
}

/// Per-class resolver. Simple names are used for every type that can be
/// imported without clashing; the imports are collected as a side effect.
pub struct TypeResolver {
    this_class: String,
    package: Option<String>,
    /// Simple name to the internal name it stands for.
    imported: BTreeMap<String, String>,
    descriptors: LruCache<String, Option<Type>>,
    methods: LruCache<String, Option<MethodSignature>>,
}

impl TypeResolver {
    pub fn new(this_class: &str) -> Self {
        let mut imported = BTreeMap::new();
        imported.insert(
            simple_class_name(outermost(this_class)).to_string(),
            outermost(this_class).to_string(),
        );
        TypeResolver {
            this_class: this_class.to_string(),
            package: package_name(this_class).map(str::to_string),
            imported,
            descriptors: LruCache::new(DESCRIPTOR_CACHE_CAPACITY),
            methods: LruCache::new(DESCRIPTOR_CACHE_CAPACITY),
        }
    }

    /// Parses a field descriptor or signature, caching the result.
    pub fn parse(&mut self, descriptor: &str) -> Option<Type> {
        if let Some(hit) = self.descriptors.get(descriptor) {
            return hit.clone();
        }
        let parsed = parse_type(descriptor);
        self.descriptors.insert(descriptor.to_string(), parsed.clone());
        parsed
    }

    pub fn parse_method(&mut self, descriptor: &str) -> Option<MethodSignature> {
        if let Some(hit) = self.methods.get(descriptor) {
            return hit.clone();
        }
        let parsed = parse_method_signature(descriptor);
        self.methods.insert(descriptor.to_string(), parsed.clone());
        parsed
    }

    /// Source name for a class, importing it when that keeps it unambiguous.
    pub fn class_name(&mut self, internal_name: &str) -> String {
        let top = outermost(internal_name);
        let nested = &internal_name[top.len()..];
        let simple = simple_class_name(top).to_string();
        let short = match self.imported.get(&simple) {
            Some(existing) => existing == top,
            None => {
                self.imported.insert(simple.clone(), top.to_string());
                true
            }
        };
        let base = if short { simple } else { internal_to_source_name(top) };
        if nested.is_empty() {
            base
        } else if top == outermost(&self.this_class) {
            // Members of this class are in scope by their own name.
            simple_class_name(internal_name).to_string()
        } else {
            format!("{}{}", base, nested.replace('$', "."))
        }
    }

    /// Source text for a type.
    pub fn display(&mut self, ty: &Type) -> String {
        let mut out = match ty {
            Type::Primitive(p) => p.flags.keyword().to_string(),
            Type::Object(o) => {
                let mut s = self.class_name(&o.internal_name);
                s.push_str(&self.arguments(&o.type_arguments));
                s
            }
            Type::InnerObject(inner) => {
                let outer = self.display(&inner.outer.element_type().with_dimension(0));
                format!("{}.{}{}", outer, inner.name, self.arguments(&inner.type_arguments))
            }
            Type::Generic(g) => g.name.clone(),
        };
        for _ in 0..ty.dimension() {
            out.push_str("[]");
        }
        out
    }

    fn arguments(&mut self, arguments: &[TypeArgument]) -> String {
        if arguments.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = arguments
            .iter()
            .map(|a| match a {
                TypeArgument::Exact(t) => self.display(t),
                TypeArgument::Extends(t) => format!("? extends {}", self.display(t)),
                TypeArgument::Super(t) => format!("? super {}", self.display(t)),
                TypeArgument::Wildcard => "?".to_string(),
            })
            .collect();
        format!("<{}>", parts.join(", "))
    }

    /// Import lines in source form, sorted, without `java.lang` and
    /// same-package classes.
    pub fn imports(&self) -> Vec<String> {
        let own = outermost(&self.this_class);
        let mut out: Vec<String> = self
            .imported
            .values()
            .filter(|name| name.as_str() != own)
            .filter(|name| {
                let package = package_name(name);
                package.is_some() && package != Some("java/lang") && package != self.package.as_deref()
            })
            .map(|name| internal_to_source_name(name))
            .collect();
        out.sort();
        out
    }

    pub fn annotation(&mut self, pool: &ConstantPool, annotation: &RuntimeAnnotation) -> Result<AnnotationRef> {
        let descriptor = pool.utf8(annotation.type_index)?;
        let ty = self.parse(descriptor).ok_or_else(|| {
            DecompileError::malformed_constant(annotation.type_index, format!("bad annotation type {descriptor}"))
        })?;
        let mut elements = Vec::with_capacity(annotation.element_value_pairs.len());
        for pair in &annotation.element_value_pairs {
            let name = pool.utf8(pair.element_name_index)?.to_string();
            elements.push((name, self.element_value(pool, &pair.value)?));
        }
        Ok(AnnotationRef { ty, elements })
    }

    pub fn element_value(&mut self, pool: &ConstantPool, value: &ElementValue) -> Result<ElementRef> {
        Ok(match value {
            ElementValue::ConstValueIndex { tag, value } => ElementRef::Constant(constant_value(pool, *tag, *value)?),
            ElementValue::EnumConst(e) => {
                let descriptor = pool.utf8(e.type_name_index)?;
                let ty = self.parse(descriptor).unwrap_or_else(|| Type::object(descriptor));
                ElementRef::Enum {
                    ty,
                    name: pool.utf8(e.const_name_index)?.to_string(),
                }
            }
            ElementValue::ClassInfoIndex(index) => {
                let descriptor = pool.utf8(*index)?;
                let ty = self
                    .parse(descriptor)
                    .or_else(|| class_constant_type(descriptor))
                    .unwrap_or_else(Type::object_root);
                ElementRef::Class(ty)
            }
            ElementValue::AnnotationValue(nested) => ElementRef::Annotation(self.annotation(pool, nested)?),
            ElementValue::ElementArray(values) => ElementRef::Array(
                values
                    .iter()
                    .map(|v| self.element_value(pool, v))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

/// The top-level class enclosing `internal_name`.
fn outermost(internal_name: &str) -> &str {
    let start = internal_name.rfind('/').map_or(0, |p| p + 1);
    match internal_name[start..].find('$') {
        Some(p) if p > 0 => &internal_name[..start + p],
        _ => internal_name,
    }
}

/// A constant element value as a literal expression.
pub fn constant_value(pool: &ConstantPool, tag: char, index: u16) -> Result<Expr> {
    let constant = pool.get(index)?;
    let mismatch = || DecompileError::malformed_constant(index, format!("element tag '{tag}' does not match constant"));
    Ok(match (tag, constant) {
        ('Z', ConstantInfo::Integer(v)) => Expr::BooleanLiteral(*v != 0),
        ('C', ConstantInfo::Integer(v)) => Expr::CharLiteral(*v as u16),
        ('B' | 'S' | 'I', ConstantInfo::Integer(v)) => Expr::IntLiteral(*v),
        ('J', ConstantInfo::Long(v)) => Expr::LongLiteral(*v),
        ('F', ConstantInfo::Float(v)) => Expr::FloatLiteral(*v),
        ('D', ConstantInfo::Double(v)) => Expr::DoubleLiteral(*v),
        ('s', ConstantInfo::Utf8(u)) => Expr::StringLiteral(u.utf8_string.clone()),
        _ => return Err(mismatch()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imports_skip_java_lang_and_own_package() {
        let mut resolver = TypeResolver::new("com/acme/Widget");
        assert_eq!(resolver.class_name("java/lang/String"), "String");
        assert_eq!(resolver.class_name("java/util/List"), "List");
        assert_eq!(resolver.class_name("com/acme/Part"), "Part");
        assert_eq!(resolver.imports(), vec!["java.util.List".to_string()]);
    }

    #[test]
    fn test_clashing_simple_names_stay_qualified() {
        let mut resolver = TypeResolver::new("com/acme/Widget");
        assert_eq!(resolver.class_name("java/util/List"), "List");
        assert_eq!(resolver.class_name("java/awt/List"), "java.awt.List");
        assert_eq!(resolver.class_name("org/other/Widget"), "org.other.Widget");
    }

    #[test]
    fn test_nested_class_names() {
        let mut resolver = TypeResolver::new("com/acme/Widget");
        assert_eq!(resolver.class_name("java/util/Map$Entry"), "Map.Entry");
        assert_eq!(resolver.class_name("com/acme/Widget$Part"), "Part");
        assert_eq!(resolver.imports(), vec!["java.util.Map".to_string()]);
    }

    #[test]
    fn test_display_generic_array() {
        let mut resolver = TypeResolver::new("a/B");
        let ty = resolver.parse("[Ljava/util/List<+Ljava/lang/Number;>;").unwrap();
        assert_eq!(resolver.display(&ty), "List<? extends Number>[]");
    }
}
