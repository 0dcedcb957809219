//! JVM descriptors and generic signatures, parsed into display types.

use std::fmt;

bitflags! {
    /// Candidate primitive types. A single flag is a resolved type; several
    /// flags mean the value is still ambiguous (an `int`-sized constant may
    /// be a `byte`, `char`, `short`, `int` or `boolean`).
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
    pub struct PrimitiveFlags: u16 {
        const BOOLEAN = 0x0001;
        const CHAR = 0x0002;
        const FLOAT = 0x0004;
        const DOUBLE = 0x0008;
        const BYTE = 0x0010;
        const SHORT = 0x0020;
        const INT = 0x0040;
        const LONG = 0x0080;
        const VOID = 0x0100;
        /// Anything stored in an int-sized slot.
        const INT_SIZED = Self::BOOLEAN.bits() | Self::CHAR.bits() | Self::BYTE.bits() | Self::SHORT.bits() | Self::INT.bits();
    }
}

impl PrimitiveFlags {
    /// Candidates for an int constant, narrowest first.
    pub fn for_int_constant(value: i32) -> PrimitiveFlags {
        let mut flags = PrimitiveFlags::INT;
        if (0..=1).contains(&value) {
            flags |= PrimitiveFlags::BOOLEAN;
        }
        if (i8::MIN as i32..=i8::MAX as i32).contains(&value) {
            flags |= PrimitiveFlags::BYTE;
        }
        if (i16::MIN as i32..=i16::MAX as i32).contains(&value) {
            flags |= PrimitiveFlags::SHORT;
        }
        if (0..=u16::MAX as i32).contains(&value) {
            flags |= PrimitiveFlags::CHAR;
        }
        flags
    }

    /// Picks the display type for a set of candidates.
    pub fn resolve(self) -> PrimitiveFlags {
        for flag in [
            PrimitiveFlags::VOID,
            PrimitiveFlags::LONG,
            PrimitiveFlags::DOUBLE,
            PrimitiveFlags::FLOAT,
            PrimitiveFlags::INT,
            PrimitiveFlags::SHORT,
            PrimitiveFlags::CHAR,
            PrimitiveFlags::BYTE,
            PrimitiveFlags::BOOLEAN,
        ] {
            if self.contains(flag) {
                return flag;
            }
        }
        PrimitiveFlags::INT
    }

    pub fn keyword(self) -> &'static str {
        match self.resolve() {
            PrimitiveFlags::BOOLEAN => "boolean",
            PrimitiveFlags::CHAR => "char",
            PrimitiveFlags::FLOAT => "float",
            PrimitiveFlags::DOUBLE => "double",
            PrimitiveFlags::BYTE => "byte",
            PrimitiveFlags::SHORT => "short",
            PrimitiveFlags::LONG => "long",
            PrimitiveFlags::VOID => "void",
            _ => "int",
        }
    }

    fn descriptor_char(self) -> char {
        match self.resolve() {
            PrimitiveFlags::BOOLEAN => 'Z',
            PrimitiveFlags::CHAR => 'C',
            PrimitiveFlags::FLOAT => 'F',
            PrimitiveFlags::DOUBLE => 'D',
            PrimitiveFlags::BYTE => 'B',
            PrimitiveFlags::SHORT => 'S',
            PrimitiveFlags::LONG => 'J',
            PrimitiveFlags::VOID => 'V',
            _ => 'I',
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrimitiveType {
    pub flags: PrimitiveFlags,
    pub dimension: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectType {
    pub internal_name: String,
    pub type_arguments: Vec<TypeArgument>,
    pub dimension: u8,
}

/// A member class whose outer type carries generic arguments or must be
/// printed qualified, e.g. `Outer<String>.Inner`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InnerObjectType {
    pub outer: Box<Type>,
    pub internal_name: String,
    pub name: String,
    pub type_arguments: Vec<TypeArgument>,
    pub dimension: u8,
}

/// A type variable such as `T`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GenericType {
    pub name: String,
    pub dimension: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveType),
    Object(ObjectType),
    InnerObject(InnerObjectType),
    Generic(GenericType),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeArgument {
    Exact(Type),
    Extends(Type),
    Super(Type),
    Wildcard,
}

/// An ordered list of types: parameters, interfaces, thrown exceptions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Types(pub Vec<Type>);

impl Types {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Type> {
        self.0.iter()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeParameter {
    pub name: String,
    pub bounds: Vec<Type>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub super_type: Type,
    pub interfaces: Types,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Types,
    pub return_type: Type,
    pub exceptions: Types,
}

const fn primitive(flags: PrimitiveFlags) -> Type {
    Type::Primitive(PrimitiveType {
        flags,
        dimension: 0,
    })
}

impl Type {
    pub const BOOLEAN: Type = primitive(PrimitiveFlags::BOOLEAN);
    pub const CHAR: Type = primitive(PrimitiveFlags::CHAR);
    pub const FLOAT: Type = primitive(PrimitiveFlags::FLOAT);
    pub const DOUBLE: Type = primitive(PrimitiveFlags::DOUBLE);
    pub const BYTE: Type = primitive(PrimitiveFlags::BYTE);
    pub const SHORT: Type = primitive(PrimitiveFlags::SHORT);
    pub const INT: Type = primitive(PrimitiveFlags::INT);
    pub const LONG: Type = primitive(PrimitiveFlags::LONG);
    pub const VOID: Type = primitive(PrimitiveFlags::VOID);

    pub fn object(internal_name: impl Into<String>) -> Type {
        Type::Object(ObjectType {
            internal_name: internal_name.into(),
            type_arguments: Vec::new(),
            dimension: 0,
        })
    }

    pub fn object_root() -> Type {
        Type::object("java/lang/Object")
    }

    pub fn string() -> Type {
        Type::object("java/lang/String")
    }

    pub fn dimension(&self) -> u8 {
        match self {
            Type::Primitive(t) => t.dimension,
            Type::Object(t) => t.dimension,
            Type::InnerObject(t) => t.dimension,
            Type::Generic(t) => t.dimension,
        }
    }

    pub fn with_dimension(&self, dimension: u8) -> Type {
        let mut ty = self.clone();
        match &mut ty {
            Type::Primitive(t) => t.dimension = dimension,
            Type::Object(t) => t.dimension = dimension,
            Type::InnerObject(t) => t.dimension = dimension,
            Type::Generic(t) => t.dimension = dimension,
        }
        ty
    }

    pub fn array_of(&self) -> Type {
        self.with_dimension(self.dimension().saturating_add(1))
    }

    /// The element type of an array; non-arrays are returned unchanged.
    pub fn element_type(&self) -> Type {
        self.with_dimension(self.dimension().saturating_sub(1))
    }

    pub fn primitive_flags(&self) -> Option<PrimitiveFlags> {
        match self {
            Type::Primitive(t) if t.dimension == 0 => Some(t.flags),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive_flags().is_some()
    }

    pub fn is_boolean(&self) -> bool {
        self.primitive_flags() == Some(PrimitiveFlags::BOOLEAN)
    }

    pub fn is_void(&self) -> bool {
        self.primitive_flags() == Some(PrimitiveFlags::VOID)
    }

    /// Long and double occupy two stack words and two local slots.
    pub fn is_wide(&self) -> bool {
        matches!(
            self.primitive_flags(),
            Some(PrimitiveFlags::LONG) | Some(PrimitiveFlags::DOUBLE)
        )
    }

    pub fn is_object(&self, internal_name: &str) -> bool {
        self.dimension() == 0 && self.internal_name() == Some(internal_name)
    }

    /// Internal name of the class, ignoring array dimensions.
    pub fn internal_name(&self) -> Option<&str> {
        match self {
            Type::Object(t) => Some(&t.internal_name),
            Type::InnerObject(t) => Some(&t.internal_name),
            _ => None,
        }
    }

    /// The erased JVM descriptor.
    pub fn descriptor(&self) -> String {
        let mut out = "[".repeat(self.dimension() as usize);
        match self {
            Type::Primitive(t) => out.push(t.flags.descriptor_char()),
            Type::Object(ObjectType { internal_name, .. })
            | Type::InnerObject(InnerObjectType { internal_name, .. }) => {
                out.push('L');
                out.push_str(internal_name);
                out.push(';');
            }
            Type::Generic(_) => out.push_str("Ljava/lang/Object;"),
        }
        out
    }
}

impl fmt::Display for Type {
    /// Fully qualified source form, used in diagnostics and tests.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(t) => write!(f, "{}", t.flags.keyword())?,
            Type::Object(t) => {
                write!(f, "{}", internal_to_source_name(&t.internal_name))?;
                write_arguments(f, &t.type_arguments)?;
            }
            Type::InnerObject(t) => {
                write!(f, "{}.{}", t.outer.element_type(), t.name)?;
                write_arguments(f, &t.type_arguments)?;
            }
            Type::Generic(t) => write!(f, "{}", t.name)?,
        }
        for _ in 0..self.dimension() {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

fn write_arguments(f: &mut fmt::Formatter<'_>, arguments: &[TypeArgument]) -> fmt::Result {
    if arguments.is_empty() {
        return Ok(());
    }
    write!(f, "<")?;
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match argument {
            TypeArgument::Exact(t) => write!(f, "{t}")?,
            TypeArgument::Extends(t) => write!(f, "? extends {t}")?,
            TypeArgument::Super(t) => write!(f, "? super {t}")?,
            TypeArgument::Wildcard => write!(f, "?")?,
        }
    }
    write!(f, ">")
}

/// Recursive descent over descriptor and signature strings.
struct SignatureReader<'a> {
    bytes: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> SignatureReader<'a> {
    fn new(text: &'a str) -> Self {
        SignatureReader {
            bytes: text.as_bytes(),
            text,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn identifier(&mut self, stops: &[u8]) -> Option<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stops.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        self.text.get(start..self.pos)
    }

    fn type_signature(&mut self) -> Option<Type> {
        let mut dimension = 0u8;
        while self.eat(b'[') {
            dimension = dimension.saturating_add(1);
        }
        let flags = match self.peek()? {
            b'Z' => Some(PrimitiveFlags::BOOLEAN),
            b'C' => Some(PrimitiveFlags::CHAR),
            b'F' => Some(PrimitiveFlags::FLOAT),
            b'D' => Some(PrimitiveFlags::DOUBLE),
            b'B' => Some(PrimitiveFlags::BYTE),
            b'S' => Some(PrimitiveFlags::SHORT),
            b'I' => Some(PrimitiveFlags::INT),
            b'J' => Some(PrimitiveFlags::LONG),
            b'V' => Some(PrimitiveFlags::VOID),
            _ => None,
        };
        if let Some(flags) = flags {
            self.pos += 1;
            return Some(Type::Primitive(PrimitiveType { flags, dimension }));
        }
        let ty = match self.peek()? {
            b'L' => self.class_type_signature()?,
            b'T' => {
                self.pos += 1;
                let name = self.identifier(b";")?.to_string();
                if !self.eat(b';') {
                    return None;
                }
                Type::Generic(GenericType { name, dimension: 0 })
            }
            _ => return None,
        };
        Some(ty.with_dimension(dimension))
    }

    fn class_type_signature(&mut self) -> Option<Type> {
        if !self.eat(b'L') {
            return None;
        }
        let name = self.identifier(b"<.;")?;
        let mut internal_name = name.to_string();
        let type_arguments = self.type_arguments()?;
        let mut ty = Type::Object(ObjectType {
            internal_name: internal_name.clone(),
            type_arguments,
            dimension: 0,
        });
        while self.eat(b'.') {
            let inner = self.identifier(b"<.;")?.to_string();
            internal_name = format!("{internal_name}${inner}");
            let type_arguments = self.type_arguments()?;
            ty = Type::InnerObject(InnerObjectType {
                outer: Box::new(ty),
                internal_name: internal_name.clone(),
                name: inner,
                type_arguments,
                dimension: 0,
            });
        }
        if !self.eat(b';') {
            return None;
        }
        Some(ty)
    }

    fn type_arguments(&mut self) -> Option<Vec<TypeArgument>> {
        let mut arguments = Vec::new();
        if !self.eat(b'<') {
            return Some(arguments);
        }
        while !self.eat(b'>') {
            let argument = match self.peek()? {
                b'*' => {
                    self.pos += 1;
                    TypeArgument::Wildcard
                }
                b'+' => {
                    self.pos += 1;
                    TypeArgument::Extends(self.type_signature()?)
                }
                b'-' => {
                    self.pos += 1;
                    TypeArgument::Super(self.type_signature()?)
                }
                _ => TypeArgument::Exact(self.type_signature()?),
            };
            arguments.push(argument);
        }
        Some(arguments)
    }

    fn type_parameters(&mut self) -> Option<Vec<TypeParameter>> {
        let mut parameters = Vec::new();
        if !self.eat(b'<') {
            return Some(parameters);
        }
        while !self.eat(b'>') {
            let name = self.identifier(b":")?.to_string();
            let mut bounds = Vec::new();
            while self.eat(b':') {
                // An empty class bound is followed directly by an interface bound.
                if self.peek() == Some(b':') {
                    continue;
                }
                bounds.push(self.type_signature()?);
            }
            parameters.push(TypeParameter { name, bounds });
        }
        Some(parameters)
    }
}

/// Parse a single field descriptor or field signature.
pub fn parse_type(signature: &str) -> Option<Type> {
    let mut reader = SignatureReader::new(signature);
    let ty = reader.type_signature()?;
    reader.at_end().then_some(ty)
}

/// Parse a method descriptor or generic method signature.
pub fn parse_method_signature(signature: &str) -> Option<MethodSignature> {
    let mut reader = SignatureReader::new(signature);
    let type_parameters = reader.type_parameters()?;
    if !reader.eat(b'(') {
        return None;
    }
    let mut parameters = Vec::new();
    while !reader.eat(b')') {
        parameters.push(reader.type_signature()?);
    }
    let return_type = reader.type_signature()?;
    let mut exceptions = Vec::new();
    while reader.eat(b'^') {
        exceptions.push(reader.type_signature()?);
    }
    reader.at_end().then_some(MethodSignature {
        type_parameters,
        parameters: Types(parameters),
        return_type,
        exceptions: Types(exceptions),
    })
}

/// Parse a generic class signature.
pub fn parse_class_signature(signature: &str) -> Option<ClassSignature> {
    let mut reader = SignatureReader::new(signature);
    let type_parameters = reader.type_parameters()?;
    let super_type = reader.class_type_signature()?;
    let mut interfaces = Vec::new();
    while !reader.at_end() {
        interfaces.push(reader.class_type_signature()?);
    }
    Some(ClassSignature {
        type_parameters,
        super_type,
        interfaces: Types(interfaces),
    })
}

/// Converts a Class constant name, which may itself be an array descriptor.
pub fn class_constant_type(name: &str) -> Option<Type> {
    if name.starts_with('[') {
        parse_type(name)
    } else {
        Some(Type::object(name))
    }
}

/// Convert internal class name to source name.
pub fn internal_to_source_name(name: &str) -> String {
    name.replace(['/', '$'], ".")
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    let name = match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    };
    match name.rfind('$') {
        Some(pos) if pos + 1 < name.len() => {
            // Local classes carry a numeric prefix; anonymous ones are only
            // a number and keep their binary name.
            let local = name[pos + 1..].trim_start_matches(|c: char| c.is_ascii_digit());
            if local.is_empty() {
                name
            } else {
                local
            }
        }
        _ => name,
    }
}

/// Whether `name` is an anonymous class declared directly in `outer`.
pub fn is_anonymous_of(name: &str, outer: &str) -> bool {
    name.strip_prefix(outer)
        .and_then(|rest| rest.strip_prefix('$'))
        .map_or(false, |n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Get the package from an internal name.
pub fn package_name(name: &str) -> Option<&str> {
    name.rfind('/').map(|pos| &name[..pos])
}

/// Convert a newarray type code to its element type.
pub fn newarray_type(atype: u8) -> Option<Type> {
    match atype {
        4 => Some(Type::BOOLEAN),
        5 => Some(Type::CHAR),
        6 => Some(Type::FLOAT),
        7 => Some(Type::DOUBLE),
        8 => Some(Type::BYTE),
        9 => Some(Type::SHORT),
        10 => Some(Type::INT),
        11 => Some(Type::LONG),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_type("I"), Some(Type::INT));
        assert_eq!(parse_type("J"), Some(Type::LONG));
        assert_eq!(parse_type("V"), Some(Type::VOID));
        assert_eq!(parse_type("Z"), Some(Type::BOOLEAN));
        assert_eq!(parse_type("II"), None);
    }

    #[test]
    fn test_parse_array() {
        let ty = parse_type("[[Ljava/lang/Object;").unwrap();
        assert_eq!(ty.dimension(), 2);
        assert_eq!(ty.internal_name(), Some("java/lang/Object"));
        assert_eq!(ty.to_string(), "java.lang.Object[][]");
        assert_eq!(ty.descriptor(), "[[Ljava/lang/Object;");
    }

    #[test]
    fn test_parse_method_descriptor() {
        let sig = parse_method_signature("(Ljava/lang/String;I)[B").unwrap();
        assert_eq!(sig.parameters.0, vec![Type::string(), Type::INT]);
        assert_eq!(sig.return_type, Type::BYTE.array_of());
        assert!(parse_method_signature("(I").is_none());
    }

    #[test]
    fn test_generic_method_signature() {
        let sig =
            parse_method_signature("<T:Ljava/lang/Object;>(Ljava/util/List<+TT;>;)TT;^Ljava/io/IOException;")
                .unwrap();
        assert_eq!(sig.type_parameters.len(), 1);
        assert_eq!(sig.type_parameters[0].name, "T");
        assert_eq!(sig.parameters.0[0].to_string(), "java.util.List<? extends T>");
        assert_eq!(
            sig.return_type,
            Type::Generic(GenericType {
                name: "T".into(),
                dimension: 0
            })
        );
        assert_eq!(sig.exceptions.len(), 1);
    }

    #[test]
    fn test_class_signature_with_interface_bound() {
        let sig = parse_class_signature(
            "<K::Ljava/lang/Comparable<TK;>;>Ljava/lang/Object;Ljava/io/Serializable;",
        )
        .unwrap();
        assert_eq!(sig.type_parameters[0].bounds.len(), 1);
        assert_eq!(sig.super_type, Type::object_root());
        assert_eq!(sig.interfaces.len(), 1);
    }

    #[test]
    fn test_inner_class_signature() {
        let ty = parse_type("Lcom/x/Outer<Ljava/lang/String;>.Inner;").unwrap();
        match &ty {
            Type::InnerObject(inner) => {
                assert_eq!(inner.internal_name, "com/x/Outer$Inner");
                assert_eq!(inner.name, "Inner");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ty.to_string(), "com.x.Outer<java.lang.String>.Inner");
    }

    #[test]
    fn test_int_constant_candidates() {
        let flags = PrimitiveFlags::for_int_constant(1);
        assert!(flags.contains(PrimitiveFlags::BOOLEAN | PrimitiveFlags::BYTE | PrimitiveFlags::CHAR));
        assert!(!PrimitiveFlags::for_int_constant(300).contains(PrimitiveFlags::BYTE));
        assert!(!PrimitiveFlags::for_int_constant(-1).contains(PrimitiveFlags::CHAR));
    }

    #[test]
    fn test_internal_to_source() {
        assert_eq!(internal_to_source_name("java/util/Map$Entry"), "java.util.Map.Entry");
        assert_eq!(simple_class_name("java/util/Map$Entry"), "Entry");
        assert_eq!(simple_class_name("a/Outer$1"), "Outer$1");
        assert_eq!(simple_class_name("a/Outer$1Local"), "Local");
        assert!(is_anonymous_of("a/Outer$12", "a/Outer"));
        assert!(!is_anonymous_of("a/Outer$Node", "a/Outer"));
        assert!(!is_anonymous_of("a/Outer$1$2", "a/Outer"));
        assert_eq!(package_name("java/lang/String"), Some("java/lang"));
        assert_eq!(package_name("NoPackage"), None);
    }
}
