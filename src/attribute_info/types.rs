use binrw::binrw;

/// A decoded attribute. Attributes are dispatched by the name they resolve to
/// in the constant pool; names without a decoder are kept as opaque bytes.
#[derive(Clone, Debug)]
pub enum Attribute {
    Code(CodeAttribute),
    ConstantValue(ConstantValueAttribute),
    Exceptions(ExceptionsAttribute),
    SourceFile(SourceFileAttribute),
    Signature(SignatureAttribute),
    LineNumberTable(LineNumberTableAttribute),
    LocalVariableTable(LocalVariableTableAttribute),
    LocalVariableTypeTable(LocalVariableTypeTableAttribute),
    InnerClasses(InnerClassesAttribute),
    MethodParameters(MethodParametersAttribute),
    RuntimeVisibleAnnotations(Vec<RuntimeAnnotation>),
    RuntimeInvisibleAnnotations(Vec<RuntimeAnnotation>),
    RuntimeVisibleParameterAnnotations(Vec<Vec<RuntimeAnnotation>>),
    RuntimeInvisibleParameterAnnotations(Vec<Vec<RuntimeAnnotation>>),
    AnnotationDefault(ElementValue),
    BootstrapMethods(BootstrapMethodsAttribute),
    Deprecated,
    Synthetic,
    Unknown { name: String, info: Vec<u8> },
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Code(_) => "Code",
            Attribute::ConstantValue(_) => "ConstantValue",
            Attribute::Exceptions(_) => "Exceptions",
            Attribute::SourceFile(_) => "SourceFile",
            Attribute::Signature(_) => "Signature",
            Attribute::LineNumberTable(_) => "LineNumberTable",
            Attribute::LocalVariableTable(_) => "LocalVariableTable",
            Attribute::LocalVariableTypeTable(_) => "LocalVariableTypeTable",
            Attribute::InnerClasses(_) => "InnerClasses",
            Attribute::MethodParameters(_) => "MethodParameters",
            Attribute::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            Attribute::RuntimeInvisibleAnnotations(_) => "RuntimeInvisibleAnnotations",
            Attribute::RuntimeVisibleParameterAnnotations(_) => {
                "RuntimeVisibleParameterAnnotations"
            }
            Attribute::RuntimeInvisibleParameterAnnotations(_) => {
                "RuntimeInvisibleParameterAnnotations"
            }
            Attribute::AnnotationDefault(_) => "AnnotationDefault",
            Attribute::BootstrapMethods(_) => "BootstrapMethods",
            Attribute::Deprecated => "Deprecated",
            Attribute::Synthetic => "Synthetic",
            Attribute::Unknown { name, .. } => name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Clone, Debug)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub fn line_numbers(&self) -> Option<&LineNumberTableAttribute> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::LineNumberTable(t) => Some(t),
            _ => None,
        })
    }

    pub fn local_variables(&self) -> Option<&LocalVariableTableAttribute> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::LocalVariableTable(t) => Some(t),
            _ => None,
        })
    }

    pub fn local_variable_types(&self) -> Option<&LocalVariableTypeTableAttribute> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::LocalVariableTypeTable(t) => Some(t),
            _ => None,
        })
    }

    /// Source line of the instruction at `pc`, if the table covers it.
    pub fn line_number_at(&self, pc: u32) -> Option<u16> {
        let table = self.line_numbers()?;
        table
            .line_number_table
            .iter()
            .filter(|e| u32::from(e.start_pc) <= pc)
            .max_by_key(|e| e.start_pc)
            .map(|e| e.line_number)
    }
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct LineNumberTableAttribute {
    pub line_number_table_length: u16,
    #[br(count = line_number_table_length)]
    pub line_number_table: Vec<LineNumberTableEntry>,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct LineNumberTableEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct LocalVariableTableAttribute {
    pub local_variable_table_length: u16,
    #[br(count = local_variable_table_length)]
    pub items: Vec<LocalVariableTableItem>,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct LocalVariableTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct LocalVariableTypeTableAttribute {
    pub local_variable_type_table_length: u16,
    #[br(count = local_variable_type_table_length)]
    pub items: Vec<LocalVariableTypeTableItem>,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct LocalVariableTypeTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub signature_index: u16,
    pub index: u16,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct BootstrapMethodsAttribute {
    pub num_bootstrap_methods: u16,
    #[br(count = num_bootstrap_methods)]
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct BootstrapMethod {
    pub bootstrap_method_ref: u16,
    pub num_bootstrap_arguments: u16,
    #[br(count = num_bootstrap_arguments)]
    pub bootstrap_arguments: Vec<u16>,
}

#[derive(Clone, Debug)]
pub struct MethodParametersAttribute {
    pub parameters: Vec<ParameterAttribute>,
}

#[derive(Clone, Debug)]
pub struct ParameterAttribute {
    pub name_index: u16,
    pub access_flags: u16,
}

#[derive(Clone, Debug)]
pub struct InnerClassesAttribute {
    pub classes: Vec<InnerClassInfo>,
}

#[derive(Clone, Debug)]
pub struct InnerClassInfo {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    pub inner_name_index: u16,
    pub inner_class_access_flags: InnerClassAccessFlags,
}

bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
    pub struct InnerClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;    //	Marked private in source.
        const PROTECTED = 0x0004;  //	Marked protected in source.
        const STATIC = 0x0008;     //	Marked or implicitly static in source.
        const FINAL = 0x0010;      //	Marked or implicitly final in source.
        const INTERFACE = 0x0200;  //	Was an interface in source.
        const ABSTRACT = 0x0400;   //	Marked or implicitly abstract in source.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
    }
}

#[derive(Clone, Debug)]
pub struct SignatureAttribute {
    pub signature_index: u16,
}

#[derive(Clone, Debug)]
pub struct RuntimeAnnotation {
    pub type_index: u16,
    pub element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Clone, Debug)]
pub struct ElementValuePair {
    pub element_name_index: u16,
    pub value: ElementValue,
}

#[derive(Clone, Debug)]
pub enum ElementValue {
    ConstValueIndex { tag: char, value: u16 },
    EnumConst(EnumConstValue),
    ClassInfoIndex(u16),
    AnnotationValue(RuntimeAnnotation),
    ElementArray(Vec<ElementValue>),
}

#[derive(Clone, Debug)]
pub struct EnumConstValue {
    pub type_name_index: u16,
    pub const_name_index: u16,
}

#[derive(Clone, Debug)]
pub struct ExceptionsAttribute {
    pub exception_table: Vec<u16>,
}

#[derive(Clone, Debug)]
pub struct ConstantValueAttribute {
    pub constant_value_index: u16,
}

/// The SourceFile attribute is an optional fixed-length attribute in the attributes table of a ClassFile structure.
///
/// There may be at most one SourceFile attribute in the attributes table of a ClassFile structure.
/// [see more](https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.7.10)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SourceFileAttribute {
    /// The value of the sourcefile_index item must be a valid index into the constant_pool table.
    /// The constant_pool entry at that index must be a CONSTANT_Utf8_info structure representing a string.
    pub sourcefile_index: u16,
}

/// Lookup helpers shared by class, field and method attribute lists.
pub trait AttributeList {
    fn attribute_slice(&self) -> &[Attribute];

    fn signature_index(&self) -> Option<u16> {
        self.attribute_slice().iter().find_map(|a| match a {
            Attribute::Signature(s) => Some(s.signature_index),
            _ => None,
        })
    }

    fn annotations(&self) -> Vec<&RuntimeAnnotation> {
        self.attribute_slice()
            .iter()
            .flat_map(|a| match a {
                Attribute::RuntimeVisibleAnnotations(v)
                | Attribute::RuntimeInvisibleAnnotations(v) => v.iter().collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .collect()
    }

    fn is_deprecated(&self) -> bool {
        self.attribute_slice()
            .iter()
            .any(|a| matches!(a, Attribute::Deprecated))
    }

    fn is_synthetic_attr(&self) -> bool {
        self.attribute_slice()
            .iter()
            .any(|a| matches!(a, Attribute::Synthetic))
    }
}

impl AttributeList for [Attribute] {
    fn attribute_slice(&self) -> &[Attribute] {
        self
    }
}

impl AttributeList for Vec<Attribute> {
    fn attribute_slice(&self) -> &[Attribute] {
        self
    }
}
