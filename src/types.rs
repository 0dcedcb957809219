use crate::attribute_info::{Attribute, BootstrapMethod, InnerClassesAttribute};
use crate::constant_info::ConstantPool;
use crate::error::Result;
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;

#[derive(Clone, Debug)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Internal name of this class, e.g. `java/util/ArrayList`.
    pub fn this_class_name(&self) -> Result<&str> {
        self.const_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass; `None` only for `java/lang/Object`
    /// and module-info.
    pub fn super_class_name(&self) -> Result<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.const_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|i| self.const_pool.class_name(*i))
            .collect()
    }

    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::SourceFile(s) => self.const_pool.utf8(s.sourcefile_index).ok(),
            _ => None,
        })
    }

    pub fn inner_classes(&self) -> Option<&InnerClassesAttribute> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::InnerClasses(i) => Some(i),
            _ => None,
        })
    }

    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        self.attributes
            .iter()
            .find_map(|a| match a {
                Attribute::BootstrapMethods(b) => Some(b.bootstrap_methods.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Java release matching the class file major version.
    pub fn java_version(&self) -> String {
        match self.major_version {
            45 => "1.1".to_string(),
            46..=48 => format!("1.{}", self.major_version - 44),
            v if v >= 49 => format!("{}", v - 44),
            v => format!("unknown ({v})"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
        const MODULE = 0x8000;     //	Declared as a module type.
    }
}
