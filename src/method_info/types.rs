use crate::attribute_info::{Attribute, AttributeList, CodeAttribute, RuntimeAnnotation};

#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Code(c) => Some(c),
            _ => None,
        })
    }

    /// Constant pool indices of the declared `throws` classes.
    pub fn exceptions(&self) -> &[u16] {
        self.attributes
            .iter()
            .find_map(|a| match a {
                Attribute::Exceptions(e) => Some(e.exception_table.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn parameter_annotations(&self) -> Vec<Vec<&RuntimeAnnotation>> {
        let mut result: Vec<Vec<&RuntimeAnnotation>> = Vec::new();
        for attr in &self.attributes {
            if let Attribute::RuntimeVisibleParameterAnnotations(params)
            | Attribute::RuntimeInvisibleParameterAnnotations(params) = attr
            {
                for (i, annotations) in params.iter().enumerate() {
                    if result.len() <= i {
                        result.resize_with(i + 1, Vec::new);
                    }
                    result[i].extend(annotations.iter());
                }
            }
        }
        result
    }

    pub fn is_synthetic(&self) -> bool {
        self.access_flags
            .intersects(MethodAccessFlags::SYNTHETIC | MethodAccessFlags::BRIDGE)
            || self.attributes.is_synthetic_attr()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MethodAccessFlags(u16);

bitflags! {
    impl MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;       // 	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;      // 	Declared private; accessible only within the defining class.
        const PROTECTED = 0x0004;    // 	Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;       // 	Declared static.
        const FINAL = 0x0010;        // 	Declared final; must not be overridden.
        const SYNCHRONIZED = 0x0020; // 	Declared synchronized; invocation is wrapped by a monitor use.
        const BRIDGE = 0x0040;       // 	A bridge method, generated by the compiler.
        const VARARGS = 0x0080;      // 	Declared with variable number of arguments.
        const NATIVE = 0x0100;       // 	Declared native; implemented in a language other than Java.
        const ABSTRACT = 0x0400;     // 	Declared abstract; no implementation is provided.
        const STRICT = 0x0800;       // 	Declared strictfp; floating-point mode is FP-strict.
        const SYNTHETIC = 0x1000;    // 	Declared synthetic; not present in the source code.
    }
}
