use crate::error::{DecompileError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum ConstantInfo {
    Utf8(Utf8Constant),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef(MemberRefConstant),
    MethodRef(MemberRefConstant),
    InterfaceMethodRef(MemberRefConstant),
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    /// Slot 0, and the slot following every Long or Double.
    Unusable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Utf8Constant {
    pub utf8_string: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

impl ConstantInfo {
    pub fn tag_name(&self) -> &'static str {
        match self {
            ConstantInfo::Utf8(_) => "Utf8",
            ConstantInfo::Integer(_) => "Integer",
            ConstantInfo::Float(_) => "Float",
            ConstantInfo::Long(_) => "Long",
            ConstantInfo::Double(_) => "Double",
            ConstantInfo::Class { .. } => "Class",
            ConstantInfo::String { .. } => "String",
            ConstantInfo::FieldRef(_) => "Fieldref",
            ConstantInfo::MethodRef(_) => "Methodref",
            ConstantInfo::InterfaceMethodRef(_) => "InterfaceMethodref",
            ConstantInfo::NameAndType { .. } => "NameAndType",
            ConstantInfo::MethodHandle { .. } => "MethodHandle",
            ConstantInfo::MethodType { .. } => "MethodType",
            ConstantInfo::Dynamic { .. } => "Dynamic",
            ConstantInfo::InvokeDynamic { .. } => "InvokeDynamic",
            ConstantInfo::Module { .. } => "Module",
            ConstantInfo::Package { .. } => "Package",
            ConstantInfo::Unusable => "Unusable",
        }
    }
}

/// A resolved field, method or interface-method reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_interface: bool,
}

/// The constant pool, indexed from 1. Slot 0 is always unusable.
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    entries: Vec<ConstantInfo>,
}

impl ConstantPool {
    /// Wrap already-parsed entries. `entries[0]` must be the unusable slot.
    pub fn new(entries: Vec<ConstantInfo>) -> Self {
        ConstantPool { entries }
    }

    /// The `constant_pool_count` value as stored in the class file.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantInfo)> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, c)| (i as u16, c))
    }

    pub fn get(&self, index: u16) -> Result<&ConstantInfo> {
        match self.entries.get(index as usize) {
            None => Err(DecompileError::malformed_constant(
                index,
                format!("index out of range (pool size {})", self.entries.len()),
            )),
            Some(ConstantInfo::Unusable) => Err(DecompileError::malformed_constant(
                index,
                "reference to an unusable slot",
            )),
            Some(c) => Ok(c),
        }
    }

    fn mismatch<T>(&self, index: u16, expected: &str) -> Result<T> {
        let found = self.get(index)?.tag_name();
        Err(DecompileError::malformed_constant(
            index,
            format!("expected {expected}, found {found}"),
        ))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantInfo::Utf8(u) => Ok(&u.utf8_string),
            _ => self.mismatch(index, "Utf8"),
        }
    }

    /// Internal (slash separated) name of a Class constant.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantInfo::Class { name_index } => self.utf8(*name_index),
            _ => self.mismatch(index, "Class"),
        }
    }

    pub fn string(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantInfo::String { string_index } => self.utf8(*string_index),
            _ => self.mismatch(index, "String"),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            ConstantInfo::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => self.mismatch(index, "NameAndType"),
        }
    }

    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (member, is_interface) = match self.get(index)? {
            ConstantInfo::FieldRef(m) | ConstantInfo::MethodRef(m) => (m, false),
            ConstantInfo::InterfaceMethodRef(m) => (m, true),
            _ => return self.mismatch(index, "Fieldref or Methodref"),
        };
        let class_name = self.class_name(member.class_index)?;
        let (name, descriptor) = self.name_and_type(member.name_and_type_index)?;
        Ok(MemberRef {
            class_name,
            name,
            descriptor,
            is_interface,
        })
    }

    /// Name and descriptor of an InvokeDynamic or Dynamic constant.
    pub fn dynamic(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            ConstantInfo::InvokeDynamic {
                name_and_type_index,
                ..
            }
            | ConstantInfo::Dynamic {
                name_and_type_index,
                ..
            } => self.name_and_type(*name_and_type_index),
            _ => self.mismatch(index, "InvokeDynamic"),
        }
    }

    /// Checks every cross reference inside the pool.
    pub fn validate(&self) -> Result<()> {
        for (index, constant) in self.iter() {
            match constant {
                ConstantInfo::Class { name_index }
                | ConstantInfo::Module { name_index }
                | ConstantInfo::Package { name_index } => {
                    self.utf8(*name_index)?;
                }
                ConstantInfo::String { string_index } => {
                    self.utf8(*string_index)?;
                }
                ConstantInfo::FieldRef(_)
                | ConstantInfo::MethodRef(_)
                | ConstantInfo::InterfaceMethodRef(_) => {
                    self.member_ref(index)?;
                }
                ConstantInfo::NameAndType { .. } => {
                    self.name_and_type(index)?;
                }
                ConstantInfo::MethodType { descriptor_index } => {
                    self.utf8(*descriptor_index)?;
                }
                ConstantInfo::MethodHandle {
                    reference_index, ..
                } => {
                    self.member_ref(*reference_index)?;
                }
                ConstantInfo::Dynamic { .. } | ConstantInfo::InvokeDynamic { .. } => {
                    self.dynamic(index)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(s: &str) -> ConstantInfo {
        ConstantInfo::Utf8(Utf8Constant {
            utf8_string: s.to_string(),
            bytes: s.as_bytes().to_vec(),
        })
    }

    fn pool() -> ConstantPool {
        ConstantPool::new(vec![
            ConstantInfo::Unusable,
            utf8("java/lang/Object"),
            ConstantInfo::Class { name_index: 1 },
            ConstantInfo::Long(7),
            ConstantInfo::Unusable,
            ConstantInfo::String { string_index: 9 },
        ])
    }

    #[test]
    fn test_resolve_class_name() {
        assert_eq!(pool().class_name(2).unwrap(), "java/lang/Object");
    }

    #[test]
    fn test_zero_index_is_invalid() {
        assert!(matches!(
            pool().get(0),
            Err(DecompileError::MalformedConstant { index: 0, .. })
        ));
    }

    #[test]
    fn test_second_long_slot_is_invalid() {
        assert!(pool().get(3).is_ok());
        assert!(pool().get(4).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        assert!(matches!(
            pool().utf8(2),
            Err(DecompileError::MalformedConstant { index: 2, .. })
        ));
    }

    #[test]
    fn test_dangling_reference_fails_validation() {
        assert!(pool().validate().is_err());
    }
}
