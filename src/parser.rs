use nom::{
    bytes::complete::tag,
    error::{Error, ErrorKind},
    multi::count,
    number::complete::be_u16,
    Err, IResult,
};

use crate::attribute_info::attribute_parser;
use crate::constant_info::constant_pool_parser;
use crate::error::{DecompileError, Result};
use crate::field_info::field_parser;
use crate::method_info::method_parser;
use crate::types::{ClassAccessFlags, ClassFile};

fn magic_parser(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(&[0xCA, 0xFE, 0xBA, 0xBE][..])(input)
}

/// Parse the bytes of a class file.
pub fn class_parser(input: &[u8]) -> IResult<&[u8], ClassFile> {
    let (input, _) = magic_parser(input)?;
    let (input, minor_version) = be_u16(input)?;
    let (input, major_version) = be_u16(input)?;
    let (input, const_pool_size) = be_u16(input)?;
    if const_pool_size == 0 {
        return Err(Err::Failure(Error::new(input, ErrorKind::Count)));
    }
    let (input, const_pool) = constant_pool_parser(input, const_pool_size)?;
    let (input, access_flags) = be_u16(input)?;
    let (input, this_class) = be_u16(input)?;
    let (input, super_class) = be_u16(input)?;
    let (input, interfaces_count) = be_u16(input)?;
    let (input, interfaces) = count(be_u16, interfaces_count as usize)(input)?;
    let (input, fields_count) = be_u16(input)?;
    let (input, fields) = count(|i| field_parser(i, &const_pool), fields_count as usize)(input)?;
    let (input, methods_count) = be_u16(input)?;
    let (input, methods) =
        count(|i| method_parser(i, &const_pool), methods_count as usize)(input)?;
    let (input, attributes_count) = be_u16(input)?;
    let (input, attributes) =
        count(|i| attribute_parser(i, &const_pool), attributes_count as usize)(input)?;
    Ok((
        input,
        ClassFile {
            minor_version,
            major_version,
            const_pool,
            access_flags: ClassAccessFlags::from_bits_retain(access_flags),
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        },
    ))
}

impl ClassFile {
    /// Parses and validates a class file. Bad magic, truncation and dangling
    /// constant pool indices are all reported as hard errors.
    pub fn parse(bytes: &[u8]) -> Result<ClassFile> {
        let (rest, class) = class_parser(bytes).map_err(|e| match e {
            Err::Incomplete(_) => DecompileError::malformed_class("truncated class file"),
            Err::Error(e) | Err::Failure(e) => {
                let offset = bytes.len() - e.input.len();
                match e.code {
                    ErrorKind::Tag if offset == 0 => DecompileError::malformed_class("bad magic"),
                    ErrorKind::Eof => DecompileError::malformed_class(format!(
                        "truncated class file at byte {offset}"
                    )),
                    code => DecompileError::malformed_class(format!(
                        "{} at byte {offset}",
                        code.description()
                    )),
                }
            }
        })?;
        if !rest.is_empty() {
            log::warn!("{} trailing bytes after class file", rest.len());
        }
        class.validate()?;
        Ok(class)
    }

    fn validate(&self) -> Result<()> {
        let pool = &self.const_pool;
        pool.validate()
            .map_err(|e| DecompileError::malformed_class(e.to_string()))?;
        let check = |index: u16| {
            pool.class_name(index)
                .map(|_| ())
                .map_err(|e| DecompileError::malformed_class(e.to_string()))
        };
        check(self.this_class)?;
        if self.super_class != 0 {
            check(self.super_class)?;
        }
        for interface in &self.interfaces {
            check(*interface)?;
        }
        for (name_index, descriptor_index) in self
            .fields
            .iter()
            .map(|f| (f.name_index, f.descriptor_index))
            .chain(self.methods.iter().map(|m| (m.name_index, m.descriptor_index)))
        {
            pool.utf8(name_index)
                .and_then(|_| pool.utf8(descriptor_index))
                .map_err(|e| DecompileError::malformed_class(e.to_string()))?;
        }
        Ok(())
    }
}
