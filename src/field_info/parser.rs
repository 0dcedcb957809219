use nom::{multi::count, number::complete::be_u16, IResult};

use crate::attribute_info::attribute_parser;
use crate::constant_info::ConstantPool;
use crate::field_info::{FieldAccessFlags, FieldInfo};

pub fn field_parser<'a>(input: &'a [u8], pool: &ConstantPool) -> IResult<&'a [u8], FieldInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, attributes_count) = be_u16(input)?;
    let (input, attributes) =
        count(|i| attribute_parser(i, pool), attributes_count as usize)(input)?;
    Ok((
        input,
        FieldInfo {
            access_flags: FieldAccessFlags::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes,
        },
    ))
}
