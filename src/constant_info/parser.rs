use nom::{
    bytes::complete::take,
    error::{Error, ErrorKind},
    number::complete::{be_f32, be_f64, be_i32, be_i64, be_u16, be_u8},
    Err, IResult,
};

use crate::constant_info::types::*;

/// Decodes the JVM's "modified UTF-8": `C0 80` for NUL and surrogate pairs
/// encoded as two three-byte sequences. Invalid sequences decode lossily.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((u16::from(b & 0x1F) << 6) | u16::from(bytes[i + 1] & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (u16::from(b & 0x0F) << 12)
                    | (u16::from(bytes[i + 1] & 0x3F) << 6)
                    | u16::from(bytes[i + 2] & 0x3F),
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

fn utf8_constant_parser(input: &[u8]) -> IResult<&[u8], ConstantInfo> {
    let (input, length) = be_u16(input)?;
    let (input, bytes) = take(length)(input)?;
    Ok((
        input,
        ConstantInfo::Utf8(Utf8Constant {
            utf8_string: decode_modified_utf8(bytes),
            bytes: bytes.to_owned(),
        }),
    ))
}

fn member_ref_parser(input: &[u8]) -> IResult<&[u8], MemberRefConstant> {
    let (input, class_index) = be_u16(input)?;
    let (input, name_and_type_index) = be_u16(input)?;
    Ok((
        input,
        MemberRefConstant {
            class_index,
            name_and_type_index,
        },
    ))
}

fn dynamic_parser(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, bootstrap_method_attr_index) = be_u16(input)?;
    let (input, name_and_type_index) = be_u16(input)?;
    Ok((input, (bootstrap_method_attr_index, name_and_type_index)))
}

/// Parses one pool entry. Returns `true` alongside the entry when it takes
/// two slots (Long and Double).
pub fn constant_parser(input: &[u8]) -> IResult<&[u8], (ConstantInfo, bool)> {
    let (input, tag) = be_u8(input)?;
    match tag {
        1 => {
            let (input, c) = utf8_constant_parser(input)?;
            Ok((input, (c, false)))
        }
        3 => {
            let (input, v) = be_i32(input)?;
            Ok((input, (ConstantInfo::Integer(v), false)))
        }
        4 => {
            let (input, v) = be_f32(input)?;
            Ok((input, (ConstantInfo::Float(v), false)))
        }
        5 => {
            let (input, v) = be_i64(input)?;
            Ok((input, (ConstantInfo::Long(v), true)))
        }
        6 => {
            let (input, v) = be_f64(input)?;
            Ok((input, (ConstantInfo::Double(v), true)))
        }
        7 => {
            let (input, name_index) = be_u16(input)?;
            Ok((input, (ConstantInfo::Class { name_index }, false)))
        }
        8 => {
            let (input, string_index) = be_u16(input)?;
            Ok((input, (ConstantInfo::String { string_index }, false)))
        }
        9 => {
            let (input, m) = member_ref_parser(input)?;
            Ok((input, (ConstantInfo::FieldRef(m), false)))
        }
        10 => {
            let (input, m) = member_ref_parser(input)?;
            Ok((input, (ConstantInfo::MethodRef(m), false)))
        }
        11 => {
            let (input, m) = member_ref_parser(input)?;
            Ok((input, (ConstantInfo::InterfaceMethodRef(m), false)))
        }
        12 => {
            let (input, name_index) = be_u16(input)?;
            let (input, descriptor_index) = be_u16(input)?;
            Ok((
                input,
                (
                    ConstantInfo::NameAndType {
                        name_index,
                        descriptor_index,
                    },
                    false,
                ),
            ))
        }
        15 => {
            let (input, reference_kind) = be_u8(input)?;
            let (input, reference_index) = be_u16(input)?;
            Ok((
                input,
                (
                    ConstantInfo::MethodHandle {
                        reference_kind,
                        reference_index,
                    },
                    false,
                ),
            ))
        }
        16 => {
            let (input, descriptor_index) = be_u16(input)?;
            Ok((input, (ConstantInfo::MethodType { descriptor_index }, false)))
        }
        17 => {
            let (input, (bootstrap_method_attr_index, name_and_type_index)) =
                dynamic_parser(input)?;
            Ok((
                input,
                (
                    ConstantInfo::Dynamic {
                        bootstrap_method_attr_index,
                        name_and_type_index,
                    },
                    false,
                ),
            ))
        }
        18 => {
            let (input, (bootstrap_method_attr_index, name_and_type_index)) =
                dynamic_parser(input)?;
            Ok((
                input,
                (
                    ConstantInfo::InvokeDynamic {
                        bootstrap_method_attr_index,
                        name_and_type_index,
                    },
                    false,
                ),
            ))
        }
        19 => {
            let (input, name_index) = be_u16(input)?;
            Ok((input, (ConstantInfo::Module { name_index }, false)))
        }
        20 => {
            let (input, name_index) = be_u16(input)?;
            Ok((input, (ConstantInfo::Package { name_index }, false)))
        }
        _ => Err(Err::Error(Error::new(input, ErrorKind::Tag))),
    }
}

/// Parses `constant_pool_count - 1` slots into a pool whose slot 0 is
/// unusable and whose Long/Double entries are followed by an unusable slot.
pub fn constant_pool_parser(input: &[u8], constant_pool_count: u16) -> IResult<&[u8], ConstantPool> {
    let mut entries = Vec::with_capacity(constant_pool_count as usize);
    entries.push(ConstantInfo::Unusable);
    let mut input = input;
    while entries.len() < constant_pool_count as usize {
        let (rest, (constant, wide)) = constant_parser(input)?;
        input = rest;
        entries.push(constant);
        if wide {
            entries.push(ConstantInfo::Unusable);
        }
    }
    // A trailing Long/Double may not spill past the declared count.
    if entries.len() > constant_pool_count as usize {
        return Err(Err::Failure(Error::new(input, ErrorKind::Count)));
    }
    Ok((input, ConstantPool::new(entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modified_utf8_null() {
        assert_eq!(decode_modified_utf8(&[0x61, 0xC0, 0x80, 0x62]), "a\0b");
    }

    #[test]
    fn test_modified_utf8_surrogate_pair() {
        // U+1F600 as a CESU-8 surrogate pair
        let bytes = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&bytes), "\u{1F600}");
    }

    #[test]
    fn test_long_takes_two_slots() {
        let input = [5u8, 0, 0, 0, 0, 0, 0, 0, 42, 7, 0, 5];
        let (rest, pool) = constant_pool_parser(&input, 4).unwrap();
        assert!(rest.is_empty());
        assert_eq!(pool.count(), 4);
        assert_eq!(pool.get(1).unwrap(), &ConstantInfo::Long(42));
        assert!(pool.get(2).is_err());
        assert_eq!(pool.get(3).unwrap(), &ConstantInfo::Class { name_index: 5 });
    }

    #[test]
    fn test_unknown_tag() {
        assert!(constant_parser(&[2u8, 0, 0]).is_err());
    }
}
