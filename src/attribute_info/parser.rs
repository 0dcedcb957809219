use std::io::Cursor;

use binrw::BinRead;
use nom::{
    bytes::complete::take,
    error::{Error, ErrorKind},
    multi::count,
    number::complete::{be_u16, be_u32, be_u8},
    Err, IResult,
};

use crate::attribute_info::*;
use crate::constant_info::ConstantPool;

type AttributeDecoder = for<'a> fn(&'a [u8], &ConstantPool) -> IResult<&'a [u8], Attribute>;

/// Attribute decoders keyed by the attribute name. Anything not listed here
/// is kept as `Attribute::Unknown`.
const ATTRIBUTE_DECODERS: &[(&str, AttributeDecoder)] = &[
    ("Code", code_attribute_decoder),
    ("ConstantValue", constant_value_decoder),
    ("Exceptions", exceptions_decoder),
    ("SourceFile", source_file_decoder),
    ("Signature", signature_decoder),
    ("LineNumberTable", line_number_table_decoder),
    ("LocalVariableTable", local_variable_table_decoder),
    ("LocalVariableTypeTable", local_variable_type_table_decoder),
    ("InnerClasses", inner_classes_decoder),
    ("MethodParameters", method_parameters_decoder),
    ("RuntimeVisibleAnnotations", visible_annotations_decoder),
    ("RuntimeInvisibleAnnotations", invisible_annotations_decoder),
    ("RuntimeVisibleParameterAnnotations", visible_parameter_annotations_decoder),
    ("RuntimeInvisibleParameterAnnotations", invisible_parameter_annotations_decoder),
    ("AnnotationDefault", annotation_default_decoder),
    ("BootstrapMethods", bootstrap_methods_decoder),
    ("Deprecated", deprecated_decoder),
    ("Synthetic", synthetic_decoder),
];

fn failure(input: &[u8], kind: ErrorKind) -> Err<Error<&[u8]>> {
    Err::Failure(Error::new(input, kind))
}

pub fn attribute_parser<'a>(input: &'a [u8], pool: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, attribute_name_index) = be_u16(input)?;
    let (input, attribute_length) = be_u32(input)?;
    let (input, info) = take(attribute_length)(input)?;
    let name = pool
        .utf8(attribute_name_index)
        .map_err(|_| failure(info, ErrorKind::Verify))?;

    let decoder = ATTRIBUTE_DECODERS
        .iter()
        .find(|(decoder_name, _)| *decoder_name == name)
        .map(|(_, decoder)| *decoder);
    let attribute = match decoder {
        Some(decode) => {
            // A truncated body is fatal; trailing bytes are tolerated.
            let (_, attribute) = decode(info, pool).map_err(|e| match e {
                Err::Error(e) | Err::Failure(e) => Err::Failure(e),
                Err::Incomplete(_) => failure(info, ErrorKind::Eof),
            })?;
            attribute
        }
        None => Attribute::Unknown {
            name: name.to_string(),
            info: info.to_owned(),
        },
    };
    Ok((input, attribute))
}

fn exception_entry_parser(input: &[u8]) -> IResult<&[u8], ExceptionEntry> {
    let (input, start_pc) = be_u16(input)?;
    let (input, end_pc) = be_u16(input)?;
    let (input, handler_pc) = be_u16(input)?;
    let (input, catch_type) = be_u16(input)?;
    Ok((
        input,
        ExceptionEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        },
    ))
}

pub fn code_attribute_parser<'a>(
    input: &'a [u8],
    pool: &ConstantPool,
) -> IResult<&'a [u8], CodeAttribute> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;
    let (input, code_length) = be_u32(input)?;
    let (input, code) = take(code_length)(input)?;
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) =
        count(exception_entry_parser, exception_table_length as usize)(input)?;
    let (input, attributes_count) = be_u16(input)?;
    let (input, attributes) =
        count(|i| attribute_parser(i, pool), attributes_count as usize)(input)?;
    Ok((
        input,
        CodeAttribute {
            max_stack,
            max_locals,
            code: code.to_owned(),
            exception_table,
            attributes,
        },
    ))
}

fn code_attribute_decoder<'a>(input: &'a [u8], pool: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, code) = code_attribute_parser(input, pool)?;
    Ok((input, Attribute::Code(code)))
}

fn constant_value_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, constant_value_index) = be_u16(input)?;
    Ok((
        input,
        Attribute::ConstantValue(ConstantValueAttribute {
            constant_value_index,
        }),
    ))
}

fn exceptions_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) = count(be_u16, exception_table_length as usize)(input)?;
    Ok((
        input,
        Attribute::Exceptions(ExceptionsAttribute { exception_table }),
    ))
}

fn source_file_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, sourcefile_index) = be_u16(input)?;
    Ok((
        input,
        Attribute::SourceFile(SourceFileAttribute { sourcefile_index }),
    ))
}

fn signature_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, signature_index) = be_u16(input)?;
    Ok((
        input,
        Attribute::Signature(SignatureAttribute { signature_index }),
    ))
}

/// Reads a fixed-layout table with binrw and hands the rest back to nom.
fn binrw_table<T>(input: &[u8]) -> IResult<&[u8], T>
where
    T: for<'b> BinRead<Args<'b> = ()> + binrw::meta::ReadEndian,
{
    let mut cursor = Cursor::new(input);
    let table = T::read(&mut cursor).map_err(|_| failure(input, ErrorKind::Eof))?;
    let consumed = cursor.position() as usize;
    Ok((&input[consumed..], table))
}

fn line_number_table_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, table) = binrw_table::<LineNumberTableAttribute>(input)?;
    Ok((input, Attribute::LineNumberTable(table)))
}

fn local_variable_table_decoder<'a>(
    input: &'a [u8],
    _: &ConstantPool,
) -> IResult<&'a [u8], Attribute> {
    let (input, table) = binrw_table::<LocalVariableTableAttribute>(input)?;
    Ok((input, Attribute::LocalVariableTable(table)))
}

fn local_variable_type_table_decoder<'a>(
    input: &'a [u8],
    _: &ConstantPool,
) -> IResult<&'a [u8], Attribute> {
    let (input, table) = binrw_table::<LocalVariableTypeTableAttribute>(input)?;
    Ok((input, Attribute::LocalVariableTypeTable(table)))
}

fn bootstrap_methods_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, table) = binrw_table::<BootstrapMethodsAttribute>(input)?;
    Ok((input, Attribute::BootstrapMethods(table)))
}

fn inner_class_info_parser(input: &[u8]) -> IResult<&[u8], InnerClassInfo> {
    let (input, inner_class_info_index) = be_u16(input)?;
    let (input, outer_class_info_index) = be_u16(input)?;
    let (input, inner_name_index) = be_u16(input)?;
    let (input, inner_class_access_flags) = be_u16(input)?;
    Ok((
        input,
        InnerClassInfo {
            inner_class_info_index,
            outer_class_info_index,
            inner_name_index,
            inner_class_access_flags: InnerClassAccessFlags::from_bits_retain(
                inner_class_access_flags,
            ),
        },
    ))
}

fn inner_classes_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, number_of_classes) = be_u16(input)?;
    let (input, classes) = count(inner_class_info_parser, number_of_classes as usize)(input)?;
    Ok((
        input,
        Attribute::InnerClasses(InnerClassesAttribute { classes }),
    ))
}

fn parameters_parser(input: &[u8]) -> IResult<&[u8], ParameterAttribute> {
    let (input, name_index) = be_u16(input)?;
    let (input, access_flags) = be_u16(input)?;
    Ok((
        input,
        ParameterAttribute {
            name_index,
            access_flags,
        },
    ))
}

fn method_parameters_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, parameters_count) = be_u8(input)?;
    let (input, parameters) = count(parameters_parser, parameters_count as usize)(input)?;
    Ok((
        input,
        Attribute::MethodParameters(MethodParametersAttribute { parameters }),
    ))
}

fn annotation_parser(input: &[u8]) -> IResult<&[u8], RuntimeAnnotation> {
    let (input, type_index) = be_u16(input)?;
    let (input, num_element_value_pairs) = be_u16(input)?;
    let (input, element_value_pairs) =
        count(element_value_pair_parser, num_element_value_pairs as usize)(input)?;
    Ok((
        input,
        RuntimeAnnotation {
            type_index,
            element_value_pairs,
        },
    ))
}

fn element_value_pair_parser(input: &[u8]) -> IResult<&[u8], ElementValuePair> {
    let (input, element_name_index) = be_u16(input)?;
    let (input, value) = element_value_parser(input)?;
    Ok((
        input,
        ElementValuePair {
            element_name_index,
            value,
        },
    ))
}

pub fn element_value_parser(input: &[u8]) -> IResult<&[u8], ElementValue> {
    let (input, tag) = be_u8(input)?;
    match tag as char {
        'B' | 'C' | 'I' | 'S' | 'Z' | 'D' | 'F' | 'J' | 's' => {
            let (input, value) = be_u16(input)?;
            Ok((
                input,
                ElementValue::ConstValueIndex {
                    tag: tag as char,
                    value,
                },
            ))
        }
        'e' => {
            let (input, type_name_index) = be_u16(input)?;
            let (input, const_name_index) = be_u16(input)?;
            Ok((
                input,
                ElementValue::EnumConst(EnumConstValue {
                    type_name_index,
                    const_name_index,
                }),
            ))
        }
        'c' => {
            let (input, class_info_index) = be_u16(input)?;
            Ok((input, ElementValue::ClassInfoIndex(class_info_index)))
        }
        '@' => {
            let (input, annotation) = annotation_parser(input)?;
            Ok((input, ElementValue::AnnotationValue(annotation)))
        }
        '[' => {
            let (input, num_values) = be_u16(input)?;
            let (input, values) = count(element_value_parser, num_values as usize)(input)?;
            Ok((input, ElementValue::ElementArray(values)))
        }
        _ => Err(Err::Error(Error::new(input, ErrorKind::NoneOf))),
    }
}

fn annotations_parser(input: &[u8]) -> IResult<&[u8], Vec<RuntimeAnnotation>> {
    let (input, num_annotations) = be_u16(input)?;
    count(annotation_parser, num_annotations as usize)(input)
}

fn parameter_annotations_parser(input: &[u8]) -> IResult<&[u8], Vec<Vec<RuntimeAnnotation>>> {
    let (input, num_parameters) = be_u8(input)?;
    count(annotations_parser, num_parameters as usize)(input)
}

fn visible_annotations_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, annotations) = annotations_parser(input)?;
    Ok((input, Attribute::RuntimeVisibleAnnotations(annotations)))
}

fn invisible_annotations_decoder<'a>(
    input: &'a [u8],
    _: &ConstantPool,
) -> IResult<&'a [u8], Attribute> {
    let (input, annotations) = annotations_parser(input)?;
    Ok((input, Attribute::RuntimeInvisibleAnnotations(annotations)))
}

fn visible_parameter_annotations_decoder<'a>(
    input: &'a [u8],
    _: &ConstantPool,
) -> IResult<&'a [u8], Attribute> {
    let (input, annotations) = parameter_annotations_parser(input)?;
    Ok((input, Attribute::RuntimeVisibleParameterAnnotations(annotations)))
}

fn invisible_parameter_annotations_decoder<'a>(
    input: &'a [u8],
    _: &ConstantPool,
) -> IResult<&'a [u8], Attribute> {
    let (input, annotations) = parameter_annotations_parser(input)?;
    Ok((input, Attribute::RuntimeInvisibleParameterAnnotations(annotations)))
}

fn annotation_default_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    let (input, value) = element_value_parser(input)?;
    Ok((input, Attribute::AnnotationDefault(value)))
}

fn deprecated_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    Ok((input, Attribute::Deprecated))
}

fn synthetic_decoder<'a>(input: &'a [u8], _: &ConstantPool) -> IResult<&'a [u8], Attribute> {
    Ok((input, Attribute::Synthetic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_info::{ConstantInfo, Utf8Constant};

    fn pool_with(names: &[&str]) -> ConstantPool {
        let mut entries = vec![ConstantInfo::Unusable];
        for n in names {
            entries.push(ConstantInfo::Utf8(Utf8Constant {
                utf8_string: n.to_string(),
                bytes: n.as_bytes().to_vec(),
            }));
        }
        ConstantPool::new(entries)
    }

    #[test]
    fn test_unknown_attribute_is_retained() {
        let pool = pool_with(&["com.example.Custom"]);
        let input = [0u8, 1, 0, 0, 0, 3, 0xde, 0xad, 0xbe];
        let (rest, attr) = attribute_parser(&input, &pool).unwrap();
        assert!(rest.is_empty());
        match attr {
            Attribute::Unknown { name, info } => {
                assert_eq!(name, "com.example.Custom");
                assert_eq!(info, vec![0xde, 0xad, 0xbe]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_line_number_table_through_binrw() {
        let pool = pool_with(&["LineNumberTable"]);
        let input = [0u8, 1, 0, 0, 0, 10, 0, 2, 0, 0, 0, 7, 0, 4, 0, 8];
        let (_, attr) = attribute_parser(&input, &pool).unwrap();
        match attr {
            Attribute::LineNumberTable(t) => {
                assert_eq!(t.line_number_table.len(), 2);
                assert_eq!(t.line_number_table[1].start_pc, 4);
                assert_eq!(t.line_number_table[1].line_number, 8);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_known_attribute_fails() {
        let pool = pool_with(&["Signature"]);
        let input = [0u8, 1, 0, 0, 0, 1, 0];
        assert!(matches!(attribute_parser(&input, &pool), Err(Err::Failure(_))));
    }

    #[test]
    fn test_bad_name_index_fails() {
        let pool = pool_with(&[]);
        let input = [0u8, 9, 0, 0, 0, 0];
        assert!(attribute_parser(&input, &pool).is_err());
    }
}
