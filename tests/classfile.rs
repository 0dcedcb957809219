mod common;

use classfile_decompiler::constant_info::ConstantInfo;
use classfile_decompiler::method_info::MethodAccessFlags;
use classfile_decompiler::{parse_class_from_reader, ClassAccessFlags, ClassFile, DecompileError};
use common::*;

#[test]
fn header_and_pool() {
    let class = ClassFile::parse(&hello_class()).unwrap();
    assert_eq!(class.major_version, 52);
    assert_eq!(class.minor_version, 0);
    assert_eq!(class.java_version(), "8");
    assert!(class.access_flags.contains(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER));
    assert_eq!(class.this_class_name().unwrap(), "com/example/Hello");
    assert_eq!(class.super_class_name().unwrap(), Some("java/lang/Object"));
    assert!(class.interface_names().unwrap().is_empty());
    assert!(class
        .const_pool
        .iter()
        .any(|(_, c)| matches!(c, ConstantInfo::Utf8(u) if u.utf8_string == "add")));
}

#[test]
fn methods_and_code() {
    let class = ClassFile::parse(&hello_class()).unwrap();
    let pool = &class.const_pool;
    let names: Vec<&str> = class.methods.iter().map(|m| pool.utf8(m.name_index).unwrap()).collect();
    assert_eq!(names, vec!["<init>", "add"]);

    let add = &class.methods[1];
    assert!(add.access_flags.contains(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC));
    assert_eq!(pool.utf8(add.descriptor_index).unwrap(), "(II)I");
    let code = add.code().unwrap();
    assert_eq!(code.code, vec![0x1a, 0x1b, 0x60, 0xac]);
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.line_number_at(3), Some(8));
    let table = code.local_variables().unwrap();
    let locals: Vec<&str> = table.items.iter().map(|v| pool.utf8(v.name_index).unwrap()).collect();
    assert_eq!(locals, vec!["a", "b"]);
}

#[test]
fn long_constants_take_two_slots() {
    let mut b = ClassBuilder::new("com/example/Wide");
    let big = b.long(7);
    let after = b.utf8("after");
    assert_eq!(after, big + 2);
    b.field_with_constant(ACC_STATIC | ACC_FINAL, "W", "J", Some(big));
    let class = ClassFile::parse(&b.build()).unwrap();
    assert_eq!(class.const_pool.get(big).unwrap(), &ConstantInfo::Long(7));
    assert!(class.const_pool.get(big + 1).is_err());
    assert_eq!(class.const_pool.utf8(after).unwrap(), "after");
    let field = &class.fields[0];
    assert_eq!(field.constant_value().map(|c| c.constant_value_index), Some(big));
}

#[test]
fn member_class_table() {
    let mut b = ClassBuilder::new("com/example/Outer");
    b.inner_class("com/example/Outer$Node", "Node", ACC_PUBLIC | ACC_STATIC);
    let class = ClassFile::parse(&b.build()).unwrap();
    let table = class.inner_classes().unwrap();
    assert_eq!(table.classes.len(), 1);
    let pool = &class.const_pool;
    assert_eq!(
        pool.class_name(table.classes[0].inner_class_info_index).unwrap(),
        "com/example/Outer$Node"
    );
}

#[test]
fn dangling_constant_index() {
    #[rustfmt::skip]
    let bytes = [
        0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x34,
        0x00, 0x03,
        0x01, 0x00, 0x01, b'A',
        0x07, 0x00, 0x09,
        0x00, 0x21, 0x00, 0x02, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    let err = ClassFile::parse(&bytes).unwrap_err();
    assert!(
        matches!(
            err,
            DecompileError::MalformedClassFile { .. } | DecompileError::MalformedConstant { .. }
        ),
        "{err}"
    );
}

#[test]
fn bad_magic_and_truncation() {
    let bytes = hello_class();
    let mut bad = bytes.clone();
    bad[3] = 0xbf;
    let err = ClassFile::parse(&bad).unwrap_err();
    assert!(err.to_string().contains("bad magic"), "{err}");

    for len in [0, 4, 9, bytes.len() - 1] {
        assert!(
            matches!(
                ClassFile::parse(&bytes[..len]),
                Err(DecompileError::MalformedClassFile { .. })
            ),
            "length {len}"
        );
    }
}

#[test]
fn parse_from_reader() {
    let bytes = hello_class();
    let class = parse_class_from_reader(&mut bytes.as_slice()).unwrap();
    assert_eq!(class.methods.len(), 2);
}
