mod common;

use classfile_decompiler::decompile::expr::{CompareOp, Expr};
use classfile_decompiler::decompile::instruction::{Instruction, InstructionKind};
use classfile_decompiler::{
    decompile_named, decompile_to_string, ClassDecompiler, DecompileError, DecompilerConfig, MapLoader, NullLoader,
};
use common::*;

fn quiet() -> DecompilerConfig {
    DecompilerConfig {
        write_metadata: false,
        ..Default::default()
    }
}

fn source(bytes: &[u8], config: &DecompilerConfig) -> String {
    decompile_to_string(bytes, &NullLoader, config, None).unwrap()
}

fn flatten<'a>(list: &'a [Instruction], out: &mut Vec<&'a Instruction>) {
    for instruction in list {
        out.push(instruction);
        if let InstructionKind::For { init: Some(init), .. } = &instruction.kind {
            out.push(init.as_ref());
        }
        for body in instruction.bodies() {
            flatten(body, out);
        }
    }
}

fn all_instructions(list: &[Instruction]) -> Vec<&Instruction> {
    let mut out = Vec::new();
    flatten(list, &mut out);
    out
}

#[test]
fn static_method_source() {
    assert_eq!(
        source(&hello_class(), &quiet()),
        "package com.example;\n\
         \n\
         public class Hello {\n    \
             public static int add(int a, int b) {\n        \
                 return a + b;\n    \
             }\n\
         }\n"
    );
}

#[test]
fn default_constructor_on_request() {
    let config = DecompilerConfig {
        write_default_constructor: true,
        ..quiet()
    };
    let text = source(&hello_class(), &config);
    assert!(text.contains("    public Hello() {\n    }\n"), "{text}");
    assert!(!text.contains("super()"), "{text}");
    assert!(text.contains("    }\n\n    public static int add"), "{text}");
}

#[test]
fn realigned_line_numbers() {
    let config = DecompilerConfig {
        realign_line_numbers: true,
        show_line_numbers: true,
        ..quiet()
    };
    let text = source(&hello_class(), &config);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "/*   */ package com.example;");
    assert_eq!(lines[7], "/* 8 */         return a + b;");
}

#[test]
fn metadata_trailer() {
    let text = source(&hello_class(), &DecompilerConfig::default());
    assert!(text.contains("Java compiler version: 8 (52.0)"), "{text}");
    assert!(text.contains("Decompiler version:"), "{text}");
    assert!(text.trim_end().ends_with("*/"), "{text}");
}

fn counter_class() -> Vec<u8> {
    let mut b = ClassBuilder::new("com/example/Counter");
    b.field(ACC_PRIVATE, "count", "I");
    b.default_constructor("java/lang/Object");
    let count = b.field_ref("com/example/Counter", "count", "I");
    let mut get = vec![0x2a, 0xb4];
    get.extend(idx(count));
    get.push(0xac);
    b.method(ACC_PUBLIC, "get", "()I", Some(Code::new(1, 1, get)));
    let mut set = vec![0x2a, 0x1b, 0xb5];
    set.extend(idx(count));
    set.push(0xb1);
    b.method(
        ACC_PUBLIC,
        "set",
        "(I)V",
        Some(Code::new(2, 2, set).param("count", "I", 1)),
    );
    b.build()
}

#[test]
fn this_prefix() {
    let bytes = counter_class();
    let text = source(&bytes, &quiet());
    assert!(text.contains("private int count;"), "{text}");
    assert!(text.contains("return this.count;"), "{text}");

    let config = DecompilerConfig {
        omit_this_prefix: true,
        ..quiet()
    };
    let text = source(&bytes, &config);
    assert!(text.contains("return count;"), "{text}");
    // a parameter of the same name still needs the qualifier
    assert!(text.contains("this.count = count;"), "{text}");
}

#[test]
fn unicode_escapes() {
    let mut b = ClassBuilder::new("com/example/Text");
    let s = b.string("café");
    let code = Code::new(1, 0, vec![0x12, s as u8, 0xb0]);
    b.method(ACC_PUBLIC | ACC_STATIC, "s", "()Ljava/lang/String;", Some(code));
    let bytes = b.build();

    assert!(source(&bytes, &quiet()).contains("return \"café\";"));
    let config = DecompilerConfig {
        escape_unicode_characters: true,
        ..quiet()
    };
    let text = source(&bytes, &config);
    assert!(text.contains("return \"caf\\u00E9\";"), "{text}");
    assert!(text.contains("public static String s()"), "{text}");
}

#[test]
fn constant_fields() {
    let mut b = ClassBuilder::new("com/example/Limits");
    let ten = b.integer(10);
    let one = b.integer(1);
    let big = b.long(1 << 40);
    b.field_with_constant(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "MAX", "I", Some(ten));
    b.field_with_constant(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "ENABLED", "Z", Some(one));
    b.field_with_constant(ACC_STATIC | ACC_FINAL, "BIG", "J", Some(big));
    let text = source(&b.build(), &quiet());
    assert!(text.contains("public static final int MAX = 10;"), "{text}");
    assert!(text.contains("public static final boolean ENABLED = true;"), "{text}");
    assert!(text.contains("static final long BIG = 1099511627776L;"), "{text}");
}

fn child_class() -> Vec<u8> {
    let mut b = ClassBuilder::with_super("com/example/Child", "com/missing/Base");
    b.default_constructor("com/missing/Base");
    b.build()
}

#[test]
fn unresolved_superclass_is_qualified() {
    let text = source(&child_class(), &quiet());
    assert!(text.contains("public class Child extends com.missing.Base {"), "{text}");
    assert!(!text.contains("import"), "{text}");
}

#[test]
fn resolved_superclass_is_imported() {
    let mut base = ClassBuilder::new("com/missing/Base");
    base.default_constructor("java/lang/Object");
    let mut loader = MapLoader::new();
    loader.insert("com/missing/Base", base.build());

    let text = decompile_to_string(&child_class(), &loader, &quiet(), None).unwrap();
    assert!(text.contains("import com.missing.Base;"), "{text}");
    assert!(text.contains("public class Child extends Base {"), "{text}");
}

#[test]
fn failed_method_keeps_siblings() {
    let mut b = ClassBuilder::new("com/example/Broken");
    b.method(ACC_PUBLIC | ACC_STATIC, "bad", "()V", Some(Code::new(0, 0, vec![0xfe])));
    b.method(
        ACC_PUBLIC | ACC_STATIC,
        "good",
        "(I)I",
        Some(Code::new(1, 1, vec![0x1a, 0xac]).param("x", "I", 0)),
    );
    let bytes = b.build();

    let class = ClassDecompiler::new(&quiet(), &NullLoader).decompile_bytes(&bytes).unwrap();
    assert!(class.method("bad").unwrap().contains_error());
    assert!(!class.method("good").unwrap().contains_error());

    let text = source(&bytes, &quiet());
    assert!(text.contains("public static void bad() {"), "{text}");
    assert!(text.contains("// INTERNAL ERROR"), "{text}");
    assert!(text.contains("return x;"), "{text}");
}

#[test]
fn malformed_input() {
    let bytes = hello_class();
    let mut bad_magic = bytes.clone();
    bad_magic[0] = 0;
    assert!(matches!(
        decompile_to_string(&bad_magic, &NullLoader, &quiet(), None),
        Err(DecompileError::MalformedClassFile { .. })
    ));
    assert!(matches!(
        decompile_to_string(&bytes[..bytes.len() / 2], &NullLoader, &quiet(), None),
        Err(DecompileError::MalformedClassFile { .. })
    ));

    let mut loader = MapLoader::new();
    loader.insert("com/example/Garbage", b"not a class".to_vec());
    let text = decompile_named("com/example/Garbage", &loader, &quiet()).unwrap();
    assert!(text.starts_with("// INTERNAL ERROR: com.example.Garbage"), "{text}");

    assert!(matches!(
        decompile_named("com/example/Missing", &loader, &quiet()),
        Err(DecompileError::ClassNotFound { .. })
    ));
}

#[test]
fn member_class_is_nested() {
    let mut outer = ClassBuilder::new("com/example/Outer");
    outer.default_constructor("java/lang/Object");
    outer.inner_class("com/example/Outer$Node", "Node", ACC_PUBLIC | ACC_STATIC);

    let mut node = ClassBuilder::new("com/example/Outer$Node");
    node.field(ACC_PUBLIC, "value", "I");
    node.default_constructor("java/lang/Object");

    let mut loader = MapLoader::new();
    loader.insert("com/example/Outer$Node", node.build());
    let text = decompile_to_string(&outer.build(), &loader, &quiet(), None).unwrap();
    assert!(text.contains("public class Outer {"), "{text}");
    assert!(text.contains("    public static class Node {"), "{text}");
    assert!(text.contains("        public int value;"), "{text}");
}

#[test]
fn conditional_value_becomes_ternary() {
    let class = ClassDecompiler::new(&quiet(), &NullLoader)
        .decompile_bytes(&ternary_class())
        .unwrap();
    let method = class.method("pick").unwrap();
    assert!(!method.contains_error());
    let all = all_instructions(method.statements());
    assert!(!all.iter().any(|i| matches!(i.kind, InstructionKind::If { .. })));

    let mut ternaries = 0;
    for instruction in &all {
        for e in instruction.expressions() {
            e.walk(&mut |e| {
                if matches!(e, Expr::Ternary { .. }) {
                    ternaries += 1;
                }
            });
        }
    }
    assert_eq!(ternaries, 1);

    let text = source(&ternary_class(), &quiet());
    assert!(text.contains(" ? "), "{text}");
    assert!(!text.contains("goto"), "{text}");
}

#[test]
fn assertion_round_trip() {
    let class = ClassDecompiler::new(&quiet(), &NullLoader)
        .decompile_bytes(&assert_class())
        .unwrap();
    let method = class.method("check").unwrap();
    let asserts: Vec<_> = all_instructions(method.statements())
        .into_iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::Assert { condition, message } => Some((condition, message)),
            _ => None,
        })
        .collect();
    assert_eq!(asserts.len(), 1);
    let (condition, message) = asserts[0];
    match condition {
        Expr::Compare { op, left, right } => {
            assert_eq!(*op, CompareOp::Gt);
            assert!(matches!(**left, Expr::Local(_)));
            assert_eq!(**right, Expr::IntLiteral(0));
        }
        other => panic!("unexpected condition {other:?}"),
    }
    assert_eq!(message.as_ref(), Some(&Expr::StringLiteral("bad".to_string())));

    let text = source(&assert_class(), &quiet());
    assert!(text.contains("assert x > 0 : \"bad\";"), "{text}");
    assert!(!text.contains("$assertionsDisabled"), "{text}");
}

#[test]
fn loop_renders_without_jumps() {
    let text = source(&loop_class(), &quiet());
    assert!(text.contains("i < n && i != 5"), "{text}");
    assert!(!text.contains("goto"), "{text}");
    assert!(!text.contains("INTERNAL ERROR"), "{text}");
}

fn tasks_classes() -> (Vec<u8>, Vec<u8>) {
    let mut tasks = ClassBuilder::new("com/example/Tasks");
    tasks.default_constructor("java/lang/Object");
    tasks.anonymous_class("com/example/Tasks$1");
    tasks.method(ACC_PUBLIC, "work", "()V", Some(Code::new(0, 1, vec![0xb1])));
    let anonymous = tasks.class("com/example/Tasks$1");
    let init = tasks.method_ref("com/example/Tasks$1", "<init>", "(Lcom/example/Tasks;)V");
    let mut bytes = vec![0xbb];
    bytes.extend(idx(anonymous));
    bytes.extend([0x59, 0x2a, 0xb7]);
    bytes.extend(idx(init));
    bytes.push(0xb0);
    tasks.method(ACC_PUBLIC, "task", "()Ljava/lang/Runnable;", Some(Code::new(3, 1, bytes)));

    let mut runnable = ClassBuilder::new("com/example/Tasks$1").access(ACC_SUPER);
    runnable.interface("java/lang/Runnable");
    runnable.field(ACC_FINAL | ACC_SYNTHETIC, "this$0", "Lcom/example/Tasks;");
    let outer = runnable.field_ref("com/example/Tasks$1", "this$0", "Lcom/example/Tasks;");
    let object_init = runnable.method_ref("java/lang/Object", "<init>", "()V");
    let work = runnable.method_ref("com/example/Tasks", "work", "()V");
    let mut bytes = vec![0x2a, 0x2b, 0xb5];
    bytes.extend(idx(outer));
    bytes.extend([0x2a, 0xb7]);
    bytes.extend(idx(object_init));
    bytes.push(0xb1);
    runnable.method(0, "<init>", "(Lcom/example/Tasks;)V", Some(Code::new(2, 2, bytes)));
    let mut bytes = vec![0x2a, 0xb4];
    bytes.extend(idx(outer));
    bytes.push(0xb6);
    bytes.extend(idx(work));
    bytes.push(0xb1);
    runnable.method(ACC_PUBLIC, "run", "()V", Some(Code::new(1, 1, bytes)));
    (tasks.build(), runnable.build())
}

#[test]
fn anonymous_class_is_written_inline() {
    let (tasks, runnable) = tasks_classes();
    let mut loader = MapLoader::new();
    loader.insert("com/example/Tasks$1", runnable);
    let text = decompile_to_string(&tasks, &loader, &quiet(), None).unwrap();
    assert!(text.contains("        return new Runnable() {\n"), "{text}");
    assert!(text.contains("public void run() {"), "{text}");
    assert!(text.contains("Tasks.this.work();"), "{text}");
    assert!(text.contains("        };\n"), "{text}");
    for leftover in ["Tasks$1", "this$0", "class 1", "new 1("] {
        assert!(!text.contains(leftover), "found {leftover:?} in\n{text}");
    }

    // Without the class file the super type is unknown.
    let text = source(&tasks, &quiet());
    assert!(text.contains("new Tasks$1("), "{text}");
    assert!(!text.contains("new 1("), "{text}");
}

#[test]
fn inner_class_constructor_hides_enclosing_instance() {
    let mut outer = ClassBuilder::new("com/example/Outer");
    outer.default_constructor("java/lang/Object");
    outer.inner_class("com/example/Outer$Inner", "Inner", ACC_PUBLIC);

    let mut inner = ClassBuilder::new("com/example/Outer$Inner");
    inner.field(ACC_FINAL | ACC_SYNTHETIC, "this$0", "Lcom/example/Outer;");
    inner.field(ACC_PUBLIC, "value", "I");
    let this0 = inner.field_ref("com/example/Outer$Inner", "this$0", "Lcom/example/Outer;");
    let value = inner.field_ref("com/example/Outer$Inner", "value", "I");
    let object_init = inner.method_ref("java/lang/Object", "<init>", "()V");
    let hash = inner.method_ref("com/example/Outer", "hashCode", "()I");
    let mut bytes = vec![0x2a, 0x2b, 0xb5];
    bytes.extend(idx(this0));
    bytes.extend([0x2a, 0xb7]);
    bytes.extend(idx(object_init));
    bytes.extend([0x2a, 0x1c, 0xb5]);
    bytes.extend(idx(value));
    bytes.push(0xb1);
    let code = Code::new(2, 3, bytes)
        .param("this", "Lcom/example/Outer$Inner;", 0)
        .param("this$0", "Lcom/example/Outer;", 1)
        .param("value", "I", 2);
    inner.method(ACC_PUBLIC, "<init>", "(Lcom/example/Outer;I)V", Some(code));
    let mut bytes = vec![0x2a, 0xb4];
    bytes.extend(idx(this0));
    bytes.push(0xb6);
    bytes.extend(idx(hash));
    bytes.push(0xac);
    inner.method(ACC_PUBLIC, "outerHash", "()I", Some(Code::new(1, 1, bytes)));

    let mut loader = MapLoader::new();
    loader.insert("com/example/Outer$Inner", inner.build());
    let text = decompile_to_string(&outer.build(), &loader, &quiet(), None).unwrap();
    assert!(text.contains("    public class Inner {"), "{text}");
    assert!(text.contains("public Inner(int value) {"), "{text}");
    assert!(text.contains("this.value = value;"), "{text}");
    assert!(text.contains("return Outer.this.hashCode();"), "{text}");
    assert!(!text.contains("this$0"), "{text}");
}

#[test]
fn lambdas_are_written_from_their_bodies() {
    let mut b = ClassBuilder::new("com/example/Lambdas");
    b.default_constructor("java/lang/Object");

    let later = b.lambda_site(
        "run",
        "(Ljava/lang/String;)Ljava/lang/Runnable;",
        "()V",
        "com/example/Lambdas",
        "lambda$later$0",
        "(Ljava/lang/String;)V",
        "()V",
    );
    let mut bytes = vec![0x2b, 0xba];
    bytes.extend(idx(later));
    bytes.extend([0x00, 0x00, 0xb0]);
    let code = Code::new(1, 2, bytes)
        .param("this", "Lcom/example/Lambdas;", 0)
        .param("msg", "Ljava/lang/String;", 1);
    b.method(ACC_PUBLIC, "later", "(Ljava/lang/String;)Ljava/lang/Runnable;", Some(code));

    let out = b.field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
    let println = b.method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V");
    let mut bytes = vec![0xb2];
    bytes.extend(idx(out));
    bytes.extend([0x2a, 0xb6]);
    bytes.extend(idx(println));
    bytes.push(0xb1);
    let code = Code::new(2, 1, bytes).param("msg", "Ljava/lang/String;", 0);
    b.method(ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC, "lambda$later$0", "(Ljava/lang/String;)V", Some(code));

    let lengths = b.lambda_site(
        "apply",
        "()Ljava/util/function/Function;",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        "com/example/Lambdas",
        "lambda$lengths$1",
        "(Ljava/lang/String;)Ljava/lang/Integer;",
        "(Ljava/lang/String;)Ljava/lang/Integer;",
    );
    let mut bytes = vec![0xba];
    bytes.extend(idx(lengths));
    bytes.extend([0x00, 0x00, 0xb0]);
    b.method(ACC_PUBLIC | ACC_STATIC, "lengths", "()Ljava/util/function/Function;", Some(Code::new(1, 0, bytes)));

    let length = b.method_ref("java/lang/String", "length", "()I");
    let value_of = b.method_ref("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;");
    let mut bytes = vec![0x2a, 0xb6];
    bytes.extend(idx(length));
    bytes.push(0xb8);
    bytes.extend(idx(value_of));
    bytes.push(0xb0);
    let code = Code::new(1, 1, bytes).param("s", "Ljava/lang/String;", 0);
    b.method(
        ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC,
        "lambda$lengths$1",
        "(Ljava/lang/String;)Ljava/lang/Integer;",
        Some(code),
    );

    let text = source(&b.build(), &quiet());
    assert!(text.contains("return () -> System.out.println(msg);"), "{text}");
    assert!(text.contains("return s -> Integer.valueOf(s.length());"), "{text}");
    assert!(!text.contains("lambda$"), "{text}");
}
