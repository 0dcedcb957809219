mod common;

use classfile_decompiler::{decompile_to_string, DecompilerConfig, NullLoader};
use common::*;

/// Decompiles `bytes` and checks that structuring left no trace of the
/// operand stack or of jumps.
fn structured(bytes: &[u8]) -> String {
    let config = DecompilerConfig {
        write_metadata: false,
        ..Default::default()
    };
    let text = decompile_to_string(bytes, &NullLoader, &config, None).unwrap();
    for leftover in ["$stack", "// L", "goto", "INTERNAL ERROR"] {
        assert!(!text.contains(leftover), "found {leftover:?} in\n{text}");
    }
    text
}

fn static_call(b: &mut ClassBuilder, owner: &str, name: &str, descriptor: &str) -> Vec<u8> {
    let mut call = vec![0xb8];
    call.extend(idx(b.method_ref(owner, name, descriptor)));
    call
}

#[test]
fn try_catch_returning_a_value() {
    let text = structured(&parse_class());
    assert!(text.contains("        try {\n            return Integer.parseInt(s);\n"), "{text}");
    assert!(text.contains("} catch (NumberFormatException e) {\n            return -1;\n"), "{text}");
}

#[test]
fn try_finally() {
    let mut b = ClassBuilder::new("com/example/Cleanup");
    let work = static_call(&mut b, "com/example/Cleanup", "work", "()V");
    let done = static_call(&mut b, "com/example/Cleanup", "done", "()V");
    let mut bytes = work;
    bytes.extend(&done);
    bytes.push(0xa7); // goto -> 15
    bytes.extend(off(9));
    bytes.push(0x4b);
    bytes.extend(&done);
    bytes.extend([0x2a, 0xbf, 0xb1]);
    let code = Code::new(1, 1, bytes).handler(0, 3, 9, 0);
    b.method(ACC_STATIC, "run", "()V", Some(code));

    let text = structured(&b.build());
    assert!(text.contains("try {\n            work();\n        } finally {\n            done();\n        }"), "{text}");
    assert_eq!(text.matches("done();").count(), 1, "{text}");
}

#[test]
fn multi_catch() {
    let mut b = ClassBuilder::new("com/example/Guard");
    let illegal_state = b.class("java/lang/IllegalStateException");
    let illegal_argument = b.class("java/lang/IllegalArgumentException");
    let mut bytes = static_call(&mut b, "com/example/Guard", "work", "()V");
    bytes.push(0xa7); // goto -> 11
    bytes.extend(off(8));
    bytes.extend([0x4b, 0x2a]);
    bytes.extend(static_call(&mut b, "com/example/Guard", "fail", "(Ljava/lang/RuntimeException;)V"));
    bytes.push(0xb1);
    let code = Code::new(1, 1, bytes)
        .local(7, 4, "e", "Ljava/lang/RuntimeException;", 0)
        .handler(0, 3, 6, illegal_state)
        .handler(0, 3, 6, illegal_argument);
    b.method(ACC_STATIC, "guard", "()V", Some(code));

    let text = structured(&b.build());
    assert!(
        text.contains("} catch (IllegalStateException | IllegalArgumentException e) {\n            fail(e);\n        }"),
        "{text}"
    );
}

#[test]
fn nested_try_with_values_on_the_stack() {
    let mut b = ClassBuilder::new("com/example/Nested");
    let number_format = b.class("java/lang/NumberFormatException");
    let runtime = b.class("java/lang/RuntimeException");
    let mut bytes = vec![0x2a];
    bytes.extend(static_call(&mut b, "java/lang/Integer", "parseInt", "(Ljava/lang/String;)I"));
    bytes.extend([0xac, 0x4c, 0x02, 0xac, 0x4c, 0x10, 0xfe, 0xac]);
    let code = Code::new(1, 2, bytes)
        .param("s", "Ljava/lang/String;", 0)
        .local(6, 2, "e", "Ljava/lang/NumberFormatException;", 1)
        .local(9, 3, "outer", "Ljava/lang/RuntimeException;", 1)
        .handler(0, 4, 5, number_format)
        .handler(0, 4, 8, runtime)
        .handler(5, 7, 8, runtime);
    b.method(ACC_STATIC, "nested", "(Ljava/lang/String;)I", Some(code));

    let text = structured(&b.build());
    assert_eq!(text.matches("try {").count(), 2, "{text}");
    assert!(text.contains("return Integer.parseInt(s);"), "{text}");
    assert!(text.contains("} catch (NumberFormatException e) {"), "{text}");
    assert!(text.contains("return -1;"), "{text}");
    assert!(text.contains("} catch (RuntimeException outer) {"), "{text}");
    assert!(text.contains("return -2;"), "{text}");
}

#[test]
fn table_switch() {
    let mut b = ClassBuilder::new("com/example/Sizes");
    let mut bytes = vec![0x1a, 0xaa, 0x00, 0x00];
    for word in [29i32, 1, 2, 23, 26] {
        bytes.extend(word.to_be_bytes());
    }
    bytes.extend([0x10, 10, 0xac, 0x10, 20, 0xac, 0x03, 0xac]);
    let code = Code::new(1, 1, bytes).param("k", "I", 0);
    b.method(ACC_STATIC, "size", "(I)I", Some(code));

    let text = structured(&b.build());
    assert!(text.contains("switch (k) {"), "{text}");
    for expected in ["case 1:", "return 10;", "case 2:", "return 20;", "default:", "return 0;"] {
        assert!(text.contains(expected), "missing {expected:?} in\n{text}");
    }
    assert!(text.find("case 1:") < text.find("return 10;"), "{text}");
}

#[test]
fn synchronized_block() {
    let mut b = ClassBuilder::new("com/example/Locked");
    let mut bytes = vec![0x2a, 0x59, 0x4c, 0xc2];
    bytes.extend(static_call(&mut b, "com/example/Locked", "work", "()V"));
    bytes.extend([0x2b, 0xc3, 0xa7]); // goto -> 17
    bytes.extend(off(8));
    bytes.extend([0x4d, 0x2b, 0xc3, 0x2c, 0xbf, 0xb1]);
    let code = Code::new(2, 3, bytes)
        .param("lock", "Ljava/lang/Object;", 0)
        .handler(4, 9, 12, 0)
        .handler(12, 15, 12, 0);
    b.method(ACC_STATIC, "run", "(Ljava/lang/Object;)V", Some(code));

    let text = structured(&b.build());
    assert!(text.contains("synchronized (lock) {\n            work();\n        }"), "{text}");
    assert!(!text.contains("monitor"), "{text}");
    assert!(!text.contains("finally"), "{text}");
}

fn counters_class() -> Vec<u8> {
    let mut b = ClassBuilder::new("com/example/Counters");
    b.field(ACC_STATIC, "count", "I");
    b.field(ACC_PRIVATE, "hits", "I");
    b.default_constructor("java/lang/Object");
    let count = b.field_ref("com/example/Counters", "count", "I");
    let hits = b.field_ref("com/example/Counters", "hits", "I");

    // return a[i]++;
    let bump = Code::new(4, 2, vec![0x2a, 0x1b, 0x5c, 0x2e, 0x5b, 0x04, 0x60, 0x4f, 0xac])
        .param("a", "[I", 0)
        .param("i", "I", 1);
    b.method(ACC_STATIC, "bump", "([II)I", Some(bump));

    // return this.hits++;
    let mut bytes = vec![0x2a, 0x59, 0xb4];
    bytes.extend(idx(hits));
    bytes.extend([0x5a, 0x04, 0x60, 0xb5]);
    bytes.extend(idx(hits));
    bytes.push(0xac);
    b.method(ACC_PUBLIC, "hit", "()I", Some(Code::new(3, 1, bytes)));

    // return count++;
    let mut bytes = vec![0xb2];
    bytes.extend(idx(count));
    bytes.extend([0x59, 0x04, 0x60, 0xb3]);
    bytes.extend(idx(count));
    bytes.push(0xac);
    b.method(ACC_STATIC, "tick", "()I", Some(Code::new(2, 0, bytes)));

    // a[i] += 5;
    let add = Code::new(4, 2, vec![0x2a, 0x1b, 0x5c, 0x2e, 0x08, 0x60, 0x4f, 0xb1])
        .param("a", "[I", 0)
        .param("i", "I", 1);
    b.method(ACC_STATIC, "add", "([II)V", Some(add));
    b.build()
}

#[test]
fn postfix_increments_keep_the_old_value() {
    let text = structured(&counters_class());
    assert!(text.contains("return a[i]++;"), "{text}");
    assert!(text.contains("return this.hits++;"), "{text}");
    assert!(text.contains("return count++;"), "{text}");
    assert!(text.contains("a[i] += 5;"), "{text}");
    assert!(!text.contains("+= 1"), "{text}");
}

#[test]
fn split_table_entries_are_one_variable() {
    let mut b = ClassBuilder::new("com/example/Split");
    let mut bytes = vec![0x1a, 0x99];
    bytes.extend(off(8)); // ifeq -> 9
    bytes.extend([0x04, 0x3c, 0xa7]);
    bytes.extend(off(5)); // goto -> 11
    bytes.extend([0x05, 0x3c, 0x1b, 0xac]);
    let code = Code::new(1, 2, bytes)
        .param("b", "Z", 0)
        .local(6, 3, "r", "I", 1)
        .local(11, 2, "r", "I", 1);
    b.method(ACC_STATIC, "pick", "(Z)I", Some(code));

    let text = structured(&b.build());
    assert_eq!(text.matches("int r").count(), 1, "{text}");
    assert!(text.contains("if (b) {\n            r = 1;\n        } else {\n            r = 2;\n        }"), "{text}");
    assert!(text.contains("return r;"), "{text}");
}

#[test]
fn char_local_from_constant() {
    let mut b = ClassBuilder::new("com/example/Letters");
    let code = Code::new(1, 1, vec![0x11, 0x00, 0xe9, 0x3b, 0x1a, 0xac]).local(4, 2, "c", "C", 0);
    b.method(ACC_STATIC, "letter", "()C", Some(code));

    let text = structured(&b.build());
    assert!(text.contains("char c = 'é';"), "{text}");
    assert!(text.contains("return c;"), "{text}");
}
