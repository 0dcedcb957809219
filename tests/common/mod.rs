//! Assembles class files in memory so every stage runs on real bytes.
#![allow(dead_code)]

use std::collections::HashMap;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_SYNTHETIC: u16 = 0x1000;

/// A method body: raw bytecode plus the tables the decompiler reads.
#[derive(Clone, Debug, Default)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    /// `(start_pc, end_pc, handler_pc, catch_type)` with `catch_type` a
    /// class constant index or zero.
    pub exceptions: Vec<(u16, u16, u16, u16)>,
    /// `(start_pc, line)`
    pub lines: Vec<(u16, u16)>,
    /// `(start_pc, length, name, descriptor, slot)`
    pub locals: Vec<(u16, u16, String, String, u16)>,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16, bytes: Vec<u8>) -> Self {
        Code {
            max_stack,
            max_locals,
            bytes,
            ..Default::default()
        }
    }

    pub fn line(mut self, start_pc: u16, line: u16) -> Self {
        self.lines.push((start_pc, line));
        self
    }

    pub fn local(mut self, start_pc: u16, length: u16, name: &str, descriptor: &str, slot: u16) -> Self {
        self.locals
            .push((start_pc, length, name.to_string(), descriptor.to_string(), slot));
        self
    }

    /// A local live for the whole body.
    pub fn param(self, name: &str, descriptor: &str, slot: u16) -> Self {
        let length = self.bytes.len() as u16;
        self.local(0, length, name, descriptor, slot)
    }

    pub fn handler(mut self, start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: u16) -> Self {
        self.exceptions.push((start_pc, end_pc, handler_pc, catch_type));
        self
    }
}

pub struct ClassBuilder {
    pool: Vec<Vec<u8>>,
    /// Next free constant pool index.
    next: u16,
    interned: HashMap<Vec<u8>, u16>,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    attributes: Vec<Vec<u8>>,
    /// `(method handle, arguments)` per BootstrapMethods entry.
    bootstrap_methods: Vec<(u16, Vec<u16>)>,
    bootstrap_name: u16,
    major: u16,
}

fn u16be(v: u16) -> [u8; 2] {
    v.to_be_bytes()
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self::with_super(name, "java/lang/Object")
    }

    pub fn with_super(name: &str, super_name: &str) -> Self {
        let mut builder = ClassBuilder {
            pool: Vec::new(),
            next: 1,
            interned: HashMap::new(),
            access: ACC_PUBLIC | ACC_SUPER,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            bootstrap_methods: Vec::new(),
            bootstrap_name: 0,
            major: 52,
        };
        builder.this_class = builder.class(name);
        builder.super_class = builder.class(super_name);
        builder
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn major(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    fn add(&mut self, entry: Vec<u8>, slots: u16) -> u16 {
        if let Some(index) = self.interned.get(&entry) {
            return *index;
        }
        let index = self.next;
        self.interned.insert(entry.clone(), index);
        self.pool.push(entry);
        self.next += slots;
        index
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&u16be(s.len() as u16));
        entry.extend_from_slice(s.as_bytes());
        self.add(entry, 1)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&u16be(name));
        self.add(entry, 1)
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let value = self.utf8(s);
        let mut entry = vec![8];
        entry.extend_from_slice(&u16be(value));
        self.add(entry, 1)
    }

    pub fn integer(&mut self, v: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&v.to_be_bytes());
        self.add(entry, 1)
    }

    pub fn long(&mut self, v: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend_from_slice(&v.to_be_bytes());
        self.add(entry, 2)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut entry = vec![12];
        entry.extend_from_slice(&u16be(name));
        entry.extend_from_slice(&u16be(descriptor));
        self.add(entry, 1)
    }

    fn member_ref(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let owner = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        let mut entry = vec![tag];
        entry.extend_from_slice(&u16be(owner));
        entry.extend_from_slice(&u16be(nat));
        self.add(entry, 1)
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(9, owner, name, descriptor)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(10, owner, name, descriptor)
    }

    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor = self.utf8(descriptor);
        let mut entry = vec![16];
        entry.extend_from_slice(&u16be(descriptor));
        self.add(entry, 1)
    }

    /// A `REF_invokeStatic` handle on a method of `owner`.
    pub fn static_handle(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let reference = self.method_ref(owner, name, descriptor);
        let mut entry = vec![15, 6];
        entry.extend_from_slice(&u16be(reference));
        self.add(entry, 1)
    }

    /// Registers a bootstrap method and returns its BootstrapMethods index.
    pub fn bootstrap_method(&mut self, handle: u16, arguments: &[u16]) -> u16 {
        self.bootstrap_name = self.utf8("BootstrapMethods");
        self.bootstrap_methods.push((handle, arguments.to_vec()));
        (self.bootstrap_methods.len() - 1) as u16
    }

    pub fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let nat = self.name_and_type(name, descriptor);
        let mut entry = vec![18];
        entry.extend_from_slice(&u16be(bootstrap));
        entry.extend_from_slice(&u16be(nat));
        self.add(entry, 1)
    }

    /// A `LambdaMetafactory.metafactory` call site implemented by the
    /// static method `owner.target`.
    #[allow(clippy::too_many_arguments)]
    pub fn lambda_site(
        &mut self,
        name: &str,
        site: &str,
        erased: &str,
        owner: &str,
        target: &str,
        target_descriptor: &str,
        instantiated: &str,
    ) -> u16 {
        let factory = self.static_handle(
            "java/lang/invoke/LambdaMetafactory",
            "metafactory",
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;\
             Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)\
             Ljava/lang/invoke/CallSite;",
        );
        let erased = self.method_type(erased);
        let implementation = self.static_handle(owner, target, target_descriptor);
        let instantiated = self.method_type(instantiated);
        let bootstrap = self.bootstrap_method(factory, &[erased, implementation, instantiated]);
        self.invoke_dynamic(bootstrap, name, site)
    }

    pub fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    fn attribute(&mut self, name: &str, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 6);
        out.extend_from_slice(&u16be(self.utf8(name)));
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    pub fn field(&mut self, access: u16, name: &str, descriptor: &str) -> &mut Self {
        self.field_with_constant(access, name, descriptor, None)
    }

    /// A field with a ConstantValue attribute pointing at `constant`.
    pub fn field_with_constant(&mut self, access: u16, name: &str, descriptor: &str, constant: Option<u16>) -> &mut Self {
        let mut out = Vec::new();
        out.extend_from_slice(&u16be(access));
        out.extend_from_slice(&u16be(self.utf8(name)));
        out.extend_from_slice(&u16be(self.utf8(descriptor)));
        match constant {
            Some(index) => {
                out.extend_from_slice(&u16be(1));
                let attr = self.attribute("ConstantValue", &u16be(index));
                out.extend_from_slice(&attr);
            }
            None => out.extend_from_slice(&u16be(0)),
        }
        self.fields.push(out);
        self
    }

    pub fn method(&mut self, access: u16, name: &str, descriptor: &str, code: Option<Code>) -> &mut Self {
        let mut out = Vec::new();
        out.extend_from_slice(&u16be(access));
        out.extend_from_slice(&u16be(self.utf8(name)));
        out.extend_from_slice(&u16be(self.utf8(descriptor)));
        match code {
            Some(code) => {
                out.extend_from_slice(&u16be(1));
                let attr = self.code_attribute(&code);
                out.extend_from_slice(&attr);
            }
            None => out.extend_from_slice(&u16be(0)),
        }
        self.methods.push(out);
        self
    }

    /// `public <init>()V` calling the superclass constructor.
    pub fn default_constructor(&mut self, super_name: &str) -> &mut Self {
        let init = self.method_ref(super_name, "<init>", "()V");
        let [hi, lo] = u16be(init);
        let code = Code::new(1, 1, vec![0x2a, 0xb7, hi, lo, 0xb1]);
        self.method(ACC_PUBLIC, "<init>", "()V", Some(code))
    }

    fn code_attribute(&mut self, code: &Code) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&u16be(code.max_stack));
        body.extend_from_slice(&u16be(code.max_locals));
        body.extend_from_slice(&(code.bytes.len() as u32).to_be_bytes());
        body.extend_from_slice(&code.bytes);
        body.extend_from_slice(&u16be(code.exceptions.len() as u16));
        for (start, end, handler, catch_type) in &code.exceptions {
            for v in [*start, *end, *handler, *catch_type] {
                body.extend_from_slice(&u16be(v));
            }
        }
        let mut attributes = Vec::new();
        if !code.lines.is_empty() {
            let mut table = Vec::new();
            table.extend_from_slice(&u16be(code.lines.len() as u16));
            for (pc, line) in &code.lines {
                table.extend_from_slice(&u16be(*pc));
                table.extend_from_slice(&u16be(*line));
            }
            attributes.push(self.attribute("LineNumberTable", &table));
        }
        if !code.locals.is_empty() {
            let mut table = Vec::new();
            table.extend_from_slice(&u16be(code.locals.len() as u16));
            for (start, length, name, descriptor, slot) in &code.locals {
                table.extend_from_slice(&u16be(*start));
                table.extend_from_slice(&u16be(*length));
                table.extend_from_slice(&u16be(self.utf8(name)));
                table.extend_from_slice(&u16be(self.utf8(descriptor)));
                table.extend_from_slice(&u16be(*slot));
            }
            attributes.push(self.attribute("LocalVariableTable", &table));
        }
        body.extend_from_slice(&u16be(attributes.len() as u16));
        for a in attributes {
            body.extend_from_slice(&a);
        }
        self.attribute("Code", &body)
    }

    /// Declares `inner` as a member class of this class.
    pub fn inner_class(&mut self, inner: &str, simple_name: &str, access: u16) -> &mut Self {
        let inner_index = self.class(inner);
        let outer_index = self.this_class;
        let name_index = self.utf8(simple_name);
        let mut body = Vec::new();
        body.extend_from_slice(&u16be(1));
        for v in [inner_index, outer_index, name_index, access] {
            body.extend_from_slice(&u16be(v));
        }
        let attr = self.attribute("InnerClasses", &body);
        self.attributes.push(attr);
        self
    }

    /// Declares `inner` as an anonymous class: no outer class, no name.
    pub fn anonymous_class(&mut self, inner: &str) -> &mut Self {
        let inner_index = self.class(inner);
        let mut body = Vec::new();
        body.extend_from_slice(&u16be(1));
        for v in [inner_index, 0, 0, 0] {
            body.extend_from_slice(&u16be(v));
        }
        let attr = self.attribute("InnerClasses", &body);
        self.attributes.push(attr);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE];
        out.extend_from_slice(&u16be(0));
        out.extend_from_slice(&u16be(self.major));
        out.extend_from_slice(&u16be(self.next));
        for entry in &self.pool {
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(&u16be(self.access));
        out.extend_from_slice(&u16be(self.this_class));
        out.extend_from_slice(&u16be(self.super_class));
        out.extend_from_slice(&u16be(self.interfaces.len() as u16));
        for i in &self.interfaces {
            out.extend_from_slice(&u16be(*i));
        }
        for list in [&self.fields, &self.methods] {
            out.extend_from_slice(&u16be(list.len() as u16));
            for item in list {
                out.extend_from_slice(item);
            }
        }
        let bootstrap = (!self.bootstrap_methods.is_empty()).then(|| {
            let mut body = u16be(self.bootstrap_methods.len() as u16).to_vec();
            for (handle, arguments) in &self.bootstrap_methods {
                body.extend_from_slice(&u16be(*handle));
                body.extend_from_slice(&u16be(arguments.len() as u16));
                for a in arguments {
                    body.extend_from_slice(&u16be(*a));
                }
            }
            let mut attr = u16be(self.bootstrap_name).to_vec();
            attr.extend_from_slice(&(body.len() as u32).to_be_bytes());
            attr.extend_from_slice(&body);
            attr
        });
        out.extend_from_slice(&u16be((self.attributes.len() + usize::from(bootstrap.is_some())) as u16));
        for a in self.attributes.iter().chain(bootstrap.iter()) {
            out.extend_from_slice(a);
        }
        out
    }
}

/// Big-endian bytes of a constant pool index, for splicing into bytecode.
pub fn idx(index: u16) -> [u8; 2] {
    u16be(index)
}

/// Big-endian bytes of a branch offset.
pub fn off(delta: i16) -> [u8; 2] {
    delta.to_be_bytes()
}

/// `com/example/Hello` with a default constructor and
/// `public static int add(int a, int b) { return a + b; }` on line 8.
pub fn hello_class() -> Vec<u8> {
    let mut b = ClassBuilder::new("com/example/Hello");
    b.default_constructor("java/lang/Object");
    let code = Code::new(2, 2, vec![0x1a, 0x1b, 0x60, 0xac])
        .param("a", "I", 0)
        .param("b", "I", 1)
        .line(0, 8);
    b.method(ACC_PUBLIC | ACC_STATIC, "add", "(II)I", Some(code));
    b.build()
}

/// `static void check(int x) { assert x > 0 : "bad"; }`
pub fn assert_class() -> Vec<u8> {
    let mut b = ClassBuilder::new("com/example/Checked");
    b.field(ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC, "$assertionsDisabled", "Z");
    b.default_constructor("java/lang/Object");
    let flag = b.field_ref("com/example/Checked", "$assertionsDisabled", "Z");
    let error = b.class("java/lang/AssertionError");
    let init = b.method_ref("java/lang/AssertionError", "<init>", "(Ljava/lang/Object;)V");
    let message = b.string("bad");
    let mut bytes = vec![0xb2];
    bytes.extend(idx(flag));
    bytes.push(0x9a); // ifne -> 20
    bytes.extend(off(17));
    bytes.push(0x1a);
    bytes.push(0x9d); // ifgt -> 20
    bytes.extend(off(13));
    bytes.push(0xbb);
    bytes.extend(idx(error));
    bytes.push(0x59);
    bytes.push(0x12);
    bytes.push(message as u8);
    bytes.push(0xb7);
    bytes.extend(idx(init));
    bytes.push(0xbf);
    bytes.push(0xb1);
    let code = Code::new(3, 1, bytes).param("x", "I", 0).line(0, 12);
    b.method(ACC_STATIC, "check", "(I)V", Some(code));
    b.build()
}

/// `static int pick(boolean cond) { int y = cond ? 1 : 2; return y; }`
pub fn ternary_class() -> Vec<u8> {
    let mut b = ClassBuilder::new("com/example/Pick");
    let mut bytes = vec![0x1a, 0x99];
    bytes.extend(off(7)); // ifeq -> 8
    bytes.push(0x04);
    bytes.push(0xa7);
    bytes.extend(off(4)); // goto -> 9
    bytes.extend([0x05, 0x3c, 0x1b, 0xac]);
    let code = Code::new(1, 2, bytes)
        .param("cond", "Z", 0)
        .local(10, 2, "y", "I", 1);
    b.method(ACC_STATIC, "pick", "(Z)I", Some(code));
    b.build()
}

/// `static void spin(int n) { int i = 0; while (i < n && i != 5) i++; }`
pub fn loop_class() -> Vec<u8> {
    let mut b = ClassBuilder::new("com/example/Spin");
    let mut bytes = vec![0x03, 0x3c, 0x1b, 0x1a, 0xa2];
    bytes.extend(off(14)); // if_icmpge -> 18
    bytes.extend([0x1b, 0x08, 0x9f]);
    bytes.extend(off(9)); // if_icmpeq -> 18
    bytes.extend([0x84, 0x01, 0x01, 0xa7]);
    bytes.extend(off(-13)); // goto -> 2
    bytes.push(0xb1);
    let code = Code::new(2, 2, bytes)
        .param("n", "I", 0)
        .local(2, 16, "i", "I", 1);
    b.method(ACC_STATIC, "spin", "(I)V", Some(code));
    b.build()
}

/// `static int parse(String s) { try { return Integer.parseInt(s); }
/// catch (NumberFormatException e) { return -1; } }`. The call's value
/// crosses the end of the protected range into the `ireturn`.
pub fn parse_class() -> Vec<u8> {
    let mut b = ClassBuilder::new("com/example/Parse");
    let parse_int = b.method_ref("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I");
    let caught = b.class("java/lang/NumberFormatException");
    let mut bytes = vec![0x2a, 0xb8];
    bytes.extend(idx(parse_int));
    bytes.extend([0xac, 0x4c, 0x02, 0xac]);
    let code = Code::new(1, 2, bytes)
        .param("s", "Ljava/lang/String;", 0)
        .local(6, 2, "e", "Ljava/lang/NumberFormatException;", 1)
        .handler(0, 4, 5, caught);
    b.method(ACC_PUBLIC | ACC_STATIC, "parse", "(Ljava/lang/String;)I", Some(code));
    b.build()
}
