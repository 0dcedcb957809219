mod common;

use classfile_decompiler::code_attribute::code_parser;
use classfile_decompiler::decompile::builder::{self, BuildContext};
use classfile_decompiler::decompile::cfg::{self, Cfg};
use classfile_decompiler::decompile::descriptor::parse_method_signature;
use classfile_decompiler::decompile::expr::Expr;
use classfile_decompiler::decompile::instruction::InstructionKind;
use classfile_decompiler::decompile::locals::{LocalVariables, ParameterInfo};
use classfile_decompiler::decompile::reducer;
use classfile_decompiler::method_info::MethodAccessFlags;
use classfile_decompiler::ClassFile;
use common::*;

/// Runs a method up to block construction.
fn cfg_of(bytes: &[u8], method_name: &str) -> (Cfg, LocalVariables) {
    let class = ClassFile::parse(bytes).unwrap();
    let this_class = class.this_class_name().unwrap().to_string();
    let pool = &class.const_pool;
    let method = class
        .methods
        .iter()
        .find(|m| pool.utf8(m.name_index).unwrap() == method_name)
        .unwrap();
    let descriptor = pool.utf8(method.descriptor_index).unwrap();
    let signature = parse_method_signature(descriptor).unwrap();
    let code = method.code().unwrap();
    let params = ParameterInfo {
        is_static: method.access_flags.contains(MethodAccessFlags::STATIC),
        types: signature.parameters.0.clone(),
        names: vec![None; signature.parameters.0.len()],
    };
    let mut locals = LocalVariables::from_method(&this_class, &params, code, pool);

    let (_, bytecodes) = code_parser(&code.code).unwrap();
    let leaders = cfg::leaders(&bytecodes, &code.exception_table);
    let handlers = cfg::handler_types(code, pool).unwrap();
    let ctx = BuildContext {
        pool,
        code,
        this_class: &this_class,
        is_static: params.is_static,
        return_type: signature.return_type.clone(),
        bootstrap_methods: class.bootstrap_methods(),
        handlers: &handlers,
    };
    let built = builder::build(&bytecodes, &leaders, &ctx, &mut locals).unwrap();
    assert!(!built.contains_error(), "{:?}", built.errors);
    let graph = Cfg::build(code, pool, &leaders, built).unwrap();
    (graph, locals)
}

fn assert_tiles(graph: &Cfg) {
    let mut ranges: Vec<(u32, u32)> = graph.live_blocks().map(|b| (b.from_offset, b.to_offset)).collect();
    ranges.sort();
    assert_eq!(ranges.first().map(|r| r.0), Some(0));
    assert_eq!(ranges.last().map(|r| r.1), Some(graph.code_length));
    for pair in ranges.windows(2) {
        assert!(pair[0].0 < pair[0].1, "empty block {:?}", pair[0]);
        assert_eq!(pair[0].1, pair[1].0, "gap or overlap between {:?} and {:?}", pair[0], pair[1]);
    }
}

#[test]
fn blocks_tile_the_code() {
    for (bytes, name) in [
        (hello_class(), "add"),
        (assert_class(), "check"),
        (ternary_class(), "pick"),
        (loop_class(), "spin"),
    ] {
        let (graph, _) = cfg_of(&bytes, name);
        assert_tiles(&graph);
    }
}

#[test]
fn loop_membership() {
    let (graph, _) = cfg_of(&loop_class(), "spin");
    assert_eq!(graph.live_count(), 5);
    assert_eq!(graph.loops.len(), 1);
    let found = &graph.loops[0];
    assert_eq!(graph.block(found.start).from_offset, 2);
    assert_eq!(found.members.len(), 3);
    let offsets: Vec<u32> = found.members.iter().map(|&b| graph.block(b).from_offset).collect();
    assert_eq!(offsets, vec![2, 7, 12]);
}

#[test]
fn straight_line_code_has_no_loops() {
    let (graph, _) = cfg_of(&hello_class(), "add");
    assert_eq!(graph.live_count(), 1);
    assert!(graph.loops.is_empty());
    assert!(graph.regions.is_empty());
}

#[test]
fn reduction_is_idempotent() {
    for (bytes, name) in [(assert_class(), "check"), (ternary_class(), "pick"), (loop_class(), "spin")] {
        let (mut graph, _) = cfg_of(&bytes, name);
        let steps = reducer::reduce(&mut graph, 256).unwrap();
        assert!(steps > 0, "{name}");
        assert!(reducer::is_reduced(&graph), "{name}");
        assert_eq!(reducer::reduce(&mut graph, 256).unwrap(), 0, "{name}");
    }
}

#[test]
fn reduced_loop_has_no_jumps() {
    let (mut graph, _) = cfg_of(&loop_class(), "spin");
    reducer::reduce(&mut graph, 256).unwrap();
    let statements = reducer::into_statements(&mut graph);
    assert!(statements.iter().any(|s| matches!(
        s.kind,
        InstructionKind::While { .. } | InstructionKind::For { .. } | InstructionKind::DoWhile { .. }
    )));
    assert!(!statements.iter().any(|s| matches!(
        s.kind,
        InstructionKind::Branch(_) | InstructionKind::Label(_)
    )));
}

#[test]
fn linear_rendering_keeps_every_block() {
    let (mut graph, mut locals) = cfg_of(&loop_class(), "spin");
    let statements = reducer::linearize(&mut graph, &mut locals);
    let labels = statements
        .iter()
        .filter(|s| matches!(s.kind, InstructionKind::Label(_)))
        .count();
    // the loop head and the exit are jump targets
    assert!(labels >= 2, "{statements:?}");
    assert!(matches!(
        statements.last().map(|s| &s.kind),
        Some(InstructionKind::Return(None))
    ));
}

#[test]
fn try_with_value_on_the_stack_reduces() {
    let (mut graph, _) = cfg_of(&parse_class(), "parse");
    reducer::reduce(&mut graph, 256).unwrap();
    assert!(reducer::is_reduced(&graph));
    let statements = reducer::into_statements(&mut graph);
    assert_eq!(statements.len(), 1, "{statements:?}");
    let InstructionKind::Try { body, catches, .. } = &statements[0].kind else {
        panic!("expected a try, got {statements:?}");
    };
    assert_eq!(catches.len(), 1);
    assert!(matches!(body.last().map(|s| &s.kind), Some(InstructionKind::Return(Some(_)))));
}

#[test]
fn linear_rendering_binds_stack_slots_to_variables() {
    let (mut graph, mut locals) = cfg_of(&parse_class(), "parse");
    let statements = reducer::linearize(&mut graph, &mut locals);
    assert!(!format!("{statements:?}").contains("StackEntry"), "{statements:?}");
    let stored = statements.iter().find_map(|s| match &s.kind {
        InstructionKind::Store { local, .. } => Some(*local),
        _ => None,
    });
    let returned = statements.iter().find_map(|s| match &s.kind {
        InstructionKind::Return(Some(Expr::Local(local))) => Some(*local),
        _ => None,
    });
    assert!(stored.is_some());
    assert_eq!(stored, returned, "{statements:?}");
}
