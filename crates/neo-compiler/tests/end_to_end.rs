//! End-to-end compilation tests
//!
//! These tests drive the full pipeline from a call graph to script bytes and
//! the NEF container, then decode the output to check its structure.

use std::collections::BTreeSet;

use neo_bytecode::{NefFile, Opcode, ScriptHash, Version, disassemble};
use neo_compiler::ir::{BinaryOp, CompareOp, Expr, Function, Handler, Slot, Stmt, Type};
use neo_compiler::{CompileError, CompiledProgram, CompilerConfig, Program, compile};
use tracing_subscriber::filter::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn compile_single(function: Function) -> Result<CompiledProgram, CompileError> {
    init_tracing();
    let program = Program {
        functions: vec![function],
        ..Default::default()
    };
    compile(&program, CompilerConfig::default())
}

/// Every jump and try offset must land on an instruction start
fn assert_jumps_on_boundaries(script: &[u8]) {
    let decoded = disassemble(script).expect("script decodes");
    let starts: BTreeSet<i64> = decoded.iter().map(|d| d.offset as i64).collect();
    for d in &decoded {
        for target in d.targets() {
            assert!(
                starts.contains(&target),
                "{d} jumps to {target}, which is not an instruction start"
            );
        }
    }
}

#[test]
fn test_identity_function() {
    let f = Function::new("f", 1, 0)
        .returning()
        .with_body(vec![Stmt::Return {
            value: Some(Expr::load(Slot::arg(0))),
        }]);
    let compiled = compile_single(f).unwrap();
    assert_eq!(compiled.script, vec![0x57, 0x00, 0x01, 0x78, 0x40]);
}

#[test]
fn test_identity_from_json() {
    init_tracing();
    let json = r#"{
        "functions": [{
            "name": "f",
            "args": 1,
            "returns_value": true,
            "body": [{"stmt": "return", "value": {"expr": "load", "slot": {"kind": "Argument", "index": 0}}}]
        }]
    }"#;
    let program = Program::from_json(json).unwrap();
    let compiled = compile(&program, CompilerConfig::default()).unwrap();
    assert_eq!(compiled.script, vec![0x57, 0x00, 0x01, 0x78, 0x40]);
}

#[test]
fn test_container_round_trip() {
    let f = Function::new("f", 1, 0)
        .returning()
        .with_body(vec![Stmt::Return {
            value: Some(Expr::load(Slot::arg(0))),
        }]);
    let compiled = compile_single(f).unwrap();
    let config = CompilerConfig::from_toml("compiler_name = \"e2e\"\nversion = \"1.0.2\"").unwrap();

    let nef = compiled.to_nef(&config).unwrap();
    let bytes = nef.to_bytes();
    assert_eq!(bytes.len(), 4 + 32 + 16 + 20 + 4 + 1 + compiled.script.len());
    assert_eq!(&bytes[0..4], b"NEF3");
    assert_eq!(&bytes[52..72], compiled.script_hash.as_bytes());

    let parsed = NefFile::from_bytes(&bytes).unwrap();
    assert_eq!(parsed, nef);
    assert_eq!(parsed.script(), compiled.script.as_slice());
}

#[test]
fn test_three_byte_container() {
    let nef = NefFile::new(vec![0x01, 0x02, 0x03], "abc", Version::new(1, 2, 3, 0)).unwrap();
    let bytes = nef.to_bytes();
    assert_eq!(bytes.len(), 80);
    assert_eq!(&bytes[52..72], ScriptHash::of(&[0x01, 0x02, 0x03]).as_bytes());
}

#[test]
fn test_template_splice_is_position_independent() {
    let upper = || Stmt::Expr {
        expr: Expr::builtin("upper", Type::Str, vec![Expr::load(Slot::arg(0))]),
    };
    let f = Function::new("f", 1, 0).with_body(vec![upper(), upper()]);
    let compiled = compile_single(f).unwrap();
    let script = &compiled.script;

    // INITSLOT, two identical segments, RET
    let segment = (script.len() - 4) / 2;
    let (first, second) = (3..3 + segment, 3 + segment..3 + 2 * segment);
    assert_eq!(script[first.clone()], script[second.clone()]);
    assert_eq!(script[script.len() - 1], 0x40);

    let decoded = disassemble(script).unwrap();
    let targets_in = |range: std::ops::Range<usize>| -> Vec<i64> {
        decoded
            .iter()
            .filter(|d| range.contains(&d.offset))
            .flat_map(|d| d.targets())
            .collect()
    };
    let shifted: Vec<i64> = targets_in(first)
        .into_iter()
        .map(|t| t + segment as i64)
        .collect();
    assert!(!shifted.is_empty());
    assert_eq!(shifted, targets_in(second));
}

#[test]
fn test_long_jump_promotion() {
    // Four 60-byte pushes put more than 127 bytes inside the loop body
    let body = (0u8..4)
        .map(|i| Stmt::Expr {
            expr: Expr::bytes(vec![i; 60]),
        })
        .collect();
    let f = Function::new("spin", 1, 0).with_body(vec![Stmt::While {
        cond: Expr::load(Slot::arg(0)),
        body,
    }]);
    let compiled = compile_single(f).unwrap();
    let ops: Vec<Opcode> = disassemble(&compiled.script)
        .unwrap()
        .iter()
        .map(|d| d.instruction.opcode())
        .collect();

    assert!(ops.contains(&Opcode::JmpIfNotL));
    assert!(ops.contains(&Opcode::JmpL));
    assert!(!ops.contains(&Opcode::JmpIfNot));
    assert_jumps_on_boundaries(&compiled.script);
}

#[test]
fn test_every_jump_lands_on_boundary() {
    init_tracing();
    // total = 0; for x in xs: if x in seen: continue; total = total + x
    let sum = Function::new("sum", 2, 2)
        .returning()
        .with_body(vec![
            Stmt::Assign {
                target: Slot::local(0),
                value: Expr::int(0),
            },
            Stmt::ForEach {
                var: Slot::local(1),
                iterable: Expr::load(Slot::arg(0)),
                ty: Type::List,
                body: vec![
                    Stmt::If {
                        cond: Expr::compare(
                            CompareOp::In,
                            Expr::load(Slot::local(1)),
                            Expr::load(Slot::arg(1)),
                            Type::Map,
                        ),
                        then: vec![Stmt::Continue],
                        otherwise: vec![],
                    },
                    Stmt::Assign {
                        target: Slot::local(0),
                        value: Expr::binary(
                            BinaryOp::Add,
                            Expr::load(Slot::local(0)),
                            Expr::load(Slot::local(1)),
                            Type::Int,
                        ),
                    },
                ],
            },
            Stmt::Return {
                value: Some(Expr::load(Slot::local(0))),
            },
        ]);
    let guarded = Function::new("guarded", 1, 1)
        .returning()
        .with_body(vec![
            Stmt::Try {
                body: vec![Stmt::Assert {
                    test: Expr::load(Slot::arg(0)),
                    message: Some(Expr::str("empty")),
                }],
                handler: Some(Handler {
                    binding: Some(Slot::local(0)),
                    body: vec![Stmt::Expr {
                        expr: Expr::builtin("log", Type::Str, vec![Expr::load(Slot::local(0))]),
                    }],
                }),
                finally: None,
            },
            Stmt::Return {
                value: Some(Expr::builtin(
                    "isdigit",
                    Type::Str,
                    vec![Expr::load(Slot::arg(0))],
                )),
            },
        ]);
    let main = Function::new("main", 0, 0)
        .returning()
        .with_body(vec![Stmt::Return {
            value: Some(Expr::call(
                "sum",
                vec![
                    Expr::builtin("range", Type::Int, vec![Expr::int(10)]),
                    Expr::Map { entries: vec![] },
                ],
            )),
        }]);

    let program = Program {
        functions: vec![main, sum, guarded],
        entry: Some("main".to_string()),
        ..Default::default()
    };
    let compiled = compile(&program, CompilerConfig::default()).unwrap();
    assert_eq!(compiled.entry_offset, 0);
    assert_eq!(compiled.method_offsets.len(), 3);
    assert_jumps_on_boundaries(&compiled.script);

    let calls: Vec<i64> = disassemble(&compiled.script)
        .unwrap()
        .iter()
        .filter(|d| d.instruction.opcode() == Opcode::Call)
        .flat_map(|d| d.targets())
        .collect();
    assert_eq!(calls, vec![compiled.method_offset("sum").unwrap() as i64]);
}

#[test]
fn test_break_outside_loop_is_unsupported() {
    let f = Function::new("f", 0, 0).with_body(vec![Stmt::Break]);
    let err = compile_single(f).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedConstruct { .. }));
    assert_eq!(
        err.to_string(),
        "Unsupported construct in f at instruction 0: break outside a loop"
    );
}
