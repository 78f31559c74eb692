use std::sync::{Arc, Mutex};

use pac_compiler::{HookFlow, ParseErrorKind, ParseStatus, Runtime, Value};
use pac_ir::{
    AtomicType, BinaryOp, BytesLength, Constant, Ctor, Expr, Field, FieldKind, Hook, Repeat,
    StringInterner, SwitchCase, SwitchField, UnaryOp, UnitType,
};
use pretty_assertions::assert_eq;

use crate::common::{bytes, proto, uints};

fn blob(length: BytesLength) -> FieldKind {
    FieldKind::Ctor(Ctor::Blob(length))
}

/// `GET <path>\r\n` or `PUT <len:u8>`, chosen by lookahead.
fn command(i: &StringInterner) -> UnitType {
    let get = SwitchCase {
        values: vec![],
        fields: vec![
            Field::named(i.intern("get"), FieldKind::Ctor(Ctor::Bytes(b"GET ".to_vec()))),
            Field::named(i.intern("path"), blob(BytesLength::Until(b"\r\n".to_vec()))),
        ],
    };
    let put = SwitchCase {
        values: vec![],
        fields: vec![
            Field::named(i.intern("put"), FieldKind::Ctor(Ctor::Bytes(b"PUT ".to_vec()))),
            Field::named(i.intern("len"), FieldKind::AtomicType(AtomicType::UInt8)),
        ],
    };
    UnitType::new(i.intern("Cmd"))
        .field(Field::anonymous(FieldKind::Switch(SwitchField {
            discriminant: None,
            cases: vec![get, put],
            default: None,
        })))
        .exported()
}

#[test]
fn lookahead_picks_the_matching_alternative() {
    let runtime = proto(|i| vec![command(i)], Runtime::builder());
    let parser = runtime.parser("Proto::Cmd").unwrap();

    let put = parser.parse(b"PUT \x05").unwrap();
    assert_eq!(put.get("put"), Some(&bytes(b"PUT ")));
    assert_eq!(put.get("len"), Some(&Value::UInt(5)));
    assert_eq!(put.get("get"), Some(&Value::Null));

    let get = parser.parse(b"GET /index\r\n").unwrap();
    assert_eq!(get.get("path"), Some(&bytes(b"/index")));
    assert_eq!(get.get("len"), Some(&Value::Null));
}

#[test]
fn lookahead_waits_on_a_prefix() {
    let runtime = proto(|i| vec![command(i)], Runtime::builder());
    let mut invocation = runtime.parser("Proto::Cmd").unwrap().invoke().unwrap();
    assert_eq!(invocation.feed(b"G").unwrap(), ParseStatus::NeedMoreInput);
    assert_eq!(invocation.feed(b"ET /a\r").unwrap(), ParseStatus::NeedMoreInput);
    let ParseStatus::Done(record) = invocation.feed(b"\n").unwrap() else {
        panic!("expected the command to be complete");
    };
    assert_eq!(record.get("path"), Some(&bytes(b"/a")));
}

#[test]
fn no_alternative_is_an_unmatched_alternative() {
    let runtime = proto(|i| vec![command(i)], Runtime::builder());
    let err = runtime
        .parser("Proto::Cmd")
        .unwrap()
        .parse(b"DEL x")
        .unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnmatchedAlternative);
    assert_eq!(err.offset, 0);
}

#[test]
fn switch_on_a_field_value() {
    let runtime = proto(
        |i| {
            let kind = i.intern("kind");
            let case = |value: u64, name: &str, ty: AtomicType| SwitchCase {
                values: vec![Constant::UInt(value)],
                fields: vec![Field::named(i.intern(name), FieldKind::AtomicType(ty))],
            };
            vec![UnitType::new(i.intern("Msg"))
                .field(Field::named(kind, FieldKind::AtomicType(AtomicType::UInt8)))
                .field(Field::anonymous(FieldKind::Switch(SwitchField {
                    discriminant: Some(Expr::field(kind)),
                    cases: vec![
                        case(1, "wide", AtomicType::UInt16),
                        case(2, "narrow", AtomicType::UInt8),
                    ],
                    default: None,
                })))
                .exported()]
        },
        Runtime::builder(),
    );
    let parser = runtime.parser("Proto::Msg").unwrap();

    let record = parser.parse(&[2, 9]).unwrap();
    assert_eq!(record.get("narrow"), Some(&Value::UInt(9)));
    assert_eq!(record.get("wide"), Some(&Value::Null));
    assert_eq!(
        parser.parse(&[1, 1, 0]).unwrap().get("wide"),
        Some(&Value::UInt(256))
    );

    let err = parser.parse(&[3, 0]).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnmatchedAlternative);
}

#[test]
fn lookahead_loop_stops_at_the_first_foreign_token() {
    let runtime = proto(
        |i| {
            vec![UnitType::new(i.intern("List"))
                .field(
                    Field::named(i.intern("items"), FieldKind::Ctor(Ctor::Bytes(b"x".to_vec())))
                        .repeat(Repeat::Lookahead),
                )
                .field(Field::named(
                    i.intern("end"),
                    FieldKind::Ctor(Ctor::Bytes(b";".to_vec())),
                ))
                .exported()]
        },
        Runtime::builder(),
    );
    let record = runtime.parser("Proto::List").unwrap().parse(b"xxx;").unwrap();
    assert_eq!(
        record.get("items"),
        Some(&Value::List(vec![bytes(b"x"), bytes(b"x"), bytes(b"x")]))
    );
    assert_eq!(record.get("end"), Some(&bytes(b";")));
}

#[test]
fn regular_expression_fields_take_the_longest_match() {
    let runtime = proto(
        |i| {
            vec![UnitType::new(i.intern("Req"))
                .field(Field::named(
                    i.intern("method"),
                    FieldKind::Ctor(Ctor::RegExp("[A-Z]+".into())),
                ))
                .field(Field::anonymous(FieldKind::Ctor(Ctor::Bytes(b" ".to_vec()))))
                .field(Field::named(i.intern("target"), blob(BytesLength::Eod)))
                .exported()]
        },
        Runtime::builder(),
    );
    let parser = runtime.parser("Proto::Req").unwrap();

    let mut invocation = parser.invoke().unwrap();
    assert_eq!(invocation.feed(b"PO").unwrap(), ParseStatus::NeedMoreInput);
    assert_eq!(invocation.feed(b"ST /x").unwrap(), ParseStatus::NeedMoreInput);
    let record = invocation.finish().unwrap();
    assert_eq!(record.get("method"), Some(&bytes(b"POST")));
    assert_eq!(record.get("target"), Some(&bytes(b"/x")));

    let err = parser.parse(b"123 /").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::ConstantMismatch);
    assert_eq!(err.path, "Req::method");
}

#[test]
fn typed_constants_are_checked() {
    let runtime = proto(
        |i| {
            vec![UnitType::new(i.intern("Tag"))
                .field(Field::named(
                    i.intern("tag"),
                    FieldKind::Constant {
                        value: Constant::UInt(0x0102),
                        ty: Some(AtomicType::UInt16),
                    },
                ))
                .exported()]
        },
        Runtime::builder(),
    );
    let parser = runtime.parser("Proto::Tag").unwrap();
    assert_eq!(parser.parse(&[1, 2]).unwrap().get("tag"), Some(&Value::UInt(0x0102)));
    assert_eq!(
        parser.parse(&[1, 3]).unwrap_err().kind,
        ParseErrorKind::ConstantMismatch
    );
}

#[test]
fn recursive_units_nest_records() {
    let runtime = proto(
        |i| {
            let node = i.intern("Node");
            let more = i.intern("more");
            vec![UnitType::new(node)
                .field(Field::named(more, FieldKind::AtomicType(AtomicType::Bool)))
                .field(Field::named(i.intern("value"), FieldKind::AtomicType(AtomicType::UInt8)))
                .field(
                    Field::named(
                        i.intern("next"),
                        FieldKind::Unit {
                            unit: node,
                            args: vec![],
                        },
                    )
                    .condition(Expr::field(more)),
                )
                .exported()]
        },
        Runtime::builder(),
    );
    let input = [1, 10, 1, 20, 0, 30];
    let parser = runtime.parser("Proto::Node").unwrap();
    let first = parser.parse(&input).unwrap();

    let mut values = Vec::new();
    let mut node = Some(&first);
    while let Some(record) = node {
        values.push(record.get("value").cloned().unwrap());
        node = record.get("next").and_then(Value::as_record);
    }
    assert_eq!(Value::List(values), uints(&[10, 20, 30]));

    for split in 0..=input.len() {
        let mut invocation = parser.invoke().unwrap();
        invocation.feed(&input[..split]).unwrap();
        invocation.feed(&input[split..]).unwrap();
        assert_eq!(invocation.finish().unwrap(), first, "split at {split}");
    }
}

#[test]
fn child_units_receive_arguments() {
    let runtime = proto(
        |i| {
            let n = i.intern("n");
            let len = i.intern("len");
            let child = UnitType::new(i.intern("Child"))
                .param(len, None)
                .field(Field::named(i.intern("data"), blob(BytesLength::Length(Expr::param(len)))));
            let parent = UnitType::new(i.intern("Parent"))
                .field(Field::named(n, FieldKind::AtomicType(AtomicType::UInt8)))
                .field(Field::named(
                    i.intern("child"),
                    FieldKind::Unit {
                        unit: i.intern("Child"),
                        args: vec![Expr::field(n)],
                    },
                ))
                .exported();
            vec![child, parent]
        },
        Runtime::builder(),
    );
    let record = runtime.parser("Proto::Parent").unwrap().parse(b"\x02ab").unwrap();
    let child = record.get("child").and_then(Value::as_record).unwrap();
    assert_eq!(child.unit(), "Child");
    assert_eq!(child.get("data"), Some(&bytes(b"ab")));
}

#[test]
fn variables_start_at_their_defaults_and_conditions_skip_fields() {
    let runtime = proto(
        |i| {
            vec![UnitType::new(i.intern("Opt"))
                .variable(i.intern("version"), Some(Expr::uint(7)))
                .field(
                    Field::named(i.intern("extra"), FieldKind::AtomicType(AtomicType::UInt8))
                        .condition(Expr::bool(false)),
                )
                .exported()]
        },
        Runtime::builder(),
    );
    let record = runtime.parser("Proto::Opt").unwrap().parse(b"").unwrap();
    assert_eq!(record.get("version"), Some(&Value::UInt(7)));
    assert_eq!(record.get("extra"), Some(&Value::Null));
}

#[test]
fn catalog_lists_exported_units_only() {
    let runtime = proto(
        |i| {
            vec![
                UnitType::new(i.intern("Hidden")),
                crate::common::header(i).property(pac_ir::Property::MimeType(
                    "application/x-header".into(),
                )),
            ]
        },
        Runtime::builder(),
    );
    let names: Vec<&str> = runtime.parsers().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Proto::Header"]);
    assert_eq!(
        runtime.parser("Proto::Header").unwrap().definition().mime_types,
        vec!["application/x-header".to_owned()]
    );
    assert_eq!(
        runtime.parser("Proto::Hidden").unwrap_err(),
        pac_compiler::LinkError::UnknownParser {
            name: "Proto::Hidden".into()
        }
    );
}

/// A decimal size line, that many bytes, then two weights scaled by ten.
fn chunk(i: &StringInterner) -> UnitType {
    let size = i.intern("size");
    UnitType::new(i.intern("Chunk"))
        .field(
            Field::named(size, blob(BytesLength::Until(b"\r\n".to_vec())))
                .convert(Expr::unary(UnaryOp::ToUInt, Expr::parsed()))
                .hook(Hook::new(i.intern("on_size"))),
        )
        .field(Field::named(
            i.intern("data"),
            blob(BytesLength::Length(Expr::field(size))),
        ))
        .field(
            Field::named(i.intern("weights"), FieldKind::AtomicType(AtomicType::UInt8))
                .repeat(Repeat::Count(Expr::uint(2)))
                .convert(Expr::binary(BinaryOp::Mul, Expr::parsed(), Expr::uint(10))),
        )
        .exported()
}

#[test]
fn convert_replaces_the_value_before_commit() {
    let sizes: Arc<Mutex<Vec<Value>>> = Arc::default();
    let seen = sizes.clone();
    let runtime = proto(
        |i| vec![chunk(i)],
        Runtime::builder().hook("on_size", move |ctx| {
            seen.lock().unwrap().push(ctx.value().cloned().unwrap());
            HookFlow::Continue
        }),
    );
    let input = b"3\r\nabc\x01\x02";
    let mut invocation = runtime.parser("Proto::Chunk").unwrap().invoke().unwrap();
    let (last, head) = input.split_last().unwrap();
    for b in head {
        assert_eq!(invocation.feed(&[*b]).unwrap(), ParseStatus::NeedMoreInput);
    }
    let ParseStatus::Done(record) = invocation.feed(&[*last]).unwrap() else {
        panic!("parse did not complete");
    };
    assert_eq!(record.get("size"), Some(&Value::UInt(3)));
    assert_eq!(record.get("data"), Some(&bytes(b"abc")));
    assert_eq!(record.get("weights"), Some(&uints(&[10, 20])));
    assert_eq!(*sizes.lock().unwrap(), vec![Value::UInt(3)]);
}

#[test]
fn failed_convert_fails_the_parse() {
    let runtime = proto(
        |i| vec![chunk(i)],
        Runtime::builder().hook("on_size", |_| HookFlow::Continue),
    );
    let err = runtime
        .parser("Proto::Chunk")
        .unwrap()
        .parse(b"3x\r\nabc\x01\x02")
        .unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::InvalidProgram);
    assert!(err.message.contains("not a decimal number"), "{err}");
}
