use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use pac_compiler::{HookFlow, ParseErrorKind, Parser, Runtime, Value};
use pac_ir::{
    AtomicType, BytesLength, Ctor, Expr, Field, FieldKind, Hook, HookItem, StringInterner,
    UnitType,
};
use pretty_assertions::assert_eq;

use crate::common::{bytes, proto};

fn inner(i: &StringInterner) -> UnitType {
    UnitType::new(i.intern("Inner"))
        .field(Field::named(i.intern("a"), FieldKind::AtomicType(AtomicType::UInt16)))
        .field(Field::named(i.intern("b"), FieldKind::AtomicType(AtomicType::UInt8)))
        .exported()
}

/// A length byte, then that many bytes forwarded into an `Inner` sink.
fn outer(i: &StringInterner) -> UnitType {
    let len = i.intern("len");
    let body = i.intern("body");
    UnitType::new(i.intern("Outer"))
        .sink(body, i.intern("Inner"))
        .field(Field::named(len, FieldKind::AtomicType(AtomicType::UInt8)))
        .field(
            Field::named(
                i.intern("data"),
                FieldKind::Ctor(Ctor::Blob(BytesLength::Length(Expr::field(len)))),
            )
            .sink(body),
        )
        .exported()
}

#[test]
fn sink_field_feeds_the_attached_parser() {
    let runtime = proto(|i| vec![inner(i), outer(i)], Runtime::builder());
    let record = runtime
        .parser("Proto::Outer")
        .unwrap()
        .parse(&[3, 0, 1, 2])
        .unwrap();
    assert_eq!(record.get("data"), Some(&bytes(&[0, 1, 2])));
    let body = record.get("body").and_then(Value::as_record).unwrap();
    assert_eq!(body.unit(), "Inner");
    assert_eq!(body.get("a"), Some(&Value::UInt(1)));
    assert_eq!(body.get("b"), Some(&Value::UInt(2)));
}

#[test]
fn short_sink_input_fails_the_outer_parse() {
    let runtime = proto(|i| vec![inner(i), outer(i)], Runtime::builder());
    let err = runtime
        .parser("Proto::Outer")
        .unwrap()
        .parse(&[1, 0])
        .unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedEndOfInput);
    assert_eq!(err.path, "Inner::a");
}

#[test]
fn sink_accepts_writes_in_pieces() {
    let runtime = proto(|i| vec![inner(i)], Runtime::builder());
    let mut sink = runtime.parser("Proto::Inner").unwrap().sink();
    sink.write(&[0]).unwrap();
    sink.write(&[1]).unwrap();
    sink.write(&[2]).unwrap();
    let record = sink.close().unwrap();
    assert_eq!(record.get("a"), Some(&Value::UInt(1)));
    assert_eq!(record.get("b"), Some(&Value::UInt(2)));
}

#[test]
fn sink_reading_to_end_of_data_completes_on_close() {
    let runtime = proto(
        |i| {
            vec![UnitType::new(i.intern("Rest"))
                .field(Field::named(
                    i.intern("all"),
                    FieldKind::Ctor(Ctor::Blob(BytesLength::Eod)),
                ))
                .exported()]
        },
        Runtime::builder(),
    );
    let mut sink = runtime.parser("Proto::Rest").unwrap().sink();
    sink.write(b"ab").unwrap();
    sink.write(b"cd").unwrap();
    assert_eq!(sink.close().unwrap().get("all"), Some(&bytes(b"abcd")));
}

#[test]
fn parsing_the_sink_stream_from_a_hook_is_rejected() {
    let parser: Arc<OnceLock<Parser>> = Arc::default();
    let inner_result: Arc<Mutex<Vec<String>>> = Arc::default();
    let fired = Arc::new(AtomicBool::new(false));
    let (hook_parser, hook_result) = (parser.clone(), inner_result.clone());
    let runtime = proto(
        |i| {
            vec![
                inner(i).hook(HookItem::Field(i.intern("a")), Hook::new(i.intern("reenter"))),
                outer(i),
            ]
        },
        Runtime::builder().hook("reenter", move |ctx| {
            if !fired.swap(true, Ordering::SeqCst) {
                let result = hook_parser.get().unwrap().parse_stream(ctx.stream());
                hook_result
                    .lock()
                    .unwrap()
                    .push(format!("{:?}", result.map(|_| ()).map_err(|e| (e.kind, e.path))));
            }
            HookFlow::Continue
        }),
    );
    parser
        .set(runtime.parser("Proto::Inner").unwrap())
        .unwrap();

    let err = runtime
        .parser("Proto::Outer")
        .unwrap()
        .parse(&[3, 0, 7, 8])
        .unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::ReentrantHookParse);
    assert_eq!(err.path, "Proto::Inner::a");
    assert_eq!(
        *inner_result.lock().unwrap(),
        vec![r#"Err((ReentrantHookParse, "Proto::Inner"))"#.to_owned()]
    );
}
