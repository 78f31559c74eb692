use pac_compiler::{
    compile, CodegenOptions, CompileConfig, ParseErrorKind, ParseStatus, Record, Runtime, Stream,
    Value,
};
use pac_rt::Outcome;
use pac_ir::{
    AtomicType, ByteOrder, BytesLength, Constant, Ctor, Expr, Field, FieldKind, Module, Repeat,
    StringInterner, UnitType,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::common::{bytes, header, header_runtime, proto, uints, HEADER};

fn parse_chunked(runtime: &Runtime, chunks: &[&[u8]]) -> Record {
    let mut invocation = runtime.parser("Proto::Header").unwrap().invoke().unwrap();
    for chunk in chunks {
        invocation.feed(chunk).unwrap();
    }
    invocation.finish().unwrap()
}

#[test]
fn header_in_one_piece() {
    let runtime = header_runtime(Runtime::builder());
    let record = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
    assert_eq!(record.unit(), "Header");
    assert_eq!(record.get("magic"), Some(&bytes(&[0xCA, 0xFE])));
    assert_eq!(record.get("length"), Some(&Value::UInt(3)));
    assert_eq!(record.get("payload"), Some(&uints(&[1, 2, 3])));
}

#[test]
fn header_split_after_length_suspends_then_completes() {
    let runtime = header_runtime(Runtime::builder());
    let whole = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();

    let mut invocation = runtime.parser("Proto::Header").unwrap().invoke().unwrap();
    assert_eq!(invocation.feed(&HEADER[..4]).unwrap(), ParseStatus::NeedMoreInput);
    assert_eq!(
        invocation.feed(&HEADER[4..]).unwrap(),
        ParseStatus::Done(whole.clone())
    );
    assert_eq!(invocation.finish().unwrap(), whole);
}

#[test]
fn suspension_does_not_need_end_of_data_to_complete() {
    let runtime = header_runtime(Runtime::builder());
    let mut invocation = runtime.parser("Proto::Header").unwrap().invoke().unwrap();
    for &byte in &HEADER[..HEADER.len() - 1] {
        assert_eq!(invocation.feed(&[byte]).unwrap(), ParseStatus::NeedMoreInput);
    }
    assert!(matches!(
        invocation.feed(&HEADER[HEADER.len() - 1..]).unwrap(),
        ParseStatus::Done(_)
    ));
}

#[test]
fn wrong_magic_is_a_constant_mismatch_at_offset_zero() {
    let runtime = header_runtime(Runtime::builder());
    let err = runtime
        .parser("Proto::Header")
        .unwrap()
        .parse(&[0xCA, 0xFF, 0x00, 0x01, 0x05])
        .unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::ConstantMismatch);
    assert_eq!(err.offset, 0);
    assert_eq!(err.path, "Header::magic");
}

#[test]
fn truncated_input_fails_only_once_frozen() {
    let runtime = header_runtime(Runtime::builder());
    let mut invocation = runtime.parser("Proto::Header").unwrap().invoke().unwrap();
    assert_eq!(invocation.feed(&HEADER[..5]).unwrap(), ParseStatus::NeedMoreInput);
    let err = invocation.finish().unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedEndOfInput);
    assert_eq!(err.offset, 5);
}

#[test]
fn failed_invocation_repeats_its_error() {
    let runtime = header_runtime(Runtime::builder());
    let mut invocation = runtime.parser("Proto::Header").unwrap().invoke().unwrap();
    let first = invocation.feed(&[0x00, 0x00]).unwrap_err();
    let again = invocation.feed(&[0x01]).unwrap_err();
    assert_eq!(first, again);
}

#[test]
fn executor_resumes_a_suspended_parse() {
    let runtime = header_runtime(Runtime::builder());
    let parser = runtime.parser("Proto::Header").unwrap();
    let executor = runtime.executor();
    let stream = Stream::new();
    stream.append(&HEADER[..3]);

    let Outcome::NeedMoreInput(resumption) = executor.start(parser.entry(), vec![], &stream).unwrap()
    else {
        panic!("expected a suspension");
    };
    assert_eq!(resumption.offset(), 2);

    stream.append(&HEADER[3..]);
    let Outcome::Done { value, offset } = executor.resume(resumption, &stream).unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(offset, HEADER.len());
    assert_eq!(value.as_record().unwrap().get("payload"), Some(&uints(&[1, 2, 3])));
}

#[test]
fn invocations_are_send() {
    fn assert_send<T: Send>() {}
    assert_send::<pac_compiler::Invocation>();
    assert_send::<pac_compiler::Runtime>();
}

#[test]
fn parameters_take_defaults_and_arguments() {
    let runtime = proto(
        |i| {
            let n = i.intern("n");
            vec![UnitType::new(i.intern("Sized"))
                .param(n, Some(Constant::UInt(2)))
                .field(Field::named(
                    i.intern("data"),
                    FieldKind::Ctor(Ctor::Blob(BytesLength::Length(Expr::param(n)))),
                ))
                .exported()]
        },
        Runtime::builder(),
    );
    let parser = runtime.parser("Proto::Sized").unwrap();
    assert_eq!(parser.parse(b"abc").unwrap().get("data"), Some(&bytes(b"ab")));
    assert_eq!(
        parser
            .parse_with(b"abc", vec![Value::UInt(3)])
            .unwrap()
            .get("data"),
        Some(&bytes(b"abc"))
    );
    let err = parser
        .parse_with(b"abc", vec![Value::UInt(1), Value::UInt(2)])
        .unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::InvalidArguments);
}

#[test]
fn field_byte_order_overrides_the_default() {
    let interner = StringInterner::new();
    let unit = UnitType::new(interner.intern("Pair"))
        .field(Field::named(
            interner.intern("a"),
            FieldKind::AtomicType(AtomicType::UInt16),
        ))
        .field(
            Field::named(interner.intern("b"), FieldKind::AtomicType(AtomicType::UInt16))
                .byte_order(ByteOrder::Big),
        )
        .exported();
    let module = Module::new(interner.intern("Proto")).unit(unit);
    let config = CompileConfig {
        options: CodegenOptions::default().byte_order(ByteOrder::Little),
        ..CompileConfig::default()
    };
    let runtime = compile(&module, &interner, &config)
        .link(Runtime::builder())
        .unwrap();
    let record = runtime
        .parser("Proto::Pair")
        .unwrap()
        .parse(&[0x01, 0x00, 0x00, 0x01])
        .unwrap();
    assert_eq!(record.get("a"), Some(&Value::UInt(1)));
    assert_eq!(record.get("b"), Some(&Value::UInt(1)));
}

#[test]
fn repeat_until_end_of_data_waits_for_freeze() {
    let runtime = proto(
        |i| {
            vec![UnitType::new(i.intern("Words"))
                .field(
                    Field::named(i.intern("words"), FieldKind::AtomicType(AtomicType::UInt16))
                        .repeat(Repeat::UntilEod),
                )
                .exported()]
        },
        Runtime::builder(),
    );
    let mut invocation = runtime.parser("Proto::Words").unwrap().invoke().unwrap();
    assert_eq!(invocation.feed(&[0, 1, 0]).unwrap(), ParseStatus::NeedMoreInput);
    assert_eq!(invocation.feed(&[2]).unwrap(), ParseStatus::NeedMoreInput);
    let record = invocation.finish().unwrap();
    assert_eq!(record.get("words"), Some(&uints(&[1, 2])));
}

proptest! {
    #[test]
    fn any_split_point_gives_the_same_record(split in 0..=HEADER.len()) {
        let runtime = header_runtime(Runtime::builder());
        let whole = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
        let (a, b) = HEADER.split_at(split);
        prop_assert_eq!(parse_chunked(&runtime, &[a, b]), whole);
    }

    #[test]
    fn any_chunking_gives_the_same_record(sizes in prop::collection::vec(1usize..4, 1..8)) {
        let runtime = header_runtime(Runtime::builder());
        let whole = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
        let mut chunks = Vec::new();
        let mut rest = HEADER;
        for size in sizes {
            let (chunk, tail) = rest.split_at(size.min(rest.len()));
            chunks.push(chunk);
            rest = tail;
        }
        chunks.push(rest);
        prop_assert_eq!(parse_chunked(&runtime, &chunks), whole);
    }
}

#[test]
fn header_module_compiles_without_problems() {
    let interner = StringInterner::new();
    let module = Module::new(interner.intern("Proto")).unit(header(&interner));
    let output = compile(&module, &interner, &CompileConfig::default());
    assert!(output.success());
}
