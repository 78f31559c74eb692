//! Shared fixtures.

use pac_compiler::{compile, CompileConfig, Runtime, RuntimeBuilder, Value};
use pac_ir::{AtomicType, Ctor, Expr, Field, FieldKind, Module, Repeat, StringInterner, UnitType};

/// `CA FE`, a 16-bit length, then that many bytes.
pub const HEADER: &[u8] = &[0xCA, 0xFE, 0x00, 0x03, 0x01, 0x02, 0x03];

pub fn header(interner: &StringInterner) -> UnitType {
    let length = interner.intern("length");
    UnitType::new(interner.intern("Header"))
        .field(Field::named(
            interner.intern("magic"),
            FieldKind::Ctor(Ctor::Bytes(vec![0xCA, 0xFE])),
        ))
        .field(Field::named(length, FieldKind::AtomicType(AtomicType::UInt16)))
        .field(
            Field::named(
                interner.intern("payload"),
                FieldKind::AtomicType(AtomicType::UInt8),
            )
            .repeat(Repeat::Count(Expr::field(length))),
        )
        .exported()
}

/// Compile `module`, asserting it compiles cleanly, and link it.
pub fn build(module: &Module, interner: &StringInterner, builder: RuntimeBuilder) -> Runtime {
    let output = compile(module, interner, &CompileConfig::default());
    assert_eq!(output.problems, vec![]);
    output.link(builder).unwrap()
}

/// A runtime holding the `Proto` module with `units`.
pub fn proto(units: impl FnOnce(&StringInterner) -> Vec<UnitType>, builder: RuntimeBuilder) -> Runtime {
    let interner = StringInterner::new();
    let mut module = Module::new(interner.intern("Proto"));
    for unit in units(&interner) {
        module = module.unit(unit);
    }
    build(&module, &interner, builder)
}

pub fn header_runtime(builder: RuntimeBuilder) -> Runtime {
    proto(|i| vec![header(i)], builder)
}

pub fn uints(values: &[u64]) -> Value {
    Value::List(values.iter().copied().map(Value::UInt).collect())
}

pub fn bytes(data: &[u8]) -> Value {
    Value::Bytes(data.to_vec())
}
