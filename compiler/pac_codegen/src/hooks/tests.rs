use pac_ir::{AtomicType, Field, FieldKind, UnitType};
use pretty_assertions::assert_eq;

use super::*;

struct Fixture {
    interner: StringInterner,
    module: Module,
}

fn fixture() -> Fixture {
    let interner = StringInterner::new();
    let header = interner.intern("Header");
    let length = interner.intern("length");
    let unit = UnitType::new(header)
        .field(
            Field::named(length, FieldKind::AtomicType(AtomicType::UInt16))
                .hook(Hook::new(interner.intern("inline"))),
        )
        .hook(HookItem::Done, Hook::new(interner.intern("done")));
    let module = Module::new(interner.intern("Proto")).unit(unit);
    Fixture { interner, module }
}

#[test]
fn collects_inline_and_unit_hooks() {
    let f = fixture();
    let mut problems = Vec::new();
    let registry = HookRegistry::for_module(&f.module, &f.interner, &mut problems);
    assert!(problems.is_empty());

    let header = f.interner.intern("Header");
    let length = f.interner.intern("length");
    let on_length = registry.hooks_for(HookKey::field(header, length), false);
    assert_eq!(on_length, vec![Hook::new(f.interner.intern("inline"))]);
    let on_done = registry.hooks_for(HookKey::new(header, HookItem::Done), false);
    assert_eq!(on_done.len(), 1);
}

#[test]
fn hooks_ordered_by_priority_stable_on_ties() {
    let f = fixture();
    let mut registry = HookRegistry::new(&f.module, &f.interner);
    let key = HookKey::field(f.interner.intern("Header"), f.interner.intern("length"));
    let a = Hook::new(f.interner.intern("a"));
    let b = Hook::new(f.interner.intern("b")).priority(10);
    let c = Hook::new(f.interner.intern("c"));
    for h in [a, b, c] {
        assert_eq!(registry.define(key, h), HookScope::Local);
    }
    assert_eq!(registry.hooks_for(key, false), vec![b, a, c]);
}

#[test]
fn foreach_hooks_are_separate() {
    let f = fixture();
    let mut registry = HookRegistry::new(&f.module, &f.interner);
    let key = HookKey::field(f.interner.intern("Header"), f.interner.intern("length"));
    let each = Hook::new(f.interner.intern("each")).foreach();
    registry.define(key, each);
    assert!(registry.hooks_for(key, false).is_empty());
    assert_eq!(registry.hooks_for(key, true), vec![each]);
}

#[test]
fn define_path_resolves_scope() {
    let f = fixture();
    let mut registry = HookRegistry::new(&f.module, &f.interner);
    let hook = Hook::new(f.interner.intern("h"));

    assert_eq!(
        registry.define_path("Header::length", hook),
        Ok(HookScope::Local)
    );
    assert_eq!(
        registry.define_path("Proto::Header::%init", hook),
        Ok(HookScope::Local)
    );
    assert_eq!(
        registry.define_path("Other::Message::body", hook),
        Ok(HookScope::External)
    );
    assert_eq!(
        registry.external(),
        &[ExternalHook {
            target: "Other::Message::body".into(),
            symbol: "h".into(),
            priority: 0,
            foreach: false,
        }]
    );
}

#[test]
fn define_path_rejects_bad_paths() {
    let f = fixture();
    let mut registry = HookRegistry::new(&f.module, &f.interner);
    let hook = Hook::new(f.interner.intern("h"));

    for path in ["length", "A::B::C::D", "Header::", "Header::%bogus"] {
        assert_eq!(
            registry.define_path(path, hook),
            Err(CodegenError::InvalidHookPath { path: path.into() }),
            "{path}"
        );
    }
    assert_eq!(
        registry.define_path("Missing::x", hook),
        Err(CodegenError::UnknownUnit {
            unit: "Missing".into()
        })
    );
    assert_eq!(
        registry.define_path("Header::nope", hook),
        Err(CodegenError::UnknownField {
            unit: "Header".into(),
            field: "nope".into()
        })
    );
}

#[test]
fn unit_hook_on_unknown_field_is_reported() {
    let interner = StringInterner::new();
    let unit = UnitType::new(interner.intern("U")).hook(
        HookItem::Field(interner.intern("ghost")),
        Hook::new(interner.intern("h")),
    );
    let module = Module::new(interner.intern("M")).unit(unit);
    let mut problems = Vec::new();
    let _ = HookRegistry::for_module(&module, &interner, &mut problems);
    assert_eq!(
        problems,
        vec![CodegenError::UnknownField {
            unit: "U".into(),
            field: "ghost".into()
        }]
    );
}
