use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use pac_compiler::{
    compile, CompileConfig, CompileError, HookFlow, LinkError, ParseErrorKind, Parser, Runtime,
    Value,
};
use pac_ir::{Hook, HookItem, Module, StringInterner};
use pretty_assertions::assert_eq;

use crate::common::{header, proto, uints, HEADER};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::default()
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn field_hooks_run_by_priority_and_see_the_value() {
    let seen = log();
    let (high, low) = (seen.clone(), seen.clone());
    let runtime = proto(
        |i| {
            let length = HookItem::Field(i.intern("length"));
            vec![header(i)
                .hook(length, Hook::new(i.intern("low")).priority(-1))
                .hook(length, Hook::new(i.intern("high")).priority(5))]
        },
        Runtime::builder()
            .hook("high", move |ctx| {
                high.lock()
                    .unwrap()
                    .push(format!("high {}", ctx.value().unwrap()));
                HookFlow::Continue
            })
            .hook("low", move |ctx| {
                low.lock()
                    .unwrap()
                    .push(format!("low {}", ctx.get("length").unwrap()));
                HookFlow::Continue
            }),
    );
    runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
    assert_eq!(entries(&seen), vec!["high 3".to_owned(), "low 3".to_owned()]);
}

#[test]
fn foreach_hook_sees_each_element_and_can_stop() {
    let seen = log();
    let elements = seen.clone();
    let runtime = proto(
        |i| {
            vec![header(i).hook(
                HookItem::Field(i.intern("payload")),
                Hook::new(i.intern("each")).foreach(),
            )]
        },
        Runtime::builder().hook("each", move |ctx| {
            let value = ctx.value().cloned().unwrap();
            elements.lock().unwrap().push(value.to_string());
            if value == Value::UInt(2) {
                HookFlow::Stop
            } else {
                HookFlow::Continue
            }
        }),
    );
    let record = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
    assert_eq!(entries(&seen), vec!["1".to_owned(), "2".to_owned()]);
    assert_eq!(record.get("payload"), Some(&uints(&[1, 2])));
}

#[test]
fn stop_skips_lower_priority_foreach_hooks() {
    let seen = log();
    let (first, second) = (seen.clone(), seen.clone());
    let runtime = proto(
        |i| {
            let payload = HookItem::Field(i.intern("payload"));
            vec![header(i)
                .hook(payload, Hook::new(i.intern("first")).foreach().priority(1))
                .hook(payload, Hook::new(i.intern("second")).foreach())]
        },
        Runtime::builder()
            .hook("first", move |ctx| {
                first
                    .lock()
                    .unwrap()
                    .push(format!("first {}", ctx.value().unwrap()));
                HookFlow::Stop
            })
            .hook("second", move |ctx| {
                second
                    .lock()
                    .unwrap()
                    .push(format!("second {}", ctx.value().unwrap()));
                HookFlow::Continue
            }),
    );
    let record = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
    assert_eq!(entries(&seen), vec!["first 1".to_owned()]);
    assert_eq!(record.get("payload"), Some(&uints(&[1])));
}

#[test]
fn unit_hooks_bracket_the_parse() {
    let seen = log();
    let (init, field, done) = (seen.clone(), seen.clone(), seen.clone());
    let runtime = proto(
        |i| {
            vec![header(i)
                .variable(i.intern("total"), None)
                .hook(HookItem::Init, Hook::new(i.intern("on_init")))
                .hook(HookItem::Done, Hook::new(i.intern("on_done")))
                .hook(HookItem::Field(i.intern("payload")), Hook::new(i.intern("on_payload")))]
        },
        Runtime::builder()
            .hook("on_init", move |_| {
                init.lock().unwrap().push("init".into());
                HookFlow::Continue
            })
            .hook("on_payload", move |_| {
                field.lock().unwrap().push("payload".into());
                HookFlow::Continue
            })
            .hook("on_done", move |ctx| {
                done.lock().unwrap().push("done".into());
                let sum: u64 = ctx
                    .get("payload")
                    .and_then(Value::as_list)
                    .unwrap()
                    .iter()
                    .filter_map(|v| match v {
                        Value::UInt(n) => Some(*n),
                        _ => None,
                    })
                    .sum();
                assert!(ctx.set("total", Value::UInt(sum)));
                HookFlow::Continue
            }),
    );
    let record = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
    assert_eq!(entries(&seen), vec!["init", "payload", "done"]);
    assert_eq!(record.get("total"), Some(&Value::UInt(6)));
}

#[test]
fn error_hooks_run_when_the_parse_fails() {
    let seen = log();
    let on_error = seen.clone();
    let runtime = proto(
        |i| vec![header(i).hook(HookItem::Error, Hook::new(i.intern("on_error")))],
        Runtime::builder().hook("on_error", move |ctx| {
            on_error
                .lock()
                .unwrap()
                .push(format!("error at {}", ctx.offset()));
            HookFlow::Continue
        }),
    );
    let parser = runtime.parser("Proto::Header").unwrap();
    let err = parser.parse(&[0xCA, 0xFF]).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::ConstantMismatch);
    assert_eq!(entries(&seen), vec!["error at 2"]);

    parser.parse(HEADER).unwrap();
    assert_eq!(entries(&seen).len(), 1);
}

#[test]
fn local_hook_without_body_fails_to_link() {
    let interner = StringInterner::new();
    let module = Module::new(interner.intern("Proto")).unit(
        header(&interner).hook(
            HookItem::Field(interner.intern("length")),
            Hook::new(interner.intern("absent")),
        ),
    );
    let err = compile(&module, &interner, &CompileConfig::default())
        .link(Runtime::builder())
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Link(LinkError::MissingHookBody {
            symbol: "absent".into(),
            site: "Proto::Header::length".into(),
        })
    );
}

#[test]
fn external_hooks_join_local_hooks_by_priority() {
    let interner = StringInterner::new();
    let proto = Module::new(interner.intern("Proto")).unit(header(&interner).hook(
        HookItem::Field(interner.intern("length")),
        Hook::new(interner.intern("local")),
    ));
    let analyzer = Module::new(interner.intern("Analyzer")).hook(
        "Proto::Header::length",
        Hook::new(interner.intern("remote")).priority(10),
    );

    let seen = log();
    let (local, remote) = (seen.clone(), seen.clone());
    let config = CompileConfig::default();
    let analyzer = compile(&analyzer, &interner, &config).into_module().unwrap();
    assert_eq!(analyzer.external_hooks.len(), 1);
    let runtime = compile(&proto, &interner, &config)
        .link(
            Runtime::builder()
                .module(analyzer)
                .hook("local", move |_| {
                    local.lock().unwrap().push("local".into());
                    HookFlow::Continue
                })
                .hook("remote", move |_| {
                    remote.lock().unwrap().push("remote".into());
                    HookFlow::Continue
                }),
        )
        .unwrap();
    runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
    assert_eq!(entries(&seen), vec!["remote", "local"]);
}

#[test]
fn parsing_the_hooked_stream_from_a_hook_is_rejected() {
    let parser: Arc<OnceLock<Parser>> = Arc::default();
    let inner_result = log();
    let (hook_parser, hook_result) = (parser.clone(), inner_result.clone());
    let runtime = proto(
        |i| {
            vec![header(i).hook(
                HookItem::Field(i.intern("length")),
                Hook::new(i.intern("reenter")),
            )]
        },
        Runtime::builder().hook("reenter", move |ctx| {
            let result = hook_parser.get().unwrap().parse_stream(ctx.stream());
            hook_result
                .lock()
                .unwrap()
                .push(format!("{:?}", result.map_err(|e| (e.kind, e.path))));
            HookFlow::Continue
        }),
    );
    parser
        .set(runtime.parser("Proto::Header").unwrap())
        .unwrap();

    let err = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::ReentrantHookParse);
    assert_eq!(err.path, "Proto::Header::length");
    assert_eq!(
        entries(&inner_result),
        vec![r#"Err((ReentrantHookParse, "Proto::Header"))"#]
    );
}

#[test]
fn hooks_may_parse_other_input() {
    let parser: Arc<OnceLock<Parser>> = Arc::default();
    let nested = Arc::new(AtomicBool::new(false));
    let lengths = log();
    let (hook_parser, hook_lengths) = (parser.clone(), lengths.clone());
    let runtime = proto(
        |i| {
            vec![header(i).hook(
                HookItem::Field(i.intern("magic")),
                Hook::new(i.intern("nested")),
            )]
        },
        Runtime::builder().hook("nested", move |_| {
            if !nested.swap(true, Ordering::SeqCst) {
                let inner = hook_parser
                    .get()
                    .unwrap()
                    .parse(&[0xCA, 0xFE, 0x00, 0x00])
                    .unwrap();
                hook_lengths
                    .lock()
                    .unwrap()
                    .push(inner.get("length").unwrap().to_string());
            }
            HookFlow::Continue
        }),
    );
    parser
        .set(runtime.parser("Proto::Header").unwrap())
        .unwrap();
    let outer = runtime.parser("Proto::Header").unwrap().parse(HEADER).unwrap();
    assert_eq!(outer.get("length"), Some(&Value::UInt(3)));
    assert_eq!(entries(&lengths), vec!["0"]);
}
