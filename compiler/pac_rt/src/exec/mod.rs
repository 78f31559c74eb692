//! Interpreter for generated parse functions.
//!
//! Frames live on an explicit stack so that a suspension anywhere in a
//! chain of calls can be packaged up as a [`Resumption`] and continued later
//! on the same stream. The cursor is shared by all frames of one invocation.

mod operators;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use pac_codegen::ir::{BlockId, HookSiteId, Instr, ParseFunction, PrimOp, Terminator, VarId};
use pac_codegen::ir;
use pac_ir::{AtomicType, ByteOrder};
use pac_lookahead::MatchResult;

use crate::error::{ParseError, ParseErrorKind};
use crate::hooks::{HookContext, HookFlow};
use crate::program::{FunctionRef, Program};
use crate::stream::Stream;
use crate::value::{Record, Value};

use self::operators::{evaluate_binary, evaluate_unary};

struct Frame {
    func: FunctionRef,
    block: BlockId,
    /// Next instruction in `block`.
    ip: usize,
    locals: Vec<Value>,
    record: Option<Record>,
    sinks: Vec<Option<SinkState>>,
    /// Caller variable receiving the return value.
    ret: Option<VarId>,
}

impl Frame {
    fn new(func: FunctionRef, function: &ParseFunction, args: Vec<Value>, ret: Option<VarId>) -> Self {
        let mut locals = vec![Value::Null; function.num_vars as usize];
        for (param, arg) in function.params.iter().zip(args) {
            locals[param.index()] = arg;
        }
        Frame {
            func,
            block: function.entry,
            ip: 0,
            locals,
            record: None,
            sinks: (0..function.num_sinks).map(|_| None).collect(),
            ret,
        }
    }

    fn local(&self, var: VarId) -> &Value {
        &self.locals[var.index()]
    }

    fn set(&mut self, var: VarId, value: Value) {
        self.locals[var.index()] = value;
    }
}

struct SinkState {
    stream: Stream,
    progress: SinkProgress,
}

enum SinkProgress {
    Pending(Resumption),
    Done(Value),
}

/// A suspended invocation: every frame with its locals, and the cursor.
pub struct Resumption {
    frames: Vec<Frame>,
    cursor: usize,
}

impl Resumption {
    /// Offset up to which input has been consumed.
    pub fn offset(&self) -> usize {
        self.cursor
    }
}

impl std::fmt::Debug for Resumption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resumption")
            .field("depth", &self.frames.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[derive(Debug)]
pub enum Outcome {
    Done { value: Value, offset: usize },
    NeedMoreInput(Resumption),
}

enum Step {
    Continue,
    Suspend,
    Finish(Value),
}

pub struct Executor {
    program: Arc<Program>,
}

impl Executor {
    pub(crate) fn new(program: Arc<Program>) -> Self {
        Executor { program }
    }

    fn function(&self, func: FunctionRef) -> &ParseFunction {
        self.program.module(func.module).function(func.func)
    }

    /// Run `entry` on `stream` until it completes, fails or suspends.
    ///
    /// Unlike [`Invocation`](crate::Invocation) this does not mark the stream
    /// busy, so hooks are not guarded against reentrant parses.
    pub fn start(
        &self,
        entry: FunctionRef,
        args: Vec<Value>,
        stream: &Stream,
    ) -> Result<Outcome, ParseError> {
        let function = self.function(entry);
        if args.len() != function.params.len() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidArguments,
                function.name.as_str(),
                0,
                format!(
                    "expected {} arguments, found {}",
                    function.params.len(),
                    args.len()
                ),
            ));
        }
        tracing::trace!(function = %function.name, "starting parse");
        let frame = Frame::new(entry, function, args, None);
        self.drive(vec![frame], 0, stream)
    }

    /// Continue a suspended parse once `stream` has grown or been frozen.
    pub fn resume(&self, resumption: Resumption, stream: &Stream) -> Result<Outcome, ParseError> {
        self.drive(resumption.frames, resumption.cursor, stream)
    }

    fn drive(
        &self,
        mut frames: Vec<Frame>,
        mut cursor: usize,
        stream: &Stream,
    ) -> Result<Outcome, ParseError> {
        loop {
            match self.step(&mut frames, &mut cursor, stream) {
                Ok(Step::Continue) => {}
                Ok(Step::Suspend) => {
                    tracing::trace!(cursor, depth = frames.len(), "suspended");
                    return Ok(Outcome::NeedMoreInput(Resumption { frames, cursor }));
                }
                Ok(Step::Finish(value)) => {
                    return Ok(Outcome::Done {
                        value,
                        offset: cursor,
                    })
                }
                Err(err) => return Err(self.unwind(frames, cursor, stream, err)),
            }
        }
    }

    fn step(
        &self,
        frames: &mut Vec<Frame>,
        cursor: &mut usize,
        stream: &Stream,
    ) -> Result<Step, ParseError> {
        let Some(frame) = frames.last_mut() else {
            return Err(invalid("", *cursor, "no active frame"));
        };
        let function = self.function(frame.func);
        let block = function.block(frame.block);

        if let Some(instr) = block.body.get(frame.ip) {
            frame.ip += 1;
            if let Some(callee) = self.exec(frame, function, instr, cursor, stream)? {
                frames.push(callee);
            }
            return Ok(Step::Continue);
        }

        match &block.terminator {
            Terminator::Return { value } => {
                let value = std::mem::replace(&mut frame.locals[value.index()], Value::Null);
                let ret = frame.ret;
                frames.pop();
                match (frames.last_mut(), ret) {
                    (None, _) => Ok(Step::Finish(value)),
                    (Some(caller), Some(dst)) => {
                        caller.set(dst, value);
                        Ok(Step::Continue)
                    }
                    (Some(_), None) => Err(invalid(&function.name, *cursor, "return without caller")),
                }
            }
            Terminator::Jump { target, args } => {
                let values: Vec<Value> = args.iter().map(|a| frame.local(*a).clone()).collect();
                for (param, value) in function.block(*target).params.iter().zip(values) {
                    frame.set(*param, value);
                }
                frame.block = *target;
                frame.ip = 0;
                Ok(Step::Continue)
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                frame.block = if frame.local(*cond).is_truthy() {
                    *then_block
                } else {
                    *else_block
                };
                frame.ip = 0;
                Ok(Step::Continue)
            }
            Terminator::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let value = frame.local(*scrutinee);
                frame.block = cases
                    .iter()
                    .find(|(lit, _)| value.loose_eq(&Value::from(lit)))
                    .map_or(*default, |(_, b)| *b);
                frame.ip = 0;
                Ok(Step::Continue)
            }
            Terminator::Yield { resume, .. } => {
                frame.block = *resume;
                frame.ip = 0;
                Ok(Step::Suspend)
            }
            Terminator::Fail {
                kind,
                path,
                message,
                offset,
            } => {
                let offset = offset
                    .and_then(|v| frame.local(v).as_int())
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(*cursor);
                Err(ParseError::new((*kind).into(), path.as_str(), offset, message.as_str()))
            }
            Terminator::Unreachable => Err(invalid(&function.name, *cursor, "reached unreachable block")),
        }
    }

    /// Execute one instruction. Returns the callee frame for calls.
    fn exec(
        &self,
        frame: &mut Frame,
        function: &ParseFunction,
        instr: &Instr,
        cursor: &mut usize,
        stream: &Stream,
    ) -> Result<Option<Frame>, ParseError> {
        let module = self.program.module(frame.func.module);
        let path = function.name.as_str();
        match instr {
            Instr::Let { dst, value } => {
                let value = match value {
                    ir::Value::Var(v) => frame.local(*v).clone(),
                    ir::Value::Literal(lit) => Value::from(lit),
                    ir::Value::PrimOp { op, args } => {
                        let result = match (op, args.as_slice()) {
                            (PrimOp::Binary(op), [lhs, rhs]) => {
                                evaluate_binary(frame.local(*lhs), frame.local(*rhs), *op)
                            }
                            (PrimOp::Unary(op), [operand]) => {
                                evaluate_unary(frame.local(*operand), *op)
                            }
                            _ => return Err(invalid(path, *cursor, "operator arity mismatch")),
                        };
                        result.map_err(|e| invalid(path, *cursor, e.to_string()))?
                    }
                };
                frame.set(*dst, value);
            }

            Instr::AllocRecord { layout } => {
                frame.record = Some(Record::new(module.layout(*layout).clone()));
            }
            Instr::FinishRecord { dst } => {
                let record = frame
                    .record
                    .take()
                    .ok_or_else(|| invalid(path, *cursor, "no record to finish"))?;
                frame.set(*dst, Value::from(record));
            }
            Instr::Load { dst, slot } => {
                let value = record_slot(frame, *slot, path, *cursor)?.clone();
                frame.set(*dst, value);
            }
            Instr::Store { slot, value } => {
                let value = frame.local(*value).clone();
                *record_slot(frame, *slot, path, *cursor)? = value;
            }
            Instr::InitList { slot } => {
                *record_slot(frame, *slot, path, *cursor)? = Value::List(Vec::new());
            }
            Instr::Append { slot, value } => {
                let value = frame.local(*value).clone();
                match record_slot(frame, *slot, path, *cursor)? {
                    Value::List(items) => items.push(value),
                    unset @ Value::Null => *unset = Value::List(vec![value]),
                    other => {
                        let message = format!("cannot append to {}", other.type_name());
                        return Err(invalid(path, *cursor, message));
                    }
                }
            }

            Instr::Offset { dst } => frame.set(*dst, Value::UInt(*cursor as u64)),
            Instr::Available { dst, len } => {
                let len = as_len(frame.local(*len), path, *cursor)?;
                let available = cursor.checked_add(len).is_some_and(|end| end <= stream.len());
                frame.set(*dst, Value::Bool(available));
            }
            Instr::Frozen { dst } => frame.set(*dst, Value::Bool(stream.is_frozen())),
            Instr::Unpack { dst, ty, order } => {
                let bytes = consume(stream, cursor, ty.width(), path)?;
                let value = unpack(*ty, *order, &bytes)
                    .ok_or_else(|| invalid(path, *cursor, "malformed atomic value"))?;
                frame.set(*dst, value);
            }
            Instr::ReadBytes { dst, len } => {
                let len = as_len(frame.local(*len), path, *cursor)?;
                let bytes = consume(stream, cursor, len, path)?;
                frame.set(*dst, Value::Bytes(bytes));
            }
            Instr::FindDelim { dst, delim } => {
                let found = stream.with_window(*cursor, |window, _| find(window, delim));
                let index = found
                    .and_then(|i| i64::try_from(i).ok())
                    .unwrap_or(-1);
                frame.set(*dst, Value::SInt(index));
            }
            Instr::ReadRest { dst } => {
                let rest = stream.with_window(*cursor, |window, _| window.to_vec());
                *cursor += rest.len();
                frame.set(*dst, Value::Bytes(rest));
            }
            Instr::Skip { len } => {
                let len = as_len(frame.local(*len), path, *cursor)?;
                consume(stream, cursor, len, path)?;
            }
            Instr::MatchToken { alt, len, matcher } => {
                let matcher = module.matcher(*matcher);
                let result = stream.with_window(*cursor, |window, eod| matcher.advance(window, eod));
                let (code, matched) = match result {
                    MatchResult::Matched { alternative, len } => {
                        (i64::try_from(alternative).unwrap_or(i64::MAX), len)
                    }
                    MatchResult::NeedMore => (ir::match_code::NEED_MORE, 0),
                    MatchResult::NoMatch => (ir::match_code::NO_MATCH, 0),
                };
                frame.set(*alt, Value::SInt(code));
                frame.set(*len, Value::UInt(matched as u64));
            }

            Instr::Call { dst, func, args } => {
                let callee = FunctionRef {
                    module: frame.func.module,
                    func: *func,
                };
                let args = args.iter().map(|a| frame.local(*a).clone()).collect();
                return Ok(Some(Frame::new(callee, self.function(callee), args, Some(*dst))));
            }
            Instr::RunHooks { site, value, stop } => {
                let value = value.map(|v| &frame.locals[v.index()]);
                let stopped = self.run_hooks(
                    frame.func.module,
                    *site,
                    value,
                    frame.record.as_mut(),
                    stream,
                    *cursor,
                )?;
                if let Some(stop) = stop {
                    frame.set(*stop, Value::Bool(stopped));
                }
            }

            Instr::SinkConnect { sink, func } => {
                let entry = FunctionRef {
                    module: frame.func.module,
                    func: *func,
                };
                let sink_stream = Stream::new();
                let progress = {
                    let _busy = sink_stream.enter(&self.function(entry).name)?;
                    SinkProgress::from(self.start(entry, Vec::new(), &sink_stream)?)
                };
                tracing::debug!(function = %self.function(entry).name, "sink connected");
                frame.sinks[*sink as usize] = Some(SinkState {
                    stream: sink_stream,
                    progress,
                });
            }
            Instr::SinkWrite { sink, data } => {
                let data = frame
                    .local(*data)
                    .as_bytes()
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| invalid(path, *cursor, "sink data is not bytes"))?;
                let state = frame.sinks[*sink as usize]
                    .as_mut()
                    .ok_or_else(|| invalid(path, *cursor, "write to unconnected sink"))?;
                state.stream.append(&data);
                self.advance_sink(state, path)?;
            }
            Instr::SinkClose { dst, sink } => {
                let value = match frame.sinks[*sink as usize].take() {
                    Some(mut state) => {
                        state.stream.freeze();
                        self.advance_sink(&mut state, path)?;
                        match state.progress {
                            SinkProgress::Done(value) => value,
                            SinkProgress::Pending(r) => {
                                return Err(ParseError::new(
                                    ParseErrorKind::UnexpectedEndOfInput,
                                    path,
                                    r.offset(),
                                    "sink input ended early",
                                ))
                            }
                        }
                    }
                    None => Value::Null,
                };
                frame.set(*dst, value);
            }

            Instr::Debug { message, value } => match value {
                Some(v) => tracing::debug!(target: "pac_rt::parser", value = %frame.local(*v), "{message}"),
                None => tracing::debug!(target: "pac_rt::parser", "{message}"),
            },
        }
        Ok(None)
    }

    fn advance_sink(&self, state: &mut SinkState, path: &str) -> Result<(), ParseError> {
        let progress = std::mem::replace(&mut state.progress, SinkProgress::Done(Value::Null));
        state.progress = match progress {
            SinkProgress::Pending(resumption) => {
                let _busy = state.stream.enter(path)?;
                SinkProgress::from(self.resume(resumption, &state.stream)?)
            }
            done @ SinkProgress::Done(_) => {
                tracing::trace!("sink parse already finished, data ignored");
                done
            }
        };
        Ok(())
    }

    /// Run a site's hooks in priority order. The first stop skips the rest.
    fn run_hooks(
        &self,
        module: usize,
        site: HookSiteId,
        value: Option<&Value>,
        record: Option<&mut Record>,
        stream: &Stream,
        offset: usize,
    ) -> Result<bool, ParseError> {
        let hooks = self.program.hooks(module, site);
        if hooks.is_empty() {
            return Ok(false);
        }
        let mut ctx = HookContext {
            value,
            record,
            stream,
            offset,
        };
        for hook in hooks {
            tracing::trace!(symbol = %hook.symbol, "running hook");
            let flow = (hook.body)(&mut ctx);
            if stream.take_reentered() {
                let site = &self.program.module(module).hook_site(site).name;
                return Err(ParseError::new(
                    ParseErrorKind::ReentrantHookParse,
                    site.as_str(),
                    offset,
                    format!("hook `{}` started a parse on its own input", hook.symbol),
                ));
            }
            if flow == HookFlow::Stop {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run `%error` hooks from the innermost frame outwards.
    fn unwind(&self, frames: Vec<Frame>, cursor: usize, stream: &Stream, err: ParseError) -> ParseError {
        tracing::debug!(error = %err, "parse failed");
        for mut frame in frames.into_iter().rev() {
            let Some(site) = self.function(frame.func).error_site else {
                continue;
            };
            if let Err(nested) =
                self.run_hooks(frame.func.module, site, None, frame.record.as_mut(), stream, cursor)
            {
                tracing::warn!(error = %nested, "error hook failed");
            }
        }
        err
    }
}

impl From<Outcome> for SinkProgress {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done { value, .. } => SinkProgress::Done(value),
            Outcome::NeedMoreInput(resumption) => SinkProgress::Pending(resumption),
        }
    }
}

fn invalid(path: &str, offset: usize, message: impl Into<String>) -> ParseError {
    ParseError::new(ParseErrorKind::InvalidProgram, path, offset, message)
}

fn record_slot<'f>(
    frame: &'f mut Frame,
    slot: u32,
    path: &str,
    cursor: usize,
) -> Result<&'f mut Value, ParseError> {
    frame
        .record
        .as_mut()
        .and_then(|r| r.slot_mut(slot as usize))
        .ok_or_else(|| invalid(path, cursor, format!("no record slot {slot}")))
}

fn as_len(value: &Value, path: &str, cursor: usize) -> Result<usize, ParseError> {
    value
        .as_int()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(path, cursor, format!("invalid length {value}")))
}

/// Take `len` bytes at the cursor and advance past them.
fn consume(stream: &Stream, cursor: &mut usize, len: usize, path: &str) -> Result<Vec<u8>, ParseError> {
    let bytes = stream.read(*cursor, len).ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::UnexpectedEndOfInput,
            path,
            *cursor,
            format!("{len} bytes not available"),
        )
    })?;
    *cursor += len;
    Ok(bytes)
}

fn find(window: &[u8], delim: &[u8]) -> Option<usize> {
    if delim.is_empty() {
        return Some(0);
    }
    window.windows(delim.len()).position(|w| w == delim)
}

fn unpack(ty: AtomicType, order: ByteOrder, bytes: &[u8]) -> Option<Value> {
    let raw = || {
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        match order.concrete() {
            ByteOrder::Little => bytes.iter().rev().fold(0, fold),
            _ => bytes.iter().fold(0, fold),
        }
    };
    let signed = || {
        let shift = 64 - 8 * bytes.len() as u32;
        i64::from_ne_bytes((raw() << shift).to_ne_bytes()) >> shift
    };
    Some(match ty {
        AtomicType::UInt8 | AtomicType::UInt16 | AtomicType::UInt32 | AtomicType::UInt64 => {
            Value::UInt(raw())
        }
        AtomicType::SInt8 | AtomicType::SInt16 | AtomicType::SInt32 | AtomicType::SInt64 => {
            Value::SInt(signed())
        }
        AtomicType::Float => Value::Double(f64::from(f32::from_bits(u32::try_from(raw()).ok()?))),
        AtomicType::Double => Value::Double(f64::from_bits(raw())),
        AtomicType::Bool => Value::Bool(raw() != 0),
        // Addresses are always in network order.
        AtomicType::Addr4 => Value::Address(IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(bytes).ok()?))),
        AtomicType::Addr6 => Value::Address(IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(bytes).ok()?))),
        AtomicType::Time32 | AtomicType::Time64 => Value::Time(raw()),
    })
}
