//! Terminals: everything that reads the input.
//!
//! Every read is preceded by a retry block. When the input is short and not
//! frozen the function yields and, once resumed, re-enters the retry block
//! and tests again. When it is short and frozen the parse fails with
//! `UnexpectedEndOfInput`.

use pac_ir::{
    AtomicType, BinaryOp, ByteOrder, BytesLength, LiteralValue, Name, ParseType, Production,
};
use pac_lookahead::TokenMatcher;

use super::ParserBuilder;
use crate::builder::IrBuilder;
use crate::error::CodegenError;
use crate::ir::{match_code, BlockId, FailKind, Instr, Lit, VarId};
use crate::state::ParserStateStack;

impl ParserBuilder<'_> {
    pub(super) fn emit_literal(
        &mut self,
        stack: &mut ParserStateStack,
        production: &Production,
        value: &LiteralValue,
    ) -> Result<VarId, CodegenError> {
        let path = production.symbol.as_str();
        match value {
            LiteralValue::Bytes(expected) => {
                let ir = stack.ir()?;
                let start = ir.emit_offset();
                let len = ir.emit_uint(expected.len() as u64);
                require(ir, len, path);
                let got = ir.emit_read_bytes(len);
                let expected = ir.emit_lit(Lit::Bytes(expected.clone()));
                expect_equal(ir, got, expected, start, path);
                Ok(got)
            }
            LiteralValue::Integer {
                value, ty, order, ..
            } => {
                let ir = stack.ir()?;
                let start = ir.emit_offset();
                let got = read_atomic(ir, *ty, *order, path);
                let expected = ir.emit_lit(Lit::from(value));
                expect_equal(ir, got, expected, start, path);
                Ok(got)
            }
            LiteralValue::RegExp(re) => {
                let matcher = TokenMatcher::single(value.pattern()).map_err(|source| {
                    CodegenError::InvalidPattern {
                        production: path.to_owned(),
                        source,
                    }
                })?;
                let matcher = self.add_matcher(matcher);
                let ir = stack.ir()?;
                let start = ir.emit_offset();
                let retry = ir.split();
                let (alt, len) = ir.emit_match_token(matcher);
                let hit = ir.new_block();
                let wait = ir.new_block();
                let miss = ir.new_block();
                ir.terminate_switch(
                    alt,
                    vec![(Lit::SInt(0), hit), (Lit::SInt(match_code::NEED_MORE), wait)],
                    miss,
                );
                ir.position_at(wait);
                ir.terminate_yield(retry);
                ir.position_at(miss);
                ir.terminate_fail(
                    FailKind::ConstantMismatch,
                    path,
                    format!("input does not match /{re}/"),
                    Some(start),
                );
                ir.position_at(hit);
                Ok(ir.emit_read_bytes(len))
            }
        }
    }

    pub(super) fn emit_variable(
        &mut self,
        stack: &mut ParserStateStack,
        production: &Production,
        ty: &ParseType,
        byte_order: ByteOrder,
        sink: Option<Name>,
    ) -> Result<VarId, CodegenError> {
        let path = production.symbol.as_str();
        let value = match ty {
            ParseType::Atomic(atomic) => read_atomic(stack.ir()?, *atomic, byte_order, path),
            ParseType::Bytes(BytesLength::Length(len)) => {
                let len = self.emit_expr(stack, len)?;
                let ir = stack.ir()?;
                require(ir, len, path);
                ir.emit_read_bytes(len)
            }
            ParseType::Bytes(BytesLength::Until(delim)) => {
                let ir = stack.ir()?;
                let retry = ir.split();
                let index = ir.emit_find_delim(delim.clone());
                let zero = ir.emit_lit(Lit::SInt(0));
                let found = ir.emit_binary(BinaryOp::Ge, index, zero);
                let hit = ir.new_block();
                let short = ir.new_block();
                ir.terminate_branch(found, hit, short);
                ir.position_at(short);
                insufficient_input(ir, retry, path);
                ir.position_at(hit);
                let data = ir.emit_read_bytes(index);
                let delim_len = ir.emit_uint(delim.len() as u64);
                ir.emit(Instr::Skip { len: delim_len });
                data
            }
            ParseType::Bytes(BytesLength::Eod) => {
                let ir = stack.ir()?;
                let retry = ir.split();
                let frozen = ir.emit_frozen();
                let rest = ir.new_block();
                let wait = ir.new_block();
                ir.terminate_branch(frozen, rest, wait);
                ir.position_at(wait);
                ir.terminate_yield(retry);
                ir.position_at(rest);
                ir.emit_read_rest()
            }
        };

        if let Some(sink) = sink {
            let state = stack.current()?;
            let index = state
                .sink_index(sink)
                .ok_or_else(|| CodegenError::UnknownField {
                    unit: state.unit_name.to_owned(),
                    field: self.name(sink).to_owned(),
                })?;
            stack.ir()?.emit(Instr::SinkWrite {
                sink: index,
                data: value,
            });
        }
        Ok(value)
    }
}

fn read_atomic(ir: &mut IrBuilder, ty: AtomicType, order: ByteOrder, path: &str) -> VarId {
    let width = ir.emit_uint(ty.width() as u64);
    require(ir, width, path);
    ir.emit_unpack(ty, order)
}

/// Continue only once `len` bytes are available at the cursor.
pub(super) fn require(ir: &mut IrBuilder, len: VarId, path: &str) {
    let retry = ir.split();
    let ok = ir.emit_available(len);
    let cont = ir.new_block();
    let short = ir.new_block();
    ir.terminate_branch(ok, cont, short);
    ir.position_at(short);
    insufficient_input(ir, retry, path);
    ir.position_at(cont);
}

/// Input is short: fail if frozen, otherwise suspend and retry.
pub(super) fn insufficient_input(ir: &mut IrBuilder, retry: BlockId, path: &str) {
    let frozen = ir.emit_frozen();
    let fail = ir.new_block();
    let wait = ir.new_block();
    ir.terminate_branch(frozen, fail, wait);
    ir.position_at(fail);
    ir.terminate_fail(
        FailKind::UnexpectedEndOfInput,
        path,
        "unexpected end of input",
        None,
    );
    ir.position_at(wait);
    ir.terminate_yield(retry);
}

fn expect_equal(ir: &mut IrBuilder, got: VarId, expected: VarId, start: VarId, path: &str) {
    let eq = ir.emit_binary(BinaryOp::Eq, got, expected);
    let cont = ir.new_block();
    let bad = ir.new_block();
    ir.terminate_branch(eq, cont, bad);
    ir.position_at(bad);
    ir.terminate_fail(
        FailKind::ConstantMismatch,
        path,
        "constant mismatch",
        Some(start),
    );
    ir.position_at(cont);
}
