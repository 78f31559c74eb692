//! Expressions and the field-value commit protocol.

use pac_ir::{Expr, HookKey, Name};

use super::ParserBuilder;
use crate::error::CodegenError;
use crate::ir::{BlockId, Instr, Lit, VarId};
use crate::state::ParserStateStack;

impl ParserBuilder<'_> {
    /// Record slot of `name` in the current unit.
    pub(super) fn slot(&self, stack: &ParserStateStack, name: Name) -> Result<u32, CodegenError> {
        let state = stack.current()?;
        state
            .layout
            .slot(name)
            .ok_or_else(|| CodegenError::UnknownField {
                unit: state.unit_name.to_owned(),
                field: self.name(name).to_owned(),
            })
    }

    pub(super) fn emit_expr(
        &mut self,
        stack: &mut ParserStateStack,
        expr: &Expr,
    ) -> Result<VarId, CodegenError> {
        self.emit_expr_over(stack, expr, None)
    }

    /// Apply a `&convert` filter to `value`.
    pub(super) fn emit_filter(
        &mut self,
        stack: &mut ParserStateStack,
        filter: &Expr,
        value: VarId,
    ) -> Result<VarId, CodegenError> {
        self.emit_expr_over(stack, filter, Some(value))
    }

    /// `parsed` is what `$$` evaluates to.
    fn emit_expr_over(
        &mut self,
        stack: &mut ParserStateStack,
        expr: &Expr,
        parsed: Option<VarId>,
    ) -> Result<VarId, CodegenError> {
        match expr {
            Expr::Const(c) => Ok(stack.ir()?.emit_lit(Lit::from(c))),
            Expr::Field(name) => {
                let slot = self.slot(stack, *name)?;
                Ok(stack.ir()?.emit_load(slot))
            }
            Expr::Param(name) => {
                let state = stack.current()?;
                state
                    .param(*name)
                    .ok_or_else(|| CodegenError::UnknownParam {
                        unit: state.unit_name.to_owned(),
                        param: self.name(*name).to_owned(),
                    })
            }
            Expr::Parsed => parsed.ok_or_else(|| CodegenError::ParsedValueOutsideConvert {
                unit: stack.current().map_or("", |s| s.unit_name).to_owned(),
            }),
            Expr::Unary { op, operand } => {
                let operand = self.emit_expr_over(stack, operand, parsed)?;
                Ok(stack.ir()?.emit_unary(*op, operand))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.emit_expr_over(stack, lhs, parsed)?;
                let rhs = self.emit_expr_over(stack, rhs, parsed)?;
                Ok(stack.ir()?.emit_binary(*op, lhs, rhs))
            }
        }
    }

    /// Commit a parsed value to `field`.
    ///
    /// With storage enabled: store the value, then run the field's hooks. With
    /// `value` absent the hooks see what the slot already holds (a container
    /// after its last element). With storage disabled nothing is emitted.
    pub(super) fn new_value_for_field(
        &mut self,
        stack: &mut ParserStateStack,
        field: Name,
        value: Option<VarId>,
    ) -> Result<(), CodegenError> {
        if !stack.current()?.storing_values() {
            return Ok(());
        }
        let slot = self.slot(stack, field)?;
        let unit = stack.current()?.unit;
        let site = self.hook_site(HookKey::field(unit, field), false);
        let debug = self.options.debug.then(|| {
            format!(
                "{}::{}",
                stack.current().map_or("", |s| s.unit_name),
                self.name(field)
            )
        });

        let ir = stack.ir()?;
        let hook_value = match value {
            Some(v) => {
                ir.emit_store(slot, v);
                v
            }
            None => ir.emit_load(slot),
        };
        if let Some(message) = debug {
            ir.emit(Instr::Debug {
                message,
                value: Some(hook_value),
            });
        }
        ir.emit_run_hooks(site, Some(hook_value), false);
        Ok(())
    }

    /// After a container element: append it and run the `foreach` hooks. A
    /// stop request leaves the loop through `exit`.
    pub(super) fn element_done(
        &mut self,
        stack: &mut ParserStateStack,
        field: Option<Name>,
        element: Option<VarId>,
        exit: BlockId,
    ) -> Result<(), CodegenError> {
        let Some(field) = field else {
            return Ok(());
        };
        let storing = stack.current()?.storing_values();
        if storing {
            if let Some(value) = element {
                let slot = self.slot(stack, field)?;
                stack.ir()?.emit(Instr::Append { slot, value });
            }
        }

        let unit = stack.current()?.unit;
        let site = self.hook_site(HookKey::field(unit, field), true);
        let ir = stack.ir()?;
        if let Some(stop) = ir.emit_run_hooks(site, element, true) {
            let next = ir.new_block();
            ir.terminate_branch(stop, exit, next);
            ir.position_at(next);
        }
        Ok(())
    }
}
