//! Per-production emission.

use pac_ir::stack::ensure_sufficient_stack;
use pac_ir::{
    BinaryOp, Expr, Grammar, LoopExit, Name, Production, ProductionId, ProductionKind, SwitchArm,
};
use smallvec::{smallvec, SmallVec};

use super::ParserBuilder;
use crate::error::CodegenError;
use crate::ir::{match_code, to_u32, BlockId, FailKind, Instr, Lit, VarId};
use crate::state::{DecisionRef, ParserStateStack};

impl ParserBuilder<'_> {
    /// Emit `id` at the current position and return its value, if it has one.
    ///
    /// On return the builder is positioned in an open block that continues
    /// after the production.
    pub(super) fn emit_production(
        &mut self,
        stack: &mut ParserStateStack,
        grammar: &Grammar,
        id: ProductionId,
    ) -> Result<Option<VarId>, CodegenError> {
        ensure_sufficient_stack(|| {
            let production = grammar.production(id);
            let value = match &production.kind {
                ProductionKind::Literal { value, .. } => {
                    Some(self.emit_literal(stack, production, value)?)
                }
                ProductionKind::Variable {
                    ty,
                    byte_order,
                    sink,
                } => Some(self.emit_variable(stack, production, ty, *byte_order, *sink)?),
                ProductionKind::Sequence(items) => {
                    for &item in items {
                        self.emit_production(stack, grammar, item)?;
                    }
                    None
                }
                ProductionKind::Switch {
                    discriminant: Some(discriminant),
                    cases,
                    default,
                } => {
                    self.emit_value_switch(
                        stack,
                        grammar,
                        production,
                        discriminant,
                        cases,
                        *default,
                    )?;
                    None
                }
                ProductionKind::Switch {
                    discriminant: None,
                    cases,
                    default,
                } => {
                    let alternatives: Vec<ProductionId> =
                        cases.iter().map(|arm| arm.body).chain(*default).collect();
                    self.emit_decision(stack, grammar, id, production, &alternatives)?;
                    None
                }
                ProductionKind::LookAhead { alternatives } => {
                    self.emit_decision(stack, grammar, id, production, alternatives)?;
                    None
                }
                ProductionKind::Counter { count, body } => {
                    self.emit_counter(stack, grammar, production, count, *body)?;
                    None
                }
                ProductionKind::While { cond, body } => {
                    self.emit_while(stack, grammar, production, cond, *body)?;
                    None
                }
                ProductionKind::Loop { body, exit } => {
                    self.emit_loop(stack, grammar, id, production, *exit, *body)?;
                    None
                }
                ProductionKind::Boolean {
                    cond,
                    then,
                    otherwise,
                } => {
                    self.emit_boolean(stack, grammar, cond, *then, *otherwise)?;
                    None
                }
                ProductionKind::Epsilon => None,
                ProductionKind::ChildGrammar { unit, args } => {
                    Some(self.emit_child(stack, *unit, args)?)
                }
            };
            let value = match (&production.filter, value) {
                (Some(filter), Some(parsed)) => Some(self.emit_filter(stack, filter, parsed)?),
                (_, value) => value,
            };

            if !production.is_container() {
                if let Some(field) = production.field {
                    self.new_value_for_field(stack, field, value)?;
                }
            }
            Ok(value)
        })
    }

    fn emit_value_switch(
        &mut self,
        stack: &mut ParserStateStack,
        grammar: &Grammar,
        production: &Production,
        discriminant: &Expr,
        cases: &[SwitchArm],
        default: Option<ProductionId>,
    ) -> Result<(), CodegenError> {
        let scrutinee = self.emit_expr(stack, discriminant)?;
        let ir = stack.ir()?;
        let arms: Vec<BlockId> = cases.iter().map(|_| ir.new_block()).collect();
        let default_block = ir.new_block();
        let join = ir.new_block();
        let table = cases
            .iter()
            .zip(&arms)
            .flat_map(|(arm, &block)| arm.values.iter().map(move |v| (Lit::from(v), block)))
            .collect();
        ir.terminate_switch(scrutinee, table, default_block);

        for (arm, block) in cases.iter().zip(arms) {
            stack.ir()?.position_at(block);
            self.emit_production(stack, grammar, arm.body)?;
            stack.ir()?.terminate_jump(join, SmallVec::new());
        }

        stack.ir()?.position_at(default_block);
        match default {
            Some(body) => {
                self.emit_production(stack, grammar, body)?;
                stack.ir()?.terminate_jump(join, SmallVec::new());
            }
            None => stack.ir()?.terminate_fail(
                FailKind::UnmatchedAlternative,
                production.symbol.as_str(),
                "no case matches the discriminant",
                None,
            ),
        }
        stack.ir()?.position_at(join);
        Ok(())
    }

    fn decision(
        stack: &ParserStateStack,
        id: ProductionId,
        production: &Production,
    ) -> Result<DecisionRef, CodegenError> {
        stack
            .current()?
            .decisions
            .get(&id)
            .copied()
            .ok_or_else(|| CodegenError::UnresolvedDecision {
                production: production.symbol.clone(),
            })
    }

    /// Choose among `alternatives` with the production's token matcher.
    fn emit_decision(
        &mut self,
        stack: &mut ParserStateStack,
        grammar: &Grammar,
        id: ProductionId,
        production: &Production,
        alternatives: &[ProductionId],
    ) -> Result<(), CodegenError> {
        let decision = Self::decision(stack, id, production)?;
        let ir = stack.ir()?;
        let retry = ir.split();
        let (alt, _len) = ir.emit_match_token(decision.matcher);
        let blocks: Vec<BlockId> = alternatives.iter().map(|_| ir.new_block()).collect();
        let wait = ir.new_block();
        let no_match = ir.new_block();
        let join = ir.new_block();

        let mut table: Vec<(Lit, BlockId)> = blocks
            .iter()
            .enumerate()
            .map(|(k, &block)| (Lit::SInt(i64::from(to_u32(k, "alternative"))), block))
            .collect();
        table.push((Lit::SInt(match_code::NEED_MORE), wait));
        ir.terminate_switch(alt, table, no_match);

        ir.position_at(wait);
        ir.terminate_yield(retry);

        ir.position_at(no_match);
        match decision.fallback.and_then(|k| blocks.get(k)) {
            Some(&fallback) => ir.terminate_jump(fallback, SmallVec::new()),
            None => ir.terminate_fail(
                FailKind::UnmatchedAlternative,
                production.symbol.as_str(),
                "no alternative matches the input",
                None,
            ),
        }

        for (&body, block) in alternatives.iter().zip(blocks) {
            stack.ir()?.position_at(block);
            self.emit_production(stack, grammar, body)?;
            stack.ir()?.terminate_jump(join, SmallVec::new());
        }
        stack.ir()?.position_at(join);
        Ok(())
    }

    /// Start a container: reset its list if it is being stored.
    fn begin_container(
        &mut self,
        stack: &mut ParserStateStack,
        field: Option<Name>,
    ) -> Result<(), CodegenError> {
        if let Some(field) = field {
            if stack.current()?.storing_values() {
                let slot = self.slot(stack, field)?;
                stack.ir()?.emit(Instr::InitList { slot });
            }
        }
        Ok(())
    }

    /// One container element with storage disabled, then append and `foreach`
    /// hooks. Leaves the builder in the block that takes the back edge.
    fn emit_element(
        &mut self,
        stack: &mut ParserStateStack,
        grammar: &Grammar,
        field: Option<Name>,
        body: ProductionId,
        exit: BlockId,
    ) -> Result<(), CodegenError> {
        stack.current_mut()?.disable_storing_values();
        let element = self.emit_production(stack, grammar, body);
        stack.current_mut()?.enable_storing_values();
        self.element_done(stack, field, element?, exit)
    }

    /// Close a container: commit the list (already in its slot) and run the
    /// field's hooks once.
    fn end_container(
        &mut self,
        stack: &mut ParserStateStack,
        field: Option<Name>,
        exit: BlockId,
    ) -> Result<(), CodegenError> {
        stack.ir()?.position_at(exit);
        if let Some(field) = field {
            self.new_value_for_field(stack, field, None)?;
        }
        Ok(())
    }

    fn emit_counter(
        &mut self,
        stack: &mut ParserStateStack,
        grammar: &Grammar,
        production: &Production,
        count: &Expr,
        body: ProductionId,
    ) -> Result<(), CodegenError> {
        self.begin_container(stack, production.field)?;
        let count = self.emit_expr(stack, count)?;
        let ir = stack.ir()?;
        let zero = ir.emit_uint(0);
        let header = ir.new_block();
        let index = ir.add_block_param(header);
        ir.terminate_jump(header, smallvec![zero]);

        ir.position_at(header);
        let more = ir.emit_binary(BinaryOp::Lt, index, count);
        let element = ir.new_block();
        let exit = ir.new_block();
        ir.terminate_branch(more, element, exit);

        ir.position_at(element);
        self.emit_element(stack, grammar, production.field, body, exit)?;
        let ir = stack.ir()?;
        let one = ir.emit_uint(1);
        let next = ir.emit_binary(BinaryOp::Add, index, one);
        ir.terminate_jump(header, smallvec![next]);

        self.end_container(stack, production.field, exit)
    }

    fn emit_while(
        &mut self,
        stack: &mut ParserStateStack,
        grammar: &Grammar,
        production: &Production,
        cond: &Expr,
        body: ProductionId,
    ) -> Result<(), CodegenError> {
        self.begin_container(stack, production.field)?;
        let header = stack.ir()?.split();
        let more = self.emit_expr(stack, cond)?;
        let ir = stack.ir()?;
        let element = ir.new_block();
        let exit = ir.new_block();
        ir.terminate_branch(more, element, exit);

        ir.position_at(element);
        self.emit_element(stack, grammar, production.field, body, exit)?;
        stack.ir()?.terminate_jump(header, SmallVec::new());

        self.end_container(stack, production.field, exit)
    }

    fn emit_loop(
        &mut self,
        stack: &mut ParserStateStack,
        grammar: &Grammar,
        id: ProductionId,
        production: &Production,
        exit_kind: LoopExit,
        body: ProductionId,
    ) -> Result<(), CodegenError> {
        self.begin_container(stack, production.field)?;
        let decision = match exit_kind {
            LoopExit::EndOfData => None,
            LoopExit::Lookahead => Some(Self::decision(stack, id, production)?),
        };
        let ir = stack.ir()?;
        let header = ir.split();
        let element = ir.new_block();
        let wait = ir.new_block();
        let exit = ir.new_block();
        match decision {
            None => {
                let one = ir.emit_uint(1);
                let any = ir.emit_available(one);
                let drained = ir.new_block();
                ir.terminate_branch(any, element, drained);
                ir.position_at(drained);
                let frozen = ir.emit_frozen();
                ir.terminate_branch(frozen, exit, wait);
            }
            Some(decision) => {
                let (alt, _len) = ir.emit_match_token(decision.matcher);
                ir.terminate_switch(
                    alt,
                    vec![
                        (Lit::SInt(0), element),
                        (Lit::SInt(match_code::NEED_MORE), wait),
                    ],
                    exit,
                );
            }
        }
        ir.position_at(wait);
        ir.terminate_yield(header);

        ir.position_at(element);
        self.emit_element(stack, grammar, production.field, body, exit)?;
        stack.ir()?.terminate_jump(header, SmallVec::new());

        self.end_container(stack, production.field, exit)
    }

    fn emit_boolean(
        &mut self,
        stack: &mut ParserStateStack,
        grammar: &Grammar,
        cond: &Expr,
        then: ProductionId,
        otherwise: Option<ProductionId>,
    ) -> Result<(), CodegenError> {
        let cond = self.emit_expr(stack, cond)?;
        let ir = stack.ir()?;
        let then_block = ir.new_block();
        let else_block = ir.new_block();
        let join = ir.new_block();
        ir.terminate_branch(cond, then_block, else_block);

        ir.position_at(then_block);
        self.emit_production(stack, grammar, then)?;
        stack.ir()?.terminate_jump(join, SmallVec::new());

        stack.ir()?.position_at(else_block);
        if let Some(otherwise) = otherwise {
            self.emit_production(stack, grammar, otherwise)?;
        }
        let ir = stack.ir()?;
        ir.terminate_jump(join, SmallVec::new());
        ir.position_at(join);
        Ok(())
    }

    /// Call a child unit's core function on the same input.
    fn emit_child(
        &mut self,
        stack: &mut ParserStateStack,
        unit: Name,
        args: &[Expr],
    ) -> Result<VarId, CodegenError> {
        let module = self.module;
        let child = module
            .find_unit(unit)
            .ok_or_else(|| CodegenError::UnknownUnit {
                unit: self.name(unit).to_owned(),
            })?;
        if args.len() > child.params.len() {
            return Err(CodegenError::TooManyArguments {
                unit: self.name(unit).to_owned(),
                expected: child.params.len(),
                found: args.len(),
            });
        }
        let funcs = self.unit_functions(stack, unit)?;

        let mut values: SmallVec<[VarId; 4]> = SmallVec::new();
        for arg in args {
            values.push(self.emit_expr(stack, arg)?);
        }
        let ir = stack.ir()?;
        for param in &child.params[args.len()..] {
            let default = param.default.as_ref().map_or(Lit::Null, Lit::from);
            values.push(ir.emit_lit(default));
        }
        Ok(ir.emit_call(funcs.core, values))
    }
}
