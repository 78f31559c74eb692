//! Parser builder: grammars → suspendable parse functions.
//!
//! One depth-first walk per unit. Each unit gets a core function taking the
//! unit's parameters and returning its record; exported units also get a host
//! wrapper, a sink wrapper and a [`ParserDefinition`].
//!
//! Generation is transactional per unit. When a unit fails, everything
//! emitted for it (functions, matchers, hook sites, layouts, including those
//! of children generated on its behalf) is rolled back and the error is
//! collected; the remaining units still compile.

mod fields;
mod input;
mod productions;

use std::sync::Arc;

use pac_ir::{Grammar, GrammarSet, HookItem, HookKey, Module, Name, StringInterner, UnitType};
use pac_lookahead::resolve;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::builder::IrBuilder;
use crate::error::CodegenError;
use crate::hooks::{item_text, HookRegistry};
use crate::ir::{
    to_u32, FuncId, FunctionKind, HookSiteId, Instr, LayoutId, Lit, MatcherId, ParseFunction,
    VarId,
};
use crate::module::{HookRef, HookSite, ParamInfo, ParserDefinition, ParserModule, RecordLayout};
use crate::options::CodegenOptions;
use crate::state::{DecisionRef, ParserState, ParserStateStack};

/// Build parsers for every unit of `module`.
///
/// Returns the generated module and the problems found; units with problems
/// are left out.
pub fn compile_module(
    module: &Module,
    interner: &StringInterner,
    options: CodegenOptions,
) -> (ParserModule, Vec<CodegenError>) {
    compile_grammars(module, GrammarSet::new(), interner, options)
}

/// Like [`compile_module`], with grammars supplied for some units.
///
/// Units without an entry in `grammars` are lowered from their unit type.
pub fn compile_grammars(
    module: &Module,
    mut grammars: GrammarSet,
    interner: &StringInterner,
    options: CodegenOptions,
) -> (ParserModule, Vec<CodegenError>) {
    let mut problems = Vec::new();
    let mut failed = Vec::new();
    for unit in &module.units {
        if grammars.get(unit.name).is_some() {
            continue;
        }
        match Grammar::from_unit(unit, interner, options.byte_order) {
            Ok(grammar) => grammars.insert(grammar),
            Err(err) => {
                problems.push(err.into());
                failed.push(unit.name);
            }
        }
    }

    let hooks = HookRegistry::for_module(module, interner, &mut problems);
    let mut builder = ParserBuilder::new(module, &grammars, interner, options, hooks);
    for unit in failed {
        builder.units.insert(unit, UnitEntry::Failed);
    }
    for unit in &module.units {
        builder.compile_unit(unit.name, &mut problems);
    }
    let out = builder.finish();
    tracing::debug!(
        module = %out.name,
        functions = out.functions.len(),
        parsers = out.parsers.len(),
        problems = problems.len(),
        "generated parser module"
    );
    (out, problems)
}

#[derive(Clone, Copy, Debug)]
struct UnitFunctions {
    core: FuncId,
    host: Option<FuncId>,
    sink: Option<FuncId>,
}

#[derive(Clone, Copy, Debug)]
enum UnitEntry {
    Ready(UnitFunctions),
    Failed,
}

/// Output sizes before a unit transaction.
#[derive(Clone, Copy)]
struct Checkpoint {
    functions: usize,
    matchers: usize,
    hook_sites: usize,
    layouts: usize,
    parsers: usize,
}

pub(crate) struct ParserBuilder<'a> {
    module: &'a Module,
    grammars: &'a GrammarSet,
    interner: &'a StringInterner,
    options: CodegenOptions,
    hooks: HookRegistry<'a>,
    module_name: &'static str,
    out: ParserModule,
    units: FxHashMap<Name, UnitEntry>,
    sites: FxHashMap<(HookKey, bool), HookSiteId>,
    layouts: FxHashMap<Name, LayoutId>,
    /// Innermost unit whose generation failed in the current transaction.
    failed_at: Option<Name>,
}

impl<'a> ParserBuilder<'a> {
    fn new(
        module: &'a Module,
        grammars: &'a GrammarSet,
        interner: &'a StringInterner,
        options: CodegenOptions,
        hooks: HookRegistry<'a>,
    ) -> Self {
        let module_name = interner.lookup(module.name);
        ParserBuilder {
            module,
            grammars,
            interner,
            options,
            hooks,
            module_name,
            out: ParserModule {
                name: module_name.to_owned(),
                ..ParserModule::default()
            },
            units: FxHashMap::default(),
            sites: FxHashMap::default(),
            layouts: FxHashMap::default(),
            failed_at: None,
        }
    }

    fn finish(mut self) -> ParserModule {
        self.out.external_hooks = self.hooks.external().to_vec();
        self.out
    }

    #[inline]
    fn name(&self, name: Name) -> &'static str {
        self.interner.lookup(name)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            functions: self.out.functions.len(),
            matchers: self.out.matchers.len(),
            hook_sites: self.out.hook_sites.len(),
            layouts: self.out.layouts.len(),
            parsers: self.out.parsers.len(),
        }
    }

    fn rollback(&mut self, cp: Checkpoint) {
        self.out.functions.truncate(cp.functions);
        self.out.matchers.truncate(cp.matchers);
        self.out.hook_sites.truncate(cp.hook_sites);
        self.out.layouts.truncate(cp.layouts);
        self.out.parsers.truncate(cp.parsers);
        self.units.retain(|_, entry| match entry {
            UnitEntry::Ready(f) => f.core.index() < cp.functions,
            UnitEntry::Failed => true,
        });
        self.sites.retain(|_, id| id.index() < cp.hook_sites);
        self.layouts.retain(|_, id| id.index() < cp.layouts);
    }

    /// Generate `unit` (and any children it needs) as one transaction.
    fn compile_unit(&mut self, unit: Name, problems: &mut Vec<CodegenError>) {
        if self.units.contains_key(&unit) {
            return;
        }
        let cp = self.checkpoint();
        let mut stack = ParserStateStack::new();
        let result = self.unit_functions(&mut stack, unit);
        let failed_at = self.failed_at.take();
        if let Err(err) = result {
            let failed_at = failed_at.unwrap_or(unit);
            tracing::debug!(
                unit = self.name(unit),
                failed_at = self.name(failed_at),
                error = %err,
                "unit failed, rolling back"
            );
            self.rollback(cp);
            self.units.insert(unit, UnitEntry::Failed);
            self.units.insert(failed_at, UnitEntry::Failed);
            problems.push(err);
            if failed_at != unit {
                problems.push(CodegenError::FailedDependency {
                    unit: self.name(unit).to_owned(),
                    dependency: self.name(failed_at).to_owned(),
                });
            }
        }
    }

    /// Functions of `unit`, generating them first if needed.
    ///
    /// Ids are reserved before the body is generated, so recursive units see
    /// their own ids.
    fn unit_functions(
        &mut self,
        stack: &mut ParserStateStack,
        unit: Name,
    ) -> Result<UnitFunctions, CodegenError> {
        match self.units.get(&unit) {
            Some(UnitEntry::Ready(funcs)) => return Ok(*funcs),
            Some(UnitEntry::Failed) => {
                let requester = stack.current().map_or(unit, |s| s.unit);
                return Err(CodegenError::FailedDependency {
                    unit: self.name(requester).to_owned(),
                    dependency: self.name(unit).to_owned(),
                });
            }
            None => {}
        }
        let module = self.module;
        let ty = module
            .find_unit(unit)
            .ok_or_else(|| CodegenError::UnknownUnit {
                unit: self.name(unit).to_owned(),
            })?;

        let prefix = format!("{}::{}", self.module_name, self.name(unit));
        let core = self.reserve_function(format!("{prefix}::parse"), FunctionKind::Core);
        let host = ty
            .exported
            .then(|| self.reserve_function(format!("{prefix}::host"), FunctionKind::Host));
        let sink = (ty.exported || ty.sinkable)
            .then(|| self.reserve_function(format!("{prefix}::sink"), FunctionKind::Sink));
        let funcs = UnitFunctions { core, host, sink };
        self.units.insert(unit, UnitEntry::Ready(funcs));

        if let Err(err) = self.generate_unit(stack, ty, funcs) {
            self.failed_at.get_or_insert(unit);
            return Err(err);
        }
        Ok(funcs)
    }

    fn reserve_function(&mut self, name: String, kind: FunctionKind) -> FuncId {
        let id = FuncId::new(to_u32(self.out.functions.len(), "function"));
        self.out.functions.push(ParseFunction::placeholder(name, kind));
        id
    }

    fn generate_unit(
        &mut self,
        stack: &mut ParserStateStack,
        ty: &'a UnitType,
        funcs: UnitFunctions,
    ) -> Result<(), CodegenError> {
        let unit_name = self.name(ty.name);
        let grammars = self.grammars;
        let grammar = grammars
            .get(ty.name)
            .ok_or_else(|| CodegenError::UnknownUnit {
                unit: unit_name.to_owned(),
            })?;
        tracing::debug!(unit = unit_name, "generating parser");

        let mut state = ParserState::new(ty.name, unit_name, funcs.core, ty.layout());
        for param in &ty.params {
            let var = state.ir.add_param();
            state.params.push((param.name, var));
        }
        state.sinks = ty.sinks().map(|s| s.name).collect();
        for decision in resolve(grammars, grammar)?.iter() {
            let matcher = self.add_matcher(decision.matcher.clone());
            state.decisions.insert(
                decision.production,
                DecisionRef {
                    matcher,
                    fallback: decision.fallback,
                },
            );
        }

        stack.push(state);
        let body = self.unit_body(stack, ty, grammar);
        let state = stack.pop()?;
        let error_site = body?;

        let num_sinks = to_u32(state.sinks.len(), "sink");
        let function = state.ir.finish(
            format!("{}::{unit_name}::parse", self.module_name),
            FunctionKind::Core,
            num_sinks,
            Some(error_site),
        );
        self.out.functions[funcs.core.index()] = function;
        self.emit_wrappers(ty, funcs);
        Ok(())
    }

    /// prepare → root production → finalize. Returns the `%error` site.
    fn unit_body(
        &mut self,
        stack: &mut ParserStateStack,
        ty: &UnitType,
        grammar: &Grammar,
    ) -> Result<HookSiteId, CodegenError> {
        self.prepare_parse(stack, ty)?;
        self.emit_production(stack, grammar, grammar.root())?;
        self.finalize_parse(stack, ty)?;
        Ok(self.hook_site(HookKey::new(ty.name, HookItem::Error), false))
    }

    fn prepare_parse(
        &mut self,
        stack: &mut ParserStateStack,
        ty: &UnitType,
    ) -> Result<(), CodegenError> {
        let layout = self.layout(ty);
        if self.options.debug {
            let message = format!("parsing {}::{}", self.module_name, self.name(ty.name));
            stack.ir()?.emit(Instr::Debug {
                message,
                value: None,
            });
        }
        stack.ir()?.emit_alloc_record(layout);

        for var in ty.variables() {
            let Some(default) = &var.default else {
                continue;
            };
            let value = self.emit_expr(stack, default)?;
            let slot = self.slot(stack, var.name)?;
            stack.ir()?.emit_store(slot, value);
        }

        for (index, sink) in ty.sinks().enumerate() {
            let target = self
                .module
                .find_unit(sink.unit)
                .ok_or_else(|| CodegenError::UnknownUnit {
                    unit: self.name(sink.unit).to_owned(),
                })?;
            let funcs = self.unit_functions(stack, target.name)?;
            let func = funcs.sink.ok_or_else(|| CodegenError::NotSinkable {
                unit: self.name(target.name).to_owned(),
            })?;
            stack.ir()?.emit(Instr::SinkConnect {
                sink: to_u32(index, "sink"),
                func,
            });
        }

        let init = self.hook_site(HookKey::new(ty.name, HookItem::Init), false);
        stack.ir()?.emit_run_hooks(init, None, false);
        Ok(())
    }

    fn finalize_parse(
        &mut self,
        stack: &mut ParserStateStack,
        ty: &UnitType,
    ) -> Result<(), CodegenError> {
        for (index, sink) in ty.sinks().enumerate() {
            let slot = self.slot(stack, sink.name)?;
            let ir = stack.ir()?;
            let record = ir.emit_sink_close(to_u32(index, "sink"));
            ir.emit_store(slot, record);
        }
        let done = self.hook_site(HookKey::new(ty.name, HookItem::Done), false);
        let ir = stack.ir()?;
        ir.emit_run_hooks(done, None, false);
        let record = ir.emit_finish_record();
        ir.terminate_return(record);
        Ok(())
    }

    /// Host and sink wrappers, plus the catalog entry for exported units.
    fn emit_wrappers(&mut self, ty: &UnitType, funcs: UnitFunctions) {
        let unit_name = self.name(ty.name);
        let defaults: Vec<Lit> = ty
            .params
            .iter()
            .map(|p| p.default.as_ref().map_or(Lit::Null, Lit::from))
            .collect();

        if let Some(host) = funcs.host {
            let mut ir = IrBuilder::new();
            let args: SmallVec<[VarId; 4]> = ty.params.iter().map(|_| ir.add_param()).collect();
            let record = ir.emit_call(funcs.core, args);
            ir.terminate_return(record);
            self.out.functions[host.index()] = ir.finish(
                format!("{}::{unit_name}::host", self.module_name),
                FunctionKind::Host,
                0,
                None,
            );
        }

        if let Some(sink) = funcs.sink {
            let mut ir = IrBuilder::new();
            let args: SmallVec<[VarId; 4]> =
                defaults.iter().map(|lit| ir.emit_lit(lit.clone())).collect();
            let record = ir.emit_call(funcs.core, args);
            ir.terminate_return(record);
            self.out.functions[sink.index()] = ir.finish(
                format!("{}::{unit_name}::sink", self.module_name),
                FunctionKind::Sink,
                0,
                None,
            );
        }

        if let (Some(host), Some(sink)) = (funcs.host, funcs.sink) {
            let params = ty
                .params
                .iter()
                .zip(defaults)
                .map(|(p, default)| ParamInfo {
                    name: self.name(p.name).to_owned(),
                    default,
                })
                .collect();
            let definition = ParserDefinition {
                name: format!("{}::{unit_name}", self.module_name),
                unit: unit_name.to_owned(),
                description: ty.description().map(str::to_owned),
                mime_types: ty.mime_types().map(str::to_owned).collect(),
                params,
                core: funcs.core,
                host,
                sink,
            };
            self.out.parsers.push(definition);
        }
    }

    fn add_matcher(&mut self, matcher: pac_lookahead::TokenMatcher) -> MatcherId {
        let id = MatcherId::new(to_u32(self.out.matchers.len(), "matcher"));
        self.out.matchers.push(matcher);
        id
    }

    fn layout(&mut self, ty: &UnitType) -> LayoutId {
        if let Some(&id) = self.layouts.get(&ty.name) {
            return id;
        }
        let id = LayoutId::new(to_u32(self.out.layouts.len(), "layout"));
        let layout = RecordLayout {
            unit: self.name(ty.name).to_owned(),
            fields: ty
                .layout()
                .slots
                .iter()
                .map(|&n| self.name(n).to_owned())
                .collect(),
        };
        self.out.layouts.push(Arc::new(layout));
        self.layouts.insert(ty.name, id);
        id
    }

    /// The hook site for `key`, created on first use.
    ///
    /// Sites exist even without local hooks so hooks from other modules can
    /// link against them.
    fn hook_site(&mut self, key: HookKey, foreach: bool) -> HookSiteId {
        if let Some(&id) = self.sites.get(&(key, foreach)) {
            return id;
        }
        let id = HookSiteId::new(to_u32(self.out.hook_sites.len(), "hook site"));
        let hooks = self
            .hooks
            .hooks_for(key, foreach)
            .into_iter()
            .map(|h| HookRef {
                symbol: self.name(h.symbol).to_owned(),
                priority: h.priority,
            })
            .collect();
        let site = HookSite {
            name: format!(
                "{}::{}::{}",
                self.module_name,
                self.name(key.unit),
                item_text(key.item, self.interner)
            ),
            foreach,
            hooks,
        };
        self.out.hook_sites.push(site);
        self.sites.insert((key, foreach), id);
        id
    }
}
