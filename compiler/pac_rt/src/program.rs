//! Linking generated modules with hook bodies.
//!
//! Every hook a module references by symbol must have a body. External
//! hooks (declared in one module for a unit of another) are attached to the
//! matching sites of every linked module and merged with the local hooks by
//! priority.

use rustc_hash::FxHashMap;

use pac_codegen::ir::{FuncId, HookSiteId};
use pac_codegen::{ParserDefinition, ParserModule};

use crate::error::LinkError;
use crate::hooks::HookBody;

/// A function of a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub module: usize,
    pub func: FuncId,
}

#[derive(Clone)]
pub(crate) struct LinkedHook {
    pub symbol: String,
    pub priority: i32,
    pub body: HookBody,
}

impl std::fmt::Debug for LinkedHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedHook")
            .field("symbol", &self.symbol)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) struct Program {
    pub modules: Vec<ParserModule>,
    /// Linked hooks per module per site, highest priority first.
    sites: Vec<Vec<Vec<LinkedHook>>>,
}

impl Program {
    pub fn link(
        modules: Vec<ParserModule>,
        bodies: &FxHashMap<String, HookBody>,
    ) -> Result<Self, LinkError> {
        let mut sites = Vec::with_capacity(modules.len());
        for module in &modules {
            let mut linked = Vec::with_capacity(module.hook_sites.len());
            for site in &module.hook_sites {
                let hooks = site
                    .hooks
                    .iter()
                    .map(|hook| {
                        let body = bodies.get(&hook.symbol).ok_or_else(|| {
                            LinkError::MissingHookBody {
                                symbol: hook.symbol.clone(),
                                site: site.name.clone(),
                            }
                        })?;
                        Ok(LinkedHook {
                            symbol: hook.symbol.clone(),
                            priority: hook.priority,
                            body: body.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, LinkError>>()?;
                linked.push(hooks);
            }
            sites.push(linked);
        }

        for external in modules.iter().flat_map(|m| &m.external_hooks) {
            let Some(body) = bodies.get(&external.symbol) else {
                tracing::warn!(
                    symbol = %external.symbol,
                    target = %external.target,
                    "external hook has no body, skipped"
                );
                continue;
            };
            let suffix = format!("::{}", external.target);
            let mut attached = false;
            for (module, linked) in modules.iter().zip(sites.iter_mut()) {
                for (site, hooks) in module.hook_sites.iter().zip(linked.iter_mut()) {
                    let named = site.name == external.target || site.name.ends_with(&suffix);
                    if named && site.foreach == external.foreach {
                        hooks.push(LinkedHook {
                            symbol: external.symbol.clone(),
                            priority: external.priority,
                            body: body.clone(),
                        });
                        attached = true;
                    }
                }
            }
            if !attached {
                tracing::debug!(target = %external.target, "external hook matches no site");
            }
        }

        for hooks in sites.iter_mut().flatten() {
            hooks.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        Ok(Program { modules, sites })
    }

    pub fn module(&self, index: usize) -> &ParserModule {
        &self.modules[index]
    }

    pub fn hooks(&self, module: usize, site: HookSiteId) -> &[LinkedHook] {
        &self.sites[module][site.index()]
    }

    /// Catalog entry by `Module::Unit` name.
    pub fn find_parser(&self, name: &str) -> Option<(usize, &ParserDefinition)> {
        self.modules
            .iter()
            .enumerate()
            .find_map(|(i, m)| m.find_parser(name).map(|p| (i, p)))
    }

    pub fn parsers(&self) -> impl Iterator<Item = &ParserDefinition> {
        self.modules.iter().flat_map(|m| &m.parsers)
    }
}
