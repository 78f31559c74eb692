//! Hook registry.
//!
//! Hooks are keyed by `(unit, item)`. A hook on a unit of the module being
//! compiled is local: the parser builder binds it to the hook site it emits.
//! A hook on any other unit is external: the builder only records the call
//! obligation and the runtime links it against the other module's sites by
//! path.

use pac_ir::{Hook, HookItem, HookKey, Item, Module, StringInterner};
use rustc_hash::FxHashMap;

use crate::error::CodegenError;
use crate::module::ExternalHook;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookScope {
    Local,
    External,
}

/// Hooks of one module, built once before generation.
pub struct HookRegistry<'a> {
    module: &'a Module,
    interner: &'a StringInterner,
    local: FxHashMap<HookKey, Vec<Hook>>,
    external: Vec<ExternalHook>,
}

impl<'a> HookRegistry<'a> {
    pub fn new(module: &'a Module, interner: &'a StringInterner) -> Self {
        HookRegistry {
            module,
            interner,
            local: FxHashMap::default(),
            external: Vec::new(),
        }
    }

    /// Collect every hook the module declares: inline field hooks, unit-level
    /// `on` items and module-level hook paths. Invalid declarations are
    /// reported to `problems` and skipped.
    pub fn for_module(
        module: &'a Module,
        interner: &'a StringInterner,
        problems: &mut Vec<CodegenError>,
    ) -> Self {
        let mut registry = HookRegistry::new(module, interner);
        for unit in &module.units {
            let mut inline = Vec::new();
            for field in unit.fields() {
                field.walk(&mut |f| {
                    if let Some(name) = f.name {
                        inline.extend(f.hooks.iter().map(|h| (HookKey::field(unit.name, name), *h)));
                    }
                });
            }
            for (key, hook) in inline {
                registry.define(key, hook);
            }

            for item in &unit.items {
                let Item::GlobalHook(global) = item else {
                    continue;
                };
                if let HookItem::Field(field) = global.item {
                    if unit.find_field(field).is_none() {
                        problems.push(CodegenError::UnknownField {
                            unit: interner.lookup(unit.name).to_owned(),
                            field: interner.lookup(field).to_owned(),
                        });
                        continue;
                    }
                }
                registry.define(HookKey::new(unit.name, global.item), global.hook);
            }
        }
        for module_hook in &module.hooks {
            if let Err(err) = registry.define_path(&module_hook.path, module_hook.hook) {
                problems.push(err);
            }
        }
        registry
    }

    /// Register `hook` for `key`.
    pub fn define(&mut self, key: HookKey, hook: Hook) -> HookScope {
        if self.module.find_unit(key.unit).is_some() {
            self.local.entry(key).or_default().push(hook);
            HookScope::Local
        } else {
            let target = format!(
                "{}::{}",
                self.interner.lookup(key.unit),
                item_text(key.item, self.interner)
            );
            self.push_external(target, hook);
            HookScope::External
        }
    }

    /// Register `hook` for a path: `Unit::item` names a unit of this module,
    /// `Module::Unit::item` any module. Items are field names or `%init`,
    /// `%done`, `%error`.
    pub fn define_path(&mut self, path: &str, hook: Hook) -> Result<HookScope, CodegenError> {
        let invalid = || CodegenError::InvalidHookPath {
            path: path.to_owned(),
        };
        let parts: Vec<&str> = path.split("::").collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }
        let (module, unit, item) = match parts.as_slice() {
            [unit, item] => (None, *unit, *item),
            [module, unit, item] => (Some(*module), *unit, *item),
            _ => return Err(invalid()),
        };
        let interner = self.interner;
        let item = HookItem::parse(item, |s| interner.intern(s)).ok_or_else(invalid)?;

        if module.is_some_and(|m| m != interner.lookup(self.module.name)) {
            self.push_external(path.to_owned(), hook);
            return Ok(HookScope::External);
        }

        let unit_name = interner.intern(unit);
        let unit_type = self
            .module
            .find_unit(unit_name)
            .ok_or_else(|| CodegenError::UnknownUnit {
                unit: unit.to_owned(),
            })?;
        if let HookItem::Field(field) = item {
            if unit_type.find_field(field).is_none() {
                return Err(CodegenError::UnknownField {
                    unit: unit.to_owned(),
                    field: interner.lookup(field).to_owned(),
                });
            }
        }
        Ok(self.define(HookKey::new(unit_name, item), hook))
    }

    /// Local hooks for `key` with the given `foreach` flag, highest priority
    /// first. Ties keep declaration order.
    pub fn hooks_for(&self, key: HookKey, foreach: bool) -> Vec<Hook> {
        let mut hooks: Vec<Hook> = self
            .local
            .get(&key)
            .map(|all| all.iter().filter(|h| h.foreach == foreach).copied().collect())
            .unwrap_or_default();
        hooks.sort_by(|a, b| b.priority.cmp(&a.priority));
        hooks
    }

    pub fn external(&self) -> &[ExternalHook] {
        &self.external
    }

    fn push_external(&mut self, target: String, hook: Hook) {
        tracing::trace!(%target, symbol = self.interner.lookup(hook.symbol), "external hook");
        self.external.push(ExternalHook {
            target,
            symbol: self.interner.lookup(hook.symbol).to_owned(),
            priority: hook.priority,
            foreach: hook.foreach,
        });
    }
}

/// Path component for a hook item: the field name or `%init`/`%done`/`%error`.
pub fn item_text(item: HookItem, interner: &StringInterner) -> &'static str {
    match item {
        HookItem::Field(name) => interner.lookup(name),
        HookItem::Init => "%init",
        HookItem::Done => "%done",
        HookItem::Error => "%error",
    }
}

#[cfg(test)]
mod tests;
