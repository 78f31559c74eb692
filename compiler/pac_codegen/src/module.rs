//! What the parser builder hands to a target: functions, matchers, hook
//! sites, record layouts and the parser catalog entries.

use std::sync::Arc;

use pac_lookahead::TokenMatcher;

use crate::ir::{FuncId, HookSiteId, LayoutId, Lit, MatcherId, ParseFunction};

/// Field names of a unit's record, in slot order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordLayout {
    pub unit: String,
    pub fields: Vec<String>,
}

impl RecordLayout {
    pub fn slot(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }
}

/// A hook bound to a site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookRef {
    pub symbol: String,
    pub priority: i32,
}

/// A point in a generated parser where hooks run.
///
/// `name` is the fully-qualified item path, `Module::Unit::item`, which is
/// what external hooks are linked against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookSite {
    pub name: String,
    pub foreach: bool,
    /// Local hooks, highest priority first.
    pub hooks: Vec<HookRef>,
}

/// A hook on a unit of another module; resolved when the modules are linked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalHook {
    /// Hook path as written: `Unit::item` or `Module::Unit::item`.
    pub target: String,
    pub symbol: String,
    pub priority: i32,
    pub foreach: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: String,
    /// Value the sink wrapper passes.
    pub default: Lit,
}

/// Catalog entry for an exported unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserDefinition {
    /// `Module::Unit`.
    pub name: String,
    pub unit: String,
    pub description: Option<String>,
    pub mime_types: Vec<String>,
    pub params: Vec<ParamInfo>,
    pub core: FuncId,
    pub host: FuncId,
    pub sink: FuncId,
}

/// Generated code for one module.
#[derive(Clone, Debug, Default)]
pub struct ParserModule {
    pub name: String,
    pub functions: Vec<ParseFunction>,
    pub matchers: Vec<TokenMatcher>,
    pub hook_sites: Vec<HookSite>,
    pub layouts: Vec<Arc<RecordLayout>>,
    pub parsers: Vec<ParserDefinition>,
    pub external_hooks: Vec<ExternalHook>,
}

impl ParserModule {
    pub fn function(&self, id: FuncId) -> &ParseFunction {
        &self.functions[id.index()]
    }

    pub fn matcher(&self, id: MatcherId) -> &TokenMatcher {
        &self.matchers[id.index()]
    }

    pub fn hook_site(&self, id: HookSiteId) -> &HookSite {
        &self.hook_sites[id.index()]
    }

    pub fn layout(&self, id: LayoutId) -> &Arc<RecordLayout> {
        &self.layouts[id.index()]
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .and_then(|i| u32::try_from(i).ok())
            .map(FuncId::new)
    }

    pub fn find_parser(&self, name: &str) -> Option<&ParserDefinition> {
        self.parsers.iter().find(|p| p.name == name)
    }

    pub fn find_hook_site(&self, name: &str, foreach: bool) -> Option<HookSiteId> {
        self.hook_sites
            .iter()
            .position(|s| s.name == name && s.foreach == foreach)
            .and_then(|i| u32::try_from(i).ok())
            .map(HookSiteId::new)
    }
}
