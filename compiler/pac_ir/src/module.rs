//! A grammar module: the compilation unit handed to the parser generator.

use crate::hook::Hook;
use crate::unit::UnitType;
use crate::Name;

/// A hook declared by path, e.g. `Http::Request::method` or `Request::%done`.
///
/// Paths naming units of another module are external hooks: they are
/// compiled as call obligations and linked by name against that module.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleHook {
    pub path: String,
    pub hook: Hook,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub name: Name,
    pub units: Vec<UnitType>,
    pub hooks: Vec<ModuleHook>,
}

impl Module {
    pub fn new(name: Name) -> Self {
        Module {
            name,
            units: Vec::new(),
            hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn unit(mut self, unit: UnitType) -> Self {
        self.units.push(unit);
        self
    }

    #[must_use]
    pub fn hook(mut self, path: impl Into<String>, hook: Hook) -> Self {
        self.hooks.push(ModuleHook {
            path: path.into(),
            hook,
        });
        self
    }

    pub fn find_unit(&self, name: Name) -> Option<&UnitType> {
        self.units.iter().find(|u| u.name == name)
    }
}
