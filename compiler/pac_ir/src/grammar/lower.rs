//! Unit type → grammar lowering.

use smallvec::SmallVec;

use super::{
    Grammar, GrammarBuilder, LiteralValue, LoopExit, ProductionId, ProductionKind, SwitchArm,
};
use crate::expr::Constant;
use crate::stack::ensure_sufficient_stack;
use crate::types::{AtomicType, ByteOrder, ParseType};
use crate::unit::{Ctor, Field, FieldKind, Repeat, SwitchField, UnitType};
use crate::StringInterner;

/// A unit that cannot be turned into a grammar.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("{path}: integer constant needs a type")]
    UntypedConstant { path: String },

    #[error("{path}: constant {value} does not fit {ty:?}")]
    ConstantOutOfRange {
        path: String,
        value: String,
        ty: AtomicType,
    },

    #[error("{path}: switch fields cannot repeat")]
    RepeatedSwitch { path: String },

    #[error("{path}: sink `{sink}` is not declared by the unit")]
    UnknownSink { path: String, sink: String },

    #[error("{path}: only bytes fields can feed a sink")]
    SinkOnNonBytes { path: String },

    #[error("{path}: `&convert` applies only to values read from the input")]
    ConvertOnNonTerminal { path: String },
}

impl Grammar {
    /// Lower a unit type into its grammar.
    ///
    /// Multi-byte values use the field's byte order, else the unit's
    /// `%byteorder`, else `default_order`.
    pub fn from_unit(
        unit: &UnitType,
        interner: &StringInterner,
        default_order: ByteOrder,
    ) -> Result<Grammar, GrammarError> {
        let name = interner.lookup(unit.name);
        let mut lowerer = Lowerer {
            unit,
            interner,
            unit_name: name,
            unit_order: unit.byte_order().unwrap_or(default_order),
            builder: GrammarBuilder::new(unit.name, name),
            anonymous: 0,
        };
        let mut items = Vec::new();
        for field in unit.fields() {
            items.push(lowerer.lower_field(field)?);
        }
        let root = lowerer
            .builder
            .add(ProductionKind::Sequence(items), name, None);
        tracing::trace!(unit = name, "lowered unit grammar");
        Ok(lowerer.builder.finish(root))
    }
}

struct Lowerer<'a> {
    unit: &'a UnitType,
    interner: &'a StringInterner,
    unit_name: &'static str,
    unit_order: ByteOrder,
    builder: GrammarBuilder,
    anonymous: u32,
}

impl Lowerer<'_> {
    fn symbol(&mut self, field: &Field) -> String {
        match field.name {
            Some(name) => format!("{}::{}", self.unit_name, self.interner.lookup(name)),
            None => {
                self.anonymous += 1;
                format!("{}::<anon{}>", self.unit_name, self.anonymous)
            }
        }
    }

    fn lower_field(&mut self, field: &Field) -> Result<ProductionId, GrammarError> {
        ensure_sufficient_stack(|| {
            let symbol = self.symbol(field);
            let order = field.byte_order.unwrap_or(self.unit_order);
            self.check_sink(field, &symbol)?;

            let mut id = match &field.repeat {
                None => self.lower_kind(field, &symbol, order)?,
                Some(repeat) => {
                    if matches!(field.kind, FieldKind::Switch(_)) {
                        return Err(GrammarError::RepeatedSwitch { path: symbol });
                    }
                    // The element commits to the container's field; the parser
                    // builder disables storage while it runs.
                    let body = self.lower_kind(field, &format!("{symbol}[]"), order)?;
                    let kind = match repeat {
                        Repeat::Count(count) => ProductionKind::Counter {
                            count: count.clone(),
                            body,
                        },
                        Repeat::While(cond) => ProductionKind::While {
                            cond: cond.clone(),
                            body,
                        },
                        Repeat::UntilEod => ProductionKind::Loop {
                            body,
                            exit: LoopExit::EndOfData,
                        },
                        Repeat::Lookahead => ProductionKind::Loop {
                            body,
                            exit: LoopExit::Lookahead,
                        },
                    };
                    self.builder.add(kind, symbol.clone(), field.name)
                }
            };

            if let Some(cond) = &field.condition {
                id = self.builder.add(
                    ProductionKind::Boolean {
                        cond: cond.clone(),
                        then: id,
                        otherwise: None,
                    },
                    format!("{symbol}?"),
                    None,
                );
            }
            Ok(id)
        })
    }

    fn check_sink(&self, field: &Field, symbol: &str) -> Result<(), GrammarError> {
        let Some(sink) = field.sink else {
            return Ok(());
        };
        if !self.unit.sinks().any(|s| s.name == sink) {
            return Err(GrammarError::UnknownSink {
                path: symbol.to_owned(),
                sink: self.interner.lookup(sink).to_owned(),
            });
        }
        if !matches!(field.kind, FieldKind::Ctor(Ctor::Blob(_))) {
            return Err(GrammarError::SinkOnNonBytes {
                path: symbol.to_owned(),
            });
        }
        Ok(())
    }

    fn lower_kind(
        &mut self,
        field: &Field,
        symbol: &str,
        order: ByteOrder,
    ) -> Result<ProductionId, GrammarError> {
        let slot = field.name;
        let id = match &field.kind {
            FieldKind::Constant { value, ty } => {
                let value = self.constant_literal(value, *ty, order, symbol)?;
                self.builder.literal(value, symbol, slot)
            }
            FieldKind::Ctor(Ctor::Bytes(bytes)) => {
                self.builder
                    .literal(LiteralValue::Bytes(bytes.clone()), symbol, slot)
            }
            FieldKind::Ctor(Ctor::RegExp(re)) => {
                self.builder
                    .literal(LiteralValue::RegExp(re.clone()), symbol, slot)
            }
            FieldKind::Ctor(Ctor::Blob(length)) => self.builder.add(
                ProductionKind::Variable {
                    ty: ParseType::Bytes(length.clone()),
                    byte_order: order,
                    sink: field.sink,
                },
                symbol,
                slot,
            ),
            FieldKind::AtomicType(ty) => self.builder.add(
                ProductionKind::Variable {
                    ty: ParseType::Atomic(*ty),
                    byte_order: order,
                    sink: None,
                },
                symbol,
                slot,
            ),
            FieldKind::Unit { unit, args } => self.builder.add(
                ProductionKind::ChildGrammar {
                    unit: *unit,
                    args: args.clone(),
                },
                symbol,
                slot,
            ),
            FieldKind::Switch(switch) => self.lower_switch(switch, symbol)?,
        };
        if let Some(filter) = &field.convert {
            if !self.builder.is_terminal(id) {
                return Err(GrammarError::ConvertOnNonTerminal {
                    path: symbol.to_owned(),
                });
            }
            self.builder.set_filter(id, filter.clone());
        }
        Ok(id)
    }

    fn constant_literal(
        &self,
        value: &Constant,
        ty: Option<AtomicType>,
        order: ByteOrder,
        symbol: &str,
    ) -> Result<LiteralValue, GrammarError> {
        let ty = match (value, ty) {
            (Constant::Bytes(bytes), _) => return Ok(LiteralValue::Bytes(bytes.clone())),
            (_, Some(ty)) => ty,
            (Constant::Bool(_), None) => AtomicType::Bool,
            (_, None) => {
                return Err(GrammarError::UntypedConstant {
                    path: symbol.to_owned(),
                })
            }
        };
        let encoded = ty
            .encode(value, order)
            .ok_or_else(|| GrammarError::ConstantOutOfRange {
                path: symbol.to_owned(),
                value: format!("{value:?}"),
                ty,
            })?;
        Ok(LiteralValue::Integer {
            value: value.clone(),
            ty,
            order: order.concrete(),
            encoded,
        })
    }

    fn lower_switch(
        &mut self,
        switch: &SwitchField,
        symbol: &str,
    ) -> Result<ProductionId, GrammarError> {
        let mut cases = Vec::with_capacity(switch.cases.len());
        for (i, case) in switch.cases.iter().enumerate() {
            let body = self.lower_case(&case.fields, &format!("{symbol}#{i}"))?;
            cases.push(SwitchArm {
                values: case.values.iter().cloned().collect::<SmallVec<_>>(),
                body,
            });
        }
        let default = match &switch.default {
            Some(fields) => Some(self.lower_case(fields, &format!("{symbol}#default"))?),
            None => None,
        };
        Ok(self.builder.add(
            ProductionKind::Switch {
                discriminant: switch.discriminant.clone(),
                cases,
                default,
            },
            symbol,
            None,
        ))
    }

    fn lower_case(&mut self, fields: &[Field], symbol: &str) -> Result<ProductionId, GrammarError> {
        if fields.is_empty() {
            return Ok(self.builder.add(ProductionKind::Epsilon, symbol, None));
        }
        let mut items = Vec::with_capacity(fields.len());
        for field in fields {
            items.push(self.lower_field(field)?);
        }
        Ok(self
            .builder
            .add(ProductionKind::Sequence(items), symbol, None))
    }
}
