//! Parse IR: the basic-block target the parser builder emits.
//!
//! This is the imperative-code API generated parsers are written against:
//! allocate a record, test availability, read or unpack bytes, compare,
//! branch, call a sub-procedure, run hooks, feed sinks, raise an error.
//!
//! - **[`ParseFunction`]**: parameters, blocks, variable count
//! - **[`Block`]**: block parameters, body instructions, terminator
//! - **[`Instr`]**: one instruction, most bind a [`VarId`]
//! - **[`Terminator`]**: block exit, including [`Terminator::Yield`], the
//!   suspension point
//!
//! The cursor into the input is implicit: every instruction that reads
//! input reads at the cursor and advances it. A `Yield` suspends the whole
//! invocation; resuming re-enters the `resume` block of the innermost frame
//! with all locals intact.

use pac_ir::{AtomicType, BinaryOp, ByteOrder, Constant, UnaryOp};
use smallvec::SmallVec;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_newtype!(
    /// Variable within a [`ParseFunction`].
    VarId
);
id_newtype!(
    /// Basic block within a [`ParseFunction`].
    BlockId
);
id_newtype!(
    /// Function within a [`ParserModule`](crate::ParserModule).
    FuncId
);
id_newtype!(
    /// Token matcher within a module.
    MatcherId
);
id_newtype!(
    /// Hook site within a module.
    HookSiteId
);
id_newtype!(
    /// Record layout within a module.
    LayoutId
);
id_newtype!(
    /// Suspension point within a function.
    ResumeLabel
);

/// Convert a collection length to a `u32` id component.
pub(crate) fn to_u32(n: usize, what: &str) -> u32 {
    u32::try_from(n).unwrap_or_else(|_| panic!("{what} count exceeds u32::MAX"))
}

/// Codes written by [`Instr::MatchToken`] into its `alt` variable when no
/// alternative matched.
pub mod match_code {
    /// The matcher needs more input.
    pub const NEED_MORE: i64 = -1;
    /// No alternative can match.
    pub const NO_MATCH: i64 = -2;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lit {
    Null,
    UInt(u64),
    SInt(i64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl From<&Constant> for Lit {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::UInt(v) => Lit::UInt(*v),
            Constant::SInt(v) => Lit::SInt(*v),
            Constant::Bool(b) => Lit::Bool(*b),
            Constant::Bytes(b) => Lit::Bytes(b.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Binary(BinaryOp),
    Unary(UnaryOp),
}

/// Right-hand side of [`Instr::Let`]. Side-effect free.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Var(VarId),
    Literal(Lit),
    PrimOp { op: PrimOp, args: SmallVec<[VarId; 2]> },
}

/// Run-time failures a generated parser can raise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailKind {
    UnmatchedAlternative,
    ConstantMismatch,
    UnexpectedEndOfInput,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instr {
    Let {
        dst: VarId,
        value: Value,
    },

    /// Allocate the frame's record.
    AllocRecord {
        layout: LayoutId,
    },
    /// Move the frame's record into `dst`.
    FinishRecord {
        dst: VarId,
    },
    Load {
        dst: VarId,
        slot: u32,
    },
    Store {
        slot: u32,
        value: VarId,
    },
    /// Set a container slot to the empty list.
    InitList {
        slot: u32,
    },
    /// Append to the list in a container slot.
    Append {
        slot: u32,
        value: VarId,
    },

    /// Current cursor offset.
    Offset {
        dst: VarId,
    },
    /// Whether `len` bytes are available at the cursor.
    Available {
        dst: VarId,
        len: VarId,
    },
    /// Whether the input is frozen (no more bytes will arrive).
    Frozen {
        dst: VarId,
    },
    /// Consume `ty.width()` bytes and decode them.
    Unpack {
        dst: VarId,
        ty: AtomicType,
        order: ByteOrder,
    },
    /// Consume `len` bytes.
    ReadBytes {
        dst: VarId,
        len: VarId,
    },
    /// Offset of `delim` relative to the cursor, or -1. Consumes nothing.
    FindDelim {
        dst: VarId,
        delim: Vec<u8>,
    },
    /// Consume everything up to the end of the input.
    ReadRest {
        dst: VarId,
    },
    Skip {
        len: VarId,
    },
    /// Run a token matcher at the cursor without consuming. `alt` receives
    /// the alternative or a [`match_code`], `len` the match length.
    MatchToken {
        alt: VarId,
        len: VarId,
        matcher: MatcherId,
    },

    /// Call a parse function on the same input; the frame stack grows by one.
    Call {
        dst: VarId,
        func: FuncId,
        args: SmallVec<[VarId; 4]>,
    },
    /// Run the hooks of a site. `value` is the hook's `$$`; for `foreach`
    /// sites `stop` receives whether a hook asked to stop.
    RunHooks {
        site: HookSiteId,
        value: Option<VarId>,
        stop: Option<VarId>,
    },

    /// Start a sink-fed parse of `func` on a fresh input.
    SinkConnect {
        sink: u32,
        func: FuncId,
    },
    SinkWrite {
        sink: u32,
        data: VarId,
    },
    /// Freeze the sink's input, finish its parse, bind its record.
    SinkClose {
        dst: VarId,
        sink: u32,
    },

    /// Report through the target's debug log.
    Debug {
        message: String,
        value: Option<VarId>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Terminator {
    Return {
        value: VarId,
    },
    Jump {
        target: BlockId,
        args: SmallVec<[VarId; 2]>,
    },
    Branch {
        cond: VarId,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Multi-way branch on equality with literals.
    Switch {
        scrutinee: VarId,
        cases: Vec<(Lit, BlockId)>,
        default: BlockId,
    },
    /// Suspend: hand control back to the caller until more input arrives,
    /// then continue at `resume`.
    Yield {
        label: ResumeLabel,
        resume: BlockId,
    },
    /// Raise a parse error. `offset` defaults to the cursor.
    Fail {
        kind: FailKind,
        path: String,
        message: String,
        offset: Option<VarId>,
    },
    Unreachable,
}

impl Terminator {
    /// Successor blocks, in order.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::Jump { target, .. } => SmallVec::from_elem(*target, 1),
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => SmallVec::from_slice(&[*then_block, *else_block]),
            Terminator::Switch { cases, default, .. } => cases
                .iter()
                .map(|(_, b)| *b)
                .chain(std::iter::once(*default))
                .collect(),
            Terminator::Yield { resume, .. } => SmallVec::from_elem(*resume, 1),
            Terminator::Return { .. } | Terminator::Fail { .. } | Terminator::Unreachable => {
                SmallVec::new()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pub id: BlockId,
    pub params: Vec<VarId>,
    pub body: Vec<Instr>,
    pub terminator: Terminator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// A unit's parse procedure.
    Core,
    /// Host wrapper: parameters come from the caller.
    Host,
    /// Sink wrapper: parameters take their defaults.
    Sink,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParseFunction {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<VarId>,
    pub blocks: Vec<Block>,
    pub entry: BlockId,
    pub num_vars: u32,
    pub num_sinks: u32,
    /// Suspension points in this function.
    pub num_labels: u32,
    /// `%error` hooks to run when a parse error unwinds this frame.
    pub error_site: Option<HookSiteId>,
}

impl ParseFunction {
    /// Empty function standing in for a reserved id.
    pub(crate) fn placeholder(name: String, kind: FunctionKind) -> Self {
        ParseFunction {
            name,
            kind,
            params: Vec::new(),
            blocks: Vec::new(),
            entry: BlockId::new(0),
            num_vars: 0,
            num_sinks: 0,
            num_labels: 0,
            error_site: None,
        }
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Every instruction, in block order.
    pub fn instrs(&self) -> impl Iterator<Item = &Instr> {
        self.blocks.iter().flat_map(|b| b.body.iter())
    }

    pub fn terminators(&self) -> impl Iterator<Item = &Terminator> {
        self.blocks.iter().map(|b| &b.terminator)
    }
}
