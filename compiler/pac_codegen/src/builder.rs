//! In-progress parse function construction.

use pac_ir::{AtomicType, BinaryOp, ByteOrder, UnaryOp};
use smallvec::SmallVec;

use crate::ir::{
    to_u32, Block, BlockId, FailKind, FuncId, FunctionKind, HookSiteId, Instr, LayoutId, Lit,
    MatcherId, ParseFunction, PrimOp, ResumeLabel, Terminator, Value, VarId,
};

struct BlockBuilder {
    id: BlockId,
    params: Vec<VarId>,
    body: Vec<Instr>,
    terminator: Option<Terminator>,
}

impl BlockBuilder {
    fn new(id: BlockId) -> Self {
        Self {
            id,
            params: Vec::new(),
            body: Vec::new(),
            terminator: None,
        }
    }
}

/// Builder for one [`ParseFunction`].
///
/// Position at a block, emit instructions, terminate; repeat. Blocks take
/// parameters instead of phi nodes.
pub struct IrBuilder {
    blocks: Vec<BlockBuilder>,
    current_block: BlockId,
    next_var: u32,
    next_label: u32,
    params: Vec<VarId>,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IrBuilder {
    /// Create a builder with the entry block allocated and current.
    pub fn new() -> Self {
        Self {
            blocks: vec![BlockBuilder::new(BlockId::new(0))],
            current_block: BlockId::new(0),
            next_var: 0,
            next_label: 0,
            params: Vec::new(),
        }
    }

    // Blocks

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(to_u32(self.blocks.len(), "block"));
        self.blocks.push(BlockBuilder::new(id));
        id
    }

    pub fn position_at(&mut self, block: BlockId) {
        debug_assert!(
            block.index() < self.blocks.len(),
            "BlockId {} out of bounds (have {} blocks)",
            block.raw(),
            self.blocks.len(),
        );
        self.current_block = block;
    }

    #[inline]
    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current_block.index()].terminator.is_some()
    }

    /// Terminate the current block with a jump to a fresh block and continue
    /// there. Returns the new block; it is a valid resume target.
    pub fn split(&mut self) -> BlockId {
        let next = self.new_block();
        self.terminate_jump(next, SmallVec::new());
        self.position_at(next);
        next
    }

    // Variables

    pub fn fresh_var(&mut self) -> VarId {
        let id = VarId::new(self.next_var);
        self.next_var += 1;
        id
    }

    /// Add a function parameter.
    pub fn add_param(&mut self) -> VarId {
        let var = self.fresh_var();
        self.params.push(var);
        var
    }

    pub fn add_block_param(&mut self, block: BlockId) -> VarId {
        let var = self.fresh_var();
        self.blocks[block.index()].params.push(var);
        var
    }

    // Instructions

    /// Append an instruction that binds nothing.
    pub fn emit(&mut self, instr: Instr) {
        let block = &mut self.blocks[self.current_block.index()];
        debug_assert!(
            block.terminator.is_none(),
            "emitting into terminated block {}",
            self.current_block.raw()
        );
        block.body.push(instr);
    }

    fn emit_with_dst(&mut self, make: impl FnOnce(VarId) -> Instr) -> VarId {
        let dst = self.fresh_var();
        self.emit(make(dst));
        dst
    }

    pub fn emit_let(&mut self, value: Value) -> VarId {
        self.emit_with_dst(|dst| Instr::Let { dst, value })
    }

    pub fn emit_lit(&mut self, lit: Lit) -> VarId {
        self.emit_let(Value::Literal(lit))
    }

    pub fn emit_uint(&mut self, value: u64) -> VarId {
        self.emit_lit(Lit::UInt(value))
    }

    pub fn emit_binary(&mut self, op: BinaryOp, lhs: VarId, rhs: VarId) -> VarId {
        self.emit_let(Value::PrimOp {
            op: PrimOp::Binary(op),
            args: SmallVec::from_slice(&[lhs, rhs]),
        })
    }

    pub fn emit_unary(&mut self, op: UnaryOp, operand: VarId) -> VarId {
        self.emit_let(Value::PrimOp {
            op: PrimOp::Unary(op),
            args: SmallVec::from_elem(operand, 1),
        })
    }

    pub fn emit_alloc_record(&mut self, layout: LayoutId) {
        self.emit(Instr::AllocRecord { layout });
    }

    pub fn emit_finish_record(&mut self) -> VarId {
        self.emit_with_dst(|dst| Instr::FinishRecord { dst })
    }

    pub fn emit_load(&mut self, slot: u32) -> VarId {
        self.emit_with_dst(|dst| Instr::Load { dst, slot })
    }

    pub fn emit_store(&mut self, slot: u32, value: VarId) {
        self.emit(Instr::Store { slot, value });
    }

    pub fn emit_offset(&mut self) -> VarId {
        self.emit_with_dst(|dst| Instr::Offset { dst })
    }

    pub fn emit_available(&mut self, len: VarId) -> VarId {
        self.emit_with_dst(|dst| Instr::Available { dst, len })
    }

    pub fn emit_frozen(&mut self) -> VarId {
        self.emit_with_dst(|dst| Instr::Frozen { dst })
    }

    pub fn emit_unpack(&mut self, ty: AtomicType, order: ByteOrder) -> VarId {
        self.emit_with_dst(|dst| Instr::Unpack { dst, ty, order })
    }

    pub fn emit_read_bytes(&mut self, len: VarId) -> VarId {
        self.emit_with_dst(|dst| Instr::ReadBytes { dst, len })
    }

    pub fn emit_find_delim(&mut self, delim: Vec<u8>) -> VarId {
        self.emit_with_dst(|dst| Instr::FindDelim { dst, delim })
    }

    pub fn emit_read_rest(&mut self) -> VarId {
        self.emit_with_dst(|dst| Instr::ReadRest { dst })
    }

    /// Returns `(alt, len)`.
    pub fn emit_match_token(&mut self, matcher: MatcherId) -> (VarId, VarId) {
        let alt = self.fresh_var();
        let len = self.fresh_var();
        self.emit(Instr::MatchToken { alt, len, matcher });
        (alt, len)
    }

    pub fn emit_call(&mut self, func: FuncId, args: SmallVec<[VarId; 4]>) -> VarId {
        self.emit_with_dst(|dst| Instr::Call { dst, func, args })
    }

    /// Returns the stop flag for `foreach` sites.
    pub fn emit_run_hooks(
        &mut self,
        site: HookSiteId,
        value: Option<VarId>,
        foreach: bool,
    ) -> Option<VarId> {
        let stop = foreach.then(|| self.fresh_var());
        self.emit(Instr::RunHooks { site, value, stop });
        stop
    }

    pub fn emit_sink_close(&mut self, sink: u32) -> VarId {
        self.emit_with_dst(|dst| Instr::SinkClose { dst, sink })
    }

    // Terminators

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current_block.index()];
        debug_assert!(
            block.terminator.is_none(),
            "block {} already terminated",
            self.current_block.raw()
        );
        block.terminator = Some(terminator);
    }

    pub fn terminate_return(&mut self, value: VarId) {
        self.terminate(Terminator::Return { value });
    }

    pub fn terminate_jump(&mut self, target: BlockId, args: SmallVec<[VarId; 2]>) {
        self.terminate(Terminator::Jump { target, args });
    }

    pub fn terminate_branch(&mut self, cond: VarId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::Branch {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn terminate_switch(
        &mut self,
        scrutinee: VarId,
        cases: Vec<(Lit, BlockId)>,
        default: BlockId,
    ) {
        self.terminate(Terminator::Switch {
            scrutinee,
            cases,
            default,
        });
    }

    /// Suspend, resuming at `resume`. Allocates a fresh label.
    pub fn terminate_yield(&mut self, resume: BlockId) -> ResumeLabel {
        let label = ResumeLabel::new(self.next_label);
        self.next_label += 1;
        self.terminate(Terminator::Yield { label, resume });
        label
    }

    pub fn terminate_fail(
        &mut self,
        kind: FailKind,
        path: impl Into<String>,
        message: impl Into<String>,
        offset: Option<VarId>,
    ) {
        self.terminate(Terminator::Fail {
            kind,
            path: path.into(),
            message: message.into(),
            offset,
        });
    }

    pub fn terminate_unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    // Finalization

    /// Consume the builder and produce the finished function.
    ///
    /// Unterminated blocks get `Unreachable` (with a tracing warning).
    pub fn finish(
        self,
        name: String,
        kind: FunctionKind,
        num_sinks: u32,
        error_site: Option<HookSiteId>,
    ) -> ParseFunction {
        let blocks = self
            .blocks
            .into_iter()
            .map(|bb| {
                let terminator = bb.terminator.unwrap_or_else(|| {
                    tracing::warn!(
                        function = %name,
                        block = bb.id.raw(),
                        "unterminated block in parse IR, adding Unreachable"
                    );
                    Terminator::Unreachable
                });
                Block {
                    id: bb.id,
                    params: bb.params,
                    body: bb.body,
                    terminator,
                }
            })
            .collect();

        ParseFunction {
            name,
            kind,
            params: self.params,
            blocks,
            entry: BlockId::new(0),
            num_vars: self.next_var,
            num_sinks,
            num_labels: self.next_label,
            error_site,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_and_vars_are_sequential() {
        let mut b = IrBuilder::new();
        let p = b.add_param();
        let next = b.new_block();
        let x = b.emit_uint(1);
        b.terminate_jump(next, SmallVec::new());
        b.position_at(next);
        b.terminate_return(x);
        let f = b.finish("f".into(), FunctionKind::Core, 0, None);

        assert_eq!(p, VarId::new(0));
        assert_eq!(x, VarId::new(1));
        assert_eq!(f.params, vec![p]);
        assert_eq!(f.blocks.len(), 2);
        assert_eq!(f.num_vars, 2);
        assert_eq!(f.block(next).terminator, Terminator::Return { value: x });
    }

    #[test]
    fn yield_labels_are_distinct() {
        let mut b = IrBuilder::new();
        let retry = b.split();
        let l1 = b.terminate_yield(retry);
        let other = b.new_block();
        b.position_at(other);
        let l2 = b.terminate_yield(retry);
        let f = b.finish("f".into(), FunctionKind::Core, 0, None);
        assert_ne!(l1, l2);
        assert_eq!(f.num_labels, 2);
    }

    #[test]
    fn unterminated_blocks_become_unreachable() {
        let mut b = IrBuilder::new();
        let _ = b.new_block();
        b.terminate_unreachable();
        let f = b.finish("f".into(), FunctionKind::Core, 0, None);
        assert!(f
            .terminators()
            .all(|t| matches!(t, Terminator::Unreachable)));
    }
}
