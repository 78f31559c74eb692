use pac_ir::ByteOrder;

/// Parser builder settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Emit `Debug` instructions at unit entry and field commits.
    pub debug: bool,
    /// Byte order for fields and units that specify none.
    pub byte_order: ByteOrder,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            debug: false,
            byte_order: ByteOrder::NETWORK,
        }
    }
}

impl CodegenOptions {
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }
}
