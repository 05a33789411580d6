//! Engine limits.

/// Immutable per-engine bounds. Exceeding any of them faults execution.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionEngineLimits {
    /// Longest loadable script, in bytes.
    pub max_script_length: usize,
    /// Largest single item, in bytes.
    pub max_item_size: usize,
    /// Stack-slot budget tracked by the reference counter.
    pub max_stack_size: usize,
    /// Deepest invocation stack.
    pub max_invocation_nesting: usize,
    /// Deepest exception-frame nesting per context.
    pub max_try_nesting: usize,
    /// Longest comparable byte strings (EQUAL / NOTEQUAL).
    pub max_comparable_size: usize,
}

impl Default for ExecutionEngineLimits {
    fn default() -> Self {
        Self {
            max_script_length: u16::MAX as usize,
            max_item_size: 1024 * 1024,
            max_stack_size: 2048,
            max_invocation_nesting: 1024,
            max_try_nesting: 16,
            max_comparable_size: 32 * 1024,
        }
    }
}
