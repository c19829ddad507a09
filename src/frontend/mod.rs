// Purpose: Frontend module hub that wires the collector and diagnostics together.
// Inputs/Outputs: Exposes frontend components used by the translation pipeline and tests.
// Invariants: Public frontend API should remain a thin composition over specialized modules.
// Gotchas: Keep exports minimal to avoid leaking collector-internal contracts.

pub mod ast;
pub mod collector;
pub mod diagnostic;
pub mod suggest;
