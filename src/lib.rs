// Purpose: Define crate-level module surface for the translator and tooling components.
// Inputs/Outputs: Re-exports internal modules for binaries and integration tests.
// Invariants: Public module boundaries should remain stable for internal callers.
// Gotchas: Keep module wiring consistent with src/main.rs and src/bin/plc.rs entry paths.

pub mod cli;
pub mod codegen;
pub mod compile;
pub mod frontend;
pub mod manifest;
pub mod sema;
