pub mod codegen;

/// Name of the generated entry routine, the symbol the execution engine
/// looks up after compilation.
pub const ENTRY: &str = "bf";
