//! Built-in validators

mod correctness;
mod safety;

pub use correctness::CorrectnessValidator;
pub use safety::SafetyValidator;
