//! Validation of instance documents against a compiled schema.
//!
//! A compiled program tree is bound once into a [`ValidationProgram`],
//! wrapped in a [`Validator`] and cached per compiler in a
//! [`ValidatorCache`]. Each run produces a [`ValidationResult`] with the
//! findings and an SVRL rendering of them.

pub mod cache;
pub mod program;
pub mod report;
pub mod validator;

pub use cache::ValidatorCache;
pub use program::{Binding, Check, CheckKind, MessagePart, PatternProgram, RuleProgram, ValidationProgram};
pub use report::{location, Finding, FiredRule, ValidationResult, SVRL_NS};
pub use validator::Validator;
