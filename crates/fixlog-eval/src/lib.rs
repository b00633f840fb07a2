//! Evaluation engine for fixlog
//!
//! Hosts the program builder, the tree-walking interpreter, the staged
//! executor with its three surfaces (tree generation, specialization,
//! execution), and the semi-naive driver. Both executors produce
//! identical final IDB state; the staged path exists so compile cost can
//! be measured separately from run cost.

pub mod driver;
pub mod error;
pub mod interpret;
pub mod options;
pub mod program;
pub mod staged;

pub use driver::{Engine, EvalContext};
pub use error::EvalError;
pub use interpret::{EvaluationStats, Interpreter};
pub use options::{Granularity, JitOptions, OnlineSort, SortOrder};
pub use program::Program;
pub use staged::{run_compiled, specialize, Compiled};
