//! Tree-walking evaluator and the runtime values it produces.

#[allow(clippy::module_inception)]
mod eval;
mod value;

pub use self::eval::Eval;
pub use self::value::{Callable, Tuple, Value};
