// Connect Module
// Argument parsing and the connect functions built on it.

pub mod driver_manager;
pub mod function;
pub mod parser;
pub mod spec;

pub use driver_manager::{DriverManager, DriverManagerConnect};
pub use function::{load_driver, ConnectFunction};
pub use parser::{ArgumentBag, ArgumentParser, CallArgs};
pub use spec::{ArgType, ArgumentSchema, ArgumentSpec};
