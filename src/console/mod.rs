// Console module - operator command surface over the executor, evaluator and inspector

pub mod bindings;
pub mod command;
pub mod config;
pub mod error;
pub mod facade;
pub mod sink;

pub use command::ConsoleCommand;
pub use config::DaemonConfig;
pub use error::{ConsoleError, Result, ValidationError};
pub use facade::{Console, validate_terminal};
pub use sink::{ChannelSink, NullSink, ReplySink};
