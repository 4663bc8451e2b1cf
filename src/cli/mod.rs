pub(crate) mod command;
pub(crate) mod discover;
pub(crate) mod print;
pub(crate) mod serve;
pub(crate) mod status;
pub(crate) mod ui;

pub use self::command::{Args, Command, LogLevel, MockArgs, OutputFormat, PrintArgs};
