//! Applications shipped with the runtime.

pub mod fanout;

pub use fanout::FanoutApp;
