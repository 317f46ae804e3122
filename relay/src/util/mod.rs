//! Process-level helpers.

pub mod hostname;
pub mod shutdown;

pub use hostname::local_hostname;
pub use shutdown::shutdown_signal;
