//! Command implementations.

pub mod clear;
pub mod init;
pub mod run;
pub mod status;

pub use self::clear::execute_clear;
pub use self::init::execute_init_config;
pub use self::run::execute_run;
pub use self::status::execute_status;
