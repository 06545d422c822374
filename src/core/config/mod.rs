pub mod data;
pub mod io;
pub mod keys;


pub use data::{ApiMode, Config, Settings};
pub use io::ConfigError;
pub use keys::ConfigKeyError;
