pub mod logging;

pub use logging::short_key;
