pub mod api;
pub mod preferences;

pub use api::*;
pub use preferences::Preferences;
