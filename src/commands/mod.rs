pub mod backup;
pub mod settings;
pub mod stats;
pub mod trades;

#[cfg(test)]
pub(crate) mod test_support;

pub use backup::*;
pub use settings::*;
pub use stats::*;
pub use trades::*;
