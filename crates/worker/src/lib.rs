//! Worker primitives shared by the keel compiler crates.
//!
//! Compilation requests are served concurrently, and some of the work they
//! trigger blocks: filesystem metadata reads for staleness checks and external
//! processes for version commands. Each spawn carries a [`TaskClass`] for
//! scheduling and tracing.

mod class;
mod spawn;

pub use class::TaskClass;
pub use spawn::{block_on, spawn_blocking};

#[cfg(test)]
mod tests;
