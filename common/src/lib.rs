pub mod aggregate;
pub mod chart;
pub mod chunk;
pub mod config;
pub mod result;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * 1024;
