pub mod common;
pub mod pagination;
pub mod raffle;

pub use common::*;
pub use pagination::*;
pub use raffle::*;
