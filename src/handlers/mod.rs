pub mod raffle;

pub use raffle::raffle_config;
