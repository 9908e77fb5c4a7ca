pub mod webhook;

pub use webhook::*;
