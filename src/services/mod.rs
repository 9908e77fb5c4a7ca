pub mod allocator;
pub mod lifecycle;
pub mod notifier;
pub mod raffle_service;
pub mod registry;
pub mod scheduler;

pub use allocator::{Allocation, allocate};
pub use lifecycle::LifecycleAction;
pub use notifier::{CompositeNotifier, LogNotifier, RaffleNotifier};
pub use raffle_service::*;
pub use registry::ParticipantRegistry;
pub use scheduler::{DrawOutcome, DrawScheduler, RecoveryReport, ScheduleOutcome};
