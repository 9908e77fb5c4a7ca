pub mod raffle_activities;
pub mod raffle_participants;
pub mod raffle_prize_lines;
pub mod raffle_winners;

pub use raffle_activities::ActivityState;
pub use raffle_activities as activity_entity;
pub use raffle_participants as participant_entity;
pub use raffle_prize_lines as prize_line_entity;
pub use raffle_winners as winner_entity;
