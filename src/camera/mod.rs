pub mod capture;
pub mod player;

pub use capture::{encode_snapshot, CoachCamera, ThreadedCamera};
pub use player::VideoLooper;
