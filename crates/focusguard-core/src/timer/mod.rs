mod oneshot;

pub use oneshot::{OneShot, TimerToken};
