#![forbid(unsafe_code)]

pub mod model;
pub mod time;
pub mod unlock;
pub mod xp;

pub use time::Clock;
