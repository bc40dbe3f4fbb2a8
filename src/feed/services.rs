pub mod reaper;

pub use reaper::reaper;
