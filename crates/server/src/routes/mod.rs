mod catalog;
mod health;
mod performance;
pub mod sse;
mod tasks;
mod ws;

pub use catalog::*;
pub use health::*;
pub use performance::*;
pub use tasks::*;
pub use ws::*;
