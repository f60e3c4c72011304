// src/models/mod.rs
pub mod report;
pub mod ride;
pub mod user;

pub use report::*;
pub use ride::*;
pub use user::*;
