//! Data models for center entities

mod course;
mod group;
mod lesson;
mod user;

pub use course::*;
pub use group::*;
pub use lesson::*;
pub use user::*;
