pub mod team;
pub mod user;

pub use team::*;
pub use user::*;
