pub mod avatar;
pub mod user;

pub use avatar::*;
pub use user::*;
