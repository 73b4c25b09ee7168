pub mod user;
pub mod booking;
pub mod payment;
pub mod review;

pub use user::*;
pub use booking::*;
pub use payment::*;
pub use review::*;
