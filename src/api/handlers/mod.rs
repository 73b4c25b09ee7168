pub mod admin;
pub mod auth;
pub mod bookings;
pub mod payments;
pub mod root;
pub mod tutors;
