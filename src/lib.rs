pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod meetings;
pub mod notifications;
pub mod payments;
pub mod repository;
pub mod service;
