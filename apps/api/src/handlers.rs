//! HTTP handlers grouped by resource.

pub mod auth;
pub mod channels;
pub mod invites;
pub mod members;
pub mod messages;
pub mod roles;
pub mod search;
pub mod server;
pub mod uploads;
pub mod users;
pub mod verify_page;
