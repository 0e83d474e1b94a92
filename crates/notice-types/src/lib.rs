//! Wire types shared by the noticeboard API and its clients.

pub mod api;
pub mod events;
pub mod models;
