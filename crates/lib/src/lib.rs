//! LINE → Dify relay library: webhook verification, event handling, the LINE and Dify
//! clients, and the gateway that ties them together.

pub mod analysis;
pub mod channels;
pub mod chunk;
pub mod config;
pub mod gateway;
pub mod handler;
pub mod init;
