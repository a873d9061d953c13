//! Proxy core (component D) and the Minecraft-specific protocol pipeline
//! built on top of it (components E/F).

pub mod base;
pub mod handlers;
pub mod minecraft;

pub use base::{ProcessData, ProxyContext, ProxyCore};
pub use minecraft::MinecraftProxy;
