//! Component C: the per-socket read/write pump (see [`connection::Connection`]).

pub mod connection;

pub use connection::Connection;
