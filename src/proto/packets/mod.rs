//! Concrete packet types, grouped by the connection state they belong to.
//! Only packets a handler in [`crate::proxy::handlers`] touches, or that
//! drive a state transition, get a struct here — everything else is
//! forwarded byte-exact by the factory's default path.

pub mod configuration;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;
