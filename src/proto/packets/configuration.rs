//! Configuration-state packets relevant to the state machine.
//! The configuration phase exchanges a great deal of data (registries,
//! resource packs, feature flags) that the proxy never needs to interpret;
//! only the two boundary packets that drive the state machine are modeled
//! here. Everything else in this state falls through the factory's
//! "no match" path and is forwarded byte-exact without being logged in
//! structured form.

use crate::error::Result;
use crate::proto::packet::{ClientboundPacket, Packet, ServerboundPacket};
use std::io::{Read, Write};

/// `FinishConfiguration` (clientbound) — the server signals it is done
/// sending configuration data.
#[derive(Debug, Clone, Default)]
pub struct ClientboundFinishConfigurationPacket;

impl Packet for ClientboundFinishConfigurationPacket {
    const ID: i32 = 0x03;

    fn read<R: Read>(_reader: &mut R) -> Result<Self> {
        Ok(ClientboundFinishConfigurationPacket)
    }

    fn write<W: Write>(&self, _writer: &mut W) -> Result<()> {
        Ok(())
    }
}

impl ClientboundPacket for ClientboundFinishConfigurationPacket {}

/// `FinishConfiguration` (serverbound) — the client's acknowledgement,
/// which transitions `Configuration -> Play`.
#[derive(Debug, Clone, Default)]
pub struct ServerboundFinishConfigurationPacket;

impl Packet for ServerboundFinishConfigurationPacket {
    const ID: i32 = 0x03;

    fn read<R: Read>(_reader: &mut R) -> Result<Self> {
        Ok(ServerboundFinishConfigurationPacket)
    }

    fn write<W: Write>(&self, _writer: &mut W) -> Result<()> {
        Ok(())
    }
}

impl ServerboundPacket for ServerboundFinishConfigurationPacket {}

/// `ConfigurationAcknowledged` (serverbound, Play state) — the client asks
/// to re-enter Configuration (e.g. for a server-initiated reconfigure).
#[derive(Debug, Clone, Default)]
pub struct ServerboundConfigurationAcknowledgedPacket;

impl Packet for ServerboundConfigurationAcknowledgedPacket {
    const ID: i32 = 0x0B;

    fn read<R: Read>(_reader: &mut R) -> Result<Self> {
        Ok(ServerboundConfigurationAcknowledgedPacket)
    }

    fn write<W: Write>(&self, _writer: &mut W) -> Result<()> {
        Ok(())
    }
}

impl ServerboundPacket for ServerboundConfigurationAcknowledgedPacket {}
