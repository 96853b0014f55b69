// cli/src/hw.rs - hardware capabilities the deployment depends on
//
// The loader never talks to a link directly. A platform backend implements
// these traits; `sim` provides an in-memory one.

use std::time::Duration;

use bitflags::bitflags;
use serde::Serialize;
use tileboot_abi::TileId;

use crate::error::{HwError, HwResult};

/// Context id used for endpoints owned by no activity (privileged).
pub const CTX_PRIV: u16 = 0xFFFF;

bitflags! {
    /// Control-unit feature switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features: u32 {
        const PRIV  = 1 << 0;
        const VM    = 1 << 1;
        const CTXSW = 1 << 2;
    }
}

impl Features {
    pub fn for_deployment(vm: bool) -> Self {
        let mut features = Self::PRIV;
        features.set(Self::VM | Self::CTXSW, vm);
        features
    }
}

bitflags! {
    /// Access rights of a memory endpoint.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perm: u8 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// Memory endpoint granting a tile access to a range of another tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemWindow {
    pub tile: TileId,
    pub ctx: u16,
    pub perm: Perm,
    pub base: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Invalid,
    Memory(MemWindow),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketCounters {
    pub dropped: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlitCounters {
    pub dropped: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Command history of the tile's control unit
    TcuCommands,
    /// Retired-instruction trace of the core
    Instructions,
}

impl LogKind {
    pub const ALL: [LogKind; 2] = [LogKind::TcuCommands, LogKind::Instructions];

    pub fn file_name(self, pe: usize) -> String {
        match self {
            LogKind::TcuCommands => format!("pm{}-tcu-cmds.log", pe),
            LogKind::Instructions => format!("pm{}-instrs.log", pe),
        }
    }
}

/// Outcome of a single console receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Data(Vec<u8>),
    Timeout,
}

/// Shared memory of the DRAM tile, addressed by byte offset.
pub trait SharedMemory {
    fn tile(&self) -> TileId;

    fn write(&mut self, offset: u64, data: &[u8]) -> HwResult<()>;

    fn read(&mut self, offset: u64, len: usize) -> HwResult<Vec<u8>>;

    /// Writes `data` and reads it back; the upload only counts if both match.
    fn write_checked(&mut self, offset: u64, data: &[u8]) -> HwResult<()> {
        self.write(offset, data)?;
        let back = self.read(offset, data.len())?;
        if back != data {
            return Err(HwError::WriteMismatch { offset, len: data.len() });
        }
        Ok(())
    }

    fn write_u64(&mut self, offset: u64, value: u64) -> HwResult<()> {
        self.write(offset, &value.to_le_bytes())
    }
}

/// Control access to one compute tile.
pub trait CoreTile {
    /// Holds the core in reset.
    fn halt(&mut self) -> HwResult<()>;

    /// Releases the core so it starts executing at its reset vector.
    fn start(&mut self) -> HwResult<()>;

    /// Clears the command log and resets the control-unit registers except
    /// features and endpoints.
    fn reset(&mut self) -> HwResult<()>;

    fn enable_trace(&mut self) -> HwResult<()>;

    fn set_features(&mut self, features: Features) -> HwResult<()>;

    fn set_endpoint(&mut self, slot: usize, ep: Endpoint) -> HwResult<()>;

    /// Switches the retransmitting (ARQ) mode of the tile's NoC link.
    fn set_transport_enabled(&mut self, enabled: bool) -> HwResult<()>;

    fn set_transport_timeout(&mut self, cycles: u32) -> HwResult<()>;

    fn packet_counters(&mut self) -> HwResult<PacketCounters>;

    fn flit_counters(&mut self) -> HwResult<FlitCounters>;

    /// Reads a log. Without `exhaustive` only the entries since the last
    /// read are returned, which fails if the log state is inconsistent.
    fn read_log(&mut self, kind: LogKind, exhaustive: bool) -> HwResult<Vec<String>>;
}

pub trait ConsoleLink {
    /// Blocks for at most `timeout` waiting for console output.
    fn receive(&mut self, timeout: Duration) -> HwResult<Received>;
}

/// A connected platform: compute tiles, the shared DRAM tile and the host link.
pub trait Platform: ConsoleLink {
    type Core: CoreTile;
    type Memory: SharedMemory;

    /// Resets every tile of the platform.
    fn system_reset(&mut self) -> HwResult<()>;

    /// Switches ARQ on the memory tiles and the host link.
    fn set_fabric_transport(&mut self, enabled: bool) -> HwResult<()>;

    fn parts(&mut self) -> (&mut [Self::Core], &mut Self::Memory);

    fn cores(&mut self) -> &mut [Self::Core] {
        self.parts().0
    }

    fn memory(&mut self) -> &mut Self::Memory {
        self.parts().1
    }

    fn core_count(&mut self) -> usize {
        self.cores().len()
    }
}
