//! PE descriptors.
//!
//! One 64-bit word per tile in the boot-info table and in each environment
//! block:
//!
//! ```text
//!  63            12 11   7 6     3 2    0
//! +----------------+------+-------+------+
//! |    mem size    | 0..0 |  ISA  | type |
//! +----------------+------+-------+------+
//! ```
//!
//! A compute tile with external memory (`CompEmem`) runs with virtual memory
//! and reports a memory size of zero.

use crate::{AbiError, Result};

pub const TYPE_MASK: u64 = 0x7;
pub const ISA_SHIFT: u32 = 3;
pub const ISA_MASK: u64 = 0xF;
pub const RESERVED_MASK: u64 = 0xF80;
pub const MEM_MASK: u64 = !0xFFF;

#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeType {
    /// Compute tile with internal memory
    CompImem = 0,
    /// Compute tile with cache and external memory
    CompEmem = 1,
    /// Memory tile
    Mem = 2,
}

impl TryFrom<u64> for PeType {
    type Error = AbiError;

    fn try_from(raw: u64) -> Result<Self> {
        match raw {
            0 => Ok(Self::CompImem),
            1 => Ok(Self::CompEmem),
            2 => Ok(Self::Mem),
            other => Err(AbiError::UnknownPeType(other)),
        }
    }
}

#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeIsa {
    None = 0,
    X86 = 1,
    Arm = 2,
    RiscV = 3,
}

impl TryFrom<u64> for PeIsa {
    type Error = AbiError;

    fn try_from(raw: u64) -> Result<Self> {
        match raw {
            0 => Ok(Self::None),
            1 => Ok(Self::X86),
            2 => Ok(Self::Arm),
            3 => Ok(Self::RiscV),
            other => Err(AbiError::UnknownPeIsa(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeDesc {
    ty: PeType,
    isa: PeIsa,
    mem_size: u64,
}

impl PeDesc {
    pub fn new(ty: PeType, isa: PeIsa, mem_size: u64) -> Result<Self> {
        if mem_size & !MEM_MASK != 0 {
            return Err(AbiError::UnalignedMemSize(mem_size));
        }
        Ok(Self { ty, isa, mem_size })
    }

    /// Descriptor for a RISC-V compute tile. With `vm` the tile uses its
    /// cache and external memory, otherwise it owns `mem_size` bytes.
    pub fn compute(vm: bool, mem_size: u64) -> Result<Self> {
        if vm {
            Self::new(PeType::CompEmem, PeIsa::RiscV, 0)
        } else {
            Self::new(PeType::CompImem, PeIsa::RiscV, mem_size)
        }
    }

    /// Descriptor for the DRAM tile.
    pub fn memory(size: u64) -> Result<Self> {
        Self::new(PeType::Mem, PeIsa::None, size)
    }

    pub fn pe_type(self) -> PeType {
        self.ty
    }

    pub fn isa(self) -> PeIsa {
        self.isa
    }

    pub fn mem_size(self) -> u64 {
        self.mem_size
    }

    pub fn has_virtmem(self) -> bool {
        self.ty == PeType::CompEmem
    }

    pub fn pack(self) -> u64 {
        self.ty as u64 | (self.isa as u64) << ISA_SHIFT | self.mem_size
    }

    pub fn unpack(raw: u64) -> Result<Self> {
        if raw & RESERVED_MASK != 0 {
            return Err(AbiError::ReservedBits(raw));
        }
        let ty = PeType::try_from(raw & TYPE_MASK)?;
        let isa = PeIsa::try_from((raw >> ISA_SHIFT) & ISA_MASK)?;
        Ok(Self { ty, isa, mem_size: raw & MEM_MASK })
    }
}
