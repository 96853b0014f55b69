// cli/src/sim.rs - in-memory platform
//
// Backs `--sim` dry runs and the test-suite. Every control operation lands in
// a shared journal so tests can check ordering across tiles.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use tileboot_abi::TileId;

use crate::error::{HwError, HwResult};
use crate::hw::{
    ConsoleLink, CoreTile, Endpoint, Features, FlitCounters, LogKind, PacketCounters, Platform,
    Received, SharedMemory,
};

const PAGE: u64 = 4096;
/// Endpoint slots of a simulated control unit.
pub const SIM_EP_COUNT: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreOp {
    Halt,
    Start,
    Reset,
    EnableTrace,
    SetFeatures(Features),
    SetEndpoint(usize, Endpoint),
    Transport(bool),
    TransportTimeout(u32),
    ReadLog { kind: LogKind, exhaustive: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SystemReset,
    Fabric(bool),
    Write { offset: u64, len: usize },
    Core { pe: usize, op: CoreOp },
}

#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Event>>>);

impl Journal {
    fn record(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    /// Position of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.0.borrow().iter().position(pred)
    }

    /// Position of the last event matching `pred`.
    pub fn last_position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.0.borrow().iter().rposition(pred)
    }
}

/// Failures a simulated tile injects on request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub primary_log: bool,
    pub exhaustive_log: bool,
    pub packet_counters: bool,
    pub flit_counters: bool,
}

pub struct SimCore {
    pe: usize,
    journal: Journal,
    running: bool,
    trace: bool,
    transport: bool,
    features: Features,
    endpoints: Vec<Endpoint>,
    logs: HashMap<LogKind, Vec<String>>,
    packets: PacketCounters,
    flits: FlitCounters,
    pub faults: Faults,
}

impl SimCore {
    fn new(pe: usize, journal: Journal) -> Self {
        Self {
            pe,
            journal,
            running: true,
            trace: false,
            transport: true,
            features: Features::empty(),
            endpoints: vec![Endpoint::Invalid; SIM_EP_COUNT],
            logs: HashMap::new(),
            packets: PacketCounters { dropped: 0, total: 0 },
            flits: FlitCounters { dropped: 0, errors: 0 },
            faults: Faults::default(),
        }
    }

    fn record(&self, op: CoreOp) {
        self.journal.record(Event::Core { pe: self.pe, op });
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    pub fn transport_enabled(&self) -> bool {
        self.transport
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn endpoint(&self, slot: usize) -> Endpoint {
        self.endpoints[slot]
    }

    pub fn set_log(&mut self, kind: LogKind, lines: Vec<String>) {
        self.logs.insert(kind, lines);
    }

    pub fn set_counters(&mut self, packets: PacketCounters, flits: FlitCounters) {
        self.packets = packets;
        self.flits = flits;
    }
}

impl CoreTile for SimCore {
    fn halt(&mut self) -> HwResult<()> {
        self.record(CoreOp::Halt);
        self.running = false;
        Ok(())
    }

    fn start(&mut self) -> HwResult<()> {
        self.record(CoreOp::Start);
        self.running = true;
        Ok(())
    }

    fn reset(&mut self) -> HwResult<()> {
        self.record(CoreOp::Reset);
        self.logs.remove(&LogKind::TcuCommands);
        Ok(())
    }

    fn enable_trace(&mut self) -> HwResult<()> {
        self.record(CoreOp::EnableTrace);
        self.trace = true;
        Ok(())
    }

    fn set_features(&mut self, features: Features) -> HwResult<()> {
        self.record(CoreOp::SetFeatures(features));
        self.features = features;
        Ok(())
    }

    fn set_endpoint(&mut self, slot: usize, ep: Endpoint) -> HwResult<()> {
        let entry = self
            .endpoints
            .get_mut(slot)
            .ok_or(HwError::Unsupported("endpoint slot out of range"))?;
        *entry = ep;
        self.record(CoreOp::SetEndpoint(slot, ep));
        Ok(())
    }

    fn set_transport_enabled(&mut self, enabled: bool) -> HwResult<()> {
        self.record(CoreOp::Transport(enabled));
        self.transport = enabled;
        Ok(())
    }

    fn set_transport_timeout(&mut self, cycles: u32) -> HwResult<()> {
        self.record(CoreOp::TransportTimeout(cycles));
        Ok(())
    }

    fn packet_counters(&mut self) -> HwResult<PacketCounters> {
        if self.faults.packet_counters {
            return Err(HwError::Link("ARQ counter register unreadable".into()));
        }
        Ok(self.packets)
    }

    fn flit_counters(&mut self) -> HwResult<FlitCounters> {
        if self.faults.flit_counters {
            return Err(HwError::Link("flit counter register unreadable".into()));
        }
        Ok(self.flits)
    }

    fn read_log(&mut self, kind: LogKind, exhaustive: bool) -> HwResult<Vec<String>> {
        self.record(CoreOp::ReadLog { kind, exhaustive });
        let failed = if exhaustive { self.faults.exhaustive_log } else { self.faults.primary_log };
        if failed {
            return Err(HwError::Timeout);
        }
        Ok(self.logs.get(&kind).cloned().unwrap_or_default())
    }
}

/// Sparse, page-backed DRAM tile.
pub struct SimMemory {
    tile: TileId,
    size: u64,
    pages: HashMap<u64, Box<[u8]>>,
    journal: Journal,
    /// Flip the first byte of every write; read-back checks must catch it.
    pub corrupt_writes: bool,
}

impl SimMemory {
    fn new(tile: TileId, size: u64, journal: Journal) -> Self {
        Self { tile, size, pages: HashMap::new(), journal, corrupt_writes: false }
    }

    fn check_range(&self, offset: u64, len: usize) -> HwResult<()> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(HwError::Link(format!(
                "access {:#x}+{:#x} beyond memory of {:#x} bytes",
                offset, len, self.size
            ))),
        }
    }

    /// Reads without going through the trait; unwritten bytes are zero.
    pub fn peek(&self, offset: u64, len: usize) -> Vec<u8> {
        (0..len as u64)
            .map(|i| {
                let addr = offset + i;
                self.pages
                    .get(&(addr / PAGE))
                    .map_or(0, |page| page[(addr % PAGE) as usize])
            })
            .collect()
    }

    pub fn peek_u64(&self, offset: u64) -> u64 {
        let bytes = self.peek(offset, 8);
        u64::from_le_bytes(bytes.try_into().unwrap_or([0; 8]))
    }

    /// Number of pages that were ever written.
    pub fn touched_pages(&self) -> usize {
        self.pages.len()
    }
}

impl SharedMemory for SimMemory {
    fn tile(&self) -> TileId {
        self.tile
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> HwResult<()> {
        self.check_range(offset, data.len())?;
        self.journal.record(Event::Write { offset, len: data.len() });
        for (i, &byte) in data.iter().enumerate() {
            let addr = offset + i as u64;
            let page = self
                .pages
                .entry(addr / PAGE)
                .or_insert_with(|| vec![0u8; PAGE as usize].into_boxed_slice());
            let byte = if self.corrupt_writes && i == 0 { !byte } else { byte };
            page[(addr % PAGE) as usize] = byte;
        }
        Ok(())
    }

    fn read(&mut self, offset: u64, len: usize) -> HwResult<Vec<u8>> {
        self.check_range(offset, len)?;
        Ok(self.peek(offset, len))
    }
}

pub struct SimPlatform {
    cores: Vec<SimCore>,
    memory: SimMemory,
    console: VecDeque<Received>,
    fabric_transport: bool,
    journal: Journal,
}

impl SimPlatform {
    pub fn new(cores: usize, mem_tile: TileId, dram_size: u64) -> Self {
        let journal = Journal::default();
        Self {
            cores: (0..cores).map(|pe| SimCore::new(pe, journal.clone())).collect(),
            memory: SimMemory::new(mem_tile, dram_size, journal.clone()),
            console: VecDeque::new(),
            fabric_transport: true,
            journal,
        }
    }

    /// Queues console traffic; once drained every receive times out.
    pub fn push_console(&mut self, item: Received) {
        self.console.push_back(item);
    }

    pub fn push_text(&mut self, text: &str) {
        self.push_console(Received::Data(text.as_bytes().to_vec()));
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn core(&self, pe: usize) -> &SimCore {
        &self.cores[pe]
    }

    pub fn core_mut(&mut self, pe: usize) -> &mut SimCore {
        &mut self.cores[pe]
    }

    pub fn dram(&self) -> &SimMemory {
        &self.memory
    }

    pub fn dram_mut(&mut self) -> &mut SimMemory {
        &mut self.memory
    }

    pub fn fabric_transport(&self) -> bool {
        self.fabric_transport
    }

    pub fn pending_console(&self) -> usize {
        self.console.len()
    }
}

impl ConsoleLink for SimPlatform {
    fn receive(&mut self, _timeout: Duration) -> HwResult<Received> {
        Ok(self.console.pop_front().unwrap_or(Received::Timeout))
    }
}

impl Platform for SimPlatform {
    type Core = SimCore;
    type Memory = SimMemory;

    fn system_reset(&mut self) -> HwResult<()> {
        self.journal.record(Event::SystemReset);
        Ok(())
    }

    fn set_fabric_transport(&mut self, enabled: bool) -> HwResult<()> {
        self.journal.record(Event::Fabric(enabled));
        self.fabric_transport = enabled;
        Ok(())
    }

    fn parts(&mut self) -> (&mut [SimCore], &mut SimMemory) {
        (&mut self.cores, &mut self.memory)
    }
}
