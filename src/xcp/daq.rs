//! Dynamic DAQ list configuration and sampling
//!
//! The master builds its measurement configuration in three steps:
//! 1. ALLOC_DAQ reserves a number of DAQ lists
//! 2. ALLOC_ODT gives each list a number of Object Descriptor Tables
//! 3. ALLOC_ODT_ENTRY sizes each ODT
//!
//! Entries are then filled with SET_DAQ_PTR + WRITE_DAQ. Once a list is bound to an event
//! channel and started, every call to [DaqListManager::sample] for that event produces one
//! DTO per ODT.

use crate::{XcpError, XcpResult, channel::MemoryAccess};

/// Session status bit reported by GET_STATUS while any DAQ list runs
pub const SESSION_STATUS_DAQ_RUNNING: u8 = 0x40;

/// Highest PID a DTO may carry. 0xFC to 0xFF belong to SERV, EV, ERR and RES
pub const MAX_DTO_PID: u8 = 0xFB;

/// Static limits of the DAQ processor
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DaqLimits {
    /// Maximum number of DAQ lists ALLOC_DAQ may reserve
    pub max_lists: u16,
    /// Maximum number of ODTs per list
    pub max_odts_per_list: u8,
    /// Maximum number of entries per ODT
    pub max_entries_per_odt: u8,
    /// Number of event channels
    pub max_events: u16,
}

impl Default for DaqLimits {
    fn default() -> Self {
        Self {
            max_lists: 4,
            max_odts_per_list: 8,
            max_entries_per_odt: 7,
            max_events: 4,
        }
    }
}

/// A single measured variable
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct OdtEntry {
    /// Address of the variable
    pub address: u32,
    /// Address extension
    pub extension: u8,
    /// Size in bytes
    pub size: u8,
    /// Bit offset, 0xFF for whole bytes
    pub bit_offset: u8,
}

/// Object Descriptor Table, the content of one DTO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Odt {
    entries: Vec<OdtEntry>,
}

impl Odt {
    /// Configured entries
    pub fn entries(&self) -> &[OdtEntry] {
        &self.entries
    }
}

/// A DAQ list and its event binding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaqList {
    odts: Vec<Odt>,
    /// Mode byte from SET_DAQ_LIST_MODE
    pub mode: u8,
    /// Event channel the list samples on
    pub event_channel: u16,
    /// Transmission rate prescaler
    pub prescaler: u8,
    /// Priority of the list
    pub priority: u8,
    selected: bool,
    running: bool,
}

impl DaqList {
    /// Allocated ODTs
    pub fn odts(&self) -> &[Odt] {
        &self.odts
    }

    /// Number of allocated ODTs
    pub fn odt_count(&self) -> u8 {
        self.odts.len() as u8
    }

    /// True if the list is currently sampling
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// True if the list is selected for the next START_STOP_SYNCH
    pub fn is_selected(&self) -> bool {
        self.selected
    }
}

/// Position of the next WRITE_DAQ
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DaqPointer {
    /// DAQ list
    pub list: u16,
    /// ODT within the list
    pub odt: u8,
    /// Entry within the ODT
    pub entry: u8,
}

/// Owns the DAQ allocation
#[derive(Debug, Clone, Default)]
pub struct DaqListManager {
    limits: DaqLimits,
    lists: Vec<DaqList>,
    ptr: Option<DaqPointer>,
}

impl DaqListManager {
    /// Creates an empty manager
    pub fn new(limits: DaqLimits) -> Self {
        Self {
            limits,
            lists: Vec::new(),
            ptr: None,
        }
    }

    /// Limits this manager enforces
    pub fn limits(&self) -> &DaqLimits {
        &self.limits
    }

    /// Stops and deallocates everything
    pub fn reset(&mut self) {
        self.lists.clear();
        self.ptr = None;
    }

    /// Allocated lists
    pub fn lists(&self) -> &[DaqList] {
        &self.lists
    }

    /// Number of allocated lists
    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    /// True if any list is running
    pub fn any_running(&self) -> bool {
        self.lists.iter().any(|l| l.running)
    }

    /// Current DAQ pointer
    pub fn pointer(&self) -> Option<DaqPointer> {
        self.ptr
    }

    fn list_mut(&mut self, list: u16) -> XcpResult<&mut DaqList> {
        self.lists
            .get_mut(list as usize)
            .ok_or(XcpError::OutOfRange)
    }

    /// FREE_DAQ
    pub fn free_daq(&mut self) {
        log::debug!("FREE_DAQ, releasing {} lists", self.lists.len());
        self.reset();
    }

    /// ALLOC_DAQ, replaces the allocation with `count` empty lists
    pub fn alloc_daq(&mut self, count: u16) -> XcpResult<()> {
        let last_base = self.pid_base(count.saturating_sub(1));
        if count > self.limits.max_lists || last_base > MAX_DTO_PID as usize {
            log::warn!("ALLOC_DAQ {count} exceeds the DAQ limits or the DTO PID range");
            return Err(XcpError::MemoryOverflow);
        }
        self.lists = vec![DaqList::default(); count as usize];
        self.ptr = None;
        log::debug!("ALLOC_DAQ {count}");
        Ok(())
    }

    /// ALLOC_ODT, gives `list` `count` empty ODTs
    pub fn alloc_odt(&mut self, list: u16, count: u8) -> XcpResult<()> {
        let max = self.limits.max_odts_per_list;
        let last_pid = self.pid_base(list) + count as usize;
        let l = self.list_mut(list)?;
        if count > max || last_pid > MAX_DTO_PID as usize + 1 {
            return Err(XcpError::MemoryOverflow);
        }
        l.odts = vec![Odt::default(); count as usize];
        log::debug!("ALLOC_ODT list {list} count {count}");
        Ok(())
    }

    /// ALLOC_ODT_ENTRY, gives `odt` of `list` `count` empty entries
    pub fn alloc_odt_entry(&mut self, list: u16, odt: u8, count: u8) -> XcpResult<()> {
        let max = self.limits.max_entries_per_odt;
        let o = self
            .list_mut(list)?
            .odts
            .get_mut(odt as usize)
            .ok_or(XcpError::OutOfRange)?;
        if count > max {
            return Err(XcpError::MemoryOverflow);
        }
        o.entries = vec![OdtEntry::default(); count as usize];
        Ok(())
    }

    fn entry_exists(&self, p: DaqPointer) -> bool {
        self.lists
            .get(p.list as usize)
            .and_then(|l| l.odts.get(p.odt as usize))
            .is_some_and(|o| (p.entry as usize) < o.entries.len())
    }

    /// SET_DAQ_PTR, the pointer has to address an allocated entry
    pub fn set_daq_ptr(&mut self, list: u16, odt: u8, entry: u8) -> XcpResult<()> {
        let p = DaqPointer { list, odt, entry };
        if !self.entry_exists(p) {
            return Err(XcpError::OutOfRange);
        }
        self.ptr = Some(p);
        Ok(())
    }

    /// WRITE_DAQ, fills the entry at the DAQ pointer then moves the pointer to the next
    /// entry, continuing with the next ODT and wrapping to the first ODT of the list
    pub fn write_daq(&mut self, value: OdtEntry) -> XcpResult<()> {
        let p = self
            .ptr
            .filter(|p| self.entry_exists(*p))
            .ok_or(XcpError::Sequence)?;
        let list = &mut self.lists[p.list as usize];
        list.odts[p.odt as usize].entries[p.entry as usize] = value;

        let mut next = p;
        next.entry += 1;
        if next.entry as usize >= list.odts[p.odt as usize].entries.len() {
            next.entry = 0;
            next.odt += 1;
            if next.odt as usize >= list.odts.len() {
                next.odt = 0;
            }
        }
        self.ptr = Some(next);
        Ok(())
    }

    /// SET_DAQ_LIST_MODE
    pub fn set_daq_list_mode(
        &mut self,
        list: u16,
        mode: u8,
        event_channel: u16,
        prescaler: u8,
        priority: u8,
    ) -> XcpResult<()> {
        let l = self.list_mut(list)?;
        l.mode = mode;
        l.event_channel = event_channel;
        l.prescaler = prescaler;
        l.priority = priority;
        Ok(())
    }

    fn pid_base(&self, list: u16) -> usize {
        list as usize * self.limits.max_odts_per_list as usize
    }

    /// PID of the first ODT of `list`. Allocation keeps every PID at or below [MAX_DTO_PID]
    pub fn first_pid(&self, list: u16) -> u8 {
        self.pid_base(list).min(MAX_DTO_PID as usize) as u8
    }

    /// START_STOP_DAQ_LIST. Mode 0 stops, 1 starts and 2 selects the list.
    ///
    /// ## Returns
    /// The first PID of the list
    pub fn start_stop_daq_list(&mut self, list: u16, mode: u8) -> XcpResult<u8> {
        let l = self.list_mut(list)?;
        match mode {
            0 => l.running = false,
            1 => l.running = true,
            2 => l.selected = true,
            _ => return Err(XcpError::ModeNotValid),
        }
        log::debug!("START_STOP_DAQ_LIST list {list} mode {mode}");
        Ok(self.first_pid(list))
    }

    /// START_STOP_SYNCH. Mode 0 stops all lists, 1 starts the selected lists and
    /// 2 stops the selected lists. Only lists with at least one ODT are started.
    /// With nothing selected, mode 1 starts every list that has an ODT
    pub fn start_stop_synch(&mut self, mode: u8) -> XcpResult<()> {
        let any_selected = self.lists.iter().any(|l| l.selected);
        match mode {
            0 => self.lists.iter_mut().for_each(|l| l.running = false),
            1 => self
                .lists
                .iter_mut()
                .filter(|l| (l.selected || !any_selected) && !l.odts.is_empty())
                .for_each(|l| l.running = true),
            2 => self
                .lists
                .iter_mut()
                .filter(|l| l.selected)
                .for_each(|l| l.running = false),
            _ => return Err(XcpError::ModeNotValid),
        }
        self.lists.iter_mut().for_each(|l| l.selected = false);
        log::debug!("START_STOP_SYNCH mode {mode}");
        Ok(())
    }

    /// GET_DAQ_PROCESSOR_INFO payload
    pub fn processor_info(&self) -> [u8; 7] {
        let lists = self.limits.max_lists.to_be_bytes();
        let events = self.limits.max_events.to_be_bytes();
        [0x01, lists[0], lists[1], events[0], events[1], 0x00, 0x00]
    }

    /// GET_DAQ_RESOLUTION_INFO payload
    pub fn resolution_info(&self) -> [u8; 7] {
        let max = self.limits.max_entries_per_odt;
        [0x01, max, 0x01, max, 0x00, 0x00, 0x01]
    }

    /// GET_DAQ_LIST_INFO payload
    pub fn list_info(&self, list: u16) -> XcpResult<[u8; 5]> {
        let l = self.lists.get(list as usize).ok_or(XcpError::OutOfRange)?;
        Ok([0x00, l.odt_count(), self.limits.max_entries_per_odt, 0x00, 0x00])
    }

    /// GET_DAQ_EVENT_INFO payload
    pub fn event_info(&self, event: u16) -> XcpResult<[u8; 6]> {
        if event >= self.limits.max_events {
            return Err(XcpError::OutOfRange);
        }
        Ok([0x04, self.limits.max_lists as u8, 0x00, 0x0A, 0x06, 0x00])
    }

    /// Samples every running list bound to `event`.
    ///
    /// ## Returns
    /// One DTO per ODT, `[PID, data...]`, each no longer than `max_dto`
    pub fn sample<M: MemoryAccess + ?Sized>(
        &self,
        event: u16,
        memory: &mut M,
        max_dto: usize,
    ) -> Vec<Vec<u8>> {
        let mut dtos = Vec::new();
        for (list_idx, list) in self.lists.iter().enumerate() {
            if !list.running || list.event_channel != event {
                continue;
            }
            let first_pid = self.first_pid(list_idx as u16);
            for (odt_idx, odt) in list.odts.iter().enumerate() {
                let mut dto = Vec::with_capacity(max_dto);
                dto.push(first_pid.wrapping_add(odt_idx as u8));
                for e in &odt.entries {
                    for i in 0..e.size as u32 {
                        if dto.len() >= max_dto {
                            break;
                        }
                        dto.push(memory.read_byte(e.address.wrapping_add(i)));
                    }
                }
                dtos.push(dto);
            }
        }
        dtos
    }
}
