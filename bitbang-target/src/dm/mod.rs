//! The Debug Module (DM).
//!
//! This is the entity the DTM tunnels to through the `dmi` register. It
//! owns the register file the debugger talks to (`dmcontrol`, `dmstatus`,
//! `abstractcs`, `command`, `data0..data11`) and applies abstract commands
//! against the hart and the loaded program image.

mod command;
mod names;
mod registers;

pub use registers::{
    AbstractCommandErrorKind, Abstractauto, Abstractcs, AccessMemoryCommand,
    AccessRegisterCommand, Dmcontrol, Dmstatus,
};

use crate::hart::Hart;
use crate::image::ProgramImage;

pub const DATA0: u32 = 0x04;
pub const DATA11: u32 = 0x0f;
pub const DMCONTROL: u32 = 0x10;
pub const DMSTATUS: u32 = 0x11;
pub const HARTINFO: u32 = 0x12;
pub const HALTSUM1: u32 = 0x13;
pub const ABSTRACTCS: u32 = 0x16;
pub const COMMAND: u32 = 0x17;
pub const ABSTRACTAUTO: u32 = 0x18;
pub const CONFSTRPTR0: u32 = 0x19;
pub const CONFSTRPTR3: u32 = 0x1c;
pub const NEXTDM: u32 = 0x1d;
pub const HALTSUM0: u32 = 0x40;

/// Number of implemented `data` registers.
const DATACOUNT: u32 = 12;

/// A DM register access failed; the DTM turns this into a failed `op`
/// response and a sticky `dmistat`.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DmAccessError {
    #[error("access to unimplemented debug module register {0:#04x}")]
    UnknownRegister(u32),
}

/// The Debug Module register file and its semantics.
///
/// All accesses go through [`read`](Self::read) and [`write`](Self::write),
/// keyed by the 7+ bit address carried in the `dmi` register.
#[derive(Debug)]
pub struct DebugModule {
    dmcontrol: Dmcontrol,
    cmderr: u32,
    busy: bool,
    command: u32,
    abstractauto: Abstractauto,
    data: [u64; DATACOUNT as usize],
    hart: Hart,
    image: ProgramImage,
}

impl DebugModule {
    pub fn new(hart: Hart, image: ProgramImage) -> Self {
        Self {
            dmcontrol: Dmcontrol(0),
            cmderr: 0,
            busy: false,
            command: 0,
            abstractauto: Abstractauto(0),
            data: [0; DATACOUNT as usize],
            hart,
            image,
        }
    }

    pub fn hart(&self) -> &Hart {
        &self.hart
    }

    pub fn hart_mut(&mut self) -> &mut Hart {
        &mut self.hart
    }

    pub fn image(&self) -> &ProgramImage {
        &self.image
    }

    /// Read a DM register.
    pub fn read(&mut self, address: u32) -> Result<u32, DmAccessError> {
        let value = match address {
            DATA0..=DATA11 => {
                let value = self.data[(address - DATA0) as usize] as u32;
                self.autoexec_data((address - DATA0) as usize);
                value
            }
            DMCONTROL => self.dmcontrol.0,
            DMSTATUS => self.dmstatus(),
            HARTINFO => 0,
            HALTSUM1 => 0,
            ABSTRACTCS => self.abstractcs(),
            COMMAND => self.command,
            ABSTRACTAUTO => self.abstractauto.into(),
            CONFSTRPTR0..=CONFSTRPTR3 => 0,
            NEXTDM => 0,
            // exactly one hart, and it is halted
            HALTSUM0 => 1,
            _ => {
                tracing::warn!("read of unimplemented DM register {address:#04x}");
                return Err(DmAccessError::UnknownRegister(address));
            }
        };

        tracing::debug!("DM read  {} -> {value:#010x}", names::dm_register_name(address));
        Ok(value)
    }

    /// Write a DM register. The returned value is echoed in the DMI
    /// response data field.
    pub fn write(&mut self, address: u32, value: u32) -> Result<u32, DmAccessError> {
        tracing::debug!("DM write {} <- {value:#010x}", names::dm_register_name(address));

        match address {
            DATA0..=DATA11 => {
                self.data[(address - DATA0) as usize] = value as u64;
                self.autoexec_data((address - DATA0) as usize);
            }
            DMCONTROL => self.write_dmcontrol(Dmcontrol(value)),
            // read-only registers; writes are dropped
            DMSTATUS | HARTINFO | HALTSUM1 | CONFSTRPTR0..=CONFSTRPTR3 | NEXTDM | HALTSUM0 => {}
            ABSTRACTCS => self.write_abstractcs(Abstractcs(value)),
            COMMAND => {
                self.command = value;
                if self.cmderr != 0 {
                    tracing::warn!(
                        "abstract command {value:#010x} ignored, cmderr={} is pending",
                        self.cmderr
                    );
                } else {
                    self.execute_abstract_command(value);
                }
            }
            ABSTRACTAUTO => {
                // no program buffer, so only the data half is implemented
                let mut stored = Abstractauto(value);
                stored.set_autoexecprogbuf(0);
                self.abstractauto = stored;
            }
            _ => {
                tracing::warn!("write of unimplemented DM register {address:#04x}");
                return Err(DmAccessError::UnknownRegister(address));
            }
        }

        Ok(value)
    }

    /// Re-run the latched command when `abstractauto` marks this data
    /// register.
    fn autoexec_data(&mut self, index: usize) {
        if self.abstractauto.autoexecdata() >> index & 1 == 0 {
            return;
        }
        if self.cmderr != 0 {
            return;
        }
        tracing::trace!("autoexec on data{index}");
        let command = self.command;
        self.execute_abstract_command(command);
    }

    fn write_dmcontrol(&mut self, request: Dmcontrol) {
        if !request.dmactive() {
            tracing::debug!("dmactive cleared, resetting debug module state");
            self.reset();
            return;
        }

        let mut stored = request;

        // Only hart 0 exists; selection probes read back all zeroes.
        if request.hasel() || request.hartsel() != 0 {
            tracing::debug!(
                "hart selection probe hasel={} hartsel={:#x}, reporting hart 0 only",
                request.hasel(),
                request.hartsel()
            );
            stored.set_hasel(false);
            stored.set_hartsel(0);
        }

        // The hart is permanently halted, so a resume request behaves as a
        // single step of one 32-bit instruction.
        if request.resumereq() {
            self.hart.step_instruction();
            tracing::debug!("resumereq: stepped dpc to {:#010x}", self.hart.dpc());
        }

        if request.haltreq() {
            tracing::trace!("haltreq on an already halted hart");
        }

        self.dmcontrol = stored;
    }

    fn write_abstractcs(&mut self, request: Abstractcs) {
        // cmderr is write-1-to-clear; everything else is read-only here
        self.cmderr &= !request.cmderr();
    }

    /// `dmactive=0`: everything DM-owned returns to defaults.
    fn reset(&mut self) {
        self.dmcontrol = Dmcontrol(0);
        self.cmderr = 0;
        self.busy = false;
        self.command = 0;
        self.abstractauto = Abstractauto(0);
        self.data = [0; DATACOUNT as usize];
    }

    fn dmstatus(&self) -> u32 {
        let mut status = Dmstatus(0);
        // debug spec 1.0
        status.set_version(3);
        status.set_authenticated(true);
        status.set_allhalted(true);
        status.set_allresumeack(true);
        status.into()
    }

    fn abstractcs(&self) -> u32 {
        let mut abstractcs = Abstractcs(0);
        abstractcs.set_busy(self.busy);
        abstractcs.set_cmderr(self.cmderr);
        abstractcs.set_datacount(DATACOUNT);
        abstractcs.into()
    }
}
