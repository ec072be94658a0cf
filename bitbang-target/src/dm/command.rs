//! Abstract command execution.
//!
//! A write to `command` runs the whole command synchronously: `busy` is
//! raised and dropped again before the debugger can issue another DMI
//! transaction, so only `cmderr` is ever observable.

use super::registers::{AbstractCommandErrorKind, AccessMemoryCommand, AccessRegisterCommand};
use super::DebugModule;

const CMDTYPE_ACCESS_REGISTER: u32 = 0;
const CMDTYPE_QUICK_ACCESS: u32 = 1;
const CMDTYPE_ACCESS_MEMORY: u32 = 2;

/// 32 bit transfer size, the only one a RV32 hart supports.
const SIZE_32: u32 = 2;

/// Debugger view of the GPRs: `regno` 0x1000..=0x101f map to x0..x31.
const REGNO_GPR_FIRST: u32 = 0x1000;
const REGNO_GPR_LAST: u32 = 0x101f;

const REGNO_DCSR: u32 = 0x07b0;
const REGNO_DPC: u32 = 0x07b1;

impl DebugModule {
    /// Dispatch one freshly written `command` value.
    pub(super) fn execute_abstract_command(&mut self, value: u32) {
        self.busy = true;

        let cmdtype = value >> 24;
        match cmdtype {
            CMDTYPE_ACCESS_REGISTER => self.access_register(AccessRegisterCommand(value)),
            CMDTYPE_ACCESS_MEMORY => self.access_memory(AccessMemoryCommand(value)),
            CMDTYPE_QUICK_ACCESS => {
                tracing::warn!("quick access commands are not supported");
                self.fail(AbstractCommandErrorKind::NotSupported);
            }
            other => {
                tracing::warn!("unsupported abstract command type {other}");
                self.fail(AbstractCommandErrorKind::NotSupported);
            }
        }

        self.busy = false;
    }

    fn fail(&mut self, kind: AbstractCommandErrorKind) {
        self.cmderr = kind as u32;
    }

    fn access_register(&mut self, command: AccessRegisterCommand) {
        tracing::trace!("access register {command:?}");

        if command.aarsize() != SIZE_32 {
            tracing::warn!("unsupported aarsize {}", command.aarsize());
            self.fail(AbstractCommandErrorKind::NotSupported);
            return;
        }

        // no program buffer, no autoincrement
        if command.postexec() || command.aarpostincrement() {
            self.fail(AbstractCommandErrorKind::NotSupported);
            return;
        }

        if !command.transfer() {
            return;
        }

        let regno = command.regno();
        let write = command.write();
        let arg0 = self.data[0] as u32;

        tracing::trace!(
            "{} {} ({regno:#06x})",
            if write { "write" } else { "read" },
            super::names::abstract_register_name(regno)
        );

        match regno {
            REGNO_GPR_FIRST..=REGNO_GPR_LAST => {
                let index = (regno & 0x1f) as usize;
                if write {
                    self.hart.write_register(index, arg0);
                } else {
                    self.data[0] = self.hart.read_register(index) as u64;
                }
            }
            REGNO_DCSR => {
                if write {
                    self.hart.set_dcsr(arg0);
                } else {
                    self.data[0] = self.hart.dcsr() as u64;
                }
            }
            REGNO_DPC => {
                if write {
                    self.hart.set_dpc(arg0);
                } else {
                    self.data[0] = self.hart.dpc() as u64;
                }
            }
            // the remaining low space is the CSR file
            0x0000..=0x0fff => {
                let outcome = if write {
                    self.hart.write_csr(regno as u16, arg0)
                } else {
                    self.hart.read_csr(regno as u16).map(|value| {
                        self.data[0] = value as u64;
                    })
                };
                if outcome.is_none() {
                    tracing::warn!("access to unimplemented CSR {regno:#06x}");
                    self.fail(AbstractCommandErrorKind::NotSupported);
                }
            }
            _ => {
                tracing::warn!("access to unsupported register number {regno:#06x}");
                self.fail(AbstractCommandErrorKind::NotSupported);
            }
        }
    }

    fn access_memory(&mut self, command: AccessMemoryCommand) {
        tracing::trace!("access memory {command:?}");

        if command.aamvirtual() {
            tracing::warn!("virtual address translation is not supported");
            self.fail(AbstractCommandErrorKind::NotSupported);
            return;
        }

        if command.aamsize() != SIZE_32 {
            tracing::warn!("unsupported aamsize {}", command.aamsize());
            self.fail(AbstractCommandErrorKind::NotSupported);
            return;
        }

        // arg1 carries the address, arg0 the payload
        let address = self.data[1] as u32;
        if command.write() {
            self.image.write_word(address, self.data[0] as u32);
        } else {
            self.data[0] = self.image.read_word(address) as u64;
        }

        if command.aampostincrement() {
            self.data[1] = address.wrapping_add(1 << command.aamsize()) as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::dm::{Abstractcs, ABSTRACTCS, COMMAND, DATA0, DMCONTROL};
    use crate::hart::Hart;
    use crate::image::ProgramImage;

    use super::*;

    const DATA1: u32 = DATA0 + 1;

    fn debug_module() -> DebugModule {
        let mut dm = DebugModule::new(Hart::new(0x8000_0000), ProgramImage::new());
        dm.write(DMCONTROL, 1).unwrap();
        dm
    }

    fn cmderr(dm: &mut DebugModule) -> u32 {
        Abstractcs(dm.read(ABSTRACTCS).unwrap()).cmderr()
    }

    fn access_register(regno: u32, write: bool, aarsize: u32) -> u32 {
        let mut command = AccessRegisterCommand(0);
        command.set_aarsize(aarsize);
        command.set_transfer(true);
        command.set_write(write);
        command.set_regno(regno);
        command.into()
    }

    fn access_memory(write: bool, aamsize: u32, postincrement: bool) -> u32 {
        let mut command = AccessMemoryCommand(0);
        command.set_cmdtype(CMDTYPE_ACCESS_MEMORY);
        command.set_aamsize(aamsize);
        command.set_aampostincrement(postincrement);
        command.set_write(write);
        command.into()
    }

    #[test]
    fn reads_a_gpr_into_data0() {
        let mut dm = debug_module();
        dm.hart_mut().write_register(1, 0xdead_beef);

        dm.write(COMMAND, access_register(0x1001, false, SIZE_32))
            .unwrap();

        assert_eq!(dm.read(DATA0).unwrap(), 0xdead_beef);
        assert_eq!(cmderr(&mut dm), 0);
    }

    #[test]
    fn writes_data0_into_a_gpr() {
        let mut dm = debug_module();
        dm.write(DATA0, 0x1234_5678).unwrap();

        dm.write(COMMAND, access_register(0x101f, true, SIZE_32))
            .unwrap();

        assert_eq!(dm.hart().read_register(31), 0x1234_5678);
    }

    #[test]
    fn sixty_four_bit_transfers_are_not_supported() {
        let mut dm = debug_module();

        dm.write(COMMAND, access_register(0x1001, false, 3)).unwrap();

        assert_eq!(cmderr(&mut dm), AbstractCommandErrorKind::NotSupported as u32);
    }

    #[test]
    fn transfer_clear_performs_no_access() {
        let mut dm = debug_module();
        let mut command = AccessRegisterCommand(0);
        command.set_aarsize(SIZE_32);
        command.set_regno(0xffff);

        dm.write(COMMAND, command.into()).unwrap();

        assert_eq!(cmderr(&mut dm), 0);
    }

    #[test]
    fn misa_advertises_rv32ima() {
        let mut dm = debug_module();

        dm.write(COMMAND, access_register(0x0301, false, SIZE_32))
            .unwrap();

        assert_eq!(dm.read(DATA0).unwrap(), 0x4000_1101);
    }

    #[test]
    fn machine_csrs_shuttle_through_data0() {
        let mut dm = debug_module();
        dm.write(DATA0, 0x0000_1800).unwrap();

        dm.write(COMMAND, access_register(0x0300, true, SIZE_32))
            .unwrap();
        dm.write(DATA0, 0).unwrap();
        dm.write(COMMAND, access_register(0x0300, false, SIZE_32))
            .unwrap();

        assert_eq!(dm.read(DATA0).unwrap(), 0x0000_1800);
    }

    #[test]
    fn dpc_shuttles_between_hart_and_data0() {
        let mut dm = debug_module();

        dm.write(COMMAND, access_register(REGNO_DPC, false, SIZE_32))
            .unwrap();
        assert_eq!(dm.read(DATA0).unwrap(), 0x8000_0000);

        dm.write(DATA0, 0x8000_1234).unwrap();
        dm.write(COMMAND, access_register(REGNO_DPC, true, SIZE_32))
            .unwrap();
        assert_eq!(dm.hart().dpc(), 0x8000_1234);
    }

    #[test]
    fn dcsr_reads_with_debug_version_four() {
        let mut dm = debug_module();

        dm.write(COMMAND, access_register(REGNO_DCSR, false, SIZE_32))
            .unwrap();

        assert_eq!(dm.read(DATA0).unwrap() >> 28, 4);
    }

    #[test]
    fn unknown_register_numbers_fail_as_not_supported() {
        let mut dm = debug_module();

        dm.write(COMMAND, access_register(0x0c10, false, SIZE_32))
            .unwrap();

        assert_eq!(cmderr(&mut dm), AbstractCommandErrorKind::NotSupported as u32);
    }

    #[test]
    fn quick_access_is_not_supported() {
        let mut dm = debug_module();

        dm.write(COMMAND, 1 << 24).unwrap();

        assert_eq!(cmderr(&mut dm), AbstractCommandErrorKind::NotSupported as u32);
    }

    #[test]
    fn memory_read_pulls_a_word_from_the_image() {
        let mut image = ProgramImage::new();
        image.write_word(0x8000_0040, 0xcafe_f00d);
        let mut dm = DebugModule::new(Hart::new(0), image);

        dm.write(DATA1, 0x8000_0040).unwrap();
        dm.write(COMMAND, access_memory(false, SIZE_32, false))
            .unwrap();

        assert_eq!(dm.read(DATA0).unwrap(), 0xcafe_f00d);
    }

    #[test]
    fn memory_read_of_unmapped_addresses_returns_zero() {
        let mut dm = debug_module();
        dm.write(DATA0, 0xffff_ffff).unwrap();
        dm.write(DATA1, 0x4000_0000).unwrap();

        dm.write(COMMAND, access_memory(false, SIZE_32, false))
            .unwrap();

        assert_eq!(dm.read(DATA0).unwrap(), 0);
        assert_eq!(cmderr(&mut dm), 0);
    }

    #[test]
    fn memory_write_updates_the_image() {
        let mut dm = debug_module();
        dm.write(DATA0, 0x0bad_cafe).unwrap();
        dm.write(DATA1, 0x8000_0080).unwrap();

        dm.write(COMMAND, access_memory(true, SIZE_32, false))
            .unwrap();

        assert_eq!(dm.image().read_word(0x8000_0080), 0x0bad_cafe);
    }

    #[test]
    fn postincrement_advances_the_address_by_four() {
        let mut dm = debug_module();
        dm.write(DATA1, 0x8000_0000).unwrap();

        dm.write(COMMAND, access_memory(false, SIZE_32, true))
            .unwrap();

        assert_eq!(dm.read(DATA1).unwrap(), 0x8000_0004);
    }

    #[test]
    fn virtual_memory_access_is_not_supported() {
        let mut dm = debug_module();
        let mut command = AccessMemoryCommand(0);
        command.set_cmdtype(CMDTYPE_ACCESS_MEMORY);
        command.set_aamvirtual(true);
        command.set_aamsize(SIZE_32);

        dm.write(COMMAND, command.into()).unwrap();

        assert_eq!(cmderr(&mut dm), AbstractCommandErrorKind::NotSupported as u32);
    }

    #[test]
    fn sixteen_bit_memory_access_is_not_supported() {
        let mut dm = debug_module();

        dm.write(COMMAND, access_memory(false, 1, false)).unwrap();

        assert_eq!(cmderr(&mut dm), AbstractCommandErrorKind::NotSupported as u32);
    }
}
