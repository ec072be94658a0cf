//! The Debug Transport Module (DTM).
//!
//! The DTM is the debug endpoint on the JTAG side: it owns the instruction
//! register, the three DR-addressable registers (`IDCODE`, `dtmcs`, `dmi`)
//! and the BYPASS fallback, and it tunnels `dmi` transactions into the
//! Debug Module. It observes the TAP controller; the capture/shift/update
//! discipline is keyed entirely off state entries and falling edges.

use bitfield::bitfield;

use crate::dm::{DebugModule, DmAccessError};
use crate::jtag::{ClockEdge, ScanRegister, TapObserver, TapState};

/// Width of the instruction register.
pub const IR_LENGTH: u32 = 5;

const IR_BYPASS: u8 = 0x00;
const IR_IDCODE: u8 = 0x01;
const IR_DTMCS: u8 = 0x10;
const IR_DMI: u8 = 0x11;
const IR_BYPASS_ONES: u8 = 0x1f;

/// The identifier presented on IDCODE scans.
pub const IDCODE: u32 = 0x2000_0913;

/// Default number of DMI address bits. The debug spec allows 7..=32.
pub const DEFAULT_ABITS: u32 = 7;

/// `dtmcs.version` value for debug spec 0.13 and 1.0.
const DTMCS_VERSION: u32 = 1;

/// Widths of the fixed DTM registers.
const IDCODE_WIDTH: u32 = 32;
const DTMCS_WIDTH: u32 = 32;

/// Offset of the address field in the `dmi` register.
const DMI_ADDRESS_BIT_OFFSET: u32 = 34;
/// Offset of the data field in the `dmi` register.
const DMI_VALUE_BIT_OFFSET: u32 = 2;
const DMI_OP_MASK: u128 = 0x3;

// `op` values in a request.
const DMI_OP_NOP: u8 = 0;
const DMI_OP_READ: u8 = 1;
const DMI_OP_WRITE: u8 = 2;

// `op` values in a response.
const DMI_STATUS_OK: u8 = 0;
const DMI_STATUS_FAILED: u8 = 2;

bitfield! {
    /// DTM control and status (`dtmcs`), selected by IR 0x10.
    #[derive(Copy, Clone)]
    pub struct Dtmcs(u32);
    impl Debug;

    pub errinfo, set_errinfo: 20, 18;
    pub dtmhardreset, set_dtmhardreset: 17;
    pub dmireset, set_dmireset: 16;
    pub idle, set_idle: 14, 12;
    pub dmistat, set_dmistat: 11, 10;
    pub abits, set_abits: 9, 4;
    pub version, set_version: 3, 0;
}

impl From<Dtmcs> for u32 {
    fn from(register: Dtmcs) -> Self {
        register.0
    }
}

bitfield! {
    /// Field split of a 32 bit JTAG IDCODE.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct IdCode(u32);
    impl Debug;

    u8;
    /// The IDCODE version.
    pub version, set_version: 31, 28;

    u16;
    /// The part number.
    pub part_number, set_part_number: 27, 12;

    /// The JEDEC JEP-106 manufacturer id.
    pub manufacturer, set_manufacturer: 11, 1;

    bool;
    /// The least significant bit; always set in a valid IDCODE.
    pub lsbit, set_lsbit: 0;
}

impl IdCode {
    /// Returns `true` iff the least significant bit is `1` and the 11 bit
    /// manufacturer id is not one of the reserved values.
    pub fn valid(&self) -> bool {
        self.lsbit() && (self.manufacturer() != 0) && (self.manufacturer() != 127)
    }
}

/// The DR register selected by the current instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DtmRegister {
    Bypass,
    IdCode,
    Dtmcs,
    Dmi,
}

/// The DTM register layer. Implements [`TapObserver`] and owns the Debug
/// Module it tunnels to.
#[derive(Debug)]
pub struct DebugTransportModule {
    abits: u32,
    ir_container: u8,
    ir_shift: u8,
    idcode: ScanRegister,
    dtmcs: ScanRegister,
    dmi: ScanRegister,
    bypass: ScanRegister,
    selected: DtmRegister,
    /// Sticky DMI status: nonzero after a failed transaction until cleared
    /// via `dmireset`.
    dmistat: u8,
    dm: DebugModule,
}

impl DebugTransportModule {
    /// A DTM with the default 7 bit DMI address space.
    pub fn new(dm: DebugModule) -> Self {
        Self::with_abits(dm, DEFAULT_ABITS)
    }

    /// A DTM with `abits` DMI address bits.
    pub fn with_abits(dm: DebugModule, abits: u32) -> Self {
        assert!(
            (7..=32).contains(&abits),
            "abits must be in 7..=32, got {abits}"
        );

        let mut idcode = ScanRegister::new(IDCODE_WIDTH, true);
        idcode.load(IDCODE as u128);

        Self {
            abits,
            ir_container: IR_IDCODE,
            ir_shift: 0,
            idcode,
            dtmcs: ScanRegister::new(DTMCS_WIDTH, true),
            dmi: ScanRegister::new(DMI_ADDRESS_BIT_OFFSET + abits, true),
            bypass: ScanRegister::new(1, false),
            selected: DtmRegister::IdCode,
            dmistat: 0,
            dm,
        }
    }

    pub fn abits(&self) -> u32 {
        self.abits
    }

    pub fn debug_module(&self) -> &DebugModule {
        &self.dm
    }

    pub fn debug_module_mut(&mut self) -> &mut DebugModule {
        &mut self.dm
    }

    fn address_mask(&self) -> u32 {
        (((1u64) << self.abits) - 1) as u32
    }

    fn select_register(&self, ir: u8) -> DtmRegister {
        match ir {
            IR_IDCODE => DtmRegister::IdCode,
            IR_DTMCS => DtmRegister::Dtmcs,
            IR_DMI => DtmRegister::Dmi,
            IR_BYPASS | IR_BYPASS_ONES => DtmRegister::Bypass,
            other => {
                tracing::warn!("instruction {other:#04x} does not name a DTM register, bypassing");
                DtmRegister::Bypass
            }
        }
    }

    /// Compose the current `dtmcs` view. Reserved bits read zero.
    fn compose_dtmcs(&self) -> u32 {
        let mut dtmcs = Dtmcs(0);
        dtmcs.set_version(DTMCS_VERSION);
        dtmcs.set_abits(self.abits);
        dtmcs.set_dmistat(self.dmistat as u32);
        dtmcs.into()
    }

    fn compose_dmi(&self, address: u32, data: u32, op: u8) -> u128 {
        (((address & self.address_mask()) as u128) << DMI_ADDRESS_BIT_OFFSET)
            | ((data as u128) << DMI_VALUE_BIT_OFFSET)
            | ((op as u128) & DMI_OP_MASK)
    }

    fn capture_dr(&mut self) {
        self.selected = self.select_register(self.ir_container);
        match self.selected {
            DtmRegister::IdCode => self.idcode.capture(),
            DtmRegister::Dtmcs => {
                let composed = self.compose_dtmcs();
                self.dtmcs.load(composed as u128);
                self.dtmcs.capture();
            }
            DtmRegister::Dmi => self.dmi.capture(),
            DtmRegister::Bypass => {
                self.bypass.load(0);
                self.bypass.capture();
            }
        }
    }

    fn shift_dr(&mut self, tdi: bool) -> bool {
        match self.selected {
            DtmRegister::IdCode => self.idcode.shift_bit(tdi),
            DtmRegister::Dtmcs => self.dtmcs.shift_bit(tdi),
            DtmRegister::Dmi => self.dmi.shift_bit(tdi),
            DtmRegister::Bypass => self.bypass.shift_bit(tdi),
        }
    }

    fn update_dr(&mut self) {
        match self.selected {
            // read-only, nothing to apply
            DtmRegister::IdCode | DtmRegister::Bypass => {}
            DtmRegister::Dtmcs => self.update_dtmcs(),
            DtmRegister::Dmi => self.update_dmi(),
        }
    }

    fn update_dtmcs(&mut self) {
        let request = Dtmcs(self.dtmcs.shift_value() as u32);

        if request.dmireset() {
            tracing::debug!("dtmcs.dmireset: clearing sticky dmi status");
            self.dmistat = 0;
        }

        if request.dtmhardreset() {
            tracing::debug!("dtmcs.dtmhardreset: resetting pending dmi state");
            self.dmistat = 0;
            self.dmi.load(0);
        }
    }

    /// Apply the shifted `dmi` value: run the requested DM access and latch
    /// the response for the next capture.
    fn update_dmi(&mut self) {
        let request = self.dmi.shift_value();
        let op = (request & DMI_OP_MASK) as u8;
        let address = (request >> DMI_ADDRESS_BIT_OFFSET) as u32 & self.address_mask();
        let data = (request >> DMI_VALUE_BIT_OFFSET) as u32;

        if op == DMI_OP_NOP {
            // A nop collects the previous response, which stays latched in
            // the container.
            tracing::trace!("dmi nop");
            return;
        }

        if self.dmistat != 0 {
            tracing::debug!("dmi access while sticky status {} is set", self.dmistat);
            let response = self.compose_dmi(address, 0, self.dmistat);
            self.dmi.load(response);
            return;
        }

        let outcome = match op {
            DMI_OP_READ => {
                tracing::trace!("dmi read {address:#04x}");
                self.dm.read(address)
            }
            DMI_OP_WRITE => {
                tracing::trace!("dmi write {address:#04x} <- {data:#010x}");
                self.dm.write(address, data)
            }
            _ => {
                tracing::warn!("reserved dmi op {op}");
                Err(DmAccessError::UnknownRegister(address))
            }
        };

        let response = match outcome {
            Ok(value) => self.compose_dmi(address, value, DMI_STATUS_OK),
            Err(error) => {
                tracing::warn!("dmi transaction failed: {error}");
                self.dmistat = DMI_STATUS_FAILED;
                self.compose_dmi(address, 0, DMI_STATUS_FAILED)
            }
        };
        self.dmi.load(response);
    }
}

impl TapObserver for DebugTransportModule {
    fn state_entered(&mut self, state: TapState, edge: ClockEdge, tdi: bool) -> Option<bool> {
        match (state, edge) {
            (TapState::TestLogicReset, ClockEdge::Rising) => {
                self.ir_container = IR_IDCODE;
                None
            }
            // capturing the current instruction back is implementation
            // defined and keeps scans symmetric
            (TapState::CaptureIr, ClockEdge::Rising) => {
                self.ir_shift = self.ir_container;
                None
            }
            (TapState::ShiftIr, ClockEdge::Falling) => {
                let tdo = self.ir_shift & 1 != 0;
                self.ir_shift = (self.ir_shift >> 1) | ((tdi as u8) << (IR_LENGTH - 1));
                Some(tdo)
            }
            (TapState::UpdateIr, ClockEdge::Rising) => {
                self.ir_container = self.ir_shift & 0x1f;
                tracing::debug!(
                    "IR updated to {:#04x} ({:?})",
                    self.ir_container,
                    self.select_register(self.ir_container)
                );
                None
            }
            (TapState::CaptureDr, ClockEdge::Rising) => {
                self.capture_dr();
                None
            }
            (TapState::ShiftDr, ClockEdge::Falling) => Some(self.shift_dr(tdi)),
            (TapState::UpdateDr, ClockEdge::Rising) => {
                self.update_dr();
                None
            }
            _ => None,
        }
    }

    fn tap_reset(&mut self) {
        self.ir_container = IR_IDCODE;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use crate::dm::{self, DebugModule};
    use crate::hart::Hart;
    use crate::image::ProgramImage;

    use super::*;

    fn dtm() -> DebugTransportModule {
        dtm_with_abits(DEFAULT_ABITS)
    }

    fn dtm_with_abits(abits: u32) -> DebugTransportModule {
        let dm = DebugModule::new(Hart::new(0x8000_0000), ProgramImage::new());
        DebugTransportModule::with_abits(dm, abits)
    }

    fn enter(dtm: &mut DebugTransportModule, state: TapState) {
        dtm.state_entered(state, ClockEdge::Rising, false);
    }

    /// Shift `width` bits through the selected DR, skipping the BSCAN
    /// padding bit, and return the assembled LSB-first value.
    fn dr_scan(dtm: &mut DebugTransportModule, value: u128, width: u32) -> u128 {
        enter(dtm, TapState::CaptureDr);
        enter(dtm, TapState::ShiftDr);

        let padding = dtm.state_entered(TapState::ShiftDr, ClockEdge::Falling, false);
        assert_eq!(padding, Some(false));

        let mut result = 0u128;
        for bit in 0..width {
            let tdi = value >> bit & 1 != 0;
            let tdo = dtm
                .state_entered(TapState::ShiftDr, ClockEdge::Falling, tdi)
                .expect("shift must drive TDO");
            result |= (tdo as u128) << bit;
        }

        enter(dtm, TapState::Exit1Dr);
        enter(dtm, TapState::UpdateDr);
        result
    }

    fn ir_scan(dtm: &mut DebugTransportModule, instruction: u8) {
        enter(dtm, TapState::CaptureIr);
        enter(dtm, TapState::ShiftIr);
        for bit in 0..IR_LENGTH {
            let tdi = instruction >> bit & 1 != 0;
            dtm.state_entered(TapState::ShiftIr, ClockEdge::Falling, tdi);
        }
        enter(dtm, TapState::Exit1Ir);
        enter(dtm, TapState::UpdateIr);
    }

    fn dmi_transaction(dtm: &mut DebugTransportModule, address: u32, data: u32, op: u8) -> u128 {
        let request = ((address as u128) << DMI_ADDRESS_BIT_OFFSET)
            | ((data as u128) << DMI_VALUE_BIT_OFFSET)
            | op as u128;
        dr_scan(dtm, request, DMI_ADDRESS_BIT_OFFSET + dtm.abits())
    }

    #[test]
    fn advertised_idcode_is_a_valid_identifier() {
        let idcode = IdCode(IDCODE);
        assert!(idcode.valid());
        assert_eq!(idcode.version(), 2);
    }

    #[test]
    fn idcode_is_selected_after_construction() {
        let mut dtm = dtm();
        let value = dr_scan(&mut dtm, 0, 32);
        assert_eq!(value as u32, IDCODE);
    }

    #[test]
    fn test_logic_reset_reselects_idcode() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DMI);

        enter(&mut dtm, TapState::TestLogicReset);

        let value = dr_scan(&mut dtm, 0, 32);
        assert_eq!(value as u32, IDCODE);
    }

    #[test]
    fn capture_ir_mirrors_the_current_instruction() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DTMCS);

        enter(&mut dtm, TapState::CaptureIr);
        enter(&mut dtm, TapState::ShiftIr);
        let mut mirrored = 0u8;
        for bit in 0..IR_LENGTH {
            let tdo = dtm
                .state_entered(TapState::ShiftIr, ClockEdge::Falling, false)
                .unwrap();
            mirrored |= (tdo as u8) << bit;
        }

        assert_eq!(mirrored, IR_DTMCS);
    }

    #[test]
    fn dtmcs_reports_version_and_abits() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DTMCS);

        let dtmcs = Dtmcs(dr_scan(&mut dtm, 0, 32) as u32);

        assert_eq!(dtmcs.version(), 1);
        assert_eq!(dtmcs.abits(), 7);
        assert_eq!(dtmcs.dmistat(), 0);
        assert_eq!(dtmcs.idle(), 0);
        assert_eq!(dtmcs.errinfo(), 0);
    }

    #[test]
    fn unknown_instruction_behaves_as_bypass() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, 0x0a);

        enter(&mut dtm, TapState::CaptureDr);
        enter(&mut dtm, TapState::ShiftDr);
        let tdi = [true, false, true];
        let mut tdo = Vec::new();
        for &bit in &tdi {
            tdo.push(
                dtm.state_entered(TapState::ShiftDr, ClockEdge::Falling, bit)
                    .unwrap(),
            );
        }

        // one clock of delay, no padding bit
        assert_eq!(tdo, vec![false, true, false]);
    }

    #[test]
    fn dmi_activates_the_debug_module() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DMI);

        dmi_transaction(&mut dtm, dm::DMCONTROL, 1, DMI_OP_WRITE);
        dmi_transaction(&mut dtm, dm::DMCONTROL, 0, DMI_OP_READ);
        let response = dmi_transaction(&mut dtm, 0, 0, DMI_OP_NOP);

        assert_eq!(response & DMI_OP_MASK, DMI_STATUS_OK as u128);
        assert_eq!((response >> DMI_VALUE_BIT_OFFSET) as u32 & 1, 1);
    }

    #[test]
    fn nop_scans_collect_the_previous_response() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DMI);

        dmi_transaction(&mut dtm, dm::DATA0, 0xdead_beef, DMI_OP_WRITE);
        dmi_transaction(&mut dtm, dm::DATA0, 0, DMI_OP_READ);
        let first = dmi_transaction(&mut dtm, 0, 0, DMI_OP_NOP);
        let second = dmi_transaction(&mut dtm, 0, 0, DMI_OP_NOP);

        assert_eq!((first >> DMI_VALUE_BIT_OFFSET) as u32, 0xdead_beef);
        assert_eq!(first, second);
    }

    #[test]
    fn failed_access_sets_sticky_status_until_dmireset() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DMI);

        dmi_transaction(&mut dtm, 0x7f, 0, DMI_OP_READ);
        let failed = dmi_transaction(&mut dtm, 0, 0, DMI_OP_NOP);
        assert_eq!(failed & DMI_OP_MASK, DMI_STATUS_FAILED as u128);

        // still failing without a dmireset, even for a valid address
        let still_failed = dmi_transaction(&mut dtm, dm::DATA0, 0, DMI_OP_READ);
        assert_eq!(still_failed & DMI_OP_MASK, DMI_STATUS_FAILED as u128);

        ir_scan(&mut dtm, IR_DTMCS);
        let mut reset = Dtmcs(0);
        reset.set_dmireset(true);
        dr_scan(&mut dtm, reset.0 as u128, 32);

        ir_scan(&mut dtm, IR_DMI);
        dmi_transaction(&mut dtm, dm::DATA0, 0, DMI_OP_READ);
        let recovered = dmi_transaction(&mut dtm, 0, 0, DMI_OP_NOP);
        assert_eq!(recovered & DMI_OP_MASK, DMI_STATUS_OK as u128);
    }

    #[test]
    fn sticky_status_is_visible_in_dtmcs() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DMI);
        dmi_transaction(&mut dtm, 0x7f, 0, DMI_OP_WRITE);

        ir_scan(&mut dtm, IR_DTMCS);
        let dtmcs = Dtmcs(dr_scan(&mut dtm, 0, 32) as u32);

        assert_eq!(dtmcs.dmistat(), 2);
    }

    #[test]
    fn dtmhardreset_clears_the_dmi_container() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DMI);
        dmi_transaction(&mut dtm, dm::DATA0, 0x5555_5555, DMI_OP_WRITE);

        ir_scan(&mut dtm, IR_DTMCS);
        let mut reset = Dtmcs(0);
        reset.set_dtmhardreset(true);
        dr_scan(&mut dtm, reset.0 as u128, 32);

        ir_scan(&mut dtm, IR_DMI);
        let response = dmi_transaction(&mut dtm, 0, 0, DMI_OP_NOP);
        assert_eq!(response, 0);
    }

    #[test]
    fn reserved_op_fails_the_transaction() {
        let mut dtm = dtm();
        ir_scan(&mut dtm, IR_DMI);

        dmi_transaction(&mut dtm, dm::DATA0, 0, 3);
        let response = dmi_transaction(&mut dtm, 0, 0, DMI_OP_NOP);

        assert_eq!(response & DMI_OP_MASK, DMI_STATUS_FAILED as u128);
    }

    #[test_case(7)]
    #[test_case(16)]
    #[test_case(32)]
    fn dmi_round_trips_at_every_abits(abits: u32) {
        let mut dtm = dtm_with_abits(abits);
        ir_scan(&mut dtm, IR_DMI);

        dmi_transaction(&mut dtm, dm::DATA11, 0xa5a5_a5a5, DMI_OP_WRITE);
        dmi_transaction(&mut dtm, dm::DATA11, 0, DMI_OP_READ);
        let response = dmi_transaction(&mut dtm, 0, 0, DMI_OP_NOP);

        assert_eq!((response >> DMI_VALUE_BIT_OFFSET) as u32, 0xa5a5_a5a5);
        assert_eq!(
            (response >> DMI_ADDRESS_BIT_OFFSET) as u32,
            dm::DATA11,
            "the response must echo the request address"
        );
    }

    #[test_case(7, 0x7f)]
    #[test_case(16, 0xffff)]
    #[test_case(32, 0xffff_ffff)]
    fn address_mask_follows_abits(abits: u32, expected: u32) {
        let dtm = dtm_with_abits(abits);
        assert_eq!(dtm.address_mask(), expected);
    }
}
