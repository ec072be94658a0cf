//! Bit layouts of the Debug Module registers, as described in the RISC-V
//! debug specification v1.0.

use bitfield::bitfield;

bitfield! {
    /// `dmcontrol` register, located at address 0x10.
    #[derive(Copy, Clone, Default)]
    pub struct Dmcontrol(u32);
    impl Debug;

    pub haltreq, set_haltreq: 31;
    pub resumereq, set_resumereq: 30;
    pub hartreset, set_hartreset: 29;
    pub ackhavereset, set_ackhavereset: 28;
    pub ackunavail, set_ackunavail: 27;
    pub hasel, set_hasel: 26;
    pub hartsello, set_hartsello: 25, 16;
    pub hartselhi, set_hartselhi: 15, 6;
    pub setkeepalive, set_setkeepalive: 5;
    pub clrkeepalive, set_clrkeepalive: 4;
    pub setresethaltreq, set_setresethaltreq: 3;
    pub clrresethaltreq, set_clrresethaltreq: 2;
    pub ndmreset, set_ndmreset: 1;
    pub dmactive, set_dmactive: 0;
}

impl Dmcontrol {
    /// Currently selected hart, combining `hartselhi` and `hartsello`.
    pub fn hartsel(&self) -> u32 {
        self.hartselhi() << 10 | self.hartsello()
    }

    /// Set the selected hart. This is a 20 bit value, larger values are
    /// truncated.
    pub fn set_hartsel(&mut self, value: u32) {
        self.set_hartsello(value & 0x3ff);
        self.set_hartselhi((value >> 10) & 0x3ff);
    }
}

impl From<Dmcontrol> for u32 {
    fn from(register: Dmcontrol) -> Self {
        register.0
    }
}

impl From<u32> for Dmcontrol {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

bitfield! {
    /// Readonly `dmstatus` register, located at address 0x11.
    ///
    /// Composed on every read, never stored.
    #[derive(Copy, Clone)]
    pub struct Dmstatus(u32);
    impl Debug;

    pub impebreak, set_impebreak: 22;
    pub allhavereset, set_allhavereset: 19;
    pub anyhavereset, set_anyhavereset: 18;
    pub allresumeack, set_allresumeack: 17;
    pub anyresumeack, set_anyresumeack: 16;
    pub allnonexistent, set_allnonexistent: 15;
    pub anynonexistent, set_anynonexistent: 14;
    pub allunavail, set_allunavail: 13;
    pub anyunavail, set_anyunavail: 12;
    pub allrunning, set_allrunning: 11;
    pub anyrunning, set_anyrunning: 10;
    pub allhalted, set_allhalted: 9;
    pub anyhalted, set_anyhalted: 8;
    pub authenticated, set_authenticated: 7;
    pub authbusy, set_authbusy: 6;
    pub hasresethaltreq, set_hasresethaltreq: 5;
    pub confstrptrvalid, set_confstrptrvalid: 4;
    pub version, set_version: 3, 0;
}

impl From<Dmstatus> for u32 {
    fn from(register: Dmstatus) -> Self {
        register.0
    }
}

bitfield! {
    /// Abstract control and status (`abstractcs`), located at address 0x16.
    #[derive(Copy, Clone)]
    pub struct Abstractcs(u32);
    impl Debug;

    pub progbufsize, set_progbufsize: 28, 24;
    pub busy, set_busy: 12;
    pub relaxedpriv, set_relaxedpriv: 11;
    pub cmderr, set_cmderr: 10, 8;
    pub datacount, set_datacount: 3, 0;
}

impl From<Abstractcs> for u32 {
    fn from(register: Abstractcs) -> Self {
        register.0
    }
}

impl From<u32> for Abstractcs {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

bitfield! {
    /// Abstract command autoexec (`abstractauto`), located at address 0x18.
    ///
    /// When a data bit is set, accesses to the corresponding `data` register
    /// re-execute the command in `command`. The progbuf half is forced to
    /// zero since no program buffer is implemented.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Abstractauto(u32);
    impl Debug;

    pub autoexecprogbuf, set_autoexecprogbuf: 31, 16;
    pub autoexecdata, set_autoexecdata: 11, 0;
}

impl From<Abstractauto> for u32 {
    fn from(register: Abstractauto) -> Self {
        register.0
    }
}

impl From<u32> for Abstractauto {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

bitfield! {
    /// Access Register abstract command word, written to `command` (0x17)
    /// with `cmdtype` 0.
    #[derive(Copy, Clone)]
    pub struct AccessRegisterCommand(u32);
    impl Debug;

    pub cmdtype, set_cmdtype: 31, 24;
    /// 2 selects a 32 bit transfer; everything else is refused.
    pub aarsize, set_aarsize: 22, 20;
    pub aarpostincrement, set_aarpostincrement: 19;
    pub postexec, set_postexec: 18;
    pub transfer, set_transfer: 17;
    pub write, set_write: 16;
    pub regno, set_regno: 15, 0;
}

impl From<AccessRegisterCommand> for u32 {
    fn from(register: AccessRegisterCommand) -> Self {
        register.0
    }
}

impl From<u32> for AccessRegisterCommand {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

bitfield! {
    /// Access Memory abstract command word, written to `command` (0x17)
    /// with `cmdtype` 2.
    #[derive(Copy, Clone)]
    pub struct AccessMemoryCommand(u32);
    impl Debug;

    pub cmdtype, set_cmdtype: 31, 24;
    pub aamvirtual, set_aamvirtual: 23;
    /// 2 selects a 32 bit access; everything else is refused.
    pub aamsize, set_aamsize: 22, 20;
    pub aampostincrement, set_aampostincrement: 19;
    pub write, set_write: 16;
}

impl From<AccessMemoryCommand> for u32 {
    fn from(register: AccessMemoryCommand) -> Self {
        register.0
    }
}

impl From<u32> for AccessMemoryCommand {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Errors an abstract command can leave behind in `abstractcs.cmderr`.
///
/// The field is write-1-to-clear and no new command starts while it is
/// nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractCommandErrorKind {
    /// No error happened.
    None = 0,
    /// An abstract command was executing while `command`, `abstractcs` or a
    /// `data` register was accessed.
    Busy = 1,
    /// The requested command is not supported.
    NotSupported = 2,
    /// An exception occurred while executing the command.
    Exception = 3,
    /// The hart was not in the state the command requires.
    HaltResume = 4,
    /// The command failed due to a bus error.
    Bus = 5,
    /// The command failed for another reason.
    Other = 7,
}
