//! The OpenOCD Remote Bitbang command grammar.
//!
//! Every command is a single ASCII byte. The digits `'0'..='7'` encode the
//! three driven pins, `R` requests the current TDO level, `r`..`u` pulse the
//! reset lines, `Q` ends the session. SWD traffic is recognized so it can be
//! ignored without tripping the unknown-command path.

/// One decoded Remote Bitbang command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitbangCommand {
    /// Drive TCK, TMS and TDI to the given levels.
    Write { tck: bool, tms: bool, tdi: bool },
    /// Read the current TDO level back as ASCII `'0'`/`'1'`.
    Read,
    /// Drive the reset lines; `trst` and `srst` are the requested levels.
    Reset { trst: bool, srst: bool },
    /// Turn the blink indicator on or off.
    Blink(bool),
    /// Close the session.
    Quit,
    /// An SWD command this JTAG-only target ignores.
    Swd,
}

impl BitbangCommand {
    /// Decode a command byte. Returns `None` for bytes outside the
    /// protocol.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0'..=b'7' => {
                let bits = byte - b'0';
                Some(BitbangCommand::Write {
                    tck: bits & 0b100 != 0,
                    tms: bits & 0b010 != 0,
                    tdi: bits & 0b001 != 0,
                })
            }
            b'R' => Some(BitbangCommand::Read),
            b'r'..=b'u' => {
                let bits = byte - b'r';
                Some(BitbangCommand::Reset {
                    trst: bits & 0b10 != 0,
                    srst: bits & 0b01 != 0,
                })
            }
            b'B' => Some(BitbangCommand::Blink(true)),
            b'b' => Some(BitbangCommand::Blink(false)),
            b'Q' => Some(BitbangCommand::Quit),
            b'O' | b'o' | b'c' | b'd' | b'e' | b'f' | b'g' => Some(BitbangCommand::Swd),
            _ => None,
        }
    }
}
