//! A RISC-V debug target emulator behind OpenOCD's Remote Bitbang protocol.
//!
//! The emulator terminates a Remote Bitbang TCP connection and presents a
//! JTAG Debug Transport Module conforming to the RISC-V External Debug
//! Specification 1.0, backed by a single permanently halted hart and a
//! program image loaded from an Intel HEX file. An off-the-shelf debugger
//! (OpenOCD, then GDB) can attach, enumerate the hart, and read and write
//! registers and memory without any hardware present.
//!
//! Three layered state machines do the work:
//!
//! 1. [`bitbang`] decodes the ASCII command stream into pin levels and TCK
//!    edges.
//! 2. [`jtag`] advances the 16-state TAP controller and clocks the selected
//!    scan register.
//! 3. [`dtm`] implements the IR/DR discipline over `IDCODE`, `dtmcs` and
//!    `dmi`, tunneling DMI transactions into the [`dm`] register file.

pub mod bitbang;
pub mod dm;
pub mod dtm;
pub mod hart;
pub mod image;
pub mod jtag;
pub mod loader;

pub use bitbang::{RemoteBitbang, ServerError};
pub use dm::DebugModule;
pub use dtm::DebugTransportModule;
pub use hart::Hart;
pub use image::ProgramImage;
pub use loader::LoaderError;
