//! The Remote Bitbang front end.
//!
//! A single-client TCP server speaking OpenOCD's Remote Bitbang protocol:
//! one ASCII byte per command, one ASCII bit per response. Each tick
//! processes at most one command, so a surrounding simulation loop can
//! interleave its own work. Pin writes are translated into TCK edges which
//! drive the TAP state machine and, through it, the DTM register layer.

mod command;

pub use command::BitbangCommand;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crate::dtm::DebugTransportModule;
use crate::jtag::TapStateMachine;

/// Poll interval while waiting for a client to connect.
const ACCEPT_POLL: Duration = Duration::from_millis(300);

/// Poll interval while waiting for the next command byte.
const READ_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A socket operation failed with something other than `WouldBlock`.
    #[error("remote bitbang socket failure")]
    Socket(#[from] io::Error),
}

/// The JTAG pin levels as driven by the client.
///
/// Only `tdo` flows back to the client; the rest mirror the most recent
/// write so an FPGA-facing driver could forward them.
#[derive(Debug, Clone, Copy)]
pub struct PinState {
    pub tck: bool,
    pub tms: bool,
    pub tdi: bool,
    pub tdo: bool,
    /// TAP reset, active low.
    pub trstn: bool,
}

impl Default for PinState {
    fn default() -> Self {
        Self {
            tck: true,
            tms: true,
            tdi: true,
            tdo: false,
            trstn: true,
        }
    }
}

/// The Remote Bitbang server and tick loop.
#[derive(Debug)]
pub struct RemoteBitbang {
    listener: TcpListener,
    client: Option<TcpStream>,
    pins: PinState,
    blink: bool,
    quit: bool,
    tap: TapStateMachine,
    dtm: DebugTransportModule,
}

impl RemoteBitbang {
    /// Bind the listening socket. Pass port 0 to let the kernel pick one.
    pub fn bind(addr: impl ToSocketAddrs, dtm: DebugTransportModule) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!("listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            client: None,
            pins: PinState::default(),
            blink: false,
            quit: false,
            tap: TapStateMachine::new(),
            dtm,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// True once the client has quit or disconnected.
    pub fn done(&self) -> bool {
        self.quit
    }

    pub fn pins(&self) -> PinState {
        self.pins
    }

    /// Run ticks until the session ends or a fatal socket error occurs.
    pub fn run(&mut self) -> Result<(), ServerError> {
        while !self.quit {
            self.tick()?;
        }
        Ok(())
    }

    /// One iteration of the main loop: make sure a client is connected,
    /// then execute at most one command.
    pub fn tick(&mut self) -> Result<(), ServerError> {
        if self.client.is_none() {
            self.accept_client()?;
        }
        self.execute_command()
    }

    fn accept_client(&mut self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(true)?;
                    tracing::info!("accepted client {peer}");
                    self.client = Some(stream);
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(error) => {
                    tracing::error!("failed to accept on socket: {error}");
                    return Err(error.into());
                }
            }
        }
    }

    fn execute_command(&mut self) -> Result<(), ServerError> {
        let byte = loop {
            let Some(client) = self.client.as_mut() else {
                return Ok(());
            };

            let mut buf = [0u8; 1];
            match client.read(&mut buf) {
                Ok(0) => {
                    // the peer closed the connection; same as a quit
                    tracing::info!("remote end disconnected");
                    self.disconnect();
                    return Ok(());
                }
                Ok(_) => break buf[0],
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(READ_POLL);
                }
                Err(error) => {
                    tracing::error!("failed to read from client: {error}");
                    return Err(error.into());
                }
            }
        };

        self.dispatch(byte)
    }

    fn dispatch(&mut self, byte: u8) -> Result<(), ServerError> {
        tracing::trace!("command {:?}", byte as char);

        match BitbangCommand::from_byte(byte) {
            Some(BitbangCommand::Write { tck, tms, tdi }) => self.write_pins(tck, tms, tdi),
            Some(BitbangCommand::Read) => {
                let level = if self.pins.tdo { b'1' } else { b'0' };
                self.send(level)?;
            }
            Some(BitbangCommand::Reset { trst, srst }) => self.reset(trst, srst),
            Some(BitbangCommand::Blink(on)) => {
                self.blink = on;
                tracing::debug!("blink {}", if on { "on" } else { "off" });
            }
            Some(BitbangCommand::Quit) => {
                tracing::info!("client quit");
                self.disconnect();
            }
            Some(BitbangCommand::Swd) => {
                tracing::trace!("ignoring SWD command {:?}", byte as char);
            }
            None => {
                tracing::warn!("got unsupported command {:?}", byte as char);
            }
        }

        Ok(())
    }

    /// Apply a pin write and derive the TCK edge from the previous level.
    fn write_pins(&mut self, tck: bool, tms: bool, tdi: bool) {
        let rising = !self.pins.tck && tck;
        let falling = self.pins.tck && !tck;

        self.pins.tck = tck;
        self.pins.tms = tms;
        self.pins.tdi = tdi;

        let driven = if rising {
            self.tap.rising_edge(tms, tdi, &mut self.dtm)
        } else if falling {
            self.tap.falling_edge(tdi, &mut self.dtm)
        } else {
            None
        };

        if let Some(tdo) = driven {
            self.pins.tdo = tdo;
        }
    }

    /// Any reset command forces the TAP into Test-Logic-Reset.
    fn reset(&mut self, trst: bool, srst: bool) {
        tracing::debug!("reset trst={trst} srst={srst}");
        self.pins.trstn = !trst;
        self.tap.reset(&mut self.dtm);
    }

    /// Spin until the kernel accepts the response byte.
    fn send(&mut self, byte: u8) -> Result<(), ServerError> {
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };

        loop {
            match client.write(&[byte]) {
                Ok(0) => {}
                Ok(_) => return Ok(()),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {}
                Err(error) => {
                    tracing::error!("failed to write to client: {error}");
                    return Err(error.into());
                }
            }
        }
    }

    fn disconnect(&mut self) {
        self.client = None;
        self.quit = true;
    }
}
