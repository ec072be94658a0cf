use super::{ClockEdge, TapObserver};

/// The sixteen states of the IEEE 1149.1 TAP controller.
///
/// The two scan columns are symmetric: the DR column feeds the data register
/// selected by the current instruction, the IR column feeds the instruction
/// register itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    SelectIrScan,
    CaptureDr,
    CaptureIr,
    ShiftDr,
    ShiftIr,
    Exit1Dr,
    Exit1Ir,
    PauseDr,
    PauseIr,
    Exit2Dr,
    Exit2Ir,
    UpdateDr,
    UpdateIr,
}

impl TapState {
    /// All states, for exhaustive iteration in tests.
    pub const ALL: [TapState; 16] = [
        TapState::TestLogicReset,
        TapState::RunTestIdle,
        TapState::SelectDrScan,
        TapState::SelectIrScan,
        TapState::CaptureDr,
        TapState::CaptureIr,
        TapState::ShiftDr,
        TapState::ShiftIr,
        TapState::Exit1Dr,
        TapState::Exit1Ir,
        TapState::PauseDr,
        TapState::PauseIr,
        TapState::Exit2Dr,
        TapState::Exit2Ir,
        TapState::UpdateDr,
        TapState::UpdateIr,
    ];

    /// The successor state for a rising TCK edge with the given TMS level.
    ///
    /// Total over `(state, tms)`; there is no failure branch.
    pub fn step(self, tms: bool) -> TapState {
        match self {
            TapState::TestLogicReset => {
                if tms {
                    TapState::TestLogicReset
                } else {
                    TapState::RunTestIdle
                }
            }
            TapState::RunTestIdle => {
                if tms {
                    TapState::SelectDrScan
                } else {
                    TapState::RunTestIdle
                }
            }
            TapState::SelectDrScan => {
                if tms {
                    TapState::SelectIrScan
                } else {
                    TapState::CaptureDr
                }
            }
            TapState::SelectIrScan => {
                if tms {
                    TapState::TestLogicReset
                } else {
                    TapState::CaptureIr
                }
            }
            TapState::CaptureDr => {
                if tms {
                    TapState::Exit1Dr
                } else {
                    TapState::ShiftDr
                }
            }
            TapState::CaptureIr => {
                if tms {
                    TapState::Exit1Ir
                } else {
                    TapState::ShiftIr
                }
            }
            TapState::ShiftDr => {
                if tms {
                    TapState::Exit1Dr
                } else {
                    TapState::ShiftDr
                }
            }
            TapState::ShiftIr => {
                if tms {
                    TapState::Exit1Ir
                } else {
                    TapState::ShiftIr
                }
            }
            TapState::Exit1Dr => {
                if tms {
                    TapState::UpdateDr
                } else {
                    TapState::PauseDr
                }
            }
            TapState::Exit1Ir => {
                if tms {
                    TapState::UpdateIr
                } else {
                    TapState::PauseIr
                }
            }
            TapState::PauseDr => {
                if tms {
                    TapState::Exit2Dr
                } else {
                    TapState::PauseDr
                }
            }
            TapState::PauseIr => {
                if tms {
                    TapState::Exit2Ir
                } else {
                    TapState::PauseIr
                }
            }
            TapState::Exit2Dr => {
                if tms {
                    TapState::UpdateDr
                } else {
                    TapState::ShiftDr
                }
            }
            TapState::Exit2Ir => {
                if tms {
                    TapState::UpdateIr
                } else {
                    TapState::ShiftIr
                }
            }
            TapState::UpdateDr => {
                if tms {
                    TapState::SelectDrScan
                } else {
                    TapState::RunTestIdle
                }
            }
            TapState::UpdateIr => {
                if tms {
                    TapState::SelectDrScan
                } else {
                    TapState::RunTestIdle
                }
            }
        }
    }
}

/// The TAP controller proper.
///
/// State only changes on [`rising_edge`](Self::rising_edge); the falling
/// edge merely gives the observer a chance to shift TDO out while in one of
/// the SHIFT states.
#[derive(Debug)]
pub struct TapStateMachine {
    state: TapState,
}

impl Default for TapStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TapStateMachine {
    pub fn new() -> Self {
        Self {
            state: TapState::TestLogicReset,
        }
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    /// Advance the controller on a rising TCK edge and notify the observer
    /// of the state that was entered. Returns the TDO level if the observer
    /// drives it.
    pub fn rising_edge(
        &mut self,
        tms: bool,
        tdi: bool,
        observer: &mut impl TapObserver,
    ) -> Option<bool> {
        self.state = self.state.step(tms);
        tracing::trace!("TAP entered {:?}", self.state);
        observer.state_entered(self.state, ClockEdge::Rising, tdi)
    }

    /// Report a falling TCK edge. The state does not change; the observer
    /// shifts a bit out if the TAP sits in `ShiftDr` or `ShiftIr`.
    pub fn falling_edge(&mut self, tdi: bool, observer: &mut impl TapObserver) -> Option<bool> {
        observer.state_entered(self.state, ClockEdge::Falling, tdi)
    }

    /// Force the controller into `TestLogicReset`, as TRST or one of the
    /// bitbang reset commands does.
    pub fn reset(&mut self, observer: &mut impl TapObserver) {
        self.state = TapState::TestLogicReset;
        observer.tap_reset();
    }
}
