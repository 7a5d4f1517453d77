//! Simulated board I/O: power rails, auxiliary lines, knob ADC, watchdog.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use arm_common::consts::KNOB_ADC_CENTER;
use arm_common::hal::{Board, OutputLine};
use tracing::trace;

#[derive(Debug, Default)]
struct BoardState {
    lines: HashMap<OutputLine, bool>,
    /// Every line change in order.
    line_log: Vec<(OutputLine, bool)>,
    knob: u16,
    analog_reference: bool,
    watchdog_kicks: u32,
}

/// Board simulator handle.
#[derive(Debug, Clone)]
pub struct SimBoard {
    state: Rc<RefCell<BoardState>>,
}

impl SimBoard {
    /// Board with all lines low and the knob centered.
    pub fn new() -> Self {
        let state = BoardState {
            knob: KNOB_ADC_CENTER as u16,
            ..BoardState::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Level of a line; lines never driven read low.
    pub fn line(&self, line: OutputLine) -> bool {
        self.state.borrow().lines.get(&line).copied().unwrap_or(false)
    }

    /// All line changes since creation, oldest first.
    pub fn line_log(&self) -> Vec<(OutputLine, bool)> {
        self.state.borrow().line_log.clone()
    }

    pub fn clear_line_log(&self) {
        self.state.borrow_mut().line_log.clear();
    }

    /// Position the knob (raw 10-bit sample).
    pub fn set_knob(&self, sample: u16) {
        self.state.borrow_mut().knob = sample;
    }

    pub fn analog_reference_initialized(&self) -> bool {
        self.state.borrow().analog_reference
    }

    pub fn watchdog_kicks(&self) -> u32 {
        self.state.borrow().watchdog_kicks
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Board for SimBoard {
    fn set_line(&mut self, line: OutputLine, high: bool) {
        trace!(?line, high, "line");
        let mut state = self.state.borrow_mut();
        state.lines.insert(line, high);
        state.line_log.push((line, high));
    }

    fn read_knob(&mut self) -> u16 {
        self.state.borrow().knob
    }

    fn init_analog_reference(&mut self) {
        self.state.borrow_mut().analog_reference = true;
    }

    fn watchdog_reset(&mut self) {
        self.state.borrow_mut().watchdog_kicks += 1;
    }
}
