//! estimation::status — result codes, run summaries and status rendering.
//!
//! - [`ResultCode`]: terminal classification of a `maximize` call, with the
//!   stable numeric codes reported to callers.
//! - [`EstimationSummary`]: starting/best objective, code, stop reason,
//!   iteration count and the best-objective trace.
//! - [`StatusFlags`] / [`render_status`]: one row per parameter with the
//!   selected columns.
use std::fmt::{self, Write as _};
use std::ops::{BitOr, BitOrAssign};

use crate::estimation::types::{Grad, Theta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Convergence tolerance reached.
    Success,
    /// Improved but the strategy's iteration cap was reached first.
    Improved,
    /// Improvements stayed below the minimum for too many iterations.
    Slow,
    /// No improving step could be found.
    Stuck,
    /// A line search ended in NaN at its minimum step.
    Error,
    MaxIterations,
    /// The convergence statistic could not be computed.
    NanTolerance,
}

impl ResultCode {
    pub fn code(self) -> i32 {
        match self {
            ResultCode::Success => 2,
            ResultCode::Improved => 1,
            ResultCode::Slow => 0,
            ResultCode::Stuck => -1,
            ResultCode::Error => -2,
            ResultCode::MaxIterations => -6,
            ResultCode::NanTolerance => -7,
        }
    }

    pub fn is_converged(self) -> bool {
        self == ResultCode::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultCode::Success => "success",
            ResultCode::Improved => "improved",
            ResultCode::Slow => "slow",
            ResultCode::Stuck => "stuck",
            ResultCode::Error => "error",
            ResultCode::MaxIterations => "max iterations",
            ResultCode::NanTolerance => "NaN tolerance",
        };
        f.write_str(s)
    }
}

/// Outcome of the most recent `maximize` call.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationSummary {
    pub starting_loglike: f64,
    pub best_loglike: f64,
    pub code: ResultCode,
    pub explain_stop: String,
    pub iterations: usize,
    /// Best objective after the start and after each accepted step.
    pub best_trace: Vec<f64>,
}

/// Column selection for [`render_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const NAMES: StatusFlags = StatusFlags(0x01);
    pub const CURRENT: StatusFlags = StatusFlags(0x02);
    pub const LAST_TURN: StatusFlags = StatusFlags(0x04);
    pub const DIRECTION: StatusFlags = StatusFlags(0x08);
    pub const GRADIENT: StatusFlags = StatusFlags(0x10);
    pub const ALL: StatusFlags = StatusFlags(0x1f);

    pub fn contains(self, other: StatusFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for StatusFlags {
    type Output = StatusFlags;

    fn bitor(self, rhs: StatusFlags) -> StatusFlags {
        StatusFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for StatusFlags {
    fn bitor_assign(&mut self, rhs: StatusFlags) {
        self.0 |= rhs.0;
    }
}

/// Inputs to [`render_status`]. Missing vectors render as NaN.
#[derive(Debug, Clone, Copy)]
pub struct StatusColumns<'a> {
    pub names: &'a [String],
    pub current: &'a Theta,
    pub last_turn: &'a Theta,
    pub direction: Option<&'a Theta>,
    pub gradient: Option<&'a Grad>,
}

/// Plain-text table with a header line and one row per parameter.
pub fn render_status(columns: &StatusColumns<'_>, flags: StatusFlags) -> String {
    let mut out = String::new();
    let mut header: Vec<&str> = Vec::new();
    if flags.contains(StatusFlags::NAMES) {
        header.push("name");
    }
    let numeric = [
        (StatusFlags::CURRENT, "current"),
        (StatusFlags::LAST_TURN, "last_turn"),
        (StatusFlags::DIRECTION, "direction"),
        (StatusFlags::GRADIENT, "gradient"),
    ];
    header.extend(numeric.iter().filter(|(f, _)| flags.contains(*f)).map(|(_, h)| *h));
    if header.is_empty() {
        return out;
    }
    let _ = writeln!(out, "{}", header.join("\t"));

    let pick = |v: Option<&Theta>, i: usize| v.and_then(|v| v.get(i).copied()).unwrap_or(f64::NAN);
    for (i, name) in columns.names.iter().enumerate() {
        let mut cells: Vec<String> = Vec::new();
        if flags.contains(StatusFlags::NAMES) {
            cells.push(name.clone());
        }
        if flags.contains(StatusFlags::CURRENT) {
            cells.push(format!("{:.6e}", pick(Some(columns.current), i)));
        }
        if flags.contains(StatusFlags::LAST_TURN) {
            cells.push(format!("{:.6e}", pick(Some(columns.last_turn), i)));
        }
        if flags.contains(StatusFlags::DIRECTION) {
            cells.push(format!("{:.6e}", pick(columns.direction, i)));
        }
        if flags.contains(StatusFlags::GRADIENT) {
            cells.push(format!("{:.6e}", pick(columns.gradient, i)));
        }
        let _ = writeln!(out, "{}", cells.join("\t"));
    }
    out
}
