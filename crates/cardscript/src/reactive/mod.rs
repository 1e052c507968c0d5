//! Owners and the two-phase update protocol
//!
//! An owner holds scripts (a field's value script, a style's geometry) and
//! re-runs them when their inputs change. Each render cycle has two
//! phases around layout: phase 1 runs the scripts that do not read
//! measured content, the layout collaborator then measures, and phase 2
//! runs only the content-dependent scripts. Errors are caught at the
//! owner boundary, handed to the context's [`ErrorReporter`], and leave
//! the owner's previous value in place.

mod field;
mod scriptable;
mod style;
mod template;

pub use field::FieldValue;
pub use scriptable::{FromScript, Scriptable};
pub use style::{Measurement, Style, StyleListener};
pub use template::Template;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::error;

use crate::context::Context;
use crate::dependency::{Dependency, DependentScripts};
use crate::error::{EvalError, Result};

// ═══════════════════════════════════════════════════════════════════════
// Change Mask
// ═══════════════════════════════════════════════════════════════════════

/// Which categories of downstream state an update made stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeMask(u32);

impl ChangeMask {
    /// Nothing changed
    pub const NONE: ChangeMask = ChangeMask(0);

    /// Something other than size or mask changed
    pub const OTHER: ChangeMask = ChangeMask(1);

    /// Position or size changed
    pub const SIZE: ChangeMask = ChangeMask(2);

    /// The mask image changed
    pub const MASK: ChangeMask = ChangeMask(4);

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// True if nothing changed.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag of `other` is set.
    pub fn contains(self, other: ChangeMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ChangeMask {
    type Output = ChangeMask;

    fn bitor(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeMask {
    fn bitor_assign(&mut self, rhs: ChangeMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ChangeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = [
            (ChangeMask::OTHER, "other"),
            (ChangeMask::SIZE, "size"),
            (ChangeMask::MASK, "mask"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        write!(f, "{}", names.join("|"))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Owners
// ═══════════════════════════════════════════════════════════════════════

/// A script-bearing object taking part in the update protocol.
pub trait Owner {
    /// Register `dep` with everything this owner's scripts read.
    ///
    /// Called once when the template is linked.
    fn init_dependencies(&self, ctx: &mut Context, dep: &Dependency) -> Result<()>;

    /// Re-run scripts and report what changed.
    ///
    /// With `only_content_dependent` only scripts that read measured
    /// content run; without it only the others do. Errors are reported
    /// through the context and leave the affected values unchanged.
    fn update(&mut self, ctx: &mut Context, only_content_dependent: bool) -> ChangeMask;

    /// Owners to update when this owner's value changes.
    fn dependent_scripts(&self) -> &Arc<DependentScripts>;
}

// ═══════════════════════════════════════════════════════════════════════
// Error Reporting
// ═══════════════════════════════════════════════════════════════════════

/// An error caught at an owner boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptErrorReport {
    /// Name of the owner whose script failed
    pub owner: String,

    /// The property whose script failed
    pub property: String,

    /// What went wrong
    pub error: EvalError,

    /// Call sites the error unwound through, innermost first
    pub backtrace: Vec<String>,
}

impl ScriptErrorReport {
    /// Build a report, taking the backtrace from the context.
    pub fn new(ctx: &mut Context, owner: &str, property: &str, error: EvalError) -> Self {
        Self {
            owner: owner.to_string(),
            property: property.to_string(),
            error,
            backtrace: ctx.take_backtrace(),
        }
    }
}

impl fmt::Display for ScriptErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.owner, self.property, self.error)?;
        for frame in &self.backtrace {
            write!(f, "\n  {}", frame)?;
        }
        Ok(())
    }
}

/// Displays errors caught by owners.
pub trait ErrorReporter: Send + Sync {
    /// Show one error.
    fn report(&self, report: &ScriptErrorReport);
}

/// Logs errors through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ScriptErrorReport) {
        error!(
            owner = %report.owner,
            property = %report.property,
            backtrace = ?report.backtrace,
            "script error: {}",
            report.error
        );
    }
}

/// Keeps errors for later display.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<ScriptErrorReport>>,
}

impl CollectingReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the collected reports.
    pub fn take(&self) -> Vec<ScriptErrorReport> {
        std::mem::take(&mut *self.reports.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, report: &ScriptErrorReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mask_combines() {
        let mut mask = ChangeMask::NONE;
        assert!(mask.is_empty());
        mask |= ChangeMask::SIZE;
        mask = mask | ChangeMask::MASK;
        assert!(mask.contains(ChangeMask::SIZE));
        assert!(!mask.contains(ChangeMask::OTHER));
        assert_eq!(mask.bits(), 6);
        assert_eq!(mask.to_string(), "size|mask");
    }

    #[test]
    fn test_report_display() {
        let report = ScriptErrorReport {
            owner: "title".to_string(),
            property: "width".to_string(),
            error: EvalError::DivisionByZero,
            backtrace: vec!["in function f".to_string()],
        };
        assert_eq!(
            report.to_string(),
            "title.width: Division by zero\n  in function f"
        );
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::new();
        let mut ctx = Context::new();
        reporter.report(&ScriptErrorReport::new(
            &mut ctx,
            "a",
            "b",
            EvalError::Interrupted,
        ));
        assert_eq!(reporter.take().len(), 1);
        assert!(reporter.take().is_empty());
    }
}
