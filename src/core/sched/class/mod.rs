//! Scheduling classes
//!
//! A class is a policy: it decides how its threads are queued and which
//! one it offers when the dispatcher asks. The set is closed; every
//! variant implements [`ClassOps`]. Run queue storage for a class lives
//! in each per-CPU context, so the hooks get the context they operate on.

mod idle;
mod rt;
mod sporadic;
mod tp;
mod weak;

pub use sporadic::{Replenishment, SporadicParam, SporadicState};
pub use tp::{TpRq, TpWindow};

use core::fmt;

use crate::config::{
    CFG_CLASS_WEIGHT_FACTOR, CFG_IDLE_PRIO, CFG_RT_MAX_PRIO, CFG_RT_MIN_PRIO,
    CFG_WEAK_MAX_PRIO, CFG_WEAK_MIN_PRIO,
};
use crate::error::{SchedError, SchedResult};
use crate::thread::Thread;
use crate::types::{CpuId, Prio, ThreadId};

use super::ctx::SchedCtx;

/// Scheduling class identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedClass {
    /// Per-CPU root thread only, always runnable
    Idle,
    /// Non real-time threads, above idle only
    Weak,
    /// Time partitions
    Tp,
    /// POSIX sporadic server
    Sporadic,
    /// Fixed-priority real-time (FIFO, optional round-robin)
    Rt,
}

impl SchedClass {
    /// Every class, by increasing weight
    pub const ALL: [SchedClass; 5] = [
        SchedClass::Idle,
        SchedClass::Weak,
        SchedClass::Tp,
        SchedClass::Sporadic,
        SchedClass::Rt,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            SchedClass::Idle => "idle",
            SchedClass::Weak => "weak",
            SchedClass::Tp => "tp",
            SchedClass::Sporadic => "pss",
            SchedClass::Rt => "rt",
        }
    }

    /// Class weight, added to a priority to compare across classes
    pub const fn weight(self) -> Prio {
        let step = match self {
            SchedClass::Idle => 0,
            SchedClass::Weak => 1,
            SchedClass::Tp => 2,
            SchedClass::Sporadic => 3,
            SchedClass::Rt => 4,
        };
        step * CFG_CLASS_WEIGHT_FACTOR
    }

    /// Priority range accepted by the class
    pub const fn prio_range(self) -> (Prio, Prio) {
        match self {
            SchedClass::Idle => (CFG_IDLE_PRIO, CFG_IDLE_PRIO),
            SchedClass::Weak => (CFG_WEAK_MIN_PRIO, CFG_WEAK_MAX_PRIO),
            SchedClass::Tp | SchedClass::Sporadic | SchedClass::Rt => {
                (CFG_RT_MIN_PRIO, CFG_RT_MAX_PRIO)
            }
        }
    }

    /// Policy hooks of the class
    pub(crate) fn ops(self) -> &'static dyn ClassOps {
        match self {
            SchedClass::Idle => &idle::IdleClass,
            SchedClass::Weak => &weak::WeakClass,
            SchedClass::Tp => &tp::TpClass,
            SchedClass::Sporadic => &sporadic::SporadicClass,
            SchedClass::Rt => &rt::RtClass,
        }
    }
}

impl fmt::Display for SchedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Class-specific scheduling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyParam {
    Idle { prio: Prio },
    Weak { prio: Prio },
    Rt { prio: Prio },
    Tp { prio: Prio, ptid: i32 },
    Sporadic(SporadicParam),
}

impl PolicyParam {
    /// Priority the thread runs at with these parameters
    pub const fn prio(&self) -> Prio {
        match *self {
            PolicyParam::Idle { prio }
            | PolicyParam::Weak { prio }
            | PolicyParam::Rt { prio }
            | PolicyParam::Tp { prio, .. } => prio,
            PolicyParam::Sporadic(p) => p.normal_prio,
        }
    }
}

/// Check `prio` against the range of `class`
pub(crate) fn check_prio(class: SchedClass, prio: Prio) -> SchedResult<()> {
    let (lo, hi) = class.prio_range();
    if prio < lo || prio > hi {
        return Err(SchedError::InvalidPriority);
    }
    Ok(())
}

/// Scheduling class hooks
///
/// Callers hold the scheduler lock. Queue hooks get the context that
/// owns the thread.
pub(crate) trait ClassOps: Sync {
    /// Link a thread that just became runnable (back of its bucket)
    fn enqueue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread);

    /// Unlink a queued thread
    fn dequeue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread);

    /// Link a preempted thread ahead of its peers
    fn requeue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread);

    /// Take the best runnable thread of this class off its queue
    fn pick(&self, ctx: &mut SchedCtx) -> Option<ThreadId>;

    /// Validate parameters before any state is touched
    fn declare(&self, thread: &Thread, param: &PolicyParam) -> SchedResult<()>;

    /// Install validated parameters
    fn setparam(&self, thread: &mut Thread, param: &PolicyParam);

    /// Current parameters of a thread
    fn getparam(&self, thread: &Thread) -> PolicyParam;

    /// Boost to `param`, or drop back to the base priority on `None`
    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>) {
        thread.cprio = match param {
            Some(p) => p.prio(),
            None => thread.bprio,
        };
    }

    /// Release class-private data of a thread leaving the class
    fn forget(&self, _thread: &mut Thread) {}

    /// Thread moves to processor `dest`; may ask for a different class
    fn migrate(&self, _thread: &Thread, _dest: CpuId) -> Option<(SchedClass, PolicyParam)> {
        None
    }

    /// Whether round-robin slicing applies to threads of this class
    fn round_robin(&self) -> bool {
        false
    }
}
