//! POSIX sporadic server class
//!
//! A thread runs at its normal priority while it has execution budget
//! left, and drops to its low priority once the budget is exhausted.
//! Consumed time comes back as a replenishment one period after the
//! activation that consumed it.

use heapless::Deque;

use crate::config::CFG_SPORADIC_MAX_REPL;
use crate::error::{SchedError, SchedResult};
use crate::thread::Thread;
use crate::time::Timer;
use crate::types::{Prio, ThreadId, Ticks};

use super::super::ctx::SchedCtx;
use super::{check_prio, ClassOps, PolicyParam, SchedClass};

/// Sporadic server parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SporadicParam {
    /// Priority while the budget is exhausted
    pub low_prio: Prio,
    /// Priority while budget remains
    pub normal_prio: Prio,
    /// Execution budget per replenishment period
    pub init_budget: Ticks,
    /// Replenishment period
    pub repl_period: Ticks,
    /// Maximum number of pending replenishments
    pub max_repl: usize,
}

/// Pending budget replenishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replenishment {
    pub date: Ticks,
    pub amount: Ticks,
}

/// Budget state of a sporadic thread
#[derive(Debug, Clone)]
pub struct SporadicState {
    pub param: SporadicParam,
    /// Budget left
    pub budget: Ticks,
    /// Date of the last switch-in
    pub resume_date: Ticks,
    pub repl: Deque<Replenishment, CFG_SPORADIC_MAX_REPL>,
    /// Budget lost because the replenishment queue was full
    pub dropped: Ticks,
    pub(crate) budget_timer: Timer,
    pub(crate) repl_timer: Timer,
}

impl SporadicState {
    pub fn new(param: SporadicParam) -> Self {
        SporadicState {
            param,
            budget: param.init_budget,
            resume_date: 0,
            repl: Deque::new(),
            dropped: 0,
            budget_timer: Timer::new("[pss-budget]"),
            repl_timer: Timer::new("[pss-repl]"),
        }
    }

    /// Priority matching the current budget
    #[inline]
    pub fn effective_prio(&self) -> Prio {
        if self.budget > 0 {
            self.param.normal_prio
        } else {
            self.param.low_prio
        }
    }

    /// Thread switched in at `now`
    pub(crate) fn resume(&mut self, now: Ticks) {
        self.resume_date = now;
        if self.budget > 0 {
            self.budget_timer.start(now + self.budget, 0);
        }
    }

    /// Thread switched out at `now`: charge the elapsed time and post
    /// its replenishment
    pub(crate) fn suspend(&mut self, now: Ticks) {
        self.budget_timer.stop();

        let consumed = now.saturating_sub(self.resume_date).min(self.budget);
        if consumed == 0 {
            return;
        }
        self.budget -= consumed;
        self.post(self.resume_date + self.param.repl_period, consumed);
    }

    /// Budget timer fired
    pub(crate) fn exhaust(&mut self, now: Ticks) {
        self.budget_timer.stop();
        if self.budget > 0 {
            let amount = self.budget;
            self.budget = 0;
            self.post(self.resume_date + self.param.repl_period, amount);
        }
        self.resume_date = now;
    }

    fn post(&mut self, date: Ticks, amount: Ticks) {
        let full = self.repl.len() >= self.param.max_repl;
        if full || self.repl.push_back(Replenishment { date, amount }).is_err() {
            self.dropped += amount;
            return;
        }
        if !self.repl_timer.is_running() {
            self.repl_timer.start(date, 0);
        }
    }

    /// Credit every replenishment due at `now`, returning the amount
    pub(crate) fn replenish(&mut self, now: Ticks) -> Ticks {
        let mut credit = 0;
        while let Some(r) = self.repl.front().copied() {
            if r.date > now {
                break;
            }
            self.repl.pop_front();
            credit += r.amount;
        }
        self.budget = (self.budget + credit).min(self.param.init_budget);

        match self.repl.front() {
            Some(next) => self.repl_timer.start(next.date, 0),
            None => self.repl_timer.stop(),
        }
        credit
    }

    pub(crate) fn stop_timers(&mut self) {
        self.budget_timer.stop();
        self.repl_timer.stop();
    }
}

pub(crate) struct SporadicClass;

impl ClassOps for SporadicClass {
    fn enqueue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.sporadic.insert_back(tid, thread.cprio);
    }

    fn dequeue(&self, ctx: &mut SchedCtx, tid: ThreadId, _thread: &Thread) {
        ctx.sporadic.remove(tid);
    }

    fn requeue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.sporadic.insert_front(tid, thread.cprio);
    }

    fn pick(&self, ctx: &mut SchedCtx) -> Option<ThreadId> {
        ctx.sporadic.pop_highest()
    }

    fn declare(&self, _thread: &Thread, param: &PolicyParam) -> SchedResult<()> {
        let p = match param {
            PolicyParam::Sporadic(p) => p,
            _ => return Err(SchedError::InvalidParam),
        };
        if p.max_repl == 0 || p.max_repl > CFG_SPORADIC_MAX_REPL {
            return Err(SchedError::InvalidParam);
        }
        if p.init_budget == 0 || p.repl_period < p.init_budget {
            return Err(SchedError::InvalidParam);
        }
        check_prio(SchedClass::Sporadic, p.normal_prio)?;
        check_prio(SchedClass::Sporadic, p.low_prio)?;
        if p.low_prio > p.normal_prio {
            return Err(SchedError::InvalidPriority);
        }
        Ok(())
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        if let PolicyParam::Sporadic(p) = param {
            let pss = SporadicState::new(*p);
            thread.cprio = pss.effective_prio();
            thread.pss = Some(pss);
        }
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        match &thread.pss {
            Some(pss) => PolicyParam::Sporadic(pss.param),
            None => crate::fatal!("sporadic thread {} without budget state", thread.name()),
        }
    }

    // Dropping a boost lands on the budget-dependent priority, not the
    // base priority recorded when the policy was set.
    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>) {
        thread.cprio = match (param, &thread.pss) {
            (Some(p), _) => p.prio(),
            (None, Some(pss)) => pss.effective_prio(),
            (None, None) => thread.bprio,
        };
    }

    fn forget(&self, thread: &mut Thread) {
        if let Some(mut pss) = thread.pss.take() {
            pss.stop_timers();
        }
    }
}
