//! Scheduler introspection
//!
//! Thread listings are walked one entry per lock acquisition, so a
//! long listing never holds the scheduler lock for long. The walk
//! notices when the thread list changed under it and reports
//! [`SchedError::Again`] once; the reader then starts over.

use core::fmt::{self, Write};

use heapless::String;

use crate::config::CFG_THREAD_NAME_LEN;
use crate::error::{SchedError, SchedResult};
use crate::kernel::{Nucleus, SchedLock};
use crate::thread::Thread;
use crate::types::{CpuId, Prio, ThreadId, ThreadState, Ticks};

/// One row of the thread list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub tid: ThreadId,
    pub cpu: CpuId,
    /// Host process id, 0 for kernel threads
    pub pid: i32,
    pub name: String<CFG_THREAD_NAME_LEN>,
    pub class: &'static str,
    pub cprio: Prio,
    /// Ticks until the next timer event of the thread, 0 if none
    pub timeout: Ticks,
    pub state: ThreadState,
}

impl ThreadSnapshot {
    pub const HEADER: &'static str = "CPU  PID    CLASS  PRI      TIMEOUT   STAT       NAME";

    fn capture(tid: ThreadId, thread: &Thread, now: Ticks) -> Self {
        let period = if thread.ptimer.is_running() {
            thread.ptimer.interval()
        } else {
            0
        };
        let mut timeout = if thread.rtimer.is_running() {
            thread.rtimer.remaining(now)
        } else {
            thread.ptimer.remaining(now)
        };
        // The periodic timer may have moved on while the listing was
        // being collected; never report more than one period.
        if period > 0 && period < timeout && !thread.rtimer.is_running() {
            timeout = period;
        }

        ThreadSnapshot {
            tid,
            cpu: thread.sched,
            pid: thread.host_pid.unwrap_or(0),
            name: thread.name.clone(),
            class: thread.sched_class.name(),
            cprio: thread.cprio,
            timeout,
            state: thread.state,
        }
    }
}

impl fmt::Display for ThreadSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stat: String<16> = String::new();
        let _ = write!(stat, "{}", self.state);
        let mut timeout: String<20> = String::new();
        if self.timeout == 0 {
            let _ = timeout.push('-');
        } else {
            let _ = write!(timeout, "{}", self.timeout);
        }

        write!(
            f,
            "{:>3}  {:<6} {:<5}  {:>3}      {:<8}  {:<10} {}",
            self.cpu, self.pid, self.class, self.cprio, timeout, stat, self.name
        )
    }
}

/// One row of the thread statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStatSnapshot {
    pub tid: ThreadId,
    pub cpu: CpuId,
    pub pid: i32,
    pub name: String<CFG_THREAD_NAME_LEN>,
    pub state: ThreadState,
    pub class: &'static str,
    pub cprio: Prio,
    /// Context switches into the thread
    pub csw: u32,
    /// Execution time since the previous reading
    pub exectime_period: Ticks,
    /// Wall time since the previous reading
    pub account_period: Ticks,
    pub exectime_total: Ticks,
    /// Release period of a periodic thread, 0 otherwise
    pub period: Ticks,
}

impl ThreadStatSnapshot {
    pub const HEADER: &'static str = "CPU  PID    CSW        STAT        %CPU  NAME";

    /// Sample the statistics of `tid` and open a new observation period
    fn capture(nucleus: &mut Nucleus, tid: ThreadId) -> Self {
        let thread = nucleus.threads.thread(tid);
        let ctx = &nucleus.cpus[thread.sched as usize];
        let switch_date = ctx.last_account_switch;
        let running = ctx.curr == tid;

        let thread = nucleus.threads.thread_mut(tid);
        let stat = &mut thread.stat;
        let elapsed = switch_date.saturating_sub(stat.lastperiod_start);
        let (exectime_period, account_period) = if elapsed == 0 && running {
            (1, 1)
        } else {
            (stat.account_total - stat.lastperiod_total, elapsed)
        };
        let exectime_total = stat.account_total;
        stat.lastperiod_total = stat.account_total;
        stat.lastperiod_start = switch_date;

        ThreadStatSnapshot {
            tid,
            cpu: thread.sched,
            pid: thread.host_pid.unwrap_or(0),
            name: thread.name.clone(),
            state: thread.state,
            class: thread.sched_class.name(),
            cprio: thread.cprio,
            csw: thread.stat.csw,
            exectime_period,
            account_period,
            exectime_total,
            period: if thread.ptimer.is_running() {
                thread.ptimer.interval()
            } else {
                0
            },
        }
    }

    /// CPU usage over the last period, in tenths of a percent
    pub fn usage_permille(&self) -> u32 {
        let mut exec = self.exectime_period;
        let mut account = self.account_period;
        if account == 0 {
            return 0;
        }
        while account > u64::from(u32::MAX) {
            exec >>= 16;
            account >>= 16;
        }
        ((exec * 1000 + (account >> 1)) / account) as u32
    }
}

impl fmt::Display for ThreadStatSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let usage = self.usage_permille();
        write!(
            f,
            "{:>3}  {:<6} {:<10} {:08x}  {:>3}.{}  {}",
            self.cpu,
            self.pid,
            self.csw,
            self.state.bits(),
            usage / 10,
            usage % 10,
            self.name
        )
    }
}

/// Cursor shared by the listing iterators
struct Cursor {
    pos: usize,
    revision: u32,
    done: bool,
}

impl Cursor {
    fn new(nucleus: &Nucleus) -> Self {
        Cursor {
            pos: 0,
            revision: nucleus.threads.revision(),
            done: false,
        }
    }

    /// Next handle to report, with the lock held
    fn advance(&mut self, nucleus: &Nucleus) -> Option<SchedResult<ThreadId>> {
        if self.done {
            return None;
        }
        if nucleus.threads.revision() != self.revision {
            self.done = true;
            return Some(Err(SchedError::Again));
        }
        match nucleus.threads.nth(self.pos) {
            Some(tid) => {
                self.pos += 1;
                Some(Ok(tid))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Thread list walk, see [`SchedLock::threads`]
pub struct ThreadIter<'a> {
    lock: &'a SchedLock,
    cursor: Cursor,
    start_time: Ticks,
}

impl Iterator for ThreadIter<'_> {
    type Item = SchedResult<ThreadSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        let nucleus = self.lock.lock();
        let tid = match self.cursor.advance(&nucleus)? {
            Ok(tid) => tid,
            Err(err) => return Some(Err(err)),
        };
        let thread = nucleus.threads.thread(tid);
        Some(Ok(ThreadSnapshot::capture(tid, thread, self.start_time)))
    }
}

/// Thread statistics walk, see [`SchedLock::stats`]
pub struct ThreadStatIter<'a> {
    lock: &'a SchedLock,
    cursor: Cursor,
}

impl Iterator for ThreadStatIter<'_> {
    type Item = SchedResult<ThreadStatSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut nucleus = self.lock.lock();
        let tid = match self.cursor.advance(&nucleus)? {
            Ok(tid) => tid,
            Err(err) => return Some(Err(err)),
        };
        Some(Ok(ThreadStatSnapshot::capture(&mut nucleus, tid)))
    }
}

impl SchedLock {
    /// Walk the thread list, one lock acquisition per thread
    pub fn threads(&self) -> ThreadIter<'_> {
        let nucleus = self.lock();
        let cursor = Cursor::new(&nucleus);
        let start_time = nucleus.clock.read_monotonic();
        drop(nucleus);

        ThreadIter {
            lock: self,
            cursor,
            start_time,
        }
    }

    /// Walk the thread statistics; every reading starts a new
    /// observation period for the thread
    pub fn stats(&self) -> ThreadStatIter<'_> {
        let nucleus = self.lock();
        let cursor = Cursor::new(&nucleus);
        drop(nucleus);

        ThreadStatIter { lock: self, cursor }
    }
}
