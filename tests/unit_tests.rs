//! Scenario tests for the scheduler core
//!
//! These tests run on the host (not embedded target) and drive the
//! scheduler through its public API with a hand-advanced clock.

#[cfg(test)]
mod common {
    use rtnucleus::time::ManualClock;
    use rtnucleus::{
        CpuId, Nucleus, PolicyParam, Prio, SchedClass, SchedConfig, Thread, ThreadAttr, ThreadId,
    };

    pub fn nucleus(unlocked_switch: bool) -> (Nucleus, &'static ManualClock) {
        let clock: &'static ManualClock = Box::leak(Box::new(ManualClock::new()));
        let config = SchedConfig {
            unlocked_switch,
            ..SchedConfig::new()
        };
        (Nucleus::new(config, clock).unwrap(), clock)
    }

    pub fn spawn_rt(n: &mut Nucleus, name: &str, cpu: CpuId, prio: Prio) -> ThreadId {
        let tid = n
            .spawn(ThreadAttr::new(name).on_cpu(cpu), SchedClass::Rt, &PolicyParam::Rt { prio })
            .unwrap();
        n.start(tid).unwrap();
        tid
    }

    /// Schedule `cpu` and complete the switch right away
    pub fn switch(n: &mut Nucleus, cpu: CpuId) -> Option<Thread> {
        n.schedule(cpu);
        n.finish_switch(cpu)
    }
}

#[cfg(test)]
mod runq_tests {
    use super::common::*;
    use rtnucleus::sched::RunQueue;
    use rtnucleus::{PolicyParam, SchedClass, ThreadAttr};

    #[test]
    fn test_highest_first() {
        let (mut n, _) = nucleus(false);
        let mut tids = Vec::new();
        for name in ["t10", "t30", "t20"] {
            let tid = n
                .spawn(ThreadAttr::new(name), SchedClass::Rt, &PolicyParam::Rt { prio: 1 })
                .unwrap();
            tids.push(tid);
        }

        let mut q = RunQueue::new(0, 99);
        q.insert_front(tids[0], 10);
        q.insert_front(tids[1], 30);
        q.insert_front(tids[2], 20);
        assert!(q.is_consistent());
        assert_eq!(q.highest_prio(), Some(30));

        assert_eq!(q.pop_highest(), Some(tids[1]));
        assert_eq!(q.pop_highest(), Some(tids[2]));
        assert_eq!(q.pop_highest(), Some(tids[0]));
        assert_eq!(q.pop_highest(), None);
        assert!(q.is_empty());
        assert!(q.is_consistent());
    }

    #[test]
    fn test_preempted_thread_resumes_first() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        let b = spawn_rt(&mut n, "B", 0, 10);
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(a));

        // A preempted by C goes back ahead of B
        let c = spawn_rt(&mut n, "C", 0, 20);
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(c));
        let rq: Vec<_> = n.ctx(0).unwrap().rt_queue().iter().collect();
        assert_eq!(rq, vec![a, b]);

        n.suspend(c, rtnucleus::ThreadState::SUSPENDED).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(a));
        assert!(n.is_consistent());
    }
}

#[cfg(test)]
mod registry_tests {
    use rtnucleus::sched::ClassRegistry;
    use rtnucleus::time::ManualClock;
    use rtnucleus::{Nucleus, SchedClass, SchedConfig, SchedError};

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_out_of_order_registration() {
        let mut reg = ClassRegistry::new();
        reg.register(SchedClass::Idle);
        reg.register(SchedClass::Rt);
        reg.register(SchedClass::Weak);
    }

    #[test]
    fn test_idle_class_required() {
        static CLOCK: ManualClock = ManualClock::new();
        let mut reg = ClassRegistry::new();
        assert!(reg.is_empty());
        let r = Nucleus::with_registry(SchedConfig::new(), &CLOCK, reg.clone());
        assert_eq!(r.err(), Some(SchedError::ClassUnavailable));

        reg.register(SchedClass::Idle);
        let mut n = Nucleus::with_registry(SchedConfig::new(), &CLOCK, reg).unwrap();
        for cpu in 0..n.nr_cpus() as u8 {
            let root = n.ctx(cpu).unwrap().root();
            assert_eq!(n.pick_next(cpu), root);
        }
    }

    #[test]
    fn test_missing_class_rejected() {
        static CLOCK: ManualClock = ManualClock::new();
        let mut reg = ClassRegistry::new();
        reg.register(SchedClass::Idle);
        reg.register(SchedClass::Weak);
        let mut n = Nucleus::with_registry(SchedConfig::new(), &CLOCK, reg).unwrap();

        let r = n.spawn(
            rtnucleus::ThreadAttr::new("rt"),
            SchedClass::Rt,
            &rtnucleus::PolicyParam::Rt { prio: 1 },
        );
        assert_eq!(r, Err(SchedError::ClassUnavailable));
        assert_eq!(n.threads().len(), n.nr_cpus());
    }

    #[test]
    fn test_bad_cpu_count() {
        static CLOCK: ManualClock = ManualClock::new();
        let config = SchedConfig {
            nr_cpus: 0,
            ..SchedConfig::new()
        };
        assert_eq!(Nucleus::new(config, &CLOCK).err(), Some(SchedError::InvalidParam));
    }
}

#[cfg(test)]
mod sched_tests {
    use super::common::*;
    use rtnucleus::{PolicyParam, SchedClass, SchedError, ThreadAttr, ThreadState};

    #[test]
    fn test_root_runs_when_nothing_else() {
        let (mut n, _) = nucleus(false);
        for cpu in 0..n.nr_cpus() as u8 {
            let root = n.ctx(cpu).unwrap().root();
            assert_eq!(n.current(cpu), Some(root));
            assert_eq!(n.pick_next(cpu), root);
            assert_eq!(n.schedule(cpu), None);
        }
        assert!(n.is_consistent());
    }

    #[test]
    fn test_class_weight_wins() {
        let (mut n, _) = nucleus(false);
        let weak = n
            .spawn(ThreadAttr::new("weak"), SchedClass::Weak, &PolicyParam::Weak { prio: 99 })
            .unwrap();
        n.start(weak).unwrap();
        let rt = spawn_rt(&mut n, "rt", 0, 0);

        let frame = n.schedule(0).unwrap();
        assert_eq!(frame.next, rt);
        n.finish_switch(0);

        n.suspend(rt, ThreadState::DELAYED).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(weak));
    }

    #[test]
    fn test_lock_holder_keeps_cpu() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);
        n.lock_sched(0).unwrap();
        n.lock_sched(0).unwrap();

        let b = spawn_rt(&mut n, "B", 0, 90);
        assert_eq!(n.schedule(0), None);
        assert_eq!(n.current(0), Some(a));
        assert!(n.ctx(0).unwrap().resched_pending());

        assert_eq!(n.unlock_sched(0), Ok(false));
        assert_eq!(n.unlock_sched(0), Ok(true));
        assert_eq!(n.unlock_sched(0), Err(SchedError::SchedNotLocked));

        let frame = n.schedule(0).unwrap();
        assert_eq!((frame.prev, frame.next), (a, b));
    }

    #[test]
    fn test_set_policy_rejection_leaves_thread_alone() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        let rt_before = n.registry().nthreads(SchedClass::Rt);

        let r = n.set_policy(a, SchedClass::Rt, &PolicyParam::Rt { prio: 200 });
        assert_eq!(r, Err(SchedError::InvalidPriority));
        let r = n.set_policy(a, SchedClass::Tp, &PolicyParam::Tp { prio: 1, ptid: 9 });
        assert_eq!(r, Err(SchedError::InvalidPartition));
        let r = n.set_policy(a, SchedClass::Weak, &PolicyParam::Rt { prio: 1 });
        assert_eq!(r, Err(SchedError::InvalidParam));

        let t = n.thread(a).unwrap();
        assert_eq!((t.class(), t.cprio()), (SchedClass::Rt, 10));
        assert!(n.ctx(0).unwrap().rt_queue().contains(a));
        assert_eq!(n.registry().nthreads(SchedClass::Rt), rt_before);

        n.set_policy(a, SchedClass::Weak, &PolicyParam::Weak { prio: 5 }).unwrap();
        assert_eq!(n.registry().nthreads(SchedClass::Rt), rt_before - 1);
        assert_eq!(n.registry().nthreads(SchedClass::Weak), 1);
        assert!(n.ctx(0).unwrap().weak_queue().contains(a));
        assert!(!n.ctx(0).unwrap().rt_queue().contains(a));
        assert_eq!(n.get_param(a), Ok(PolicyParam::Weak { prio: 5 }));
        assert!(n.is_consistent());
    }

    #[test]
    fn test_track_policy_boost_and_reset() {
        let (mut n, _) = nucleus(false);
        let w = n
            .spawn(ThreadAttr::new("W"), SchedClass::Weak, &PolicyParam::Weak { prio: 10 })
            .unwrap();
        n.start(w).unwrap();
        let r = spawn_rt(&mut n, "R", 0, 50);

        n.track_policy(w, r).unwrap();
        let t = n.thread(w).unwrap();
        assert_eq!((t.class(), t.cprio(), t.base_class()), (SchedClass::Rt, 50, SchedClass::Weak));
        assert!(n.ctx(0).unwrap().rt_queue().contains(w));

        n.track_policy(w, w).unwrap();
        let t = n.thread(w).unwrap();
        assert_eq!((t.class(), t.cprio()), (SchedClass::Weak, 10));
        assert!(n.ctx(0).unwrap().weak_queue().contains(w));
        assert!(n.is_consistent());
    }

    #[test]
    fn test_round_robin_rotation() {
        let (mut n, clock) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        let b = spawn_rt(&mut n, "B", 0, 10);
        n.set_rr(a, 5).unwrap();
        n.set_rr(b, 5).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(a));
        assert!(n.ctx(0).unwrap().rr_timer().is_running());

        clock.advance(5);
        assert!(n.rr_tick(0));
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(b));

        clock.advance(5);
        assert!(n.rr_tick(0));
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(a));
    }

    #[test]
    #[cfg(feature = "sched-weak")]
    fn test_round_robin_weak() {
        fn spawn_weak(n: &mut rtnucleus::Nucleus, name: &str) -> rtnucleus::ThreadId {
            let tid = n
                .spawn(ThreadAttr::new(name), SchedClass::Weak, &PolicyParam::Weak { prio: 10 })
                .unwrap();
            n.start(tid).unwrap();
            tid
        }

        let (mut n, clock) = nucleus(false);
        let a = spawn_weak(&mut n, "A");
        let b = spawn_weak(&mut n, "B");
        n.set_rr(a, 5).unwrap();
        n.set_rr(b, 5).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(a));
        assert!(n.ctx(0).unwrap().rr_timer().is_running());

        clock.advance(5);
        assert!(n.rr_tick(0));
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(b));
        assert!(n.is_consistent());
    }

    #[test]
    fn test_suspend_resume_errors() {
        let (mut n, _) = nucleus(false);
        let root = n.ctx(0).unwrap().root();
        assert_eq!(n.suspend(root, ThreadState::SUSPENDED), Err(SchedError::NotPermitted));

        let a = spawn_rt(&mut n, "A", 0, 10);
        assert_eq!(n.suspend(a, ThreadState::READY), Err(SchedError::InvalidParam));
        assert_eq!(n.start(a), Err(SchedError::NotPermitted));

        n.suspend(a, ThreadState::SUSPENDED | ThreadState::DELAYED).unwrap();
        n.resume(a, ThreadState::SUSPENDED).unwrap();
        assert!(!n.ctx(0).unwrap().is_queued(a));
        n.resume(a, ThreadState::DELAYED).unwrap();
        assert!(n.ctx(0).unwrap().is_queued(a));
        assert!(n.is_consistent());
    }

    #[cfg(feature = "smp")]
    #[test]
    fn test_remote_resched_sets_ipi_mask() {
        let (mut n, _) = nucleus(false);
        n.set_resched(0, 2);
        assert!(n.ctx(2).unwrap().resched_pending());
        let mask = n.take_ipi_mask(0);
        assert!(mask.contains(2));
        assert!(!mask.contains(0));
        assert!(n.take_ipi_mask(0).is_empty());
    }
}

#[cfg(test)]
mod zombie_tests {
    use super::common::*;
    use rtnucleus::{SchedClass, SchedError};

    #[test]
    fn test_running_thread_reaped_after_switch() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 20);
        switch(&mut n, 0);

        assert_eq!(n.delete_thread(a).unwrap().map(|t| t.name().to_owned()), None);
        assert!(n.thread(a).unwrap().is_zombie());
        assert_eq!(n.delete_thread(a).map(|t| t.is_none()), Ok(true));

        let frame = n.schedule(0).unwrap();
        assert_eq!(frame.prev, a);
        assert_eq!(n.ctx(0).unwrap().zombie(), Some(a));

        let reaped = n.finish_switch(0).unwrap();
        assert_eq!(reaped.name(), "A");
        assert!(n.thread(a).is_none());
        assert_eq!(n.ctx(0).unwrap().zombie(), None);
        assert_eq!(n.registry().nthreads(SchedClass::Rt), 0);
    }

    #[test]
    fn test_idle_thread_reaped_at_once() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 20);
        let b = spawn_rt(&mut n, "B", 0, 10);
        switch(&mut n, 0);

        let reaped = n.delete_thread(b).unwrap().unwrap();
        assert_eq!(reaped.name(), "B");
        assert!(!n.ctx(0).unwrap().is_queued(b));
        assert_eq!(n.delete_thread(b).err(), Some(SchedError::NoSuchThread));
        assert_eq!(n.current(0), Some(a));

        let root = n.ctx(0).unwrap().root();
        assert_eq!(n.delete_thread(root).err(), Some(SchedError::NotPermitted));
        assert!(n.is_consistent());
    }

    #[test]
    #[should_panic(expected = "already holds")]
    fn test_zombie_slot_overrun() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 20);
        let b = spawn_rt(&mut n, "B", 0, 10);
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(a));

        n.delete_thread(a).unwrap();
        n.schedule(0);
        assert_eq!(n.current(0), Some(b));

        // The previous switch was never finished
        n.delete_thread(b).unwrap();
        n.schedule(0);
    }
}

#[cfg(all(test, feature = "watchdog"))]
mod watchdog_tests {
    use super::common::*;
    use rtnucleus::{PolicyParam, SchedClass, SchedError, ThreadAttr, ThreadState, WatchdogAction};

    #[test]
    fn test_runaway_kernel_thread_cancelled() {
        let (mut n, _) = nucleus(false);
        n.set_watchdog_timeout(3).unwrap();
        assert_eq!(n.set_watchdog_timeout(0), Err(SchedError::InvalidParam));

        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);

        assert_eq!(n.watchdog_tick(0), WatchdogAction::Counting(1));
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Counting(2));
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Cancelled(a));
        assert_eq!(n.ctx(0).unwrap().watchdog_count(), 0);

        let t = n.thread(a).unwrap();
        assert!(t.is_zombie());
        assert!(t.state().contains(ThreadState::CANCELD));
        assert_eq!(switch(&mut n, 0).map(|t| t.name().to_owned()), Some("A".to_owned()));
    }

    #[test]
    fn test_user_thread_signaled_first() {
        let (mut n, _) = nucleus(false);
        n.set_watchdog_timeout(2).unwrap();
        let u = n
            .spawn(ThreadAttr::new("U").user(42), SchedClass::Rt, &PolicyParam::Rt { prio: 3 })
            .unwrap();
        n.start(u).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.thread(u).unwrap().host_pid(), Some(42));

        assert_eq!(n.watchdog_tick(0), WatchdogAction::Counting(1));
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Signaled(u));
        assert!(n.thread(u).unwrap().state().contains(ThreadState::KICKED));

        assert_eq!(n.watchdog_tick(0), WatchdogAction::Counting(1));
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Signaled(u));
        assert!(!n.thread(u).unwrap().is_zombie());
    }

    #[test]
    fn test_user_thread_never_cancelled() {
        let (mut n, _) = nucleus(false);
        n.set_watchdog_timeout(2).unwrap();
        let u = n
            .spawn(ThreadAttr::new("U").user(7), SchedClass::Rt, &PolicyParam::Rt { prio: 3 })
            .unwrap();
        n.start(u).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Counting(1));
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Signaled(u));

        // Recovers, idles for a while, then runs away again
        n.suspend(u, ThreadState::SUSPENDED).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Idle);
        n.resume(u, ThreadState::SUSPENDED).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(u));

        assert_eq!(n.watchdog_tick(0), WatchdogAction::Counting(1));
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Signaled(u));
        assert_eq!(n.current(0), Some(u));
        assert!(!n.thread(u).unwrap().is_zombie());
    }

    #[test]
    fn test_root_resets_count() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Counting(1));

        n.suspend(a, ThreadState::SUSPENDED).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.ctx(0).unwrap().watchdog_count(), 0);
        assert_eq!(n.watchdog_tick(0), WatchdogAction::Idle);
    }
}

#[cfg(test)]
mod migrate_tests {
    use super::common::*;
    use rtnucleus::{CpuMask, PolicyParam, SchedClass, SchedError, ThreadAttr, ThreadState};

    #[test]
    fn test_passive_migration_of_blocked_thread() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        n.suspend(a, ThreadState::SUSPENDED).unwrap();

        n.migrate_passive(a, 1).unwrap();
        assert_eq!(n.thread(a).unwrap().cpu(), 1);
        assert!(!n.ctx(0).unwrap().is_queued(a));
        assert!(!n.ctx(1).unwrap().is_queued(a));
        assert!(n.is_consistent());

        n.resume(a, ThreadState::SUSPENDED).unwrap();
        assert!(n.ctx(1).unwrap().is_queued(a));
        assert!(n.ctx(1).unwrap().resched_pending());
        switch(&mut n, 1);
        assert_eq!(n.current(1), Some(a));
    }

    #[test]
    fn test_passive_migration_of_ready_thread() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        n.migrate_passive(a, 3).unwrap();
        assert!(!n.ctx(0).unwrap().is_queued(a));
        assert!(n.ctx(3).unwrap().is_queued(a));
        assert!(n.is_consistent());
    }

    #[test]
    fn test_passive_migration_of_running_thread() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);
        assert_eq!(n.migrate_passive(a, 1), Err(SchedError::NotPermitted));
    }

    #[test]
    fn test_deferred_migration_of_running_thread() {
        let (mut n, _) = nucleus(true);
        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);

        n.migrate(a, 1).unwrap();
        let t = n.thread(a).unwrap();
        assert!(t.state().contains(ThreadState::MIGRATE));
        assert_eq!(t.cpu(), 1);
        assert!(!n.ctx(1).unwrap().is_queued(a));
        assert_eq!(n.migrate(a, 2), Err(SchedError::NotPermitted));

        let frame = n.schedule(0).unwrap();
        assert_eq!(frame.prev, a);
        assert!(n.ctx(0).unwrap().in_switch());
        assert!(!n.ctx(1).unwrap().is_queued(a));
        assert!(n.is_consistent());

        assert!(n.finish_switch(0).is_none());
        assert!(n.ctx(1).unwrap().is_queued(a));
        assert!(!n.thread(a).unwrap().state().contains(ThreadState::MIGRATE));
        assert!(n.ctx(1).unwrap().resched_pending());
        assert!(n.is_consistent());
    }

    #[test]
    fn test_immediate_migration_with_locked_switch() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);

        n.migrate(a, 1).unwrap();
        assert!(n.ctx(1).unwrap().is_queued(a));
        let frame = n.schedule(0).unwrap();
        assert_eq!(frame.next, n.ctx(0).unwrap().root());
        n.finish_switch(0);
        assert!(n.is_consistent());

        switch(&mut n, 1);
        assert_eq!(n.current(1), Some(a));
    }

    #[test]
    fn test_delete_while_switching_out_after_migration() {
        let (mut n, _) = nucleus(true);
        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);
        n.migrate(a, 1).unwrap();
        n.schedule(0).unwrap();
        assert!(n.ctx(0).unwrap().in_switch());

        // Still on cpu 0's stack: reaped by cpu 0, not right away
        assert!(n.delete_thread(a).unwrap().is_none());
        assert!(n.thread(a).unwrap().is_zombie());

        let reaped = n.finish_switch(0).unwrap();
        assert_eq!(reaped.name(), "A");
        assert!(n.thread(a).is_none());
        assert!(!n.ctx(1).unwrap().is_queued(a));
        assert!(n.is_consistent());
    }

    #[test]
    fn test_delete_running_thread_after_migration() {
        let (mut n, _) = nucleus(true);
        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);
        n.migrate(a, 1).unwrap();

        assert!(n.delete_thread(a).unwrap().is_none());
        assert!(n.ctx(0).unwrap().resched_pending());

        let reaped = switch(&mut n, 0).unwrap();
        assert_eq!(reaped.name(), "A");
        assert_eq!(n.current(0), Some(n.ctx(0).unwrap().root()));
        assert!(n.is_consistent());
    }

    #[test]
    fn test_migration_checks() {
        let (mut n, _) = nucleus(false);
        let root = n.ctx(0).unwrap().root();
        assert_eq!(n.migrate(root, 1), Err(SchedError::NotPermitted));

        let a = spawn_rt(&mut n, "A", 0, 10);
        assert_eq!(n.migrate(a, 9), Err(SchedError::InvalidParam));
        assert_eq!(n.migrate(a, 0), Ok(()));
        assert!(n.ctx(0).unwrap().is_queued(a));

        let pinned = n
            .spawn(
                ThreadAttr::new("P").affinity(CpuMask::of(0)),
                SchedClass::Rt,
                &PolicyParam::Rt { prio: 1 },
            )
            .unwrap();
        assert_eq!(n.migrate(pinned, 1), Err(SchedError::Affinity));

        n.suspend(a, ThreadState::PENDING).unwrap();
        assert_eq!(n.migrate(a, 1), Err(SchedError::Blocked));

        n.delete_thread(pinned).unwrap();
        assert_eq!(n.migrate(pinned, 1), Err(SchedError::NoSuchThread));
    }
}

#[cfg(all(test, feature = "sched-tp"))]
mod tp_tests {
    use super::common::*;
    use rtnucleus::sched::TpWindow;
    use rtnucleus::{PolicyParam, SchedClass, SchedError, ThreadAttr};

    fn spawn_tp(n: &mut rtnucleus::Nucleus, name: &str, prio: i32, ptid: i32) -> rtnucleus::ThreadId {
        let tid = n
            .spawn(ThreadAttr::new(name), SchedClass::Tp, &PolicyParam::Tp { prio, ptid })
            .unwrap();
        n.start(tid).unwrap();
        tid
    }

    #[test]
    fn test_windows_gate_partitions() {
        let (mut n, _) = nucleus(false);
        let t1 = spawn_tp(&mut n, "T1", 5, 0);
        let t2 = spawn_tp(&mut n, "T2", 50, 1);

        // No schedule installed: TP threads do not run
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(n.ctx(0).unwrap().root()));
        assert_eq!(n.tp_tick(0), Err(SchedError::NoSchedule));

        let windows = [
            TpWindow { offset: 0, ptid: Some(0) },
            TpWindow { offset: 10, ptid: Some(1) },
            TpWindow { offset: 20, ptid: None },
        ];
        n.tp_install(0, &windows, 30).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(t1));

        assert_eq!(n.tp_tick(0), Ok(Some(1)));
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(t2));

        assert_eq!(n.tp_tick(0), Ok(None));
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(n.ctx(0).unwrap().root()));
        assert!(n.is_consistent());

        n.tp_uninstall(0).unwrap();
        assert!(!n.ctx(0).unwrap().tp().has_schedule());
    }

    #[test]
    fn test_bad_schedule_rejected() {
        let (mut n, _) = nucleus(false);
        let windows = [TpWindow { offset: 5, ptid: Some(0) }];
        assert_eq!(n.tp_install(0, &windows, 30), Err(SchedError::InvalidParam));
        assert!(!n.ctx(0).unwrap().tp().has_schedule());
    }

    #[test]
    fn test_migration_demotes_to_rt() {
        let (mut n, _) = nucleus(false);
        let t = spawn_tp(&mut n, "T", 7, 2);
        n.migrate(t, 1).unwrap();

        let thread = n.thread(t).unwrap();
        assert_eq!(thread.class(), SchedClass::Rt);
        assert_eq!(thread.cprio(), 7);
        assert_eq!(thread.tp_partition(), None);
        assert!(n.ctx(1).unwrap().rt_queue().contains(t));
        assert_eq!(n.registry().nthreads(SchedClass::Tp), 0);
        assert!(n.is_consistent());
    }

    #[test]
    fn test_boost_into_partition() {
        let (mut n, _) = nucleus(false);
        let owner = spawn_tp(&mut n, "T", 40, 1);
        let w = n
            .spawn(ThreadAttr::new("W"), SchedClass::Weak, &PolicyParam::Weak { prio: 3 })
            .unwrap();
        n.start(w).unwrap();

        n.track_policy(w, owner).unwrap();
        let t = n.thread(w).unwrap();
        assert_eq!((t.class(), t.cprio(), t.tp_partition()), (SchedClass::Tp, 40, Some(1)));
        assert!(n.is_consistent());

        n.track_policy(w, w).unwrap();
        let t = n.thread(w).unwrap();
        assert_eq!((t.class(), t.cprio(), t.tp_partition()), (SchedClass::Weak, 3, None));
        assert!(n.ctx(0).unwrap().weak_queue().contains(w));
    }
}

#[cfg(all(test, feature = "sched-sporadic"))]
mod sporadic_tests {
    use super::common::*;
    use rtnucleus::sched::SporadicParam;
    use rtnucleus::{PolicyParam, SchedClass, SchedError, ThreadAttr};

    fn param(low_prio: i32, normal_prio: i32) -> SporadicParam {
        SporadicParam {
            low_prio,
            normal_prio,
            init_budget: 10,
            repl_period: 100,
            max_repl: 2,
        }
    }

    #[test]
    fn test_budget_drop_and_replenish() {
        let (mut n, clock) = nucleus(false);
        let s = n
            .spawn(ThreadAttr::new("S"), SchedClass::Sporadic, &PolicyParam::Sporadic(param(2, 20)))
            .unwrap();
        let o = n
            .spawn(ThreadAttr::new("O"), SchedClass::Sporadic, &PolicyParam::Sporadic(param(1, 10)))
            .unwrap();
        n.start(s).unwrap();
        n.start(o).unwrap();
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(s));

        clock.advance(10);
        n.sporadic_budget_expired(s).unwrap();
        let pss = n.thread(s).unwrap().sporadic().unwrap();
        assert_eq!(pss.budget, 0);
        assert_eq!(pss.repl.front().map(|r| (r.date, r.amount)), Some((100, 10)));
        assert_eq!(n.thread(s).unwrap().cprio(), 2);

        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(o));

        clock.set(100);
        assert_eq!(n.sporadic_replenish(s), Ok(10));
        assert_eq!(n.thread(s).unwrap().cprio(), 20);
        switch(&mut n, 0);
        assert_eq!(n.current(0), Some(s));
        assert!(n.is_consistent());
    }

    #[test]
    fn test_bad_parameters() {
        let (mut n, _) = nucleus(false);
        let attempt = |n: &mut rtnucleus::Nucleus, p: SporadicParam| {
            n.spawn(ThreadAttr::new("S"), SchedClass::Sporadic, &PolicyParam::Sporadic(p))
        };
        assert_eq!(attempt(&mut n, param(30, 20)), Err(SchedError::InvalidPriority));
        assert_eq!(
            attempt(&mut n, SporadicParam { max_repl: 0, ..param(1, 2) }),
            Err(SchedError::InvalidParam)
        );
        assert_eq!(
            attempt(&mut n, SporadicParam { repl_period: 5, ..param(1, 2) }),
            Err(SchedError::InvalidParam)
        );
        assert_eq!(n.threads().len(), n.nr_cpus());
    }
}

#[cfg(test)]
mod introspect_tests {
    use super::common::*;
    use rtnucleus::sched::ThreadSnapshot;
    use rtnucleus::{PolicyParam, SchedClass, SchedError, SchedLock, ThreadAttr, ThreadState};

    #[test]
    fn test_thread_listing() {
        let (mut n, _) = nucleus(false);
        let a = spawn_rt(&mut n, "worker", 2, 42);
        n.set_timeout(a, 500).unwrap();
        let cpus = n.nr_cpus();
        let lock = SchedLock::new(n);

        let rows: Vec<ThreadSnapshot> = lock.threads().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), cpus + 1);
        assert_eq!(rows[0].name.as_str(), "ROOT/0");
        assert_eq!(rows[0].class, "idle");

        let row = &rows[cpus];
        assert_eq!((row.tid, row.cpu, row.cprio, row.class), (a, 2, 42, "rt"));
        assert_eq!(row.timeout, 500);
        assert!(row.state.contains(ThreadState::READY));
        let line = row.to_string();
        assert!(line.contains("worker"));
        assert!(line.contains("rt"));
    }

    #[test]
    fn test_listing_restarts_on_change() {
        let (n, _) = nucleus(false);
        let lock = SchedLock::new(n);

        let mut it = lock.threads();
        assert!(matches!(it.next(), Some(Ok(_))));
        lock.lock()
            .spawn(ThreadAttr::new("late"), SchedClass::Rt, &PolicyParam::Rt { prio: 1 })
            .unwrap();
        assert_eq!(it.next(), Some(Err(SchedError::Again)));
        assert_eq!(it.next(), None);
    }

    #[cfg(feature = "stats")]
    #[test]
    fn test_cpu_usage() {
        let (mut n, clock) = nucleus(false);
        let a = spawn_rt(&mut n, "A", 0, 10);
        switch(&mut n, 0);
        clock.advance(100);
        n.suspend(a, ThreadState::SUSPENDED).unwrap();
        switch(&mut n, 0);
        let lock = SchedLock::new(n);

        let find = |lock: &SchedLock| {
            lock.stats()
                .map(Result::unwrap)
                .find(|row| row.tid == a)
                .unwrap()
        };
        let row = find(&lock);
        assert_eq!(row.csw, 1);
        assert_eq!((row.exectime_period, row.account_period), (100, 100));
        assert_eq!(row.exectime_total, 100);
        assert_eq!(row.usage_permille(), 1000);

        // Each reading opens a new period
        let row = find(&lock);
        assert_eq!(row.usage_permille(), 0);
        assert_eq!(row.exectime_total, 100);
    }
}

#[cfg(test)]
mod fuzz_tests {
    use std::sync::Arc;
    use std::thread;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use rtnucleus::time::ManualClock;
    use rtnucleus::{
        CpuId, CpuMask, Nucleus, PolicyParam, SchedClass, SchedConfig, SchedGuard, SchedLock,
        ThreadAttr, ThreadId, ThreadState,
    };

    const NR_CPUS: usize = 4;
    const NR_WORKERS: usize = 16;
    const ROUNDS: usize = 3000;

    fn build(unlocked_switch: bool) -> (SchedLock, Vec<ThreadId>) {
        let clock: &'static ManualClock = Box::leak(Box::new(ManualClock::new()));
        let config = SchedConfig {
            nr_cpus: NR_CPUS,
            unlocked_switch,
            ..SchedConfig::new()
        };
        let mut n = Nucleus::new(config, clock).unwrap();
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        let workers = (0..NR_WORKERS)
            .map(|_| {
                let cpu = rng.gen_range(0..NR_CPUS) as CpuId;
                let prio = rng.gen_range(1..60);
                let attr = ThreadAttr::new("worker").on_cpu(cpu).affinity(CpuMask::all());
                let tid = n.spawn(attr, SchedClass::Rt, &PolicyParam::Rt { prio }).unwrap();
                n.start(tid).unwrap();
                tid
            })
            .collect();
        (SchedLock::new(n), workers)
    }

    /// Reschedule `cpu`, dropping the lock across the switch when the
    /// port would
    fn switch_out<'a>(lock: &'a SchedLock, mut n: SchedGuard<'a>, cpu: CpuId) {
        let frame = n.schedule(cpu);
        if frame.is_some() && n.config().unlocked_switch {
            assert!(n.is_consistent());
            drop(n);
            thread::yield_now();
            n = lock.lock();
        }
        n.finish_switch(cpu);
        assert!(n.is_consistent());
    }

    fn run_cpu(lock: &SchedLock, workers: &[ThreadId], cpu: CpuId) {
        let mut rng = SmallRng::seed_from_u64(cpu as u64 + 1);

        for _ in 0..ROUNDS {
            let mut n = lock.lock();
            let tid = workers[rng.gen_range(0..workers.len())];
            let dest = rng.gen_range(0..NR_CPUS) as CpuId;

            match rng.gen_range(0..5) {
                0 => {
                    switch_out(lock, n, cpu);
                    continue;
                }
                1 => {
                    // The running thread moves itself away
                    let curr = n.current(cpu).unwrap();
                    if n.migrate(curr, dest).is_ok() {
                        switch_out(lock, n, cpu);
                        continue;
                    }
                }
                2 => {
                    // Push a queued thread nobody runs
                    let running = (0..NR_CPUS as CpuId).any(|c| n.current(c) == Some(tid));
                    let ready = n.thread(tid).unwrap().state().contains(ThreadState::READY);
                    if ready && !running {
                        let _ = n.migrate(tid, dest);
                    }
                }
                3 => {
                    if n.thread(tid).unwrap().is_blocked() {
                        let _ = n.migrate_passive(tid, dest);
                    } else {
                        let _ = n.suspend(tid, ThreadState::SUSPENDED);
                    }
                }
                _ => {
                    let _ = n.resume(tid, ThreadState::SUSPENDED);
                }
            }
            assert!(n.is_consistent());
        }

        // Leave nothing half switched
        let n = lock.lock();
        switch_out(lock, n, cpu);
    }

    fn fuzz(unlocked_switch: bool) {
        let (lock, workers) = build(unlocked_switch);
        let lock = Arc::new(lock);
        let workers = Arc::new(workers);

        let handles: Vec<_> = (0..NR_CPUS)
            .map(|cpu| {
                let lock = Arc::clone(&lock);
                let workers = Arc::clone(&workers);
                thread::spawn(move || run_cpu(&lock, &workers, cpu as CpuId))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let n = lock.lock();
        assert!(n.is_consistent());
        assert_eq!(n.threads().len(), NR_CPUS + NR_WORKERS);
        for cpu in 0..NR_CPUS as CpuId {
            assert!(!n.ctx(cpu).unwrap().in_switch());
        }
    }

    #[test]
    fn test_concurrent_migration_locked_switch() {
        fuzz(false);
    }

    #[test]
    fn test_concurrent_migration_unlocked_switch() {
        fuzz(true);
    }
}
