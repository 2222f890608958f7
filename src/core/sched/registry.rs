//! Scheduling class registry
//!
//! Built once at startup. Classes are appended by strictly increasing
//! weight, so walking the chain backwards visits them from the most to
//! the least important, which is the order `pick_next` asks them in.

use heapless::Vec;

use crate::error::{SchedError, SchedResult};
use crate::types::Prio;

use super::class::SchedClass;

const NR_CLASSES: usize = SchedClass::ALL.len();

#[derive(Debug, Clone, Copy)]
struct ClassSlot {
    class: SchedClass,
    nthreads: usize,
}

/// Read-only view of a registered class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassInfo {
    pub class: SchedClass,
    pub name: &'static str,
    pub weight: Prio,
    /// Threads currently attached to the class
    pub nthreads: usize,
}

/// Ordered chain of registered classes
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    slots: Vec<ClassSlot, NR_CLASSES>,
}

impl ClassRegistry {
    pub const fn new() -> Self {
        ClassRegistry { slots: Vec::new() }
    }

    /// Registry holding every class enabled at build time
    pub fn with_enabled_classes() -> Self {
        let mut registry = Self::new();
        registry.register(SchedClass::Idle);
        #[cfg(feature = "sched-weak")]
        registry.register(SchedClass::Weak);
        #[cfg(feature = "sched-tp")]
        registry.register(SchedClass::Tp);
        #[cfg(feature = "sched-sporadic")]
        registry.register(SchedClass::Sporadic);
        registry.register(SchedClass::Rt);
        registry
    }

    /// Append a class to the chain
    ///
    /// The idle class must come first and weights must strictly
    /// increase; anything else is a configuration error.
    pub fn register(&mut self, class: SchedClass) {
        match self.slots.last() {
            None if class != SchedClass::Idle => {
                crate::fatal!("class {} registered before idle", class.name());
            }
            Some(last) if class.weight() <= last.class.weight() => {
                crate::fatal!(
                    "class {} registered out of order after {}",
                    class.name(),
                    last.class.name()
                );
            }
            _ => {}
        }

        if self.slots.push(ClassSlot { class, nthreads: 0 }).is_err() {
            crate::fatal!("class {} registered twice", class.name());
        }
        crate::info!("sched class {} registered, weight {}", class.name(), class.weight());
    }

    #[inline]
    pub fn is_registered(&self, class: SchedClass) -> bool {
        self.slots.iter().any(|s| s.class == class)
    }

    /// Fail with [`SchedError::ClassUnavailable`] unless `class` is registered
    pub fn check(&self, class: SchedClass) -> SchedResult<()> {
        if self.is_registered(class) {
            Ok(())
        } else {
            Err(SchedError::ClassUnavailable)
        }
    }

    /// Classes from highest weight to lowest
    pub fn iter_by_weight(&self) -> impl Iterator<Item = SchedClass> + '_ {
        self.slots.iter().rev().map(|s| s.class)
    }

    /// Registered classes, lowest weight first
    pub fn classes(&self) -> impl Iterator<Item = ClassInfo> + '_ {
        self.slots.iter().map(|s| ClassInfo {
            class: s.class,
            name: s.class.name(),
            weight: s.class.weight(),
            nthreads: s.nthreads,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn nthreads(&self, class: SchedClass) -> usize {
        self.slots
            .iter()
            .find(|s| s.class == class)
            .map_or(0, |s| s.nthreads)
    }

    fn slot_mut(&mut self, class: SchedClass) -> &mut ClassSlot {
        match self.slots.iter_mut().find(|s| s.class == class) {
            Some(slot) => slot,
            None => crate::fatal!("class {} is not registered", class.name()),
        }
    }

    pub(crate) fn attach(&mut self, class: SchedClass) {
        self.slot_mut(class).nthreads += 1;
    }

    pub(crate) fn detach(&mut self, class: SchedClass) {
        let slot = self.slot_mut(class);
        if slot.nthreads == 0 {
            crate::fatal!("class {} thread count underflow", class.name());
        }
        slot.nthreads -= 1;
    }
}
