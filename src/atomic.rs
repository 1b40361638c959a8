use critical_section::RestoreState;

#[cfg(test)]
std::thread_local! {
    static DEPTH: core::cell::Cell<usize> = const { core::cell::Cell::new(0) };
}

/// Whether the current thread is inside an [`InterruptFree`] region
#[cfg(test)]
pub(crate) fn is_held() -> bool {
    DEPTH.with(|depth| depth.get() > 0)
}

/// Interrupt-free region covering a single time slot.
///
/// Entering acquires the platform critical section; dropping the guard
/// releases it and restores the interrupt state seen on entry, so a `?`
/// inside the slot still re-enables interrupts.
pub(crate) struct InterruptFree {
    restore: RestoreState,
}

impl InterruptFree {
    #[inline(always)]
    pub(crate) fn enter() -> Self {
        // SAFETY: the matching release happens in `drop`, and guards are
        // only created as locals so acquire/release nest properly.
        let restore = unsafe { critical_section::acquire() };
        #[cfg(test)]
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        InterruptFree { restore }
    }
}

impl Drop for InterruptFree {
    #[inline(always)]
    fn drop(&mut self) {
        #[cfg(test)]
        DEPTH.with(|depth| depth.set(depth.get() - 1));
        // SAFETY: `restore` came from the acquire in `enter`.
        unsafe { critical_section::release(self.restore) }
    }
}
