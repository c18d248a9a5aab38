// crates/metrics-shard-core/src/runtime/routing.rs
// ============================================================================
// Module: Routing Context
// Description: Per-thread shard selection consulted by the datasource router.
// Purpose: Carry the current shard from interception to connection checkout.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The current [`Shard`] lives in a thread-local slot. Writers go through
//! [`RoutingContext::enter`], whose guard restores the previous value when it
//! drops, so a routing decision never outlives the call that made it, even
//! when that call fails or panics.
//!
//! Work handed to another thread does not inherit the slot. Callers capture a
//! [`RoutingSnapshot`] and re-enter it on the worker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::core::MASTER_DATA_SOURCE_KEY;
use crate::core::Shard;

// ============================================================================
// SECTION: Thread State
// ============================================================================

thread_local! {
    static CURRENT_SHARD: RefCell<Option<Shard>> = const { RefCell::new(None) };
}

/// Replaces the slot, returning the previous value.
fn swap_current(shard: Option<Shard>) -> Option<Shard> {
    CURRENT_SHARD.try_with(|slot| slot.replace(shard)).unwrap_or(None)
}

// ============================================================================
// SECTION: Routing Context
// ============================================================================

/// Accessors for the thread's current shard.
#[derive(Debug, Clone, Copy)]
pub struct RoutingContext;

impl RoutingContext {
    /// Sets the current shard without a restoring guard.
    ///
    /// Prefer [`RoutingContext::enter`]; this exists for callers that pair
    /// it with an explicit [`RoutingContext::clear`].
    pub fn set_shard(shard: Shard) {
        swap_current(Some(shard));
    }

    /// Returns a copy of the current shard.
    #[must_use]
    pub fn current_shard() -> Option<Shard> {
        CURRENT_SHARD.try_with(|slot| slot.borrow().clone()).unwrap_or(None)
    }

    /// Clears the current shard.
    pub fn clear() {
        swap_current(None);
    }

    /// Returns the datasource key for the current shard, or the master key.
    #[must_use]
    pub fn data_source_key() -> String {
        CURRENT_SHARD
            .try_with(|slot| slot.borrow().as_ref().map(|shard| shard.data_source_key.clone()))
            .ok()
            .flatten()
            .unwrap_or_else(|| MASTER_DATA_SOURCE_KEY.to_string())
    }

    /// Installs `shard` (or masks to master with `None`) until the returned
    /// guard drops.
    #[must_use = "routing is restored as soon as the scope is dropped"]
    pub fn enter(shard: Option<Shard>) -> RoutingScope {
        RoutingScope {
            previous: swap_current(shard),
            _not_send: PhantomData,
        }
    }

    /// Captures the current shard for propagation to another thread.
    #[must_use]
    pub fn snapshot() -> RoutingSnapshot {
        RoutingSnapshot {
            shard: Self::current_shard(),
        }
    }
}

// ============================================================================
// SECTION: Scope Guard
// ============================================================================

/// Guard that restores the previous routing value on drop.
///
/// # Invariants
/// - Dropped on the thread that created it.
#[derive(Debug)]
pub struct RoutingScope {
    /// Value to restore.
    previous: Option<Shard>,
    /// Keeps the guard on its thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for RoutingScope {
    fn drop(&mut self) {
        swap_current(self.previous.take());
    }
}

/// Routing value captured on one thread for use on another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingSnapshot {
    /// Captured shard.
    shard: Option<Shard>,
}

impl RoutingSnapshot {
    /// Returns the captured shard.
    #[must_use]
    pub const fn shard(&self) -> Option<&Shard> {
        self.shard.as_ref()
    }

    /// Installs the captured shard on the calling thread.
    #[must_use = "routing is restored as soon as the scope is dropped"]
    pub fn enter(&self) -> RoutingScope {
        RoutingContext::enter(self.shard.clone())
    }
}
