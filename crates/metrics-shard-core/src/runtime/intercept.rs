// crates/metrics-shard-core/src/runtime/intercept.rs
// ============================================================================
// Module: Shard Interception
// Description: Wraps repository calls with a scoped routing decision.
// Purpose: Route declared calls to their tenant shard and the rest to master.
// Dependencies: crate::core, crate::runtime, serde, tracing
// ============================================================================

//! ## Overview
//! Repository operations that touch sharded tables carry a
//! [`ShardDeclaration`]. [`ShardInterceptor::intercept`] resolves the keys,
//! installs the resulting [`Shard`] for the duration of the call, and always
//! restores the previous routing value afterwards. Calls without a
//! declaration run with routing masked to master, so an enclosing sharded
//! call never leaks into an unrelated repository.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::core::DEFAULT_SHARD_KEY;
use crate::core::MASTER_DATA_SOURCE_KEY;
use crate::core::Shard;
use crate::core::ShardLayout;
use crate::core::TenantId;
use crate::runtime::resolver::ShardArg;
use crate::runtime::resolver::ShardKeyResolver;
use crate::runtime::routing::RoutingContext;

// ============================================================================
// SECTION: Declarations
// ============================================================================

/// Sharding declaration attached to a repository operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDeclaration {
    /// Field holding the primary shard key.
    pub shard_key: String,
    /// Whether second-level table sharding applies to this operation.
    pub second_level: bool,
    /// Field holding the secondary shard key.
    pub secondary_key: Option<String>,
}

impl Default for ShardDeclaration {
    fn default() -> Self {
        Self::tenant()
    }
}

impl ShardDeclaration {
    /// Declares a call sharded by tenant id.
    #[must_use]
    pub fn tenant() -> Self {
        Self::on_field(DEFAULT_SHARD_KEY)
    }

    /// Declares a call sharded by a named field.
    #[must_use]
    pub fn on_field(shard_key: impl Into<String>) -> Self {
        Self {
            shard_key: shard_key.into(),
            second_level: false,
            secondary_key: None,
        }
    }

    /// Enables second-level sharding keyed by `field`.
    #[must_use]
    pub fn with_second_level(mut self, field: impl Into<String>) -> Self {
        self.second_level = true;
        self.secondary_key = Some(field.into());
        self
    }
}

/// Routing outcome for one intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Call runs against the master datasource.
    Master,
    /// Call runs against a tenant shard.
    Sharded(Shard),
}

impl RouteDecision {
    /// Returns the shard, if the call is sharded.
    #[must_use]
    pub const fn shard(&self) -> Option<&Shard> {
        match self {
            Self::Master => None,
            Self::Sharded(shard) => Some(shard),
        }
    }

    /// Returns the datasource key the call resolves to.
    #[must_use]
    pub fn data_source_key(&self) -> &str {
        match self {
            Self::Master => MASTER_DATA_SOURCE_KEY,
            Self::Sharded(shard) => &shard.data_source_key,
        }
    }
}

// ============================================================================
// SECTION: Interceptor
// ============================================================================

/// Applies shard declarations to repository calls.
#[derive(Debug, Clone)]
pub struct ShardInterceptor {
    /// Shard counts.
    layout: ShardLayout,
    /// Key extraction.
    resolver: ShardKeyResolver,
}

impl ShardInterceptor {
    /// Creates an interceptor.
    #[must_use]
    pub const fn new(layout: ShardLayout, resolver: ShardKeyResolver) -> Self {
        Self {
            layout,
            resolver,
        }
    }

    /// Returns the layout.
    #[must_use]
    pub const fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Computes the routing decision for a declared call.
    #[must_use]
    pub fn route(&self, declaration: &ShardDeclaration, args: &[ShardArg<'_>]) -> RouteDecision {
        let Some(primary) = self.resolver.resolve(args, &declaration.shard_key) else {
            return RouteDecision::Master;
        };
        let secondary = if declaration.second_level && self.layout.second_level_enabled() {
            declaration
                .secondary_key
                .as_deref()
                .and_then(|field| self.resolver.resolve_secondary(args, field))
                .map(|key| key.value)
        } else {
            None
        };
        let shard = self.layout.shard_for(TenantId::new(primary.value), secondary);
        debug!(
            tenant_id = %shard.tenant_id,
            data_source = %shard.data_source_key,
            table_index = shard.table_second_index,
            "routing call to shard"
        );
        RouteDecision::Sharded(shard)
    }

    /// Runs `call` under the routing decision for `declaration`.
    ///
    /// Undeclared calls run with routing masked to master. The previous
    /// routing value is restored when `call` returns or unwinds.
    pub fn intercept<T, F>(
        &self,
        declaration: Option<&ShardDeclaration>,
        args: &[ShardArg<'_>],
        call: F,
    ) -> T
    where
        F: FnOnce(&RouteDecision) -> T,
    {
        let decision =
            declaration.map_or(RouteDecision::Master, |declaration| self.route(declaration, args));
        let _scope = RoutingContext::enter(decision.shard().cloned());
        call(&decision)
    }
}
