// crates/metrics-shard-core/tests/routing.rs
// ============================================================================
// Module: Routing Context and Interception Tests
// Description: Scoped routing state around intercepted calls.
// Purpose: Ensure routing never outlives a call and undeclared calls hit master.
// Dependencies: metrics-shard-core
// ============================================================================

//! ## Overview
//! Covers the routing scope guard on success, error, and panic, nested
//! scopes, snapshot propagation across threads, and master masking for
//! undeclared calls.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread;

use metrics_shard_core::FixedCurrentTenant;
use metrics_shard_core::MASTER_DATA_SOURCE_KEY;
use metrics_shard_core::RouteDecision;
use metrics_shard_core::RoutingContext;
use metrics_shard_core::ShardArg;
use metrics_shard_core::ShardDeclaration;
use metrics_shard_core::ShardInterceptor;
use metrics_shard_core::ShardKeyResolver;
use metrics_shard_core::ShardKeyed;
use metrics_shard_core::ShardLayout;
use metrics_shard_core::TenantId;

struct ExecSample {
    tenant_id: i64,
    report_id: i64,
}

impl ShardKeyed for ExecSample {
    fn shard_field(&self, field: &str) -> Option<i64> {
        match field {
            "tenantId" => Some(self.tenant_id),
            "reportId" => Some(self.report_id),
            _ => None,
        }
    }
}

fn interceptor(second_level: bool) -> ShardInterceptor {
    let layout = ShardLayout::new(4, 8, second_level).unwrap();
    ShardInterceptor::new(layout, ShardKeyResolver::default())
}

#[test]
fn empty_context_reports_master_key() {
    RoutingContext::clear();
    assert!(RoutingContext::current_shard().is_none());
    assert_eq!(RoutingContext::data_source_key(), MASTER_DATA_SOURCE_KEY);
}

#[test]
fn declared_call_sees_shard_and_context_is_cleared_after() {
    let interceptor = interceptor(false);
    let declaration = ShardDeclaration::tenant();
    let key = interceptor.intercept(Some(&declaration), &[ShardArg::Integer(101)], |decision| {
        assert_eq!(decision.data_source_key(), "metrics1DataSource");
        RoutingContext::data_source_key()
    });
    assert_eq!(key, "metrics1DataSource");
    assert!(RoutingContext::current_shard().is_none());
}

#[test]
fn context_is_cleared_after_error() {
    let interceptor = interceptor(false);
    let declaration = ShardDeclaration::tenant();
    let result: Result<(), String> =
        interceptor.intercept(Some(&declaration), &[ShardArg::Integer(5)], |_| {
            assert!(RoutingContext::current_shard().is_some());
            Err("query failed".to_string())
        });
    assert!(result.is_err());
    assert!(RoutingContext::current_shard().is_none());
}

#[test]
fn context_is_cleared_after_panic() {
    let interceptor = interceptor(false);
    let declaration = ShardDeclaration::tenant();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        interceptor.intercept(Some(&declaration), &[ShardArg::Integer(6)], |_| {
            panic!("repository exploded");
        })
    }));
    assert!(outcome.is_err());
    assert!(RoutingContext::current_shard().is_none());
}

#[test]
fn undeclared_call_routes_to_master_regardless_of_arguments() {
    let interceptor = interceptor(true);
    let sample = ExecSample {
        tenant_id: 101,
        report_id: 3,
    };
    let args = [ShardArg::Entity(&sample), ShardArg::Integer(101)];
    let decision = interceptor.intercept(None, &args, |decision| {
        assert_eq!(RoutingContext::data_source_key(), MASTER_DATA_SOURCE_KEY);
        decision.clone()
    });
    assert_eq!(decision, RouteDecision::Master);
}

#[test]
fn undeclared_call_masks_an_enclosing_shard() {
    let interceptor = interceptor(false);
    let declaration = ShardDeclaration::tenant();
    interceptor.intercept(Some(&declaration), &[ShardArg::Integer(2)], |_| {
        assert_eq!(RoutingContext::data_source_key(), "metrics2DataSource");
        interceptor.intercept(None, &[], |_| {
            assert_eq!(RoutingContext::data_source_key(), MASTER_DATA_SOURCE_KEY);
        });
        assert_eq!(RoutingContext::data_source_key(), "metrics2DataSource");
    });
    assert!(RoutingContext::current_shard().is_none());
}

#[test]
fn unresolved_declared_call_routes_to_master() {
    let interceptor = interceptor(false);
    let declaration = ShardDeclaration::tenant();
    let decision = interceptor.route(&declaration, &[ShardArg::Opaque]);
    assert_eq!(decision, RouteDecision::Master);
}

#[test]
fn second_level_declaration_sets_table_index() {
    let interceptor = interceptor(true);
    let declaration = ShardDeclaration::tenant().with_second_level("reportId");
    let sample = ExecSample {
        tenant_id: 101,
        report_id: 13,
    };
    let decision = interceptor.route(&declaration, &[ShardArg::Entity(&sample)]);
    let shard = decision.shard().unwrap();
    assert_eq!(shard.data_source_key, "metrics1DataSource");
    assert_eq!(shard.table_second_index, 5);
}

#[test]
fn second_level_is_ignored_when_layout_disables_it() {
    let interceptor = interceptor(false);
    let declaration = ShardDeclaration::tenant().with_second_level("reportId");
    let sample = ExecSample {
        tenant_id: 101,
        report_id: 13,
    };
    let decision = interceptor.route(&declaration, &[ShardArg::Entity(&sample)]);
    assert_eq!(decision.shard().unwrap().table_second_index, -1);
}

#[test]
fn ambient_tenant_routes_declared_calls_without_arguments() {
    let layout = ShardLayout::new(4, 1, false).unwrap();
    let resolver = ShardKeyResolver::new(Arc::new(FixedCurrentTenant(TenantId::new(7))));
    let interceptor = ShardInterceptor::new(layout, resolver);
    let decision = interceptor.route(&ShardDeclaration::default(), &[]);
    assert_eq!(decision.data_source_key(), "metrics3DataSource");
}

#[test]
fn nested_scopes_restore_previous_shard() {
    let layout = ShardLayout::new(4, 1, false).unwrap();
    let outer = layout.shard_for(TenantId::new(1), None);
    let inner = layout.shard_for(TenantId::new(2), None);
    {
        let _outer = RoutingContext::enter(Some(outer.clone()));
        {
            let _inner = RoutingContext::enter(Some(inner));
            assert_eq!(RoutingContext::data_source_key(), "metrics2DataSource");
        }
        assert_eq!(RoutingContext::current_shard(), Some(outer));
    }
    assert!(RoutingContext::current_shard().is_none());
}

#[test]
fn snapshot_carries_routing_to_another_thread() {
    let layout = ShardLayout::new(4, 1, false).unwrap();
    let _scope = RoutingContext::enter(Some(layout.shard_for(TenantId::new(3), None)));
    let snapshot = RoutingContext::snapshot();
    let seen = thread::spawn(move || {
        let before = RoutingContext::current_shard();
        let key = {
            let _scope = snapshot.enter();
            RoutingContext::data_source_key()
        };
        (before, key, RoutingContext::current_shard())
    })
    .join()
    .unwrap();
    assert_eq!(seen.0, None);
    assert_eq!(seen.1, "metrics3DataSource");
    assert_eq!(seen.2, None);
}

#[test]
fn explicit_set_and_clear_round_trip() {
    let layout = ShardLayout::new(2, 1, false).unwrap();
    RoutingContext::set_shard(layout.shard_for(TenantId::new(9), None));
    assert_eq!(RoutingContext::data_source_key(), "metrics1DataSource");
    RoutingContext::clear();
    assert_eq!(RoutingContext::data_source_key(), MASTER_DATA_SOURCE_KEY);
}
