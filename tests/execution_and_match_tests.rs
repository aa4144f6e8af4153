//! Integration tests for execution hardening and structural matching
//!
//! Tests for:
//! - Result and intermediate resource limits
//! - Evaluation timeouts
//! - match_entity / match_variable patterns, including nesting
//! - explain() output

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use entiql::prelude::*;
use entiql::{EvalError, ExecutionConfig};

#[derive(Debug)]
struct Handle {
    shape: &'static str,
}

impl Entity for Handle {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "shape" => Some(Value::from(self.shape)),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Door {
    width: i64,
    handle: Arc<Handle>,
}

impl Entity for Door {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "width" => Some(Value::Int(self.width)),
            "handle" => Some(Value::object(Arc::clone(&self.handle))),
            _ => None,
        }
    }
}

fn furnished_registry() -> SymbolRegistry {
    let registry = SymbolRegistry::new();
    let round = registry.symbol(Handle { shape: "round" });
    let lever = registry.symbol(Handle { shape: "lever" });
    registry.register(Arc::new(Door { width: 80, handle: round }));
    registry.register(Arc::new(Door { width: 90, handle: lever }));
    registry
}

#[test]
fn test_result_limit_aborts_the_stream() -> anyhow::Result<()> {
    let values: Vec<Value> = (0..100).map(Value::Int).collect();
    let v = value_variable("v", values);
    let q = entity(v)
        .with_execution(ExecutionConfig::default().with_max_results(10))?;
    let err = q.tolist().expect_err("limit");
    assert!(matches!(err, EvalError::Resource(_)));
    Ok(())
}

#[test]
fn test_intermediate_limit_aborts_large_products() -> anyhow::Result<()> {
    let values: Vec<Value> = (0..100).map(Value::Int).collect();
    let a = value_variable("a", values.clone());
    let b = value_variable("b", values);
    let q = set_of([a, b])
        .with_execution(ExecutionConfig::default().with_max_intermediate(500))?;
    let err = q.tolist().expect_err("limit");
    assert!(matches!(err, EvalError::Resource(_)));
    Ok(())
}

#[test]
fn test_zero_timeout_trips_immediately() -> anyhow::Result<()> {
    let v = value_variable("v", vec![Value::Int(1)]);
    let q = entity(v)
        .with_execution(ExecutionConfig::default().with_timeout(Duration::ZERO))?;
    std::thread::sleep(Duration::from_millis(2));
    let err = q.tolist().expect_err("timeout");
    assert!(matches!(err, EvalError::Timeout(_)));
    Ok(())
}

#[test]
fn test_limit_clause_stays_under_resource_limit() -> anyhow::Result<()> {
    // limit(n) stops pulling, so a tight result cap is never reached
    let values: Vec<Value> = (0..100).map(Value::Int).collect();
    let v = value_variable("v", values);
    let q = entity(v)
        .limit(5)?
        .with_execution(ExecutionConfig::default().with_max_results(10))?;
    assert_eq!(q.tolist()?.len(), 5);
    Ok(())
}

#[test]
fn test_match_entity_on_fields() -> anyhow::Result<()> {
    let registry = furnished_registry();
    let pattern = match_entity::<Door>().field("width", lit(80));
    let target = pattern.target();
    let out = entity(target).using(&registry)?.where_(pattern.cond())?.tolist()?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].downcast::<Door>().expect("door").width, 80);
    Ok(())
}

#[test]
fn test_nested_match_introduces_inner_entity() -> anyhow::Result<()> {
    let registry = furnished_registry();
    let pattern = match_entity::<Door>()
        .field_match("handle", match_entity::<Handle>().field("shape", lit("lever")));
    let target = pattern.target();
    let out = entity(target).using(&registry)?.where_(pattern.cond())?.tolist()?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].downcast::<Door>().expect("door").width, 90);
    Ok(())
}

#[test]
fn test_match_variable_binds_named_target() -> anyhow::Result<()> {
    let registry = furnished_registry();
    let d = variable::<Door>("d");
    let pattern = match_variable::<Door>(d.clone()).field("width", lit(90));
    let out = entity(d).using(&registry)?.where_(pattern.cond())?.tolist()?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].downcast::<Door>().expect("door").width, 90);
    Ok(())
}

#[test]
fn test_explain_dumps_the_dag() -> anyhow::Result<()> {
    let v = value_variable("v", vec![Value::Int(1)]);
    let q = entity(v.clone())
        .where_(v.gt(lit(0)))?
        .ordered_by(v.clone(), true)?
        .limit(3)?;
    let plan = q.explain()?;
    assert!(plan.contains("product"));
    assert!(plan.contains("cmp(>)"));
    assert!(plan.contains("limit 3"));
    assert!(plan.contains("desc"));
    Ok(())
}
