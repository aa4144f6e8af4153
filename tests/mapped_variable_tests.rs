//! Integration tests for mapped-variable navigation
//!
//! Tests for:
//! - Attribute, index and call navigation
//! - Flattening (the only navigation that multiplies bindings)
//! - Symbolic-path caching and cross-constraint unification
//! - Resolution errors and their absorption under negation

use std::any::Any;
use std::sync::Arc;

use entiql::prelude::*;
use entiql::{length, EvalError};

#[derive(Debug)]
struct Part {
    label: &'static str,
    weight: i64,
}

impl Entity for Part {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "label" => Some(Value::from(self.label)),
            "weight" => Some(Value::Int(self.weight)),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Robot {
    name: &'static str,
    parts: Vec<Arc<Part>>,
}

impl Entity for Robot {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name)),
            "parts" => Some(Value::list(
                self.parts.iter().cloned().map(Value::object).collect(),
            )),
            _ => None,
        }
    }

    fn index(&self, key: &Value) -> Option<Value> {
        match key {
            Value::Int(i) => self.parts.get(*i as usize).cloned().map(Value::object),
            _ => None,
        }
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Option<Value> {
        match method {
            "part_count" => Some(Value::Int(self.parts.len() as i64)),
            "heavier_than" => match args.first() {
                Some(Value::Int(limit)) => Some(Value::Bool(
                    self.parts.iter().any(|p| p.weight > *limit),
                )),
                _ => None,
            },
            _ => None,
        }
    }
}

fn r2d2() -> Arc<Robot> {
    Arc::new(Robot {
        name: "R2D2",
        parts: vec![
            Arc::new(Part { label: "arm", weight: 3 }),
            Arc::new(Part { label: "leg", weight: 7 }),
        ],
    })
}

#[test]
fn test_flatten_preserves_source_order() -> anyhow::Result<()> {
    let r = variable_over("r", vec![r2d2()]);
    let p = flat_variable(r.attr("parts"));
    let out = entity(p.clone())
        .where_(r.attr("name").eq(lit("R2D2")))?
        .tolist()?;
    let labels: Vec<_> = out
        .iter()
        .map(|v| v.downcast::<Part>().expect("part").label)
        .collect();
    assert_eq!(labels, vec!["arm", "leg"]);
    Ok(())
}

#[test]
fn test_shared_path_unifies_across_constraints() -> anyhow::Result<()> {
    // p appears in two independently-written conditions; both must
    // constrain the same flattened element, not a cross product
    let r = variable_over("r", vec![r2d2()]);
    let p = r.attr("parts").flat();
    let out = entity(p.clone())
        .where_(p.attr("weight").gt(lit(1)))?
        .where_(p.attr("weight").lt(lit(5)))?
        .tolist()?;
    let labels: Vec<_> = out
        .iter()
        .map(|v| v.downcast::<Part>().expect("part").label)
        .collect();
    assert_eq!(labels, vec!["arm"]);
    Ok(())
}

#[test]
fn test_index_navigation() -> anyhow::Result<()> {
    let r = variable_over("r", vec![r2d2()]);
    // entity indexing goes through the host bridge
    let out = entity(r.at(1)).tolist()?;
    assert_eq!(out[0].downcast::<Part>().expect("part").label, "leg");

    // list indexing supports negative keys
    let last = entity(r.attr("parts").at(-1)).tolist()?;
    assert_eq!(last[0].downcast::<Part>().expect("part").label, "leg");
    Ok(())
}

#[test]
fn test_call_navigation_with_symbolic_args() -> anyhow::Result<()> {
    let r = variable_over("r", vec![r2d2()]);
    let out = entity(r.call("part_count", vec![])).tolist()?;
    assert_eq!(out, vec![Value::Int(2)]);

    let q = entity(r.clone()).where_(r.call("heavier_than", vec![lit(5)]).eq(lit(true)))?;
    assert_eq!(q.tolist()?.len(), 1);
    Ok(())
}

#[test]
fn test_length_of_collections() -> anyhow::Result<()> {
    let r = variable_over("r", vec![r2d2()]);
    let out = entity(length(r.attr("parts"))).tolist()?;
    assert_eq!(out, vec![Value::Int(2)]);
    Ok(())
}

#[test]
fn test_missing_attribute_surfaces_with_path() {
    let r = variable_over("r", vec![r2d2()]);
    let err = entity(r.attr("serial")).tolist().expect_err("missing attr");
    match err {
        EvalError::Resolution { op, path, .. } => {
            assert!(op.contains("serial"));
            assert!(path.contains("attr(serial)"));
        }
        other => panic!("expected a resolution error, got {other}"),
    }
}

#[test]
fn test_negation_absorbs_resolution_failures() -> anyhow::Result<()> {
    let r = variable_over("r", vec![r2d2()]);
    // r.serial never resolves, so the negated condition holds
    let out = entity(r.clone())
        .where_(not_(r.attr("serial").eq(lit("SN-1"))))?
        .tolist()?;
    assert_eq!(out.len(), 1);
    Ok(())
}

#[test]
fn test_flatten_of_non_iterable_fails() {
    let r = variable_over("r", vec![r2d2()]);
    let err = entity(r.attr("name").flat()).tolist().expect_err("not iterable");
    assert!(matches!(err, EvalError::Resolution { .. }));
}
