//! Integration tests for basic query evaluation
//!
//! Tests for:
//! - Variable domains (explicit, registry-backed, untyped)
//! - Comparisons and boolean composition
//! - Membership and type tests
//! - Lifted predicates, including short-circuit behaviour

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use entiql::prelude::*;

#[derive(Debug)]
struct Robot {
    name: &'static str,
    battery: i64,
}

impl Entity for Robot {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name)),
            "battery" => Some(Value::Int(self.battery)),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Cat;

impl Entity for Cat {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn fleet() -> Vec<Arc<Robot>> {
    vec![
        Arc::new(Robot { name: "R2D2", battery: 100 }),
        Arc::new(Robot { name: "C3PO", battery: 20 }),
        Arc::new(Robot { name: "BB8", battery: 80 }),
    ]
}

fn names(values: &[Value]) -> Vec<&'static str> {
    values
        .iter()
        .map(|v| v.downcast::<Robot>().expect("robot").name)
        .collect()
}

#[test]
fn test_filter_by_attribute() -> anyhow::Result<()> {
    let r = variable_over("r", fleet());
    let out = an(entity(r.clone()).where_(r.attr("battery").gt(lit(50)))?).tolist()?;
    assert_eq!(names(&out), vec!["R2D2", "BB8"]);
    Ok(())
}

#[test]
fn test_registry_domain_snapshot() -> anyhow::Result<()> {
    let registry = SymbolRegistry::new();
    registry.symbol(Robot { name: "R2D2", battery: 100 });
    registry.symbol(Robot { name: "C3PO", battery: 20 });

    let r = variable::<Robot>("r");
    let out = entity(r.clone())
        .using(&registry)?
        .where_(r.attr("battery").ge(lit(0)))?
        .tolist()?;
    assert_eq!(names(&out), vec!["R2D2", "C3PO"]);
    Ok(())
}

#[test]
fn test_missing_registry_is_a_build_error() {
    let r = variable::<Robot>("r");
    let err = entity(r).tolist().expect_err("no registry");
    assert!(err.to_string().contains("registry"));
}

#[test]
fn test_conjunction_and_disjunction() -> anyhow::Result<()> {
    let r = variable_over("r", fleet());
    let out = entity(r.clone())
        .where_(and_(
            r.attr("battery").gt(lit(10)),
            r.attr("battery").lt(lit(90)),
        ))?
        .tolist()?;
    assert_eq!(names(&out), vec!["C3PO", "BB8"]);

    let out = entity(r.clone())
        .where_(or_(
            r.attr("name").eq(lit("R2D2")),
            r.attr("battery").eq(lit(20)),
        ))?
        .tolist()?;
    assert_eq!(names(&out), vec!["R2D2", "C3PO"]);
    Ok(())
}

#[test]
fn test_negation_introduces_no_bindings() -> anyhow::Result<()> {
    let r = variable_over("r", fleet());
    let out = entity(r.clone())
        .where_(not_(r.attr("battery").gt(lit(50))))?
        .tolist()?;
    assert_eq!(names(&out), vec!["C3PO"]);
    Ok(())
}

#[test]
fn test_membership() -> anyhow::Result<()> {
    let r = variable_over("r", fleet());
    let wanted = Value::list(vec![Value::from("R2D2"), Value::from("BB8")]);
    let out = entity(r.clone())
        .where_(in_(r.attr("name"), lit(wanted)))?
        .tolist()?;
    assert_eq!(names(&out), vec!["R2D2", "BB8"]);

    let out = entity(r.clone())
        .where_(contains(
            lit(Value::list(vec![Value::Int(20)])),
            r.attr("battery"),
        ))?
        .tolist()?;
    assert_eq!(names(&out), vec!["C3PO"]);
    Ok(())
}

#[test]
fn test_has_type_and_mixed_domains() -> anyhow::Result<()> {
    let mixed = vec![
        Value::object(Arc::new(Robot { name: "R2D2", battery: 100 })),
        Value::object(Arc::new(Cat)),
        Value::Int(7),
    ];
    let v = value_variable("v", mixed);
    let out = entity(v.clone()).where_(has_type::<Robot>(v.clone()))?.tolist()?;
    assert_eq!(out.len(), 1);
    assert_eq!(names(&out), vec!["R2D2"]);
    Ok(())
}

#[test]
fn test_typed_variable_suppresses_off_type_elements() -> anyhow::Result<()> {
    // a typed variable over a mixed explicit domain only yields its type
    let registry = SymbolRegistry::new();
    registry.symbol(Cat);
    registry.symbol(Robot { name: "BB8", battery: 80 });
    let r = variable::<Robot>("r");
    let out = entity(r).using(&registry)?.tolist()?;
    assert_eq!(names(&out), vec!["BB8"]);
    Ok(())
}

#[test]
fn test_predicate_lifting() -> anyhow::Result<()> {
    let r = variable_over("r", fleet());
    let even = predicate("battery_is_even", vec![r.attr("battery")], |args| {
        match args.first() {
            Some(Value::Int(i)) => Ok(i % 2 == 0),
            _ => Err("expected an integer battery".to_string()),
        }
    });
    let out = entity(r.clone()).where_(even)?.tolist()?;
    assert_eq!(out.len(), 3);
    Ok(())
}

#[test]
fn test_failing_predicate_surfaces_unless_absorbing() -> anyhow::Result<()> {
    let r = variable_over("r", fleet());
    let boom = predicate("boom", vec![r.attr("battery")], |_| Err("nope".to_string()));
    let err = entity(r.clone()).where_(boom)?.tolist().expect_err("raise");
    assert!(err.to_string().contains("boom"));

    let boom = predicate("boom", vec![r.attr("battery")], |_| Err("nope".to_string()))
        .absorbing();
    let out = entity(r.clone()).where_(boom)?.tolist()?;
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn test_short_circuit_skips_later_children() -> anyhow::Result<()> {
    // the second condition must never run for bindings the first one
    // rejected
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let r = variable_over("r", fleet());
    let counting = predicate("count_calls", vec![r.attr("battery")], move |args| {
        seen.set(seen.get() + 1);
        match args.first() {
            Some(Value::Int(i)) => Ok(*i > 0),
            _ => Ok(false),
        }
    });
    let out = entity(r.clone())
        .where_(r.attr("battery").gt(lit(50)))?
        .where_(counting)?
        .tolist()?;
    assert_eq!(out.len(), 2);
    assert_eq!(calls.get(), 2);
    Ok(())
}

#[test]
fn test_symbolic_function_and_arithmetic() -> anyhow::Result<()> {
    let r = variable_over("r", fleet());
    let doubled = r.attr("battery").mul(lit(2));
    let out = entity(r.clone()).where_(doubled.ge(lit(160)))?.tolist()?;
    assert_eq!(names(&out), vec!["R2D2", "BB8"]);

    let halved = symbolic_function("halve", vec![r.attr("battery")], |args| {
        match args.first() {
            Some(Value::Int(i)) => Ok(Value::Int(i / 2)),
            _ => Err("expected an integer".to_string()),
        }
    });
    let out = entity(r.clone()).where_(halved.eq(lit(10)))?.tolist()?;
    assert_eq!(names(&out), vec!["C3PO"]);
    Ok(())
}

#[test]
fn test_evaluation_is_deterministic() -> anyhow::Result<()> {
    let r = variable_over("r", fleet());
    let q = entity(r.clone()).where_(r.attr("battery").gt(lit(10)))?;
    let first = q.tolist()?;
    let second = q.tolist()?;
    assert_eq!(names(&first), names(&second));
    Ok(())
}
