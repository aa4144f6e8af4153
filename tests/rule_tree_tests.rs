//! Integration tests for rule trees and inference
//!
//! Tests for:
//! - Default conclusions with refinement / alternative selection
//! - next_rule chains
//! - Inference constructors (lazy, once per firing binding)
//! - Deduced variables reasoning over earlier conclusions

use std::any::Any;
use std::sync::Arc;

use entiql::prelude::*;

#[derive(Debug)]
struct Connection {
    name: &'static str,
    kind: i64,
}

impl Entity for Connection {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name)),
            "kind" => Some(Value::Int(self.kind)),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct View {
    source: String,
    style: &'static str,
}

impl Entity for View {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "source" => Some(Value::from(self.source.as_str())),
            "style" => Some(Value::from(self.style)),
            _ => None,
        }
    }
}

fn view_for(style: &'static str, kwargs: &indexmap::IndexMap<String, Value>) -> View {
    let source = kwargs
        .get("source")
        .map(|v| v.to_string())
        .unwrap_or_default();
    View { source, style }
}

fn connections() -> Vec<Arc<Connection>> {
    vec![
        Arc::new(Connection { name: "c1", kind: 1 }),
        Arc::new(Connection { name: "c2", kind: 2 }),
        Arc::new(Connection { name: "c3", kind: 3 }),
    ]
}

fn styles(values: &[Value]) -> Vec<&'static str> {
    values
        .iter()
        .map(|v| v.downcast::<View>().expect("view").style)
        .collect()
}

#[test]
fn test_refinement_and_alternative_supersede_default() -> anyhow::Result<()> {
    let views = ConclusionLog::new();
    let c = variable_over("c", connections());
    let q = entity(c.clone()).rule_tree(|r| {
        r.add(
            &views,
            inference::<View, _>(vec![("source", c.attr("name"))], |kw| {
                view_for("plain", kw)
            }),
        );
        r.refinement(c.attr("kind").eq(lit(1)), |s| {
            s.add(
                &views,
                inference::<View, _>(vec![("source", c.attr("name"))], |kw| {
                    view_for("fixed", kw)
                }),
            );
        });
        r.alternative(c.attr("kind").eq(lit(2)), |s| {
            s.add(
                &views,
                inference::<View, _>(vec![("source", c.attr("name"))], |kw| {
                    view_for("revolute", kw)
                }),
            );
        });
    })?;

    let out = an(q).tolist()?;
    assert_eq!(styles(&out), vec!["fixed", "revolute", "plain"]);

    // the conclusion log saw the same values in the same order
    assert_eq!(styles(&views.snapshot()), vec!["fixed", "revolute", "plain"]);

    let sources: Vec<String> = out
        .iter()
        .map(|v| v.downcast::<View>().expect("view").source.clone())
        .collect();
    assert_eq!(sources, vec!["c1", "c2", "c3"]);
    Ok(())
}

#[test]
fn test_alternative_fires_per_outer_binding() -> anyhow::Result<()> {
    // the else-if chain is tracked per connection, not globally: c1
    // takes the refinement, c2 still reaches the alternative
    let log = ConclusionLog::new();
    let c = variable_over("c", connections());
    let q = entity(c.clone()).rule_tree(|r| {
        r.refinement(c.attr("kind").eq(lit(1)), |s| {
            s.add(&log, lit("one"));
        });
        r.alternative(c.attr("kind").ge(lit(2)), |s| {
            s.add(&log, lit("big"));
        });
    })?;
    let out = an(q).tolist()?;
    assert_eq!(out, vec![Value::from("one"), Value::from("big"), Value::from("big")]);
    Ok(())
}

#[test]
fn test_next_rule_runs_regardless_of_prior_firing() -> anyhow::Result<()> {
    let log = ConclusionLog::new();
    let c = variable_over("c", connections());
    let q = entity(c.clone()).rule_tree(|r| {
        r.add(&log, c.attr("name"));
        r.refinement(c.attr("kind").eq(lit(1)), |s| {
            s.add(&log, lit("refined"));
        });
        r.next_rule(|s| {
            s.add(&log, lit("audit"));
        });
    })?;
    let out = an(q).tolist()?;
    // c1: refined (default superseded) + audit; c2/c3: default + audit
    assert_eq!(
        out,
        vec![
            Value::from("refined"),
            Value::from("audit"),
            Value::from("c2"),
            Value::from("audit"),
            Value::from("c3"),
            Value::from("audit"),
        ]
    );
    Ok(())
}

#[test]
fn test_rule_conditions_filter_the_scope() -> anyhow::Result<()> {
    let log = ConclusionLog::new();
    let c = variable_over("c", connections());
    let q = entity(c.clone())
        .where_(c.attr("kind").gt(lit(1)))?
        .rule_tree(|r| {
            r.add(&log, c.attr("name"));
        })?;
    let out = an(q).tolist()?;
    assert_eq!(out, vec![Value::from("c2"), Value::from("c3")]);
    Ok(())
}

#[test]
fn test_deduced_variable_reasons_over_conclusions() -> anyhow::Result<()> {
    let views = ConclusionLog::new();
    let c = variable_over("c", connections());
    let q = entity(c.clone()).rule_tree(|r| {
        r.add(
            &views,
            inference::<View, _>(vec![("source", c.attr("name"))], |kw| {
                view_for("plain", kw)
            }),
        );
    })?;
    an(q).tolist()?;
    assert_eq!(views.len(), 3);

    // a second query ranges over the deduced instances
    let v = deduced_variable::<View>("v", &views);
    let out = entity(v.clone())
        .where_(v.attr("source").eq(lit("c2")))?
        .tolist()?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].downcast::<View>().expect("view").source, "c2");
    Ok(())
}

#[test]
fn test_inference_runs_once_per_firing_binding() -> anyhow::Result<()> {
    use std::cell::Cell;
    use std::rc::Rc;

    let constructed = Rc::new(Cell::new(0));
    let seen = Rc::clone(&constructed);
    let log = ConclusionLog::new();
    let c = variable_over("c", connections());
    let q = entity(c.clone()).rule_tree(|r| {
        r.refinement(c.attr("kind").eq(lit(2)), |s| {
            s.add(
                &log,
                inference::<View, _>(vec![("source", c.attr("name"))], move |kw| {
                    seen.set(seen.get() + 1);
                    view_for("counted", kw)
                }),
            );
        });
    })?;
    an(q).tolist()?;
    assert_eq!(constructed.get(), 1);
    Ok(())
}

#[test]
fn test_rule_tree_rejects_shaping_clauses() -> anyhow::Result<()> {
    let log = ConclusionLog::new();
    let c = variable_over("c", connections());
    let q = entity(c.clone())
        .ordered_by(c.attr("kind"), false)?
        .rule_tree(|r| {
            r.add(&log, c.attr("name"));
        })?;
    assert!(q.tolist().is_err());
    Ok(())
}
