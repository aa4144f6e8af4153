//! Quantifiers: cardinality contracts wrapped around the result stream.
//!
//! `an` is a lazy pass-through. `the` pulls exactly two elements before
//! deciding. The counted quantifiers buffer up to the required count,
//! then raise or release; `at_least` releases the remainder lazily.

use std::collections::VecDeque;

use super::{EvalError, RowStream};

/// Cardinality expectation on a query's output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// All results, lazily
    An,
    /// Exactly one result; zero or two is a breach
    The,
    /// Exactly `k` results
    Exactly(usize),
    /// At least `k` results
    AtLeast(usize),
    /// At most `k` results
    AtMost(usize),
}

/// Wrap a row stream with a cardinality contract. Breaches are raised
/// from the first pull that observes them.
pub fn apply(quantifier: Quantifier, rows: RowStream<'_>) -> RowStream<'_> {
    match quantifier {
        Quantifier::An => rows,
        Quantifier::The => buffered(rows, 1, 1, true),
        Quantifier::Exactly(k) => buffered(rows, k, k, false),
        Quantifier::AtLeast(k) => buffered(rows, k, usize::MAX, false),
        Quantifier::AtMost(k) => buffered(rows, 0, k, false),
    }
}

/// Buffer enough of the stream to verify `min..=max`, then release.
///
/// Pulls `min.max(check_upper)` elements up front where `check_upper`
/// is `max + 1` when `max` is finite, so an upper breach is observed on
/// the first pull.
fn buffered(mut rows: RowStream<'_>, min: usize, max: usize, the_contract: bool) -> RowStream<'_> {
    let mut state: Option<Result<VecDeque<super::EvalResult<crate::value::Value>>, EvalError>> =
        None;
    let mut tail: Option<RowStream<'_>> = None;
    Box::new(std::iter::from_fn(move || {
        if state.is_none() {
            let need = if max == usize::MAX {
                min
            } else {
                max.saturating_add(1)
            };
            let mut buffer = VecDeque::new();
            let mut count = 0usize;
            let mut saw_error = false;
            while count < need {
                match rows.next() {
                    Some(Ok(value)) => {
                        count += 1;
                        buffer.push_back(Ok(value));
                    }
                    Some(Err(e)) => {
                        buffer.push_back(Err(e));
                        saw_error = true;
                        break;
                    }
                    None => break,
                }
            }
            // an upstream error pre-empts any cardinality verdict
            state = Some(if saw_error {
                Ok(buffer)
            } else if count > max {
                Err(if the_contract {
                    EvalError::MoreThanOneSolutionFound
                } else {
                    EvalError::TooManySolutions { limit: max }
                })
            } else if count < min {
                Err(if the_contract {
                    EvalError::NoSolutionFound
                } else {
                    EvalError::TooFewSolutions {
                        required: min,
                        found: count,
                    }
                })
            } else {
                if max == usize::MAX {
                    // at_least: remainder flows lazily
                    tail = Some(std::mem::replace(&mut rows, Box::new(std::iter::empty())));
                }
                Ok(buffer)
            });
        }
        match state.take() {
            Some(Ok(mut buffer)) => {
                let item = buffer.pop_front();
                state = Some(Ok(buffer));
                match item {
                    Some(item) => Some(item),
                    None => tail.as_mut().and_then(|stream| stream.next()),
                }
            }
            Some(Err(e)) => {
                state = Some(Ok(VecDeque::new()));
                tail = None;
                Some(Err(e))
            }
            None => None,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn stream_of(values: Vec<i64>) -> RowStream<'static> {
        Box::new(values.into_iter().map(|v| Ok(Value::Int(v))))
    }

    fn collect(rows: RowStream<'_>) -> Result<Vec<Value>, EvalError> {
        rows.collect()
    }

    #[test]
    fn test_an_passes_everything() {
        let out = collect(apply(Quantifier::An, stream_of(vec![1, 2, 3]))).expect("an");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_the_requires_exactly_one() {
        assert_eq!(
            collect(apply(Quantifier::The, stream_of(vec![7]))).expect("one"),
            vec![Value::Int(7)]
        );
        assert!(matches!(
            collect(apply(Quantifier::The, stream_of(vec![]))),
            Err(EvalError::NoSolutionFound)
        ));
        assert!(matches!(
            collect(apply(Quantifier::The, stream_of(vec![1, 2]))),
            Err(EvalError::MoreThanOneSolutionFound)
        ));
    }

    #[test]
    fn test_the_pulls_exactly_two() {
        let mut pulled = 0;
        let rows: RowStream<'_> = Box::new(std::iter::from_fn(|| {
            pulled += 1;
            Some(Ok(Value::Int(pulled)))
        }));
        let _ = collect(apply(Quantifier::The, rows));
        assert_eq!(pulled, 2);
    }

    #[test]
    fn test_counted_quantifiers() {
        assert!(collect(apply(Quantifier::Exactly(2), stream_of(vec![1, 2]))).is_ok());
        assert!(matches!(
            collect(apply(Quantifier::Exactly(2), stream_of(vec![1]))),
            Err(EvalError::TooFewSolutions { required: 2, found: 1 })
        ));
        assert!(matches!(
            collect(apply(Quantifier::Exactly(2), stream_of(vec![1, 2, 3]))),
            Err(EvalError::TooManySolutions { limit: 2 })
        ));
        assert_eq!(
            collect(apply(Quantifier::AtLeast(2), stream_of(vec![1, 2, 3])))
                .expect("at least")
                .len(),
            3
        );
        assert!(matches!(
            collect(apply(Quantifier::AtMost(2), stream_of(vec![1, 2, 3]))),
            Err(EvalError::TooManySolutions { limit: 2 })
        ));
        assert_eq!(
            collect(apply(Quantifier::AtMost(3), stream_of(vec![1, 2])))
                .expect("at most")
                .len(),
            2
        );
    }
}
