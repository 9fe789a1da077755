//! Six-valued combination table.
//!
//! Every place that folds several verdicts into one (criteria operators, the
//! per-item `check` of a test) goes through [`combine`], so the table lives
//! in exactly one spot.

use ovaleval_types::{Operator, ResultsError, Verdict};

/// Ordering of the non-boolean verdicts, worst first.
///
/// When an operator cannot decide from its `True`/`False` children alone, the
/// result is the worst non-boolean child under this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precedence {
    order: [Verdict; 4],
}

impl Default for Precedence {
    fn default() -> Self {
        Self {
            order: [
                Verdict::Error,
                Verdict::Unknown,
                Verdict::NotEvaluated,
                Verdict::NotApplicable,
            ],
        }
    }
}

impl Precedence {
    /// `order` must list `Error`, `Unknown`, `NotEvaluated` and `NotApplicable`
    /// exactly once each, worst first.
    pub fn new(order: [Verdict; 4]) -> Result<Self, ResultsError> {
        for v in Precedence::default().order {
            if order.iter().filter(|x| **x == v).count() != 1 {
                return Err(ResultsError::InvalidPrecedence(format!(
                    "{} must appear exactly once in {:?}",
                    v,
                    order.map(|x| x.as_str())
                )));
            }
        }
        Ok(Self { order })
    }

    pub fn from_slice(order: &[Verdict]) -> Result<Self, ResultsError> {
        let arr: [Verdict; 4] = order.try_into().map_err(|_| {
            ResultsError::InvalidPrecedence(format!("expected 4 entries, got {}", order.len()))
        })?;
        Self::new(arr)
    }

    pub fn order(&self) -> [Verdict; 4] {
        self.order
    }

    /// Higher is worse. `Invalid` ranks with `Error`; booleans rank lowest.
    pub fn rank(&self, v: Verdict) -> usize {
        let v = if v == Verdict::Invalid { Verdict::Error } else { v };
        match self.order.iter().position(|x| *x == v) {
            Some(pos) => self.order.len() - pos,
            None => 0,
        }
    }

    /// Worst non-boolean verdict in `values`, if any.
    pub fn worst<I>(&self, values: I) -> Option<Verdict>
    where
        I: IntoIterator<Item = Verdict>,
    {
        values
            .into_iter()
            .filter(|v| !v.is_boolean())
            .map(|v| if v == Verdict::Invalid { Verdict::Error } else { v })
            .max_by_key(|v| self.rank(*v))
    }
}

/// Fold child verdicts under `op`.
///
/// Empty input: AND is `True`, OR/ONE/XOR are `False`.
pub fn combine(op: Operator, children: &[Verdict], precedence: &Precedence) -> Verdict {
    let trues = children.iter().filter(|v| **v == Verdict::True).count();
    let falses = children.iter().filter(|v| **v == Verdict::False).count();
    let undecided = precedence.worst(children.iter().copied());

    match op {
        Operator::And => {
            if falses > 0 {
                Verdict::False
            } else {
                undecided.unwrap_or(Verdict::True)
            }
        }
        Operator::Or => {
            if trues > 0 {
                Verdict::True
            } else {
                undecided.unwrap_or(Verdict::False)
            }
        }
        Operator::One => match undecided {
            Some(worst) => worst,
            None if trues == 1 => Verdict::True,
            None => Verdict::False,
        },
        Operator::Xor => match undecided {
            Some(worst) => worst,
            None if trues % 2 == 1 => Verdict::True,
            None => Verdict::False,
        },
    }
}
