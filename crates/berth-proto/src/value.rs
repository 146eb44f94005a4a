//! Typed resource values and their arithmetic.
//!
//! A resource quantity is one of four kinds: a scalar (cpus, mem, disk),
//! a set of disjoint integer ranges (ports), a set of strings, or free
//! text. Arithmetic is kind-preserving: adding or subtracting values of
//! different kinds is a programmer error and panics rather than producing
//! a silently wrong quantity.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The four value kinds understood by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Scalar,
    Ranges,
    Set,
    Text,
}

/// A closed integer interval `[begin, end]`, both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

impl Range {
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// A single-element range `[n, n]`.
    pub fn single(n: u64) -> Self {
        Self { begin: n, end: n }
    }

    pub fn contains(&self, n: u64) -> bool {
        self.begin <= n && n <= self.end
    }
}

/// A typed resource quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Scalar(f64),
    Ranges(Vec<Range>),
    Set(BTreeSet<String>),
    Text(String),
}

impl Value {
    /// Ranges value normalized to sorted, disjoint, non-adjacent intervals.
    pub fn ranges(ranges: Vec<Range>) -> Self {
        Value::Ranges(normalize(ranges))
    }

    /// A ranges value holding the single port `n`.
    pub fn port(n: u64) -> Self {
        Value::Ranges(vec![Range::single(n)])
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Ranges(_) => ValueKind::Ranges,
            Value::Set(_) => ValueKind::Set,
            Value::Text(_) => ValueKind::Text,
        }
    }

    /// The additive identity for a kind. Text has no quantity; its zero is
    /// the empty string.
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Scalar => Value::Scalar(0.0),
            ValueKind::Ranges => Value::Ranges(Vec::new()),
            ValueKind::Set => Value::Set(BTreeSet::new()),
            ValueKind::Text => Value::Text(String::new()),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::Scalar(s) => *s == 0.0,
            Value::Ranges(r) => r.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Text(t) => t.is_empty(),
        }
    }

    /// Kind-preserving addition. Panics on kind mismatch or on text values.
    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(a + b),
            (Value::Ranges(a), Value::Ranges(b)) => {
                let mut merged = a.clone();
                merged.extend_from_slice(b);
                Value::Ranges(normalize(merged))
            }
            (Value::Set(a), Value::Set(b)) => Value::Set(a.union(b).cloned().collect()),
            (Value::Text(_), Value::Text(_)) => {
                panic!("text values carry no quantity and cannot be added")
            }
            (a, b) => panic!("value kind mismatch: {:?} + {:?}", a.kind(), b.kind()),
        }
    }

    /// Kind-preserving subtraction. For ranges, removes the sub-intervals
    /// of `other` from `self`; for sets, the set difference. Panics on kind
    /// mismatch or on text values.
    pub fn subtract(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(a - b),
            (Value::Ranges(a), Value::Ranges(b)) => Value::Ranges(subtract_ranges(a, b)),
            (Value::Set(a), Value::Set(b)) => Value::Set(a.difference(b).cloned().collect()),
            (Value::Text(_), Value::Text(_)) => {
                panic!("text values carry no quantity and cannot be subtracted")
            }
            (a, b) => panic!("value kind mismatch: {:?} - {:?}", a.kind(), b.kind()),
        }
    }

    /// Compares two values of the same kind. Scalars are totally ordered.
    /// Ranges and sets compare by inclusion: `Equal` when identical, `Less`
    /// when `self` is a proper subset of `other`, `Greater` otherwise.
    /// Text compares by equality only. Panics on kind mismatch.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Ranges(a), Value::Ranges(b)) => {
                let a = normalize(a.clone());
                let b = normalize(b.clone());
                if a == b {
                    Ordering::Equal
                } else if subtract_ranges(&a, &b).is_empty() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (Value::Set(a), Value::Set(b)) => {
                if a == b {
                    Ordering::Equal
                } else if a.is_subset(b) {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (Value::Text(a), Value::Text(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    Ordering::Greater
                }
            }
            (a, b) => panic!("value kind mismatch: {:?} vs {:?}", a.kind(), b.kind()),
        }
    }

    /// Whether `self` is fully covered by `available`: a scalar no larger,
    /// a range set contained in the offered ranges, a subset.
    pub fn fits_within(&self, available: &Value) -> bool {
        let leftover = self.subtract(available);
        leftover.compare(&Value::zero(self.kind())) != Ordering::Greater
    }

    /// The lowest element of a ranges value, if any. Used for dynamic port
    /// selection.
    pub fn lowest(&self) -> Option<u64> {
        match self {
            Value::Ranges(ranges) => normalize(ranges.clone()).first().map(|r| r.begin),
            _ => None,
        }
    }
}

/// Sorts ranges and merges overlapping or adjacent intervals.
fn normalize(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.retain(|r| r.begin <= r.end);
    ranges.sort();
    let mut out: Vec<Range> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match out.last_mut() {
            // Merge when overlapping or directly adjacent ([1,3] + [4,5]).
            Some(last) if r.begin <= last.end.saturating_add(1) => {
                last.end = last.end.max(r.end);
            }
            _ => out.push(r),
        }
    }
    out
}

/// Removes every interval of `b` from `a`. Both inputs may be unnormalized.
fn subtract_ranges(a: &[Range], b: &[Range]) -> Vec<Range> {
    let b = normalize(b.to_vec());
    let mut out = normalize(a.to_vec());
    for cut in &b {
        let mut next = Vec::with_capacity(out.len());
        for r in out {
            if cut.end < r.begin || cut.begin > r.end {
                next.push(r);
                continue;
            }
            if r.begin < cut.begin {
                next.push(Range::new(r.begin, cut.begin - 1));
            }
            if cut.end < r.end {
                next.push(Range::new(cut.end + 1, r.end));
            }
        }
        out = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(pairs: &[(u64, u64)]) -> Value {
        Value::ranges(pairs.iter().map(|&(b, e)| Range::new(b, e)).collect())
    }

    #[test]
    fn scalar_arithmetic() {
        let a = Value::Scalar(2.0);
        let b = Value::Scalar(0.5);
        assert_eq!(a.add(&b), Value::Scalar(2.5));
        assert_eq!(a.subtract(&b), Value::Scalar(1.5));
        assert_eq!(a.compare(&b), Ordering::Greater);
        assert_eq!(b.compare(&a), Ordering::Less);
    }

    #[test]
    fn ranges_normalize_merges_adjacent() {
        let v = ranges(&[(5, 7), (1, 3), (4, 4)]);
        assert_eq!(v, Value::Ranges(vec![Range::new(1, 7)]));
    }

    #[test]
    fn ranges_subtract_removes_subintervals() {
        let v = ranges(&[(1, 10)]).subtract(&ranges(&[(3, 5)]));
        assert_eq!(
            v,
            Value::Ranges(vec![Range::new(1, 2), Range::new(6, 10)])
        );
    }

    #[test]
    fn ranges_subtract_to_empty() {
        let v = ranges(&[(3, 5)]).subtract(&ranges(&[(1, 10)]));
        assert!(v.is_zero());
    }

    #[test]
    fn ranges_compare_is_subset_based() {
        assert_eq!(ranges(&[(3, 5)]).compare(&ranges(&[(1, 10)])), Ordering::Less);
        assert_eq!(ranges(&[(1, 10)]).compare(&ranges(&[(1, 10)])), Ordering::Equal);
        assert_eq!(
            ranges(&[(1, 12)]).compare(&ranges(&[(1, 10)])),
            Ordering::Greater
        );
    }

    #[test]
    fn set_arithmetic() {
        let a = Value::Set(["a", "b"].iter().map(|s| s.to_string()).collect());
        let b = Value::Set(["b"].iter().map(|s| s.to_string()).collect());
        assert_eq!(
            a.subtract(&b),
            Value::Set(["a"].iter().map(|s| s.to_string()).collect())
        );
        assert_eq!(b.compare(&a), Ordering::Less);
    }

    #[test]
    fn fits_within_scalar() {
        assert!(Value::Scalar(0.5).fits_within(&Value::Scalar(2.0)));
        assert!(Value::Scalar(2.0).fits_within(&Value::Scalar(2.0)));
        assert!(!Value::Scalar(2.5).fits_within(&Value::Scalar(2.0)));
    }

    #[test]
    fn fits_within_ranges() {
        assert!(ranges(&[(8080, 8080)]).fits_within(&ranges(&[(8000, 9000)])));
        assert!(!ranges(&[(9500, 9500)]).fits_within(&ranges(&[(8000, 9000)])));
    }

    #[test]
    fn lowest_port() {
        assert_eq!(ranges(&[(31000, 31100), (20, 25)]).lowest(), Some(20));
        assert_eq!(Value::Ranges(Vec::new()).lowest(), None);
    }

    #[test]
    #[should_panic(expected = "value kind mismatch")]
    fn kind_mismatch_panics() {
        Value::Scalar(1.0).add(&Value::port(80));
    }
}
