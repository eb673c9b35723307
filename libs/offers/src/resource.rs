//! Typed resources and shape-wise subtraction.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Scalar remainders at or below this value are treated as fully consumed.
///
/// Resource managers publish scalar quantities as floating point; repeated
/// subtraction accumulates representation error, so an exact zero check
/// would leave dust entries behind.
pub const SCALAR_EPSILON: f64 = 1e-4;

/// A single named resource within an offer or a task's resource request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name, e.g. "cpus", "mem", "ports". Opaque to the scheduler.
    pub name: String,

    /// Role the resource is reserved for.
    pub role: String,

    /// The value shape.
    pub value: ResourceValue,
}

/// The three value shapes a resource can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    /// A real-valued quantity (cpus, mem).
    Scalar(f64),

    /// Disjoint inclusive integer intervals (ports).
    Ranges(Vec<ValueRange>),

    /// A set of strings.
    Set(BTreeSet<String>),
}

/// An inclusive integer interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub begin: u64,
    pub end: u64,
}

impl ValueRange {
    pub const fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }
}

impl Resource {
    /// A scalar resource.
    pub fn scalar(name: impl Into<String>, role: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            value: ResourceValue::Scalar(value),
        }
    }

    /// A ranges resource.
    pub fn ranges(
        name: impl Into<String>,
        role: impl Into<String>,
        ranges: Vec<ValueRange>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            value: ResourceValue::Ranges(ranges),
        }
    }

    /// A set resource.
    pub fn set<I, S>(name: impl Into<String>, role: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            role: role.into(),
            value: ResourceValue::Set(items.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns true if `other` names the same (name, role) resource.
    pub fn matches(&self, other: &Resource) -> bool {
        self.name == other.name && self.role == other.role
    }

    /// Subtracts `consumed` from this resource, shape-wise.
    ///
    /// Returns `None` when nothing usable remains (the entry is dropped).
    /// Mismatched shapes leave the resource unchanged.
    pub fn subtract(&self, consumed: &Resource) -> Option<Resource> {
        let value = match (&self.value, &consumed.value) {
            (ResourceValue::Scalar(have), ResourceValue::Scalar(used)) => {
                let rest = have - used;
                if rest <= SCALAR_EPSILON {
                    return None;
                }
                ResourceValue::Scalar(rest)
            }
            (ResourceValue::Ranges(have), ResourceValue::Ranges(used)) => {
                let rest = subtract_ranges(have, used);
                if rest.is_empty() {
                    return None;
                }
                ResourceValue::Ranges(rest)
            }
            (ResourceValue::Set(have), ResourceValue::Set(used)) => {
                let rest: BTreeSet<String> = have.difference(used).cloned().collect();
                if rest.is_empty() {
                    return None;
                }
                ResourceValue::Set(rest)
            }
            _ => return Some(self.clone()),
        };

        Some(Resource {
            name: self.name.clone(),
            role: self.role.clone(),
            value,
        })
    }
}

/// Removes every interval in `used` from `have`, splitting as needed.
fn subtract_ranges(have: &[ValueRange], used: &[ValueRange]) -> Vec<ValueRange> {
    let mut rest: Vec<ValueRange> = have.to_vec();

    for u in used {
        let mut next = Vec::with_capacity(rest.len() + 1);
        for r in rest {
            if u.end < r.begin || u.begin > r.end {
                next.push(r);
                continue;
            }
            if r.begin < u.begin {
                next.push(ValueRange::new(r.begin, u.begin - 1));
            }
            if u.end < r.end {
                next.push(ValueRange::new(u.end + 1, r.end));
            }
        }
        rest = next;
    }

    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_subtract_leaves_remainder() {
        let have = Resource::scalar("cpus", "*", 10.0);
        let used = Resource::scalar("cpus", "*", 3.0);

        let rest = have.subtract(&used).unwrap();
        assert_eq!(rest.value, ResourceValue::Scalar(7.0));
    }

    #[test]
    fn scalar_subtract_drops_at_epsilon() {
        let have = Resource::scalar("cpus", "*", 1.0);
        let used = Resource::scalar("cpus", "*", 1.0 - SCALAR_EPSILON / 2.0);

        assert!(have.subtract(&used).is_none());
    }

    #[test]
    fn scalar_subtract_drops_when_overdrawn() {
        let have = Resource::scalar("mem", "*", 128.0);
        let used = Resource::scalar("mem", "*", 256.0);

        assert!(have.subtract(&used).is_none());
    }

    #[test]
    fn ranges_subtract_splits_interval() {
        let have = Resource::ranges("ports", "*", vec![ValueRange::new(1000, 2000)]);
        let used = Resource::ranges("ports", "*", vec![ValueRange::new(1100, 1200)]);

        let rest = have.subtract(&used).unwrap();
        assert_eq!(
            rest.value,
            ResourceValue::Ranges(vec![
                ValueRange::new(1000, 1099),
                ValueRange::new(1201, 2000),
            ])
        );
    }

    #[test]
    fn ranges_subtract_trims_edges() {
        let have = Resource::ranges(
            "ports",
            "*",
            vec![ValueRange::new(10, 20), ValueRange::new(30, 40)],
        );
        let used = Resource::ranges("ports", "*", vec![ValueRange::new(15, 35)]);

        let rest = have.subtract(&used).unwrap();
        assert_eq!(
            rest.value,
            ResourceValue::Ranges(vec![ValueRange::new(10, 14), ValueRange::new(36, 40)])
        );
    }

    #[test]
    fn ranges_subtract_drops_when_fully_covered() {
        let have = Resource::ranges("ports", "*", vec![ValueRange::new(80, 81)]);
        let used = Resource::ranges("ports", "*", vec![ValueRange::new(80, 81)]);

        assert!(have.subtract(&used).is_none());
    }

    #[test]
    fn set_subtract_takes_difference() {
        let have = Resource::set("labels", "*", ["a", "b", "c"]);
        let used = Resource::set("labels", "*", ["b"]);

        let rest = have.subtract(&used).unwrap();
        assert_eq!(
            rest.value,
            ResourceValue::Set(["a".to_string(), "c".to_string()].into_iter().collect())
        );
    }

    #[test]
    fn set_subtract_drops_when_empty() {
        let have = Resource::set("labels", "*", ["a"]);
        let used = Resource::set("labels", "*", ["a", "b"]);

        assert!(have.subtract(&used).is_none());
    }

    #[test]
    fn shape_mismatch_passes_through() {
        let have = Resource::ranges("ports", "*", vec![ValueRange::new(1, 10)]);
        let used = Resource::scalar("ports", "*", 5.0);

        let rest = have.subtract(&used).unwrap();
        assert_eq!(rest, have);
    }

    #[test]
    fn role_is_part_of_identity() {
        let have = Resource::scalar("cpus", "prod", 4.0);
        let used = Resource::scalar("cpus", "*", 4.0);

        assert!(!have.matches(&used));
    }
}
