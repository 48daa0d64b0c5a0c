//! Logical partitions: label-based subgraph boundaries that let several
//! logical graphs share one physical store.

use std::collections::BTreeSet;

/// A logical partition of the store, enforced through vertex labels.
///
/// Every statement that matches an existing vertex incorporates the
/// partition's pattern labels and/or predicate text, so elements outside
/// the partition are never matched, updated or returned.
pub trait ReadPartition: Send + Sync + std::fmt::Debug {
    /// Whether the given label may be added to or removed from a vertex by
    /// a caller. Labels owned by the partition are off limits.
    fn validate_label(&self, label: &str) -> bool;

    /// Whether a vertex carrying the given labels belongs to the partition.
    fn contains_vertex(&self, labels: &BTreeSet<String>) -> bool;

    /// Whether the partition scopes statements through pattern labels
    /// (see [`vertex_match_pattern_labels`](Self::vertex_match_pattern_labels)).
    fn uses_match_pattern(&self) -> bool;

    /// Whether the partition scopes statements through a predicate
    /// (see [`vertex_match_predicate`](Self::vertex_match_predicate)).
    fn uses_match_predicate(&self) -> bool;

    /// Labels required in a vertex match pattern.
    fn vertex_match_pattern_labels(&self) -> BTreeSet<String>;

    /// Predicate text scoping a vertex alias to the partition, e.g.
    /// `(n:P1 OR n:P2)` with backtick-quoted labels, or `None` when no
    /// predicate is required.
    fn vertex_match_predicate(&self, alias: &str) -> Option<String>;
}

/// Partition without restrictions: the whole store is visible.
#[derive(Debug, Default)]
pub struct NoPartition;

impl ReadPartition for NoPartition {
    fn validate_label(&self, _label: &str) -> bool {
        true
    }

    fn contains_vertex(&self, _labels: &BTreeSet<String>) -> bool {
        true
    }

    fn uses_match_pattern(&self) -> bool {
        false
    }

    fn uses_match_predicate(&self) -> bool {
        false
    }

    fn vertex_match_pattern_labels(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn vertex_match_predicate(&self, _alias: &str) -> Option<String> {
        None
    }
}

/// Partition where every vertex carries at least one of the partition
/// labels.
///
/// With a single label the label is embedded directly in match patterns;
/// with several, an OR-joined predicate is appended to the WHERE clause
/// instead.
#[derive(Debug)]
pub struct AnyLabelPartition {
    labels: BTreeSet<String>,
}

impl AnyLabelPartition {
    /// Creates a partition over the given labels.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}

impl ReadPartition for AnyLabelPartition {
    fn validate_label(&self, label: &str) -> bool {
        !self.labels.contains(label)
    }

    fn contains_vertex(&self, labels: &BTreeSet<String>) -> bool {
        self.labels.iter().any(|label| labels.contains(label))
    }

    fn uses_match_pattern(&self) -> bool {
        self.labels.len() == 1
    }

    fn uses_match_predicate(&self) -> bool {
        self.labels.len() != 1
    }

    fn vertex_match_pattern_labels(&self) -> BTreeSet<String> {
        if self.labels.len() == 1 {
            self.labels.clone()
        } else {
            BTreeSet::new()
        }
    }

    fn vertex_match_predicate(&self, alias: &str) -> Option<String> {
        if self.labels.len() == 1 {
            return None;
        }
        let joined = self
            .labels
            .iter()
            .map(|label| format!("{alias}:`{label}`"))
            .collect::<Vec<_>>()
            .join(" OR ");
        Some(format!("({joined})"))
    }
}

/// Partition where every vertex carries all of the partition labels.
///
/// All labels can be embedded in match patterns, so no predicate is ever
/// required.
#[derive(Debug)]
pub struct AllLabelPartition {
    labels: BTreeSet<String>,
}

impl AllLabelPartition {
    /// Creates a partition over the given labels.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}

impl ReadPartition for AllLabelPartition {
    fn validate_label(&self, label: &str) -> bool {
        !self.labels.contains(label)
    }

    fn contains_vertex(&self, labels: &BTreeSet<String>) -> bool {
        self.labels.iter().all(|label| labels.contains(label))
    }

    fn uses_match_pattern(&self) -> bool {
        !self.labels.is_empty()
    }

    fn uses_match_predicate(&self) -> bool {
        false
    }

    fn vertex_match_pattern_labels(&self) -> BTreeSet<String> {
        self.labels.clone()
    }

    fn vertex_match_predicate(&self, _alias: &str) -> Option<String> {
        None
    }
}
