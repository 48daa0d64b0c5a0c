//! Graph configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::partition::{NoPartition, ReadPartition};

/// Configuration for a [`Graph`](crate::Graph).
#[derive(Clone)]
pub struct GraphConfig {
    pub(crate) partition: Arc<dyn ReadPartition>,
    pub(crate) vertex_labels: BTreeSet<String>,
    pub(crate) readonly: bool,
    pub(crate) profile_statements: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            partition: Arc::new(NoPartition),
            vertex_labels: BTreeSet::new(),
            readonly: false,
            profile_statements: false,
        }
    }
}

impl GraphConfig {
    /// Configuration with no partition, no extra labels and full access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes the graph to a logical partition of the store.
    pub fn with_partition(mut self, partition: Arc<dyn ReadPartition>) -> Self {
        self.partition = partition;
        self
    }

    /// Labels appended to every vertex created through the graph. Hidden
    /// from caller-visible label views.
    pub fn with_vertex_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vertex_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Refuses element creation and mutation when set.
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Prefixes executed statements with `PROFILE` so the store returns
    /// execution plans alongside results.
    pub fn profile_statements(mut self, enabled: bool) -> Self {
        self.profile_statements = enabled;
        self
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("partition", &self.partition)
            .field("vertex_labels", &self.vertex_labels)
            .field("readonly", &self.readonly)
            .field("profile_statements", &self.profile_statements)
            .finish()
    }
}
