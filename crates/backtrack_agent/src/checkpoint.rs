//! In-response registry of rewind points.

/// Snapshot of the accumulated response at the moment a checkpoint marker
/// was seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub id: String,
    /// Length of `visible_prefix`; kept for fast pruning.
    pub position: usize,
    /// User-visible response text up to the marker.
    pub visible_prefix: String,
    /// Same text with earlier checkpoint markers re-inserted verbatim. Used
    /// only when composing the continuation context, never shown to users.
    pub raw_prefix: String,
}

/// Insertion-ordered map from marker id to checkpoint record.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    records: Vec<CheckpointRecord>,
}

impl CheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites the entry for `id`. A later marker with the
    /// same id wins; the store never holds two records for one id.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        visible_prefix: impl Into<String>,
        raw_prefix: impl Into<String>,
    ) {
        let id = id.into();
        let visible_prefix = visible_prefix.into();

        self.records.retain(|record| record.id != id);
        self.records.push(CheckpointRecord {
            position: visible_prefix.len(),
            id,
            visible_prefix,
            raw_prefix: raw_prefix.into(),
        });
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CheckpointRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Removes every entry with `position > p`, dropping checkpoints that
    /// belong to a discarded branch.
    pub fn prune_after(&mut self, position: usize) {
        self.records.retain(|record| record.position <= position);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::CheckpointStore;

    #[test]
    fn register_records_position_from_visible_prefix() {
        let mut store = CheckpointStore::new();
        store.register("a", "Preamble. ", "Preamble. <<checkpoint:a>>");

        let record = store.get("a").expect("checkpoint should be registered");
        assert_eq!(record.position, "Preamble. ".len());
        assert_eq!(record.visible_prefix, "Preamble. ");
        assert_eq!(record.raw_prefix, "Preamble. <<checkpoint:a>>");
    }

    #[test]
    fn reregistering_an_id_keeps_a_single_entry_with_the_later_snapshot() {
        let mut store = CheckpointStore::new();
        store.register("a", "", "<<checkpoint:a>>");
        store.register("a", "longer prefix", "longer prefix<<checkpoint:a>>");

        assert_eq!(store.len(), 1);
        let record = store.get("a").expect("entry should survive");
        assert_eq!(record.position, "longer prefix".len());
    }

    #[test]
    fn prune_after_drops_only_later_checkpoints() {
        let mut store = CheckpointStore::new();
        store.register("a", "", "");
        store.register("b", "some text", "some text");
        store.register("c", "some text and more", "some text and more");

        store.prune_after("some text".len());

        assert!(store.get("a").is_some());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_none());
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn unknown_id_is_absent() {
        let store = CheckpointStore::new();
        assert!(store.get("nope").is_none());
        assert!(store.is_empty());
    }
}
