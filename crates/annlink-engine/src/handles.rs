//! Network handles and the per-network shape cache.

use std::collections::HashMap;
use std::fmt;

use crate::error::{EngineError, Result};
use crate::shape::TensorShape;

/// Identifier of one loaded network within the engine.
///
/// Assigned by the backend's load call (a C `int`); unique among
/// currently-loaded networks, and may be reused after unload
/// (backend-defined).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(i32);

impl NetworkId {
    /// Wrap a raw backend id.
    pub fn from_raw(raw: i32) -> Self {
        NetworkId(raw)
    }

    /// The raw backend id.
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cached tensor shapes of one loaded network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkShapes {
    pub input: TensorShape,
    pub output: TensorShape,
}

/// Shape cache keyed by network id.
///
/// Both shapes are recorded together at load time and removed together at
/// unload, so an id present in the table always has both of them.
#[derive(Debug)]
pub struct HandleTable {
    entries: HashMap<NetworkId, NetworkShapes>,
}

impl HandleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        HandleTable {
            entries: HashMap::new(),
        }
    }

    /// Store both shapes for an id, overwriting any prior entry.
    pub fn record(&mut self, id: NetworkId, input: TensorShape, output: TensorShape) {
        self.entries.insert(id, NetworkShapes { input, output });
    }

    /// Both cached shapes for an id.
    pub fn get(&self, id: NetworkId) -> Result<&NetworkShapes> {
        self.entries
            .get(&id)
            .ok_or(EngineError::UnknownNetwork(id))
    }

    /// The cached input shape for an id.
    pub fn input_shape(&self, id: NetworkId) -> Result<&TensorShape> {
        self.get(id).map(|shapes| &shapes.input)
    }

    /// The cached output shape for an id.
    pub fn output_shape(&self, id: NetworkId) -> Result<&TensorShape> {
        self.get(id).map(|shapes| &shapes.output)
    }

    /// Remove and return both cached shapes for an id.
    ///
    /// After removal the id is invalid for inference even if the backend
    /// has not reused it yet.
    pub fn remove(&mut self, id: NetworkId) -> Result<NetworkShapes> {
        self.entries
            .remove(&id)
            .ok_or(EngineError::UnknownNetwork(id))
    }

    /// Whether an id is currently recorded.
    pub fn contains(&self, id: NetworkId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Currently-recorded ids, sorted.
    pub fn ids(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of recorded ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no ids are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[usize]) -> TensorShape {
        TensorShape::from(dims)
    }

    #[test]
    fn test_record_and_lookup() {
        let mut table = HandleTable::new();
        let id = NetworkId::from_raw(0);
        table.record(id, shape(&[1, 3, 224, 224]), shape(&[1, 512]));

        assert_eq!(table.input_shape(id).unwrap().dims(), &[1, 3, 224, 224]);
        assert_eq!(table.output_shape(id).unwrap().dims(), &[1, 512]);
        assert!(table.contains(id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_record_overwrites_same_id() {
        let mut table = HandleTable::new();
        let id = NetworkId::from_raw(3);
        table.record(id, shape(&[1]), shape(&[2]));
        table.record(id, shape(&[4]), shape(&[8]));

        assert_eq!(table.input_shape(id).unwrap().dims(), &[4]);
        assert_eq!(table.output_shape(id).unwrap().dims(), &[8]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_id() {
        let table = HandleTable::new();
        let err = table.input_shape(NetworkId::from_raw(7)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownNetwork(id) if id.raw() == 7));
    }

    #[test]
    fn test_remove_then_lookup_fails() {
        let mut table = HandleTable::new();
        let id = NetworkId::from_raw(0);
        table.record(id, shape(&[2, 2]), shape(&[4]));

        let removed = table.remove(id).unwrap();
        assert_eq!(removed.input.dims(), &[2, 2]);
        assert_eq!(removed.output.dims(), &[4]);

        assert!(table.output_shape(id).is_err());
        assert!(!table.contains(id));
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_twice_fails() {
        let mut table = HandleTable::new();
        let id = NetworkId::from_raw(1);
        table.record(id, shape(&[1]), shape(&[1]));

        assert!(table.remove(id).is_ok());
        let err = table.remove(id).unwrap_err();
        assert!(matches!(err, EngineError::UnknownNetwork(_)));
    }

    #[test]
    fn test_ids_sorted() {
        let mut table = HandleTable::new();
        for raw in [5, 1, 3] {
            table.record(NetworkId::from_raw(raw), shape(&[1]), shape(&[1]));
        }
        let ids: Vec<i32> = table.ids().into_iter().map(NetworkId::raw).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }
}
