/// One unit of fan-out work.
///
/// `index` is the item's position in the flattened input and is the only
/// thing used to put results back in order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem<T> {
    /// Originating claim
    pub key: String,
    pub index: usize,
    pub payload: T,
}

impl<T> WorkItem<T> {
    pub fn new(key: impl Into<String>, index: usize, payload: T) -> Self {
        Self {
            key: key.into(),
            index,
            payload,
        }
    }

    /// Number a sequence of (key, payload) pairs in order
    pub fn sequence<K: Into<String>>(pairs: impl IntoIterator<Item = (K, T)>) -> Vec<Self> {
        pairs
            .into_iter()
            .enumerate()
            .map(|(index, (key, payload))| WorkItem::new(key, index, payload))
            .collect()
    }
}
