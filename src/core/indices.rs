use hashbrown::HashMap;

use crate::types::ProgressId;

/// Index from a key to the progress records under it, in creation order.
pub type VecIndex<K> = HashMap<K, Vec<ProgressId>>;
/// Index from a key to ledger positions, in append order.
pub type EntryIndex<K> = HashMap<K, Vec<usize>>;
