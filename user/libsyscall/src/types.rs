use core::marker::PhantomData;

use crate::{sys_sload, sys_sstore};

/// Typed key/value view over contract storage.
///
/// Slot for `key` is `key << 32 | id`. Mappings with different ids stay
/// apart as long as ids fit in 32 bits; keys above 2^32 lose their high bits
/// and may alias.
pub struct Mapping<K, V> {
    id: u64,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> Mapping<K, V> {
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl<K, V> Default for Mapping<K, V> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<K: Into<u64>, V: Into<u64> + From<u64>> Mapping<K, V> {
    pub fn encode_key(&self, key: K) -> u64 {
        (key.into() << 32) | self.id
    }

    pub fn read(&self, key: K) -> V {
        V::from(sys_sload(self.encode_key(key)))
    }

    pub fn write(&self, key: K, value: V) {
        sys_sstore(self.encode_key(key), value.into());
    }
}
