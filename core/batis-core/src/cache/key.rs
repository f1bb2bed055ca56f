//! Composite cache key
//!
//! Built from the statement id, paging bounds, the bound SQL, every bound
//! parameter value and the environment id. Two keys are equal only when
//! every component matches in order.

use crate::value::Value;
use ahash::RandomState;
use std::fmt;
use std::hash::{Hash, Hasher};

const DEFAULT_MULTIPLIER: u64 = 37;
const DEFAULT_HASHCODE: u64 = 17;

// Fixed seeds keep component hashes stable for the life of the process.
fn component_hasher() -> RandomState {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
}

#[derive(Debug, Clone)]
pub struct CacheKey {
    hashcode: u64,
    checksum: u64,
    count: u64,
    update_list: Vec<Value>,
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheKey {
    pub fn new() -> Self {
        Self {
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
        }
    }

    /// Builds a key from components in order.
    pub fn from_components<I, V>(components: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut key = Self::new();
        for component in components {
            key.update(component);
        }
        key
    }

    /// Mixes one more component into the key.
    pub fn update(&mut self, component: impl Into<Value>) {
        let component = component.into();
        let mut base = component_hasher().hash_one(&component);

        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        base = base.wrapping_mul(self.count);
        self.hashcode = DEFAULT_MULTIPLIER
            .wrapping_mul(self.hashcode)
            .wrapping_add(base);

        self.update_list.push(component);
    }

    pub fn update_all<I, V>(&mut self, components: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for component in components {
            self.update(component);
        }
    }

    pub fn component_count(&self) -> usize {
        self.update_list.len()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.update_list == other.update_list
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hashcode);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for component in &self.update_list {
            write!(f, ":{component}")?;
        }
        Ok(())
    }
}
