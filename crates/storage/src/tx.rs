//! Transactions and buckets
//!
//! A [`Tx`] works on a copy-on-write snapshot:
//! - Read transactions share the committed snapshot and never block
//! - Write transactions clone only what they touch (outer map once,
//!   each modified bucket once)
//! - Nothing is visible to others until the store commits the snapshot

use serde::{Deserialize, Serialize};
use slowdb_core::{Error, Result};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Ordered key/value pairs of one bucket
pub(crate) type BucketData = BTreeMap<Vec<u8>, Vec<u8>>;

/// Immutable database state at one commit
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    pub(crate) sequence: u64,
    pub(crate) buckets: BTreeMap<Vec<u8>, Arc<BucketData>>,
}

/// Per-bucket statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStats {
    /// Number of keys
    pub key_count: usize,
    /// Total bytes across all keys
    pub key_bytes: usize,
    /// Total bytes across all values
    pub value_bytes: usize,
}

/// Whole-transaction statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStats {
    /// Number of buckets visible to the transaction
    pub bucket_count: usize,
    /// Number of keys across all buckets
    pub key_count: usize,
}

fn display_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn check_name(name: &[u8]) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("bucket name must not be empty".to_string()));
    }
    Ok(())
}

/// A read or write transaction
///
/// Handed to the closure passed to `Store::update` or `Store::view`.
#[derive(Debug)]
pub struct Tx {
    snapshot: Arc<Snapshot>,
    writable: bool,
    dirty: bool,
}

impl Tx {
    pub(crate) fn read(snapshot: Arc<Snapshot>) -> Self {
        Self {
            snapshot,
            writable: false,
            dirty: false,
        }
    }

    pub(crate) fn write(snapshot: Arc<Snapshot>) -> Self {
        Self {
            snapshot,
            writable: true,
            dirty: false,
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn into_snapshot(self) -> Arc<Snapshot> {
        self.snapshot
    }

    /// Whether this transaction may modify data
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Commit sequence of the snapshot this transaction started from
    pub fn sequence(&self) -> u64 {
        self.snapshot.sequence
    }

    /// Look up a bucket for reading
    pub fn bucket(&self, name: impl AsRef<[u8]>) -> Option<Bucket<'_>> {
        self.snapshot
            .buckets
            .get_key_value(name.as_ref())
            .map(|(name, data)| Bucket {
                name: name.as_slice(),
                data: data.as_ref(),
            })
    }

    /// Look up a bucket for writing
    pub fn bucket_mut(&mut self, name: impl AsRef<[u8]>) -> Result<BucketMut<'_>> {
        let name = name.as_ref();
        self.ensure_writable()?;
        if !self.snapshot.buckets.contains_key(name) {
            return Err(Error::BucketNotFound(display_name(name)));
        }
        Ok(self.mutable_bucket(name))
    }

    /// Create a new bucket, failing if it already exists
    pub fn create_bucket(&mut self, name: impl AsRef<[u8]>) -> Result<BucketMut<'_>> {
        let name = name.as_ref();
        self.ensure_writable()?;
        check_name(name)?;
        if self.snapshot.buckets.contains_key(name) {
            return Err(Error::BucketExists(display_name(name)));
        }
        self.insert_bucket(name);
        Ok(self.mutable_bucket(name))
    }

    /// Create a bucket unless it already exists
    pub fn create_bucket_if_not_exists(&mut self, name: impl AsRef<[u8]>) -> Result<BucketMut<'_>> {
        let name = name.as_ref();
        self.ensure_writable()?;
        check_name(name)?;
        if !self.snapshot.buckets.contains_key(name) {
            self.insert_bucket(name);
        }
        Ok(self.mutable_bucket(name))
    }

    /// Delete a bucket and all of its keys
    pub fn delete_bucket(&mut self, name: impl AsRef<[u8]>) -> Result<()> {
        let name = name.as_ref();
        self.ensure_writable()?;
        if !self.snapshot.buckets.contains_key(name) {
            return Err(Error::BucketNotFound(display_name(name)));
        }
        self.dirty = true;
        Arc::make_mut(&mut self.snapshot).buckets.remove(name);
        Ok(())
    }

    /// Names of all buckets, in order
    pub fn bucket_names(&self) -> Vec<Vec<u8>> {
        self.snapshot.buckets.keys().cloned().collect()
    }

    /// Statistics across all buckets
    pub fn stats(&self) -> TxStats {
        TxStats {
            bucket_count: self.snapshot.buckets.len(),
            key_count: self.snapshot.buckets.values().map(|b| b.len()).sum(),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if !self.writable {
            return Err(Error::TxNotWritable);
        }
        Ok(())
    }

    fn insert_bucket(&mut self, name: &[u8]) {
        self.dirty = true;
        Arc::make_mut(&mut self.snapshot)
            .buckets
            .insert(name.to_vec(), Arc::new(BucketData::new()));
    }

    // Caller has checked that the bucket exists and the tx is writable.
    fn mutable_bucket(&mut self, name: &[u8]) -> BucketMut<'_> {
        let snapshot = Arc::make_mut(&mut self.snapshot);
        let data = snapshot
            .buckets
            .entry(name.to_vec())
            .or_insert_with(|| Arc::new(BucketData::new()));
        BucketMut {
            data,
            dirty: &mut self.dirty,
        }
    }
}

/// Read view of a bucket
#[derive(Debug, Clone, Copy)]
pub struct Bucket<'a> {
    name: &'a [u8],
    data: &'a BucketData,
}

impl<'a> Bucket<'a> {
    /// Bucket name
    pub fn name(&self) -> &'a [u8] {
        self.name
    }

    /// Get the value for a key
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&'a [u8]> {
        self.data.get(key.as_ref()).map(Vec::as_slice)
    }

    /// Check if a key exists
    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        self.data.contains_key(key.as_ref())
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the bucket has no keys
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over all pairs in key order
    pub fn iter(&self) -> Iter<'a> {
        Iter {
            inner: self.data.range::<[u8], _>((Bound::Unbounded, Bound::Unbounded)),
            prefix: None,
        }
    }

    /// Iterate over pairs whose key starts with `prefix`
    pub fn scan_prefix(&self, prefix: &'a [u8]) -> Iter<'a> {
        Iter {
            inner: self.data.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded)),
            prefix: Some(prefix),
        }
    }

    /// Key and byte counts
    pub fn stats(&self) -> BucketStats {
        self.data.iter().fold(BucketStats::default(), |mut stats, (k, v)| {
            stats.key_count += 1;
            stats.key_bytes += k.len();
            stats.value_bytes += v.len();
            stats
        })
    }
}

/// Iterator over bucket pairs
#[derive(Debug)]
pub struct Iter<'a> {
    inner: btree_map::Range<'a, Vec<u8>, Vec<u8>>,
    prefix: Option<&'a [u8]>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (k, v) = self.inner.next()?;
        match self.prefix {
            Some(prefix) if !k.starts_with(prefix) => None,
            _ => Some((k.as_slice(), v.as_slice())),
        }
    }
}

/// Write view of a bucket
#[derive(Debug)]
pub struct BucketMut<'a> {
    data: &'a mut Arc<BucketData>,
    dirty: &'a mut bool,
}

impl BucketMut<'_> {
    /// Set the value for a key
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(Error::InvalidName("key must not be empty".to_string()));
        }
        *self.dirty = true;
        Arc::make_mut(self.data).insert(key.to_vec(), value.as_ref().to_vec());
        Ok(())
    }

    /// Remove a key, returning whether it was present
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> bool {
        if !self.data.contains_key(key.as_ref()) {
            return false;
        }
        *self.dirty = true;
        Arc::make_mut(self.data).remove(key.as_ref()).is_some()
    }

    /// Get the value for a key
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        self.data.get(key.as_ref()).map(Vec::as_slice)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the bucket has no keys
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
