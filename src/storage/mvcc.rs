use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    storage::{
        engine::Engine,
        keycode::{deserialize_key, serialize_key},
    },
};

/// Transaction version number
pub type Version = u64;

/// Snapshot-isolated transactions over a storage engine
///
/// The engine is shared behind a mutex; every transaction clones the handle.
pub struct Mvcc<E: Engine> {
    engine: Arc<Mutex<E>>,
}

impl<E: Engine> Clone for Mvcc<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<E: Engine> Mvcc<E> {
    pub fn new(eng: E) -> Self {
        Self {
            engine: Arc::new(Mutex::new(eng)),
        }
    }

    pub fn begin(&self) -> Result<MvccTransaction<E>> {
        MvccTransaction::begin(self.engine.clone())
    }
}

pub struct MvccTransaction<E: Engine> {
    engine: Arc<Mutex<E>>,
    snapshot: Snapshot,
}

/// What a transaction can see: its own version and everything committed
/// before it began
pub struct Snapshot {
    pub version: Version,
    pub active_versions: HashSet<Version>,
}

impl Snapshot {
    fn is_visible(&self, version: Version) -> bool {
        !self.active_versions.contains(&version) && version <= self.version
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum MvccKey {
    /// Next version to hand out
    NextVersion,
    /// Marker for an uncommitted transaction
    TxnActive(Version),
    /// Write-set entry, used to undo the write on rollback
    TxnWrite(Version, #[serde(with = "serde_bytes")] Vec<u8>),
    /// Versioned user key
    Version(#[serde(with = "serde_bytes")] Vec<u8>, Version),
}

impl MvccKey {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        deserialize_key(data)
    }
}

/// Prefixes of `MvccKey`; variant order must match `MvccKey`
#[derive(Debug, Serialize, Deserialize)]
pub enum MvccKeyPrefix {
    NextVersion,
    TxnActive,
    TxnWrite(Version),
    Version(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl MvccKeyPrefix {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(self)
    }
}

impl<E: Engine> MvccTransaction<E> {
    pub fn begin(eng: Arc<Mutex<E>>) -> Result<Self> {
        let mut engine = eng.lock()?;

        let version = match engine.get(MvccKey::NextVersion.encode()?)? {
            Some(value) => bincode::deserialize(&value)?,
            None => 1,
        };
        engine.set(
            MvccKey::NextVersion.encode()?,
            bincode::serialize(&(version + 1))?,
        )?;

        let active_versions = Self::scan_active(&mut engine)?;
        engine.set(MvccKey::TxnActive(version).encode()?, vec![])?;
        drop(engine);

        tracing::trace!(version, active = active_versions.len(), "begin transaction");
        Ok(Self {
            engine: eng,
            snapshot: Snapshot {
                version,
                active_versions,
            },
        })
    }

    /// Keeps this transaction's versions and discards the bookkeeping that
    /// would undo them
    pub fn commit(&self) -> Result<()> {
        let mut engine = self.engine.lock()?;
        let write_set = self.write_set(&mut engine)?;
        tracing::trace!(
            version = self.snapshot.version,
            writes = write_set.len(),
            "commit transaction"
        );
        for (entry, _) in write_set {
            engine.delete(entry)?;
        }
        engine.delete(MvccKey::TxnActive(self.snapshot.version).encode()?)
    }

    /// Erases every version this transaction wrote along with its
    /// bookkeeping, as if it never ran
    pub fn rollback(&self) -> Result<()> {
        let mut engine = self.engine.lock()?;
        let write_set = self.write_set(&mut engine)?;
        tracing::trace!(
            version = self.snapshot.version,
            writes = write_set.len(),
            "rollback transaction"
        );
        for (entry, user_key) in write_set {
            engine.delete(MvccKey::Version(user_key, self.snapshot.version).encode()?)?;
            engine.delete(entry)?;
        }
        engine.delete(MvccKey::TxnActive(self.snapshot.version).encode()?)
    }

    /// Encoded write-set entries of this transaction with the user key each
    /// one records
    fn write_set(&self, engine: &mut MutexGuard<E>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let prefix = MvccKeyPrefix::TxnWrite(self.snapshot.version).encode()?;
        let mut entries = Vec::new();
        let mut iter = engine.scan_prefix(prefix);
        while let Some((entry, _)) = iter.next().transpose()? {
            match MvccKey::decode(&entry)? {
                MvccKey::TxnWrite(_, user_key) => entries.push((entry, user_key)),
                other => {
                    return Err(Error::Internal(format!("unexpected key {other:?} in write set")));
                }
            }
        }
        Ok(entries)
    }

    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.write_inner(key, Some(value))
    }

    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        self.write_inner(key, None)
    }

    /// Latest version of `key` visible to this transaction
    pub fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let mut engine = self.engine.lock()?;

        let from = MvccKey::Version(key.clone(), 0).encode()?;
        let to = MvccKey::Version(key, self.snapshot.version).encode()?;
        let mut iter = engine.scan(from..=to).rev();

        while let Some((key, value)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::Version(_, version) => {
                    if self.snapshot.is_visible(version) {
                        return Ok(bincode::deserialize(&value)?);
                    }
                }
                other => return Err(Error::Internal(format!("unexpected key {other:?}"))),
            }
        }
        Ok(None)
    }

    /// Scans user keys starting with `prefix`, latest visible version each,
    /// in key order
    pub fn scan_prefix(&self, prefix: Vec<u8>) -> Result<Vec<ScanResult>> {
        let mut eng = self.engine.lock()?;
        // strip the 0x00 0x00 terminator so the encoded prefix matches longer keys
        let mut enc_prefix = MvccKeyPrefix::Version(prefix).encode()?;
        enc_prefix.truncate(enc_prefix.len() - 2);

        let mut iter = eng.scan_prefix(enc_prefix);
        let mut results = BTreeMap::new();
        while let Some((key, value)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::Version(raw_key, version) => {
                    if self.snapshot.is_visible(version) {
                        match bincode::deserialize(&value)? {
                            Some(raw_value) => results.insert(raw_key, raw_value),
                            None => results.remove(&raw_key),
                        };
                    }
                }
                other => return Err(Error::Internal(format!("unexpected key {other:?}"))),
            }
        }

        Ok(results
            .into_iter()
            .map(|(key, value)| ScanResult { key, value })
            .collect())
    }

    fn write_inner(&self, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        let mut engine = self.engine.lock()?;

        // Any version newer than the oldest transaction we can't see is a conflict
        let from = MvccKey::Version(
            key.clone(),
            self.snapshot
                .active_versions
                .iter()
                .min()
                .copied()
                .unwrap_or(self.snapshot.version + 1),
        )
        .encode()?;
        let to = MvccKey::Version(key.clone(), u64::MAX).encode()?;

        if let Some((k, _)) = engine.scan(from..=to).last().transpose()? {
            match MvccKey::decode(&k)? {
                MvccKey::Version(_, version) => {
                    if !self.snapshot.is_visible(version) {
                        return Err(Error::WriteConflict);
                    }
                }
                other => return Err(Error::Internal(format!("unexpected key {other:?}"))),
            }
        }

        engine.set(
            MvccKey::TxnWrite(self.snapshot.version, key.clone()).encode()?,
            vec![],
        )?;
        engine.set(
            MvccKey::Version(key, self.snapshot.version).encode()?,
            bincode::serialize(&value)?,
        )?;
        Ok(())
    }

    fn scan_active(engine: &mut MutexGuard<E>) -> Result<HashSet<Version>> {
        let mut active_versions = HashSet::new();
        let mut iter = engine.scan_prefix(MvccKeyPrefix::TxnActive.encode()?);

        while let Some((key, _)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::TxnActive(version) => {
                    active_versions.insert(version);
                }
                other => return Err(Error::Internal(format!("unexpected key {other:?}"))),
            }
        }
        Ok(active_versions)
    }
}

#[derive(Debug, PartialEq)]
pub struct ScanResult {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use crate::{
        error::{Error, Result},
        storage::{engine::Engine, memory::MemoryEngine},
    };

    use super::{Mvcc, MvccKey, ScanResult};

    fn seeded() -> Result<Mvcc<MemoryEngine>> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"customer1".to_vec(), b"John Doe".to_vec())?;
        tx.set(b"customer2".to_vec(), b"Mary Smith".to_vec())?;
        tx.set(b"customer3".to_vec(), b"Adewale Ogun".to_vec())?;
        tx.set(b"order1".to_vec(), b"250.00".to_vec())?;
        tx.commit()?;
        Ok(mvcc)
    }

    fn keys(results: Vec<ScanResult>) -> Vec<Vec<u8>> {
        results.into_iter().map(|r| r.key).collect()
    }

    #[test]
    fn test_get_latest_write() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"key1".to_vec(), b"val1".to_vec())?;
        tx.set(b"key2".to_vec(), b"val2".to_vec())?;
        tx.set(b"key2".to_vec(), b"val3".to_vec())?;
        tx.set(b"key3".to_vec(), b"val4".to_vec())?;
        tx.delete(b"key3".to_vec())?;
        assert_eq!(tx.get(b"key2".to_vec())?, Some(b"val3".to_vec()));
        tx.commit()?;

        let tx1 = mvcc.begin()?;
        assert_eq!(tx1.get(b"key1".to_vec())?, Some(b"val1".to_vec()));
        assert_eq!(tx1.get(b"key2".to_vec())?, Some(b"val3".to_vec()));
        assert_eq!(tx1.get(b"key3".to_vec())?, None);
        Ok(())
    }

    #[test]
    fn test_snapshot_ignores_concurrent_writes() -> Result<()> {
        let mvcc = seeded()?;

        let reader = mvcc.begin()?;
        let writer = mvcc.begin()?;
        writer.set(b"customer1".to_vec(), b"changed".to_vec())?;
        writer.delete(b"customer2".to_vec())?;
        writer.set(b"customer4".to_vec(), b"new".to_vec())?;

        assert_eq!(reader.get(b"customer1".to_vec())?, Some(b"John Doe".to_vec()));
        writer.commit()?;
        assert_eq!(reader.get(b"customer1".to_vec())?, Some(b"John Doe".to_vec()));
        assert_eq!(
            keys(reader.scan_prefix(b"customer".to_vec())?),
            vec![
                b"customer1".to_vec(),
                b"customer2".to_vec(),
                b"customer3".to_vec()
            ]
        );

        let after = mvcc.begin()?;
        assert_eq!(
            keys(after.scan_prefix(b"customer".to_vec())?),
            vec![
                b"customer1".to_vec(),
                b"customer3".to_vec(),
                b"customer4".to_vec()
            ]
        );
        Ok(())
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() -> Result<()> {
        let mvcc = seeded()?;
        let tx = mvcc.begin()?;
        assert_eq!(
            tx.scan_prefix(b"order".to_vec())?,
            vec![ScanResult {
                key: b"order1".to_vec(),
                value: b"250.00".to_vec()
            }]
        );
        assert_eq!(tx.scan_prefix(b"customer3".to_vec())?.len(), 1);
        assert!(tx.scan_prefix(b"product".to_vec())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_write_conflict() -> Result<()> {
        let mvcc = seeded()?;

        let tx1 = mvcc.begin()?;
        let tx2 = mvcc.begin()?;
        tx1.set(b"customer1".to_vec(), b"v1".to_vec())?;
        tx1.set(b"customer1".to_vec(), b"v2".to_vec())?;
        assert_eq!(
            tx2.set(b"customer1".to_vec(), b"v3".to_vec()),
            Err(Error::WriteConflict)
        );
        assert_eq!(tx2.delete(b"customer1".to_vec()), Err(Error::WriteConflict));

        // committed after tx1 began, still invisible to it
        let tx3 = mvcc.begin()?;
        tx3.set(b"customer9".to_vec(), b"late".to_vec())?;
        tx3.commit()?;
        assert_eq!(
            tx1.set(b"customer9".to_vec(), b"clash".to_vec()),
            Err(Error::WriteConflict)
        );
        tx1.commit()?;
        Ok(())
    }

    #[test]
    fn test_rollback_restores_state() -> Result<()> {
        let mvcc = seeded()?;

        let tx = mvcc.begin()?;
        tx.delete(b"customer1".to_vec())?;
        tx.set(b"customer2".to_vec(), b"changed".to_vec())?;
        tx.set(b"order2".to_vec(), b"new".to_vec())?;
        tx.rollback()?;

        let check = mvcc.begin()?;
        assert_eq!(check.get(b"customer1".to_vec())?, Some(b"John Doe".to_vec()));
        assert_eq!(check.get(b"customer2".to_vec())?, Some(b"Mary Smith".to_vec()));
        assert_eq!(check.get(b"order2".to_vec())?, None);

        // a rolled back writer no longer blocks anyone
        check.set(b"customer2".to_vec(), b"again".to_vec())?;
        check.commit()?;
        Ok(())
    }

    #[test]
    fn test_finished_transactions_leave_only_versions() -> Result<()> {
        let mvcc = seeded()?;

        let tx = mvcc.begin()?;
        tx.set(b"customer1".to_vec(), b"rolled back".to_vec())?;
        tx.rollback()?;
        let tx = mvcc.begin()?;
        tx.set(b"order2".to_vec(), b"120.50".to_vec())?;
        tx.commit()?;

        let mut engine = mvcc.engine.lock()?;
        let mut versions = 0;
        let mut iter = engine.scan_prefix(Vec::new());
        while let Some((key, _)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::NextVersion => {}
                MvccKey::Version(..) => versions += 1,
                other => panic!("leftover {:?}", other),
            }
        }
        // four seeded rows plus order2
        assert_eq!(versions, 5);
        Ok(())
    }
}
