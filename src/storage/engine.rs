use std::ops::{Bound, RangeBounds};

use crate::error::Result;

/// Byte-level key/value store underneath the MVCC layer
///
/// Not to be confused with `sql::engine::Engine`, which works on tables.
pub trait Engine {
    type EngineIterator<'a>: EngineIterator
    where
        Self: 'a;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
    fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>>;
    fn delete(&mut self, key: Vec<u8>) -> Result<()>;
    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_>;

    /// Prefix scan as a range scan: "apple" becomes ["apple", "applf").
    ///
    /// Trailing 0xff bytes cannot be incremented, so they are dropped first;
    /// a prefix made only of 0xff bytes has no upper bound.
    fn scan_prefix(&mut self, prefix: Vec<u8>) -> Self::EngineIterator<'_> {
        let start = Bound::Included(prefix.clone());
        let mut upper = prefix;
        while upper.last() == Some(&0xff) {
            upper.pop();
        }
        let end = match upper.last_mut() {
            Some(last) => {
                *last += 1;
                Bound::Excluded(upper)
            }
            None => Bound::Unbounded,
        };
        self.scan((start, end))
    }
}

/// Storage iterator, walkable from both ends
pub trait EngineIterator: DoubleEndedIterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::{error::Result, storage::memory::MemoryEngine};
    use std::ops::Bound;

    fn test_point_opt(mut eng: impl Engine) -> Result<()> {
        assert_eq!(eng.get(b"customers/1".to_vec())?, None);

        eng.set(b"customers/1".to_vec(), b"John Doe".to_vec())?;
        assert_eq!(eng.get(b"customers/1".to_vec())?, Some(b"John Doe".to_vec()));

        eng.set(b"customers/1".to_vec(), b"Adewale Ogun".to_vec())?;
        assert_eq!(eng.get(b"customers/1".to_vec())?, Some(b"Adewale Ogun".to_vec()));

        eng.delete(b"customers/1".to_vec())?;
        assert_eq!(eng.get(b"customers/1".to_vec())?, None);

        eng.set(b"".to_vec(), vec![])?;
        assert_eq!(eng.get(b"".to_vec())?, Some(vec![]));
        Ok(())
    }

    fn test_scan(mut eng: impl Engine) -> Result<()> {
        eng.set(b"orders/3".to_vec(), b"3".to_vec())?;
        eng.set(b"customers/2".to_vec(), b"2".to_vec())?;
        eng.set(b"orders/1".to_vec(), b"1".to_vec())?;
        eng.set(b"customers/1".to_vec(), b"1".to_vec())?;

        let start = Bound::Included(b"customers".to_vec());
        let end = Bound::Excluded(b"orders".to_vec());
        let keys = eng
            .scan((start, end))
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![b"customers/1".to_vec(), b"customers/2".to_vec()]);

        let mut iter = eng.scan(..);
        let (last, _) = iter.next_back().transpose()?.expect("empty scan");
        assert_eq!(last, b"orders/3".to_vec());
        Ok(())
    }

    fn test_scan_prefix(mut eng: impl Engine) -> Result<()> {
        eng.set(b"orders/1".to_vec(), b"a".to_vec())?;
        eng.set(b"ordersx".to_vec(), b"b".to_vec())?;
        eng.set(b"order".to_vec(), b"c".to_vec())?;
        eng.set(vec![7, 0xff, 0xff], b"d".to_vec())?;
        eng.set(vec![8], b"e".to_vec())?;

        let keys = eng
            .scan_prefix(b"orders".to_vec())
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![b"orders/1".to_vec(), b"ordersx".to_vec()]);

        let keys = eng
            .scan_prefix(vec![7, 0xff])
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![vec![7, 0xff, 0xff]]);
        Ok(())
    }

    #[test]
    fn test_memory() -> Result<()> {
        test_point_opt(MemoryEngine::new())?;
        test_scan(MemoryEngine::new())?;
        test_scan_prefix(MemoryEngine::new())?;
        Ok(())
    }
}
