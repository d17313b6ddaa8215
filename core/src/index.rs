use crate::digest::{Digest, DigestAlgorithm};
use crate::manifest::SnapshotRecord;
use crate::{Error, Result};
use std::collections::BTreeSet;

/// Ordered set of digests already present in file storage.
///
/// All digests belong to one algorithm and share its length; inserting a
/// value of any other length is an invariant violation. Enumeration yields
/// digests in ascending unsigned byte order.
#[derive(Debug, Clone)]
pub struct DedupIndex {
    algorithm: DigestAlgorithm,
    digests: BTreeSet<Vec<u8>>,
}

impl DedupIndex {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            digests: BTreeSet::new(),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn digest_len(&self) -> usize {
        self.algorithm.digest_len()
    }

    /// Inserts `digest`. Returns `true` if it was not present before.
    pub fn add(&mut self, digest: &[u8]) -> Result<bool> {
        if digest.len() != self.digest_len() {
            return Err(Error::InvalidDigestLength {
                expected: self.digest_len(),
                actual: digest.len(),
            });
        }
        Ok(self.digests.insert(digest.to_vec()))
    }

    pub fn add_digest(&mut self, digest: &Digest) -> Result<bool> {
        self.add(digest.as_bytes())
    }

    pub fn contains(&self, digest: &[u8]) -> bool {
        self.digests.contains(digest)
    }

    pub fn all(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.digests.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Adds the digest of every record, returning how many were new.
    pub fn extend_from_records<'a, I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a SnapshotRecord>,
    {
        let mut added = 0;
        for record in records {
            let bytes = record.digest_bytes()?;
            if self.add(&bytes)? {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn merge(&mut self, other: DedupIndex) -> Result<()> {
        if other.algorithm != self.algorithm {
            return Err(Error::Other(format!(
                "cannot merge a {} index into a {} index",
                other.algorithm, self.algorithm
            )));
        }
        self.digests.extend(other.digests);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_contains() {
        let mut index = DedupIndex::new(DigestAlgorithm::Sha1);
        let digest = [7u8; 20];

        assert!(!index.contains(&digest));
        assert!(index.add(&digest).unwrap());
        assert!(index.contains(&digest));
        assert!(!index.add(&digest).unwrap());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let mut index = DedupIndex::new(DigestAlgorithm::Sha256);
        let result = index.add(&[1, 2, 3]);
        assert!(matches!(
            result,
            Err(Error::InvalidDigestLength { expected: 32, actual: 3 })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_enumeration_is_unsigned_lexicographic() {
        let mut index = DedupIndex::new(DigestAlgorithm::Sha1);
        let mut high = [0u8; 20];
        high[0] = 0xff;
        let mut low = [0u8; 20];
        low[0] = 0x01;
        let mut mid = [0u8; 20];
        mid[0] = 0x01;
        mid[19] = 0x80;

        index.add(&high).unwrap();
        index.add(&mid).unwrap();
        index.add(&low).unwrap();

        let all: Vec<&[u8]> = index.all().collect();
        assert_eq!(all, vec![&low[..], &mid[..], &high[..]]);
    }

    #[test]
    fn test_merge_requires_same_algorithm() {
        let mut a = DedupIndex::new(DigestAlgorithm::Sha256);
        let mut b = DedupIndex::new(DigestAlgorithm::Sha256);
        b.add(&[9u8; 32]).unwrap();
        a.merge(b).unwrap();
        assert!(a.contains(&[9u8; 32]));

        let c = DedupIndex::new(DigestAlgorithm::Sha1);
        assert!(a.merge(c).is_err());
    }
}
