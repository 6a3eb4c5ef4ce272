//! Page directory: which frame holds which page.

use crate::storage::PageId;

use super::frame::FrameId;

/// Number of hash buckets. Independent of the pool size; the number of
/// resident pages is bounded by the frame count, so the table never rehashes.
pub const DIRECTORY_BUCKETS: usize = 43;

/// Chained hash index from page id to frame.
///
/// Buckets are chosen by `(2 * page_num + 3) mod DIRECTORY_BUCKETS`.
/// Collisions chain within the bucket; order inside a bucket carries no
/// meaning.
#[derive(Debug)]
pub struct PageDirectory {
    buckets: Vec<Vec<(PageId, FrameId)>>,
    len: usize,
}

impl PageDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); DIRECTORY_BUCKETS],
            len: 0,
        }
    }

    fn bucket_of(page_id: PageId) -> usize {
        let n = DIRECTORY_BUCKETS as u64;
        // Reduce first so the affine step cannot overflow.
        ((2 * (page_id.page_num() % n) + 3) % n) as usize
    }

    /// Maps `page_id` to `frame_id`, replacing any previous mapping.
    pub fn insert(&mut self, page_id: PageId, frame_id: FrameId) {
        let bucket = &mut self.buckets[Self::bucket_of(page_id)];
        match bucket.iter_mut().find(|(id, _)| *id == page_id) {
            Some(entry) => entry.1 = frame_id,
            None => {
                bucket.push((page_id, frame_id));
                self.len += 1;
            }
        }
    }

    /// Removes the mapping for `page_id`, returning the frame it pointed to.
    pub fn remove(&mut self, page_id: PageId) -> Option<FrameId> {
        let bucket = &mut self.buckets[Self::bucket_of(page_id)];
        let pos = bucket.iter().position(|(id, _)| *id == page_id)?;
        self.len -= 1;
        Some(bucket.swap_remove(pos).1)
    }

    /// Returns the frame holding `page_id`, if resident.
    pub fn lookup(&self, page_id: PageId) -> Option<FrameId> {
        self.buckets[Self::bucket_of(page_id)]
            .iter()
            .find(|(id, _)| *id == page_id)
            .map(|&(_, frame_id)| frame_id)
    }

    /// Returns the ids of every resident page.
    ///
    /// These are page identifiers, never frame indices: bulk flushing writes
    /// each frame back under the id returned here.
    pub fn all_resident_ids(&self) -> Vec<PageId> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter().map(|&(page_id, _)| page_id))
            .collect()
    }

    /// Returns the number of resident pages.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u64) -> PageId {
        PageId::new(n)
    }

    #[test]
    fn test_insert_lookup_remove() {
        let mut dir = PageDirectory::new();
        assert!(dir.is_empty());

        dir.insert(pid(10), FrameId::new(0));
        dir.insert(pid(11), FrameId::new(1));
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.lookup(pid(10)), Some(FrameId::new(0)));
        assert_eq!(dir.lookup(pid(11)), Some(FrameId::new(1)));
        assert_eq!(dir.lookup(pid(12)), None);

        assert_eq!(dir.remove(pid(10)), Some(FrameId::new(0)));
        assert_eq!(dir.remove(pid(10)), None);
        assert_eq!(dir.lookup(pid(10)), None);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_insert_replaces_existing_mapping() {
        let mut dir = PageDirectory::new();
        dir.insert(pid(4), FrameId::new(0));
        dir.insert(pid(4), FrameId::new(3));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.lookup(pid(4)), Some(FrameId::new(3)));
    }

    #[test]
    fn test_colliding_ids_chain() {
        let n = DIRECTORY_BUCKETS as u64;
        let ids = [pid(1), pid(1 + n), pid(1 + 2 * n)];
        assert_eq!(PageDirectory::bucket_of(ids[0]), PageDirectory::bucket_of(ids[2]));

        let mut dir = PageDirectory::new();
        for (i, &id) in ids.iter().enumerate() {
            dir.insert(id, FrameId::new(i));
        }
        for (i, &id) in ids.iter().enumerate() {
            assert_eq!(dir.lookup(id), Some(FrameId::new(i)));
        }

        dir.remove(ids[1]);
        assert_eq!(dir.lookup(ids[0]), Some(FrameId::new(0)));
        assert_eq!(dir.lookup(ids[1]), None);
        assert_eq!(dir.lookup(ids[2]), Some(FrameId::new(2)));
    }

    #[test]
    fn test_all_resident_ids_returns_page_ids() {
        let mut dir = PageDirectory::new();
        // Page ids deliberately disjoint from frame indices.
        dir.insert(pid(100), FrameId::new(0));
        dir.insert(pid(200), FrameId::new(1));
        dir.insert(pid(143), FrameId::new(2));

        let mut ids = dir.all_resident_ids();
        ids.sort();
        assert_eq!(ids, vec![pid(100), pid(143), pid(200)]);
    }

    #[test]
    fn test_huge_page_id_does_not_overflow() {
        let mut dir = PageDirectory::new();
        dir.insert(pid(u64::MAX), FrameId::new(0));
        assert_eq!(dir.lookup(pid(u64::MAX)), Some(FrameId::new(0)));
    }
}
