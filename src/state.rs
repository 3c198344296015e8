use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{gene::Gene, record::RecordKey};

const SEEN_SHARDS: usize = 16;

type Shared<T> = Arc<Mutex<T>>;
type TranscriptMap = HashMap<String, Gene>;
type SubFeatureMap = HashMap<String, Vec<Gene>>;

/// Collections shared by the scan workers of one assembly call.
///
/// Outer maps are only write-locked to create or prune a per-gene entry;
/// the entries themselves are independently locked, so workers that touch
/// different genes never wait on each other. Everything is drained during
/// assembly and the state is dropped when the call returns.
pub struct HierarchyState {
    hasher: RandomState,
    seen: Vec<Mutex<HashSet<RecordKey>>>,
    genes: Mutex<Vec<Gene>>,
    transcripts_by_gene: RwLock<HashMap<String, Shared<TranscriptMap>>>,
    sub_features_by_transcript: RwLock<HashMap<String, Shared<SubFeatureMap>>>,
    unmapped: Mutex<Vec<Gene>>,
}

impl Default for HierarchyState {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self {
            hasher: RandomState::new(),
            seen: (0..SEEN_SHARDS)
                .map(|_| Mutex::new(HashSet::new()))
                .collect(),
            genes: Mutex::new(Vec::new()),
            transcripts_by_gene: RwLock::new(HashMap::new()),
            sub_features_by_transcript: RwLock::new(HashMap::new()),
            unmapped: Mutex::new(Vec::new()),
        }
    }

    /// Records `key` as seen. Returns false if another record with the same
    /// key was already inserted.
    pub fn mark_seen(&self, key: RecordKey) -> bool {
        let shard = self.hasher.hash_one(&key) as usize % SEEN_SHARDS;
        self.seen[shard].lock().insert(key)
    }

    /// Number of distinct records seen so far.
    pub fn seen_len(&self) -> usize {
        self.seen.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Files a top-level gene.
    pub fn push_gene(&self, gene: Gene) {
        self.genes.lock().push(gene);
    }

    /// Files a record that could not be attached to any parent.
    pub fn push_unmapped(&self, feature: Gene) {
        self.unmapped.lock().push(feature);
    }

    /// Stores `transcript` under `transcripts_by_gene[gene][id]`. The first
    /// transcript stored under an id wins.
    pub fn insert_transcript(&self, gene: &str, id: &str, transcript: Gene) {
        let slot = entry_or_insert(&self.transcripts_by_gene, gene);
        slot.lock()
            .entry(id.to_string())
            .or_insert(transcript);
    }

    /// Appends a sub-feature to `sub_features_by_transcript[gene][transcript]`.
    pub fn push_sub_feature(&self, gene: &str, transcript: &str, feature: Gene) {
        let slot = entry_or_insert(&self.sub_features_by_transcript, gene);
        slot.lock()
            .entry(transcript.to_string())
            .or_default()
            .push(feature);
    }

    /// Applies `update` to a stored transcript. Returns false if the
    /// transcript is not (or no longer) in the state.
    pub fn update_transcript<F>(&self, gene: &str, id: &str, update: F) -> bool
    where
        F: FnOnce(&mut Gene),
    {
        let slot = self.transcripts_by_gene.read().get(gene).cloned();
        let Some(slot) = slot else {
            return false;
        };
        let mut transcripts = slot.lock();
        match transcripts.get_mut(id) {
            Some(transcript) => {
                update(transcript);
                true
            }
            None => false,
        }
    }

    /// Removes and returns every top-level gene.
    pub fn take_genes(&self) -> Vec<Gene> {
        std::mem::take(&mut *self.genes.lock())
    }

    /// Removes and returns every unmapped record.
    pub fn take_unmapped(&self) -> Vec<Gene> {
        std::mem::take(&mut *self.unmapped.lock())
    }

    /// Removes the transcripts of `gene`, keyed by transcript id.
    ///
    /// The emptied per-gene entry is left in place; the outer map is only
    /// read-locked.
    pub fn take_transcripts(&self, gene: &str) -> TranscriptMap {
        let slot = self.transcripts_by_gene.read().get(gene).cloned();
        slot.map(|slot| std::mem::take(&mut *slot.lock()))
            .unwrap_or_default()
    }

    /// Removes the sub-features of one transcript slot, pruning the gene
    /// entry once it is empty.
    pub fn take_sub_features(&self, gene: &str, transcript: &str) -> Vec<Gene> {
        let slot = self.sub_features_by_transcript.read().get(gene).cloned();
        let Some(slot) = slot else {
            return Vec::new();
        };

        let (features, emptied) = {
            let mut inner = slot.lock();
            let features = inner.remove(transcript).unwrap_or_default();
            (features, inner.is_empty())
        };

        if emptied {
            let mut outer = self.sub_features_by_transcript.write();
            if outer.get(gene).is_some_and(|slot| slot.lock().is_empty()) {
                outer.remove(gene);
            }
        }
        features
    }

    /// Removes every transcript still in the state, with the key of the
    /// gene it was filed under, ordered by gene key then transcript id.
    pub fn drain_transcripts(&self) -> Vec<(String, String, Gene)> {
        let outer = std::mem::take(&mut *self.transcripts_by_gene.write());
        let mut drained: Vec<_> = outer
            .into_iter()
            .flat_map(|(gene, slot)| {
                let transcripts = std::mem::take(&mut *slot.lock());
                transcripts
                    .into_iter()
                    .map(move |(id, transcript)| (gene.clone(), id, transcript))
            })
            .collect();
        drained.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        drained
    }

    /// Removes every sub-feature still in the state.
    pub fn drain_sub_features(&self) -> Vec<Gene> {
        let outer = std::mem::take(&mut *self.sub_features_by_transcript.write());
        let mut slots: Vec<_> = outer.into_iter().collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
            .into_iter()
            .flat_map(|(_, slot)| {
                let mut inner: Vec<_> = std::mem::take(&mut *slot.lock()).into_iter().collect();
                inner.sort_by(|a, b| a.0.cmp(&b.0));
                inner.into_iter().flat_map(|(_, features)| features)
            })
            .collect()
    }

    /// Returns true once genes, transcripts, sub-features and unmapped
    /// records have all been taken out.
    pub fn is_drained(&self) -> bool {
        self.genes.lock().is_empty()
            && self.unmapped.lock().is_empty()
            && self
                .transcripts_by_gene
                .read()
                .values()
                .all(|slot| slot.lock().is_empty())
            && self
                .sub_features_by_transcript
                .read()
                .values()
                .all(|slot| slot.lock().is_empty())
    }
}

/// Returns the per-key slot of `map`, creating it if absent.
fn entry_or_insert<T: Default>(
    map: &RwLock<HashMap<String, Shared<T>>>,
    key: &str,
) -> Shared<T> {
    if let Some(slot) = map.read().get(key) {
        return Arc::clone(slot);
    }
    Arc::clone(map.write().entry(key.to_string()).or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{linkage::Linkage, record::FeatureRecord};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn record(line: &str) -> FeatureRecord {
        FeatureRecord::parse(line, 1, Linkage::ById).unwrap()
    }

    #[test]
    fn dedupes_structurally_equal_records() {
        let state = HierarchyState::new();
        let a = record("c\ts\texon\t1\t9\t.\t+\t.\tID=e;Parent=t");
        assert!(state.mark_seen(a.key()));
        assert!(!state.mark_seen(a.clone().key()));
        assert_eq!(state.seen_len(), 1);
    }

    #[test]
    fn concurrent_dedupe_admits_once() {
        let state = HierarchyState::new();
        let key = record("c\ts\tgene\t1\t9\t.\t+\t.\tID=g").key();
        let admitted: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| state.mark_seen(key.clone()) as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(admitted, 1);
    }

    #[test]
    fn take_sub_features_prunes_empty_entries() {
        let state = HierarchyState::new();
        let exon = Gene::from_record(record("c\ts\texon\t1\t9\t.\t+\t.\tParent=t1"));
        state.push_sub_feature("t1", "t1", exon.clone());
        state.push_sub_feature("t1", "t1", exon);

        assert_eq!(state.take_sub_features("t1", "t1").len(), 2);
        assert!(state.take_sub_features("t1", "t1").is_empty());
        assert!(state.is_drained());
    }

    #[test]
    fn partial_take_only_reads_outer_map() {
        let state = Arc::new(HierarchyState::new());
        let exon = Gene::from_record(record("c\ts\texon\t1\t9\t.\t+\t.\tParent=t1"));
        state.push_sub_feature("g1", "t1", exon.clone());
        state.push_sub_feature("g1", "t2", exon);

        // a reader holds the outer map while another gene's slot is taken
        let guard = state.sub_features_by_transcript.read();
        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(&state);
        let handle = thread::spawn(move || {
            tx.send(worker.take_sub_features("g1", "t1").len()).ok();
        });
        let taken = rx.recv_timeout(Duration::from_secs(5)).ok();
        drop(guard);
        handle.join().unwrap();
        assert_eq!(taken, Some(1));

        assert_eq!(state.take_sub_features("g1", "t2").len(), 1);
        assert!(state.sub_features_by_transcript.read().is_empty());
        assert!(state.is_drained());
    }

    #[test]
    fn transcripts_drain_once() {
        let state = HierarchyState::new();
        let t = Gene::from_record(record("c\ts\tmRNA\t1\t9\t.\t+\t.\tID=t1;Parent=g1"));
        state.insert_transcript("g1", "t1", t);

        assert!(state.update_transcript("g1", "t1", |t| t.set_exon_stats(2, 9)));
        let taken = state.take_transcripts("g1");
        assert_eq!(taken["t1"].exons_count, Some(2));
        assert_eq!(taken["t1"].aminoacid_length, Some(3));
        assert!(state.take_transcripts("g1").is_empty());
        assert!(!state.update_transcript("g1", "t1", |_| {}));
        assert!(state.drain_transcripts().is_empty());
        assert!(state.is_drained());
    }
}
