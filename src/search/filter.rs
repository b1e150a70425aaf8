//! Non-scoring document filters.
//!
//! A [`Filter`] resolves to a [`DocSet`] of live documents for one reader.
//! Owner filters are the same for every query of an owner, so their doc
//! sets are cached per reader generation and owner value.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::NaiveDate;
use lru::LruCache;
use parking_lot::Mutex;

use crate::index::record::{
    ALL_OWNER, INDEX_DATE_FIELD, INDEX_DATE_FORMAT, LATITUDE_FIELD, LONGITUDE_FIELD, OWNER_FIELD,
};
use crate::index::{DocNumber, IndexReader};

/// Mean earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Owner filters kept per executor.
const OWNER_FILTER_CACHE_SIZE: usize = 64;

/// Set of document numbers of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSet {
    bits: Vec<bool>,
    len: usize,
}

impl DocSet {
    /// Empty set sized for `max_doc` documents.
    pub fn empty(max_doc: DocNumber) -> Self {
        DocSet {
            bits: vec![false; max_doc as usize],
            len: 0,
        }
    }

    /// Every live document of the reader.
    pub fn live(reader: &IndexReader) -> Self {
        let mut set = DocSet::empty(reader.max_doc());
        for doc in reader.live_docs() {
            set.insert(doc);
        }
        set
    }

    /// Add a document.
    pub fn insert(&mut self, doc: DocNumber) {
        if let Some(bit) = self.bits.get_mut(doc as usize)
            && !*bit
        {
            *bit = true;
            self.len += 1;
        }
    }

    /// Remove a document.
    pub fn remove(&mut self, doc: DocNumber) {
        if let Some(bit) = self.bits.get_mut(doc as usize)
            && *bit
        {
            *bit = false;
            self.len -= 1;
        }
    }

    /// Whether the document is in the set.
    pub fn contains(&self, doc: DocNumber) -> bool {
        self.bits.get(doc as usize).copied().unwrap_or(false)
    }

    /// Number of documents in the set.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keep only documents also in `other`.
    pub fn intersect_with(&mut self, other: &DocSet) {
        for (doc, bit) in self.bits.iter_mut().enumerate() {
            if *bit && !other.contains(doc as DocNumber) {
                *bit = false;
                self.len -= 1;
            }
        }
    }

    /// Documents in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = DocNumber> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .map(|(doc, _)| doc as DocNumber)
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Constraint on which documents may be returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Documents of `owner` or of the shared owner.
    Owner(String),
    /// Documents whose index date lies within the days, both inclusive.
    IndexDateRange {
        /// First day.
        from: NaiveDate,
        /// Last day.
        to: NaiveDate,
    },
    /// Documents within `radius_km` of a point.
    GeoRadius {
        /// Centre latitude in degrees.
        latitude: f64,
        /// Centre longitude in degrees.
        longitude: f64,
        /// Radius in kilometres.
        radius_km: f64,
    },
    /// Documents containing every term in the field.
    AllTerms {
        /// Index field.
        field: String,
        /// Required terms.
        terms: Vec<String>,
    },
    /// Every document except one.
    Exclude(DocNumber),
    /// Documents passing every filter.
    And(Vec<Filter>),
}

impl Filter {
    /// Resolve the filter against a reader.
    pub fn doc_set(&self, reader: &IndexReader) -> DocSet {
        match self {
            Filter::Owner(owner) => owner_doc_set(reader, owner),
            Filter::IndexDateRange { from, to } => {
                let mut set = DocSet::empty(reader.max_doc());
                for day in reader.terms(INDEX_DATE_FIELD).filter(|day| {
                    NaiveDate::parse_from_str(day, INDEX_DATE_FORMAT)
                        .is_ok_and(|date| *from <= date && date <= *to)
                }) {
                    add_postings(reader, &mut set, INDEX_DATE_FIELD, day);
                }
                set
            }
            Filter::GeoRadius {
                latitude,
                longitude,
                radius_km,
            } => {
                let mut set = DocSet::empty(reader.max_doc());
                for doc in reader.live_docs() {
                    if let (Some(lat), Some(lng)) = (
                        reader.doc_value(doc, LATITUDE_FIELD),
                        reader.doc_value(doc, LONGITUDE_FIELD),
                    ) && haversine_km(*latitude, *longitude, lat, lng) <= *radius_km
                    {
                        set.insert(doc);
                    }
                }
                set
            }
            Filter::AllTerms { field, terms } => {
                let mut set = DocSet::live(reader);
                for term in terms {
                    let mut with_term = DocSet::empty(reader.max_doc());
                    add_postings(reader, &mut with_term, field, term);
                    set.intersect_with(&with_term);
                }
                set
            }
            Filter::Exclude(excluded) => {
                let mut set = DocSet::live(reader);
                set.remove(*excluded);
                set
            }
            Filter::And(filters) => {
                let mut set = DocSet::live(reader);
                for filter in filters {
                    set.intersect_with(&filter.doc_set(reader));
                }
                set
            }
        }
    }
}

fn add_postings(reader: &IndexReader, set: &mut DocSet, field: &str, term: &str) {
    for posting in reader.postings(field, term) {
        if !reader.is_deleted(posting.doc) {
            set.insert(posting.doc);
        }
    }
}

fn owner_doc_set(reader: &IndexReader, owner: &str) -> DocSet {
    if owner == ALL_OWNER {
        return DocSet::live(reader);
    }
    let mut set = DocSet::empty(reader.max_doc());
    add_postings(reader, &mut set, OWNER_FIELD, owner);
    add_postings(reader, &mut set, OWNER_FIELD, ALL_OWNER);
    set
}

/// Owner doc sets keyed by reader location, generation and owner.
#[derive(Debug)]
pub struct OwnerFilterCache {
    entries: Mutex<LruCache<(String, u64, String), Arc<DocSet>>>,
}

impl OwnerFilterCache {
    /// Cache of the default size.
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(OWNER_FILTER_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        OwnerFilterCache {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Doc set of the owner filter, computed once per snapshot.
    pub fn get(&self, reader: &IndexReader, owner: &str) -> Arc<DocSet> {
        let key = (reader.location().to_string(), reader.generation(), owner.to_string());
        if let Some(set) = self.entries.lock().get(&key) {
            return Arc::clone(set);
        }
        let set = Arc::new(owner_doc_set(reader, owner));
        self.entries.lock().put(key, Arc::clone(&set));
        set
    }

    /// Drop every cached set.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of cached sets.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OwnerFilterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::index::record::{DATABASE_FIELD, ID_FIELD, IndexRecord, IndexableField};
    use crate::index::{IndexWriter, RamDirectory};

    fn reader() -> IndexReader {
        let directory = RamDirectory::new("filters");
        let mut writer =
            IndexWriter::open(Arc::new(directory.clone()), Arc::new(StandardAnalyzer::new()))
                .unwrap();
        let rows = [
            ("1", "alice", "20240101", 48.8566, 2.3522),
            ("2", "bob", "20240115", 51.5074, -0.1278),
            ("3", ALL_OWNER, "20240201", 48.8049, 2.1204),
        ];
        for (id, owner, day, lat, lng) in rows {
            writer
                .add_record(
                    IndexRecord::new()
                        .with_field(IndexableField::keyword(DATABASE_FIELD, "places"))
                        .with_field(IndexableField::keyword(ID_FIELD, id))
                        .with_field(IndexableField::keyword(OWNER_FIELD, owner).unstored())
                        .with_field(IndexableField::keyword(INDEX_DATE_FIELD, day))
                        .with_field(IndexableField::numeric(LATITUDE_FIELD, lat).stored_only())
                        .with_field(IndexableField::numeric(LONGITUDE_FIELD, lng).stored_only())
                        .with_field(IndexableField::text("city", "la ville lumière")),
                )
                .unwrap();
        }
        writer.close().unwrap();
        IndexReader::open(&directory).unwrap()
    }

    fn ids(reader: &IndexReader, set: &DocSet) -> Vec<String> {
        set.iter()
            .filter_map(|doc| reader.stored_value(doc, ID_FIELD).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_owner_filter_includes_shared_documents() {
        let reader = reader();
        assert_eq!(ids(&reader, &Filter::Owner("alice".into()).doc_set(&reader)), ["1", "3"]);
        assert_eq!(ids(&reader, &Filter::Owner("carol".into()).doc_set(&reader)), ["3"]);
        assert_eq!(Filter::Owner(ALL_OWNER.into()).doc_set(&reader).len(), 3);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let reader = reader();
        let filter = Filter::IndexDateRange {
            from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        };
        assert_eq!(ids(&reader, &filter.doc_set(&reader)), ["1", "2"]);
    }

    #[test]
    fn test_date_range_with_open_bounds() {
        let reader = reader();
        let mid_january = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let from_only = Filter::IndexDateRange {
            from: mid_january,
            to: NaiveDate::MAX,
        };
        let to_only = Filter::IndexDateRange {
            from: NaiveDate::MIN,
            to: mid_january,
        };
        let unbounded = Filter::IndexDateRange {
            from: NaiveDate::MIN,
            to: NaiveDate::MAX,
        };
        assert_eq!(ids(&reader, &from_only.doc_set(&reader)), ["2", "3"]);
        assert_eq!(ids(&reader, &to_only.doc_set(&reader)), ["1", "2"]);
        assert_eq!(unbounded.doc_set(&reader).len(), 3);
    }

    #[test]
    fn test_geo_radius() {
        let reader = reader();
        let near_paris = Filter::GeoRadius {
            latitude: 48.8566,
            longitude: 2.3522,
            radius_km: 25.0,
        };
        assert_eq!(ids(&reader, &near_paris.doc_set(&reader)), ["1", "3"]);
        assert!((haversine_km(48.8566, 2.3522, 51.5074, -0.1278) - 343.5).abs() < 1.0);
    }

    #[test]
    fn test_combined_filters() {
        let reader = reader();
        let filter = Filter::And(vec![
            Filter::Owner("bob".into()),
            Filter::AllTerms {
                field: "city".into(),
                terms: vec!["ville".into(), "lumière".into()],
            },
            Filter::Exclude(2),
        ]);
        assert_eq!(ids(&reader, &filter.doc_set(&reader)), ["2"]);
    }

    #[test]
    fn test_owner_cache_reuses_sets() {
        let reader = reader();
        let cache = OwnerFilterCache::new();
        let first = cache.get(&reader, "alice");
        let second = cache.get(&reader, "alice");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }
}
