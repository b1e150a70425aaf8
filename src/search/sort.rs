//! Field sorting of search hits.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::index::IndexReader;
use crate::policy::{FieldType, QueryPolicy};
use crate::search::collector::ScoredHit;

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Index field holding the value.
    pub field: String,
    /// Direction.
    pub ascending: bool,
    /// How values compare.
    pub field_type: FieldType,
}

impl SortField {
    /// Create a sort key.
    pub fn new<S: Into<String>>(field: S, ascending: bool, field_type: FieldType) -> Self {
        SortField {
            field: field.into(),
            ascending,
            field_type,
        }
    }
}

/// Sort keys of a search: the requested field first, then the policy's
/// sorted fields by sort order.
pub fn sort_fields(
    requested: Option<(&str, bool)>,
    policy: &QueryPolicy,
) -> Vec<SortField> {
    let mut fields = Vec::new();
    if let Some((name, ascending)) = requested {
        let field_type = policy
            .field(name)
            .map(|f| f.field_type)
            .unwrap_or_default();
        fields.push(SortField::new(name, ascending, field_type));
    }
    for field in policy.sort_fields() {
        if !fields.iter().any(|f| f.field == field.name) {
            fields.push(SortField::new(
                field.name.as_str(),
                field.ascending_sort,
                field.field_type,
            ));
        }
    }
    fields
}

#[derive(Debug, PartialEq, PartialOrd)]
enum SortValue<'a> {
    Integer(i64),
    Double(f64),
    Text(&'a str),
}

fn sort_value<'a>(reader: &'a IndexReader, hit: &ScoredHit, field: &SortField) -> Option<SortValue<'a>> {
    let raw = reader.sort_value(hit.doc, &field.field)?;
    match field.field_type {
        FieldType::String => Some(SortValue::Text(raw)),
        FieldType::Integer => raw
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| raw.trim().parse::<f64>().ok().map(|v| v as i64))
            .map(SortValue::Integer),
        FieldType::Double => raw.trim().parse::<f64>().ok().map(SortValue::Double),
    }
}

/// Compare two hits by the sort keys, then by rank.
///
/// Hits missing a value sort after hits having one, in both directions.
pub fn compare_hits(reader: &IndexReader, fields: &[SortField], a: &ScoredHit, b: &ScoredHit) -> Ordering {
    for field in fields {
        let ordering = match (sort_value(reader, a, field), sort_value(reader, b, field)) {
            (Some(x), Some(y)) => {
                let natural = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                if field.ascending { natural } else { natural.reverse() }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.rank_cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::index::record::{IndexRecord, IndexableField};
    use crate::index::{IndexWriter, RamDirectory};
    use crate::policy::QueryField;
    use std::sync::Arc;

    fn reader() -> IndexReader {
        let directory = RamDirectory::new("sort");
        let mut writer =
            IndexWriter::open(Arc::new(directory.clone()), Arc::new(StandardAnalyzer::new()))
                .unwrap();
        for (name, price) in [("pear", Some("10")), ("apple", Some("9")), ("fig", None)] {
            let mut record = IndexRecord::new().with_field(IndexableField::keyword("name", name));
            if let Some(price) = price {
                record.add(IndexableField::keyword("price", price));
            }
            writer.add_record(record).unwrap();
        }
        writer.close().unwrap();
        IndexReader::open(&directory).unwrap()
    }

    fn sorted(reader: &IndexReader, fields: &[SortField]) -> Vec<u32> {
        let mut hits: Vec<ScoredHit> = (0..3).map(|doc| ScoredHit::new(doc, 1.0)).collect();
        hits.sort_by(|a, b| compare_hits(reader, fields, a, b));
        hits.iter().map(|h| h.doc).collect()
    }

    #[test]
    fn test_typed_comparison() {
        let reader = reader();
        let as_text = [SortField::new("price", true, FieldType::String)];
        let as_number = [SortField::new("price", true, FieldType::Integer)];
        // "10" < "9" as text; missing values last
        assert_eq!(sorted(&reader, &as_text), vec![0, 1, 2]);
        assert_eq!(sorted(&reader, &as_number), vec![1, 0, 2]);

        let descending = [SortField::new("price", false, FieldType::Double)];
        assert_eq!(sorted(&reader, &descending), vec![0, 1, 2]);
    }

    #[test]
    fn test_requested_field_comes_first() {
        let policy = QueryPolicy::new()
            .with_field(QueryField::new("name").sorted(2, true, FieldType::String))
            .with_field(QueryField::new("price").sorted(1, false, FieldType::Double));
        let fields = sort_fields(Some(("name", false)), &policy);

        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["name", "price"]);
        assert!(!fields[0].ascending);
        assert_eq!(fields[1].field_type, FieldType::Double);
    }
}
