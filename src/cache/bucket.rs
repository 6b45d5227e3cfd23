//! Deterministic document bucketing.
//!
//! A document lives in the bucket named by the trailing 3-byte counter of its
//! identifier divided by [`BUCKET_CAPACITY`]. With a 24-bit counter that bounds
//! the number of document hashes in the key-value store to 2^15 regardless of
//! collection size.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::domain::{Document, DocumentId, DomainError};

use super::codec::{self, CodecError};

pub const BUCKET_CAPACITY: u32 = 512;

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("document at position {position} has no usable `_id`")]
    MissingId { position: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Decimal name of a bucket, used verbatim as a hash key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketName(String);

impl BucketName {
    fn from_index(index: u32) -> Self {
        Self(index.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn bucket_of(id: &DocumentId) -> BucketName {
    BucketName::from_index(id.counter() / BUCKET_CAPACITY)
}

/// Bucket of an identifier given in its 24-character hexadecimal form.
pub fn bucket_of_str(id: &str) -> Result<BucketName, DomainError> {
    DocumentId::parse_str(id).map(|id| bucket_of(&id))
}

/// Accumulates the documents assigned to one bucket.
#[derive(Debug, Clone)]
pub struct Bucket {
    name: BucketName,
    entries: Vec<(DocumentId, Document)>,
}

impl Bucket {
    pub fn new(name: BucketName) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &BucketName {
        &self.name
    }

    pub fn add(&mut self, id: DocumentId, document: Document) {
        self.entries.push((id, document));
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (DocumentId, Document)>) {
        self.entries.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(DocumentId, Document)] {
        &self.entries
    }

    /// Hash fields for this bucket: identifier to encoded body.
    pub fn encode(&self) -> Result<Vec<(String, String)>, CodecError> {
        self.entries
            .iter()
            .map(|(id, document)| Ok((id.to_hex(), codec::encode_body(document)?)))
            .collect()
    }
}

/// Result of spreading a result set across buckets.
#[derive(Debug, Default)]
pub struct BucketAssignment {
    pub buckets: BTreeMap<BucketName, Bucket>,
    /// Identifiers in the order the documents were supplied.
    pub ids: Vec<DocumentId>,
}

impl BucketAssignment {
    /// Assign each document to its bucket, keeping the supplied order in `ids`.
    pub fn assign(documents: &[Document]) -> Result<Self, BucketError> {
        let mut assignment = Self::default();
        for (position, document) in documents.iter().enumerate() {
            let id = document.id().ok_or(BucketError::MissingId { position })?;
            assignment.ids.push(id);
            assignment
                .buckets
                .entry(bucket_of(&id))
                .or_insert_with_key(|name| Bucket::new(name.clone()))
                .add(id, document.clone());
        }
        Ok(assignment)
    }
}

/// Group identifiers by bucket for the read path, preserving order inside
/// each group.
pub fn partition(ids: &[DocumentId]) -> BTreeMap<BucketName, Vec<DocumentId>> {
    let mut groups: BTreeMap<BucketName, Vec<DocumentId>> = BTreeMap::new();
    for id in ids {
        groups.entry(bucket_of(id)).or_default().push(*id);
    }
    groups
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id_with_counter(counter: u32) -> DocumentId {
        DocumentId::from_parts(0x5f00_0000, counter)
    }

    fn document_with_counter(counter: u32) -> Document {
        Document::from_json(json!({
            "_id": id_with_counter(counter).to_hex(),
            "n": counter,
        }))
        .expect("valid document")
    }

    #[test]
    fn known_identifiers_hash_to_known_buckets() {
        let first = DocumentId::parse_str("776f7775666f756e646d6521").expect("valid id");
        assert_eq!(bucket_of(&first).as_str(), "14002");

        let second = DocumentId::parse_str("74616b756d69746f66755844").expect("valid id");
        assert_eq!(bucket_of(&second).as_str(), "15020");
    }

    #[test]
    fn malformed_identifiers_are_rejected() {
        assert!(bucket_of_str("6d6521").is_err());
        assert!(bucket_of_str("776f7775666f756e646d652g").is_err());
        assert_eq!(
            bucket_of_str("776f7775666f756e646d6521").expect("valid id").as_str(),
            "14002"
        );
    }

    #[test]
    fn counters_fill_buckets_of_512() {
        assert_eq!(bucket_of(&id_with_counter(0)).as_str(), "0");
        assert_eq!(bucket_of(&id_with_counter(511)).as_str(), "0");
        assert_eq!(bucket_of(&id_with_counter(512)).as_str(), "1");
        assert_eq!(bucket_of(&id_with_counter(1023)).as_str(), "1");
        assert_eq!(bucket_of(&id_with_counter(0x00ff_ffff)).as_str(), "32767");
    }

    #[test]
    fn bucketing_is_stable() {
        let id = id_with_counter(9000);
        assert_eq!(bucket_of(&id), bucket_of(&id));
    }

    #[test]
    fn assign_groups_documents_and_keeps_order() {
        let documents: Vec<Document> = [3, 700, 4, 1500]
            .into_iter()
            .map(document_with_counter)
            .collect();

        let assignment = BucketAssignment::assign(&documents).expect("assignable");

        let counters: Vec<u32> = assignment.ids.iter().map(DocumentId::counter).collect();
        assert_eq!(counters, vec![3, 700, 4, 1500]);

        let sizes: Vec<(&str, usize)> = assignment
            .buckets
            .values()
            .map(|bucket| (bucket.name().as_str(), bucket.len()))
            .collect();
        assert_eq!(sizes, vec![("0", 2), ("1", 1), ("2", 1)]);
    }

    #[test]
    fn adding_to_a_bucket_appends() {
        let mut bucket = Bucket::new(bucket_of(&id_with_counter(1)));
        bucket.add(id_with_counter(1), document_with_counter(1));
        bucket.extend([
            (id_with_counter(2), document_with_counter(2)),
            (id_with_counter(3), document_with_counter(3)),
        ]);

        assert_eq!(bucket.len(), 3);
        assert_eq!(bucket.entries()[0].0, id_with_counter(1));
        assert_eq!(bucket.encode().expect("encodable").len(), 3);
    }

    #[test]
    fn documents_without_identifier_are_rejected() {
        let documents = vec![
            document_with_counter(1),
            Document::from_json(json!({ "name": "anonymous" })).expect("valid document"),
        ];

        let err = BucketAssignment::assign(&documents).expect_err("missing id");
        assert!(matches!(err, BucketError::MissingId { position: 1 }));
    }

    #[test]
    fn partition_groups_ids_by_bucket() {
        let ids: Vec<DocumentId> = [10, 600, 11, 601].into_iter().map(id_with_counter).collect();
        let groups = partition(&ids);

        assert_eq!(groups.len(), 2);
        let first: Vec<u32> = groups[&bucket_of(&ids[0])]
            .iter()
            .map(DocumentId::counter)
            .collect();
        assert_eq!(first, vec![10, 11]);
    }
}
