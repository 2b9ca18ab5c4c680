//! A single open index: tantivy index, writer and reader plus the mapping
//! it was built from.

use crate::schema::{
    self, FieldKind, IndexMapping, GEO_LAT_SUFFIX, GEO_LON_SUFFIX, ID_FIELD, SOURCE_FIELD,
    TYPE_FIELD,
};
use crate::{BulkItemFailure, Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tantivy::schema::{Field, Schema};
use tantivy::tokenizer::{LowerCaser, RawTokenizer, TextAnalyzer, TokenizerManager};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// One operation in a bulk batch.
#[derive(Debug, Clone)]
pub enum BulkOp {
    Index {
        id: String,
        doc_type: String,
        source: serde_json::Value,
    },
    Delete {
        id: String,
    },
}

impl BulkOp {
    pub fn id(&self) -> &str {
        match self {
            BulkOp::Index { id, .. } | BulkOp::Delete { id } => id,
        }
    }

    pub fn source(&self) -> Option<&serde_json::Value> {
        match self {
            BulkOp::Index { source, .. } => Some(source),
            BulkOp::Delete { .. } => None,
        }
    }
}

pub struct OpenIndex {
    pub name: String,
    pub index: Index,
    pub schema: Schema,
    pub fields: BTreeMap<String, Field>,
    pub mapping: IndexMapping,
    pub reader: IndexReader,
    writer: parking_lot::Mutex<IndexWriter>,
}

impl OpenIndex {
    /// Creates the on-disk index for `mapping` under `dir`.
    pub fn create(name: &str, dir: &Path, mapping: IndexMapping) -> Result<Self> {
        let (tantivy_schema, fields) = schema::build_schema(&mapping)?;
        std::fs::create_dir_all(dir)?;
        let mut index = Index::create_in_dir(dir, tantivy_schema.clone())
            .map_err(|e| Error::Setup(format!("creating index '{name}': {e}")))?;
        // The "lowercase" fast-field normalizer referenced by text mappings.
        let ff_tokenizers = TokenizerManager::default();
        ff_tokenizers.register(
            "lowercase",
            TextAnalyzer::builder(RawTokenizer::default())
                .filter(LowerCaser)
                .build(),
        );
        index.set_fast_field_tokenizers(ff_tokenizers);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let writer = parking_lot::Mutex::new(index.writer(WRITER_HEAP_BYTES)?);
        Ok(OpenIndex {
            name: name.to_string(),
            index,
            schema: tantivy_schema,
            fields,
            mapping,
            reader,
            writer,
        })
    }

    pub fn field(&self, name: &str) -> Option<Field> {
        self.fields.get(name).copied()
    }

    /// Applies a bulk batch. Every operation is converted first; if any
    /// conversion fails the whole batch is rejected with
    /// [`Error::BulkPartialFailure`] and nothing is written.
    pub fn apply_bulk(&self, ops: &[BulkOp]) -> Result<()> {
        let mut docs = Vec::with_capacity(ops.len());
        let mut failures = Vec::new();
        for (position, op) in ops.iter().enumerate() {
            match op {
                BulkOp::Index {
                    id,
                    doc_type,
                    source,
                } => match self.convert(id, doc_type, source) {
                    Ok(doc) => docs.push((Some(id.clone()), Some(doc))),
                    Err(reason) => failures.push(BulkItemFailure {
                        position,
                        id: id.clone(),
                        reason,
                    }),
                },
                BulkOp::Delete { id } => docs.push((Some(id.clone()), None)),
            }
        }
        if !failures.is_empty() {
            return Err(Error::BulkPartialFailure(failures));
        }

        let id_field = self.fields[ID_FIELD];
        let mut writer = self.writer.lock();
        for (id, doc) in docs {
            match doc {
                Some(doc) => {
                    // Re-indexing the same id replaces the previous version.
                    if let Some(id) = &id {
                        writer.delete_term(Term::from_field_text(id_field, id));
                    }
                    writer.add_document(doc)?;
                }
                None => {
                    if let Some(id) = &id {
                        writer.delete_term(Term::from_field_text(id_field, id));
                    }
                }
            }
        }
        writer.commit()?;
        Ok(())
    }

    /// Commits pending writes and reloads the reader so that everything
    /// indexed before this call is visible to the next search.
    pub fn refresh(&self) -> Result<()> {
        self.writer.lock().commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Converts a JSON source into a tantivy document, storing the exact
    /// source payload alongside the mapped fields. Returns a human-readable
    /// reason on the first field that does not fit its mapped kind.
    fn convert(
        &self,
        id: &str,
        doc_type: &str,
        source: &serde_json::Value,
    ) -> std::result::Result<TantivyDocument, String> {
        let object = source
            .as_object()
            .ok_or_else(|| "source is not a JSON object".to_string())?;

        let mut doc = TantivyDocument::new();
        doc.add_text(self.fields[ID_FIELD], id);
        doc.add_text(self.fields[TYPE_FIELD], doc_type);
        doc.add_text(
            self.fields[SOURCE_FIELD],
            serde_json::to_string(source).map_err(|e| e.to_string())?,
        );

        for (name, value) in object {
            let Some(kind) = self.mapping.kind_of(name) else {
                // Unmapped fields ride along in _source only.
                continue;
            };
            if value.is_null() {
                continue;
            }
            match kind {
                FieldKind::Text | FieldKind::Keyword => {
                    let s = value
                        .as_str()
                        .ok_or_else(|| format!("field '{name}': expected string"))?;
                    doc.add_text(self.fields[name.as_str()], s);
                }
                FieldKind::F64 => {
                    let v = value
                        .as_f64()
                        .ok_or_else(|| format!("field '{name}': expected number"))?;
                    doc.add_f64(self.fields[name.as_str()], v);
                }
                FieldKind::I64 => {
                    let v = value
                        .as_i64()
                        .ok_or_else(|| format!("field '{name}': expected integer"))?;
                    doc.add_i64(self.fields[name.as_str()], v);
                }
                FieldKind::Bool => {
                    let v = value
                        .as_bool()
                        .ok_or_else(|| format!("field '{name}': expected boolean"))?;
                    doc.add_bool(self.fields[name.as_str()], v);
                }
                FieldKind::Date => {
                    let s = value
                        .as_str()
                        .ok_or_else(|| format!("field '{name}': expected RFC 3339 string"))?;
                    let parsed = chrono::DateTime::parse_from_rfc3339(s)
                        .map_err(|e| format!("field '{name}': {e}"))?;
                    doc.add_date(
                        self.fields[name.as_str()],
                        tantivy::DateTime::from_timestamp_millis(parsed.timestamp_millis()),
                    );
                }
                FieldKind::GeoPoint => {
                    let point = value
                        .as_object()
                        .ok_or_else(|| format!("field '{name}': expected {{lat, lon}}"))?;
                    let lat = point
                        .get("lat")
                        .and_then(|v| v.as_f64())
                        .ok_or_else(|| format!("field '{name}': missing numeric 'lat'"))?;
                    let lon = point
                        .get("lon")
                        .and_then(|v| v.as_f64())
                        .ok_or_else(|| format!("field '{name}': missing numeric 'lon'"))?;
                    doc.add_f64(self.fields[&format!("{name}{GEO_LAT_SUFFIX}")], lat);
                    doc.add_f64(self.fields[&format!("{name}{GEO_LON_SUFFIX}")], lon);
                }
            }
        }
        Ok(doc)
    }
}
