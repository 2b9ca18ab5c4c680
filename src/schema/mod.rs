//! Index mappings and their translation to a tantivy schema.
//!
//! A mapping is the schema-flexible description an index is created with:
//! field name to [`FieldKind`]. Every mapped field is indexed, stored and
//! fast so that term matching, ranges, facets and geo predicates all work
//! without per-field tuning. Indices created without a mapping stay pending
//! until the first bulk load, which infers one (see [`infer_mapping`]).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tantivy::schema::{
    DateOptions, Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions,
    STORED, STRING,
};

/// Reserved names carried by every index.
pub const ID_FIELD: &str = "_id";
pub const TYPE_FIELD: &str = "_type";
pub const SOURCE_FIELD: &str = "_source";

/// Suffixes for the latitude/longitude columns backing a geo_point field.
pub const GEO_LAT_SUFFIX: &str = ".lat";
pub const GEO_LON_SUFFIX: &str = ".lon";

/// How a field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Analyzed text: tokenized and lowercased before indexing.
    Text,
    /// Not-analyzed string: indexed as one exact literal.
    Keyword,
    F64,
    I64,
    Bool,
    /// RFC 3339 date.
    Date,
    /// Latitude/longitude pair, `{"lat": .., "lon": ..}` in the source.
    GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

impl FieldMapping {
    pub fn new(kind: FieldKind) -> Self {
        FieldMapping { kind }
    }
}

/// Explicit field mapping for one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMapping {
    pub properties: BTreeMap<String, FieldMapping>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, consuming and returning the mapping so tests can chain
    /// construction without a mutable builder.
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.properties
            .insert(name.to_string(), FieldMapping::new(kind));
        self
    }

    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.properties.get(field).map(|m| m.kind)
    }

    /// Rejects reserved names and empty field names before an index is built.
    pub fn validate(&self) -> Result<()> {
        for name in self.properties.keys() {
            if name.is_empty() {
                return Err(Error::Mapping("empty field name".to_string()));
            }
            if name == ID_FIELD || name == TYPE_FIELD || name == SOURCE_FIELD {
                return Err(Error::Mapping(format!("'{name}' is a reserved field name")));
            }
        }
        Ok(())
    }
}

/// Builds the tantivy schema for a mapping and returns it together with the
/// name-to-field table used by translation and document conversion.
pub fn build_schema(mapping: &IndexMapping) -> Result<(Schema, BTreeMap<String, Field>)> {
    mapping.validate()?;

    let mut builder = Schema::builder();
    let mut fields = BTreeMap::new();

    let id = builder.add_text_field(ID_FIELD, STRING | STORED);
    fields.insert(ID_FIELD.to_string(), id);
    let doc_type = builder.add_text_field(TYPE_FIELD, STRING | STORED);
    fields.insert(TYPE_FIELD.to_string(), doc_type);
    // Original document payload, stored verbatim and never indexed.
    let source = builder.add_text_field(SOURCE_FIELD, TextOptions::default().set_stored());
    fields.insert(SOURCE_FIELD.to_string(), source);

    for (name, field_mapping) in &mapping.properties {
        match field_mapping.kind {
            FieldKind::Text => {
                let options = TextOptions::default()
                    .set_indexing_options(
                        TextFieldIndexing::default()
                            .set_tokenizer("default")
                            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
                    )
                    .set_stored()
                    .set_fast(Some("lowercase"));
                fields.insert(name.clone(), builder.add_text_field(name, options));
            }
            FieldKind::Keyword => {
                let options = TextOptions::default()
                    .set_indexing_options(
                        TextFieldIndexing::default()
                            .set_tokenizer("raw")
                            .set_index_option(IndexRecordOption::Basic),
                    )
                    .set_stored()
                    .set_fast(Some("raw"));
                fields.insert(name.clone(), builder.add_text_field(name, options));
            }
            FieldKind::F64 => {
                let options = NumericOptions::default().set_indexed().set_stored().set_fast();
                fields.insert(name.clone(), builder.add_f64_field(name, options));
            }
            FieldKind::I64 => {
                let options = NumericOptions::default().set_indexed().set_stored().set_fast();
                fields.insert(name.clone(), builder.add_i64_field(name, options));
            }
            FieldKind::Bool => {
                let options = NumericOptions::default().set_indexed().set_stored().set_fast();
                fields.insert(name.clone(), builder.add_bool_field(name, options));
            }
            FieldKind::Date => {
                let options = DateOptions::default().set_indexed().set_stored().set_fast();
                fields.insert(name.clone(), builder.add_date_field(name, options));
            }
            FieldKind::GeoPoint => {
                // Two plain f64 columns; distance predicates read them as
                // fast fields, no spatial index is built.
                let options = NumericOptions::default().set_indexed().set_stored().set_fast();
                let lat_name = format!("{name}{GEO_LAT_SUFFIX}");
                let lon_name = format!("{name}{GEO_LON_SUFFIX}");
                fields.insert(lat_name.clone(), builder.add_f64_field(&lat_name, options.clone()));
                fields.insert(lon_name.clone(), builder.add_f64_field(&lon_name, options));
            }
        }
    }

    Ok((builder.build(), fields))
}

/// Infers a mapping from the documents of a first bulk load, mirroring
/// dynamic mapping: the first non-null value seen for a field decides its
/// kind, later documents never change it.
pub fn infer_mapping<'a, I>(sources: I) -> IndexMapping
where
    I: IntoIterator<Item = &'a serde_json::Value>,
{
    let mut mapping = IndexMapping::new();
    for source in sources {
        let Some(object) = source.as_object() else {
            continue;
        };
        for (name, value) in object {
            if mapping.properties.contains_key(name) {
                continue;
            }
            if let Some(kind) = infer_kind(value) {
                mapping
                    .properties
                    .insert(name.clone(), FieldMapping::new(kind));
            }
        }
    }
    mapping
}

fn infer_kind(value: &serde_json::Value) -> Option<FieldKind> {
    match value {
        serde_json::Value::String(s) => {
            if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                Some(FieldKind::Date)
            } else {
                Some(FieldKind::Text)
            }
        }
        serde_json::Value::Number(_) => Some(FieldKind::F64),
        serde_json::Value::Bool(_) => Some(FieldKind::Bool),
        serde_json::Value::Object(o) => {
            if o.contains_key("lat") && o.contains_key("lon") {
                Some(FieldKind::GeoPoint)
            } else {
                None
            }
        }
        _ => None,
    }
}
