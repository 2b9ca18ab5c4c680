//! Snippet generation for requested highlight fields.

use crate::node::OpenIndex;
use crate::{Error, Result};
use std::collections::BTreeMap;
use tantivy::query::Query;
use tantivy::snippet::SnippetGenerator;
use tantivy::{Searcher, TantivyDocument};

/// Per-request snippet generators, one per highlight field.
pub struct Highlighter {
    generators: Vec<(String, SnippetGenerator)>,
}

impl Highlighter {
    pub fn new(
        open: &OpenIndex,
        searcher: &Searcher,
        query: &dyn Query,
        fields: &[String],
    ) -> Result<Self> {
        let mut generators = Vec::with_capacity(fields.len());
        for name in fields {
            let field = open.field(name).ok_or_else(|| {
                Error::InvalidSpec(format!("highlight on unknown field '{name}'"))
            })?;
            let generator = SnippetGenerator::create(searcher, query, field)
                .map_err(|e| Error::Execution(format!("highlighter for '{name}': {e}")))?;
            generators.push((name.clone(), generator));
        }
        Ok(Highlighter { generators })
    }

    /// Renders the fragments for one stored document; fields without a match
    /// are left out.
    pub fn render(&self, doc: &TantivyDocument) -> BTreeMap<String, Vec<String>> {
        let mut fragments = BTreeMap::new();
        for (name, generator) in &self.generators {
            let snippet = generator.snippet_from_doc(doc);
            if !snippet.highlighted().is_empty() {
                fragments.insert(name.clone(), vec![snippet.to_html()]);
            }
        }
        fragments
    }
}
