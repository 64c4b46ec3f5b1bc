//! Sparse FAQ retrieval over a Tantivy BM25 index

use crate::retrieval::backend::{BackendResult, SearchError, SparseSearcher};
use crate::types::{DocMetadata, FaqDoc, QueryFilters, RawHit};
use crate::util::truncate_str;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    directory::MmapDirectory,
    query::QueryParser,
    schema::{Field, Schema, Value, STORED, STRING, TEXT},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument,
};
use tracing::debug;

const WRITER_HEAP_BYTES: usize = 50 * 1024 * 1024;

/// BM25 search index over FAQ documents using Tantivy
pub struct FaqTextIndex {
    index: Index,
    reader: IndexReader,
    writer: parking_lot::Mutex<IndexWriter>,
    schema: FaqSchema,
}

// IndexReader/IndexWriter do not implement Debug, so the derive is unavailable
impl std::fmt::Debug for FaqTextIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaqTextIndex").finish_non_exhaustive()
    }
}

/// Schema fields for the FAQ index
struct FaqSchema {
    source_id: Field,
    text: Field,
    question: Field,
    answer: Field,
    section: Field,
    lang: Field,
    extra: Field,
}

impl FaqSchema {
    fn define() -> (Schema, Self) {
        let mut builder = Schema::builder();
        let fields = Self {
            // source_id is indexed raw so delete_term works against it
            source_id: builder.add_text_field("source_id", STRING | STORED),
            text: builder.add_text_field("text", TEXT | STORED),
            question: builder.add_text_field("question", TEXT | STORED),
            answer: builder.add_text_field("answer", STORED),
            section: builder.add_text_field("section", STRING | STORED),
            lang: builder.add_text_field("lang", STRING | STORED),
            // Extension metadata rides along as a JSON string
            extra: builder.add_text_field("extra", STORED),
        };
        (builder.build(), fields)
    }
}

impl FaqTextIndex {
    /// Create a new index in memory
    pub fn new_in_memory() -> Result<Self> {
        let (schema, fields) = FaqSchema::define();
        Self::from_index(Index::create_in_ram(schema), fields)
    }

    /// Create or open an index on disk
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("Cannot create index directory '{}'", path.display()))?;

        let (schema, fields) = FaqSchema::define();
        let index = Index::open_or_create(MmapDirectory::open(path)?, schema)?;
        Self::from_index(index, fields)
    }

    fn from_index(index: Index, schema: FaqSchema) -> Result<Self> {
        let writer = index.writer(WRITER_HEAP_BYTES)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: parking_lot::Mutex::new(writer),
            schema,
        })
    }

    /// Add a document to the index
    pub fn add(&self, doc: &FaqDoc) -> Result<()> {
        let mut tdoc = TantivyDocument::new();
        tdoc.add_text(self.schema.source_id, &doc.id);
        tdoc.add_text(self.schema.text, &doc.text);

        if let Some(question) = &doc.metadata.question {
            tdoc.add_text(self.schema.question, question);
        }
        if let Some(answer) = &doc.metadata.answer {
            tdoc.add_text(self.schema.answer, answer);
        }
        if let Some(section) = &doc.metadata.section {
            tdoc.add_text(self.schema.section, section);
        }
        tdoc.add_text(self.schema.lang, &doc.metadata.lang);
        if !doc.metadata.extra.is_empty() {
            let extra = serde_json::to_string(&doc.metadata.extra)
                .context("Failed to serialize extra metadata")?;
            tdoc.add_text(self.schema.extra, extra);
        }

        self.writer.lock().add_document(tdoc)?;
        Ok(())
    }

    /// Commit pending writes and refresh the reader so they are searchable
    pub fn commit(&self) -> Result<()> {
        self.writer.lock().commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Search for matching documents, applying filters as a post-pass
    pub fn search_text(
        &self,
        query_text: &str,
        k: usize,
        filters: Option<&QueryFilters>,
    ) -> Result<Vec<RawHit>> {
        if query_text.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let parser =
            QueryParser::for_index(&self.index, vec![self.schema.question, self.schema.text]);
        let query = parser
            .parse_query(query_text)
            .context("Query text did not parse")?;

        // Over-fetch when filtering so the post-pass can still fill k
        let fetch_k = match filters {
            Some(f) if !f.is_empty() => k * 3,
            _ => k,
        };
        let top_docs = searcher.search(&query, &TopDocs::with_limit(fetch_k))?;

        let mut results = Vec::with_capacity(top_docs.len().min(k));
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let hit = self.doc_to_hit(&doc, score);
            if let Some(f) = filters {
                if !f.is_empty() && !f.matches(&hit.id, &hit.metadata) {
                    continue;
                }
            }
            results.push(hit);
            if results.len() == k {
                break;
            }
        }

        debug!(
            "BM25 search for '{}': {} results",
            truncate_str(query_text, 50),
            results.len()
        );
        Ok(results)
    }

    fn doc_to_hit(&self, doc: &TantivyDocument, score: f32) -> RawHit {
        let str_of = |field: Field| doc.get_first(field).and_then(|v| v.as_str());

        let extra = str_of(self.schema.extra)
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        RawHit {
            id: str_of(self.schema.source_id).unwrap_or("").to_string(),
            text: str_of(self.schema.text).unwrap_or("").to_string(),
            metadata: DocMetadata {
                question: str_of(self.schema.question).map(String::from),
                answer: str_of(self.schema.answer).map(String::from),
                section: str_of(self.schema.section).map(String::from),
                lang: str_of(self.schema.lang).unwrap_or("en").to_string(),
                extra,
            },
            score,
        }
    }

    /// Delete a document by ID (takes effect on the next commit)
    pub fn delete_doc(&self, id: &str) -> Result<()> {
        let term = tantivy::Term::from_field_text(self.schema.source_id, id);
        self.writer.lock().delete_term(term);
        Ok(())
    }

    /// Delete all documents and commit
    pub fn clear(&self) -> Result<()> {
        self.writer.lock().delete_all_documents()?;
        self.commit()?;
        Ok(())
    }

    /// Number of committed documents
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[async_trait]
impl SparseSearcher for FaqTextIndex {
    async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&QueryFilters>,
    ) -> BackendResult<Vec<RawHit>> {
        self.search_text(query, k, filters)
            .map_err(SearchError::Backend)
    }

    fn name(&self) -> &str {
        "bm25"
    }
}
