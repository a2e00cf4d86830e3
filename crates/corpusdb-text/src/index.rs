use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use corpusdb_core::traits::KeywordIndex;
use corpusdb_core::types::{Chunk, ChunkId, ChunkMetadata, FileKind, SearchFilters, SearchHit, SourceKind, Tag};

use crate::tantivy_utils::{build_schema, register_tokenizer, ChunkFields};

const WRITER_HEAP: usize = 50_000_000;
const WRITER_HEAP_RAM: usize = 15_000_000;

/// BM25 keyword index over chunk text, filterable by technology and component.
pub struct TantivyKeywordIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: ChunkFields,
}

impl TantivyKeywordIndex {
	/// Open the index stored in `dir`, creating it if absent.
	pub fn open(dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(dir)?;
		let index = if dir.join("meta.json").exists() {
			Index::open_in_dir(dir)?
		} else {
			Index::create_in_dir(dir, build_schema())?
		};
		debug!(dir = %dir.display(), "opened keyword index");
		Self::from_index(index, WRITER_HEAP)
	}

	pub fn in_memory() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()), WRITER_HEAP_RAM)
	}

	fn from_index(index: Index, heap: usize) -> Result<Self> {
		register_tokenizer(&index);
		let fields = ChunkFields::resolve(&index.schema())?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let writer = index.writer(heap)?;
		Ok(Self { index, reader, writer: Mutex::new(writer), fields })
	}

	fn writer(&self) -> Result<MutexGuard<'_, IndexWriter>> {
		self.writer.lock().map_err(|e| anyhow!("keyword index writer lock poisoned: {e}"))
	}

	fn id_term(&self, id: &str) -> Term {
		Term::from_field_text(self.fields.id, id)
	}

	fn to_document(&self, chunk: &Chunk) -> TantivyDocument {
		let f = &self.fields;
		let m = &chunk.metadata;
		let mut doc = TantivyDocument::new();
		doc.add_text(f.id, &chunk.id);
		doc.add_text(f.source_path, &chunk.source_path);
		doc.add_u64(f.ordinal, chunk.ordinal as u64);
		doc.add_text(f.text, &chunk.text);
		doc.add_text(f.technology, m.technology.as_str());
		doc.add_text(f.component, m.component.as_str());
		doc.add_text(f.topic, m.topic.as_str());
		doc.add_text(f.version, m.version.as_str());
		doc.add_text(f.file_kind, m.file_kind.as_str());
		doc
	}

	fn to_hit(&self, doc: &TantivyDocument, score: f32) -> SearchHit {
		let f = &self.fields;
		let text_of = |field| doc.get_first(field).and_then(|v| v.as_str()).unwrap_or("").to_string();
		let tag_of = |field| Tag::new(doc.get_first(field).and_then(|v| v.as_str()).unwrap_or(""));
		let source_path = text_of(f.source_path);
		SearchHit {
			id: text_of(f.id),
			score,
			source: SourceKind::Keyword,
			text: text_of(f.text),
			metadata: ChunkMetadata {
				technology: tag_of(f.technology),
				component: tag_of(f.component),
				topic: tag_of(f.topic),
				version: tag_of(f.version),
				file_kind: FileKind::parse(&text_of(f.file_kind)).unwrap_or_default(),
				source_path,
			},
		}
	}

	fn filter_clauses(&self, filters: &SearchFilters) -> Vec<(Occur, Box<dyn Query>)> {
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
		let mut push = |field, value: &Option<String>| {
			if let Some(v) = value {
				let term = Term::from_field_text(field, &v.to_lowercase());
				clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
			}
		};
		push(self.fields.technology, &filters.technology);
		push(self.fields.component, &filters.component);
		clauses
	}

	fn commit(&self, mut writer: MutexGuard<'_, IndexWriter>) -> Result<()> {
		writer.commit()?;
		drop(writer);
		self.reader.reload()?;
		Ok(())
	}
}

impl KeywordIndex for TantivyKeywordIndex {
	fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
		if chunks.is_empty() {
			return Ok(());
		}
		let writer = self.writer()?;
		for chunk in chunks {
			writer.delete_term(self.id_term(&chunk.id));
			writer.add_document(self.to_document(chunk))?;
		}
		self.commit(writer)?;
		debug!(count = chunks.len(), "keyword upsert committed");
		Ok(())
	}

	fn delete(&self, ids: &[ChunkId]) -> Result<()> {
		if ids.is_empty() {
			return Ok(());
		}
		let writer = self.writer()?;
		for id in ids {
			writer.delete_term(self.id_term(id));
		}
		self.commit(writer)?;
		debug!(count = ids.len(), "keyword delete committed");
		Ok(())
	}

	fn query(&self, text: &str, filters: &SearchFilters, limit: usize) -> Result<Vec<SearchHit>> {
		if limit == 0 || text.trim().is_empty() {
			return Ok(Vec::new());
		}
		let searcher = self.reader.searcher();
		let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
		let (text_query, parse_errors) = parser.parse_query_lenient(text);
		if !parse_errors.is_empty() {
			debug!(errors = parse_errors.len(), "lenient query parse dropped some clauses");
		}
		let query: Box<dyn Query> = if filters.is_empty() {
			text_query
		} else {
			let mut clauses = vec![(Occur::Must, text_query)];
			clauses.extend(self.filter_clauses(filters));
			Box::new(BooleanQuery::new(clauses))
		};
		// TopDocs overflows on huge limits; no query returns more than the index holds.
		let limit = limit.min(searcher.num_docs() as usize).max(1);
		let top_docs = searcher.search(&*query, &TopDocs::with_limit(limit))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let hit = self.to_hit(&doc, score);
			if filters.matches(&hit.metadata) {
				hits.push(hit);
			}
		}
		Ok(hits)
	}

	fn contains(&self, id: &str) -> Result<bool> {
		let searcher = self.reader.searcher();
		let query = TermQuery::new(self.id_term(id), IndexRecordOption::Basic);
		Ok(searcher.search(&query, &Count)? > 0)
	}

	fn len(&self) -> Result<usize> {
		Ok(self.reader.searcher().num_docs() as usize)
	}

	fn clear(&self) -> Result<()> {
		let writer = self.writer()?;
		writer.delete_all_documents()?;
		self.commit(writer)
	}
}
