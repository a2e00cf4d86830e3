use corpusdb_core::traits::KeywordIndex;
use corpusdb_core::types::{Chunk, ChunkMetadata, FileKind, SearchFilters, Tag};
use corpusdb_text::TantivyKeywordIndex;

fn chunk(id: &str, tech: &str, component: &str, text: &str) -> Chunk {
	Chunk {
		id: id.to_string(),
		source_path: format!("/corpus/{tech}/{component}/{id}.md"),
		ordinal: 0,
		text: text.to_string(),
		byte_range: (0, text.len()),
		line_range: (1, 1),
		metadata: ChunkMetadata {
			technology: Tag::new(tech),
			component: Tag::new(component),
			topic: Tag::new(id),
			version: Tag::Unknown,
			file_kind: FileKind::Prose,
			source_path: format!("/corpus/{tech}/{component}/{id}.md"),
		},
	}
}

fn seeded() -> TantivyKeywordIndex {
	let index = TantivyKeywordIndex::in_memory().expect("index");
	index
		.upsert(&[
			chunk("k1", "kubernetes", "ingress", "authentication for ingress controllers with oauth authentication proxies"),
			chunk("k2", "kubernetes", "rbac", "role based access control and service account authentication"),
			chunk("d1", "docker", "compose", "compose files describe multi container applications"),
		])
		.expect("upsert");
	index
}

#[test]
fn bm25_ranks_and_returns_stored_projection() {
	let index = seeded();
	let hits = index.query("authentication", &SearchFilters::default(), 10).expect("query");
	assert_eq!(hits.len(), 2);
	assert_eq!(hits[0].id, "k1", "denser term frequency ranks first");
	assert!(hits[0].score >= hits[1].score);
	assert_eq!(hits[0].metadata.technology, Tag::new("kubernetes"));
	assert_eq!(hits[0].metadata.version, Tag::Unknown);
	assert!(hits[0].text.contains("oauth"));
}

#[test]
fn filters_restrict_hits() {
	let index = seeded();
	let filters = SearchFilters::default().technology("kubernetes").component("rbac");
	let hits = index.query("authentication", &filters, 10).expect("query");
	assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["k2"]);

	let none = index.query("authentication", &SearchFilters::default().technology("docker"), 10).expect("query");
	assert!(none.is_empty());
}

#[test]
fn upsert_replaces_and_delete_removes() {
	let index = seeded();
	assert_eq!(index.len().expect("len"), 3);
	index.upsert(&[chunk("d1", "docker", "compose", "compose now mentions authentication")]).expect("upsert");
	assert_eq!(index.len().expect("len"), 3);
	let hits = index.query("authentication", &SearchFilters::default(), 10).expect("query");
	assert!(hits.iter().any(|h| h.id == "d1"));

	index.delete(&["k1".to_string(), "missing".to_string()]).expect("delete");
	assert!(!index.contains("k1").expect("contains"));
	assert!(index.contains("k2").expect("contains"));
	assert_eq!(index.len().expect("len"), 2);

	index.clear().expect("clear");
	assert_eq!(index.len().expect("len"), 0);
}

#[test]
fn malformed_and_empty_queries_do_not_fail() {
	let index = seeded();
	assert!(index.query("   ", &SearchFilters::default(), 10).expect("blank").is_empty());
	assert!(index.query("authentication", &SearchFilters::default(), 0).expect("zero").is_empty());
	index.query("authentication AND (", &SearchFilters::default(), 10).expect("lenient parse");
}

#[test]
fn oversized_limits_are_bounded_by_the_index() {
	let index = seeded();
	let hits = index.query("authentication", &SearchFilters::default(), usize::MAX).expect("huge limit");
	assert_eq!(hits.len(), 2);

	let empty = TantivyKeywordIndex::in_memory().expect("index");
	assert!(empty.query("authentication", &SearchFilters::default(), usize::MAX).expect("empty index").is_empty());
}

#[test]
fn on_disk_index_survives_reopen() {
	let tmp = tempfile::tempdir().expect("tempdir");
	{
		let index = TantivyKeywordIndex::open(tmp.path()).expect("open");
		index.upsert(&[chunk("k1", "kubernetes", "ingress", "persistent words")]).expect("upsert");
	}
	let reopened = TantivyKeywordIndex::open(tmp.path()).expect("reopen");
	assert!(reopened.contains("k1").expect("contains"));
	assert_eq!(reopened.query("persistent", &SearchFilters::default(), 5).expect("query").len(), 1);
}
