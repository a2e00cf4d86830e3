use corpusdb_core::traits::{Embedder, VectorIndex};
use corpusdb_core::types::{Chunk, ChunkMetadata, FileKind, SearchFilters, Tag};
use corpusdb_embed::HashEmbedder;
use corpusdb_vector::{LanceVectorIndex, MemoryVectorIndex};

const DIM: usize = 64;

fn chunk(id: &str, tech: &str, text: &str) -> Chunk {
	Chunk {
		id: id.to_string(),
		source_path: format!("/corpus/{tech}/{id}.md"),
		ordinal: 0,
		text: text.to_string(),
		byte_range: (0, text.len()),
		line_range: (1, 1),
		metadata: ChunkMetadata {
			technology: Tag::new(tech),
			component: Tag::Unknown,
			topic: Tag::new(id),
			version: Tag::Unknown,
			file_kind: FileKind::Prose,
			source_path: format!("/corpus/{tech}/{id}.md"),
		},
	}
}

fn corpus() -> (Vec<Chunk>, Vec<Vec<f32>>) {
	let chunks = vec![
		chunk("a", "kubernetes", "ingress authentication with oauth proxy"),
		chunk("b", "kubernetes", "pod scheduling and node affinity"),
		chunk("c", "docker", "ingress authentication for compose services"),
	];
	let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
	let vectors = HashEmbedder::new(DIM).embed_batch(&texts).expect("embed");
	(chunks, vectors)
}

async fn exercise(index: &dyn VectorIndex) {
	let (chunks, vectors) = corpus();
	index.upsert(&chunks, &vectors).await.expect("upsert");
	assert_eq!(index.len().await.expect("len"), 3);

	let query = HashEmbedder::new(DIM).embed_one("ingress authentication");
	let hits = index.query_nearest(&query, &SearchFilters::default(), 3).await.expect("query");
	assert_eq!(hits.len(), 3);
	assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
	assert_ne!(hits[0].id, "b", "unrelated chunk must not rank first");

	let filtered = index
		.query_nearest(&query, &SearchFilters::default().technology("kubernetes"), 3)
		.await
		.expect("filtered query");
	assert!(filtered.iter().all(|h| h.metadata.technology == Tag::new("kubernetes")));
	assert_eq!(filtered.len(), 2);

	// re-upsert replaces rather than duplicates
	index.upsert(&chunks[..1], &vectors[..1]).await.expect("upsert again");
	assert_eq!(index.len().await.expect("len"), 3);

	index.delete(&["a".to_string()]).await.expect("delete");
	assert!(!index.contains("a").await.expect("contains"));
	assert!(index.contains("b").await.expect("contains"));

	index.clear().await.expect("clear");
	assert_eq!(index.len().await.expect("len"), 0);
}

#[tokio::test]
async fn memory_index_behaves_like_a_vector_store() {
	exercise(&MemoryVectorIndex::new(DIM)).await;
}

#[tokio::test]
async fn lance_index_behaves_like_a_vector_store() {
	let tmp = tempfile::tempdir().expect("tempdir");
	let uri = tmp.path().to_string_lossy().to_string();
	let index = LanceVectorIndex::open(&uri, "chunks", DIM).await.expect("open");
	exercise(&index).await;
}

#[tokio::test]
async fn rejects_mismatched_dimensions() {
	let index = MemoryVectorIndex::new(DIM);
	let (chunks, _) = corpus();
	let short = vec![vec![0.0; DIM - 1]; chunks.len()];
	assert!(index.upsert(&chunks, &short).await.is_err());
	assert!(index.query_nearest(&[0.0; 3], &SearchFilters::default(), 1).await.is_err());
}
