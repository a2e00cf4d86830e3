use corpusdb_core::config::EmbeddingSettings;
use corpusdb_core::traits::Embedder;
use corpusdb_embed::{get_default_embedder, HashEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { fake: true, dim: 256, ..Default::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 256);

    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    assert_eq!(embs.len(), 2);
    assert_eq!(embs[0].len(), 256);

    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(embs[0], embs[1]);
}

#[test]
fn shared_words_increase_similarity() {
    let e = HashEmbedder::new(512);
    let q = e.embed_one("kubernetes ingress authentication");
    let near = e.embed_one("Authentication for the Kubernetes ingress.");
    let far = e.embed_one("baking sourdough bread at home");
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

#[test]
fn empty_text_yields_zero_vector() {
    let v = HashEmbedder::new(16).embed_one("  ...  ");
    assert!(v.iter().all(|x| *x == 0.0));
}
