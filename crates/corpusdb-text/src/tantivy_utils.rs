use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "corpus_text";

const STOP_WORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its", "of", "on",
	"that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their",
	"there", "then", "than", "so", "if", "when", "where", "which", "who", "can", "could", "should", "would",
	"may", "might", "do", "does", "did", "have", "had",
];

/// Field handles resolved once per index.
#[derive(Debug, Clone, Copy)]
pub struct ChunkFields {
	pub id: Field,
	pub source_path: Field,
	pub ordinal: Field,
	pub text: Field,
	pub technology: Field,
	pub component: Field,
	pub topic: Field,
	pub version: Field,
	pub file_kind: Field,
}

impl ChunkFields {
	pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			id: schema.get_field("id")?,
			source_path: schema.get_field("source_path")?,
			ordinal: schema.get_field("ordinal")?,
			text: schema.get_field("text")?,
			technology: schema.get_field("technology")?,
			component: schema.get_field("component")?,
			topic: schema.get_field("topic")?,
			version: schema.get_field("version")?,
			file_kind: schema.get_field("file_kind")?,
		})
	}
}

/// Chunk text is analysed; everything else is an exact, stored keyword.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("source_path", STRING | STORED);
	schema_builder.add_u64_field("ordinal", STORED);
	let text_field_indexing = TextFieldIndexing::default()
		.set_tokenizer(TOKENIZER)
		.set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field("text", text_options);
	for name in ["technology", "component", "topic", "version", "file_kind"] {
		schema_builder.add_text_field(name, STRING | STORED);
	}
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(64))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}
