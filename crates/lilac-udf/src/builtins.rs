//! Built-in signals, grounded in `original_source/lilac/signals/` naming
//! (`substring_search`, `semantic_similarity`, `concept_scorer` /
//! `concept_labels`) and `original_source/lilac/concepts/db_concept.py`'s
//! score-then-label pairing.

use lilac_core::error::Result;
use lilac_core::schema::{DType, EmbeddingEntry, Field};
use lilac_vector::{ScoredKey, VectorIndex, VectorKey};
use serde_json::json;

use crate::{InputKind, Signal, SignalKind};
use lilac_core::schema::Value;

/// `text -> int`: character count of the input text.
pub struct TextLengthSignal;

impl Signal for TextLengthSignal {
    fn name(&self) -> &str {
        "text_length"
    }

    fn input_kind(&self) -> InputKind {
        InputKind::Text
    }

    fn kind(&self) -> SignalKind {
        SignalKind::TextToText
    }

    fn output_schema_fragment(&self) -> Field {
        Field::leaf(DType::Int32)
    }

    fn compute(&self, inputs: &[Value]) -> Result<Vec<Value>> {
        inputs
            .iter()
            .map(|v| {
                let text = v.as_str().unwrap_or_default();
                Ok(Value::Int(text.chars().count() as i64))
            })
            .collect()
    }
}

/// `text -> [span]`: every non-overlapping occurrence of `query` as a span.
pub struct SubstringSearchSignal {
    query: String,
}

impl SubstringSearchSignal {
    pub fn new(query: String) -> Self {
        Self { query }
    }
}

impl Signal for SubstringSearchSignal {
    fn name(&self) -> &str {
        "substring_search"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "query": self.query })
    }

    fn input_kind(&self) -> InputKind {
        InputKind::Text
    }

    fn kind(&self) -> SignalKind {
        SignalKind::TextToSpan
    }

    fn output_schema_fragment(&self) -> Field {
        Field::repeated(Field::leaf(DType::StringSpan))
    }

    fn produces_spans(&self) -> bool {
        true
    }

    fn compute(&self, inputs: &[Value]) -> Result<Vec<Value>> {
        inputs
            .iter()
            .map(|v| {
                let text = v.as_str().unwrap_or_default();
                let mut spans = Vec::new();
                if !self.query.is_empty() {
                    let mut from = 0;
                    while let Some(pos) = text[from..].find(&self.query) {
                        let start = from + pos;
                        let end = start + self.query.len();
                        spans.push(Value::Span { start, end });
                        from = end;
                    }
                }
                Ok(Value::List(spans))
            })
            .collect()
    }
}

const TOY_EMBEDDING_DIM: usize = 4;

/// Deterministic toy text embedding: a character-code histogram folded into
/// a fixed-length vector. Stands in for a real encoder so the engine's
/// embedding plumbing (persistence, top-K, scoring) is exercisable without
/// a model dependency.
pub fn toy_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0f32; TOY_EMBEDDING_DIM];
    for (i, b) in text.bytes().enumerate() {
        v[i % TOY_EMBEDDING_DIM] += b as f32;
    }
    v
}

/// `text -> embedding`: one embedding entry per row, spanning the whole
/// input text.
pub struct ToyEmbeddingSignal;

impl Signal for ToyEmbeddingSignal {
    fn name(&self) -> &str {
        "toy_embedding"
    }

    fn input_kind(&self) -> InputKind {
        InputKind::Text
    }

    fn kind(&self) -> SignalKind {
        SignalKind::TextToEmbedding
    }

    fn output_schema_fragment(&self) -> Field {
        Field::leaf(DType::Embedding)
    }

    fn compute(&self, inputs: &[Value]) -> Result<Vec<Value>> {
        inputs
            .iter()
            .map(|v| {
                let text = v.as_str().unwrap_or_default();
                Ok(Value::Embedding(vec![EmbeddingEntry {
                    span: Some((0, text.len())),
                    vector: Some(toy_embed(text)),
                }]))
            })
            .collect()
    }
}

/// `text_embedding -> score`: cosine similarity against a fixed query text,
/// computed through the Vector Index rather than `compute` (spec §4.5
/// `vector_compute`).
pub struct SemanticSimilaritySignal {
    query_vector: Vec<f32>,
}

impl SemanticSimilaritySignal {
    pub fn new(query: &str) -> Self {
        Self {
            query_vector: toy_embed(query),
        }
    }

    /// Build from an already-embedded query vector, e.g. one produced by
    /// the same encoder that embedded the dataset (rather than the toy
    /// byte-histogram embedder, which is only a stand-in for text input).
    pub fn with_vector(query_vector: Vec<f32>) -> Self {
        Self { query_vector }
    }
}

impl Signal for SemanticSimilaritySignal {
    fn name(&self) -> &str {
        "semantic_similarity"
    }

    fn input_kind(&self) -> InputKind {
        InputKind::TextEmbedding
    }

    fn kind(&self) -> SignalKind {
        SignalKind::EmbeddingToScore
    }

    fn output_schema_fragment(&self) -> Field {
        Field::leaf(DType::Float32)
    }

    fn compute(&self, _inputs: &[Value]) -> Result<Vec<Value>> {
        unreachable!("EmbeddingToScore signals are driven through vector_compute, not compute")
    }

    fn vector_compute(&self, keys: &[VectorKey], index: &dyn VectorIndex) -> Result<Vec<Option<f32>>> {
        index.scores_for(&self.query_vector, keys)
    }

    fn vector_topk(
        &self,
        k: usize,
        index: &dyn VectorIndex,
        prefix: Option<&std::collections::HashSet<String>>,
    ) -> Result<Vec<ScoredKey>> {
        index.top_k(&self.query_vector, k, prefix)
    }
}

/// `text_embedding -> score`: distance from a concept's centroid vector
/// (spec.md §4.6.5 "concept search"; grounded in `db_concept.py`'s
/// score-by-cosine-distance-to-concept-vector behavior).
pub struct ConceptScorerSignal {
    namespace: String,
    concept_name: String,
    concept_vector: Vec<f32>,
}

impl ConceptScorerSignal {
    /// `positive_examples` stands in for the concept model's fitted
    /// centroid; a real implementation would load a trained model from the
    /// concept DB instead of averaging toy embeddings.
    pub fn new(namespace: &str, concept_name: &str, positive_examples: &[&str]) -> Self {
        let mut acc = vec![0f32; TOY_EMBEDDING_DIM];
        for example in positive_examples {
            for (i, v) in toy_embed(example).into_iter().enumerate() {
                acc[i] += v;
            }
        }
        let n = positive_examples.len().max(1) as f32;
        for v in acc.iter_mut() {
            *v /= n;
        }
        Self {
            namespace: namespace.to_string(),
            concept_name: concept_name.to_string(),
            concept_vector: acc,
        }
    }

    pub fn identity(&self) -> String {
        format!("{}/{}", self.namespace, self.concept_name)
    }
}

impl Signal for ConceptScorerSignal {
    fn name(&self) -> &str {
        "concept_scorer"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "namespace": self.namespace, "concept_name": self.concept_name })
    }

    fn input_kind(&self) -> InputKind {
        InputKind::TextEmbedding
    }

    fn kind(&self) -> SignalKind {
        SignalKind::EmbeddingToScore
    }

    fn output_schema_fragment(&self) -> Field {
        Field::leaf(DType::Float32)
    }

    fn compute(&self, _inputs: &[Value]) -> Result<Vec<Value>> {
        unreachable!("EmbeddingToScore signals are driven through vector_compute, not compute")
    }

    fn vector_compute(&self, keys: &[VectorKey], index: &dyn VectorIndex) -> Result<Vec<Option<f32>>> {
        index.scores_for(&self.concept_vector, keys)
    }

    fn vector_topk(
        &self,
        k: usize,
        index: &dyn VectorIndex,
        prefix: Option<&std::collections::HashSet<String>>,
    ) -> Result<Vec<ScoredKey>> {
        index.top_k(&self.concept_vector, k, prefix)
    }
}

/// `text -> string`: a label ("in_concept" / "not_in_concept") derived from
/// thresholding [`ConceptScorerSignal`]'s score. A first-class sibling of
/// the scorer, not a derived column, so it can be selected independently;
/// since its output is a string it never contributes a sort key.
pub struct ConceptLabelsSignal {
    scorer: ConceptScorerSignal,
    threshold: f32,
}

impl ConceptLabelsSignal {
    pub fn new(scorer: ConceptScorerSignal, threshold: f32) -> Self {
        Self { scorer, threshold }
    }
}

impl Signal for ConceptLabelsSignal {
    fn name(&self) -> &str {
        "concept_labels"
    }

    fn params(&self) -> serde_json::Value {
        json!({ "concept": self.scorer.identity(), "threshold": self.threshold })
    }

    fn input_kind(&self) -> InputKind {
        InputKind::TextEmbedding
    }

    fn kind(&self) -> SignalKind {
        SignalKind::EmbeddingToScore
    }

    fn output_schema_fragment(&self) -> Field {
        Field::leaf(DType::String)
    }

    fn compute(&self, _inputs: &[Value]) -> Result<Vec<Value>> {
        unreachable!("EmbeddingToScore signals are driven through vector_compute, not compute")
    }

    fn vector_compute(&self, keys: &[VectorKey], index: &dyn VectorIndex) -> Result<Vec<Option<f32>>> {
        self.scorer.vector_compute(keys, index)
    }
}
