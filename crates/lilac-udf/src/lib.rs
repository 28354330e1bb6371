//! UDF Runner (spec §4.5): executes signals over a dense subsequence of a
//! sparse input column, enforcing the batch contract, offsetting spans
//! through parent spans, and persisting embeddings into the Vector Index.

pub mod builtins;

use lilac_core::error::{LilacError, Result};
use lilac_core::schema::{Field, PathTuple, Value};
use lilac_vector::{ScoredKey, VectorIndex, VectorKey};
use serde_json::Value as Json;

/// Declared shape of a signal's input (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    TextEmbedding,
    Any,
}

/// Which execution path a signal follows (Design Notes variant list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    TextToText,
    TextToSpan,
    TextToEmbedding,
    EmbeddingToScore,
    EmbeddingToTopK,
}

/// One row of dense input handed to `Signal::compute`, carrying the parent
/// span offset (if the input leaf was itself a span) needed for rule 3.
#[derive(Debug, Clone)]
pub struct SignalInput {
    pub row_id: String,
    pub value: Value,
    pub parent_span_start: Option<usize>,
}

/// A pluggable enrichment. Implementors declare identity, input/output
/// shape, and the lifecycle hooks the runner drives.
pub trait Signal: Send + Sync {
    fn name(&self) -> &str;

    fn params(&self) -> Json {
        Json::Object(Default::default())
    }

    fn input_kind(&self) -> InputKind;

    fn kind(&self) -> SignalKind;

    /// Schema subtree used to shape this signal's outputs (spec §4.5).
    fn output_schema_fragment(&self) -> Field;

    fn produces_spans(&self) -> bool {
        false
    }

    fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Receives the dense subsequence in order; must yield exactly one
    /// output per input, in order (spec §4.5 rule 2).
    fn compute(&self, inputs: &[Value]) -> Result<Vec<Value>>;

    fn teardown(&self) -> Result<()> {
        Ok(())
    }

    /// Per-row score against specific vector-index keys (`TextEmbedding`
    /// input kind only).
    fn vector_compute(&self, _keys: &[VectorKey], _index: &dyn VectorIndex) -> Result<Vec<Option<f32>>> {
        Err(LilacError::DtypeUnsupportedForSignal {
            path: self.name().to_string(),
            dtype: lilac_core::schema::DType::Embedding,
        })
    }

    /// Global top-K ranking against the vector index (`EmbeddingToTopK`).
    fn vector_topk(
        &self,
        _k: usize,
        _index: &dyn VectorIndex,
        _prefix: Option<&std::collections::HashSet<String>>,
    ) -> Result<Vec<ScoredKey>> {
        Err(LilacError::DtypeUnsupportedForSignal {
            path: self.name().to_string(),
            dtype: lilac_core::schema::DType::Embedding,
        })
    }
}

/// Descriptor attached to the schema wherever a signal's output was grafted
/// (spec invariant 2).
pub fn descriptor(signal: &dyn Signal, input_path: &PathTuple) -> lilac_core::schema::SignalDescriptor {
    lilac_core::schema::SignalDescriptor {
        name: signal.name().to_string(),
        params: signal.params(),
        input_path: input_path.clone(),
    }
}

/// Drives a [`Signal`] over a (possibly sparse) input column, returning one
/// output per input row, aligned by position.
pub struct UdfRunner;

impl UdfRunner {
    /// Run `signal` over `inputs`, honoring sparse preservation (rule 1),
    /// the batch contract (rule 2), span offsetting (rule 3), and embedding
    /// persistence into `vector_index` (rule 4).
    pub fn run(
        signal: &dyn Signal,
        inputs: &[SignalInput],
        vector_index: &dyn VectorIndex,
    ) -> Result<Vec<Option<Value>>> {
        let dense: Vec<(usize, &SignalInput)> = inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| !input.value.is_null())
            .collect();

        signal.setup()?;

        let dense_values: Vec<Value> = dense.iter().map(|(_, i)| i.value.clone()).collect();
        let outputs = signal.compute(&dense_values)?;
        if outputs.len() != dense_values.len() {
            return Err(LilacError::UdfContractViolation {
                signal: signal.name().to_string(),
                expected: dense_values.len(),
                actual: outputs.len(),
            });
        }

        let mut result = vec![None; inputs.len()];
        let mut embedding_entries: Vec<(VectorKey, Vec<f32>)> = Vec::new();

        for ((index, input), mut output) in dense.into_iter().zip(outputs) {
            if signal.produces_spans() {
                if let Some(start) = input.parent_span_start {
                    output = offset_spans(output, start);
                }
            }
            if matches!(signal.kind(), SignalKind::TextToEmbedding) {
                output = extract_embeddings(output, &input.row_id, &mut embedding_entries);
            }
            result[index] = Some(output);
        }

        if !embedding_entries.is_empty() {
            vector_index.add(&embedding_entries)?;
        }

        signal.teardown()?;
        Ok(result)
    }
}

/// Shift every `Value::Span` found in `value` by `start` (spec §4.5 rule 3).
fn offset_spans(value: Value, start: usize) -> Value {
    match value {
        Value::Span { start: s, end } => Value::Span {
            start: s + start,
            end: end + start,
        },
        Value::List(items) => Value::List(items.into_iter().map(|v| offset_spans(v, start)).collect()),
        Value::Record(map) => Value::Record(
            map.into_iter()
                .map(|(k, v)| (k, offset_spans(v, start)))
                .collect(),
        ),
        Value::WithExtras { value, extras } => Value::WithExtras {
            value: Box::new(offset_spans(*value, start)),
            extras: extras
                .into_iter()
                .map(|(k, v)| (k, offset_spans(v, start)))
                .collect(),
        },
        other => other,
    }
}

/// Replace inline embedding vectors with `None`, pushing `(row_id, span_index)
/// -> vector` pairs into `out` for the vector index (spec §4.5 rule 4).
fn extract_embeddings(value: Value, row_id: &str, out: &mut Vec<(VectorKey, Vec<f32>)>) -> Value {
    match value {
        Value::Embedding(entries) => {
            let mut stripped = Vec::with_capacity(entries.len());
            for (span_index, entry) in entries.into_iter().enumerate() {
                if let Some(vector) = entry.vector.clone() {
                    out.push(((row_id.to_string(), span_index as u32), vector));
                }
                stripped.push(lilac_core::schema::EmbeddingEntry {
                    span: entry.span,
                    vector: None,
                });
            }
            Value::Embedding(stripped)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use builtins::{SubstringSearchSignal, TextLengthSignal, ToyEmbeddingSignal};
    use lilac_vector::DenseVectorIndex;

    fn input(row_id: &str, value: Value) -> SignalInput {
        SignalInput {
            row_id: row_id.to_string(),
            value,
            parent_span_start: None,
        }
    }

    #[test]
    fn sparse_preservation_skips_null_rows() {
        let signal = TextLengthSignal;
        let index = DenseVectorIndex::new();
        let inputs = vec![
            input("r1", Value::Str("abc".to_string())),
            input("r2", Value::Null),
            input("r3", Value::Str("abcdef".to_string())),
        ];
        let out = UdfRunner::run(&signal, &inputs, &index).unwrap();
        assert_eq!(out[0], Some(Value::Int(3)));
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(Value::Int(6)));
    }

    #[test]
    fn substring_search_emits_spans_offset_by_parent() {
        let signal = SubstringSearchSignal::new("fox".to_string());
        let index = DenseVectorIndex::new();
        let mut row = input("r1", Value::Str("the quick fox".to_string()));
        row.parent_span_start = Some(10); // pretend this text is itself a span [10, 23) of a larger string
        let out = UdfRunner::run(&signal, &[row], &index).unwrap();
        let spans = out[0].clone().unwrap();
        match spans {
            Value::List(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].as_span(), Some((20, 23)));
            }
            other => panic!("expected list of spans, got {other:?}"),
        }
    }

    #[test]
    fn embedding_signal_persists_vectors_and_nulls_them_in_row_store() {
        let signal = ToyEmbeddingSignal;
        let index = DenseVectorIndex::new();
        let inputs = vec![input("r1", Value::Str("hello world".to_string()))];
        let out = UdfRunner::run(&signal, &inputs, &index).unwrap();
        match out[0].clone().unwrap() {
            Value::Embedding(entries) => {
                assert_eq!(entries.len(), 1);
                assert!(entries[0].vector.is_none());
            }
            other => panic!("expected embedding value, got {other:?}"),
        }
        assert!(index.dim().is_some());
        let scores = index.scores_for(&[1.0, 0.0, 0.0, 0.0], &[("r1".to_string(), 0)]).unwrap();
        assert!(scores[0].is_some());
    }

    #[test]
    fn batch_contract_violation_is_fatal() {
        struct BadSignal;
        impl Signal for BadSignal {
            fn name(&self) -> &str {
                "bad"
            }
            fn input_kind(&self) -> InputKind {
                InputKind::Text
            }
            fn kind(&self) -> SignalKind {
                SignalKind::TextToText
            }
            fn output_schema_fragment(&self) -> Field {
                Field::leaf(lilac_core::schema::DType::String)
            }
            fn compute(&self, inputs: &[Value]) -> Result<Vec<Value>> {
                Ok(inputs[..inputs.len().saturating_sub(1)].to_vec())
            }
        }
        let signal = BadSignal;
        let index = DenseVectorIndex::new();
        let inputs = vec![input("r1", Value::Str("a".to_string())), input("r2", Value::Str("b".to_string()))];
        let err = UdfRunner::run(&signal, &inputs, &index).unwrap_err();
        assert_eq!(err.kind(), lilac_core::error::ErrorKind::UdfContractViolation);
    }
}
