//! Select the QA triple with the longest explanation and format it as a problem/solution pair.
//!
//! Each record carries three parallel sequences (questions, explanations, answers), normally
//! nested under a single container field (`qa_pairs`). The entry whose explanation is longest
//! (in characters; the first one wins ties, nulls are skipped) becomes
//!
//! - `problem`: the question
//! - `solution`: `"{explanation}\n\nThe answer is \boxed{{answer}}."`
//!
//! Records without three non-empty, equal-length sequences are dropped. Unexpected failures
//! never abort the pipeline: the record is passed through unchanged when `keep_unmapped` is set
//! and dropped otherwise.

use std::slice;

use serde::Deserialize;
use thiserror::Error;

use crate::config::ProcessorConfig;
use crate::error::PipelineResult;
use crate::types::{Record, Value};

use super::{Outcome, Processor};

/// Registry name.
pub const NAME: &str = "longest_explanation_mapping";

/// Options for [`LongestExplanationMapper`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LongestExplanationOptions {
    /// Container field holding the three sequences. `None` (or empty) reads them from the
    /// record top level instead.
    pub qa_pairs_field: Option<String>,
    pub question_field: String,
    pub explanation_field: String,
    pub answer_field: String,
    pub problem_field: String,
    pub solution_field: String,
    /// Start the output from a copy of the input record (otherwise only the new fields).
    pub keep_unmapped: bool,
    /// Remove the source container (or the three top-level fields) from the output.
    pub remove_source_fields: bool,
}

impl Default for LongestExplanationOptions {
    fn default() -> Self {
        Self {
            qa_pairs_field: Some("qa_pairs".to_string()),
            question_field: "question".to_string(),
            explanation_field: "explanation".to_string(),
            answer_field: "answer".to_string(),
            problem_field: "problem".to_string(),
            solution_field: "solution".to_string(),
            keep_unmapped: true,
            remove_source_fields: false,
        }
    }
}

/// Failure while coercing a selected entry to text.
#[derive(Debug, Error)]
enum MappingError {
    #[error("field '{field}' holds a {kind} value that cannot be used as text")]
    NotText { field: String, kind: &'static str },
}

/// Maps QA triples to a single problem/solution pair.
#[derive(Debug, Clone)]
pub struct LongestExplanationMapper {
    opts: LongestExplanationOptions,
}

/// Registry constructor.
pub fn create(config: &ProcessorConfig) -> PipelineResult<Box<dyn Processor>> {
    Ok(Box::new(LongestExplanationMapper::from_config(config)?))
}

impl LongestExplanationMapper {
    pub fn new(mut opts: LongestExplanationOptions) -> Self {
        if opts.qa_pairs_field.as_deref().is_some_and(str::is_empty) {
            opts.qa_pairs_field = None;
        }
        Self { opts }
    }

    pub fn from_config(config: &ProcessorConfig) -> PipelineResult<Self> {
        Ok(Self::new(config.parse(NAME)?))
    }

    pub fn options(&self) -> &LongestExplanationOptions {
        &self.opts
    }

    fn map_record(&self, record: &Record) -> Result<Outcome, MappingError> {
        let source = self.source_container(record);
        let lookup = |name: &str| source.and_then(|m| m.get(name));

        let questions = as_list(lookup(&self.opts.question_field));
        let explanations = as_list(lookup(&self.opts.explanation_field));
        let answers = as_list(lookup(&self.opts.answer_field));

        if questions.is_empty() || explanations.is_empty() || answers.is_empty() {
            tracing::debug!(
                questions = !questions.is_empty(),
                explanations = !explanations.is_empty(),
                answers = !answers.is_empty(),
                "skipping example: missing questions, explanations or answers"
            );
            return Ok(Outcome::Drop);
        }

        if questions.len() != explanations.len() || explanations.len() != answers.len() {
            tracing::debug!(
                questions = questions.len(),
                explanations = explanations.len(),
                answers = answers.len(),
                "skipping example: length mismatch"
            );
            return Ok(Outcome::Drop);
        }

        let Some(index) = select_longest_index(explanations, &self.opts.explanation_field)? else {
            tracing::debug!("skipping example: every explanation is null");
            return Ok(Outcome::Drop);
        };

        let question = text_of(&questions[index], &self.opts.question_field)?;
        let explanation = text_of(&explanations[index], &self.opts.explanation_field)?;
        let answer = text_of(&answers[index], &self.opts.answer_field)?;
        let (question, explanation, answer) = (question.trim(), explanation.trim(), answer.trim());

        if question.is_empty() || explanation.is_empty() || answer.is_empty() {
            tracing::debug!(
                question = !question.is_empty(),
                explanation = !explanation.is_empty(),
                answer = !answer.is_empty(),
                "skipping example: empty fields after selection"
            );
            return Ok(Outcome::Drop);
        }

        let mut out = if self.opts.keep_unmapped {
            record.clone()
        } else {
            Record::new()
        };
        out.insert(self.opts.problem_field.clone(), Value::from(question));
        out.insert(
            self.opts.solution_field.clone(),
            Value::from(format_solution(explanation, answer)),
        );

        if self.opts.remove_source_fields {
            match &self.opts.qa_pairs_field {
                Some(container) => {
                    out.remove(container);
                }
                None => {
                    for field in [
                        &self.opts.question_field,
                        &self.opts.explanation_field,
                        &self.opts.answer_field,
                    ] {
                        out.remove(field);
                    }
                }
            }
        }

        Ok(Outcome::Keep(out))
    }

    fn source_container<'a>(&self, record: &'a Record) -> Option<&'a Record> {
        let Some(container) = &self.opts.qa_pairs_field else {
            return Some(record);
        };
        match record.get(container) {
            Some(Value::Struct(map)) => Some(map),
            other => {
                tracing::debug!(
                    field = %container,
                    found = ?other.map(value_kind),
                    "qa pairs field missing or not a mapping"
                );
                None
            }
        }
    }
}

impl Processor for LongestExplanationMapper {
    fn name(&self) -> &str {
        NAME
    }

    fn required_columns(&self) -> Vec<String> {
        match &self.opts.qa_pairs_field {
            Some(container) => vec![container.clone()],
            None => vec![
                self.opts.question_field.clone(),
                self.opts.explanation_field.clone(),
                self.opts.answer_field.clone(),
            ],
        }
    }

    fn process_example(&self, record: &Record) -> PipelineResult<Outcome> {
        match self.map_record(record) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::warn!(%err, "error in longest explanation mapping");
                tracing::debug!(keys = ?record.keys().collect::<Vec<_>>(), "example keys");
                Ok(if self.opts.keep_unmapped {
                    Outcome::Keep(record.clone())
                } else {
                    Outcome::Drop
                })
            }
        }
    }
}

/// Scalars become one-element sequences, null/missing becomes empty.
fn as_list(value: Option<&Value>) -> &[Value] {
    match value {
        None | Some(Value::Null) => &[],
        Some(Value::List(items)) => items,
        Some(other) => slice::from_ref(other),
    }
}

/// Index of the longest non-null explanation; the first maximum wins.
fn select_longest_index(explanations: &[Value], field: &str) -> Result<Option<usize>, MappingError> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, item) in explanations.iter().enumerate() {
        if item.is_null() {
            continue;
        }
        let len = text_of(item, field)?.chars().count();
        if best.is_none_or(|(_, max)| len > max) {
            best = Some((idx, len));
        }
    }
    Ok(best.map(|(idx, _)| idx))
}

/// Scalar-to-text coercion. Null is empty text; floats keep a trailing `.0` and booleans read
/// `True`/`False`. Lists, structs, bytes and images are not stringified: they fail the record.
fn text_of(value: &Value, field: &str) -> Result<String, MappingError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Utf8(s) => Ok(s.clone()),
        Value::Bool(true) => Ok("True".to_string()),
        Value::Bool(false) => Ok("False".to_string()),
        Value::Int64(v) => Ok(v.to_string()),
        Value::Float64(v) => Ok(float_text(*v)),
        other => Err(MappingError::NotText {
            field: field.to_string(),
            kind: value_kind(other),
        }),
    }
}

fn float_text(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{v:?}")
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int64(_) => "int",
        Value::Float64(_) => "float",
        Value::Utf8(_) => "string",
        Value::Binary(_) => "binary",
        Value::Image(_) => "image",
        Value::List(_) => "list",
        Value::Struct(_) => "struct",
    }
}

fn format_solution(explanation: &str, answer: &str) -> String {
    format!("{explanation}\n\nThe answer is \\boxed{{{answer}}}.")
}
