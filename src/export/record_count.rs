//! Rebuild node record counts from a dataset

use super::evaluator::ModelEvaluator;
use super::pmml::{MiningFunction, Node, PMMLDocument, ScoreDistribution};
use crate::error::{PmmlError, Result};
use crate::utils::data_loader::Record;
use tracing::{debug, info};

/// Resets record counts so they can be accumulated from scratch
#[derive(Debug, Default)]
pub struct RecordCountCleaner;

impl RecordCountCleaner {
    pub fn clean(&self, doc: &mut PMMLDocument) {
        for tree in doc.model.trees_mut() {
            tree.root.visit_mut(&mut Self::clean_node);
        }
    }

    fn clean_node(node: &mut Node) {
        node.record_count = Some(0.0);

        let score = node.score.clone();
        for dist in &mut node.score_distributions {
            dist.record_count = 0.0;
            dist.probability = Some(if score.as_deref() == Some(dist.value.as_str()) { 1.0 } else { 0.0 });
            dist.confidence = None;
        }
    }
}

/// Adds records to the node counts of a cleaned document
pub struct RecordCounter {
    evaluator: ModelEvaluator,
    records: usize,
}

impl RecordCounter {
    pub fn new(evaluator: ModelEvaluator) -> Self {
        Self { evaluator, records: 0 }
    }

    /// Records counted so far
    pub fn count(&self) -> usize {
        self.records
    }

    /// Score `record` and count it on every node of every decision path.
    /// For classification, the node's distribution entry for the record's
    /// actual target value is incremented too.
    pub fn accumulate(&mut self, record: &Record) -> Result<()> {
        let target = self.evaluator.target_field().to_string();
        let function = self.evaluator.function();

        let mut arguments = record.clone();
        let expected = arguments.remove(&target);

        let expected = match function {
            MiningFunction::Classification => Some(expected.ok_or_else(|| {
                PmmlError::EvaluationError(format!("record has no value for target '{}'", target))
            })?),
            MiningFunction::Regression => None,
        };

        let (_, paths) = self
            .evaluator
            .evaluate_with_paths(&arguments)
            .map_err(|e| PmmlError::EvaluationError(format!("record {}: {}", self.records, e)))?;

        let doc = self.document_mut();
        for (tree, path) in doc.model.trees_mut().into_iter().zip(paths) {
            let mut node = &mut tree.root;
            count_node(node, expected.as_deref());
            for idx in path {
                node = &mut node.children[idx];
                count_node(node, expected.as_deref());
            }
        }

        self.records += 1;
        Ok(())
    }

    fn document_mut(&mut self) -> &mut PMMLDocument {
        self.evaluator.document_mut()
    }

    pub fn into_document(self) -> PMMLDocument {
        self.evaluator.into_document()
    }
}

fn count_node(node: &mut Node, expected: Option<&str>) {
    node.record_count = Some(node.record_count.map_or(1.0, |c| c + 1.0));

    if let Some(value) = expected {
        let idx = match node.score_distributions.iter().position(|d| d.value == value) {
            Some(idx) => idx,
            None => {
                node.score_distributions.push(ScoreDistribution {
                    value: value.to_string(),
                    record_count: 0.0,
                    probability: None,
                    confidence: None,
                });
                node.score_distributions.len() - 1
            }
        };
        node.score_distributions[idx].record_count += 1.0;
    }
}

/// Reset and recount every node of `doc` from `records`
pub fn recount(mut doc: PMMLDocument, records: &[Record]) -> Result<PMMLDocument> {
    RecordCountCleaner.clean(&mut doc);

    let mut counter = RecordCounter::new(ModelEvaluator::new(doc)?);
    for record in records {
        counter.accumulate(record)?;
    }

    info!(records = counter.count(), "Record counts rebuilt");
    let doc = counter.into_document();
    debug!(trees = doc.model.trees().len(), "Recounted document");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::pmml::tests::sample_document;

    fn record(gender: &str, adjusted: &str) -> Record {
        [("Gender", gender), ("Adjusted", adjusted)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cleaner_resets_counts() {
        let mut doc = sample_document();
        RecordCountCleaner.clean(&mut doc);

        let tree = doc.model.trees()[0].clone();
        assert_eq!(tree.root.record_count, Some(0.0));
        let leaf = &tree.root.children[1];
        assert_eq!(leaf.score_distributions[0].record_count, 0.0);
        assert_eq!(leaf.score_distributions[0].probability, Some(0.0));
        assert_eq!(leaf.score_distributions[1].probability, Some(1.0));
    }

    #[test]
    fn test_recount() {
        let records = vec![record("Male", "1"), record("Male", "0"), record("Female", "0")];
        let doc = recount(sample_document(), &records).unwrap();

        let tree = doc.model.trees()[0].clone();
        assert_eq!(tree.root.record_count, Some(3.0));

        let female = &tree.root.children[0];
        let male = &tree.root.children[1];
        assert_eq!(female.record_count, Some(1.0));
        assert_eq!(male.record_count, Some(2.0));
        assert_eq!(male.score_distributions[0].record_count, 1.0);
        assert_eq!(male.score_distributions[1].record_count, 1.0);

        // The root had no distribution; one is created per observed class
        assert_eq!(tree.root.score_distributions.len(), 2);
        assert_eq!(tree.root.score_distributions[0].value, "1");
        assert_eq!(tree.root.score_distributions[0].record_count, 1.0);
    }

    #[test]
    fn test_recount_rejects_invalid_record() {
        let records = vec![record("Unknown", "1")];
        let result = recount(sample_document(), &records);
        assert!(matches!(result, Err(PmmlError::EvaluationError(_))));
    }
}
