use chain_core::{ClassificationResult, RawTransaction};
use tracing::info;

use crate::context::ClassifyContext;
use crate::evm_classifier::EvmClassifier;
use crate::svm_classifier::{ParserConfig, SvmClassifier};

/// Routes a raw transaction to the classifier for its chain family
#[derive(Debug, Clone, Default)]
pub struct ClassifierRegistry {
    evm: EvmClassifier,
    svm: SvmClassifier,
}

impl ClassifierRegistry {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            evm: EvmClassifier::new(),
            svm: SvmClassifier::new(config),
        }
    }

    pub fn classify(&self, raw: &RawTransaction, ctx: &ClassifyContext) -> ClassificationResult {
        let result = match raw {
            RawTransaction::Evm(tx) => self.evm.classify(tx, ctx),
            RawTransaction::Svm(tx) => self.svm.classify(tx, ctx),
        };
        info!(
            "Classified {} on {} as {} ({}, {}) for {}",
            raw.hash(),
            raw.chain_alias(),
            result.classification_type.as_str(),
            result.direction.as_str(),
            result.confidence.as_str(),
            ctx.perspective_address
        );
        result
    }
}
