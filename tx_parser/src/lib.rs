//! Transaction classification: family-specific pattern matchers that turn a
//! raw transaction into typed transfers, a category and a direction.

pub mod context;
pub mod direction;
pub mod evm_classifier;
pub mod registry;
pub mod svm_classifier;

pub use context::{initiator, ClassifyContext};
pub use direction::{calculate_direction, transfer_direction, AssetFlows};
pub use evm_classifier::EvmClassifier;
pub use registry::ClassifierRegistry;
pub use svm_classifier::{ParserConfig, SvmClassifier, DEX_PROGRAM_IDS, LIQUID_STAKING_PROGRAM_IDS};
