//! # ZAP Conformance Ground Truth
//!
//! ## Conformance Expression Invariants
//!
//! 1. **Closed Result Set**: Evaluating an expression yields exactly one of
//!    `mandatory`, `optional`, `provisional`, `notSupported`, `desc`, or a
//!    structured [`ConformanceError`]. Nothing else, and never a panic.
//!
//! 2. **Descriptive Wins**: An expression that mentions the `desc` term anywhere
//!    classifies as `desc`, even when the rest of it would not parse.
//!
//! 3. **Otherwise Chain**: Top-level commas separate alternatives tried left to
//!    right. Within an alternative, a bare condition that holds is mandatory and
//!    a `[condition]` that holds is optional. When nothing matches the element
//!    is not supported.
//!
//! 4. **Absent Means Disabled**: A term missing from the element map reads as
//!    false. Callers that must not act on unknown values ask
//!    [`check_missing_terms`] first.
//!
//! 5. **No Host Interpreter**: Boolean conditions are reduced by the parser in
//!    [`boolean`]. Expressions are never handed to a general-purpose evaluator.
//!
//! ## Feature Resolution Invariants
//!
//! 1. **Monotone Settling**: A feature key that was seeded or flipped is never
//!    revisited, so resolution terminates within `features + 1` passes.
//!
//! 2. **Only Mandatory and NotSupported Act**: Optional, provisional and
//!    descriptive results never flip a feature.
//!
//! 3. **Idempotence**: Resolving again, seeded with the keys of a previous run,
//!    changes nothing.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod boolean;
pub mod classifier;
pub mod error;
pub mod feature_map;
pub mod feature_update;
pub mod model;
pub mod options;
pub mod pics;
pub mod predicates;
pub mod resolver;
pub mod terms;

#[cfg(test)]
mod conformance_tests;

pub use boolean::{evaluate_alternatives, evaluate_boolean, evaluate_with_parentheses};
pub use classifier::{evaluate_conformance_expression, ConformanceEvaluator};
pub use error::*;
pub use feature_update::{
    check_conform_on_feature_update, describe_element_updates, element_conformance_notices,
    ConformanceElement, ElementKind, FeatureUpdateOutcome, FeatureUpdateRequest,
};
pub use model::{ConformanceResult, ElementMap, FeatureConformanceTable, FeatureUpdate};
pub use options::{EvaluatorOptions, SplitMode};
pub use pics::{validate_pics_expression, FilePicsLoader, PicsCache, PicsDatabase, PicsLoader};
pub use predicates::{check_missing_terms, filter_related_desc_elements, HasConformance};
pub use resolver::{fix_feature_conformance_recursively, FeatureResolver};
pub use terms::{check_if_expression_has_term, get_terms_from_expression};

#[cfg(feature = "napi")]
#[napi]
pub fn conformance_bridge() -> String {
    "ZAP Conformance Native Bridge Connected".to_string()
}
