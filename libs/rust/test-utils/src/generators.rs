//! Shared proptest generators.
//!
//! This module provides reusable generators for the inputs and outcome
//! sequences exercised by the clinic property tests.

use clinic_common::{ClinicError, ErrorClass, RequestContext};
use proptest::prelude::*;
use std::time::Duration;

/// Generate telephone numbers of 1 to 12 digits.
pub fn telephone_strategy() -> impl Strategy<Value = String> {
    "[0-9]{1,12}"
}

/// Generate street addresses.
pub fn address_strategy() -> impl Strategy<Value = String> {
    (1u32..9999, "[A-Z][a-z]{2,12}", prop_oneof![
        Just("Street"),
        Just("Avenue"),
        Just("Road"),
        Just("Lane"),
    ])
        .prop_map(|(number, name, kind)| format!("{number} {name} {kind}"))
}

/// Generate an optional authenticated principal.
pub fn principal_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-z]{3,12}")
}

/// Generate request contexts with optional correlation id and principal.
pub fn request_context_strategy() -> impl Strategy<Value = RequestContext> {
    (prop::option::of("[a-f0-9]{8}"), principal_strategy()).prop_map(|(correlation, principal)| {
        RequestContext {
            correlation_id: correlation,
            principal,
        }
    })
}

/// Generate a failure class.
pub fn error_class_strategy() -> impl Strategy<Value = ErrorClass> {
    prop_oneof![
        Just(ErrorClass::Transient),
        Just(ErrorClass::Rejected),
        Just(ErrorClass::Validation),
        Just(ErrorClass::Fatal),
    ]
}

/// Build a representative error of the given class.
#[must_use]
pub fn error_of_class(class: ErrorClass) -> ClinicError {
    match class {
        ErrorClass::Transient => ClinicError::unavailable("generated"),
        ErrorClass::Rejected => ClinicError::rate_limited("generated", Duration::from_millis(25)),
        ErrorClass::Validation => ClinicError::invalid_input("generated"),
        ErrorClass::Fatal => ClinicError::internal("generated"),
    }
}

/// Generate call outcomes: `None` for success, `Some(class)` for a failure.
pub fn outcome_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Option<ErrorClass>>> {
    prop::collection::vec(prop::option::of(error_class_strategy()), 0..max_len)
}
