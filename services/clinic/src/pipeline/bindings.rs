//! Which named policy instance guards which operation.

use crate::facade::OperationName;
use std::collections::{BTreeMap, HashMap};

/// Name of the shared limiter, circuit and retry instances.
pub const DEFAULT_POLICY: &str = "default";

/// Cache holding `findVets` results.
pub const VETS_CACHE: &str = "vets";

/// Cache holding `findPetTypes` results.
pub const PET_TYPES_CACHE: &str = "petTypes";

/// Policies bound to one operation. `None` leaves the policy out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationPolicy {
    /// Rate limiter instance
    pub rate_limiter: Option<String>,
    /// Circuit breaker instance
    pub circuit_breaker: Option<String>,
    /// Retry instance
    pub retry: Option<String>,
    /// Cache memoizing the result
    pub cache: Option<String>,
    /// Caches cleared after a successful call
    pub invalidates: Vec<String>,
}

impl OperationPolicy {
    fn guarded() -> Self {
        Self {
            rate_limiter: Some(DEFAULT_POLICY.to_string()),
            circuit_breaker: Some(DEFAULT_POLICY.to_string()),
            ..Self::default()
        }
    }

    /// Bind a retry instance.
    #[must_use]
    pub fn with_retry(mut self, name: impl Into<String>) -> Self {
        self.retry = Some(name.into());
        self
    }

    /// Bind a cache.
    #[must_use]
    pub fn with_cache(mut self, name: impl Into<String>) -> Self {
        self.cache = Some(name.into());
        self
    }

    /// Clear `name` after every successful call.
    #[must_use]
    pub fn invalidating(mut self, name: impl Into<String>) -> Self {
        self.invalidates.push(name.into());
        self
    }

    /// Remove the rate limiter.
    #[must_use]
    pub fn without_rate_limiter(mut self) -> Self {
        self.rate_limiter = None;
        self
    }

    /// Remove the circuit breaker.
    #[must_use]
    pub fn without_circuit_breaker(mut self) -> Self {
        self.circuit_breaker = None;
        self
    }
}

/// Operation to policy table, resolved once when the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyBindings {
    policies: BTreeMap<OperationName, OperationPolicy>,
}

impl Default for PolicyBindings {
    fn default() -> Self {
        let policies = OperationName::ALL
            .into_iter()
            .map(|op| {
                let mut policy = OperationPolicy::guarded();
                if !op.is_mutating() {
                    policy = policy.with_retry(DEFAULT_POLICY);
                }
                match op {
                    OperationName::FindVets => policy = policy.with_cache(VETS_CACHE),
                    OperationName::FindPetTypes => policy = policy.with_cache(PET_TYPES_CACHE),
                    _ => {}
                }
                (op, policy)
            })
            .collect();
        Self { policies }
    }
}

impl PolicyBindings {
    /// Bindings with no policy on any operation.
    #[must_use]
    pub fn unguarded() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    /// Replace the policies of `operation`.
    #[must_use]
    pub fn bind(mut self, operation: OperationName, policy: OperationPolicy) -> Self {
        self.policies.insert(operation, policy);
        self
    }

    /// Policies of `operation`, if any are bound.
    #[must_use]
    pub fn policy(&self, operation: OperationName) -> Option<&OperationPolicy> {
        self.policies.get(&operation)
    }

    /// Iterate over every bound operation.
    pub fn iter(&self) -> impl Iterator<Item = (OperationName, &OperationPolicy)> {
        self.policies.iter().map(|(op, policy)| (*op, policy))
    }

    /// Resolve one policy name per operation into shared instances.
    pub(crate) fn resolve<T>(
        &self,
        select: impl Fn(&OperationPolicy) -> Option<&String>,
        mut instance: impl FnMut(&str) -> T,
    ) -> HashMap<OperationName, T> {
        self.iter()
            .filter_map(|(op, policy)| select(policy).map(|name| (op, instance(name))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_is_guarded() {
        let bindings = PolicyBindings::default();
        for op in OperationName::ALL {
            let policy = bindings.policy(op).unwrap();
            assert_eq!(policy.rate_limiter.as_deref(), Some(DEFAULT_POLICY));
            assert_eq!(policy.circuit_breaker.as_deref(), Some(DEFAULT_POLICY));
        }
    }

    #[test]
    fn test_saves_are_not_retried() {
        let bindings = PolicyBindings::default();
        for op in OperationName::ALL {
            let retry = bindings.policy(op).unwrap().retry.as_deref();
            if op.is_mutating() {
                assert_eq!(retry, None, "{op}");
            } else {
                assert_eq!(retry, Some(DEFAULT_POLICY), "{op}");
            }
        }
    }

    #[test]
    fn test_only_reference_data_is_cached() {
        let bindings = PolicyBindings::default();
        let cached: Vec<_> = bindings
            .iter()
            .filter_map(|(op, p)| p.cache.as_deref().map(|c| (op, c)))
            .collect();
        assert_eq!(
            cached,
            vec![
                (OperationName::FindVets, VETS_CACHE),
                (OperationName::FindPetTypes, PET_TYPES_CACHE)
            ]
        );
    }

    #[test]
    fn test_resolve_shares_instances_by_name() {
        let bindings = PolicyBindings::default();
        let mut created = Vec::new();
        let resolved = bindings.resolve(
            |p| p.circuit_breaker.as_ref(),
            |name| {
                created.push(name.to_string());
                name.len()
            },
        );
        assert_eq!(resolved.len(), OperationName::ALL.len());
        assert!(created.iter().all(|n| n == DEFAULT_POLICY));
    }
}
