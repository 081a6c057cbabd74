//! Fail-safe policy for optional collaborators
//!
//! Every service in the pipeline holds its collaborators as `Dependency<T>`.
//! What happens when a collaborator is missing is decided in one place,
//! `FAIL_SAFE_POLICY`: either the operation that needs it is blocked with a
//! fixed reason, or the step that uses it is skipped.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Collaborators a service may be wired without
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SecurityLookup,
    PositionLookup,
    PendingOrderLookup,
    MarketHours,
    CashBalance,
    CurrencyConverter,
    QuoteSource,
    ReferencePrice,
    OrderBookSource,
    OrderBookValidator,
    SafetyGate,
    OrderPlacement,
    RetryStore,
    TradeExecutor,
    TradeRecorder,
    Settings,
}

impl Capability {
    pub const ALL: [Capability; 16] = [
        Capability::SecurityLookup,
        Capability::PositionLookup,
        Capability::PendingOrderLookup,
        Capability::MarketHours,
        Capability::CashBalance,
        Capability::CurrencyConverter,
        Capability::QuoteSource,
        Capability::ReferencePrice,
        Capability::OrderBookSource,
        Capability::OrderBookValidator,
        Capability::SafetyGate,
        Capability::OrderPlacement,
        Capability::RetryStore,
        Capability::TradeExecutor,
        Capability::TradeRecorder,
        Capability::Settings,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnAbsent {
    /// Refuse the operation
    Block,
    /// Skip the step and carry on
    Allow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailSafeRule {
    pub capability: Capability,
    pub on_absent: OnAbsent,
    pub reason: &'static str,
}

pub const FAIL_SAFE_POLICY: &[FailSafeRule] = &[
    FailSafeRule {
        capability: Capability::SecurityLookup,
        on_absent: OnAbsent::Block,
        reason: "security repository not available",
    },
    FailSafeRule {
        capability: Capability::PositionLookup,
        on_absent: OnAbsent::Block,
        reason: "position repository not available",
    },
    FailSafeRule {
        capability: Capability::PendingOrderLookup,
        on_absent: OnAbsent::Block,
        reason: "trade repository not available",
    },
    FailSafeRule {
        capability: Capability::MarketHours,
        on_absent: OnAbsent::Allow,
        reason: "market hours service not available, skipping market hours check",
    },
    FailSafeRule {
        capability: Capability::CashBalance,
        on_absent: OnAbsent::Block,
        reason: "cash balance service not available, blocking BUY for safety",
    },
    FailSafeRule {
        capability: Capability::CurrencyConverter,
        on_absent: OnAbsent::Allow,
        reason: "currency exchange service not available, using unconverted fixed fee",
    },
    FailSafeRule {
        capability: Capability::QuoteSource,
        on_absent: OnAbsent::Block,
        reason: "quote source not available",
    },
    FailSafeRule {
        capability: Capability::ReferencePrice,
        on_absent: OnAbsent::Block,
        reason: "reference price source not available",
    },
    FailSafeRule {
        capability: Capability::OrderBookSource,
        on_absent: OnAbsent::Block,
        reason: "order book source not available",
    },
    FailSafeRule {
        capability: Capability::OrderBookValidator,
        on_absent: OnAbsent::Allow,
        reason: "order book validator not available, pricing from estimated price",
    },
    FailSafeRule {
        capability: Capability::SafetyGate,
        on_absent: OnAbsent::Block,
        reason: "safety service not available",
    },
    FailSafeRule {
        capability: Capability::OrderPlacement,
        on_absent: OnAbsent::Block,
        reason: "broker not available",
    },
    FailSafeRule {
        capability: Capability::RetryStore,
        on_absent: OnAbsent::Block,
        reason: "trade repository not available",
    },
    FailSafeRule {
        capability: Capability::TradeExecutor,
        on_absent: OnAbsent::Block,
        reason: "trade execution service not available",
    },
    FailSafeRule {
        capability: Capability::TradeRecorder,
        on_absent: OnAbsent::Allow,
        reason: "trade recorder not available, trade not recorded",
    },
    FailSafeRule {
        capability: Capability::Settings,
        on_absent: OnAbsent::Allow,
        reason: "settings not available, using defaults",
    },
];

/// Capabilities missing from the table are treated as hard dependencies
const UNLISTED_RULE: FailSafeRule = FailSafeRule {
    capability: Capability::Settings,
    on_absent: OnAbsent::Block,
    reason: "required dependency not available",
};

pub fn rule_for(capability: Capability) -> FailSafeRule {
    FAIL_SAFE_POLICY
        .iter()
        .find(|rule| rule.capability == capability)
        .copied()
        .unwrap_or(FailSafeRule {
            capability,
            ..UNLISTED_RULE
        })
}

/// A hard dependency was missing
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{reason}")]
pub struct DependencyUnavailable {
    pub capability: Capability,
    pub reason: &'static str,
}

/// Optional collaborator tagged with the capability it provides
pub struct Dependency<T: ?Sized> {
    capability: Capability,
    inner: Option<Arc<T>>,
}

impl<T: ?Sized> Dependency<T> {
    pub fn new(capability: Capability, inner: Option<Arc<T>>) -> Self {
        Self { capability, inner }
    }

    pub fn present(capability: Capability, inner: Arc<T>) -> Self {
        Self::new(capability, Some(inner))
    }

    pub fn absent(capability: Capability) -> Self {
        Self::new(capability, None)
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn is_present(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get(&self) -> Option<&Arc<T>> {
        self.inner.as_ref()
    }

    /// Apply the fail-safe rule. `Ok(None)` means the step should be skipped.
    pub fn resolve(&self) -> Result<Option<&Arc<T>>, DependencyUnavailable> {
        match &self.inner {
            Some(inner) => Ok(Some(inner)),
            None => {
                let rule = rule_for(self.capability);
                match rule.on_absent {
                    OnAbsent::Block => Err(DependencyUnavailable {
                        capability: self.capability,
                        reason: rule.reason,
                    }),
                    OnAbsent::Allow => {
                        tracing::debug!("{}", rule.reason);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Like `resolve`, for call sites that cannot continue without the
    /// collaborator regardless of policy.
    pub fn require(&self) -> Result<&Arc<T>, DependencyUnavailable> {
        match self.resolve()? {
            Some(inner) => Ok(inner),
            None => Err(DependencyUnavailable {
                capability: self.capability,
                reason: rule_for(self.capability).reason,
            }),
        }
    }
}

impl<T: ?Sized> Clone for Dependency<T> {
    fn clone(&self) -> Self {
        Self {
            capability: self.capability,
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Dependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("capability", &self.capability)
            .field("present", &self.inner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Echo: std::fmt::Debug + Send + Sync {
        fn ping(&self) -> u32;
    }

    #[derive(Debug)]
    struct Pong;

    impl Echo for Pong {
        fn ping(&self) -> u32 {
            7
        }
    }

    #[test]
    fn test_every_capability_has_exactly_one_rule() {
        for capability in Capability::ALL {
            let count = FAIL_SAFE_POLICY
                .iter()
                .filter(|rule| rule.capability == capability)
                .count();
            assert_eq!(count, 1, "{:?}", capability);
        }
        assert_eq!(FAIL_SAFE_POLICY.len(), Capability::ALL.len());
    }

    #[test]
    fn test_hard_and_soft_tiers() {
        assert_eq!(rule_for(Capability::SecurityLookup).on_absent, OnAbsent::Block);
        assert_eq!(rule_for(Capability::PendingOrderLookup).on_absent, OnAbsent::Block);
        assert_eq!(rule_for(Capability::CashBalance).on_absent, OnAbsent::Block);
        assert_eq!(rule_for(Capability::MarketHours).on_absent, OnAbsent::Allow);
        assert_eq!(rule_for(Capability::CurrencyConverter).on_absent, OnAbsent::Allow);
    }

    #[test]
    fn test_absent_hard_dependency_blocks_with_reason() {
        let dep: Dependency<dyn Echo> = Dependency::absent(Capability::SecurityLookup);
        let err = dep.resolve().unwrap_err();
        assert_eq!(err.to_string(), "security repository not available");
        assert_eq!(err.capability, Capability::SecurityLookup);
    }

    #[test]
    fn test_absent_soft_dependency_is_skipped() {
        let dep: Dependency<dyn Echo> = Dependency::absent(Capability::MarketHours);
        assert!(dep.resolve().unwrap().is_none());
        assert!(dep.require().is_err());
    }

    #[test]
    fn test_present_dependency_resolves() {
        let dep: Dependency<dyn Echo> = Dependency::present(Capability::SecurityLookup, Arc::new(Pong));
        assert_eq!(dep.resolve().unwrap().unwrap().ping(), 7);
        assert_eq!(dep.require().unwrap().ping(), 7);
        assert!(dep.clone().is_present());
    }
}
