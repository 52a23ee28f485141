//! Costly-chain preparation outcome
//!
//! A per-interface chain is prepared by flushing it and then creating it.
//! Exactly one of the two is expected to fail: the flush when the chain is
//! new, the create when it survived from an earlier run. Each address
//! family is judged on its own.

use netd_common::{IpFamily, NetdError, NetdResult};

/// Outcome of one flush/create attempt on one address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPrep {
    /// Flush failed, create succeeded: the chain did not exist.
    Created,
    /// Flush succeeded, create failed: the chain already existed.
    Reused,
    /// Both steps failed.
    BothFailed,
    /// Neither step failed, which means something else owns the name.
    NeitherFailed,
}

impl ChainPrep {
    /// Classifies one family's flush and create results.
    pub fn classify(flush_ok: bool, create_ok: bool) -> Self {
        match (flush_ok, create_ok) {
            (false, true) => ChainPrep::Created,
            (true, false) => ChainPrep::Reused,
            (false, false) => ChainPrep::BothFailed,
            (true, true) => ChainPrep::NeitherFailed,
        }
    }

    /// Returns true for the two expected outcomes.
    pub fn is_ok(&self) -> bool {
        matches!(self, ChainPrep::Created | ChainPrep::Reused)
    }

    /// Escalates unexpected outcomes to [`NetdError::ChainPreparation`].
    pub fn check(self, chain: &str, family: IpFamily) -> NetdResult<Self> {
        if self.is_ok() {
            return Ok(self);
        }
        let (flush_failed, create_failed) = match self {
            ChainPrep::BothFailed => (true, true),
            _ => (false, false),
        };
        Err(NetdError::ChainPreparation {
            chain: chain.to_string(),
            family: family.to_string(),
            flush_failed,
            create_failed,
        })
    }
}

/// Per-family results of flush then create, in family order.
#[derive(Debug, Default)]
pub struct PrepResults {
    flush: Vec<(IpFamily, bool)>,
    create: Vec<(IpFamily, bool)>,
}

impl PrepResults {
    pub fn record_flush(&mut self, family: IpFamily, ok: bool) {
        self.flush.push((family, ok));
    }

    pub fn record_create(&mut self, family: IpFamily, ok: bool) {
        self.create.push((family, ok));
    }

    /// Classifies every family and fails on the first unexpected outcome.
    pub fn evaluate(&self, chain: &str) -> NetdResult<Vec<(IpFamily, ChainPrep)>> {
        let mut outcomes = Vec::with_capacity(self.flush.len());
        for (family, flush_ok) in &self.flush {
            // A family whose create never ran counts as a failed create.
            let create_ok = self
                .create
                .iter()
                .find(|(f, _)| f == family)
                .map(|(_, ok)| *ok)
                .unwrap_or(false);
            let prep = ChainPrep::classify(*flush_ok, create_ok).check(chain, *family)?;
            outcomes.push((*family, prep));
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_exhaustive() {
        assert_eq!(ChainPrep::classify(false, true), ChainPrep::Created);
        assert_eq!(ChainPrep::classify(true, false), ChainPrep::Reused);
        assert_eq!(ChainPrep::classify(false, false), ChainPrep::BothFailed);
        assert_eq!(ChainPrep::classify(true, true), ChainPrep::NeitherFailed);
    }

    #[test]
    fn test_check_escalates() {
        assert!(ChainPrep::Created.check("bw_costly_a", IpFamily::V4).is_ok());
        assert!(ChainPrep::Reused.check("bw_costly_a", IpFamily::V4).is_ok());

        match ChainPrep::BothFailed.check("bw_costly_a", IpFamily::V6) {
            Err(NetdError::ChainPreparation {
                family,
                flush_failed,
                create_failed,
                ..
            }) => {
                assert_eq!(family, "IPv6");
                assert!(flush_failed && create_failed);
            }
            other => panic!("Expected ChainPreparation, got {:?}", other),
        }
        assert!(ChainPrep::NeitherFailed
            .check("bw_costly_a", IpFamily::V4)
            .is_err());
    }

    #[test]
    fn test_families_judged_independently() {
        // IPv4 chain is new, IPv6 chain survived: both fine.
        let mut results = PrepResults::default();
        results.record_flush(IpFamily::V4, false);
        results.record_flush(IpFamily::V6, true);
        results.record_create(IpFamily::V4, true);
        results.record_create(IpFamily::V6, false);

        let outcomes = results.evaluate("bw_costly_wlan0").unwrap();
        assert_eq!(
            outcomes,
            vec![
                (IpFamily::V4, ChainPrep::Created),
                (IpFamily::V6, ChainPrep::Reused)
            ]
        );
    }

    #[test]
    fn test_one_bad_family_fails() {
        let mut results = PrepResults::default();
        results.record_flush(IpFamily::V4, false);
        results.record_flush(IpFamily::V6, true);
        results.record_create(IpFamily::V4, true);
        results.record_create(IpFamily::V6, true);
        assert!(results.evaluate("bw_costly_wlan0").is_err());
    }
}
