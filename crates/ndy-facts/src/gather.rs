use tracing::warn;

use ndy_eligibility::{FactReading, RawFacts, Subject};

use crate::{FactError, FactProvider};

/// Fetch every evaluator fact for one subject.
///
/// Never fails: a provider error turns that one fact into
/// [`FactReading::Unknown`] and is logged. Normalisation then picks the most
/// restrictive value for it.
pub async fn gather_raw_facts(provider: &dyn FactProvider, subject: &Subject) -> RawFacts {
    let (guardrails, waiver, membership, balance, ov) = tokio::join!(
        provider.tenant_guardrails(subject.tenant_id),
        provider.waiver_signed(subject),
        provider.membership_status(subject),
        provider.token_balance(subject),
        provider.latest_override(subject),
    );

    RawFacts {
        guardrails: reading(provider, subject, "guardrails", guardrails),
        waiver_signed: reading(provider, subject, "waiver", waiver),
        membership: reading(provider, subject, "membership", membership),
        token_balance: reading(provider, subject, "token_balance", balance),
        override_fact: reading(provider, subject, "override", ov),
    }
}

fn reading<T>(
    provider: &dyn FactProvider,
    subject: &Subject,
    fact: &'static str,
    r: Result<T, FactError>,
) -> FactReading<T> {
    match r {
        Ok(v) => FactReading::Known(v),
        Err(err) => {
            warn!(
                provider = provider.name(),
                fact,
                tenant_id = %subject.tenant_id,
                user_id = %subject.user_id,
                error = %err,
                "fact unavailable; treating as unknown"
            );
            FactReading::Unknown
        }
    }
}
