//! Count every configured incident type and assemble a [`CountReport`].
//!
//! The report always has exactly one entry per requested type, in request
//! order. A generative request that cannot be served (no counter
//! configured, or the model keeps failing) is re-run with the keyword
//! strategy and the entry records both strategies. Any other failure
//! becomes an explicit [`CountOutcome::Failed`] marker and the run moves
//! on to the next type.

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::CensusError;
use crate::models::{CountEntry, CountOutcome, CountReport, IncidentType, StrategyKind};
use crate::strategy::{RunContext, StrategyOutcome};

/// Errors after which a generative count is retried as a keyword count.
fn falls_back_to_keyword(err: &CensusError) -> bool {
    matches!(
        err,
        CensusError::Unavailable(_) | CensusError::Generation { .. }
    )
}

/// Count one incident type, falling back from `Generative` to `Keyword`
/// where allowed.
pub async fn count_one(
    ctx: &RunContext,
    incident_type: &IncidentType,
    requested: StrategyKind,
) -> CountEntry {
    let label = incident_type.label.as_str();
    let mut used = requested;

    let result = match requested.run(ctx, label).await {
        Err(e) if requested == StrategyKind::Generative && falls_back_to_keyword(&e) => {
            tracing::warn!(label, error = %e, "generative count unavailable, falling back to keyword");
            used = StrategyKind::Keyword;
            StrategyKind::Keyword.run(ctx, label).await
        }
        other => other,
    };

    let (outcome, rationale) = match result {
        Ok(StrategyOutcome { count, rationale }) => (CountOutcome::Counted(count), rationale),
        Err(e) => {
            tracing::error!(label, strategy = %used, error = %e, "counting failed");
            (CountOutcome::Failed(e.to_string()), None)
        }
    };

    CountEntry {
        label: incident_type.label.clone(),
        outcome,
        strategy_used: used,
        requested_strategy: requested,
        timestamp: Utc::now(),
        expected: incident_type.weight,
        rationale,
    }
}

/// Count every type in `types` with `requested`, up to
/// `ctx.concurrency` types at a time. Never fails: per-type errors are
/// recorded in the report.
pub async fn count_incident_types(
    ctx: &RunContext,
    types: &[IncidentType],
    requested: StrategyKind,
) -> CountReport {
    tracing::info!(
        types = types.len(),
        strategy = %requested,
        concurrency = ctx.concurrency,
        "counting incident types"
    );

    let entries: Vec<CountEntry> = stream::iter(types)
        .map(|t| count_one(ctx, t, requested))
        .buffered(ctx.concurrency.max(1))
        .collect()
        .await;

    let failed = entries.iter().filter(|e| e.is_failed()).count();
    let fell_back = entries.iter().filter(|e| e.fell_back()).count();
    tracing::info!(
        counted = entries.len() - failed,
        failed,
        fell_back,
        "counting finished"
    );

    CountReport {
        generated_at: Utc::now(),
        entries,
    }
}
