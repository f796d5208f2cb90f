//! Currency rate resolution.

use std::cmp::Reverse;

use rust_decimal::Decimal;
use serde::Serialize;

use gera_common::{now, CurrencyPair, CurrencyRateId, CurrencyRateSnapshotId, ExternalRateId, RateSourceId};
use gera_store::{CurrencyRate, ExternalRate, RateMode, RateSource, ResolvedMode, View};

use crate::error::{RatesError, RatesResult};

/// The authoritative rate for a pair, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub currency_pair: CurrencyPair,
    pub rate_value: Decimal,
    pub mode: ResolvedMode,
    pub rate_source_id: Option<RateSourceId>,
    /// Contributing quotes in chain order.
    pub external_rate_ids: Vec<ExternalRateId>,
}

impl Resolution {
    pub fn into_currency_rate(self, snapshot_id: CurrencyRateSnapshotId) -> CurrencyRate {
        CurrencyRate {
            id: CurrencyRateId::new(),
            snapshot_id,
            currency_pair: self.currency_pair,
            rate_value: self.rate_value,
            mode: self.mode,
            rate_source_id: self.rate_source_id,
            external_rate_ids: self.external_rate_ids,
            created_at: now(),
        }
    }
}

fn direct(pair: &CurrencyPair, rate: &ExternalRate) -> Resolution {
    Resolution {
        currency_pair: pair.clone(),
        rate_value: rate.rate_value,
        mode: ResolvedMode::Direct,
        rate_source_id: Some(rate.source_id),
        external_rate_ids: vec![rate.id],
    }
}

/// First enabled source by descending priority, then key, quoting `pair`.
fn auto_direct<'a>(view: &View<'a>, pair: &CurrencyPair) -> Option<&'a ExternalRate> {
    let mut sources: Vec<&RateSource> = view.iter::<RateSource>().filter(|s| s.is_enabled).collect();
    sources.sort_by(|a, b| (Reverse(a.priority), &a.key).cmp(&(Reverse(b.priority), &b.key)));
    sources
        .into_iter()
        .find_map(|source| view.actual_external_rate(source.id, pair))
}

/// Resolve `pair` under the active mode generation.
pub fn resolve(view: &View<'_>, pair: &CurrencyPair) -> RatesResult<Resolution> {
    let unknown = || RatesError::UnknownPair(pair.clone());

    if pair.is_same() {
        return Ok(Resolution {
            currency_pair: pair.clone(),
            rate_value: Decimal::ONE,
            mode: ResolvedMode::Same,
            rate_source_id: None,
            external_rate_ids: Vec::new(),
        });
    }

    let active = view.active_mode_snapshot().ok_or_else(unknown)?;
    let mode = view.mode_for(active.id, pair).ok_or_else(unknown)?;

    match &mode.mode {
        RateMode::Direct {
            rate_source_id: Some(source_id),
        } => {
            let rate = view.actual_external_rate(*source_id, pair).ok_or_else(unknown)?;
            Ok(direct(pair, rate))
        }
        RateMode::Direct { rate_source_id: None } => {
            let rate = auto_direct(view, pair).ok_or_else(unknown)?;
            Ok(direct(pair, rate))
        }
        RateMode::Cross { legs } => {
            let mut rate_value = Decimal::ONE;
            let mut external_rate_ids = Vec::with_capacity(legs.len());
            for leg in legs {
                let rate = view
                    .actual_external_rate(leg.rate_source_id, &leg.currency_pair)
                    .ok_or_else(unknown)?;
                rate_value *= rate.rate_value;
                external_rate_ids.push(rate.id);
            }
            Ok(Resolution {
                currency_pair: pair.clone(),
                rate_value,
                mode: ResolvedMode::Cross,
                rate_source_id: None,
                external_rate_ids,
            })
        }
    }
}
