//! Per-partner totals and dashboard filtering over merged rows.
//!
//! The builder is fed row by row, so it works the same over an in-memory
//! merge and over the chunks of a chunked merge.

use std::collections::{BTreeMap, BTreeSet};

use soil_trade_models::{MergedTradeSoilRecord, PartnerSummary};

#[derive(Debug, Default)]
struct PartnerTotals {
    name: String,
    total_quantity_tonnes: f64,
    items: BTreeSet<String>,
    reporters: BTreeSet<i32>,
    rows: u64,
    rows_with_soil: u64,
}

/// Accumulates a [`PartnerSummary`] per partner code.
#[derive(Debug, Default)]
pub struct PartnerSummaryBuilder {
    partners: BTreeMap<i32, PartnerTotals>,
}

impl PartnerSummaryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, row: &MergedTradeSoilRecord) {
        let totals = self.partners.entry(row.partner_code).or_default();
        if totals.name.is_empty() {
            totals.name.clone_from(&row.partner_name);
        }
        totals.total_quantity_tonnes += row.quantity_tonnes;
        if !totals.items.contains(&row.item) {
            totals.items.insert(row.item.clone());
        }
        totals.reporters.insert(row.reporter_code);
        totals.rows += 1;
        if row.has_soil() {
            totals.rows_with_soil += 1;
        }
    }

    pub fn extend<'a>(&mut self, rows: impl IntoIterator<Item = &'a MergedTradeSoilRecord>) {
        for row in rows {
            self.add(row);
        }
    }

    /// One summary per partner, ordered by partner code.
    #[must_use]
    pub fn build(self) -> Vec<PartnerSummary> {
        self.partners
            .into_iter()
            .map(|(partner_code, totals)| PartnerSummary {
                partner_code,
                partner_name: totals.name,
                total_quantity_tonnes: totals.total_quantity_tonnes,
                item_count: totals.items.len() as u64,
                reporter_count: totals.reporters.len() as u64,
                rows: totals.rows,
                rows_with_soil: totals.rows_with_soil,
            })
            .collect()
    }
}

/// Selects the rows exported to `partner` (code or case-insensitive name),
/// optionally restricted to one `item`.
#[must_use]
pub fn select<'a>(
    rows: &'a [MergedTradeSoilRecord],
    partner: &str,
    item: Option<&str>,
) -> Vec<&'a MergedTradeSoilRecord> {
    let code = partner.trim().parse::<i32>().ok();
    rows.iter()
        .filter(|row| {
            code.map_or_else(
                || row.partner_name.eq_ignore_ascii_case(partner.trim()),
                |code| row.partner_code == code,
            )
        })
        .filter(|row| item.is_none_or(|item| row.item.eq_ignore_ascii_case(item)))
        .collect()
}
