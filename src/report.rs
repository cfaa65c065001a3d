//! Monthly category reports.
//!
//! `aggregate_monthly` is the grouping step (year, month, category -> count),
//! recomputed on every request. `ReportTable` pivots those rows into the
//! month x category grid with row, column and grand totals.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::models::EventCategory;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportKey {
    pub year: i32,
    pub month: u32,
    pub category: String,
}

impl ReportKey {
    /// `YYYY-MM`
    pub fn month_label(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MonthlyCount {
    #[serde(rename = "_id")]
    pub id: ReportKey,
    pub count: usize,
}

/// Group `(date, category)` pairs by year, month and category. Output is sorted
/// by year, then month, then category.
pub fn aggregate_monthly<I, D, C>(items: I) -> Vec<MonthlyCount>
where
    I: IntoIterator<Item = (D, C)>,
    D: Datelike,
    C: ToString,
{
    let mut groups: BTreeMap<ReportKey, usize> = BTreeMap::new();
    for (date, category) in items {
        let key = ReportKey {
            year: date.year(),
            month: date.month(),
            category: category.to_string(),
        };
        *groups.entry(key).or_default() += 1;
    }

    groups
        .into_iter()
        .map(|(id, count)| MonthlyCount { id, count })
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub month: String,
    pub counts: Vec<usize>,
    pub total: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportTable {
    pub categories: Vec<String>,
    pub labels: Vec<String>,
    pub rows: Vec<ReportRow>,
    pub totals: Vec<usize>,
    pub grand_total: usize,
}

impl ReportTable {
    /// Pivot with the studio's event categories as the leading columns.
    pub fn for_event_categories(rows: &[MonthlyCount]) -> Self {
        let known: Vec<(&str, &str)> = EventCategory::ALL
            .iter()
            .map(|c| (c.key(), c.label()))
            .collect();
        Self::pivot(rows, &known)
    }

    /// `known` is `(key, label)` in column order. Categories present in the
    /// data but not in `known` are appended (sorted, labelled by key) so every
    /// counted record lands in some column.
    pub fn pivot(rows: &[MonthlyCount], known: &[(&str, &str)]) -> Self {
        let mut categories: Vec<String> = known.iter().map(|(k, _)| k.to_string()).collect();
        let mut labels: Vec<String> = known.iter().map(|(_, l)| l.to_string()).collect();
        let extra: BTreeSet<&str> = rows
            .iter()
            .map(|r| r.id.category.as_str())
            .filter(|c| !categories.iter().any(|k| k == c))
            .collect();
        for category in extra {
            categories.push(category.to_string());
            labels.push(category.to_string());
        }

        let mut lookup: BTreeMap<String, BTreeMap<&str, usize>> = BTreeMap::new();
        for row in rows {
            *lookup
                .entry(row.id.month_label())
                .or_default()
                .entry(row.id.category.as_str())
                .or_default() += row.count;
        }

        let mut totals = vec![0; categories.len()];
        let table_rows: Vec<ReportRow> = lookup
            .into_iter()
            .map(|(month, by_category)| {
                let counts: Vec<usize> = categories
                    .iter()
                    .map(|c| by_category.get(c.as_str()).copied().unwrap_or(0))
                    .collect();
                for (total, count) in totals.iter_mut().zip(&counts) {
                    *total += count;
                }
                ReportRow {
                    month,
                    total: counts.iter().sum(),
                    counts,
                }
            })
            .collect();

        Self {
            grand_total: totals.iter().sum(),
            categories,
            labels,
            rows: table_rows,
            totals,
        }
    }

    /// Plain-text table with a trailing "Total" row.
    pub fn render(&self, title: &str) -> String {
        let mut header = vec!["Month".to_string()];
        header.extend(self.labels.iter().cloned());
        header.push("Total".to_string());

        let mut body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.month.clone()];
                cells.extend(row.counts.iter().map(usize::to_string));
                cells.push(row.total.to_string());
                cells
            })
            .collect();
        let mut footer = vec!["Total".to_string()];
        footer.extend(self.totals.iter().map(usize::to_string));
        footer.push(self.grand_total.to_string());
        body.push(footer);

        let widths: Vec<usize> = (0..header.len())
            .map(|i| {
                body.iter()
                    .map(|r| r[i].len())
                    .chain(std::iter::once(header[i].len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let _ = writeln!(out, "{title}");
        for line in std::iter::once(&header).chain(body.iter()) {
            let cells: Vec<String> = line
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect();
            let _ = writeln!(out, "{}", cells.join(" | ").trim_end());
        }
        out
    }
}
