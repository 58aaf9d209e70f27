//! Offline evaluation of calibrated lists
//!
//! MAP and MRR compare lists against held-out interactions; MACE measures how
//! far every prefix of a list is from the user's target distribution.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{Distribution, RankedList, Transaction, UserId};

use super::distribution::{DistributionBuilder, WeightedRow};
use super::CalibrationError;

fn relevant_items(test_set: &[Transaction]) -> HashMap<&str, HashSet<&str>> {
    let mut relevant: HashMap<&str, HashSet<&str>> = HashMap::new();
    for transaction in test_set {
        relevant
            .entry(transaction.user_id.as_str())
            .or_default()
            .insert(transaction.item_id.as_str());
    }
    relevant
}

fn hits(list: &RankedList, relevant: Option<&HashSet<&str>>) -> Vec<bool> {
    list.items
        .iter()
        .map(|item| relevant.is_some_and(|items| items.contains(item.item_id.as_str())))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Mean over positions of the precision at that position
fn average_precision(hits: &[bool]) -> f64 {
    let mut relevant = 0usize;
    mean(hits.iter().enumerate().map(|(ix, hit)| {
        if *hit {
            relevant += 1;
        }
        relevant as f64 / (ix + 1) as f64
    }))
}

fn reciprocal_rank(hits: &[bool]) -> f64 {
    hits.iter()
        .position(|hit| *hit)
        .map(|ix| 1.0 / (ix + 1) as f64)
        .unwrap_or(0.0)
}

/// Mean average precision over every listed user
pub fn mean_average_precision(lists: &BTreeMap<UserId, RankedList>, test_set: &[Transaction]) -> f64 {
    let relevant = relevant_items(test_set);
    mean(lists
        .iter()
        .map(|(user_id, list)| average_precision(&hits(list, relevant.get(user_id.as_str())))))
}

/// Mean reciprocal rank of the first relevant item
pub fn mean_reciprocal_rank(lists: &BTreeMap<UserId, RankedList>, test_set: &[Transaction]) -> f64 {
    let relevant = relevant_items(test_set);
    mean(lists
        .iter()
        .map(|(user_id, list)| reciprocal_rank(&hits(list, relevant.get(user_id.as_str())))))
}

/// Mean absolute calibration error
///
/// For every cut-off `k` up to the longest list, the mean absolute gap
/// between each user's target and the distribution of their top `k` items is
/// averaged over users; the result is the mean over all cut-offs.
pub fn mean_absolute_calibration_error(
    builder: &DistributionBuilder,
    targets: &BTreeMap<UserId, Distribution>,
    lists: &BTreeMap<UserId, RankedList>,
) -> Result<f64, CalibrationError> {
    let mut rows = Vec::with_capacity(targets.len());
    for (user_id, target) in targets {
        let list = lists.get(user_id).ok_or_else(|| {
            CalibrationError::InvalidParameter(format!("no recommendation list for user {user_id}"))
        })?;

        let mut user_rows = Vec::with_capacity(list.len());
        for item in &list.items {
            user_rows.push(WeightedRow {
                genres: builder.catalog().genre_weights(&item.item_id)?,
                value: item.transaction_value,
                time: DistributionBuilder::list_time(item.order),
            });
        }
        rows.push((target, user_rows));
    }

    let longest = rows.iter().map(|(_, r)| r.len()).max().unwrap_or(0);

    let per_cutoff = (1..=longest).map(|k| {
        mean(rows.iter().map(|(target, user_rows)| {
            let prefix = &user_rows[..k.min(user_rows.len())];
            let realized = builder.build(prefix.iter().copied());
            mean(
                target
                    .values()
                    .iter()
                    .zip(realized.values())
                    .map(|(p, q)| (p - q).abs()),
            )
        }))
    });

    Ok(mean(per_cutoff))
}
