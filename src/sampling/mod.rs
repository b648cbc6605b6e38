// Stratified sampling with proportional allocation.
// Used to draw evaluation subsets that keep every product represented.


use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplingError {
    #[error("Sample size {requested} exceeds the {available} available items")]
    SampleTooLarge { requested: usize, available: usize },
    #[error("Sample size {requested} cannot represent all {classes} classes")]
    TooManyClasses { requested: usize, classes: usize },
}

/// Split `sample_size` across classes in proportion to `counts`.
///
/// Each class gets the floor of its proportional share, at least one item,
/// and never more than it has. Any remainder goes one item at a time to the
/// classes in order of decreasing size, ties broken by label order.
#[inline]
pub fn allocate<L: Ord + Clone>(
    counts: &BTreeMap<L, usize>,
    sample_size: usize,
) -> Result<BTreeMap<L, usize>, SamplingError> {
    let total: usize = counts.values().sum();
    if sample_size > total {
        return Err(SamplingError::SampleTooLarge {
            requested: sample_size,
            available: total,
        });
    }

    let classes: Vec<(&L, usize)> = counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(label, count)| (label, *count))
        .collect();
    if sample_size < classes.len() {
        return Err(SamplingError::TooManyClasses {
            requested: sample_size,
            classes: classes.len(),
        });
    }

    // Largest first; the sort is stable so equal sizes keep label order
    let mut by_size = classes.clone();
    by_size.sort_by(|a, b| b.1.cmp(&a.1));

    let mut allocation: BTreeMap<&L, usize> = classes
        .iter()
        .map(|&(label, count)| (label, (count * sample_size / total).max(1)))
        .collect();

    let mut assigned: usize = allocation.values().sum();

    // The one-per-class minimum can overshoot; take back from the largest shares
    while assigned > sample_size {
        let Some((label, _)) = by_size
            .iter()
            .filter(|(label, _)| allocation[label] > 1)
            .max_by_key(|(label, _)| allocation[label])
        else {
            break;
        };
        if let Some(share) = allocation.get_mut(label) {
            *share -= 1;
            assigned -= 1;
        }
    }

    while assigned < sample_size {
        let before = assigned;
        for &(label, count) in &by_size {
            if assigned == sample_size {
                break;
            }
            if let Some(share) = allocation.get_mut(label) {
                if *share < count {
                    *share += 1;
                    assigned += 1;
                }
            }
        }
        if assigned == before {
            break;
        }
    }

    Ok(allocation
        .into_iter()
        .map(|(label, share)| (label.clone(), share))
        .collect())
}

/// Draw `sample_size` items with every class represented proportionally.
///
/// Deterministic for a given `seed`. The result is shuffled so classes are interleaved.
#[inline]
pub fn stratified_sample<T, L, F>(
    items: &[T],
    label_fn: F,
    sample_size: usize,
    seed: u64,
) -> Result<Vec<T>, SamplingError>
where
    T: Clone,
    L: Ord + Clone,
    F: Fn(&T) -> L,
{
    let mut groups: BTreeMap<L, Vec<usize>> = BTreeMap::new();
    for (i, item) in items.iter().enumerate() {
        groups.entry(label_fn(item)).or_default().push(i);
    }

    let counts = groups
        .iter()
        .map(|(label, members)| (label.clone(), members.len()))
        .collect();
    let allocation = allocate(&counts, sample_size)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked: Vec<usize> = Vec::with_capacity(sample_size);
    for (label, members) in &groups {
        let share = allocation.get(label).copied().unwrap_or(0);
        picked.extend(members.choose_multiple(&mut rng, share).copied());
    }
    picked.shuffle(&mut rng);

    debug!(
        "Sampled {} of {} items across {} classes",
        picked.len(),
        items.len(),
        groups.len()
    );

    Ok(picked.into_iter().map(|i| items[i].clone()).collect())
}
