//! Overflow handling: quadratic node splitting and victim selection for
//! forced reinsertion.

use crate::node::{Branch, Node};
use crate::rect::{CoverMetric, Rect};

/// Splits an overflowing set of branches into two groups using Guttman's
/// quadratic algorithm.
///
/// Both groups end up with at least `min_fill` branches, so `branches` must
/// hold at least `2 * min_fill` of them. The first group keeps the first
/// seed and is meant to stay in the node that overflowed.
pub fn quadratic_split(
    branches: Vec<Branch>,
    min_fill: usize,
    metric: CoverMetric,
) -> (Vec<Branch>, Vec<Branch>) {
    let count = branches.len();
    debug_assert!(count >= 2 && count >= 2 * min_fill);

    let (seed0, seed1) = pick_seeds(&branches, metric);
    let mut assigned = vec![false; count];
    assigned[seed0] = true;
    assigned[seed1] = true;
    let mut groups = [vec![branches[seed0]], vec![branches[seed1]]];
    let mut covers = [branches[seed0].rect, branches[seed1].rect];
    let mut remaining = count - 2;

    while remaining > 0 {
        // A group that needs every remaining branch to reach the minimum
        // takes all of them.
        if let Some(group) = (0..2).find(|&g| groups[g].len() + remaining <= min_fill) {
            for (index, branch) in branches.iter().enumerate() {
                if !assigned[index] {
                    assigned[index] = true;
                    covers[group].expand(&branch.rect);
                    groups[group].push(*branch);
                }
            }
            break;
        }

        let Some((index, group)) = pick_next(&branches, &assigned, &covers, &groups, metric) else {
            break;
        };
        assigned[index] = true;
        covers[group].expand(&branches[index].rect);
        groups[group].push(branches[index]);
        remaining -= 1;
    }

    let [first, second] = groups;
    (first, second)
}

/// The pair of branches that would waste the most space if covered
/// together. Ties keep the earliest pair.
fn pick_seeds(branches: &[Branch], metric: CoverMetric) -> (usize, usize) {
    let mut best = (0, 1);
    let mut worst_waste = f64::NEG_INFINITY;
    for i in 0..branches.len() {
        for j in (i + 1)..branches.len() {
            let waste = metric.waste(&branches[i].rect, &branches[j].rect);
            if waste > worst_waste {
                worst_waste = waste;
                best = (i, j);
            }
        }
    }
    best
}

/// The unassigned branch with the strongest preference for one group, and
/// the group it prefers. Ties keep the earliest branch.
fn pick_next(
    branches: &[Branch],
    assigned: &[bool],
    covers: &[Rect; 2],
    groups: &[Vec<Branch>; 2],
    metric: CoverMetric,
) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (index, branch) in branches.iter().enumerate() {
        if assigned[index] {
            continue;
        }
        let grow0 = metric.enlargement(&covers[0], &branch.rect);
        let grow1 = metric.enlargement(&covers[1], &branch.rect);
        let preference = (grow0 - grow1).abs();
        if best.is_none_or(|(_, _, strongest)| preference > strongest) {
            let group = preferred_group(grow0, grow1, groups[0].len(), groups[1].len());
            best = Some((index, group, preference));
        }
    }
    best.map(|(index, group, _)| (index, group))
}

/// Least enlargement wins, then the smaller group, then group 0.
fn preferred_group(grow0: f64, grow1: f64, len0: usize, len1: usize) -> usize {
    if grow0 < grow1 {
        0
    } else if grow1 < grow0 {
        1
    } else if len1 < len0 {
        1
    } else {
        0
    }
}

/// Removes the `count` branches whose centres lie farthest from the centre
/// of the node's cover and returns them, farthest first. Equal distances
/// give up the earlier branch first. The remaining branches keep their
/// order.
pub fn take_farthest(node: &mut Node, count: usize, ndims: usize) -> Vec<Branch> {
    let count = count.min(node.len());
    let cover = node.cover(ndims);
    let mut order: Vec<(usize, f64)> = node
        .branches
        .iter()
        .enumerate()
        .map(|(index, branch)| (index, branch.rect.center_distance_sq(&cover)))
        .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    order.truncate(count);

    let victims = order.iter().map(|&(index, _)| node.branches[index]).collect();
    let mut doomed: Vec<usize> = order.into_iter().map(|(index, _)| index).collect();
    doomed.sort_unstable();
    for index in doomed.into_iter().rev() {
        node.branches.remove(index);
    }
    victims
}
