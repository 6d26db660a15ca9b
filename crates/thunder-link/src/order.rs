//! Callee-before-caller ordering of a unit's functions.

use std::collections::{BTreeMap, BTreeSet};

use thunder_ir::CallableId;

/// Sorts the functions of `dependencies` (function -> callees) so that every
/// callee precedes its callers, using Kahn's algorithm with the lowest id
/// first among ready functions.
///
/// On a cycle, returns the functions that could not be placed.
pub fn callee_first(
    dependencies: &BTreeMap<CallableId, BTreeSet<CallableId>>,
) -> Result<Vec<CallableId>, Vec<CallableId>> {
    let mut pending: BTreeMap<CallableId, usize> = BTreeMap::new();
    let mut callers: BTreeMap<CallableId, Vec<CallableId>> = BTreeMap::new();
    for (&caller, callees) in dependencies {
        pending.insert(caller, callees.len());
        for &callee in callees {
            callers.entry(callee).or_default().push(caller);
        }
    }

    let mut ready: BTreeSet<CallableId> = pending
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut order = Vec::with_capacity(pending.len());

    while let Some(id) = ready.pop_first() {
        order.push(id);
        for caller in callers.get(&id).into_iter().flatten() {
            if let Some(count) = pending.get_mut(caller) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*caller);
                }
            }
        }
    }

    if order.len() != pending.len() {
        let placed: BTreeSet<CallableId> = order.into_iter().collect();
        return Err(pending.into_keys().filter(|id| !placed.contains(id)).collect());
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(u32, &[u32])]) -> BTreeMap<CallableId, BTreeSet<CallableId>> {
        edges
            .iter()
            .map(|&(caller, callees)| {
                (
                    CallableId(caller),
                    callees.iter().map(|&c| CallableId(c)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn callees_come_first() {
        let deps = graph(&[(0, &[1, 2]), (1, &[2]), (2, &[])]);
        let order = callee_first(&deps).unwrap();
        assert_eq!(order, vec![CallableId(2), CallableId(1), CallableId(0)]);
    }

    #[test]
    fn independent_functions_by_id() {
        let deps = graph(&[(5, &[]), (3, &[]), (4, &[3])]);
        let order = callee_first(&deps).unwrap();
        assert_eq!(order, vec![CallableId(3), CallableId(4), CallableId(5)]);
    }

    #[test]
    fn cycle_reports_members() {
        let deps = graph(&[(0, &[1]), (1, &[2]), (2, &[1]), (3, &[])]);
        let stuck = callee_first(&deps).unwrap_err();
        assert_eq!(stuck, vec![CallableId(0), CallableId(1), CallableId(2)]);
    }

    #[test]
    fn self_recursion_is_a_cycle() {
        let deps = graph(&[(7, &[7])]);
        assert_eq!(callee_first(&deps).unwrap_err(), vec![CallableId(7)]);
    }
}
