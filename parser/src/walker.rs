use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;

use crate::entry::EntryTree;
use crate::resolve::{resolve_unit, VarTree};
use crate::unit::CompileUnit;

/// Resolve every unit's variables on a bounded worker pool sized to the
/// available hardware parallelism.
pub fn resolve_symbols(
    trees: &[EntryTree],
    units: &[CompileUnit],
    max_depth: usize,
) -> Vec<VarTree> {
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    resolve_symbols_with_workers(trees, units, max_depth, workers)
}

/// Fan [`resolve_unit`] out across compile units.
///
/// Workers pull unit indices from a shared FIFO queue and write each result
/// into that unit's slot; nothing else is shared, so a unit's entry tree and
/// its output are only ever touched by the worker that claimed it. The
/// returned trees are in unit order regardless of completion order, and the
/// output is identical for any worker count.
pub fn resolve_symbols_with_workers(
    trees: &[EntryTree],
    units: &[CompileUnit],
    max_depth: usize,
    workers: usize,
) -> Vec<VarTree> {
    let count = trees.len().min(units.len());
    let workers = workers.max(1).min(count.max(1));

    let queue: Mutex<VecDeque<usize>> = Mutex::new((0..count).collect());
    let slots: Mutex<Vec<Option<VarTree>>> = Mutex::new((0..count).map(|_| None).collect());

    thread::scope(|s| {
        for _ in 0..workers {
            s.spawn(|| loop {
                let index = match queue.lock().unwrap().pop_front() {
                    Some(index) => index,
                    None => return,
                };
                let tree = resolve_unit(&trees[index], &units[index], max_depth);
                slots.lock().unwrap()[index] = Some(tree);
            });
        }
    });

    debug!("resolved symbols from {} units on {} workers", count, workers);

    slots
        .into_inner()
        .unwrap()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect()
}
