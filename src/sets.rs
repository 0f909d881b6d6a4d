use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use lazy_static::lazy_static;
use crate::core::{DigitSet, SolveError};

lazy_static! {
    static ref INDEX_TABLES: Mutex<HashMap<usize, Arc<Vec<Vec<usize>>>>> =
        Mutex::new(HashMap::new());
    static ref SUM_TABLES: Mutex<HashMap<u8, Arc<BTreeMap<u32, Vec<DigitSet>>>>> =
        Mutex::new(HashMap::new());
}

/// All non-empty index subsets of `0..len`, smallest cardinality first.
/// Built once per length and shared process-wide; the enumeration order is
/// what makes `find_sets` prefer small (cheap, most constraining) sets.
fn index_table(len: usize) -> Arc<Vec<Vec<usize>>> {
    assert!(len <= 16, "set tables support at most 16 cells");
    let mut tables = INDEX_TABLES.lock().unwrap();
    Arc::clone(tables.entry(len).or_insert_with(|| {
        let mut by_cardinality: Vec<Vec<Vec<usize>>> = vec![Vec::new(); len];
        for mask in 1u32..(1 << len) {
            let indices: Vec<usize> = (0..len).filter(|b| mask & (1 << b) != 0).collect();
            by_cardinality[indices.len() - 1].push(indices);
        }
        Arc::new(by_cardinality.into_iter().flatten().collect())
    }))
}

/// A group of cells (by index into the scanned slice) whose candidate
/// union is exactly as large as the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitGroup {
    pub indices: Vec<usize>,
    pub mask: DigitSet,
}

/// Finds all inclusion-maximal index subsets whose candidate union has
/// cardinality equal to the subset size, eliminating each found group's
/// mask from every other cell in place as it goes; the indices left over
/// at the end form one final group. Because the subset enumeration runs
/// smallest-cardinality-first, this single routine performs both naked-set
/// and hidden-set elimination. Fails with `InvalidSets` if an elimination
/// empties a cell.
pub fn find_sets(cells: &mut [DigitSet]) -> Result<Vec<DigitGroup>, SolveError> {
    let table = index_table(cells.len());
    let mut used = vec![false; cells.len()];
    let mut result: Vec<DigitGroup> = Vec::with_capacity(2);
    'outer: for subset in table.iter() {
        let mut mask = DigitSet::empty();
        for &i in subset {
            if used[i] {
                continue 'outer;
            }
            mask = mask.or(cells[i]);
        }
        if mask.count() as usize != subset.len() {
            continue;
        }
        for (n, cell) in cells.iter_mut().enumerate() {
            if subset.binary_search(&n).is_ok() {
                continue;
            }
            *cell = cell.minus(mask);
            if cell.is_empty() {
                return Err(SolveError::InvalidSets);
            }
        }
        for &i in subset {
            used[i] = true;
        }
        result.push(DigitGroup { indices: subset.clone(), mask });
    }
    let rest: Vec<usize> = (0..cells.len()).filter(|&i| !used[i]).collect();
    if !rest.is_empty() {
        let mut mask = DigitSet::empty();
        for &i in &rest {
            mask = mask.or(cells[i]);
        }
        result.push(DigitGroup { indices: rest, mask });
    }
    Ok(result)
}

/// Every subset of a `1..=alphabet` digit alphabet, recorded under its
/// digit sum. Built once per alphabet size and shared process-wide; sum
/// strategies filter it down to their own cell count and target.
pub fn sum_masks(alphabet: u8) -> Arc<BTreeMap<u32, Vec<DigitSet>>> {
    let mut tables = SUM_TABLES.lock().unwrap();
    Arc::clone(tables.entry(alphabet).or_insert_with(|| {
        let mut map: BTreeMap<u32, Vec<DigitSet>> = BTreeMap::new();
        fn grow(map: &mut BTreeMap<u32, Vec<DigitSet>>, alphabet: u8, cur: DigitSet, sum: u32, start: u8) {
            for v in start..=alphabet {
                let next = cur.with(v);
                let next_sum = sum + v as u32;
                map.entry(next_sum).or_default().push(next);
                grow(map, alphabet, next, next_sum, v + 1);
            }
        }
        grow(&mut map, alphabet, DigitSet::empty(), 0, 1);
        Arc::new(map)
    }))
}
