//! Incidence tables between mesh entities of two topological dimensions.
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::ops::{Index, Range};

/// Connectivity from entities of dimension `d0` to incident entities of dimension `d1`.
///
/// This is a ragged table: entity `i` of dimension `d0` is connected to the (ordered) sequence
/// of `d1`-entities given by `connectivity[i]`. Internally the table is stored as a flat index
/// array together with an offset array, so that each row can be accessed in constant time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    /// Offsets into `indices`, always of length `len() + 1`.
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl Debug for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity {
    /// Creates a connectivity without any entities.
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
        }
    }

    /// Creates a connectivity in which every entity is connected to exactly `entity_size`
    /// entities, given as a flat array (e.g. triangle → vertex connectivity with
    /// `entity_size == 3`).
    ///
    /// # Panics
    ///
    /// Panics if `entity_size` is zero or does not evenly divide the number of indices.
    pub fn from_uniform(entity_size: usize, indices: Vec<usize>) -> Self {
        assert!(entity_size > 0, "Entity size must be positive.");
        assert_eq!(
            indices.len() % entity_size,
            0,
            "Number of indices must be a multiple of the entity size."
        );
        let num_entities = indices.len() / entity_size;
        let offsets = (0..=num_entities).map(|i| i * entity_size).collect();
        Self { offsets, indices }
    }

    /// Creates a connectivity from raw offsets and indices.
    ///
    /// The offsets must be non-decreasing, start at zero and end at `indices.len()`.
    pub fn try_from_offsets_and_indices(offsets: Vec<usize>, indices: Vec<usize>) -> eyre::Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(eyre::eyre!("Connectivity offsets must start at zero"));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(eyre::eyre!("Connectivity offsets must be non-decreasing"));
        }
        if offsets.last() != Some(&indices.len()) {
            return Err(eyre::eyre!(
                "Last connectivity offset must equal the number of indices ({})",
                indices.len()
            ));
        }
        Ok(Self { offsets, indices })
    }

    /// Returns a data structure that can be used for appending single indices to a new entity.
    /// When the returned appender is dropped, the result is equivalent to adding the whole
    /// row at once with [`push`](Self::push).
    pub fn begin_entity(&mut self) -> EntityAppender<'_> {
        let initial_count = self.indices.len();
        EntityAppender {
            initial_count,
            indices: &mut self.indices,
            offsets: &mut self.offsets,
        }
    }

    /// Appends a new entity connected to the given indices.
    pub fn push(&mut self, connections: &[usize]) {
        self.indices.extend_from_slice(connections);
        self.offsets.push(self.indices.len());
    }

    /// The number of entities (rows) in the table.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of connections stored, summed over all entities.
    pub fn num_connections(&self) -> usize {
        self.indices.len()
    }

    /// The largest number of connections of a single entity.
    pub fn max_row_len(&self) -> usize {
        self.offsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }

    pub fn get(&self, index: usize) -> Option<&[usize]> {
        let range = self.row_range(index)?;
        self.indices.get(range)
    }

    fn row_range(&self, index: usize) -> Option<Range<usize>> {
        let begin = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        Some(begin..end)
    }

    pub fn iter<'a>(&'a self) -> impl 'a + ExactSizeIterator<Item = &'a [usize]> {
        self.offsets
            .windows(2)
            .map(move |w| &self.indices[w[0]..w[1]])
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// All connections of all entities, concatenated.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Computes the transposed connectivity.
    ///
    /// Given a connectivity `d0 → d1` and the number of `d1` entities, returns the connectivity
    /// `d1 → d0`. Each row of the result is sorted in ascending order.
    ///
    /// # Panics
    ///
    /// Panics if any index is not smaller than `num_targets`.
    pub fn transpose(&self, num_targets: usize) -> Connectivity {
        let mut counts = vec![0; num_targets];
        for &target in &self.indices {
            assert!(
                target < num_targets,
                "Connectivity index {} out of bounds for {} target entities",
                target,
                num_targets
            );
            counts[target] += 1;
        }

        let mut offsets = Vec::with_capacity(num_targets + 1);
        let mut total = 0;
        offsets.push(total);
        for count in &counts {
            total += count;
            offsets.push(total);
        }

        // Visiting sources in increasing order keeps every transposed row sorted
        let mut next_position = offsets[..num_targets].to_vec();
        let mut indices = vec![0; self.indices.len()];
        for (source, row) in self.iter().enumerate() {
            for &target in row {
                indices[next_position[target]] = source;
                next_position[target] += 1;
            }
        }

        Connectivity { offsets, indices }
    }

    /// A hash of the table contents.
    ///
    /// The hash is computed with a fixed hasher and is therefore stable across runs and
    /// processes, but distinct tables may still collide.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.offsets.hash(&mut hasher);
        self.indices.hash(&mut hasher);
        hasher.finish()
    }

    /// Informal string representation, listing every row when `verbose` is set.
    pub fn str(&self, verbose: bool) -> String {
        if verbose {
            let mut s = String::new();
            for (i, row) in self.iter().enumerate() {
                s.push_str(&format!("  {i}: {row:?}\n"));
            }
            s
        } else {
            format!(
                "<Connectivity of {} entities and {} connections>",
                self.len(),
                self.num_connections()
            )
        }
    }
}

impl Index<usize> for Connectivity {
    type Output = [usize];

    fn index(&self, index: usize) -> &[usize] {
        self.get(index)
            .expect("Entity index out of bounds for connectivity")
    }
}

#[derive(Debug)]
pub struct EntityAppender<'a> {
    indices: &'a mut Vec<usize>,
    offsets: &'a mut Vec<usize>,
    initial_count: usize,
}

impl<'a> EntityAppender<'a> {
    pub fn push_single(&mut self, index: usize) -> &mut Self {
        self.indices.push(index);
        self
    }

    pub fn count(&self) -> usize {
        self.indices.len() - self.initial_count
    }
}

impl<'a> Drop for EntityAppender<'a> {
    fn drop(&mut self) {
        self.offsets.push(self.indices.len());
    }
}

impl<'a> From<&'a [Vec<usize>]> for Connectivity {
    fn from(rows: &'a [Vec<usize>]) -> Self {
        let mut result = Self::new();
        for row in rows {
            result.push(row);
        }
        result
    }
}

impl From<Vec<Vec<usize>>> for Connectivity {
    fn from(rows: Vec<Vec<usize>>) -> Self {
        Self::from(rows.as_slice())
    }
}

impl<'a> From<&'a Connectivity> for Vec<Vec<usize>> {
    fn from(connectivity: &Connectivity) -> Self {
        connectivity.iter().map(|row| row.to_vec()).collect()
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.str(false))
    }
}
