//! Row-to-container allocation
//!
//! Containers are filled in declaration order, each taking up to its
//! capacity from the rows not yet assigned. The last container is the
//! overflow sink: it takes every remaining row whatever its stated capacity.
//! A single-container batch is the degenerate case of one sink.
use std::ops::Range;

use crate::model::Capacity;

/// Contiguous run of rows assigned to one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub container: usize,
    pub rows: Range<usize>,
}

/// Where a row lands: container index and position within that container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub container: usize,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerAllocator {
    allocations: Vec<Allocation>,
}

impl ContainerAllocator {
    pub fn new(capacities: &[Capacity], total_rows: usize) -> Self {
        let mut allocations = Vec::with_capacity(capacities.len());
        let mut next = 0;

        for (container, capacity) in capacities.iter().enumerate() {
            let remaining = total_rows - next;
            let is_last = container + 1 == capacities.len();
            let take = match capacity {
                _ if is_last => remaining,
                Capacity::Fixed(n) => (*n).min(remaining),
                Capacity::Unbounded => {
                    if remaining > 0 {
                        tracing::warn!(
                            container,
                            "unbounded container is not last; later containers receive no rows"
                        );
                    }
                    remaining
                }
            };
            allocations.push(Allocation {
                container,
                rows: next..next + take,
            });
            next += take;
        }

        ContainerAllocator { allocations }
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Rows of one container
    pub fn rows_for(&self, container: usize) -> Range<usize> {
        self.allocations
            .get(container)
            .map(|a| a.rows.clone())
            .unwrap_or(0..0)
    }

    /// Container and in-container index for `row`; `None` when no container
    /// takes it (only possible with zero containers)
    pub fn slot_for(&self, row: usize) -> Option<Slot> {
        let i = self
            .allocations
            .partition_point(|a| a.rows.end <= row);
        let allocation = self.allocations.get(i)?;
        allocation.rows.contains(&row).then(|| Slot {
            container: allocation.container,
            index: row - allocation.rows.start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned(alloc: &ContainerAllocator) -> Vec<Vec<usize>> {
        alloc
            .allocations()
            .iter()
            .map(|a| a.rows.clone().collect())
            .collect()
    }

    #[test]
    fn test_fixed_then_unbounded() {
        let alloc = ContainerAllocator::new(&[Capacity::Fixed(3), Capacity::Unbounded], 5);
        assert_eq!(assigned(&alloc), vec![vec![0, 1, 2], vec![3, 4]]);
        assert_eq!(alloc.slot_for(3), Some(Slot { container: 1, index: 0 }));
    }

    #[test]
    fn test_last_container_ignores_finite_capacity() {
        let alloc = ContainerAllocator::new(&[Capacity::Fixed(2), Capacity::Fixed(1)], 6);
        assert_eq!(assigned(&alloc), vec![vec![0, 1], vec![2, 3, 4, 5]]);
    }

    #[test]
    fn test_fewer_rows_than_capacity() {
        let alloc = ContainerAllocator::new(
            &[Capacity::Fixed(4), Capacity::Fixed(4), Capacity::Unbounded],
            3,
        );
        assert_eq!(assigned(&alloc), vec![vec![0, 1, 2], vec![], vec![]]);
    }

    #[test]
    fn test_unbounded_in_the_middle_takes_the_rest() {
        let alloc = ContainerAllocator::new(
            &[Capacity::Fixed(1), Capacity::Unbounded, Capacity::Fixed(5)],
            4,
        );
        assert_eq!(assigned(&alloc), vec![vec![0], vec![1, 2, 3], vec![]]);
    }

    #[test]
    fn test_zero_rows_and_zero_containers() {
        let alloc = ContainerAllocator::new(&[Capacity::Fixed(2)], 0);
        assert_eq!(alloc.slot_for(0), None);

        let alloc = ContainerAllocator::new(&[], 3);
        assert!(alloc.allocations().is_empty());
        assert_eq!(alloc.slot_for(0), None);
    }

    #[test]
    fn test_allocation_is_exhaustive_and_ordered() {
        let caps = [
            Capacity::Fixed(2),
            Capacity::Fixed(0),
            Capacity::Fixed(3),
            Capacity::Fixed(1),
        ];
        for total in 0..12 {
            let alloc = ContainerAllocator::new(&caps, total);
            let flat: Vec<usize> = assigned(&alloc).into_iter().flatten().collect();
            assert_eq!(flat, (0..total).collect::<Vec<_>>());
            for row in 0..total {
                let slot = alloc.slot_for(row).unwrap();
                assert!(alloc.rows_for(slot.container).contains(&row));
            }
        }
    }
}
