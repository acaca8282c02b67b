use crate::machine::errors::MachineError;
use crate::machine::isa::Platter;

/// Segmented heap: a table of variable-length platter arrays keyed by
/// 32-bit identifiers, with a free list for identifier reuse.
///
/// Segment 0 is the program array. It lives for the whole run and is fetched
/// on every dispatch, so it is held in its own field rather than behind the
/// table's `Option` indirection. Slot 0 of the table is a permanent
/// placeholder keeping identifiers and slot indices aligned.
#[derive(Debug)]
pub(super) struct Heap {
    /// Segment 0.
    program: Vec<Platter>,
    /// Live segments indexed by identifier; `None` marks a dead slot.
    table: Vec<Option<Vec<Platter>>>,
    /// Identifiers below the watermark whose slots are dead.
    free: Vec<Platter>,
}

impl Heap {
    /// Creates a heap holding only the given program array.
    ///
    /// The next-identifier counter starts at 1: identifier 0 is the program.
    pub(super) fn new(program: Vec<Platter>) -> Self {
        Self {
            program,
            table: vec![None],
            free: Vec::new(),
        }
    }

    /// The program array, for the dispatch loop's fetches.
    #[inline(always)]
    pub(super) fn program(&self) -> &[Platter] {
        &self.program
    }

    /// Allocates a zero-filled segment of `len` platters.
    ///
    /// Reuses an abandoned identifier when one is available, otherwise hands
    /// out a fresh identifier from the watermark. The result is never 0 and
    /// never collides with a live segment.
    pub(super) fn allocate(&mut self, len: Platter) -> Platter {
        let segment = vec![0; len as usize];
        match self.free.pop() {
            Some(id) => {
                self.table[id as usize] = Some(segment);
                id
            }
            None => {
                let id = self.table.len() as Platter;
                self.table.push(Some(segment));
                id
            }
        }
    }

    /// Destroys the segment with the given identifier, making it eligible
    /// for reuse.
    pub(super) fn abandon(&mut self, id: Platter) -> Result<(), MachineError> {
        if id == 0 {
            return Err(MachineError::AbandonProgram);
        }
        let slot = self
            .table
            .get_mut(id as usize)
            .ok_or(MachineError::DeadSegment(id))?;
        if slot.take().is_none() {
            return Err(MachineError::DeadSegment(id));
        }
        self.free.push(id);
        Ok(())
    }

    /// Returns the segment with the given identifier.
    pub(super) fn segment(&self, id: Platter) -> Result<&[Platter], MachineError> {
        if id == 0 {
            return Ok(&self.program);
        }
        self.table
            .get(id as usize)
            .and_then(|slot| slot.as_deref())
            .ok_or(MachineError::DeadSegment(id))
    }

    /// Returns the segment with the given identifier, mutably.
    pub(super) fn segment_mut(&mut self, id: Platter) -> Result<&mut [Platter], MachineError> {
        if id == 0 {
            return Ok(&mut self.program);
        }
        self.table
            .get_mut(id as usize)
            .and_then(|slot| slot.as_deref_mut())
            .ok_or(MachineError::DeadSegment(id))
    }

    /// Replaces the program array with a duplicate of segment `id`.
    ///
    /// The source segment stays live. Callers special-case `id == 0` before
    /// reaching here; duplicating the program onto itself would only waste
    /// the copy.
    pub(super) fn replace_program(&mut self, id: Platter) -> Result<(), MachineError> {
        let source = self
            .table
            .get(id as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(MachineError::DeadSegment(id))?;
        self.program = source.clone();
        Ok(())
    }

    /// The identifier watermark: every live identifier is below this.
    pub(super) fn next_segment(&self) -> Platter {
        self.table.len() as Platter
    }

    /// All live segments as (identifier, contents), ascending by identifier.
    pub(super) fn live_segments(&self) -> Vec<(Platter, Vec<Platter>)> {
        let mut segments = Vec::with_capacity(self.table.len());
        segments.push((0, self.program.clone()));
        for (id, slot) in self.table.iter().enumerate().skip(1) {
            if let Some(contents) = slot {
                segments.push((id as Platter, contents.clone()));
            }
        }
        segments
    }

    /// Rebuilds a heap from a snapshot's segment list and watermark.
    ///
    /// The free list is reconstructed from the gaps below the watermark.
    pub(super) fn from_segments(
        segments: Vec<(Platter, Vec<Platter>)>,
        next_segment: Platter,
    ) -> Result<Self, MachineError> {
        if next_segment == 0 {
            return Err(MachineError::BadSnapshot(
                "next-identifier counter is zero".to_string(),
            ));
        }

        let mut program = None;
        let mut table: Vec<Option<Vec<Platter>>> = vec![None; next_segment as usize];

        for (id, contents) in segments {
            if id >= next_segment {
                return Err(MachineError::BadSnapshot(format!(
                    "segment {} is above the identifier watermark {}",
                    id, next_segment
                )));
            }
            if id == 0 {
                if program.replace(contents).is_some() {
                    return Err(MachineError::BadSnapshot(
                        "duplicate segment 0".to_string(),
                    ));
                }
            } else {
                let slot = &mut table[id as usize];
                if slot.replace(contents).is_some() {
                    return Err(MachineError::BadSnapshot(format!(
                        "duplicate segment {}",
                        id
                    )));
                }
            }
        }

        let program = program.ok_or_else(|| {
            MachineError::BadSnapshot("segment 0 missing".to_string())
        })?;
        let free = (1..next_segment)
            .filter(|&id| table[id as usize].is_none())
            .collect();

        Ok(Self {
            program,
            table,
            free,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_nonzero_distinct_ids() {
        let mut heap = Heap::new(vec![0x7000_0000]);
        let a = heap.allocate(2);
        let b = heap.allocate(2);
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn allocate_zero_fills() {
        let mut heap = Heap::new(vec![]);
        let id = heap.allocate(5);
        assert_eq!(heap.segment(id).unwrap(), &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn abandoned_identifier_is_reused() {
        let mut heap = Heap::new(vec![]);
        let a = heap.allocate(1);
        let b = heap.allocate(1);
        heap.abandon(a).unwrap();
        let c = heap.allocate(3);
        assert_eq!(c, a);
        assert_eq!(heap.segment(c).unwrap().len(), 3);
        assert_ne!(c, b);
    }

    #[test]
    fn abandon_program_rejected() {
        let mut heap = Heap::new(vec![]);
        assert!(matches!(
            heap.abandon(0),
            Err(MachineError::AbandonProgram)
        ));
    }

    #[test]
    fn abandon_dead_segment_rejected() {
        let mut heap = Heap::new(vec![]);
        let id = heap.allocate(1);
        heap.abandon(id).unwrap();
        assert!(matches!(
            heap.abandon(id),
            Err(MachineError::DeadSegment(dead)) if dead == id
        ));
        assert!(matches!(
            heap.abandon(99),
            Err(MachineError::DeadSegment(99))
        ));
    }

    #[test]
    fn segment_zero_is_the_program() {
        let mut heap = Heap::new(vec![1, 2, 3]);
        assert_eq!(heap.segment(0).unwrap(), &[1, 2, 3]);
        heap.segment_mut(0).unwrap()[1] = 42;
        assert_eq!(heap.program(), &[1, 42, 3]);
    }

    #[test]
    fn dead_segment_access_rejected() {
        let mut heap = Heap::new(vec![]);
        let id = heap.allocate(1);
        heap.abandon(id).unwrap();
        assert!(matches!(
            heap.segment(id),
            Err(MachineError::DeadSegment(dead)) if dead == id
        ));
        assert!(matches!(
            heap.segment_mut(7),
            Err(MachineError::DeadSegment(7))
        ));
    }

    #[test]
    fn replace_program_deep_copies_and_keeps_source() {
        let mut heap = Heap::new(vec![0xAAAA_AAAA]);
        let id = heap.allocate(2);
        heap.segment_mut(id).unwrap()[0] = 0x1111_1111;
        heap.replace_program(id).unwrap();

        assert_eq!(heap.program(), &[0x1111_1111, 0]);
        // The source is still live and independent of the copy.
        heap.segment_mut(id).unwrap()[0] = 0x2222_2222;
        assert_eq!(heap.program(), &[0x1111_1111, 0]);
    }

    #[test]
    fn replace_program_from_dead_segment_rejected() {
        let mut heap = Heap::new(vec![]);
        assert!(matches!(
            heap.replace_program(5),
            Err(MachineError::DeadSegment(5))
        ));
    }

    #[test]
    fn live_segments_ascending_with_gaps_skipped() {
        let mut heap = Heap::new(vec![7]);
        let a = heap.allocate(1);
        let b = heap.allocate(1);
        let c = heap.allocate(1);
        heap.abandon(b).unwrap();

        let segments = heap.live_segments();
        let ids: Vec<Platter> = segments.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, a, c]);
        assert_eq!(heap.next_segment(), 4);
    }

    #[test]
    fn from_segments_roundtrip_preserves_free_list() {
        let mut heap = Heap::new(vec![1]);
        let a = heap.allocate(1);
        let _b = heap.allocate(1);
        heap.abandon(a).unwrap();

        let rebuilt =
            Heap::from_segments(heap.live_segments(), heap.next_segment()).unwrap();
        assert_eq!(rebuilt.next_segment(), heap.next_segment());

        // The gap left by `a` is reusable in the rebuilt heap.
        let mut rebuilt = rebuilt;
        assert_eq!(rebuilt.allocate(1), a);
    }

    #[test]
    fn from_segments_requires_program() {
        let err = Heap::from_segments(vec![(1, vec![])], 2).unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(ref reason) if reason == "segment 0 missing"));
    }

    #[test]
    fn from_segments_rejects_identifier_above_watermark() {
        let err = Heap::from_segments(vec![(0, vec![]), (5, vec![])], 2).unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(_)));
    }

    #[test]
    fn from_segments_rejects_duplicates() {
        let err =
            Heap::from_segments(vec![(0, vec![]), (1, vec![]), (1, vec![])], 2).unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(_)));
    }

    #[test]
    fn from_segments_rejects_zero_watermark() {
        let err = Heap::from_segments(vec![(0, vec![])], 0).unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(_)));
    }
}
