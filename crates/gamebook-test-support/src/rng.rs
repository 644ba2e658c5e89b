//! Scripted dice for tests.

use gamebook_core::rng::DeterministicRng;

/// Always rolls the lowest face, so every die shows `min`.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }
}

/// Hands out the given faces in order, one per die, whatever range is asked
/// for. Running out of faces fails the test.
#[derive(Debug)]
pub struct SequenceRng {
    faces: Vec<u32>,
    next: usize,
}

impl SequenceRng {
    /// Dice that will show `faces`, in order.
    #[must_use]
    pub fn new(faces: Vec<u32>) -> Self {
        Self { faces, next: 0 }
    }

    /// How many faces have been rolled so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.next
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, _min: u32, _max: u32) -> u32 {
        let Some(face) = self.faces.get(self.next).copied() else {
            panic!(
                "SequenceRng exhausted after {} faces; script more rolls",
                self.faces.len()
            );
        };
        self.next += 1;
        face
    }
}
