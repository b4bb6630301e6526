//! Random sampling primitives for building simulation markets.

use rand::seq::SliceRandom;
use rand::Rng;

use super::{Couple, Program, ProgramId, Student, StudentId};

pub fn random_preferences<T: Copy>(ids: &[T]) -> Vec<T> {
    let mut shuffled = ids.to_vec();
    shuffled.shuffle(&mut rand::thread_rng());
    shuffled
}

pub fn random_capacity() -> usize {
    rand::thread_rng().gen_range(1..=10)
}

pub fn is_coupled() -> bool {
    rand::thread_rng().gen_bool(0.02)
}

pub fn sample_programs(num_programs: usize, student_ids: &[StudentId]) -> Vec<Program> {
    (0..num_programs as ProgramId)
        .map(|id| Program {
            id,
            preferences: random_preferences(student_ids),
            capacity: random_capacity(),
        })
        .collect()
}

/// Pair off a small fraction of the students at random. Partners draw from a
/// shuffled order so pairings are uncorrelated with ids.
pub fn sample_couples(students: &[Student]) -> Vec<Couple> {
    let ids: Vec<StudentId> = students.iter().map(|s| s.id).collect();
    let shuffled = random_preferences(&ids);
    let mut couples = Vec::new();
    for pair in shuffled.chunks_exact(2) {
        if is_coupled() {
            couples.push(Couple::from((pair[0], pair[1])));
        }
    }
    couples
}
