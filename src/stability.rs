use std::collections::{BTreeMap, BTreeSet};

use crate::matcher::Matching;
use crate::models::{Applicant, Market, ProgramId, StudentId};

type Assignments = BTreeMap<StudentId, ProgramId>;
type OccupantIndex = BTreeMap<ProgramId, BTreeSet<StudentId>>;

/// Every (applicant, program) pair that is unstable under `matching`: both
/// sides would strictly prefer each other over at least one of their current
/// assignments. An empty result certifies stability. A couple whose
/// preferred joint option spans two programs shows up once per program.
pub fn find_unstable_pairs(market: &Market, matching: &Matching) -> Vec<(Applicant, ProgramId)> {
    let matches = matching.assignments();
    let mut witnesses = Vec::new();
    for program in market.programs() {
        for applicant in unstable_with(market, matches, program.id) {
            witnesses.push((applicant, program.id));
        }
    }
    witnesses
}

/// Applicants forming an unstable pair with `program` under the given
/// assignment. Shared by the public checker and the repair pass of the
/// matching loop.
pub(crate) fn unstable_with(
    market: &Market,
    matches: &Assignments,
    program: ProgramId,
) -> Vec<Applicant> {
    let occupants = occupant_index(matches);
    let mut out = Vec::new();
    for applicant in market.applicants() {
        let unstable = match applicant {
            Applicant::Single(s) => {
                matches.get(&s) != Some(&program)
                    && student_prefers(market, matches, s, program)
                    && program_accepts(market, &occupants, program, s)
            }
            Applicant::Couple(a, b) => {
                couple_unstable_with(market, matches, &occupants, (a, b), program)
            }
        };
        if unstable {
            out.push(applicant);
        }
    }
    out
}

fn occupant_index(matches: &Assignments) -> OccupantIndex {
    let mut occupants = OccupantIndex::new();
    for (&s, &p) in matches {
        occupants.entry(p).or_insert_with(BTreeSet::new).insert(s);
    }
    occupants
}

/// True when the student strictly prefers `program` over their current
/// assignment. Being unmatched is worse than any listed program; a program
/// missing from the student's list is never preferred.
fn student_prefers(
    market: &Market,
    matches: &Assignments,
    student: StudentId,
    program: ProgramId,
) -> bool {
    let entity = market.student(student);
    let proposed = match entity.position_of(program) {
        Some(i) => i,
        None => return false,
    };
    match matches.get(&student) {
        None => true,
        Some(&current) => match entity.position_of(current) {
            Some(held) => proposed < held,
            None => true,
        },
    }
}

/// True when the program would hold `student`: the student survives
/// selection over the current occupants, either into a free seat or by
/// outranking somebody.
fn program_accepts(
    market: &Market,
    occupants: &OccupantIndex,
    program: ProgramId,
    student: StudentId,
) -> bool {
    let mut pool = occupants.get(&program).cloned().unwrap_or_default();
    pool.insert(student);
    !market.select(program, &pool).contains(&student)
}

/// The couple test: some joint option strictly earlier than their current
/// joint assignment has `program` as a coordinate, and each coordinate's
/// program would hold the respective member. When both coordinates name
/// `program` it must hold both members at once.
fn couple_unstable_with(
    market: &Market,
    matches: &Assignments,
    occupants: &OccupantIndex,
    (a, b): (StudentId, StudentId),
    program: ProgramId,
) -> bool {
    let prefs_a = &market.student(a).preferences;
    let prefs_b = &market.student(b).preferences;
    let current = current_joint_rank(market, matches, (a, b));
    for j in 0..current {
        let (p, q) = (prefs_a[j], prefs_b[j]);
        if p != program && q != program {
            continue;
        }
        let held = if p == q {
            let mut pool = occupants.get(&p).cloned().unwrap_or_default();
            pool.insert(a);
            pool.insert(b);
            let rejected = market.select(p, &pool);
            !rejected.contains(&a) && !rejected.contains(&b)
        } else {
            program_accepts(market, occupants, p, a) && program_accepts(market, occupants, q, b)
        };
        if held {
            return true;
        }
    }
    false
}

/// Index of the couple's current joint assignment in their joint list, or
/// the list length when they are not jointly assigned. Anything strictly
/// below this rank counts as preferred.
fn current_joint_rank(
    market: &Market,
    matches: &Assignments,
    (a, b): (StudentId, StudentId),
) -> usize {
    let prefs_a = &market.student(a).preferences;
    let prefs_b = &market.student(b).preferences;
    match (matches.get(&a), matches.get(&b)) {
        (Some(&ma), Some(&mb)) => (0..prefs_a.len())
            .find(|&j| prefs_a[j] == ma && prefs_b[j] == mb)
            .unwrap_or(prefs_a.len()),
        _ => prefs_a.len(),
    }
}
