//! Property-based coverage over randomly drawn matching markets.

use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use couples_match::{
    find_unstable_pairs, stable_matching, Applicant, Couple, Market, Matching, Program, ProgramId,
    Student, StudentId,
};

#[derive(Clone, Debug)]
struct MarketDraw {
    students: Vec<Student>,
    couples: Vec<Couple>,
    programs: Vec<Program>,
}

/// Random markets the engine is meant for: full permutation
/// preferences on both sides, capacities large enough to seat every student,
/// couples drawn from a random pairing of the student pool.
fn market_draw(include_couples: bool) -> impl Strategy<Value = MarketDraw> {
    (2usize..=50, 1usize..=50).prop_flat_map(move |(num_students, num_programs)| {
        let student_ids: Vec<StudentId> = (0..num_students as StudentId).collect();
        let program_ids: Vec<ProgramId> = (0..num_programs as ProgramId).collect();
        let min_capacity = (num_students + num_programs - 1) / num_programs;

        let student_prefs =
            prop::collection::vec(Just(program_ids).prop_shuffle(), num_students);
        let program_prefs =
            prop::collection::vec(Just(student_ids.clone()).prop_shuffle(), num_programs);
        let capacities = prop::collection::vec(1usize..=5, num_programs);
        let pairing = Just(student_ids).prop_shuffle();
        let num_couples = if include_couples {
            (1usize..=num_students / 2).boxed()
        } else {
            Just(0usize).boxed()
        };

        (student_prefs, program_prefs, capacities, pairing, num_couples).prop_map(
            move |(student_prefs, program_prefs, capacities, pairing, num_couples)| {
                let students = student_prefs
                    .into_iter()
                    .enumerate()
                    .map(|(id, preferences)| Student {
                        id: id as StudentId,
                        preferences,
                    })
                    .collect();
                let programs = program_prefs
                    .into_iter()
                    .zip(capacities)
                    .enumerate()
                    .map(|(id, (preferences, capacity))| Program {
                        id: id as ProgramId,
                        preferences,
                        capacity: capacity.max(min_capacity),
                    })
                    .collect();
                let couples = (0..num_couples)
                    .map(|i| Couple::from((pairing[2 * i], pairing[2 * i + 1])))
                    .collect();
                MarketDraw {
                    students,
                    couples,
                    programs,
                }
            },
        )
    })
}

fn build(draw: MarketDraw) -> Market {
    Market::new(draw.students, draw.couples, draw.programs).expect("generated market is valid")
}

/// Assign every student to the first program on their list with a free seat.
/// Deliberately ignores program priorities, so it usually leaves plenty of
/// unstable pairs for the checker to find.
fn greedy_assignment(market: &Market) -> Matching {
    let mut occupancy: BTreeMap<ProgramId, usize> = BTreeMap::new();
    let mut pairs = Vec::new();
    for student in market.students() {
        for &p in &student.preferences {
            let filled = occupancy.entry(p).or_insert(0);
            if *filled < market.program(p).capacity {
                *filled += 1;
                pairs.push((student.id, p));
                break;
            }
        }
    }
    Matching::new(pairs)
}

fn rank_on_program_list(program: &Program, student: StudentId) -> Option<usize> {
    program.preferences.iter().position(|&s| s == student)
}

/// Count-based re-derivation of the selection rule, kept independent of the
/// engine's bounded-heap implementation.
fn program_would_take(
    market: &Market,
    matching: &Matching,
    program: ProgramId,
    student: StudentId,
) -> bool {
    let entity = market.program(program);
    let rank = match rank_on_program_list(entity, student) {
        Some(r) => r,
        None => return false,
    };
    let better = matching
        .students_matched_to(program)
        .iter()
        .filter(|&&t| t != student)
        .filter_map(|&t| rank_on_program_list(entity, t))
        .filter(|&r| r < rank)
        .count();
    better < entity.capacity
}

fn program_would_take_both(
    market: &Market,
    matching: &Matching,
    program: ProgramId,
    a: StudentId,
    b: StudentId,
) -> bool {
    let entity = market.program(program);
    let (ra, rb) = match (
        rank_on_program_list(entity, a),
        rank_on_program_list(entity, b),
    ) {
        (Some(ra), Some(rb)) => (ra, rb),
        _ => return false,
    };
    let occupant_ranks: Vec<usize> = matching
        .students_matched_to(program)
        .iter()
        .filter(|&&t| t != a && t != b)
        .filter_map(|&t| rank_on_program_list(entity, t))
        .collect();
    let survives = |rank: usize, partner_rank: usize| {
        let better = occupant_ranks.iter().filter(|&&r| r < rank).count()
            + (partner_rank < rank) as usize;
        better < entity.capacity
    };
    survives(ra, rb) && survives(rb, ra)
}

fn single_witness_is_genuine(
    market: &Market,
    matching: &Matching,
    s: StudentId,
    program: ProgramId,
) -> bool {
    let student = market.student(s);
    if matching.program_of(s) == Some(program) {
        return false;
    }
    let proposed = match student.position_of(program) {
        Some(i) => i,
        None => return false,
    };
    let prefers = match matching.program_of(s) {
        None => true,
        Some(current) => match student.position_of(current) {
            Some(held) => proposed < held,
            None => true,
        },
    };
    prefers && program_would_take(market, matching, program, s)
}

fn couple_witness_is_genuine(
    market: &Market,
    matching: &Matching,
    (a, b): (StudentId, StudentId),
    program: ProgramId,
) -> bool {
    let pa = &market.student(a).preferences;
    let pb = &market.student(b).preferences;
    let current = match (matching.program_of(a), matching.program_of(b)) {
        (Some(ma), Some(mb)) => (0..pa.len())
            .find(|&j| pa[j] == ma && pb[j] == mb)
            .unwrap_or_else(|| pa.len()),
        _ => pa.len(),
    };
    (0..current).any(|j| {
        let (p, q) = (pa[j], pb[j]);
        if p != program && q != program {
            return false;
        }
        if p == q {
            program_would_take_both(market, matching, p, a, b)
        } else {
            program_would_take(market, matching, p, a) && program_would_take(market, matching, q, b)
        }
    })
}

fn assert_witnesses_genuine(market: &Market, matching: &Matching) -> Result<(), TestCaseError> {
    for (applicant, program) in find_unstable_pairs(market, matching) {
        let genuine = match applicant {
            Applicant::Single(s) => single_witness_is_genuine(market, matching, s, program),
            Applicant::Couple(a, b) => couple_witness_is_genuine(market, matching, (a, b), program),
        };
        prop_assert!(
            genuine,
            "({:?}, {}) is not a genuine instability",
            applicant,
            program
        );
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn capacities_are_respected(draw in market_draw(true)) {
        let market = build(draw);
        let matching = stable_matching(&market);
        for program in market.programs() {
            prop_assert!(matching.students_matched_to(program.id).len() <= program.capacity);
        }
    }

    #[test]
    fn matches_are_acceptable_and_above_the_cursor(draw in market_draw(true)) {
        let market = build(draw);
        let matching = stable_matching(&market);
        for (s, p) in matching.matches() {
            let rank = market.student(s).position_of(p);
            prop_assert!(rank.is_some(), "student {} matched to unranked program {}", s, p);
            // a repair pass rewinds cursors before re-running an applicant,
            // so the cursor bound is only re-established once the run settles
            if !matching.valid {
                continue;
            }
            if let (Some(cursor), Some(rank)) = (matching.best_unrejected(s), rank) {
                prop_assert!(cursor >= rank);
                prop_assert!(cursor <= market.student(s).preferences.len());
            }
        }
    }

    #[test]
    fn singles_only_markets_are_always_stable(draw in market_draw(false)) {
        let market = build(draw);
        let matching = stable_matching(&market);
        prop_assert!(matching.valid);
        prop_assert_eq!(find_unstable_pairs(&market, &matching), vec![]);
    }

    #[test]
    fn couples_markets_are_stable_or_flagged(draw in market_draw(true)) {
        let market = build(draw);
        let matching = stable_matching(&market);
        if matching.valid {
            prop_assert_eq!(find_unstable_pairs(&market, &matching), vec![]);
        }
    }

    #[test]
    fn runs_are_deterministic(draw in market_draw(true)) {
        let market = build(draw);
        let first = stable_matching(&market);
        let second = stable_matching(&market);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn unmatched_students_exhausted_their_lists(draw in market_draw(true)) {
        let market = build(draw);
        let matching = stable_matching(&market);
        if matching.valid {
            for student in market.students() {
                if matching.program_of(student.id).is_none() {
                    prop_assert_eq!(
                        matching.best_unrejected(student.id),
                        Some(student.preferences.len())
                    );
                }
            }
        }
    }

    #[test]
    fn witnesses_are_genuine_instabilities(draw in market_draw(true)) {
        let market = build(draw);
        // audit both a naive assignment and whatever the engine produced
        assert_witnesses_genuine(&market, &greedy_assignment(&market))?;
        assert_witnesses_genuine(&market, &stable_matching(&market))?;
    }
}
