use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use log::{debug, warn};

use crate::models::{Applicant, Market, ProgramId, StudentId};
use crate::stability;

/// The outcome of a run: a partial assignment of students to programs plus a
/// validity flag. `valid == false` means the repair loop hit a cycle and the
/// assignment is the state at the moment of detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matching {
    matches: BTreeMap<StudentId, ProgramId>,
    cursors: BTreeMap<StudentId, usize>,
    pub valid: bool,
}

impl Matching {
    /// Wrap an externally produced assignment, e.g. to audit it with
    /// [`crate::stability::find_unstable_pairs`].
    pub fn new(matches: impl IntoIterator<Item = (StudentId, ProgramId)>) -> Matching {
        Matching {
            matches: matches.into_iter().collect(),
            cursors: BTreeMap::new(),
            valid: true,
        }
    }

    pub fn matches(&self) -> impl Iterator<Item = (StudentId, ProgramId)> + '_ {
        self.matches.iter().map(|(&s, &p)| (s, p))
    }

    pub fn program_of(&self, student: StudentId) -> Option<ProgramId> {
        self.matches.get(&student).copied()
    }

    /// Reverse view, derived on demand.
    pub fn students_matched_to(&self, program: ProgramId) -> BTreeSet<StudentId> {
        self.matches
            .iter()
            .filter(|&(_, &p)| p == program)
            .map(|(&s, _)| s)
            .collect()
    }

    /// Final cursor position of `student`: the index of the best program the
    /// student was never rejected by. `None` for assignments built with
    /// [`Matching::new`].
    pub fn best_unrejected(&self, student: StudentId) -> Option<usize> {
        self.cursors.get(&student).copied()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub(crate) fn assignments(&self) -> &BTreeMap<StudentId, ProgramId> {
        &self.matches
    }
}

impl fmt::Display for Matching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (s, p) in &self.matches {
            if !first {
                writeln!(f)?;
            }
            write!(f, "Student({}) -> Program({})", s, p)?;
            first = false;
        }
        Ok(())
    }
}

/// Construct a matching of students to programs, honoring couples' joint
/// preferences.
///
/// Implemented as a variation of the instability chaining algorithm from
///
///     Roth, Alvin E. and Vande Vate, John H.
///     "Random Paths to Stability in Two-Sided Matching."
///     Econometrica, November 1990, 58(6), pp. 1475-80.
///
/// Singles are processed before couples, which empirically lowers the chance
/// of hitting a cycle. When couples are present a stable matching may not
/// exist; a detected cycle is reported through `Matching::valid` rather than
/// an error, and the partial assignment is returned as-is.
pub fn stable_matching(market: &Market) -> Matching {
    let mut matcher = Matcher::new(market);
    matcher.run_match();
    matcher.into_matching()
}

#[derive(Default)]
struct ApplyOutcome {
    displaced: Vec<Applicant>,
    affected: Vec<ProgramId>,
}

/// Canonical state fingerprint for cycle detection: stack contents in order
/// plus the assignment sorted by student id.
#[derive(Hash, PartialEq, Eq)]
struct Snapshot {
    applicants: Vec<Applicant>,
    programs: Vec<ProgramId>,
    matches: Vec<(StudentId, ProgramId)>,
}

impl Snapshot {
    fn capture(
        applicants: &[Applicant],
        programs: &[ProgramId],
        matches: &BTreeMap<StudentId, ProgramId>,
    ) -> Snapshot {
        Snapshot {
            applicants: applicants.to_vec(),
            programs: programs.to_vec(),
            matches: matches.iter().map(|(&s, &p)| (s, p)).collect(),
        }
    }
}

struct Matcher<'a> {
    market: &'a Market,
    cursors: BTreeMap<StudentId, usize>,
    matches: BTreeMap<StudentId, ProgramId>,
    // incremental reverse index of `matches`
    occupants: BTreeMap<ProgramId, BTreeSet<StudentId>>,
    valid: bool,
}

impl<'a> Matcher<'a> {
    fn new(market: &'a Market) -> Matcher<'a> {
        Matcher {
            market,
            cursors: market.students().map(|s| (s.id, 0)).collect(),
            matches: BTreeMap::new(),
            occupants: BTreeMap::new(),
            valid: true,
        }
    }

    fn run_match(&mut self) {
        for applicant in self.market.applicants() {
            debug!("processing {:?}", applicant);
            if !self.process_one(applicant) {
                warn!(
                    "cycle detected while processing {:?}, matching marked invalid",
                    applicant
                );
                self.valid = false;
                return;
            }
        }
    }

    fn into_matching(self) -> Matching {
        Matching {
            matches: self.matches,
            cursors: self.cursors,
            valid: self.valid,
        }
    }

    /// Drive one top-level applicant to quiescence: a deferred-acceptance
    /// stack of applicants interleaved with a repair stack of programs that
    /// lost a student through a withdrawal. Returns false when a state
    /// repeats, which means the market has no stable matching reachable from
    /// here and we would loop forever.
    fn process_one(&mut self, applicant: Applicant) -> bool {
        let mut applicant_stack = vec![applicant];
        let mut program_stack: Vec<ProgramId> = Vec::new();
        let mut seen: HashSet<Snapshot> = HashSet::new();

        while !applicant_stack.is_empty() || !program_stack.is_empty() {
            if let Some(next) = applicant_stack.pop() {
                let outcome = self.apply(next);
                applicant_stack.extend(outcome.displaced);
                program_stack.extend(outcome.affected);
            } else if let Some(program) = program_stack.pop() {
                // a withdrawal left this program with a vacancy; anyone now
                // unstable with it restarts from the top of their list, and
                // the seats they would leave behind are re-examined in turn
                for unstable in stability::unstable_with(self.market, &self.matches, program) {
                    debug!("{:?} is unstable with program {}", unstable, program);
                    for member in unstable.members() {
                        self.cursors.insert(member, 0);
                        if let Some(&current) = self.matches.get(&member) {
                            program_stack.push(current);
                        }
                    }
                    applicant_stack.push(unstable);
                }
            }

            let snapshot = Snapshot::capture(&applicant_stack, &program_stack, &self.matches);
            if !seen.insert(snapshot) {
                return false;
            }
        }
        true
    }

    fn apply(&mut self, applicant: Applicant) -> ApplyOutcome {
        match applicant {
            Applicant::Single(s) => self.apply_single(s),
            Applicant::Couple(a, b) => self.apply_couple(a, b),
        }
    }

    /// One proposal run for a single student, from their current cursor down
    /// the list until a program holds them or the list runs out.
    fn apply_single(&mut self, s: StudentId) -> ApplyOutcome {
        let market = self.market;
        let prefs = &market.student(s).preferences;
        while self.cursor(s) < prefs.len() {
            let target = prefs[self.cursor(s)];
            let pool = self.pool_with(target, &[s]);
            let rejected = market.select(target, &pool);
            if rejected.contains(&s) {
                self.advance(s);
                continue;
            }
            debug!("student {} holds a seat at program {}", s, target);
            self.unassign(s);
            let outcome = self.displace(&rejected);
            self.assign(s, target);
            return outcome;
        }
        debug!("student {} exhausted their preference list", s);
        ApplyOutcome::default()
    }

    /// One proposal run for a couple over their joint list. Both members must
    /// be held by their respective target, with a shared pool when both
    /// coordinates name the same program; otherwise the pair advances.
    fn apply_couple(&mut self, a: StudentId, b: StudentId) -> ApplyOutcome {
        let market = self.market;
        let prefs_a = &market.student(a).preferences;
        let prefs_b = &market.student(b).preferences;
        while self.cursor(a) < prefs_a.len() {
            let (p, q) = (prefs_a[self.cursor(a)], prefs_b[self.cursor(b)]);
            let (rejected, held) = if p == q {
                let pool = self.pool_with(p, &[a, b]);
                let rejected = market.select(p, &pool);
                let held = !rejected.contains(&a) && !rejected.contains(&b);
                (rejected, held)
            } else {
                let rejected_p = market.select(p, &self.pool_with(p, &[a]));
                let rejected_q = market.select(q, &self.pool_with(q, &[b]));
                let held = !rejected_p.contains(&a) && !rejected_q.contains(&b);
                let mut rejected = rejected_p;
                rejected.extend(rejected_q);
                (rejected, held)
            };
            if !held {
                self.advance(a);
                self.advance(b);
                continue;
            }
            let mut bumped = rejected;
            bumped.remove(&a);
            bumped.remove(&b);
            debug!(
                "couple ({}, {}) holds seats at programs ({}, {})",
                a, b, p, q
            );
            self.unassign(a);
            self.unassign(b);
            let outcome = self.displace(&bumped);
            self.assign(a, p);
            self.assign(b, q);
            return outcome;
        }
        debug!("couple ({}, {}) exhausted their joint preference list", a, b);
        ApplyOutcome::default()
    }

    /// Evict every bumped student and classify the fallout. A bumped couple
    /// member forces their partner to withdraw; the withdrawn-from program is
    /// reported as affected and the couple is reconstituted for another run.
    /// Bumped singles are simply re-queued with their cursor where it was.
    fn displace(&mut self, bumped: &BTreeSet<StudentId>) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let mut affected = BTreeSet::new();
        let mut handled = BTreeSet::new();
        for &t in bumped {
            if !handled.insert(t) {
                continue;
            }
            self.unassign(t);
            match self.market.partner_of(t) {
                Some(w) => {
                    if bumped.contains(&w) {
                        // both members lost their seats outright; nothing to
                        // withdraw from
                        handled.insert(w);
                        self.unassign(w);
                    } else if let Some(r) = self.unassign(w) {
                        debug!(
                            "student {} withdraws from program {} after partner {} was bumped",
                            w, r, t
                        );
                        affected.insert(r);
                    }
                    if let Some(couple) = self.market.couple_applicant(t) {
                        outcome.displaced.push(couple);
                    }
                }
                None => outcome.displaced.push(Applicant::Single(t)),
            }
        }
        outcome.affected = affected.into_iter().collect();
        outcome
    }

    fn pool_with(&self, program: ProgramId, extra: &[StudentId]) -> BTreeSet<StudentId> {
        let mut pool = self.occupants.get(&program).cloned().unwrap_or_default();
        pool.extend(extra.iter().copied());
        pool
    }

    fn assign(&mut self, student: StudentId, program: ProgramId) {
        if let Some(old) = self.matches.insert(student, program) {
            if let Some(set) = self.occupants.get_mut(&old) {
                set.remove(&student);
            }
        }
        self.occupants.entry(program).or_default().insert(student);
    }

    fn unassign(&mut self, student: StudentId) -> Option<ProgramId> {
        let old = self.matches.remove(&student)?;
        if let Some(set) = self.occupants.get_mut(&old) {
            set.remove(&student);
        }
        Some(old)
    }

    fn cursor(&self, student: StudentId) -> usize {
        self.cursors[&student]
    }

    fn advance(&mut self, student: StudentId) {
        if let Some(c) = self.cursors.get_mut(&student) {
            *c += 1;
        }
    }
}
