pub mod generator;

use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type StudentId = u32;
pub type ProgramId = u32;

/// A student with an ordered preference list over programs, most-preferred
/// first. The list may be a truncated ranking; programs absent from it are
/// never acceptable to the student.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub preferences: Vec<ProgramId>,
}

impl Student {
    /// Index of the first occurrence of `program` in the preference list.
    pub fn position_of(&self, program: ProgramId) -> Option<usize> {
        self.preferences.iter().position(|&p| p == program)
    }
}

impl PartialEq for Student {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Student {}

/// Two students whose preferences are considered jointly. The joint list is
/// the position-wise zip of the members' individual lists, so both lists
/// must have the same length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Couple {
    pub members: (StudentId, StudentId),
}

impl From<(StudentId, StudentId)> for Couple {
    fn from(members: (StudentId, StudentId)) -> Couple {
        Couple { members }
    }
}

/// A proposing unit: a lone student or a couple acting jointly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Applicant {
    Single(StudentId),
    Couple(StudentId, StudentId),
}

impl Applicant {
    pub fn members(&self) -> Vec<StudentId> {
        match *self {
            Applicant::Single(s) => vec![s],
            Applicant::Couple(a, b) => vec![a, b],
        }
    }
}

/// A program with an ordered priority list over students and a fixed number
/// of open seats.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub preferences: Vec<StudentId>,
    pub capacity: usize,
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Program {}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarketError {
    #[error("duplicate student id {0}")]
    DuplicateStudent(StudentId),
    #[error("duplicate program id {0}")]
    DuplicateProgram(ProgramId),
    #[error("program {0} has zero capacity")]
    ZeroCapacity(ProgramId),
    #[error("student {student} ranks unknown program {program}")]
    UnknownProgram { student: StudentId, program: ProgramId },
    #[error("program {program} ranks unknown student {student}")]
    UnknownStudent { program: ProgramId, student: StudentId },
    #[error("couple member {0} is not a known student")]
    UnknownCoupleMember(StudentId),
    #[error("student {0} appears in more than one couple")]
    DoublyCoupled(StudentId),
    #[error("student {0} is coupled with itself")]
    SelfCoupled(StudentId),
    #[error("couple ({0}, {1}) has preference lists of different lengths")]
    MismatchedCoupleLists(StudentId, StudentId),
}

/// A validated, immutable matching market. Construction checks every cross
/// reference so the algorithm itself never has to.
#[derive(Clone, Debug)]
pub struct Market {
    students: BTreeMap<StudentId, Student>,
    programs: BTreeMap<ProgramId, Program>,
    singles: Vec<StudentId>,
    couples: Vec<Couple>,
    partner: BTreeMap<StudentId, StudentId>,
    // both members point at the couple in its stored orientation
    couple_of: BTreeMap<StudentId, (StudentId, StudentId)>,
    // per program: student id -> position on the program's list
    ranks: BTreeMap<ProgramId, BTreeMap<StudentId, usize>>,
}

impl Market {
    pub fn new(
        students: Vec<Student>,
        couples: Vec<Couple>,
        programs: Vec<Program>,
    ) -> Result<Market, MarketError> {
        let mut program_map = BTreeMap::new();
        for program in programs {
            if program.capacity == 0 {
                return Err(MarketError::ZeroCapacity(program.id));
            }
            let id = program.id;
            if program_map.insert(id, program).is_some() {
                return Err(MarketError::DuplicateProgram(id));
            }
        }

        let mut student_map = BTreeMap::new();
        let mut student_order = Vec::new();
        for student in students {
            for &p in &student.preferences {
                if !program_map.contains_key(&p) {
                    return Err(MarketError::UnknownProgram {
                        student: student.id,
                        program: p,
                    });
                }
            }
            let id = student.id;
            student_order.push(id);
            if student_map.insert(id, student).is_some() {
                return Err(MarketError::DuplicateStudent(id));
            }
        }

        let mut ranks = BTreeMap::new();
        for program in program_map.values() {
            let mut table = BTreeMap::new();
            for (position, &s) in program.preferences.iter().enumerate() {
                if !student_map.contains_key(&s) {
                    return Err(MarketError::UnknownStudent {
                        program: program.id,
                        student: s,
                    });
                }
                table.entry(s).or_insert(position);
            }
            ranks.insert(program.id, table);
        }

        let mut partner = BTreeMap::new();
        let mut couple_of = BTreeMap::new();
        for couple in &couples {
            let (a, b) = couple.members;
            if a == b {
                return Err(MarketError::SelfCoupled(a));
            }
            for &m in &[a, b] {
                if !student_map.contains_key(&m) {
                    return Err(MarketError::UnknownCoupleMember(m));
                }
                if partner.contains_key(&m) {
                    return Err(MarketError::DoublyCoupled(m));
                }
            }
            if student_map[&a].preferences.len() != student_map[&b].preferences.len() {
                return Err(MarketError::MismatchedCoupleLists(a, b));
            }
            partner.insert(a, b);
            partner.insert(b, a);
            couple_of.insert(a, (a, b));
            couple_of.insert(b, (a, b));
        }

        let singles = student_order
            .into_iter()
            .filter(|s| !partner.contains_key(s))
            .collect();

        Ok(Market {
            students: student_map,
            programs: program_map,
            singles,
            couples,
            partner,
            couple_of,
            ranks,
        })
    }

    /// Panics on an unknown id; every id reachable from a `Market` is
    /// validated at construction.
    pub fn student(&self, id: StudentId) -> &Student {
        &self.students[&id]
    }

    /// Panics on an unknown id, as with [`Market::student`].
    pub fn program(&self, id: ProgramId) -> &Program {
        &self.programs[&id]
    }

    pub fn students(&self) -> impl Iterator<Item = &Student> {
        self.students.values()
    }

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.values()
    }

    pub fn partner_of(&self, student: StudentId) -> Option<StudentId> {
        self.partner.get(&student).copied()
    }

    /// The couple containing `student`, in its stored orientation, if any.
    pub fn couple_applicant(&self, student: StudentId) -> Option<Applicant> {
        self.couple_of
            .get(&student)
            .map(|&(a, b)| Applicant::Couple(a, b))
    }

    /// Applicants in processing order: singles first, in input order, then
    /// couples.
    pub fn applicants(&self) -> Vec<Applicant> {
        self.singles
            .iter()
            .map(|&s| Applicant::Single(s))
            .chain(
                self.couples
                    .iter()
                    .map(|c| Applicant::Couple(c.members.0, c.members.1)),
            )
            .collect()
    }

    /// Program selection: returns the members of `pool` that do not make the
    /// program's top-k cut, k being its capacity. Students absent from the
    /// program's list are always rejected. Pure; the pool is not mutated.
    pub fn select(&self, program: ProgramId, pool: &BTreeSet<StudentId>) -> BTreeSet<StudentId> {
        let capacity = self.programs[&program].capacity;
        let ranks = &self.ranks[&program];
        let mut rejected = BTreeSet::new();
        // max-heap on rank keeps the k best seen so far
        let mut held: BinaryHeap<(usize, StudentId)> = BinaryHeap::new();
        for &s in pool {
            match ranks.get(&s) {
                None => {
                    rejected.insert(s);
                }
                Some(&rank) => {
                    held.push((rank, s));
                    if held.len() > capacity {
                        if let Some((_, worst)) = held.pop() {
                            rejected.insert(worst);
                        }
                    }
                }
            }
        }
        rejected
    }
}
