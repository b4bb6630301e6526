use std::collections::BTreeMap;
use std::io::{stdout, Write};
use std::time::Instant;

use crossterm::{cursor, terminal, ExecutableCommand, QueueableCommand};
use log::info;

use couples_match::models::generator;
use couples_match::{
    find_unstable_pairs, stable_matching, Market, Matching, ProgramId, Student, StudentId,
};

use crate::parameters::MatchParameters;

pub fn generate_parameters(num_students: usize, num_programs: usize) -> MatchParameters {
    let start = Instant::now();
    let program_ids: Vec<ProgramId> = (0..num_programs as ProgramId).collect();
    let student_ids: Vec<StudentId> = (0..num_students as StudentId).collect();

    let mut students = Vec::with_capacity(num_students);
    animated_process(
        &student_ids,
        |i, len| {
            format!(
                "...sampled {}/{} student rank lists ({:.0}%)...",
                i,
                len,
                i as f64 / len as f64 * 100.0
            )
        },
        |&id| {
            students.push(Student {
                id,
                preferences: generator::random_preferences(&program_ids),
            })
        },
    );

    let programs = generator::sample_programs(num_programs, &student_ids);
    let couples = generator::sample_couples(&students);

    println!("Created sample market in {:.2?}.", start.elapsed());

    MatchParameters {
        students,
        couples,
        programs,
    }
}

pub fn run_simulation(parameters: MatchParameters) {
    let MatchParameters {
        students,
        couples,
        programs,
    } = parameters;
    let num_students = students.len();
    let num_programs = programs.len();
    let num_couples = couples.len();

    let market = match Market::new(students, couples, programs) {
        Ok(market) => market,
        Err(e) => {
            eprintln!("Invalid market: {}", e);
            return;
        }
    };

    let start = Instant::now();
    let matching = stable_matching(&market);
    println!("Finished match in {:.2?}.", start.elapsed());
    if !matching.valid {
        println!("No stable matching was reachable; reporting the final partial state.");
    }

    report(&market, &matching, num_students, num_programs, num_couples);

    let start = Instant::now();
    let witnesses = find_unstable_pairs(&market, &matching);
    info!("verified matching in {:.2?}", start.elapsed());
    println!("Unstable pairs remaining: {}", witnesses.len());
}

fn report(
    market: &Market,
    matching: &Matching,
    num_students: usize,
    num_programs: usize,
    num_couples: usize,
) {
    let mut occupancy: BTreeMap<ProgramId, usize> = BTreeMap::new();
    for (_, p) in matching.matches() {
        *occupancy.entry(p).or_insert(0) += 1;
    }

    let matched_programs = occupancy.len();
    let total_capacity: usize = market.programs().map(|p| p.capacity).sum();
    let unfilled_positions = total_capacity - matching.len();
    let matched_students = matching.len();
    let unmatched_students = num_students - matched_students;

    println!(
        "Matched programs: {} ({:.1}%), Unfilled positions: {}",
        matched_programs,
        matched_programs as f32 / num_programs as f32 * 100.0,
        unfilled_positions
    );
    println!(
        "Matched students: {} ({:.1}%), Unmatched students: {} ({:.1}%)",
        matched_students,
        matched_students as f32 / num_students as f32 * 100.0,
        unmatched_students,
        unmatched_students as f32 / num_students as f32 * 100.0,
    );

    let matched_couple_members = matching
        .matches()
        .filter(|&(s, _)| market.partner_of(s).is_some())
        .count();
    println!(
        "Matched couple members: {} of {}",
        matched_couple_members,
        2 * num_couples
    );

    let first_choicers = matching
        .matches()
        .filter(|&(s, p)| market.student(s).preferences.first() == Some(&p))
        .count();
    println!(
        "Students matched to their first choice: {} ({:.1}%)",
        first_choicers,
        first_choicers as f32 / matched_students.max(1) as f32 * 100.0
    );
}

fn animated_process<T, S, F>(items: &[T], label: S, mut f: F)
where
    S: Fn(usize, usize) -> String,
    F: FnMut(&T),
{
    let mut out = stdout();
    for (i, item) in items.iter().enumerate() {
        f(item);
        out.queue(cursor::SavePosition).unwrap();
        out.write_all(label(i + 1, items.len()).as_bytes()).unwrap();
        out.flush().unwrap();
        out.queue(cursor::RestorePosition).unwrap();
        out.queue(terminal::Clear(terminal::ClearType::FromCursorDown))
            .unwrap();
    }
    out.execute(cursor::Show).unwrap();
}
