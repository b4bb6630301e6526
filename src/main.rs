use std::time::Instant;

use crate::driver::{generate_parameters, run_simulation};
use crate::parameters::MatchParameters;

mod driver;
mod parameters;

const NUM_STUDENTS: usize = 2000;
const NUM_PROGRAMS: usize = 400;

fn main() {
    env_logger::init();

    let datafile = std::env::args().nth(1);
    let parameters = match &datafile {
        Some(path) => {
            let start = Instant::now();
            match MatchParameters::open(path) {
                Ok(parameters) => {
                    println!("Loaded market from {} in {:.2?}.", path, start.elapsed());
                    parameters
                }
                Err(e) => {
                    eprintln!("Could not load {}: {}", path, e);
                    return;
                }
            }
        }
        None => {
            let parameters = generate_parameters(NUM_STUDENTS, NUM_PROGRAMS);
            save_parameters(&parameters, "market.bin");
            parameters
        }
    };

    run_simulation(parameters);
}

fn save_parameters(parameters: &MatchParameters, path: &str) {
    let start = Instant::now();
    match parameters.save(path) {
        Ok(()) => println!("Saved market to {} in {:.2?}.", path, start.elapsed()),
        Err(e) => eprintln!("Could not save {}: {}", path, e),
    }
}
