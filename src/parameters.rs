use serde::{Deserialize, Serialize};

use couples_match::{Couple, Program, Student};

/// A generated market, serializable so that large runs can be replayed
/// against the same input.
#[derive(Clone, Serialize, Deserialize)]
pub struct MatchParameters {
    pub students: Vec<Student>,
    pub couples: Vec<Couple>,
    pub programs: Vec<Program>,
}

impl MatchParameters {
    pub fn save(&self, path: &str) -> bincode::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        bincode::serialize_into(writer, self)
    }

    pub fn open(path: &str) -> bincode::Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        bincode::deserialize_from(reader)
    }
}
