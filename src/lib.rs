//! A two-sided matching engine for markets where some applicants apply as
//! couples with joint preferences.
//!
//! [`stable_matching`] runs student-proposing deferred acceptance extended
//! with instability chaining: withdrawals triggered by bumped couple
//! partners are repaired by re-examining the affected programs until the
//! market settles or a cycle proves that no stable matching is reachable.
//! [`find_unstable_pairs`] independently audits any assignment.
//!
//! ```
//! use couples_match::{stable_matching, find_unstable_pairs, Market, Student, Program};
//!
//! let market = Market::new(
//!     vec![
//!         Student { id: 0, preferences: vec![0, 1] },
//!         Student { id: 1, preferences: vec![1, 0] },
//!     ],
//!     vec![],
//!     vec![
//!         Program { id: 0, preferences: vec![0, 1], capacity: 1 },
//!         Program { id: 1, preferences: vec![1, 0], capacity: 1 },
//!     ],
//! )?;
//! let matching = stable_matching(&market);
//! assert!(matching.valid);
//! assert!(find_unstable_pairs(&market, &matching).is_empty());
//! # Ok::<(), couples_match::MarketError>(())
//! ```

pub mod matcher;
pub mod models;
pub mod stability;

pub use matcher::{stable_matching, Matching};
pub use models::{
    Applicant, Couple, Market, MarketError, Program, ProgramId, Student, StudentId,
};
pub use stability::find_unstable_pairs;
