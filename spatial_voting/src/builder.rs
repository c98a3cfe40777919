pub use crate::config::*;

use crate::check_electorate;

/// A builder for assembling an electorate.
///
/// ```
/// pub use spatial_voting::ElectorateBuilder;
/// # use spatial_voting::AnalysisErrors;
///
/// let candidates = ElectorateBuilder::new()
///     .candidate("Alice", 0.2)
///     .candidate("Bob", 0.5)
///     .candidate("Charlie", 0.8)
///     .build()?;
///
/// let analysis = spatial_voting::run_spatial_analysis(&candidates)?;
/// assert_eq!(analysis.condorcet.winner, Some("Bob".to_string()));
///
/// # Ok::<(), AnalysisErrors>(())
/// ```
pub struct ElectorateBuilder {
    _candidates: Vec<Candidate>,
}

impl Default for ElectorateBuilder {
    fn default() -> Self {
        ElectorateBuilder::new()
    }
}

impl ElectorateBuilder {
    pub fn new() -> ElectorateBuilder {
        ElectorateBuilder {
            _candidates: Vec::new(),
        }
    }

    /// Declares a candidate. Declaration order is the deterministic
    /// tie-break order used throughout the analysis.
    pub fn candidate(mut self, name: &str, position: f64) -> ElectorateBuilder {
        self._candidates.push(Candidate::new(name, position));
        self
    }

    /// Validates the electorate: 2 to 4 candidates with positions in the
    /// open interval (0,1).
    pub fn build(self) -> Result<Vec<Candidate>, AnalysisErrors> {
        check_electorate(&self._candidates)?;
        Ok(self._candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_validates_the_precondition() {
        let res = ElectorateBuilder::new().candidate("A", 0.5).build();
        assert_eq!(res, Err(AnalysisErrors::NotEnoughCandidates));

        let res = ElectorateBuilder::new()
            .candidate("A", 0.2)
            .candidate("B", 1.2)
            .build();
        assert!(matches!(res, Err(AnalysisErrors::PositionOutOfRange { .. })));

        let res = ElectorateBuilder::new()
            .candidate("A", 0.2)
            .candidate("B", 0.8)
            .build();
        assert_eq!(res.unwrap().len(), 2);
    }
}
