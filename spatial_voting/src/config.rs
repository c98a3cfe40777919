// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// A candidate on the ideological axis.
///
/// Positions live in the open interval (0,1). They do not need to be sorted
/// or distinct: ties are resolved by the order in which the candidates are
/// declared.
#[derive(PartialEq, Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub position: f64,
}

impl Candidate {
    pub fn new(name: &str, position: f64) -> Candidate {
        Candidate {
            name: name.to_string(),
            position,
        }
    }
}

/// Which distribution the Monte Carlo simulator draws its approval
/// probabilities from.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum VoterDistribution {
    Uniform,
    /// Gaussian with mean 0.5 and standard deviation 0.2, clamped to [0,1].
    Gaussian,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MonteCarloParams {
    pub trials: u32,
    pub distribution: VoterDistribution,
}

/// Parameters for the iterative strategic-threshold simulation.
///
/// The caller owns clamping: `update_rate` is expected in [0.1, 1.0] and
/// `sincere_proportion` in [0, 1]. The voter population is a pure function
/// of (`num_voters`, `seed`); "redistributing" voters means changing the
/// seed.
#[derive(PartialEq, Debug, Clone)]
pub struct EquilibriumParams {
    pub num_voters: usize,
    /// The sincere approval radius every voter starts from.
    pub initial_threshold: f64,
    /// When on, voters always approve their nearest candidate and never
    /// approve their least-preferred one, whatever the threshold says.
    pub basic_strategy: bool,
    /// Probability that a non-sincere voter adopts its newly computed
    /// threshold on a given step.
    pub update_rate: f64,
    /// Proportion of voters that never deviate from `initial_threshold`.
    pub sincere_proportion: f64,
    pub seed: u32,
}

// ******** Output data structures *********

/// A maximal class of voters sharing one strict ranking of the candidates,
/// nearest first, with the proportion of the electorate it represents.
#[derive(PartialEq, Debug, Clone)]
pub struct SegmentStats {
    pub ranking: Vec<String>,
    pub proportion: f64,
}

/// The outcome of one two-candidate majority comparison.
#[derive(PartialEq, Debug, Clone)]
pub struct PairwiseStats {
    pub first: String,
    pub second: String,
    pub winner: String,
    /// The winner's vote share, formatted as a percentage with one decimal,
    /// e.g. "64.5%".
    pub winner_share: String,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CondorcetStats {
    /// The candidate beating all the others pairwise, if one exists.
    pub winner: Option<String>,
    /// Pairwise win counts, in candidate order.
    pub wins: Vec<(String, u32)>,
}

/// Reverse Borda scores: 1 point for a first place, 2 for a second, and so
/// on, weighted by segment proportions. Lower is better. This is used as a
/// tie-break key for eliminations, not as a voting rule of its own.
#[derive(PartialEq, Debug, Clone)]
pub struct BordaStats {
    pub scores: Vec<(String, f64)>,
    pub winner: String,
}

/// Statistics for one round of ranked-choice elimination.
///
/// A decisive terminal round records only the winner: its tally is empty
/// and `eliminated` is `None`.
#[derive(PartialEq, Debug, Clone)]
pub struct RcvRoundStats {
    pub round: u32,
    pub tally: Vec<(String, f64)>,
    pub eliminated: Option<String>,
    pub winner: Option<String>,
}

/// The approval pattern arising when the approval cutoff sits exactly at
/// `target`: every segment approves from its top choice down through the
/// target, except that no segment ever approves only because of its
/// least-preferred candidate.
#[derive(PartialEq, Debug, Clone)]
pub struct ApprovalProfileStats {
    pub target: String,
    pub approvals: Vec<(String, f64)>,
    pub winner: String,
}

/// Everything the closed-form analysis derives from a set of candidate
/// positions.
#[derive(PartialEq, Debug, Clone)]
pub struct ElectionAnalysis {
    pub segments: Vec<SegmentStats>,
    pub pairwise: Vec<PairwiseStats>,
    pub condorcet: CondorcetStats,
    pub borda: BordaStats,
    pub rcv_rounds: Vec<RcvRoundStats>,
    pub approval_profiles: Vec<ApprovalProfileStats>,
}

/// Win frequencies after running the stochastic approval model.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct MonteCarloStats {
    /// Win counts in candidate order. They sum to the number of trials.
    pub wins: Vec<(String, u32)>,
}

/// One computed step of the threshold-equilibrium simulation.
#[derive(PartialEq, Debug, Clone)]
pub struct SimulationStep {
    pub step: u32,
    /// Approval counts in candidate order.
    pub approvals: Vec<(String, u32)>,
    pub winner: String,
    /// Candidates within the viability margin of the leader.
    pub viable: Vec<String>,
    /// Distinct non-empty ballots (approved candidates, nearest first) with
    /// the number of voters casting each.
    pub ballots: Vec<(Vec<String>, u32)>,
    /// Mean number of approvals per voter, empty ballots included.
    pub mean_ballot_size: f64,
    /// Snapshot of every voter's threshold at this step.
    pub thresholds: Vec<f64>,
}

/// Errors raised when the hard precondition on the electorate is violated.
///
/// Everything else (degenerate positions, missing Condorcet winner, empty
/// ballots) is represented as data in the results, never as an error.
#[derive(PartialEq, Debug, Clone)]
pub enum AnalysisErrors {
    NotEnoughCandidates,
    TooManyCandidates,
    PositionOutOfRange { name: String, position: f64 },
}

impl Error for AnalysisErrors {}

impl Display for AnalysisErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisErrors::NotEnoughCandidates => {
                write!(f, "an electorate requires at least 2 candidates")
            }
            AnalysisErrors::TooManyCandidates => {
                write!(f, "an electorate supports at most 4 candidates")
            }
            AnalysisErrors::PositionOutOfRange { name, position } => {
                write!(
                    f,
                    "candidate {} has position {} outside the open interval (0,1)",
                    name, position
                )
            }
        }
    }
}
