//! Deterministic finite-population simulation of strategic approval
//! thresholds: voters adapt their approval radius round over round until
//! the cast ballots stabilize.

use log::{debug, info};

use std::collections::HashMap;

use crate::config::*;
use crate::{candidate_name, check_electorate, CandidateId};

/// Hard cap on adaptation steps; non-convergence within the cap is a
/// reported outcome, not an error.
pub const STEP_CAP: usize = 50;

/// Margin added or subtracted when a voter places its threshold right at a
/// candidate's distance.
pub const STEP_EPSILON: f64 = 1e-3;

// A candidate within this fraction of the leader's approvals is viable.
const VIABILITY_MARGIN: f64 = 0.03;

// **** Seeded generation ****

// Numerical-recipes linear congruential generator over u32 state.
struct Lcg {
    state: u32,
}

impl Lcg {
    fn new(seed: u32) -> Lcg {
        Lcg { state: seed }
    }

    fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state as f64 / 4294967296.0
    }
}

// A single draw from a fresh generator. Each distinct purpose (sincerity
// designation, per-step adoption) derives its own seed so no mutable
// generator state is ever shared across purposes.
fn single_draw(seed: u32) -> f64 {
    Lcg::new(seed).next_f64()
}

/// Samples `n` voter positions in [0,1] from a fresh generator seeded with
/// `seed`. The population is a pure function of its arguments: callers that
/// want to "redistribute" voters pass a new seed.
pub fn sample_voter_positions(n: usize, seed: u32) -> Vec<f64> {
    let mut lcg = Lcg::new(seed);
    (0..n).map(|_| lcg.next_f64()).collect()
}

// **** Voter geometry ****

// Distances from one voter to every candidate, plus the candidates in
// nearest-first order (stable under ties).
struct VoterGeometry {
    order: Vec<CandidateId>,
    dist: Vec<f64>,
}

impl VoterGeometry {
    fn new(position: f64, candidate_positions: &[f64]) -> VoterGeometry {
        let dist: Vec<f64> = candidate_positions
            .iter()
            .map(|p| (position - p).abs())
            .collect();
        let order = crate::rank_by_distance(position, candidate_positions);
        VoterGeometry { order, dist }
    }

    fn nearest(&self) -> CandidateId {
        self.order[0]
    }

    // The last element of the stable nearest-first order: among tied
    // maximal distances, the latest-declared candidate.
    fn farthest_distance(&self) -> f64 {
        self.dist[self.order[self.order.len() - 1].0 as usize]
    }

    fn distance_to(&self, cid: CandidateId) -> f64 {
        self.dist[cid.0 as usize]
    }
}

// The approval set at threshold `r`, nearest first. With the basic strategy
// the nearest candidate is always approved and the farthest never is; the
// threshold only decides the middle ranks. Without it the threshold applies
// to every candidate, so the ballot can be empty or name everyone.
fn approval_ballot(voter: &VoterGeometry, r: f64, basic_strategy: bool) -> Vec<CandidateId> {
    let last = voter.order.len() - 1;
    voter
        .order
        .iter()
        .enumerate()
        .filter_map(|(rank, cid)| {
            let within = voter.distance_to(*cid) <= r;
            let approved = if basic_strategy {
                rank == 0 || (rank < last && within)
            } else {
                within
            };
            if approved {
                Some(*cid)
            } else {
                None
            }
        })
        .collect()
}

struct StepInternal {
    approvals: Vec<u32>,
    winner: CandidateId,
    viable: Vec<CandidateId>,
    ballots: HashMap<Vec<CandidateId>, u32>,
    mean_ballot_size: f64,
    thresholds: Vec<f64>,
}

fn compute_step(
    n: usize,
    voters: &[VoterGeometry],
    thresholds: &[f64],
    basic_strategy: bool,
) -> StepInternal {
    let mut approvals = vec![0u32; n];
    let mut ballots: HashMap<Vec<CandidateId>, u32> = HashMap::new();
    let mut total_approvals: usize = 0;

    for (voter, r) in voters.iter().zip(thresholds.iter()) {
        let ballot = approval_ballot(voter, *r, basic_strategy);
        total_approvals += ballot.len();
        for cid in ballot.iter() {
            approvals[cid.0 as usize] += 1;
        }
        if !ballot.is_empty() {
            *ballots.entry(ballot).or_insert(0) += 1;
        }
    }

    let mut winner = CandidateId(0);
    for i in 0..n {
        if approvals[i] > approvals[winner.0 as usize] {
            winner = CandidateId(i as u32);
        }
    }
    let leader_count = approvals[winner.0 as usize] as f64;
    let viable: Vec<CandidateId> = (0..n)
        .filter(|i| approvals[*i] as f64 >= leader_count * (1.0 - VIABILITY_MARGIN))
        .map(|i| CandidateId(i as u32))
        .collect();

    let mean_ballot_size = if voters.is_empty() {
        0.0
    } else {
        total_approvals as f64 / voters.len() as f64
    };

    StepInternal {
        approvals,
        winner,
        viable,
        ballots,
        mean_ballot_size,
        thresholds: thresholds.to_vec(),
    }
}

// The strategic threshold a voter would adopt given the previous step's
// viable set.
fn proposed_threshold(voter: &VoterGeometry, viable: &[CandidateId], tau0: f64) -> f64 {
    let d_far = voter.farthest_distance();
    if let [frontrunner] = viable[..] {
        let d_f = voter.distance_to(frontrunner);
        if voter.nearest() == frontrunner {
            // Bullet vote on the frontrunner. Deliberately not clamped
            // against d_far - epsilon, unlike the other branches.
            d_f + STEP_EPSILON
        } else if d_f <= tau0 {
            // The frontrunner sits within the sincere comfort zone:
            // approve it and everyone preferred to it, but never the
            // least-favorite.
            (d_f + STEP_EPSILON).min(d_far - STEP_EPSILON)
        } else {
            // Approve only those strictly preferred to the frontrunner.
            (d_f - STEP_EPSILON).min(d_far - STEP_EPSILON)
        }
    } else {
        let d_nearest_viable = viable
            .iter()
            .map(|cid| voter.distance_to(*cid))
            .fold(f64::INFINITY, f64::min);
        (d_nearest_viable + STEP_EPSILON).min(d_far - STEP_EPSILON)
    }
}

/// Runs the iterative strategic-threshold simulation to equilibrium.
///
/// Step 0 applies the sincere threshold to every voter. Each later step
/// proposes per-voter thresholds from the previous step's viable set;
/// permanently sincere voters keep the initial threshold, and the remaining
/// voters adopt their proposal only when their per-step adoption draw
/// succeeds. A run whose thresholds never leave the sincere values stops at
/// step 0 alone; every other run stops when a computed step casts exactly
/// the same ballot multiset as the previous one, or at the step cap. The
/// full list of computed steps is returned.
pub fn run_threshold_equilibrium(
    candidates: &[Candidate],
    params: &EquilibriumParams,
) -> Result<Vec<SimulationStep>, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    let n = candidates.len();
    let seed = params.seed;
    info!(
        "run_threshold_equilibrium: {} voters, {} candidates, seed {}, tau0 {}",
        params.num_voters, n, seed, params.initial_threshold
    );

    let voters: Vec<VoterGeometry> = sample_voter_positions(params.num_voters, seed)
        .iter()
        .map(|p| VoterGeometry::new(*p, &positions))
        .collect();

    // Fixed at sampling time: these voters never adopt a strategic update.
    let sincere: Vec<bool> = (0..params.num_voters)
        .map(|i| {
            single_draw(seed.wrapping_mul(10000).wrapping_add(i as u32))
                < params.sincere_proportion
        })
        .collect();

    let mut thresholds = vec![params.initial_threshold; params.num_voters];
    let mut steps: Vec<StepInternal> = Vec::new();
    steps.push(compute_step(n, &voters, &thresholds, params.basic_strategy));

    for t in 1..=STEP_CAP {
        let prev = steps.last().expect("step 0 is always present");
        let mut next_thresholds = Vec::with_capacity(params.num_voters);
        for (i, voter) in voters.iter().enumerate() {
            let next = if sincere[i] {
                params.initial_threshold
            } else {
                let adoption_seed = seed
                    .wrapping_add((t as u32).wrapping_mul(1000))
                    .wrapping_add(i as u32);
                if single_draw(adoption_seed) < params.update_rate {
                    proposed_threshold(voter, &prev.viable, params.initial_threshold)
                } else {
                    thresholds[i]
                }
            };
            next_thresholds.push(next);
        }

        // Nobody ever deviates from the sincere threshold: step 0 already
        // is the equilibrium. Once a strategic step has been recorded,
        // stable thresholds fall through so the run closes on a
        // ballot-identical step pair.
        if next_thresholds == thresholds && steps.len() == 1 {
            debug!("step {}: thresholds stable at step 0, stopping", t);
            break;
        }

        let step = compute_step(n, &voters, &next_thresholds, params.basic_strategy);
        let converged = step.ballots == prev.ballots;
        debug!(
            "step {}: winner {:?}, viable {:?}, converged: {}",
            t, step.winner, step.viable, converged
        );
        steps.push(step);
        thresholds = next_thresholds;
        if converged {
            break;
        }
    }

    Ok(steps
        .iter()
        .enumerate()
        .map(|(idx, s)| step_to_stats(candidates, idx as u32, s))
        .collect())
}

fn step_to_stats(candidates: &[Candidate], index: u32, step: &StepInternal) -> SimulationStep {
    let mut ballots: Vec<(Vec<CandidateId>, u32)> =
        step.ballots.iter().map(|(k, v)| (k.clone(), *v)).collect();
    ballots.sort();
    SimulationStep {
        step: index,
        approvals: candidates
            .iter()
            .zip(step.approvals.iter())
            .map(|(c, a)| (c.name.clone(), *a))
            .collect(),
        winner: candidate_name(candidates, step.winner),
        viable: step
            .viable
            .iter()
            .map(|cid| candidate_name(candidates, *cid))
            .collect(),
        ballots: ballots
            .iter()
            .map(|(k, v)| {
                (
                    k.iter()
                        .map(|cid| candidate_name(candidates, *cid))
                        .collect(),
                    *v,
                )
            })
            .collect(),
        mean_ballot_size: step.mean_ballot_size,
        thresholds: step.thresholds.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn electorate(positions: &[f64]) -> Vec<Candidate> {
        positions
            .iter()
            .enumerate()
            .map(|(idx, p)| Candidate::new(&format!("C{}", idx + 1), *p))
            .collect()
    }

    fn params(seed: u32) -> EquilibriumParams {
        EquilibriumParams {
            num_voters: 200,
            initial_threshold: 0.25,
            basic_strategy: true,
            update_rate: 0.5,
            sincere_proportion: 0.1,
            seed,
        }
    }

    #[test]
    fn lcg_first_draw_is_fixed() {
        // state_1 = 0 * 1664525 + 1013904223.
        assert_eq!(single_draw(0), 1013904223.0 / 4294967296.0);
    }

    #[test]
    fn voter_sampling_is_reproducible() {
        let a = sample_voter_positions(100, 42);
        let b = sample_voter_positions(100, 42);
        let c = sample_voter_positions(100, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|p| (0.0..1.0).contains(p)));
    }

    #[test]
    fn identical_seeds_give_identical_step_sequences() {
        let cands = electorate(&[0.2, 0.5, 0.8]);
        let a = run_threshold_equilibrium(&cands, &params(17)).unwrap();
        let b = run_threshold_equilibrium(&cands, &params(17)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn all_sincere_voters_converge_at_step_zero() {
        let cands = electorate(&[0.2, 0.5, 0.8]);
        let mut p = params(5);
        p.sincere_proportion = 1.0;
        let steps = run_threshold_equilibrium(&cands, &p).unwrap();
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn step_count_never_exceeds_the_cap() {
        for seed in [1, 2, 3, 99] {
            let cands = electorate(&[0.15, 0.4, 0.6, 0.85]);
            let steps = run_threshold_equilibrium(&cands, &params(seed)).unwrap();
            assert!(steps.len() <= STEP_CAP + 1);
            assert!(!steps.is_empty());
            for (idx, s) in steps.iter().enumerate() {
                assert_eq!(s.step, idx as u32);
                assert_eq!(s.thresholds.len(), 200);
            }
        }
    }

    #[test]
    fn converged_runs_end_with_identical_ballot_multisets() {
        let cands = electorate(&[0.2, 0.5, 0.8]);
        for seed in [7, 11, 23] {
            let mut p = params(seed);
            // Synchronous updates and no sincere voters: every strategic
            // run either hits the cap or closes on a ballot-identical
            // step pair.
            p.update_rate = 1.0;
            p.sincere_proportion = 0.0;
            let steps = run_threshold_equilibrium(&cands, &p).unwrap();
            if steps.len() >= 2 && steps.len() <= STEP_CAP {
                let last = &steps[steps.len() - 1];
                let prev = &steps[steps.len() - 2];
                assert_eq!(last.ballots, prev.ballots, "seed {}", seed);
            }
        }
    }

    #[test]
    fn basic_strategy_always_bullet_votes_with_two_candidates() {
        // With the basic strategy the nearest candidate is approved and the
        // farthest never is, so two-candidate ballots always name exactly
        // one candidate.
        let cands = electorate(&[0.3, 0.7]);
        let mut p = params(23);
        p.num_voters = 50;
        let steps = run_threshold_equilibrium(&cands, &p).unwrap();
        for s in steps.iter() {
            for (ballot, _) in s.ballots.iter() {
                assert_eq!(ballot.len(), 1);
            }
            let approvals: u32 = s.approvals.iter().map(|(_, a)| a).sum();
            assert_eq!(approvals, 50);
        }
    }

    #[test]
    fn empty_ballots_are_excluded_from_the_multiset() {
        // Without the basic strategy a zero threshold approves nobody.
        let cands = electorate(&[0.3, 0.7]);
        let p = EquilibriumParams {
            num_voters: 30,
            initial_threshold: 0.0,
            basic_strategy: false,
            update_rate: 1.0,
            sincere_proportion: 1.0,
            seed: 3,
        };
        let steps = run_threshold_equilibrium(&cands, &p).unwrap();
        assert_eq!(steps.len(), 1);
        let step = &steps[0];
        assert!(step.ballots.is_empty());
        assert!(step.approvals.iter().all(|(_, a)| *a == 0));
        assert_eq!(step.mean_ballot_size, 0.0);
        // Argmax over all-zero counts falls back to declaration order.
        assert_eq!(step.winner, "C1");
        assert_eq!(step.viable.len(), 2);
    }

    #[test]
    fn bullet_vote_branch_is_not_clamped() {
        // Single viable frontrunner which is also the voter's nearest
        // candidate: the proposal is exactly d_F + epsilon even when that
        // exceeds d_far - epsilon. Candidates 0.001 apart pin the
        // asymmetry: the unclamped threshold reaches the far candidate.
        let voter = VoterGeometry::new(0.5, &[0.5, 0.501]);
        let proposal = proposed_threshold(&voter, &[CandidateId(0)], 0.25);
        assert_eq!(proposal, STEP_EPSILON);
        assert!(proposal > voter.farthest_distance() - STEP_EPSILON);
    }

    #[test]
    fn non_frontrunner_branches_avoid_the_least_favorite() {
        // Frontrunner within the comfort zone but not nearest: clamped to
        // d_far - epsilon.
        let voter = VoterGeometry::new(0.1, &[0.15, 0.2]);
        let proposal = proposed_threshold(&voter, &[CandidateId(1)], 0.25);
        assert_eq!(proposal, (0.1f64 + STEP_EPSILON).min(0.1 - STEP_EPSILON));

        // Frontrunner outside the comfort zone: approve only strict
        // preferences. Both candidates sit at the same distance bound here.
        let voter = VoterGeometry::new(0.1, &[0.2, 0.8]);
        let proposal = proposed_threshold(&voter, &[CandidateId(1)], 0.25);
        assert_eq!(proposal, (0.1f64 - 0.8).abs() - STEP_EPSILON);
    }

    #[test]
    fn multiple_viable_candidates_target_the_nearest() {
        let voter = VoterGeometry::new(0.0, &[0.3, 0.5, 0.9]);
        let proposal =
            proposed_threshold(&voter, &[CandidateId(0), CandidateId(1)], 0.25);
        assert_eq!(proposal, (0.3 + STEP_EPSILON).min(0.9 - STEP_EPSILON));
    }
}
