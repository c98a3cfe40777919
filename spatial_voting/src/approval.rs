//! Approval-voting evaluators over the preference distribution: the
//! critical approval profiles and the stochastic Monte Carlo model.

use log::{debug, info};

use rand::Rng;

use crate::config::*;
use crate::{
    candidate_name, check_electorate, preference_segments_internal, CandidateId, Segment,
};

#[derive(PartialEq, Debug, Clone)]
pub(crate) struct ApprovalProfileInternal {
    pub(crate) target: CandidateId,
    pub(crate) approvals: Vec<f64>,
    pub(crate) winner: CandidateId,
}

/// Computes, for every candidate in turn, the approval pattern that arises
/// when the approval cutoff sits exactly at that candidate.
///
/// Each segment approves from its top choice down through the target. When
/// the target is the segment's least-preferred candidate, the segment
/// bullet-votes its top choice instead: nobody approves everyone.
pub(crate) fn approval_profiles_internal(
    n: usize,
    segments: &[Segment],
) -> Vec<ApprovalProfileInternal> {
    let mut profiles: Vec<ApprovalProfileInternal> = Vec::new();
    for t in 0..n {
        let target = CandidateId(t as u32);
        let mut approvals = vec![0.0; n];
        for seg in segments.iter() {
            let idx = seg
                .ranking
                .iter()
                .position(|cid| *cid == target)
                .expect("every segment ranks every candidate");
            if idx == seg.ranking.len() - 1 {
                approvals[seg.ranking[0].0 as usize] += seg.proportion;
            } else {
                for cid in &seg.ranking[..=idx] {
                    approvals[cid.0 as usize] += seg.proportion;
                }
            }
        }
        let winner = argmax_by_candidate_order(&approvals);
        profiles.push(ApprovalProfileInternal {
            target,
            approvals,
            winner,
        });
    }
    profiles
}

// First candidate reaching the maximum wins: ties resolve by declaration
// order.
fn argmax_by_candidate_order(values: &[f64]) -> CandidateId {
    let mut best = 0usize;
    for (idx, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = idx;
        }
    }
    CandidateId(best as u32)
}

pub(crate) fn profiles_to_stats(
    candidates: &[Candidate],
    profiles: &[ApprovalProfileInternal],
) -> Vec<ApprovalProfileStats> {
    profiles
        .iter()
        .map(|p| ApprovalProfileStats {
            target: candidate_name(candidates, p.target),
            approvals: candidates
                .iter()
                .zip(p.approvals.iter())
                .map(|(c, a)| (c.name.clone(), *a))
                .collect(),
            winner: candidate_name(candidates, p.winner),
        })
        .collect()
}

/// Per-candidate critical approval profiles for the given electorate.
pub fn approval_profiles(
    candidates: &[Candidate],
) -> Result<Vec<ApprovalProfileStats>, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    let segments = preference_segments_internal(&positions);
    let profiles = approval_profiles_internal(candidates.len(), &segments);
    Ok(profiles_to_stats(candidates, &profiles))
}

/// Runs the stochastic approval model over the distribution.
///
/// Per trial, every segment approves its top choice with probability 1 and
/// its least-preferred candidate with probability 0; each strictly middle
/// candidate is approved with an independently drawn probability. The trial
/// winner's counter is incremented, so the returned counts sum to the trial
/// count.
///
/// This deliberately uses non-reproducible randomness; the model is an
/// illustrative abstraction, not a calibrated voter-behavior model. For
/// seeded determinism see [`crate::run_threshold_equilibrium`].
pub fn run_monte_carlo(
    candidates: &[Candidate],
    params: &MonteCarloParams,
) -> Result<MonteCarloStats, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    let n = candidates.len();
    info!(
        "run_monte_carlo: {} trials over {} candidates, {:?} draws",
        params.trials, n, params.distribution
    );

    let segments = preference_segments_internal(&positions);
    let mut rng = rand::thread_rng();
    let mut wins = vec![0u32; n];

    for trial in 0..params.trials {
        let mut totals = vec![0.0; n];
        for seg in segments.iter() {
            totals[seg.ranking[0].0 as usize] += seg.proportion;
            for cid in &seg.ranking[1..seg.ranking.len() - 1] {
                let p = approval_probability(&mut rng, params.distribution);
                totals[cid.0 as usize] += seg.proportion * p;
            }
        }
        let winner = argmax_by_candidate_order(&totals);
        wins[winner.0 as usize] += 1;
        debug!("trial {}: totals {:?} winner {:?}", trial, totals, winner);
    }

    Ok(MonteCarloStats {
        wins: candidates
            .iter()
            .zip(wins.iter())
            .map(|(c, w)| (c.name.clone(), *w))
            .collect(),
    })
}

fn approval_probability<R: Rng>(rng: &mut R, distribution: VoterDistribution) -> f64 {
    match distribution {
        VoterDistribution::Uniform => rng.gen::<f64>(),
        VoterDistribution::Gaussian => {
            // Box-Muller transform, clamped to a valid probability. The
            // draws are shifted into (0,1] so the logarithm stays finite.
            let u1 = 1.0 - rng.gen::<f64>();
            let u2 = rng.gen::<f64>();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            (0.5 + 0.2 * z).clamp(0.0, 1.0)
        }
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

    #[test]
    fn critical_profile_of_the_condorcet_winner_matches() {
        // Sanity cross-check for the symmetric configuration only: the
        // critical profile targeted at the median candidate elects it.
        let cands = electorate(&[0.2, 0.5, 0.8]);
        let condorcet = crate::condorcet_info(&cands).unwrap();
        assert_eq!(condorcet.winner, Some("C2".to_string()));

        let profiles = approval_profiles(&cands).unwrap();
        let target = profiles.iter().find(|p| p.target == "C2").unwrap();
        assert_eq!(target.winner, "C2");
    }

    #[test]
    fn profiles_cover_every_candidate() {
        let cands = electorate(&[0.15, 0.4, 0.6, 0.85]);
        let profiles = approval_profiles(&cands).unwrap();
        assert_eq!(profiles.len(), 4);
        for p in profiles.iter() {
            assert_eq!(p.approvals.len(), 4);
            // Approval measures are proportions over the electorate.
            for (_, a) in p.approvals.iter() {
                assert!(*a >= 0.0 && *a <= 1.0 + 1e-9);
            }
        }
    }

    #[test]
    fn monte_carlo_wins_sum_to_trial_count() {
        let cands = electorate(&[0.2, 0.5, 0.8]);
        for distribution in [VoterDistribution::Uniform, VoterDistribution::Gaussian] {
            let params = MonteCarloParams {
                trials: 250,
                distribution,
            };
            let stats = run_monte_carlo(&cands, &params).unwrap();
            let total: u32 = stats.wins.iter().map(|(_, w)| w).sum();
            assert_eq!(total, 250);
        }
    }

    #[test]
    fn monte_carlo_zero_trials_yields_all_zero_counts() {
        let cands = electorate(&[0.3, 0.7]);
        let params = MonteCarloParams {
            trials: 0,
            distribution: VoterDistribution::Uniform,
        };
        let stats = run_monte_carlo(&cands, &params).unwrap();
        assert!(stats.wins.iter().all(|(_, w)| *w == 0));
    }

    #[test]
    fn two_candidate_trials_have_no_middle_draws() {
        // With two candidates every segment bullet-votes its top choice,
        // so the outcome is deterministic: the majority side wins every
        // trial.
        let cands = electorate(&[0.2, 0.6]);
        let params = MonteCarloParams {
            trials: 50,
            distribution: VoterDistribution::Uniform,
        };
        let stats = run_monte_carlo(&cands, &params).unwrap();
        // The midpoint 0.4 leaves C2 the larger side of the interval.
        assert_eq!(stats.wins, vec![("C1".to_string(), 0), ("C2".to_string(), 50)]);
    }
}
