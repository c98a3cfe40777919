mod approval;
mod builder;
mod config;
mod equilibrium;

use log::{debug, info};

use std::collections::HashMap;

pub use crate::approval::{approval_profiles, run_monte_carlo};
pub use crate::builder::ElectorateBuilder;
pub use crate::config::*;
pub use crate::equilibrium::{
    run_threshold_equilibrium, sample_voter_positions, STEP_CAP, STEP_EPSILON,
};

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub(crate) struct CandidateId(pub(crate) u32);

/// A maximal voter class: a strict ranking of the candidates by proximity
/// (nearest first) and the share of the electorate holding it.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct Segment {
    pub(crate) ranking: Vec<CandidateId>,
    pub(crate) proportion: f64,
}

// Segments below this merged proportion are numerically void and dropped.
const VOID_PROPORTION: f64 = 1e-4;

// Tallies within this margin of the minimum are tied for last in a round.
const RCV_TIE_EPSILON: f64 = 1e-4;

/// Checks the hard precondition on the electorate: 2 to 4 candidates with
/// finite positions in the open interval (0,1). Returns the positions in
/// declaration order.
pub(crate) fn check_electorate(candidates: &[Candidate]) -> Result<Vec<f64>, AnalysisErrors> {
    if candidates.len() < 2 {
        return Err(AnalysisErrors::NotEnoughCandidates);
    }
    if candidates.len() > 4 {
        return Err(AnalysisErrors::TooManyCandidates);
    }
    for c in candidates.iter() {
        if !c.position.is_finite() || c.position <= 0.0 || c.position >= 1.0 {
            return Err(AnalysisErrors::PositionOutOfRange {
                name: c.name.clone(),
                position: c.position,
            });
        }
    }
    Ok(candidates.iter().map(|c| c.position).collect())
}

pub(crate) fn candidate_name(candidates: &[Candidate], cid: CandidateId) -> String {
    candidates[cid.0 as usize].name.clone()
}

/// Ranks all the candidates by distance to `point`, nearest first. The sort
/// is stable, so equidistant candidates stay in declaration order.
pub(crate) fn rank_by_distance(point: f64, positions: &[f64]) -> Vec<CandidateId> {
    let mut ids: Vec<CandidateId> = (0..positions.len() as u32).map(CandidateId).collect();
    ids.sort_by(|a, b| {
        let da = (point - positions[a.0 as usize]).abs();
        let db = (point - positions[b.0 as usize]).abs();
        da.total_cmp(&db)
    });
    ids
}

/// Partitions [0,1] into the maximal ranking classes induced by the
/// candidate positions.
///
/// Breakpoints are 0, 1, every candidate position and every pairwise
/// midpoint. Between two consecutive breakpoints the ranking is constant, so
/// it is probed at the midpoint of the interval. Intervals sharing the same
/// ranking are merged even when they are not adjacent, which is why the
/// accumulation goes through a map keyed by the ranking sequence.
pub(crate) fn preference_segments_internal(positions: &[f64]) -> Vec<Segment> {
    let n = positions.len();
    let mut points: Vec<f64> = vec![0.0, 1.0];
    points.extend_from_slice(positions);
    for i in 0..n {
        for j in (i + 1)..n {
            points.push((positions[i] + positions[j]) / 2.0);
        }
    }
    points.sort_by(f64::total_cmp);
    points.dedup();

    let mut segments: Vec<Segment> = Vec::new();
    let mut by_ranking: HashMap<Vec<CandidateId>, usize> = HashMap::new();
    for w in points.windows(2) {
        let proportion = w[1] - w[0];
        let probe = (w[0] + w[1]) / 2.0;
        let ranking = rank_by_distance(probe, positions);
        match by_ranking.get(&ranking) {
            Some(&idx) => segments[idx].proportion += proportion,
            None => {
                by_ranking.insert(ranking.clone(), segments.len());
                segments.push(Segment {
                    ranking,
                    proportion,
                });
            }
        }
    }
    segments.retain(|s| s.proportion > VOID_PROPORTION);
    debug!(
        "preference_segments: {} breakpoints, {} distinct rankings",
        points.len(),
        segments.len()
    );
    segments
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub(crate) struct PairwiseOutcome {
    pub(crate) first: CandidateId,
    pub(crate) second: CandidateId,
    pub(crate) winner: CandidateId,
    pub(crate) winner_share: f64,
}

fn rank_position(ranking: &[CandidateId], cid: CandidateId) -> usize {
    ranking
        .iter()
        .position(|c| *c == cid)
        .expect("every segment ranks every candidate")
}

/// All the two-candidate majority comparisons over the distribution.
///
/// An exact 0.5 split is a measure-zero case; it resolves in favor of the
/// second candidate of the pair since the first needs a strict majority.
pub(crate) fn pairwise_outcomes(n: usize, segments: &[Segment]) -> Vec<PairwiseOutcome> {
    let mut res: Vec<PairwiseOutcome> = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let a = CandidateId(i as u32);
            let b = CandidateId(j as u32);
            let mut share_a = 0.0;
            for seg in segments.iter() {
                if rank_position(&seg.ranking, a) < rank_position(&seg.ranking, b) {
                    share_a += seg.proportion;
                }
            }
            let (winner, winner_share) = if share_a > 0.5 {
                (a, share_a)
            } else {
                (b, 1.0 - share_a)
            };
            res.push(PairwiseOutcome {
                first: a,
                second: b,
                winner,
                winner_share,
            });
        }
    }
    res
}

/// Pairwise win counts and the Condorcet winner, if any: the candidate with
/// n-1 pairwise wins.
pub(crate) fn condorcet_internal(
    n: usize,
    outcomes: &[PairwiseOutcome],
) -> (Option<CandidateId>, Vec<u32>) {
    let mut wins = vec![0u32; n];
    for o in outcomes.iter() {
        wins[o.winner.0 as usize] += 1;
    }
    let winner = (0..n)
        .map(|i| CandidateId(i as u32))
        .find(|cid| wins[cid.0 as usize] == (n - 1) as u32);
    (winner, wins)
}

/// Reverse Borda scores: each segment adds its 1-indexed rank position,
/// weighted by proportion, to every candidate. Lower is better.
pub(crate) fn borda_scores_internal(n: usize, segments: &[Segment]) -> Vec<f64> {
    let mut scores = vec![0.0; n];
    for seg in segments.iter() {
        for (idx, cid) in seg.ranking.iter().enumerate() {
            scores[cid.0 as usize] += (idx + 1) as f64 * seg.proportion;
        }
    }
    scores
}

#[derive(PartialEq, Debug, Clone)]
pub(crate) struct RcvRoundInternal {
    pub(crate) tally: Vec<(CandidateId, f64)>,
    pub(crate) eliminated: Option<CandidateId>,
    pub(crate) winner: Option<CandidateId>,
}

/// Iterative elimination over the distribution.
///
/// Each round tallies first choices among the remaining candidates. A leader
/// above 0.5 wins outright; otherwise the candidate tied for last with the
/// worst (highest) reverse Borda score is eliminated and stripped from every
/// segment ranking. The Borda key is computed once from the unrestricted
/// distribution and reused across rounds.
pub(crate) fn rcv_rounds_internal(
    n: usize,
    segments: &[Segment],
    borda: &[f64],
) -> Vec<RcvRoundInternal> {
    let mut remaining: Vec<CandidateId> = (0..n as u32).map(CandidateId).collect();
    let mut rankings: Vec<(Vec<CandidateId>, f64)> = segments
        .iter()
        .map(|s| (s.ranking.clone(), s.proportion))
        .collect();
    let mut rounds: Vec<RcvRoundInternal> = Vec::new();

    // Each pass either declares a winner or eliminates exactly one
    // candidate, so there are at most n-1 elimination rounds.
    while remaining.len() > 1 && rounds.len() < n {
        let mut tally: Vec<(CandidateId, f64)> =
            remaining.iter().map(|cid| (*cid, 0.0)).collect();
        for (ranking, proportion) in rankings.iter() {
            if let Some(first) = ranking.first() {
                if let Some(t) = tally.iter_mut().find(|(cid, _)| cid == first) {
                    t.1 += proportion;
                }
            }
        }
        debug!("rcv round {}: tally: {:?}", rounds.len() + 1, tally);

        let (leader, leader_share) = tally
            .iter()
            .fold((tally[0].0, f64::MIN), |(best, best_share), &(cid, share)| {
                if share > best_share {
                    (cid, share)
                } else {
                    (best, best_share)
                }
            });
        if leader_share > 0.5 {
            rounds.push(RcvRoundInternal {
                tally: tally.clone(),
                eliminated: None,
                winner: None,
            });
            rounds.push(RcvRoundInternal {
                tally: Vec::new(),
                eliminated: None,
                winner: Some(leader),
            });
            return rounds;
        }

        let min_share = tally
            .iter()
            .map(|(_, share)| *share)
            .fold(f64::INFINITY, f64::min);
        let tied_for_last: Vec<CandidateId> = tally
            .iter()
            .filter_map(|&(cid, share)| {
                if (share - min_share).abs() < RCV_TIE_EPSILON {
                    Some(cid)
                } else {
                    None
                }
            })
            .collect();
        assert!(!tied_for_last.is_empty());

        let eliminated = if tied_for_last.len() == 1 {
            tied_for_last[0]
        } else {
            // Worst average rank goes first.
            let max_borda = tied_for_last
                .iter()
                .map(|cid| borda[cid.0 as usize])
                .fold(f64::MIN, f64::max);
            *tied_for_last
                .iter()
                .find(|cid| borda[cid.0 as usize] == max_borda)
                .expect("a tied candidate carries the maximum Borda score")
        };
        debug!(
            "rcv round {}: tied for last: {:?}, eliminating {:?}",
            rounds.len() + 1,
            tied_for_last,
            eliminated
        );

        rounds.push(RcvRoundInternal {
            tally,
            eliminated: Some(eliminated),
            winner: None,
        });
        remaining.retain(|cid| *cid != eliminated);
        for (ranking, _) in rankings.iter_mut() {
            ranking.retain(|cid| *cid != eliminated);
        }
    }

    // The field drained to a single candidate without a majority leader.
    if let [survivor] = remaining[..] {
        rounds.push(RcvRoundInternal {
            tally: Vec::new(),
            eliminated: None,
            winner: Some(survivor),
        });
    }
    rounds
}

// **** Public entry points ****

/// Derives the exact partition of [0,1] into maximal ranking classes.
///
/// The returned proportions sum to 1 up to numeric tolerance.
pub fn preference_segments(candidates: &[Candidate]) -> Result<Vec<SegmentStats>, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    let segments = preference_segments_internal(&positions);
    Ok(segments
        .iter()
        .map(|s| SegmentStats {
            ranking: s
                .ranking
                .iter()
                .map(|cid| candidate_name(candidates, *cid))
                .collect(),
            proportion: s.proportion,
        })
        .collect())
}

/// All two-candidate majority comparisons, with the winner's share formatted
/// as a percentage.
pub fn pairwise_results(candidates: &[Candidate]) -> Result<Vec<PairwiseStats>, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    let segments = preference_segments_internal(&positions);
    let outcomes = pairwise_outcomes(candidates.len(), &segments);
    Ok(outcomes
        .iter()
        .map(|o| pairwise_to_stats(candidates, o))
        .collect())
}

fn pairwise_to_stats(candidates: &[Candidate], o: &PairwiseOutcome) -> PairwiseStats {
    PairwiseStats {
        first: candidate_name(candidates, o.first),
        second: candidate_name(candidates, o.second),
        winner: candidate_name(candidates, o.winner),
        winner_share: format!("{:.1}%", o.winner_share * 100.0),
    }
}

/// The Condorcet winner, if one exists, along with per-candidate pairwise
/// win counts.
pub fn condorcet_info(candidates: &[Candidate]) -> Result<CondorcetStats, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    let segments = preference_segments_internal(&positions);
    let outcomes = pairwise_outcomes(candidates.len(), &segments);
    let (winner, wins) = condorcet_internal(candidates.len(), &outcomes);
    Ok(condorcet_to_stats(candidates, winner, &wins))
}

fn condorcet_to_stats(
    candidates: &[Candidate],
    winner: Option<CandidateId>,
    wins: &[u32],
) -> CondorcetStats {
    CondorcetStats {
        winner: winner.map(|cid| candidate_name(candidates, cid)),
        wins: candidates
            .iter()
            .zip(wins.iter())
            .map(|(c, w)| (c.name.clone(), *w))
            .collect(),
    }
}

/// Reverse Borda scores over the distribution (lower is better).
pub fn borda_scores(candidates: &[Candidate]) -> Result<BordaStats, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    let segments = preference_segments_internal(&positions);
    let scores = borda_scores_internal(candidates.len(), &segments);
    Ok(borda_to_stats(candidates, &scores))
}

fn borda_to_stats(candidates: &[Candidate], scores: &[f64]) -> BordaStats {
    let min_score = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let winner = scores
        .iter()
        .position(|s| *s == min_score)
        .expect("a candidate carries the minimum Borda score");
    BordaStats {
        scores: candidates
            .iter()
            .zip(scores.iter())
            .map(|(c, s)| (c.name.clone(), *s))
            .collect(),
        winner: candidates[winner].name.clone(),
    }
}

/// Runs the ranked-choice elimination rounds over the distribution.
pub fn rcv_rounds(candidates: &[Candidate]) -> Result<Vec<RcvRoundStats>, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    let segments = preference_segments_internal(&positions);
    let borda = borda_scores_internal(candidates.len(), &segments);
    let rounds = rcv_rounds_internal(candidates.len(), &segments, &borda);
    Ok(rcv_to_stats(candidates, &rounds))
}

fn rcv_to_stats(candidates: &[Candidate], rounds: &[RcvRoundInternal]) -> Vec<RcvRoundStats> {
    rounds
        .iter()
        .enumerate()
        .map(|(idx, r)| RcvRoundStats {
            round: idx as u32 + 1,
            tally: r
                .tally
                .iter()
                .map(|(cid, share)| (candidate_name(candidates, *cid), *share))
                .collect(),
            eliminated: r.eliminated.map(|cid| candidate_name(candidates, cid)),
            winner: r.winner.map(|cid| candidate_name(candidates, cid)),
        })
        .collect()
}

/// Runs the full closed-form analysis for the given electorate.
///
/// This computes the preference distribution once and evaluates every
/// voting rule on it: pairwise majorities and the Condorcet winner, reverse
/// Borda scores, ranked-choice elimination rounds and the approval critical
/// profiles.
pub fn run_spatial_analysis(candidates: &[Candidate]) -> Result<ElectionAnalysis, AnalysisErrors> {
    let positions = check_electorate(candidates)?;
    info!("run_spatial_analysis: {} candidates", candidates.len());
    for (idx, c) in candidates.iter().enumerate() {
        info!("Candidate {}: {} at {:.3}", idx + 1, c.name, c.position);
    }

    let n = candidates.len();
    let segments = preference_segments_internal(&positions);
    let outcomes = pairwise_outcomes(n, &segments);
    let (winner, wins) = condorcet_internal(n, &outcomes);
    let scores = borda_scores_internal(n, &segments);
    let rounds = rcv_rounds_internal(n, &segments, &scores);
    let profiles = approval::approval_profiles_internal(n, &segments);

    info!(
        "run_spatial_analysis: condorcet winner: {:?}, {} rcv rounds",
        winner,
        rounds.len()
    );

    Ok(ElectionAnalysis {
        segments: segments
            .iter()
            .map(|s| SegmentStats {
                ranking: s
                    .ranking
                    .iter()
                    .map(|cid| candidate_name(candidates, *cid))
                    .collect(),
                proportion: s.proportion,
            })
            .collect(),
        pairwise: outcomes
            .iter()
            .map(|o| pairwise_to_stats(candidates, o))
            .collect(),
        condorcet: condorcet_to_stats(candidates, winner, &wins),
        borda: borda_to_stats(candidates, &scores),
        rcv_rounds: rcv_to_stats(candidates, &rounds),
        approval_profiles: approval::profiles_to_stats(candidates, &profiles),
    })
}
