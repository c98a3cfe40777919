use log::{debug, info};

use spatial_voting::*;
use snafu::{prelude::*, Snafu};

use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;

use crate::analysis::config_reader::*;

#[derive(Debug, Snafu)]
pub enum AvError {
    #[snafu(display("Error opening config file {path}"))]
    OpeningConfig {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    ParsingConfig { source: serde_json::Error },
    #[snafu(display("Candidate {name} has a non-numeric position"))]
    InvalidPosition { name: String },
    #[snafu(display("Unknown voter distribution: {name}"))]
    UnknownDistribution { name: String },
    #[snafu(display("Error writing output file {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type AvResult<T> = Result<T, AvError>;

pub mod config_reader {
    use super::*;

    #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct CandidateEntry {
        pub name: String,
        pub position: f64,
    }

    #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct MonteCarloSection {
        pub trials: u32,
        /// "uniform" (default) or "gaussian".
        pub distribution: Option<String>,
    }

    #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct EquilibriumSection {
        #[serde(rename = "numVoters")]
        pub num_voters: usize,
        #[serde(rename = "initialThreshold")]
        pub initial_threshold: f64,
        #[serde(rename = "basicStrategy")]
        pub basic_strategy: Option<bool>,
        #[serde(rename = "updateRate")]
        pub update_rate: f64,
        #[serde(rename = "sincereProportion")]
        pub sincere_proportion: f64,
        pub seed: u32,
    }

    #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct AnalysisConfig {
        pub candidates: Vec<CandidateEntry>,
        #[serde(rename = "monteCarlo")]
        pub monte_carlo: Option<MonteCarloSection>,
        pub equilibrium: Option<EquilibriumSection>,
    }
}

pub fn parse_config(contents: &str) -> AvResult<AnalysisConfig> {
    let config: AnalysisConfig = serde_json::from_str(contents).context(ParsingConfigSnafu)?;
    debug!("parse_config: {:?}", config);
    Ok(config)
}

pub fn load_config(path: &str) -> AvResult<AnalysisConfig> {
    let contents = fs::read_to_string(path).context(OpeningConfigSnafu { path })?;
    parse_config(&contents)
}

// The UI side of the contract owns clamping: positions are clamped to
// [0.01, 0.99] and rounded to 2 decimals before they reach the core.
pub fn clamp_position(position: f64) -> f64 {
    (position.clamp(0.01, 0.99) * 100.0).round() / 100.0
}

pub fn validate_candidates(config: &AnalysisConfig) -> AvResult<Vec<Candidate>> {
    let mut candidates: Vec<Candidate> = Vec::new();
    for entry in config.candidates.iter() {
        ensure!(
            entry.position.is_finite(),
            InvalidPositionSnafu {
                name: entry.name.clone()
            }
        );
        candidates.push(Candidate::new(&entry.name, clamp_position(entry.position)));
    }
    Ok(candidates)
}

fn validate_monte_carlo(section: &MonteCarloSection) -> AvResult<MonteCarloParams> {
    let distribution = match section.distribution.as_deref() {
        None | Some("uniform") => VoterDistribution::Uniform,
        Some("gaussian") => VoterDistribution::Gaussian,
        Some(name) => {
            return Err(AvError::UnknownDistribution {
                name: name.to_string(),
            })
        }
    };
    Ok(MonteCarloParams {
        trials: section.trials,
        distribution,
    })
}

fn validate_equilibrium(section: &EquilibriumSection) -> AvResult<EquilibriumParams> {
    Ok(EquilibriumParams {
        num_voters: section.num_voters,
        initial_threshold: section.initial_threshold.clamp(0.0, 1.0),
        basic_strategy: section.basic_strategy.unwrap_or(true),
        update_rate: section.update_rate.clamp(0.1, 1.0),
        sincere_proportion: section.sincere_proportion.clamp(0.0, 1.0),
        seed: section.seed,
    })
}

fn format_ranking(ranking: &[String]) -> String {
    ranking.join(">")
}

fn analysis_to_json(analysis: &ElectionAnalysis) -> JSValue {
    let segments: Vec<JSValue> = analysis
        .segments
        .iter()
        .map(|s| {
            json!({
                "ranking": format_ranking(&s.ranking),
                "proportion": s.proportion,
            })
        })
        .collect();

    let pairwise: Vec<JSValue> = analysis
        .pairwise
        .iter()
        .map(|p| {
            json!({
                "matchup": format!("{} vs {}", p.first, p.second),
                "winner": p.winner,
                "score": p.winner_share,
            })
        })
        .collect();

    let mut wins: JSMap<String, JSValue> = JSMap::new();
    for (name, count) in analysis.condorcet.wins.iter() {
        wins.insert(name.clone(), json!(count));
    }

    let mut borda_scores: JSMap<String, JSValue> = JSMap::new();
    for (name, score) in analysis.borda.scores.iter() {
        borda_scores.insert(name.clone(), json!(score));
    }

    let rcv_rounds: Vec<JSValue> = analysis
        .rcv_rounds
        .iter()
        .map(|r| match &r.winner {
            Some(winner) => json!({ "winner": winner }),
            None => {
                let mut tally: JSMap<String, JSValue> = JSMap::new();
                for (name, share) in r.tally.iter() {
                    tally.insert(name.clone(), json!(share));
                }
                json!({
                    "round": r.round,
                    "tally": tally,
                    "eliminated": r.eliminated,
                })
            }
        })
        .collect();

    let mut profiles: JSMap<String, JSValue> = JSMap::new();
    for p in analysis.approval_profiles.iter() {
        let mut approvals: JSMap<String, JSValue> = JSMap::new();
        for (name, measure) in p.approvals.iter() {
            approvals.insert(name.clone(), json!(measure));
        }
        profiles.insert(
            p.target.clone(),
            json!({ "approvals": approvals, "winner": p.winner }),
        );
    }

    json!({
        "segments": segments,
        "pairwise": pairwise,
        "condorcet": { "winner": analysis.condorcet.winner, "wins": wins },
        "borda": { "scores": borda_scores, "winner": analysis.borda.winner },
        "rcvRounds": rcv_rounds,
        "avProfiles": profiles,
    })
}

fn monte_carlo_to_json(stats: &MonteCarloStats) -> JSValue {
    let mut wins: JSMap<String, JSValue> = JSMap::new();
    for (name, count) in stats.wins.iter() {
        wins.insert(name.clone(), json!(count));
    }
    json!({ "wins": wins })
}

fn steps_to_json(steps: &[SimulationStep]) -> JSValue {
    let l: Vec<JSValue> = steps
        .iter()
        .map(|s| {
            let mut approvals: JSMap<String, JSValue> = JSMap::new();
            for (name, count) in s.approvals.iter() {
                approvals.insert(name.clone(), json!(count));
            }
            let ballots: Vec<JSValue> = s
                .ballots
                .iter()
                .map(|(ballot, count)| {
                    json!({ "ballot": format_ranking(ballot), "count": count })
                })
                .collect();
            json!({
                "step": s.step,
                "approvals": approvals,
                "winner": s.winner,
                "viable": s.viable,
                "ballots": ballots,
                "meanBallotSize": s.mean_ballot_size,
            })
        })
        .collect();
    json!(l)
}

/// Runs everything the config asks for and assembles the JSON summary.
pub fn run_analysis(config: &AnalysisConfig) -> AvResult<JSValue> {
    let candidates = validate_candidates(config)?;
    info!("run_analysis: {} candidates", candidates.len());

    let analysis = match run_spatial_analysis(&candidates) {
        Ok(a) => a,
        Err(e) => whatever!("Invalid electorate: {}", e),
    };
    let mut summary = analysis_to_json(&analysis);

    if let Some(section) = &config.monte_carlo {
        let params = validate_monte_carlo(section)?;
        let stats = match run_monte_carlo(&candidates, &params) {
            Ok(s) => s,
            Err(e) => whatever!("Monte Carlo simulation failed: {}", e),
        };
        summary["monteCarlo"] = monte_carlo_to_json(&stats);
    }

    if let Some(section) = &config.equilibrium {
        let params = validate_equilibrium(section)?;
        let steps = match run_threshold_equilibrium(&candidates, &params) {
            Ok(s) => s,
            Err(e) => whatever!("Equilibrium simulation failed: {}", e),
        };
        info!("run_analysis: equilibrium finished after {} steps", steps.len());
        summary["equilibrium"] = steps_to_json(&steps);
    }

    Ok(summary)
}

pub fn write_summary(summary: &JSValue, out: &Option<String>) -> AvResult<()> {
    let pretty = match serde_json::to_string_pretty(summary) {
        Ok(s) => s,
        Err(e) => whatever!("Could not serialize the summary: {}", e),
    };
    match out {
        Some(path) if path.as_str() != "stdout" => {
            fs::write(path, pretty).context(WritingOutputSnafu { path })?;
        }
        _ => {
            println!("{}", pretty);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "candidates": [
            {"name": "Alice", "position": 0.2},
            {"name": "Bob", "position": 0.5},
            {"name": "Charlie", "position": 0.8}
        ],
        "monteCarlo": {"trials": 10, "distribution": "gaussian"},
        "equilibrium": {
            "numVoters": 50,
            "initialThreshold": 0.25,
            "basicStrategy": true,
            "updateRate": 0.5,
            "sincereProportion": 0.1,
            "seed": 42
        }
    }"#;

    #[test]
    fn parses_a_full_config() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.candidates.len(), 3);
        assert_eq!(config.monte_carlo.as_ref().unwrap().trials, 10);
        assert_eq!(config.equilibrium.as_ref().unwrap().num_voters, 50);
    }

    #[test]
    fn parses_a_minimal_config() {
        let config = parse_config(
            r#"{"candidates": [{"name": "A", "position": 0.3}, {"name": "B", "position": 0.7}]}"#,
        )
        .unwrap();
        assert!(config.monte_carlo.is_none());
        assert!(config.equilibrium.is_none());
    }

    #[test]
    fn clamps_positions_like_the_drag_surface() {
        assert_eq!(clamp_position(1.5), 0.99);
        assert_eq!(clamp_position(-0.3), 0.01);
        assert_eq!(clamp_position(0.333), 0.33);
        assert_eq!(clamp_position(0.5), 0.5);
    }

    #[test]
    fn rejects_non_numeric_positions() {
        let config = AnalysisConfig {
            candidates: vec![config_reader::CandidateEntry {
                name: "A".to_string(),
                position: f64::NAN,
            }],
            monte_carlo: None,
            equilibrium: None,
        };
        let res = validate_candidates(&config);
        assert!(matches!(res, Err(AvError::InvalidPosition { .. })));
    }

    #[test]
    fn rejects_unknown_distributions() {
        let section = MonteCarloSection {
            trials: 5,
            distribution: Some("poisson".to_string()),
        };
        let res = validate_monte_carlo(&section);
        assert!(matches!(res, Err(AvError::UnknownDistribution { .. })));
    }

    #[test]
    fn runs_the_full_summary() {
        let config = parse_config(SAMPLE).unwrap();
        let summary = run_analysis(&config).unwrap();
        assert_eq!(summary["condorcet"]["winner"], json!("Bob"));
        assert!(summary["segments"].as_array().unwrap().len() >= 3);
        let mc_wins = summary["monteCarlo"]["wins"].as_object().unwrap();
        let total: u64 = mc_wins.values().map(|v| v.as_u64().unwrap()).sum();
        assert_eq!(total, 10);
        let steps = summary["equilibrium"].as_array().unwrap();
        assert!(!steps.is_empty() && steps.len() <= 51);
    }
}
