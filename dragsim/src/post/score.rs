use crate::post::race_result::RaceResult;
use serde::{Deserialize, Serialize};

pub const MAX_STARS: u8 = 3;

/// Condition for one performance star.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StarConditionRule {
    Win,
    /// (s) ranked finish time at or below the threshold
    BeatTime { threshold: f64 },
    /// (s) winning lead on the runner-up
    Margin { seconds: f64 },
    NoNitro,
}

impl StarConditionRule {
    pub fn is_met(&self, result: &RaceResult, runner_up: Option<&RaceResult>) -> bool {
        match self {
            StarConditionRule::Win => result.position == 1,
            StarConditionRule::BeatTime { threshold } => result.ranked_time() <= *threshold,
            StarConditionRule::Margin { seconds } => {
                result.position == 1
                    && runner_up
                        .map(|r| r.ranked_time() - result.ranked_time() >= *seconds)
                        .unwrap_or(false)
            }
            StarConditionRule::NoNitro => !result.nitro_used,
        }
    }
}

/// evaluate_stars counts the met rules among the first three. Disqualified results earn no stars.
pub fn evaluate_stars(
    result: &RaceResult,
    rules: &[StarConditionRule],
    runner_up: Option<&RaceResult>,
) -> u8 {
    if result.disqualified {
        return 0;
    }
    rules
        .iter()
        .take(MAX_STARS as usize)
        .filter(|rule| rule.is_met(result, runner_up))
        .count() as u8
}

/// * `base_money` - Money paid for finishing, before multipliers
/// * `base_xp` - Experience for finishing, before multipliers
/// * `winner_multiplier` - Multiplier for position 1
/// * `finisher_multiplier` - Multiplier for every other position
/// * `record_bonus` - Added to the multiplier for a new personal record
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct RewardPolicy {
    pub base_money: f64,
    pub base_xp: f64,
    #[serde(default = "default_winner_multiplier")]
    pub winner_multiplier: f64,
    #[serde(default = "default_finisher_multiplier")]
    pub finisher_multiplier: f64,
    #[serde(default = "default_record_bonus")]
    pub record_bonus: f64,
}

fn default_winner_multiplier() -> f64 {
    2.0
}

fn default_finisher_multiplier() -> f64 {
    1.0
}

fn default_record_bonus() -> f64 {
    0.5
}

impl Default for RewardPolicy {
    fn default() -> Self {
        RewardPolicy {
            base_money: 500.0,
            base_xp: 100.0,
            winner_multiplier: default_winner_multiplier(),
            finisher_multiplier: default_finisher_multiplier(),
            record_bonus: default_record_bonus(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Reward {
    pub money: u64,
    pub xp: u64,
    pub new_record: bool,
}

/// compute_reward scales the base amounts by the position multiplier plus the record bonus. A
/// result is a new record if it beats `prior_best` or if there is no prior best.
pub fn compute_reward(result: &RaceResult, policy: &RewardPolicy, prior_best: Option<f64>) -> Reward {
    if result.disqualified {
        return Reward::default();
    }

    let new_record = match prior_best {
        Some(best) => result.ranked_time() < best,
        None => true,
    };

    let mut multiplier = if result.position == 1 {
        policy.winner_multiplier
    } else {
        policy.finisher_multiplier
    };
    if new_record {
        multiplier += policy.record_bonus;
    }

    Reward {
        money: (policy.base_money * multiplier).round().max(0.0) as u64,
        xp: (policy.base_xp * multiplier).round().max(0.0) as u64,
        new_record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::race_result::tests::test_result;

    #[test]
    fn test_three_stars_for_clean_win() {
        let player = test_result("Player", 1, 10.0);
        let rules = [
            StarConditionRule::Win,
            StarConditionRule::BeatTime { threshold: 12.0 },
            StarConditionRule::NoNitro,
        ];
        assert_eq!(evaluate_stars(&player, &rules, None), 3);
    }

    #[test]
    fn test_only_first_three_rules_count() {
        let player = test_result("Player", 1, 10.0);
        let rules = [StarConditionRule::Win; 5];
        assert_eq!(evaluate_stars(&player, &rules, None), 3);
        assert_eq!(evaluate_stars(&player, &[], None), 0);
    }

    #[test]
    fn test_margin_needs_runner_up() {
        let player = test_result("Player", 1, 10.0);
        let close = test_result("AI", 2, 10.3);
        let far = test_result("AI", 2, 10.6);
        let rules = [StarConditionRule::Margin { seconds: 0.5 }];

        assert_eq!(evaluate_stars(&player, &rules, None), 0);
        assert_eq!(evaluate_stars(&player, &rules, Some(&close)), 0);
        assert_eq!(evaluate_stars(&player, &rules, Some(&far)), 1);
        assert_eq!(evaluate_stars(&far, &rules, Some(&player)), 0);
    }

    #[test]
    fn test_nitro_and_disqualification() {
        let mut player = test_result("Player", 1, 10.0);
        player.nitro_used = true;
        assert_eq!(evaluate_stars(&player, &[StarConditionRule::NoNitro], None), 0);

        player.disqualified = true;
        assert_eq!(evaluate_stars(&player, &[StarConditionRule::Win], None), 0);
        assert_eq!(
            compute_reward(&player, &RewardPolicy::default(), None),
            Reward::default()
        );
    }

    #[test]
    fn test_reward_multipliers() {
        let policy = RewardPolicy {
            base_money: 100.0,
            base_xp: 10.0,
            ..RewardPolicy::default()
        };
        let winner = test_result("Player", 1, 10.0);
        let second = test_result("Player", 2, 11.0);

        assert_eq!(
            compute_reward(&winner, &policy, Some(9.0)),
            Reward { money: 200, xp: 20, new_record: false }
        );
        assert_eq!(
            compute_reward(&winner, &policy, Some(10.5)),
            Reward { money: 250, xp: 25, new_record: true }
        );
        assert_eq!(
            compute_reward(&second, &policy, Some(10.5)),
            Reward { money: 100, xp: 10, new_record: false }
        );
        assert_eq!(
            compute_reward(&second, &policy, None),
            Reward { money: 150, xp: 15, new_record: true }
        );
    }

    #[test]
    fn test_rule_deserialization() {
        let rules: Vec<StarConditionRule> = serde_json::from_str(
            r#"[{"kind": "win"}, {"kind": "beat_time", "threshold": 11.5}, {"kind": "no_nitro"}]"#,
        )
        .unwrap();
        assert_eq!(rules[1], StarConditionRule::BeatTime { threshold: 11.5 });
    }
}
