//! Property-based coverage for the invariants that generalize better as
//! generated-input properties than as single literal scenarios: money
//! conservation and monotone cost accumulators across arbitrary runs.

use std::collections::HashMap;

use proptest::prelude::*;

use simcash_core::orchestrator::{AgentConfig, Orchestrator, OrchestratorConfig};
use simcash_core::policy::tree::{ActionType, DecisionTreeDef, Expression, TreeNode, Value};
use simcash_core::policy::PolicyConfig;
use simcash_core::{AmountDistribution, ArrivalConfig};

/// Releases whenever the agent's available liquidity covers the amount,
/// otherwise holds. Exercises both RTGS-immediate and Q2-queued paths.
fn liquidity_gated_policy() -> PolicyConfig {
    PolicyConfig {
        def: DecisionTreeDef {
            version: "1".to_string(),
            policy_id: "liquidity_gated".to_string(),
            description: None,
            payment_tree: Some(TreeNode::Condition {
                node_id: "N1".to_string(),
                description: String::new(),
                condition: Expression::GreaterOrEqual {
                    left: Value::Field { field: "available_liquidity".to_string() },
                    right: Value::Field { field: "amount".to_string() },
                },
                on_true: Box::new(TreeNode::Action {
                    node_id: "A1".to_string(),
                    action: ActionType::Release,
                    parameters: HashMap::new(),
                }),
                on_false: Box::new(TreeNode::Action {
                    node_id: "A2".to_string(),
                    action: ActionType::Hold,
                    parameters: HashMap::new(),
                }),
            }),
            strategic_collateral_tree: None,
            end_of_tick_collateral_tree: None,
            bank_tree: None,
            parameters: HashMap::new(),
        },
    }
}

fn arrival_config() -> ArrivalConfig {
    ArrivalConfig {
        rate_per_tick: 0.4,
        amount_distribution: AmountDistribution::Uniform { min: 1_000, max: 20_000 },
        counterparty_weights: HashMap::new(),
        deadline_range: (3, 15),
        priority_distribution: Default::default(),
        divisible: false,
    }
}

fn config_for(seed: u64, opening_balances: [i64; 3], ticks_per_day: usize) -> OrchestratorConfig {
    let ids = ["A", "B", "C"];
    let agents = ids
        .iter()
        .zip(opening_balances.iter())
        .map(|(id, &balance)| {
            let mut agent = AgentConfig::new(*id, balance, 50_000, liquidity_gated_policy());
            agent.arrival_config = Some(arrival_config());
            agent
        })
        .collect();

    OrchestratorConfig { ticks_per_day, num_days: 1, rng_seed: seed, agents, ..Default::default() }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property 2 (§8): total balance plus total posted collateral is
    /// conserved across every tick of every run, for any seed and any
    /// set of non-negative opening balances.
    #[test]
    fn conservation_holds_for_arbitrary_seeds_and_balances(
        seed in any::<u64>(),
        b_a in 0i64..2_000_000,
        b_b in 0i64..2_000_000,
        b_c in 0i64..2_000_000,
        ticks_per_day in 8usize..30,
    ) {
        let config = config_for(seed, [b_a, b_b, b_c], ticks_per_day);
        let mut orchestrator = Orchestrator::new(config).unwrap();

        let opening_total: i64 = orchestrator
            .get_agent_ids()
            .iter()
            .map(|id| {
                orchestrator.get_agent_balance(id).unwrap()
                    + orchestrator.get_agent_collateral_posted(id).unwrap()
            })
            .sum();

        for _ in 0..ticks_per_day {
            orchestrator.tick().unwrap();

            let current_total: i64 = orchestrator
                .get_agent_ids()
                .iter()
                .map(|id| {
                    orchestrator.get_agent_balance(id).unwrap()
                        + orchestrator.get_agent_collateral_posted(id).unwrap()
                })
                .sum();
            prop_assert_eq!(current_total, opening_total);
        }
    }

    /// Property 4 (§8): every per-agent cost accumulator is non-decreasing
    /// tick over tick, regardless of seed or opening balance.
    #[test]
    fn cost_accumulators_never_decrease(
        seed in any::<u64>(),
        b_a in 0i64..500_000,
        b_b in 0i64..500_000,
        ticks_per_day in 8usize..20,
    ) {
        let config = config_for(seed, [b_a, b_b, 0], ticks_per_day);
        let mut orchestrator = Orchestrator::new(config).unwrap();
        let agent_ids = orchestrator.get_agent_ids().to_vec();

        let mut previous: HashMap<String, i64> = agent_ids
            .iter()
            .map(|id| (id.clone(), total_cost(&orchestrator, id)))
            .collect();

        for _ in 0..ticks_per_day {
            orchestrator.tick().unwrap();
            for id in &agent_ids {
                let current = total_cost(&orchestrator, id);
                prop_assert!(current >= previous[id]);
                previous.insert(id.clone(), current);
            }
        }
    }
}

fn total_cost(orchestrator: &Orchestrator, agent_id: &str) -> i64 {
    orchestrator
        .get_agent_accumulated_costs(agent_id)
        .unwrap()
        .values()
        .copied()
        .sum()
}
