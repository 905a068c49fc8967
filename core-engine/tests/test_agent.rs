//! Integration tests for `Agent`: ledger movements, collateral, and queue
//! bookkeeping exercised the way the settlement pipeline drives them.

use simcash_core::Agent;

#[test]
fn opening_state_matches_construction_args() {
    let agent = Agent::new("BANK_A".to_string(), 1_000_000, 250_000);
    assert_eq!(agent.balance(), 1_000_000);
    assert_eq!(agent.unsecured_cap(), 250_000);
    assert_eq!(agent.posted_collateral(), 0);
    assert_eq!(agent.available_liquidity(), 1_250_000);
}

#[test]
fn with_posted_collateral_sets_opening_value_without_debiting_balance() {
    let agent = Agent::new("BANK_A".to_string(), 1_000_000, 0).with_posted_collateral(200_000);
    assert_eq!(agent.balance(), 1_000_000);
    assert_eq!(agent.posted_collateral(), 200_000);
}

#[test]
fn q1_and_q2_refs_track_membership_independently() {
    let mut agent = Agent::new("BANK_A".to_string(), 0, 0);
    agent.push_q1("tx1".to_string());
    agent.push_q1("tx2".to_string());
    assert_eq!(agent.q1(), &["tx1", "tx2"]);

    agent.remove_from_q1("tx1");
    assert_eq!(agent.q1(), &["tx2"]);

    agent.add_q2_ref("tx3".to_string());
    assert_eq!(agent.q2_refs(), &["tx3"]);
    agent.remove_q2_ref("tx3");
    assert!(agent.q2_refs().is_empty());
}

#[test]
fn collateral_capacity_caps_posting() {
    let mut agent = Agent::new("BANK_A".to_string(), 1_000_000, 0).with_max_collateral_capacity(100_000);
    assert!(agent.post_collateral(100_000).is_ok());
    assert!(agent.post_collateral(1).is_err());
}
