//! Property tests: value is neither created nor destroyed, whatever order
//! operations arrive in.

use crowdx_contracts::{CampaignParams, CampaignRegistry, CampaignState};
use crowdx_protocol::{Address, Ledger, ManualClock};
use proptest::prelude::*;

const PLAYERS: [&str; 4] = ["owner", "a", "b", "c"];

#[derive(Debug, Clone)]
enum Op {
    Contribute(usize, u64),
    Advance(i64),
    Finalize(usize),
    Withdraw(usize),
    Refund(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..PLAYERS.len(), 0u64..400).prop_map(|(p, a)| Op::Contribute(p, a)),
        2 => (1i64..400).prop_map(Op::Advance),
        1 => (0..PLAYERS.len()).prop_map(Op::Finalize),
        1 => (0..PLAYERS.len()).prop_map(Op::Withdraw),
        2 => (0..PLAYERS.len()).prop_map(Op::Refund),
    ]
}

proptest! {
    #[test]
    fn value_is_conserved(goal in 1u64..1_000, ops in prop::collection::vec(op(), 1..60)) {
        let who = |i: usize| Address::from_label(PLAYERS[i]);
        let clock = ManualClock::at_timestamp(1_700_000_000);
        let mut ledger = Ledger::new();
        for i in 0..PLAYERS.len() {
            ledger.mint(&who(i), 500).unwrap();
        }
        let minted = ledger.total_supply();

        let mut registry = CampaignRegistry::new();
        let id = registry
            .create_campaign(
                who(0),
                CampaignParams {
                    title: "prop".into(),
                    description: String::new(),
                    goal,
                    duration_secs: 1_000,
                },
                &clock,
            )
            .unwrap();

        let mut paid_out = 0u64;
        for op in ops {
            let result = match op {
                Op::Contribute(p, amount) => {
                    registry.contribute(&id, &who(p), amount, &clock, &mut ledger).map(|_| 0)
                }
                Op::Advance(secs) => {
                    clock.advance_secs(secs);
                    Ok(0)
                }
                Op::Finalize(p) => registry.finalize_campaign(&id, &who(p), &clock).map(|_| 0),
                Op::Withdraw(p) => registry.withdraw_funds(&id, &who(p), &clock, &mut ledger),
                Op::Refund(p) => registry.claim_refund(&id, &who(p), &clock, &mut ledger),
            };
            if let Ok(amount) = result {
                paid_out += amount;
            }

            let campaign = registry.campaign(&id).unwrap();
            prop_assert_eq!(campaign.audit(), Ok(()));
            prop_assert_eq!(campaign.escrow_balance(), ledger.custody_balance());
            prop_assert!(ledger.is_conserved());
            prop_assert_eq!(ledger.total_supply(), minted);
            prop_assert_eq!(campaign.escrow_balance() + paid_out, campaign.total_raised());
        }

        let campaign = registry.campaign(&id).unwrap();
        if campaign.state() == CampaignState::Successful {
            prop_assert!(campaign.total_raised() >= goal);
        }
        if campaign.state() == CampaignState::Failed {
            prop_assert!(!campaign.withdrawn());
        }
    }
}
