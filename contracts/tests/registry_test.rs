//! Integration tests for the campaign registry: enumeration, dashboard
//! filters and persistence round-trips.

use crowdx_contracts::{CampaignParams, CampaignRegistry, CampaignState};
use crowdx_protocol::{Address, Ledger, ManualClock};

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

fn params(title: &str, goal: u64) -> CampaignParams {
    CampaignParams {
        title: title.into(),
        description: String::new(),
        goal,
        duration_secs: 600,
    }
}

#[test]
fn registry_enumerates_in_creation_order() {
    let clock = ManualClock::at_timestamp(1_700_000_000);
    let mut registry = CampaignRegistry::new();
    assert!(registry.get_campaigns().is_empty());

    let ids: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|t| registry.create_campaign(addr("o"), params(t, 1), &clock).unwrap())
        .collect();

    assert_eq!(registry.get_campaigns(), ids.as_slice());
    let titles: Vec<_> = registry.iter().map(|(_, c)| c.title().to_string()).collect();
    assert_eq!(titles, ["a", "b", "c"]);
}

#[test]
fn dashboard_filters() {
    let clock = ManualClock::at_timestamp(1_700_000_000);
    let mut ledger = Ledger::new();
    ledger.mint(&addr("fan"), 50).unwrap();
    let mut registry = CampaignRegistry::new();

    let alice_1 = registry.create_campaign(addr("alice"), params("one", 5), &clock).unwrap();
    let bob = registry.create_campaign(addr("bob"), params("two", 5), &clock).unwrap();
    let alice_2 = registry.create_campaign(addr("alice"), params("three", 5), &clock).unwrap();

    registry.contribute(&bob, &addr("fan"), 5, &clock, &mut ledger).unwrap();
    registry.contribute(&alice_2, &addr("fan"), 1, &clock, &mut ledger).unwrap();

    assert_eq!(registry.campaigns_owned_by(&addr("alice")), vec![alice_1, alice_2]);
    assert_eq!(registry.campaigns_backed_by(&addr("fan")), vec![bob, alice_2]);
    assert!(registry.campaigns_owned_by(&addr("fan")).is_empty());
    assert_eq!(registry.total_escrowed(), Some(6));
    assert_eq!(registry.audit(), Ok(()));
}

#[test]
fn refunded_backer_still_listed() {
    let clock = ManualClock::at_timestamp(0);
    let mut ledger = Ledger::new();
    ledger.mint(&addr("fan"), 10).unwrap();
    let mut registry = CampaignRegistry::new();
    let id = registry.create_campaign(addr("o"), params("x", 100), &clock).unwrap();
    registry.contribute(&id, &addr("fan"), 10, &clock, &mut ledger).unwrap();
    clock.advance_secs(600);
    registry.finalize_campaign(&id, &addr("o"), &clock).unwrap();
    registry.claim_refund(&id, &addr("fan"), &clock, &mut ledger).unwrap();

    assert_eq!(registry.campaigns_backed_by(&addr("fan")), vec![id]);
    assert_eq!(registry.total_escrowed(), Some(0));
}

#[test]
fn registry_survives_bincode_round_trip() {
    let clock = ManualClock::at_timestamp(1_700_000_000);
    let mut ledger = Ledger::new();
    ledger.mint(&addr("x"), 20).unwrap();
    let mut registry = CampaignRegistry::new();
    let id = registry.create_campaign(addr("o"), params("persist", 10), &clock).unwrap();
    registry.contribute(&id, &addr("x"), 12, &clock, &mut ledger).unwrap();
    clock.advance_secs(600);
    registry.finalize_campaign(&id, &addr("o"), &clock).unwrap();

    let campaign_bytes = bincode::serialize(registry.campaign(&id).unwrap()).unwrap();
    let events_bytes = bincode::serialize(registry.events()).unwrap();

    let restored = CampaignRegistry::restore(
        registry.get_campaigns().to_vec(),
        vec![(id, bincode::deserialize(&campaign_bytes).unwrap())],
        bincode::deserialize(&events_bytes).unwrap(),
    )
    .unwrap();

    let campaign = restored.campaign(&id).unwrap();
    assert_eq!(campaign.state(), CampaignState::Successful);
    assert_eq!(campaign.contribution_of(&addr("x")), 12);
    assert_eq!(restored.events(), registry.events());
}

#[test]
fn events_serialize_as_tagged_json() {
    let clock = ManualClock::at_timestamp(0);
    let mut registry = CampaignRegistry::new();
    registry.create_campaign(addr("o"), params("json", 1), &clock).unwrap();

    let json = serde_json::to_value(&registry.events()[0]).unwrap();
    assert_eq!(json["sequence"], 0);
    assert_eq!(json["event"]["campaign_created"]["title"], "json");
    assert_eq!(json["event"]["campaign_created"]["goal"], 1);
}
