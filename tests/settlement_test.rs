// Settlement Engine Tests
// End-to-end: events recorded through the service, plans computed from
// live snapshots

use splitledger::ledger::LedgerError;
use splitledger::money::Money;
use splitledger::service::WalletService;
use splitledger::settlement::Transfer;
use std::collections::HashMap;
use tempfile::TempDir;

fn service() -> (TempDir, WalletService) {
    let temp_dir = TempDir::new().unwrap();
    let service = WalletService::open(temp_dir.path()).unwrap();
    (temp_dir, service)
}

/// Owner `1` plus members `2..=n`, all accepted
fn wallet_with_members(service: &WalletService, n: i64) -> u64 {
    service.register_member(1, "alice").unwrap();
    let wallet = service.create_wallet(1, "trip").unwrap();
    for id in 2..=n {
        service
            .register_member(id, format!("member{id}").as_str())
            .unwrap();
        service.request_membership(wallet.id, id).unwrap();
        service.accept_membership(wallet.id, id, 1).unwrap();
    }
    wallet.id
}

fn apply_transfers(positions: &[(i64, i64)], transfers: &[Transfer]) -> HashMap<i64, i64> {
    let mut residual: HashMap<i64, i64> = positions.iter().copied().collect();
    for t in transfers {
        *residual.get_mut(&t.from).unwrap() += t.amount.cents();
        *residual.get_mut(&t.to).unwrap() -= t.amount.cents();
    }
    residual
}

// ============================================================================
// THREE-MEMBER SCENARIO - 300 contributed, 90 spent shared three ways
// ============================================================================

#[test]
fn test_three_member_scenario() {
    let (_dir, service) = service();
    let wallet_id = wallet_with_members(&service, 3);

    service
        .record_contribution(wallet_id, 1, Money::from_units(300), None)
        .unwrap();
    service
        .record_expense(wallet_id, 2, "food", "dinner", Money::from_units(90), true)
        .unwrap();

    let plan = service.settlement_plan(wallet_id).unwrap();

    let nets: HashMap<i64, Money> = plan
        .positions
        .iter()
        .map(|p| (p.member_id, p.net))
        .collect();
    assert_eq!(nets[&1], Money::from_units(270));
    assert_eq!(nets[&2], Money::from_units(-30));
    assert_eq!(nets[&3], Money::from_units(-30));

    assert_eq!(
        plan.transfers,
        vec![
            Transfer {
                from: 2,
                to: 1,
                amount: Money::from_units(30)
            },
            Transfer {
                from: 3,
                to: 1,
                amount: Money::from_units(30)
            },
        ]
    );
}

// ============================================================================
// ZERO-SUM AND DETERMINISM
// ============================================================================

#[test]
fn test_balanced_pot_settles_everyone_to_zero() {
    let (_dir, service) = service();
    let wallet_id = wallet_with_members(&service, 4);

    // pot fully spent: contributions 120, shared expenses 120
    service
        .record_contribution(wallet_id, 1, Money::from_units(70), None)
        .unwrap();
    service
        .record_contribution(wallet_id, 3, Money::from_units(50), None)
        .unwrap();
    service
        .record_expense(wallet_id, 2, "fuel", "roadtrip", Money::from_units(80), true)
        .unwrap();
    service
        .record_expense(wallet_id, 4, "food", "groceries", Money::from_units(40), true)
        .unwrap();

    let plan = service.settlement_plan(wallet_id).unwrap();
    let positions: Vec<(i64, i64)> = plan
        .positions
        .iter()
        .map(|p| (p.member_id, p.net.cents()))
        .collect();
    let residual = apply_transfers(&positions, &plan.transfers);
    assert!(
        residual.values().all(|&c| c == 0),
        "residuals: {residual:?}"
    );
    assert!(plan.transfers.len() <= 3);
}

#[test]
fn test_identical_history_yields_identical_plan() {
    let (_dir, service) = service();
    let wallet_id = wallet_with_members(&service, 3);
    service
        .record_contribution(wallet_id, 2, Money::from_cents(10000), None)
        .unwrap();
    service
        .record_expense(wallet_id, 3, "misc", "tickets", Money::from_cents(9999), true)
        .unwrap();

    let first = service.settlement_plan(wallet_id).unwrap();
    for _ in 0..5 {
        assert_eq!(service.settlement_plan(wallet_id).unwrap(), first);
    }
}

// ============================================================================
// SPLIT EXACTNESS THROUGH THE ENGINE
// ============================================================================

#[test]
fn test_uneven_split_loses_no_cents() {
    let (_dir, service) = service();
    let wallet_id = wallet_with_members(&service, 3);
    service
        .record_contribution(wallet_id, 1, Money::from_cents(10000), None)
        .unwrap();
    service
        .record_expense(wallet_id, 1, "misc", "hotel", Money::from_cents(10000), true)
        .unwrap();

    let plan = service.settlement_plan(wallet_id).unwrap();
    let spent_total: i64 = plan.positions.iter().map(|p| p.spent.cents()).sum();
    assert_eq!(spent_total, 10000);

    // lowest id carries the extra cent
    let by_id: HashMap<i64, Money> = plan
        .positions
        .iter()
        .map(|p| (p.member_id, p.spent))
        .collect();
    assert_eq!(by_id[&1], Money::from_cents(3334));
    assert_eq!(by_id[&2], Money::from_cents(3333));
    assert_eq!(by_id[&3], Money::from_cents(3333));
}

// ============================================================================
// BOUNDARIES
// ============================================================================

#[test]
fn test_single_member_wallet_never_produces_transfers() {
    let (_dir, service) = service();
    let wallet_id = wallet_with_members(&service, 1);
    service
        .record_contribution(wallet_id, 1, Money::from_units(500), None)
        .unwrap();
    service
        .record_expense(wallet_id, 1, "misc", "solo", Money::from_units(120), true)
        .unwrap();

    let plan = service.settlement_plan(wallet_id).unwrap();
    assert!(plan.transfers.is_empty());
}

#[test]
fn test_personal_expenses_burden_only_the_spender() {
    let (_dir, service) = service();
    let wallet_id = wallet_with_members(&service, 2);
    service
        .record_contribution(wallet_id, 1, Money::from_units(100), None)
        .unwrap();
    service
        .record_expense(wallet_id, 2, "misc", "own stuff", Money::from_units(100), false)
        .unwrap();

    let plan = service.settlement_plan(wallet_id).unwrap();
    let nets: HashMap<i64, Money> = plan
        .positions
        .iter()
        .map(|p| (p.member_id, p.net))
        .collect();
    assert_eq!(nets[&1], Money::from_units(100));
    assert_eq!(nets[&2], Money::from_units(-100));
    assert_eq!(
        plan.transfers,
        vec![Transfer {
            from: 2,
            to: 1,
            amount: Money::from_units(100)
        }]
    );
}

#[test]
fn test_empty_wallet_settles_trivially() {
    let (_dir, service) = service();
    let wallet_id = wallet_with_members(&service, 3);

    let plan = service.settlement_plan(wallet_id).unwrap();
    assert!(plan.transfers.is_empty());
    assert!(plan.positions.iter().all(|p| p.net.is_zero()));
}

#[test]
fn test_settlement_plan_for_missing_wallet_fails() {
    let (_dir, service) = service();
    assert!(matches!(
        service.settlement_plan(31337),
        Err(LedgerError::WalletNotFound)
    ));
}
