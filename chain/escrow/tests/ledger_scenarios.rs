//! Ledger Scenario Tests
//!
//! End-to-end behavior of the escrow vault against the in-memory host:
//! - Deposit splitting and measured yield
//! - Claim / recover exclusivity and the recovery delay
//! - Emergency withdrawal timelock and reserve protection
//! - Adapter trust checks and misbehaving adapters
//! - Atomic rollback of records, indices, balances and events
//! - Property tests (proptest)

use std::sync::Arc;

use escrow::adapter::{RedeemRequest, SupplyRequest, YieldAdapter};
use escrow::config::LedgerConfig;
use escrow::deposit::Allocation;
use escrow::errors::{
    AdapterError, EmergencyError, ErrorCategory, LedgerError, RegistryError, StoreError,
    TransferError,
};
use escrow::events::{hash_recipient, LedgerEvent};
use escrow::host::{AssetBank, Host, UnderlyingProbe};
use escrow::sim::{MemoryHost, SimLendingPool};
use escrow::store::Finalization;
use escrow::vault::EscrowVault;
use escrow::LEDGER_ABI_VERSION;
use types::ids::{Address, DepositId};
use types::numeric::MAX_RECORD_AMOUNT;

const ADMIN: Address = Address::repeat_byte(0xad);
const CUSTODY: Address = Address::repeat_byte(0xcc);
const USDT: Address = Address::repeat_byte(0x01);
const AUSDT: Address = Address::repeat_byte(0x02);
const DAI: Address = Address::repeat_byte(0x03);
const POOL: Address = Address::repeat_byte(0x50);
const DELEGATE: Address = Address::repeat_byte(0xd1);
const ALICE: Address = Address::repeat_byte(0xa1);
const BOB: Address = Address::repeat_byte(0xb0);
const CAROL: Address = Address::repeat_byte(0xc0);

const T0: i64 = 1_700_000_000;
const RECOVERY_DELAY: i64 = 259_200;
const EMERGENCY_DELAY: i64 = 172_800;
const ALICE_FUNDS: u128 = 1_000_000;

// ═══════════════════════════════════════════════════════════════════
// Deposit
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_scenario_a_fee_remainder_goes_to_last_recipient() {
    let mut vault = setup_vault(100);

    let ids = vault
        .deposit(&ALICE, USDT, 100, &split_60_40(), T0)
        .unwrap();

    assert_eq!(ids, vec![DepositId::new(1), DepositId::new(2)]);
    assert_eq!(vault.get_deposit(ids[0]).unwrap().yield_amount, 59);
    assert_eq!(vault.get_deposit(ids[1]).unwrap().yield_amount, 40);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 99);
    assert_eq!(vault.reserved_balance(&AUSDT), 99);
    assert_eq!(vault.host().balance_of(&USDT, &ALICE), ALICE_FUNDS - 100);

    let record = vault.get_deposit(ids[1]).unwrap();
    assert_eq!(record.depositor, ALICE);
    assert_eq!(record.intended_recipient, CAROL);
    assert_eq!(record.deposit_time, T0);
    assert_eq!(record.yield_asset, AUSDT);
    assert_eq!(record.underlying_asset, USDT);
    assert!(!record.used);
}

#[test]
fn test_deposit_emits_one_event_per_record() {
    let mut vault = setup_vault(100);
    vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();

    let events = vault.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].tx_id, events[1].tx_id);
    assert_eq!(events[0].log_index, 0);
    assert_eq!(events[1].log_index, 1);
    match &events[0].event {
        LedgerEvent::Deposited(deposited) => {
            assert_eq!(deposited.recipient_hash, hash_recipient(&BOB));
            assert_eq!(deposited.yield_amount, 59);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_deposit_amount_mismatch_changes_nothing() {
    let mut vault = setup_vault(0);
    let err = vault
        .deposit(&ALICE, USDT, 101, &split_60_40(), T0)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::AmountMismatch {
            expected: 101,
            actual: 100
        }
    );
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(vault.host().balance_of(&USDT, &ALICE), ALICE_FUNDS);
    assert!(vault.events().is_empty());

    // Guard released: the next deposit goes through and gets the first id.
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();
    assert_eq!(ids[0], DepositId::FIRST);
}

#[test]
fn test_deposit_zero_yield_share_rejected() {
    let mut vault = setup_vault(100);
    let allocations = [Allocation::new(BOB, 1), Allocation::new(CAROL, 999)];
    let err = vault
        .deposit(&ALICE, USDT, 1_000, &allocations, T0)
        .unwrap_err();
    assert_eq!(err, LedgerError::ZeroYieldShare { recipient: BOB });
    assert_eq!(vault.host().balance_of(&USDT, &ALICE), ALICE_FUNDS);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 0);
}

#[test]
fn test_deposit_rejects_share_wider_than_record() {
    let mut vault = setup_vault(0);
    let amount = MAX_RECORD_AMOUNT + 1;
    vault.host_mut().mint(USDT, ALICE, amount);
    vault.host_mut().mint(AUSDT, POOL, amount);

    let err = vault
        .deposit(&ALICE, USDT, amount, &[Allocation::new(BOB, amount)], T0)
        .unwrap_err();
    assert_eq!(err, LedgerError::Store(StoreError::AmountOutOfRange { amount }));
}

#[test]
fn test_deposit_without_route() {
    let host = funded_host(0);
    let mut vault = EscrowVault::new(ADMIN, CUSTODY, host, LedgerConfig::default()).unwrap();
    let err = vault
        .deposit(&ALICE, USDT, 100, &split_60_40(), T0)
        .unwrap_err();
    assert_eq!(err, LedgerError::Registry(RegistryError::MissingRoute { asset: USDT }));
}

#[test]
fn test_deposit_too_many_allocations() {
    let config = LedgerConfig::from_json_str(r#"{"max_allocations": 1}"#).unwrap();
    let mut vault = configured_vault(0, config);
    let err = vault
        .deposit(&ALICE, USDT, 100, &split_60_40(), T0)
        .unwrap_err();
    assert_eq!(err, LedgerError::TooManyAllocations { count: 2, max: 1 });
}

#[test]
fn test_deposit_with_yield_asset_resolves_underlying() {
    let mut vault = setup_vault(0);
    vault.host_mut().mint(AUSDT, ALICE, 1_000);
    vault
        .host_mut()
        .set_probe(AUSDT, UnderlyingProbe::AaveUnderlyingAsset, USDT);
    // A second probe agreeing on the same answer is fine.
    vault
        .host_mut()
        .set_probe(AUSDT, UnderlyingProbe::Erc4626Asset, USDT);

    let ids = vault
        .deposit_with_yield_asset(&ALICE, AUSDT, 300, &[Allocation::new(BOB, 300)], T0)
        .unwrap();

    let record = vault.get_deposit(ids[0]).unwrap();
    assert_eq!(record.yield_amount, 300);
    assert_eq!(record.underlying_asset, USDT);
    assert_eq!(vault.host().balance_of(&AUSDT, &ALICE), 700);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 300);
}

#[test]
fn test_deposit_with_yield_asset_probe_failures() {
    let mut vault = setup_vault(0);
    vault.host_mut().mint(AUSDT, ALICE, 1_000);

    let allocations = [Allocation::new(BOB, 100)];
    assert_eq!(
        vault.deposit_with_yield_asset(&ALICE, AUSDT, 100, &allocations, T0),
        Err(LedgerError::UnderlyingUnresolved { asset: AUSDT })
    );

    vault
        .host_mut()
        .set_probe(AUSDT, UnderlyingProbe::AaveUnderlyingAsset, USDT);
    vault
        .host_mut()
        .set_probe(AUSDT, UnderlyingProbe::CompoundUnderlying, DAI);
    assert_eq!(
        vault.deposit_with_yield_asset(&ALICE, AUSDT, 100, &allocations, T0),
        Err(LedgerError::UnderlyingAmbiguous { asset: AUSDT })
    );
    assert_eq!(vault.host().balance_of(&AUSDT, &ALICE), 1_000);
}

#[test]
fn test_full_fee_adapter_yields_nothing() {
    let mut vault = setup_vault(0);
    let eater = Address::repeat_byte(0xd5);
    vault.host_mut().deploy(
        eater,
        Arc::new(
            SimLendingPool::new(POOL)
                .with_market(USDT, AUSDT)
                .with_fee_bps(10_000),
        ),
    );
    vault
        .set_token_config(&ADMIN, USDT, eater, POOL, "USDT")
        .unwrap();
    vault.drain_events();

    let err = vault
        .deposit(&ALICE, USDT, 100, &split_60_40(), T0)
        .unwrap_err();
    assert_eq!(err, LedgerError::NoYieldReceived);
    assert_eq!(err.category(), ErrorCategory::Integration);
    assert_eq!(vault.host().balance_of(&USDT, &ALICE), ALICE_FUNDS);
    assert_eq!(vault.host().balance_of(&USDT, &CUSTODY), 0);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 0);
    assert!(vault.list_active_by_depositor(&ALICE).is_empty());
    assert_eq!(vault.reserved_balance(&AUSDT), 0);
    assert!(vault.events().is_empty());
    assert_eq!(vault.host().open_transactions(), 0);

    // The failed deposit did not consume an id.
    vault
        .set_token_config(&ADMIN, USDT, DELEGATE, POOL, "USDT")
        .unwrap();
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();
    assert_eq!(ids[0], DepositId::FIRST);
}

#[test]
fn test_deposit_with_yield_asset_from_custody_yields_nothing() {
    let mut vault = setup_vault(0);
    vault
        .host_mut()
        .set_probe(AUSDT, UnderlyingProbe::AaveUnderlyingAsset, USDT);
    vault.host_mut().mint(AUSDT, CUSTODY, 500);

    assert_eq!(
        vault.deposit_with_yield_asset(&CUSTODY, AUSDT, 100, &[Allocation::new(BOB, 100)], T0),
        Err(LedgerError::NoYieldReceived)
    );
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 500);
    assert_eq!(vault.reserved_balance(&AUSDT), 0);
    assert!(vault.list_active_by_recipient(&BOB).is_empty());
}

// ═══════════════════════════════════════════════════════════════════
// Claim / Recover
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_scenario_b_claim_then_recover_is_already_used() {
    let mut vault = setup_vault(0);
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();

    assert_eq!(vault.claim(ids[0], &BOB, T0 + 10), Ok(60));
    assert_eq!(vault.host().balance_of(&AUSDT, &BOB), 60);

    let after_delay = T0 + RECOVERY_DELAY;
    assert_eq!(
        vault.recover(ids[0], &ALICE, after_delay),
        Err(LedgerError::Store(StoreError::AlreadyUsed { id: ids[0] }))
    );
    assert_eq!(
        vault.recover_as_underlying(ids[0], &ALICE, after_delay),
        Err(LedgerError::Store(StoreError::AlreadyUsed { id: ids[0] }))
    );
    assert_eq!(
        vault.claim(ids[0], &BOB, after_delay),
        Err(LedgerError::Store(StoreError::AlreadyUsed { id: ids[0] }))
    );

    assert!(vault.get_deposit(ids[0]).is_none());
    let history = vault.deposit_history(ids[0]).unwrap();
    assert!(history.used);
    assert_eq!(history.yield_amount, 0);
    assert_eq!(history.finalization, Some(Finalization::Claimed));
}

#[test]
fn test_scenario_c_recovery_delay_boundary() {
    let mut vault = setup_vault(0);
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();

    assert_eq!(
        vault.recover(ids[1], &ALICE, T0 + RECOVERY_DELAY - 1),
        Err(LedgerError::RecoveryNotAvailable {
            id: ids[1],
            available_at: T0 + RECOVERY_DELAY
        })
    );
    assert_eq!(vault.recover(ids[1], &ALICE, T0 + RECOVERY_DELAY), Ok(40));
    assert_eq!(vault.host().balance_of(&AUSDT, &ALICE), 40);

    // Recovery finalizes the record for the recipient too.
    assert_eq!(
        vault.claim(ids[1], &CAROL, T0 + RECOVERY_DELAY),
        Err(LedgerError::Store(StoreError::AlreadyUsed { id: ids[1] }))
    );
}

#[test]
fn test_claim_by_wrong_caller() {
    let mut vault = setup_vault(0);
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();

    let err = vault.claim(ids[0], &CAROL, T0).unwrap_err();
    assert_eq!(err, LedgerError::InvalidRecipient { id: ids[0] });
    assert_eq!(err.category(), ErrorCategory::Authorization);
    assert_eq!(
        vault.recover(ids[0], &BOB, T0 + RECOVERY_DELAY),
        Err(LedgerError::InvalidRecipient { id: ids[0] })
    );
    assert!(vault.get_deposit(ids[0]).is_some());
}

#[test]
fn test_claim_unknown_record() {
    let mut vault = setup_vault(0);
    let id = DepositId::new(99);
    assert_eq!(
        vault.claim(id, &BOB, T0),
        Err(LedgerError::Store(StoreError::NotFound { id }))
    );
}

#[test]
fn test_failed_transfer_rolls_back_claim() {
    let mut vault = setup_vault(0);
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();
    vault.drain_events();
    vault.host_mut().freeze(BOB);

    let err = vault.claim(ids[0], &BOB, T0).unwrap_err();
    assert!(matches!(err, LedgerError::Transfer(TransferError::Rejected { .. })));
    assert_eq!(err.category(), ErrorCategory::Integration);

    // Record, indices, balances and events are untouched.
    let record = vault.get_deposit(ids[0]).unwrap();
    assert!(!record.used);
    assert_eq!(record.yield_amount, 60);
    assert_eq!(vault.list_active_by_recipient(&BOB), vec![ids[0]]);
    assert_eq!(vault.list_active_by_depositor(&ALICE), ids);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 100);
    assert!(vault.events().is_empty());
    assert!(vault.verify_indices().is_ok());
    assert_eq!(vault.host().open_transactions(), 0);

    vault.host_mut().unfreeze(&BOB);
    assert_eq!(vault.claim(ids[0], &BOB, T0), Ok(60));
}

#[test]
fn test_recover_as_underlying() {
    let mut vault = setup_vault(0);
    let ids = vault
        .deposit(&ALICE, USDT, 100, &[Allocation::new(BOB, 100)], T0)
        .unwrap();

    let redeemed = vault
        .recover_as_underlying(ids[0], &ALICE, T0 + RECOVERY_DELAY)
        .unwrap();

    assert_eq!(redeemed, 100);
    assert_eq!(vault.host().balance_of(&USDT, &ALICE), ALICE_FUNDS);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 0);
    assert_eq!(
        vault.deposit_history(ids[0]).unwrap().finalization,
        Some(Finalization::RecoveredAsUnderlying)
    );
    match &vault.events().last().unwrap().event {
        LedgerEvent::Recovered(recovered) => {
            assert_eq!(recovered.asset, USDT);
            assert_eq!(recovered.amount, 100);
            assert_eq!(recovered.finalization, Finalization::RecoveredAsUnderlying);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_recover_as_underlying_broken_redeem_rolls_back() {
    let mut vault = setup_vault(0);
    let broken = Address::repeat_byte(0xd3);
    vault.host_mut().deploy(
        broken,
        Arc::new(
            SimLendingPool::new(POOL)
                .with_market(USDT, AUSDT)
                .with_broken_redeem(),
        ),
    );
    vault
        .set_token_config(&ADMIN, USDT, broken, POOL, "USDT")
        .unwrap();
    let ids = vault
        .deposit(&ALICE, USDT, 100, &[Allocation::new(BOB, 100)], T0)
        .unwrap();

    let err = vault
        .recover_as_underlying(ids[0], &ALICE, T0 + RECOVERY_DELAY)
        .unwrap_err();
    assert_eq!(err, LedgerError::RedeemFailed { id: ids[0] });
    assert_eq!(err.category(), ErrorCategory::Integration);
    assert_eq!(vault.get_deposit(ids[0]).unwrap().yield_amount, 100);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 100);

    // Plain recovery in the yield asset still works.
    assert_eq!(vault.recover(ids[0], &ALICE, T0 + RECOVERY_DELAY), Ok(100));
}

#[test]
fn test_shortened_recovery_delay_applies_to_existing_records() {
    let mut vault = setup_vault(0);
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();
    vault.set_recovery_delay(&ADMIN, 60).unwrap();
    assert_eq!(vault.recover(ids[0], &ALICE, T0 + 60), Ok(60));
}

// ═══════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_claimable_deposits_withhold_depositor_from_others() {
    let mut vault = setup_vault(0);
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();

    let own = vault.get_claimable_deposits(&BOB, &BOB);
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id, ids[0]);
    assert_eq!(own[0].depositor, Some(ALICE));
    assert_eq!(own[0].deposit_time, Some(T0));
    assert_eq!(own[0].yield_amount, 60);

    let other = vault.get_claimable_deposits(&BOB, &CAROL);
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].depositor, None);
    assert_eq!(other[0].deposit_time, None);
    assert_eq!(other[0].yield_amount, 60);

    vault.claim(ids[0], &BOB, T0).unwrap();
    assert!(vault.get_claimable_deposits(&BOB, &BOB).is_empty());
}

#[test]
fn test_underlying_amount_estimates() {
    let mut vault = setup_vault(0);
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();

    assert_eq!(vault.get_underlying_amount(ids[0]), 60);
    assert_eq!(vault.get_underlying_amount_logged(ids[1]), 40);
    assert_eq!(vault.try_underlying_amount(ids[0]), Ok(60));

    vault.host_mut().undeploy(&DELEGATE);
    assert_eq!(vault.get_underlying_amount(ids[0]), 0);
    assert_eq!(vault.get_underlying_amount_logged(ids[0]), 0);
    let err = vault.try_underlying_amount(ids[0]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Trust);
}

// ═══════════════════════════════════════════════════════════════════
// Adapter Trust
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_whitelist_revocation_caught_at_use() {
    let mut vault = setup_vault(0);
    vault.set_whitelist_enabled(&ADMIN, true).unwrap();

    let err = vault
        .deposit(&ALICE, USDT, 100, &split_60_40(), T0)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Registry(RegistryError::DelegateNotWhitelisted { delegate: DELEGATE })
    );
    assert_eq!(err.category(), ErrorCategory::Trust);

    vault.set_delegate_whitelist(&ADMIN, DELEGATE, true).unwrap();
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();

    vault.set_delegate_whitelist(&ADMIN, DELEGATE, false).unwrap();
    assert!(vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).is_err());
    assert_eq!(vault.get_underlying_amount(ids[0]), 0);
    assert!(matches!(
        vault.recover_as_underlying(ids[0], &ALICE, T0 + RECOVERY_DELAY),
        Err(LedgerError::Registry(RegistryError::DelegateNotWhitelisted { .. }))
    ));
}

#[test]
fn test_undeployed_delegate_rejected_at_deposit() {
    let mut vault = setup_vault(0);
    vault.host_mut().undeploy(&DELEGATE);
    assert_eq!(
        vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0),
        Err(LedgerError::Registry(RegistryError::DelegateHasNoCode { delegate: DELEGATE }))
    );
    assert_eq!(vault.host().balance_of(&USDT, &ALICE), ALICE_FUNDS);
}

#[test]
fn test_misrouting_adapter_rejected() {
    let mut vault = setup_vault(0);
    let misrouter = Address::repeat_byte(0xd4);
    vault.host_mut().deploy(
        misrouter,
        Arc::new(SimLendingPool::new(POOL).with_market(USDT, AUSDT).misrouting()),
    );
    vault
        .set_token_config(&ADMIN, USDT, misrouter, POOL, "USDT")
        .unwrap();

    let err = vault
        .deposit(&ALICE, USDT, 100, &split_60_40(), T0)
        .unwrap_err();
    assert_eq!(err, LedgerError::YieldMisrouted { depositor: ALICE });
    assert_eq!(vault.host().balance_of(&AUSDT, &ALICE), 0);
    assert_eq!(vault.host().balance_of(&USDT, &ALICE), ALICE_FUNDS);
    assert!(vault.list_active_by_depositor(&ALICE).is_empty());
}

#[test]
fn test_skimming_redeem_rolls_back_and_spares_other_records() {
    let mut vault = setup_vault(0);
    let skimmer = Address::repeat_byte(0xd6);
    vault.host_mut().deploy(skimmer, Arc::new(SkimmingAdapter::new()));
    vault
        .set_token_config(&ADMIN, USDT, skimmer, POOL, "USDT")
        .unwrap();
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();
    vault.drain_events();

    let err = vault
        .recover_as_underlying(ids[1], &ALICE, T0 + RECOVERY_DELAY)
        .unwrap_err();
    assert_eq!(err, LedgerError::RedeemFailed { id: ids[1] });
    assert!(!vault.get_deposit(ids[1]).unwrap().used);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 100);
    assert_eq!(vault.host().balance_of(&AUSDT, &SKIM_SINK), 0);
    assert_eq!(vault.reserved_balance(&AUSDT), 100);
    assert_eq!(vault.host().open_transactions(), 0);
    assert!(vault.events().is_empty());

    assert_eq!(vault.claim(ids[0], &BOB, T0), Ok(60));
    assert_eq!(vault.claim(ids[1], &CAROL, T0), Ok(40));
}

#[test]
fn test_overdrawing_redeem_rejected() {
    let mut vault = setup_vault(0);
    let overdrawer = Address::repeat_byte(0xd7);
    vault.host_mut().deploy(
        overdrawer,
        Arc::new(
            SimLendingPool::new(POOL)
                .with_market(USDT, AUSDT)
                .overdrawing(),
        ),
    );
    vault
        .set_token_config(&ADMIN, USDT, overdrawer, POOL, "USDT")
        .unwrap();
    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();

    let err = vault
        .recover_as_underlying(ids[1], &ALICE, T0 + RECOVERY_DELAY)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::RedeemOverdrawn {
            id: ids[1],
            allowed: 40,
            taken: 100,
        }
    );
    assert_eq!(err.category(), ErrorCategory::Integration);
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 100);
    assert_eq!(vault.host().balance_of(&USDT, &ALICE), ALICE_FUNDS - 100);
    assert_eq!(vault.reserved_balance(&AUSDT), 100);

    // Both shares are still payable.
    assert_eq!(vault.claim(ids[0], &BOB, T0), Ok(60));
    assert_eq!(vault.recover(ids[1], &ALICE, T0 + RECOVERY_DELAY), Ok(40));
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 0);
}

#[test]
fn test_non_admin_configuration_rejected() {
    let mut vault = setup_vault(0);
    assert_eq!(
        vault.set_token_config(&ALICE, USDT, DELEGATE, POOL, "USDT"),
        Err(LedgerError::Unauthorized)
    );
    assert_eq!(
        vault.set_delegate_whitelist(&ALICE, DELEGATE, true),
        Err(LedgerError::Unauthorized)
    );
    assert_eq!(
        vault.request_emergency_withdraw(&ALICE, AUSDT, 0, T0),
        Err(LedgerError::Unauthorized)
    );
}

// ═══════════════════════════════════════════════════════════════════
// Emergency Withdrawal
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_scenario_d_emergency_withdraw_full_balance() {
    let mut vault = setup_vault(0);
    vault.host_mut().mint(AUSDT, CUSTODY, 500);

    let available_at = vault
        .request_emergency_withdraw(&ADMIN, AUSDT, 0, T0)
        .unwrap();
    assert_eq!(available_at, T0 + EMERGENCY_DELAY);
    assert_eq!(vault.emergency_request(&AUSDT).unwrap().amount, 500);

    assert_eq!(
        vault.execute_emergency_withdraw(&ADMIN, AUSDT, available_at - 1),
        Err(LedgerError::Emergency(EmergencyError::DelayNotElapsed { available_at }))
    );
    assert_eq!(vault.execute_emergency_withdraw(&ADMIN, AUSDT, available_at), Ok(500));
    assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 0);
    assert_eq!(vault.host().balance_of(&AUSDT, &ADMIN), 500);
    assert!(vault.emergency_request(&AUSDT).unwrap().executed);
}

#[test]
fn test_emergency_withdraw_never_touches_reserved_funds() {
    let mut vault = setup_vault(0);
    vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();
    vault.host_mut().mint(AUSDT, CUSTODY, 50);

    assert_eq!(vault.request_emergency_withdraw(&ADMIN, AUSDT, 0, T0), Ok(T0 + EMERGENCY_DELAY));
    assert_eq!(
        vault.execute_emergency_withdraw(&ADMIN, AUSDT, T0 + EMERGENCY_DELAY),
        Err(LedgerError::Emergency(EmergencyError::ExceedsUnreserved {
            asset: AUSDT,
            requested: 150,
            available: 50,
        }))
    );

    vault.cancel_emergency_withdraw(&ADMIN, AUSDT, T0).unwrap();
    assert!(vault.emergency_request(&AUSDT).is_none());

    vault.request_emergency_withdraw(&ADMIN, AUSDT, 50, T0).unwrap();
    assert_eq!(
        vault.execute_emergency_withdraw(&ADMIN, AUSDT, T0 + EMERGENCY_DELAY),
        Ok(50)
    );
    assert_eq!(
        vault.host().balance_of(&AUSDT, &CUSTODY),
        vault.reserved_balance(&AUSDT)
    );
}

#[test]
fn test_emergency_request_rules() {
    let mut vault = setup_vault(0);
    vault.host_mut().mint(AUSDT, CUSTODY, 100);

    assert_eq!(
        vault.request_emergency_withdraw(&ADMIN, DAI, 0, T0),
        Err(LedgerError::Emergency(EmergencyError::InvalidAmount))
    );
    assert!(matches!(
        vault.request_emergency_withdraw(&ADMIN, AUSDT, 101, T0),
        Err(LedgerError::Emergency(EmergencyError::InsufficientBalance { .. }))
    ));
    vault.request_emergency_withdraw(&ADMIN, AUSDT, 10, T0).unwrap();
    assert_eq!(
        vault.request_emergency_withdraw(&ADMIN, AUSDT, 10, T0),
        Err(LedgerError::Emergency(EmergencyError::RequestPending { asset: AUSDT }))
    );
    assert_eq!(
        vault.cancel_emergency_withdraw(&ADMIN, DAI, T0),
        Err(LedgerError::Emergency(EmergencyError::NoPendingRequest { asset: DAI }))
    );
}

#[test]
fn test_transferred_admin_controls_emergency() {
    let mut vault = setup_vault(0);
    vault.host_mut().mint(AUSDT, CUSTODY, 100);
    vault.transfer_admin(&ADMIN, CAROL).unwrap();

    assert_eq!(
        vault.request_emergency_withdraw(&ADMIN, AUSDT, 0, T0),
        Err(LedgerError::Unauthorized)
    );
    vault.request_emergency_withdraw(&CAROL, AUSDT, 0, T0).unwrap();
    assert_eq!(
        vault.execute_emergency_withdraw(&CAROL, AUSDT, T0 + EMERGENCY_DELAY),
        Ok(100)
    );
    assert_eq!(vault.host().balance_of(&AUSDT, &CAROL), 100);
}

// ═══════════════════════════════════════════════════════════════════
// Configuration / ABI
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_vault_built_from_json_config() {
    let config =
        LedgerConfig::from_json_str(r#"{"recovery_delay_secs": 60, "emergency_withdraw_delay_secs": 0}"#)
            .unwrap();
    let mut vault = configured_vault(0, config);
    assert_eq!(vault.recovery_delay(), 60);
    assert_eq!(vault.emergency_withdraw_delay(), 0);

    let ids = vault.deposit(&ALICE, USDT, 100, &split_60_40(), T0).unwrap();
    assert_eq!(vault.recover(ids[0], &ALICE, T0 + 60), Ok(60));
}

#[test]
fn test_abi_version_frozen() {
    assert_eq!(LEDGER_ABI_VERSION, "1.0.0");
}

// ═══════════════════════════════════════════════════════════════════
// Fuzz Testing (proptest)
// ═══════════════════════════════════════════════════════════════════

mod fuzz {
    use super::*;
    use proptest::prelude::*;

    /// Strategy for allocation lists with distinct recipients
    fn allocations() -> impl Strategy<Value = Vec<Allocation>> {
        prop::collection::vec(1u128..=1_000_000_000u128, 1..8).prop_map(|amounts| {
            amounts
                .into_iter()
                .enumerate()
                .map(|(i, amount)| Allocation::new(Address::repeat_byte(0x10 + i as u8), amount))
                .collect()
        })
    }

    #[derive(Debug, Clone)]
    enum Action {
        Claim(usize),
        Recover(usize),
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0usize..16).prop_map(Action::Claim),
            (0usize..16).prop_map(Action::Recover),
        ]
    }

    proptest! {
        /// Invariant: record amounts sum to the measured custody delta,
        /// which is exactly what is reserved.
        #[test]
        fn fuzz_deposit_split_conservation(
            allocations in allocations(),
            fee_bps in 0u32..=300u32,
        ) {
            let mut vault = setup_vault(fee_bps);
            let amount: u128 = allocations.iter().map(|a| a.amount).sum();
            vault.host_mut().mint(USDT, ALICE, amount);

            match vault.deposit(&ALICE, USDT, amount, &allocations, T0) {
                Ok(ids) => {
                    let recorded: u128 = ids
                        .iter()
                        .map(|id| vault.get_deposit(*id).unwrap().yield_amount)
                        .sum();
                    prop_assert_eq!(recorded, vault.host().balance_of(&AUSDT, &CUSTODY));
                    prop_assert_eq!(recorded, vault.reserved_balance(&AUSDT));
                }
                Err(err) => {
                    prop_assert!(
                        matches!(err, LedgerError::ZeroYieldShare { .. }),
                        "unexpected error: {:?}",
                        err
                    );
                    prop_assert_eq!(vault.host().balance_of(&AUSDT, &CUSTODY), 0);
                }
            }
        }

        /// Invariant: an id is listed for a party iff its record is active.
        #[test]
        fn fuzz_index_membership(
            allocations in allocations(),
            actions in prop::collection::vec(action(), 0..24),
        ) {
            let mut vault = setup_vault(0);
            let amount: u128 = allocations.iter().map(|a| a.amount).sum();
            vault.host_mut().mint(USDT, ALICE, amount);
            let ids = vault.deposit(&ALICE, USDT, amount, &allocations, T0).unwrap();

            for action in actions {
                let (index, is_claim) = match action {
                    Action::Claim(i) => (i, true),
                    Action::Recover(i) => (i, false),
                };
                let id = ids[index % ids.len()];
                let recipient = allocations[index % ids.len()].recipient;
                let was_active = vault.get_deposit(id).is_some();
                let result = if is_claim {
                    vault.claim(id, &recipient, T0 + 1)
                } else {
                    vault.recover(id, &ALICE, T0 + RECOVERY_DELAY)
                };
                prop_assert_eq!(result.is_ok(), was_active);
                if !was_active {
                    prop_assert_eq!(
                        result,
                        Err(LedgerError::Store(StoreError::AlreadyUsed { id }))
                    );
                }
            }

            prop_assert!(vault.verify_indices().is_ok());
            let by_depositor = vault.list_active_by_depositor(&ALICE);
            for (id, allocation) in ids.iter().zip(&allocations) {
                let active = vault.get_deposit(*id).is_some();
                prop_assert_eq!(by_depositor.contains(id), active);
                prop_assert_eq!(
                    vault.list_active_by_recipient(&allocation.recipient).contains(id),
                    active
                );
            }
        }

        /// Invariant: emergency execution never dips into reserved funds.
        #[test]
        fn fuzz_emergency_respects_reserve(
            deposit in 1u128..=1_000_000u128,
            surplus in 0u128..=1_000_000u128,
            requested in 0u128..=2_000_000u128,
        ) {
            let mut vault = setup_vault(0);
            vault.deposit(&ALICE, USDT, deposit, &[Allocation::new(BOB, deposit)], T0).unwrap();
            vault.host_mut().mint(AUSDT, CUSTODY, surplus);

            if vault.request_emergency_withdraw(&ADMIN, AUSDT, requested, T0).is_ok() {
                let _ = vault.execute_emergency_withdraw(&ADMIN, AUSDT, T0 + EMERGENCY_DELAY);
            }

            let balance = vault.host().balance_of(&AUSDT, &CUSTODY);
            prop_assert!(balance >= vault.reserved_balance(&AUSDT));
            prop_assert_eq!(vault.reserved_balance(&AUSDT), deposit);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

fn split_60_40() -> Vec<Allocation> {
    vec![Allocation::new(BOB, 60), Allocation::new(CAROL, 40)]
}

/// Host with a deployed 1:1 lending pool charging `fee_bps` and funded
/// reserves on both sides.
fn funded_host(fee_bps: u32) -> MemoryHost {
    let mut host = MemoryHost::new();
    host.deploy(
        DELEGATE,
        Arc::new(
            SimLendingPool::new(POOL)
                .with_market(USDT, AUSDT)
                .with_fee_bps(fee_bps),
        ),
    );
    host.mint(AUSDT, POOL, 1_000_000_000_000_000);
    host.mint(USDT, POOL, 1_000_000_000_000_000);
    host.mint(USDT, ALICE, ALICE_FUNDS);
    host
}

fn configured_vault(fee_bps: u32, config: LedgerConfig) -> EscrowVault<MemoryHost> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut vault = EscrowVault::new(ADMIN, CUSTODY, funded_host(fee_bps), config).unwrap();
    vault.set_lending_delegate(&ADMIN, DELEGATE).unwrap();
    vault.set_lending_target(&ADMIN, POOL).unwrap();
    vault.drain_events();
    vault
}

fn setup_vault(fee_bps: u32) -> EscrowVault<MemoryHost> {
    configured_vault(fee_bps, LedgerConfig::default())
}

const SKIM_SINK: Address = Address::repeat_byte(0x5e);

/// Supplies like the funded pool, but on redeem moves the yield asset to a
/// side account and then fails.
#[derive(Debug)]
struct SkimmingAdapter {
    pool: SimLendingPool,
}

impl SkimmingAdapter {
    fn new() -> Self {
        Self {
            pool: SimLendingPool::new(POOL).with_market(USDT, AUSDT),
        }
    }
}

impl YieldAdapter for SkimmingAdapter {
    fn yield_asset(&self, underlying: &Address, target: &Address) -> Result<Address, AdapterError> {
        self.pool.yield_asset(underlying, target)
    }

    fn supply(&self, bank: &mut dyn AssetBank, request: &SupplyRequest) -> Result<u128, AdapterError> {
        self.pool.supply(bank, request)
    }

    fn redeem(&self, bank: &mut dyn AssetBank, request: &RedeemRequest) -> Result<u128, AdapterError> {
        bank.transfer(&request.yield_asset, &request.custody, &SKIM_SINK, request.amount)
            .map_err(|err| AdapterError::Failed {
                reason: err.to_string(),
            })?;
        Ok(request.amount)
    }

    fn estimate_underlying(
        &self,
        bank: &dyn AssetBank,
        yield_asset: &Address,
        amount: u128,
        target: &Address,
    ) -> Result<u128, AdapterError> {
        self.pool.estimate_underlying(bank, yield_asset, amount, target)
    }
}
