// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Integration tests for the double-entry engine against the in-memory store.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use wallet_ledger::{
    AccountId, Direction, Engine, EntryRequest, ErrorKind, Fault, LedgerError, LedgerStore,
    MemoryStore, StoreError, TransactionRequest,
};

fn engine() -> Engine<MemoryStore> {
    Engine::new(Arc::new(MemoryStore::new()))
}

fn transfer(reference: &str, from: &str, to: &str, amount: Decimal) -> TransactionRequest {
    TransactionRequest::new(reference, format!("{from} -> {to}"))
        .debit(from, amount)
        .credit(to, amount)
}

fn id(account: &str) -> AccountId {
    AccountId::from(account)
}

// === Commit ===

#[test]
fn balanced_commit_writes_entries_and_balances() {
    let engine = engine();

    let tx = engine
        .commit(transfer("ref-1", "funding", "acc-1", dec!(50.00)))
        .unwrap();

    assert_eq!(engine.balance(&id("acc-1")).unwrap(), dec!(50.00));
    assert_eq!(engine.balance(&id("funding")).unwrap(), dec!(-50.00));

    let entries = engine.transaction(tx).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.transaction_id == tx));
    assert!(entries.iter().all(|e| e.reference_id == "ref-1"));
    assert!(entries.iter().all(|e| e.description == "funding -> acc-1"));

    let debit = entries.iter().find(|e| e.direction == Direction::Debit).unwrap();
    assert_eq!(debit.account_id, id("funding"));
    assert_eq!(debit.amount, dec!(50.00));
}

#[test]
fn entries_of_one_transaction_share_a_timestamp() {
    let engine = engine();
    let tx = engine
        .commit(transfer("ref", "a", "b", dec!(1)))
        .unwrap();

    let entries = engine.transaction(tx).unwrap();
    assert_eq!(entries[0].created_at, entries[1].created_at);
    assert_ne!(entries[0].id, entries[1].id);
}

#[test]
fn multi_leg_transaction() {
    let engine = engine();
    let request = TransactionRequest::new("split", "split payment")
        .debit("payer", dec!(100.00))
        .credit("x", dec!(60.00))
        .credit("y", dec!(25.00))
        .credit("z", dec!(15.00));

    let tx = engine.commit(request).unwrap();

    assert_eq!(engine.transaction(tx).unwrap().len(), 4);
    assert_eq!(engine.balance(&id("payer")).unwrap(), dec!(-100.00));
    assert_eq!(engine.balance(&id("x")).unwrap(), dec!(60.00));
    assert_eq!(engine.balance(&id("y")).unwrap(), dec!(25.00));
    assert_eq!(engine.balance(&id("z")).unwrap(), dec!(15.00));
}

#[test]
fn repeated_account_nets_to_zero() {
    let engine = engine();
    let request = TransactionRequest::new("self", "round trip")
        .debit("a", dec!(5))
        .credit("a", dec!(5));

    let tx = engine.commit(request).unwrap();

    assert_eq!(engine.transaction(tx).unwrap().len(), 2);
    assert_eq!(engine.balance(&id("a")).unwrap(), Decimal::ZERO);
    assert_eq!(engine.entries(&id("a")).unwrap().len(), 2);
}

#[test]
fn duplicate_reference_ids_are_accepted() {
    let engine = engine();

    let first = engine.commit(transfer("same", "a", "b", dec!(1))).unwrap();
    let second = engine.commit(transfer("same", "a", "b", dec!(1))).unwrap();

    assert_ne!(first, second);
    assert_eq!(engine.balance(&id("b")).unwrap(), dec!(2));
}

#[test]
fn untouched_account_reads_zero() {
    let engine = engine();
    assert_eq!(engine.balance(&id("nobody")).unwrap(), Decimal::ZERO);
    assert!(engine.store().balance(&id("nobody")).unwrap().is_none());
    assert!(engine.entries(&id("nobody")).unwrap().is_empty());
}

#[test]
fn balances_lists_every_materialised_row() {
    let engine = engine();
    engine.commit(transfer("r1", "b", "a", dec!(3))).unwrap();
    engine.commit(transfer("r2", "c", "a", dec!(2))).unwrap();

    let balances = engine.store().balances().unwrap();
    let rows: Vec<_> = balances
        .iter()
        .map(|b| (b.account_id.as_str(), b.amount))
        .collect();
    assert_eq!(rows, vec![("a", dec!(5)), ("b", dec!(-3)), ("c", dec!(-2))]);
}

// === Validation ===

#[test]
fn unbalanced_transaction_is_rejected_without_effects() {
    let engine = engine();
    engine.commit(transfer("seed", "a", "b", dec!(10))).unwrap();

    let request = TransactionRequest::new("bad", "unbalanced")
        .debit("a", dec!(100.00))
        .credit("b", dec!(90.00));
    let result = engine.commit(request);

    assert_eq!(
        result,
        Err(LedgerError::UnbalancedTransaction {
            debits: dec!(100.00),
            credits: dec!(90.00)
        })
    );
    assert_eq!(engine.balance(&id("a")).unwrap(), dec!(-10));
    assert_eq!(engine.balance(&id("b")).unwrap(), dec!(10));
    assert_eq!(engine.store().entry_count(), 2);
}

#[test]
fn single_entry_is_rejected() {
    let engine = engine();
    let request = TransactionRequest::new("one", "lonely").credit("a", dec!(0));

    let err = engine.commit(request).unwrap_err();

    assert!(matches!(err, LedgerError::UnbalancedTransaction { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.store().entry_count(), 0);
}

#[test]
fn empty_transaction_is_rejected() {
    let engine = engine();
    let result = engine.commit(TransactionRequest::new("none", "empty"));
    assert!(matches!(
        result,
        Err(LedgerError::UnbalancedTransaction { .. })
    ));
}

#[test]
fn negative_magnitude_is_rejected() {
    let engine = engine();
    let request = TransactionRequest::new("neg", "negative")
        .entry(EntryRequest::debit("a", dec!(-1)))
        .entry(EntryRequest::credit("b", dec!(-1)));

    assert!(matches!(
        engine.commit(request),
        Err(LedgerError::NegativeMagnitude { .. })
    ));
    assert_eq!(engine.store().entry_count(), 0);
}

#[test]
fn entry_parse_rejects_bad_wire_values() {
    assert_eq!(
        EntryRequest::parse("a", "10.00", "SIDEWAYS"),
        Err(LedgerError::InvalidDirection("SIDEWAYS".to_string()))
    );
    assert_eq!(
        EntryRequest::parse("a", "ten", "DEBIT"),
        Err(LedgerError::InvalidAmount("ten".to_string()))
    );

    let entry = EntryRequest::parse("a", "10.00", "CREDIT").unwrap();
    assert_eq!(entry, EntryRequest::credit("a", dec!(10.00)));
}

#[test]
fn overflowing_amounts_are_rejected() {
    let engine = engine();
    let request = TransactionRequest::new("huge", "too large")
        .debit("a", Decimal::MAX)
        .debit("b", Decimal::MAX)
        .credit("c", Decimal::MAX)
        .credit("d", Decimal::MAX);

    let err = engine.commit(request).unwrap_err();

    assert_eq!(err, LedgerError::AmountOverflow);
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.store().entry_count(), 0);
}

#[test]
fn balance_overflow_rolls_back_the_transaction() {
    let engine = engine();
    engine
        .commit(transfer("max", "funding", "a", Decimal::MAX))
        .unwrap();

    let result = engine.commit(transfer("one-more", "funding", "a", dec!(1)));

    assert_eq!(result, Err(LedgerError::AmountOverflow));
    assert_eq!(engine.balance(&id("a")).unwrap(), Decimal::MAX);
    assert_eq!(engine.balance(&id("funding")).unwrap(), -Decimal::MAX);
    assert_eq!(engine.store().entry_count(), 2);
}

// === Balance floor ===

#[test]
fn balance_floor_rolls_back_the_transaction() {
    let engine = engine();
    engine.commit(transfer("seed", "funding", "user", dec!(10))).unwrap();

    let request = transfer("overdraw", "user", "funding", dec!(15)).require_non_negative("user");
    let result = engine.commit(request);

    assert_eq!(
        result,
        Err(LedgerError::BalanceFloor {
            account: id("user"),
            balance: dec!(-5)
        })
    );
    assert_eq!(engine.balance(&id("user")).unwrap(), dec!(10));
    assert_eq!(engine.balance(&id("funding")).unwrap(), dec!(-10));
    assert_eq!(engine.store().entry_count(), 2);
}

#[test]
fn balance_floor_allows_exact_zero() {
    let engine = engine();
    engine.commit(transfer("seed", "funding", "user", dec!(10))).unwrap();

    let request = transfer("drain", "user", "funding", dec!(10)).require_non_negative("user");
    engine.commit(request).unwrap();

    assert_eq!(engine.balance(&id("user")).unwrap(), Decimal::ZERO);
}

#[test]
fn unguarded_accounts_may_go_negative() {
    let engine = engine();
    engine.commit(transfer("mint", "funding", "user", dec!(1000))).unwrap();
    assert_eq!(engine.balance(&id("funding")).unwrap(), dec!(-1000));
}

// === Atomicity under store failure ===

#[test]
fn faults_at_every_stage_leave_no_trace() {
    for fault in [
        Fault::Begin,
        Fault::AppendEntries,
        Fault::ApplyBalance,
        Fault::Commit,
    ] {
        let engine = engine();
        engine.store().inject_fault(fault);

        let result = engine.commit(transfer("faulty", "a", "b", dec!(7)));

        assert_eq!(
            result,
            Err(LedgerError::Store(StoreError::Fault)),
            "fault at {fault:?}"
        );
        assert_eq!(engine.store().entry_count(), 0, "fault at {fault:?}");
        assert!(engine.store().balances().unwrap().is_empty(), "fault at {fault:?}");

        // The fault is one-shot; the retry goes through.
        engine.commit(transfer("retry", "a", "b", dec!(7))).unwrap();
        assert_eq!(engine.balance(&id("b")).unwrap(), dec!(7));
    }
}

#[test]
fn fault_after_existing_rows_keeps_prior_balances() {
    let engine = engine();
    engine.commit(transfer("seed", "a", "b", dec!(3))).unwrap();
    engine.store().inject_fault(Fault::Commit);

    assert!(engine.commit(transfer("lost", "a", "b", dec!(4))).is_err());

    assert_eq!(engine.balance(&id("a")).unwrap(), dec!(-3));
    assert_eq!(engine.balance(&id("b")).unwrap(), dec!(3));
    assert!(engine.verify_balance(&id("a")).unwrap());
    assert!(engine.verify_balance(&id("b")).unwrap());
}

#[test]
fn unavailable_store_is_an_infrastructure_error() {
    let engine = engine();
    engine.store().set_available(false);

    let err = engine.commit(transfer("down", "a", "b", dec!(1))).unwrap_err();
    assert_eq!(err, LedgerError::Store(StoreError::Unavailable));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);

    engine.store().set_available(true);
    assert_eq!(engine.store().entry_count(), 0);
}

// === Replay ===

#[test]
fn replay_matches_materialised_balances() {
    let engine = engine();
    engine.commit(transfer("1", "funding", "a", dec!(100.00))).unwrap();
    engine.commit(transfer("2", "a", "b", dec!(30.25))).unwrap();
    engine.commit(transfer("3", "b", "funding", dec!(0.25))).unwrap();

    for account in ["funding", "a", "b"] {
        let account = id(account);
        assert_eq!(
            engine.replay_balance(&account).unwrap(),
            engine.balance(&account).unwrap()
        );
        assert!(engine.verify_balance(&account).unwrap());
    }
    assert_eq!(engine.balance(&id("a")).unwrap(), dec!(69.75));
}

#[test]
fn entries_are_returned_oldest_first() {
    let engine = engine();
    engine.commit(transfer("1", "f", "a", dec!(1))).unwrap();
    engine.commit(transfer("2", "f", "a", dec!(2))).unwrap();

    let references: Vec<_> = engine
        .entries(&id("a"))
        .unwrap()
        .into_iter()
        .map(|e| e.reference_id)
        .collect();
    assert_eq!(references, vec!["1", "2"]);
}
