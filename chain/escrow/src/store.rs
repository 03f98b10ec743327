//! Record Store: deposit records and active indices
//!
//! Owns every `DepositRecord` plus two derived indices listing the active
//! (unused) record ids per depositor and per recipient. Records are never
//! deleted; finalizing one zeroes its amount and drops it from both indices.
//!
//! Writes made while a transaction is open are journaled so the enclosing
//! operation can be rolled back exactly.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::error;
use types::ids::{Address, DepositId};
use types::numeric::ensure_record_width;

use crate::errors::StoreError;

const DEPOSITOR_INDEX: &str = "depositor";
const RECIPIENT_INDEX: &str = "recipient";

/// Terminal transition a record went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Finalization {
    Claimed,
    Recovered,
    RecoveredAsUnderlying,
}

/// One escrowed claim covering a single depositor/recipient pair.
///
/// Invariant: `used == true` iff `yield_amount == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub id: DepositId,
    pub depositor: Address,
    pub intended_recipient: Address,
    pub deposit_time: i64,
    pub used: bool,
    pub yield_amount: u128,
    pub yield_asset: Address,
    pub underlying_asset: Address,
    pub finalization: Option<Finalization>,
}

impl DepositRecord {
    /// Active records are unused and carry a non-zero amount.
    pub fn is_active(&self) -> bool {
        !self.used && self.yield_amount > 0
    }
}

/// Record contents before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub depositor: Address,
    pub intended_recipient: Address,
    pub deposit_time: i64,
    pub yield_amount: u128,
    pub yield_asset: Address,
    pub underlying_asset: Address,
}

#[derive(Debug, Clone)]
enum Undo {
    Inserted(DepositId),
    Finalized(DepositRecord),
}

#[derive(Debug, Clone)]
struct Journal {
    next_id: DepositId,
    undo: Vec<Undo>,
}

/// Durable map of deposit records plus the two active indices.
#[derive(Debug, Clone)]
pub struct RecordStore {
    records: BTreeMap<DepositId, DepositRecord>,
    next_id: DepositId,
    by_depositor: HashMap<Address, BTreeSet<DepositId>>,
    by_recipient: HashMap<Address, BTreeSet<DepositId>>,
    journal: Option<Journal>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: DepositId::FIRST,
            by_depositor: HashMap::new(),
            by_recipient: HashMap::new(),
            journal: None,
        }
    }

    // ───────────────────────── Transactions ─────────────────────────

    /// Start journaling writes. A second `begin` while open keeps the
    /// existing journal.
    pub fn begin(&mut self) {
        if self.journal.is_none() {
            self.journal = Some(Journal {
                next_id: self.next_id,
                undo: Vec::new(),
            });
        }
    }

    /// Keep every write since `begin`.
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo every write since `begin`.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };

        for undo in journal.undo.into_iter().rev() {
            match undo {
                Undo::Inserted(id) => {
                    if let Some(record) = self.records.remove(&id) {
                        detach(&mut self.by_depositor, &record.depositor, id);
                        detach(&mut self.by_recipient, &record.intended_recipient, id);
                    }
                }
                Undo::Finalized(previous) => {
                    let id = previous.id;
                    attach(&mut self.by_depositor, previous.depositor, id);
                    attach(&mut self.by_recipient, previous.intended_recipient, id);
                    self.records.insert(id, previous);
                }
            }
        }
        self.next_id = journal.next_id;
    }

    fn record_undo(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.undo.push(undo);
        }
    }

    // ───────────────────────── Writes ─────────────────────────

    /// Write and index a batch of records. Either every record is written or
    /// none is.
    pub fn insert_batch(&mut self, batch: Vec<NewRecord>) -> Result<Vec<DepositId>, StoreError> {
        if batch.is_empty() {
            return Err(StoreError::EmptyBatch);
        }

        for record in &batch {
            if record.yield_amount == 0 {
                return Err(StoreError::ZeroAmount);
            }
            ensure_record_width(record.yield_amount).map_err(|_| StoreError::AmountOutOfRange {
                amount: record.yield_amount,
            })?;
            if record.depositor.is_zero()
                || record.intended_recipient.is_zero()
                || record.yield_asset.is_zero()
                || record.underlying_asset.is_zero()
            {
                return Err(StoreError::ZeroAddress);
            }
        }

        // The last id handed out must still leave the counter valid.
        let last = self
            .next_id
            .value()
            .checked_add(batch.len() as u64)
            .ok_or(StoreError::IdsExhausted)?;

        let mut ids = Vec::with_capacity(batch.len());
        for record in batch {
            let id = self.next_id;
            self.next_id = id.next().ok_or(StoreError::IdsExhausted)?;

            attach(&mut self.by_depositor, record.depositor, id);
            attach(&mut self.by_recipient, record.intended_recipient, id);
            self.records.insert(
                id,
                DepositRecord {
                    id,
                    depositor: record.depositor,
                    intended_recipient: record.intended_recipient,
                    deposit_time: record.deposit_time,
                    used: false,
                    yield_amount: record.yield_amount,
                    yield_asset: record.yield_asset,
                    underlying_asset: record.underlying_asset,
                    finalization: None,
                },
            );
            self.record_undo(Undo::Inserted(id));
            ids.push(id);
        }
        debug_assert_eq!(self.next_id.value(), last);

        Ok(ids)
    }

    /// Finalize a record: set `used`, zero its amount, drop it from both
    /// active indices.
    ///
    /// Returns the record as it was before finalization.
    pub fn mark_used(
        &mut self,
        id: DepositId,
        finalization: Finalization,
    ) -> Result<DepositRecord, StoreError> {
        let record = self.records.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        if record.used {
            return Err(StoreError::AlreadyUsed { id });
        }
        if record.yield_amount == 0 {
            return Err(StoreError::NotFound { id });
        }

        let previous = record.clone();
        record.used = true;
        record.yield_amount = 0;
        record.finalization = Some(finalization);
        self.record_undo(Undo::Finalized(previous.clone()));

        remove_active(&mut self.by_depositor, &previous.depositor, id, DEPOSITOR_INDEX)?;
        remove_active(&mut self.by_recipient, &previous.intended_recipient, id, RECIPIENT_INDEX)?;

        Ok(previous)
    }

    // ───────────────────────── Reads ─────────────────────────

    /// Active record by id. Finalized and unknown ids read as absent.
    pub fn get(&self, id: DepositId) -> Option<&DepositRecord> {
        self.records.get(&id).filter(|r| r.yield_amount > 0)
    }

    /// Audit read: the record in whatever state it is in.
    pub fn history(&self, id: DepositId) -> Option<&DepositRecord> {
        self.records.get(&id)
    }

    pub fn list_active_by_depositor(&self, depositor: &Address) -> Vec<DepositId> {
        list(&self.by_depositor, depositor)
    }

    pub fn list_active_by_recipient(&self, recipient: &Address) -> Vec<DepositId> {
        list(&self.by_recipient, recipient)
    }

    /// Live sum of amounts owed by active records in `yield_asset`.
    pub fn reserved(&self, yield_asset: &Address) -> u128 {
        self.records
            .values()
            .filter(|r| r.is_active() && r.yield_asset == *yield_asset)
            .fold(0u128, |acc, r| acc.saturating_add(r.yield_amount))
    }

    /// Total records ever written.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records still active.
    pub fn active_count(&self) -> usize {
        self.records.values().filter(|r| r.is_active()).count()
    }

    /// Id the next inserted record will receive.
    pub fn next_id(&self) -> DepositId {
        self.next_id
    }

    /// Cross-check both indices against the record map.
    pub fn verify_indices(&self) -> Result<(), StoreError> {
        for record in self.records.values() {
            let in_depositor = contains(&self.by_depositor, &record.depositor, record.id);
            let in_recipient = contains(&self.by_recipient, &record.intended_recipient, record.id);
            if in_depositor != record.is_active() {
                return Err(StoreError::ConsistencyFault {
                    id: record.id,
                    index: DEPOSITOR_INDEX,
                });
            }
            if in_recipient != record.is_active() {
                return Err(StoreError::ConsistencyFault {
                    id: record.id,
                    index: RECIPIENT_INDEX,
                });
            }
        }

        for (index, name) in [
            (&self.by_depositor, DEPOSITOR_INDEX),
            (&self.by_recipient, RECIPIENT_INDEX),
        ] {
            for id in index.values().flatten() {
                if !self.records.get(id).map_or(false, DepositRecord::is_active) {
                    return Err(StoreError::ConsistencyFault { id: *id, index: name });
                }
            }
        }
        Ok(())
    }
}

fn attach(index: &mut HashMap<Address, BTreeSet<DepositId>>, party: Address, id: DepositId) {
    index.entry(party).or_default().insert(id);
}

fn detach(index: &mut HashMap<Address, BTreeSet<DepositId>>, party: &Address, id: DepositId) -> bool {
    let Some(ids) = index.get_mut(party) else {
        return false;
    };
    let removed = ids.remove(&id);
    if ids.is_empty() {
        index.remove(party);
    }
    removed
}

fn remove_active(
    index: &mut HashMap<Address, BTreeSet<DepositId>>,
    party: &Address,
    id: DepositId,
    name: &'static str,
) -> Result<(), StoreError> {
    if !detach(index, party, id) {
        error!(deposit_id = %id, index = name, "Active index is missing a live deposit");
        return Err(StoreError::ConsistencyFault { id, index: name });
    }
    Ok(())
}

fn list(index: &HashMap<Address, BTreeSet<DepositId>>, party: &Address) -> Vec<DepositId> {
    index
        .get(party)
        .map(|ids| ids.iter().copied().collect())
        .unwrap_or_default()
}

fn contains(index: &HashMap<Address, BTreeSet<DepositId>>, party: &Address, id: DepositId) -> bool {
    index.get(party).map_or(false, |ids| ids.contains(&id))
}
