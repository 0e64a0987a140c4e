//! Encrypted transaction CRUD over a [`RecordStore`].

use crate::amount::Amount;
use crate::error::Error;
use crate::key::EncryptionKey;
use crate::mapper::RecordMapper;
use crate::record::{
    Mood, StoredTransaction, Transaction, TransactionDraft, TransactionPatch, TransactionType,
    TRANSACTIONS_TABLE,
};
use crate::store::{Direction, RecordStore, Selection};
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;
use uuid::Uuid;

/// Filters for [`TransactionRepository::list`].
///
/// Category, type, mood and date range are evaluated by the store. Tags and
/// amount bounds are evaluated after decryption; amount bounds only apply to
/// records that decrypted successfully, so failures are still reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Only this category
    pub category_id: Option<String>,
    /// Only this kind
    pub transaction_type: Option<TransactionType>,
    /// Only this mood
    pub mood: Option<Mood>,
    /// Earliest date, inclusive
    pub start_date: Option<NaiveDate>,
    /// Latest date, inclusive
    pub end_date: Option<NaiveDate>,
    /// Keep records carrying any of these tags
    pub tags: Vec<String>,
    /// Smallest amount, inclusive
    pub min_amount: Option<Amount>,
    /// Largest amount, inclusive
    pub max_amount: Option<Amount>,
    /// Maximum number of rows fetched
    pub limit: Option<usize>,
    /// Rows skipped before the first one fetched
    pub offset: usize,
}

impl TransactionQuery {
    fn selection(&self) -> Result<Selection, Error> {
        let mut selection = Selection::new();
        if let Some(category) = &self.category_id {
            selection = selection.eq("category_id", category.as_str())?;
        }
        if let Some(kind) = self.transaction_type {
            selection = selection.eq("type", kind.as_str())?;
        }
        if let Some(mood) = self.mood {
            selection = selection.eq("mood", mood.as_str())?;
        }
        if let Some(start) = self.start_date {
            selection = selection.gte("transaction_date", start.to_string())?;
        }
        if let Some(end) = self.end_date {
            selection = selection.lte("transaction_date", end.to_string())?;
        }
        selection =
            selection.order_by("transaction_date", Direction::Descending)?.offset(self.offset);
        if let Some(limit) = self.limit {
            selection = selection.limit(limit);
        }
        Ok(selection)
    }

    fn keeps(&self, outcome: &Result<Transaction, Error>) -> bool {
        let Ok(record) = outcome else {
            return true;
        };
        if !self.tags.is_empty() && !record.tags.iter().any(|tag| self.tags.contains(tag)) {
            return false;
        }
        if let Some(min) = &self.min_amount {
            if record.amount.cmp_value(min) == Ordering::Less {
                return false;
            }
        }
        if let Some(max) = &self.max_amount {
            if record.amount.cmp_value(max) == Ordering::Greater {
                return false;
            }
        }
        true
    }
}

/// Creates, reads, updates and deletes encrypted transactions.
///
/// The key is passed to every call; the repository never holds it.
#[derive(Debug)]
pub struct TransactionRepository<R: RecordStore> {
    store: R,
    mapper: RecordMapper,
}

impl<R: RecordStore> TransactionRepository<R> {
    /// Creates a repository over `store`.
    #[must_use]
    pub const fn new(store: R, mapper: RecordMapper) -> Self {
        Self { store, mapper }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &R {
        &self.store
    }

    /// Encrypts and stores a new transaction.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRecord` if the draft fails validation
    /// - `Error::Store` if the store rejects the row
    /// - any decryption error for the row the store returns
    pub fn create(
        &self,
        draft: &TransactionDraft,
        key: &EncryptionKey,
    ) -> Result<Transaction, Error> {
        let record = Transaction::from_draft(Uuid::new_v4().to_string(), draft, Utc::now())?;
        let stored = self.mapper.to_storage_shape(&record, key)?;
        let row = self.store.insert(TRANSACTIONS_TABLE, to_row(&stored)?)?;
        debug!(id = %record.id, "transaction created");
        self.mapper.from_storage_shape(&parse_row(row)?, key)
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRecord` if the patch sets a non-positive amount
    /// - `Error::Store` if the row does not exist
    /// - any decryption error for the updated row
    pub fn update(
        &self,
        id: &str,
        patch: &TransactionPatch,
        key: &EncryptionKey,
    ) -> Result<Transaction, Error> {
        let stored = self.mapper.patch_to_storage_shape(patch, key)?;
        let row = self.store.update(TRANSACTIONS_TABLE, id, to_row(&stored)?)?;
        debug!(id, "transaction updated");
        self.mapper.from_storage_shape(&parse_row(row)?, key)
    }

    /// Deletes a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store rejects the request.
    pub fn delete(&self, id: &str) -> Result<(), Error> {
        self.store.delete(TRANSACTIONS_TABLE, id)?;
        debug!(id, "transaction deleted");
        Ok(())
    }

    /// Fetches and decrypts one transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` or the decryption error for that record.
    pub fn get(&self, id: &str, key: &EncryptionKey) -> Result<Option<Transaction>, Error> {
        let selection = Selection::new().eq("id", id)?.limit(1);
        self.store
            .select(TRANSACTIONS_TABLE, &selection)?
            .into_iter()
            .next()
            .map(|row| self.mapper.from_storage_shape(&parse_row(row)?, key))
            .transpose()
    }

    /// Lists transactions newest first, one outcome per record.
    ///
    /// # Errors
    ///
    /// Returns an error only if the query is rejected by the store; records
    /// that fail to decrypt are returned as `Err` entries.
    pub fn list(
        &self,
        query: &TransactionQuery,
        key: &EncryptionKey,
    ) -> Result<Vec<Result<Transaction, Error>>, Error> {
        let rows = self.store.select(TRANSACTIONS_TABLE, &query.selection()?)?;

        let mut stored = Vec::with_capacity(rows.len());
        let mut malformed = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_row(row) {
                Ok(row) => {
                    stored.push(row);
                    malformed.push(None);
                }
                Err(err) => malformed.push(Some(err)),
            }
        }

        let mut opened =
            self.mapper.from_storage_shape_many::<Transaction>(&stored, key).into_iter();
        let outcomes = malformed
            .into_iter()
            .filter_map(|slot| match slot {
                Some(err) => Some(Err(err)),
                None => opened.next(),
            })
            .filter(|outcome| query.keeps(outcome))
            .collect();
        Ok(outcomes)
    }
}

fn to_row<T: serde::Serialize>(stored: &T) -> Result<Value, Error> {
    serde_json::to_value(stored)
        .map_err(|e| Error::Store(format!("row could not be serialized: {e}")))
}

fn parse_row(row: Value) -> Result<StoredTransaction, Error> {
    serde_json::from_value(row)
        .map_err(|e| Error::InvalidRecord(format!("malformed transaction row: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::generate_random_key;
    use crate::store::MemoryRecordStore;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn draft(amount: &str, kind: TransactionType, day: u32) -> TransactionDraft {
        TransactionDraft::new(amount.parse().unwrap(), kind, date(2024, 3, day))
    }

    fn repository() -> TransactionRepository<MemoryRecordStore> {
        TransactionRepository::new(MemoryRecordStore::new(), RecordMapper::default())
    }

    #[test]
    fn test_create_and_get() {
        let repo = repository();
        let key = generate_random_key();

        let created = repo
            .create(&draft("42.50", TransactionType::Expense, 1).with_notes("coffee with Jo"), &key)
            .unwrap();
        let fetched = repo.get(&created.id, &key).unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.amount.to_string(), "42.50");

        let raw = repo.store().raw(TRANSACTIONS_TABLE, &created.id).unwrap().to_string();
        assert!(!raw.contains("42.50"));
        assert!(!raw.contains("coffee"));
    }

    #[test]
    fn test_get_missing() {
        let repo = repository();
        assert!(repo.get("nope", &generate_random_key()).unwrap().is_none());
    }

    #[test]
    fn test_update_clears_notes() {
        let repo = repository();
        let key = generate_random_key();
        let lunch = draft("10", TransactionType::Expense, 2).with_notes("lunch");
        let created = repo.create(&lunch, &key).unwrap();

        let patch = TransactionPatch {
            notes: Some(None),
            mood: Some(Some(Mood::Regret)),
            ..TransactionPatch::default()
        };
        let updated = repo.update(&created.id, &patch, &key).unwrap();

        assert!(updated.notes.is_none());
        assert_eq!(updated.mood, Some(Mood::Regret));
        assert_eq!(updated.amount, created.amount);
        assert!(updated.updated_at >= created.updated_at);

        let raw = repo.store().raw(TRANSACTIONS_TABLE, &created.id).unwrap();
        assert!(raw["encrypted_notes"].is_null() && raw["iv_notes"].is_null());
    }

    #[test]
    fn test_update_amount() {
        let repo = repository();
        let key = generate_random_key();
        let created = repo.create(&draft("10", TransactionType::Expense, 2), &key).unwrap();

        let amount = Some("12.75".parse().unwrap());
        let patch = TransactionPatch { amount, ..TransactionPatch::default() };
        let updated = repo.update(&created.id, &patch, &key).unwrap();
        assert_eq!(updated.amount.to_string(), "12.75");
    }

    #[test]
    fn test_delete() {
        let repo = repository();
        let key = generate_random_key();
        let created = repo.create(&draft("1", TransactionType::Income, 3), &key).unwrap();

        repo.delete(&created.id).unwrap();
        assert!(repo.get(&created.id, &key).unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first_with_plaintext_filters() {
        let repo = repository();
        let key = generate_random_key();
        repo.create(&draft("1", TransactionType::Expense, 1), &key).unwrap();
        repo.create(&draft("2", TransactionType::Income, 2), &key).unwrap();
        repo.create(&draft("3", TransactionType::Expense, 3), &key).unwrap();

        let query = TransactionQuery {
            transaction_type: Some(TransactionType::Expense),
            ..TransactionQuery::default()
        };
        let amounts: Vec<String> = repo
            .list(&query, &key)
            .unwrap()
            .into_iter()
            .map(|outcome| outcome.unwrap().amount.to_string())
            .collect();

        assert_eq!(amounts, vec!["3", "1"]);
    }

    #[test]
    fn test_list_date_range_and_limit() {
        let repo = repository();
        let key = generate_random_key();
        for day in 1..=5 {
            repo.create(&draft("1", TransactionType::Expense, day), &key).unwrap();
        }

        let query = TransactionQuery {
            start_date: Some(date(2024, 3, 2)),
            end_date: Some(date(2024, 3, 4)),
            limit: Some(2),
            ..TransactionQuery::default()
        };
        let dates: Vec<NaiveDate> = repo
            .list(&query, &key)
            .unwrap()
            .into_iter()
            .map(|o| o.unwrap().transaction_date)
            .collect();

        assert_eq!(dates, vec![date(2024, 3, 4), date(2024, 3, 3)]);
    }

    #[test]
    fn test_list_amount_range_is_client_side() {
        let repo = repository();
        let key = generate_random_key();
        for amount in ["5.00", "25.50", "100"] {
            repo.create(&draft(amount, TransactionType::Expense, 1), &key).unwrap();
        }

        let query = TransactionQuery {
            min_amount: Some("10".parse().unwrap()),
            max_amount: Some("100.00".parse().unwrap()),
            ..TransactionQuery::default()
        };
        let mut amounts: Vec<String> = repo
            .list(&query, &key)
            .unwrap()
            .into_iter()
            .map(|o| o.unwrap().amount.to_string())
            .collect();
        amounts.sort();

        assert_eq!(amounts, vec!["100", "25.50"]);
    }

    #[test]
    fn test_list_tags_match_any() {
        let repo = repository();
        let key = generate_random_key();
        repo.create(&draft("1", TransactionType::Expense, 1).with_tags(["Food"]), &key).unwrap();
        repo.create(&draft("2", TransactionType::Expense, 2).with_tags(["travel"]), &key).unwrap();
        repo.create(&draft("3", TransactionType::Expense, 3), &key).unwrap();

        let query = TransactionQuery {
            tags: vec!["food".to_string(), "gifts".to_string()],
            ..TransactionQuery::default()
        };
        let outcomes = repo.list(&query, &key).unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].as_ref().unwrap().tags, vec!["food".to_string()]);
    }

    #[test]
    fn test_list_keeps_failures_in_place() {
        let repo = repository();
        let key = generate_random_key();
        let _a = repo.create(&draft("1", TransactionType::Expense, 3), &key).unwrap();
        let b = repo.create(&draft("2", TransactionType::Expense, 2), &key).unwrap();
        let _c = repo.create(&draft("3", TransactionType::Expense, 1), &key).unwrap();

        let other = generate_random_key();
        let foreign = RecordMapper::default().to_storage_shape(&b, &other).unwrap();
        let store = repo.store();
        let ciphertext = json!(foreign.encrypted_amount);
        store.put_raw(TRANSACTIONS_TABLE, &b.id, "encrypted_amount", ciphertext);
        repo.store().put_raw(TRANSACTIONS_TABLE, &b.id, "iv_amount", json!(foreign.iv_amount));

        let min_amount = Some("100".parse().unwrap());
        let query = TransactionQuery { min_amount, ..TransactionQuery::default() };
        let outcomes = repo.list(&query, &key).unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_list_reports_malformed_rows() {
        let repo = repository();
        let key = generate_random_key();
        let created = repo.create(&draft("1", TransactionType::Expense, 1), &key).unwrap();
        repo.store().put_raw(TRANSACTIONS_TABLE, &created.id, "type", json!("gift"));

        let outcomes = repo.list(&TransactionQuery::default(), &key).unwrap();
        assert!(matches!(outcomes[0], Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_create_rejects_invalid_draft() {
        let repo = repository();
        let result = repo.create(&draft("0", TransactionType::Expense, 1), &generate_random_key());
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }
}
