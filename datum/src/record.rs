//! Domain records and their storage shapes.
//!
//! Amounts, notes and goal names are encrypted; identifiers, dates,
//! enumerations, category references and tags stay in plaintext so the
//! remote store can filter and order on them.

use crate::amount::Amount;
use crate::codec::{FieldKind, FieldValue};
use crate::context::FieldContext;
use crate::error::Error;
use crate::mapper::{EncryptedColumn, EncryptedPatch, EncryptedRecord, FieldSealer};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Table holding transactions.
pub const TRANSACTIONS_TABLE: &str = "transactions";

/// Table holding goals.
pub const GOALS_TABLE: &str = "goals";

/// Encrypted amount of a transaction.
pub const TRANSACTION_AMOUNT: EncryptedColumn = EncryptedColumn {
    context: FieldContext::new(TRANSACTIONS_TABLE, "amount"),
    ciphertext: "encrypted_amount",
    nonce: "iv_amount",
    kind: FieldKind::Amount,
};

/// Encrypted notes of a transaction.
pub const TRANSACTION_NOTES: EncryptedColumn = EncryptedColumn {
    context: FieldContext::new(TRANSACTIONS_TABLE, "notes"),
    ciphertext: "encrypted_notes",
    nonce: "iv_notes",
    kind: FieldKind::Text,
};

/// Encrypted name of a goal.
pub const GOAL_NAME: EncryptedColumn = EncryptedColumn {
    context: FieldContext::new(GOALS_TABLE, "name"),
    ciphertext: "encrypted_name",
    nonce: "iv_name",
    kind: FieldKind::Text,
};

/// Encrypted target amount of a goal.
pub const GOAL_TARGET_AMOUNT: EncryptedColumn = EncryptedColumn {
    context: FieldContext::new(GOALS_TABLE, "target_amount"),
    ciphertext: "encrypted_target_amount",
    nonce: "iv_target_amount",
    kind: FieldKind::Amount,
};

/// Kind of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money spent
    Expense,
    /// Money received
    Income,
    /// Money invested
    Investment,
}

impl TransactionType {
    /// Column value used by the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Investment => "investment",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the user felt about a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    /// Happy / worth it
    Happy,
    /// Necessary / planned
    Necessary,
    /// Impulse / unplanned
    Impulse,
    /// Regret / stress
    Regret,
}

impl Mood {
    /// Column value used by the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Necessary => "necessary",
            Self::Impulse => "impulse",
            Self::Regret => "regret",
        }
    }
}

/// Normalizes tag names: trimmed, lower-cased, de-duplicated, empties dropped.
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

/// Validated form input for a new transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    /// Positive amount
    pub amount: Amount,
    /// Transaction kind
    pub transaction_type: TransactionType,
    /// Calendar date of the transaction
    pub transaction_date: NaiveDate,
    /// Optional category reference
    pub category_id: Option<String>,
    /// Optional mood
    pub mood: Option<Mood>,
    /// Optional free-text notes
    pub notes: Option<String>,
    /// Tag names
    pub tags: Vec<String>,
}

impl TransactionDraft {
    /// Creates a draft with the required fields.
    #[must_use]
    pub const fn new(
        amount: Amount,
        transaction_type: TransactionType,
        transaction_date: NaiveDate,
    ) -> Self {
        Self {
            amount,
            transaction_type,
            transaction_date,
            category_id: None,
            mood: None,
            notes: None,
            tags: Vec::new(),
        }
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    /// Sets the mood.
    #[must_use]
    pub const fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        self
    }

    /// Checks the draft against the form contract.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the amount is not positive.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.amount.is_positive() {
            return Err(Error::InvalidRecord(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// A decrypted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Record identifier
    pub id: String,
    /// Decrypted amount
    pub amount: Amount,
    /// Transaction kind
    pub transaction_type: TransactionType,
    /// Calendar date of the transaction
    pub transaction_date: NaiveDate,
    /// Category reference
    pub category_id: Option<String>,
    /// Mood
    pub mood: Option<Mood>,
    /// Decrypted notes
    pub notes: Option<String>,
    /// Tag names
    pub tags: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a transaction from a validated draft.
    ///
    /// Notes are trimmed (blank notes become `None`) and tags normalized.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the draft fails validation.
    pub fn from_draft(
        id: impl Into<String>,
        draft: &TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        draft.validate()?;
        Ok(Self {
            id: id.into(),
            amount: draft.amount,
            transaction_type: draft.transaction_type,
            transaction_date: draft.transaction_date,
            category_id: draft.category_id.clone(),
            mood: draft.mood,
            notes: normalize_notes(draft.notes.as_deref()),
            tags: normalize_tags(&draft.tags),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Storage shape of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    /// Record identifier
    pub id: String,
    /// Base64 amount ciphertext
    #[serde(default)]
    pub encrypted_amount: Option<String>,
    /// Base64 amount nonce
    #[serde(default)]
    pub iv_amount: Option<String>,
    /// Transaction kind
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Calendar date of the transaction
    pub transaction_date: NaiveDate,
    /// Category reference
    #[serde(default)]
    pub category_id: Option<String>,
    /// Mood
    #[serde(default)]
    pub mood: Option<Mood>,
    /// Base64 notes ciphertext
    #[serde(default)]
    pub encrypted_notes: Option<String>,
    /// Base64 notes nonce
    #[serde(default)]
    pub iv_notes: Option<String>,
    /// Tag names
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl EncryptedRecord for Transaction {
    type Stored = StoredTransaction;

    fn seal(&self, sealer: &FieldSealer<'_>) -> Result<StoredTransaction, Error> {
        let amount = sealer.seal(&FieldValue::Amount(self.amount), &TRANSACTION_AMOUNT)?;
        let notes = self
            .notes
            .as_deref()
            .map(|notes| sealer.seal(&FieldValue::from(notes), &TRANSACTION_NOTES))
            .transpose()?;
        let (encrypted_notes, iv_notes) = match notes {
            Some(field) => (Some(field.ciphertext), Some(field.nonce)),
            None => (None, None),
        };

        Ok(StoredTransaction {
            id: self.id.clone(),
            encrypted_amount: Some(amount.ciphertext),
            iv_amount: Some(amount.nonce),
            transaction_type: self.transaction_type,
            transaction_date: self.transaction_date,
            category_id: self.category_id.clone(),
            mood: self.mood,
            encrypted_notes,
            iv_notes,
            tags: self.tags.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn open(stored: &StoredTransaction, sealer: &FieldSealer<'_>) -> Result<Self, Error> {
        let amount = sealer
            .open_required(
                stored.encrypted_amount.as_deref(),
                stored.iv_amount.as_deref(),
                &TRANSACTION_AMOUNT,
            )?
            .into_amount()?;
        let notes = sealer
            .open_optional(
                stored.encrypted_notes.as_deref(),
                stored.iv_notes.as_deref(),
                &TRANSACTION_NOTES,
            )?
            .map(FieldValue::into_text)
            .transpose()?;

        Ok(Self {
            id: stored.id.clone(),
            amount,
            transaction_type: stored.transaction_type,
            transaction_date: stored.transaction_date,
            category_id: stored.category_id.clone(),
            mood: stored.mood,
            notes,
            tags: stored.tags.clone(),
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }
}

/// Partial update of a transaction. `None` leaves an attribute unchanged;
/// `Some(None)` clears an optional attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPatch {
    /// New amount
    pub amount: Option<Amount>,
    /// New kind
    pub transaction_type: Option<TransactionType>,
    /// New date
    pub transaction_date: Option<NaiveDate>,
    /// New category, or `Some(None)` to clear
    pub category_id: Option<Option<String>>,
    /// New mood, or `Some(None)` to clear
    pub mood: Option<Option<Mood>>,
    /// New notes, or `Some(None)` to clear
    pub notes: Option<Option<String>>,
    /// Replacement tag set
    pub tags: Option<Vec<String>>,
}

/// Storage shape of a [`TransactionPatch`]. Absent fields are not serialized;
/// cleared fields serialize as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredTransactionPatch {
    /// Base64 amount ciphertext
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_amount: Option<String>,
    /// Base64 amount nonce
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv_amount: Option<String>,
    /// Transaction kind
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
    /// Calendar date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<NaiveDate>,
    /// Category reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<String>>,
    /// Mood
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<Option<Mood>>,
    /// Base64 notes ciphertext
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_notes: Option<Option<String>>,
    /// Base64 notes nonce
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv_notes: Option<Option<String>>,
    /// Tag names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Update time
    pub updated_at: DateTime<Utc>,
}

impl EncryptedPatch for TransactionPatch {
    type Stored = StoredTransactionPatch;

    fn seal(&self, sealer: &FieldSealer<'_>) -> Result<StoredTransactionPatch, Error> {
        let amount = match self.amount {
            Some(amount) if !amount.is_positive() => {
                return Err(Error::InvalidRecord(format!("amount must be positive, got {amount}")))
            }
            Some(amount) => Some(sealer.seal(&FieldValue::Amount(amount), &TRANSACTION_AMOUNT)?),
            None => None,
        };
        let (encrypted_notes, iv_notes) = match &self.notes {
            None => (None, None),
            Some(notes) => match normalize_notes(notes.as_deref()) {
                Some(notes) => {
                    let field = sealer.seal(&FieldValue::Text(notes), &TRANSACTION_NOTES)?;
                    (Some(Some(field.ciphertext)), Some(Some(field.nonce)))
                }
                None => (Some(None), Some(None)),
            },
        };
        let (encrypted_amount, iv_amount) = match amount {
            Some(field) => (Some(field.ciphertext), Some(field.nonce)),
            None => (None, None),
        };

        Ok(StoredTransactionPatch {
            encrypted_amount,
            iv_amount,
            transaction_type: self.transaction_type,
            transaction_date: self.transaction_date,
            category_id: self.category_id.clone(),
            mood: self.mood,
            encrypted_notes,
            iv_notes,
            tags: self.tags.as_ref().map(normalize_tags),
            updated_at: Utc::now(),
        })
    }
}

/// A decrypted savings goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    /// Record identifier
    pub id: String,
    /// Decrypted goal name
    pub name: String,
    /// Decrypted target amount
    pub target_amount: Amount,
    /// Optional deadline
    pub target_date: Option<NaiveDate>,
    /// Whether the goal is being tracked
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Storage shape of a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGoal {
    /// Record identifier
    pub id: String,
    /// Base64 name ciphertext
    #[serde(default)]
    pub encrypted_name: Option<String>,
    /// Base64 name nonce
    #[serde(default)]
    pub iv_name: Option<String>,
    /// Base64 target amount ciphertext
    #[serde(default)]
    pub encrypted_target_amount: Option<String>,
    /// Base64 target amount nonce
    #[serde(default)]
    pub iv_target_amount: Option<String>,
    /// Optional deadline
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    /// Whether the goal is being tracked
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl EncryptedRecord for Goal {
    type Stored = StoredGoal;

    fn seal(&self, sealer: &FieldSealer<'_>) -> Result<StoredGoal, Error> {
        let name = sealer.seal(&FieldValue::from(self.name.as_str()), &GOAL_NAME)?;
        let target = sealer.seal(&FieldValue::Amount(self.target_amount), &GOAL_TARGET_AMOUNT)?;

        Ok(StoredGoal {
            id: self.id.clone(),
            encrypted_name: Some(name.ciphertext),
            iv_name: Some(name.nonce),
            encrypted_target_amount: Some(target.ciphertext),
            iv_target_amount: Some(target.nonce),
            target_date: self.target_date,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn open(stored: &StoredGoal, sealer: &FieldSealer<'_>) -> Result<Self, Error> {
        let name = sealer
            .open_required(stored.encrypted_name.as_deref(), stored.iv_name.as_deref(), &GOAL_NAME)?
            .into_text()?;
        let target_amount = sealer
            .open_required(
                stored.encrypted_target_amount.as_deref(),
                stored.iv_target_amount.as_deref(),
                &GOAL_TARGET_AMOUNT,
            )?
            .into_amount()?;

        Ok(Self {
            id: stored.id.clone(),
            name,
            target_amount,
            target_date: stored.target_date,
            is_active: stored.is_active,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }
}
