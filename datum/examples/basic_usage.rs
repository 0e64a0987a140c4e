//! Basic usage example for `Datum`.

use chrono::NaiveDate;
use datum::prelude::*;
use datum::record::TRANSACTIONS_TABLE;
use datum_key_file::FileKeyStore;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Datum Basic Usage Example");
    println!("=========================\n");

    // Setup: keep the key document in a local directory
    let key_dir = PathBuf::from("./example_keys");
    let session = KeySession::open(FileKeyStore::new(&key_dir, "example")?)?;
    println!("✓ Key session opened ({:?})\n", session.state());

    // Onboard with a master password the first time
    if session.state() != KeyState::KeyLoaded {
        let params = KdfParams::default();
        println!("Deriving key with {} PBKDF2 iterations...", params.iterations);
        onboard_with_password(&session, "hunter2hunter2", "hunter2hunter2", &params)?;
        println!("✓ Key derived and saved\n");
    }
    let key = session.key()?;

    // Create an encrypted transaction
    let repository = TransactionRepository::new(MemoryRecordStore::new(), RecordMapper::default());
    let draft = TransactionDraft::new(
        "42.50".parse()?,
        TransactionType::Expense,
        NaiveDate::from_ymd_opt(2024, 3, 1).ok_or("invalid date")?,
    )
    .with_mood(Mood::Happy)
    .with_notes("coffee with Jo")
    .with_tags(["coffee", "friends"]);

    let created = repository.create(&draft, &key)?;
    println!("✓ Transaction {} created", created.id);

    // Show what the remote store actually holds
    if let Some(row) = repository.store().raw(TRANSACTIONS_TABLE, &created.id) {
        println!("Stored row:\n{}\n", serde_json::to_string_pretty(&row)?);
    }

    // Read it back
    let outcomes = repository.list(&TransactionQuery::default(), &key)?;
    session.record_batch(&outcomes);
    for outcome in outcomes {
        match outcome {
            Ok(t) => println!(
                "✓ {} {} on {}: {:?}",
                t.transaction_type, t.amount, t.transaction_date, t.notes
            ),
            Err(e) => println!("✗ {}", e.user_message()),
        }
    }

    println!("\n=========================");
    println!("All operations successful! 🎉");

    // Cleanup
    println!("\nNote: Key directory at {key_dir:?} can be deleted manually");

    Ok(())
}
