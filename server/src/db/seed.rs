//! Demo data seeding, enabled with --seed-demo.

use rusqlite::Connection;

use crate::chat::store::{self, MessageScope};
use crate::db::models::UserIdentity;

const DEMO_PASSWORD: &str = "password123";

/// Insert five demo accounts, some global-room history, and three direct
/// conversations with read receipts. Idempotent guard: does nothing once
/// any user exists.
pub fn seed_demo(conn: &Connection) -> Result<(), Box<dyn std::error::Error>> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(());
    }

    let hash = bcrypt::hash(DEMO_PASSWORD, bcrypt::DEFAULT_COST)?;
    let accounts = [
        ("alice", "#1e88e5"),
        ("bob", "#43a047"),
        ("charlie", "#e53935"),
        ("david", "#8e24aa"),
        ("eva", "#fb8c00"),
    ];

    let mut identities: Vec<UserIdentity> = Vec::with_capacity(accounts.len());
    for (name, color) in accounts {
        let user = store::create_user(conn, name, &format!("{name}@parlor.dev"), &hash)?;
        conn.execute(
            "UPDATE users SET message_color = ?2 WHERE id = ?1",
            rusqlite::params![user.id, color],
        )?;
        identities.push(UserIdentity {
            id: user.id,
            username: user.username,
            message_color: color.to_string(),
        });
    }

    let room_lines = [
        (0usize, "Welcome to the global room!"),
        (1, "Hey everyone"),
        (2, "Morning all"),
        (0, "Anyone up for a code review later?"),
    ];
    for (author, text) in room_lines {
        store::save_message(conn, &identities[author], text, &MessageScope::Global)?;
    }

    let threads: [(usize, usize, &[&str]); 3] = [
        (
            0,
            1,
            &[
                "Hi Bob!",
                "Hey Alice, what's up?",
                "Not much, just wanted to say hello.",
            ],
        ),
        (
            1,
            3,
            &[
                "David, I could use your help with a bug.",
                "Sure Bob, tell me everything!",
                "It's a borrow checker fight...",
                "Send me the code, I'll take a look.",
            ],
        ),
        (
            2,
            4,
            &[
                "Eva, did you finish the slides?",
                "Almost, Charlie, a few left.",
                "Great! Can we review them together after?",
                "Perfect!",
            ],
        ),
    ];

    for (a, b, lines) in threads {
        let mut from_first = true;
        let mut sent_ids = Vec::with_capacity(lines.len());
        for text in lines {
            let (author, recipient) = if from_first {
                (&identities[a], &identities[b])
            } else {
                (&identities[b], &identities[a])
            };
            let saved = store::save_message(
                conn,
                author,
                text,
                &MessageScope::Direct {
                    recipient_id: recipient.id.clone(),
                },
            )?;
            sent_ids.push(saved.id);
            from_first = !from_first;
        }
        // Everything but the latest message has been read
        sent_ids.pop();
        store::mark_read(conn, &sent_ids)?;
    }

    tracing::info!("Seeded {} demo accounts with sample conversations", accounts.len());
    Ok(())
}
