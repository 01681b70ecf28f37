//! The same expectations run against every backend, so swapping the
//! message store is invisible to the service layer.

use parley_db::{AccountDirectory, AccountStore, Database, MemoryStore, MessageStore, NewAccount};
use parley_types::models::{NewMessage, Role};
use tempfile::TempDir;
use uuid::Uuid;

trait Backend: MessageStore + AccountStore {}
impl<T: MessageStore + AccountStore> Backend for T {}

/// Every backend under test. The directory holds the file-backed database and
/// must outlive it.
fn backends() -> (TempDir, Vec<(&'static str, Box<dyn Backend>)>) {
    let dir = TempDir::new().unwrap();
    let file = Database::open(&dir.path().join("parley.db")).unwrap();
    let stores: Vec<(&'static str, Box<dyn Backend>)> = vec![
        ("memory", Box::new(MemoryStore::new())),
        ("sqlite", Box::new(Database::open_in_memory().unwrap())),
        ("sqlite-file", Box::new(file)),
    ];
    (dir, stores)
}

fn account(store: &dyn Backend, username: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    store
        .create_account(NewAccount {
            id,
            username: username.to_string(),
            password_hash: "hash".into(),
            display_name: format!("{} display", username),
            avatar: Some(format!("/avatars/{}.png", username)),
            role,
        })
        .unwrap();
    id
}

fn send(store: &dyn Backend, from: Uuid, to: Uuid, content: &str) -> i64 {
    store
        .create_message(NewMessage { sender_id: from, receiver_id: to, content: content.into() })
        .unwrap()
        .id
}

#[test]
fn test_created_message_starts_unread() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        let a = account(store.as_ref(), "alice", Role::User);
        let b = account(store.as_ref(), "bob", Role::User);

        let msg = store
            .create_message(NewMessage { sender_id: a, receiver_id: b, content: "hello".into() })
            .unwrap();
        assert!(!msg.read, "{name}");
        assert_eq!(msg.content, "hello", "{name}");
        assert_eq!(msg.created_at, msg.updated_at, "{name}");
        assert!(msg.id > 0, "{name}");
    }
}

#[test]
fn test_history_ordering() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        let a = account(store.as_ref(), "alice", Role::User);
        let b = account(store.as_ref(), "bob", Role::User);
        let c = account(store.as_ref(), "carol", Role::User);

        let m1 = send(store.as_ref(), a, b, "1");
        let m2 = send(store.as_ref(), c, a, "2");
        let m3 = send(store.as_ref(), b, a, "3");
        let _other = send(store.as_ref(), b, c, "not involving alice");

        let involving: Vec<i64> = store.messages_involving(a).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(involving, vec![m3, m2, m1], "{name}: newest first");

        let between: Vec<i64> = store.conversation_between(b, a).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(between, vec![m1, m3], "{name}: oldest first");
    }
}

#[test]
fn test_unread_counts_and_marking() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        let a = account(store.as_ref(), "alice", Role::User);
        let b = account(store.as_ref(), "bob", Role::User);
        let c = account(store.as_ref(), "carol", Role::User);

        send(store.as_ref(), b, a, "b1");
        send(store.as_ref(), b, a, "b2");
        let c1 = send(store.as_ref(), c, a, "c1");
        send(store.as_ref(), a, b, "outgoing");

        assert_eq!(store.count_unread(a, None).unwrap(), 3, "{name}");
        assert_eq!(store.count_unread(a, Some(b)).unwrap(), 2, "{name}");
        assert_eq!(store.count_unread(a, Some(c)).unwrap(), 1, "{name}");
        assert_eq!(store.count_unread(b, None).unwrap(), 1, "{name}");

        assert_eq!(store.mark_conversation_read(a, b).unwrap(), 2, "{name}");
        assert_eq!(store.mark_conversation_read(a, b).unwrap(), 0, "{name}: idempotent");
        assert_eq!(store.count_unread(a, Some(b)).unwrap(), 0, "{name}");
        // Bob's inbound message from Alice is untouched.
        assert_eq!(store.count_unread(b, Some(a)).unwrap(), 1, "{name}");

        assert!(store.mark_message_read(c1).unwrap(), "{name}");
        assert!(store.mark_message_read(c1).unwrap(), "{name}: already read is fine");
        assert!(!store.mark_message_read(9_999).unwrap(), "{name}");
        assert_eq!(store.count_unread(a, None).unwrap(), 0, "{name}");
        assert!(store.get_message(c1).unwrap().unwrap().read, "{name}");
    }
}

#[test]
fn test_delete_message() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        let a = account(store.as_ref(), "alice", Role::User);
        let b = account(store.as_ref(), "bob", Role::User);

        let id = send(store.as_ref(), a, b, "oops");
        assert!(store.delete_message(id).unwrap(), "{name}");
        assert!(!store.delete_message(id).unwrap(), "{name}");
        assert!(store.get_message(id).unwrap().is_none(), "{name}");
        assert!(store.messages_involving(a).unwrap().is_empty(), "{name}");
    }
}

#[test]
fn test_designer_profile_resolves_to_owner() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        let d = account(store.as_ref(), "dora", Role::Designer);
        let profile_id = Uuid::new_v4();
        store.create_designer_profile(profile_id, d).unwrap();

        let owner = store.get_designer_profile(profile_id).unwrap().unwrap();
        assert_eq!(owner.id, d, "{name}");
        assert_eq!(owner.role, Role::Designer, "{name}");
        assert_eq!(owner.avatar.as_deref(), Some("/avatars/dora.png"), "{name}");

        assert!(store.get_user(profile_id).unwrap().is_none(), "{name}: disjoint id spaces");
        assert!(store.get_designer_profile(d).unwrap().is_none(), "{name}");
    }
}

#[test]
fn test_read_mark_visible_to_every_reader() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        let a = account(store.as_ref(), "alice", Role::User);
        let b = account(store.as_ref(), "bob", Role::User);
        for i in 0..3 {
            send(store.as_ref(), b, a, &format!("{i}"));
        }
        assert_eq!(store.count_unread(a, Some(b)).unwrap(), 3, "{name}");

        assert_eq!(store.mark_conversation_read(a, b).unwrap(), 3, "{name}");
        // Enough reads to cycle through the whole reader pool.
        for _ in 0..8 {
            assert_eq!(store.count_unread(a, None).unwrap(), 0, "{name}");
            assert!(store.conversation_between(a, b).unwrap().iter().all(|m| m.read), "{name}");
        }
    }
}

#[test]
fn test_duplicate_username_is_not_created() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        account(store.as_ref(), "alice", Role::User);
        let created = store
            .create_account(NewAccount {
                id: Uuid::new_v4(),
                username: "alice".into(),
                password_hash: "other".into(),
                display_name: "Alice again".into(),
                avatar: None,
                role: Role::User,
            })
            .unwrap();
        assert!(!created, "{name}");
        assert_eq!(store.get_credentials("alice").unwrap().unwrap().password_hash, "hash", "{name}");
    }
}
