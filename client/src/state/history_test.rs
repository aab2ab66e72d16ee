use super::*;

fn conversation() -> HistoryStore {
    let mut history = HistoryStore::new();
    history.append(MessageEntry::user_text("first question", 1));
    history.append(MessageEntry::bot_text("first answer", Vec::new(), 2));
    history.append(MessageEntry::user_text("second question", 3));
    history.append(MessageEntry::bot_text("second answer", Vec::new(), 4));
    history
}

#[test]
fn append_returns_index_and_preserves_order() {
    let mut history = HistoryStore::new();
    assert!(history.is_empty());
    assert_eq!(history.append(MessageEntry::user_text("a", 1)), 0);
    assert_eq!(history.append(MessageEntry::user_text("b", 2)), 1);
    let texts: Vec<&str> = history.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, ["a", "b"]);
    assert_eq!(history.len(), 2);
}

#[test]
fn snapshot_returns_most_recent_entries() {
    let history = conversation();
    let tail = history.snapshot(Some(2));
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].text, "second question");
    assert_eq!(tail[1].text, "second answer");
}

#[test]
fn snapshot_larger_than_log_returns_everything() {
    let history = conversation();
    assert_eq!(history.snapshot(Some(20)).len(), 4);
    assert_eq!(history.snapshot(None).len(), 4);
    assert!(history.snapshot(Some(0)).is_empty());
}

#[test]
fn snapshot_caps_at_twenty_of_many() {
    let mut history = HistoryStore::new();
    for i in 0..30 {
        history.append(MessageEntry::user_text(format!("q{i}"), i));
    }
    let tail = history.snapshot(Some(20));
    assert_eq!(tail.len(), 20);
    assert_eq!(tail[0].text, "q10");
    assert_eq!(tail[19].text, "q29");
}

#[test]
fn prior_user_text_pairs_answer_with_its_question() {
    let history = conversation();
    assert_eq!(history.prior_user_text(1), Some("first question"));
    assert_eq!(history.prior_user_text(3), Some("second question"));
    assert_eq!(history.prior_user_text(0), None);
    assert_eq!(history.prior_user_text(99), Some("second question"));
}

#[test]
fn prior_user_text_skips_file_entries() {
    let mut history = HistoryStore::new();
    history.append(MessageEntry::user_text("question", 1));
    let mut file = MessageEntry::user_text("", 2);
    file.kind = frames::EntryKind::File;
    file.file_name = Some("report.pdf".to_owned());
    history.append(file);
    history.append(MessageEntry::bot_text("answer", Vec::new(), 3));
    assert_eq!(history.prior_user_text(2), Some("question"));
}

#[test]
fn last_bot_index_finds_latest_answer() {
    let history = conversation();
    assert_eq!(history.last_bot_index(), Some(3));
    assert_eq!(HistoryStore::new().last_bot_index(), None);
}
