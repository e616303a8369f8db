//! Integration tests for the sync engine against the in-memory server.

use mapisync_codec::{tags, ErrorCode, Prop, PropTag, PropType, PropertyValue, RelOp, Restriction};
use mapisync_core::{
    EntryState, PropertyName, ServerId, SingleInstanceRef, TableKind, PSETID_COMMON, PS_PUBLIC_STRINGS,
    SERVER_NAMED_BASE,
};
use mapisync_engine::{
    BatchState, EngineError, ObjectSyncEngine, OpenMode, SaveOutcome, TableConfig,
};
use mapisync_entryid::{wrap, ObjectType};
use mapisync_protocol::{SeekOrigin, SortKey};
use mapisync_testkit::prelude::*;
use std::sync::Arc;

fn seeded(props: Vec<Prop>) -> (TestHarness, Vec<u8>) {
    init_test_logging();
    let harness = TestHarness::new();
    let root = harness.server().root();
    let id = harness.server().add_message(&root, props);
    (harness, id)
}

fn unicode(text: &str) -> PropertyValue {
    PropertyValue::Unicode(text.to_owned())
}

fn count(calls: &[&str], name: &str) -> usize {
    calls.iter().filter(|call| **call == name).count()
}

// ---- objects ---------------------------------------------------------------

#[test]
fn edit_and_save_reaches_server() {
    let (harness, id) = seeded(vec![subject("draft"), message_flags(0)]);
    let message = harness.open(&id, OpenMode::ReadWrite);

    message.set_prop(&subject("final")).unwrap();
    message.set_prop(&body("text")).unwrap();
    message.delete_prop(tags::PR_MESSAGE_FLAGS).unwrap();
    let outcome = message.save().unwrap();

    let server_id = harness.server().object(&id).unwrap().server_id;
    assert_eq!(outcome, SaveOutcome::Saved(ServerId(server_id)));
    assert_eq!(harness.server().prop(&id, tags::PR_SUBJECT), Some(unicode("final")));
    assert_eq!(harness.server().prop(&id, tags::PR_BODY), Some(unicode("text")));
    assert_eq!(harness.server().prop(&id, tags::PR_MESSAGE_FLAGS), None);
    assert!(!message.has_pending_changes().unwrap());
}

#[test]
fn second_save_sends_nothing() {
    let (harness, id) = seeded(vec![subject("one")]);
    let message = harness.open(&id, OpenMode::ReadWrite);
    message.set_prop(&subject("two")).unwrap();

    assert!(matches!(message.save().unwrap(), SaveOutcome::Saved(_)));
    assert_eq!(message.save().unwrap(), SaveOutcome::NoChanges);

    let calls = harness.server().calls();
    assert_eq!(count(&calls, "save_object"), 1);
    assert_eq!(harness.stats().saves_skipped, 1);
}

#[test]
fn reload_discards_local_edits() {
    let (harness, id) = seeded(vec![subject("server")]);
    let message = harness.open(&id, OpenMode::ReadWrite);
    message.set_prop(&subject("local")).unwrap();

    message.reload().unwrap();
    assert_eq!(message.get_prop(tags::PR_SUBJECT).unwrap(), unicode("server"));
    assert!(!message.has_pending_changes().unwrap());
}

#[test]
fn open_twice_is_rejected() {
    let (harness, id) = seeded(vec![subject("s")]);
    let message = harness.open(&id, OpenMode::ReadOnly);
    assert!(matches!(message.open(), Err(EngineError::InvalidState(_))));
}

#[test]
fn large_value_is_demand_loaded() {
    let text = "x".repeat(20_000);
    let (harness, id) = seeded(vec![subject("big"), body(&text)]);
    let message = harness.open(&id, OpenMode::ReadOnly);

    let state = message
        .inspect(|object| object.cache().state(tags::PR_BODY))
        .unwrap();
    assert_eq!(state, Some(EntryState::Available));

    let batch = message.get_props(&[tags::PR_SUBJECT, tags::PR_BODY]).unwrap();
    assert!(batch.is_partial());
    assert_eq!(batch.error_slots(), vec![1]);
    assert_eq!(batch.props[1].as_error(), Some(ErrorCode::NOT_ENOUGH_MEMORY));

    assert_eq!(message.get_prop(tags::PR_BODY).unwrap(), unicode(&text));
    assert_eq!(harness.stats().demand_loads, 1);
    assert_eq!(count(&harness.server().calls(), "load_prop"), 1);

    let batch = message.get_props(&[tags::PR_SUBJECT, tags::PR_BODY]).unwrap();
    assert!(!batch.is_partial());
}

#[test]
fn fifty_slot_read_reports_each_failure() {
    let props: Vec<Prop> = (0..25u16)
        .map(|i| {
            Prop::new(
                PropTag::new(0x6000 + i, PropType::LONG),
                PropertyValue::Long(i32::from(i)),
            )
        })
        .collect();
    let (harness, id) = seeded(props);
    let message = harness.open(&id, OpenMode::ReadOnly);

    let wanted: Vec<PropTag> = (0..50u16)
        .map(|i| PropTag::new(0x6000 + i, PropType::LONG))
        .collect();
    let batch = message.get_props(&wanted).unwrap();

    assert_eq!(batch.props.len(), 50);
    assert_eq!(batch.code(), ErrorCode::ERRORS_RETURNED);
    assert_eq!(batch.error_slots(), (25..50).collect::<Vec<_>>());
    for (i, prop) in batch.props.iter().take(25).enumerate() {
        assert_eq!(prop.value, PropertyValue::Long(i as i32));
    }
    for prop in &batch.props[25..] {
        assert_eq!(prop.as_error(), Some(ErrorCode::NOT_FOUND));
        assert_eq!(prop.tag.prop_type(), PropType::ERROR);
    }
}

#[test]
fn read_only_object_refuses_writes() {
    let (harness, id) = seeded(vec![subject("locked")]);
    let message = harness.open(&id, OpenMode::ReadOnly);

    assert_eq!(message.set_prop(&subject("x")), Err(EngineError::NoAccess));
    assert_eq!(message.save(), Err(EngineError::NoAccess));
    assert_eq!(count(&harness.server().calls(), "save_object"), 0);
}

#[test]
fn rejected_save_leaves_changes_pending() {
    let (harness, id) = seeded(vec![subject("before")]);
    let message = harness.open(&id, OpenMode::ReadWrite);
    message.set_prop(&subject("after")).unwrap();

    harness.server().fail_next("save_object", ErrorCode::NO_ACCESS);
    let err = message.save().unwrap_err();
    assert_eq!(
        err,
        EngineError::Server {
            call: "save_object",
            code: ErrorCode::NO_ACCESS
        }
    );
    assert!(message.has_pending_changes().unwrap());
    assert_eq!(harness.server().prop(&id, tags::PR_SUBJECT), Some(unicode("before")));

    message.save().unwrap();
    assert_eq!(harness.server().prop(&id, tags::PR_SUBJECT), Some(unicode("after")));
}

#[test]
fn lost_session_is_reestablished_once() {
    let (harness, id) = seeded(vec![subject("old")]);
    let message = harness.open(&id, OpenMode::ReadWrite);
    message.set_prop(&subject("new")).unwrap();

    harness.server().expire_sessions();
    message.save().unwrap();

    let stats = harness.stats();
    assert_eq!(stats.session_retries, 1);
    assert_eq!(stats.logons, 2);
    assert_eq!(harness.generation(), 2);
    assert_eq!(harness.server().prop(&id, tags::PR_SUBJECT), Some(unicode("new")));
}

#[test]
fn lost_session_without_retry_fails() {
    init_test_logging();
    let harness = TestHarness::with_config(test_config().with_session_retry(false));
    let root = harness.server().root();
    let id = harness.server().add_message(&root, vec![subject("old")]);
    let message = harness.open(&id, OpenMode::ReadWrite);
    message.set_prop(&subject("new")).unwrap();

    harness.server().expire_sessions();
    let err = message.save().unwrap_err();
    assert_eq!(err.code(), ErrorCode::END_OF_SESSION);
    assert!(message.has_pending_changes().unwrap());
    assert_eq!(harness.stats().logons, 1);
}

#[test]
fn new_message_with_attachment() {
    init_test_logging();
    let harness = TestHarness::new();
    let root = harness.server().root();
    let message = harness.create(ObjectType::Message, &root);
    message.set_prop(&subject("with attachment")).unwrap();
    let key = message.create_child(ObjectType::Attachment).unwrap();
    message
        .with_child_mut(key, |attachment| {
            attachment.set_prop(&Prop::new(
                tags::PR_ATTACH_DATA_BIN,
                PropertyValue::Binary(vec![7; 100]),
            ))
        })
        .unwrap();

    let SaveOutcome::Saved(server_id) = message.save().unwrap() else {
        panic!("new object must be saved");
    };
    assert!(server_id.is_known());

    let entry_id = message.entry_id().unwrap();
    assert!(!entry_id.is_empty());
    let stored = harness.server().object(&entry_id).unwrap();
    assert_eq!(stored.parent, root);
    assert_eq!(stored.children().len(), 1);
    assert_eq!(
        stored.children()[0].prop(tags::PR_ATTACH_DATA_BIN),
        Some(&PropertyValue::Binary(vec![7; 100]))
    );

    let reopened = harness.open(&entry_id, OpenMode::ReadOnly);
    assert_eq!(reopened.children().unwrap(), vec![key]);
}

#[test]
fn deleted_attachment_is_removed_on_save() {
    init_test_logging();
    let harness = TestHarness::new();
    let root = harness.server().root();
    let message = harness.create(ObjectType::Message, &root);
    let first = message.create_child(ObjectType::Attachment).unwrap();
    let second = message.create_child(ObjectType::Attachment).unwrap();
    message.save().unwrap();
    let entry_id = message.entry_id().unwrap();
    assert_eq!(harness.server().object(&entry_id).unwrap().children().len(), 2);

    message.delete_child(first).unwrap();
    message.save().unwrap();

    assert_eq!(message.children().unwrap(), vec![second]);
    let stored = harness.server().object(&entry_id).unwrap();
    assert_eq!(stored.children().len(), 1);
    assert_eq!(stored.children()[0].local_id, second.local_id.as_u32());
}

#[test]
fn unknown_instance_is_resent_with_payload_once() {
    init_test_logging();
    let harness = TestHarness::with_config(test_config().with_instance_threshold(16));
    let root = harness.server().root();
    let data = vec![0xAB; 64];
    let instance_id = SingleInstanceRef::from_content(tags::PR_ATTACH_DATA_BIN, &data).instance_id;

    let save_with_attachment = || {
        let message = harness.create(ObjectType::Message, &root);
        let key = message.create_child(ObjectType::Attachment).unwrap();
        message
            .with_child_mut(key, |attachment| {
                attachment.set_prop(&Prop::new(
                    tags::PR_ATTACH_DATA_BIN,
                    PropertyValue::Binary(data.clone()),
                ))
            })
            .unwrap();
        message.save().unwrap();
        message.entry_id().unwrap()
    };

    let first = save_with_attachment();
    assert_eq!(harness.stats().instance_retries, 1);
    assert!(harness.server().knows_instance(&instance_id));
    assert_eq!(count(&harness.server().calls(), "save_object"), 2);

    let second = save_with_attachment();
    assert_eq!(harness.stats().instance_retries, 1);
    assert_eq!(count(&harness.server().calls(), "save_object"), 3);

    for entry_id in [first, second] {
        let stored = harness.server().object(&entry_id).unwrap();
        let attachment = &stored.children()[0];
        assert_eq!(
            attachment.prop(tags::PR_ATTACH_DATA_BIN),
            Some(&PropertyValue::Binary(data.clone()))
        );
        assert_eq!(attachment.instance().unwrap().instance_id, instance_id);
    }
}

#[test]
fn wrapped_id_opens_the_inner_object() {
    let (harness, id) = seeded(vec![subject("wrapped")]);
    let wrapped = wrap(&id, "emsmdb.dll").unwrap();

    let message = ObjectSyncEngine::open_entry(
        Arc::clone(&harness.session),
        wrapped,
        OpenMode::ReadOnly,
    )
    .unwrap();
    assert_eq!(message.object_type().unwrap(), ObjectType::Message);
    assert_eq!(message.get_prop(tags::PR_SUBJECT).unwrap(), unicode("wrapped"));
}

// ---- names -----------------------------------------------------------------

#[test]
fn named_properties_resolve_and_memoise() {
    init_test_logging();
    let harness = TestHarness::new();
    let keywords = PropertyName::name(PS_PUBLIC_STRINGS, "Keywords");
    let unknown = PropertyName::name(PS_PUBLIC_STRINGS, "Unknown");

    let ids = harness
        .get_ids_from_names(&[keywords.clone()], true)
        .unwrap();
    assert_eq!(ids, vec![Some(SERVER_NAMED_BASE)]);

    let ids = harness
        .get_ids_from_names(&[keywords.clone(), unknown], false)
        .unwrap();
    assert_eq!(ids, vec![Some(SERVER_NAMED_BASE), None]);
    assert_eq!(count(&harness.server().calls(), "get_ids_from_names"), 2);

    let names = harness.get_names_from_ids(&[SERVER_NAMED_BASE]).unwrap();
    assert_eq!(names, vec![Some(keywords)]);
    assert_eq!(count(&harness.server().calls(), "get_names_from_ids"), 0);
}

#[test]
fn well_known_names_need_no_round_trip() {
    init_test_logging();
    let harness = TestHarness::new();
    let ids = harness
        .get_ids_from_names(&[PropertyName::id(PSETID_COMMON, 0x8503)], false)
        .unwrap();
    assert_eq!(ids, vec![Some(0x8203)]);
    assert!(harness.server().calls().iter().all(|call| *call == "logon"));
}

// ---- tables ----------------------------------------------------------------

fn folder_with(subjects: &[&str]) -> (TestHarness, ObjectSyncEngine<MemoryTransport>) {
    init_test_logging();
    let harness = TestHarness::new();
    let root = harness.server().root();
    for text in subjects {
        harness.server().add_message(&root, vec![subject(text)]);
    }
    let folder = harness.open(&root, OpenMode::ReadOnly);
    (harness, folder)
}

fn subjects_of(rows: &[Vec<Prop>]) -> Vec<PropertyValue> {
    rows.iter().map(|row| row[0].value.clone()).collect()
}

#[test]
fn batched_operations_go_out_in_one_call() {
    let (harness, folder) = folder_with(&["e", "c", "a", "d", "b"]);
    let table = folder
        .open_table(TableConfig::new(TableKind::Contents))
        .unwrap();
    harness.server().clear_calls();

    table.set_columns(&[tags::PR_SUBJECT], true).unwrap();
    table
        .sort(&[SortKey::ascending(tags::PR_SUBJECT.as_u32())], true)
        .unwrap();
    assert_eq!(table.state(), BatchState::Pending);
    assert!(harness.server().calls().is_empty());

    let rows = table.query_rows(2, 0).unwrap();
    assert_eq!(subjects_of(&rows), vec![unicode("a"), unicode("b")]);
    assert_eq!(harness.server().calls(), vec!["table_multi"]);
    assert_eq!(table.state(), BatchState::Idle);

    let rows = table.query_rows(10, 0).unwrap();
    assert_eq!(
        subjects_of(&rows),
        vec![unicode("c"), unicode("d"), unicode("e")]
    );
    assert_eq!(
        harness.server().calls(),
        vec!["table_multi", "table_query_rows"]
    );

    let count = table.get_row_count().unwrap();
    assert_eq!((count.count, count.position), (5, 5));
}

#[test]
fn restriction_filters_rows() {
    let (_harness, folder) = folder_with(&["keep", "drop", "keep too"]);
    let table = folder
        .open_table(TableConfig::new(TableKind::Contents))
        .unwrap();
    table.set_columns(&[tags::PR_SUBJECT], false).unwrap();
    table
        .restrict(
            Some(&Restriction::Property {
                relop: RelOp::Ne,
                tag: tags::PR_SUBJECT,
                value: subject("drop"),
            }),
            false,
        )
        .unwrap();

    let rows = table.query_rows(0, 0).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(!subjects_of(&rows).contains(&unicode("drop")));

    table.restrict(None, false).unwrap();
    assert_eq!(table.query_rows(0, 0).unwrap().len(), 3);
}

#[test]
fn table_survives_session_loss() {
    let (harness, folder) = folder_with(&["b", "a", "c"]);
    let table = folder
        .open_table(TableConfig::new(TableKind::Contents))
        .unwrap();
    table.set_columns(&[tags::PR_SUBJECT], true).unwrap();
    table
        .sort(&[SortKey::descending(tags::PR_SUBJECT.as_u32())], true)
        .unwrap();
    table.query_rows(1, 0).unwrap();

    harness.server().expire_sessions();
    harness.server().clear_calls();

    let rows = table.query_rows(2, 0).unwrap();
    assert_eq!(subjects_of(&rows), vec![unicode("c"), unicode("b")]);
    assert_eq!(
        harness.server().calls(),
        vec!["table_query_rows", "logon", "table_multi"]
    );
    let stats = harness.stats();
    assert_eq!(stats.session_retries, 1);
    assert_eq!(stats.table_replays, 1);
}

#[test]
fn seek_moves_the_cursor() {
    let (_harness, folder) = folder_with(&["a", "b", "c", "d"]);
    let table = folder
        .open_table(TableConfig::new(TableKind::Contents))
        .unwrap();
    table.set_columns(&[tags::PR_SUBJECT], true).unwrap();
    table
        .sort(&[SortKey::ascending(tags::PR_SUBJECT.as_u32())], true)
        .unwrap();

    assert_eq!(table.seek_row(SeekOrigin::End, -1).unwrap(), -1);
    let rows = table.query_rows(5, 0).unwrap();
    assert_eq!(subjects_of(&rows), vec![unicode("d")]);

    assert_eq!(table.seek_row(SeekOrigin::Beginning, 1).unwrap(), 1);
    let rows = table.query_rows(1, 0).unwrap();
    assert_eq!(subjects_of(&rows), vec![unicode("b")]);
}

#[test]
fn attachment_table_lists_children() {
    init_test_logging();
    let harness = TestHarness::new();
    let root = harness.server().root();
    let message = harness.create(ObjectType::Message, &root);
    for name in ["one.txt", "two.txt", "three.txt"] {
        let key = message.create_child(ObjectType::Attachment).unwrap();
        message
            .with_child_mut(key, |attachment| {
                attachment.set_prop(&Prop::new(tags::PR_DISPLAY_NAME, unicode(name)))
            })
            .unwrap();
    }
    message.save().unwrap();

    let table = message
        .open_table(TableConfig::new(TableKind::Attachments))
        .unwrap();
    table
        .set_columns(&[tags::PR_ROWID, tags::PR_DISPLAY_NAME], true)
        .unwrap();
    table
        .sort(&[SortKey::ascending(tags::PR_ROWID.as_u32())], true)
        .unwrap();
    let rows = table.query_rows(0, 0).unwrap();
    let row_ids: Vec<PropertyValue> = rows.iter().map(|row| row[0].value.clone()).collect();
    assert_eq!(
        row_ids,
        vec![
            PropertyValue::Long(1),
            PropertyValue::Long(2),
            PropertyValue::Long(3)
        ]
    );
    assert_eq!(rows[2][1].value, unicode("three.txt"));
    table.close().unwrap();
    assert_eq!(harness.server().open_tables(), 0);
}

#[test]
fn closed_table_releases_server_handle() {
    let (harness, folder) = folder_with(&["a"]);
    let table = folder
        .open_table(TableConfig::new(TableKind::Contents))
        .unwrap();
    table.query_rows(1, 0).unwrap();
    assert_eq!(harness.server().open_tables(), 1);
    table.close().unwrap();
    assert_eq!(harness.server().open_tables(), 0);
}
