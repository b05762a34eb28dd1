mod support;

use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use notes_e2e::naming::{NameGenerator, NameSequence};
use notes_e2e::surface::{DismissStep, SurfaceGuard};
use notes_e2e::{E2eError, ProvisionMode, Provisioner, ResourceKind, ResourceSpec};
use support::{engine, test_config, Bulk, FakeAdmin, FakeApp, Knobs};

/// The scenario from the application's own smoke suite: a folder and a note
/// inside it, with the tree taking a while to render each new item.
#[tokio::test(start_paused = true)]
async fn folder_then_note_becomes_ready() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    app.knobs(|k| k.render_delay = Duration::from_millis(800));
    let (app, provisioner) = engine(app, test_config(dir.path()));

    let projects = provisioner.provision_folder("Projects", None).await.unwrap();
    let plan = provisioner.provision_note("Plan", None, Some(&projects)).await.unwrap();

    let readiness = provisioner
        .await_ready(&plan, Duration::from_millis(5000))
        .await
        .unwrap();
    assert!(readiness.resource_id.is_some());

    assert!(Regex::new(r"^Plan \d+$").unwrap().is_match(&plan));
    assert_ne!(plan, "Plan");
    assert_eq!(app.item(&plan).unwrap().parent.as_deref(), Some(projects.as_str()));

    let record = provisioner.record(&plan).unwrap();
    assert_eq!(record.kind(), ResourceKind::Note);
    assert_eq!(record.parent.as_deref(), Some(projects.as_str()));
    assert!(!record.parent_synthetic);
    assert_eq!(record.owner.as_deref(), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn unique_names_never_repeat() {
    let dir = tempfile::tempdir().unwrap();
    let (app, provisioner) = engine(FakeApp::new(), test_config(dir.path()));

    let mut names = HashSet::new();
    for _ in 0..5 {
        let name = provisioner.provision_folder("Projects", None).await.unwrap();
        assert!(names.insert(name));
    }
    assert_eq!(app.items().len(), 5);
    assert_eq!(provisioner.records().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn engines_sharing_a_sequence_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let sequence = Arc::new(NameSequence::starting_at(1));
    let app = Arc::new(FakeApp::new());

    let a = Provisioner::with_names(
        app.clone(),
        test_config(dir.path()),
        NameGenerator::with_sequence(sequence.clone(), " "),
    );
    let b = Provisioner::with_names(
        app.clone(),
        test_config(dir.path()),
        NameGenerator::with_sequence(sequence, " "),
    );

    let first = a.provision_folder("Inbox", None).await.unwrap();
    let second = b.provision_folder("Inbox", None).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(app.submits(), 2);
}

#[tokio::test(start_paused = true)]
async fn idempotent_mode_reuses_the_requested_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.mode = ProvisionMode::Idempotent;
    let (app, provisioner) = engine(FakeApp::new(), config);

    let first = provisioner.provision_folder("Projects", None).await.unwrap();
    let second = provisioner.provision_folder("Projects", None).await.unwrap();

    assert_eq!(first, "Projects");
    assert_eq!(first, second);
    assert_eq!(app.count("Projects"), 1);
    assert_eq!(app.submits(), 1);
}

#[tokio::test(start_paused = true)]
async fn idempotent_mode_adopts_existing_items() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.mode = ProvisionMode::Idempotent;
    let app = FakeApp::new();
    let id = app.seed(ResourceKind::Folder, "Archive", None);
    let (app, provisioner) = engine(app, config);

    let record = provisioner.provision(ResourceSpec::folder("Archive")).await.unwrap();

    assert!(record.adopted);
    assert_eq!(record.resource_id.as_deref(), Some(id.as_str()));
    assert_eq!(app.submits(), 0);
    assert!(provisioner.records().is_empty());
}

/// Parentless leaves in idempotent mode share one synthetic folder, and
/// cleanup sees each item exactly once.
#[tokio::test(start_paused = true)]
async fn idempotent_leaves_share_one_synthetic_folder() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.mode = ProvisionMode::Idempotent;
    let (app, provisioner) = engine(FakeApp::new(), config);

    let a = provisioner.provision_note("A", None, None).await.unwrap();
    let b = provisioner.provision_note("B", None, None).await.unwrap();

    let folder = "Fixture Folder";
    assert_eq!(app.count(folder), 1);
    assert_eq!(app.item(&a).unwrap().parent.as_deref(), Some(folder));
    assert_eq!(app.item(&b).unwrap().parent.as_deref(), Some(folder));
    assert_eq!(app.items().len(), 3);

    let records = provisioner.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().filter(|r| r.resolved_name == folder).count(), 1);

    let report = provisioner.cleanup_all(&FakeAdmin::new(Bulk::Available)).await;
    assert_eq!((report.deleted, report.failed), (3, 0));
}

/// Another client creates the same folder between the existence check and
/// our submit: the item is taken over, not tracked for cleanup.
#[tokio::test(start_paused = true)]
async fn idempotent_conflict_with_a_matching_item_adopts_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.mode = ProvisionMode::Idempotent;
    let app = FakeApp::new();
    app.knobs(|k| {
        k.raced_labels.insert("Inbox".to_string());
    });
    let (app, provisioner) = engine(app, config);

    let record = provisioner.provision(ResourceSpec::folder("Inbox")).await.unwrap();

    assert!(record.adopted);
    assert_eq!(record.resolved_name, "Inbox");
    assert_eq!(record.resource_id, app.item("Inbox").map(|i| i.id));
    assert_eq!(app.count("Inbox"), 1);
    assert!(provisioner.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn idempotent_mode_does_not_adopt_an_item_of_another_kind() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.mode = ProvisionMode::Idempotent;
    let app = FakeApp::new();
    app.seed(ResourceKind::Folder, "Projects", None);
    let (app, provisioner) = engine(app, config);

    let err = provisioner.provision_note("Projects", None, None).await.unwrap_err();

    assert!(matches!(err, E2eError::ValidationConflict { ref label } if label == "Projects"));
    assert_eq!(app.count("Projects"), 1);
    assert_eq!(app.item("Projects").unwrap().kind, ResourceKind::Folder);
    assert!(provisioner.records().iter().all(|r| r.resolved_name != "Projects"));
}

#[tokio::test(start_paused = true)]
async fn idempotent_mode_does_not_adopt_an_item_under_another_parent() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.mode = ProvisionMode::Idempotent;
    let app = FakeApp::new();
    app.seed(ResourceKind::Folder, "A", None);
    app.seed(ResourceKind::Folder, "B", None);
    let plan_id = app.seed(ResourceKind::Note, "Plan", Some("A"));
    let (app, provisioner) = engine(app, config);

    let err = provisioner.provision_note("Plan", None, Some("B")).await.unwrap_err();
    assert!(matches!(err, E2eError::ValidationConflict { ref label } if label == "Plan"));
    assert_eq!(app.item("Plan").unwrap().parent.as_deref(), Some("A"));

    let same = provisioner
        .provision(ResourceSpec {
            parent: Some("A".to_string()),
            ..ResourceSpec::note("Plan")
        })
        .await
        .unwrap();
    assert!(same.adopted);
    assert_eq!(same.resource_id.as_deref(), Some(plan_id.as_str()));
}

/// Calls racing on one engine take turns on the UI session: the menu is
/// never opened while another flow holds it, and items appear in call order.
#[tokio::test(start_paused = true)]
async fn concurrent_calls_take_turns_on_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    app.knobs(|k| k.render_delay = Duration::from_millis(300));
    let (app, provisioner) = engine(app, test_config(dir.path()));

    let (first, second) = tokio::join!(
        provisioner.provision_folder("Alpha", None),
        provisioner.provision_folder("Beta", None)
    );

    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(app.overlapping_opens(), 0);
    assert!(first.starts_with("Alpha "));
    assert!(second.starts_with("Beta "));
    let labels: Vec<String> = app.items().into_iter().map(|i| i.label).collect();
    assert_eq!(labels, vec![first.clone(), second.clone()]);
    let recorded: Vec<String> =
        provisioner.records().into_iter().map(|r| r.resolved_name).collect();
    assert_eq!(recorded, vec![first, second]);
}

#[tokio::test(start_paused = true)]
async fn root_note_gets_a_synthetic_folder() {
    let dir = tempfile::tempdir().unwrap();
    let (app, provisioner) = engine(FakeApp::new(), test_config(dir.path()));

    let note = provisioner.provision(ResourceSpec::note("Loose")).await.unwrap();

    let parent = note.parent.clone().expect("synthetic parent");
    assert!(note.parent_synthetic);
    assert!(parent.starts_with("Fixture Folder "));
    assert_eq!(app.item(&parent).unwrap().kind, ResourceKind::Folder);
    assert_eq!(app.item(&note.resolved_name).unwrap().parent, Some(parent.clone()));

    // The folder is tracked too, so cleanup removes it.
    let records = provisioner.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].resolved_name, parent);
}

#[tokio::test(start_paused = true)]
async fn root_task_without_synthetic_parents_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.synthetic_parents = false;
    let (app, provisioner) = engine(FakeApp::new(), config);

    let err = provisioner.provision_task("Call back", None).await.unwrap_err();

    assert!(matches!(err, E2eError::ContainmentRequired(ResourceKind::Task)));
    assert_eq!(app.submits(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_parent_is_rejected_before_any_ui_work() {
    let dir = tempfile::tempdir().unwrap();
    let (app, provisioner) = engine(FakeApp::new(), test_config(dir.path()));

    let err = provisioner.provision_task("Call back", Some("Nowhere")).await.unwrap_err();

    assert!(matches!(err, E2eError::UnknownParent(ref p) if p == "Nowhere"));
    assert_eq!(app.submits(), 0);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_app, provisioner) = engine(FakeApp::new(), test_config(dir.path()));

    let err = provisioner.provision_folder("  ", None).await.unwrap_err();
    assert!(matches!(err, E2eError::InvalidRequest(_)));

    let spec = ResourceSpec::folder("Projects").with_content("body");
    let err = provisioner.provision(spec).await.unwrap_err();
    assert!(matches!(err, E2eError::InvalidRequest(_)));
}

#[tokio::test(start_paused = true)]
async fn a_conflict_is_retried_with_a_fresh_name() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    let config = test_config(dir.path());
    let names = NameGenerator::with_sequence(Arc::new(NameSequence::starting_at(1)), " ");
    app.knobs(|k| {
        k.conflict_labels.insert("Projects 1".to_string());
    });
    let app = Arc::new(app);
    let provisioner = Provisioner::with_names(app.clone(), config, names);

    let name = provisioner.provision_folder("Projects", None).await.unwrap();

    assert_eq!(name, "Projects 2");
    assert_eq!(app.submits(), 2);
    assert!(!app.surface_open());
}

#[tokio::test(start_paused = true)]
async fn a_permanent_conflict_gives_up() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    app.knobs(|k| k.always_conflict = true);
    let (app, provisioner) = engine(app, test_config(dir.path()));

    let err = provisioner.provision_folder("Projects", None).await.unwrap_err();

    match err {
        E2eError::ConflictRetriesExhausted {
            requested, attempts, ..
        } => {
            assert_eq!(requested, "Projects");
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(app.submits(), 5);
    assert!(app.items().is_empty());
    assert!(provisioner.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn an_item_that_never_shows_times_out_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.readiness_ms = 300;
    let app = FakeApp::new();
    app.knobs(|k| k.hide_new = true);
    let (_app, provisioner) = engine(app, config);

    let err = provisioner.provision_folder("Projects", None).await.unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    let bundle = err.diagnostics().expect("diagnostics attached");
    assert!(bundle.tree_dump.as_deref().unwrap_or_default().contains("Projects"));
    let screenshot = bundle.screenshot_path.as_ref().expect("screenshot taken");
    assert!(screenshot.starts_with(dir.path().join("diagnostics")));
    assert!(screenshot.exists());
    assert_eq!(bundle.screenshot_sha256.as_ref().map(|h| h.len()), Some(64));
}

#[tokio::test(start_paused = true)]
async fn a_dialog_that_never_closes_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.dialog_close_ms = 500;
    let app = FakeApp::new();
    app.knobs(|k| k.dialog_stuck = true);
    let (_app, provisioner) = engine(app, config);

    let err = provisioner.provision_folder("Projects", None).await.unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(err.diagnostics().is_some());
}

#[tokio::test(start_paused = true)]
async fn a_backend_error_surfaces_as_network_failure_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    app.knobs(|k| k.submit_error = Some("Could not save item".to_string()));
    let (app, provisioner) = engine(app, test_config(dir.path()));

    let err = provisioner.provision_folder("Projects", None).await.unwrap_err();

    assert!(matches!(
        err,
        E2eError::NetworkFailure { ref message, .. } if message == "Could not save item"
    ));
    let bundle = err.diagnostics().expect("diagnostics attached");
    assert!(bundle.screenshot_path.as_ref().is_some_and(|p| p.exists()));
    assert!(bundle.tree_dump.is_some());
    assert_eq!(app.submits(), 1);
}

#[tokio::test(start_paused = true)]
async fn a_leftover_dialog_is_dismissed_first() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    app.open_leftover_dialog();
    let (app, provisioner) = engine(app, test_config(dir.path()));

    let name = provisioner.provision_folder("Projects", None).await.unwrap();

    assert!(app.item(&name).is_some());
    assert!(app.item("half typed").is_none());
}

#[tokio::test(start_paused = true)]
async fn surface_dismissal_falls_back_to_escape() {
    let app = FakeApp::with_knobs(Knobs {
        cancel_broken: true,
        ..Knobs::default()
    });
    app.open_leftover_dialog();
    let selectors = notes_e2e::selectors::Selectors::default();
    let (settle, interval) = (Duration::from_millis(200), Duration::from_millis(10));
    let guard = SurfaceGuard::new(&app, &selectors, settle, interval);

    assert_eq!(guard.ensure_closed().await.unwrap(), DismissStep::Escape);
    assert!(!app.surface_open());
    assert_eq!(guard.ensure_closed().await.unwrap(), DismissStep::AlreadyClosed);
}

#[tokio::test(start_paused = true)]
async fn surface_dismissal_falls_back_to_clicking_outside() {
    let app = FakeApp::with_knobs(Knobs {
        cancel_broken: true,
        escape_broken: true,
        ..Knobs::default()
    });
    app.open_leftover_dialog();
    let selectors = notes_e2e::selectors::Selectors::default();
    let (settle, interval) = (Duration::from_millis(200), Duration::from_millis(10));
    let guard = SurfaceGuard::new(&app, &selectors, settle, interval);

    assert_eq!(guard.ensure_closed().await.unwrap(), DismissStep::ClickOutside);
}

#[tokio::test(start_paused = true)]
async fn note_content_waits_for_the_save() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    app.knobs(|k| k.save_delay = Duration::from_millis(700));
    let (app, provisioner) = engine(app, test_config(dir.path()));

    let folder = provisioner.provision_folder("Projects", None).await.unwrap();
    let note = provisioner
        .provision_note("Plan", Some("- ship it"), Some(&folder))
        .await
        .unwrap();

    assert_eq!(app.item(&note).unwrap().content, "- ship it");
}

#[tokio::test(start_paused = true)]
async fn a_failed_save_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let app = FakeApp::new();
    app.knobs(|k| k.save_status = 500);
    let (_app, provisioner) = engine(app, test_config(dir.path()));

    let folder = provisioner.provision_folder("Projects", None).await.unwrap();
    let err = provisioner
        .provision_note("Plan", Some("body"), Some(&folder))
        .await
        .unwrap_err();

    assert!(matches!(err, E2eError::NetworkFailure { ref message, .. } if message.contains("500")));
    assert!(err.diagnostics().is_some());
}

#[tokio::test(start_paused = true)]
async fn a_missing_save_times_out_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.save_ack_ms = 400;
    let app = FakeApp::new();
    app.knobs(|k| k.save_silent = true);
    let (_app, provisioner) = engine(app, config);

    let folder = provisioner.provision_folder("Projects", None).await.unwrap();
    let err = provisioner
        .provision_note("Plan", Some("body"), Some(&folder))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.diagnostics().is_some());
}
