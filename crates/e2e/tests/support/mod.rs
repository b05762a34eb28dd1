//! In-memory notes application for integration tests
//!
//! `FakeApp` interprets the same locators the engine builds from
//! [`Selectors`] and reproduces the behaviours the engine has to cope with:
//! delayed rendering, name conflicts, sticky dialogs, backend errors and
//! asynchronous saves. `FakeAdmin` records the cleanup calls it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use notes_e2e::admin::{AdminApi, AdminSession, BulkOutcome};
use notes_e2e::config::{E2eConfig, SeedIdentity};
use notes_e2e::driver::{
    BoundingBox, DialogPolicy, NetworkResponse, ResponseSubscription, UiDriver, WaitState,
};
use notes_e2e::selectors::Selectors;
use notes_e2e::{E2eError, E2eResult, ResourceKind};

pub const APP_URL: &str = "http://notes.test";

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub id: String,
    pub label: String,
    pub kind: ResourceKind,
    pub parent: Option<String>,
    pub content: String,
    rendered_at: Instant,
    hidden: bool,
}

impl FakeItem {
    fn rendered(&self) -> bool {
        Instant::now() >= self.rendered_at
    }

    fn visible(&self) -> bool {
        self.rendered() && !self.hidden
    }
}

#[derive(Debug, Clone)]
struct Dialog {
    kind: ResourceKind,
    parent: Option<String>,
    name: String,
    validation: bool,
}

#[derive(Debug, Clone)]
enum Surface {
    Closed,
    Menu { parent: Option<String> },
    Dialog(Dialog),
}

/// Behaviour switches, all off by default
#[derive(Debug, Clone, Default)]
pub struct Knobs {
    /// Labels the application rejects as already in use
    pub conflict_labels: HashSet<String>,
    /// Labels another client creates just before our submit lands
    pub raced_labels: HashSet<String>,
    /// Reject every submitted name
    pub always_conflict: bool,
    /// Time between the dialog closing and the item appearing
    pub render_delay: Duration,
    /// New items are in the DOM but never become visible
    pub hide_new: bool,
    /// Submitting leaves the dialog open without any feedback
    pub dialog_stuck: bool,
    pub cancel_broken: bool,
    pub escape_broken: bool,
    /// Backend error shown as a toast on submit
    pub submit_error: Option<String>,
    /// Status of the save request sent after editing a note
    pub save_status: u16,
    pub save_delay: Duration,
    /// Never send a save request
    pub save_silent: bool,
}

struct State {
    items: Vec<FakeItem>,
    surface: Surface,
    editor: Option<String>,
    toast: Option<String>,
    knobs: Knobs,
    next_id: u64,
    submits: usize,
    /// Menus opened while another flow still held the menu or dialog
    overlapping_opens: usize,
    subscribers: Vec<(Regex, mpsc::UnboundedSender<NetworkResponse>)>,
    visited: Vec<String>,
}

pub struct FakeApp {
    selectors: Selectors,
    state: Mutex<State>,
}

impl FakeApp {
    pub fn new() -> Self {
        Self::with_knobs(Knobs {
            save_status: 200,
            ..Knobs::default()
        })
    }

    pub fn with_knobs(knobs: Knobs) -> Self {
        Self {
            selectors: Selectors::default(),
            state: Mutex::new(State {
                items: Vec::new(),
                surface: Surface::Closed,
                editor: None,
                toast: None,
                knobs,
                next_id: 1,
                submits: 0,
                overlapping_opens: 0,
                subscribers: Vec::new(),
                visited: Vec::new(),
            }),
        }
    }

    pub fn knobs(&self, update: impl FnOnce(&mut Knobs)) {
        update(&mut self.state.lock().knobs);
    }

    /// Add an item that is already rendered, as if created earlier.
    pub fn seed(&self, kind: ResourceKind, label: &str, parent: Option<&str>) -> String {
        let mut state = self.state.lock();
        let id = format!("item-{}", state.next_id);
        state.next_id += 1;
        state.items.push(FakeItem {
            id: id.clone(),
            label: label.to_string(),
            kind,
            parent: parent.map(String::from),
            content: String::new(),
            rendered_at: Instant::now(),
            hidden: false,
        });
        id
    }

    /// Leave a creation dialog open, as a crashed earlier test would.
    pub fn open_leftover_dialog(&self) {
        self.state.lock().surface = Surface::Dialog(Dialog {
            kind: ResourceKind::Folder,
            parent: None,
            name: "half typed".to_string(),
            validation: false,
        });
    }

    pub fn surface_open(&self) -> bool {
        !matches!(self.state.lock().surface, Surface::Closed)
    }

    pub fn item(&self, label: &str) -> Option<FakeItem> {
        self.state.lock().items.iter().find(|i| i.label == label).cloned()
    }

    pub fn items(&self) -> Vec<FakeItem> {
        self.state.lock().items.clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.state.lock().items.iter().filter(|i| i.label == label).count()
    }

    /// Number of names submitted through the creation dialog.
    pub fn submits(&self) -> usize {
        self.state.lock().submits
    }

    pub fn overlapping_opens(&self) -> usize {
        self.state.lock().overlapping_opens
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().visited.clone()
    }

    fn label_for<'s>(&self, state: &'s State, locator: &str) -> Option<&'s FakeItem> {
        state
            .items
            .iter()
            .find(|i| self.selectors.item_label(&i.label) == locator)
    }

    fn menu_owner<'s>(&self, state: &'s State, locator: &str) -> Option<&'s FakeItem> {
        state.items.iter().find(|i| {
            i.kind == ResourceKind::Folder && self.selectors.item_menu(&i.label) == locator
        })
    }

    fn visible_in(&self, state: &State, locator: &str) -> bool {
        let sel = &self.selectors;
        let dialog = match &state.surface {
            Surface::Dialog(d) => Some(d),
            _ => None,
        };

        let in_dialog = [&sel.dialog, &sel.name_input, &sel.submit, &sel.cancel];
        if in_dialog.iter().any(|l| l.as_str() == locator) {
            return dialog.is_some();
        }
        if locator == sel.validation_error {
            return dialog.map(|d| d.validation).unwrap_or(false);
        }
        if locator == sel.create_menu {
            return matches!(state.surface, Surface::Menu { .. });
        }
        if locator == sel.error_toast {
            return state.toast.is_some();
        }
        if locator == sel.editor_body {
            return state.editor.is_some();
        }
        if locator == sel.root_add || locator == sel.outside || locator == sel.tree_root {
            return true;
        }
        if let Some(item) = self.label_for(state, locator) {
            return item.visible();
        }
        if let Some(item) = self.menu_owner(state, locator) {
            return item.visible();
        }
        false
    }

    fn submit(&self, state: &mut State) {
        let Surface::Dialog(dialog) = &mut state.surface else {
            return;
        };
        state.submits += 1;

        if let Some(message) = &state.knobs.submit_error {
            state.toast = Some(message.clone());
            return;
        }
        if state.knobs.raced_labels.remove(&dialog.name) {
            state.items.push(FakeItem {
                id: format!("item-{}", state.next_id),
                label: dialog.name.clone(),
                kind: dialog.kind,
                parent: dialog.parent.clone(),
                content: String::new(),
                rendered_at: Instant::now(),
                hidden: false,
            });
            state.next_id += 1;
        }
        let taken = state.items.iter().any(|i| i.label == dialog.name);
        let rejected = state.knobs.conflict_labels.contains(&dialog.name);
        if state.knobs.always_conflict || taken || rejected {

            dialog.validation = true;
            return;
        }
        if state.knobs.dialog_stuck {
            return;
        }

        let item = FakeItem {
            id: format!("item-{}", state.next_id),
            label: dialog.name.clone(),
            kind: dialog.kind,
            parent: dialog.parent.clone(),
            content: String::new(),
            rendered_at: Instant::now() + state.knobs.render_delay,
            hidden: state.knobs.hide_new,
        };
        state.next_id += 1;
        state.items.push(item);
        state.surface = Surface::Closed;
    }

    /// Store the body and answer subscribers like the real autosave would.
    fn save(&self, state: &mut State, text: &str) {
        let Some(label) = state.editor.clone() else {
            return;
        };
        let Some(item) = state.items.iter_mut().find(|i| i.label == label) else {
            return;
        };
        item.content = text.to_string();
        if state.knobs.save_silent {
            return;
        }

        let response = NetworkResponse {
            url: format!("{}/api/items/{}", APP_URL, item.id),
            status: state.knobs.save_status,
            method: "PUT".to_string(),
        };
        let delay = state.knobs.save_delay;
        for (pattern, tx) in &state.subscribers {
            if pattern.is_match(&response.url) {
                let tx = tx.clone();
                let response = response.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(response);
                });
            }
        }
    }
}

impl Default for FakeApp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UiDriver for FakeApp {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        self.state.lock().visited.push(url.to_string());
        Ok(())
    }

    async fn click(&self, locator: &str) -> E2eResult<()> {
        let sel = &self.selectors;
        let mut state = self.state.lock();
        let state = &mut *state;

        if locator == sel.root_add {
            if matches!(state.surface, Surface::Closed) {
                state.surface = Surface::Menu { parent: None };
            } else {
                state.overlapping_opens += 1;
            }
            return Ok(());
        }
        if let Some(folder) = self.menu_owner(state, locator) {
            let parent = Some(folder.label.clone());
            if matches!(state.surface, Surface::Closed) {
                state.surface = Surface::Menu { parent };
            } else {
                state.overlapping_opens += 1;
            }
            return Ok(());
        }
        for kind in [ResourceKind::Folder, ResourceKind::Note, ResourceKind::Task] {
            if locator == sel.create_action(kind) {
                let Surface::Menu { parent } = &state.surface else {
                    return Err(E2eError::Driver(format!("'{}' is not visible", locator)));
                };
                state.surface = Surface::Dialog(Dialog {
                    kind,
                    parent: parent.clone(),
                    name: String::new(),
                    validation: false,
                });
                return Ok(());
            }
        }
        if locator == sel.submit {
            self.submit(state);
            return Ok(());
        }
        if locator == sel.cancel {
            if !state.knobs.cancel_broken {
                state.surface = Surface::Closed;
            }
            return Ok(());
        }
        if locator == sel.outside {
            state.surface = Surface::Closed;
            return Ok(());
        }
        if let Some(item) = self.label_for(state, locator) {
            if item.kind == ResourceKind::Note && item.visible() {
                state.editor = Some(item.label.clone());
            }
            return Ok(());
        }
        Err(E2eError::Driver(format!("no element matches '{}'", locator)))
    }

    async fn fill(&self, locator: &str, text: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        if locator == self.selectors.name_input {
            if let Surface::Dialog(dialog) = &mut state.surface {
                dialog.name = text.to_string();
                dialog.validation = false;
                return Ok(());
            }
        }
        if locator == self.selectors.editor_body && state.editor.is_some() {
            self.save(&mut state, text);
            return Ok(());
        }
        Err(E2eError::Driver(format!("cannot fill '{}'", locator)))
    }

    async fn press_key(&self, key: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        if key == "Escape" && !state.knobs.escape_broken {
            state.surface = Surface::Closed;
        }
        Ok(())
    }

    async fn wait_for(&self, locator: &str, wait: WaitState, timeout: Duration) -> E2eResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let visible = self.visible_in(&self.state.lock(), locator);
            let reached = match wait {
                WaitState::Visible | WaitState::Attached => visible,
                WaitState::Hidden | WaitState::Detached => !visible,
            };
            if reached {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(E2eError::Timeout {
                    what: format!("'{}' to be {}", locator, wait.as_str()),
                    after_ms: timeout.as_millis() as u64,
                    diagnostics: None,
                });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn get_text(&self, locator: &str) -> E2eResult<Option<String>> {
        let state = self.state.lock();
        if locator == self.selectors.error_toast {
            return Ok(state.toast.clone());
        }
        Ok(self.label_for(&state, locator).map(|i| i.label.clone()))
    }

    async fn all_texts(&self, locator: &str) -> E2eResult<Vec<String>> {
        let state = self.state.lock();
        if locator != self.selectors.tree_item_label {
            return Ok(Vec::new());
        }
        Ok(state
            .items
            .iter()
            .filter(|i| i.rendered())
            .map(|i| format!(" {} ", i.label))
            .collect())
    }

    async fn is_visible(&self, locator: &str) -> E2eResult<bool> {
        Ok(self.visible_in(&self.state.lock(), locator))
    }

    async fn bounding_box(&self, locator: &str) -> E2eResult<Option<BoundingBox>> {
        let state = self.state.lock();
        Ok(self.label_for(&state, locator).filter(|i| i.visible()).map(|_| BoundingBox {
            x: 24.0,
            y: 80.0,
            width: 180.0,
            height: 22.0,
        }))
    }

    async fn get_attribute(&self, locator: &str, name: &str) -> E2eResult<Option<String>> {
        let state = self.state.lock();
        let sel = &self.selectors;
        let Some(item) = self.label_for(&state, locator) else {
            return Ok(None);
        };
        if name == sel.item_id_attribute {
            Ok(Some(item.id.clone()))
        } else if name == sel.item_kind_attribute {
            Ok(Some(item.kind.as_str().to_string()))
        } else if name == sel.item_parent_attribute {
            let parent = item.parent.as_deref();
            Ok(state.items.iter().find(|i| Some(i.label.as_str()) == parent).map(|i| i.id.clone()))
        } else {
            Ok(None)
        }
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, b"\x89PNG fake screenshot")?;
        Ok(())
    }

    async fn on_native_dialog(&self, _policy: DialogPolicy) -> E2eResult<()> {
        Ok(())
    }

    async fn on_network_response(&self, url_pattern: &str) -> E2eResult<ResponseSubscription> {
        let pattern = Regex::new(url_pattern)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push((pattern, tx));
        Ok(ResponseSubscription::new(url_pattern, rx))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bulk {
    Available,
    Unavailable,
    Failing,
}

/// Admin API double that records every call
pub struct FakeAdmin {
    pub bulk: Bulk,
    pub failing_resources: HashSet<String>,
    pub failing_logins: HashSet<String>,
    pub sweep_fails: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeAdmin {
    pub fn new(bulk: Bulk) -> Self {
        Self {
            bulk,
            failing_resources: HashSet::new(),
            failing_logins: HashSet::new(),
            sweep_fails: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl AdminApi for FakeAdmin {
    async fn bulk_delete_run(&self, run_id: &str) -> E2eResult<BulkOutcome> {
        self.record(format!("bulk {}", run_id));
        match self.bulk {
            Bulk::Available => Ok(BulkOutcome::Deleted(0)),
            Bulk::Unavailable => Ok(BulkOutcome::Unavailable),
            Bulk::Failing => Err(E2eError::Admin("bulk purge returned 500".to_string())),
        }
    }

    async fn authenticate(&self, identity: &SeedIdentity) -> E2eResult<AdminSession> {
        self.record(format!("login {}", identity.login));
        if self.failing_logins.contains(&identity.login) {
            return Err(E2eError::Admin("login rejected".to_string()));
        }
        Ok(AdminSession {
            identity: identity.login.clone(),
            token: format!("token-{}", identity.login),
        })
    }

    async fn delete_resource(&self, session: &AdminSession, resource_id: &str) -> E2eResult<()> {
        self.record(format!("delete {} {}", session.identity, resource_id));
        if self.failing_resources.contains(resource_id) {
            return Err(E2eError::Admin(format!("delete {} returned 500", resource_id)));
        }
        Ok(())
    }

    async fn delete_identity_resources(&self, session: &AdminSession) -> E2eResult<usize> {
        self.record(format!("sweep {}", session.identity));
        if self.sweep_fails {
            return Err(E2eError::Admin("sweep returned 503".to_string()));
        }
        Ok(1)
    }
}

/// Fast-polling configuration writing diagnostics under `dir`.
pub fn test_config(dir: &Path) -> E2eConfig {
    let mut config = E2eConfig {
        base_url: APP_URL.to_string(),
        run_id: "run-test".to_string(),
        identity: Some("alice".to_string()),
        diagnostics_dir: dir.join("diagnostics"),
        ..E2eConfig::default()
    };
    config.timeouts.poll_interval_ms = 10;
    config.cleanup.seed_identities = vec![SeedIdentity {
        login: "alice".to_string(),
        password: "alice-password".to_string(),
    }];
    config
}

pub fn engine(app: FakeApp, config: E2eConfig) -> (Arc<FakeApp>, notes_e2e::Provisioner<FakeApp>) {
    let app = Arc::new(app);
    let provisioner = notes_e2e::Provisioner::new(app.clone(), config);
    (app, provisioner)
}
