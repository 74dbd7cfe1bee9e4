//! Content tree state store.
//!
//! Owns one [`ContentTree`] and is the only way to change it. Every public
//! operation returns normally: failures are captured into the snapshot's
//! `error` field and published to observers instead of being returned.
//!
//! Mutations run synchronously under the state lock. A structural change bumps
//! the version and hands a dump of the tree to the save hook, which runs on the
//! current tokio runtime. Saves are neither queued nor cancelled; `is_saving`
//! stays true while at least one of them is outstanding.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::application::error::{SaveError, StoreError};
use crate::application::save::SaveHook;
use crate::application::snapshot::{Observers, Snapshot, Subscription};
use crate::domain::{ContentNodeValue, ContentTree, MAX_PROPS_NESTING, ROOT_TYPE};

/// Construction options for [`ContentTreeStore`].
#[derive(Clone)]
pub struct StoreOptions {
    /// Persistence hook; without one, changes are only kept in memory
    pub save: Option<Arc<dyn SaveHook>>,
    /// Value used by `add` when the caller passes none
    pub default_node_value: Option<ContentNodeValue>,
    /// Reserved type of the root node
    pub root_type: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            save: None,
            default_node_value: None,
            root_type: ROOT_TYPE.to_string(),
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("save", &self.save.as_ref().map(|_| "<hook>"))
            .field("default_node_value", &self.default_node_value)
            .field("root_type", &self.root_type)
            .finish()
    }
}

impl StoreOptions {
    pub fn with_save(mut self, hook: impl SaveHook + 'static) -> Self {
        self.save = Some(Arc::new(hook));
        self
    }

    pub fn with_default_node_value(mut self, value: ContentNodeValue) -> Self {
        self.default_node_value = Some(value);
        self
    }

    pub fn with_root_type(mut self, root_type: impl Into<String>) -> Self {
        self.root_type = root_type.into();
        self
    }
}

/// New value for `edit`: serialized JSON, a ready value, or nothing.
#[derive(Debug, Clone)]
pub enum EditPayload {
    Json(String),
    Value(ContentNodeValue),
    Empty,
}

impl EditPayload {
    /// `Ok(None)` means there is nothing to apply (blank string, JSON `null`, `Empty`).
    fn into_value(self) -> Result<Option<ContentNodeValue>, StoreError> {
        match self {
            EditPayload::Empty => Ok(None),
            EditPayload::Value(value) => Ok(Some(value)),
            EditPayload::Json(json) if json.trim().is_empty() => Ok(None),
            EditPayload::Json(json) => serde_json::from_str(&json).map_err(StoreError::InvalidPayload),
        }
    }
}

impl From<&str> for EditPayload {
    fn from(json: &str) -> Self {
        EditPayload::Json(json.to_string())
    }
}

impl From<String> for EditPayload {
    fn from(json: String) -> Self {
        EditPayload::Json(json)
    }
}

impl From<ContentNodeValue> for EditPayload {
    fn from(value: ContentNodeValue) -> Self {
        EditPayload::Value(value)
    }
}

impl From<Option<ContentNodeValue>> for EditPayload {
    fn from(value: Option<ContentNodeValue>) -> Self {
        value.map_or(EditPayload::Empty, EditPayload::Value)
    }
}

fn check_props(value: &ContentNodeValue) -> Result<(), StoreError> {
    if value.props_nesting() > MAX_PROPS_NESTING {
        return Err(StoreError::rejected(format!(
            "node props nest deeper than {} levels",
            MAX_PROPS_NESTING
        )));
    }
    Ok(())
}

/// Whether an operation changed the tree.
enum Change<T> {
    Mutated(T),
    Unchanged(T),
}

struct StoreState {
    tree: ContentTree<ContentNodeValue>,
    version: u64,
    revision: u64,
    error: String,
    saves_in_flight: usize,
    /// Next number for synthesized labels; never decremented
    label_counter: usize,
}

impl StoreState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            size: self.tree.size(),
            data: self.tree.to_dto(),
            error: self.error.clone(),
            is_saving: self.saves_in_flight > 0,
            version: self.version,
            revision: self.revision,
        }
    }

    fn next_snapshot(&mut self) -> Snapshot {
        self.revision += 1;
        self.snapshot()
    }

    fn capture(&mut self, op: &str, err: StoreError) {
        warn!(op, error = %err, "captured store error");
        self.error = err.to_string();
    }
}

/// A save that has been accounted for in `saves_in_flight` but not yet spawned.
struct PendingSave {
    hook: Arc<dyn SaveHook>,
    dump: String,
    runtime: Handle,
}

struct Shared {
    state: Mutex<StoreState>,
    observers: Arc<Observers>,
    save: Option<Arc<dyn SaveHook>>,
    default_node_value: ContentNodeValue,
}

/// Authoritative content tree with observable snapshots. Cheap to clone;
/// clones share the same tree.
#[derive(Clone)]
pub struct ContentTreeStore {
    shared: Arc<Shared>,
}

impl fmt::Debug for ContentTreeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ContentTreeStore")
            .field("size", &state.tree.size())
            .field("version", &state.version)
            .field("error", &state.error)
            .field("saves_in_flight", &state.saves_in_flight)
            .finish()
    }
}

impl ContentTreeStore {
    /// Create a store, hydrated from `initial_dump` if given.
    ///
    /// A malformed dump leaves a root-only tree with the failure in `error`.
    /// Construction never triggers a save.
    pub fn create(initial_dump: Option<&str>, options: StoreOptions) -> Self {
        let mut tree = ContentTree::new(ContentNodeValue::root(options.root_type.as_str()));
        let mut error = String::new();
        if let Some(dump) = initial_dump {
            if let Err(e) = tree.restore(dump) {
                let err = StoreError::from(e);
                warn!(error = %err, "initial dump rejected");
                error = err.to_string();
            }
        }
        let mut state = StoreState {
            label_counter: tree.size(),
            tree,
            version: 0,
            revision: 0,
            error,
            saves_in_flight: 0,
        };
        let initial = state.next_snapshot();
        debug!(size = initial.size, "content tree store created");
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                observers: Arc::new(Observers::new(initial)),
                save: options.save,
                default_node_value: options.default_node_value.unwrap_or_default(),
            }),
        }
    }

    /// Current snapshot without subscribing.
    pub fn get(&self) -> Snapshot {
        self.shared.state.lock().snapshot()
    }

    /// Register `callback`; it is called now and after every state change.
    pub fn subscribe(&self, callback: impl Fn(&Snapshot) + Send + Sync + 'static) -> Subscription {
        Observers::add(&self.shared.observers, Box::new(callback), || self.get())
    }

    /// Receiver that always holds the latest published snapshot.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.shared.observers.watch()
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.len()
    }

    /// Resolves once no save is outstanding.
    pub async fn settled(&self) {
        let mut latest = self.watch();
        // Err only if the sender is gone, which cannot happen while `self` lives.
        let _ = latest.wait_for(|snapshot| !snapshot.is_saving).await;
    }

    /// Append a node under `parent_key` (the root if `None`); returns its key.
    #[instrument(level = "debug", skip(self, value))]
    pub fn add(&self, parent_key: Option<&str>, value: Option<ContentNodeValue>) -> Option<String> {
        self.mutate("add", |state| {
            let parent = match parent_key {
                Some(key) => key.to_string(),
                None => state.tree.root_key().to_string(),
            };
            if !state.tree.contains(&parent) {
                return Err(StoreError::not_found("parent", &parent));
            }
            let mut value = value.unwrap_or_else(|| self.shared.default_node_value.clone());
            check_props(&value)?;
            if value.needs_label() {
                value.label = Some(format!("{} #{}", value.node_type, state.label_counter));
            }
            let key = state.tree.append_child(&parent, value)?;
            state.label_counter += 1;
            Ok(Change::Mutated(key))
        })
    }

    /// Remove the node and its subtree. Unknown keys are a silent no-op.
    #[instrument(level = "debug", skip(self))]
    pub fn remove(&self, key: &str) {
        self.mutate("remove", |state| {
            if state.tree.remove(key)? {
                Ok(Change::Mutated(()))
            } else {
                Ok(Change::Unchanged(()))
            }
        });
    }

    /// Deep-copy a subtree with fresh keys, placed right after the source.
    #[instrument(level = "debug", skip(self))]
    pub fn duplicate(&self, key: &str) -> Option<String> {
        self.mutate("duplicate", |state| {
            let source = state
                .tree
                .find(key)
                .ok_or_else(|| StoreError::not_found("source", key))?;
            let Some(parent) = source.parent_key().map(str::to_string) else {
                return Err(StoreError::rejected("cannot duplicate the root node"));
            };
            let position = source.sibling_index();
            let copy = state.tree.copy(key, &parent)?;
            state.tree.move_sibling_index(&copy, position + 1)?;
            Ok(Change::Mutated(copy))
        })
    }

    /// Reorder among siblings (`src == target`) or reparent `src` under `target`,
    /// then place it at `target_index` (clamped).
    #[instrument(level = "debug", skip(self))]
    pub fn move_node(&self, src: &str, target: &str, target_index: usize) {
        self.mutate("move", |state| {
            if !state.tree.contains(src) {
                return Err(StoreError::not_found("source", src));
            }
            if !state.tree.contains(target) {
                return Err(StoreError::not_found("target", target));
            }
            if src != target {
                state.tree.move_node(src, target)?;
            }
            state.tree.move_sibling_index(src, target_index)?;
            Ok(Change::Mutated(()))
        });
    }

    /// Replace the value at `key` wholesale.
    #[instrument(level = "debug", skip(self, payload))]
    pub fn edit(&self, key: &str, payload: impl Into<EditPayload>) {
        let payload = payload.into();
        self.mutate("edit", |state| {
            let Some(value) = payload.into_value()? else {
                return Ok(Change::Unchanged(()));
            };
            let node = state
                .tree
                .find(key)
                .ok_or_else(|| StoreError::not_found("target", key))?;
            if node.is_root() {
                return Err(StoreError::rejected("the root node value is reserved"));
            }
            check_props(&value)?;
            state.tree.set_value(key, value)?;
            Ok(Change::Mutated(()))
        });
    }

    /// Replace the whole tree with the contents of `dump`.
    #[instrument(level = "debug", skip_all)]
    pub fn restore(&self, dump: &str) {
        self.mutate("restore", |state| {
            state.tree.restore(dump)?;
            state.label_counter = state.label_counter.max(state.tree.size());
            Ok(Change::Mutated(()))
        });
    }

    /// Persist the current tree without changing it.
    #[instrument(level = "debug", skip(self))]
    pub fn save(&self) {
        self.mutate("save", |_| Ok(Change::Mutated(())));
    }

    /// Clear the error field; nothing else changes.
    pub fn reset_error(&self) {
        let snapshot = {
            let mut state = self.shared.state.lock();
            if state.error.is_empty() {
                return;
            }
            state.error.clear();
            state.next_snapshot()
        };
        self.shared.observers.publish(snapshot);
    }

    /// Run `op` under the state lock with the error cleared beforehand, then
    /// publish and start a save if the tree changed.
    fn mutate<T>(
        &self,
        name: &'static str,
        op: impl FnOnce(&mut StoreState) -> Result<Change<T>, StoreError>,
    ) -> Option<T> {
        let mut state = self.shared.state.lock();
        let had_error = !state.error.is_empty();
        state.error.clear();

        let (result, pending) = match op(&mut *state) {
            Ok(Change::Mutated(value)) => {
                state.version += 1;
                debug!(op = name, version = state.version, size = state.tree.size(), "tree changed");
                let pending = match self.begin_save(&mut *state) {
                    Ok(pending) => pending,
                    Err(err) => {
                        state.capture(name, err);
                        None
                    }
                };
                (Some(value), pending)
            }
            Ok(Change::Unchanged(value)) => {
                if !had_error {
                    return Some(value);
                }
                (Some(value), None)
            }
            Err(err) => {
                state.capture(name, err);
                (None, None)
            }
        };

        let snapshot = state.next_snapshot();
        drop(state);
        self.shared.observers.publish(snapshot);
        if let Some(pending) = pending {
            self.spawn_save(pending);
        }
        result
    }

    fn begin_save(&self, state: &mut StoreState) -> Result<Option<PendingSave>, StoreError> {
        let Some(hook) = self.shared.save.clone() else {
            return Ok(None);
        };
        let dump = state.tree.dump()?;
        let runtime =
            Handle::try_current().map_err(|e| StoreError::PersistenceFailure(Box::new(e)))?;
        state.saves_in_flight += 1;
        Ok(Some(PendingSave {
            hook,
            dump,
            runtime,
        }))
    }

    fn spawn_save(&self, pending: PendingSave) {
        let shared = Arc::downgrade(&self.shared);
        let PendingSave {
            hook,
            dump,
            runtime,
        } = pending;
        runtime.spawn(async move {
            let outcome = AssertUnwindSafe(async move { hook.save(dump).await })
                .catch_unwind()
                .await;
            let result = outcome.unwrap_or_else(|_| Err(SaveError::from("save hook panicked")));
            Self::finish_save(&shared, result);
        });
    }

    fn finish_save(shared: &Weak<Shared>, result: Result<(), SaveError>) {
        // Store dropped mid-save: nobody is left to observe the outcome.
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let snapshot = {
            let mut state = shared.state.lock();
            state.saves_in_flight = state.saves_in_flight.saturating_sub(1);
            match result {
                Ok(()) => debug!(in_flight = state.saves_in_flight, "save completed"),
                Err(e) => state.capture("save", StoreError::PersistenceFailure(e)),
            }
            state.next_snapshot()
        };
        shared.observers.publish(snapshot);
    }
}
