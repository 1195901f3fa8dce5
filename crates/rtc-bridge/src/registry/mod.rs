//! Value-tag registry for native RTC objects
//!
//! Maps opaque [`Handle`]s to live native objects in three namespaces (peer
//! connections, media streams, media tracks) and keeps an explicit ownership
//! tree beside the flat tables so cascade release is a deterministic
//! traversal:
//!
//! ```text
//! PeerConnection
//!   └─ MediaStream (owned: created on, or received by, the connection)
//!        └─ MediaTrack
//! ```
//!
//! All tables sit behind one `parking_lot::RwLock`. Every operation is a
//! constant-time table edit done under the lock; native teardown of released
//! objects is left to the caller, after the lock is dropped.

mod handle;

pub use handle::{Handle, NativeObject, ObjectKind};

use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Objects removed by a release, children first
pub type Released<P, S, T> = Vec<(Handle, NativeObject<P, S, T>)>;

struct Tables<P, S, T> {
    peer_connections: HashMap<Handle, Arc<P>>,
    streams: HashMap<Handle, Arc<S>>,
    tracks: HashMap<Handle, Arc<T>>,

    /// child -> owner
    owners: HashMap<Handle, Handle>,

    /// owner -> children, in registration order
    children: HashMap<Handle, Vec<Handle>>,
}

impl<P, S, T> Tables<P, S, T> {
    fn new() -> Self {
        Self {
            peer_connections: HashMap::new(),
            streams: HashMap::new(),
            tracks: HashMap::new(),
            owners: HashMap::new(),
            children: HashMap::new(),
        }
    }

    fn kind_of(&self, handle: &Handle) -> Option<ObjectKind> {
        if self.peer_connections.contains_key(handle) {
            Some(ObjectKind::PeerConnection)
        } else if self.streams.contains_key(handle) {
            Some(ObjectKind::MediaStream)
        } else if self.tracks.contains_key(handle) {
            Some(ObjectKind::MediaTrack)
        } else {
            None
        }
    }

    fn get(&self, handle: &Handle, kind: ObjectKind) -> Option<NativeObject<P, S, T>> {
        match kind {
            ObjectKind::PeerConnection => self
                .peer_connections
                .get(handle)
                .map(|pc| NativeObject::PeerConnection(Arc::clone(pc))),
            ObjectKind::MediaStream => self
                .streams
                .get(handle)
                .map(|s| NativeObject::MediaStream(Arc::clone(s))),
            ObjectKind::MediaTrack => self
                .tracks
                .get(handle)
                .map(|t| NativeObject::MediaTrack(Arc::clone(t))),
        }
    }

    fn remove(&mut self, handle: &Handle) -> Option<NativeObject<P, S, T>> {
        if let Some(pc) = self.peer_connections.remove(handle) {
            return Some(NativeObject::PeerConnection(pc));
        }
        if let Some(stream) = self.streams.remove(handle) {
            return Some(NativeObject::MediaStream(stream));
        }
        self.tracks.remove(handle).map(NativeObject::MediaTrack)
    }

    /// Post-order walk of the ownership subtree rooted at `root`
    fn collect_subtree(&self, root: &Handle, out: &mut Vec<Handle>) {
        if let Some(children) = self.children.get(root) {
            for child in children {
                self.collect_subtree(child, out);
            }
        }
        out.push(root.clone());
    }

    /// Remove `root` and everything it owns, children first
    fn cascade(&mut self, root: &Handle) -> Released<P, S, T> {
        let mut order = Vec::new();
        self.collect_subtree(root, &mut order);

        // Detach the root from its own owner, if any
        if let Some(owner) = self.owners.get(root).cloned() {
            if let Some(siblings) = self.children.get_mut(&owner) {
                siblings.retain(|h| h != root);
            }
        }

        let mut released = Vec::with_capacity(order.len());
        for handle in order {
            self.owners.remove(&handle);
            self.children.remove(&handle);
            if let Some(object) = self.remove(&handle) {
                released.push((handle, object));
            }
        }
        released
    }
}

/// Owner table required for an object of `kind`
fn owner_kind(kind: ObjectKind) -> Option<ObjectKind> {
    match kind {
        ObjectKind::PeerConnection => None,
        ObjectKind::MediaStream => Some(ObjectKind::PeerConnection),
        ObjectKind::MediaTrack => Some(ObjectKind::MediaStream),
    }
}

/// Registry of live native objects addressed by value tags
///
/// One registry exists per running bridge; it is passed by reference to
/// whatever needs it rather than living in a global.
pub struct HandleRegistry<P, S, T> {
    tables: RwLock<Tables<P, S, T>>,
}

impl<P, S, T> Default for HandleRegistry<P, S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, S, T> HandleRegistry<P, S, T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
        }
    }

    /// Generate a new, process-unique handle. Does not touch the tables.
    pub fn mint_handle(&self) -> Handle {
        Handle::mint()
    }

    /// Bind `handle` to `object`, optionally as a child of `owner`
    ///
    /// The owner must be live and of the parent kind (stream for a track,
    /// peer connection for a stream). The presence check and the insert happen
    /// under the same lock, so an object can never be attached to an owner
    /// that is being released concurrently.
    ///
    /// # Errors
    ///
    /// * `DuplicateHandle` - the handle is already bound in any table
    /// * `UnknownHandle` - the owner is absent or of the wrong kind
    pub fn register(
        &self,
        handle: Handle,
        object: NativeObject<P, S, T>,
        owner: Option<&Handle>,
    ) -> Result<()> {
        let kind = object.kind();
        let mut tables = self.tables.write();

        if let Some(existing) = tables.kind_of(&handle) {
            error!(
                handle = %handle,
                existing = %existing,
                requested = %kind,
                "Duplicate handle registration; handle minting is broken"
            );
            return Err(Error::DuplicateHandle(handle));
        }

        if let Some(owner) = owner {
            let expected = owner_kind(kind).ok_or_else(|| {
                Error::InternalError(format!("{} objects cannot have an owner", kind))
            })?;
            if tables.kind_of(owner) != Some(expected) {
                debug!(handle = %handle, owner = %owner, "Owner not registered, rejecting");
                return Err(Error::unknown(expected, owner));
            }
            tables.owners.insert(handle.clone(), owner.clone());
            tables
                .children
                .entry(owner.clone())
                .or_default()
                .push(handle.clone());
        }

        match object {
            NativeObject::PeerConnection(pc) => {
                tables.peer_connections.insert(handle.clone(), pc);
            }
            NativeObject::MediaStream(stream) => {
                tables.streams.insert(handle.clone(), stream);
            }
            NativeObject::MediaTrack(track) => {
                tables.tracks.insert(handle.clone(), track);
            }
        }

        info!(handle = %handle, kind = %kind, owner = ?owner.map(Handle::as_str), "Registered");
        Ok(())
    }

    /// Mint a handle and register `object` under it
    pub fn insert(&self, object: NativeObject<P, S, T>, owner: Option<&Handle>) -> Result<Handle> {
        let handle = self.mint_handle();
        self.register(handle.clone(), object, owner)?;
        Ok(handle)
    }

    /// Look up a live object of the given kind
    ///
    /// Returns `None` when the handle is unknown, already released, or bound
    /// in a different table.
    pub fn resolve(&self, handle: &Handle, kind: ObjectKind) -> Option<NativeObject<P, S, T>> {
        let found = self.tables.read().get(handle, kind);
        if found.is_none() {
            debug!(handle = %handle, kind = %kind, "Handle did not resolve");
        }
        found
    }

    /// Resolve a peer connection handle
    pub fn peer_connection(&self, handle: &Handle) -> Result<Arc<P>> {
        self.tables
            .read()
            .peer_connections
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::unknown(ObjectKind::PeerConnection, handle))
    }

    /// Resolve a media stream handle
    pub fn stream(&self, handle: &Handle) -> Result<Arc<S>> {
        self.tables
            .read()
            .streams
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::unknown(ObjectKind::MediaStream, handle))
    }

    /// Resolve a media track handle
    pub fn track(&self, handle: &Handle) -> Result<Arc<T>> {
        self.tables
            .read()
            .tracks
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::unknown(ObjectKind::MediaTrack, handle))
    }

    /// Which table a handle is bound in, if any
    pub fn kind_of(&self, handle: &Handle) -> Option<ObjectKind> {
        self.tables.read().kind_of(handle)
    }

    /// Check if a handle is bound in any table
    pub fn contains(&self, handle: &Handle) -> bool {
        self.kind_of(handle).is_some()
    }

    /// Owner of a handle, if it has one
    pub fn owner_of(&self, handle: &Handle) -> Option<Handle> {
        self.tables.read().owners.get(handle).cloned()
    }

    /// Direct children of a handle, in registration order
    pub fn children(&self, owner: &Handle) -> Vec<Handle> {
        self.tables
            .read()
            .children
            .get(owner)
            .cloned()
            .unwrap_or_default()
    }

    /// All handles currently bound in one table
    pub fn handles(&self, kind: ObjectKind) -> Vec<Handle> {
        let tables = self.tables.read();
        match kind {
            ObjectKind::PeerConnection => tables.peer_connections.keys().cloned().collect(),
            ObjectKind::MediaStream => tables.streams.keys().cloned().collect(),
            ObjectKind::MediaTrack => tables.tracks.keys().cloned().collect(),
        }
    }

    /// Number of live objects of one kind
    pub fn count(&self, kind: ObjectKind) -> usize {
        let tables = self.tables.read();
        match kind {
            ObjectKind::PeerConnection => tables.peer_connections.len(),
            ObjectKind::MediaStream => tables.streams.len(),
            ObjectKind::MediaTrack => tables.tracks.len(),
        }
    }

    /// Total number of live objects
    pub fn len(&self) -> usize {
        let tables = self.tables.read();
        tables.peer_connections.len() + tables.streams.len() + tables.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the binding for `handle` in the `kind` table, with everything it owns
    ///
    /// Idempotent: an unknown or already-released handle (or one bound in a
    /// different table) releases nothing. Once this returns, no `resolve` of
    /// any released handle can succeed.
    pub fn release(&self, handle: &Handle, kind: ObjectKind) -> Released<P, S, T> {
        let mut tables = self.tables.write();

        if tables.kind_of(handle) != Some(kind) {
            debug!(handle = %handle, kind = %kind, "Release of absent handle ignored");
            return Vec::new();
        }

        let released = tables.cascade(handle);
        info!(
            handle = %handle,
            kind = %kind,
            released = released.len(),
            "Released"
        );
        released
    }

    /// Remove `owner` and every object it transitively owns
    ///
    /// Tracks go before the streams containing them, streams before their
    /// connection. Idempotent like [`release`](Self::release).
    pub fn release_all(&self, owner: &Handle) -> Released<P, S, T> {
        let mut tables = self.tables.write();

        let Some(kind) = tables.kind_of(owner) else {
            debug!(handle = %owner, "Release of absent handle ignored");
            return Vec::new();
        };

        let released = tables.cascade(owner);
        info!(
            handle = %owner,
            kind = %kind,
            released = released.len(),
            "Released with dependents"
        );
        released
    }

    /// Release every object, root by root
    ///
    /// Ownerless tracks go first, then ownerless streams (each with its
    /// tracks), then peer connections (each with their subtrees). Roots of one
    /// kind are visited in handle order.
    pub fn clear(&self) -> Released<P, S, T> {
        let mut tables = self.tables.write();

        let mut roots: Vec<(u8, Handle)> = Vec::new();
        roots.extend(
            tables
                .tracks
                .keys()
                .filter(|h| !tables.owners.contains_key(*h))
                .map(|h| (0, h.clone())),
        );
        roots.extend(
            tables
                .streams
                .keys()
                .filter(|h| !tables.owners.contains_key(*h))
                .map(|h| (1, h.clone())),
        );
        roots.extend(tables.peer_connections.keys().map(|h| (2, h.clone())));
        roots.sort();

        let mut released = Vec::new();
        for (_, root) in roots {
            released.extend(tables.cascade(&root));
        }

        info!(released = released.len(), "Registry cleared");
        released
    }
}
