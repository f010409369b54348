//! Sources and the Flag Protocol
//!
//! A [`Source`] is an identity-keyed holder of trackable fields. The core never
//! looks inside it: subscriptions are keyed by the source's identity and a
//! [`FieldKey`](crate::graph::FieldKey), and the source's [`SourceShape`] only
//! selects which trigger fan-out rules apply.
//!
//! # Flags
//!
//! Each source carries self-description flags that a wrapping coordinator
//! consults before creating a new wrapped view:
//!
//! - exempt: never wrap this source ([`Source::mark_raw`])
//! - reactive / readonly: this source is itself a wrapped view
//! - raw: the original identity behind a view ([`Source::to_raw`])
//! - cached reactive / readonly view: the view already created for it
//!
//! The flags live beside the source's data, so they never show up when the
//! data is iterated. Wrapping the same source twice returns the existing
//! view, and once created a view stays associated with its source for as
//! long as the source lives.
//!
//! A view shares its source's allocation and differs only in its layer and
//! identity. The source records each view's id once, so view identity is
//! stable across dropped handles and there is no raw <-> view cycle.
//!
//! # Lifetime
//!
//! The subscription graph only holds a source weakly. Each runtime that
//! tracks a source registers itself here, and when the last handle to the
//! source (or to any of its views) is dropped its subscription entries are
//! removed from every registered runtime.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use smallvec::SmallVec;

use super::runtime::WeakRuntime;

/// Unique identifier for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(u64);

impl SourceId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of container a source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceShape {
    /// Keyed record (plain object).
    Record,

    /// Indexed sequence with a length.
    Sequence,

    /// Associative container iterated by key and by entry.
    Map,

    /// Set-like collection.
    Set,

    /// A value that cannot be wrapped.
    Opaque,
}

impl SourceShape {
    /// Whether a source of this shape may be wrapped in a view.
    pub fn is_observable(self) -> bool {
        !matches!(self, SourceShape::Opaque)
    }
}

/// Whether a source is an original or a wrapped view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Raw,
    Reactive,
    Readonly,
}

/// Which wrapping layer a handle presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Raw,
    Reactive,
    Readonly,
    /// Readonly view over the mutable view.
    ReadonlyReactive,
}

struct SourceInner {
    id: SourceId,
    shape: SourceShape,
    exempt: AtomicBool,
    reactive_id: OnceLock<SourceId>,
    readonly_id: OnceLock<SourceId>,
    readonly_reactive_id: OnceLock<SourceId>,
    /// Runtimes holding subscription entries for this source.
    runtimes: Mutex<SmallVec<[WeakRuntime; 1]>>,
}

impl Drop for SourceInner {
    fn drop(&mut self) {
        for runtime in self.runtimes.get_mut().drain(..) {
            if let Some(runtime) = runtime.upgrade() {
                runtime.graph().forget(self.id);
            }
        }
    }
}

/// Identity handle to a trackable source. Cloning shares the identity.
#[derive(Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
    layer: Layer,
    id: SourceId,
}

impl Source {
    pub fn new(shape: SourceShape) -> Self {
        let id = SourceId::next();
        Self {
            inner: Arc::new(SourceInner {
                id,
                shape,
                exempt: AtomicBool::new(false),
                reactive_id: OnceLock::new(),
                readonly_id: OnceLock::new(),
                readonly_reactive_id: OnceLock::new(),
                runtimes: Mutex::new(SmallVec::new()),
            }),
            layer: Layer::Raw,
            id,
        }
    }

    pub fn record() -> Self {
        Self::new(SourceShape::Record)
    }

    pub fn sequence() -> Self {
        Self::new(SourceShape::Sequence)
    }

    pub fn map() -> Self {
        Self::new(SourceShape::Map)
    }

    pub fn set() -> Self {
        Self::new(SourceShape::Set)
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn shape(&self) -> SourceShape {
        self.inner.shape
    }

    pub fn view_kind(&self) -> ViewKind {
        match self.layer {
            Layer::Raw => ViewKind::Raw,
            Layer::Reactive => ViewKind::Reactive,
            Layer::Readonly | Layer::ReadonlyReactive => ViewKind::Readonly,
        }
    }

    pub fn downgrade(&self) -> WeakSource {
        WeakSource {
            inner: Arc::downgrade(&self.inner),
            layer: self.layer,
            id: self.id,
        }
    }

    /// Whether two handles share one identity.
    pub fn ptr_eq(a: &Source, b: &Source) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner) && a.id == b.id
    }

    /// Exempt this source from wrapping. Views are never created for it.
    pub fn mark_raw(&self) -> &Self {
        self.inner.exempt.store(true, Ordering::SeqCst);
        self
    }

    pub fn is_exempt(&self) -> bool {
        self.inner.exempt.load(Ordering::SeqCst)
    }

    /// Whether this is a mutable view, or a readonly view over one.
    pub fn is_reactive(&self) -> bool {
        matches!(self.layer, Layer::Reactive | Layer::ReadonlyReactive)
    }

    pub fn is_readonly(&self) -> bool {
        matches!(self.layer, Layer::Readonly | Layer::ReadonlyReactive)
    }

    /// Whether this is any kind of wrapped view.
    pub fn is_proxy(&self) -> bool {
        self.layer != Layer::Raw
    }

    /// The original identity behind any number of view layers.
    pub fn to_raw(&self) -> Source {
        Source {
            inner: Arc::clone(&self.inner),
            layer: Layer::Raw,
            id: self.inner.id,
        }
    }

    /// The mutable view of this source, created once and then reused.
    ///
    /// Returns `self` when it is already a view, is exempt, or is opaque.
    pub fn reactive(&self) -> Source {
        self.create_view(ViewKind::Reactive)
    }

    /// The read-only view of this source, created once and then reused.
    ///
    /// A mutable view may itself be wrapped read-only.
    pub fn readonly(&self) -> Source {
        self.create_view(ViewKind::Readonly)
    }

    /// The cached view of the given kind, if one was ever created.
    pub fn cached_view(&self, kind: ViewKind) -> Option<Source> {
        let (slot, layer) = self.view_slot(kind)?;
        slot.get().map(|&id| self.with_layer(layer, id))
    }

    fn view_slot(&self, kind: ViewKind) -> Option<(&OnceLock<SourceId>, Layer)> {
        match (self.layer, kind) {
            (Layer::Raw, ViewKind::Reactive) => Some((&self.inner.reactive_id, Layer::Reactive)),
            (Layer::Raw, ViewKind::Readonly) => Some((&self.inner.readonly_id, Layer::Readonly)),
            (Layer::Reactive, ViewKind::Readonly) => {
                Some((&self.inner.readonly_reactive_id, Layer::ReadonlyReactive))
            }
            _ => None,
        }
    }

    fn with_layer(&self, layer: Layer, id: SourceId) -> Source {
        Source {
            inner: Arc::clone(&self.inner),
            layer,
            id,
        }
    }

    fn create_view(&self, kind: ViewKind) -> Source {
        // Already a view: don't double-wrap, except readonly over reactive.
        let Some((slot, layer)) = self.view_slot(kind) else {
            return self.clone();
        };
        if let Some(&id) = slot.get() {
            return self.with_layer(layer, id);
        }

        if !self.inner.shape.is_observable() {
            if cfg!(debug_assertions) {
                tracing::warn!(source = %self.id, "value cannot be made {kind:?}");
            }
            return self.clone();
        }
        if self.layer == Layer::Raw && self.is_exempt() {
            return self.clone();
        }

        let mut created = false;
        let id = *slot.get_or_init(|| {
            created = true;
            SourceId::next()
        });
        if created {
            tracing::trace!(raw = %self.inner.id, view = %id, ?kind, "view created");
        }
        self.with_layer(layer, id)
    }

    /// Remember that `runtime` holds entries for this source.
    pub(crate) fn register_runtime(&self, runtime: WeakRuntime) {
        let mut runtimes = self.inner.runtimes.lock();
        runtimes.retain(|known| known.is_alive());
        if !runtimes.iter().any(|known| known.ptr_eq(&runtime)) {
            runtimes.push(runtime);
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("shape", &self.inner.shape)
            .field("view", &self.view_kind())
            .finish()
    }
}

/// Non-owning handle to a source.
#[derive(Clone)]
pub struct WeakSource {
    inner: Weak<SourceInner>,
    layer: Layer,
    id: SourceId,
}

impl WeakSource {
    /// A handle that never upgrades.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Source> {
        self.inner.upgrade().map(|inner| Source {
            inner,
            layer: self.layer,
            id: self.id,
        })
    }
}

impl Default for WeakSource {
    fn default() -> Self {
        Self {
            inner: Weak::new(),
            layer: Layer::Raw,
            id: SourceId(u64::MAX),
        }
    }
}

impl fmt::Debug for WeakSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSource")
            .field("id", &self.id)
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
