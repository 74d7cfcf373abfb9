//! The canonical byte stream a match's data converges onto,
//! and the per-writer view the merger reconciles against it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::header::ReplayHeader;
use crate::latch::Latch;

struct Inner {
    header: RefCell<Option<ReplayHeader>>,
    data: RefCell<Vec<u8>>,
    ended: Latch,
}

/// The single canonical byte stream for a match: one header, installed once,
/// and an append-only body that every writer's data is merged into.
#[derive(Clone)]
pub struct ReplayStream(Rc<Inner>);

impl ReplayStream {
    pub fn new() -> Self {
        Self(Rc::new(Inner {
            header: RefCell::new(None),
            data: RefCell::new(Vec::new()),
            ended: Latch::new(),
        }))
    }

    /// Installs the header if none is set yet. Only the first writer to
    /// finish its handshake wins; later writers' headers are discarded.
    pub fn set_header_if_absent(&self, header: ReplayHeader) {
        let mut slot = self.0.header.borrow_mut();
        if slot.is_none() {
            *slot = Some(header);
        }
    }

    pub fn has_header(&self) -> bool {
        self.0.header.borrow().is_some()
    }

    pub fn header_bytes(&self) -> Option<Vec<u8>> {
        self.0
            .header
            .borrow()
            .as_ref()
            .map(|h| h.raw_bytes.clone())
    }

    pub fn len(&self) -> usize {
        self.0.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the body bytes in `[from, to)`, clamped to what's
    /// actually been written so far.
    pub fn slice(&self, from: usize, to: usize) -> Vec<u8> {
        let data = self.0.data.borrow();
        let to = to.min(data.len());
        if from >= to {
            return Vec::new();
        }
        data[from..to].to_vec()
    }

    /// Appends `bytes` to the canonical body. Only ever called with data
    /// already reconciled against the longest writer prefix.
    pub fn extend(&self, bytes: &[u8]) {
        self.0.data.borrow_mut().extend_from_slice(bytes);
    }

    pub fn set_ended(&self) {
        self.0.ended.set();
    }

    pub fn is_ended(&self) -> bool {
        self.0.ended.is_set()
    }

    pub async fn wait_ended(&self) {
        self.0.ended.wait().await;
    }
}

impl Default for ReplayStream {
    fn default() -> Self {
        Self::new()
    }
}

/// One writer's private view of the bytes it has sent past its header, used
/// by the merger to pick the longest matching prefix.
///
/// `position` always equals `data.len()`; kept as a separate field because
/// the merger reads it far more often than it reads the body itself.
pub struct WriterView {
    data: Vec<u8>,
    pub position: usize,
}

impl WriterView {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            position: 0,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.position = self.data.len();
    }

    pub fn slice_from(&self, from: usize) -> &[u8] {
        &self.data[from.min(self.data.len())..]
    }
}

impl Default for WriterView {
    fn default() -> Self {
        Self::new()
    }
}
