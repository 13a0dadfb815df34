use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use blockdb_store::{IteratorState, KvError, KvIterator, KvResult};
use blockdb_types::AddressScheme;
use bytes::Bytes;
use tracing::debug;

use crate::backend::RelationalBackend;

/// Ordered cursor over the preimage index.
///
/// Keys are pulled a page at a time and values are fetched lazily on each
/// [`value`](KvIterator::value) call. Only keys written through the
/// relational database are visible.
pub struct SqlIterator {
    backend: Arc<dyn RelationalBackend>,
    scheme: Arc<dyn AddressScheme>,
    prefix: Vec<u8>,
    /// Lower bound of the next page; `None` once the index is drained.
    cursor: Option<Vec<u8>>,
    page: VecDeque<Vec<u8>>,
    page_size: usize,
    state: IteratorState,
}

impl SqlIterator {
    pub(crate) fn new(
        backend: Arc<dyn RelationalBackend>,
        scheme: Arc<dyn AddressScheme>,
        prefix: &[u8],
        start: &[u8],
        page_size: usize,
    ) -> Self {
        let mut from = prefix.to_vec();
        from.extend_from_slice(start);
        Self {
            backend,
            scheme,
            prefix: prefix.to_vec(),
            cursor: Some(from),
            page: VecDeque::new(),
            page_size: page_size.max(1),
            state: IteratorState::Pending,
        }
    }

    pub fn state(&self) -> &IteratorState {
        &self.state
    }

    fn finish(&mut self) {
        self.page.clear();
        self.cursor = None;
        if !matches!(self.state, IteratorState::Errored(_)) {
            self.state = IteratorState::Exhausted;
        }
    }

    async fn fill(&mut self) -> KvResult<bool> {
        let Some(from) = self.cursor.take() else {
            return Ok(false);
        };
        let keys = self.backend.scan_keys(&from, self.page_size).await?;
        if keys.len() == self.page_size {
            if let Some(last) = keys.last() {
                // Smallest key strictly greater than `last`.
                let mut next = last.clone();
                next.push(0);
                self.cursor = Some(next);
            }
        }
        debug!(backend = self.backend.name(), keys = keys.len(), "iterator page loaded");
        self.page = keys.into();
        Ok(!self.page.is_empty())
    }
}

#[async_trait]
impl KvIterator for SqlIterator {
    async fn next(&mut self) -> bool {
        if matches!(
            self.state,
            IteratorState::Exhausted | IteratorState::Errored(_)
        ) {
            return false;
        }
        if self.page.is_empty() {
            match self.fill().await {
                Ok(true) => {}
                Ok(false) => {
                    self.finish();
                    return false;
                }
                Err(err) => {
                    self.state = IteratorState::Errored(err);
                    self.finish();
                    return false;
                }
            }
        }
        match self.page.pop_front() {
            Some(key) if key.starts_with(&self.prefix) => {
                self.state = IteratorState::Positioned(key);
                true
            }
            _ => {
                self.finish();
                false
            }
        }
    }

    fn error(&self) -> Option<&KvError> {
        match &self.state {
            IteratorState::Errored(err) => Some(err),
            _ => None,
        }
    }

    fn key(&self) -> Option<&[u8]> {
        match &self.state {
            IteratorState::Positioned(key) => Some(key),
            _ => None,
        }
    }

    async fn value(&mut self) -> KvResult<Bytes> {
        let IteratorState::Positioned(key) = &self.state else {
            return Err(KvError::Unsupported("value of an unpositioned iterator"));
        };
        let key = key.clone();
        let fetched = match self.scheme.derive_key(&key) {
            Ok(address) => self.backend.get(&address).await,
            Err(err) => Err(err.into()),
        };
        let result = match fetched {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(KvError::NotFound(hex::encode(&key))),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            self.state = IteratorState::Errored(err.clone());
            self.finish();
        }
        result
    }

    fn release(&mut self) {
        self.finish();
    }
}
