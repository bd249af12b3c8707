//! Stream adapter that tees every emitted record into a named cache target.
//!
//! The cache is opened when the adapter is built and published only once the
//! inner stream is exhausted without error. Dropping the adapter early (a
//! downstream limit, a consumer that stops) leaves the segment unpublished.

use tracing::warn;

use semflow_io::DataDirectory;

use crate::traits::{OpError, RecordStream, RecordWithStats};

pub struct CachingStream<'a> {
    inner: RecordStream<'a>,
    ctx: &'a DataDirectory,
    cache_id: String,
    state: CacheState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheState {
    Writing,
    Closed,
    Abandoned,
}

impl<'a> CachingStream<'a> {
    pub fn open(
        ctx: &'a DataDirectory,
        cache_id: impl Into<String>,
        inner: RecordStream<'a>,
    ) -> Result<Self, OpError> {
        let cache_id = cache_id.into();
        ctx.open_cache(&cache_id)?;
        Ok(Self {
            inner,
            ctx,
            cache_id,
            state: CacheState::Writing,
        })
    }

    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }
}

impl Iterator for CachingStream<'_> {
    type Item = Result<RecordWithStats, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next();
        if self.state != CacheState::Writing {
            return item;
        }
        match item {
            Some(Ok(rws)) => match self.ctx.append_cache(&self.cache_id, &rws.record) {
                Ok(()) => Some(Ok(rws)),
                Err(e) => {
                    self.state = CacheState::Abandoned;
                    Some(Err(e.into()))
                }
            },
            Some(Err(e)) => {
                warn!(cache = %self.cache_id, "upstream failed; cache left unpublished");
                self.state = CacheState::Abandoned;
                Some(Err(e))
            }
            None => {
                self.state = CacheState::Closed;
                match self.ctx.close_cache(&self.cache_id) {
                    Ok(()) => None,
                    Err(e) => Some(Err(e.into())),
                }
            }
        }
    }
}
